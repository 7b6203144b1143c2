//! Mezcla CLI entry point.

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "mezcla",
    version,
    about = "Build OpenTelemetry Collector configurations from recipes"
)]
struct Cli {
    #[command(subcommand)]
    command: mezcla::cli::Commands,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = mezcla::cli::dispatch(cli.command) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
