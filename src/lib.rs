//! Mezcla builds OpenTelemetry Collector configurations from recipes.
//!
//! A recipe names component definitions, supplies arguments and constants,
//! and wires the result together in a services section. Components are plain
//! YAML files with named configurations, reusable fragments, and variables.

pub mod cli;
pub mod core;
