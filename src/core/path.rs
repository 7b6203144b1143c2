//! Parser for the append-operation path syntax.
//!
//! `$` is the document root, `$.a.b` a dotted path, and single-quoted
//! segments carry literal dots: `$.a.'seg.with.dots'.b`.

use regex::Regex;

/// Parse a path expression into its unquoted segments. The root path `$`
/// yields an empty list.
pub fn parse_path(path: &str) -> Result<Vec<String>, String> {
    let shape = Regex::new(r"^\$((?:\.[^\s.]+)+)?$").expect("valid path pattern");
    let segments = Regex::new(r"'[^\s]+'|[^.\s]+").expect("valid segment pattern");

    let captures = shape
        .captures(path)
        .ok_or_else(|| format!("invalid yaml path: {}", path))?;
    let Some(subpath) = captures.get(1) else {
        return Ok(Vec::new());
    };
    Ok(segments
        .find_iter(subpath.as_str())
        .map(|m| m.as_str().trim_matches('\'').to_string())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_path() {
        assert_eq!(parse_path("$").unwrap(), Vec::<String>::new());
    }

    #[test]
    fn test_dotted_path() {
        assert_eq!(parse_path("$.a.b.c").unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_single_segment() {
        assert_eq!(parse_path("$.receivers").unwrap(), vec!["receivers"]);
    }

    #[test]
    fn test_quoted_segment_keeps_dots() {
        assert_eq!(
            parse_path("$.service.'pipelines.traces'.exporters").unwrap(),
            vec!["service", "pipelines.traces", "exporters"]
        );
    }

    #[test]
    fn test_trailing_dot_is_invalid() {
        let err = parse_path("$.a.").unwrap_err();
        assert_eq!(err, "invalid yaml path: $.a.");
    }

    #[test]
    fn test_missing_root_marker_is_invalid() {
        assert!(parse_path("a.b").is_err());
        assert!(parse_path(".a").is_err());
        assert!(parse_path("").is_err());
    }

    #[test]
    fn test_whitespace_is_invalid() {
        assert!(parse_path("$.a b").is_err());
    }
}
