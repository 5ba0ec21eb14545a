//! Input validation helpers shared by the registry and the record API.

use regex::Regex;
use std::sync::LazyLock;

use crate::errors::{PipelineError, PipelineResult};

/// Maximum length of a stage name, in characters.
pub const MAX_STAGE_NAME_LEN: usize = 100;

static COLOR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#[0-9a-fA-F]{6}$").expect("color pattern is a valid regex"));

/// Validates a stage name and returns it trimmed.
pub fn validate_stage_name(name: &str) -> PipelineResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(PipelineError::invalid_field(
            "name",
            "Stage name cannot be empty or whitespace-only",
        ));
    }
    if trimmed.chars().count() > MAX_STAGE_NAME_LEN {
        return Err(PipelineError::invalid_field(
            "name",
            format!("Stage name cannot exceed {MAX_STAGE_NAME_LEN} characters"),
        ));
    }
    Ok(trimmed.to_string())
}

/// Validates a `#RRGGBB` display color.
pub fn validate_color(color: &str) -> PipelineResult<()> {
    if COLOR_PATTERN.is_match(color) {
        Ok(())
    } else {
        Err(PipelineError::invalid_field(
            "color",
            format!("Color '{color}' must be a hex value like #1a2b3c"),
        ))
    }
}

/// Validates optional free-text notes against a length cap.
pub fn validate_notes(notes: Option<&str>, max_len: usize) -> PipelineResult<()> {
    match notes {
        Some(text) if text.chars().count() > max_len => Err(PipelineError::invalid_field(
            "notes",
            format!("Notes cannot exceed {max_len} characters"),
        )),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    #[test]
    fn test_stage_name_trimmed() {
        assert_eq!(validate_stage_name("  Research ").unwrap(), "Research");
    }

    #[test]
    fn test_stage_name_empty() {
        let err = validate_stage_name("   ").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_stage_name_too_long() {
        let name = "x".repeat(MAX_STAGE_NAME_LEN + 1);
        assert!(validate_stage_name(&name).is_err());
    }

    #[test]
    fn test_color() {
        assert!(validate_color("#6b7280").is_ok());
        assert!(validate_color("#ABCDEF").is_ok());
        assert!(validate_color("red").is_err());
        assert!(validate_color("#12345").is_err());
    }

    #[test]
    fn test_notes() {
        assert!(validate_notes(None, 3).is_ok());
        assert!(validate_notes(Some("abc"), 3).is_ok());
        assert!(validate_notes(Some("abcd"), 3).is_err());
    }
}
