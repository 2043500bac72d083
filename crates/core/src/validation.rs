//! Validation of client-supplied identifiers.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::CoreError;

/// Style used when the client does not pick one, and the fallback template.
pub const DEFAULT_STYLE: &str = "realistic";

static SESSION_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("valid regex"));

static STYLE_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,32}$").expect("valid regex"));

/// Session ids are 1-64 characters of `[A-Za-z0-9_-]`.
///
/// The restriction keeps ids safe to embed in artifact file names and URLs.
pub fn validate_session_id(id: &str) -> Result<(), CoreError> {
    if SESSION_ID_RE.is_match(id) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!("Invalid session id: {id:?}")))
    }
}

/// Style names are 1-32 characters of `[A-Za-z0-9_-]`.
pub fn validate_style_name(style: &str) -> Result<(), CoreError> {
    if STYLE_NAME_RE.is_match(style) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!("Invalid style name: {style:?}")))
    }
}
