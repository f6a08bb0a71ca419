use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::warning::{ConsolidationWarning, WarningCode};

/// Token used when the document carries no identifier marker.
pub const SENTINEL: &str = "sem_nome";

pub const IDENTIFIER_MARKER: &str = "Nome Amigável";

/// The first whitespace-delimited token after `Nome Amigável`.
///
/// The text is NFC-normalized first, so a decomposed `a` + combining acute
/// still matches the marker.
#[must_use]
pub fn extract_identifier(text: &str) -> Option<String> {
    let pattern = Regex::new(&format!(r"{}\s+(\S+)", regex::escape(IDENTIFIER_MARKER))).ok()?;
    let normalized = text.nfc().collect::<String>();
    pattern
        .captures(&normalized)
        .and_then(|captures| captures.get(1))
        .map(|token| token.as_str().to_string())
}

/// Like [`extract_identifier`], falling back to [`SENTINEL`] with a
/// `MarkerNotFound` warning.
pub fn identifier_or_sentinel(text: &str, warnings: &mut Vec<ConsolidationWarning>) -> String {
    if let Some(token) = extract_identifier(text) {
        return token;
    }
    warnings.push(ConsolidationWarning::new(
        WarningCode::MarkerNotFound,
        format!("marker '{IDENTIFIER_MARKER}' not found; using '{SENTINEL}'"),
    ));
    SENTINEL.to_string()
}
