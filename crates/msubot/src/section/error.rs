//! Error types for the section listing parser.

use thiserror::Error;

/// Errors that can occur while turning a section listing into [`super::Section`]s.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SectionParseError {
    /// The response body could not be read as an HTML document
    #[error("Unreadable section document: {message}")]
    UnreadableDocument { message: String },

    /// A row pair matched the table fingerprint but its identifier cell did
    /// not split into department, course and section
    #[error(
        "Expected 3 tokens in section identifier {cell_text:?}, found {token_count} (did the listing layout change?)"
    )]
    IdentifierShape {
        cell_text: String,
        token_count: usize,
    },
}

impl SectionParseError {
    /// Returns true if the listing's layout no longer matches the parser.
    ///
    /// These need a parser fix rather than a retry.
    pub fn is_structural(&self) -> bool {
        matches!(self, SectionParseError::IdentifierShape { .. })
    }
}
