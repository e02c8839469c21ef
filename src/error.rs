//! Error types for descriptor parsing and report decoding.

use thiserror::Error;

/// Failure modes of [`crate::parser::DescriptorParser::parse`].
///
/// All variants are recoverable at the attach boundary: the caller
/// discards any bindings built so far and keeps running (see
/// [`crate::bus::Bus::on_descriptor`]).
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum ParseError {
    #[error("descriptor truncated at byte offset {offset}: item declares more payload bytes than remain")]
    TruncatedDescriptor { offset: usize },

    #[error("unbalanced Push/Pop at byte offset {offset}: Pop with an empty global state stack")]
    UnbalancedPushPop { offset: usize },

    #[error("global state stack overflow at byte offset {offset}: more than {max} nested Push items")]
    StackOverflow { offset: usize, max: usize },

    #[error("descriptor too large: {len} bytes exceeds the {max} byte guard")]
    DescriptorTooLarge { len: usize, max: usize },
}

/// Failure modes of [`crate::decoder::ReportDecoder::decode`].
///
/// Per-field decode problems (degenerate scaling, out-of-range bits) are
/// not represented here: they are logged once and the field is simply
/// skipped, other fields in the same report still decode. A report whose
/// ID matches no binding is also not an error — it's silently dropped.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum DecodeError {
    #[error("report payload is empty")]
    EmptyReport,
}
