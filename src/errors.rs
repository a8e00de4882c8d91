//! Error results that can be returned from the tokenizer
use thiserror::Error;

/// Terminal tokenizer failures. These never escape [`crate::purify`]; the
/// tree builder stops consuming tokens and serializes the tree built so far.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum Error {
    #[error("unterminated tag at offset {0}")]
    UnterminatedTag(usize),

    #[error("unclosed raw text element: {0}")]
    UnclosedRawText(String),
}
