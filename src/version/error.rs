use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Empty version string")]
    EmptyInput,

    #[error("Unrecognized version format: {0}")]
    UnrecognizedFormat(String),
}
