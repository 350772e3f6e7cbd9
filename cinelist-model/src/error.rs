use std::fmt::{self, Display};

/// Errors produced by model constructors and parsing routines.
#[derive(Debug)]
pub enum ModelError {
    InvalidLink(url::ParseError),
    InvalidCollectionId(String),
}

impl Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::InvalidLink(err) => write!(f, "invalid link: {err}"),
            ModelError::InvalidCollectionId(raw) => {
                write!(f, "invalid collection id: {raw:?}")
            }
        }
    }
}

impl std::error::Error for ModelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ModelError::InvalidLink(err) => Some(err),
            ModelError::InvalidCollectionId(_) => None,
        }
    }
}

impl From<url::ParseError> for ModelError {
    fn from(err: url::ParseError) -> Self {
        ModelError::InvalidLink(err)
    }
}

pub type Result<T> = std::result::Result<T, ModelError>;
