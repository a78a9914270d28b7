use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Could not find '{0}' in the document")]
    MissingAnchor(String),

    #[error("Expected a unique element matching '{selector}', found {found}")]
    NotUnique { selector: String, found: usize },

    #[error("Element matching '{0}' has no href")]
    MissingHref(String),

    #[error("Element matching '{0}' has no text")]
    EmptyText(String),

    #[error("Expected an absolute URL with a scheme, got '{0}'")]
    InvalidUrl(String),
}
