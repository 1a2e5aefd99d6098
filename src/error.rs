use std::fmt;

/// Errors surfaced by the public engine API. Parse and layout problems
/// inside a document never error; they degrade to literal text or a
/// truncated page instead.
#[derive(Debug)]
pub enum MarkflowError {
    /// A block scanner name was requested that no registry entry provides.
    UnknownScanner(String),
    /// An engine or layout option was rejected before any work started.
    InvalidConfiguration(String),
}

impl fmt::Display for MarkflowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarkflowError::UnknownScanner(name) => {
                write!(f, "no block scanner registered under {name:?}")
            }
            MarkflowError::InvalidConfiguration(msg) => {
                write!(f, "invalid configuration: {msg}")
            }
        }
    }
}

impl std::error::Error for MarkflowError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_missing_scanner() {
        let err = MarkflowError::UnknownScanner("gfm".to_string());
        assert!(err.to_string().contains("\"gfm\""));
    }
}
