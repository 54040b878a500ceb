use std::fmt::{self, Debug, Display};
use std::io;

/// Provides `EpiError` and maps other errors to
/// convert to an `EpiError`
#[derive(Debug)]
#[allow(clippy::module_name_repetitions)]
pub enum EpiError {
    IoError(io::Error),
    JsonError(serde_json::Error),
    CSVError(csv::Error),
    /// The model description is structurally invalid: a dangling id, an unresolved parameter
    /// dependency, mismatched matrix dimensions and the like.
    ConfigError(String),
    ReportError(String),
    EpiError(String),
}

impl From<io::Error> for EpiError {
    fn from(error: io::Error) -> Self {
        EpiError::IoError(error)
    }
}

impl From<serde_json::Error> for EpiError {
    fn from(error: serde_json::Error) -> Self {
        EpiError::JsonError(error)
    }
}

impl From<csv::Error> for EpiError {
    fn from(error: csv::Error) -> Self {
        EpiError::CSVError(error)
    }
}

impl From<String> for EpiError {
    fn from(error: String) -> Self {
        EpiError::EpiError(error)
    }
}

impl From<&str> for EpiError {
    fn from(error: &str) -> Self {
        EpiError::EpiError(error.to_string())
    }
}

impl std::error::Error for EpiError {}

impl Display for EpiError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Error: {self:?}")?;
        Ok(())
    }
}

/// Shorthand for building a configuration error with a formatted message.
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::error::EpiError::ConfigError(format!($($arg)*))
    };
}
pub(crate) use config_error;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_from_strings() {
        let error: EpiError = "something failed".into();
        assert!(matches!(error, EpiError::EpiError(ref message) if message == "something failed"));
    }

    #[test]
    fn config_error_formats_message() {
        let error = config_error!("event {} has no destination", 3);
        match error {
            EpiError::ConfigError(message) => assert_eq!(message, "event 3 has no destination"),
            _ => panic!("Unexpected error"),
        }
    }

    #[test]
    fn display_includes_variant() {
        let error = EpiError::ReportError("bad path".to_string());
        assert_eq!(error.to_string(), "Error: ReportError(\"bad path\")");
    }
}
