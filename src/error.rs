use std::error::Error;
use std::fmt;

/// Failures that halt a pipeline run.
///
/// Cell-level coercion problems and join misses are not errors; they are
/// counted and reported as warnings alongside the results.
#[derive(Debug)]
pub enum PipelineError {
    /// A required table was not supplied or could not be obtained.
    InputUnavailable(String),
    /// Selected columns do not exist or the column roles are inconsistent.
    SchemaMismatch(String),
    Csv(csv::Error),
    Io(std::io::Error),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::InputUnavailable(what) => write!(f, "Input unavailable: {}", what),
            PipelineError::SchemaMismatch(detail) => write!(f, "Schema mismatch: {}", detail),
            PipelineError::Csv(err) => write!(f, "CSV error: {}", err),
            PipelineError::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl Error for PipelineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PipelineError::Csv(err) => Some(err),
            PipelineError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<csv::Error> for PipelineError {
    fn from(err: csv::Error) -> Self {
        PipelineError::Csv(err)
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::Io(err)
    }
}

impl PipelineError {
    /// True for the failures that mean "this input is missing", as opposed to
    /// a malformed one.
    pub fn is_input_unavailable(&self) -> bool {
        matches!(self, PipelineError::InputUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_the_missing_input() {
        let err = PipelineError::InputUnavailable("nutrition table".to_string());
        assert_eq!(err.to_string(), "Input unavailable: nutrition table");
        assert!(err.is_input_unavailable());
    }

    #[test]
    fn test_io_error_exposes_source() {
        let err: PipelineError = std::io::Error::new(std::io::ErrorKind::Other, "disk").into();
        assert!(err.source().is_some());
        assert!(!err.is_input_unavailable());
    }
}
