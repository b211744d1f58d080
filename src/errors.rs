// Error taxonomy for the fill pipeline
//
// Every variant except ExhaustedFallbacks is absorbed by advancing the
// fallback stage machine; none of them surface as a request failure on
// their own.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FillError {
    /// Legacy binary (or unrecognizable) container detected; non-retryable,
    /// routes straight past smart-fill
    #[error("Unsupported container format: {0}")]
    UnsupportedFormat(String),

    /// Network error, timeout, or size-cap exceeded during template acquisition
    #[error("Template download failed: {0}")]
    DownloadFailure(String),

    /// Zero structure detected by the structural parser
    #[error("Structural parse produced no fields or sections: {0}")]
    ParseFailure(String),

    /// AI mapping call error; degrades to more unmapped fields
    #[error("Field mapping failed: {0}")]
    MappingFailure(String),

    /// Per-field XML corruption detected before commit; field-scoped,
    /// never document-scoped
    #[error("Field fill failed: {0}")]
    FillFailure(String),

    /// Every stage including the from-scratch builder failed.
    /// Practically unreachable.
    #[error("All fill strategies exhausted: {0}")]
    ExhaustedFallbacks(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Zip error: {0}")]
    Zip(Box<zip::result::ZipError>),

    #[error("HTTP error: {0}")]
    Http(Box<reqwest::Error>),
}

impl FillError {
    /// Errors that demote the request to the next fallback stage rather
    /// than failing it
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, FillError::ExhaustedFallbacks(_))
    }
}

impl From<zip::result::ZipError> for FillError {
    fn from(error: zip::result::ZipError) -> Self {
        FillError::Zip(Box::new(error))
    }
}

impl From<reqwest::Error> for FillError {
    fn from(error: reqwest::Error) -> Self {
        FillError::Http(Box::new(error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_errors_are_recoverable() {
        assert!(FillError::UnsupportedFormat("cfb".into()).is_recoverable());
        assert!(FillError::DownloadFailure("timeout".into()).is_recoverable());
        assert!(FillError::ParseFailure("empty".into()).is_recoverable());
        assert!(FillError::MappingFailure("api down".into()).is_recoverable());
        assert!(FillError::FillFailure("bad splice".into()).is_recoverable());
    }

    #[test]
    fn test_exhausted_fallbacks_is_hard() {
        assert!(!FillError::ExhaustedFallbacks("everything failed".into()).is_recoverable());
    }
}
