use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum EtlError {
    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid config value: {0}")]
    ConfigValue(String),

    #[error("webdriver request failed: {0}")]
    BrowserHttp(String),

    #[error("webdriver returned status {status}: {message}")]
    BrowserStatus { status: u16, message: String },

    #[error("webdriver protocol error: {0}")]
    BrowserProtocol(String),

    #[error("timed out after {waited_ms} ms waiting for {locator}")]
    ElementTimeout { locator: String, waited_ms: u128 },

    #[error("download request failed: {0}")]
    Http(String),

    #[error("download returned status {status}: {message}")]
    HttpStatus { status: u16, message: String },

    #[error("failed to decompress download: {0}")]
    Decompress(String),

    #[error("object store error: {0}")]
    ObjectStore(String),

    #[error("object not found: {bucket}/{key}")]
    ObjectNotFound { bucket: String, key: String },

    #[error("document store error: {0}")]
    DocumentStore(String),

    #[error("failed to read clinical table at {path}: {message}")]
    ClinicalRead { path: PathBuf, message: String },

    #[error("clinical table is missing required column: {0}")]
    ClinicalColumn(String),

    #[error("query server error: {0}")]
    Server(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl EtlError {
    /// Errors that only invalidate the current cohort; the run moves on to the next one.
    pub fn is_cohort_scoped(&self) -> bool {
        matches!(
            self,
            EtlError::ElementTimeout { .. }
                | EtlError::Http(_)
                | EtlError::HttpStatus { .. }
                | EtlError::Decompress(_)
        )
    }
}
