use thiserror::Error;

/// Convenient alias for fallible results returned throughout the crate.
pub type Result<T> = std::result::Result<T, ToolError>;

/// Error type covering the different failure cases that can occur when a
/// tool fetches, normalizes, or exports business data.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Raised at construction time when a required credential is absent.
    #[error("missing configuration: {variable} is required ({hint})")]
    ConfigurationMissing {
        variable: &'static str,
        hint: &'static str,
    },

    /// Network failure or non-success response from an upstream API. No
    /// local data was produced.
    #[error("{service} unavailable: {reason}")]
    UpstreamUnavailable {
        service: &'static str,
        reason: String,
    },

    /// Wrapper for IO failures such as reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors bubbled up from the Excel writer implementation.
    #[error("Excel write error: {0}")]
    ExcelWrite(#[from] rust_xlsxwriter::XlsxError),

    /// Errors bubbled up from the Excel reader implementation.
    #[error("Excel read error: {0}")]
    ExcelRead(#[from] calamine::XlsxError),

    /// Errors bubbled up from the CSV writer.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Raised when a sheet does not follow the expected conventions.
    #[error("invalid workbook structure: {0}")]
    InvalidWorkbook(String),

    /// Raised when a caller supplies a value the tool cannot work with.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Raised when the tracing subscriber fails to initialise.
    #[error("failed to initialise logging: {0}")]
    Logging(String),
}

impl ToolError {
    pub(crate) fn upstream(service: &'static str, reason: impl Into<String>) -> Self {
        ToolError::UpstreamUnavailable {
            service,
            reason: reason.into(),
        }
    }
}

/// A single upstream item that could not be normalized into a record.
///
/// Normalizers return it; the pipeline logs it and moves on to the next item.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("malformed item: {0}")]
pub struct MalformedItem(pub String);

impl MalformedItem {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

impl From<serde_json::Error> for MalformedItem {
    fn from(error: serde_json::Error) -> Self {
        Self(error.to_string())
    }
}
