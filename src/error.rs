// ⚠️ Error taxonomy for ingestion, reconciliation and POS sync

use crate::model::SectionKind;
use thiserror::Error;

/// Coarse grouping used by callers to decide how to surface a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad upload: wrong file, unreadable workbook, missing section.
    InputFormat,
    /// A record referenced a product the identity pass never produced.
    IntegrityViolation,
    /// Nothing matched the request (e.g. no convertible cash sales).
    NotFound,
    /// The store failed; any open transaction was rolled back.
    Persistence,
    Internal,
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("unsupported file {0:?}: expected .xlsx, .xls, .xlsm, .ods or .csv")]
    UnsupportedFile(String),

    #[error("unreadable workbook: {0}")]
    UnreadableWorkbook(String),

    #[error("workbook must contain a sheet named {0:?}")]
    MissingSheet(String),

    #[error("no data found in the stock sheet")]
    EmptyGrid,

    #[error("missing required section: {0}")]
    MissingSection(SectionKind),

    #[error("section {later} (row {later_row}) appears before {earlier} (row {earlier_row})")]
    SectionOrder {
        earlier: SectionKind,
        earlier_row: usize,
        later: SectionKind,
        later_row: usize,
    },

    #[error("product not found: {name} (HSN {hsn_code})")]
    UnknownProduct { name: String, hsn_code: String },

    #[error("no valid cash transactions found among {requested} requested id(s)")]
    NoConvertibleTransactions { requested: usize },

    #[error("persistence error: {0}")]
    Persistence(#[from] rusqlite::Error),

    #[error("failed to render workbook: {0}")]
    Render(#[from] rust_xlsxwriter::XlsxError),

    #[error("invalid header pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl LedgerError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            LedgerError::UnsupportedFile(_)
            | LedgerError::UnreadableWorkbook(_)
            | LedgerError::MissingSheet(_)
            | LedgerError::EmptyGrid
            | LedgerError::MissingSection(_)
            | LedgerError::SectionOrder { .. } => ErrorCategory::InputFormat,
            LedgerError::UnknownProduct { .. } => ErrorCategory::IntegrityViolation,
            LedgerError::NoConvertibleTransactions { .. } => ErrorCategory::NotFound,
            LedgerError::Persistence(_) => ErrorCategory::Persistence,
            LedgerError::Render(_)
            | LedgerError::Pattern(_)
            | LedgerError::Serialization(_)
            | LedgerError::Config(_) => ErrorCategory::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
