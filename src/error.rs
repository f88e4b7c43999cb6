use miette::Diagnostic;
use thiserror::Error;

use crate::domain::TaxonomyId;

/// Run-level failures. These abort the current run; records committed
/// earlier in the same run stay committed.
#[derive(Debug, Error, Diagnostic)]
pub enum RegistryError {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("invalid column index for {field}: {value}")]
    InvalidColumn { field: &'static str, value: String },

    #[error("organism with taxonomy id {0} is not registered")]
    OrganismNotFound(TaxonomyId),

    #[error("cross-reference database {0:?} is not registered; run register-xrdb first")]
    MissingCrossRefDb(String),

    #[error("failed to open {source_name}: {message}")]
    SourceOpen {
        source_name: String,
        message: String,
    },

    #[error("source request failed: {0}")]
    Http(String),

    #[error("source returned status {status}: {message}")]
    HttpStatus { status: u16, message: String },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

/// Per-record problems. Tallied and skipped at the adapter loop; never
/// abort a run.
#[derive(Debug, Error)]
pub enum RecordIssue {
    #[error("line {line}: {reason}")]
    Malformed { line: u64, reason: String },

    #[error("no gene matching {identifier}")]
    UnresolvedGene { identifier: String },

    #[error("unknown cross-reference database {name}")]
    UnknownXrdb { name: String },
}
