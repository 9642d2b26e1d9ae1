use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum TaxlenError {
    #[error("invalid taxon id: {0}")]
    #[diagnostic(help("a taxon id is the numeric NCBI Taxonomy identifier, e.g. 9606"))]
    InvalidTaxonId(String),

    #[error("invalid length range: minimum {min} is greater than maximum {max}")]
    InvalidLengthRange { min: u64, max: u64 },

    #[error("invalid value for {field}: {value}")]
    InvalidInput { field: String, value: String },

    #[error("missing required value: {0}")]
    #[diagnostic(help("pass it as a flag or drop --non-interactive to be prompted"))]
    MissingInput(String),

    #[error("NCBI request failed: {0}")]
    NcbiHttp(String),

    #[error("NCBI returned status {status}: {message}")]
    NcbiStatus { status: u16, message: String },

    #[error("unexpected NCBI response: {0}")]
    NcbiResponse(String),

    #[error("failed to parse GenBank record: {0}")]
    Parse(String),

    #[error("cannot write {path}: {message}")]
    Io { path: String, message: String },

    #[error("chart rendering failed: {0}")]
    ChartRender(String),

    #[error("no records of taxon {taxon_id} have a length between {min_length} and {max_length}")]
    EmptyResult {
        taxon_id: String,
        min_length: u64,
        max_length: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Input,
    RemoteService,
    Parse,
    Io,
    EmptyResult,
}

impl TaxlenError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TaxlenError::InvalidTaxonId(_)
            | TaxlenError::InvalidLengthRange { .. }
            | TaxlenError::InvalidInput { .. }
            | TaxlenError::MissingInput(_) => ErrorKind::Input,
            TaxlenError::NcbiHttp(_)
            | TaxlenError::NcbiStatus { .. }
            | TaxlenError::NcbiResponse(_) => ErrorKind::RemoteService,
            TaxlenError::Parse(_) => ErrorKind::Parse,
            TaxlenError::Io { .. } | TaxlenError::ChartRender(_) => ErrorKind::Io,
            TaxlenError::EmptyResult { .. } => ErrorKind::EmptyResult,
        }
    }

    pub fn io(path: impl std::fmt::Display, err: impl std::fmt::Display) -> Self {
        TaxlenError::Io {
            path: path.to_string(),
            message: err.to_string(),
        }
    }
}
