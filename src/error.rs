use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum BagsError {
    #[error("invalid HuBMAP id: {0}")]
    InvalidHubmapId(String),

    #[error("invalid instance: {0} (expected dev, test or prod)")]
    InvalidInstance(String),

    #[error("invalid dataset input: {0}")]
    InvalidInput(String),

    #[error("no API token; pass --token or set TOKEN")]
    #[diagnostic(help("tokens can be copied from the HuBMAP portal after logging in"))]
    MissingToken,

    #[error("missing config file at {0}")]
    MissingConfig(PathBuf),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("{service} request failed: {message}")]
    Http {
        service: &'static str,
        message: String,
    },

    #[error("{service} returned status {status}: {message}")]
    Status {
        service: &'static str,
        status: u16,
        message: String,
    },

    #[error("{service} rejected the token (status {status})")]
    Unauthorized { service: &'static str, status: u16 },

    #[error("{service} has no record for {id}")]
    NotFound { service: &'static str, id: String },

    #[error("malformed {service} response: {message}")]
    MalformedResponse {
        service: &'static str,
        message: String,
    },

    #[error("record {id} is missing field `{field}`")]
    MissingField { id: String, field: String },

    #[error("no anatomy term for organ: {0}")]
    UnknownOrgan(String),

    #[error("dataset {id} is broken: {reason}")]
    Broken { id: String, reason: String },

    #[error("manifest {table} expects {expected} columns, got {actual}")]
    RowWidth {
        table: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("TSV error: {0}")]
    Tsv(String),

    #[error("archive error: {0}")]
    Archive(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl BagsError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, BagsError::NotFound { .. })
    }
}

impl From<csv::Error> for BagsError {
    fn from(err: csv::Error) -> Self {
        BagsError::Tsv(err.to_string())
    }
}
