use axum::http::StatusCode;
use thiserror::Error;

/// JSON-RPC: method (or tool) not found
pub const METHOD_NOT_FOUND: i32 = -32601;
/// JSON-RPC: invalid method parameters
pub const INVALID_PARAMS: i32 = -32602;
/// Application error raised by a collaborator
pub const APPLICATION_ERROR: i32 = -32000;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    InvalidParams(String),

    #[error("{}", upstream_message(.status, .message))]
    Upstream { status: Option<u16>, message: String },

    #[error("Device store error: {0}")]
    Store(String),

    #[error("Tool already registered: {0}")]
    DuplicateTool(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML write error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

fn upstream_message(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(status) => format!("Clever API Error {}. Details: {}", status, message),
        None => format!("Clever API Error (no response). Details: {}", message),
    }
}

impl Error {
    /// JSON-RPC error code carried in the response envelope
    pub fn rpc_code(&self) -> i32 {
        match self {
            Error::InvalidParams(_) => INVALID_PARAMS,
            _ => APPLICATION_ERROR,
        }
    }

    /// HTTP status used for the envelope that reports this error
    pub fn http_status(&self) -> StatusCode {
        match self {
            Error::InvalidParams(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
