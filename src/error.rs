//! Error types for the login and upload flows.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// The settings file exists but is not a JSON object we can read.
    #[error("invalid configuration file {}: {source}", path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport failures, timeouts and non-2xx statuses.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The handshake endpoint answered with a structured `error`.
    #[error("login handshake rejected: {0}")]
    Handshake(String),

    #[error("login failed: cannot detect an authenticated session")]
    Authentication,

    #[error("ADIF file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("upload response is not JSON: {excerpt}")]
    MalformedResponse { excerpt: String },

    /// `status` was missing or something other than `"ok"`.
    #[error("upload rejected: {0}")]
    UploadRejected(serde_json::Value),
}
