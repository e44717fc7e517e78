//! Error types for the remote listing and authorization boundaries.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures while loading, refreshing or bootstrapping credentials.
#[derive(Debug, Error)]
pub enum AuthError {
    /// A credential file could not be read or written.
    #[error("cannot access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// A credential file exists but is not valid JSON of the expected shape.
    #[error("malformed {}: {source}", .path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    /// The client secret file has neither an `installed` nor a `web` section.
    #[error("{} contains no installed or web client", .0.display())]
    NoClient(PathBuf),
    /// Transport failure talking to the token endpoint.
    #[error("token request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The token endpoint answered with a non-success status.
    #[error("token endpoint rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },
    /// Stored credentials are expired and carry no refresh token.
    #[error("credentials expired and no refresh token is available")]
    NoRefreshToken,
    /// The user declined consent, or the provider reported an error.
    #[error("authorization was denied: {0}")]
    Denied(String),
    /// The client secret carries an `auth_uri` that is not a URL.
    #[error("invalid auth_uri {0:?}")]
    InvalidAuthUri(String),
    /// The redirect reached the local listener without an authorization code.
    #[error("authorization redirect did not carry a code")]
    MissingCode,
    /// The local redirect listener failed.
    #[error("redirect listener failed: {0}")]
    Listener(#[source] io::Error),
}

/// Failures while listing the remote folder.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("drive request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("drive API returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error(transparent)]
    Auth(#[from] AuthError),
}
