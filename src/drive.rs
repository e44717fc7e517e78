//! Google Drive folder listing.

use std::sync::{Mutex, PoisonError};

use chrono::Utc;
use serde::Deserialize;

use crate::auth::{Authenticator, Credentials, TokenStore};
use crate::error::RemoteError;

pub const FILES_ENDPOINT: &str = "https://www.googleapis.com/drive/v3/files";
const PAGE_SIZE: &str = "1000";

/// One file of a remote folder snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteFileRecord {
    pub id: String,
    pub name: String,
}

/// Lists the non-trashed files of a folder, most recently modified first.
pub trait RemoteListing: Send {
    fn list_folder(&self, folder_id: &str) -> Result<Vec<RemoteFileRecord>, RemoteError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<RemoteFileRecord>,
    next_page_token: Option<String>,
}

/// Drive v3 client that refreshes its access token when it runs out.
pub struct DriveClient<S> {
    auth: Authenticator<S>,
    credentials: Mutex<Credentials>,
    endpoint: String,
}

impl<S: TokenStore> DriveClient<S> {
    pub fn new(auth: Authenticator<S>, credentials: Credentials) -> Self {
        Self {
            auth,
            credentials: Mutex::new(credentials),
            endpoint: FILES_ENDPOINT.to_string(),
        }
    }

    /// Point the client at a different files endpoint.
    #[cfg(test)]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn access_token(&self) -> Result<String, RemoteError> {
        let mut credentials = self.credentials.lock().unwrap_or_else(PoisonError::into_inner);
        if !credentials.is_valid(Utc::now()) {
            tracing::debug!("access token expired, refreshing");
            *credentials = self.auth.refresh_and_save(&credentials)?;
        }
        Ok(credentials.token.clone())
    }

    fn fetch_page(&self, query: &str, page_token: Option<&str>) -> Result<FileList, RemoteError> {
        let token = self.access_token()?;
        let mut request = self
            .auth
            .http()
            .get(&self.endpoint)
            .bearer_auth(token)
            .query(&[
                ("q", query),
                ("fields", "nextPageToken, files(id, name)"),
                ("orderBy", "modifiedTime desc"),
                ("pageSize", PAGE_SIZE),
            ]);
        if let Some(page_token) = page_token {
            request = request.query(&[("pageToken", page_token)]);
        }
        let response = request.send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::Status {
                status: status.as_u16(),
                body: response.text().unwrap_or_default(),
            });
        }
        Ok(response.json()?)
    }
}

impl<S: TokenStore> RemoteListing for DriveClient<S> {
    fn list_folder(&self, folder_id: &str) -> Result<Vec<RemoteFileRecord>, RemoteError> {
        let query = folder_query(folder_id);
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let page = self.fetch_page(&query, page_token.as_deref())?;
            files.extend(page.files);
            match page.next_page_token {
                Some(next) if !next.is_empty() => page_token = Some(next),
                _ => break,
            }
        }
        Ok(files)
    }
}

/// Drive search expression for the direct, non-trashed children of `folder_id`.
pub fn folder_query(folder_id: &str) -> String {
    let escaped = folder_id.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{escaped}' in parents and trashed = false")
}
