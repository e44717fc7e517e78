//! OAuth credentials for the Drive API: persisted token, refresh, and first-run consent.

use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use reqwest::Url;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// Read-only access is all the poller needs.
pub const SCOPES: &[&str] = &["https://www.googleapis.com/auth/drive.readonly"];

const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
/// Tokens this close to expiry are treated as already expired.
const EXPIRY_SKEW_SECS: i64 = 60;
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Authorized-user credentials as stored in the token file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

impl Credentials {
    /// A token is usable when present and not within the expiry skew.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        if self.token.is_empty() {
            return false;
        }
        match self.expiry {
            Some(expiry) => now + TimeDelta::seconds(EXPIRY_SKEW_SECS) < expiry,
            None => true,
        }
    }

    fn from_response(
        response: TokenResponse,
        client: &ClientSecret,
        previous_refresh: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let scopes = match response.scope {
            Some(scope) => scope.split_whitespace().map(str::to_string).collect(),
            None => SCOPES.iter().map(|s| s.to_string()).collect(),
        };
        Self {
            token: response.access_token,
            refresh_token: response.refresh_token.or(previous_refresh),
            token_uri: client.token_uri.clone(),
            client_id: client.client_id.clone(),
            client_secret: client.client_secret.clone(),
            scopes,
            expiry: response
                .expires_in
                .map(|secs| now + TimeDelta::seconds(secs)),
        }
    }

    fn client(&self) -> ClientSecret {
        ClientSecret {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            auth_uri: DEFAULT_AUTH_URI.to_string(),
            token_uri: self.token_uri.clone(),
        }
    }
}

/// OAuth client registration, as downloaded from the cloud console.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClientSecret {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

#[derive(Deserialize)]
struct ClientSecretFile {
    installed: Option<ClientSecret>,
    web: Option<ClientSecret>,
}

impl ClientSecret {
    pub fn from_file(path: &Path) -> Result<Self, AuthError> {
        let contents = fs::read_to_string(path).map_err(|source| AuthError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: ClientSecretFile =
            serde_json::from_str(&contents).map_err(|source| AuthError::Malformed {
                path: path.to_path_buf(),
                source,
            })?;
        file.installed
            .or(file.web)
            .ok_or_else(|| AuthError::NoClient(path.to_path_buf()))
    }
}

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

/// Key-value home of the credentials between runs.
pub trait TokenStore: Send {
    /// `Ok(None)` when nothing has been stored yet.
    fn load(&self) -> Result<Option<Credentials>, AuthError>;
    fn save(&self, credentials: &Credentials) -> Result<(), AuthError>;
}

/// Credentials kept as pretty JSON in a single file.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<Option<Credentials>, AuthError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(AuthError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|source| AuthError::Malformed {
                path: self.path.clone(),
                source,
            })
    }

    fn save(&self, credentials: &Credentials) -> Result<(), AuthError> {
        let contents =
            serde_json::to_string_pretty(credentials).map_err(|source| AuthError::Malformed {
                path: self.path.clone(),
                source,
            })?;
        fs::write(&self.path, contents).map_err(|source| AuthError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

/// Produces usable credentials from the store, the token endpoint, or the user.
pub struct Authenticator<S> {
    store: S,
    http: Client,
    client_secret_file: PathBuf,
    redirect_port: u16,
}

impl<S: TokenStore> Authenticator<S> {
    pub fn new(
        store: S,
        client_secret_file: impl Into<PathBuf>,
        redirect_port: u16,
    ) -> Result<Self, AuthError> {
        let http = Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self {
            store,
            http,
            client_secret_file: client_secret_file.into(),
            redirect_port,
        })
    }

    /// Shared HTTP client, reused for API calls.
    pub fn http(&self) -> &Client {
        &self.http
    }

    #[cfg(test)]
    pub(crate) fn store(&self) -> &S {
        &self.store
    }

    /// Load stored credentials, refreshing or re-authorizing when they are not usable.
    pub fn authorize(&self) -> Result<Credentials, AuthError> {
        let stored = self.store.load()?;
        if let Some(credentials) = &stored {
            if credentials.is_valid(Utc::now()) {
                return Ok(credentials.clone());
            }
        }
        let credentials = match stored {
            Some(credentials) if credentials.refresh_token.is_some() => {
                tracing::info!("Stored token expired, refreshing");
                self.refresh(&credentials)?
            }
            _ => self.run_installed_flow()?,
        };
        self.store.save(&credentials)?;
        Ok(credentials)
    }

    /// Exchange the refresh token for a new access token.
    pub fn refresh(&self, credentials: &Credentials) -> Result<Credentials, AuthError> {
        let refresh_token = credentials
            .refresh_token
            .as_deref()
            .ok_or(AuthError::NoRefreshToken)?;
        let client = credentials.client();
        let response = self.request_token(
            &client.token_uri,
            &[
                ("client_id", client.client_id.as_str()),
                ("client_secret", client.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ],
        )?;
        let mut refreshed = Credentials::from_response(
            response,
            &client,
            credentials.refresh_token.clone(),
            Utc::now(),
        );
        if refreshed.scopes.is_empty() {
            refreshed.scopes = credentials.scopes.clone();
        }
        Ok(refreshed)
    }

    /// Refresh and persist in one step; used when a token expires mid-run.
    pub fn refresh_and_save(&self, credentials: &Credentials) -> Result<Credentials, AuthError> {
        let refreshed = self.refresh(credentials)?;
        self.store.save(&refreshed)?;
        Ok(refreshed)
    }

    fn run_installed_flow(&self) -> Result<Credentials, AuthError> {
        let client = ClientSecret::from_file(&self.client_secret_file)?;
        let listener =
            TcpListener::bind(("127.0.0.1", self.redirect_port)).map_err(AuthError::Listener)?;
        let redirect_uri = format!("http://localhost:{}/", self.redirect_port);
        let url = consent_url(&client, &redirect_uri)?;
        tracing::info!("Please visit this URL to authorize this application: {url}");

        let code = wait_for_code(&listener)?;
        let response = self.request_token(
            &client.token_uri,
            &[
                ("code", code.as_str()),
                ("client_id", client.client_id.as_str()),
                ("client_secret", client.client_secret.as_str()),
                ("redirect_uri", redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ],
        )?;
        Ok(Credentials::from_response(response, &client, None, Utc::now()))
    }

    fn request_token(&self, token_uri: &str, form: &[(&str, &str)]) -> Result<TokenResponse, AuthError> {
        let response = self.http.post(token_uri).form(form).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                body: response.text().unwrap_or_default(),
            });
        }
        Ok(response.json()?)
    }
}

/// Build the consent page URL for the installed-app flow.
pub fn consent_url(client: &ClientSecret, redirect_uri: &str) -> Result<Url, AuthError> {
    let scope = SCOPES.join(" ");
    Url::parse_with_params(
        &client.auth_uri,
        &[
            ("response_type", "code"),
            ("client_id", client.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("scope", scope.as_str()),
            ("access_type", "offline"),
            ("prompt", "consent"),
        ],
    )
    .map_err(|_| AuthError::InvalidAuthUri(client.auth_uri.clone()))
}

/// Accept redirect requests until one carries a code or an error.
fn wait_for_code(listener: &TcpListener) -> Result<String, AuthError> {
    loop {
        let (mut stream, _) = listener.accept().map_err(AuthError::Listener)?;
        let mut request_line = String::new();
        BufReader::new(&stream)
            .read_line(&mut request_line)
            .map_err(AuthError::Listener)?;
        let outcome = parse_callback(&request_line);
        let (status, message) = match &outcome {
            Ok(Some(_)) => ("200 OK", "The authentication flow has completed. You may close this window."),
            Ok(None) => ("404 Not Found", "Not found."),
            Err(_) => ("400 Bad Request", "Authorization failed. You may close this window."),
        };
        let reply = format!(
            "HTTP/1.1 {status}\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{message}",
            message.len()
        );
        // The browser page is cosmetic; the code has already been read.
        let _ = stream.write_all(reply.as_bytes());
        if let Some(code) = outcome? {
            return Ok(code);
        }
    }
}

/// Extract the authorization code from the redirect's request line.
///
/// `Ok(None)` means the request was for something else (a favicon, say).
pub fn parse_callback(request_line: &str) -> Result<Option<String>, AuthError> {
    let Some(target) = request_line.split_whitespace().nth(1) else {
        return Ok(None);
    };
    let Ok(url) = Url::parse(&format!("http://localhost{target}")) else {
        return Ok(None);
    };
    if url.path() != "/" {
        return Ok(None);
    }
    let mut code = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "error" => return Err(AuthError::Denied(value.into_owned())),
            "code" if !value.is_empty() => code = Some(value.into_owned()),
            _ => {}
        }
    }
    code.map(Some).ok_or(AuthError::MissingCode)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::test_support::serve;

    struct MemoryStore(Mutex<Option<Credentials>>);

    impl TokenStore for MemoryStore {
        fn load(&self) -> Result<Option<Credentials>, AuthError> {
            Ok(self.0.lock().unwrap().clone())
        }

        fn save(&self, credentials: &Credentials) -> Result<(), AuthError> {
            *self.0.lock().unwrap() = Some(credentials.clone());
            Ok(())
        }
    }

    fn credentials(expiry: Option<DateTime<Utc>>) -> Credentials {
        Credentials {
            token: "access".into(),
            refresh_token: Some("refresh".into()),
            token_uri: DEFAULT_TOKEN_URI.into(),
            client_id: "client".into(),
            client_secret: "secret".into(),
            scopes: SCOPES.iter().map(|s| s.to_string()).collect(),
            expiry,
        }
    }

    #[test]
    fn validity_honours_expiry_skew() {
        let now = Utc::now();
        assert!(credentials(None).is_valid(now));
        assert!(credentials(Some(now + TimeDelta::hours(1))).is_valid(now));
        assert!(!credentials(Some(now + TimeDelta::seconds(30))).is_valid(now));
        assert!(!credentials(Some(now - TimeDelta::seconds(1))).is_valid(now));

        let mut empty = credentials(None);
        empty.token.clear();
        assert!(!empty.is_valid(now));
    }

    #[test]
    fn reads_token_files_written_by_other_clients() {
        let json = r#"{
            "token": "ya29.abc",
            "refresh_token": "1//xyz",
            "token_uri": "https://oauth2.googleapis.com/token",
            "client_id": "id.apps.googleusercontent.com",
            "client_secret": "shh",
            "scopes": ["https://www.googleapis.com/auth/drive.readonly"],
            "universe_domain": "googleapis.com",
            "account": "",
            "expiry": "2030-01-02T03:04:05.678901Z"
        }"#;
        let creds: Credentials = serde_json::from_str(json).unwrap();
        assert_eq!(creds.token, "ya29.abc");
        assert_eq!(creds.refresh_token.as_deref(), Some("1//xyz"));
        assert_eq!(creds.expiry.unwrap().to_rfc3339().get(..19), Some("2030-01-02T03:04:05"));
    }

    #[test]
    fn file_store_round_trips_and_reports_missing_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("token.json"));
        assert_eq!(store.load().unwrap(), None);

        let creds = credentials(Some(Utc::now()));
        store.save(&creds).unwrap();
        assert_eq!(store.load().unwrap(), Some(creds));
    }

    #[test]
    fn malformed_token_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        fs::write(&path, "{not json").unwrap();
        let err = FileTokenStore::new(&path).load().unwrap_err();
        assert!(matches!(err, AuthError::Malformed { .. }));
    }

    #[test]
    fn client_secret_prefers_installed_then_web() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");

        fs::write(&path, r#"{"installed": {"client_id": "a", "client_secret": "b"}}"#).unwrap();
        let client = ClientSecret::from_file(&path).unwrap();
        assert_eq!(client.client_id, "a");
        assert_eq!(client.token_uri, DEFAULT_TOKEN_URI);

        fs::write(&path, r#"{"web": {"client_id": "w", "client_secret": "b", "token_uri": "http://t"}}"#)
            .unwrap();
        let client = ClientSecret::from_file(&path).unwrap();
        assert_eq!(client.client_id, "w");
        assert_eq!(client.token_uri, "http://t");

        fs::write(&path, r#"{}"#).unwrap();
        assert!(matches!(ClientSecret::from_file(&path), Err(AuthError::NoClient(_))));
    }

    #[test]
    fn consent_url_requests_offline_readonly_access() {
        let client = ClientSecret {
            client_id: "cid".into(),
            client_secret: "s".into(),
            auth_uri: DEFAULT_AUTH_URI.into(),
            token_uri: DEFAULT_TOKEN_URI.into(),
        };
        let url = consent_url(&client, "http://localhost:8080/").unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("client_id".into(), "cid".into())));
        assert!(pairs.contains(&("access_type".into(), "offline".into())));
        assert!(pairs.contains(&("scope".into(), SCOPES[0].into())));
        assert!(pairs.contains(&("redirect_uri".into(), "http://localhost:8080/".into())));
    }

    #[test]
    fn callback_parsing() {
        assert_eq!(
            parse_callback("GET /?code=4%2F0abc&scope=x HTTP/1.1\r\n").unwrap(),
            Some("4/0abc".to_string())
        );
        assert_eq!(parse_callback("GET /favicon.ico HTTP/1.1\r\n").unwrap(), None);
        assert_eq!(parse_callback("").unwrap(), None);
        assert!(matches!(
            parse_callback("GET /?error=access_denied HTTP/1.1"),
            Err(AuthError::Denied(reason)) if reason == "access_denied"
        ));
        assert!(matches!(parse_callback("GET / HTTP/1.1"), Err(AuthError::MissingCode)));
    }

    #[test]
    fn authorize_returns_valid_stored_credentials_untouched() {
        let creds = credentials(Some(Utc::now() + TimeDelta::hours(1)));
        let store = MemoryStore(Mutex::new(Some(creds.clone())));
        let auth = Authenticator::new(store, "missing.json", 0).unwrap();
        assert_eq!(auth.authorize().unwrap(), creds);
    }

    #[test]
    fn authorize_refreshes_expired_credentials_and_saves_them() {
        let (base, server) = serve(vec![(
            200,
            r#"{"access_token": "fresh", "expires_in": 3599, "token_type": "Bearer"}"#.into(),
        )]);
        let mut creds = credentials(Some(Utc::now() - TimeDelta::minutes(5)));
        creds.token_uri = format!("{base}/token");
        let store = MemoryStore(Mutex::new(Some(creds)));
        let auth = Authenticator::new(store, "missing.json", 0).unwrap();

        let refreshed = auth.authorize().unwrap();

        assert_eq!(refreshed.token, "fresh");
        assert_eq!(refreshed.refresh_token.as_deref(), Some("refresh"));
        assert!(refreshed.is_valid(Utc::now()));
        assert_eq!(auth.store.load().unwrap(), Some(refreshed));
        let requests = server.join().unwrap();
        assert!(requests[0].starts_with("POST /token"));
        assert!(requests[0].contains("grant_type=refresh_token"));
        assert!(requests[0].contains("refresh_token=refresh"));
    }

    #[test]
    fn rejected_refresh_is_fatal() {
        let (base, server) = serve(vec![(400, r#"{"error": "invalid_grant"}"#.into())]);
        let mut creds = credentials(Some(Utc::now() - TimeDelta::minutes(5)));
        creds.token_uri = format!("{base}/token");
        let auth = Authenticator::new(MemoryStore(Mutex::new(Some(creds))), "missing.json", 0).unwrap();

        let err = auth.authorize().unwrap_err();

        assert!(matches!(err, AuthError::Rejected { status: 400, .. }));
        server.join().unwrap();
    }

    #[test]
    fn refresh_without_refresh_token_fails() {
        let mut creds = credentials(None);
        creds.refresh_token = None;
        let auth = Authenticator::new(MemoryStore(Mutex::new(None)), "missing.json", 0).unwrap();
        assert!(matches!(auth.refresh(&creds), Err(AuthError::NoRefreshToken)));
    }
}
