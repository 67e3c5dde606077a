//! Supabase client
//!
//! Talks to the three services of a Supabase project:
//!
//! - GoTrue (`/auth/v1`) for password sign-in and the current user
//! - PostgREST (`/rest/v1`) for the `sites`, `documents` and `resources`
//!   tables and the `insert_document_with_site` function
//! - Storage (`/storage/v1`) for embedded resource objects
//!
//! The session can be persisted to a JSON file so that a sign-in survives
//! between invocations.

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{LookupExt, RemoteStore, SessionService};
use crate::config::RemoteSettings;
use crate::error::{RemoteError, SyncResult};
use crate::models::{DocumentId, ResourceRecord, Revision, Site, User};
use crate::persist;

/// Request timeout in seconds
const REQUEST_TIMEOUT: u64 = 30;

/// Seconds before expiry at which a session counts as expired
const EXPIRY_LEEWAY: i64 = 30;

/// PostgREST error code for "the result contains 0 rows"
const NO_ROWS_CODE: &str = "PGRST116";

/// PostgREST media type asking for a single object instead of an array
const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

/// A signed-in session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Unix timestamp (seconds) at which the access token expires
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: User,
}

impl AuthSession {
    fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|at| at <= Utc::now().timestamp() + EXPIRY_LEEWAY)
    }
}

/// GoTrue token endpoint response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: User,
}

impl From<TokenResponse> for AuthSession {
    fn from(token: TokenResponse) -> Self {
        let expires_at = token
            .expires_at
            .or_else(|| token.expires_in.map(|secs| Utc::now().timestamp() + secs));
        Self {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at,
            user: token.user,
        }
    }
}

#[derive(Debug, Deserialize)]
struct VersionRow {
    version: u64,
}

/// HTTP client for a Supabase project
pub struct SupabaseClient {
    http: reqwest::Client,
    settings: RemoteSettings,
    session: Mutex<Option<AuthSession>>,
    session_path: Option<PathBuf>,
}

impl SupabaseClient {
    /// Create a client with an in-memory session
    pub fn new(settings: RemoteSettings) -> Result<Self, RemoteError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT))
            .user_agent(concat!("vellum/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            settings,
            session: Mutex::new(None),
            session_path: None,
        })
    }

    /// Persist the session at `path`, loading a previous one if present
    pub fn with_session_path(mut self, path: PathBuf) -> SyncResult<Self> {
        let stored: Option<AuthSession> = persist::read_json(&path)?;
        if let Some(ref session) = stored {
            debug!("Loaded session for user {}", session.user.id);
        }
        *self.lock_session() = stored;
        self.session_path = Some(path);
        Ok(self)
    }

    /// The current session, if any
    pub fn session(&self) -> Option<AuthSession> {
        self.lock_session().clone()
    }

    fn lock_session(&self) -> MutexGuard<'_, Option<AuthSession>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn store_session(&self, session: Option<AuthSession>) {
        *self.lock_session() = session.clone();

        let Some(ref path) = self.session_path else {
            return;
        };
        let result = match session {
            Some(ref session) => persist::write_json(path, session),
            None => persist::remove_if_exists(path),
        };
        if let Err(e) = result {
            warn!("Could not persist session: {}", e);
        }
    }

    /// Bearer token: the user's access token, else the anon key
    fn bearer(&self) -> String {
        self.lock_session()
            .as_ref()
            .map(|s| s.access_token.clone())
            .unwrap_or_else(|| self.settings.anon_key.clone())
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.settings.url, path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, self.endpoint(path))
            .header("apikey", &self.settings.anon_key)
            .bearer_auth(self.bearer())
    }

    fn rest(&self, method: reqwest::Method, table: &str) -> RequestBuilder {
        self.request(method, &format!("rest/v1/{}", table))
    }

    /// URL of an object in the configured bucket, one path segment per key part
    fn object_url(&self, key: &str) -> Result<Url, RemoteError> {
        let mut url = Url::parse(&self.endpoint("storage/v1/object"))
            .map_err(|e| RemoteError::InvalidUrl(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| RemoteError::InvalidUrl(self.settings.url.clone()))?
            .pop_if_empty()
            .push(&self.settings.bucket)
            .extend(key.split('/').filter(|part| !part.is_empty()));
        Ok(url)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<AuthSession, RemoteError> {
        debug!("Refreshing expired session");
        let response = send(
            self.http
                .post(self.endpoint("auth/v1/token"))
                .query(&[("grant_type", "refresh_token")])
                .header("apikey", &self.settings.anon_key)
                .json(&json!({ "refresh_token": refresh_token })),
        )
        .await?;
        let token: TokenResponse = decode(response).await?;
        Ok(token.into())
    }
}

impl SessionService for SupabaseClient {
    async fn has_active_session(&self) -> bool {
        let Some(session) = self.session() else {
            return false;
        };
        if !session.is_expired() {
            return true;
        }

        let Some(ref refresh_token) = session.refresh_token else {
            return false;
        };
        match self.refresh(refresh_token).await {
            Ok(refreshed) => {
                self.store_session(Some(refreshed));
                true
            }
            Err(e) => {
                warn!("Session refresh failed: {}", e);
                self.store_session(None);
                false
            }
        }
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<User, RemoteError> {
        debug!("Signing in as {}", email);
        let response = send(
            self.http
                .post(self.endpoint("auth/v1/token"))
                .query(&[("grant_type", "password")])
                .header("apikey", &self.settings.anon_key)
                .json(&json!({ "email": email, "password": password })),
        )
        .await
        .map_err(|e| match e {
            RemoteError::Api { message, .. } => RemoteError::Unauthorized(message),
            other => other,
        })?;

        let token: TokenResponse = decode(response).await?;
        let session = AuthSession::from(token);
        let user = session.user.clone();
        self.store_session(Some(session));
        Ok(user)
    }

    async fn current_user(&self) -> Result<Option<User>, RemoteError> {
        if self.session().is_none() {
            return Ok(None);
        }
        let response = send(self.request(reqwest::Method::GET, "auth/v1/user")).await?;
        let user: User = decode(response).await?;
        Ok(Some(user))
    }

    async fn sign_out(&self) -> Result<(), RemoteError> {
        if self.session().is_some() {
            let result = send(self.request(reqwest::Method::POST, "auth/v1/logout")).await;
            match result {
                Ok(_) | Err(RemoteError::Unauthorized(_)) => {}
                Err(e) => return Err(e),
            }
        }
        self.store_session(None);
        Ok(())
    }
}

impl RemoteStore for SupabaseClient {
    async fn find_site(&self, slug: &str) -> Result<Option<Site>, RemoteError> {
        let request = self
            .rest(reqwest::Method::GET, "sites")
            .query(&[
                ("select", "slug,name,created_by".to_string()),
                ("slug", format!("eq.{}", slug)),
            ])
            .header(ACCEPT, SINGLE_OBJECT);

        let result = match send(request).await {
            Ok(response) => decode::<Site>(response).await,
            Err(e) => Err(e),
        };
        result.found()
    }

    async fn create_site(&self, slug: &str, owner: &User) -> Result<Site, RemoteError> {
        let response = send(
            self.rest(reqwest::Method::POST, "sites")
                .header("Prefer", "return=representation")
                .header(ACCEPT, SINGLE_OBJECT)
                .json(&json!({
                    "slug": slug,
                    "name": slug,
                    "created_by": owner.id,
                })),
        )
        .await?;
        decode(response).await
    }

    async fn insert_revision(
        &self,
        revision: &Revision,
        site: &str,
        author: &User,
    ) -> Result<(), RemoteError> {
        send(
            self.rest(reqwest::Method::POST, "rpc/insert_document_with_site")
                .json(&json!({
                    "p_document": revision,
                    "p_site_slug": site,
                    "p_user_id": author.id,
                })),
        )
        .await?;
        Ok(())
    }

    async fn mark_removed(&self, identity: &DocumentId) -> Result<(), RemoteError> {
        let id_filter = format!("eq.{}", identity);
        let response = send(self.rest(reqwest::Method::GET, "documents").query(&[
            ("select", "version".to_string()),
            ("id", id_filter.clone()),
            ("order", "version.desc".to_string()),
            ("limit", "1".to_string()),
        ]))
        .await?;
        let rows: Vec<VersionRow> = decode(response).await?;
        let latest = rows.first().ok_or(RemoteError::NotFound)?;

        send(
            self.rest(reqwest::Method::PATCH, "documents")
                .query(&[
                    ("id", id_filter),
                    ("version", format!("eq.{}", latest.version)),
                ])
                .header("Prefer", "return=minimal")
                .json(&json!({ "state": "removed" })),
        )
        .await?;
        Ok(())
    }

    async fn find_resource(&self, path_hash: &str) -> Result<Option<ResourceRecord>, RemoteError> {
        let response = send(self.rest(reqwest::Method::GET, "resources").query(&[
            ("select", "path_hash,path,name,last_modified".to_string()),
            ("path_hash", format!("eq.{}", path_hash)),
            ("limit", "1".to_string()),
        ]))
        .await?;
        let rows: Vec<ResourceRecord> = decode(response).await?;
        Ok(rows.into_iter().next())
    }

    async fn upsert_resource(&self, record: &ResourceRecord) -> Result<(), RemoteError> {
        send(
            self.rest(reqwest::Method::POST, "resources")
                .query(&[("on_conflict", "path_hash")])
                .header("Prefer", "resolution=merge-duplicates,return=minimal")
                .json(record),
        )
        .await?;
        Ok(())
    }

    async fn upload_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), RemoteError> {
        let url = self.object_url(key)?;
        debug!("Uploading {} bytes to {}", bytes.len(), url);
        send(
            self.http
                .post(url)
                .header("apikey", &self.settings.anon_key)
                .bearer_auth(self.bearer())
                .header("x-upsert", "true")
                .header(CONTENT_TYPE, content_type)
                .body(bytes),
        )
        .await?;
        Ok(())
    }
}

/// Send a request, turning error statuses into `RemoteError`
async fn send(request: RequestBuilder) -> Result<Response, RemoteError> {
    let response = request.send().await?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(parse_error(status, &body))
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, RemoteError> {
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| RemoteError::Decode(e.to_string()))
}

/// Classify an error response from any of the Supabase services
///
/// PostgREST answers `{code, message, details, hint}`, GoTrue answers
/// `{error, error_description}` or `{code, msg}`, Storage answers
/// `{statusCode, error, message}`.
fn parse_error(status: StatusCode, body: &str) -> RemoteError {
    let payload: Value = serde_json::from_str(body).unwrap_or(Value::Null);

    let code = ["code", "error_code"]
        .iter()
        .find_map(|key| match payload.get(key) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        });

    let message = ["message", "msg", "error_description", "error"]
        .iter()
        .find_map(|key| payload.get(key).and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| {
            let text = body.trim();
            if text.is_empty() {
                status.to_string()
            } else {
                text.to_string()
            }
        });

    if code.as_deref() == Some(NO_ROWS_CODE) {
        return RemoteError::NotFound;
    }
    if status == StatusCode::UNAUTHORIZED {
        return RemoteError::Unauthorized(message);
    }
    RemoteError::Api {
        status: status.as_u16(),
        code,
        message,
    }
}
