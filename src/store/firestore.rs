//! Firestore REST backend
//!
//! Talks to the Firestore v1 REST API and the Identity Toolkit sign-up
//! endpoint for anonymous sessions. The REST surface has no push channel, so
//! a subscription lists the whole collection on an interval and publishes a
//! snapshot whenever the listing differs from the previous one.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use log::{debug, info, warn};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use super::{AuthProvider, AuthSession, EventStore, RemoteDocument, Snapshot, Subscription};
use crate::error::StoreError;
use crate::model::EventId;

const LIST_PAGE_SIZE: u32 = 300;

/// Refresh this long before the id token's stated expiry
const REFRESH_MARGIN_SECS: i64 = 60;

/// Firestore connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FirestoreConfig {
    pub project_id: String,
    /// Web API key, used for anonymous sign-up and token refresh
    pub api_key: String,
    pub database: String,
    pub base_url: String,
    pub auth_url: String,
    /// Secure Token service that exchanges refresh tokens
    pub token_url: String,
    /// How often a subscription re-lists the collection
    pub poll_interval_ms: u64,
    pub timeout_secs: u64,
}

impl Default for FirestoreConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            api_key: String::new(),
            database: "(default)".to_string(),
            base_url: "https://firestore.googleapis.com/v1".to_string(),
            auth_url: "https://identitytoolkit.googleapis.com/v1".to_string(),
            token_url: "https://securetoken.googleapis.com/v1".to_string(),
            poll_interval_ms: 2000,
            timeout_secs: 30,
        }
    }
}

impl FirestoreConfig {
    fn collection_url(&self, collection: &str) -> String {
        format!(
            "{}/projects/{}/databases/{}/documents/{}",
            self.base_url.trim_end_matches('/'),
            self.project_id,
            self.database,
            collection
        )
    }

    fn sign_up_url(&self) -> String {
        format!(
            "{}/accounts:signUp?key={}",
            self.auth_url.trim_end_matches('/'),
            self.api_key
        )
    }

    fn refresh_url(&self) -> String {
        format!(
            "{}/token?key={}",
            self.token_url.trim_end_matches('/'),
            self.api_key
        )
    }
}

/// Identity Toolkit sign-up response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignUpResponse {
    id_token: String,
    local_id: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<String>,
}

/// Secure Token refresh response (snake_case, unlike Identity Toolkit)
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<String>,
}

/// `expiresIn` is a string holding whole seconds
fn expiry(now: DateTime<Utc>, expires_in: Option<&str>) -> Option<DateTime<Utc>> {
    expires_in
        .and_then(|s| s.parse::<i64>().ok())
        .map(|secs| now + ChronoDuration::seconds(secs))
}

/// A Firestore document resource
#[derive(Debug, Deserialize)]
struct FirestoreDocument {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

/// documents.list response; an empty collection comes back as `{}`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListDocumentsResponse {
    #[serde(default)]
    documents: Vec<FirestoreDocument>,
    #[serde(default)]
    next_page_token: Option<String>,
}

/// Encode a plain JSON value as a Firestore typed value
pub fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => match n.as_i64() {
            Some(i) => json!({ "integerValue": i.to_string() }),
            None => json!({ "doubleValue": n.as_f64().unwrap_or_default() }),
        },
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => json!({
            "arrayValue": { "values": items.iter().map(encode_value).collect::<Vec<_>>() }
        }),
        Value::Object(map) => json!({ "mapValue": { "fields": encode_fields(map) } }),
    }
}

pub fn encode_fields(map: &Map<String, Value>) -> Map<String, Value> {
    map.iter()
        .map(|(k, v)| (k.clone(), encode_value(v)))
        .collect()
}

/// Decode a Firestore typed value into plain JSON
pub fn decode_value(value: &Value) -> Result<Value, StoreError> {
    let (kind, inner) = value
        .as_object()
        .and_then(|o| o.iter().next())
        .ok_or_else(|| StoreError::Decode(format!("not a typed value: {}", value)))?;

    match (kind.as_str(), inner) {
        ("nullValue", _) => Ok(Value::Null),
        ("booleanValue", v) => Ok(v.clone()),
        ("stringValue", v) | ("timestampValue", v) | ("referenceValue", v) => Ok(v.clone()),
        ("doubleValue", v) => Ok(v.clone()),
        ("integerValue", Value::String(s)) => s
            .parse::<i64>()
            .map(|i| Value::Number(i.into()))
            .map_err(|e| StoreError::Decode(format!("bad integerValue {}: {}", s, e))),
        ("integerValue", v) => Ok(v.clone()),
        ("geoPointValue", v) => Ok(v.clone()),
        ("arrayValue", v) => {
            let values = v
                .get("values")
                .and_then(Value::as_array)
                .map(|items| items.iter().map(decode_value).collect::<Result<Vec<_>, _>>())
                .transpose()?
                .unwrap_or_default();
            Ok(Value::Array(values))
        }
        ("mapValue", v) => {
            let fields = v
                .get("fields")
                .and_then(Value::as_object)
                .map(decode_fields)
                .transpose()?
                .unwrap_or_default();
            Ok(Value::Object(fields))
        }
        (kind, _) => Err(StoreError::Decode(format!("unsupported value type {}", kind))),
    }
}

pub fn decode_fields(fields: &Map<String, Value>) -> Result<Map<String, Value>, StoreError> {
    fields
        .iter()
        .map(|(k, v)| decode_value(v).map(|v| (k.clone(), v)))
        .collect()
}

/// Last path segment of a document resource name
fn document_id(name: &str) -> Result<EventId, StoreError> {
    name.rsplit('/')
        .next()
        .filter(|id| !id.is_empty())
        .map(EventId::new)
        .ok_or_else(|| StoreError::Decode(format!("bad document name: {}", name)))
}

impl TryFrom<FirestoreDocument> for RemoteDocument {
    type Error = StoreError;

    fn try_from(doc: FirestoreDocument) -> Result<Self, Self::Error> {
        Ok(RemoteDocument::new(
            document_id(&doc.name)?,
            decode_fields(&doc.fields)?,
        ))
    }
}

fn with_token(request: RequestBuilder, token: Option<&str>) -> RequestBuilder {
    match token {
        Some(token) => request.bearer_auth(token),
        None => request,
    }
}

async fn check_status(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(StoreError::Http {
        status: status.as_u16(),
        body,
    })
}

struct Credentials {
    id_token: String,
    refresh_token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
}

impl Credentials {
    fn is_expiring(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .is_some_and(|at| at - ChronoDuration::seconds(REFRESH_MARGIN_SECS) <= now)
    }
}

/// Shared HTTP state, cloned into polling tasks
#[derive(Clone)]
struct RestClient {
    config: FirestoreConfig,
    collection_url: String,
    client: Client,
    credentials: Arc<RwLock<Option<Credentials>>>,
}

impl RestClient {
    /// Id token to send, refreshed first when it is about to expire
    async fn current_token(&self) -> Result<Option<String>, StoreError> {
        {
            let credentials = self.credentials.read().await;
            match credentials.as_ref() {
                None => return Ok(None),
                Some(creds) if !creds.is_expiring(Utc::now()) => {
                    return Ok(Some(creds.id_token.clone()))
                }
                Some(_) => {}
            }
        }
        self.refresh(None).await
    }

    /// Exchange the refresh token for a new id token. With `rejected` set, a
    /// token other than that one means another request already refreshed.
    async fn refresh(&self, rejected: Option<&str>) -> Result<Option<String>, StoreError> {
        let mut credentials = self.credentials.write().await;
        let Some(creds) = credentials.as_mut() else {
            return Ok(None);
        };
        let refreshed_elsewhere = match rejected {
            Some(token) => creds.id_token != token,
            None => !creds.is_expiring(Utc::now()),
        };
        if refreshed_elsewhere {
            return Ok(Some(creds.id_token.clone()));
        }
        let Some(refresh_token) = creds.refresh_token.clone() else {
            warn!("Firestore session expired and has no refresh token");
            return Err(StoreError::NotAuthenticated);
        };

        let response = self
            .client
            .post(self.config.refresh_url())
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
            ])
            .send()
            .await?;
        let refreshed: RefreshResponse = check_status(response).await?.json().await?;

        creds.id_token = refreshed.id_token;
        creds.refresh_token = Some(refreshed.refresh_token);
        creds.expires_at = expiry(Utc::now(), refreshed.expires_in.as_deref());
        info!("Refreshed Firestore session token");
        Ok(Some(creds.id_token.clone()))
    }

    /// Send an authorized request; a 401 triggers one refresh and one retry
    async fn send<F>(&self, build: F) -> Result<Response, StoreError>
    where
        F: Fn(&Client) -> RequestBuilder + Send,
    {
        let token = self.current_token().await?;
        let response = with_token(build(&self.client), token.as_deref()).send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return check_status(response).await;
        }
        let Some(rejected) = token else {
            return check_status(response).await;
        };

        warn!("Firestore rejected the session token, refreshing");
        let fresh = self.refresh(Some(&rejected)).await?;
        let retry = with_token(build(&self.client), fresh.as_deref()).send().await?;
        check_status(retry).await
    }

    async fn list_page(&self, page_token: Option<&str>) -> Result<ListDocumentsResponse, StoreError> {
        let response = self
            .send(|client| {
                let request = client
                    .get(&self.collection_url)
                    .query(&[("pageSize", LIST_PAGE_SIZE.to_string())]);
                match page_token {
                    Some(token) => request.query(&[("pageToken", token)]),
                    None => request,
                }
            })
            .await?;
        Ok(response.json().await?)
    }

    /// Read the whole collection, following page tokens
    async fn list_all(&self) -> Result<Snapshot, StoreError> {
        let mut documents = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = self.list_page(page_token.as_deref()).await?;
            for doc in page.documents {
                documents.push(RemoteDocument::try_from(doc)?);
            }
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(Snapshot::new(documents))
    }
}

/// Firestore-backed event collection and anonymous auth
pub struct FirestoreStore {
    rest: RestClient,
}

impl FirestoreStore {
    pub fn new(config: FirestoreConfig, collection: &str) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Self::with_client(config, collection, client)
    }

    /// Use a caller-built HTTP client (proxy or TLS settings)
    pub fn with_client(
        config: FirestoreConfig,
        collection: &str,
        client: Client,
    ) -> Result<Self, StoreError> {
        if config.project_id.is_empty() {
            return Err(StoreError::Rejected("Firestore project_id is not set".to_string()));
        }

        Ok(Self {
            rest: RestClient {
                collection_url: config.collection_url(collection),
                config,
                client,
                credentials: Arc::new(RwLock::new(None)),
            },
        })
    }

    pub fn collection_url(&self) -> &str {
        &self.rest.collection_url
    }
}

#[async_trait]
impl EventStore for FirestoreStore {
    fn backend_name(&self) -> &'static str {
        "firestore"
    }

    async fn add(&self, data: Map<String, Value>) -> Result<EventId, StoreError> {
        let body = json!({ "fields": encode_fields(&data) });
        let response = self
            .rest
            .send(|client| client.post(&self.rest.collection_url).json(&body))
            .await?;
        let created: FirestoreDocument = response.json().await?;

        let id = document_id(&created.name)?;
        debug!("Firestore created document {}", id);
        Ok(id)
    }

    async fn delete(&self, id: &EventId) -> Result<(), StoreError> {
        let url = format!("{}/{}", self.rest.collection_url, id);
        self.rest.send(|client| client.delete(&url)).await?;
        Ok(())
    }

    async fn subscribe(&self) -> Result<Subscription, StoreError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let rest = self.rest.clone();
        let interval = Duration::from_millis(rest.config.poll_interval_ms.max(100));

        tokio::spawn(async move {
            let mut last: Option<Snapshot> = None;
            loop {
                match rest.list_all().await {
                    Ok(snapshot) => {
                        if last.as_ref() != Some(&snapshot) {
                            crate::feed_trace!("Firestore listing changed: {} documents", snapshot.len());
                            if tx.send(snapshot.clone()).is_err() {
                                break;
                            }
                            last = Some(snapshot);
                        }
                    }
                    Err(e) => warn!("Failed to list Firestore collection: {}", e),
                }

                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
            debug!("Firestore listing task stopped");
        });

        Ok(Subscription::new(rx, move || cancel.cancel()))
    }
}

#[async_trait]
impl AuthProvider for FirestoreStore {
    async fn sign_in_anonymously(&self) -> Result<AuthSession, StoreError> {
        if self.rest.config.api_key.is_empty() {
            return Err(StoreError::NotAuthenticated);
        }

        let response = self
            .rest
            .client
            .post(self.rest.config.sign_up_url())
            .json(&json!({ "returnSecureToken": true }))
            .send()
            .await?;
        let signed_up: SignUpResponse = check_status(response).await?.json().await?;

        let now = Utc::now();
        let expires_at = expiry(now, signed_up.expires_in.as_deref());

        *self.rest.credentials.write().await = Some(Credentials {
            id_token: signed_up.id_token,
            refresh_token: signed_up.refresh_token,
            expires_at,
        });
        info!("Signed in anonymously as {}", signed_up.local_id);

        Ok(AuthSession {
            uid: signed_up.local_id,
            signed_in_at: now,
            expires_at,
        })
    }
}
