//! AnkiConnect protocol client.
//!
//! AnkiConnect exposes a running Anki instance over local HTTP. Every call is a
//! POST of `{action, version, params}` answered by `{result, error}`.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use decksync_common::{ContainerPath, EntryId, Error, Result};

use crate::query::{container_filter, EntryQuery};
use crate::store::{CreateOutcome, NoteFields, NoteStore};

/// Default AnkiConnect endpoint.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:8765";

/// Protocol version sent with every request.
pub const PROTOCOL_VERSION: u32 = 6;

/// Note type used for created entries unless configured otherwise.
pub const DEFAULT_NOTE_MODEL: &str = "Basic";

/// Configuration for the AnkiConnect client.
#[derive(Debug, Clone)]
pub struct AnkiConnectConfig {
    /// Endpoint URL.
    pub endpoint: String,
    /// Bound on every request/response exchange.
    pub timeout: Duration,
    /// Note type used by `addNote`.
    pub note_model: String,
}

impl Default for AnkiConnectConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout: Duration::from_secs(15),
            note_model: DEFAULT_NOTE_MODEL.to_string(),
        }
    }
}

impl AnkiConnectConfig {
    /// Configuration for an endpoint with default timeout and note type.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the note type used for created entries.
    pub fn with_note_model(mut self, model: impl Into<String>) -> Self {
        self.note_model = model.into();
        self
    }
}

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    action: &'a str,
    version: u32,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<String>,
}

/// AnkiConnect-backed note store.
pub struct AnkiConnectStore {
    http: Client,
    endpoint: String,
    note_model: String,
}

impl AnkiConnectStore {
    /// Create a new client.
    ///
    /// # Errors
    /// - HTTP client cannot be built
    pub fn new(config: AnkiConnectConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("decksync/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Config(format!("HTTP client build failed: {}", e)))?;

        Ok(Self {
            http,
            endpoint: config.endpoint,
            note_model: config.note_model,
        })
    }

    /// Endpoint this client talks to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Invoke an action and decode its result.
    async fn invoke<T: DeserializeOwned>(&self, action: &str, params: Value) -> Result<T> {
        let response = self.exchange(action, params).await?;

        if let Some(message) = response.error.filter(|e| !e.is_empty()) {
            return Err(Error::store(action, message));
        }

        serde_json::from_value(response.result)
            .map_err(|e| Error::store(action, format!("Unexpected result: {}", e)))
    }

    /// One request/response exchange, without interpreting the result.
    async fn exchange(&self, action: &str, params: Value) -> Result<ApiResponse> {
        debug!("AnkiConnect request: {}", action);

        let request = ApiRequest {
            action,
            version: PROTOCOL_VERSION,
            params,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(action, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::StoreUnavailable(format!(
                "{} returned HTTP {}",
                action, status
            )));
        }

        response.json::<ApiResponse>().await.map_err(|e| {
            if e.is_decode() {
                Error::store(action, format!("Malformed response: {}", e))
            } else {
                transport_error(action, e)
            }
        })
    }
}

/// Classify a reqwest failure as a transport problem.
fn transport_error(action: &str, err: reqwest::Error) -> Error {
    let kind = if err.is_timeout() {
        "timed out"
    } else if err.is_connect() {
        "could not connect"
    } else {
        "request failed"
    };
    Error::StoreUnavailable(format!("{} {}: {}", action, kind, err))
}

/// Whether an `addNote` error text is the store's duplicate rejection.
fn is_duplicate_rejection(message: &str) -> bool {
    message.to_lowercase().contains("duplicate")
}

#[async_trait]
impl NoteStore for AnkiConnectStore {
    fn name(&self) -> &str {
        "ankiconnect"
    }

    async fn version(&self) -> Result<u32> {
        self.invoke("version", json!({})).await
    }

    async fn ensure_container(&self, path: &ContainerPath) -> Result<()> {
        // createDeck answers with the existing id when the deck is already there.
        let _: Value = self
            .invoke("createDeck", json!({ "deck": path.to_string() }))
            .await?;
        Ok(())
    }

    async fn container_has_entries(&self, path: &ContainerPath) -> Result<bool> {
        let ids: Vec<u64> = self
            .invoke("findNotes", json!({ "query": container_filter(path) }))
            .await?;
        Ok(!ids.is_empty())
    }

    async fn find_entries(&self, query: &EntryQuery) -> Result<Vec<EntryId>> {
        let ids: Vec<u64> = self
            .invoke("findNotes", json!({ "query": query.to_search() }))
            .await?;
        Ok(ids.into_iter().map(EntryId).collect())
    }

    async fn create_entry(
        &self,
        container: &ContainerPath,
        fields: &NoteFields,
        tags: &[String],
    ) -> Result<CreateOutcome> {
        let deck = container.to_string();
        let note = json!({
            "deckName": deck,
            "modelName": self.note_model,
            "fields": fields,
            "tags": tags,
            "options": {
                "allowDuplicate": false,
                "duplicateScope": "deck",
                "duplicateScopeOptions": {
                    "deckName": deck,
                    "checkChildren": false
                }
            }
        });

        match self.invoke::<Option<u64>>("addNote", json!({ "note": note })).await {
            Ok(Some(id)) => Ok(CreateOutcome::Created(EntryId(id))),
            Ok(None) => Err(Error::store("addNote", "No note id returned")),
            Err(Error::Store { message, .. }) if is_duplicate_rejection(&message) => {
                debug!("Store rejected duplicate in {}: {}", deck, message);
                Ok(CreateOutcome::DuplicateRejected)
            }
            Err(e) => Err(e),
        }
    }

    async fn update_entry(&self, id: EntryId, fields: &NoteFields) -> Result<()> {
        let _: Value = self
            .invoke(
                "updateNoteFields",
                json!({ "note": { "id": id.0, "fields": fields } }),
            )
            .await?;
        Ok(())
    }

    async fn store_media(&self, filename: &str, data: &[u8]) -> Result<String> {
        let stored: Option<String> = self
            .invoke(
                "storeMediaFile",
                json!({ "filename": filename, "data": BASE64.encode(data) }),
            )
            .await?;
        // Older AnkiConnect builds answer null and keep the requested name.
        Ok(stored.unwrap_or_else(|| filename.to_string()))
    }

    async fn find_media(&self, pattern: &str) -> Result<Vec<String>> {
        self.invoke("getMediaFilesNames", json!({ "pattern": pattern }))
            .await
    }

    async fn container_names(&self) -> Result<Vec<String>> {
        self.invoke("deckNames", json!({})).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn store_for(url: String) -> AnkiConnectStore {
        AnkiConnectStore::new(
            AnkiConnectConfig::new(url).with_timeout(Duration::from_secs(2)),
        )
        .unwrap()
    }

    fn deck(path: &str) -> ContainerPath {
        ContainerPath::parse(path).unwrap()
    }

    #[tokio::test]
    async fn test_find_entries_sends_rendered_query() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/")
            .match_body(Matcher::PartialJson(json!({
                "action": "findNotes",
                "version": 6,
                "params": { "query": "deck:\"French::IPA\" \"Front:<big>a</big>\"" }
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"result": [1496198395707, 42], "error": null}"#)
            .create_async()
            .await;

        let store = store_for(server.url());
        let ids = store
            .find_entries(&EntryQuery::exact(deck("French::IPA"), "<big>a</big>"))
            .await
            .unwrap();
        assert_eq!(ids, vec![EntryId(1496198395707), EntryId(42)]);
    }

    #[tokio::test]
    async fn test_container_has_entries() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/")
            .match_body(Matcher::PartialJson(json!({
                "action": "findNotes",
                "params": { "query": "deck:\"German::IPA\"" }
            })))
            .with_status(200)
            .with_body(r#"{"result": [], "error": null}"#)
            .create_async()
            .await;

        let store = store_for(server.url());
        assert!(!store.container_has_entries(&deck("German::IPA")).await.unwrap());
    }

    #[tokio::test]
    async fn test_protocol_error_is_store_error() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/")
            .with_status(200)
            .with_body(r#"{"result": null, "error": "model was not found: Basic"}"#)
            .create_async()
            .await;

        let store = store_for(server.url());
        let err = store
            .create_entry(&deck("French::IPA"), &NoteFields::new("a", "b"), &[])
            .await
            .unwrap_err();
        match err {
            Error::Store { action, message } => {
                assert_eq!(action, "addNote");
                assert!(message.contains("model was not found"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_duplicate_rejection_is_not_an_error() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/")
            .match_body(Matcher::PartialJson(json!({
                "action": "addNote",
                "params": { "note": {
                    "deckName": "Spanish::IPA",
                    "modelName": "Basic",
                    "fields": { "Front": "a", "Back": "b" },
                    "tags": ["spanish", "ipa"],
                    "options": { "allowDuplicate": false, "duplicateScope": "deck" }
                }}
            })))
            .with_status(200)
            .with_body(r#"{"result": null, "error": "cannot create note because it is a duplicate"}"#)
            .create_async()
            .await;

        let store = store_for(server.url());
        let outcome = store
            .create_entry(
                &deck("Spanish::IPA"),
                &NoteFields::new("a", "b"),
                &["spanish".to_string(), "ipa".to_string()],
            )
            .await
            .unwrap();
        assert_eq!(outcome, CreateOutcome::DuplicateRejected);
    }

    #[tokio::test]
    async fn test_configured_note_model_is_sent() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/")
            .match_body(Matcher::PartialJson(json!({
                "action": "addNote",
                "params": { "note": { "modelName": "Basic (and reversed card)" } }
            })))
            .with_status(200)
            .with_body(r#"{"result": 7, "error": null}"#)
            .create_async()
            .await;

        let config = AnkiConnectConfig::new(server.url()).with_note_model("Basic (and reversed card)");
        let store = AnkiConnectStore::new(config).unwrap();
        let outcome = store
            .create_entry(&deck("French::IPA"), &NoteFields::new("a", "b"), &[])
            .await
            .unwrap();
        assert_eq!(outcome, CreateOutcome::Created(EntryId(7)));
    }

    #[tokio::test]
    async fn test_create_returns_entry_id() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/")
            .with_status(200)
            .with_body(r#"{"result": 1700000000001, "error": null}"#)
            .create_async()
            .await;

        let store = store_for(server.url());
        let outcome = store
            .create_entry(&deck("Russian::IPA"), &NoteFields::new("a", "b"), &[])
            .await
            .unwrap();
        assert_eq!(outcome, CreateOutcome::Created(EntryId(1700000000001)));
    }

    #[tokio::test]
    async fn test_store_media_encodes_and_returns_stored_name() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/")
            .match_body(Matcher::PartialJson(json!({
                "action": "storeMediaFile",
                "params": { "filename": "fr_chat.mp3", "data": "AQID" }
            })))
            .with_status(200)
            .with_body(r#"{"result": "fr_chat-1.mp3", "error": null}"#)
            .create_async()
            .await;

        let store = store_for(server.url());
        let stored = store.store_media("fr_chat.mp3", &[1, 2, 3]).await.unwrap();
        assert_eq!(stored, "fr_chat-1.mp3");
    }

    #[tokio::test]
    async fn test_update_accepts_null_result() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/")
            .match_body(Matcher::PartialJson(json!({
                "action": "updateNoteFields",
                "params": { "note": { "id": 7, "fields": { "Front": "x", "Back": "y" } } }
            })))
            .with_status(200)
            .with_body(r#"{"result": null, "error": null}"#)
            .create_async()
            .await;

        let store = store_for(server.url());
        store
            .update_entry(EntryId(7), &NoteFields::new("x", "y"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_http_failure_is_unavailable() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/")
            .with_status(503)
            .create_async()
            .await;

        let store = store_for(server.url());
        let err = store.version().await.unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_connection_refused_is_unavailable() {
        // Port 9 (discard) is not served in the test environment.
        let store = store_for("http://127.0.0.1:9".to_string());
        let err = store.ensure_container(&deck("French::IPA")).await.unwrap_err();
        assert!(err.is_transport(), "unexpected error: {err:?}");
    }

    #[tokio::test]
    async fn test_malformed_body_is_store_error() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/")
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let store = store_for(server.url());
        let err = store.container_names().await.unwrap_err();
        assert!(matches!(err, Error::Store { .. }));
    }
}
