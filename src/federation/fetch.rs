//! Signed remote actor fetch
//!
//! Remote actor documents are fetched with a signed GET so instances
//! running in authorized-fetch mode will answer. The fetch path shares
//! the SSRF guards with signature verification: hosts are validated
//! before any request leaves the process.

use serde_json::Value;

use super::signature::{extract_actor_domain, sign_request, validate_resolved_host_ips};
use crate::error::AppError;
use crate::metrics::FEDERATION_REQUEST_DURATION_SECONDS;

/// The subset of a remote actor document the engine cares about.
#[derive(Debug, Clone)]
pub struct RemoteActor {
    pub id: String,
    pub inbox: String,
    /// Display name, falling back to preferredUsername
    pub name: Option<String>,
    pub public_key_pem: Option<String>,
    /// The full actor document as received
    pub json: Value,
}

impl RemoteActor {
    /// Parse an actor document, requiring `id` and `inbox`.
    pub fn from_json(json: Value) -> Result<Self, AppError> {
        let id = json
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::Federation("Actor document missing id".to_string()))?
            .to_string();

        let inbox = json
            .get("inbox")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::Federation("Actor document missing inbox".to_string()))?
            .to_string();

        let name = json
            .get("name")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .or_else(|| json.get("preferredUsername").and_then(Value::as_str))
            .map(|s| s.to_string());

        let public_key_pem = json
            .get("publicKey")
            .and_then(|k| k.get("publicKeyPem"))
            .and_then(Value::as_str)
            .map(|s| s.to_string());

        Ok(Self {
            id,
            inbox,
            name,
            public_key_pem,
            json,
        })
    }
}

/// Fetcher that signs its GETs with a local event's key.
pub struct SignedFetcher<'a> {
    http_client: &'a reqwest::Client,
    /// Signing identity, `{actor}#main-key`
    key_id: String,
    private_key_pem: &'a str,
}

impl<'a> SignedFetcher<'a> {
    pub fn new(http_client: &'a reqwest::Client, actor_uri: &str, private_key_pem: &'a str) -> Self {
        Self {
            http_client,
            key_id: format!("{}#main-key", actor_uri),
            private_key_pem,
        }
    }

    /// Fetch a remote actor document with a signed GET.
    pub async fn fetch_actor(&self, actor_uri: &str) -> Result<RemoteActor, AppError> {
        let json = self.fetch_document(actor_uri).await?;
        RemoteActor::from_json(json)
    }

    async fn fetch_document(&self, url: &str) -> Result<Value, AppError> {
        guard_remote_url(url).await?;

        let signed = sign_request("GET", url, None, self.private_key_pem, &self.key_id)?;

        let timer = FEDERATION_REQUEST_DURATION_SECONDS
            .with_label_values(&["outbound_fetch"])
            .start_timer();

        let response = self
            .http_client
            .get(url)
            .header("Accept", "application/activity+json")
            .header("Date", &signed.date)
            .header("Signature", &signed.signature)
            .send()
            .await
            .map_err(|e| AppError::Federation(format!("Failed to fetch {}: {}", url, e)))?;

        timer.observe_duration();

        if !response.status().is_success() {
            return Err(AppError::Federation(format!(
                "Failed to fetch {}: HTTP {}",
                url,
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Federation(format!("Failed to parse {}: {}", url, e)))
    }
}

/// Validate a remote URL and its resolved addresses before fetching.
async fn guard_remote_url(url: &str) -> Result<(), AppError> {
    let domain = extract_actor_domain(url)?;
    let parsed = url::Url::parse(url)
        .map_err(|e| AppError::Validation(format!("Invalid remote URL: {}", e)))?;
    let port = parsed
        .port_or_known_default()
        .ok_or_else(|| AppError::Validation("Missing port in remote URL".to_string()))?;

    validate_resolved_host_ips(&domain, port).await
}

/// Fetch the PEM public key a signature keyId points at.
///
/// Used during inbound verification, before any local event identity is
/// known, so the GET is unsigned. Fails when the actor does not
/// advertise exactly the requested key id.
pub async fn fetch_public_key(
    key_id: &str,
    http_client: &reqwest::Client,
) -> Result<String, AppError> {
    let actor_url = key_id.split('#').next().unwrap_or(key_id);
    guard_remote_url(actor_url).await?;

    let timer = FEDERATION_REQUEST_DURATION_SECONDS
        .with_label_values(&["outbound_fetch"])
        .start_timer();

    let response = http_client
        .get(actor_url)
        .header("Accept", "application/activity+json")
        .send()
        .await
        .map_err(|e| AppError::Federation(format!("Failed to fetch actor: {}", e)))?;

    timer.observe_duration();

    if !response.status().is_success() {
        return Err(AppError::Federation(format!(
            "Failed to fetch actor: HTTP {}",
            response.status()
        )));
    }

    let actor: Value = response
        .json()
        .await
        .map_err(|e| AppError::Federation(format!("Failed to parse actor: {}", e)))?;

    let public_key = actor
        .get("publicKey")
        .ok_or_else(|| AppError::Federation("Missing publicKey in actor".to_string()))?;

    if key_id.contains('#') {
        let advertised_key_id = public_key
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::Federation("Missing publicKey.id in actor".to_string()))?;

        if advertised_key_id != key_id {
            return Err(AppError::Validation(
                "Signature keyId does not match actor public key id".to_string(),
            ));
        }
    }

    public_key
        .get("publicKeyPem")
        .and_then(Value::as_str)
        .map(|pem| pem.to_string())
        .ok_or_else(|| AppError::Federation("Missing publicKeyPem in actor".to_string()))
}
