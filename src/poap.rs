//! POAP issuance API client
//!
//! Claiming is a three-step sequence, each step gated on the previous:
//!
//! 1. Exchange client credentials for a bearer access token
//! 2. Request one claim code from the event's pool (bearer + API key)
//! 3. Redeem the code against the recipient address
//!
//! A failure at any step aborts the sequence with a typed [`ClaimError`].
//! There is no retry and no rollback: a code issued but never redeemed is
//! abandoned (codes are single-use and expire upstream). Upstream error
//! bodies are logged here and never surfaced to API callers.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::config::{Config, Secrets};

const POAP_AUTH_URL: &str = "https://auth.accounts.poap.xyz/oauth/token";
const POAP_API_BASE: &str = "https://api.poap.tech";
const POAP_AUDIENCE: &str = "https://api.poap.tech";

/// Claim failure taxonomy. Display strings are the exact messages the
/// claim endpoint returns; none distinguish retryable from terminal
/// causes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClaimError {
    #[error("Failed to authenticate with POAP API")]
    Auth,
    #[error("Failed to generate claim code")]
    CodeRequest,
    #[error("No claim codes available")]
    NoCodesAvailable,
    #[error("Failed to mint POAP")]
    Redeem,
}

/// Public event descriptor from the POAP API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoapEvent {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct QrCodesResponse {
    #[serde(default)]
    qr_codes: Vec<QrCode>,
}

#[derive(Debug, Clone, Deserialize)]
struct QrCode {
    qr_hash: String,
}

/// Pick the single requested code out of the pool response
fn first_code(response: QrCodesResponse) -> Result<String, ClaimError> {
    response
        .qr_codes
        .into_iter()
        .next()
        .map(|code| code.qr_hash)
        .ok_or(ClaimError::NoCodesAvailable)
}

#[derive(Clone)]
pub struct PoapClient {
    client: reqwest::Client,
    api_key: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    secret_code: Option<String>,
    event_id: String,
}

impl PoapClient {
    pub fn new(config: &Config, secrets: &Secrets) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: secrets.poap_api_key.clone(),
            client_id: secrets.poap_client_id.clone(),
            client_secret: secrets.poap_client_secret.clone(),
            secret_code: secrets.poap_secret_code.clone(),
            event_id: config.event_id(),
        }
    }

    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    /// Run the full three-step claim sequence for a recipient address
    pub async fn claim(&self, address: &str) -> Result<(), ClaimError> {
        let token = self.access_token().await?;
        let qr_hash = self.request_claim_code(&token).await?;
        self.redeem(&token, &qr_hash, address).await?;
        info!("POAP minted for event {}", self.event_id);
        Ok(())
    }

    /// Step 1: client-credentials grant
    async fn access_token(&self) -> Result<String, ClaimError> {
        debug!("Requesting POAP access token");

        let response = self
            .client
            .post(POAP_AUTH_URL)
            .json(&serde_json::json!({
                "audience": POAP_AUDIENCE,
                "grant_type": "client_credentials",
                "client_id": self.client_id,
                "client_secret": self.client_secret,
            }))
            .send()
            .await
            .map_err(|e| {
                error!("POAP auth request error: {}", e);
                ClaimError::Auth
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("POAP auth failed ({}): {}", status, body);
            return Err(ClaimError::Auth);
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            error!("Failed to parse POAP token response: {}", e);
            ClaimError::Auth
        })?;

        Ok(token.access_token)
    }

    /// Step 2: request exactly one claim code from the event's pool
    async fn request_claim_code(&self, token: &str) -> Result<String, ClaimError> {
        debug!("Requesting claim code for event {}", self.event_id);

        let url = format!("{}/event/{}/qr-codes", POAP_API_BASE, self.event_id);
        let response = self
            .authed_post(&url, token)
            .json(&serde_json::json!({
                "secret_code": self.secret_code,
                "requested_codes": 1,
            }))
            .send()
            .await
            .map_err(|e| {
                error!("POAP claim code request error: {}", e);
                ClaimError::CodeRequest
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("POAP claim code request failed ({}): {}", status, body);
            return Err(ClaimError::CodeRequest);
        }

        let codes: QrCodesResponse = response.json().await.map_err(|e| {
            error!("Failed to parse claim code response: {}", e);
            ClaimError::CodeRequest
        })?;

        first_code(codes)
    }

    /// Step 3: redeem the code against the recipient address.
    /// The address is case-normalized; its format is not validated here -
    /// malformed addresses are rejected upstream.
    async fn redeem(&self, token: &str, qr_hash: &str, address: &str) -> Result<(), ClaimError> {
        debug!("Redeeming claim code for event {}", self.event_id);

        let url = format!("{}/actions/claim-qr", POAP_API_BASE);
        let response = self
            .authed_post(&url, token)
            .json(&serde_json::json!({
                "address": address.to_lowercase(),
                "qr_hash": qr_hash,
            }))
            .send()
            .await
            .map_err(|e| {
                error!("POAP redeem request error: {}", e);
                ClaimError::Redeem
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("POAP redeem failed ({}): {}", status, body);
            return Err(ClaimError::Redeem);
        }

        Ok(())
    }

    /// Fetch the public event descriptor (name, artwork) for share links
    pub async fn event(&self) -> anyhow::Result<PoapEvent> {
        let url = format!("{}/events/id/{}", POAP_API_BASE, self.event_id);
        let mut req = self.client.get(&url);
        if let Some(key) = &self.api_key {
            req = req.header("X-API-Key", key);
        }

        let response = req.send().await?;
        if !response.status().is_success() {
            anyhow::bail!("POAP event lookup returned {}", response.status());
        }

        Ok(response.json().await?)
    }

    fn authed_post(&self, url: &str, token: &str) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", token));
        if let Some(key) = &self.api_key {
            req = req.header("X-API-Key", key);
        }
        req
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_code_from_pool() {
        let response: QrCodesResponse = serde_json::from_str(
            r#"{"qr_codes": [{"qr_hash": "abc123", "claimed": false}]}"#,
        )
        .unwrap();
        assert_eq!(first_code(response).unwrap(), "abc123");
    }

    #[test]
    fn test_empty_pool_is_no_codes_available() {
        let response: QrCodesResponse = serde_json::from_str(r#"{"qr_codes": []}"#).unwrap();
        assert_eq!(first_code(response), Err(ClaimError::NoCodesAvailable));

        let response: QrCodesResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(first_code(response), Err(ClaimError::NoCodesAvailable));
    }

    #[test]
    fn test_error_messages_are_the_fixed_set() {
        assert_eq!(
            ClaimError::Auth.to_string(),
            "Failed to authenticate with POAP API"
        );
        assert_eq!(
            ClaimError::CodeRequest.to_string(),
            "Failed to generate claim code"
        );
        assert_eq!(
            ClaimError::NoCodesAvailable.to_string(),
            "No claim codes available"
        );
        assert_eq!(ClaimError::Redeem.to_string(), "Failed to mint POAP");
    }

    #[test]
    fn test_parse_event() {
        let json = r#"{
            "id": 12345,
            "name": "Rustconf 2024",
            "description": "Attendee badge",
            "image_url": "https://assets.poap.xyz/badge.png",
            "year": 2024
        }"#;

        let event: PoapEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.id, 12345);
        assert_eq!(event.image_url.as_deref(), Some("https://assets.poap.xyz/badge.png"));
    }
}
