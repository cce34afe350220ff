//! POAP Claim Gate Server
//!
//! HTTP endpoints for the mini-app: eligibility verification, claim
//! submission, claim status, image download, and the share-link payload.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::config::Config;
use crate::gate::{ClaimGate, GateError, GateState};
use crate::poap::PoapClient;
use crate::share;
use crate::twitter::TwitterUser;

pub struct AppState {
    pub gate: ClaimGate,
    pub poap: PoapClient,
    pub config: Config,
    pub http: reqwest::Client,
    pub started_at: std::time::Instant,
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/config", get(config_handler))
        .route("/verify", post(verify_handler))
        .route("/claim", post(claim_handler))
        .route("/claim-status", post(claim_status_handler))
        .route("/download-image", post(download_image_handler))
        .route("/metadata", get(metadata_handler))
        .route("/event-link", get(event_link_handler).post(custom_event_link_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}

// ============================================================================
// GET /health
// ============================================================================

#[derive(Debug, Serialize)]
struct HealthResponse {
    healthy: bool,
    uptime_secs: u64,
    version: String,
    event_id: String,
    cache_enabled: bool,
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        healthy: true,
        uptime_secs: state.started_at.elapsed().as_secs(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        event_id: state.poap.event_id().to_string(),
        cache_enabled: state.gate.store_enabled(),
    })
}

// ============================================================================
// GET /config - public client configuration for the hosting page
// ============================================================================

async fn config_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    // Tweet lookup backs the retweet step's display; null when no tweet
    // gate is configured or the lookup fails
    let tweet = state.gate.tweet_context().await;

    Json(json!({
        "appUrl": state.config.public_url(),
        "eventId": state.poap.event_id(),
        "followUsername": state.gate.follow_username(),
        "tweetId": state.gate.tweet_id(),
        "tweet": tweet,
        "walletconnectProjectId": state.config.walletconnect_project_id(),
    }))
}

// ============================================================================
// POST /verify - eligibility recheck
// ============================================================================

#[derive(Debug, Deserialize)]
struct VerifyRequest {
    #[serde(default)]
    username: String,
}

#[derive(Debug, Serialize)]
struct VerifyResponse {
    user: Option<TwitterUser>,
    status: GateState,
}

async fn verify_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<VerifyRequest>,
) -> Response {
    let username = request.username.trim();
    if username.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Username is required");
    }

    let (user, status) = state.gate.verify(username).await;
    (StatusCode::OK, Json(VerifyResponse { user, status })).into_response()
}

// ============================================================================
// POST /claim
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClaimRequest {
    #[serde(default)]
    address: String,
    #[serde(default)]
    user_id: String,
    #[serde(default)]
    username: String,
}

#[derive(Debug, Serialize)]
struct ClaimResponse {
    success: bool,
    message: String,
}

async fn claim_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ClaimRequest>,
) -> Response {
    // Input validation happens before any outbound call
    if request.address.trim().is_empty() || request.user_id.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Address and user ID are required");
    }

    match state
        .gate
        .submit_claim(&request.address, &request.user_id, &request.username)
        .await
    {
        Ok(()) => (
            StatusCode::OK,
            Json(ClaimResponse {
                success: true,
                message: "POAP claimed successfully".to_string(),
            }),
        )
            .into_response(),
        Err(e @ GateError::AlreadyClaimed) => {
            error_response(StatusCode::BAD_REQUEST, &e.to_string())
        }
        Err(GateError::Claim(e)) => {
            // Upstream detail is already logged by the issuance client
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
    }
}

// ============================================================================
// POST /claim-status
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClaimStatusRequest {
    #[serde(default)]
    user_id: String,
}

#[derive(Debug, Serialize)]
struct ClaimStatusResponse {
    claimed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    address: Option<String>,
}

async fn claim_status_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ClaimStatusRequest>,
) -> Response {
    if request.user_id.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "User ID is required");
    }

    let response = match state.gate.status(&request.user_id).await {
        Some(record) => ClaimStatusResponse {
            claimed: true,
            address: Some(record.address),
        },
        None => ClaimStatusResponse {
            claimed: false,
            address: None,
        },
    };

    (StatusCode::OK, Json(response)).into_response()
}

// ============================================================================
// POST /download-image - proxy the badge artwork as an attachment
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DownloadImageRequest {
    #[serde(default)]
    image_url: String,
    #[serde(default)]
    file_name: String,
}

async fn download_image_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DownloadImageRequest>,
) -> Response {
    if request.image_url.trim().is_empty() || request.file_name.trim().is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Image URL and file name are required",
        );
    }

    let response = match state.http.get(&request.image_url).send().await {
        Ok(r) => r,
        Err(e) => {
            error!("Image fetch failed for {}: {}", request.image_url, e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch image");
        }
    };

    if !response.status().is_success() {
        error!(
            "Image fetch for {} returned {}",
            request.image_url,
            response.status()
        );
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch image");
    }

    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("image/png")
        .to_string();

    let bytes = match response.bytes().await {
        Ok(b) => b,
        Err(e) => {
            error!("Image body read failed for {}: {}", request.image_url, e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch image");
        }
    };

    (
        [
            (header::CONTENT_TYPE, content_type),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", request.file_name),
            ),
        ],
        bytes,
    )
        .into_response()
}

// ============================================================================
// GET /metadata - mini-app descriptor for the hosting platform
// ============================================================================

async fn metadata_handler(State(state): State<Arc<AppState>>) -> Response {
    // Prefer the live event name and artwork; fall back to configured
    // defaults so the descriptor stays servable without POAP access.
    let event = state.poap.event().await.ok();
    let name = event
        .as_ref()
        .map(|e| e.name.clone())
        .unwrap_or_else(|| state.config.event.name.clone());
    let icon = event.and_then(|e| e.image_url);

    let metadata = share::mint_metadata(&state.config.public_url(), &name, icon);
    (StatusCode::OK, Json(metadata)).into_response()
}

// ============================================================================
// GET/POST /event-link - shareable deep link for the mini-app
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EventLinkResponse {
    success: bool,
    share_link: String,
    direct_link: String,
    metadata: share::MiniAppMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    instructions: Option<serde_json::Value>,
}

async fn event_link_handler(State(state): State<Arc<AppState>>) -> Response {
    let event = match state.poap.event().await {
        Ok(event) => event,
        Err(e) => {
            error!("Event lookup for share link failed: {}", e);
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to generate share link",
            );
        }
    };

    let app_url = state.config.public_url();
    let metadata = share::mint_metadata(&app_url, &event.name, event.image_url);
    build_event_link_response(&app_url, metadata, true)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CustomEventLinkRequest {
    #[serde(default)]
    event_name: Option<String>,
    #[serde(default)]
    image_url: Option<String>,
}

async fn custom_event_link_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CustomEventLinkRequest>,
) -> Response {
    let app_url = state.config.public_url();
    let name = request
        .event_name
        .unwrap_or_else(|| state.config.event.name.clone());
    let metadata = share::mint_metadata(&app_url, &name, request.image_url);
    build_event_link_response(&app_url, metadata, false)
}

fn build_event_link_response(
    app_url: &str,
    metadata: share::MiniAppMetadata,
    with_instructions: bool,
) -> Response {
    let share_link = match share::build_share_link(app_url, &metadata) {
        Ok(link) => link,
        Err(e) => {
            error!("Share link encoding failed: {}", e);
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to generate share link",
            );
        }
    };

    let instructions = with_instructions.then(|| {
        json!({
            "withExtension": "Users with the host extension see the mini-app embedded in the tweet",
            "withoutExtension": "Users without the extension are redirected to the app"
        })
    });

    (
        StatusCode::OK,
        Json(EventLinkResponse {
            success: true,
            share_link,
            direct_link: app_url.to_string(),
            metadata,
            instructions,
        }),
    )
        .into_response()
}

/// Run the server
pub async fn run_server(
    host: &str,
    port: u16,
    state: Arc<AppState>,
) -> anyhow::Result<()> {
    let app = create_router(state);
    let addr = format!("{}:{}", host, port);

    info!("Starting POAP claim gate server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Secrets;
    use crate::store::{ClaimRecord, ClaimStore};
    use crate::twitter::TwitterClient;
    use chrono::Utc;

    fn test_state(store: ClaimStore) -> Arc<AppState> {
        let config = Config::default();
        let secrets = Secrets::default();
        let poap = PoapClient::new(&config, &secrets);
        let gate = ClaimGate::new(
            TwitterClient::new(None),
            poap.clone(),
            store,
            "poapxyz".to_string(),
            None,
        );
        Arc::new(AppState {
            gate,
            poap,
            config,
            http: reqwest::Client::new(),
            started_at: std::time::Instant::now(),
        })
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_claim_rejects_missing_fields() {
        // Rejection happens before any outbound call is attempted
        let state = test_state(ClaimStore::in_memory());

        for (address, user_id) in [("", "u1"), ("0xABC", ""), ("  ", "u1")] {
            let request = ClaimRequest {
                address: address.to_string(),
                user_id: user_id.to_string(),
                username: "alice".to_string(),
            };
            let response = claim_handler(State(state.clone()), Json(request)).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);

            let body = body_json(response).await;
            assert_eq!(body["error"], "Address and user ID are required");
        }
    }

    #[tokio::test]
    async fn test_claim_rejects_duplicate() {
        let store = ClaimStore::in_memory();
        let config = Config::default();
        store
            .record_claim(
                &config.event_id(),
                "u1",
                &ClaimRecord {
                    address: "0xABC".to_string(),
                    username: "alice".to_string(),
                    claimed_at: Utc::now(),
                },
            )
            .await;

        let state = test_state(store);
        let request = ClaimRequest {
            address: "0xDEF".to_string(),
            user_id: "u1".to_string(),
            username: "alice".to_string(),
        };
        let response = claim_handler(State(state), Json(request)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body["error"], "You have already claimed this POAP");
    }

    #[tokio::test]
    async fn test_claim_status_requires_user_id() {
        let state = test_state(ClaimStore::in_memory());
        let request = ClaimStatusRequest {
            user_id: String::new(),
        };
        let response = claim_status_handler(State(state), Json(request)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_claim_status_reports_recorded_address() {
        let store = ClaimStore::in_memory();
        let config = Config::default();
        store
            .record_claim(
                &config.event_id(),
                "u1",
                &ClaimRecord {
                    address: "0xAbC123".to_string(),
                    username: "alice".to_string(),
                    claimed_at: Utc::now(),
                },
            )
            .await;

        let state = test_state(store);
        let request = ClaimStatusRequest {
            user_id: "u1".to_string(),
        };
        let response = claim_status_handler(State(state), Json(request)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["claimed"], true);
        assert_eq!(body["address"], "0xAbC123");
    }

    #[tokio::test]
    async fn test_claim_status_with_disabled_store() {
        // Without a cache the endpoint always reports unclaimed and
        // omits the address field entirely
        let state = test_state(ClaimStore::disabled());
        let request = ClaimStatusRequest {
            user_id: "u1".to_string(),
        };
        let response = claim_status_handler(State(state), Json(request)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["claimed"], false);
        assert!(body.get("address").is_none());
    }

    #[tokio::test]
    async fn test_verify_requires_username() {
        let state = test_state(ClaimStore::in_memory());
        let request = VerifyRequest {
            username: "  ".to_string(),
        };
        let response = verify_handler(State(state), Json(request)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_download_image_requires_fields() {
        let state = test_state(ClaimStore::in_memory());
        let request = DownloadImageRequest {
            image_url: String::new(),
            file_name: "badge.png".to_string(),
        };
        let response = download_image_handler(State(state), Json(request)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body["error"], "Image URL and file name are required");
    }

    #[tokio::test]
    async fn test_custom_event_link_uses_overrides() {
        let state = test_state(ClaimStore::in_memory());
        let request = CustomEventLinkRequest {
            event_name: Some("Rustconf 2024".to_string()),
            image_url: Some("https://assets.poap.xyz/badge.png".to_string()),
        };
        let response = custom_event_link_handler(State(state), Json(request)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["metadata"]["title"], "Mint Rustconf 2024");
        assert_eq!(body["metadata"]["icon"], "https://assets.poap.xyz/badge.png");
        assert!(body["shareLink"]
            .as_str()
            .unwrap()
            .starts_with("https://sherry.social/link?app="));
        // POST variant carries no instructions block
        assert!(body.get("instructions").is_none());
    }
}

