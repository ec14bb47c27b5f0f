//! HTTP API handlers.

use crate::state::SharedState;
use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use pricewatch_alerts::PushSubscription;
use pricewatch_core::{FixedPoint, PriceAlert, TrackedItem};
use pricewatch_tracker::{CheckError, RegistryError};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Body of `POST /api/check-price`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckPriceRequest {
    pub url: String,
    pub target_price: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckPriceResponse {
    pub success: bool,
    pub message: String,
    pub current_price: f64,
    pub target_price: f64,
    pub is_below_target: bool,
    pub price_string: String,
}

/// Body of `POST /api/track-price`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackPriceRequest {
    pub url: String,
    pub target_price: f64,
    pub id: String,
    /// Browser push subscription notified when the target is reached.
    #[serde(default)]
    pub subscription: Option<PushSubscription>,
}

/// Body of `POST /api/untrack-price`.
#[derive(Debug, Clone, Deserialize)]
pub struct UntrackPriceRequest {
    pub id: String,
}

/// Generic success/failure reply.
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl ApiResponse {
    fn ok(message: &str) -> Self {
        Self {
            success: true,
            message: message.to_string(),
            id: None,
        }
    }

    fn failure(message: String) -> Self {
        Self {
            success: false,
            message,
            id: None,
        }
    }
}

/// Tracked item as listed to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedItemView {
    pub id: String,
    pub url: String,
    pub target_price: f64,
    /// Absent until the first successful check.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    pub created_at: String,
}

impl From<&TrackedItem> for TrackedItemView {
    fn from(item: &TrackedItem) -> Self {
        Self {
            id: item.id.clone(),
            url: item.url.clone(),
            target_price: item.target_price.to_f64(),
            last_price: (!item.is_unobserved()).then(|| item.last_price.to_f64()),
            selector: item.selector.as_ref().map(|s| s.to_string()),
            created_at: item.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackedItemsResponse {
    pub success: bool,
    pub items: Vec<TrackedItemView>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub tracked_items: usize,
    pub subscribers: usize,
}

/// Non-finite and non-positive targets become zero, which validation rejects.
fn target_from_f64(value: f64) -> FixedPoint {
    if value.is_finite() && value > 0.0 {
        FixedPoint::from_f64(value)
    } else {
        FixedPoint::ZERO
    }
}

/// `POST /api/check-price`: one-shot check, no tracking.
pub async fn check_price(
    State(state): State<SharedState>,
    Json(req): Json<CheckPriceRequest>,
) -> (StatusCode, Json<CheckPriceResponse>) {
    let target = target_from_f64(req.target_price);

    let check = match state.checker.check_once(&req.url, target).await {
        Ok(check) => check,
        Err(CheckError::InvalidInput(reason)) => {
            let response = CheckPriceResponse {
                message: format!("Invalid URL or target price: {}", reason),
                ..Default::default()
            };
            return (StatusCode::BAD_REQUEST, Json(response));
        }
        Err(CheckError::Scrape(e)) => {
            warn!(url = %req.url, error = %e, "Price check failed");
            let response = CheckPriceResponse {
                message: format!("Unable to fetch price: {}", e),
                ..Default::default()
            };
            return (StatusCode::OK, Json(response));
        }
    };

    if check.is_below_target {
        let now = Utc::now();
        let alert = PriceAlert {
            item_id: format!("check-{}", now.timestamp()),
            url: req.url.clone(),
            current_price: check.current_price,
            target_price: check.target_price,
            display_price: check.price_string.clone(),
            timestamp: now,
        };
        state.broadcaster.publish(&alert);
    }

    let response = CheckPriceResponse {
        success: true,
        message: "Price check successful".to_string(),
        current_price: check.current_price.to_f64(),
        target_price: check.target_price.to_f64(),
        is_below_target: check.is_below_target,
        price_string: check.price_string,
    };
    (StatusCode::OK, Json(response))
}

/// `POST /api/track-price`
pub async fn track_price(
    State(state): State<SharedState>,
    Json(req): Json<TrackPriceRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    let target = target_from_f64(req.target_price);

    match state.registry.track(&req.id, &req.url, target) {
        Ok(()) => {
            if let Some(subscription) = req.subscription {
                info!(item = %req.id, endpoint = %subscription.endpoint, "Push subscription bound");
                state.push.bind(&req.id, subscription);
            }
            let mut response = ApiResponse::ok("Price tracking started");
            response.id = Some(req.id);
            (StatusCode::OK, Json(response))
        }
        Err(e @ RegistryError::Duplicate(_)) => {
            (StatusCode::CONFLICT, Json(ApiResponse::failure(e.to_string())))
        }
        Err(e @ RegistryError::InvalidInput(_)) => {
            (StatusCode::BAD_REQUEST, Json(ApiResponse::failure(e.to_string())))
        }
    }
}

/// `POST /api/untrack-price`
pub async fn untrack_price(
    State(state): State<SharedState>,
    Json(req): Json<UntrackPriceRequest>,
) -> Json<ApiResponse> {
    state.registry.untrack(&req.id);
    state.push.unbind(&req.id);
    Json(ApiResponse::ok("Price tracking stopped"))
}

/// `GET /api/tracked-items`
pub async fn tracked_items(State(state): State<SharedState>) -> Json<TrackedItemsResponse> {
    let items = state
        .registry
        .list()
        .iter()
        .map(TrackedItemView::from)
        .collect();
    Json(TrackedItemsResponse {
        success: true,
        items,
    })
}

/// `GET /api/health`
pub async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        tracked_items: state.registry.len(),
        subscribers: state.broadcaster.subscriber_count(),
    })
}
