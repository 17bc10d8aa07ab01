//! HTTP surface.

use std::str::FromStr;

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use fxgate_common::{ApiKey, Currency, NewUser, Timestamp, UserId};
use fxgate_fx::ConversionResult;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, Result};
use crate::gateway::SharedGateway;

/// Header carrying the caller's API key.
pub const API_KEY_HEADER: &str = "curreny_access_token";

/// Build the application router.
pub fn router(gateway: SharedGateway) -> Router {
    Router::new()
        .route("/convert", get(convert))
        .route("/users", post(create_user))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(gateway)
}

#[derive(Debug, Deserialize)]
struct ConvertParams {
    from_currency: Option<String>,
    to_currency: Option<String>,
    amount: Option<String>,
}

impl ConvertParams {
    fn parse(self) -> Result<(Currency, Currency, Decimal)> {
        let from = required("from_currency", self.from_currency)?;
        let to = required("to_currency", self.to_currency)?;
        let amount = required("amount", self.amount)?;

        let amount = Decimal::from_str(amount.trim())
            .or_else(|_| Decimal::from_scientific(amount.trim()))
            .map_err(|_| GatewayError::InvalidRequest(format!("Invalid amount: {}", amount)))?;

        Ok((Currency::new(from), Currency::new(to), amount))
    }
}

fn required(name: &str, value: Option<String>) -> Result<String> {
    value.ok_or_else(|| GatewayError::InvalidRequest(format!("Missing query parameter: {}", name)))
}

fn api_key_from(headers: &HeaderMap) -> ApiKey {
    headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(ApiKey::new)
        .unwrap_or_else(|| ApiKey::new(""))
}

async fn convert(
    State(gateway): State<SharedGateway>,
    headers: HeaderMap,
    Query(params): Query<ConvertParams>,
) -> Result<Json<ConversionResult>> {
    let api_key = api_key_from(&headers);
    let (from, to, amount) = params.parse()?;

    let result = gateway.convert(from, to, amount, &api_key).await?;
    Ok(Json(result))
}

/// Registered user as returned to the client. The API key is not echoed.
#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub created_at: Timestamp,
}

async fn create_user(
    State(gateway): State<SharedGateway>,
    Json(user): Json<NewUser>,
) -> Result<(StatusCode, Json<UserResponse>)> {
    let created = gateway.register_user(user).await?;

    Ok((
        StatusCode::CREATED,
        Json(UserResponse {
            id: created.id,
            username: created.username,
            email: created.email,
            created_at: created.created_at,
        }),
    ))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub provider: String,
    pub cache_entries: usize,
}

async fn health(State(gateway): State<SharedGateway>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        provider: gateway.fx().provider_name().to_string(),
        cache_entries: gateway.fx().cache().len(),
    })
}

async fn metrics(State(gateway): State<SharedGateway>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        gateway.prometheus(),
    )
}

/// Error body returned for every rejection.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
    pub code: String,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorBody {
            detail: self.detail(),
            code: self.error_code().to_string(),
        };
        (status, Json(body)).into_response()
    }
}
