//! Handlers for every route in [`super::router`]. Query params are parsed
//! into service-layer `*Params` structs here; any shape problem becomes an
//! [`AppError::Validation`] before it reaches C6–C10.

use super::AppState;
use crate::address::Address;
use crate::error::AppError;
use crate::models::{CollapseBy, Metric};
use crate::services::leaderboard::LeaderboardParams;
use crate::services::pnl::PnlParams;
use crate::services::positions::PositionParams;
use crate::services::trades::TradeParams;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

const DEFAULT_LEADERBOARD_LIMIT: usize = 100;
const MAX_LEADERBOARD_LIMIT: usize = 1000;

fn parse_address(raw: &str) -> Result<Address, AppError> {
    Address::parse(raw).map_err(|e| AppError::Validation(e.to_string()))
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let timestamp = Utc::now().to_rfc3339();
    match state.source.check_meta().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "datasource": state.datasource_name,
                "timestamp": timestamp,
            })),
        ),
        Err(err) => {
            tracing::warn!(error = %err, "health check: upstream meta call failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "datasource": state.datasource_name,
                    "timestamp": timestamp,
                })),
            )
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TradesQuery {
    pub user: String,
    pub coin: Option<String>,
    #[serde(rename = "fromMs")]
    pub from_ms: Option<i64>,
    #[serde(rename = "toMs")]
    pub to_ms: Option<i64>,
    #[serde(rename = "builderOnly")]
    pub builder_only: Option<bool>,
    #[serde(rename = "collapseBy")]
    pub collapse_by: Option<String>,
}

pub async fn get_trades(
    State(state): State<AppState>,
    Query(q): Query<TradesQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let user = parse_address(&q.user)?;
    let now_ms = Utc::now().timestamp_millis();
    let collapse_by = match q.collapse_by {
        Some(raw) => Some(
            CollapseBy::parse(&raw)
                .ok_or_else(|| AppError::Validation(format!("unknown collapseBy: {raw}")))?,
        ),
        None => None,
    };

    let trades = state
        .trades
        .get_trades(&TradeParams {
            user,
            coin: q.coin,
            from_ms: q.from_ms.unwrap_or(0),
            to_ms: q.to_ms.unwrap_or(now_ms),
            builder_only: q.builder_only.unwrap_or(false),
            collapse_by,
        })
        .await?;

    Ok(Json(json!({ "trades": trades })))
}

#[derive(Debug, Deserialize)]
pub struct PositionsQuery {
    pub user: String,
    pub coin: Option<String>,
    #[serde(rename = "fromMs")]
    pub from_ms: Option<i64>,
    #[serde(rename = "toMs")]
    pub to_ms: Option<i64>,
    #[serde(rename = "builderOnly")]
    pub builder_only: Option<bool>,
}

pub async fn get_positions(
    State(state): State<AppState>,
    Query(q): Query<PositionsQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let user = parse_address(&q.user)?;
    let now_ms = Utc::now().timestamp_millis();

    let positions = state
        .positions
        .get_position_history(&PositionParams {
            user,
            coin: q.coin,
            from_ms: q.from_ms.unwrap_or(0),
            to_ms: q.to_ms.unwrap_or(now_ms),
            include_prior: true,
            builder_only: q.builder_only.unwrap_or(false),
        })
        .await?;

    Ok(Json(json!({ "positions": positions })))
}

#[derive(Debug, Deserialize)]
pub struct PnlQuery {
    pub user: String,
    pub coin: Option<String>,
    #[serde(rename = "fromMs")]
    pub from_ms: Option<i64>,
    #[serde(rename = "toMs")]
    pub to_ms: Option<i64>,
    #[serde(rename = "builderOnly")]
    pub builder_only: Option<bool>,
    #[serde(rename = "maxStartCapital")]
    pub max_start_capital: Option<f64>,
}

pub async fn get_pnl(
    State(state): State<AppState>,
    Query(q): Query<PnlQuery>,
) -> Result<Json<crate::models::PnlResult>, AppError> {
    let user = parse_address(&q.user)?;
    let now_ms = Utc::now().timestamp_millis();

    let result = state
        .pnl
        .calculate_pnl_at(
            &PnlParams {
                user,
                coin: q.coin,
                from_ms: q.from_ms.unwrap_or(0),
                to_ms: q.to_ms.unwrap_or(now_ms),
                builder_only: q.builder_only.unwrap_or(false),
                max_start_capital: q.max_start_capital.unwrap_or(state.default_max_start_capital),
            },
            now_ms,
        )
        .await?;

    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    pub metric: String,
    pub coin: Option<String>,
    #[serde(rename = "fromMs")]
    pub from_ms: Option<i64>,
    #[serde(rename = "toMs")]
    pub to_ms: Option<i64>,
    #[serde(rename = "builderOnly")]
    pub builder_only: Option<bool>,
    #[serde(rename = "maxStartCapital")]
    pub max_start_capital: Option<f64>,
    pub limit: Option<usize>,
}

pub async fn get_leaderboard(
    State(state): State<AppState>,
    Query(q): Query<LeaderboardQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let metric = Metric::parse(&q.metric)
        .ok_or_else(|| AppError::Validation(format!("unknown metric: {}", q.metric)))?;
    let limit = q.limit.unwrap_or(DEFAULT_LEADERBOARD_LIMIT);
    if limit == 0 || limit > MAX_LEADERBOARD_LIMIT {
        return Err(AppError::Validation(format!(
            "limit must be in 1..={MAX_LEADERBOARD_LIMIT}"
        )));
    }

    let now_ms = Utc::now().timestamp_millis();
    let entries = state
        .leaderboard
        .get_leaderboard(
            &LeaderboardParams {
                metric,
                coin: q.coin,
                from_ms: q.from_ms.unwrap_or(0),
                to_ms: q.to_ms.unwrap_or(now_ms),
                builder_only: q.builder_only.unwrap_or(false),
                max_start_capital: q.max_start_capital.unwrap_or(state.default_max_start_capital),
                limit,
            },
            now_ms,
        )
        .await;

    Ok(Json(json!({ "entries": entries, "generatedAt": now_ms })))
}

pub async fn list_users(State(state): State<AppState>) -> Json<serde_json::Value> {
    let users: Vec<String> = state
        .registry
        .list()
        .into_iter()
        .map(|a| a.as_str().to_string())
        .collect();
    Json(json!({ "users": users }))
}

#[derive(Debug, Deserialize)]
pub struct RegisterUserBody {
    pub user: String,
}

pub async fn register_user(
    State(state): State<AppState>,
    Json(body): Json<RegisterUserBody>,
) -> Result<impl IntoResponse, AppError> {
    let addr = parse_address(&body.user)?;
    let is_new = state.registry.register(addr.clone());

    if is_new {
        Ok((
            StatusCode::CREATED,
            Json(json!({ "success": true, "user": addr.as_str() })),
        ))
    } else {
        Ok((
            StatusCode::OK,
            Json(json!({
                "success": true,
                "user": addr.as_str(),
                "message": "User already registered",
            })),
        ))
    }
}

pub async fn unregister_user(
    State(state): State<AppState>,
    Path(user): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let addr = parse_address(&user)?;

    if state.registry.unregister(&addr) {
        Ok((
            StatusCode::OK,
            Json(json!({ "success": true, "user": addr.as_str() })),
        ))
    } else {
        Ok((
            StatusCode::NOT_FOUND,
            Json(json!({
                "success": false,
                "user": addr.as_str(),
                "message": "User not found",
            })),
        ))
    }
}
