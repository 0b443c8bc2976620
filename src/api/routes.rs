//! API route handlers.
//!
//! All endpoints return JSON. Failures use a GraphQL-style error payload
//! (`{"errors": [{"message", "code"}]}`) so clients see the same messages
//! the resolvers used to return.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

use crate::engine::{AccountLedger, BetSettlement};
use crate::types::{Bet, DicebetError, User};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Services reachable from every handler.
pub struct ApiState {
    pub ledger: Arc<AccountLedger>,
    pub bets: Arc<BetSettlement>,
}

impl ApiState {
    pub fn new(bets: Arc<BetSettlement>) -> Self {
        Self {
            ledger: bets.ledger().clone(),
            bets,
        }
    }
}

pub type AppState = Arc<ApiState>;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceBetInput {
    pub user_id: i64,
    pub bet_amount: Decimal,
    pub chance: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateUserInput {
    pub name: String,
    pub balance: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BestBetsQuery {
    pub limit: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    pub deleted: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub errors: Vec<ErrorEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorEntry {
    pub message: String,
    pub code: String,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum ApiError {
    Domain(DicebetError),
    /// Failure outside the domain (e.g. a settlement task panicked).
    Internal(String),
}

impl From<DicebetError> for ApiError {
    fn from(err: DicebetError) -> Self {
        Self::Domain(err)
    }
}

/// Extractor rejections (malformed JSON, missing fields, bad query or
/// path values) are reported through the same error payload.
macro_rules! reject_as_invalid_input {
    ($($rejection:ty),*) => {
        $(
            impl From<$rejection> for ApiError {
                fn from(rejection: $rejection) -> Self {
                    Self::Domain(DicebetError::InvalidInput(rejection.body_text()))
                }
            }
        )*
    };
}

reject_as_invalid_input!(JsonRejection, QueryRejection, PathRejection);

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Domain(err) => match err {
                DicebetError::UserNotFound(_) | DicebetError::BetNotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                DicebetError::InvalidChance(_)
                | DicebetError::InvalidStake(_)
                | DicebetError::InsufficientBalance { .. }
                | DicebetError::InvalidInput(_)
                | DicebetError::PayoutOverflow => StatusCode::BAD_REQUEST,
                DicebetError::UserHasBets(_) | DicebetError::StaleBalance(_) => {
                    StatusCode::CONFLICT
                }
                DicebetError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (message, code) = match &self {
            Self::Domain(DicebetError::Storage(e)) => {
                error!(error = %e, "Storage failure");
                ("Internal server error".to_string(), "INTERNAL")
            }
            Self::Domain(e) => (e.to_string(), e.code()),
            Self::Internal(reason) => {
                error!(reason = %reason, "Request failed");
                ("Internal server error".to_string(), "INTERNAL")
            }
        };
        let body = ErrorBody {
            errors: vec![ErrorEntry {
                message,
                code: code.to_string(),
            }],
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

// ---------------------------------------------------------------------------
// Bet handlers
// ---------------------------------------------------------------------------

/// GET /api/bets/:id
pub async fn get_bet(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<Json<Bet>> {
    let Path(id) = id?;
    Ok(Json(state.bets.get_bet(id).await?))
}

/// GET /api/bets
pub async fn list_bets(State(state): State<AppState>) -> ApiResult<Json<Vec<Bet>>> {
    Ok(Json(state.bets.list_bets().await?))
}

/// GET /api/bets/best?limit=N
pub async fn best_bets(
    State(state): State<AppState>,
    query: Result<Query<BestBetsQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<Bet>>> {
    let Query(query) = query?;
    let limit = usize::try_from(query.limit).map_err(|_| {
        DicebetError::InvalidInput("limit must not be negative".into())
    })?;
    Ok(Json(state.bets.best_bet_per_user(limit).await?))
}

/// POST /api/bets
pub async fn place_bet(
    State(state): State<AppState>,
    input: Result<Json<PlaceBetInput>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Bet>)> {
    let Json(input) = input?;
    // Detached so a dropped connection cannot abandon a placement midway.
    let bets = state.bets.clone();
    let bet = tokio::spawn(async move {
        bets.place_bet(input.user_id, input.bet_amount, input.chance)
            .await
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))??;
    Ok((StatusCode::CREATED, Json(bet)))
}

// ---------------------------------------------------------------------------
// User handlers
// ---------------------------------------------------------------------------

/// GET /api/users/:id
pub async fn get_user(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<Json<User>> {
    let Path(id) = id?;
    Ok(Json(state.ledger.get_user(id).await?))
}

/// GET /api/users
pub async fn list_users(State(state): State<AppState>) -> ApiResult<Json<Vec<User>>> {
    Ok(Json(state.ledger.list_users().await?))
}

/// POST /api/users
pub async fn create_user(
    State(state): State<AppState>,
    input: Result<Json<CreateUserInput>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<User>)> {
    let Json(input) = input?;
    let user = state.ledger.create_user(&input.name, input.balance).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// DELETE /api/users/:id
pub async fn delete_user(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<Json<DeleteResponse>> {
    let Path(id) = id?;
    let deleted = state.ledger.delete_user(id).await?;
    Ok(Json(DeleteResponse { deleted }))
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> StatusCode {
    match state.ledger.store().health_check().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            error!(error = %e, "Health check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
