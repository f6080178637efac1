use axum::{
    Router,
    routing::{get, post},
    extract::{Query, Path, State},
    response::Json,
    http::StatusCode,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use wagerbook_db::PgStore;
use wagerbook_models::{
    Bet, BetSelection, MatchResult, Transaction, WagerError, Wallet, WalletSettings,
};
use wagerbook_services::{
    BettingService, ManualOutcome, MetricsCollector, SettlementCounters, SettlementEngine,
    SettlementReport, SystemClock, WalletService,
};

#[derive(Clone)]
pub struct AppState {
    pub wallets: Arc<WalletService<PgStore, SystemClock>>,
    pub betting: Arc<BettingService<PgStore, SystemClock>>,
    pub settlement: Arc<SettlementEngine<PgStore, SystemClock>>,
    pub metrics: Arc<MetricsCollector>,
}

#[derive(Deserialize)]
pub struct PaginationParams {
    pub limit: Option<i64>,
}

/// Page size for listing endpoints. Client values are clamped so a
/// negative or huge limit never reaches the store.
fn page_limit(params: &PaginationParams) -> i64 {
    params.limit.unwrap_or(50).clamp(1, 200)
}

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            message: None,
        })
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

/// Wraps [`WagerError`] so handlers can use `?`. Business-rule rejections
/// become client errors with the rule's message; internal faults become an
/// opaque 500 and are logged here.
pub struct ApiError(WagerError);

impl From<WagerError> for ApiError {
    fn from(e: WagerError) -> Self {
        Self(e)
    }
}

impl axum::response::IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self.0 {
            WagerError::WalletNotFound { .. }
            | WagerError::TransactionNotFound { .. }
            | WagerError::BetNotFound { .. }
            | WagerError::MatchNotFound { .. } => StatusCode::NOT_FOUND,
            WagerError::DuplicateReference { .. }
            | WagerError::InvalidStateTransition { .. }
            | WagerError::MatchNotSettleable { .. } => StatusCode::CONFLICT,
            WagerError::WalletLocked { .. } => StatusCode::FORBIDDEN,
            e if e.is_business_rule() => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("request failed: {}", self.0);
            "internal error".to_string()
        } else {
            self.0.to_string()
        };

        let body = Json(ApiResponse::<()> {
            success: false,
            data: None,
            message: Some(message),
        });
        (status, body).into_response()
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub version: String,
}

#[derive(Deserialize)]
pub struct DepositRequest {
    pub amount: Decimal,
    pub channel: String,
    pub reference: Option<String>,
}

#[derive(Deserialize)]
pub struct WithdrawalRequest {
    pub amount: Decimal,
    pub channel: String,
}

#[derive(Deserialize)]
pub struct ResolveRequest {
    pub reference: String,
    pub action: ResolveAction,
    pub reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveAction {
    Complete,
    Fail,
    Cancel,
}

#[derive(Deserialize)]
pub struct AdjustmentRequest {
    pub amount: Decimal,
    pub admin_id: Uuid,
    pub reason: String,
}

#[derive(Deserialize)]
pub struct LockRequest {
    pub reason: String,
}

#[derive(Deserialize)]
pub struct BonusRequest {
    pub amount: Decimal,
}

#[derive(Deserialize)]
pub struct PlaceBetRequest {
    pub user_id: Uuid,
    pub match_id: String,
    pub selection: BetSelection,
    pub amount: Decimal,
    pub odds: Decimal,
}

#[derive(Deserialize)]
pub struct CancelBetRequest {
    pub user_id: Uuid,
    pub reason: String,
}

#[derive(Deserialize)]
pub struct SettleMatchRequest {
    pub result: MatchResult,
}

#[derive(Deserialize)]
pub struct SettleBetRequest {
    pub outcome: BetOutcomeRequest,
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BetOutcomeRequest {
    Won,
    Lost,
    Cancelled,
}

#[derive(Serialize)]
pub struct BalanceResponse {
    pub wallet: Wallet,
}

#[derive(Serialize)]
pub struct TransactionResponse {
    pub transaction: Transaction,
}

pub fn create_routes() -> Router<AppState> {
    Router::new()
        // Health and metrics
        .route("/health", get(health_check))
        .route("/api/v1/metrics/settlement", get(settlement_metrics))

        // Wallet ledger
        .route("/api/v1/wallets/:user_id", get(get_balance))
        .route("/api/v1/wallets/:user_id/transactions", get(get_history))
        .route("/api/v1/wallets/:user_id/deposits", post(request_deposit))
        .route("/api/v1/wallets/:user_id/withdrawals", post(request_withdrawal))
        .route("/api/v1/wallets/:user_id/transactions/resolve", post(resolve_transaction))
        .route("/api/v1/wallets/:user_id/adjustments", post(apply_adjustment))
        .route("/api/v1/wallets/:user_id/bonus", post(grant_bonus))
        .route("/api/v1/wallets/:user_id/lock", post(lock_wallet))
        .route("/api/v1/wallets/:user_id/unlock", post(unlock_wallet))
        .route("/api/v1/wallets/:user_id/settings", post(update_settings))

        // Betting
        .route("/api/v1/bets", post(place_bet))
        .route("/api/v1/bets/:bet_id", get(get_bet))
        .route("/api/v1/bets/:bet_id/cancel", post(cancel_bet))
        .route("/api/v1/users/:user_id/bets", get(get_user_bets))

        // Settlement (admin)
        .route("/api/v1/matches/:match_id/settle", post(settle_match))
        .route("/api/v1/bets/:bet_id/settle", post(settle_single_bet))
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn settlement_metrics(State(state): State<AppState>) -> ApiResult<SettlementCounters> {
    Ok(ApiResponse::ok(state.metrics.snapshot().await))
}

async fn get_balance(
    Path(user_id): Path<Uuid>,
    State(state): State<AppState>,
) -> ApiResult<BalanceResponse> {
    let wallet = state.wallets.balance(user_id).await?;
    Ok(ApiResponse::ok(BalanceResponse { wallet }))
}

async fn get_history(
    Path(user_id): Path<Uuid>,
    Query(params): Query<PaginationParams>,
    State(state): State<AppState>,
) -> ApiResult<Vec<Transaction>> {
    let limit = page_limit(&params);
    let history = state.wallets.history(user_id, limit).await?;
    Ok(ApiResponse::ok(history))
}

async fn request_deposit(
    Path(user_id): Path<Uuid>,
    State(state): State<AppState>,
    Json(req): Json<DepositRequest>,
) -> ApiResult<TransactionResponse> {
    let transaction = state
        .wallets
        .request_deposit(user_id, req.amount, &req.channel, req.reference)
        .await?;
    Ok(ApiResponse::ok(TransactionResponse { transaction }))
}

async fn request_withdrawal(
    Path(user_id): Path<Uuid>,
    State(state): State<AppState>,
    Json(req): Json<WithdrawalRequest>,
) -> ApiResult<TransactionResponse> {
    let transaction = state
        .wallets
        .request_withdrawal(user_id, req.amount, &req.channel)
        .await?;
    Ok(ApiResponse::ok(TransactionResponse { transaction }))
}

async fn resolve_transaction(
    Path(user_id): Path<Uuid>,
    State(state): State<AppState>,
    Json(req): Json<ResolveRequest>,
) -> ApiResult<TransactionResponse> {
    let reason = req.reason.unwrap_or_else(|| "unspecified".to_string());
    let transaction = match req.action {
        ResolveAction::Complete => {
            let (_, tx) = state
                .wallets
                .complete_transaction(user_id, &req.reference)
                .await?;
            tx
        }
        ResolveAction::Fail => {
            state
                .wallets
                .fail_transaction(user_id, &req.reference, &reason)
                .await?
        }
        ResolveAction::Cancel => {
            state
                .wallets
                .cancel_transaction(user_id, &req.reference, &reason)
                .await?
        }
    };
    Ok(ApiResponse::ok(TransactionResponse { transaction }))
}

async fn apply_adjustment(
    Path(user_id): Path<Uuid>,
    State(state): State<AppState>,
    Json(req): Json<AdjustmentRequest>,
) -> ApiResult<BalanceResponse> {
    let (wallet, _) = state
        .wallets
        .adjustment(user_id, req.amount, req.admin_id, &req.reason)
        .await?;
    Ok(ApiResponse::ok(BalanceResponse { wallet }))
}

async fn grant_bonus(
    Path(user_id): Path<Uuid>,
    State(state): State<AppState>,
    Json(req): Json<BonusRequest>,
) -> ApiResult<BalanceResponse> {
    let (wallet, _) = state.wallets.grant_bonus(user_id, req.amount).await?;
    Ok(ApiResponse::ok(BalanceResponse { wallet }))
}

async fn lock_wallet(
    Path(user_id): Path<Uuid>,
    State(state): State<AppState>,
    Json(req): Json<LockRequest>,
) -> ApiResult<BalanceResponse> {
    let wallet = state.wallets.lock_wallet(user_id, &req.reason).await?;
    Ok(ApiResponse::ok(BalanceResponse { wallet }))
}

async fn unlock_wallet(
    Path(user_id): Path<Uuid>,
    State(state): State<AppState>,
) -> ApiResult<BalanceResponse> {
    let wallet = state.wallets.unlock_wallet(user_id).await?;
    Ok(ApiResponse::ok(BalanceResponse { wallet }))
}

async fn update_settings(
    Path(user_id): Path<Uuid>,
    State(state): State<AppState>,
    Json(settings): Json<WalletSettings>,
) -> ApiResult<BalanceResponse> {
    let wallet = state.wallets.update_settings(user_id, settings).await?;
    Ok(ApiResponse::ok(BalanceResponse { wallet }))
}

async fn place_bet(
    State(state): State<AppState>,
    Json(req): Json<PlaceBetRequest>,
) -> ApiResult<Bet> {
    let bet = state
        .betting
        .place_bet(req.user_id, &req.match_id, req.selection, req.amount, req.odds)
        .await?;
    Ok(ApiResponse::ok(bet))
}

async fn get_bet(Path(bet_id): Path<Uuid>, State(state): State<AppState>) -> ApiResult<Bet> {
    let bet = state.betting.bet(bet_id).await?;
    Ok(ApiResponse::ok(bet))
}

async fn cancel_bet(
    Path(bet_id): Path<Uuid>,
    State(state): State<AppState>,
    Json(req): Json<CancelBetRequest>,
) -> ApiResult<Bet> {
    let bet = state
        .betting
        .cancel_bet(req.user_id, bet_id, &req.reason)
        .await?;
    Ok(ApiResponse::ok(bet))
}

async fn get_user_bets(
    Path(user_id): Path<Uuid>,
    Query(params): Query<PaginationParams>,
    State(state): State<AppState>,
) -> ApiResult<Vec<Bet>> {
    let limit = page_limit(&params);
    let bets = state.betting.bets_for_user(user_id, limit).await?;
    Ok(ApiResponse::ok(bets))
}

async fn settle_match(
    Path(match_id): Path<String>,
    State(state): State<AppState>,
    Json(req): Json<SettleMatchRequest>,
) -> ApiResult<SettlementReport> {
    let report = state.settlement.settle_match(&match_id, &req.result).await?;
    Ok(ApiResponse::ok(report))
}

async fn settle_single_bet(
    Path(bet_id): Path<Uuid>,
    State(state): State<AppState>,
    Json(req): Json<SettleBetRequest>,
) -> ApiResult<Bet> {
    let outcome = match req.outcome {
        BetOutcomeRequest::Won => ManualOutcome::Won,
        BetOutcomeRequest::Lost => ManualOutcome::Lost,
        BetOutcomeRequest::Cancelled => ManualOutcome::Cancelled,
    };
    let bet = state.settlement.settle_single_bet(bet_id, outcome).await?;
    Ok(ApiResponse::ok(bet))
}
