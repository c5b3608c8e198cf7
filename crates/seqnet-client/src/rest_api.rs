use crate::client::Client;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use seqnet_common::{Peer, SeqnetError, TransactionId, TransactionStatus};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Deserialize)]
pub struct TransferRequest {
    to: String,
    amount: f64,
}

#[derive(Deserialize)]
pub struct TxStatusRequest {
    tx_id: TransactionId,
}

type ApiError = (StatusCode, String);

fn reject(e: SeqnetError) -> ApiError {
    let status = match e {
        SeqnetError::InvalidCredentials => StatusCode::UNAUTHORIZED,
        SeqnetError::UnknownTransaction(_) => StatusCode::NOT_FOUND,
        SeqnetError::Halted(_) => StatusCode::SERVICE_UNAVAILABLE,
        SeqnetError::InvalidAmount(_) | SeqnetError::InsufficientFunds { .. } => {
            StatusCode::BAD_REQUEST
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}

pub fn router(client: Arc<Client>) -> Router {
    Router::new()
        .route("/peers", get(peers))
        .route("/balance/{account}", get(balance))
        .route("/transfer", post(transfer))
        .route("/status", post(get_tx_status))
        .route("/metrics", get(metrics))
        .with_state(client)
}

pub async fn peers(State(client): State<Arc<Client>>) -> Json<Vec<Peer>> {
    Json(client.peers().await)
}

pub async fn balance(
    State(client): State<Arc<Client>>,
    Path(account): Path<String>,
) -> Json<f64> {
    Json(client.balance(&account).await)
}

pub async fn transfer(
    State(client): State<Arc<Client>>,
    Json(req): Json<TransferRequest>,
) -> Result<Json<TransactionId>, ApiError> {
    client
        .transfer(req.amount, &req.to)
        .await
        .map(Json)
        .map_err(reject)
}

pub async fn get_tx_status(
    State(client): State<Arc<Client>>,
    Json(req): Json<TxStatusRequest>,
) -> Result<Json<TransactionStatus>, ApiError> {
    client.tx_status(&req.tx_id).map(Json).map_err(reject)
}

pub async fn metrics() -> String {
    seqnet_node::metrics::gather_metrics()
}
