//! HTTP binding for the `/node` surface described in the external
//! interface table. Thin: handlers parse/validate and delegate to the
//! component they front.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::http::header::{HeaderName, AUTHORIZATION};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::sensitive_headers::SetSensitiveRequestHeadersLayer;
use tower_http::trace::TraceLayer;

use crate::context::CoreContext;
use crate::error::CoreError;
use crate::http::extractors::{ExtractHandshakeHeaders, ExtractHash};
use crate::models::{
    ConsensusToMasterPayload, HandshakeRequest, HandshakeResponse, NodeInformation,
};
use crate::sync::SyncServer;

/// Headers carrying association credentials or the session/acceptance
/// identifiers, scrubbed from trace logs alongside `Authorization`.
fn sensitive_headers() -> [HeaderName; 4] {
    [
        AUTHORIZATION,
        HeaderName::from_static("x-session"),
        HeaderName::from_static("x-acceptance"),
        HeaderName::from_static("x-hash"),
    ]
}

pub fn router(context: Arc<CoreContext>) -> Router {
    Router::new()
        .route("/node/info", get(node_info))
        .route("/node/establish/receive_echo", post(receive_echo))
        .route("/node/blockchain/receive_raw_block", post(receive_raw_block))
        .route("/node/blockchain/receive_hashed_block", post(receive_hashed_block))
        .route("/node/blockchain/request_update", post(request_update))
        .route("/node/blockchain/verify_hash", post(verify_hash))
        .layer(
            ServiceBuilder::new()
                .layer(SetSensitiveRequestHeadersLayer::new(sensitive_headers()))
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new()),
        )
        .with_state(context)
}

async fn node_info(State(context): State<Arc<CoreContext>>) -> impl IntoResponse {
    let chain = context.store.snapshot_chain().await;
    if chain.chain.is_empty() {
        return StatusCode::NO_CONTENT.into_response();
    }

    let info = NodeInformation {
        role: context.role,
        is_sleeping: false,
        is_mining: false,
        consensus_timer_seconds: context.block_timer_seconds,
        last_mined_block: chain.chain.last().map(|b| b.id),
    };
    Json(info).into_response()
}

async fn receive_echo(
    State(context): State<Arc<CoreContext>>,
    ExtractHandshakeHeaders(headers): ExtractHandshakeHeaders,
    Json(request): Json<HandshakeRequest>,
) -> Result<Json<HandshakeResponse>, CoreError> {
    let handshake = crate::handshake::AssociationHandshake::new(
        &context.registry,
        context.store.auth_key(),
        context.store.secret_key(),
    );
    let (certificate_token, transaction) = handshake
        .handshake(headers, request.source_address, request.source_port)
        .await?;
    context.builder.enqueue_transaction(transaction).await;
    Ok(Json(HandshakeResponse { certificate_token }))
}

async fn receive_raw_block(
    State(context): State<Arc<CoreContext>>,
    Json(payload): Json<crate::models::ConsensusFromMasterPayload>,
) -> impl IntoResponse {
    crate::mining::spawn_mining_task(
        context.client.clone(),
        context.self_address.clone(),
        context.difficulty,
        payload,
    );
    StatusCode::ACCEPTED
}

async fn receive_hashed_block(
    State(context): State<Arc<CoreContext>>,
    Json(payload): Json<ConsensusToMasterPayload>,
) -> impl IntoResponse {
    match context.dispatcher.receive_hashed_block(payload).await {
        Ok(success) => (StatusCode::ACCEPTED, Json(success)).into_response(),
        Err(CoreError::IdDrift(_)) => StatusCode::NOT_ACCEPTABLE.into_response(),
        Err(CoreError::Protocol(_)) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}

async fn request_update(State(context): State<Arc<CoreContext>>) -> Result<impl IntoResponse, CoreError> {
    let sync = SyncServer::new(&context.store);
    let response = sync.snapshot().await?;
    Ok(Json(response))
}

async fn verify_hash(
    State(context): State<Arc<CoreContext>>,
    ExtractHash(hash): ExtractHash,
) -> Result<impl IntoResponse, CoreError> {
    let sync = SyncServer::new(&context.store);
    if sync.verify_hash(&hash).await? {
        Ok(StatusCode::OK)
    } else {
        Ok(StatusCode::NOT_ACCEPTABLE)
    }
}
