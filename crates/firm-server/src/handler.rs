use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::{BytesRejection, JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{header, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use firm_bridge::{Bridge, BridgeError, ImportResult};
use firm_store::{BlockStat, FileStat, UnixFsEntry};
use firm_types::{Address, SendResult};

use crate::error::{ServerError, ServerResult};

/// Shared state of every handler.
#[derive(Clone)]
pub struct AppState {
    pub bridge: Arc<Bridge>,
}

impl AppState {
    pub fn new(bridge: Arc<Bridge>) -> Self {
        Self { bridge }
    }
}

fn parse_address(raw: &str) -> ServerResult<Address> {
    raw.parse()
        .map_err(|e| ServerError::BadRequest(format!("invalid address {raw:?}: {e}")))
}

fn octets(content: Vec<u8>) -> Response {
    ([(header::CONTENT_TYPE, "application/octet-stream")], content).into_response()
}

pub async fn not_found_handler(uri: Uri) -> ServerError {
    BridgeError::NotFound(format!("no route for {}", uri.path())).into()
}

pub async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn info_handler(State(state): State<AppState>) -> Json<Value> {
    let bridge = &state.bridge;
    Json(json!({
        "name": "firmnode",
        "version": env!("CARGO_PKG_VERSION"),
        "initialized": bridge.is_initialized(),
        "factory": bridge.factory_address(),
        "filesystem": bridge.fs_contract().ok(),
    }))
}

pub async fn entry_stat_handler(
    State(state): State<AppState>,
    address: Result<Path<String>, PathRejection>,
) -> ServerResult<Json<FileStat>> {
    let Path(address) = address?;
    let address = parse_address(&address)?;
    state
        .bridge
        .stat(&address)
        .await
        .map(Json)
        .ok_or_else(|| BridgeError::NotFound(format!("no entry for {address}")).into())
}

pub async fn entry_cid_handler(
    State(state): State<AppState>,
    address: Result<Path<String>, PathRejection>,
) -> ServerResult<Json<Value>> {
    let Path(address) = address?;
    let address = parse_address(&address)?;
    let cid = state.bridge.get_contract_cid(&address).await?;
    Ok(Json(json!({ "cid": cid })))
}

pub async fn sub_path_cid_handler(
    State(state): State<AppState>,
    path: Result<Path<(String, String)>, PathRejection>,
) -> ServerResult<Json<Value>> {
    let Path((address, sub)) = path?;
    let address = parse_address(&address)?;
    let cid = state.bridge.get_sub_path_cid(&address, &sub).await?;
    Ok(Json(json!({ "cid": cid })))
}

async fn read(state: &AppState, address: &str, sub: &str) -> ServerResult<Response> {
    let address = parse_address(address)?;
    Ok(match state.bridge.read_entry(&address, sub).await? {
        entry @ UnixFsEntry::Directory { .. } => Json(entry).into_response(),
        UnixFsEntry::File { content, .. } | UnixFsEntry::Raw { content, .. } => octets(content),
    })
}

pub async fn read_root_handler(
    State(state): State<AppState>,
    address: Result<Path<String>, PathRejection>,
) -> ServerResult<Response> {
    let Path(address) = address?;
    read(&state, &address, "").await
}

pub async fn read_handler(
    State(state): State<AppState>,
    path: Result<Path<(String, String)>, PathRejection>,
) -> ServerResult<Response> {
    let Path((address, sub)) = path?;
    read(&state, &address, &sub).await
}

#[derive(Debug, Default, Deserialize)]
pub struct ImportQuery {
    pub ext: Option<String>,
}

pub async fn import_handler(
    State(state): State<AppState>,
    address: Result<Path<String>, PathRejection>,
    query: Result<Query<ImportQuery>, QueryRejection>,
    body: Result<Bytes, BytesRejection>,
) -> ServerResult<Json<ImportResult>> {
    let Path(address) = address?;
    let Query(query) = query?;
    let body = body?;
    let address = parse_address(&address)?;
    let result = state
        .bridge
        .import(address, &body, query.ext.as_deref())
        .await?;
    Ok(Json(result))
}

pub async fn send_handler(
    State(state): State<AppState>,
    message: Result<Json<Value>, JsonRejection>,
) -> ServerResult<Json<SendResult>> {
    let Json(message) = message?;
    Ok(Json(state.bridge.send(&message).await?))
}

pub async fn block_handler(
    State(state): State<AppState>,
    cid: Result<Path<String>, PathRejection>,
) -> ServerResult<Response> {
    let Path(cid) = cid?;
    Ok(octets(state.bridge.get_block(&cid).await?))
}

pub async fn block_stat_handler(
    State(state): State<AppState>,
    cid: Result<Path<String>, PathRejection>,
) -> ServerResult<Json<BlockStat>> {
    let Path(cid) = cid?;
    Ok(Json(state.bridge.get_block_stat(&cid).await?))
}
