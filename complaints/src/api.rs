use crate::config::Listener as ListenerConfig;
use crate::errors::ComplaintError;
use crate::model::Complaint;
use crate::service::{ComplaintService, DEFAULT_PAGE_SIZE, NewComplaint};
use crate::store::ComplaintStore;
use axum::{
    Json, Router,
    extract::{ConnectInfo, Path, Query, State},
    http::HeaderMap,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use geo::GeoResolver;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use uuid::Uuid;

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct ApiState<S: ComplaintStore> {
    pub service: Arc<ComplaintService<S>>,
    pub resolver: Arc<GeoResolver>,
}

impl<S: ComplaintStore> Clone for ApiState<S> {
    fn clone(&self) -> Self {
        ApiState {
            service: self.service.clone(),
            resolver: self.resolver.clone(),
        }
    }
}

pub async fn serve<S: ComplaintStore>(
    listener: &ListenerConfig,
    state: ApiState<S>,
) -> Result<(), ApiError> {
    let addr = format!("{}:{}", listener.host, listener.port);
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "serving complaint API");

    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

pub fn router<S: ComplaintStore>(state: ApiState<S>) -> Router {
    Router::new()
        .route("/api/v1/complaints", post(submit_complaint::<S>))
        .route("/api/v1/complaints/all", get(list_complaints::<S>))
        .route(
            "/api/v1/complaints/{id}",
            get(get_complaint::<S>).put(update_complaint::<S>),
        )
        .with_state(state)
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ComplaintRequest {
    pub product_id: String,
    pub content: String,
    pub reporter: String,
}

#[derive(Deserialize, Debug)]
pub struct UpdateComplaintRequest {
    pub content: Option<String>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ComplaintResponse {
    pub id: Uuid,
    pub product_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub reporter: String,
    pub country: String,
    pub report_count: u32,
}

impl From<Complaint> for ComplaintResponse {
    fn from(complaint: Complaint) -> Self {
        ComplaintResponse {
            id: complaint.id,
            product_id: complaint.product_id,
            content: complaint.content,
            created_at: complaint.created_at,
            reporter: complaint.reporter,
            country: complaint.country,
            report_count: complaint.report_count,
        }
    }
}

#[derive(Deserialize, Debug)]
struct PageParams {
    page: Option<usize>,
    size: Option<usize>,
}

/// The submitter's address: first `X-Forwarded-For` entry when present,
/// otherwise the peer address.
fn client_addr(headers: &HeaderMap, peer: SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| peer.ip().to_string())
}

async fn submit_complaint<S: ComplaintStore>(
    State(state): State<ApiState<S>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(request): Json<ComplaintRequest>,
) -> Result<Json<ComplaintResponse>, ComplaintError> {
    // The client never supplies the country; the resolver's verdict is
    // always used.
    let addr = client_addr(&headers, peer);
    let country = state.resolver.resolve_country(&addr).await;

    let complaint = state
        .service
        .submit(NewComplaint {
            product_id: request.product_id,
            content: request.content,
            reporter: request.reporter,
            country,
        })
        .await?;

    Ok(Json(complaint.into()))
}

async fn get_complaint<S: ComplaintStore>(
    State(state): State<ApiState<S>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ComplaintResponse>, ComplaintError> {
    let complaint = state.service.get(id).await?;
    Ok(Json(complaint.into()))
}

async fn list_complaints<S: ComplaintStore>(
    State(state): State<ApiState<S>>,
    Query(params): Query<PageParams>,
) -> Result<Json<Vec<ComplaintResponse>>, ComplaintError> {
    let complaints = state
        .service
        .list(
            params.page.unwrap_or(0),
            params.size.unwrap_or(DEFAULT_PAGE_SIZE),
        )
        .await?;

    Ok(Json(complaints.into_iter().map(Into::into).collect()))
}

async fn update_complaint<S: ComplaintStore>(
    State(state): State<ApiState<S>>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateComplaintRequest>,
) -> Result<Json<ComplaintResponse>, ComplaintError> {
    let complaint = state.service.update_content(id, request.content).await?;
    Ok(Json(complaint.into()))
}
