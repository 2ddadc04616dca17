//! HTTP surface of the lease service.

use std::sync::Arc;

use anyhow::Result;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use devmate_lease::{
    validation::{require_fields, JSON_BODY_EXPECTED},
    Clock, Device, DeviceStore, LeaseError, LeaseService,
};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

type Service<S, C> = Arc<LeaseService<S, C>>;

#[derive(Serialize)]
struct DeviceList {
    devices: Vec<Device>,
}

/// A [`LeaseError`] rendered as an HTTP response.
pub struct ApiError(LeaseError);

impl From<LeaseError> for ApiError {
    fn from(err: LeaseError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self.0 {
            LeaseError::NotFound => message(StatusCode::NOT_FOUND, "Device not found"),
            LeaseError::AlreadyExists => message(
                StatusCode::CONFLICT,
                "Device with this name already exists",
            ),
            LeaseError::Conflict { owner, .. } => (
                StatusCode::CONFLICT,
                Json(json!({
                    "message": "Device not available for reservation",
                    "reserved_by": owner,
                })),
            )
                .into_response(),
            LeaseError::NoOp => StatusCode::NOT_MODIFIED.into_response(),
            LeaseError::InvalidInput(msg) => message(StatusCode::BAD_REQUEST, &msg),
            LeaseError::Store(err) => {
                error!(%err, "storage failure");
                message(StatusCode::INTERNAL_SERVER_ERROR, "Internal storage error")
            }
        }
    }
}

fn message(status: StatusCode, msg: &str) -> Response {
    (status, Json(json!({ "message": msg }))).into_response()
}

/// Extract required string fields from a JSON request body.
fn fields<const N: usize>(body: &Bytes, names: [&str; N]) -> Result<[String; N], ApiError> {
    let value: Option<Value> = serde_json::from_slice(body).ok();
    let values = require_fields(value.as_ref(), &names)?;
    values
        .try_into()
        .map_err(|_| LeaseError::InvalidInput(JSON_BODY_EXPECTED.to_owned()).into())
}

pub fn router<S: DeviceStore, C: Clock>(service: Service<S, C>) -> Router {
    let devices = Router::new()
        .route("/list", get(list_devices::<S, C>))
        .route("/reserve", post(reserve_device::<S, C>))
        .route("/release", post(release_device::<S, C>))
        .route("/add", post(add_device::<S, C>))
        .route("/offline", post(set_device_offline::<S, C>))
        .route("/online", post(set_device_online::<S, C>))
        .route("/delete", delete(missing_device_name))
        .route("/delete/", delete(missing_device_name))
        .route("/delete/{device}", delete(delete_device::<S, C>));

    Router::new()
        .route("/health", get(health))
        .nest("/devices", devices)
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

/// Serve the API on `listener` until `cancel` fires.
pub async fn serve<S: DeviceStore, C: Clock>(
    listener: TcpListener,
    service: Service<S, C>,
    cancel: CancellationToken,
) -> Result<()> {
    info!(addr = %listener.local_addr()?, "serving devices");
    axum::serve(listener, router(service))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;
    Ok(())
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn list_devices<S: DeviceStore, C: Clock>(
    State(service): State<Service<S, C>>,
) -> Result<Response, ApiError> {
    let devices = service.list().await?;
    if devices.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }
    Ok((StatusCode::OK, Json(DeviceList { devices })).into_response())
}

async fn reserve_device<S: DeviceStore, C: Clock>(
    State(service): State<Service<S, C>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let [device, username] = fields(&body, ["device", "username"])?;
    service.reserve(&device, &username).await?;
    Ok(message(StatusCode::OK, "Device reserved"))
}

async fn release_device<S: DeviceStore, C: Clock>(
    State(service): State<Service<S, C>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let [device] = fields(&body, ["device"])?;
    service.release(&device).await?;
    Ok(message(StatusCode::OK, "Device released"))
}

async fn add_device<S: DeviceStore, C: Clock>(
    State(service): State<Service<S, C>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let [device, model] = fields(&body, ["device", "model"])?;
    service.add(&device, &model).await?;
    Ok(message(StatusCode::CREATED, "Device added"))
}

async fn set_device_offline<S: DeviceStore, C: Clock>(
    State(service): State<Service<S, C>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let [device] = fields(&body, ["device"])?;
    service.set_offline(&device).await?;
    Ok(message(StatusCode::OK, "Device set to offline"))
}

async fn set_device_online<S: DeviceStore, C: Clock>(
    State(service): State<Service<S, C>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let [device] = fields(&body, ["device"])?;
    service.set_online(&device).await?;
    Ok(message(StatusCode::OK, "Device set to available"))
}

async fn delete_device<S: DeviceStore, C: Clock>(
    State(service): State<Service<S, C>>,
    Path(device): Path<String>,
) -> Result<Response, ApiError> {
    service.delete(&device).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn missing_device_name() -> Response {
    message(StatusCode::BAD_REQUEST, "Device name missing")
}
