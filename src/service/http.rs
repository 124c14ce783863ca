//! HTTP/JSON front of the directory and the bid ledger
//!
//! Authentication happens upstream: whoever sits in front of this server
//! puts the caller's id into the `x-user-id` header and we trust it.
use super::{BidLedger, Directory, LoopService};
use crate::error::{ErrorKind, ListingError, ListingResult};
use crate::listing::{Listing, ListingId, ListingPatch, NewListing, UserId};
use crate::persistence::Persistence;
use anyhow::{format_err, Context, Result};
use axum::{
    extract::{rejection::JsonRejection, FromRequest, FromRequestParts, Path, State},
    http::{request::Parts, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{net::SocketAddr, sync::Arc};
use tokio::{runtime::Runtime, sync::oneshot};
use tracing::{error, info};

pub const CALLER_ID_HEADER: &str = "x-user-id";

/// Authenticated caller, taken from [`CALLER_ID_HEADER`]
#[derive(Clone, Debug)]
pub struct Caller(pub UserId);

#[async_trait::async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(CALLER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(|id| Caller(id.to_owned()))
            .ok_or(ApiError::MissingIdentity)
    }
}

/// `Json`, but a body that can't be read comes back as a `ValidationError`
/// instead of axum's plain-text rejection
pub struct JsonBody<T>(pub T);

#[async_trait::async_trait]
impl<S, B, T> FromRequest<S, B> for JsonBody<T>
where
    Json<T>: FromRequest<S, B, Rejection = JsonRejection>,
    S: Send + Sync,
    B: Send + 'static,
{
    type Rejection = ApiError;

    async fn from_request(req: Request<B>, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => Err(ListingError::validation(rejection.body_text()).into()),
        }
    }
}

#[derive(Debug)]
pub enum ApiError {
    Listing(ListingError),
    MissingIdentity,
}

impl From<ListingError> for ApiError {
    fn from(e: ListingError) -> Self {
        ApiError::Listing(e)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    kind: ErrorKind,
    message: String,
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::ValidationError | ErrorKind::InvalidAmount | ErrorKind::NoBidToCancel => {
            StatusCode::BAD_REQUEST
        }
        ErrorKind::BidTooLow => StatusCode::CONFLICT,
        ErrorKind::Unauthorized => StatusCode::FORBIDDEN,
        ErrorKind::StorageError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::MissingIdentity => (
                StatusCode::UNAUTHORIZED,
                ErrorBody {
                    kind: ErrorKind::Unauthorized,
                    message: format!("missing {CALLER_ID_HEADER} header"),
                },
            ),
            ApiError::Listing(ListingError::Storage(e)) => {
                error!("storage failure: {e:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody {
                        kind: ErrorKind::StorageError,
                        message: "internal server error".to_owned(),
                    },
                )
            }
            ApiError::Listing(e) => (
                status_for(e.kind()),
                ErrorBody {
                    kind: e.kind(),
                    message: e.to_string(),
                },
            ),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// A listing as sent to clients
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingView {
    #[serde(flatten)]
    listing: Listing,
    is_overdue: bool,
}

impl From<Listing> for ListingView {
    fn from(listing: Listing) -> Self {
        Self {
            is_overdue: listing.is_overdue(),
            listing,
        }
    }
}

#[derive(Serialize)]
struct MessageResponse {
    message: &'static str,
}

#[derive(Serialize)]
struct BidResponse {
    message: &'static str,
    listing: ListingView,
}

/// Any JSON value is accepted for `offeredAmount`; whatever is not a string
/// or a number is left for the ledger to reject as an invalid amount
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaceBidRequest {
    #[serde(default)]
    offered_amount: Value,
}

impl PlaceBidRequest {
    fn amount_text(&self) -> String {
        match &self.offered_amount {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => String::new(),
        }
    }
}

pub struct AppState<P: Persistence> {
    directory: Arc<Directory<P>>,
    ledger: Arc<BidLedger<P>>,
}

impl<P: Persistence> Clone for AppState<P> {
    fn clone(&self) -> Self {
        Self {
            directory: self.directory.clone(),
            ledger: self.ledger.clone(),
        }
    }
}

/// Core calls block on storage, keep them off the async workers
async fn blocking<T, F>(f: F) -> ApiResult<T>
where
    F: FnOnce() -> ListingResult<T> + Send + 'static,
    T: Send + 'static,
{
    let res = tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ListingError::Storage(format_err!("blocking task failed: {e}")))?;
    Ok(res?)
}

fn views(listings: Vec<Listing>) -> Json<Vec<ListingView>> {
    Json(listings.into_iter().map(ListingView::from).collect())
}

async fn list_mine<P: Persistence>(
    State(state): State<AppState<P>>,
    Caller(caller): Caller,
) -> ApiResult<Json<Vec<ListingView>>> {
    Ok(views(
        blocking(move || state.directory.list_mine(&caller)).await?,
    ))
}

async fn list_marketplace<P: Persistence>(
    State(state): State<AppState<P>>,
    Caller(caller): Caller,
) -> ApiResult<Json<Vec<ListingView>>> {
    Ok(views(
        blocking(move || state.directory.list_marketplace(&caller)).await?,
    ))
}

async fn get_listing<P: Persistence>(
    State(state): State<AppState<P>>,
    Caller(_caller): Caller,
    Path(id): Path<ListingId>,
) -> ApiResult<Json<ListingView>> {
    let listing = blocking(move || state.directory.get_by_id(&id)).await?;
    Ok(Json(listing.into()))
}

async fn create_listing<P: Persistence>(
    State(state): State<AppState<P>>,
    Caller(caller): Caller,
    JsonBody(fields): JsonBody<NewListing>,
) -> ApiResult<(StatusCode, Json<ListingView>)> {
    let listing = blocking(move || state.directory.create(&caller, fields)).await?;
    Ok((StatusCode::CREATED, Json(listing.into())))
}

async fn update_listing<P: Persistence>(
    State(state): State<AppState<P>>,
    Caller(caller): Caller,
    Path(id): Path<ListingId>,
    JsonBody(patch): JsonBody<ListingPatch>,
) -> ApiResult<Json<ListingView>> {
    let listing = blocking(move || state.directory.update(&id, &caller, patch)).await?;
    Ok(Json(listing.into()))
}

async fn delete_listing<P: Persistence>(
    State(state): State<AppState<P>>,
    Caller(caller): Caller,
    Path(id): Path<ListingId>,
) -> ApiResult<Json<MessageResponse>> {
    blocking(move || state.directory.delete(&id, &caller)).await?;
    Ok(Json(MessageResponse {
        message: "Listing deleted",
    }))
}

async fn place_bid<P: Persistence>(
    State(state): State<AppState<P>>,
    Caller(caller): Caller,
    Path(id): Path<ListingId>,
    JsonBody(request): JsonBody<PlaceBidRequest>,
) -> ApiResult<Json<BidResponse>> {
    let amount = request.amount_text();
    let listing = blocking(move || state.ledger.place_bid(&id, &caller, &amount)).await?;
    Ok(Json(BidResponse {
        message: "Bid added successfully",
        listing: listing.into(),
    }))
}

async fn cancel_bid<P: Persistence>(
    State(state): State<AppState<P>>,
    Caller(caller): Caller,
    Path(id): Path<ListingId>,
) -> ApiResult<Json<BidResponse>> {
    let listing = blocking(move || state.ledger.cancel_bid(&id, &caller)).await?;
    Ok(Json(BidResponse {
        message: "Bid canceled successfully",
        listing: listing.into(),
    }))
}

pub fn router<P: Persistence>(directory: Arc<Directory<P>>, ledger: Arc<BidLedger<P>>) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/listings", get(list_mine::<P>).post(create_listing::<P>))
        .route(
            "/api/listings/:id",
            get(get_listing::<P>)
                .put(update_listing::<P>)
                .delete(delete_listing::<P>),
        )
        .route("/api/auction", get(list_marketplace::<P>))
        .route("/api/auction/:id", put(place_bid::<P>))
        .route("/api/auction/:id/bid", axum::routing::delete(cancel_bid::<P>))
        .with_state(AppState { directory, ledger })
}

async fn run_http_server(bind_addr: SocketAddr, app: Router) -> Result<()> {
    let server = axum::Server::try_bind(&bind_addr)?;
    info!(%bind_addr, "listening");
    server.serve(app.into_make_service()).await?;
    Ok(())
}

/// The HTTP server as a [`LoopService`]
///
/// Owns its own tokio runtime; the loop only watches for the server to
/// exit so the failure reaches [`super::ServiceControl`].
pub struct HttpServer {
    // cancels all tasks on drop
    _runtime: Runtime,
    server_rx: oneshot::Receiver<Result<()>>,
}

impl HttpServer {
    pub fn new<P: Persistence>(
        bind_addr: SocketAddr,
        directory: Arc<Directory<P>>,
        ledger: Arc<BidLedger<P>>,
    ) -> Result<Self> {
        let runtime = Runtime::new()?;
        let app = router(directory, ledger);

        let (tx, rx) = oneshot::channel();

        runtime.spawn(async move {
            let res = run_http_server(bind_addr, app)
                .await
                .with_context(|| format!("failed to run http server on {bind_addr}"));
            // nobody is listening anymore if the service already stopped
            let _ = tx.send(res);
        });

        Ok(Self {
            _runtime: runtime,
            server_rx: rx,
        })
    }
}

impl LoopService for HttpServer {
    fn run_iteration(&mut self) -> Result<()> {
        // don't hog the cpu
        std::thread::sleep(std::time::Duration::from_millis(100));

        match self.server_rx.try_recv() {
            Ok(res) => res,
            Err(oneshot::error::TryRecvError::Empty) => Ok(()),
            Err(oneshot::error::TryRecvError::Closed) => {
                Err(format_err!("http server died without leaving a response?!"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds_map_to_statuses() {
        assert_eq!(status_for(ErrorKind::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(ErrorKind::InvalidAmount), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::BidTooLow), StatusCode::CONFLICT);
        assert_eq!(status_for(ErrorKind::Unauthorized), StatusCode::FORBIDDEN);
        assert_eq!(
            status_for(ErrorKind::StorageError),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn storage_errors_do_not_leak_details() {
        let response =
            ApiError::from(ListingError::Storage(format_err!("connection refused"))).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn missing_identity_is_unauthenticated() {
        assert_eq!(
            ApiError::MissingIdentity.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn bid_request_takes_any_json_amount() -> anyhow::Result<()> {
        let parse = |body: &str| -> anyhow::Result<String> {
            Ok(serde_json::from_str::<PlaceBidRequest>(body)?.amount_text())
        };
        assert_eq!(parse(r#"{"offeredAmount": "12.50"}"#)?, "12.50");
        assert_eq!(parse(r#"{"offeredAmount": 40}"#)?, "40");
        assert_eq!(parse(r#"{"offeredAmount": true}"#)?, "");
        assert_eq!(parse(r#"{"offeredAmount": null}"#)?, "");
        assert_eq!(parse("{}")?, "");
        Ok(())
    }
}
