//! HTTP adapter
//!
//! The interface the (out of scope) presentation layer talks to. A thin
//! axum router over the engine and the lifecycle controller, run on its own
//! tokio runtime; the service loop only polls the server's fate so a dead
//! server stops everything else.
use crate::auction::Amount;
use crate::persistence::Persistence;
use crate::service::bidding_engine::{BidOutcome, BidRequest, BiddingEngine};
use crate::service::lifecycle::{AdminError, LifecycleController, LotFields};
use crate::service::LoopService;
use anyhow::{format_err, Context, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, sync::Arc};
use tokio::{runtime::Runtime, sync::oneshot};
use tracing::error;

pub struct AppState<P: Persistence> {
    pub engine: Arc<BiddingEngine<P>>,
    pub lifecycle: Arc<LifecycleController<P>>,
}

impl<P: Persistence> Clone for AppState<P> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            lifecycle: self.lifecycle.clone(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct BidForm {
    pub amount: Amount,
    pub name: String,
    pub email: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CountdownForm {
    pub minutes: u64,
}

fn internal_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "error": "internal error" })),
    )
        .into_response()
}

fn admin_error_response(e: AdminError) -> Response {
    let status = match &e {
        AdminError::UnknownLot(_) => StatusCode::NOT_FOUND,
        AdminError::AlreadyEnded | AdminError::DuplicateLot(_) => StatusCode::CONFLICT,
        AdminError::Storage(e) => {
            error!(error = %e, "storage failure");
            return internal_error();
        }
    };
    (status, Json(serde_json::json!({ "error": e.to_string() }))).into_response()
}

/// Run the blocking core off the runtime and turn the result into JSON.
async fn respond<T, F>(f: F) -> Response
where
    T: Serialize + Send + 'static,
    F: FnOnce() -> Result<T, AdminError> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(Ok(value)) => Json(value).into_response(),
        Ok(Err(e)) => admin_error_response(e),
        Err(e) => {
            error!(error = %e, "handler task failed");
            internal_error()
        }
    }
}

async fn list_lots<P: Persistence + 'static>(State(app): State<AppState<P>>) -> Response {
    respond(move || app.lifecycle.list_lots()).await
}

async fn get_lot<P: Persistence + 'static>(
    State(app): State<AppState<P>>,
    Path(lot_id): Path<String>,
) -> Response {
    respond(move || app.lifecycle.get_lot(&lot_id)).await
}

async fn list_group<P: Persistence + 'static>(
    State(app): State<AppState<P>>,
    Path(group_id): Path<u32>,
) -> Response {
    respond(move || app.lifecycle.list_lots_by_group(group_id)).await
}

async fn submit_bid<P: Persistence + 'static>(
    State(app): State<AppState<P>>,
    Path(lot_id): Path<String>,
    Json(form): Json<BidForm>,
) -> Response {
    let request = BidRequest {
        lot_id,
        amount: form.amount,
        name: form.name,
        email: form.email,
    };

    match tokio::task::spawn_blocking(move || app.engine.submit_bid(request)).await {
        Ok(Ok(BidOutcome::Accepted(accepted))) => Json(serde_json::json!({
            "outcome": "accepted",
            "lot": accepted.lot,
        }))
        .into_response(),
        Ok(Ok(BidOutcome::Rejected(reason))) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(serde_json::json!({
                "outcome": "rejected",
                "message": reason.to_string(),
                "detail": reason,
            })),
        )
            .into_response(),
        Ok(Err(e)) => {
            error!(error = %e, "bid commit failed");
            internal_error()
        }
        Err(e) => {
            error!(error = %e, "handler task failed");
            internal_error()
        }
    }
}

async fn pause<P: Persistence + 'static>(State(app): State<AppState<P>>) -> Response {
    respond(move || app.lifecycle.pause()).await
}

async fn resume<P: Persistence + 'static>(State(app): State<AppState<P>>) -> Response {
    respond(move || app.lifecycle.resume()).await
}

async fn set_countdown<P: Persistence + 'static>(
    State(app): State<AppState<P>>,
    Json(form): Json<CountdownForm>,
) -> Response {
    respond(move || app.lifecycle.set_countdown(form.minutes)).await
}

async fn end_auction<P: Persistence + 'static>(State(app): State<AppState<P>>) -> Response {
    respond(move || app.lifecycle.end_auction()).await
}

async fn reset<P: Persistence + 'static>(State(app): State<AppState<P>>) -> Response {
    respond(move || {
        app.lifecycle.reset()?;
        Ok(serde_json::json!({ "status": "reset" }))
    })
    .await
}

async fn create_lot<P: Persistence + 'static>(
    State(app): State<AppState<P>>,
    Json(fields): Json<LotFields>,
) -> Response {
    respond(move || app.lifecycle.create_lot(fields)).await
}

async fn edit_lot<P: Persistence + 'static>(
    State(app): State<AppState<P>>,
    Path(lot_id): Path<String>,
    Json(fields): Json<LotFields>,
) -> Response {
    respond(move || app.lifecycle.edit_lot(&lot_id, fields)).await
}

async fn delete_lot<P: Persistence + 'static>(
    State(app): State<AppState<P>>,
    Path(lot_id): Path<String>,
) -> Response {
    respond(move || {
        app.lifecycle.delete_lot(&lot_id)?;
        Ok(serde_json::json!({ "status": "deleted" }))
    })
    .await
}

fn router<P: Persistence + 'static>(app: AppState<P>) -> Router {
    Router::new()
        .route("/lots", get(list_lots::<P>))
        .route("/lots/:id", get(get_lot::<P>))
        .route("/groups/:group", get(list_group::<P>))
        .route("/bid/:id", post(submit_bid::<P>))
        .route("/admin/pause", post(pause::<P>))
        .route("/admin/resume", post(resume::<P>))
        .route("/admin/countdown", post(set_countdown::<P>))
        .route("/admin/end", post(end_auction::<P>))
        .route("/admin/reset", post(reset::<P>))
        .route("/admin/lots", post(create_lot::<P>))
        .route(
            "/admin/lots/:id",
            put(edit_lot::<P>).delete(delete_lot::<P>),
        )
        .with_state(app)
}

async fn run_http_server<P: Persistence + 'static>(
    bind: SocketAddr,
    app: AppState<P>,
) -> Result<()> {
    axum::Server::try_bind(&bind)?
        .serve(router(app).into_make_service())
        .await?;
    Ok(())
}

pub struct Ui {
    // cancels all tasks on drop
    _runtime: Runtime,
    server_rx: oneshot::Receiver<Result<()>>,
}

impl Ui {
    pub fn new<P: Persistence + 'static>(bind: SocketAddr, app: AppState<P>) -> Result<Self> {
        let runtime = Runtime::new()?;

        let (tx, rx) = oneshot::channel();

        runtime.spawn(async move {
            tx.send(
                run_http_server(bind, app)
                    .await
                    .context("Failed to run http server"),
            )
            .expect("send to work");
        });

        Ok(Self {
            _runtime: runtime,
            server_rx: rx,
        })
    }
}

impl LoopService for Ui {
    fn run_iteration(&mut self) -> Result<()> {
        // don't hog the cpu
        std::thread::sleep(std::time::Duration::from_millis(100));

        match self.server_rx.try_recv() {
            Ok(res) => res,
            Err(oneshot::error::TryRecvError::Empty) => Ok(()),
            Err(oneshot::error::TryRecvError::Closed) => {
                Err(format_err!("ui server died without leaving a response?!"))
            }
        }
    }
}
