//! HTTP front end.
//!
//! `GET /?number=<digits>` starts a pairing attempt and answers with the
//! pairing code once it is known. Failures are reduced to a generic message
//! in the same `{"code": ...}` shape.

use std::net::SocketAddr;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;

use crate::error::{PairingError, ServerError};
use crate::pairing::PairingService;

/// Query string of the pairing route.
#[derive(Debug, Deserialize)]
pub struct PairQuery {
    pub number: Option<String>,
}

/// Body of every pairing response, success or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeResponse {
    pub code: String,
}

/// Build the application router.
pub fn router(service: PairingService) -> Router {
    Router::new()
        .route("/", get(pair))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

async fn pair(
    State(service): State<PairingService>,
    Query(query): Query<PairQuery>,
) -> (StatusCode, Json<CodeResponse>) {
    let raw = query.number.unwrap_or_default();
    match service.request_pairing(&raw).await {
        Ok(code) => (StatusCode::OK, Json(CodeResponse { code })),
        Err(e) => {
            let status = match e {
                PairingError::InvalidAddress { .. } => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            tracing::warn!(status = status.as_u16(), error = %e, "Pairing request failed");
            (
                status,
                Json(CodeResponse {
                    code: e.public_message().to_string(),
                }),
            )
        }
    }
}

/// The HTTP server and its shutdown handle.
pub struct HttpServer {
    addr: SocketAddr,
    router: Option<Router>,
    local_addr: Option<SocketAddr>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl HttpServer {
    pub fn new(addr: SocketAddr, router: Router) -> Self {
        Self {
            addr,
            router: Some(router),
            local_addr: None,
            shutdown_tx: None,
            handle: None,
        }
    }

    /// Bind the listener and spawn the server. Returns the bound address.
    pub async fn start(&mut self) -> Result<SocketAddr, ServerError> {
        let Some(app) = self.router.take() else {
            return Err(ServerError::Serve("server already started".to_string()));
        };

        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: self.addr.to_string(),
                reason: e.to_string(),
            })?;
        let local_addr = listener.local_addr().map_err(|e| ServerError::Bind {
            addr: self.addr.to_string(),
            reason: e.to_string(),
        })?;

        tracing::info!("HTTP server listening on {}", local_addr);

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        self.shutdown_tx = Some(shutdown_tx);
        self.local_addr = Some(local_addr);

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                    tracing::info!("HTTP server shutting down");
                })
                .await
            {
                tracing::error!("HTTP server error: {}", e);
            }
        });

        self.handle = Some(handle);
        Ok(local_addr)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Signal graceful shutdown and wait for the server task to finish.
    pub async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}
