mod hub;
mod routes;
mod telemetry;
mod ws;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use scoreboard_capture::{
    CaptureError, CaptureLoop, CaptureObserver, LifecycleEvent, SourceSpec, StopReason,
};
use scoreboard_common::config::Config;
use scoreboard_common::frame::DecodedValues;
use scoreboard_vision::PreviewFrames;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinError;
use tracing::{error, info, warn};

use crate::hub::{BroadcastHub, HubObserver};
use crate::routes::{AppState, PreviewStore};
use crate::telemetry::CpuSampler;

#[derive(Debug, thiserror::Error)]
enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },
    #[error("server failed: {0}")]
    Serve(std::io::Error),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error("background task failed: {0}")]
    Task(#[from] JoinError),
}

// ---------------------------------------------------------------------------
// Shutdown
// ---------------------------------------------------------------------------

/// Hands the capture loop's terminal event to the async side.
struct ShutdownSignal {
    tx: Mutex<Option<oneshot::Sender<StopReason>>>,
}

impl CaptureObserver for ShutdownSignal {
    fn notify(&self, _values: &DecodedValues, _previews: &PreviewFrames) {}

    fn on_lifecycle(&self, event: &LifecycleEvent) {
        if let LifecycleEvent::Stopped { reason } = event {
            let tx = self
                .tx
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            if let Some(tx) = tx {
                let _ = tx.send(reason.clone());
            }
        }
    }

    fn name(&self) -> &str {
        "shutdown-signal"
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", config_path.display());
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    if let Err(e) = run(config).await {
        error!(error = %e, "scoreboard server exiting");
        std::process::exit(1);
    }
}

async fn bind(addr: &str) -> Result<TcpListener, ServerError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.to_string(),
            source,
        })
}

async fn run(config: Config) -> Result<(), ServerError> {
    let hub = Arc::new(BroadcastHub::new(config.server.queue_depth));
    let store = Arc::new(PreviewStore::default());
    let (stop_tx, stop_rx) = oneshot::channel();

    let source = SourceSpec::from_config(&config.capture);
    info!(source = %source.kind, width = source.width, height = source.height, "scoreboard server starting");
    let capture = Arc::new(CaptureLoop::new(
        Arc::new(source),
        config.groups.clone(),
        config.processing.clone(),
        Duration::from_millis(config.capture.frame_delay_ms),
    ));
    capture.add_observer(Arc::new(HubObserver::new(Arc::clone(&hub))));
    capture.add_observer(store.clone());
    capture.add_observer(Arc::new(CpuSampler::new(Duration::from_secs(
        config.telemetry.cpu_sample_secs,
    ))));
    capture.add_observer(Arc::new(ShutdownSignal {
        tx: Mutex::new(Some(stop_tx)),
    }));

    let ws_listener = bind(&config.server.ws_addr).await?;
    let http_listener = bind(&config.server.http_addr).await?;
    info!(ws = %config.server.ws_addr, http = %config.server.http_addr, "listening");

    let ws_app = ws::router(Arc::clone(&hub));
    let http_app = routes::router(
        Arc::new(AppState {
            capture: Arc::clone(&capture),
            store,
        }),
        config.server.static_dir.as_deref().map(Path::new),
    );
    let ws_server = tokio::spawn(async move {
        axum::serve(
            ws_listener,
            ws_app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
    });
    let http_server = tokio::spawn(async move { axum::serve(http_listener, http_app).await });

    // Opening a device or spawning ffmpeg blocks.
    let starter = Arc::clone(&capture);
    tokio::task::spawn_blocking(move || starter.start()).await??;

    let outcome = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
            Ok(())
        }
        reason = stop_rx => {
            match reason {
                Ok(reason) => info!(?reason, "capture loop finished"),
                Err(_) => warn!("capture loop dropped its shutdown signal"),
            }
            Ok(())
        }
        res = ws_server => flatten(res),
        res = http_server => flatten(res),
    };

    let killer = Arc::clone(&capture);
    tokio::task::spawn_blocking(move || killer.kill()).await?;
    info!(clients = hub.len(), "scoreboard server stopped");
    outcome
}

fn flatten(res: Result<std::io::Result<()>, JoinError>) -> Result<(), ServerError> {
    res?.map_err(ServerError::Serve)
}
