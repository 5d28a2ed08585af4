//! Config & Bootstrap (§4.I) — composition root wiring every component
//! into one `AppState` and owning startup/shutdown ordering.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::hub::Hub;
use crate::osc;
use crate::pulsar::{PulsarChannel, PulsarEvent};
use crate::supervisor::Supervisor;
use crate::{control, ws};

const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<Hub>,
}

pub async fn run(config: Config) -> anyhow::Result<()> {
    let http_addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    let osc_addr = SocketAddr::from(([0, 0, 0, 0], config.osc_port));

    // The one place an unrecoverable bind failure exits the process non-zero
    // immediately (§6 exit codes).
    let http_listener = TcpListener::bind(http_addr).await?;
    let osc_socket = UdpSocket::bind(osc_addr).await?;

    let (pulsar_events_tx, pulsar_events_rx) = mpsc::unbounded_channel();
    let supervisor = Arc::new(Supervisor::new(config.clone()));
    let pulsar = Arc::new(PulsarChannel::new(
        config.clone(),
        pulsar_events_tx,
        supervisor.clone(),
    ));
    let hub = Arc::new(Hub::new(pulsar.clone()));

    tokio::spawn(pulsar_event_loop(
        pulsar_events_rx,
        hub.clone(),
        pulsar.clone(),
        supervisor.clone(),
    ));
    tokio::spawn(osc::run(osc_socket, hub.clone()));

    let state = AppState { hub: hub.clone() };
    let app = Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/api/status", get(control::status))
        .route("/api/screen", get(control::screen))
        .route("/api/health", get(control::health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    tracing::info!(%http_addr, %osc_addr, mode = ?config.pulsar_mode, "quasar listening");

    axum::serve(http_listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("shutdown signal received, cancelling components");
    let shutdown_sequence = async {
        hub.close_all_peers();
        hub.clear_all_slots().await;
        pulsar.shutdown().await;
        supervisor.remove().await;
    };
    if tokio::time::timeout(SHUTDOWN_DEADLINE, shutdown_sequence)
        .await
        .is_err()
    {
        tracing::warn!("shutdown deadline exceeded, forcing exit");
        std::process::exit(1);
    }

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// Drains PULSAR channel events: feeds stdout lines to the Frame Parser via
/// the hub, and on unexpected exit clears every slot ticker, invalidates
/// the channel, and removes the supervisor entry (§7).
async fn pulsar_event_loop(
    mut events: mpsc::UnboundedReceiver<PulsarEvent>,
    hub: Arc<Hub>,
    pulsar: Arc<PulsarChannel>,
    supervisor: Arc<Supervisor>,
) {
    while let Some(event) = events.recv().await {
        match event {
            PulsarEvent::Line(line) => hub.feed_pulsar_line(&line),
            PulsarEvent::Exited => {
                tracing::warn!("pulsar exited unexpectedly, clearing slots");
                hub.clear_all_slots().await;
                pulsar.invalidate().await;
                supervisor.remove().await;
            }
        }
    }
}
