use crate::consumer::PipelineMetrics;
use crate::producer::drain::DrainMetrics;
use crate::producer::PoolMetrics;
use crate::trace::TraceStore;
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::reload;

pub type LogHandle = reload::Handle<EnvFilter, tracing_subscriber::Registry>;

/// Initialize JSON logging with reloadable level.
pub fn init_tracing(log_level: Option<&str>) -> Result<LogHandle> {
    let level = log_level.unwrap_or("info");
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    let (filter_layer, handle) = reload::Layer::new(filter);
    let fmt_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_timer(fmt::time::UtcTime::rfc_3339());
    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to init tracing: {e}"))?;
    Ok(handle)
}

/// Counters exposed over the debug endpoint while a run is in flight.
#[derive(Clone)]
pub struct DebugState {
    pub store: Arc<TraceStore>,
    pub pool: Arc<PoolMetrics>,
    pub drain: Arc<DrainMetrics>,
    pub pipeline: Arc<PipelineMetrics>,
}

/// Start a minimal HTTP endpoint serving run counters and loglevel controls.
pub async fn start_http(
    bind: &str,
    state: DebugState,
    log_handle: Option<LogHandle>,
) -> Result<()> {
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind debug endpoint on {bind}"))?;
    tracing::info!("debug endpoint listening on {}", bind);
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, addr)) => {
                    let state = state.clone();
                    let log_handle = log_handle.clone();
                    tokio::spawn(async move {
                        if let Err(err) = handle_conn(&mut socket, addr, state, log_handle).await {
                            tracing::warn!("debug handler error: {err:?}");
                        }
                    });
                }
                Err(err) => {
                    tracing::warn!("debug accept error: {err:?}");
                }
            }
        }
    });
    Ok(())
}

async fn handle_conn(
    socket: &mut tokio::net::TcpStream,
    _addr: SocketAddr,
    state: DebugState,
    log_handle: Option<LogHandle>,
) -> Result<()> {
    let mut buf = [0u8; 4096];
    let n = socket.read(&mut buf).await?;
    let req = String::from_utf8_lossy(&buf[..n]);
    let mut iter = req.lines();
    let first = iter.next().unwrap_or("");
    let path = first
        .split_whitespace()
        .nth(1)
        .unwrap_or("/")
        .split('?')
        .collect::<Vec<_>>();
    let route = path[0];
    let query = if path.len() > 1 { path[1] } else { "" };
    let (status, body, content_type) = match route {
        "/metrics" => (200, collect_metrics(&state), "text/plain"),
        "/livez" => livez(&state),
        "/v1/loglevel" => {
            if let Some(handle) = log_handle {
                if let Some(level) = query.strip_prefix("level=") {
                    if let Ok(filter) = EnvFilter::try_new(level) {
                        let _ = handle.modify(|f| *f = filter);
                    }
                }
            }
            (200, "{\"status\":\"ok\"}".to_string(), "application/json")
        }
        _ => (404, "not found".to_string(), "text/plain"),
    };
    let resp = format!(
        "HTTP/1.1 {} OK\r\nContent-Type: {}\r\nContent-Length: {}\r\n\r\n{}",
        status,
        content_type,
        body.len(),
        body
    );
    socket.write_all(resp.as_bytes()).await?;
    Ok(())
}

fn collect_metrics(state: &DebugState) -> String {
    format!(
        "kafprobe_traces_total {}\nkafprobe_messages_enqueued_total {}\nkafprobe_messages_submitted_total {}\nkafprobe_messages_rejected_total {}\nkafprobe_deliveries_total {}\nkafprobe_delivery_errors_total {}\nkafprobe_undecodable_payloads_total {}\nkafprobe_stats_events_total {}\nkafprobe_client_errors_total {}\nkafprobe_records_received_total {}\nkafprobe_callback_failures_total {}\n",
        state.store.len(),
        state.pool.enqueued(),
        state.pool.submitted(),
        state.pool.rejected(),
        state.drain.deliveries(),
        state.drain.delivery_errors(),
        state.drain.undecodable(),
        state.drain.stats_events(),
        state.drain.client_errors(),
        state.pipeline.received(),
        state.pipeline.callback_failures(),
    )
}

fn livez(state: &DebugState) -> (u16, String, &'static str) {
    let body = format!(
        "{{\"live\":true,\"traces\":{},\"received\":{}}}",
        state.store.len(),
        state.pipeline.received()
    );
    (200, body, "application/json")
}
