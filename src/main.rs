use std::path::Path;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::info;
use tracing_subscriber::EnvFilter;

use roomwise::calendar::{CalendarQueue, NoopCalendarClient};
use roomwise::engine::Engine;
use roomwise::{seed, wire};

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let metrics_port: Option<u16> = std::env::var("ROOMWISE_METRICS_PORT")
        .ok()
        .and_then(|s| s.parse().ok());
    roomwise::observability::init(metrics_port)?;

    let port = std::env::var("ROOMWISE_PORT").unwrap_or_else(|_| "5433".into());
    let bind = std::env::var("ROOMWISE_BIND").unwrap_or_else(|_| "0.0.0.0".into());
    let max_connections: usize = env_or("ROOMWISE_MAX_CONNECTIONS", 256);
    let calendar_queue: usize = env_or("ROOMWISE_CALENDAR_QUEUE", 1024);
    let rooms_file = std::env::var("ROOMWISE_ROOMS_FILE").ok();

    let tls_cert = std::env::var("ROOMWISE_TLS_CERT").ok();
    let tls_key = std::env::var("ROOMWISE_TLS_KEY").ok();
    let tls_acceptor =
        roomwise::tls::load_tls_acceptor(tls_cert.as_deref(), tls_key.as_deref())?;

    let rooms = match &rooms_file {
        Some(path) => seed::load_rooms(Path::new(path))?,
        None => seed::default_rooms(),
    };

    let (calendar, calendar_task) = CalendarQueue::spawn(Arc::new(NoopCalendarClient), calendar_queue);
    let engine = Arc::new(Engine::new(rooms, calendar)?);
    let semaphore = Arc::new(Semaphore::new(max_connections));

    let addr = format!("{bind}:{port}");
    let listener = TcpListener::bind(&addr).await?;
    info!("roomwise listening on {addr}");
    info!("  rooms: {}", rooms_file.as_deref().unwrap_or("built-in"));
    info!("  max_connections: {max_connections}");
    info!("  tls: {}", if tls_acceptor.is_some() { "enabled" } else { "disabled" });
    info!("  metrics: {}", metrics_port.map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics")));

    // Stop accepting on SIGTERM/ctrl-c, then drain in-flight connections
    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
        }
    };
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (socket, peer) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        tracing::error!("accept error: {e}");
                        continue;
                    }
                };

                let permit = match semaphore.clone().try_acquire_owned() {
                    Ok(permit) => permit,
                    Err(_) => {
                        tracing::warn!("connection limit reached, rejecting {peer}");
                        metrics::counter!(roomwise::observability::CONNECTIONS_REJECTED_TOTAL).increment(1);
                        drop(socket);
                        continue;
                    }
                };

                info!("connection from {peer}");
                metrics::counter!(roomwise::observability::CONNECTIONS_TOTAL).increment(1);
                metrics::gauge!(roomwise::observability::CONNECTIONS_ACTIVE).increment(1.0);
                let engine = engine.clone();
                let tls = tls_acceptor.clone();

                tokio::spawn(async move {
                    let _permit = permit; // held until connection closes
                    if let Err(e) = wire::process_connection(socket, engine, tls).await {
                        tracing::error!("connection error from {peer}: {e}");
                    }
                    metrics::gauge!(roomwise::observability::CONNECTIONS_ACTIVE).decrement(1.0);
                });
            }
            _ = &mut shutdown => {
                info!("shutdown signal received, stopping accept loop");
                break;
            }
        }
    }

    // Wait for in-flight connections to finish (up to 10s)
    info!("draining connections...");
    let drain_deadline = tokio::time::sleep(std::time::Duration::from_secs(10));
    tokio::pin!(drain_deadline);

    loop {
        if semaphore.available_permits() == max_connections {
            info!("all connections drained");
            break;
        }
        tokio::select! {
            _ = &mut drain_deadline => {
                let remaining = max_connections - semaphore.available_permits();
                tracing::warn!("drain timeout, {remaining} connections still open");
                break;
            }
            _ = tokio::time::sleep(std::time::Duration::from_millis(100)) => {}
        }
    }

    // Dropping the engine closes the calendar queue; let the sync task flush.
    drop(engine);
    if tokio::time::timeout(std::time::Duration::from_secs(5), calendar_task).await.is_err() {
        tracing::warn!("calendar sync still busy at exit");
    }

    info!("roomwise stopped");
    Ok(())
}
