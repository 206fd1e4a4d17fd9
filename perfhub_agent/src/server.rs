//! Router assembly and the agent's serve loop.

use anyhow::Context;
use axum::{
    routing::{get, post},
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::AgentConfig;
use crate::hub::{spawn_hub, Hub};
use crate::longpoll::{self, spawn_session_reaper};
use crate::pull;
use crate::sampler::Sampler;
use crate::source::SysinfoSource;
use crate::state::AppState;
use crate::tls::ensure_self_signed_cert;
use crate::ws;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/performance/metrics", get(pull::get_metrics))
        .route("/api/performance/stats", get(pull::get_stats))
        .route(
            "/performanceHub",
            get(ws::ws_handler).delete(longpoll::disconnect),
        )
        .route("/performanceHub/negotiate", post(longpoll::negotiate))
        .route("/performanceHub/poll", get(longpoll::poll))
        .with_state(state)
}

pub async fn run(cfg: AgentConfig) -> anyhow::Result<()> {
    let state = AppState::new(&cfg);
    let source = SysinfoSource::new().context("initializing metrics source")?;
    let shutdown = CancellationToken::new();

    let hub = Hub::new(
        Sampler::new(source),
        state.store.clone(),
        state.registry.clone(),
        cfg.summary_every,
    );
    let hub_task = spawn_hub(hub, cfg.tick, shutdown.child_token());
    let reaper = spawn_session_reaper(state.clone(), cfg.session_idle, shutdown.child_token());

    tokio::spawn(wait_for_signal(shutdown.clone()));
    {
        // Closing every push connection lets upgraded sockets and held polls
        // finish so graceful shutdown can complete.
        let state = state.clone();
        let token = shutdown.clone();
        tokio::spawn(async move {
            token.cancelled().await;
            state.close_all();
        });
    }

    let app = build_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));

    if cfg.enable_ssl {
        let (cert, key) = ensure_self_signed_cert()?;
        let tls = RustlsConfig::from_pem_file(&cert, &key)
            .await
            .context("loading TLS certificate")?;
        let handle = axum_server::Handle::new();
        {
            let handle = handle.clone();
            let token = shutdown.clone();
            tokio::spawn(async move {
                token.cancelled().await;
                handle.graceful_shutdown(Some(Duration::from_secs(5)));
            });
        }
        info!("perfhub agent listening at https://{addr}");
        axum_server::bind_rustls(addr, tls)
            .handle(handle)
            .serve(app.into_make_service())
            .await
            .context("serving https")?;
    } else {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("binding {addr}"))?;
        info!("perfhub agent listening at http://{}", listener.local_addr()?);
        let token = shutdown.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { token.cancelled().await })
            .await
            .context("serving http")?;
    }

    shutdown.cancel();
    let _ = hub_task.await;
    let _ = reaper.await;
    info!("perfhub agent stopped");
    Ok(())
}

async fn wait_for_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C"),
        _ = terminate => info!("received SIGTERM"),
    }
    token.cancel();
}
