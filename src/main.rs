use log::{error, info};
use std::sync::Arc;
use voicelink::config::ServerConfig;
use voicelink::server::{self, ServerState};
use voicelink::store::RedbStore;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "{} [{:<5}] [{}] - {}",
                chrono::Utc::now().format("%H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();

    let config = ServerConfig::from_env();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to build tokio runtime");

    if let Err(e) = rt.block_on(run(config)) {
        error!("fatal: {e}");
        std::process::exit(1);
    }
}

async fn run(config: ServerConfig) -> anyhow::Result<()> {
    let backend = Arc::new(RedbStore::new(config.db_path.clone()).await?);
    let state = ServerState::new(backend, config.ice_servers.clone());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("voicelink listening on {}", config.bind_addr);

    tokio::select! {
        result = server::run(state, listener) => result,
        _ = shutdown_signal() => {
            info!("shutdown signal received, closing");
            Ok(())
        }
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut term = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
