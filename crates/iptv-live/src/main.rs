use std::sync::Arc;

use anyhow::Context;
use iptv_live::core::{BroadcastMessage, CoreSettings, LiveCore, LiveEvent};
use iptv_live::epg::{EpgCache, PanelEpgSource};
use iptv_live::favorites::FileFavorites;
use iptv_live::handoff::MpvHandoff;
use iptv_live::http::{self, HttpState};
use iptv_proto::catalog::{
    load_catalog_from_m3u, load_catalog_from_toml, parse_catalog_from_m3u_str, Catalog,
};
use iptv_proto::config::{CatalogConfig, Config};
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Channel list from `channels.toml`, else from the configured M3U file or URL.
async fn load_catalog(
    config: &CatalogConfig,
    timeout: std::time::Duration,
) -> anyhow::Result<Catalog> {
    if config.channels_toml.exists() {
        return load_catalog_from_toml(&config.channels_toml);
    }

    let Some(m3u) = config.m3u.as_deref() else {
        warn!(
            "No channel list: {:?} missing and no m3u configured",
            config.channels_toml
        );
        return Ok(Catalog::default());
    };

    if m3u.starts_with("http://") || m3u.starts_with("https://") {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let body = client
            .get(m3u)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        parse_catalog_from_m3u_str(&body)
    } else {
        load_catalog_from_m3u(std::path::Path::new(m3u))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let data_dir = iptv_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("iptv-live.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,iptv_live=debug")),
        )
        .init();

    info!("Log file: {:?}", log_path);

    let config = Config::load()?;
    info!("Config loaded from: {:?}", Config::config_path());

    let credentials = config.panel.credentials();
    if !credentials.is_complete() {
        warn!("Panel credentials incomplete: streams and EPG are disabled");
    }

    let catalog = load_catalog(&config.catalog, config.epg.request_timeout())
        .await
        .context("loading channel catalog")?;
    info!(
        "Catalog: {} channels in {} categories",
        catalog.channels.len(),
        catalog.categories.len()
    );

    let (broadcast_tx, _) = broadcast::channel::<BroadcastMessage>(1024);
    let (event_tx, event_rx) = mpsc::channel::<LiveEvent>(256);

    let source = PanelEpgSource::new(config.epg.request_timeout())?;
    let epg = Arc::new(
        EpgCache::new(Arc::new(source), credentials.clone())
            .with_concurrency(config.epg.concurrency)
            .with_refresh_interval(config.epg.refresh_interval()),
    );

    let favorites = FileFavorites::open(data_dir.join("favorites.json"));
    let player = MpvHandoff::new(config.player.mpv_binary.clone(), event_tx.clone());

    let core = LiveCore::new(
        CoreSettings::from(&config),
        catalog,
        credentials,
        epg,
        Box::new(favorites),
        Box::new(player),
        broadcast_tx.clone(),
    );

    if config.http.enabled {
        let _http_handle = http::start_server(
            config.http.bind_address.clone(),
            config.http.port,
            HttpState {
                snapshot: core.snapshot(),
                epg: core.epg(),
                event_tx: event_tx.clone(),
            },
        );
    }

    let shutdown_tx = event_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received");
            let _ = shutdown_tx.send(LiveEvent::Shutdown).await;
        }
    });
    drop(event_tx);

    info!("Engine initialised, running event loop");
    core.run(event_rx).await?;

    Ok(())
}
