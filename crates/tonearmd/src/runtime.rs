//! Daemon runtime: wires registries, player and server, and waits for shutdown.

use std::net::TcpListener;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use tonearm_engine::{DecoderRegistry, OutputRegistry, Player, device};

use crate::config::DaemonConfig;
use crate::server;
use crate::session::Session;

/// Print output devices to stdout.
pub fn list_devices() -> Result<()> {
    let host = cpal::default_host();
    for (i, name) in device::list_devices(&host)?.iter().enumerate() {
        println!("#{i}: {name}");
    }
    Ok(())
}

/// Run until Ctrl-C, then close the player and return.
pub fn run(config: DaemonConfig) -> Result<()> {
    let decoders = DecoderRegistry::with_defaults();
    let outputs = OutputRegistry::with_defaults();
    let output = outputs.get(&config.output).ok_or_else(|| {
        anyhow!(
            "unknown output backend {:?} (available: {})",
            config.output,
            outputs.names().join(", ")
        )
    })?;

    if !config.media_dir.is_dir() {
        tracing::warn!(media_dir = %config.media_dir.display(), "media directory does not exist");
    }
    tracing::info!(
        output = %config.output,
        device = config.output_config.device.as_deref().unwrap_or("default"),
        formats = %decoders.extensions().join(","),
        "starting player"
    );

    let player = Arc::new(Player::spawn(
        decoders.clone(),
        output,
        config.output_config.clone(),
        config.engine.clone(),
    ));

    let listener =
        TcpListener::bind(config.bind).with_context(|| format!("bind {}", config.bind))?;
    let session = Arc::new(Session::new(
        player.clone(),
        config.media_dir.clone(),
        decoders,
    ));
    let _server = server::spawn_server(listener, session)?;

    let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
    ctrlc::set_handler(move || {
        let _ = stop_tx.try_send(());
    })
    .context("install Ctrl-C handler")?;

    let _ = stop_rx.recv();
    tracing::info!("shutting down");
    player.close();
    Ok(())
}
