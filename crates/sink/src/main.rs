mod dhcp;
mod media;
mod negotiation;
mod p2p;
mod supervisor;
mod supplicant;

use anyhow::Context;
use tracing::info;
use wfd_protocol::WfdSettings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    gstreamer::init().context("failed to initialize GStreamer")?;

    // GStreamer's autovideosink needs a target X display; the sink runs
    // headless on the P2P group's own virtual desktop.
    // SAFETY: single-threaded at this point, before any other env access.
    unsafe {
        std::env::set_var("DISPLAY", ":0");
    }

    let settings = WfdSettings::load();
    info!(
        device_name = settings.device_name,
        rtsp_port = settings.rtsp_port,
        sink_ip = %settings.sink_ip,
        "starting wfd-sink"
    );

    if let Err(e) = supervisor::run(&settings).await {
        tracing::error!(error = %e, "fatal error bringing up sink");
        return Err(e);
    }

    info!("wfd-sink shutdown complete");
    Ok(())
}
