//! Media pipeline adapter: opaque start/stop over a preconfigured RTP
//! receive -> H.264 decode -> render pipeline.
//!
//! Follows the same construction as the encode-side pipeline elsewhere in
//! this codebase — bus watch, hardware-element probing, idempotent `Drop` —
//! mirrored here for the receive side: `udpsrc ! rtph264depay ! h264parse !
//! <decoder> ! videoconvert ! autovideosink`.

use gstreamer::prelude::*;
use gstreamer::{self as gst, ElementFactory};
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// Candidate H.264 decoder elements, probed in preference order the way
/// `encoder.rs` probes encoders: hardware first, software fallback last.
const DECODER_CANDIDATES: &[&str] = &["nvh264dec", "vah264dec", "avdec_h264"];

pub struct MediaPipeline {
    rtp_port: u16,
    /// Loopback address of the IDR channel; the pipeline signals decode
    /// breakage by sending a datagram here.
    idr_addr: SocketAddr,
    pipeline: Option<gst::Pipeline>,
    /// Set by the bus watch on pipeline error; surfaced via [`Self::has_error`].
    pipeline_error: Arc<AtomicBool>,
}

impl MediaPipeline {
    pub fn new(rtp_port: u16, idr_addr: SocketAddr) -> Self {
        Self {
            rtp_port,
            idr_addr,
            pipeline: None,
            pipeline_error: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Idempotent: only the first call while stopped builds and plays the
    /// pipeline.
    pub fn start(&mut self) -> anyhow::Result<()> {
        if self.pipeline.is_some() {
            debug!("media pipeline already running, start() is a no-op");
            return Ok(());
        }

        let decoder_name = detect_decoder()?;
        let launch = format!(
            "udpsrc port={port} caps=\"application/x-rtp, media=video\" \
             ! rtph264depay ! h264parse ! {decoder_name} ! videoconvert ! autovideosink",
            port = self.rtp_port
        );
        info!(pipeline = launch, "starting media pipeline");
        let element = gst::parse::launch(&launch)?;
        let pipeline = element
            .downcast::<gst::Pipeline>()
            .map_err(|_| anyhow::anyhow!("parsed element is not a Pipeline"))?;

        let error_flag = Arc::clone(&self.pipeline_error);
        let idr_addr = self.idr_addr;
        let bus = pipeline.bus().ok_or_else(|| anyhow::anyhow!("pipeline has no bus"))?;
        let _ = bus.add_watch(move |_, msg| {
            use gst::MessageView;
            match msg.view() {
                MessageView::Error(err) => {
                    tracing::error!(
                        source = ?err.src().map(|s| s.name().to_string()),
                        error = %err.error(),
                        "media pipeline error"
                    );
                    error_flag.store(true, Ordering::Relaxed);
                    signal_idr(idr_addr);
                }
                MessageView::Eos(_) => {
                    warn!("media pipeline reached EOS unexpectedly");
                }
                _ => {}
            }
            gst::glib::ControlFlow::Continue
        });

        pipeline.set_state(gst::State::Playing)?;
        self.pipeline = Some(pipeline);
        Ok(())
    }

    /// Idempotent: tears the pipeline down so `rtp_port` is free again.
    pub fn stop(&mut self) {
        if let Some(pipeline) = self.pipeline.take() {
            info!("stopping media pipeline");
            let _ = pipeline.set_state(gst::State::Null);
        }
    }

    pub fn has_error(&self) -> bool {
        self.pipeline_error.load(Ordering::Relaxed)
    }

    pub fn is_playing(&self) -> bool {
        self.pipeline.is_some()
    }
}

impl Drop for MediaPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

fn can_instantiate(name: &str) -> bool {
    match ElementFactory::make(name).build() {
        Ok(elem) => {
            let _ = elem.set_state(gst::State::Null);
            true
        }
        Err(_) => false,
    }
}

fn detect_decoder() -> anyhow::Result<&'static str> {
    for name in DECODER_CANDIDATES {
        if can_instantiate(name) {
            info!(decoder = name, "found working H.264 decoder");
            return Ok(name);
        }
        debug!(decoder = name, "decoder not available, trying next");
    }
    anyhow::bail!("no H.264 decoder found. Install gstreamer plugins (good/bad/ugly).")
}

/// Emit a zero-length datagram to the IDR socket so the negotiation loop
/// requests a keyframe refresh through the same channel a stalled decode
/// would use.
fn signal_idr(idr_addr: SocketAddr) {
    let Ok(sock) = UdpSocket::bind("127.0.0.1:0") else {
        return;
    };
    let _ = sock.send_to(&[], idr_addr);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoder_candidates_prefer_hardware_before_software_fallback() {
        assert_eq!(DECODER_CANDIDATES.last(), Some(&"avdec_h264"));
    }

    #[test]
    fn new_pipeline_is_not_playing_until_started() {
        let addr: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let pipeline = MediaPipeline::new(1028, addr);
        assert!(!pipeline.is_playing());
        assert!(!pipeline.has_error());
    }
}
