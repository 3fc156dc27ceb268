//! Session supervisor: brings up the Wi-Fi Direct group and DHCP lease once
//! at startup, then accepts RTSP connections one at a time and drives each
//! through the negotiation state machine and media pipeline.
//!
//! The accept loop is intentionally serial — one negotiated session at a
//! time — since a WFD sink talks to exactly one source.

use socket2::{Domain, Socket, Type};
use std::net::{IpAddr, SocketAddr, TcpListener as StdTcpListener};
use std::time::Duration;
use tokio::net::{TcpListener, UdpSocket};
use tracing::{error, info, warn};
use wfd_protocol::WfdSettings;

use crate::dhcp::DhcpAttendant;
use crate::media::MediaPipeline;
use crate::negotiation::{self, FramedRtsp};
use crate::p2p;

/// Bring the group and lease service up, then serve sessions until the
/// process receives a shutdown signal. Returns an error only for startup
/// failures; per-session errors are logged and the supervisor re-accepts.
pub async fn run(settings: &WfdSettings) -> anyhow::Result<()> {
    let iface = p2p::bring_up(settings)?;
    info!(iface, "wifi direct group ready");

    let _dhcp = DhcpAttendant::start(&iface, settings)?;
    tokio::time::sleep(Duration::from_millis(500)).await;
    p2p::configure_wps_pin(&iface, settings)?;

    let listener = bind_listener(IpAddr::V4(settings.sink_ip), settings.rtsp_port)?;
    info!(addr = %listener.local_addr()?, "rtsp listener bound");

    tokio::select! {
        result = accept_loop(listener, settings) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
            Ok(())
        }
    }
}

/// `SO_REUSEADDR` + a backlog of one connection: exactly the concurrency a
/// single-source WFD sink needs, and reuse lets a restarted process rebind
/// immediately after the old listener's TIME_WAIT.
fn bind_listener(addr: IpAddr, port: u16) -> anyhow::Result<TcpListener> {
    let socket = Socket::new(Domain::IPV4, Type::STREAM, None)?;
    socket.set_reuse_address(true)?;
    let sockaddr: SocketAddr = (addr, port).into();
    socket.bind(&sockaddr.into())?;
    socket.listen(1)?;
    let std_listener: StdTcpListener = socket.into();
    std_listener.set_nonblocking(true)?;
    Ok(TcpListener::from_std(std_listener)?)
}

async fn accept_loop(listener: TcpListener, settings: &WfdSettings) -> anyhow::Result<()> {
    loop {
        let (stream, peer_addr) = listener.accept().await?;
        stream.set_nodelay(true)?;
        info!(%peer_addr, "source connected");

        if let Err(e) = serve_session(stream, settings).await {
            warn!(error = %e, "session ended with error");
        }
    }
}

async fn serve_session(stream: tokio::net::TcpStream, settings: &WfdSettings) -> anyhow::Result<()> {
    let idr_socket = UdpSocket::bind("127.0.0.1:0").await?;
    let idr_addr = idr_socket.local_addr()?;

    let mut framed = FramedRtsp::new(stream);
    let (negotiated, cseq) =
        negotiation::negotiate(&mut framed, settings.peer_ip, settings.rtp_port).await?;
    info!(session_id = negotiated.session_id, server_port = negotiated.server_rtp_port, "negotiation complete");

    // Left unstarted: the session loop's own `wfd_video_formats` handling is
    // what starts the pipeline, the first time it appears in-session.
    let mut media = MediaPipeline::new(settings.rtp_port, idr_addr);

    match negotiation::run_session(&mut framed, &idr_socket, &mut media, cseq).await {
        Ok(negotiation::SessionEnd::Teardown) => info!("session torn down by peer"),
        Ok(negotiation::SessionEnd::PeerClosed) => info!("peer closed connection"),
        Err(e) => error!(error = %e, "session loop failed"),
    }

    media.stop();
    Ok(())
}
