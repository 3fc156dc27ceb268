//! Negotiation state machine: drives the M1-M7 WFD capability handshake over
//! a single RTSP connection, then runs the in-session GET/SET_PARAMETER echo
//! loop, IDR triggering, and idle watchdog.
//!
//! The read/write halves are generic over `AsyncRead + AsyncWrite` so the
//! handshake can be driven over an in-memory duplex stream in tests and a
//! real `TcpStream` in the supervisor.
//!
//! The session loop polls three sources with `tokio::select!` — the TCP
//! stream, the loopback IDR datagram socket, and a tick timer — instead of a
//! manual non-blocking poll loop. Each branch is a single cancel-safe
//! `AsyncReadExt::read`, so whichever source has data wins the race; see
//! DESIGN.md for why this replaces an explicit `WouldBlock` poll.

use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};
use wfd_protocol::rtsp::{extract_server_port, extract_session_id, CodecError, Message};

use crate::media::MediaPipeline;

#[derive(Debug, thiserror::Error)]
pub enum NegotiationError {
    #[error("protocol error during negotiation: {0}")]
    Protocol(#[from] CodecError),
    #[error("connection closed during negotiation")]
    Closed,
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unexpected message during {state}: {message:?}")]
    Unexpected { state: &'static str, message: Message },
}

const WATCHDOG_TICK: Duration = Duration::from_millis(10);
const WATCHDOG_THRESHOLD: u32 = 7000; // 70s of peer silence

/// Buffers partially-received bytes across reads so pipelined RTSP messages
/// arriving in one read are parsed out one at a time, in order.
pub struct FramedRtsp<S> {
    stream: S,
    buf: Vec<u8>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> FramedRtsp<S> {
    pub fn new(stream: S) -> Self {
        Self { stream, buf: Vec::new() }
    }

    /// Read and parse the next complete message, awaiting until enough bytes
    /// arrive. Used for the handshake, which has no explicit per-message
    /// deadline.
    pub async fn read_message(&mut self) -> Result<Message, NegotiationError> {
        loop {
            match Message::parse(&self.buf) {
                Ok((msg, consumed)) => {
                    self.buf.drain(..consumed);
                    return Ok(msg);
                }
                Err(CodecError::Truncated) => {
                    let mut chunk = [0u8; 4096];
                    let n = self.stream.read(&mut chunk).await?;
                    if n == 0 {
                        return Err(NegotiationError::Closed);
                    }
                    self.buf.extend_from_slice(&chunk[..n]);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Non-blocking variant for the session loop: returns a message already
    /// buffered from a prior read without touching the socket, and only
    /// awaits a fresh read if the buffer holds no complete message.
    pub async fn read_available(&mut self) -> Result<Option<Message>, NegotiationError> {
        if let Some(msg) = self.try_parse_buffered()? {
            return Ok(Some(msg));
        }
        let mut chunk = [0u8; 4096];
        let n = self.stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(NegotiationError::Closed);
        }
        self.buf.extend_from_slice(&chunk[..n]);
        self.try_parse_buffered()
    }

    /// Parse one message out of whatever's already buffered, without
    /// touching the socket. Used to drain pipelined messages already in
    /// `buf` before the session loop awaits another TCP read.
    pub fn try_parse_buffered(&mut self) -> Result<Option<Message>, NegotiationError> {
        match Message::parse(&self.buf) {
            Ok((msg, consumed)) => {
                self.buf.drain(..consumed);
                Ok(Some(msg))
            }
            Err(CodecError::Truncated) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn write_message(&mut self, msg: &Message) -> Result<(), NegotiationError> {
        self.stream.write_all(&msg.emit()).await?;
        Ok(())
    }
}

/// What the session loop needs out of the handshake.
pub struct NegotiatedSession {
    pub session_id: String,
    pub server_rtp_port: u16,
}

/// CSeq counter for sink-initiated requests: M2=100, M6=101, M7=102, then IDR
/// requests 103, 104, … — monotonic, never reused.
pub struct OutboundCseq(u32);

impl OutboundCseq {
    pub fn starting_at(value: u32) -> Self {
        Self(value)
    }

    pub fn next(&mut self) -> u32 {
        let v = self.0;
        self.0 += 1;
        v
    }
}

/// Drive M1 through M7 to completion. Any parse or protocol error here is
/// fatal to the connection.
pub async fn negotiate<S: AsyncRead + AsyncWrite + Unpin>(
    framed: &mut FramedRtsp<S>,
    peer_ip: std::net::Ipv4Addr,
    rtp_port: u16,
) -> Result<(NegotiatedSession, OutboundCseq), NegotiationError> {
    let mut cseq = OutboundCseq::starting_at(100);

    // M1: source probes options, sink echoes CSeq with a Public header.
    let m1 = framed.read_message().await?;
    require_method(&m1, "OPTIONS", "M1")?;
    let reply_cseq = m1.cseq().unwrap_or(1);
    let mut reply = Message::ok_response(reply_cseq);
    reply
        .headers
        .insert("Public", "org.wfs.wfd1.0, SET_PARAMETER, GET_PARAMETER");
    framed.write_message(&reply).await?;
    debug!("M1 complete");

    // M2: sink probes options.
    let mut m2 = Message::request("OPTIONS", "*", cseq.next());
    m2.headers.insert("Require", "org.wfs.wfd1.0");
    framed.write_message(&m2).await?;
    let _ = framed.read_message().await?; // any response is acceptable
    debug!("M2 complete");

    // M3: source queries parameters; sink replies with its capability block.
    let m3 = framed.read_message().await?;
    require_method(&m3, "GET_PARAMETER", "M3")?;
    let body = wfd_protocol::params::build_m3_body(rtp_port);
    let m3_reply = Message::ok_response(m3.cseq().unwrap_or(0)).with_body("text/parameters", body);
    framed.write_message(&m3_reply).await?;
    debug!("M3 complete");

    // M4: source sets parameters; sink acks.
    let m4 = framed.read_message().await?;
    require_method(&m4, "SET_PARAMETER", "M4")?;
    framed.write_message(&Message::ok_response(m4.cseq().unwrap_or(0))).await?;
    debug!("M4 complete");

    // M5: source triggers SETUP; sink acks without inspecting the body.
    let m5 = framed.read_message().await?;
    require_method(&m5, "SET_PARAMETER", "M5")?;
    framed.write_message(&Message::ok_response(m5.cseq().unwrap_or(0))).await?;
    debug!("M5 complete");

    // M6: sink sends SETUP, extracts the session id and server RTP port.
    let mut m6 = Message::request(
        "SETUP",
        format!("rtsp://{peer_ip}/wfd1.0/streamid=0"),
        cseq.next(),
    );
    m6.headers
        .insert("Transport", format!("RTP/AVP/UDP;unicast;client_port={rtp_port}"));
    framed.write_message(&m6).await?;
    let m6_reply = framed.read_message().await?;
    let session_id = extract_session_id(&m6_reply).ok_or_else(|| NegotiationError::Unexpected {
        state: "M6",
        message: m6_reply.clone(),
    })?;
    let server_rtp_port = extract_server_port(&m6_reply).ok_or(NegotiationError::Unexpected {
        state: "M6",
        message: m6_reply,
    })?;
    debug!(session_id, server_rtp_port, "M6 complete");

    // M7: sink sends PLAY.
    let mut m7 = Message::request(
        "PLAY",
        format!("rtsp://{peer_ip}/wfd1.0/streamid=0"),
        cseq.next(),
    );
    m7.headers.insert("Session", &session_id);
    framed.write_message(&m7).await?;
    let _ = framed.read_message().await?;
    info!(session_id, "M7 complete, entering session state");

    Ok((NegotiatedSession { session_id, server_rtp_port }, cseq))
}

fn require_method(msg: &Message, expected: &str, state: &'static str) -> Result<(), NegotiationError> {
    match msg.method() {
        Some(m) if m == expected => Ok(()),
        _ => Err(NegotiationError::Unexpected { state, message: msg.clone() }),
    }
}

/// Why the session loop returned.
pub enum SessionEnd {
    Teardown,
    PeerClosed,
}

/// Run the in-session GET/SET_PARAMETER echo loop, IDR triggering, and idle
/// watchdog until teardown or peer close.
pub async fn run_session<S: AsyncRead + AsyncWrite + Unpin>(
    framed: &mut FramedRtsp<S>,
    idr_socket: &UdpSocket,
    media: &mut MediaPipeline,
    mut cseq: OutboundCseq,
) -> Result<SessionEnd, NegotiationError> {
    let mut watchdog_ticks: u32 = 0;
    let mut idr_buf = [0u8; 1500];

    loop {
        tokio::select! {
            tcp = framed.read_available() => {
                match tcp {
                    Ok(Some(msg)) => {
                        watchdog_ticks = 0;
                        if let Some(end) = handle_session_message(framed, media, &msg).await? {
                            return Ok(end);
                        }
                        // A single read can land several pipelined messages;
                        // drain all of them before returning to `select!` and
                        // awaiting a fresh read.
                        while let Some(msg) = framed.try_parse_buffered()? {
                            if let Some(end) = handle_session_message(framed, media, &msg).await? {
                                return Ok(end);
                            }
                        }
                    }
                    Ok(None) => {
                        // Partial message buffered; keep waiting.
                    }
                    Err(NegotiationError::Closed) => {
                        media.stop();
                        return Ok(SessionEnd::PeerClosed);
                    }
                    Err(e) => return Err(e),
                }
            }
            idr = idr_socket.recv(&mut idr_buf) => {
                idr?;
                watchdog_ticks = 0;
                send_idr_request(framed, &mut cseq).await?;
            }
            _ = tokio::time::sleep(WATCHDOG_TICK) => {
                watchdog_ticks += 1;
                if watchdog_ticks == WATCHDOG_THRESHOLD {
                    warn!("no peer activity for 70s, stopping media pipeline");
                    media.stop();
                }
            }
        }
    }
}

/// Process one parsed RTSP message within the session loop. Returns
/// `Some(end)` if the session should terminate.
async fn handle_session_message<S: AsyncRead + AsyncWrite + Unpin>(
    framed: &mut FramedRtsp<S>,
    media: &mut MediaPipeline,
    msg: &Message,
) -> Result<Option<SessionEnd>, NegotiationError> {
    let body = msg.body_str();
    if body.contains("wfd_trigger_method: TEARDOWN") {
        info!("teardown received, stopping media pipeline");
        media.stop();
        return Ok(Some(SessionEnd::Teardown));
    }

    if body.contains("wfd_video_formats") && !media.is_playing() {
        info!("video format renegotiation, starting media pipeline");
        media.start().map_err(|e| {
            warn!(error = %e, "failed to start media pipeline");
            NegotiationError::Unexpected {
                state: "SESSION",
                message: msg.clone(),
            }
        })?;
    }

    if matches!(msg.method(), Some("GET_PARAMETER") | Some("SET_PARAMETER")) {
        if let Some(cseq) = msg.cseq() {
            framed.write_message(&Message::ok_response(cseq)).await?;
        }
    } else if msg.method().is_some() {
        debug!(method = msg.method(), "ignoring unrecognized method in session state");
    }

    Ok(None)
}

/// Send one `SET_PARAMETER` IDR request per datagram received on the IDR
/// channel, so a burst of decode errors can't amplify into a CSeq storm.
async fn send_idr_request<S: AsyncRead + AsyncWrite + Unpin>(
    framed: &mut FramedRtsp<S>,
    cseq: &mut OutboundCseq,
) -> Result<(), NegotiationError> {
    let msg = Message::request("SET_PARAMETER", "rtsp://localhost/wfd1.0", cseq.next())
        .with_body("text/parameters", "wfd-idr-request\r\n");
    framed.write_message(&msg).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbound_cseq_is_monotonic_from_100() {
        let mut c = OutboundCseq::starting_at(100);
        assert_eq!(c.next(), 100);
        assert_eq!(c.next(), 101);
        assert_eq!(c.next(), 102);
        assert_eq!(c.next(), 103);
        assert_eq!(c.next(), 104);
    }

    #[tokio::test]
    async fn negotiation_happy_path_produces_session_and_cseq_state() {
        let (mut client, server) = tokio::io::duplex(8192);
        let server_task = tokio::spawn(async move {
            let mut framed = FramedRtsp::new(server);
            negotiate(&mut framed, "192.168.173.80".parse().unwrap(), 1028).await
        });

        // M1
        client
            .write_all(b"OPTIONS * RTSP/1.0\r\nCSeq: 1\r\nRequire: org.wfs.wfd1.0\r\n\r\n")
            .await
            .unwrap();
        let mut buf = [0u8; 4096];
        let n = client.read(&mut buf).await.unwrap();
        let resp = String::from_utf8_lossy(&buf[..n]);
        assert!(resp.contains("RTSP/1.0 200 OK"));
        assert!(resp.contains("CSeq: 1"));
        assert!(resp.contains("Public: org.wfs.wfd1.0, SET_PARAMETER, GET_PARAMETER"));

        // M2: sink sends OPTIONS, client replies with anything.
        let n = client.read(&mut buf).await.unwrap();
        let m2 = String::from_utf8_lossy(&buf[..n]);
        assert!(m2.starts_with("OPTIONS * RTSP/1.0"));
        assert!(m2.contains("CSeq: 100"));
        client.write_all(b"RTSP/1.0 200 OK\r\nCSeq: 100\r\n\r\n").await.unwrap();

        // M3
        client
            .write_all(b"GET_PARAMETER rtsp://x/wfd1.0 RTSP/1.0\r\nCSeq: 3\r\n\r\n")
            .await
            .unwrap();
        let n = client.read(&mut buf).await.unwrap();
        let m3resp = String::from_utf8_lossy(&buf[..n]);
        assert!(m3resp.contains("wfd_client_rtp_ports: RTP/AVP/UDP;unicast 1028 0 mode=play"));
        assert!(m3resp.contains(
            "wfd_video_formats: 08 00 03 10 0001FFFF 0FFFFFFF 00000000 00 0000 0000 00 none none"
        ));

        // M4
        client
            .write_all(b"SET_PARAMETER rtsp://x RTSP/1.0\r\nCSeq: 4\r\nContent-Length: 0\r\n\r\n")
            .await
            .unwrap();
        let n = client.read(&mut buf).await.unwrap();
        assert!(String::from_utf8_lossy(&buf[..n]).contains("CSeq: 4"));

        // M5
        let trigger_body = "wfd_trigger_method: SETUP\r\n";
        client
            .write_all(
                format!(
                    "SET_PARAMETER rtsp://x RTSP/1.0\r\nCSeq: 5\r\nContent-Length: {}\r\n\r\n{}",
                    trigger_body.len(),
                    trigger_body
                )
                .as_bytes(),
            )
            .await
            .unwrap();
        let n = client.read(&mut buf).await.unwrap();
        assert!(String::from_utf8_lossy(&buf[..n]).contains("CSeq: 5"));

        // M6
        let n = client.read(&mut buf).await.unwrap();
        let m6 = String::from_utf8_lossy(&buf[..n]);
        assert!(m6.starts_with("SETUP rtsp://192.168.173.80/wfd1.0/streamid=0"));
        assert!(m6.contains("CSeq: 101"));
        client
            .write_all(b"RTSP/1.0 200 OK\r\nCSeq: 101\r\nSession: 1234abcd;timeout=30\r\nTransport: RTP/AVP/UDP;unicast;client_port=1028;server_port=19000\r\n\r\n")
            .await
            .unwrap();

        // M7
        let n = client.read(&mut buf).await.unwrap();
        let m7 = String::from_utf8_lossy(&buf[..n]);
        assert!(m7.starts_with("PLAY rtsp://192.168.173.80/wfd1.0/streamid=0"));
        assert!(m7.contains("CSeq: 102"));
        assert!(m7.contains("Session: 1234abcd;timeout=30"));
        client.write_all(b"RTSP/1.0 200 OK\r\nCSeq: 102\r\n\r\n").await.unwrap();

        let (negotiated, mut cseq) = server_task.await.unwrap().unwrap();
        assert_eq!(negotiated.session_id, "1234abcd;timeout=30");
        assert_eq!(negotiated.server_rtp_port, 19000);
        assert_eq!(cseq.next(), 103);
    }

    #[tokio::test]
    async fn session_loop_drains_pipelined_messages_before_next_read() {
        // A GET_PARAMETER and a TEARDOWN arrive back-to-back in one write,
        // i.e. one TCP segment. If the session loop only parsed the first
        // message per read, the TEARDOWN would sit unprocessed in `buf`
        // until more bytes arrived — which never happens here.
        let (mut client, server) = tokio::io::duplex(8192);
        let idr_socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut framed = FramedRtsp::new(server);
        let idr_addr: std::net::SocketAddr = "127.0.0.1:1".parse().unwrap();
        let mut media = MediaPipeline::new(1028, idr_addr);
        let cseq = OutboundCseq::starting_at(200);

        let teardown_body = "wfd_trigger_method: TEARDOWN\r\n";
        let teardown_msg = format!(
            "SET_PARAMETER rtsp://x RTSP/1.0\r\nCSeq: 11\r\nContent-Length: {}\r\n\r\n{}",
            teardown_body.len(),
            teardown_body
        );
        let mut pipelined = Vec::new();
        pipelined.extend_from_slice(
            b"GET_PARAMETER rtsp://x RTSP/1.0\r\nCSeq: 10\r\nContent-Length: 0\r\n\r\n",
        );
        pipelined.extend_from_slice(teardown_msg.as_bytes());
        client.write_all(&pipelined).await.unwrap();

        let result = run_session(&mut framed, &idr_socket, &mut media, cseq)
            .await
            .unwrap();
        assert!(matches!(result, SessionEnd::Teardown));
    }
}
