//! RTSP/1.0 message codec: CRLF-delimited request/response parsing and
//! emission, as used by the WFD control plane (M1–M7 plus the in-session
//! GET/SET_PARAMETER loop).
//!
//! ```text
//! METHOD SP URI SP "RTSP/1.0" CRLF          (request line)
//! "RTSP/1.0" SP CODE SP PHRASE CRLF         (status line)
//! Name: Value CRLF                          (zero or more headers)
//! CRLF                                      (blank line ends header block)
//! <body, exactly Content-Length bytes>
//! ```

use std::fmt;

/// Maximum body size accepted by the parser. WFD parameter bodies are a few
/// hundred bytes; 64 KiB is generous headroom against a misbehaving peer.
pub const MAX_BODY_SIZE: usize = 64 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("malformed RTSP message: {0}")]
    Malformed(String),
    #[error("truncated message, need more bytes")]
    Truncated,
    #[error("body too large: {0} bytes (max {MAX_BODY_SIZE})")]
    BodyTooLarge(usize),
}

/// An ordered header map with case-insensitive lookup and insertion-order
/// emission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.0.push((name.into(), value.into()));
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// The start line of a message: either a request (method + URI) or a
/// response (status code + phrase).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartLine {
    Request { method: String, uri: String },
    Response { code: u16, phrase: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub start: StartLine,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl Message {
    pub fn request(method: impl Into<String>, uri: impl Into<String>, cseq: u32) -> Self {
        let mut headers = Headers::new();
        headers.insert("CSeq", cseq.to_string());
        Self {
            start: StartLine::Request {
                method: method.into(),
                uri: uri.into(),
            },
            headers,
            body: Vec::new(),
        }
    }

    pub fn ok_response(cseq: u32) -> Self {
        let mut headers = Headers::new();
        headers.insert("CSeq", cseq.to_string());
        Self {
            start: StartLine::Response {
                code: 200,
                phrase: "OK".into(),
            },
            headers,
            body: Vec::new(),
        }
    }

    /// Attach a body, setting `Content-Length` to its exact byte length.
    pub fn with_body(mut self, content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        let body = body.into();
        self.headers.insert("Content-Type", content_type);
        self.headers.insert("Content-Length", body.len().to_string());
        self.body = body;
        self
    }

    pub fn cseq(&self) -> Option<u32> {
        self.headers.get("CSeq")?.trim().parse().ok()
    }

    pub fn method(&self) -> Option<&str> {
        match &self.start {
            StartLine::Request { method, .. } => Some(method.as_str()),
            StartLine::Response { .. } => None,
        }
    }

    pub fn body_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Serialize to the CRLF wire format (always UTF-8).
    pub fn emit(&self) -> Vec<u8> {
        let mut out = String::new();
        match &self.start {
            StartLine::Request { method, uri } => {
                out.push_str(&format!("{method} {uri} RTSP/1.0\r\n"));
            }
            StartLine::Response { code, phrase } => {
                out.push_str(&format!("RTSP/1.0 {code} {phrase}\r\n"));
            }
        }
        for (name, value) in self.headers.iter() {
            out.push_str(&format!("{name}: {value}\r\n"));
        }
        out.push_str("\r\n");
        let mut bytes = out.into_bytes();
        bytes.extend_from_slice(&self.body);
        bytes
    }

    /// Parse one complete message from the front of `buf`. Returns the
    /// message and the number of bytes consumed, leaving any trailing
    /// pipelined bytes in `buf` for the caller to re-parse.
    pub fn parse(buf: &[u8]) -> Result<(Message, usize), CodecError> {
        let header_end = find_header_end(buf).ok_or(CodecError::Truncated)?;
        let header_block =
            std::str::from_utf8(&buf[..header_end]).map_err(|e| CodecError::Malformed(e.to_string()))?;

        let mut lines = header_block.split("\r\n");
        let start_line = lines.next().ok_or_else(|| CodecError::Malformed("empty message".into()))?;
        let start = parse_start_line(start_line)?;

        let mut headers = Headers::new();
        for line in lines {
            if line.is_empty() {
                continue;
            }
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| CodecError::Malformed(format!("bad header line: {line:?}")))?;
            headers.insert(name.trim(), value.trim());
        }

        let content_length: usize = match headers.get("Content-Length") {
            Some(v) => v
                .trim()
                .parse()
                .map_err(|_| CodecError::Malformed(format!("bad Content-Length: {v:?}")))?,
            None => 0,
        };
        if content_length > MAX_BODY_SIZE {
            return Err(CodecError::BodyTooLarge(content_length));
        }

        let body_start = header_end;
        let body_end = body_start + content_length;
        if buf.len() < body_end {
            return Err(CodecError::Truncated);
        }

        let body = buf[body_start..body_end].to_vec();
        Ok((Message { start, headers, body }, body_end))
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.emit()))
    }
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|pos| pos + 4)
}

fn parse_start_line(line: &str) -> Result<StartLine, CodecError> {
    let mut parts = line.splitn(3, ' ');
    let a = parts.next().ok_or_else(|| CodecError::Malformed("empty start line".into()))?;
    let b = parts.next().ok_or_else(|| CodecError::Malformed(format!("bad start line: {line:?}")))?;
    let c = parts.next().ok_or_else(|| CodecError::Malformed(format!("bad start line: {line:?}")))?;

    if a == "RTSP/1.0" {
        let code: u16 = b
            .parse()
            .map_err(|_| CodecError::Malformed(format!("bad status code: {b:?}")))?;
        Ok(StartLine::Response {
            code,
            phrase: c.to_string(),
        })
    } else if c == "RTSP/1.0" {
        Ok(StartLine::Request {
            method: a.to_string(),
            uri: b.to_string(),
        })
    } else {
        Err(CodecError::Malformed(format!("unrecognized start line: {line:?}")))
    }
}

/// Extract the `Session:` header value from a SETUP response.
pub fn extract_session_id(msg: &Message) -> Option<String> {
    msg.headers.get("Session").map(|v| v.trim().to_string())
}

/// Extract `server_port` from a `Transport:` header value, parsing up to the
/// next `;` rather than assuming a fixed-width port field.
pub fn extract_server_port(msg: &Message) -> Option<u16> {
    let transport = msg.headers.get("Transport")?;
    for field in transport.split(';') {
        if let Some(rest) = field.trim().strip_prefix("server_port=") {
            let port_str = rest.split(|c: char| !c.is_ascii_digit()).next().unwrap_or(rest);
            return port_str.parse().ok();
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_request_with_body() {
        let msg = Message::request("SET_PARAMETER", "rtsp://localhost/wfd1.0", 103)
            .with_body("text/parameters", "wfd-idr-request\r\n");
        let wire = msg.emit();
        let (parsed, consumed) = Message::parse(&wire).unwrap();
        assert_eq!(consumed, wire.len());
        assert_eq!(parsed, msg);
    }

    #[test]
    fn roundtrip_response_no_body() {
        let msg = Message::ok_response(1);
        let wire = msg.emit();
        let (parsed, _) = Message::parse(&wire).unwrap();
        assert_eq!(parsed, msg);
        assert_eq!(parsed.cseq(), Some(1));
    }

    #[test]
    fn content_length_matches_body_len() {
        let msg = Message::ok_response(2).with_body("text/parameters", "abc");
        assert_eq!(msg.headers.get("Content-Length"), Some("3"));
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let mut headers = Headers::new();
        headers.insert("Content-Type", "text/parameters");
        assert_eq!(headers.get("content-type"), Some("text/parameters"));
        assert_eq!(headers.get("CONTENT-TYPE"), Some("text/parameters"));
    }

    #[test]
    fn truncated_header_block_is_recoverable() {
        let partial = b"OPTIONS * RTSP/1.0\r\nCSeq: 1\r\n";
        match Message::parse(partial) {
            Err(CodecError::Truncated) => {}
            other => panic!("expected Truncated, got {other:?}"),
        }
    }

    #[test]
    fn truncated_body_is_recoverable() {
        let partial = b"RTSP/1.0 200 OK\r\nCSeq: 2\r\nContent-Length: 10\r\n\r\nabc";
        match Message::parse(partial) {
            Err(CodecError::Truncated) => {}
            other => panic!("expected Truncated, got {other:?}"),
        }
    }

    #[test]
    fn malformed_start_line_is_fatal() {
        let bad = b"GARBAGE\r\n\r\n";
        match Message::parse(bad) {
            Err(CodecError::Malformed(_)) => {}
            other => panic!("expected Malformed, got {other:?}"),
        }
    }

    #[test]
    fn body_too_large_is_rejected() {
        let oversized = format!(
            "RTSP/1.0 200 OK\r\nCSeq: 1\r\nContent-Length: {}\r\n\r\n",
            MAX_BODY_SIZE + 1
        );
        match Message::parse(oversized.as_bytes()) {
            Err(CodecError::BodyTooLarge(n)) => assert_eq!(n, MAX_BODY_SIZE + 1),
            other => panic!("expected BodyTooLarge, got {other:?}"),
        }
    }

    #[test]
    fn pipelined_messages_parse_in_order() {
        let first = Message::ok_response(1).emit();
        let second = Message::ok_response(2).emit();
        let mut combined = first.clone();
        combined.extend_from_slice(&second);

        let (m1, n1) = Message::parse(&combined).unwrap();
        assert_eq!(m1.cseq(), Some(1));
        let (m2, _) = Message::parse(&combined[n1..]).unwrap();
        assert_eq!(m2.cseq(), Some(2));
    }

    #[test]
    fn unknown_headers_are_preserved() {
        let wire = b"OPTIONS * RTSP/1.0\r\nCSeq: 1\r\nX-Custom: pass-through\r\n\r\n";
        let (parsed, _) = Message::parse(wire).unwrap();
        assert_eq!(parsed.headers.get("X-Custom"), Some("pass-through"));
    }

    #[test]
    fn session_id_is_first_token_after_header() {
        let wire = b"RTSP/1.0 200 OK\r\nCSeq: 101\r\nSession: 1234abcd;timeout=30\r\nTransport: RTP/AVP/UDP;unicast;client_port=1028;server_port=19000\r\n\r\n";
        let (msg, _) = Message::parse(wire).unwrap();
        assert_eq!(extract_session_id(&msg).as_deref(), Some("1234abcd;timeout=30"));
    }

    #[test]
    fn server_port_parses_up_to_semicolon_not_fixed_width() {
        let wire = b"RTSP/1.0 200 OK\r\nCSeq: 101\r\nTransport: RTP/AVP/UDP;unicast;client_port=1028;server_port=80\r\n\r\n";
        let (msg, _) = Message::parse(wire).unwrap();
        assert_eq!(extract_server_port(&msg), Some(80));
    }

    #[test]
    fn server_port_parses_five_digit_port() {
        let wire = b"RTSP/1.0 200 OK\r\nCSeq: 101\r\nTransport: RTP/AVP/UDP;unicast;client_port=1028;server_port=19000\r\n\r\n";
        let (msg, _) = Message::parse(wire).unwrap();
        assert_eq!(extract_server_port(&msg), Some(19000));
    }
}
