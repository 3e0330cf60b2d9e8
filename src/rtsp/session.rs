//! Per-client RTSP session state.

use rand::Rng;
use std::net::{IpAddr, SocketAddr};
use thiserror::Error;

/// Session lifecycle states (RFC 2326 §A, restricted to what this server
/// implements: no RECORD, no aggregate control).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    Ready,
    Playing,
    Terminated,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("missing Transport header")]
    Missing,

    #[error("unsupported transport: {0}")]
    Unsupported(String),

    #[error("interleaved (TCP) delivery is not supported")]
    Interleaved,

    #[error("malformed client_port range: {0}")]
    MalformedClientPort(String),
}

/// The subset of a Transport header this server understands: unicast
/// RTP/AVP over UDP with a client port pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transport {
    pub client_rtp_port: u16,
    pub client_rtcp_port: u16,
}

impl Transport {
    /// Parses a `Transport:` header value such as
    /// `RTP/AVP;unicast;client_port=5000-5001`. Rejects interleaved
    /// (`interleaved=`) specs outright, since this server only streams
    /// over UDP.
    pub fn parse(value: &str) -> Result<Self, TransportError> {
        if value.is_empty() {
            return Err(TransportError::Missing);
        }

        let mut specs = value.split(',');
        let first = specs.next().unwrap_or("");
        let fields: Vec<&str> = first.split(';').map(|f| f.trim()).collect();

        let protocol = fields.first().copied().unwrap_or("");
        if !protocol.eq_ignore_ascii_case("RTP/AVP") && !protocol.eq_ignore_ascii_case("RTP/AVP/UDP") {
            return Err(TransportError::Unsupported(protocol.to_string()));
        }

        if fields.iter().any(|f| f.starts_with("interleaved=")) {
            return Err(TransportError::Interleaved);
        }

        let client_port_field = fields
            .iter()
            .find(|f| f.starts_with("client_port="))
            .ok_or_else(|| TransportError::MalformedClientPort(value.to_string()))?;

        let range = client_port_field
            .trim_start_matches("client_port=")
            .trim();
        let (rtp_str, rtcp_str) = range
            .split_once('-')
            .ok_or_else(|| TransportError::MalformedClientPort(range.to_string()))?;

        let client_rtp_port: u16 = rtp_str
            .parse()
            .map_err(|_| TransportError::MalformedClientPort(range.to_string()))?;
        let client_rtcp_port: u16 = rtcp_str
            .parse()
            .map_err(|_| TransportError::MalformedClientPort(range.to_string()))?;

        Ok(Self {
            client_rtp_port,
            client_rtcp_port,
        })
    }

    pub fn to_header_value(&self, server_rtp_port: u16, server_rtcp_port: u16) -> String {
        format!(
            "RTP/AVP;unicast;client_port={}-{};server_port={}-{}",
            self.client_rtp_port, self.client_rtcp_port, server_rtp_port, server_rtcp_port
        )
    }
}

/// Generates a session id in `[100000, 999999]`, matching the reference
/// server's `randint(100000, 999999)`.
pub fn new_session_id() -> String {
    let mut rng = rand::thread_rng();
    rng.gen_range(100_000..=999_999).to_string()
}

#[derive(Debug, Clone)]
pub struct ClientSession {
    pub session_id: String,
    pub state: SessionState,
    pub stream_path: String,
    pub client_ip: IpAddr,
    pub transport: Option<Transport>,
}

impl ClientSession {
    /// `session_id` is the server's single RTSP session id (chosen once at
    /// server construction, per this server's specification), not
    /// generated per client.
    pub fn new(stream_path: impl Into<String>, client_ip: IpAddr, session_id: String) -> Self {
        Self {
            session_id,
            state: SessionState::Init,
            stream_path: stream_path.into(),
            client_ip,
            transport: None,
        }
    }

    /// The UDP destination the publisher should send RTP datagrams to,
    /// once SETUP has negotiated a transport.
    pub fn rtp_destination(&self) -> Option<SocketAddr> {
        self.transport
            .map(|t| SocketAddr::new(self.client_ip, t.client_rtp_port))
    }
}
