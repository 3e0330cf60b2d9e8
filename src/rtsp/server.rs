//! RTSP TCP server: accept loop, per-connection session, SDP/stream
//! lookup, and wiring FSM effects to the RTP publisher.

use crate::jpeg::{self, DissectorError};
use crate::publisher::{Publisher, PublisherHandle, SourceError, StillJpegSource};
use crate::rtsp::fsm::{step, Effect, Event};
use crate::rtsp::request::{Method, Request, RequestError};
use crate::rtsp::response::Response;
use crate::rtsp::sdp::{build_sdp, SdpOptions};
use crate::rtsp::session::{new_session_id, ClientSession, SessionState, Transport};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Why a stream failed to start, kept distinct from a generic I/O error
/// so the RTSP layer can tell a progressive (SOF2) JPEG — which must
/// answer 415, not 404/500 — apart from a missing file or a bind
/// failure.
#[derive(Error, Debug)]
enum StreamStartError {
    #[error("source file not found")]
    NotFound,
    #[error("unsupported: progressive (SOF2) jpeg")]
    Progressive,
    #[error(transparent)]
    Other(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub advertise_address: String,
    pub src_dir: PathBuf,
    pub mtu: usize,
    pub ssrc: u32,
    pub server_rtp_port: u16,
    pub q: u8,
    pub publisher_tick: Duration,
}

/// Registry of the one [`Publisher`] backing each stream path, created
/// lazily on first successful SETUP/PLAY. Guards only "which publisher
/// serves this path", never the publisher's own destination table —
/// that stays single-task-owned, reachable only through its handle.
struct Streams {
    publishers: Mutex<HashMap<String, PublisherHandle>>,
}

impl Streams {
    fn new() -> Self {
        Self {
            publishers: Mutex::new(HashMap::new()),
        }
    }

    async fn get_or_start(
        &self,
        path: &str,
        file_path: &Path,
        config: &ServerConfig,
    ) -> Result<PublisherHandle, StreamStartError> {
        let mut publishers = self.publishers.lock().await;
        if let Some(handle) = publishers.get(path) {
            return Ok(handle.clone());
        }

        let source =
            StillJpegSource::open(file_path, config.ssrc, config.mtu, config.q).map_err(
                |e| match e {
                    SourceError::Io { .. } => StreamStartError::NotFound,
                    SourceError::Malformed {
                        source: DissectorError::Progressive,
                        ..
                    } => StreamStartError::Progressive,
                    other => StreamStartError::Other(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        other.to_string(),
                    )),
                },
            )?;
        let bind_addr: SocketAddr =
            format!("0.0.0.0:{}", config.server_rtp_port).parse().unwrap();
        let (publisher, handle) =
            Publisher::bind(bind_addr, Box::new(source), config.publisher_tick)
                .await
                .map_err(|e| {
                    StreamStartError::Other(std::io::Error::new(
                        std::io::ErrorKind::AddrInUse,
                        e.to_string(),
                    ))
                })?;

        tokio::spawn(publisher.run());
        publishers.insert(path.to_string(), handle.clone());
        Ok(handle)
    }
}

pub struct RtspServer {
    config: ServerConfig,
    streams: Arc<Streams>,
    /// Chosen once per server instance, per this server's specification,
    /// and echoed unchanged on every client's SETUP/PLAY/PAUSE/TEARDOWN —
    /// this server does not mint a fresh session id per peer.
    session_id: String,
}

impl RtspServer {
    pub fn new(config: ServerConfig) -> Self {
        let session_id = new_session_id();
        info!(session_id = %session_id, "rtsp session id chosen");
        Self {
            config,
            streams: Arc::new(Streams::new()),
            session_id,
        }
    }

    /// Binds the listening socket and accepts connections until the
    /// process is stopped; each connection runs on its own task.
    pub async fn run(self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.config.listen_addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: self.config.listen_addr,
                source,
            })?;

        info!(addr = %self.config.listen_addr, "rtsp server listening");

        let config = Arc::new(self.config);
        let streams = self.streams;
        let session_id = self.session_id;

        loop {
            let (socket, peer) = match listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "failed to accept connection");
                    continue;
                }
            };

            let config = Arc::clone(&config);
            let streams = Arc::clone(&streams);
            let session_id = session_id.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(socket, peer, config, streams, session_id).await
                {
                    warn!(%peer, error = %e, "connection ended with an error");
                }
            });
        }
    }
}

async fn handle_connection(
    mut socket: TcpStream,
    peer: SocketAddr,
    config: Arc<ServerConfig>,
    streams: Arc<Streams>,
    session_id: String,
) -> Result<(), std::io::Error> {
    info!(%peer, "client connected");

    let mut buf = Vec::new();
    let mut read_buf = [0u8; 4096];
    let mut session: Option<ClientSession> = None;
    let mut rtp_handle: Option<PublisherHandle> = None;
    let mut rtp_destination: Option<SocketAddr> = None;

    loop {
        let n = socket.read(&mut read_buf).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&read_buf[..n]);

        while let Some(pos) = find_request_boundary(&buf) {
            let request_bytes: Vec<u8> = buf.drain(..pos).collect();
            // Drop the terminating CRLFCRLF itself.
            buf.drain(..4.min(buf.len()));

            let response = process_request(
                &request_bytes,
                peer,
                &config,
                &streams,
                &mut session,
                &mut rtp_handle,
                &mut rtp_destination,
                &session_id,
            )
            .await;

            socket.write_all(response.to_wire().as_bytes()).await?;

            if matches!(
                session.as_ref().map(|s| s.state),
                Some(SessionState::Terminated)
            ) {
                return Ok(());
            }
        }
    }

    if let (Some(handle), Some(dest)) = (&rtp_handle, rtp_destination) {
        handle.remove_destination(dest).await;
    }
    info!(%peer, "client disconnected");
    Ok(())
}

fn find_request_boundary(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

async fn process_request(
    raw: &[u8],
    peer: SocketAddr,
    config: &ServerConfig,
    streams: &Streams,
    session: &mut Option<ClientSession>,
    rtp_handle: &mut Option<PublisherHandle>,
    rtp_destination: &mut Option<SocketAddr>,
    session_id: &str,
) -> Response {
    let request = match Request::parse(raw) {
        Ok(r) => r,
        Err(e) => return malformed_response(e),
    };

    let stream_path = request.uri.clone();
    let state = session.as_ref().map(|s| s.state).unwrap_or(SessionState::Init);

    let event = match request.method {
        Method::Options => Event::Options { cseq: request.cseq },

        Method::Describe => {
            let file_path = resolve_file_path(&config.src_dir, &stream_path);
            match dissect_dimensions(&file_path) {
                Ok((width, height)) => {
                    let video_path = stream_path.rsplit('/').next().unwrap_or(&stream_path);
                    let sdp = build_sdp(&SdpOptions {
                        session_name: "JPEG RTP Stream",
                        server_name: "rtsp-mjpeg-server",
                        video_port: config.server_rtp_port,
                        width,
                        height,
                        fps: 1000.0 / config.publisher_tick.as_millis().max(1) as f64,
                        payload: 26,
                        url: &config.advertise_address,
                        rtsp_port: config.listen_addr.port(),
                        video_path,
                    });
                    Event::Describe {
                        cseq: request.cseq,
                        stream_exists: true,
                        sdp: Some(sdp),
                    }
                }
                Err(DissectorError::Progressive) => {
                    return Response::new(415, request.cseq);
                }
                Err(_) => Event::Describe {
                    cseq: request.cseq,
                    stream_exists: false,
                    sdp: None,
                },
            }
        }

        Method::Setup => {
            if session.is_none() {
                *session = Some(ClientSession::new(
                    stream_path.clone(),
                    peer.ip(),
                    session_id.to_string(),
                ));
            }
            let transport = request
                .header("transport")
                .ok_or(crate::rtsp::session::TransportError::Missing)
                .and_then(Transport::parse);
            if let Ok(t) = transport {
                session.as_mut().unwrap().transport = Some(t);
            }
            let session_id = session.as_ref().unwrap().session_id.clone();
            Event::Setup {
                cseq: request.cseq,
                session_id,
                transport,
                server_rtp_port: config.server_rtp_port,
                server_rtcp_port: config.server_rtp_port + 1,
            }
        }

        Method::Play => {
            let session_id = session
                .as_ref()
                .map(|s| s.session_id.clone())
                .unwrap_or_else(|| session_id.to_string());
            let destination = session.as_ref().and_then(|s| s.rtp_destination());
            if let Some(dest) = destination {
                let file_path = resolve_file_path(&config.src_dir, &stream_path);
                match streams.get_or_start(&stream_path, &file_path, config).await {
                    Ok(handle) => {
                        *rtp_handle = Some(handle);
                        *rtp_destination = Some(dest);
                    }
                    Err(StreamStartError::Progressive) => {
                        return Response::new(415, request.cseq);
                    }
                    Err(StreamStartError::NotFound) => {
                        return Response::new(404, request.cseq);
                    }
                    Err(e) => {
                        error!(error = %e, "failed to start publisher");
                        return Response::new(500, request.cseq);
                    }
                }
            }
            Event::Play {
                cseq: request.cseq,
                session_id,
                destination,
                uri: request.uri.clone(),
                range: request.header("range").map(|s| s.to_string()),
            }
        }

        Method::Pause => Event::Pause {
            cseq: request.cseq,
            session_id: session
                .as_ref()
                .map(|s| s.session_id.clone())
                .unwrap_or_else(|| session_id.to_string()),
        },

        Method::Teardown => Event::Teardown {
            cseq: request.cseq,
            session_id: session
                .as_ref()
                .map(|s| s.session_id.clone())
                .unwrap_or_else(|| session_id.to_string()),
        },

        Method::GetParameter | Method::Other => {
            return Response::new(405, request.cseq).with_header("Allow", "OPTIONS, DESCRIBE, SETUP, PLAY, PAUSE, TEARDOWN");
        }
    };

    let (new_state, effects) = step(state, event);
    if let Some(s) = session.as_mut() {
        s.state = new_state;
    }

    let mut response = None;
    for effect in effects {
        match effect {
            Effect::Respond(resp) => response = Some(resp),
            Effect::OpenRtp { destination } => {
                if let Some(handle) = rtp_handle.as_ref() {
                    handle.add_destination(destination).await;
                }
            }
            Effect::CloseRtp => {
                if let (Some(handle), Some(dest)) = (rtp_handle.as_ref(), *rtp_destination) {
                    handle.remove_destination(dest).await;
                }
            }
        }
    }

    response.unwrap_or_else(|| Response::new(500, request.cseq))
}

fn malformed_response(error: RequestError) -> Response {
    let cseq = 0;
    match error {
        RequestError::MissingCSeq | RequestError::MalformedCSeq(_) => {
            Response::new(400, cseq)
        }
        _ => Response::new(400, cseq),
    }
}

fn resolve_file_path(src_dir: &Path, uri: &str) -> PathBuf {
    let name = uri.rsplit('/').next().unwrap_or(uri);
    src_dir.join(name)
}

fn dissect_dimensions(path: &Path) -> Result<(u16, u16), DissectorError> {
    let data = std::fs::read(path).map_err(|_| DissectorError::TooShort)?;
    let info = jpeg::parse_jpeg(&data)?;
    Ok((info.width, info.height))
}
