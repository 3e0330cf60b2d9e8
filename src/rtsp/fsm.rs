//! The per-session request/response state machine.
//!
//! `step` is a pure function: it consumes the current [`SessionState`]
//! and an [`Event`] describing one incoming request (with anything that
//! requires I/O — does the stream exist? what's its geometry? —
//! resolved by the caller beforehand) and returns the new state plus an
//! ordered list of [`Effect`]s for the caller to carry out. This
//! reimplements, as a sum-typed return value instead of a generator,
//! the dispatch the reference server drove with `yield`ed commands.

use crate::rtsp::response::Response;
use crate::rtsp::session::{SessionState, Transport, TransportError};
use std::net::SocketAddr;

#[derive(Debug, Clone)]
pub enum Event {
    Options {
        cseq: u32,
    },
    Describe {
        cseq: u32,
        stream_exists: bool,
        sdp: Option<String>,
    },
    Setup {
        cseq: u32,
        session_id: String,
        transport: Result<Transport, TransportError>,
        server_rtp_port: u16,
        server_rtcp_port: u16,
    },
    Play {
        cseq: u32,
        session_id: String,
        destination: Option<SocketAddr>,
        uri: String,
        range: Option<String>,
    },
    Pause {
        cseq: u32,
        session_id: String,
    },
    Teardown {
        cseq: u32,
        session_id: String,
    },
}

#[derive(Debug, Clone)]
pub enum Effect {
    Respond(Response),
    OpenRtp { destination: SocketAddr },
    CloseRtp,
}

const PUBLIC_METHODS: &str = "DESCRIBE, SETUP, TEARDOWN, PLAY, PAUSE";

/// Advances one session by one request.
pub fn step(state: SessionState, event: Event) -> (SessionState, Vec<Effect>) {
    match event {
        Event::Options { cseq } => {
            let resp = Response::new(200, cseq).with_header("Public", PUBLIC_METHODS);
            (state, vec![Effect::Respond(resp)])
        }

        Event::Describe {
            cseq,
            stream_exists,
            sdp,
        } => {
            if !stream_exists {
                return (state, vec![Effect::Respond(Response::new(404, cseq))]);
            }
            let body = sdp.unwrap_or_default();
            let resp = Response::new(200, cseq).with_body("application/sdp", body);
            (state, vec![Effect::Respond(resp)])
        }

        Event::Setup {
            cseq,
            session_id,
            transport,
            server_rtp_port,
            server_rtcp_port,
        } => {
            if state != SessionState::Init {
                return (state, vec![Effect::Respond(Response::new(455, cseq))]);
            }
            let transport = match transport {
                Ok(t) => t,
                Err(_) => {
                    return (state, vec![Effect::Respond(Response::new(461, cseq))]);
                }
            };
            let resp = Response::new(200, cseq)
                .with_header("Session", session_id)
                .with_header(
                    "Transport",
                    transport.to_header_value(server_rtp_port, server_rtcp_port),
                );
            (SessionState::Ready, vec![Effect::Respond(resp)])
        }

        Event::Play {
            cseq,
            session_id,
            destination,
            uri,
            range,
        } => {
            if !matches!(state, SessionState::Ready | SessionState::Playing) {
                return (state, vec![Effect::Respond(Response::new(455, cseq))]);
            }
            let mut effects = Vec::new();
            if let Some(destination) = destination {
                if state == SessionState::Ready {
                    effects.push(Effect::OpenRtp { destination });
                }
            }
            let rtp_info = format!("url={uri};seq=0;rtptime=0");
            let mut resp = Response::new(200, cseq).with_header("Session", session_id);
            if let Some(range) = range {
                resp = resp.with_header("Range", range);
            }
            resp = resp.with_header("RTP-Info", rtp_info);
            effects.push(Effect::Respond(resp));
            (SessionState::Playing, effects)
        }

        Event::Pause { cseq, session_id } => {
            if state != SessionState::Playing {
                return (state, vec![Effect::Respond(Response::new(455, cseq))]);
            }
            let resp = Response::new(200, cseq).with_header("Session", session_id);
            (
                SessionState::Ready,
                vec![Effect::CloseRtp, Effect::Respond(resp)],
            )
        }

        Event::Teardown { cseq, session_id } => {
            let resp = Response::new(200, cseq).with_header("Session", session_id);
            (
                SessionState::Terminated,
                vec![Effect::CloseRtp, Effect::Respond(resp)],
            )
        }
    }
}
