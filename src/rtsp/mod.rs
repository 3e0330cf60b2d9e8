//! RTSP control plane (RFC 2326): request/response framing, per-client
//! session state, SDP generation, and the TCP accept loop tying it all
//! together with the RTP publisher.

pub mod fsm;
pub mod request;
pub mod response;
pub mod sdp;
pub mod server;
pub mod session;

pub use request::{Method, Request, RequestError};
pub use response::Response;
pub use server::{RtspServer, ServerConfig, ServerError};
pub use session::{ClientSession, SessionState, Transport, TransportError};
