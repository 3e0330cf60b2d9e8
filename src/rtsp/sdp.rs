//! Session description (SDP, RFC 4566) for a still-JPEG/RTP stream.

/// Options filled in from server configuration and per-DESCRIBE context,
/// mirroring the reference server's `video_opt` map
/// (`session_name`, `server_name`, `video_port`, `width`, `height`,
/// `fps`, `payload`, `control_url`, `url`, `rtsp_port`, `video_path`).
#[derive(Debug, Clone)]
pub struct SdpOptions<'a> {
    pub session_name: &'a str,
    pub server_name: &'a str,
    pub video_port: u16,
    pub width: u16,
    pub height: u16,
    pub fps: f64,
    pub payload: u8,
    pub url: &'a str,
    pub rtsp_port: u16,
    pub video_path: &'a str,
}

/// Builds the SDP body returned from a successful DESCRIBE, describing a
/// single JPEG/RTP video media section.
///
/// Field choices follow the reference server's template: origin
/// network/address type fixed at `IN IP4 0.0.0.0`, connection address
/// `0.0.0.0` (the actual transport is negotiated per-client in SETUP,
/// not embedded here), and an `a=cliprect` line giving the frame's pixel
/// geometry. `a=control` advertises the absolute RTSP control URL built
/// from the server's advertised address, matching `sdp_utils.make_sdp2`.
pub fn build_sdp(opts: &SdpOptions) -> String {
    let mut sdp = String::new();
    sdp.push_str("v=0\r\n");
    sdp.push_str("o=- 0 0 IN IP4 0.0.0.0\r\n");
    sdp.push_str(&format!("s={}\r\n", opts.session_name));
    sdp.push_str("i=jpeg\r\n");
    sdp.push_str("t=0 0\r\n");
    sdp.push_str(&format!("a=tool:{}\r\n", opts.server_name));
    sdp.push_str("a=type:broadcast\r\n");
    sdp.push_str("a=recvonly\r\n");
    sdp.push_str(&format!(
        "m=video {} RTP/AVP {}\r\n",
        opts.video_port, opts.payload
    ));
    sdp.push_str(&format!(
        "a=control:rtsp://{}:{}/{}\r\n",
        opts.url, opts.rtsp_port, opts.video_path
    ));
    sdp.push_str("c=IN IP4 0.0.0.0\r\n");
    sdp.push_str(&format!(
        "a=cliprect:0,0,{},{}\r\n",
        opts.height, opts.width
    ));
    sdp.push_str(&format!("a=framerate:{:.6}\r\n", opts.fps));
    sdp.push_str(&format!("a=rtpmap:{} JPEG/90000\r\n", opts.payload));
    sdp
}
