//! RTSP request parsing (RFC 2326 §6).

use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("malformed request line")]
    MalformedRequestLine,

    #[error("malformed header line: {0}")]
    MalformedHeader(String),

    #[error("missing CSeq header")]
    MissingCSeq,

    #[error("malformed CSeq value: {0}")]
    MalformedCSeq(String),

    #[error("request is not valid UTF-8")]
    NotUtf8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Options,
    Describe,
    Setup,
    Play,
    Pause,
    Teardown,
    GetParameter,
    Other,
}

impl Method {
    fn parse(token: &str) -> Self {
        match token.to_ascii_uppercase().as_str() {
            "OPTIONS" => Method::Options,
            "DESCRIBE" => Method::Describe,
            "SETUP" => Method::Setup,
            "PLAY" => Method::Play,
            "PAUSE" => Method::Pause,
            "TEARDOWN" => Method::Teardown,
            "GET_PARAMETER" => Method::GetParameter,
            _ => Method::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Options => "OPTIONS",
            Method::Describe => "DESCRIBE",
            Method::Setup => "SETUP",
            Method::Play => "PLAY",
            Method::Pause => "PAUSE",
            Method::Teardown => "TEARDOWN",
            Method::GetParameter => "GET_PARAMETER",
            Method::Other => "OTHER",
        }
    }
}

/// A single RTSP request, parsed out of one `\r\n\r\n`-delimited unit.
///
/// Header lookups are case-insensitive and first-value-wins on
/// duplicate headers, matching the reference client/server's header map.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub method_token: String,
    pub uri: String,
    pub version: String,
    pub cseq: u32,
    headers: HashMap<String, String>,
}

impl Request {
    /// Parses a complete request unit (request line + headers, CRLF
    /// terminated; body framing is not needed since RTSP requests this
    /// server handles carry no body).
    pub fn parse(raw: &[u8]) -> Result<Self, RequestError> {
        let text = std::str::from_utf8(raw).map_err(|_| RequestError::NotUtf8)?;
        let mut lines = text.split("\r\n");

        let request_line = lines.next().ok_or(RequestError::MalformedRequestLine)?;
        let mut parts = request_line.split_whitespace();
        let method_token = parts.next().ok_or(RequestError::MalformedRequestLine)?;
        let uri = parts.next().ok_or(RequestError::MalformedRequestLine)?;
        let version = parts.next().ok_or(RequestError::MalformedRequestLine)?;
        if parts.next().is_some() {
            return Err(RequestError::MalformedRequestLine);
        }

        let mut headers = HashMap::new();
        for line in lines {
            if line.is_empty() {
                continue;
            }
            let (key, value) = line
                .split_once(':')
                .ok_or_else(|| RequestError::MalformedHeader(line.to_string()))?;
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim().to_string();
            headers.entry(key).or_insert(value);
        }

        let cseq_raw = headers.get("cseq").ok_or(RequestError::MissingCSeq)?;
        let cseq = cseq_raw
            .parse::<u32>()
            .map_err(|_| RequestError::MalformedCSeq(cseq_raw.clone()))?;

        Ok(Self {
            method: Method::parse(method_token),
            method_token: method_token.to_string(),
            uri: uri.to_string(),
            version: version.to_string(),
            cseq,
            headers,
        })
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(|s| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_options_request() {
        let raw = b"OPTIONS rtsp://example.com/stream RTSP/1.0\r\nCSeq: 1\r\n\r\n";
        let req = Request::parse(raw).unwrap();
        assert_eq!(req.method, Method::Options);
        assert_eq!(req.cseq, 1);
        assert_eq!(req.uri, "rtsp://example.com/stream");
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let raw = b"SETUP rtsp://x/y RTSP/1.0\r\nCSeq: 2\r\nTRANSPORT: RTP/AVP;unicast;client_port=5000-5001\r\n\r\n";
        let req = Request::parse(raw).unwrap();
        assert_eq!(
            req.header("transport"),
            Some("RTP/AVP;unicast;client_port=5000-5001")
        );
    }

    #[test]
    fn first_value_wins_on_duplicate_headers() {
        let raw = b"OPTIONS * RTSP/1.0\r\nCSeq: 1\r\nCSeq: 2\r\n\r\n";
        let req = Request::parse(raw).unwrap();
        assert_eq!(req.cseq, 1);
    }

    #[test]
    fn missing_cseq_is_an_error() {
        let raw = b"OPTIONS * RTSP/1.0\r\n\r\n";
        assert_eq!(Request::parse(raw).unwrap_err(), RequestError::MissingCSeq);
    }

    #[test]
    fn malformed_request_line_is_an_error() {
        let raw = b"GARBAGE\r\n\r\n";
        assert_eq!(
            Request::parse(raw).unwrap_err(),
            RequestError::MalformedRequestLine
        );
    }
}
