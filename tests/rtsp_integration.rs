//! End-to-end RTSP session scenarios: OPTIONS, DESCRIBE, SETUP (success
//! and interleaved-rejection), PLAY fragmentation, and publisher tick
//! delivery.

use rtsp_mjpeg_server::rtsp::{RtspServer, ServerConfig};
use std::io::Write as _;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};

fn write_test_jpeg(dir: &std::path::Path, name: &str, width: u16, height: u16, scan_len: usize) {
    write_jpeg_with_sof(dir, name, width, height, scan_len, 0xC0);
}

fn write_progressive_test_jpeg(
    dir: &std::path::Path,
    name: &str,
    width: u16,
    height: u16,
    scan_len: usize,
) {
    write_jpeg_with_sof(dir, name, width, height, scan_len, 0xC2);
}

fn write_jpeg_with_sof(
    dir: &std::path::Path,
    name: &str,
    width: u16,
    height: u16,
    scan_len: usize,
    sof_marker: u8,
) {
    let mut data = vec![0xFFu8, 0xD8];
    data.extend_from_slice(&[0xFF, 0xDB, 0, 67, 0]);
    data.extend_from_slice(&[16u8; 64]);
    data.extend_from_slice(&[0xFF, sof_marker, 0, 11, 8]);
    data.extend_from_slice(&height.to_be_bytes());
    data.extend_from_slice(&width.to_be_bytes());
    data.extend_from_slice(&[1, 1, 0x11, 0]);
    data.extend_from_slice(&[0xFF, 0xDA, 0, 8, 1, 1, 0, 0, 0, 0]);
    data.extend((0..scan_len).map(|i| (i % 256) as u8));
    data.extend_from_slice(&[0xFF, 0xD9]);
    let mut f = std::fs::File::create(dir.join(name)).unwrap();
    f.write_all(&data).unwrap();
}

async fn start_server(src_dir: std::path::PathBuf) -> SocketAddr {
    let listen_addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
    // Bind ourselves first to pick a free port, then hand it to the server.
    let probe = std::net::TcpListener::bind(listen_addr).unwrap();
    let addr = probe.local_addr().unwrap();
    drop(probe);

    let config = ServerConfig {
        listen_addr: addr,
        advertise_address: "127.0.0.1".to_string(),
        src_dir,
        mtu: 1400,
        ssrc: 0x1234_5678,
        server_rtp_port: 0,
        q: 255,
        publisher_tick: Duration::from_millis(20),
    };

    let server = RtspServer::new(config);
    tokio::spawn(server.run());
    tokio::time::sleep(Duration::from_millis(50)).await;
    addr
}

async fn send_request(stream: &mut TcpStream, request: &str) -> String {
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut buf = vec![0u8; 8192];
    let n = tokio::time::timeout(Duration::from_secs(2), stream.read(&mut buf))
        .await
        .unwrap()
        .unwrap();
    String::from_utf8_lossy(&buf[..n]).to_string()
}

#[tokio::test]
async fn options_lists_supported_methods() {
    let dir = tempfile::tempdir().unwrap();
    let addr = start_server(dir.path().to_path_buf()).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let resp = send_request(
        &mut stream,
        "OPTIONS rtsp://127.0.0.1/test.jpg RTSP/1.0\r\nCSeq: 1\r\n\r\n",
    )
    .await;

    assert!(resp.starts_with("RTSP/1.0 200 OK"));
    assert!(resp.contains("Public: DESCRIBE, SETUP, TEARDOWN, PLAY, PAUSE"));
    assert!(resp.contains("CSeq: 1"));
}

#[tokio::test]
async fn describe_returns_sdp_with_geometry() {
    let dir = tempfile::tempdir().unwrap();
    write_test_jpeg(dir.path(), "test.jpg", 160, 120, 64);
    let addr = start_server(dir.path().to_path_buf()).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let resp = send_request(
        &mut stream,
        "DESCRIBE rtsp://127.0.0.1/test.jpg RTSP/1.0\r\nCSeq: 2\r\n\r\n",
    )
    .await;

    assert!(resp.starts_with("RTSP/1.0 200 OK"));
    assert!(resp.contains("Content-Type: application/sdp"));
    assert!(resp.contains("a=cliprect:0,0,120,160"));
}

#[tokio::test]
async fn describe_missing_file_is_404() {
    let dir = tempfile::tempdir().unwrap();
    let addr = start_server(dir.path().to_path_buf()).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let resp = send_request(
        &mut stream,
        "DESCRIBE rtsp://127.0.0.1/missing.jpg RTSP/1.0\r\nCSeq: 2\r\n\r\n",
    )
    .await;

    assert!(resp.starts_with("RTSP/1.0 404"));
}

#[tokio::test]
async fn describe_progressive_jpeg_is_415() {
    let dir = tempfile::tempdir().unwrap();
    write_progressive_test_jpeg(dir.path(), "prog.jpg", 160, 120, 64);
    let addr = start_server(dir.path().to_path_buf()).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let resp = send_request(
        &mut stream,
        "DESCRIBE rtsp://127.0.0.1/prog.jpg RTSP/1.0\r\nCSeq: 2\r\n\r\n",
    )
    .await;

    assert!(resp.starts_with("RTSP/1.0 415"));
}

#[tokio::test]
async fn play_progressive_jpeg_is_415() {
    let dir = tempfile::tempdir().unwrap();
    write_progressive_test_jpeg(dir.path(), "prog.jpg", 160, 120, 64);
    let addr = start_server(dir.path().to_path_buf()).await;

    let client_socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let client_port = client_socket.local_addr().unwrap().port();

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let setup_resp = send_request(
        &mut stream,
        &format!(
            "SETUP rtsp://127.0.0.1/prog.jpg RTSP/1.0\r\nCSeq: 1\r\nTransport: RTP/AVP;unicast;client_port={}-{}\r\n\r\n",
            client_port,
            client_port + 1
        ),
    )
    .await;
    assert!(setup_resp.starts_with("RTSP/1.0 200"));

    let play_resp = send_request(
        &mut stream,
        "PLAY rtsp://127.0.0.1/prog.jpg RTSP/1.0\r\nCSeq: 2\r\n\r\n",
    )
    .await;
    assert!(play_resp.starts_with("RTSP/1.0 415"));
}

#[tokio::test]
async fn setup_with_unicast_transport_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    write_test_jpeg(dir.path(), "test.jpg", 160, 120, 64);
    let addr = start_server(dir.path().to_path_buf()).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let resp = send_request(
        &mut stream,
        "SETUP rtsp://127.0.0.1/test.jpg RTSP/1.0\r\nCSeq: 3\r\nTransport: RTP/AVP;unicast;client_port=15000-15001\r\n\r\n",
    )
    .await;

    assert!(resp.starts_with("RTSP/1.0 200 OK"));
    assert!(resp.contains("Session:"));
    assert!(resp.contains("Transport:"));
}

#[tokio::test]
async fn setup_with_interleaved_transport_is_461() {
    let dir = tempfile::tempdir().unwrap();
    write_test_jpeg(dir.path(), "test.jpg", 160, 120, 64);
    let addr = start_server(dir.path().to_path_buf()).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let resp = send_request(
        &mut stream,
        "SETUP rtsp://127.0.0.1/test.jpg RTSP/1.0\r\nCSeq: 3\r\nTransport: RTP/AVP/TCP;interleaved=0-1\r\n\r\n",
    )
    .await;

    assert!(resp.starts_with("RTSP/1.0 461"));
}

#[tokio::test]
async fn play_after_setup_delivers_rtp_packets_to_client_port() {
    let dir = tempfile::tempdir().unwrap();
    // A scan long enough to require fragmentation at a tight MTU.
    write_test_jpeg(dir.path(), "test.jpg", 160, 120, 5000);
    let addr = start_server(dir.path().to_path_buf()).await;

    let client_socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let client_port = client_socket.local_addr().unwrap().port();

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let setup_resp = send_request(
        &mut stream,
        &format!(
            "SETUP rtsp://127.0.0.1/test.jpg RTSP/1.0\r\nCSeq: 1\r\nTransport: RTP/AVP;unicast;client_port={}-{}\r\n\r\n",
            client_port,
            client_port + 1
        ),
    )
    .await;
    assert!(setup_resp.starts_with("RTSP/1.0 200"));

    let play_resp = send_request(
        &mut stream,
        "PLAY rtsp://127.0.0.1/test.jpg RTSP/1.0\r\nCSeq: 2\r\n\r\n",
    )
    .await;
    assert!(play_resp.starts_with("RTSP/1.0 200"));

    let mut buf = [0u8; 2000];
    let (n, _) = tokio::time::timeout(Duration::from_secs(2), client_socket.recv_from(&mut buf))
        .await
        .expect("timed out waiting for an RTP packet")
        .unwrap();
    assert!(n >= 12, "received datagram too short to be RTP");
    // RTP version bits must read 2 (RFC 3550).
    assert_eq!(buf[0] >> 6, 2);
}

#[tokio::test]
async fn teardown_stops_further_rtp_delivery() {
    let dir = tempfile::tempdir().unwrap();
    write_test_jpeg(dir.path(), "test.jpg", 160, 120, 64);
    let addr = start_server(dir.path().to_path_buf()).await;

    let client_socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let client_port = client_socket.local_addr().unwrap().port();

    let mut stream = TcpStream::connect(addr).await.unwrap();
    send_request(
        &mut stream,
        &format!(
            "SETUP rtsp://127.0.0.1/test.jpg RTSP/1.0\r\nCSeq: 1\r\nTransport: RTP/AVP;unicast;client_port={}-{}\r\n\r\n",
            client_port,
            client_port + 1
        ),
    )
    .await;
    send_request(
        &mut stream,
        "PLAY rtsp://127.0.0.1/test.jpg RTSP/1.0\r\nCSeq: 2\r\n\r\n",
    )
    .await;

    let mut buf = [0u8; 2000];
    tokio::time::timeout(Duration::from_secs(2), client_socket.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();

    let teardown_resp = send_request(
        &mut stream,
        "TEARDOWN rtsp://127.0.0.1/test.jpg RTSP/1.0\r\nCSeq: 3\r\n\r\n",
    )
    .await;
    assert!(teardown_resp.starts_with("RTSP/1.0 200"));

    // After teardown no more packets should arrive for this destination.
    let result = tokio::time::timeout(Duration::from_millis(200), client_socket.recv_from(&mut buf)).await;
    assert!(result.is_err(), "expected no further RTP packets after TEARDOWN");
}
