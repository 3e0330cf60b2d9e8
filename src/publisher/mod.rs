//! RTP publisher: periodic tick, destination fan-out, UDP send.
//!
//! Owns the one JPEG source feeding a stream, the table of clients
//! currently subscribed to it, and a UDP socket. Runs as a single task;
//! the RTSP server mutates the destination table by sending it commands
//! over a channel rather than sharing a `Mutex`, so SETUP/TEARDOWN never
//! blocks on (or races with) the publisher's send loop.

pub mod source;

pub use source::{FrameSource, SourceError, StillJpegSource};

use bytes::Bytes;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

pub const DEFAULT_TICK: Duration = Duration::from_millis(40);

#[derive(Error, Debug)]
pub enum PublisherError {
    #[error("failed to bind UDP socket on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

enum Command {
    AddDestination(SocketAddr),
    RemoveDestination(SocketAddr),
    Stats(tokio::sync::oneshot::Sender<PublisherStats>),
    Shutdown,
}

/// A cheaply cloneable reference to a running publisher, used by the RTSP
/// server to manage the destination table from the per-connection task.
#[derive(Clone)]
pub struct PublisherHandle {
    cmd_tx: mpsc::Sender<Command>,
}

impl PublisherHandle {
    pub async fn add_destination(&self, addr: SocketAddr) {
        let _ = self.cmd_tx.send(Command::AddDestination(addr)).await;
    }

    pub async fn remove_destination(&self, addr: SocketAddr) {
        let _ = self.cmd_tx.send(Command::RemoveDestination(addr)).await;
    }

    pub async fn stats(&self) -> Option<PublisherStats> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.cmd_tx.send(Command::Stats(tx)).await.ok()?;
        rx.await.ok()
    }

    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(Command::Shutdown).await;
    }
}

#[derive(Debug, Clone, Default)]
pub struct PublisherStats {
    pub ticks: u64,
    pub packets_sent: u64,
    pub send_errors: u64,
    pub destinations: usize,
}

/// Owns the send loop: one tick, one pull from the source, one fan-out
/// to every current destination.
pub struct Publisher {
    socket: Arc<UdpSocket>,
    source: Box<dyn FrameSource>,
    destinations: HashSet<SocketAddr>,
    tick: Duration,
    cmd_rx: mpsc::Receiver<Command>,
    ticks: Arc<AtomicU64>,
    packets_sent: Arc<AtomicU64>,
    send_errors: Arc<AtomicU64>,
}

impl Publisher {
    /// Binds a UDP socket on `bind_addr` (the server's advertised RTP
    /// port) and returns the publisher together with a handle for
    /// controlling its destination table.
    pub async fn bind(
        bind_addr: SocketAddr,
        source: Box<dyn FrameSource>,
        tick: Duration,
    ) -> Result<(Self, PublisherHandle), PublisherError> {
        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|source| PublisherError::Bind {
                addr: bind_addr,
                source,
            })?;
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let publisher = Self {
            socket: Arc::new(socket),
            source,
            destinations: HashSet::new(),
            tick,
            cmd_rx,
            ticks: Arc::new(AtomicU64::new(0)),
            packets_sent: Arc::new(AtomicU64::new(0)),
            send_errors: Arc::new(AtomicU64::new(0)),
        };

        Ok((publisher, PublisherHandle { cmd_tx }))
    }

    /// Runs the tick loop until [`PublisherHandle::shutdown`] is called.
    /// Each tick pulls exactly one datagram from the source and fans it
    /// out to every destination currently in the table; a send failure
    /// to one destination is logged and does not affect the others or
    /// stop the loop (per-destination UDP errors are non-fatal).
    pub async fn run(mut self) {
        let mut interval = tokio::time::interval(self.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(local = %self.socket.local_addr().ok().map(|a| a.to_string()).unwrap_or_default(), "publisher started");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.ticks.fetch_add(1, Ordering::Relaxed);
                    if self.destinations.is_empty() {
                        continue;
                    }
                    match self.source.next_packet() {
                        Ok(packet) => self.fan_out(&packet).await,
                        Err(e) => {
                            warn!(error = %e, "frame source failed to produce a packet");
                        }
                    }
                }
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(Command::AddDestination(addr)) => {
                            if self.destinations.insert(addr) {
                                debug!(%addr, "destination added");
                            }
                        }
                        Some(Command::RemoveDestination(addr)) => {
                            if self.destinations.remove(&addr) {
                                debug!(%addr, "destination removed");
                            }
                        }
                        Some(Command::Stats(reply)) => {
                            let _ = reply.send(PublisherStats {
                                ticks: self.ticks.load(Ordering::Relaxed),
                                packets_sent: self.packets_sent.load(Ordering::Relaxed),
                                send_errors: self.send_errors.load(Ordering::Relaxed),
                                destinations: self.destinations.len(),
                            });
                        }
                        Some(Command::Shutdown) | None => break,
                    }
                }
            }
        }

        info!("publisher stopped");
    }

    async fn fan_out(&self, packet: &Bytes) {
        for addr in &self.destinations {
            match self.socket.send_to(packet, addr).await {
                Ok(_) => {
                    self.packets_sent.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    self.send_errors.fetch_add(1, Ordering::Relaxed);
                    error!(%addr, error = %e, "failed to send RTP packet, continuing");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    struct CountingSource {
        count: Arc<StdMutex<u32>>,
    }

    impl FrameSource for CountingSource {
        fn next_packet(&mut self) -> Result<Bytes, SourceError> {
            let mut count = self.count.lock().unwrap();
            *count += 1;
            Ok(Bytes::from(vec![*count as u8]))
        }
    }

    #[tokio::test]
    async fn add_and_remove_destination_is_idempotent() {
        let bind_addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let count = Arc::new(StdMutex::new(0));
        let source = Box::new(CountingSource {
            count: count.clone(),
        });
        let (publisher, handle) = Publisher::bind(bind_addr, source, Duration::from_millis(10))
            .await
            .unwrap();

        let dest: SocketAddr = "127.0.0.1:9".parse().unwrap();
        let task = tokio::spawn(publisher.run());

        handle.add_destination(dest).await;
        handle.add_destination(dest).await;
        handle.remove_destination(dest).await;
        handle.remove_destination(dest).await;

        let stats = handle.stats().await.unwrap();
        assert_eq!(stats.destinations, 0);

        handle.shutdown().await;
        let _ = task.await;
    }

    #[tokio::test]
    async fn fans_out_to_every_destination_each_tick() {
        let bind_addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let count = Arc::new(StdMutex::new(0));
        let source = Box::new(CountingSource {
            count: count.clone(),
        });
        let (publisher, handle) = Publisher::bind(bind_addr, source, Duration::from_millis(10))
            .await
            .unwrap();

        let listener_a = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let listener_b = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr_a = listener_a.local_addr().unwrap();
        let addr_b = listener_b.local_addr().unwrap();

        let task = tokio::spawn(publisher.run());
        handle.add_destination(addr_a).await;
        handle.add_destination(addr_b).await;

        let mut buf = [0u8; 16];
        let (_, _) = tokio::time::timeout(Duration::from_secs(1), listener_a.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        let (_, _) = tokio::time::timeout(Duration::from_secs(1), listener_b.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();

        handle.shutdown().await;
        let _ = task.await;
    }
}
