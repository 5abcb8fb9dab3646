//! Broadcast transports carrying encoded envelopes.
//!
//! - `LocalHub`: in-process fan-out between several buses
//! - `SocketTransport`: machine-local broadcast over loopback TCP
//!
//! A transport delivers every message to all other endpoints on the same
//! channel, never back to the endpoint that sent it. Delivery is best-effort.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sha2::{Digest, Sha512};
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use super::error::BusError;

const INBOUND_CAPACITY: usize = 1024;
const RELINK_BACKOFF: Duration = Duration::from_millis(250);
const PORT_RANGE_START: u16 = 49152;
const PORT_RANGE_LEN: u16 = 16384;

pub trait Transport: Send + Sync {
    /// Broadcast one encoded envelope to every other endpoint.
    fn send(&self, raw: String) -> Result<(), BusError>;

    /// Receiver for messages sent by other endpoints.
    fn subscribe(&self) -> broadcast::Receiver<String>;
}

// ---------------------------------------------------------------------------
// In-process hub
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct LocalHub {
    peers: Arc<Mutex<Vec<(u64, broadcast::Sender<String>)>>>,
    next_id: Arc<AtomicU64>,
}

impl LocalHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new endpoint to the hub.
    pub fn endpoint(&self) -> LocalEndpoint {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, _) = broadcast::channel(INBOUND_CAPACITY);
        self.peers
            .lock()
            .expect("local hub mutex poisoned")
            .push((id, tx.clone()));
        LocalEndpoint {
            id,
            hub: self.clone(),
            inbound: tx,
        }
    }

    fn fan_out(&self, origin: u64, raw: &str) {
        let guard = self.peers.lock().expect("local hub mutex poisoned");
        for (id, tx) in guard.iter() {
            if *id == origin {
                continue;
            }
            // No receivers yet is not an error for a broadcast medium.
            let _ = tx.send(raw.to_string());
        }
    }
}

pub struct LocalEndpoint {
    id: u64,
    hub: LocalHub,
    inbound: broadcast::Sender<String>,
}

impl Transport for LocalEndpoint {
    fn send(&self, raw: String) -> Result<(), BusError> {
        self.hub.fan_out(self.id, &raw);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<String> {
        self.inbound.subscribe()
    }
}

impl Drop for LocalEndpoint {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.hub.peers.lock() {
            guard.retain(|(id, _)| *id != self.id);
        }
    }
}

// ---------------------------------------------------------------------------
// Loopback socket transport
// ---------------------------------------------------------------------------

/// Deterministic loopback port for a channel name.
pub fn port_for_channel(name: &str) -> u16 {
    let digest = Sha512::digest(name.as_bytes());
    let raw = u16::from_be_bytes([digest[0], digest[1]]);
    PORT_RANGE_START + raw % PORT_RANGE_LEN
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkRole {
    Hub,
    Spoke,
}

/// Newline-delimited JSON over loopback TCP.
///
/// The first process to bind the channel's port becomes the hub and relays
/// every line to all other peers; later processes connect as spokes. When a
/// spoke loses its hub it tries to take over the port, otherwise reconnects.
pub struct SocketTransport {
    outbound: mpsc::UnboundedSender<String>,
    inbound: broadcast::Sender<String>,
    role: Arc<Mutex<Option<LinkRole>>>,
    link: JoinHandle<()>,
}

impl SocketTransport {
    pub async fn connect(channel: &str, port: Option<u16>) -> Result<Self, BusError> {
        let port = port.unwrap_or_else(|| port_for_channel(channel));
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound, _) = broadcast::channel(INBOUND_CAPACITY);

        // Establish the first link eagerly so callers see bind/connect errors.
        let first = establish(addr).await?;
        tracing::info!(
            "joined channel '{channel}' on {addr} as {:?}",
            first.role()
        );
        let role = Arc::new(Mutex::new(Some(first.role())));

        let link = tokio::spawn(run_link(
            addr,
            first,
            outbound_rx,
            inbound.clone(),
            role.clone(),
        ));

        Ok(Self {
            outbound: outbound_tx,
            inbound,
            role,
            link,
        })
    }

    /// Current role of this process on the channel, `None` while relinking.
    pub fn role(&self) -> Option<LinkRole> {
        *self.role.lock().expect("socket transport mutex poisoned")
    }
}

impl Transport for SocketTransport {
    fn send(&self, raw: String) -> Result<(), BusError> {
        self.outbound
            .send(raw)
            .map_err(|_| BusError::Transport("socket link is closed".into()))
    }

    fn subscribe(&self) -> broadcast::Receiver<String> {
        self.inbound.subscribe()
    }
}

impl Drop for SocketTransport {
    fn drop(&mut self) {
        self.link.abort();
    }
}

enum Link {
    Hub(TcpListener),
    Spoke(TcpStream),
}

impl Link {
    fn role(&self) -> LinkRole {
        match self {
            Link::Hub(_) => LinkRole::Hub,
            Link::Spoke(_) => LinkRole::Spoke,
        }
    }
}

async fn establish(addr: SocketAddr) -> Result<Link, BusError> {
    match TcpListener::bind(addr).await {
        Ok(listener) => Ok(Link::Hub(listener)),
        Err(bind_err) => match TcpStream::connect(addr).await {
            Ok(stream) => Ok(Link::Spoke(stream)),
            Err(connect_err) => Err(BusError::Transport(format!(
                "cannot bind ({bind_err}) or connect ({connect_err}) to {addr}"
            ))),
        },
    }
}

async fn run_link(
    addr: SocketAddr,
    first: Link,
    mut outbound: mpsc::UnboundedReceiver<String>,
    inbound: broadcast::Sender<String>,
    role: Arc<Mutex<Option<LinkRole>>>,
) {
    let mut next = Some(first);
    loop {
        let link = match next.take() {
            Some(link) => link,
            None => match establish(addr).await {
                Ok(link) => {
                    let dropped = discard_queued(&mut outbound);
                    tracing::info!(
                        "relinked to {addr} as {:?}, dropped {dropped} unsent messages",
                        link.role()
                    );
                    link
                }
                Err(e) => {
                    tracing::debug!("relink failed: {e}");
                    discard_queued(&mut outbound);
                    tokio::time::sleep(RELINK_BACKOFF).await;
                    continue;
                }
            },
        };

        *role.lock().expect("socket transport mutex poisoned") = Some(link.role());
        let finished = match link {
            Link::Hub(listener) => serve_hub(listener, &mut outbound, &inbound).await,
            Link::Spoke(stream) => serve_spoke(stream, &mut outbound, &inbound).await,
        };
        *role.lock().expect("socket transport mutex poisoned") = None;

        if !finished {
            // Local side dropped its sender; nothing left to relay.
            return;
        }
        tracing::warn!("link to {addr} lost, relinking");
        tokio::time::sleep(RELINK_BACKOFF).await;
    }
}

/// Empty the outbound queue. Messages sent while no link was up are lost.
fn discard_queued(outbound: &mut mpsc::UnboundedReceiver<String>) -> usize {
    let mut dropped = 0;
    while outbound.try_recv().is_ok() {
        dropped += 1;
    }
    dropped
}

type PeerMap = Arc<Mutex<HashMap<u64, mpsc::UnboundedSender<String>>>>;

fn relay(peers: &PeerMap, origin: Option<u64>, raw: &str) {
    let guard = peers.lock().expect("socket hub mutex poisoned");
    for (id, tx) in guard.iter() {
        if Some(*id) == origin {
            continue;
        }
        let _ = tx.send(raw.to_string());
    }
}

/// Returns `true` if the link ended and should be re-established, `false`
/// when the local sender side is gone.
async fn serve_hub(
    listener: TcpListener,
    outbound: &mut mpsc::UnboundedReceiver<String>,
    inbound: &broadcast::Sender<String>,
) -> bool {
    let peers: PeerMap = Arc::new(Mutex::new(HashMap::new()));
    let (relay_tx, mut relay_rx) = mpsc::unbounded_channel::<(u64, String)>();
    let mut next_peer = 0u64;

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, remote) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        tracing::warn!("hub accept failed: {e}");
                        continue;
                    }
                };
                let peer_id = next_peer;
                next_peer += 1;
                tracing::debug!("peer {peer_id} connected from {remote}");

                let (read_half, mut write_half) = stream.into_split();
                let (peer_tx, mut peer_rx) = mpsc::unbounded_channel::<String>();
                peers
                    .lock()
                    .expect("socket hub mutex poisoned")
                    .insert(peer_id, peer_tx);

                tokio::spawn(async move {
                    while let Some(raw) = peer_rx.recv().await {
                        if write_line(&mut write_half, &raw).await.is_err() {
                            break;
                        }
                    }
                });

                let relay_tx = relay_tx.clone();
                let peers_for_reader = peers.clone();
                tokio::spawn(async move {
                    let mut lines = BufReader::new(read_half).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        if relay_tx.send((peer_id, line)).is_err() {
                            break;
                        }
                    }
                    peers_for_reader
                        .lock()
                        .expect("socket hub mutex poisoned")
                        .remove(&peer_id);
                    tracing::debug!("peer {peer_id} disconnected");
                });
            }
            Some((origin, raw)) = relay_rx.recv() => {
                relay(&peers, Some(origin), &raw);
                let _ = inbound.send(raw);
            }
            local = outbound.recv() => match local {
                Some(raw) => relay(&peers, None, &raw),
                None => return false,
            },
        }
    }
}

async fn serve_spoke(
    stream: TcpStream,
    outbound: &mut mpsc::UnboundedReceiver<String>,
    inbound: &broadcast::Sender<String>,
) -> bool {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    let _ = inbound.send(line);
                }
                Ok(None) => return true,
                Err(e) => {
                    tracing::debug!("spoke read failed: {e}");
                    return true;
                }
            },
            local = outbound.recv() => match local {
                Some(raw) => {
                    if let Err(e) = write_line(&mut write_half, &raw).await {
                        tracing::debug!("spoke write failed: {e}");
                        return true;
                    }
                }
                None => return false,
            },
        }
    }
}

async fn write_line<W>(writer: &mut W, raw: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(raw.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}
