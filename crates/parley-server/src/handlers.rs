//! Connection handling for the Parley server.
//!
//! One coordinating task owns the listener and the [`Hub`]. Every connection
//! gets a reader task, which forwards raw bytes to the coordinator as
//! [`Event`]s, and a writer task, which drains a bounded queue of lines onto
//! the socket. Reader and writer tasks never see the hub.

use crate::config::Config;
use crate::metrics::{self, SessionGauge};
use anyhow::Result;
use bytes::{Bytes, BytesMut};
use futures_util::future::join_all;
use futures_util::SinkExt;
use parley_core::{Delivery, DirectoryConfig, Hub, HubConfig, Outbox, SessionId, GREETING_LINES};
use parley_protocol::{LineCodec, Reply};
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::codec::FramedWrite;
use tracing::{debug, error, info, trace, warn};

/// Capacity of the queue from reader tasks to the coordinator.
const EVENT_QUEUE_CAPACITY: usize = 1024;

/// Pause after a failed accept (e.g. out of file descriptors).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// How long shutdown waits for writers to flush.
const SHUTDOWN_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Server setup errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The configured host is not an IP address.
    #[error("Invalid listen address: {0}")]
    InvalidAddress(String),

    /// The listener could not be bound.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The Prometheus exporter could not be installed.
    #[error("Failed to start metrics exporter: {0}")]
    Metrics(String),
}

/// Input from a connection's reader task.
#[derive(Debug)]
enum Event {
    /// Bytes read from the socket.
    Data(SessionId, Bytes),
    /// The peer closed the connection or a read failed.
    Closed(SessionId, String),
}

/// The coordinator's handle on one connection.
struct Connection {
    outbound: mpsc::Sender<Arc<str>>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
    _gauge: SessionGauge,
}

/// The chat server: listener, hub and connection table.
pub struct Server {
    config: Config,
    listener: TcpListener,
    hub: Hub,
    connections: HashMap<SessionId, Connection>,
    events_tx: mpsc::Sender<Event>,
    events_rx: mpsc::Receiver<Event>,
    /// Writers of released connections, still flushing.
    draining: Vec<JoinHandle<()>>,
}

impl Server {
    /// Bind the listener and create an empty hub.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid or cannot be bound.
    pub async fn bind(config: Config, password: impl Into<String>) -> Result<Self, ServerError> {
        let addr = config.bind_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;

        let hub = Hub::new(HubConfig {
            server_name: config.server_name.clone(),
            password: password.into(),
            max_line_length: config.limits.max_line_length,
            directory: DirectoryConfig {
                auto_delete_empty_channels: config.channels.auto_delete_empty,
            },
        });
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);

        Ok(Self {
            config,
            listener,
            hub,
            connections: HashMap::new(),
            events_tx,
            events_rx,
            draining: Vec::new(),
        })
    }

    /// The address the listener is bound to.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket address cannot be read.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Run the event loop until `shutdown` is set.
    ///
    /// The flag is polled once per tick, so the loop exits within one tick
    /// interval of it being set. All sessions are then disconnected through
    /// the normal path.
    pub async fn run(mut self, shutdown: Arc<AtomicBool>) {
        let mut tick = tokio::time::interval(Duration::from_millis(
            self.config.event_loop.tick_ms.max(1),
        ));
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        if let Ok(addr) = self.local_addr() {
            info!("Parley server listening on {}", addr);
        }

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => self.accept(stream, peer),
                    Err(e) => {
                        warn!(error = %e, "Accept failed");
                        metrics::record_failure("accept");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },

                Some(event) = self.events_rx.recv() => self.handle_event(event),

                _ = tick.tick() => {
                    if shutdown.load(Ordering::Relaxed) {
                        info!("Shutdown requested");
                        break;
                    }
                    self.draining.retain(|writer| !writer.is_finished());
                    metrics::set_channels(self.hub.channels().len());
                }
            }
        }

        self.shutdown().await;
    }

    fn accept(&mut self, stream: TcpStream, peer: SocketAddr) {
        if self.connections.len() >= self.config.limits.max_connections {
            warn!(peer = %peer, "Connection limit reached, refusing");
            metrics::record_failure("server_full");
            tokio::spawn(refuse(stream));
            return;
        }
        if let Err(e) = stream.set_nodelay(true) {
            debug!(peer = %peer, error = %e, "Failed to set TCP_NODELAY");
        }

        let (id, greeting) = self.hub.connect(&peer.ip().to_string());
        let (read_half, write_half) = stream.into_split();
        let (outbound, queue) = mpsc::channel(outbound_capacity(self.config.limits.outbound_queue));

        let reader = tokio::spawn(read_loop(
            id,
            read_half,
            self.events_tx.clone(),
            self.config.limits.read_buffer.max(1),
        ));
        let writer = tokio::spawn(write_loop(id, write_half, queue));

        self.connections.insert(
            id,
            Connection {
                outbound,
                reader,
                writer,
                _gauge: SessionGauge::open(),
            },
        );
        debug!(session = %id, peer = %peer, "Connection accepted");

        self.deliver(greeting);
    }

    fn handle_event(&mut self, event: Event) {
        let start = Instant::now();
        let outbox = match event {
            Event::Data(id, data) => {
                metrics::record_bytes(data.len());
                self.hub.receive(id, &data)
            }
            Event::Closed(id, reason) => {
                debug!(session = %id, reason = %reason, "Connection closed by peer");
                let outbox = self.hub.disconnect(id, &reason);
                self.release(id);
                outbox
            }
        };
        self.deliver(outbox);
        metrics::record_event_latency(start.elapsed().as_secs_f64());
    }

    /// Queue every delivery, then release closed connections.
    ///
    /// A session whose queue is full is disconnected, and the departure
    /// notices that produces are delivered in turn.
    fn deliver(&mut self, outbox: Outbox) {
        let mut pending = VecDeque::from([outbox]);

        while let Some(outbox) = pending.pop_front() {
            let (deliveries, closed) = outbox.into_parts();
            let mut overflowed: Vec<SessionId> = Vec::new();

            for Delivery { target, line } in deliveries {
                if overflowed.contains(&target) {
                    continue;
                }
                let Some(connection) = self.connections.get(&target) else {
                    continue;
                };
                match connection.outbound.try_send(line) {
                    Ok(()) => metrics::record_line(),
                    Err(TrySendError::Full(_)) => overflowed.push(target),
                    Err(TrySendError::Closed(_)) => {
                        trace!(session = %target, "Writer gone, line dropped");
                    }
                }
            }

            for id in closed {
                self.release(id);
            }

            for id in overflowed {
                warn!(session = %id, "Outbound queue full, disconnecting");
                metrics::record_failure("sendq");
                pending.push_back(self.hub.disconnect(id, "SendQ exceeded"));
            }
        }
    }

    /// Drop a connection: stop reading, let the writer flush and close.
    fn release(&mut self, id: SessionId) {
        let Some(connection) = self.connections.remove(&id) else {
            return;
        };
        connection.reader.abort();
        self.draining.push(connection.writer);
        debug!(session = %id, "Connection released");
    }

    async fn shutdown(mut self) {
        let ids = self.hub.sessions().ids();
        info!(sessions = ids.len(), "Disconnecting all sessions");

        for id in ids {
            let mut outbox = Outbox::new();
            outbox.send_reply(id, &Reply::new("ERROR").trailing("Server shutting down"));
            outbox.merge(self.hub.disconnect(id, "Server shutting down"));
            self.deliver(outbox);
        }

        let writers = std::mem::take(&mut self.draining);
        if tokio::time::timeout(SHUTDOWN_FLUSH_TIMEOUT, join_all(writers))
            .await
            .is_err()
        {
            warn!("Timed out flushing connections");
        }
        info!("Server stopped");
    }
}

/// Per-connection queue size; never smaller than the greeting.
fn outbound_capacity(configured: usize) -> usize {
    configured.max(GREETING_LINES)
}

/// Tell a peer the server is full and hang up.
async fn refuse(stream: TcpStream) {
    let mut framed = FramedWrite::new(stream, LineCodec::new());
    let refusal = Reply::new("ERROR").trailing("Server full").to_string();
    if let Err(e) = framed.send(refusal).await {
        debug!(error = %e, "Failed to send refusal");
    }
}

/// Forward bytes from the socket until EOF or error.
async fn read_loop(
    id: SessionId,
    mut reader: OwnedReadHalf,
    events: mpsc::Sender<Event>,
    buffer_size: usize,
) {
    let mut buf = BytesMut::with_capacity(buffer_size);

    let reason = loop {
        buf.reserve(buffer_size);
        match reader.read_buf(&mut buf).await {
            Ok(0) => break "Connection closed".to_string(),
            Ok(_) => {
                if events.send(Event::Data(id, buf.split().freeze())).await.is_err() {
                    return;
                }
            }
            Err(e) => break format!("Read error: {e}"),
        }
    };

    if events.send(Event::Closed(id, reason)).await.is_err() {
        trace!(session = %id, "Event loop gone");
    }
}

/// Write queued lines, batching whatever is ready before each flush.
///
/// Returns once the queue's sender is dropped and everything queued has
/// been written, shutting down the write side of the socket.
async fn write_loop(id: SessionId, writer: OwnedWriteHalf, mut queue: mpsc::Receiver<Arc<str>>) {
    let mut framed = FramedWrite::new(writer, LineCodec::new());

    while let Some(line) = queue.recv().await {
        if let Err(e) = framed.feed(line).await {
            debug!(session = %id, error = %e, "Write failed");
            return;
        }
        while let Ok(line) = queue.try_recv() {
            if let Err(e) = framed.feed(line).await {
                debug!(session = %id, error = %e, "Write failed");
                return;
            }
        }
        if let Err(e) = SinkExt::<Arc<str>>::flush(&mut framed).await {
            debug!(session = %id, error = %e, "Flush failed");
            return;
        }
    }

    if let Err(e) = SinkExt::<Arc<str>>::close(&mut framed).await {
        trace!(session = %id, error = %e, "Close failed");
    }
}

/// Bind and run the server until `shutdown` is set.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config, password: String, shutdown: Arc<AtomicBool>) -> Result<()> {
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let server = Server::bind(config, password).await?;
    server.run(shutdown).await;

    Ok(())
}
