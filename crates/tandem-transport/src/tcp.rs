//! TCP transport: one listener or one outbound connection, one peer.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tandem_dispatch::ExecutionQueue;
use tandem_protocol::{encode_frame, FrameDecoder, Message, ProtocolError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{TransportConfig, TransportError, TransportEvent, TransportListener};

/// Bytes requested per socket read.
const READ_CHUNK: usize = 4096;

/// The write half is shared between `send` and the accept loop's greeting,
/// so writes are serialized behind an async mutex.
type Writer = Arc<tokio::sync::Mutex<OwnedWriteHalf>>;

/// The live connection. Dropping it stops its receive loop (the loop
/// watches `stop`) and releases our write half.
struct Connection {
    id: u64,
    peer_addr: SocketAddr,
    writer: Writer,
    stop: watch::Sender<bool>,
}

/// State reachable from both the owner and the background tasks.
struct Shared {
    /// Raised once by `close`. The accept loop watches it.
    shutdown: watch::Sender<bool>,
    connection: Mutex<Option<Connection>>,
    local_addr: Mutex<Option<SocketAddr>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    next_connection_id: AtomicU64,
}

/// What a freshly installed connection hands to its receive loop.
struct Installed {
    id: u64,
    reader: OwnedReadHalf,
    writer: Writer,
    stop: watch::Receiver<bool>,
}

impl Shared {
    fn is_shut_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Makes `stream` the current connection, tearing down any previous
    /// one. Refuses (and drops the stream) once the transport is shut down.
    fn install(&self, stream: TcpStream, peer_addr: SocketAddr) -> Option<Installed> {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "could not disable Nagle's algorithm");
        }
        let (reader, writer) = stream.into_split();
        let writer: Writer = Arc::new(tokio::sync::Mutex::new(writer));
        let (stop, stop_rx) = watch::channel(false);
        let id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);

        let mut slot = lock(&self.connection);
        // Checked under the connection lock: `close` raises the flag before
        // taking this lock, so a connection can't slip in after it.
        if self.is_shut_down() {
            debug!(%peer_addr, "transport shut down, dropping new connection");
            return None;
        }
        let previous = slot.replace(Connection {
            id,
            peer_addr,
            writer: Arc::clone(&writer),
            stop,
        });
        drop(slot);

        if let Some(old) = previous {
            debug!(old_peer = %old.peer_addr, "replacing existing connection");
        }
        Some(Installed {
            id,
            reader,
            writer,
            stop: stop_rx,
        })
    }

    /// Clears the slot if it still holds connection `id`.
    fn forget(&self, id: u64) {
        let mut slot = lock(&self.connection);
        if slot.as_ref().is_some_and(|conn| conn.id == id) {
            slot.take();
        }
    }

    fn current_writer(&self) -> Option<Writer> {
        lock(&self.connection)
            .as_ref()
            .map(|conn| Arc::clone(&conn.writer))
    }

    fn track(&self, task: JoinHandle<()>) {
        let mut tasks = lock(&self.tasks);
        tasks.retain(|t| !t.is_finished());
        tasks.push(task);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A single-peer TCP transport.
///
/// Background tasks run on the runtime behind the [`Handle`] given to
/// [`new`](Self::new); everything they observe is delivered as a
/// [`TransportEvent`] through `queue`. The public methods are synchronous
/// and block on that runtime, so they must be called from a plain thread
/// (the game loop), never from inside an async task.
///
/// # Lifecycle
///
/// `listen` or `connect`, then any number of `send`s, then `close`. After
/// `close` the transport is finished: new connections are refused and
/// both loops have been told to stop. Dropping the transport closes it.
pub struct TcpTransport<L: TransportListener> {
    runtime: Handle,
    queue: ExecutionQueue<L>,
    config: TransportConfig,
    shared: Arc<Shared>,
}

impl<L: TransportListener> TcpTransport<L> {
    /// Creates an idle transport. Nothing is bound or connected yet.
    pub fn new(runtime: Handle, queue: ExecutionQueue<L>, config: TransportConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            runtime,
            queue,
            config: config.validated(),
            shared: Arc::new(Shared {
                shutdown,
                connection: Mutex::new(None),
                local_addr: Mutex::new(None),
                tasks: Mutex::new(Vec::new()),
                next_connection_id: AtomicU64::new(1),
            }),
        }
    }

    /// Host side: binds `config.bind_ip:port` and starts the accept loop.
    ///
    /// Port 0 picks a free port; the bound address is returned either way.
    /// Each accepted peer is greeted with `HOST_READY`, reported as
    /// [`TransportEvent::PeerConnected`] and gets a receive loop. The loop
    /// stops accepting once the lobby is full.
    ///
    /// # Errors
    /// [`TransportError::Bind`] if the port can't be bound,
    /// [`TransportError::Shutdown`] after [`close`](Self::close).
    pub fn listen(&self, port: u16) -> Result<SocketAddr, TransportError> {
        if self.shared.is_shut_down() {
            return Err(TransportError::Shutdown);
        }
        let bind_addr = SocketAddr::new(self.config.bind_ip, port);
        let listener = self
            .runtime
            .block_on(TcpListener::bind(bind_addr))
            .map_err(TransportError::Bind)?;
        let local_addr = listener.local_addr().map_err(TransportError::Bind)?;
        *lock(&self.shared.local_addr) = Some(local_addr);
        info!(%local_addr, "listening for a peer");

        let task = self.runtime.spawn(accept_loop(
            listener,
            Arc::clone(&self.shared),
            self.queue.clone(),
            self.config.clone(),
        ));
        self.shared.track(task);
        Ok(local_addr)
    }

    /// Client side: connects to `host:port`, sends `READY` and starts the
    /// receive loop. Any existing connection is torn down first.
    ///
    /// Blocks for at most `timeout` waiting for the TCP handshake.
    ///
    /// # Errors
    /// [`TransportError::ConnectTimeout`], [`TransportError::ConnectRefused`]
    /// or [`TransportError::Connect`] depending on how the attempt failed;
    /// [`TransportError::SendFailed`] if the `READY` greeting can't be
    /// written.
    pub fn connect(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<SocketAddr, TransportError> {
        if self.shared.is_shut_down() {
            return Err(TransportError::Shutdown);
        }
        self.drop_connection();

        debug!(host, port, ?timeout, "connecting");
        // The timer has to be created on the runtime, not on this thread.
        let stream = self
            .runtime
            .block_on(async {
                tokio::time::timeout(timeout, TcpStream::connect((host, port))).await
            })
            .map_err(|_| TransportError::ConnectTimeout(timeout))?
            .map_err(classify_connect_error)?;
        let peer_addr = stream.peer_addr().map_err(TransportError::Connect)?;

        let installed = self
            .shared
            .install(stream, peer_addr)
            .ok_or(TransportError::Shutdown)?;

        let greeting = frame_message(&Message::Ready)?;
        if let Err(e) = self.runtime.block_on(write_frame(
            &installed.writer,
            &greeting,
            self.config.write_timeout,
        )) {
            self.shared.forget(installed.id);
            return Err(e);
        }
        info!(%peer_addr, "connected, sent READY");

        let task = self.runtime.spawn(receive_loop(
            installed,
            Arc::clone(&self.shared),
            self.queue.clone(),
        ));
        self.shared.track(task);
        Ok(peer_addr)
    }

    /// Encodes, frames and writes one message.
    ///
    /// Concurrent senders are serialized, so frames never interleave on the
    /// wire. Waits at most `config.write_timeout`.
    ///
    /// # Errors
    /// [`TransportError::NotConnected`] with no live connection,
    /// [`TransportError::SendFailed`] if the write fails or times out.
    pub fn send(&self, msg: &Message) -> Result<(), TransportError> {
        let writer = self
            .shared
            .current_writer()
            .ok_or(TransportError::NotConnected)?;
        let frame = frame_message(msg)?;
        self.runtime
            .block_on(write_frame(&writer, &frame, self.config.write_timeout))?;
        debug!(%msg, "sent");
        Ok(())
    }

    /// Stops the accept loop, closes the connection, and stops its
    /// receive loop. No `ConnectionLost` is reported for a connection
    /// closed here. Idempotent.
    pub fn close(&self) {
        // Listener first, so no new peer can arrive mid-teardown.
        let was_shut_down = self.shared.shutdown.send_replace(true);
        let had_connection = self.drop_connection();
        if !was_shut_down {
            info!(had_connection, "transport closed");
        }
    }

    /// Whether a peer connection is currently open.
    pub fn is_connected(&self) -> bool {
        lock(&self.shared.connection).is_some()
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.shared.is_shut_down()
    }

    /// Address the listener is bound to, once [`listen`](Self::listen)
    /// has succeeded.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *lock(&self.shared.local_addr)
    }

    /// Address of the connected peer.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        lock(&self.shared.connection)
            .as_ref()
            .map(|conn| conn.peer_addr)
    }

    /// Number of background tasks that have not yet exited.
    pub fn active_tasks(&self) -> usize {
        lock(&self.shared.tasks)
            .iter()
            .filter(|t| !t.is_finished())
            .count()
    }

    /// Signals the current connection's receive loop and releases it.
    /// Returns whether there was one.
    fn drop_connection(&self) -> bool {
        let conn = lock(&self.shared.connection).take();
        match conn {
            Some(conn) => {
                conn.stop.send_replace(true);
                debug!(peer_addr = %conn.peer_addr, "connection closed locally");
                true
            }
            None => false,
        }
    }
}

impl<L: TransportListener> Drop for TcpTransport<L> {
    fn drop(&mut self) {
        self.close();
    }
}

// ---------------------------------------------------------------------------
// Background tasks
// ---------------------------------------------------------------------------

async fn accept_loop<L: TransportListener>(
    listener: TcpListener,
    shared: Arc<Shared>,
    queue: ExecutionQueue<L>,
    config: TransportConfig,
) {
    let mut shutdown = shared.shutdown.subscribe();
    // The host counts as the first participant.
    let mut participants = 1;

    while participants < config.max_participants {
        let accepted = tokio::select! {
            () = stopped(&mut shutdown) => {
                debug!("accept loop stopping");
                break;
            }
            accepted = listener.accept() => accepted,
        };

        let (stream, addr) = match accepted {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "accept failed");
                deliver(
                    &queue,
                    TransportEvent::AcceptFailed {
                        reason: e.to_string(),
                    },
                );
                break;
            }
        };

        let Some(installed) = shared.install(stream, addr) else {
            break;
        };
        participants += 1;

        let greeting = match frame_message(&Message::HostReady) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "could not encode HOST_READY");
                shared.forget(installed.id);
                break;
            }
        };
        if let Err(e) = write_frame(&installed.writer, &greeting, config.write_timeout).await {
            warn!(%addr, error = %e, "failed to greet peer");
            shared.forget(installed.id);
            participants -= 1;
            deliver(
                &queue,
                TransportEvent::ConnectionLost {
                    reason: e.to_string(),
                },
            );
            continue;
        }

        info!(%addr, participants, "peer connected, sent HOST_READY");
        deliver(&queue, TransportEvent::PeerConnected { addr });
        shared.track(tokio::spawn(receive_loop(
            installed,
            Arc::clone(&shared),
            queue.clone(),
        )));
    }

    debug!(participants, "accept loop finished, listener released");
}

async fn receive_loop<L: TransportListener>(
    installed: Installed,
    shared: Arc<Shared>,
    queue: ExecutionQueue<L>,
) {
    let Installed {
        id,
        mut reader,
        writer,
        mut stop,
    } = installed;
    // The receive side never writes; keep only the connection slot's copy.
    drop(writer);

    let mut decoder = FrameDecoder::new();
    let mut buf = vec![0u8; READ_CHUNK];

    let reason = loop {
        let read = tokio::select! {
            () = stopped(&mut stop) => {
                debug!(connection = id, "receive loop stopping");
                return;
            }
            read = reader.read(&mut buf) => read,
        };

        match read {
            Ok(0) => break "peer closed the connection".to_string(),
            Ok(n) => {
                decoder.extend(&buf[..n]);
                if let Err(e) = dispatch_frames(&mut decoder, &queue) {
                    warn!(connection = id, error = %e, "unrecoverable framing error");
                    break e.to_string();
                }
            }
            Err(e) => break format!("read failed: {e}"),
        }
    };

    // A local close racing with the peer's hangup stays silent.
    if stop.has_changed().is_err() || *stop.borrow() {
        return;
    }
    shared.forget(id);
    info!(connection = id, %reason, "connection lost");
    deliver(&queue, TransportEvent::ConnectionLost { reason });
}

/// Pops every complete frame and delivers it as a message, or as a
/// `Malformed` event when the payload doesn't decode.
fn dispatch_frames<L: TransportListener>(
    decoder: &mut FrameDecoder,
    queue: &ExecutionQueue<L>,
) -> Result<(), ProtocolError> {
    while let Some(payload) = decoder.next_frame()? {
        let event = match Message::decode(&payload) {
            Ok(msg) => {
                debug!(%msg, "received");
                TransportEvent::Message(msg)
            }
            Err(e) => {
                warn!(error = %e, len = payload.len(), "dropping malformed frame");
                TransportEvent::Malformed(e)
            }
        };
        deliver(queue, event);
    }
    Ok(())
}

/// Resolves once the flag is raised or its sender is gone.
async fn stopped(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

fn deliver<L: TransportListener>(queue: &ExecutionQueue<L>, event: TransportEvent) {
    queue.enqueue(move |listener: &mut L| listener.on_transport_event(event));
}

fn frame_message(msg: &Message) -> Result<Vec<u8>, TransportError> {
    Ok(encode_frame(&msg.encode()?)?)
}

async fn write_frame(writer: &Writer, frame: &[u8], limit: Duration) -> Result<(), TransportError> {
    let write = async {
        let mut half = writer.lock().await;
        half.write_all(frame).await?;
        half.flush().await
    };
    match tokio::time::timeout(limit, write).await {
        Ok(result) => result.map_err(TransportError::SendFailed),
        Err(_) => Err(TransportError::SendFailed(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("write did not complete within {limit:?}"),
        ))),
    }
}

fn classify_connect_error(e: io::Error) -> TransportError {
    match e.kind() {
        io::ErrorKind::ConnectionRefused => TransportError::ConnectRefused(e),
        _ => TransportError::Connect(e),
    }
}
