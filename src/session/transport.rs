use std::{
    io::ErrorKind,
    net::TcpStream,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU8, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use tungstenite::{Message, WebSocket, stream::MaybeTlsStream};

use crate::error::TransportError;

/// Identifies one socket. Events carrying an id other than the live one are stale.
pub type ConnectionId = u64;

// Bounds how long an outbound frame can wait behind a blocking read.
const READ_POLL: Duration = Duration::from_millis(10);
const CLOSE_GRACE: Duration = Duration::from_secs(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadyState {
    Connecting,
    Open,
    Closing,
    Closed,
}

impl ReadyState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => ReadyState::Connecting,
            1 => ReadyState::Open,
            2 => ReadyState::Closing,
            _ => ReadyState::Closed,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            ReadyState::Connecting => 0,
            ReadyState::Open => 1,
            ReadyState::Closing => 2,
            ReadyState::Closed => 3,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SocketEventKind {
    Opened,
    Message(String),
    /// The socket never opened.
    Failed(String),
    /// An open socket went away. `reason` is set for abnormal closes.
    Closed { reason: Option<String> },
}

#[derive(Clone, Debug, PartialEq)]
pub struct SocketEvent {
    pub id: ConnectionId,
    pub kind: SocketEventKind,
}

/// One socket as seen by the session.
pub trait Transport: Send {
    fn ready_state(&self) -> ReadyState;
    /// Never blocks. Fails if the socket is not open or a frame is already in flight.
    fn send_text(&self, text: String) -> Result<(), TransportError>;
    fn close(&mut self);
}

/// Starts connection attempts. `connect` returns at once; the outcome arrives on `events`.
pub trait Connector: Send + 'static {
    fn connect(
        &mut self,
        endpoint: &str,
        id: ConnectionId,
        events: Sender<SocketEvent>,
    ) -> Result<Box<dyn Transport>, TransportError>;
}

#[derive(Debug)]
struct Shared {
    ready: AtomicU8,
    close_requested: AtomicBool,
}

impl Shared {
    fn ready(&self) -> ReadyState {
        ReadyState::from_u8(self.ready.load(Ordering::Acquire))
    }

    fn set_ready(&self, state: ReadyState) {
        self.ready.store(state.as_u8(), Ordering::Release);
    }

    fn close_requested(&self) -> bool {
        self.close_requested.load(Ordering::Acquire)
    }
}

/// Opens plain `ws://` sockets, one worker thread per socket. TLS is not compiled in.
#[derive(Clone, Debug, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn connect(
        &mut self,
        endpoint: &str,
        id: ConnectionId,
        events: Sender<SocketEvent>,
    ) -> Result<Box<dyn Transport>, TransportError> {
        let shared = Arc::new(Shared {
            ready: AtomicU8::new(ReadyState::Connecting.as_u8()),
            close_requested: AtomicBool::new(false),
        });
        // One slot: at most one frame queued per socket.
        let (outbound_tx, outbound_rx) = bounded::<String>(1);

        let worker_shared = shared.clone();
        let endpoint = endpoint.to_string();
        thread::Builder::new()
            .name(format!("socket-{id}"))
            .spawn(move || run_socket(endpoint, id, events, outbound_rx, worker_shared))?;

        Ok(Box::new(WsTransport {
            shared,
            outbound_tx,
        }))
    }
}

pub struct WsTransport {
    shared: Arc<Shared>,
    outbound_tx: Sender<String>,
}

impl Transport for WsTransport {
    fn ready_state(&self) -> ReadyState {
        self.shared.ready()
    }

    fn send_text(&self, text: String) -> Result<(), TransportError> {
        if self.shared.ready() != ReadyState::Open {
            return Err(TransportError::NotOpen);
        }
        match self.outbound_tx.try_send(text) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(TransportError::Backpressure),
            Err(TrySendError::Disconnected(_)) => Err(TransportError::NotOpen),
        }
    }

    fn close(&mut self) {
        self.shared.close_requested.store(true, Ordering::Release);
        if self.shared.ready() == ReadyState::Open {
            self.shared.set_ready(ReadyState::Closing);
        }
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.shared.close_requested.store(true, Ordering::Release);
    }
}

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

fn run_socket(
    endpoint: String,
    id: ConnectionId,
    events: Sender<SocketEvent>,
    outbound_rx: Receiver<String>,
    shared: Arc<Shared>,
) {
    let emit = |kind: SocketEventKind| {
        let _ = events.send(SocketEvent { id, kind });
    };

    let mut socket = match tungstenite::connect(endpoint.as_str()) {
        Ok((socket, _response)) => socket,
        Err(err) => {
            shared.set_ready(ReadyState::Closed);
            emit(SocketEventKind::Failed(err.to_string()));
            return;
        }
    };

    if let MaybeTlsStream::Plain(stream) = socket.get_mut() {
        if let Err(err) = stream.set_read_timeout(Some(READ_POLL)) {
            log::warn!("connection {id}: failed to set read timeout: {err}");
        }
        let _ = stream.set_nodelay(true);
    }

    shared.set_ready(ReadyState::Open);
    emit(SocketEventKind::Opened);

    let reason = pump(&mut socket, id, &outbound_rx, &shared, &emit);
    shared.set_ready(ReadyState::Closed);
    log::debug!("connection {id}: worker exiting ({reason:?})");
    emit(SocketEventKind::Closed { reason });
}

fn pump(
    socket: &mut Socket,
    id: ConnectionId,
    outbound_rx: &Receiver<String>,
    shared: &Shared,
    emit: &impl Fn(SocketEventKind),
) -> Option<String> {
    let mut close_deadline: Option<Instant> = None;

    loop {
        match close_deadline {
            None if shared.close_requested() => {
                shared.set_ready(ReadyState::Closing);
                if let Err(err) = socket.close(None) {
                    return abnormal(err);
                }
                close_deadline = Some(Instant::now() + CLOSE_GRACE);
            }
            Some(deadline) if Instant::now() >= deadline => {
                log::debug!("connection {id}: close handshake timed out");
                return None;
            }
            None => {
                if let Ok(text) = outbound_rx.try_recv() {
                    if let Err(err) = socket.send(Message::Text(text)) {
                        return abnormal(err);
                    }
                }
            }
            Some(_) => {}
        }

        match socket.read() {
            Ok(Message::Text(text)) => emit(SocketEventKind::Message(text)),
            Ok(Message::Binary(data)) => {
                log::debug!("connection {id}: ignoring {} byte binary frame", data.len());
            }
            Ok(Message::Close(frame)) => {
                log::info!("connection {id}: server closed ({frame:?})");
                shared.set_ready(ReadyState::Closing);
                close_deadline.get_or_insert_with(|| Instant::now() + CLOSE_GRACE);
            }
            Ok(_) => {}
            Err(tungstenite::Error::Io(err))
                if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
            {
                // Control-frame replies may be queued behind the timed-out read.
                if let Err(err) = socket.flush() {
                    if !matches!(&err, tungstenite::Error::Io(io) if io.kind() == ErrorKind::WouldBlock)
                    {
                        return abnormal(err);
                    }
                }
            }
            Err(err) => return abnormal(err),
        }
    }
}

fn abnormal(err: tungstenite::Error) -> Option<String> {
    match err {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => None,
        other => Some(other.to_string()),
    }
}
