mod state;
pub mod transport;

use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, after, never, select, tick, unbounded};

pub use self::state::{SessionState, SessionStatus};
use self::transport::{
    ConnectionId, Connector, ReadyState, SocketEvent, SocketEventKind, Transport,
};
use crate::{
    config::{AppConfig, ReconnectConfig},
    controller::{Control, SessionHandle, SessionUpdate},
    error::{CaptureError, TransportError},
    pipeline::{FrameEncoder, FrameSource, OverlayRenderer, RasterSurface, Surface},
    protocol,
};

type OverlayHook<S> = Box<dyn FnMut(&S) + Send>;

struct Link {
    id: ConnectionId,
    transport: Box<dyn Transport>,
}

/// Owns the socket, the capture timer and the reconnect timer for one session.
///
/// Everything runs on the thread that calls [`StreamSession::run`]; timers are
/// channels that the loop selects over, so no locking is involved. The capture
/// timer is armed exactly while the state is `Connected`, and at most one
/// reconnect timer is ever pending.
pub struct StreamSession<S: Surface = RasterSurface> {
    endpoint: String,
    capture_period: Duration,
    reconnect: ReconnectConfig,
    ideal_video_size: (u32, u32),

    connector: Box<dyn Connector>,
    source: Option<Box<dyn FrameSource>>,
    encoder: FrameEncoder,
    renderer: OverlayRenderer,
    surface: S,
    overlay_hook: Option<OverlayHook<S>>,

    status: SessionStatus,
    link: Option<Link>,
    last_connection_id: ConnectionId,
    capture_timer: Option<Receiver<Instant>>,
    reconnect_timer: Option<Receiver<Instant>>,
    video_size: Option<(u32, u32)>,
    frames_sent: u64,
    frames_dropped: u64,

    socket_tx: Sender<SocketEvent>,
    socket_rx: Receiver<SocketEvent>,
    control_tx: Sender<Control>,
    control_rx: Receiver<Control>,
    updates: Option<Sender<SessionUpdate>>,
}

impl<S: Surface> StreamSession<S> {
    pub fn new(config: &AppConfig, connector: impl Connector, surface: S) -> Self {
        let (socket_tx, socket_rx) = unbounded();
        let (control_tx, control_rx) = unbounded();

        Self {
            endpoint: config.endpoint.clone(),
            capture_period: config.capture.period(),
            reconnect: config.reconnect.clone(),
            ideal_video_size: (config.camera.width, config.camera.height),
            connector: Box::new(connector),
            source: None,
            encoder: FrameEncoder::from_config(&config.capture),
            renderer: OverlayRenderer::new(&config.overlay),
            surface,
            overlay_hook: None,
            status: SessionStatus::default(),
            link: None,
            last_connection_id: 0,
            capture_timer: None,
            reconnect_timer: None,
            video_size: None,
            frames_sent: 0,
            frames_dropped: 0,
            socket_tx,
            socket_rx,
            control_tx,
            control_rx,
            updates: None,
        }
    }

    pub fn with_updates(mut self, updates: Sender<SessionUpdate>) -> Self {
        self.updates = Some(updates);
        self
    }

    pub fn attach_source(&mut self, source: impl FrameSource) {
        self.source = Some(Box::new(source));
        self.status.device_error = None;
    }

    /// Called with the surface after every overlay redraw.
    pub fn set_overlay_hook(&mut self, hook: impl FnMut(&S) + Send + 'static) {
        self.overlay_hook = Some(Box::new(hook));
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle::new(self.control_tx.clone())
    }

    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    pub fn state(&self) -> SessionState {
        self.status.state
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.link.as_ref().map(|link| link.id)
    }

    pub fn is_capture_armed(&self) -> bool {
        self.capture_timer.is_some()
    }

    pub fn is_reconnect_pending(&self) -> bool {
        self.reconnect_timer.is_some()
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped
    }

    /// Starts a connection attempt. A no-op unless the session is `Disconnected`.
    pub fn connect(&mut self) -> bool {
        if self.status.state != SessionState::Disconnected {
            log::debug!("connect ignored: session is {}", self.status.state);
            return false;
        }
        self.cancel_reconnect();

        self.last_connection_id += 1;
        let id = self.last_connection_id;
        log::info!("connecting to {} (connection {id})", self.endpoint);

        match self
            .connector
            .connect(&self.endpoint, id, self.socket_tx.clone())
        {
            Ok(transport) => {
                self.link = Some(Link { id, transport });
                self.transition(SessionState::Connecting);
                true
            }
            Err(err) => {
                log::error!("failed to start connection {id}: {err}");
                self.status.last_error = Some(format!("Failed to connect to server: {err}"));
                self.publish_status();
                self.schedule_reconnect();
                false
            }
        }
    }

    /// Closes the socket without triggering a reconnect and stops capture.
    pub fn disconnect(&mut self) {
        self.cancel_reconnect();
        if let Some(mut link) = self.link.take() {
            log::info!("closing connection {}", link.id);
            link.transport.close();
        }
        self.transition(SessionState::Disconnected);
    }

    /// Disconnects and releases the frame source.
    pub fn shutdown(&mut self) {
        self.disconnect();
        if self.source.take().is_some() {
            log::info!("frame source released");
        }
    }

    /// Hands one payload to the socket. Dropped, never queued, when the socket
    /// cannot take it right now.
    pub fn send(&mut self, payload: String) -> bool {
        let result = match self.link.as_ref() {
            Some(link) if link.transport.ready_state() == ReadyState::Open => {
                link.transport.send_text(payload)
            }
            Some(_) => Err(TransportError::NotOpen),
            None => {
                log::trace!("frame dropped: no socket");
                self.frames_dropped += 1;
                return false;
            }
        };

        match result {
            Ok(()) => {
                self.frames_sent += 1;
                true
            }
            Err(err) => {
                log::trace!("frame dropped: {err}");
                self.frames_dropped += 1;
                false
            }
        }
    }

    /// Surfaces a camera that could not be opened.
    pub fn report_device_unavailable(&mut self, reason: &str) {
        let err = CaptureError::DeviceUnavailable(reason.to_string());
        log::error!("{err}");
        self.status.device_error = Some(err.to_string());
        self.publish_status();
    }

    pub fn handle_socket_event(&mut self, event: SocketEvent) {
        if self.connection_id() != Some(event.id) {
            log::trace!("ignoring event from detached connection {}", event.id);
            return;
        }

        match event.kind {
            SocketEventKind::Opened => {
                if self.status.state == SessionState::Connecting {
                    log::info!("connection {} open", event.id);
                    self.status.last_error = None;
                    self.transition(SessionState::Connected);
                }
            }
            SocketEventKind::Message(raw) => self.on_message(&raw),
            SocketEventKind::Failed(reason) => {
                log::warn!("connection {} failed: {reason}", event.id);
                self.link = None;
                self.status.last_error = Some(format!("Failed to connect to server: {reason}"));
                self.transition(SessionState::Disconnected);
                self.schedule_reconnect();
            }
            SocketEventKind::Closed { reason } => {
                match &reason {
                    Some(reason) => log::warn!("connection {} lost: {reason}", event.id),
                    None => log::info!("connection {} closed", event.id),
                }
                self.link = None;
                if let Some(reason) = reason {
                    self.status.last_error = Some(format!("Connection lost: {reason}"));
                }
                self.transition(SessionState::Disconnected);
                self.schedule_reconnect();
            }
        }
    }

    /// Grabs, encodes and sends one frame. Failures skip the tick only.
    pub fn on_capture_tick(&mut self) {
        if self.status.state != SessionState::Connected {
            return;
        }
        let Some(source) = self.source.as_mut() else {
            return;
        };

        let frame = match source.grab_frame() {
            Ok(frame) => frame,
            Err(err) if err.is_transient() => {
                log::trace!("capture tick skipped: {err}");
                return;
            }
            Err(err) => {
                log::warn!("capture tick skipped: {err}");
                return;
            }
        };
        self.video_size = Some((frame.width, frame.height));

        match self.encoder.encode(&frame) {
            Ok(encoded) => {
                log::trace!(
                    "encoded {}x{} frame in {:?}",
                    encoded.width,
                    encoded.height,
                    frame.timestamp.elapsed()
                );
                self.send(encoded.into_data_url());
            }
            Err(err) => log::warn!("failed to encode frame: {err}"),
        }
    }

    pub fn on_reconnect_due(&mut self) {
        self.reconnect_timer = None;
        log::info!("reconnect timer fired");
        self.connect();
    }

    /// Decodes one inbound result and redraws the overlay. Malformed payloads are
    /// logged and dropped before anything is touched.
    pub fn on_message(&mut self, raw: &str) {
        let message = match protocol::decode_result(raw) {
            Ok(message) => message,
            Err(err) => {
                log::warn!("discarding result payload: {err}");
                return;
            }
        };

        if let Some(error) = &message.error {
            log::warn!("service reported error: {error}");
        }
        if let Some(note) = &message.message {
            log::info!("service message: {note}");
        }

        let video_size = self.video_size.unwrap_or(self.ideal_video_size);
        let outcome = self.renderer.render(&mut self.surface, &message, video_size);
        if let Some(hook) = self.overlay_hook.as_mut() {
            hook(&self.surface);
        }

        if let Some(label) = outcome.text_label {
            self.status.last_label = Some(label.clone());
            self.notify(SessionUpdate::Label(label));
        }
        self.notify(SessionUpdate::Overlay {
            hands: message.hands.len(),
            label: message.label,
        });
    }

    /// Runs the session until a shutdown is requested.
    pub fn run(&mut self) {
        let control_rx = self.control_rx.clone();
        let socket_rx = self.socket_rx.clone();

        loop {
            let capture = self.capture_timer.clone().unwrap_or_else(never);
            let reconnect = self.reconnect_timer.clone().unwrap_or_else(never);

            select! {
                recv(control_rx) -> control => match control {
                    Ok(Control::Connect) => {
                        self.connect();
                    }
                    Ok(Control::Disconnect) => self.disconnect(),
                    Ok(Control::Shutdown) | Err(_) => break,
                },
                recv(socket_rx) -> event => {
                    if let Ok(event) = event {
                        self.handle_socket_event(event);
                    }
                }
                recv(capture) -> _ => self.on_capture_tick(),
                recv(reconnect) -> _ => self.on_reconnect_due(),
            }
        }

        self.shutdown();
        log::info!(
            "session stopped: {} frames sent, {} dropped",
            self.frames_sent,
            self.frames_dropped
        );
    }

    fn transition(&mut self, next: SessionState) -> bool {
        let current = self.status.state;
        if current == next {
            return false;
        }
        if !current.can_transition_to(next) {
            log::warn!("ignoring session transition {current} -> {next}");
            return false;
        }

        log::info!("session {current} -> {next}");
        self.status.state = next;
        if next == SessionState::Connected {
            self.arm_capture();
        } else {
            self.disarm_capture();
        }
        self.publish_status();
        true
    }

    fn arm_capture(&mut self) {
        if self.capture_timer.is_none() {
            log::debug!("capture timer armed every {:?}", self.capture_period);
            self.capture_timer = Some(tick(self.capture_period));
        }
    }

    fn disarm_capture(&mut self) {
        if self.capture_timer.take().is_some() {
            log::debug!("capture timer stopped");
        }
    }

    fn schedule_reconnect(&mut self) {
        if !self.reconnect.enabled || self.reconnect_timer.is_some() {
            return;
        }
        log::info!("reconnecting in {:?}", self.reconnect.delay());
        self.reconnect_timer = Some(after(self.reconnect.delay()));
    }

    fn cancel_reconnect(&mut self) {
        if self.reconnect_timer.take().is_some() {
            log::debug!("pending reconnect cancelled");
        }
    }

    fn publish_status(&self) {
        self.notify(SessionUpdate::Status(self.status.clone()));
    }

    fn notify(&self, update: SessionUpdate) {
        if let Some(updates) = &self.updates {
            let _ = updates.send(update);
        }
    }
}
