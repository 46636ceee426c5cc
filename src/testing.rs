//! Fakes shared by the unit tests.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use crossbeam_channel::Sender;

use crate::{
    error::{CaptureError, TransportError},
    pipeline::{
        FrameSource, Surface,
        overlay::{Color, LineStyle, TextStyle},
    },
    session::transport::{ConnectionId, Connector, ReadyState, SocketEvent, Transport},
    types::{Frame, HandSkeleton, Landmark, NUM_LANDMARKS},
};

pub fn skeleton_from(points: Vec<Landmark>) -> HandSkeleton {
    HandSkeleton::try_from(points).expect("21 landmarks")
}

/// A hand with every landmark on the same point.
pub fn skeleton_at(x: f32, y: f32) -> HandSkeleton {
    skeleton_from(vec![Landmark::new(x, y, 0.0); NUM_LANDMARKS])
}

/// JSON array of 21 identical landmarks.
pub fn hand_json(x: f32, y: f32) -> String {
    let point = format!(r#"{{"x":{x},"y":{y},"z":0}}"#);
    format!("[{}]", vec![point; NUM_LANDMARKS].join(","))
}

#[derive(Clone, Debug, PartialEq)]
pub enum DrawOp {
    Clear,
    Resize(u32, u32),
    Line {
        from: (f32, f32),
        to: (f32, f32),
        style: LineStyle,
    },
    Circle {
        center: (f32, f32),
        radius: f32,
        color: Color,
    },
    StrokeText {
        text: String,
        at: (f32, f32),
        style: TextStyle,
    },
    FillText {
        text: String,
        at: (f32, f32),
        style: TextStyle,
    },
}

/// Records every call instead of drawing.
#[derive(Debug, Default)]
pub struct RecordingSurface {
    width: u32,
    height: u32,
    ops: Vec<DrawOp>,
}

impl RecordingSurface {
    pub fn ops(&self) -> &[DrawOp] {
        &self.ops
    }

    pub fn lines(&self) -> Vec<((f32, f32), (f32, f32))> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                DrawOp::Line { from, to, .. } => Some((*from, *to)),
                _ => None,
            })
            .collect()
    }

    pub fn circles(&self) -> Vec<((f32, f32), f32)> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                DrawOp::Circle { center, radius, .. } => Some((*center, *radius)),
                _ => None,
            })
            .collect()
    }

    pub fn texts(&self) -> Vec<DrawOp> {
        self.ops
            .iter()
            .filter(|op| matches!(op, DrawOp::StrokeText { .. } | DrawOp::FillText { .. }))
            .cloned()
            .collect()
    }
}

impl Surface for RecordingSurface {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn clear(&mut self) {
        self.ops.clear();
        self.ops.push(DrawOp::Clear);
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.ops.push(DrawOp::Resize(width, height));
    }

    fn stroke_line(&mut self, from: (f32, f32), to: (f32, f32), style: &LineStyle) {
        self.ops.push(DrawOp::Line {
            from,
            to,
            style: *style,
        });
    }

    fn fill_circle(&mut self, center: (f32, f32), radius: f32, color: Color) {
        self.ops.push(DrawOp::Circle {
            center,
            radius,
            color,
        });
    }

    fn stroke_text(&mut self, text: &str, center: (f32, f32), style: &TextStyle) {
        self.ops.push(DrawOp::StrokeText {
            text: text.to_string(),
            at: center,
            style: *style,
        });
    }

    fn fill_text(&mut self, text: &str, center: (f32, f32), style: &TextStyle) {
        self.ops.push(DrawOp::FillText {
            text: text.to_string(),
            at: center,
            style: *style,
        });
    }
}

/// Hands out scripted results, then `NoFrameYet` forever.
pub struct ScriptedSource {
    frames: VecDeque<Result<Frame, CaptureError>>,
}

impl ScriptedSource {
    pub fn new(frames: Vec<Result<Frame, CaptureError>>) -> Self {
        Self {
            frames: frames.into(),
        }
    }
}

impl FrameSource for ScriptedSource {
    fn grab_frame(&mut self) -> Result<Frame, CaptureError> {
        self.frames
            .pop_front()
            .unwrap_or(Err(CaptureError::NoFrameYet))
    }
}

/// Returns a copy of the same frame on every grab.
pub struct RepeatingSource {
    frame: Frame,
}

impl RepeatingSource {
    pub fn new(frame: Frame) -> Self {
        Self { frame }
    }
}

impl FrameSource for RepeatingSource {
    fn grab_frame(&mut self) -> Result<Frame, CaptureError> {
        Ok(Frame::new(
            self.frame.rgba.clone(),
            self.frame.width,
            self.frame.height,
        ))
    }
}

/// A solid grey frame.
pub fn grey_frame(width: u32, height: u32) -> Frame {
    Frame::new(vec![128; (width * height * 4) as usize], width, height)
}

#[derive(Debug, Default)]
pub struct WireState {
    pub sockets: Vec<SocketRecord>,
    /// When set, `connect` itself fails.
    pub refuse: bool,
}

#[derive(Debug)]
pub struct SocketRecord {
    pub id: ConnectionId,
    pub endpoint: String,
    pub events: Sender<SocketEvent>,
    pub ready: ReadyState,
    pub sent: Vec<String>,
    pub closed: bool,
    /// When set, every send reports a full buffer.
    pub backpressure: bool,
}

/// Shared view into everything a [`FakeConnector`] has done.
#[derive(Clone, Debug, Default)]
pub struct Wire(Arc<Mutex<WireState>>);

impl Wire {
    fn with<T>(&self, f: impl FnOnce(&mut WireState) -> T) -> T {
        f(&mut self.0.lock().unwrap())
    }

    pub fn socket_count(&self) -> usize {
        self.with(|state| state.sockets.len())
    }

    pub fn refuse_connections(&self, refuse: bool) {
        self.with(|state| state.refuse = refuse);
    }

    pub fn set_ready(&self, id: ConnectionId, ready: ReadyState) {
        self.with(|state| {
            if let Some(socket) = state.sockets.iter_mut().find(|s| s.id == id) {
                socket.ready = ready;
            }
        });
    }

    pub fn set_backpressure(&self, id: ConnectionId, on: bool) {
        self.with(|state| {
            if let Some(socket) = state.sockets.iter_mut().find(|s| s.id == id) {
                socket.backpressure = on;
            }
        });
    }

    pub fn sent(&self, id: ConnectionId) -> Vec<String> {
        self.with(|state| {
            state
                .sockets
                .iter()
                .find(|s| s.id == id)
                .map(|s| s.sent.clone())
                .unwrap_or_default()
        })
    }

    pub fn total_sent(&self) -> usize {
        self.with(|state| state.sockets.iter().map(|s| s.sent.len()).sum())
    }

    pub fn is_closed(&self, id: ConnectionId) -> bool {
        self.with(|state| state.sockets.iter().any(|s| s.id == id && s.closed))
    }

    /// Pushes an event as if the socket worker had produced it.
    pub fn emit(&self, event: SocketEvent) {
        self.with(|state| {
            if let Some(socket) = state.sockets.iter().find(|s| s.id == event.id) {
                let _ = socket.events.send(event);
            }
        });
    }
}

/// In-memory connector. Sockets start `Connecting` and only change when a test says so.
#[derive(Default)]
pub struct FakeConnector {
    wire: Wire,
}

impl FakeConnector {
    pub fn new() -> (Self, Wire) {
        let wire = Wire::default();
        (
            Self {
                wire: wire.clone(),
            },
            wire,
        )
    }
}

impl Connector for FakeConnector {
    fn connect(
        &mut self,
        endpoint: &str,
        id: ConnectionId,
        events: Sender<SocketEvent>,
    ) -> Result<Box<dyn Transport>, TransportError> {
        self.wire.with(|state| {
            if state.refuse {
                return Err(TransportError::Spawn(std::io::Error::other("refused")));
            }
            state.sockets.push(SocketRecord {
                id,
                endpoint: endpoint.to_string(),
                events,
                ready: ReadyState::Connecting,
                sent: Vec::new(),
                closed: false,
                backpressure: false,
            });
            Ok(())
        })?;
        Ok(Box::new(FakeTransport {
            id,
            wire: self.wire.clone(),
        }))
    }
}

struct FakeTransport {
    id: ConnectionId,
    wire: Wire,
}

impl Transport for FakeTransport {
    fn ready_state(&self) -> ReadyState {
        self.wire.with(|state| {
            state
                .sockets
                .iter()
                .find(|s| s.id == self.id)
                .map_or(ReadyState::Closed, |s| s.ready)
        })
    }

    fn send_text(&self, text: String) -> Result<(), TransportError> {
        self.wire.with(|state| {
            let socket = state
                .sockets
                .iter_mut()
                .find(|s| s.id == self.id)
                .ok_or(TransportError::NotOpen)?;
            if socket.ready != ReadyState::Open {
                return Err(TransportError::NotOpen);
            }
            if socket.backpressure {
                return Err(TransportError::Backpressure);
            }
            socket.sent.push(text);
            Ok(())
        })
    }

    fn close(&mut self) {
        self.wire.with(|state| {
            if let Some(socket) = state.sockets.iter_mut().find(|s| s.id == self.id) {
                socket.closed = true;
                socket.ready = ReadyState::Closed;
            }
        });
    }
}
