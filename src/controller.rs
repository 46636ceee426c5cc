//! Boundary between the session and whatever UI drives it.

use std::{
    io::BufRead,
    thread::{self, JoinHandle},
};

use crossbeam_channel::{Receiver, Sender};

use crate::session::SessionStatus;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Control {
    Connect,
    Disconnect,
    Shutdown,
}

/// Notifications pushed to the UI.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionUpdate {
    Status(SessionStatus),
    /// A label arrived with no hand to anchor it.
    Label(String),
    /// The overlay surface was redrawn.
    Overlay { hands: usize, label: Option<String> },
}

/// Cloneable remote control for a running session.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    control_tx: Sender<Control>,
}

impl SessionHandle {
    pub(crate) fn new(control_tx: Sender<Control>) -> Self {
        Self { control_tx }
    }

    /// Returns false once the session loop is gone.
    pub fn request_connect(&self) -> bool {
        self.control_tx.send(Control::Connect).is_ok()
    }

    pub fn request_disconnect(&self) -> bool {
        self.control_tx.send(Control::Disconnect).is_ok()
    }

    pub fn shutdown(&self) -> bool {
        self.control_tx.send(Control::Shutdown).is_ok()
    }
}

pub fn parse_command(line: &str) -> Option<Control> {
    match line.trim().to_ascii_lowercase().as_str() {
        "c" | "connect" | "reconnect" => Some(Control::Connect),
        "d" | "disconnect" => Some(Control::Disconnect),
        "q" | "quit" | "exit" => Some(Control::Shutdown),
        _ => None,
    }
}

/// Reads commands line by line and forwards them. End of input shuts the session down.
pub fn spawn_console<R>(handle: SessionHandle, input: R) -> JoinHandle<()>
where
    R: BufRead + Send + 'static,
{
    thread::spawn(move || {
        for line in input.lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            let delivered = match parse_command(&line) {
                Some(Control::Connect) => handle.request_connect(),
                Some(Control::Disconnect) => handle.request_disconnect(),
                Some(Control::Shutdown) => {
                    handle.shutdown();
                    return;
                }
                None => {
                    println!("commands: c(onnect), d(isconnect), q(uit)");
                    true
                }
            };
            if !delivered {
                return;
            }
        }
        handle.shutdown();
    })
}

/// One line of console output for an update.
pub fn describe(update: &SessionUpdate) -> String {
    match update {
        SessionUpdate::Status(status) => {
            let mut line = format!("[{}]", status.state);
            if let Some(err) = &status.last_error {
                line.push_str(&format!(" error: {err}"));
            }
            if let Some(err) = &status.device_error {
                line.push_str(&format!(" camera: {err}"));
            }
            line
        }
        SessionUpdate::Label(label) => format!("result: {label}"),
        SessionUpdate::Overlay { hands, label } => match label {
            Some(label) => format!("overlay: {hands} hand(s), label {label}"),
            None => format!("overlay: {hands} hand(s)"),
        },
    }
}

/// Prints updates until the session drops its sender.
pub fn spawn_reporter(updates: Receiver<SessionUpdate>) -> JoinHandle<()> {
    thread::spawn(move || {
        for update in updates {
            match &update {
                SessionUpdate::Overlay { .. } => log::debug!("{}", describe(&update)),
                _ => println!("{}", describe(&update)),
            }
        }
    })
}
