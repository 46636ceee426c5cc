use std::fmt;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl SessionState {
    /// Disconnected -> Connecting -> Connected -> Disconnected, plus
    /// Connecting -> Disconnected when the socket never opens.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, Connected)
                | (Connecting, Disconnected)
                | (Connected, Disconnected)
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Disconnected => "Disconnected",
            SessionState::Connecting => "Connecting",
            SessionState::Connected => "Connected",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What the UI is allowed to see.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionStatus {
    pub state: SessionState,
    /// Latest label that had no hand to sit on, shown as plain text.
    pub last_label: Option<String>,
    /// Cleared whenever a connection opens.
    pub last_error: Option<String>,
    /// Camera problems. Independent of the connection, so not cleared on connect.
    pub device_error: Option<String>,
}
