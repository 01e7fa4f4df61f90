//! Camera capture session.
//!
//! One session covers one "start camera" .. "stop camera" span:
//!
//! ```text
//! Idle -> Requesting -> Active -> Stopped
//!              |           |
//!              +-> Failed <+
//! ```
//!
//! The session owns the camera stream exclusively while `Active` and drops it
//! on every transition into `Stopped` or `Failed`, including from `Drop`.

use crate::ingest::{CameraProvider, CameraStream, CaptureError, CapturedFrame};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Requesting,
    Active,
    Stopped,
    Failed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    Request,
    Granted,
    Denied,
    Fault,
    Stop,
}

impl SessionState {
    /// Pure transition function. `None` means the event is not valid here.
    pub fn on(self, event: SessionEvent) -> Option<SessionState> {
        use SessionEvent::*;
        use SessionState::*;
        match (self, event) {
            (Idle, Request) => Some(Requesting),
            (Requesting, Granted) => Some(Active),
            (Requesting, Denied) => Some(Failed),
            (Active, Fault) => Some(Failed),
            (Idle | Requesting | Active, Stop) => Some(Stopped),
            (Stopped | Failed, Stop) => Some(self),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Stopped | SessionState::Failed)
    }
}

pub struct CaptureSession {
    state: SessionState,
    stream: Option<Box<dyn CameraStream>>,
    failure: Option<String>,
}

impl CaptureSession {
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
            stream: None,
            failure: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Reason for the `Failed` state.
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn holds_device(&self) -> bool {
        self.stream.is_some()
    }

    pub fn camera_name(&self) -> Option<&str> {
        self.stream.as_ref().map(|s| s.name())
    }

    fn advance(&mut self, event: SessionEvent) {
        match self.state.on(event) {
            Some(next) => self.state = next,
            None => log::warn!(
                "capture session: ignoring {:?} in state {:?}",
                event,
                self.state
            ),
        }
        if self.state.is_terminal() {
            self.stream = None;
        }
    }

    /// Acquire the camera (`Idle -> Requesting -> Active | Failed`).
    pub fn open(&mut self, provider: &dyn CameraProvider) -> Result<(), CaptureError> {
        if self.state != SessionState::Idle {
            return Err(CaptureError::DeviceUnavailable(format!(
                "session already used (state {:?})",
                self.state
            )));
        }
        self.advance(SessionEvent::Request);
        match provider.acquire() {
            Ok(stream) => {
                self.stream = Some(stream);
                self.advance(SessionEvent::Granted);
                Ok(())
            }
            Err(err) => {
                self.failure = Some(err.to_string());
                self.advance(SessionEvent::Denied);
                Err(err)
            }
        }
    }

    /// Read the current frame. A capture error fails the session.
    pub fn grab(&mut self) -> Result<Option<CapturedFrame>, CaptureError> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(CaptureError::DeviceUnavailable(format!(
                "capture session not active (state {:?})",
                self.state
            )));
        };
        match stream.grab() {
            Ok(frame) => Ok(frame),
            Err(err) => {
                self.failure = Some(err.to_string());
                self.advance(SessionEvent::Fault);
                Err(err)
            }
        }
    }

    /// Release the camera. Idempotent.
    pub fn stop(&mut self) {
        self.advance(SessionEvent::Stop);
    }
}

impl Default for CaptureSession {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.stop();
    }
}
