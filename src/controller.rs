//! Capture session ownership and the session state machine.
//!
//! ```text
//!   Idle ──acquire──▶ Acquiring ──ok──▶ Live
//!                        │  ▲             │
//!                    err │  └──acquire────┘
//!                        ▼  │
//!                      Failed ──acquire──▶ Acquiring
//! ```
//!
//! Every `acquire` stops the current session before requesting a new stream,
//! so at most one hardware lock is held. Each call takes a new generation
//! number; a result that completes after a newer `acquire` (or `release`) was
//! issued is discarded and its stream stopped without touching state.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tokio::sync::watch;

use crate::platform::{
    DevicePlatform, Frame, PlatformError, Resolution, ResolutionHint, SourceId, StreamHandle,
    StreamRequest, ABORT_ERROR, CONSTRAINT_NOT_SATISFIED_ERROR, DEVICES_NOT_FOUND_ERROR,
    NOT_ALLOWED_ERROR, NOT_FOUND_ERROR, NOT_READABLE_ERROR, OVERCONSTRAINED_ERROR, SECURITY_ERROR,
    TRACK_START_ERROR,
};

/// Why a session could not be established.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FailureReason {
    #[error("Camera permission denied")]
    PermissionDenied,

    #[error("No video sources found")]
    NoSourcesFound,

    #[error("Camera is in use by another application. Close it or replug the device")]
    DeviceBusy,

    #[error("Camera rejected every requested format")]
    UnsupportedFormat,

    #[error("Camera is no longer available")]
    SourceUnavailable,

    #[error("Camera failed to start: {0}")]
    Other(String),
}

impl FailureReason {
    /// Classify a platform acquisition error by its name.
    pub fn classify(error: &PlatformError) -> Self {
        match error.name.as_str() {
            NOT_ALLOWED_ERROR | SECURITY_ERROR => FailureReason::PermissionDenied,
            NOT_READABLE_ERROR | TRACK_START_ERROR | ABORT_ERROR => FailureReason::DeviceBusy,
            OVERCONSTRAINED_ERROR | CONSTRAINT_NOT_SATISFIED_ERROR => {
                FailureReason::UnsupportedFormat
            }
            NOT_FOUND_ERROR | DEVICES_NOT_FOUND_ERROR => FailureReason::SourceUnavailable,
            _ => FailureReason::Other(error.to_string()),
        }
    }
}

/// Lifecycle state of the capture session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Acquiring {
        source_id: SourceId,
    },
    Live {
        source_id: SourceId,
        resolution: Resolution,
    },
    Failed(FailureReason),
}

impl SessionState {
    pub fn is_live(&self) -> bool {
        matches!(self, SessionState::Live { .. })
    }

    /// Source the state refers to, if any.
    pub fn source_id(&self) -> Option<&SourceId> {
        match self {
            SessionState::Acquiring { source_id } | SessionState::Live { source_id, .. } => {
                Some(source_id)
            }
            SessionState::Idle | SessionState::Failed(_) => None,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Acquiring { source_id } => write!(f, "acquiring {}", source_id),
            SessionState::Live {
                source_id,
                resolution,
            } => write!(f, "live on {} at {}", source_id, resolution),
            SessionState::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Result of an `acquire` call that did not end `Live`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AcquireError {
    #[error(transparent)]
    Failed(#[from] FailureReason),

    /// A newer acquire or release was issued while this one was in flight.
    #[error("acquisition superseded by a newer request")]
    Superseded,
}

/// The single active hardware-bound stream.
#[derive(Debug)]
pub struct CaptureSession {
    stream: Box<dyn StreamHandle>,
    started_at: Instant,
}

impl CaptureSession {
    fn new(stream: Box<dyn StreamHandle>) -> Self {
        Self {
            stream,
            started_at: Instant::now(),
        }
    }

    pub fn source_id(&self) -> &SourceId {
        self.stream.source_id()
    }

    pub fn resolution(&self) -> Resolution {
        self.stream.resolution()
    }

    pub fn latest_frame(&self) -> Option<Frame> {
        self.stream.latest_frame()
    }

    fn stop(mut self) {
        log::info!(
            "Releasing capture session on {} (live for {:?})",
            self.source_id(),
            self.started_at.elapsed()
        );
        self.stream.stop();
    }
}

#[derive(Debug, Default)]
struct ControllerInner {
    generation: u64,
    /// Present exactly while the state is `Live`.
    session: Option<CaptureSession>,
}

/// Owns the session state machine and the active capture session.
pub struct StreamController {
    platform: Arc<dyn DevicePlatform>,
    inner: Mutex<ControllerInner>,
    state_tx: watch::Sender<SessionState>,
}

impl fmt::Debug for StreamController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamController")
            .field("state", &*self.state_tx.borrow())
            .finish_non_exhaustive()
    }
}

impl StreamController {
    pub fn new(platform: Arc<dyn DevicePlatform>) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Idle);
        Self {
            platform,
            inner: Mutex::new(ControllerInner::default()),
            state_tx,
        }
    }

    /// Bind a live session to `source_id`.
    ///
    /// `preferred` is a hint: if the source rejects it the controller falls
    /// back to [`Resolution::MEDIUM`] and then to whatever the source offers.
    /// The previous session, if any, is stopped before the new stream is
    /// requested.
    ///
    /// # Errors
    /// * `AcquireError::Failed` - the attempt failed; state is `Failed(reason)`
    /// * `AcquireError::Superseded` - a newer call won; state was left alone
    pub async fn acquire(
        &self,
        source_id: SourceId,
        preferred: Resolution,
    ) -> Result<(), AcquireError> {
        let (generation, previous) = {
            let mut inner = self.lock();
            inner.generation += 1;
            let previous = inner.session.take();
            self.state_tx.send_replace(SessionState::Acquiring {
                source_id: source_id.clone(),
            });
            (inner.generation, previous)
        };
        if let Some(session) = previous {
            session.stop();
        }
        log::info!(
            "Acquiring {} (preferred {}, attempt #{})",
            source_id,
            preferred,
            generation
        );

        let result = self.open_stream(generation, &source_id, preferred).await;

        let mut inner = self.lock();
        if inner.generation != generation {
            drop(inner);
            if let Ok(mut stream) = result {
                stream.stop();
            }
            log::warn!("Discarding superseded acquisition of {}", source_id);
            return Err(AcquireError::Superseded);
        }

        match result {
            Ok(stream) => {
                let resolution = stream.resolution();
                if resolution != preferred {
                    log::debug!("{} delivers {} instead of {}", source_id, resolution, preferred);
                }
                inner.session = Some(CaptureSession::new(stream));
                self.state_tx.send_replace(SessionState::Live {
                    source_id: source_id.clone(),
                    resolution,
                });
                log::info!("Live on {} at {}", source_id, resolution);
                Ok(())
            }
            Err(reason) => {
                self.state_tx
                    .send_replace(SessionState::Failed(reason.clone()));
                log::warn!("Acquisition of {} failed: {}", source_id, reason);
                Err(AcquireError::Failed(reason))
            }
        }
    }

    /// Walk the resolution ladder until a stream opens or a non-format error occurs.
    async fn open_stream(
        &self,
        generation: u64,
        source_id: &SourceId,
        preferred: Resolution,
    ) -> Result<Box<dyn StreamHandle>, FailureReason> {
        let mut last = FailureReason::UnsupportedFormat;

        for hint in hint_ladder(preferred) {
            if !self.is_current(generation) {
                break;
            }
            let request = StreamRequest {
                source_id: source_id.clone(),
                hint,
            };
            match self.platform.acquire_stream(request).await {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    let reason = FailureReason::classify(&e);
                    if reason != FailureReason::UnsupportedFormat {
                        return Err(reason);
                    }
                    log::debug!("{} rejected {}: {}", source_id, hint, e);
                    last = reason;
                }
            }
        }

        Err(last)
    }

    /// Stop all tracks and return to `Idle`.
    ///
    /// Any acquisition still in flight is superseded.
    pub fn release(&self) {
        let previous = {
            let mut inner = self.lock();
            inner.generation += 1;
            self.state_tx.send_replace(SessionState::Idle);
            inner.session.take()
        };
        if let Some(session) = previous {
            session.stop();
        }
    }

    /// Release the session and record a failure that happened outside
    /// acquisition (e.g. permission revoked during enumeration).
    pub fn fail(&self, reason: FailureReason) {
        let previous = {
            let mut inner = self.lock();
            inner.generation += 1;
            self.state_tx.send_replace(SessionState::Failed(reason));
            inner.session.take()
        };
        if let Some(session) = previous {
            session.stop();
        }
    }

    pub fn current_state(&self) -> SessionState {
        self.state_tx.borrow().clone()
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Source of the live session, if any.
    pub fn active_source(&self) -> Option<SourceId> {
        self.with_live_session(|s| s.source_id().clone())
    }

    /// Run `f` against the live session; `None` when not `Live`.
    pub fn with_live_session<R>(&self, f: impl FnOnce(&CaptureSession) -> R) -> Option<R> {
        self.lock().session.as_ref().map(f)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.lock().generation == generation
    }

    fn lock(&self) -> MutexGuard<'_, ControllerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for StreamController {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(session) = inner.session.take() {
            session.stop();
        }
    }
}

/// Hints to try in order: preferred, medium, anything.
fn hint_ladder(preferred: Resolution) -> Vec<ResolutionHint> {
    let mut ladder = vec![ResolutionHint::Ideal(preferred)];
    if preferred != Resolution::MEDIUM {
        ladder.push(ResolutionHint::Ideal(Resolution::MEDIUM));
    }
    ladder.push(ResolutionHint::Any);
    ladder
}
