//! Still-frame capture from the live session.

mod frame_utils;
mod still;

pub use frame_utils::mirror_horizontal;
pub use still::{StillFrame, DEFAULT_JPEG_QUALITY};

use crate::controller::StreamController;

/// Errors returned by [`FrameCapture::capture`].
///
/// Both indicate the caller asked too early; the UI should only offer capture
/// while the session is live.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    #[error("Camera is not live")]
    NotLive,

    #[error("Camera has not produced a frame yet")]
    EmptyFrame,
}

/// Produces still frames from the controller's live session.
#[derive(Debug, Clone, Default)]
pub struct FrameCapture {
    mirror: bool,
}

impl FrameCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip stills horizontally (selfie mode).
    pub fn with_mirror(mut self, mirror: bool) -> Self {
        self.mirror = mirror;
        self
    }

    /// Snapshot the most recent frame of the live session.
    ///
    /// # Errors
    /// * `CaptureError::NotLive` - the session is not `Live`
    /// * `CaptureError::EmptyFrame` - no complete frame has been decoded yet
    pub fn capture(&self, controller: &StreamController) -> Result<StillFrame, CaptureError> {
        let (source_id, frame) = controller
            .with_live_session(|session| (session.source_id().clone(), session.latest_frame()))
            .ok_or(CaptureError::NotLive)?;

        let mut frame = frame.ok_or(CaptureError::EmptyFrame)?;
        if !frame.is_decodable() {
            return Err(CaptureError::EmptyFrame);
        }
        if self.mirror {
            mirror_horizontal(&mut frame);
        }

        let still = StillFrame::from_frame(source_id, frame).ok_or(CaptureError::EmptyFrame)?;
        log::info!(
            "Captured {}x{} still from {} ({})",
            still.width(),
            still.height(),
            still.source_id(),
            still.fingerprint()
        );
        Ok(still)
    }
}
