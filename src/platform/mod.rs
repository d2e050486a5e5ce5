//! Device platform interface.
//!
//! The lifecycle manager never talks to camera hardware directly. It goes
//! through [`DevicePlatform`], which enumerates devices, prompts for
//! permission, opens streams and reports hot-plug events:
//! - [`SimulatedPlatform`] is an in-memory platform for tests and demo mode
//! - `NativePlatform` (feature `native`) drives real UVC hardware via nokhwa

use async_trait::async_trait;
use tokio::sync::broadcast;

mod simulated;
mod types;

#[cfg(feature = "native")]
mod native;

#[cfg(feature = "native")]
pub use native::NativePlatform;
pub use simulated::SimulatedPlatform;
pub use types::{
    Frame, FrameFormat, MediaKind, PermissionDecision, PlatformDevice, PlatformError, Resolution,
    ResolutionHint, SourceId, StreamRequest, TopologyEvent, ABORT_ERROR,
    CONSTRAINT_NOT_SATISFIED_ERROR, DEVICES_NOT_FOUND_ERROR, NOT_ALLOWED_ERROR, NOT_FOUND_ERROR,
    NOT_READABLE_ERROR, OVERCONSTRAINED_ERROR, SECURITY_ERROR, TRACK_START_ERROR,
};

/// A live hardware-bound video stream.
///
/// Holding a handle means holding the source's exclusive capture lock until
/// [`stop`](StreamHandle::stop) is called.
pub trait StreamHandle: Send + Sync + std::fmt::Debug {
    /// Source this stream is bound to.
    fn source_id(&self) -> &SourceId;

    /// Resolution the source actually delivers.
    fn resolution(&self) -> Resolution;

    /// Most recent decoded frame, or `None` before the first frame arrives.
    fn latest_frame(&self) -> Option<Frame>;

    /// Stop all tracks and release the hardware. Idempotent.
    fn stop(&mut self);
}

/// Operations consumed from the host platform.
#[async_trait]
pub trait DevicePlatform: Send + Sync {
    /// List every media device currently attached.
    async fn enumerate(&self) -> Result<Vec<PlatformDevice>, PlatformError>;

    /// Prompt the user for access to devices of `kind`.
    async fn request_permission(
        &self,
        kind: MediaKind,
    ) -> Result<PermissionDecision, PlatformError>;

    /// Open a stream on the requested source.
    async fn acquire_stream(
        &self,
        request: StreamRequest,
    ) -> Result<Box<dyn StreamHandle>, PlatformError>;

    /// Subscribe to attach/detach notifications.
    ///
    /// Dropping the receiver unsubscribes.
    fn subscribe(&self) -> broadcast::Receiver<TopologyEvent>;
}
