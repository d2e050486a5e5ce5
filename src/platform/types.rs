//! Device platform types and data structures.

use std::fmt;
use std::time::Instant;

/// Platform error name reported when the user or the OS refuses camera access.
pub const NOT_ALLOWED_ERROR: &str = "NotAllowedError";
/// Platform error name for access blocked by policy (insecure context, MDM, ...).
pub const SECURITY_ERROR: &str = "SecurityError";
/// Platform error name for a source that is held by another consumer.
pub const NOT_READABLE_ERROR: &str = "NotReadableError";
/// Legacy alias of [`NOT_READABLE_ERROR`].
pub const TRACK_START_ERROR: &str = "TrackStartError";
/// Platform error name for a stream start that was aborted by the hardware.
pub const ABORT_ERROR: &str = "AbortError";
/// Platform error name for a resolution/format the source cannot satisfy.
pub const OVERCONSTRAINED_ERROR: &str = "OverconstrainedError";
/// Legacy alias of [`OVERCONSTRAINED_ERROR`].
pub const CONSTRAINT_NOT_SATISFIED_ERROR: &str = "ConstraintNotSatisfiedError";
/// Platform error name for a source id that no longer exists.
pub const NOT_FOUND_ERROR: &str = "NotFoundError";
/// Legacy alias of [`NOT_FOUND_ERROR`].
pub const DEVICES_NOT_FOUND_ERROR: &str = "DevicesNotFoundError";

/// Opaque identifier of a capture source.
///
/// Stable for as long as the hardware stays attached.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(String);

impl SourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SourceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Kind of media a device produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Audio,
}

/// A device as reported by the platform's enumeration call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformDevice {
    pub id: SourceId,
    /// Empty until the user has granted permission at least once.
    pub label: String,
    pub kind: MediaKind,
}

impl PlatformDevice {
    pub fn video(id: impl Into<SourceId>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            kind: MediaKind::Video,
        }
    }
}

/// Answer to a permission prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionDecision {
    Granted,
    Denied,
}

/// Camera resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    /// Low resolution (320x240)
    pub const LOW: Resolution = Resolution {
        width: 320,
        height: 240,
    };

    /// Medium resolution (640x480), accepted by nearly every UVC device
    pub const MEDIUM: Resolution = Resolution {
        width: 640,
        height: 480,
    };

    /// High resolution (1280x720)
    pub const HIGH: Resolution = Resolution {
        width: 1280,
        height: 720,
    };

    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True when either dimension is zero.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// True when `self` fits inside `other` in both dimensions.
    pub fn fits_within(&self, other: Resolution) -> bool {
        self.width <= other.width && self.height <= other.height
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::MEDIUM
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Resolution requested from the platform. Never a guarantee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionHint {
    /// Closest match to the given resolution.
    Ideal(Resolution),
    /// Whatever the source offers.
    Any,
}

impl fmt::Display for ResolutionHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionHint::Ideal(res) => write!(f, "ideal {}", res),
            ResolutionHint::Any => write!(f, "any"),
        }
    }
}

/// Arguments for [`DevicePlatform::acquire_stream`](super::DevicePlatform::acquire_stream).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    pub source_id: SourceId,
    pub hint: ResolutionHint,
}

/// Hardware attach/detach notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopologyEvent {
    Attached(SourceId),
    Detached(SourceId),
    /// The platform knows something changed but not what.
    Changed,
}

impl fmt::Display for TopologyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopologyEvent::Attached(id) => write!(f, "attached {}", id),
            TopologyEvent::Detached(id) => write!(f, "detached {}", id),
            TopologyEvent::Changed => write!(f, "devices changed"),
        }
    }
}

/// Error reported by the device platform.
///
/// `name` follows the platform's error naming (see the `*_ERROR` constants);
/// classification into session failures happens in the stream controller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{name}: {message}")]
pub struct PlatformError {
    pub name: String,
    pub message: String,
}

impl PlatformError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// Pixel format of a captured frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    /// RGB format (3 bytes per pixel)
    Rgb,
}

/// A decoded frame from a live stream.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Raw pixel data in RGB format
    pub data: Vec<u8>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Pixel format
    pub format: FrameFormat,
    /// Timestamp when frame was captured
    pub timestamp: Instant,
}

impl Frame {
    /// Get the number of bytes per pixel (3 for RGB).
    pub fn bytes_per_pixel(&self) -> usize {
        match self.format {
            FrameFormat::Rgb => 3,
        }
    }

    /// Number of bytes a complete frame of this size occupies.
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.bytes_per_pixel()
    }

    /// True when the frame has non-zero dimensions and a full pixel buffer.
    pub fn is_decodable(&self) -> bool {
        self.width > 0 && self.height > 0 && self.data.len() == self.expected_len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(width: u32, height: u32, len: usize) -> Frame {
        Frame {
            data: vec![0; len],
            width,
            height,
            format: FrameFormat::Rgb,
            timestamp: Instant::now(),
        }
    }

    #[test]
    fn test_resolution_constants() {
        assert_eq!(Resolution::LOW, Resolution::new(320, 240));
        assert_eq!(Resolution::MEDIUM, Resolution::new(640, 480));
        assert_eq!(Resolution::HIGH, Resolution::new(1280, 720));
        assert_eq!(Resolution::default(), Resolution::MEDIUM);
    }

    #[test]
    fn test_resolution_fits_within() {
        assert!(Resolution::LOW.fits_within(Resolution::MEDIUM));
        assert!(Resolution::MEDIUM.fits_within(Resolution::MEDIUM));
        assert!(!Resolution::HIGH.fits_within(Resolution::MEDIUM));
        assert!(Resolution::new(0, 480).is_empty());
    }

    #[test]
    fn test_platform_error_display() {
        let err = PlatformError::new(NOT_READABLE_ERROR, "device in use");
        assert_eq!(err.to_string(), "NotReadableError: device in use");
    }

    #[test]
    fn test_topology_event_display() {
        assert_eq!(
            TopologyEvent::Attached(SourceId::from("usb-1")).to_string(),
            "attached usb-1"
        );
        assert_eq!(TopologyEvent::Changed.to_string(), "devices changed");
    }

    #[test]
    fn test_frame_is_decodable() {
        assert!(frame(2, 1, 6).is_decodable());
        assert!(!frame(0, 0, 0).is_decodable());
        // Truncated buffer
        assert!(!frame(2, 2, 6).is_decodable());
    }
}
