//! Camera device enumeration.

use nokhwa::query;
use nokhwa::utils::{ApiBackend, CameraIndex};

use crate::platform::types::{
    PlatformDevice, PlatformError, SourceId, NOT_ALLOWED_ERROR, NOT_FOUND_ERROR,
};

/// Platform error name for enumeration failures nokhwa cannot explain.
const UNKNOWN_ERROR: &str = "UnknownError";

/// List all available camera devices on the system.
///
/// If no cameras are found, returns an empty vector (not an error).
pub fn list_devices() -> Result<Vec<PlatformDevice>, PlatformError> {
    let devices = query(ApiBackend::Auto).map_err(|e| {
        let message = e.to_string();
        if is_permission_message(&message) {
            PlatformError::new(NOT_ALLOWED_ERROR, message)
        } else {
            PlatformError::new(UNKNOWN_ERROR, message)
        }
    })?;

    Ok(devices
        .into_iter()
        .map(|d| {
            let index = d.index().as_index().unwrap_or(0);
            PlatformDevice::video(SourceId::new(index.to_string()), d.human_name())
        })
        .collect())
}

/// Map a source id produced by [`list_devices`] back to a nokhwa index.
pub fn camera_index(source_id: &SourceId) -> Result<CameraIndex, PlatformError> {
    source_id
        .as_str()
        .parse::<u32>()
        .map(CameraIndex::Index)
        .map_err(|_| {
            PlatformError::new(
                NOT_FOUND_ERROR,
                format!("'{}' is not a native camera index", source_id),
            )
        })
}

/// True if a nokhwa error message describes an authorization failure.
pub fn is_permission_message(message: &str) -> bool {
    let msg = message.to_lowercase();
    msg.contains("permission")
        || msg.contains("denied")
        || msg.contains("authorization")
        || msg.contains("access")
}
