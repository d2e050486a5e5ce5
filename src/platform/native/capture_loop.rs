//! Background capture thread implementation.

use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    CameraFormat, CameraIndex, FrameFormat as NokhwaFrameFormat, RequestedFormat,
    RequestedFormatType,
};
use nokhwa::Camera;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tokio::sync::oneshot;

use super::decode::convert_to_rgb;
use super::device::is_permission_message;
use crate::platform::types::{
    Frame, PlatformError, Resolution, ResolutionHint, NOT_ALLOWED_ERROR, NOT_READABLE_ERROR,
    OVERCONSTRAINED_ERROR,
};

/// Frame rate requested together with an ideal resolution.
const PREFERRED_FPS: u32 = 30;

/// Run the capture loop in a background thread.
///
/// Reports the negotiated resolution (or the open failure) through `ready`,
/// then keeps `buffer` filled with the latest decoded frame until `stop` is set.
pub fn run_capture_loop(
    index: CameraIndex,
    hint: ResolutionHint,
    buffer: Arc<Mutex<Option<Frame>>>,
    stop: Arc<AtomicBool>,
    ready: oneshot::Sender<Result<Resolution, PlatformError>>,
) {
    let mut camera = match open_camera(&index, hint) {
        Ok(cam) => cam,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    if let Err(e) = camera.open_stream() {
        let _ = ready.send(Err(PlatformError::new(NOT_READABLE_ERROR, e.to_string())));
        return;
    }

    let res = camera.resolution();
    let actual = Resolution::new(res.width(), res.height());
    if ready.send(Ok(actual)).is_err() {
        // Nobody is waiting for this stream any more
        let _ = camera.stop_stream();
        return;
    }

    while !stop.load(Ordering::Relaxed) {
        if let Ok(raw_frame) = camera.frame() {
            // Undecodable frames are skipped
            if let Some(frame) = convert_to_rgb(&raw_frame) {
                if let Ok(mut buf) = buffer.lock() {
                    *buf = Some(frame);
                }
            }
        }

        // Small sleep to allow checking stop signal
        thread::sleep(Duration::from_millis(1));
    }

    let _ = camera.stop_stream();
}

/// Open a camera for the given hint.
///
/// An ideal resolution is tried with NV12 (native on macOS) and then MJPEG
/// (widely supported by UVC devices). `Any` lets the camera pick.
fn open_camera(index: &CameraIndex, hint: ResolutionHint) -> Result<Camera, PlatformError> {
    let format_attempts: Vec<RequestedFormat> = match hint {
        ResolutionHint::Ideal(res) => [NokhwaFrameFormat::NV12, NokhwaFrameFormat::MJPEG]
            .into_iter()
            .map(|fourcc| {
                RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(CameraFormat::new(
                    nokhwa::utils::Resolution::new(res.width, res.height),
                    fourcc,
                    PREFERRED_FPS,
                )))
            })
            .collect(),
        ResolutionHint::Any => vec![RequestedFormat::new::<RgbFormat>(
            RequestedFormatType::AbsoluteHighestResolution,
        )],
    };

    let mut last_error = String::from("no format attempted");

    for requested in format_attempts {
        match Camera::new(index.clone(), requested) {
            Ok(cam) => return Ok(cam),
            Err(e) => last_error = e.to_string(),
        }
    }

    if is_permission_message(&last_error) {
        Err(PlatformError::new(NOT_ALLOWED_ERROR, last_error))
    } else if matches!(hint, ResolutionHint::Ideal(_)) {
        // Let the controller retry with a looser hint
        Err(PlatformError::new(OVERCONSTRAINED_ERROR, last_error))
    } else {
        Err(PlatformError::new(NOT_READABLE_ERROR, last_error))
    }
}
