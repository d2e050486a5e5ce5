//! Native stream handle.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use tokio::sync::oneshot;

use super::capture_loop::run_capture_loop;
use super::device::camera_index;
use crate::platform::types::{
    Frame, PlatformError, Resolution, SourceId, StreamRequest, NOT_READABLE_ERROR,
};
use crate::platform::StreamHandle;

/// Per-device hardware locks.
///
/// A capture thread holds its device's lock from before the camera is opened
/// until after it is closed, so a reopen of the same device waits on its own
/// thread instead of racing the previous one.
#[derive(Debug, Default)]
pub struct DeviceLocks {
    locks: Mutex<HashMap<SourceId, Arc<Mutex<()>>>>,
}

impl DeviceLocks {
    pub fn for_source(&self, source_id: &SourceId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(source_id.clone()).or_default())
    }
}

/// A nokhwa camera running on its own thread.
///
/// The camera is opened inside the background thread to avoid thread-safety
/// issues; the thread continuously stores the latest frame in a shared buffer.
pub struct NativeStream {
    source_id: SourceId,
    /// Latest captured frame (shared with capture thread)
    frame_buffer: Arc<Mutex<Option<Frame>>>,
    /// Capture thread handle
    capture_thread: Option<JoinHandle<()>>,
    /// Signal to stop capture thread
    stop_signal: Arc<AtomicBool>,
    /// Resolution negotiated with the camera
    resolution: Resolution,
}

impl std::fmt::Debug for NativeStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeStream")
            .field("source_id", &self.source_id)
            .field("resolution", &self.resolution)
            .finish_non_exhaustive()
    }
}

impl NativeStream {
    /// Spawn the capture thread and wait until the camera reports its format.
    pub async fn start(
        request: StreamRequest,
        device_lock: Arc<Mutex<()>>,
    ) -> Result<Self, PlatformError> {
        let index = camera_index(&request.source_id)?;
        let buffer = Arc::new(Mutex::new(None));
        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = oneshot::channel();

        let thread_buffer = Arc::clone(&buffer);
        let thread_stop = Arc::clone(&stop);
        let hint = request.hint;
        let handle = std::thread::spawn(move || {
            let _held = device_lock.lock().unwrap_or_else(PoisonError::into_inner);
            run_capture_loop(index, hint, thread_buffer, thread_stop, ready_tx);
        });

        let mut stream = Self::with_thread(request.source_id, buffer, handle, stop);

        match ready_rx.await {
            Ok(Ok(resolution)) => {
                stream.resolution = resolution;
                Ok(stream)
            }
            Ok(Err(e)) => {
                stream.stop();
                Err(e)
            }
            Err(_) => {
                stream.stop();
                Err(PlatformError::new(
                    NOT_READABLE_ERROR,
                    "capture thread terminated unexpectedly",
                ))
            }
        }
    }
}

impl NativeStream {
    fn with_thread(
        source_id: SourceId,
        frame_buffer: Arc<Mutex<Option<Frame>>>,
        capture_thread: JoinHandle<()>,
        stop_signal: Arc<AtomicBool>,
    ) -> Self {
        Self {
            source_id,
            frame_buffer,
            capture_thread: Some(capture_thread),
            stop_signal,
            resolution: Resolution::default(),
        }
    }
}

impl StreamHandle for NativeStream {
    fn source_id(&self) -> &SourceId {
        &self.source_id
    }

    fn resolution(&self) -> Resolution {
        self.resolution
    }

    fn latest_frame(&self) -> Option<Frame> {
        let buffer = self.frame_buffer.lock().ok()?;
        buffer.clone()
    }

    /// Signal the capture thread and detach it.
    ///
    /// `camera.frame()` may block for a frame interval or longer after an
    /// unplug, so the thread closes the camera and drops its device lock on
    /// its own time.
    fn stop(&mut self) {
        self.stop_signal.store(true, Ordering::SeqCst);
        if let Some(handle) = self.capture_thread.take() {
            log::debug!("Detaching capture thread for {}", self.source_id);
            drop(handle);
        }
        if let Ok(mut buffer) = self.frame_buffer.lock() {
            *buffer = None;
        }
    }
}

impl Drop for NativeStream {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::types::FrameFormat;
    use std::time::{Duration, Instant};

    #[test]
    fn test_stop_does_not_wait_for_blocked_capture_thread() {
        let stop = Arc::new(AtomicBool::new(false));
        let buffer = Arc::new(Mutex::new(Some(Frame {
            data: vec![0; 12],
            width: 2,
            height: 2,
            format: FrameFormat::Rgb,
            timestamp: Instant::now(),
        })));
        // Stands in for a camera.frame() call that never returns promptly
        let handle = std::thread::spawn(|| std::thread::sleep(Duration::from_secs(5)));
        let mut stream = NativeStream::with_thread(
            SourceId::from("0"),
            Arc::clone(&buffer),
            handle,
            Arc::clone(&stop),
        );

        let started = Instant::now();
        stream.stop();

        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(stop.load(Ordering::SeqCst));
        assert!(stream.latest_frame().is_none());
    }

    #[test]
    fn test_device_locks_are_shared_per_source() {
        let locks = DeviceLocks::default();
        let a = locks.for_source(&SourceId::from("0"));

        assert!(Arc::ptr_eq(&a, &locks.for_source(&SourceId::from("0"))));
        assert!(!Arc::ptr_eq(&a, &locks.for_source(&SourceId::from("1"))));
    }

    #[test]
    fn test_reopen_waits_for_previous_thread_to_release() {
        let locks = DeviceLocks::default();
        let lock = locks.for_source(&SourceId::from("0"));
        let held = lock.lock().unwrap();

        let contender = locks.for_source(&SourceId::from("0"));
        let waiter = std::thread::spawn(move || {
            let _guard = contender.lock().unwrap();
        });
        std::thread::sleep(Duration::from_millis(50));
        assert!(!waiter.is_finished());

        drop(held);
        waiter.join().unwrap();
    }
}
