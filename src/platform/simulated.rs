//! In-memory device platform.
//!
//! Scripted sources with per-source acquisition latency, queued failures,
//! permission prompts and hot-plug injection. Keeps a ledger of which sources
//! are held so tests can assert that no two streams ever share the hardware.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::types::{
    Frame, FrameFormat, MediaKind, PermissionDecision, PlatformDevice, PlatformError, Resolution,
    ResolutionHint, SourceId, StreamRequest, TopologyEvent, NOT_FOUND_ERROR, NOT_READABLE_ERROR,
    OVERCONSTRAINED_ERROR,
};
use super::{DevicePlatform, StreamHandle};

/// Capacity of the topology event channel.
const EVENT_CAPACITY: usize = 16;

#[derive(Debug)]
struct SimDevice {
    device: PlatformDevice,
    latency: Duration,
    max_resolution: Resolution,
    produces_frames: bool,
    failures: VecDeque<PlatformError>,
}

impl SimDevice {
    fn new(id: SourceId, label: String) -> Self {
        Self {
            device: PlatformDevice {
                id,
                label,
                kind: MediaKind::Video,
            },
            latency: Duration::ZERO,
            max_resolution: Resolution::HIGH,
            produces_frames: true,
            failures: VecDeque::new(),
        }
    }
}

#[derive(Debug, Default)]
struct SimState {
    devices: Vec<SimDevice>,
    hide_labels: bool,
    deny_permission: bool,
    granted: bool,
    permission_requests: u32,
    enumerate_error: Option<PlatformError>,
    held: HashSet<SourceId>,
    max_held: usize,
    acquire_calls: u32,
}

impl SimState {
    fn device_mut(&mut self, id: &SourceId) -> Option<&mut SimDevice> {
        self.devices.iter_mut().find(|d| &d.device.id == id)
    }
}

/// Simulated device platform.
pub struct SimulatedPlatform {
    state: Arc<Mutex<SimState>>,
    events: broadcast::Sender<TopologyEvent>,
}

impl Default for SimulatedPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedPlatform {
    /// Create a platform with no devices attached.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Arc::new(Mutex::new(SimState::default())),
            events,
        }
    }

    /// A built-in webcam followed by tethered glasses, with realistic latencies.
    pub fn demo() -> Self {
        let platform = Self::new()
            .with_device("builtin-0", "Integrated Webcam")
            .with_device("usb-glasses-1", "USB Video Class Glasses");
        platform.set_latency("builtin-0", Duration::from_millis(120));
        platform.set_latency("usb-glasses-1", Duration::from_millis(300));
        platform
    }

    /// Builder-style variant of [`add_device`](Self::add_device).
    pub fn with_device(self, id: impl Into<SourceId>, label: impl Into<String>) -> Self {
        self.add_device(id, label);
        self
    }

    /// Attach a video device without emitting a topology event.
    pub fn add_device(&self, id: impl Into<SourceId>, label: impl Into<String>) {
        self.lock()
            .devices
            .push(SimDevice::new(id.into(), label.into()));
    }

    /// Attach a video device and notify subscribers.
    pub fn plug(&self, id: impl Into<SourceId>, label: impl Into<String>) {
        let id = id.into();
        self.add_device(id.clone(), label);
        self.emit(TopologyEvent::Attached(id));
    }

    /// Detach a device and notify subscribers.
    ///
    /// A stream already open on the device stops producing frames.
    pub fn unplug(&self, id: impl Into<SourceId>) {
        let id = id.into();
        self.lock().devices.retain(|d| d.device.id != id);
        self.emit(TopologyEvent::Detached(id));
    }

    /// Send an arbitrary topology event.
    pub fn emit(&self, event: TopologyEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }

    pub fn set_latency(&self, id: impl Into<SourceId>, latency: Duration) {
        if let Some(device) = self.lock().device_mut(&id.into()) {
            device.latency = latency;
        }
    }

    /// Largest resolution the device accepts for an `Ideal` hint.
    pub fn set_max_resolution(&self, id: impl Into<SourceId>, resolution: Resolution) {
        if let Some(device) = self.lock().device_mut(&id.into()) {
            device.max_resolution = resolution;
        }
    }

    /// When false, streams on the device never deliver a frame.
    pub fn set_produces_frames(&self, id: impl Into<SourceId>, produces: bool) {
        if let Some(device) = self.lock().device_mut(&id.into()) {
            device.produces_frames = produces;
        }
    }

    /// Queue an error returned by the next acquisition of `id`.
    pub fn fail_next_acquire(&self, id: impl Into<SourceId>, error: PlatformError) {
        if let Some(device) = self.lock().device_mut(&id.into()) {
            device.failures.push_back(error);
        }
    }

    /// Make every enumeration fail until cleared with `None`.
    pub fn fail_enumeration(&self, error: Option<PlatformError>) {
        self.lock().enumerate_error = error;
    }

    /// Withhold device labels until a permission prompt has been granted.
    pub fn hide_labels_until_permission(&self) {
        self.lock().hide_labels = true;
    }

    /// Answer future permission prompts with a denial.
    pub fn deny_permission(&self, deny: bool) {
        self.lock().deny_permission = deny;
    }

    pub fn permission_requests(&self) -> u32 {
        self.lock().permission_requests
    }

    pub fn acquire_calls(&self) -> u32 {
        self.lock().acquire_calls
    }

    /// Number of sources currently held by an open stream.
    pub fn active_streams(&self) -> usize {
        self.lock().held.len()
    }

    /// Highest number of sources ever held at the same time.
    pub fn max_concurrent_streams(&self) -> usize {
        self.lock().max_held
    }

    pub fn is_held(&self, id: impl Into<SourceId>) -> bool {
        self.lock().held.contains(&id.into())
    }

    /// Number of live topology subscriptions.
    pub fn listener_count(&self) -> usize {
        self.events.receiver_count()
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl DevicePlatform for SimulatedPlatform {
    async fn enumerate(&self) -> Result<Vec<PlatformDevice>, PlatformError> {
        let state = self.lock();
        if let Some(err) = &state.enumerate_error {
            return Err(err.clone());
        }
        let withhold = state.hide_labels && !state.granted;
        Ok(state
            .devices
            .iter()
            .map(|d| {
                let mut device = d.device.clone();
                if withhold {
                    device.label.clear();
                }
                device
            })
            .collect())
    }

    async fn request_permission(
        &self,
        _kind: MediaKind,
    ) -> Result<PermissionDecision, PlatformError> {
        let mut state = self.lock();
        state.permission_requests += 1;
        if state.deny_permission {
            Ok(PermissionDecision::Denied)
        } else {
            state.granted = true;
            Ok(PermissionDecision::Granted)
        }
    }

    async fn acquire_stream(
        &self,
        request: StreamRequest,
    ) -> Result<Box<dyn StreamHandle>, PlatformError> {
        let latency = {
            let mut state = self.lock();
            state.acquire_calls += 1;
            state
                .device_mut(&request.source_id)
                .map(|d| d.latency)
                .unwrap_or_default()
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut guard = self.lock();
        let state = &mut *guard;
        let device = state
            .devices
            .iter_mut()
            .find(|d| d.device.id == request.source_id)
            .ok_or_else(|| {
                PlatformError::new(
                    NOT_FOUND_ERROR,
                    format!("no device with id {}", request.source_id),
                )
            })?;

        if let Some(err) = device.failures.pop_front() {
            return Err(err);
        }

        let resolution = match request.hint {
            ResolutionHint::Ideal(res) if res.fits_within(device.max_resolution) => res,
            ResolutionHint::Ideal(res) => {
                return Err(PlatformError::new(
                    OVERCONSTRAINED_ERROR,
                    format!("{} exceeds {}", res, device.max_resolution),
                ))
            }
            ResolutionHint::Any => device.max_resolution,
        };

        if !state.held.insert(request.source_id.clone()) {
            return Err(PlatformError::new(
                NOT_READABLE_ERROR,
                format!("{} is held by another consumer", request.source_id),
            ));
        }
        state.max_held = state.max_held.max(state.held.len());

        Ok(Box::new(SimulatedStream {
            source_id: request.source_id,
            resolution,
            state: Arc::clone(&self.state),
            stopped: false,
            frames: AtomicU64::new(0),
        }))
    }

    fn subscribe(&self) -> broadcast::Receiver<TopologyEvent> {
        self.events.subscribe()
    }
}

/// Stream handle produced by [`SimulatedPlatform`].
#[derive(Debug)]
struct SimulatedStream {
    source_id: SourceId,
    resolution: Resolution,
    state: Arc<Mutex<SimState>>,
    stopped: bool,
    frames: AtomicU64,
}

impl SimulatedStream {
    /// Moving diagonal gradient so consecutive frames differ.
    fn synthesize(&self) -> Frame {
        let Resolution { width, height } = self.resolution;
        let shift = self.frames.fetch_add(1, Ordering::Relaxed);
        let mut data = Vec::with_capacity(width as usize * height as usize * 3);
        for y in 0..height as u64 {
            for x in 0..width as u64 {
                data.push(((x + shift) % 256) as u8);
                data.push(((y + shift) % 256) as u8);
                data.push(((x + y) % 256) as u8);
            }
        }
        Frame {
            data,
            width,
            height,
            format: FrameFormat::Rgb,
            timestamp: Instant::now(),
        }
    }
}

impl StreamHandle for SimulatedStream {
    fn source_id(&self) -> &SourceId {
        &self.source_id
    }

    fn resolution(&self) -> Resolution {
        self.resolution
    }

    fn latest_frame(&self) -> Option<Frame> {
        if self.stopped {
            return None;
        }
        let produces = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state
                .device_mut(&self.source_id)
                .is_some_and(|d| d.produces_frames)
        };
        produces.then(|| self.synthesize())
    }

    fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .held
            .remove(&self.source_id);
    }
}

impl Drop for SimulatedStream {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(id: &str, hint: ResolutionHint) -> StreamRequest {
        StreamRequest {
            source_id: SourceId::from(id),
            hint,
        }
    }

    #[tokio::test]
    async fn test_enumerate_withholds_labels_until_granted() {
        let platform = SimulatedPlatform::new().with_device("cam", "Glasses");
        platform.hide_labels_until_permission();

        let before = platform.enumerate().await.unwrap();
        assert_eq!(before[0].label, "");

        platform.request_permission(MediaKind::Video).await.unwrap();
        let after = platform.enumerate().await.unwrap();
        assert_eq!(after[0].label, "Glasses");
    }

    #[tokio::test]
    async fn test_acquire_holds_source_exclusively() {
        let platform = SimulatedPlatform::new().with_device("cam", "Glasses");

        let mut first = platform
            .acquire_stream(request("cam", ResolutionHint::Any))
            .await
            .unwrap();
        assert!(platform.is_held("cam"));

        let second = platform
            .acquire_stream(request("cam", ResolutionHint::Any))
            .await;
        assert_eq!(second.unwrap_err().name, NOT_READABLE_ERROR);

        first.stop();
        assert_eq!(platform.active_streams(), 0);
        assert_eq!(platform.max_concurrent_streams(), 1);
    }

    #[tokio::test]
    async fn test_acquire_rejects_oversized_ideal() {
        let platform = SimulatedPlatform::new().with_device("cam", "Glasses");
        platform.set_max_resolution("cam", Resolution::MEDIUM);

        let err = platform
            .acquire_stream(request("cam", ResolutionHint::Ideal(Resolution::HIGH)))
            .await
            .unwrap_err();
        assert_eq!(err.name, OVERCONSTRAINED_ERROR);

        let stream = platform
            .acquire_stream(request("cam", ResolutionHint::Any))
            .await
            .unwrap();
        assert_eq!(stream.resolution(), Resolution::MEDIUM);
    }

    #[tokio::test]
    async fn test_stream_frames_match_resolution() {
        let platform = SimulatedPlatform::new().with_device("cam", "Glasses");
        let stream = platform
            .acquire_stream(request("cam", ResolutionHint::Ideal(Resolution::LOW)))
            .await
            .unwrap();

        let frame = stream.latest_frame().unwrap();
        assert_eq!((frame.width, frame.height), (320, 240));
        assert!(frame.is_decodable());

        platform.set_produces_frames("cam", false);
        assert!(stream.latest_frame().is_none());
    }

    #[tokio::test]
    async fn test_dropping_stream_releases_hardware() {
        let platform = SimulatedPlatform::new().with_device("cam", "Glasses");
        let stream = platform
            .acquire_stream(request("cam", ResolutionHint::Any))
            .await
            .unwrap();
        drop(stream);
        assert!(!platform.is_held("cam"));
    }

    #[tokio::test]
    async fn test_plug_notifies_subscribers() {
        let platform = SimulatedPlatform::new();
        let mut events = platform.subscribe();
        assert_eq!(platform.listener_count(), 1);

        platform.plug("usb-1", "Glasses");
        assert_eq!(
            events.recv().await.unwrap(),
            TopologyEvent::Attached(SourceId::from("usb-1"))
        );
        assert_eq!(platform.enumerate().await.unwrap().len(), 1);
    }
}
