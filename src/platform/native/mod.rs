//! Native camera platform backed by nokhwa.
//!
//! nokhwa exposes no hot-plug notification, so attach/detach events are
//! derived by polling the device list.

mod capture;
mod capture_loop;
mod decode;
mod device;

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::types::{
    MediaKind, PermissionDecision, PlatformDevice, PlatformError, SourceId, StreamRequest,
    TopologyEvent, NOT_READABLE_ERROR,
};
use super::{DevicePlatform, StreamHandle};
use capture::{DeviceLocks, NativeStream};
use device::list_devices;

/// How often the device list is compared for attach/detach.
const POLL_INTERVAL: Duration = Duration::from_secs(2);

const EVENT_CAPACITY: usize = 16;

/// Real camera hardware.
pub struct NativePlatform {
    events: broadcast::Sender<TopologyEvent>,
    poller: Mutex<Option<JoinHandle<()>>>,
    device_locks: DeviceLocks,
}

impl Default for NativePlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl NativePlatform {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            events,
            poller: Mutex::new(None),
            device_locks: DeviceLocks::default(),
        }
    }

    /// Start the device poller unless it is already running.
    ///
    /// Must be called from within a tokio runtime.
    fn ensure_poller(&self) {
        let mut poller = self.poller.lock().unwrap_or_else(PoisonError::into_inner);
        if poller.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }

        let events = self.events.clone();
        *poller = Some(tokio::spawn(poll_topology(events, snapshot)));
    }
}

/// Compare device snapshots every [`POLL_INTERVAL`] and emit the differences.
///
/// Returns once no topology subscriber is left.
async fn poll_topology<F, Fut>(events: broadcast::Sender<TopologyEvent>, mut snapshot: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<BTreeSet<SourceId>, PlatformError>>,
{
    let mut known = match snapshot().await {
        Ok(ids) => ids,
        Err(e) => {
            log::error!("Device poller could not enumerate cameras: {}", e);
            BTreeSet::new()
        }
    };
    let mut interval = tokio::time::interval(POLL_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        interval.tick().await;
        if events.receiver_count() == 0 {
            log::debug!("No topology subscribers left, stopping device poller");
            break;
        }
        let current = match snapshot().await {
            Ok(ids) => ids,
            Err(e) => {
                log::debug!("Device poll failed: {}", e);
                continue;
            }
        };
        for id in current.difference(&known) {
            let _ = events.send(TopologyEvent::Attached(id.clone()));
        }
        for id in known.difference(&current) {
            let _ = events.send(TopologyEvent::Detached(id.clone()));
        }
        known = current;
    }
}

impl Drop for NativePlatform {
    fn drop(&mut self) {
        if let Some(handle) = self
            .poller
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}

async fn enumerate_blocking() -> Result<Vec<PlatformDevice>, PlatformError> {
    tokio::task::spawn_blocking(list_devices)
        .await
        .map_err(|e| PlatformError::new(NOT_READABLE_ERROR, e.to_string()))?
}

async fn snapshot() -> Result<BTreeSet<SourceId>, PlatformError> {
    Ok(enumerate_blocking()
        .await?
        .into_iter()
        .map(|d| d.id)
        .collect())
}

#[async_trait]
impl DevicePlatform for NativePlatform {
    async fn enumerate(&self) -> Result<Vec<PlatformDevice>, PlatformError> {
        enumerate_blocking().await
    }

    /// The OS prompts when a stream is first opened, so there is nothing to
    /// ask up front.
    async fn request_permission(
        &self,
        _kind: MediaKind,
    ) -> Result<PermissionDecision, PlatformError> {
        Ok(PermissionDecision::Granted)
    }

    async fn acquire_stream(
        &self,
        request: StreamRequest,
    ) -> Result<Box<dyn StreamHandle>, PlatformError> {
        let device_lock = self.device_locks.for_source(&request.source_id);
        let stream = NativeStream::start(request, device_lock).await?;
        Ok(Box::new(stream))
    }

    fn subscribe(&self) -> broadcast::Receiver<TopologyEvent> {
        let receiver = self.events.subscribe();
        self.ensure_poller();
        receiver
    }
}
