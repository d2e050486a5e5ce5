//! Capture source discovery and hot-plug observation.
//!
//! The registry turns the platform's raw device list into a [`SourceCatalog`],
//! handles the one-time permission prompt that unlocks device labels, and
//! turns attach/detach notifications into refreshed catalogs.

use std::borrow::Cow;
use std::future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::platform::{
    DevicePlatform, MediaKind, PermissionDecision, PlatformDevice, PlatformError, SourceId,
    NOT_ALLOWED_ERROR, SECURITY_ERROR,
};

/// A video input the user can pick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSource {
    pub id: SourceId,
    /// May be empty or generic; not stable across enumerations.
    pub display_name: String,
}

impl CaptureSource {
    pub fn new(id: impl Into<SourceId>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }

    /// Name suitable for display, falling back to the id.
    pub fn label(&self) -> Cow<'_, str> {
        if self.display_name.trim().is_empty() {
            Cow::Owned(format!("Camera {}", self.id))
        } else {
            Cow::Borrowed(&self.display_name)
        }
    }
}

impl From<PlatformDevice> for CaptureSource {
    fn from(device: PlatformDevice) -> Self {
        Self {
            id: device.id,
            display_name: device.label,
        }
    }
}

/// Video sources in platform enumeration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceCatalog {
    sources: Vec<CaptureSource>,
}

impl SourceCatalog {
    pub fn new(sources: Vec<CaptureSource>) -> Self {
        Self { sources }
    }

    pub fn sources(&self) -> &[CaptureSource] {
        &self.sources
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn get(&self, id: &SourceId) -> Option<&CaptureSource> {
        self.sources.iter().find(|s| &s.id == id)
    }

    pub fn contains(&self, id: &SourceId) -> bool {
        self.get(id).is_some()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CaptureSource> {
        self.sources.iter()
    }
}

impl<'a> IntoIterator for &'a SourceCatalog {
    type Item = &'a CaptureSource;
    type IntoIter = std::slice::Iter<'a, CaptureSource>;

    fn into_iter(self) -> Self::IntoIter {
        self.sources.iter()
    }
}

/// Errors produced while building a catalog.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    #[error("Camera permission denied. Grant camera access in your system privacy settings")]
    PermissionDenied,

    #[error("No video sources found. Make sure the camera is connected")]
    NoSourcesFound,

    #[error("Failed to enumerate video sources: {0}")]
    EnumerationFailed(String),
}

impl From<PlatformError> for DeviceError {
    fn from(err: PlatformError) -> Self {
        match err.name.as_str() {
            NOT_ALLOWED_ERROR | SECURITY_ERROR => DeviceError::PermissionDenied,
            _ => DeviceError::EnumerationFailed(err.to_string()),
        }
    }
}

/// A refreshed catalog delivered to a topology subscriber.
#[derive(Debug, Clone)]
pub struct TopologyUpdate {
    pub catalog: Result<SourceCatalog, DeviceError>,
    /// True when the refresh was triggered by hot-plug and the selection
    /// should be re-evaluated; false for passive background refreshes.
    pub auto_select: bool,
}

/// Enumerates capture sources and watches for hardware changes.
#[derive(Clone)]
pub struct DeviceRegistry {
    platform: Arc<dyn DevicePlatform>,
    permission_granted: Arc<AtomicBool>,
    refresh_interval: Option<Duration>,
}

impl DeviceRegistry {
    pub fn new(platform: Arc<dyn DevicePlatform>) -> Self {
        Self {
            platform,
            permission_granted: Arc::new(AtomicBool::new(false)),
            refresh_interval: None,
        }
    }

    /// Also refresh passively every `interval` while a topology watch is active.
    pub fn with_refresh_interval(mut self, interval: Option<Duration>) -> Self {
        self.refresh_interval = interval.filter(|d| !d.is_zero());
        self
    }

    /// Enumerate the attached video sources.
    ///
    /// Prompts for permission first if the platform is withholding labels.
    ///
    /// # Errors
    /// * `DeviceError::PermissionDenied` - the user declined or access is blocked
    /// * `DeviceError::NoSourcesFound` - enumeration succeeded but found nothing
    /// * `DeviceError::EnumerationFailed` - any other platform failure
    pub async fn list_sources(&self) -> Result<SourceCatalog, DeviceError> {
        let mut devices = self.enumerate_video().await?;

        let labels_hidden = devices.iter().any(|d| d.label.is_empty());
        if labels_hidden && !self.permission_granted.load(Ordering::SeqCst) {
            log::info!("Device labels are withheld, requesting camera permission");
            match self.platform.request_permission(MediaKind::Video).await? {
                PermissionDecision::Granted => {
                    self.permission_granted.store(true, Ordering::SeqCst);
                    devices = self.enumerate_video().await?;
                }
                PermissionDecision::Denied => {
                    log::warn!("Camera permission denied");
                    return Err(DeviceError::PermissionDenied);
                }
            }
        } else if !labels_hidden && !devices.is_empty() {
            self.permission_granted.store(true, Ordering::SeqCst);
        }

        if devices.is_empty() {
            log::warn!("No video sources found");
            return Err(DeviceError::NoSourcesFound);
        }

        let catalog = SourceCatalog::new(devices.into_iter().map(CaptureSource::from).collect());
        log::debug!(
            "Enumerated {} video source(s): {:?}",
            catalog.len(),
            catalog.iter().map(|s| s.id.as_str()).collect::<Vec<_>>()
        );
        Ok(catalog)
    }

    async fn enumerate_video(&self) -> Result<Vec<PlatformDevice>, DeviceError> {
        let devices = self.platform.enumerate().await?;
        Ok(devices
            .into_iter()
            .filter(|d| d.kind == MediaKind::Video)
            .collect())
    }

    /// Pick the source to use when nothing has been selected.
    ///
    /// Externally attached hardware is usually enumerated after built-in
    /// cameras, so this returns the last entry. It is a heuristic; callers
    /// must allow a manual override.
    pub fn select_default(catalog: &SourceCatalog) -> Option<CaptureSource> {
        catalog.sources().last().cloned()
    }

    /// Re-enumerate on every hardware change and hand the result to `callback`.
    ///
    /// The returned subscription owns the listener; releasing or dropping it
    /// unsubscribes.
    pub fn watch_topology_changes<F>(&self, mut callback: F) -> TopologySubscription
    where
        F: FnMut(TopologyUpdate) + Send + 'static,
    {
        let mut events = self.platform.subscribe();
        let registry = self.clone();
        let mut ticker = self.refresh_interval.map(|period| {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval
        });

        let handle = tokio::spawn(async move {
            loop {
                let auto_select = tokio::select! {
                    event = events.recv() => match event {
                        Ok(event) => {
                            log::info!("Hardware topology changed: {}", event);
                            true
                        }
                        Err(RecvError::Lagged(missed)) => {
                            log::warn!("Missed {} topology events, refreshing", missed);
                            true
                        }
                        Err(RecvError::Closed) => break,
                    },
                    _ = next_tick(&mut ticker) => false,
                };

                let catalog = registry.list_sources().await;
                callback(TopologyUpdate {
                    catalog,
                    auto_select,
                });
            }
            log::debug!("Topology event source closed");
        });

        TopologySubscription {
            handle: Some(handle),
        }
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => future::pending().await,
    }
}

/// A scoped topology listener.
///
/// The listener stops when the subscription is released or dropped.
#[derive(Debug)]
pub struct TopologySubscription {
    handle: Option<JoinHandle<()>>,
}

impl TopologySubscription {
    /// Stop listening and wait until the listener is gone.
    pub async fn release(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            let _ = handle.await;
        }
    }

    pub fn is_active(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for TopologySubscription {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
