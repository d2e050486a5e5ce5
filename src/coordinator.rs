//! Wires discovery, session control, capture and analysis together.
//!
//! The [`Coordinator`] is the only writer of the observables handed to the
//! rendering layer. Every failure is caught here, published as `last_error`,
//! and leaves the session `Idle` or `Failed`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::watch;

use crate::analysis::{
    AnalysisClient, AnalysisFailure, AnalysisOutcome, AnalysisRequester,
    DEFAULT_ANALYSIS_TIMEOUT, DEFAULT_INSTRUCTION,
};
use crate::capture::{CaptureError, FrameCapture, DEFAULT_JPEG_QUALITY};
use crate::controller::{AcquireError, FailureReason, SessionState, StreamController};
use crate::platform::{DevicePlatform, Resolution, SourceId};
use crate::registry::{
    DeviceError, DeviceRegistry, SourceCatalog, TopologySubscription, TopologyUpdate,
};

/// Any failure surfaced to the rendering layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Acquire(#[from] FailureReason),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Analysis(#[from] AnalysisFailure),

    #[error("Unknown video source: {0}")]
    UnknownSource(SourceId),
}

/// Tunables for a [`Coordinator`].
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub preferred_resolution: Resolution,
    pub instruction: String,
    /// Source to select whenever it is present, overriding the default pick.
    pub source: Option<SourceId>,
    pub mirror: bool,
    pub refresh_interval: Option<Duration>,
    pub analysis_timeout: Duration,
    pub jpeg_quality: u8,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            preferred_resolution: Resolution::MEDIUM,
            instruction: DEFAULT_INSTRUCTION.to_string(),
            source: None,
            mirror: false,
            refresh_interval: None,
            analysis_timeout: DEFAULT_ANALYSIS_TIMEOUT,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

/// Read-only views for the rendering layer.
#[derive(Debug, Clone)]
pub struct Observables {
    pub source_catalog: watch::Receiver<SourceCatalog>,
    pub selected_source_id: watch::Receiver<Option<SourceId>>,
    pub session_state: watch::Receiver<SessionState>,
    pub last_analysis_outcome: watch::Receiver<Option<AnalysisOutcome>>,
    pub last_error: watch::Receiver<Option<CoreError>>,
}

struct CoordinatorInner {
    registry: DeviceRegistry,
    controller: StreamController,
    capture: FrameCapture,
    requester: AnalysisRequester,
    preferred_resolution: Resolution,
    instruction: String,
    preferred_source: Option<SourceId>,
    catalog_tx: watch::Sender<SourceCatalog>,
    selected_tx: watch::Sender<Option<SourceId>>,
    outcome_tx: watch::Sender<Option<AnalysisOutcome>>,
    error_tx: watch::Sender<Option<CoreError>>,
    subscription: Mutex<Option<TopologySubscription>>,
    /// Count of catalogs delivered by the topology watch.
    topology_updates: AtomicU64,
}

/// Owns the core components and drives them from user actions and hot-plug.
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<CoordinatorInner>,
}

impl Coordinator {
    pub fn new(
        platform: Arc<dyn DevicePlatform>,
        client: Arc<dyn AnalysisClient>,
        settings: CoordinatorSettings,
    ) -> Self {
        let registry = DeviceRegistry::new(Arc::clone(&platform))
            .with_refresh_interval(settings.refresh_interval);
        let requester = AnalysisRequester::new(client)
            .with_timeout(settings.analysis_timeout)
            .with_jpeg_quality(settings.jpeg_quality);

        Self {
            inner: Arc::new(CoordinatorInner {
                registry,
                controller: StreamController::new(platform),
                capture: FrameCapture::new().with_mirror(settings.mirror),
                requester,
                preferred_resolution: settings.preferred_resolution,
                instruction: settings.instruction,
                preferred_source: settings.source,
                catalog_tx: watch::channel(SourceCatalog::default()).0,
                selected_tx: watch::channel(None).0,
                outcome_tx: watch::channel(None).0,
                error_tx: watch::channel(None).0,
                subscription: Mutex::new(None),
                topology_updates: AtomicU64::new(0),
            }),
        }
    }

    /// Start following hot-plug, then enumerate, auto-select and acquire.
    ///
    /// The topology watch is installed first, so a camera attached while the
    /// initial acquisition is in flight is picked up, and plugging one in
    /// after a failed start recovers.
    pub async fn start(&self) -> Result<(), CoreError> {
        self.follow_topology().await;

        let seen = self.inner.topology_updates.load(Ordering::SeqCst);
        let catalog = self.inner.registry.list_sources().await;
        if self.inner.topology_updates.load(Ordering::SeqCst) != seen {
            log::debug!("Initial enumeration overtaken by a topology refresh");
            return Ok(());
        }
        self.apply_update(catalog, true).await.map(|_| ())
    }

    async fn follow_topology(&self) {
        let weak: Weak<CoordinatorInner> = Arc::downgrade(&self.inner);
        let subscription = self.inner.registry.watch_topology_changes(move |update| {
            if let Some(inner) = weak.upgrade() {
                let coordinator = Coordinator { inner };
                tokio::spawn(async move { coordinator.handle_topology(update).await });
            }
        });
        let previous = self
            .inner
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(subscription);
        if let Some(previous) = previous {
            previous.release().await;
        }
    }

    /// Manual refresh: re-enumerate and retry acquisition if not live.
    pub async fn refresh(&self) -> Result<SourceCatalog, CoreError> {
        log::info!("Refreshing video sources");
        self.apply_update(self.inner.registry.list_sources().await, true)
            .await
    }

    /// React to a catalog delivered by the topology watch.
    pub async fn handle_topology(&self, update: TopologyUpdate) {
        self.inner.topology_updates.fetch_add(1, Ordering::SeqCst);
        // Errors are already published as last_error
        let _ = self.apply_update(update.catalog, update.auto_select).await;
    }

    /// Manually switch to `source_id`.
    ///
    /// # Errors
    /// * `CoreError::UnknownSource` - the id is not in the current catalog
    /// * `CoreError::Acquire` - the source could not be acquired
    pub async fn select_source(&self, source_id: SourceId) -> Result<(), CoreError> {
        if !self.inner.catalog_tx.borrow().contains(&source_id) {
            let err = CoreError::UnknownSource(source_id);
            self.publish_error(err.clone());
            return Err(err);
        }
        log::info!("Selecting {}", source_id);
        self.inner.selected_tx.send_replace(Some(source_id.clone()));
        self.acquire(source_id).await
    }

    /// Capture the live frame and describe it.
    ///
    /// Analysis failures come back as `Ok(AnalysisOutcome::Failure(_))`; only
    /// capture problems are errors.
    pub async fn capture_and_analyze(&self) -> Result<AnalysisOutcome, CoreError> {
        let still = match self.inner.capture.capture(&self.inner.controller) {
            Ok(still) => still,
            Err(e) => {
                let err = CoreError::Capture(e);
                self.publish_error(err.clone());
                return Err(err);
            }
        };

        let outcome = self
            .inner
            .requester
            .analyze(still, &self.inner.instruction)
            .await;
        match &outcome {
            AnalysisOutcome::Failure(failure) => {
                self.publish_error(CoreError::Analysis(failure.clone()))
            }
            AnalysisOutcome::Text(_) => {
                self.inner.error_tx.send_replace(None);
            }
        }
        self.inner.outcome_tx.send_replace(Some(outcome.clone()));
        Ok(outcome)
    }

    /// Stop following hot-plug and release the camera.
    pub async fn shutdown(&self) {
        let subscription = self
            .inner
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(subscription) = subscription {
            subscription.release().await;
        }
        self.inner.controller.release();
        log::info!("Coordinator shut down");
    }

    pub fn observables(&self) -> Observables {
        Observables {
            source_catalog: self.inner.catalog_tx.subscribe(),
            selected_source_id: self.inner.selected_tx.subscribe(),
            session_state: self.inner.controller.subscribe(),
            last_analysis_outcome: self.inner.outcome_tx.subscribe(),
            last_error: self.inner.error_tx.subscribe(),
        }
    }

    pub fn session_state(&self) -> SessionState {
        self.inner.controller.current_state()
    }

    pub fn catalog(&self) -> SourceCatalog {
        self.inner.catalog_tx.borrow().clone()
    }

    pub fn selected_source(&self) -> Option<SourceId> {
        self.inner.selected_tx.borrow().clone()
    }

    pub fn is_following_topology(&self) -> bool {
        self.inner
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(TopologySubscription::is_active)
    }

    async fn apply_update(
        &self,
        catalog: Result<SourceCatalog, DeviceError>,
        auto_select: bool,
    ) -> Result<SourceCatalog, CoreError> {
        let catalog = match catalog {
            Ok(catalog) => catalog,
            Err(e) => {
                self.handle_device_error(&e);
                return Err(CoreError::Device(e));
            }
        };
        self.inner.catalog_tx.send_replace(catalog.clone());

        let selected = self.selected_source();
        let selection_present = selected.as_ref().is_some_and(|id| catalog.contains(id));
        let target = if auto_select || !selection_present {
            self.pick_source(&catalog)
        } else {
            selected.clone()
        };
        let Some(target) = target else {
            return Ok(catalog);
        };

        let needs_acquire = match self.inner.controller.current_state().source_id() {
            Some(current) => current != &target,
            None => auto_select || selected.as_ref() != Some(&target),
        };
        self.inner.selected_tx.send_replace(Some(target.clone()));

        if needs_acquire {
            self.acquire(target).await?;
        }
        Ok(catalog)
    }

    /// Configured source when attached, otherwise the registry default.
    fn pick_source(&self, catalog: &SourceCatalog) -> Option<SourceId> {
        if let Some(preferred) = &self.inner.preferred_source {
            if catalog.contains(preferred) {
                return Some(preferred.clone());
            }
            log::debug!("Configured source {} is not attached", preferred);
        }
        DeviceRegistry::select_default(catalog).map(|source| source.id)
    }

    async fn acquire(&self, source_id: SourceId) -> Result<(), CoreError> {
        match self
            .inner
            .controller
            .acquire(source_id, self.inner.preferred_resolution)
            .await
        {
            Ok(()) => {
                self.inner.error_tx.send_replace(None);
                Ok(())
            }
            // A newer request owns the state now
            Err(AcquireError::Superseded) => Ok(()),
            Err(AcquireError::Failed(reason)) => {
                let err = CoreError::Acquire(reason);
                self.publish_error(err.clone());
                Err(err)
            }
        }
    }

    fn handle_device_error(&self, err: &DeviceError) {
        match err {
            DeviceError::NoSourcesFound => {
                self.inner.catalog_tx.send_replace(SourceCatalog::default());
                self.inner.selected_tx.send_replace(None);
                self.inner.controller.release();
            }
            DeviceError::PermissionDenied => {
                self.inner.controller.fail(FailureReason::PermissionDenied);
            }
            DeviceError::EnumerationFailed(_) => {}
        }
        self.publish_error(CoreError::Device(err.clone()));
    }

    fn publish_error(&self, err: CoreError) {
        log::warn!("{}", err);
        self.inner.error_tx.send_replace(Some(err));
    }
}
