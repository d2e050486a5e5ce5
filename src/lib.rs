//! glasscam library crate.
//!
//! Capture-device lifecycle for a tethered camera: source discovery and
//! hot-plug ([`registry`]), the session state machine ([`controller`]),
//! still capture ([`capture`]) and remote frame description ([`analysis`]),
//! tied together by the [`coordinator`].

pub mod analysis;
pub mod capture;
pub mod config;
pub mod controller;
pub mod coordinator;
pub mod platform;
pub mod registry;

pub use analysis::{
    AnalysisClient, AnalysisFailure, AnalysisOutcome, AnalysisRequest, AnalysisRequester,
    ClientError, HttpAnalysisClient,
};
pub use capture::{CaptureError, FrameCapture, StillFrame};
pub use controller::{AcquireError, FailureReason, SessionState, StreamController};
pub use coordinator::{Coordinator, CoordinatorSettings, CoreError, Observables};
pub use platform::{
    DevicePlatform, PlatformError, Resolution, SimulatedPlatform, SourceId, StreamHandle,
};
pub use registry::{
    CaptureSource, DeviceError, DeviceRegistry, SourceCatalog, TopologySubscription,
    TopologyUpdate,
};
