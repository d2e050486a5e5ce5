//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use glasscam::{
    AnalysisClient, AnalysisRequest, ClientError, Coordinator, CoordinatorSettings,
    DevicePlatform, SessionState, SimulatedPlatform,
};
use tokio::sync::watch;

/// Analysis client answering every request with the same text.
pub struct FixedClient {
    text: String,
    requests: Mutex<Vec<AnalysisRequest>>,
}

impl FixedClient {
    pub fn new(text: &str) -> Arc<Self> {
        Arc::new(Self {
            text: text.to_string(),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<AnalysisRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl AnalysisClient for FixedClient {
    async fn describe(&self, request: &AnalysisRequest) -> Result<String, ClientError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(self.text.clone())
    }
}

pub fn coordinator(platform: &Arc<SimulatedPlatform>) -> Coordinator {
    coordinator_with(platform, CoordinatorSettings::default())
}

pub fn coordinator_with(
    platform: &Arc<SimulatedPlatform>,
    settings: CoordinatorSettings,
) -> Coordinator {
    Coordinator::new(
        Arc::clone(platform) as Arc<dyn DevicePlatform>,
        FixedClient::new("A person holding a coffee mug."),
        settings,
    )
}

/// Wait until the session state satisfies `predicate`, failing after 5s.
pub async fn wait_for_state(
    rx: &mut watch::Receiver<SessionState>,
    predicate: impl FnMut(&SessionState) -> bool,
) -> SessionState {
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(predicate))
        .await
        .expect("timed out waiting for session state")
        .expect("controller dropped")
        .clone()
}
