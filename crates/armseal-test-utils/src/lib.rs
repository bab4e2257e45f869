//! Testing utilities for the armseal workspace
//!
//! Shared keys, model doubles and fixed clocks.

#![allow(missing_docs)]

use armseal_core::{
    Clock, CompletionRequest, Experiment, ModelRole, ModelService, SeededRandom, UpstreamError,
};
use armseal_token::{SigningKey, MIN_KEY_BYTES};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const TEST_SECRET: &str = "armseal-test-secret-0123456789abcdef";
pub const TEST_NOW_MS: u64 = 1_700_000_000_000;
pub const TEST_SEED: u64 = 7;

pub fn test_key() -> SigningKey {
    SigningKey::from_secret(TEST_SECRET).unwrap()
}

pub fn other_key() -> SigningKey {
    SigningKey::from_secret([0x5a; MIN_KEY_BYTES]).unwrap()
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub u64);

impl Clock for FixedClock {
    fn now_ms(&self) -> u64 {
        self.0
    }
}

/// Wall clock moved only by the test
#[derive(Debug)]
pub struct ManualClock(AtomicU64);

impl ManualClock {
    pub fn new(now_ms: u64) -> Self {
        Self(AtomicU64::new(now_ms))
    }

    pub fn advance(&self, by: Duration) {
        let ms = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        self.0.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Replies with fixed text and records every request it sees
#[derive(Debug, Default)]
pub struct StubModel {
    reply: String,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl StubModel {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().clone()
    }

    /// Instruction text of the most recent request
    pub fn last_system_prompt(&self) -> Option<String> {
        self.requests.lock().last().and_then(|req| {
            req.messages
                .iter()
                .find(|m| m.role == ModelRole::System)
                .map(|m| m.content.clone())
        })
    }
}

#[async_trait]
impl ModelService for StubModel {
    async fn complete(&self, request: CompletionRequest) -> Result<String, UpstreamError> {
        self.requests.lock().push(request);
        Ok(self.reply.clone())
    }
}

/// Always fails with an upstream status error
#[derive(Debug, Clone, Copy)]
pub struct FailingModel {
    pub status: u16,
}

#[async_trait]
impl ModelService for FailingModel {
    async fn complete(&self, _request: CompletionRequest) -> Result<String, UpstreamError> {
        Err(UpstreamError::Status {
            status: self.status,
            message: "model unavailable".to_string(),
            details: Some(serde_json::json!({"error": {"message": "model unavailable"}})),
        })
    }
}

/// Experiment over [`test_key`], a seeded coin and a fixed clock
pub fn experiment_with(model: Arc<dyn ModelService>) -> Experiment {
    Experiment::new(test_key(), model)
        .with_random(Arc::new(SeededRandom::new(TEST_SEED)))
        .with_clock(Arc::new(FixedClock(TEST_NOW_MS)))
}

/// Experiment plus a handle on its stub model
pub fn stub_experiment(reply: &str) -> (Experiment, Arc<StubModel>) {
    let model = Arc::new(StubModel::new(reply));
    (experiment_with(model.clone()), model)
}
