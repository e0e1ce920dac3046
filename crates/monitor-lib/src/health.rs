//! Component health tracking for liveness/readiness probes
//!
//! The collector updates component states as cycles run: a failed spec
//! fetch marks the spec source unhealthy, a degraded usage fetch marks
//! the usage source degraded, and so on. The HTTP layer reads the
//! registry for `/healthz` and `/readyz`.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Health status of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Operational but running on degraded data (e.g. usage queries failing)
    Degraded,
    Unhealthy,
}

/// Snapshot of one component's health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Milliseconds since epoch of the last state change
    pub updated_at: i64,
}

impl ComponentHealth {
    fn with_status(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            updated_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn healthy() -> Self {
        Self::with_status(ComponentStatus::Healthy, None)
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self::with_status(ComponentStatus::Degraded, Some(message.into()))
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::with_status(ComponentStatus::Unhealthy, Some(message.into()))
    }
}

/// Component names tracked by the monitor
pub mod components {
    pub const SPEC_SOURCE: &str = "spec_source";
    pub const USAGE_SOURCE: &str = "usage_source";
    pub const STORE: &str = "store";
    pub const COLLECTOR: &str = "collector";
}

/// Aggregated health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: HashMap<String, ComponentHealth>,
}

/// Readiness response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Default)]
struct RegistryState {
    components: HashMap<String, ComponentHealth>,
    ready: bool,
}

/// Shared registry of component health. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    state: Arc<RwLock<RegistryState>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component, initially healthy
    pub fn register(&self, name: &str) {
        let mut state = self.state.write();
        state
            .components
            .insert(name.to_string(), ComponentHealth::healthy());
    }

    pub fn set_healthy(&self, name: &str) {
        let mut state = self.state.write();
        state
            .components
            .insert(name.to_string(), ComponentHealth::healthy());
    }

    pub fn set_degraded(&self, name: &str, message: impl Into<String>) {
        let mut state = self.state.write();
        state
            .components
            .insert(name.to_string(), ComponentHealth::degraded(message));
    }

    pub fn set_unhealthy(&self, name: &str, message: impl Into<String>) {
        let mut state = self.state.write();
        state
            .components
            .insert(name.to_string(), ComponentHealth::unhealthy(message));
    }

    pub fn set_ready(&self, ready: bool) {
        self.state.write().ready = ready;
    }

    /// Overall health: unhealthy dominates, then degraded
    pub fn health(&self) -> HealthResponse {
        let state = self.state.read();
        let mut status = ComponentStatus::Healthy;

        for health in state.components.values() {
            match health.status {
                ComponentStatus::Unhealthy => {
                    status = ComponentStatus::Unhealthy;
                    break;
                }
                ComponentStatus::Degraded => status = ComponentStatus::Degraded,
                ComponentStatus::Healthy => {}
            }
        }

        HealthResponse {
            status,
            components: state.components.clone(),
        }
    }

    pub fn readiness(&self) -> ReadinessResponse {
        if !self.state.read().ready {
            return ReadinessResponse {
                ready: false,
                reason: Some("monitor not yet initialized".to_string()),
            };
        }

        if self.health().status == ComponentStatus::Unhealthy {
            return ReadinessResponse {
                ready: false,
                reason: Some("critical component unhealthy".to_string()),
            };
        }

        ReadinessResponse {
            ready: true,
            reason: None,
        }
    }
}
