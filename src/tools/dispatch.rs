//! Tool dispatch: every invocation in, exactly one result out.
//!
//! The dispatcher matches exhaustively over [`ToolKind`] and never lets a
//! failure go silent: missing arguments, unknown names, and even panicking
//! host callbacks all come back as error results so the remote model is
//! never left blocked on a pending call. Side effects that belong to the
//! session (camera toggling, mood changes) are returned to the caller
//! rather than applied here.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::memory::MemoryStore;
use crate::tools::{ToolInvocation, ToolKind, ToolResult};

/// Single injected callback for every control-type tool.
///
/// The session core holds no device state; the host applies
/// `(target_id, action, extra, extra2)` to whatever it owns. No return
/// value is awaited.
pub trait DeviceCommandSink: Send + Sync {
    fn dispatch(&self, target_id: &str, action: &str, extra: Option<&str>, extra2: Option<&str>);
}

impl<F> DeviceCommandSink for F
where
    F: Fn(&str, &str, Option<&str>, Option<&str>) + Send + Sync,
{
    fn dispatch(&self, target_id: &str, action: &str, extra: Option<&str>, extra2: Option<&str>) {
        self(target_id, action, extra, extra2)
    }
}

/// Stress bucket reported by the smart watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StressLevel {
    Relaxed,
    #[default]
    Normal,
    High,
}

/// Smart-watch metrics read when the health tool fires.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSnapshot {
    pub is_connected: bool,
    pub heart_rate: u32,
    pub steps: u32,
    pub sleep_hours: f32,
    pub blood_oxygen: f32,
    pub stress_level: StressLevel,
    /// Unix milliseconds of the last watch sync
    pub last_sync: u64,
}

impl Default for HealthSnapshot {
    fn default() -> Self {
        Self {
            is_connected: false,
            heart_rate: 0,
            steps: 0,
            sleep_hours: 0.0,
            blood_oxygen: 0.0,
            stress_level: StressLevel::default(),
            last_sync: 0,
        }
    }
}

/// Synchronous read of the current health metrics.
pub trait HealthReader: Send + Sync {
    fn snapshot(&self) -> HealthSnapshot;
}

/// Fixed-snapshot reader for hosts without a watch integration.
#[derive(Debug, Clone, Default)]
pub struct StaticHealth(pub HealthSnapshot);

impl HealthReader for StaticHealth {
    fn snapshot(&self) -> HealthSnapshot {
        self.0
    }
}

/// Session-owned side effects requested by tool handlers.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolEffect {
    /// The model set a new mood tag
    MoodChanged(String),
    /// The model asked to turn camera capture on or off
    CameraToggle(bool),
}

/// Outcome of one invocation batch.
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    /// One result per invocation, order and ids preserved
    pub results: Vec<ToolResult>,
    /// Side effects for the session event loop to apply
    pub effects: Vec<ToolEffect>,
}

/// Maps invocations to handlers over the injected host interfaces.
pub struct ToolDispatcher {
    device_sink: Arc<dyn DeviceCommandSink>,
    health: Arc<dyn HealthReader>,
    memories: MemoryStore,
}

impl ToolDispatcher {
    pub fn new(
        device_sink: Arc<dyn DeviceCommandSink>,
        health: Arc<dyn HealthReader>,
        memories: MemoryStore,
    ) -> Self {
        Self {
            device_sink,
            health,
            memories,
        }
    }

    /// Process one batch. Exactly one result per invocation comes back,
    /// in order, regardless of individual failures.
    pub fn dispatch_batch(&self, invocations: &[ToolInvocation]) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();
        for invocation in invocations {
            let result = match ToolKind::parse(&invocation.name) {
                None => {
                    warn!(name = %invocation.name, "tool call for unknown tool");
                    ToolResult::error(invocation, format!("unknown tool: {}", invocation.name))
                }
                Some(kind) => {
                    let handled = catch_unwind(AssertUnwindSafe(|| {
                        self.handle(kind, invocation, &mut outcome.effects)
                    }))
                    .unwrap_or_else(|_| Err(format!("handler for {kind} panicked")));
                    match handled {
                        Ok(message) => {
                            debug!(tool = %kind, "tool call handled");
                            ToolResult::ok(invocation, message)
                        }
                        Err(message) => {
                            warn!(tool = %kind, error = %message, "tool call failed");
                            ToolResult::error(invocation, message)
                        }
                    }
                }
            };
            outcome.results.push(result);
        }
        outcome
    }

    fn handle(
        &self,
        kind: ToolKind,
        invocation: &ToolInvocation,
        effects: &mut Vec<ToolEffect>,
    ) -> Result<String, String> {
        let args = &invocation.args;
        match kind {
            ToolKind::RememberInfo => {
                let info = require_str(args, "info")?;
                self.memories.append(info);
                Ok("Memory saved.".to_string())
            }
            ToolKind::ControlDevice => {
                let device_id = require_str(args, "device_id")?;
                let action = require_str(args, "action")?;
                self.device_sink.dispatch(device_id, action, None, None);
                Ok(format!("Executed: {action} on {device_id}"))
            }
            ToolKind::ControlDesktop => {
                let action = require_str(args, "action")?;
                let app_name = optional_str(args, "app_name");
                let mode = optional_str(args, "mode");
                // With both present the app goes first and the mode rides
                // along; otherwise whichever exists is the detail.
                let (extra, extra2) = match (app_name, mode) {
                    (Some(app), Some(mode)) => (Some(app), Some(mode)),
                    (Some(app), None) => (Some(app), None),
                    (None, detail) => (detail, None),
                };
                self.device_sink.dispatch("desktop", action, extra, extra2);
                Ok(format!("Desktop action {action} executed."))
            }
            ToolKind::GetHealthStatus => {
                let snapshot = self.health.snapshot();
                if !snapshot.is_connected {
                    return Ok("Smart watch is not connected right now.".to_string());
                }
                serde_json::to_string(&snapshot)
                    .map_err(|e| format!("health serialization failed: {e}"))
            }
            ToolKind::ScanBluetoothDevices => {
                self.device_sink.dispatch("bluetooth", "scan", None, None);
                Ok("Scanning initiated on client.".to_string())
            }
            ToolKind::ManageWifi => {
                let action = require_str(args, "action")?;
                let network = optional_str(args, "network_name");
                if action == "connect" && network.is_none() {
                    return Err("missing required argument: network_name".to_string());
                }
                self.device_sink.dispatch("wifi", action, network, None);
                Ok(format!("Wi-Fi {action} initiated."))
            }
            ToolKind::CheckDrivers => {
                let action = require_str(args, "action")?;
                self.device_sink.dispatch("drivers", action, None, None);
                Ok(format!("Driver {action} started."))
            }
            ToolKind::StartDownload => {
                let target = require_str(args, "target")?;
                self.device_sink
                    .dispatch("downloads", "start", Some(target), None);
                Ok(format!("Download queued: {target}"))
            }
            ToolKind::ManageTasks => {
                let action = require_str(args, "action")?;
                let task = optional_str(args, "task");
                if matches!(action, "add" | "complete") && task.is_none() {
                    return Err("missing required argument: task".to_string());
                }
                self.device_sink.dispatch("tasks", action, task, None);
                Ok("Task list updated.".to_string())
            }
            ToolKind::SetMood => {
                let mood = require_str(args, "mood")?;
                effects.push(ToolEffect::MoodChanged(mood.to_string()));
                Ok(format!("Mood set to {mood}."))
            }
            ToolKind::ToggleCamera => {
                let enabled = require_bool(args, "enabled")?;
                effects.push(ToolEffect::CameraToggle(enabled));
                Ok(if enabled { "Camera on." } else { "Camera off." }.to_string())
            }
        }
    }
}

fn require_str<'a>(args: &'a Map<String, Value>, key: &str) -> Result<&'a str, String> {
    args.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("missing required argument: {key}"))
}

fn optional_str<'a>(args: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn require_bool(args: &Map<String, Value>, key: &str) -> Result<bool, String> {
    args.get(key)
        .and_then(Value::as_bool)
        .ok_or_else(|| format!("missing required argument: {key}"))
}
