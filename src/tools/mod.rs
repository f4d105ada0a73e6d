//! Tool registry: the named operations the remote model may invoke.
//!
//! The set is closed. Every tool is a [`ToolKind`] variant with a wire
//! name, an advertised declaration, and a required handler arm in the
//! dispatcher; adding or removing one is a compile-checked change. A name
//! arriving off the wire that does not parse is answered with an error
//! result, never silently dropped.

pub mod dispatch;

pub use dispatch::{
    DeviceCommandSink, DispatchOutcome, HealthReader, HealthSnapshot, StaticHealth, StressLevel,
    ToolDispatcher, ToolEffect,
};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Every operation the model may invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    RememberInfo,
    ControlDevice,
    ControlDesktop,
    GetHealthStatus,
    ScanBluetoothDevices,
    ManageWifi,
    CheckDrivers,
    StartDownload,
    ManageTasks,
    SetMood,
    ToggleCamera,
}

impl ToolKind {
    /// All tools, in advertisement order.
    pub const ALL: [ToolKind; 11] = [
        ToolKind::RememberInfo,
        ToolKind::ControlDevice,
        ToolKind::ControlDesktop,
        ToolKind::GetHealthStatus,
        ToolKind::ScanBluetoothDevices,
        ToolKind::ManageWifi,
        ToolKind::CheckDrivers,
        ToolKind::StartDownload,
        ToolKind::ManageTasks,
        ToolKind::SetMood,
        ToolKind::ToggleCamera,
    ];

    /// Wire name.
    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::RememberInfo => "remember_info",
            ToolKind::ControlDevice => "control_device",
            ToolKind::ControlDesktop => "control_desktop",
            ToolKind::GetHealthStatus => "get_health_status",
            ToolKind::ScanBluetoothDevices => "scan_bluetooth_devices",
            ToolKind::ManageWifi => "manage_wifi",
            ToolKind::CheckDrivers => "check_drivers",
            ToolKind::StartDownload => "start_download",
            ToolKind::ManageTasks => "manage_tasks",
            ToolKind::SetMood => "set_mood",
            ToolKind::ToggleCamera => "toggle_camera",
        }
    }

    /// Parse a wire name. `None` means the model asked for something we
    /// never advertised.
    pub fn parse(name: &str) -> Option<ToolKind> {
        Self::ALL.iter().copied().find(|kind| kind.name() == name)
    }

    /// Declaration advertised to the remote session at setup.
    pub fn declaration(&self) -> ToolDeclaration {
        let (description, parameters) = match self {
            ToolKind::RememberInfo => (
                "Save a new fact, preference, or important detail about the user to your long-term memory.",
                json!({
                    "type": "OBJECT",
                    "properties": {
                        "info": {"type": "STRING", "description": "The specific information to remember."}
                    },
                    "required": ["info"]
                }),
            ),
            ToolKind::ControlDevice => (
                "Control smart home devices or system settings.",
                json!({
                    "type": "OBJECT",
                    "properties": {
                        "device_id": {"type": "STRING", "description": "The ID or name of the device."},
                        "action": {"type": "STRING", "description": "The action to perform."}
                    },
                    "required": ["device_id", "action"]
                }),
            ),
            ToolKind::ControlDesktop => (
                "Control desktop environment, manage applications, and optimize system performance.",
                json!({
                    "type": "OBJECT",
                    "properties": {
                        "action": {
                            "type": "STRING",
                            "description": "Action: 'turn_on_focus_mode', 'turn_off_focus_mode', 'open_app', 'close_app', 'set_performance_mode', 'kill_process', 'set_priority'."
                        },
                        "app_name": {
                            "type": "STRING",
                            "description": "Name of application (e.g., 'Browser', 'Spotify', 'VS Code'). Required for open/close/kill."
                        },
                        "mode": {
                            "type": "STRING",
                            "description": "For performance: 'high_performance', 'balanced', 'power_saver'. For priority: the level."
                        }
                    },
                    "required": ["action"]
                }),
            ),
            ToolKind::GetHealthStatus => (
                "Retrieve the user's current health metrics (heart rate, steps, sleep) from their smart watch.",
                json!({"type": "OBJECT", "properties": {}}),
            ),
            ToolKind::ScanBluetoothDevices => (
                "Scan for and connect to nearby Bluetooth devices like headphones, speakers, or TVs.",
                json!({"type": "OBJECT", "properties": {}}),
            ),
            ToolKind::ManageWifi => (
                "Manage Wi-Fi: scan for networks, connect, disconnect, or report status.",
                json!({
                    "type": "OBJECT",
                    "properties": {
                        "action": {"type": "STRING", "description": "'scan', 'connect', 'disconnect', or 'status'."},
                        "network_name": {"type": "STRING", "description": "Network to connect to. Required for connect."}
                    },
                    "required": ["action"]
                }),
            ),
            ToolKind::CheckDrivers => (
                "Check for or apply device driver updates.",
                json!({
                    "type": "OBJECT",
                    "properties": {
                        "action": {"type": "STRING", "description": "'check' or 'update'."}
                    },
                    "required": ["action"]
                }),
            ),
            ToolKind::StartDownload => (
                "Start downloading a file for the user.",
                json!({
                    "type": "OBJECT",
                    "properties": {
                        "target": {"type": "STRING", "description": "URL or name of the file to download."}
                    },
                    "required": ["target"]
                }),
            ),
            ToolKind::ManageTasks => (
                "Manage the user's task list: add, complete, or list tasks.",
                json!({
                    "type": "OBJECT",
                    "properties": {
                        "action": {"type": "STRING", "description": "'add', 'complete', or 'list'."},
                        "task": {"type": "STRING", "description": "Task text. Required for add and complete."}
                    },
                    "required": ["action"]
                }),
            ),
            ToolKind::SetMood => (
                "Set your current mood tag, reflected in the companion's avatar.",
                json!({
                    "type": "OBJECT",
                    "properties": {
                        "mood": {"type": "STRING", "description": "A short mood tag like 'cheerful', 'focused', 'concerned'."}
                    },
                    "required": ["mood"]
                }),
            ),
            ToolKind::ToggleCamera => (
                "Turn the local camera on or off when you need to see the user.",
                json!({
                    "type": "OBJECT",
                    "properties": {
                        "enabled": {"type": "BOOLEAN", "description": "true to turn the camera on, false to turn it off."}
                    },
                    "required": ["enabled"]
                }),
            ),
        };
        ToolDeclaration {
            name: self.name().to_string(),
            description: description.to_string(),
            parameters,
        }
    }

    /// Declarations for the whole registry, advertisement order.
    pub fn declarations() -> Vec<ToolDeclaration> {
        Self::ALL.iter().map(|kind| kind.declaration()).collect()
    }
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A function declaration as advertised in session setup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// A tool call received from the remote session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolInvocation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

/// The mandatory reply to one invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub response: Value,
}

impl ToolResult {
    /// Successful outcome carrying a result string.
    pub fn ok(invocation: &ToolInvocation, result: impl Into<String>) -> Self {
        Self {
            id: invocation.id.clone(),
            name: invocation.name.clone(),
            response: json!({"result": result.into()}),
        }
    }

    /// Failed outcome. The error description travels back to the model so
    /// it can react; the session keeps running either way.
    pub fn error(invocation: &ToolInvocation, message: impl Into<String>) -> Self {
        Self {
            id: invocation.id.clone(),
            name: invocation.name.clone(),
            response: json!({"error": message.into()}),
        }
    }

    /// Whether this result carries an error payload.
    pub fn is_error(&self) -> bool {
        self.response.get("error").is_some()
    }
}
