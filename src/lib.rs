pub mod audio;
pub mod capture;
pub mod config;
pub mod error;
pub mod live;
pub mod memory;
pub mod session;
pub mod tools;

// Re-export commonly used items for convenience
pub use audio::{AudioLevels, PlaybackScheduler, VolumeMeter};
pub use config::{CaptureConfig, LiveConfig};
pub use error::{ClientError, ClientResult};
pub use live::{LiveConnector, LiveEvent, WsConnector};
pub use memory::{Memory, MemoryStore};
pub use session::{SessionDeps, SessionManager, SessionState, SessionUpdate};
pub use tools::{ToolDispatcher, ToolEffect, ToolKind};
