//! dutflash-local - Local implementations of the flash collaborators
//!
//! - [`LocalBuildResolver`]: builds published under `<root>/<branch>/<number>/`
//! - [`CommandDevice`]: device reached through external tools
//! - [`JsonPropertyStore`]: one JSON document per device
//! - [`FileTracker`]: tracking handoff file, replaced atomically
//! - [`HistoryDir`]: per-serial command history files

mod device;
mod fs;
mod history;
mod properties;
mod resolver;
mod tracker;

pub use device::{failure_from_exit_code, CommandDevice, DeviceCommands};
pub use history::HistoryDir;
pub use properties::JsonPropertyStore;
pub use resolver::{normalize_build_token, LocalBuildResolver, DEFAULT_TOOL_PATH};
pub use tracker::FileTracker;
