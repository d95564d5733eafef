//! CLI command handlers.

pub mod config;
pub mod daemon;
pub mod info;
pub mod run;
pub mod status;

pub use config::{run_config_check, run_config_show};
pub use daemon::run_daemon_command;
pub use info::run_info;
pub use run::run_once;
pub use status::run_status;
