//! KDL configuration parsing for the job board.
//!
//! The server and CLI read `jobboard.kdl` (every node optional) and then
//! apply `JOBBOARD_*` environment overrides on top.

pub mod board;
pub mod error;

pub use board::{DEFAULT_PATH, JobBoardConfig, LogFormat, parse_config};
pub use error::{ConfigError, ConfigResult};
