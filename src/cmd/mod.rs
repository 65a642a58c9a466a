//! CLI command implementations.
//!
//! | Module      | Commands handled     |
//! |-------------|----------------------|
//! | `run`       | `Run`                |
//! | `catalog`   | `List`               |
//! | `sessions`  | `Sessions`, `Show`   |
//! | `config`    | `Config`             |

pub mod catalog;
pub mod config;
pub mod run;
pub mod sessions;

pub use catalog::cmd_list;
pub use config::cmd_config;
pub use run::{RunOptions, cmd_run};
pub use sessions::{cmd_sessions, cmd_show};
