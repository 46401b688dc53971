//! CLI command implementations.
//!
//! | Module   | Commands handled |
//! |----------|------------------|
//! | `serve`  | `Serve`          |
//! | `watch`  | `Watch`          |
//! | `invite` | `Invite`         |
//! | `config` | `Config`         |

pub mod config;
pub mod invite;
pub mod serve;
pub mod watch;

pub use config::cmd_config;
pub use invite::cmd_invite;
pub use serve::cmd_serve;
pub use watch::cmd_watch;
