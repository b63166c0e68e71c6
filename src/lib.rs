//! Region Manager: a master-side control plane for assigning regions
//! (contiguous shards of a sorted keyspace) to a fleet of region servers,
//! tracking their open/close lifecycle, keeping a root/meta catalog, and
//! balancing load across the fleet on every heartbeat.
//!
//! The crate is organized the way its components are described in the
//! design: a [`transition`] table holding per-region lifecycle state, a
//! [`catalog`] tracker locating the root and meta regions, a
//! [`preferred`] assignment store for planned-restart holds, a
//! [`locality`] tracker for startup locality preferences, a
//! [`balancer`] deciding when an overloaded server should shed regions, an
//! [`assign`] engine tying all of the above together on every heartbeat,
//! per-region [`queues`] of administrative actions, a throttled
//! [`reopener`] registry, and [`scanner`] threads that discover regions on
//! disk. [`manager::RegionManager`] composes all of it into the single type
//! an embedder constructs and drives.

#[macro_use]
extern crate log;

pub mod assign;
pub mod balancer;
pub mod bytekey;
pub mod catalog;
pub mod coordination;
pub mod error;
pub mod locality;
pub mod manager;
pub mod options;
pub mod preferred;
pub mod queues;
pub mod region;
pub mod reopener;
pub mod scanner;
pub mod server;
pub mod transition;

pub use error::{Error, Result};
pub use manager::{RegionManager, RegionManagerBuilder};

/// Installs `env_logger` as the `log` backend, reading filter
/// configuration from `RUST_LOG` as usual. Disabled builds (the
/// `builtin_env_logger` feature off) expect the embedder to install its own
/// subscriber before calling into this crate.
#[cfg(feature = "builtin_env_logger")]
pub fn init_logging() {
    let _ = env_logger::try_init();
}

#[cfg(not(feature = "builtin_env_logger"))]
pub fn init_logging() {}
