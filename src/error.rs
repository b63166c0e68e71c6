//! Crate-wide error type.
//!
//! Most of the manager's internal bookkeeping (transitions, queues, holds)
//! cannot fail -- invalid calls are logged and tolerated per the propagation
//! policy in the design notes. The cases that *do* surface an error to
//! callers are the ones spec'd explicitly: a coordination-service write that
//! exhausted its retries, a catalog lookup that can't be answered because
//! the meta quorum isn't up yet, and a region transition that is illegal
//! from an unexpected precursor state.

use crate::region::RegionState;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("coordination-service write to {path} failed after {attempts} attempts: {source}")]
    CoordinationWriteFailed {
        path: String,
        attempts: u32,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("not all meta regions online: {reason}")]
    NotAllMetaRegionsOnline { reason: &'static str },

    #[error("illegal transition for region {region}: {from:?} -> {to:?}")]
    IllegalTransition {
        region: String,
        from: RegionState,
        to: RegionState,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
