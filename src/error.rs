use std::collections::TryReserveError;

use thiserror::Error;

use crate::controller::PeerId;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("byte count {bytes} exceeds the per-event limit of {limit}")]
    ByteCountTooLarge { bytes: u32, limit: u32 },
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    #[error("could not allocate window slots")]
    AllocationFailed(#[from] TryReserveError),
    #[error("a controller for peer {0} already exists")]
    PeerExists(PeerId),
    #[error("no controller registered for peer {0}")]
    UnknownPeer(PeerId),
}
