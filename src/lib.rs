#![warn(rust_2018_idioms)]

pub mod config;
pub mod controller;
pub mod driver;
pub mod error;
pub mod estimator;
pub mod notify;
pub mod policy;
pub mod registry;
pub mod time;
pub mod window;

#[cfg(test)]
mod test_helper;

pub use crate::{
    config::Config,
    controller::{BandwidthController, EstimateHandler, PeerId, RefreshOutcome, Stats},
    registry::Session,
};

// General overview of architecture:
//
// A BandwidthController estimates how much a single remote peer can be sent. The transport
// reports lost and received payload byte counts through add_lost/add_recv, which land in a
// WindowAccumulator: a ring of fixed-duration slots covering the last few seconds.
//
// Something outside the controller (a Session's refresh_all, the optional tokio driver, or the
// host's own poll loop) calls refresh periodically. A refresh reads the loss ratio out of the
// window, feeds it to the AimdPolicy, and reports the new recommendation to the controller's
// EstimateHandler if it moved.
//
// A Session groups the controllers of one local session by peer so the transport can route
// events without holding on to individual controllers.
