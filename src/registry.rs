use std::sync::Arc;

use dashmap::{mapref::entry::Entry, DashMap};
use log::{debug, trace};

use crate::{
    config::Config,
    controller::{BandwidthController, EstimateHandler, PeerId, RefreshOutcome},
    error::*,
    time::{MonotonicClock, TimeSource},
};

/// The controllers belonging to one local session, keyed by remote peer.
///
/// Only routing lives here: every controller keeps its own lock and window, and holding an
/// `Arc` to one keeps it usable after it's removed from the table.
pub struct Session {
    config: Config,
    clock: Arc<dyn TimeSource>,
    controllers: DashMap<PeerId, Arc<BandwidthController>>,
}

impl Session {
    pub fn new(config: Config) -> Result<Self> {
        Self::with_clock(config, Arc::new(MonotonicClock::new()))
    }

    pub fn with_clock(config: Config, clock: Arc<dyn TimeSource>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            clock,
            controllers: DashMap::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Set up bandwidth estimation for a newly connected peer.
    pub fn create_controller(
        &self,
        peer: PeerId,
        handler: impl EstimateHandler + 'static,
    ) -> Result<Arc<BandwidthController>> {
        // Note that the entry holds a write lock on its shard until it's dropped
        match self.controllers.entry(peer) {
            Entry::Occupied(_) => Err(Error::PeerExists(peer)),
            Entry::Vacant(entry) => {
                let controller = Arc::new(BandwidthController::with_clock(
                    peer,
                    self.config.clone(),
                    handler,
                    Arc::clone(&self.clock),
                )?);
                entry.insert(Arc::clone(&controller));
                Ok(controller)
            }
        }
    }

    /// Stop estimating for a peer whose connection went away.
    pub fn destroy_controller(&self, peer: PeerId) -> Result<()> {
        let (_, controller) = self
            .controllers
            .remove(&peer)
            .ok_or(Error::UnknownPeer(peer))?;
        debug!("Peer #{}: controller removed from session", peer);
        match Arc::try_unwrap(controller) {
            Ok(controller) => controller.destroy(),
            Err(controller) => debug!(
                "Peer #{}: controller released, {} references still held elsewhere",
                peer,
                Arc::strong_count(&controller) - 1
            ),
        }
        Ok(())
    }

    pub fn controller(&self, peer: PeerId) -> Option<Arc<BandwidthController>> {
        self.controllers
            .get(&peer)
            .map(|controller| Arc::clone(controller.value()))
    }

    pub fn add_lost(&self, peer: PeerId, bytes: u32) -> Result<()> {
        self.get(peer)?.add_lost(bytes)
    }

    pub fn add_recv(&self, peer: PeerId, bytes: u32) -> Result<()> {
        self.get(peer)?.add_recv(bytes)
    }

    /// Refresh every controller and return the peers whose estimate changed.
    ///
    /// Handlers run on the calling thread, one after the other.
    pub fn refresh_all(&self) -> Vec<(PeerId, f32)> {
        // Snapshot first so no shard lock is held while handlers run
        let controllers: Vec<_> = self
            .controllers
            .iter()
            .map(|controller| Arc::clone(controller.value()))
            .collect();

        let changed: Vec<_> = controllers
            .iter()
            .filter_map(|controller| match controller.refresh() {
                RefreshOutcome::Changed(bandwidth) => Some((controller.peer(), bandwidth)),
                _ => None,
            })
            .collect();

        trace!(
            "refreshed {} controllers, {} changed",
            controllers.len(),
            changed.len()
        );
        changed
    }

    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }

    fn get(&self, peer: PeerId) -> Result<Arc<BandwidthController>> {
        self.controller(peer).ok_or(Error::UnknownPeer(peer))
    }
}
