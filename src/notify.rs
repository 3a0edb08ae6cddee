use std::{
    pin::Pin,
    task::{Context, Poll},
};

use futures_util::stream::Stream;
use log::trace;
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};

use crate::controller::{BandwidthController, EstimateHandler, PeerId};

/// A new recommendation for one peer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EstimateChange {
    pub peer: PeerId,
    /// Bytes per second
    pub bandwidth: f32,
}

/// Create a handler that forwards estimate changes to an async consumer.
///
/// One handler can be cloned into any number of controllers; the receiver sees the changes of
/// all of them in the order they happened.
pub fn channel() -> (ChannelHandler, EstimateReceiver) {
    let (change_tx, change_rx) = mpsc::unbounded_channel();
    (
        ChannelHandler { change_tx },
        EstimateReceiver { change_rx },
    )
}

#[derive(Debug, Clone)]
pub struct ChannelHandler {
    change_tx: UnboundedSender<EstimateChange>,
}

impl EstimateHandler for ChannelHandler {
    fn on_estimate_changed(&self, _: &BandwidthController, peer: PeerId, bandwidth: f32) {
        // Unbounded, so this never blocks the refreshing thread
        if self
            .change_tx
            .send(EstimateChange { peer, bandwidth })
            .is_err()
        {
            trace!("Peer #{}: estimate receiver dropped, discarding change", peer);
        }
    }
}

#[derive(Debug)]
pub struct EstimateReceiver {
    change_rx: UnboundedReceiver<EstimateChange>,
}

impl EstimateReceiver {
    /// Wait for the next change. Returns `None` once every handler has been dropped.
    pub async fn recv(&mut self) -> Option<EstimateChange> {
        self.change_rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<EstimateChange> {
        match self.change_rx.try_recv() {
            Ok(change) => Some(change),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }
}

impl Stream for EstimateReceiver {
    type Item = EstimateChange;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.change_rx.poll_recv(cx)
    }
}
