//! Functions and types for broadcasting messages to the [`Network`].

use super::{messages::Message, network::Network};

/// Handle for broadcasting messages to the [`Network`].
///
/// It can be used to broadcast instances of any type that implement the [`Into<Message>`] trait.
pub(crate) struct SenderHandle<N: Network> {
    network: N,
}

impl<N: Network> SenderHandle<N> {
    pub(crate) fn new(network: N) -> Self {
        Self { network }
    }

    pub(crate) fn broadcast<S: Into<Message>>(&mut self, msg: S) {
        self.network.broadcast(msg.into())
    }

    pub(crate) fn network(&mut self) -> &mut N {
        &mut self.network
    }
}
