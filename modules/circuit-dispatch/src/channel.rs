//! One-shot acknowledgement handle given to a store for one action.

use tokio::sync::oneshot;

/// How a store finished processing an action.
pub(crate) type Outcome = std::result::Result<(), anyhow::Error>;

/// Resolve with [`Channel::ack`] on success or [`Channel::nack`] on failure.
///
/// Both consume the channel, so it resolves at most once. It may be moved
/// into a spawned task and resolved after arbitrary async work. Dropping it
/// unresolved counts as a nack. Holding it forever stalls the dispatcher:
/// there is no timeout.
#[derive(Debug)]
#[must_use = "a store must ack or nack its channel"]
pub struct Channel {
    tx: oneshot::Sender<Outcome>,
}

impl Channel {
    pub(crate) fn new() -> (Self, oneshot::Receiver<Outcome>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    pub fn ack(self) {
        // Receiver only goes away when the dispatcher itself is gone.
        let _ = self.tx.send(Ok(()));
    }

    pub fn nack(self, error: impl Into<anyhow::Error>) {
        let _ = self.tx.send(Err(error.into()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio_test::block_on;

    #[test]
    fn ack_resolves_receiver() {
        let (channel, rx) = Channel::new();
        channel.ack();
        assert!(block_on(rx).unwrap().is_ok());
    }

    #[test]
    fn nack_carries_error() {
        let (channel, rx) = Channel::new();
        channel.nack(anyhow::anyhow!("disk full"));
        let err = block_on(rx).unwrap().unwrap_err();
        assert_eq!(err.to_string(), "disk full");
    }

    #[test]
    fn dropped_channel_closes_receiver() {
        let (channel, rx) = Channel::new();
        drop(channel);
        assert!(block_on(rx).is_err());
    }
}
