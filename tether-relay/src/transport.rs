use tether_proto::{CloseReason, Eid, SubChannel};

/// The pub/sub transport the relay sits on top of.
///
/// Both calls are made while the relay holds its registry lock, so they must
/// not block: queue the work and return.
pub trait Transport: Send + Sync + 'static {
    /// Deliver `payload` to `recipient` so that it appears to come from `sender`.
    fn forward_as_sender(&self, payload: Vec<u8>, recipient: Eid, sender: Eid, sub_channel: SubChannel);

    /// Terminate the connection `eid`, telling the remote side why.
    fn force_close(&self, reason: CloseReason, eid: Eid);
}
