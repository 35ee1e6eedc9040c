//! Holding area for messages a device produces before anyone is watching.

use log::{trace, warn};
use tether_proto::{Eid, SubChannel};

use crate::error::PairingError;
use crate::registry::{DeviceState, SessionRegistry};
use crate::transport::Transport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferedMessage {
    pub sub_channel: SubChannel,
    pub payload: Vec<u8>,
}

/// Append-only queue in arrival order. Consumed whole by [`MessageBuffer::into_messages`].
#[derive(Debug, Default)]
pub struct MessageBuffer {
    messages: Vec<BufferedMessage>,
    bytes: usize,
}

impl MessageBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sub_channel: SubChannel, payload: Vec<u8>) {
        self.bytes += payload.len();
        self.messages.push(BufferedMessage {
            sub_channel,
            payload,
        });
    }

    pub(crate) fn len(&self) -> usize {
        self.messages.len()
    }

    /// Total payload bytes held.
    pub(crate) fn bytes(&self) -> usize {
        self.bytes
    }

    pub fn into_messages(self) -> Vec<BufferedMessage> {
        self.messages
    }
}

/// Handle a message addressed to the relay's control identity.
///
/// Only registered devices may talk to the relay. While the device has no
/// viewer the message is buffered; once it is live the message goes straight
/// to the bound viewer, after anything replayed at pairing time.
pub(crate) fn intercept(
    registry: &mut SessionRegistry,
    transport: &dyn Transport,
    payload: Vec<u8>,
    sender: Eid,
    recipient: Eid,
    sub_channel: SubChannel,
) -> Result<(), PairingError> {
    let violation = PairingError::ProtocolViolation { sender, recipient };
    if !recipient.is_relay() {
        warn!("{sender} sent to {recipient} through the relay control path");
        return Err(violation);
    }
    let Some(device) = registry.lookup_device_mut(sender) else {
        warn!("{sender} is not a registered device but addressed the relay");
        return Err(violation);
    };

    let viewer = device.viewer();
    match device.state_mut() {
        DeviceState::Buffering(buffer) => {
            buffer.push(sub_channel, payload);
            trace!(
                "buffered message for device {sender} sub_channel={sub_channel} pending={}",
                buffer.len()
            );
        }
        DeviceState::Live => match viewer {
            Some(viewer) => transport.forward_as_sender(payload, viewer, sender, sub_channel),
            None => warn!("device {sender} is live without a viewer; dropping message"),
        },
    }
    Ok(())
}
