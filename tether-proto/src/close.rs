use std::fmt;

use serde::{Deserialize, Serialize};

/// Which end of a pairing went away first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Viewer,
    Device,
}

/// Why the relay closed a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "side", rename_all = "snake_case")]
pub enum CloseReason {
    /// Malformed pairing request, e.g. an unparseable target id.
    InvalidRequest,
    /// Requested device is not registered.
    UnknownDevice,
    /// Requested device is already bound to another viewer.
    DeviceLocked,
    /// Relay-addressed message from something that is not a registered device.
    ProtocolViolation,
    /// The paired endpoint on `Side` disconnected.
    CounterpartClosed(Side),
}

impl CloseReason {
    /// WebSocket close code (private-use range 4000-4999).
    pub fn code(self) -> u16 {
        match self {
            CloseReason::InvalidRequest => 4400,
            CloseReason::ProtocolViolation => 4403,
            CloseReason::UnknownDevice => 4404,
            CloseReason::DeviceLocked => 4409,
            CloseReason::CounterpartClosed(_) => 4410,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CloseReason::InvalidRequest => "invalid_request",
            CloseReason::ProtocolViolation => "Invalid use",
            CloseReason::UnknownDevice => "unknown_device",
            CloseReason::DeviceLocked => "device_locked",
            CloseReason::CounterpartClosed(Side::Viewer) => "counterpart closed — viewer side",
            CloseReason::CounterpartClosed(Side::Device) => "counterpart closed — device side",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k9::assert_equal;

    #[test]
    fn unknown_and_locked_are_distinguishable() {
        assert!(CloseReason::UnknownDevice.code() != CloseReason::DeviceLocked.code());
        assert!(CloseReason::UnknownDevice.as_str() != CloseReason::DeviceLocked.as_str());
    }

    #[test]
    fn counterpart_reason_names_the_side() {
        assert!(CloseReason::CounterpartClosed(Side::Viewer)
            .as_str()
            .ends_with("viewer side"));
        assert!(CloseReason::CounterpartClosed(Side::Device)
            .as_str()
            .ends_with("device side"));
    }

    #[test]
    fn close_reason_fits_in_a_close_frame() {
        // RFC 6455 caps the close reason at 123 bytes.
        for reason in [
            CloseReason::InvalidRequest,
            CloseReason::UnknownDevice,
            CloseReason::DeviceLocked,
            CloseReason::ProtocolViolation,
            CloseReason::CounterpartClosed(Side::Viewer),
            CloseReason::CounterpartClosed(Side::Device),
        ] {
            assert!(reason.as_str().len() <= 123);
        }
        assert_equal!(CloseReason::ProtocolViolation.to_string(), "Invalid use");
    }
}
