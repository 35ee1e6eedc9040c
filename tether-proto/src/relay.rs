use serde::{Deserialize, Serialize};

use crate::ids::{Eid, SubChannel};

/// Role a participant was admitted with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Device,
    Viewer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayMessage {
    /// Relay -> Client: "You are connected as `eid`"
    Welcome { eid: Eid, role: Role },

    /// Client -> Relay: "Deliver this to `to`"
    ///
    /// Devices that are not paired yet address the relay itself (`to == 0`)
    /// and the relay holds on to the message until a viewer attaches.
    Send {
        to: Eid,
        #[serde(default)]
        sub_channel: SubChannel,
        payload: Vec<u8>,
    },

    /// Relay -> Client: "`from` sent you this"
    Deliver {
        from: Eid,
        sub_channel: SubChannel,
        payload: Vec<u8>,
    },

    /// Relay -> Client: "Your connection is about to be closed"
    Close { code: u16, reason: String },

    /// Relay -> Client: "Error / Ack"
    Control { code: u16, message: String },
}

impl RelayMessage {
    pub fn to_json(&self) -> String {
        // Every variant is plain data with string keys; this cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}
