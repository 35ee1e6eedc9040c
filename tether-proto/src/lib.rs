//! Wire types shared by the tether relay and its clients.

pub mod close;
pub mod ids;
pub mod relay;

pub use close::{CloseReason, Side};
pub use ids::{Eid, ParseEidError, SubChannel, RELAY_EID};
pub use relay::{RelayMessage, Role};
