//! Tether Relay Server Library
//!
//! Pairs exactly one viewer with exactly one previously registered device on
//! top of a message transport. The relay core ([`Relay`]) only sees three
//! events (connect, relay-addressed message, disconnect) and talks back through
//! the [`Transport`] trait; [`server`] binds it to warp WebSockets.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use log::{debug, error, warn};
use parking_lot::Mutex;
use tether_proto::relay::Role;
use tether_proto::{Eid, SubChannel};

pub mod buffer;
pub mod config;
pub mod error;
pub mod pairing;
pub mod registry;
pub mod server;
pub mod teardown;
pub mod transport;

pub use config::RelayConfig;
pub use error::{PairingError, RegistryError};
pub use pairing::ConnectParams;
pub use registry::{DeviceSummary, SessionRegistry};
pub use teardown::Teardown;
pub use transport::Transport;

/// The pairing relay.
///
/// Every registry read and write happens under one lock, and transport calls
/// made on behalf of a registry change happen under that same lock. That is
/// what makes pairing, replay and teardown atomic with respect to each other.
pub struct Relay {
    registry: Mutex<SessionRegistry>,
    /// Endpoint ids refused as duplicates, with how many of their disconnects
    /// are still owed. Only locked while `registry` is held.
    refused_duplicates: Mutex<HashMap<Eid, usize>>,
    transport: Arc<dyn Transport>,
}

impl Relay {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            registry: Mutex::new(SessionRegistry::new()),
            refused_duplicates: Mutex::new(HashMap::new()),
            transport,
        }
    }

    /// A new connection arrived.
    ///
    /// On `Err` the connection has already been force-closed with the matching
    /// reason and the registry is unchanged.
    pub fn on_connect(
        &self,
        eid: Eid,
        params: &ConnectParams,
        peer_address: Option<SocketAddr>,
    ) -> Result<Role, PairingError> {
        let mut registry = self.registry.lock();
        let result = params.classify().and_then(|role| {
            match role {
                Role::Device => {
                    pairing::attach_device(&mut registry, eid, peer_address, params.info.clone())?
                }
                Role::Viewer => {
                    pairing::attach_viewer(
                        &mut registry,
                        self.transport.as_ref(),
                        eid,
                        peer_address,
                        params,
                    )?;
                }
            }
            Ok(role)
        });

        if let Err(err) = &result {
            match err {
                PairingError::DuplicateEid(_) => {
                    error!("transport reused endpoint id {eid}: {err}");
                    *self.refused_duplicates.lock().entry(eid).or_default() += 1;
                }
                _ => warn!("rejecting connection {eid} from {peer_address:?}: {err}"),
            }
            self.transport.force_close(err.close_reason(), eid);
        }
        result
    }

    /// A message addressed to the relay's own control identity.
    ///
    /// Anything other than a registered device talking to the relay gets its
    /// connection closed with "Invalid use".
    pub fn on_message(
        &self,
        payload: Vec<u8>,
        sender: Eid,
        recipient: Eid,
        sub_channel: SubChannel,
    ) -> Result<(), PairingError> {
        let mut registry = self.registry.lock();
        let result = buffer::intercept(
            &mut registry,
            self.transport.as_ref(),
            payload,
            sender,
            recipient,
            sub_channel,
        );
        if let Err(err) = &result {
            self.transport.force_close(err.close_reason(), sender);
        }
        result
    }

    /// A connection closed, for whatever reason.
    ///
    /// When this returns, neither `eid` nor its counterpart is left in the registry.
    ///
    /// The first disconnect reported for an id that was refused as a duplicate
    /// belongs to the refused connection and leaves the registry alone.
    pub fn on_disconnect(&self, eid: Eid) -> Teardown {
        let mut registry = self.registry.lock();
        {
            let mut refused = self.refused_duplicates.lock();
            if let Some(owed) = refused.get_mut(&eid) {
                *owed -= 1;
                if *owed == 0 {
                    refused.remove(&eid);
                }
                debug!("disconnect of refused duplicate {eid}; registry untouched");
                return Teardown::Unknown(eid);
            }
        }
        teardown::propagate(&mut registry, self.transport.as_ref(), eid)
    }

    /// Whether `a` and `b` are currently bound to each other.
    pub fn is_paired(&self, a: Eid, b: Eid) -> bool {
        self.registry.lock().is_paired(a, b)
    }

    pub fn snapshot(&self) -> Vec<DeviceSummary> {
        self.registry.lock().snapshot()
    }

    /// Run `f` against the registry under the relay lock.
    pub fn inspect<R>(&self, f: impl FnOnce(&SessionRegistry) -> R) -> R {
        f(&self.registry.lock())
    }
}
