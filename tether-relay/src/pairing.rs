//! Admission of new connections: devices register, viewers pair.

use std::net::SocketAddr;

use log::{info, warn};
use serde::Deserialize;
use tether_proto::relay::Role;
use tether_proto::Eid;

use crate::error::PairingError;
use crate::registry::SessionRegistry;
use crate::transport::Transport;

/// Connection parameters supplied by the transport, typically the query
/// string of the upgrade request: `?role=device&info=...` or `?target=17`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ConnectParams {
    pub role: Option<String>,
    pub target: Option<String>,
    pub info: Option<String>,
}

impl ConnectParams {
    pub fn device(info: impl Into<String>) -> Self {
        Self {
            role: Some("device".to_string()),
            target: None,
            info: Some(info.into()),
        }
    }

    pub fn viewer(target: impl Into<String>) -> Self {
        Self {
            role: Some("viewer".to_string()),
            target: Some(target.into()),
            info: None,
        }
    }

    /// Anything that does not say `device` is a viewer, but a role we have
    /// never heard of is rejected rather than guessed at.
    pub fn classify(&self) -> Result<Role, PairingError> {
        match self.role.as_deref().map(str::trim) {
            Some("device") => Ok(Role::Device),
            None | Some("") | Some("viewer") | Some("browser") => Ok(Role::Viewer),
            Some(other) => Err(PairingError::InvalidRequest(format!(
                "unknown role {other:?}"
            ))),
        }
    }

    /// The device a viewer asked for.
    pub fn target(&self) -> Result<Eid, PairingError> {
        let raw = self
            .target
            .as_deref()
            .ok_or_else(|| PairingError::InvalidRequest("missing target device".to_string()))?;
        raw.parse()
            .map_err(|e| PairingError::InvalidRequest(format!("bad target device: {e}")))
    }
}

pub(crate) fn attach_device(
    registry: &mut SessionRegistry,
    eid: Eid,
    peer_address: Option<SocketAddr>,
    info: Option<String>,
) -> Result<(), PairingError> {
    registry.register_device(eid, peer_address, info)?;
    info!("device {eid} registered from {peer_address:?}");
    Ok(())
}

/// Pair `viewer` with the device named in `params`.
///
/// Must run under the registry lock: the locked check, the bind and the
/// replay happen as one step, so a second viewer can never see the device
/// unlocked and no device message can overtake the replayed ones.
///
/// Returns the device id and the number of replayed messages.
pub(crate) fn attach_viewer(
    registry: &mut SessionRegistry,
    transport: &dyn Transport,
    viewer: Eid,
    origin: Option<SocketAddr>,
    params: &ConnectParams,
) -> Result<(Eid, usize), PairingError> {
    let target = params.target()?;

    let Some(device) = registry.lookup_device(target) else {
        warn!("viewer {viewer} asked for unknown device {target}");
        return Err(PairingError::UnknownDevice(target));
    };
    if let Some(lock) = device.locked_by() {
        warn!(
            "viewer {viewer} asked for device {target}, already held by viewer {}",
            lock.viewer
        );
        return Err(PairingError::DeviceLocked(target));
    }

    let session = registry.bind_viewer(viewer, origin, target)?;
    let replay = session.take_buffer().unwrap_or_default();
    let replayed = replay.len();
    for msg in replay {
        transport.forward_as_sender(msg.payload, viewer, target, msg.sub_channel);
    }

    info!("viewer {viewer} paired with device {target}, replayed {replayed} message(s)");
    Ok((target, replayed))
}
