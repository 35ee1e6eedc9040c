use log::{debug, info};
use tether_proto::{CloseReason, Eid, Side};

use crate::registry::SessionRegistry;
use crate::transport::Transport;

/// What a disconnect tore down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Teardown {
    /// A bound viewer left; its device was closed and unregistered.
    ViewerLeft { viewer: Eid, device: Eid },
    /// A device left; its viewer, if any, was closed and unbound.
    DeviceLeft { device: Eid, viewer: Option<Eid> },
    /// Nothing known about this id.
    Unknown(Eid),
}

/// Clear every trace of `eid` and force-close its counterpart.
///
/// Goes one level deep: the counterpart is removed from the registry here,
/// so its own disconnect event later lands in the `Unknown` branch.
pub(crate) fn propagate(
    registry: &mut SessionRegistry,
    transport: &dyn Transport,
    eid: Eid,
) -> Teardown {
    if let Some(device) = registry.unbind_viewer(eid) {
        registry.unregister_device(device);
        transport.force_close(CloseReason::CounterpartClosed(Side::Viewer), device);
        info!("viewer {eid} disconnected; closed device {device}");
        return Teardown::ViewerLeft { viewer: eid, device };
    }

    if let Some(session) = registry.unregister_device(eid) {
        let viewer = session.viewer();
        match viewer {
            Some(viewer) => {
                transport.force_close(CloseReason::CounterpartClosed(Side::Device), viewer);
                info!("device {eid} disconnected; closed viewer {viewer}");
            }
            None => info!(
                "device {eid} disconnected with {} unread message(s)",
                session.buffered()
            ),
        }
        return Teardown::DeviceLeft { device: eid, viewer };
    }

    debug!("disconnect of unknown endpoint {eid}");
    Teardown::Unknown(eid)
}
