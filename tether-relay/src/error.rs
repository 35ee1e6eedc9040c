use tether_proto::{CloseReason, Eid};
use thiserror::Error;

/// Failures of the pure registry operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("endpoint {0} is already registered")]
    AlreadyRegistered(Eid),
    #[error("device {0} is not registered")]
    UnknownDevice(Eid),
    #[error("device {0} is already locked by viewer {1}")]
    AlreadyLocked(Eid, Eid),
    #[error("viewer {0} is already bound to device {1}")]
    ViewerAlreadyBound(Eid, Eid),
}

/// Why a connection was refused or shut down by the relay.
///
/// Every variant is terminal for the connection it names and for nothing else.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PairingError {
    #[error("invalid pairing request: {0}")]
    InvalidRequest(String),
    #[error("device {0} is not registered")]
    UnknownDevice(Eid),
    #[error("device {0} is already paired with another viewer")]
    DeviceLocked(Eid),
    #[error("endpoint {sender} may not send to {recipient} through the relay")]
    ProtocolViolation { sender: Eid, recipient: Eid },
    #[error("endpoint {0} is already known to the relay")]
    DuplicateEid(Eid),
}

impl PairingError {
    pub fn close_reason(&self) -> CloseReason {
        match self {
            PairingError::InvalidRequest(_) => CloseReason::InvalidRequest,
            PairingError::UnknownDevice(_) => CloseReason::UnknownDevice,
            PairingError::DeviceLocked(_) => CloseReason::DeviceLocked,
            PairingError::ProtocolViolation { .. } | PairingError::DuplicateEid(_) => {
                CloseReason::ProtocolViolation
            }
        }
    }
}

impl From<RegistryError> for PairingError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::AlreadyRegistered(eid) => PairingError::DuplicateEid(eid),
            RegistryError::UnknownDevice(eid) => PairingError::UnknownDevice(eid),
            RegistryError::AlreadyLocked(device, _) => PairingError::DeviceLocked(device),
            RegistryError::ViewerAlreadyBound(viewer, _) => PairingError::DuplicateEid(viewer),
        }
    }
}
