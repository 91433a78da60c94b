use thiserror::Error;

pub type Result<T> = std::result::Result<T, RootHubError>;

/// Coarse classification of [`RootHubError`], matching the status codes a hub class driver
/// distinguishes between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidParameter,
    NotSupported,
    DeviceGone,
}

/// Errors surfaced synchronously by root hub operations, or delivered as the completion of a
/// parked interrupt request that was cancelled.
///
/// Hardware inconsistencies (a port event for a port no root hub owns) are never returned; the
/// lifecycle manager logs and drops them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RootHubError {
    #[error("invalid port {port} (hub has {port_count} ports)")]
    InvalidPort { port: u16, port_count: usize },

    #[error("unsupported feature selector {feature} for this port")]
    InvalidFeature { feature: u16 },

    #[error("malformed transfer length: {reason}")]
    InvalidLength { reason: &'static str },

    #[error("invalid request value {value:#06x}: {reason}")]
    InvalidValue { value: u16, reason: &'static str },

    #[error("transfer stream {stream} already has a pending interrupt request")]
    DuplicateInterrupt { stream: u32 },

    #[error("transfer stream {stream} is not open")]
    UnknownStream { stream: u32 },

    #[error("unsupported request: bmRequestType={request_type:#04x} bRequest={request:#04x}")]
    NotSupported { request_type: u8, request: u8 },

    #[error("unsupported ioctl {op:#x}")]
    UnsupportedIoctl { op: u32 },

    #[error("operation not supported by this device")]
    UnsupportedOp,

    #[error("root hub has been removed")]
    DeviceGone,
}

impl RootHubError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RootHubError::InvalidPort { .. }
            | RootHubError::InvalidFeature { .. }
            | RootHubError::InvalidLength { .. }
            | RootHubError::InvalidValue { .. }
            | RootHubError::DuplicateInterrupt { .. }
            | RootHubError::UnknownStream { .. } => ErrorKind::InvalidParameter,
            RootHubError::NotSupported { .. }
            | RootHubError::UnsupportedIoctl { .. }
            | RootHubError::UnsupportedOp => ErrorKind::NotSupported,
            RootHubError::DeviceGone => ErrorKind::DeviceGone,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_the_status_taxonomy() {
        assert_eq!(
            RootHubError::InvalidPort {
                port: 9,
                port_count: 4
            }
            .kind(),
            ErrorKind::InvalidParameter
        );
        assert_eq!(
            RootHubError::DuplicateInterrupt { stream: 1 }.kind(),
            ErrorKind::InvalidParameter
        );
        assert_eq!(
            RootHubError::UnknownStream { stream: 1 }.kind(),
            ErrorKind::InvalidParameter
        );
        assert_eq!(
            RootHubError::NotSupported {
                request_type: 0x40,
                request: 0x99
            }
            .kind(),
            ErrorKind::NotSupported
        );
        assert_eq!(RootHubError::DeviceGone.kind(), ErrorKind::DeviceGone);
    }

    #[test]
    fn messages_carry_context() {
        let err = RootHubError::InvalidPort {
            port: 7,
            port_count: 4,
        };
        assert_eq!(err.to_string(), "invalid port 7 (hub has 4 ports)");
    }
}
