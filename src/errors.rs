use nix::errno::Errno;
use thiserror::Error;

/// Failures from one netlink request/ack round trip.
#[derive(Debug, Error)]
pub enum NetlinkError {
    /// The socket itself failed before the kernel could answer.
    #[error("netlink socket: {0}")]
    Transport(Errno),
    /// The kernel answered the request with an error code.
    #[error("kernel refused request: {0}")]
    Kernel(Errno),
    /// The reply was not the single ack message we expect.
    #[error("netlink response has unexpected length {len}")]
    MalformedResponse { len: usize },
}

impl NetlinkError {
    pub fn errno(&self) -> Errno {
        match self {
            Self::Transport(errno) | Self::Kernel(errno) => *errno,
            Self::MalformedResponse { .. } => Errno::EBADMSG,
        }
    }

    /// True when the kernel rejected a creation because the object is already
    /// installed. Callers decide per table whether that is fine.
    pub fn is_exist(&self) -> bool {
        matches!(self, Self::Kernel(Errno::EEXIST))
    }
}

#[derive(Debug, Error)]
pub enum RouteError {
    #[error(transparent)]
    Netlink(#[from] NetlinkError),
    #[error("mask {mask:#x} does not cover all bits of fwmark {fwmark:#x}")]
    MaskMismatch { fwmark: u32, mask: u32 },
    #[error("uid range requires both start and end")]
    UnpairedUidRange,
    #[error("interface name too long: {name:?}")]
    InterfaceNameTooLong { name: String },
    #[error("invalid destination prefix: {0}")]
    InvalidDestination(#[from] ipnetwork::IpNetworkError),
    #[error("invalid nexthop: {nexthop:?}")]
    InvalidNexthop { nexthop: String },
    #[error("no routing table known for interface {name:?}")]
    UnknownInterface { name: String },
    #[error("no device for interface {name:?}")]
    NoSuchDevice { name: String },
    #[error("packet filter: {0}")]
    PacketFilter(anyhow::Error),
    #[error("route flush: {0}")]
    RouteFlush(anyhow::Error),
}

impl RouteError {
    /// The errno equivalent of this error, for callers that report results as
    /// raw OS codes. Kernel-reported codes pass through unchanged.
    pub fn errno(&self) -> Errno {
        match self {
            Self::Netlink(error) => error.errno(),
            Self::MaskMismatch { .. } => Errno::ERANGE,
            Self::UnpairedUidRange => Errno::EUSERS,
            Self::InterfaceNameTooLong { .. } => Errno::ENAMETOOLONG,
            Self::InvalidDestination(_) | Self::InvalidNexthop { .. } => Errno::EINVAL,
            Self::UnknownInterface { .. } => Errno::ESRCH,
            Self::NoSuchDevice { .. } => Errno::ENODEV,
            Self::PacketFilter(_) | Self::RouteFlush(_) => Errno::EREMOTEIO,
        }
    }
}
