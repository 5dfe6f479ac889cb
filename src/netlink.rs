use std::mem::size_of;
use std::net::IpAddr;
use std::os::fd::AsRawFd;

use bytes::{BufMut, Bytes, BytesMut};
use nix::libc;
use nix::sys::socket;
use nix::sys::socket::{AddressFamily, MsgFlags, NetlinkAddr, SockFlag, SockProtocol, SockType};
use static_assertions::{const_assert, const_assert_eq};

use crate::errors::NetlinkError;

pub use nix::libc::{IFNAMSIZ, RTM_DELROUTE, RTM_DELRULE, RTM_NEWROUTE, RTM_NEWRULE};

pub const NETLINK_REQUEST_FLAGS: u16 = (libc::NLM_F_REQUEST | libc::NLM_F_ACK) as u16;
pub const NETLINK_CREATE_REQUEST_FLAGS: u16 = NETLINK_REQUEST_FLAGS | (libc::NLM_F_CREATE | libc::NLM_F_EXCL) as u16;

pub const AF_INET: u8 = libc::AF_INET as u8;
pub const AF_INET6: u8 = libc::AF_INET6 as u8;

/// Every rule and route exists once per address family.
pub const ADDRESS_FAMILIES: [u8; 2] = [AF_INET, AF_INET6];

// Rule attributes and actions from linux/fib_rules.h. The libc crate does
// not carry the fib_rules constants, so they are spelled out here.
pub const FR_ACT_TO_TBL: u8 = 1;
pub const FR_ACT_UNREACHABLE: u8 = 7;

pub const FRA_PRIORITY: u16 = 6;
pub const FRA_FWMARK: u16 = 10;
pub const FRA_TABLE: u16 = 15;
pub const FRA_FWMASK: u16 = 16;
pub const FRA_OIFNAME: u16 = 17;

// Out-of-tree uid range attributes, numbered past the last upstream value we
// use. Revisit if upstream ever assigns these.
pub const FRA_UID_START: u16 = 18;
pub const FRA_UID_END: u16 = 19;
const_assert!(FRA_UID_START > FRA_OIFNAME);

// Route attributes from linux/rtnetlink.h.
pub const RTA_DST: u16 = 1;
pub const RTA_OIF: u16 = 4;
pub const RTA_GATEWAY: u16 = 5;
pub const RTA_TABLE: u16 = 15;

pub const RT_TABLE_MAIN: u32 = 254;

pub const RTPROT_STATIC: u8 = 4;
pub const RT_SCOPE_UNIVERSE: u8 = 0;
pub const RTN_UNICAST: u8 = 1;

pub const NETLINK_HEADER_LEN: usize = size_of::<libc::nlmsghdr>();
/// Both fib_rule_hdr and rtmsg are twelve bytes with the family leading.
pub const FAMILY_HEADER_LEN: usize = 12;
// rta_len + rta_type
const ATTRIBUTE_HEADER_LEN: usize = 4;
/// Replies to acked requests are exactly one nlmsghdr plus one nlmsgerr.
pub const ACK_LEN: usize = NETLINK_HEADER_LEN + size_of::<libc::nlmsgerr>();

// RTA_ALIGNTO
const ALIGN_TO: usize = 4;

const_assert_eq!(NETLINK_HEADER_LEN, 16);
const_assert_eq!(ACK_LEN, 36);

const fn align(len: usize) -> usize {
    (len + ALIGN_TO - 1) & !(ALIGN_TO - 1)
}

/// Distinguishes install from removal for both rules and routes. Additions
/// ask the kernel to create exclusively, removals must match exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetlinkAction {
    Add,
    Delete,
}

/// One rtattr: type, then payload, padded out to the four byte boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub kind: u16,
    pub payload: Vec<u8>,
}

impl Attribute {
    pub fn u32(kind: u16, value: u32) -> Self {
        Self { kind, payload: value.to_ne_bytes().to_vec() }
    }

    pub fn address(kind: u16, address: IpAddr) -> Self {
        let payload = match address {
            IpAddr::V4(v4) => v4.octets().to_vec(),
            IpAddr::V6(v6) => v6.octets().to_vec(),
        };
        Self { kind, payload }
    }

    /// Interface names go out with their terminating NUL and explicit zero
    /// padding. Some kernels refuse to delete a rule whose name attribute
    /// was not padded when it was added.
    pub fn c_string(kind: u16, value: &str) -> Self {
        let mut payload = Vec::with_capacity(value.len() + 1);
        payload.extend_from_slice(value.as_bytes());
        payload.push(0);
        Self { kind, payload }
    }

    // rta_len counts the header and payload but not the padding.
    fn header_and_payload_len(&self) -> usize {
        ATTRIBUTE_HEADER_LEN + self.payload.len()
    }

    fn aligned_len(&self) -> usize {
        align(self.header_and_payload_len())
    }

    fn padding_len(&self) -> usize {
        self.aligned_len() - self.header_and_payload_len()
    }
}

/// The twelve byte family header following the netlink header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestHeader {
    Rule(RuleHeader),
    Route(RouteHeader),
}

/// fib_rule_hdr with the fields we set. The rest stays zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleHeader {
    pub family: u8,
    pub action: u8,
}

/// rtmsg with the fields we set. The table byte stays zero because the real
/// table id always travels in an RTA_TABLE attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteHeader {
    pub family: u8,
    pub destination_length: u8,
    pub protocol: u8,
    pub scope: u8,
    pub route_type: u8,
}

/// One complete rtnetlink message, ready to encode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetlinkRequest {
    pub message_type: u16,
    pub flags: u16,
    pub header: RequestHeader,
    pub attributes: Vec<Attribute>,
}

impl NetlinkRequest {
    pub fn encoded_len(&self) -> usize {
        NETLINK_HEADER_LEN + FAMILY_HEADER_LEN + self.attributes.iter().map(Attribute::aligned_len).sum::<usize>()
    }

    /// Serializes in host byte order, as rtnetlink expects.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_u32_ne(self.encoded_len() as u32);
        buf.put_u16_ne(self.message_type);
        buf.put_u16_ne(self.flags);
        buf.put_u32_ne(0); // sequence
        buf.put_u32_ne(0); // port id, the kernel addresses the ack by socket
        match &self.header {
            RequestHeader::Rule(rule) => {
                buf.put_u8(rule.family);
                buf.put_bytes(0, 6); // dst_len, src_len, tos, table, res1, res2
                buf.put_u8(rule.action);
                buf.put_u32_ne(0); // flags
            }
            RequestHeader::Route(route) => {
                buf.put_u8(route.family);
                buf.put_u8(route.destination_length);
                buf.put_bytes(0, 2); // src_len, tos
                buf.put_u8(0); // table
                buf.put_u8(route.protocol);
                buf.put_u8(route.scope);
                buf.put_u8(route.route_type);
                buf.put_u32_ne(0); // flags
            }
        }
        for attribute in &self.attributes {
            buf.put_u16_ne(attribute.header_and_payload_len() as u16);
            buf.put_u16_ne(attribute.kind);
            buf.put_slice(&attribute.payload);
            buf.put_bytes(0, attribute.padding_len());
        }
        buf.freeze()
    }
}

/// Checks the single ack the kernel sends back for an NLM_F_ACK request.
pub fn parse_ack(response: &[u8]) -> Result<(), NetlinkError> {
    if response.len() != ACK_LEN {
        return Err(NetlinkError::MalformedResponse { len: response.len() });
    }
    // The nlmsgerr sits right after the header and leads with the error
    // field, a negated errno or zero for success.
    let mut error_bytes = [0u8; 4];
    error_bytes.copy_from_slice(&response[NETLINK_HEADER_LEN..NETLINK_HEADER_LEN + 4]);
    let error = i32::from_ne_bytes(error_bytes);
    if error == 0 {
        Ok(())
    } else {
        Err(NetlinkError::Kernel(nix::errno::Errno::from_raw(-error)))
    }
}

pub trait NetlinkTransport {
    fn send(&self, request: &NetlinkRequest) -> Result<(), NetlinkError>;
}

/// Talks NETLINK_ROUTE to the kernel. Each request opens a fresh socket, so
/// there is no sequence state to track across calls.
pub struct RouteSocket;

impl RouteSocket {
    fn roundtrip(payload: &[u8]) -> Result<(), NetlinkError> {
        let fd = socket::socket(AddressFamily::Netlink, SockType::Datagram, SockFlag::empty(), SockProtocol::NetlinkRoute)
            .map_err(NetlinkError::Transport)?;
        socket::connect(fd.as_raw_fd(), &NetlinkAddr::new(0, 0)).map_err(NetlinkError::Transport)?;
        socket::send(fd.as_raw_fd(), payload, MsgFlags::empty()).map_err(NetlinkError::Transport)?;
        let mut response = [0u8; ACK_LEN + ALIGN_TO];
        let received = socket::recv(fd.as_raw_fd(), &mut response, MsgFlags::empty()).map_err(NetlinkError::Transport)?;
        parse_ack(&response[..received])
    }
}

impl NetlinkTransport for RouteSocket {
    fn send(&self, request: &NetlinkRequest) -> Result<(), NetlinkError> {
        let result = Self::roundtrip(&request.encode());
        if let Err(error) = &result {
            tracing::error!(message_id = "JqzpKcmW", ?error, message_type = request.message_type, "netlink request failed");
        }
        result
    }
}
