use std::net::IpAddr;
use std::num::NonZeroU32;

use ipnetwork::IpNetwork;

use crate::errors::RouteError;
use crate::netlink::{
    Attribute, NetlinkAction, NetlinkRequest, RequestHeader, RouteHeader, AF_INET, AF_INET6, NETLINK_CREATE_REQUEST_FLAGS, NETLINK_REQUEST_FLAGS,
    RTA_DST, RTA_GATEWAY, RTA_OIF, RTA_TABLE, RTM_DELROUTE, RTM_NEWROUTE, RTN_UNICAST, RTPROT_STATIC, RT_SCOPE_UNIVERSE,
};

/// Which routing table a route goes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    /// The table owned by the route's interface.
    Interface,
    /// The shared table consulted for legacy requests.
    Legacy,
    /// The shared table consulted for legacy requests from privileged
    /// callers.
    PrivilegedLegacy,
}

pub fn parse_destination(destination: &str) -> Result<IpNetwork, RouteError> {
    Ok(destination.parse::<IpNetwork>()?)
}

/// A nexthop must parse as a plain address in the destination's family.
pub fn parse_nexthop(destination: &IpNetwork, nexthop: Option<&str>) -> Result<Option<IpAddr>, RouteError> {
    let Some(nexthop) = nexthop else {
        return Ok(None);
    };
    match nexthop.parse::<IpAddr>() {
        Ok(address) if address.is_ipv4() == destination.is_ipv4() => Ok(Some(address)),
        _ => Err(RouteError::InvalidNexthop { nexthop: nexthop.to_string() }),
    }
}

pub fn route_request(action: NetlinkAction, table: u32, destination: &IpNetwork, nexthop: Option<IpAddr>, interface_index: Option<NonZeroU32>) -> NetlinkRequest {
    let (message_type, flags) = match action {
        NetlinkAction::Add => (RTM_NEWROUTE, NETLINK_CREATE_REQUEST_FLAGS),
        NetlinkAction::Delete => (RTM_DELROUTE, NETLINK_REQUEST_FLAGS),
    };
    let header = RouteHeader {
        family: if destination.is_ipv4() { AF_INET } else { AF_INET6 },
        destination_length: destination.prefix(),
        protocol: RTPROT_STATIC,
        scope: RT_SCOPE_UNIVERSE,
        route_type: RTN_UNICAST,
    };
    let mut attributes = vec![Attribute::u32(RTA_TABLE, table), Attribute::address(RTA_DST, destination.ip())];
    if let Some(index) = interface_index {
        attributes.push(Attribute::u32(RTA_OIF, index.get()));
    }
    if let Some(gateway) = nexthop {
        attributes.push(Attribute::address(RTA_GATEWAY, gateway));
    }
    NetlinkRequest { message_type, flags, header: RequestHeader::Route(header), attributes }
}
