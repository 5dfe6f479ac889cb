use std::net::IpAddr;
use std::num::NonZeroU32;

use nix::errno::Errno;

use crate::errors::RouteError;
use crate::netlink::NetlinkAction;
use crate::netlink::RequestHeader;
use crate::netlink::AF_INET;
use crate::netlink::AF_INET6;
use crate::netlink::NETLINK_REQUEST_FLAGS;
use crate::netlink::RTA_DST;
use crate::netlink::RTA_GATEWAY;
use crate::netlink::RTA_OIF;
use crate::netlink::RTA_TABLE;
use crate::netlink::RTM_DELROUTE;
use crate::netlink::RTM_NEWROUTE;
use crate::routes::parse_destination;
use crate::routes::parse_nexthop;
use crate::routes::route_request;

#[test]
fn parses_destinations_of_both_families() {
    assert!(parse_destination("192.0.2.0/24").unwrap().is_ipv4());
    assert_eq!(parse_destination("192.0.2.0/24").unwrap().prefix(), 24);
    assert!(!parse_destination("2001:db8::/64").unwrap().is_ipv4());
    assert_eq!(parse_destination("2001:db8::/64").unwrap().prefix(), 64);
    // A bare address parses as a host prefix.
    assert_eq!(parse_destination("192.0.2.7").unwrap().prefix(), 32);
}

#[test]
fn bad_destination_is_rejected() {
    match parse_destination("not-a-prefix") {
        Err(error @ RouteError::InvalidDestination(_)) => assert_eq!(error.errno(), Errno::EINVAL),
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(parse_destination("192.0.2.0/33").is_err());
}

#[test]
fn nexthop_must_match_destination_family() {
    let destination = parse_destination("192.0.2.0/24").unwrap();

    assert_eq!(parse_nexthop(&destination, None).unwrap(), None);
    assert_eq!(parse_nexthop(&destination, Some("192.0.2.1")).unwrap(), Some("192.0.2.1".parse::<IpAddr>().unwrap()));

    for bad in ["2001:db8::1", "nonsense", ""] {
        match parse_nexthop(&destination, Some(bad)) {
            Err(error @ RouteError::InvalidNexthop { .. }) => assert_eq!(error.errno(), Errno::EINVAL),
            other => panic!("unexpected result for {bad:?}: {other:?}"),
        }
    }

    let v6_destination = parse_destination("2001:db8::/64").unwrap();
    assert!(parse_nexthop(&v6_destination, Some("2001:db8::1")).is_ok());
    assert!(parse_nexthop(&v6_destination, Some("192.0.2.1")).is_err());
}

#[test]
fn route_request_carries_destination_and_gateway() {
    let destination = parse_destination("0.0.0.0/0").unwrap();
    let gateway: IpAddr = "192.0.2.1".parse().unwrap();
    let request = route_request(NetlinkAction::Add, 1005, &destination, Some(gateway), NonZeroU32::new(7));

    assert_eq!(request.message_type, RTM_NEWROUTE);
    match &request.header {
        RequestHeader::Route(route) => {
            assert_eq!(route.family, AF_INET);
            assert_eq!(route.destination_length, 0);
        }
        other => panic!("unexpected header: {other:?}"),
    }
    let kinds = request.attributes.iter().map(|attribute| attribute.kind).collect::<Vec<_>>();
    assert_eq!(kinds, [RTA_TABLE, RTA_DST, RTA_OIF, RTA_GATEWAY]);
    assert_eq!(request.attributes[3].payload, vec![192, 0, 2, 1]);
}

#[test]
fn directly_connected_route_omits_gateway() {
    let destination = parse_destination("192.0.2.0/24").unwrap();
    let request = route_request(NetlinkAction::Delete, 98, &destination, None, NonZeroU32::new(7));

    assert_eq!(request.message_type, RTM_DELROUTE);
    assert_eq!(request.flags, NETLINK_REQUEST_FLAGS);
    let kinds = request.attributes.iter().map(|attribute| attribute.kind).collect::<Vec<_>>();
    assert_eq!(kinds, [RTA_TABLE, RTA_DST, RTA_OIF]);
    assert_eq!(request.attributes[2].payload, 7u32.to_ne_bytes().to_vec());
}

#[test]
fn v6_routes_use_the_v6_family() {
    let destination = parse_destination("2001:db8::/64").unwrap();
    let request = route_request(NetlinkAction::Add, 1009, &destination, None, NonZeroU32::new(9));

    match &request.header {
        RequestHeader::Route(route) => {
            assert_eq!(route.family, AF_INET6);
            assert_eq!(route.destination_length, 64);
        }
        other => panic!("unexpected header: {other:?}"),
    }
    assert_eq!(request.attributes[1].payload.len(), 16);
}
