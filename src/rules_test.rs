use nix::errno::Errno;

use crate::errors::RouteError;
use crate::netlink::NetlinkAction;
use crate::netlink::RequestHeader;
use crate::netlink::AF_INET;
use crate::netlink::FRA_FWMARK;
use crate::netlink::FRA_FWMASK;
use crate::netlink::FRA_OIFNAME;
use crate::netlink::FRA_PRIORITY;
use crate::netlink::FRA_TABLE;
use crate::netlink::FRA_UID_END;
use crate::netlink::FRA_UID_START;
use crate::netlink::FR_ACT_TO_TBL;
use crate::netlink::FR_ACT_UNREACHABLE;
use crate::netlink::NETLINK_CREATE_REQUEST_FLAGS;
use crate::netlink::NETLINK_REQUEST_FLAGS;
use crate::netlink::RTM_DELRULE;
use crate::netlink::RTM_NEWRULE;
use crate::rules::rule_request;
use crate::rules::RULE_PRIORITY_DEFAULT_NETWORK;
use crate::rules::RULE_PRIORITY_LEGACY;
use crate::rules::RULE_PRIORITY_MAIN;
use crate::rules::RULE_PRIORITY_PER_NETWORK_EXPLICIT;
use crate::rules::RULE_PRIORITY_PER_NETWORK_INTERFACE;
use crate::rules::RULE_PRIORITY_PER_NETWORK_NORMAL;
use crate::rules::RULE_PRIORITY_PRIVILEGED_LEGACY;
use crate::rules::RULE_PRIORITY_SECURE_VPN;

#[test]
fn rejects_fwmark_bits_outside_mask() {
    match rule_request(NetlinkAction::Add, AF_INET, 13000, 1005, 0x10064, 0xffff, None, None, None) {
        Err(error @ RouteError::MaskMismatch { .. }) => assert_eq!(error.errno(), Errno::ERANGE),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn zero_mask_rejects_any_fwmark() {
    assert!(matches!(
        rule_request(NetlinkAction::Add, AF_INET, 13000, 1005, 0x64, 0, None, None, None),
        Err(RouteError::MaskMismatch { .. })
    ));
}

#[test]
fn interface_name_must_fit_with_terminator() {
    // IFNAMSIZ is 16 including the NUL, so 15 characters fit and 16 do not.
    let fits = "abcdefghijklmno";
    assert!(rule_request(NetlinkAction::Add, AF_INET, 14000, 1005, 0, 0, Some(fits), None, None).is_ok());

    let too_long = "abcdefghijklmnop";
    match rule_request(NetlinkAction::Add, AF_INET, 14000, 1005, 0, 0, Some(too_long), None, None) {
        Err(error @ RouteError::InterfaceNameTooLong { .. }) => assert_eq!(error.errno(), Errno::ENAMETOOLONG),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn uid_range_must_be_paired() {
    for (start, end) in [(Some(1000), None), (None, Some(2000))] {
        match rule_request(NetlinkAction::Add, AF_INET, 13000, 1005, 0, 0, None, start, end) {
            Err(error @ RouteError::UnpairedUidRange) => assert_eq!(error.errno(), Errno::EUSERS),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    let request = rule_request(NetlinkAction::Add, AF_INET, 13000, 1005, 0, 0, None, Some(1000), Some(2000)).unwrap();
    let kinds = request.attributes.iter().map(|attribute| attribute.kind).collect::<Vec<_>>();
    assert_eq!(kinds, [FRA_PRIORITY, FRA_TABLE, FRA_UID_START, FRA_UID_END]);
}

#[test]
fn zero_table_builds_an_unreachable_rule() {
    let request = rule_request(NetlinkAction::Add, AF_INET, 12000, 0, 0, 0, None, None, None).unwrap();
    match &request.header {
        RequestHeader::Rule(rule) => assert_eq!(rule.action, FR_ACT_UNREACHABLE),
        other => panic!("unexpected header: {other:?}"),
    }
    let kinds = request.attributes.iter().map(|attribute| attribute.kind).collect::<Vec<_>>();
    assert_eq!(kinds, [FRA_PRIORITY]);
}

#[test]
fn attribute_order_is_stable() {
    let request = rule_request(NetlinkAction::Add, AF_INET, 14000, 1005, 0x64, 0xffff, Some("wlan0"), Some(0), Some(99999)).unwrap();
    match &request.header {
        RequestHeader::Rule(rule) => {
            assert_eq!(rule.family, AF_INET);
            assert_eq!(rule.action, FR_ACT_TO_TBL);
        }
        other => panic!("unexpected header: {other:?}"),
    }
    let kinds = request.attributes.iter().map(|attribute| attribute.kind).collect::<Vec<_>>();
    assert_eq!(kinds, [FRA_PRIORITY, FRA_TABLE, FRA_FWMARK, FRA_FWMASK, FRA_UID_START, FRA_UID_END, FRA_OIFNAME]);
}

#[test]
fn add_and_delete_differ_only_in_type_and_flags() {
    let add = rule_request(NetlinkAction::Add, AF_INET, 17000, 1005, 0x64, 0xffff, None, None, None).unwrap();
    let delete = rule_request(NetlinkAction::Delete, AF_INET, 17000, 1005, 0x64, 0xffff, None, None, None).unwrap();

    assert_eq!(add.message_type, RTM_NEWRULE);
    assert_eq!(add.flags, NETLINK_CREATE_REQUEST_FLAGS);
    assert_eq!(delete.message_type, RTM_DELRULE);
    assert_eq!(delete.flags, NETLINK_REQUEST_FLAGS);
    assert_eq!(add.header, delete.header);
    assert_eq!(add.attributes, delete.attributes);
}

#[test]
fn priority_values_are_stable() {
    assert_eq!(RULE_PRIORITY_PRIVILEGED_LEGACY, 11000);
    assert_eq!(RULE_PRIORITY_SECURE_VPN, 12000);
    assert_eq!(RULE_PRIORITY_PER_NETWORK_EXPLICIT, 13000);
    assert_eq!(RULE_PRIORITY_PER_NETWORK_INTERFACE, 14000);
    assert_eq!(RULE_PRIORITY_LEGACY, 16000);
    assert_eq!(RULE_PRIORITY_PER_NETWORK_NORMAL, 17000);
    assert_eq!(RULE_PRIORITY_DEFAULT_NETWORK, 19000);
    assert_eq!(RULE_PRIORITY_MAIN, 20000);
}
