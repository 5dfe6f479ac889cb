use static_assertions::const_assert;

use crate::errors::RouteError;
use crate::netlink::{
    Attribute, NetlinkAction, NetlinkRequest, RequestHeader, RuleHeader, FRA_FWMARK, FRA_FWMASK, FRA_OIFNAME, FRA_PRIORITY, FRA_TABLE, FRA_UID_END,
    FRA_UID_START, FR_ACT_TO_TBL, FR_ACT_UNREACHABLE, IFNAMSIZ, NETLINK_CREATE_REQUEST_FLAGS, NETLINK_REQUEST_FLAGS, RTM_DELRULE, RTM_NEWRULE,
};

// Rule priorities, lowest number wins. The relative order is load bearing:
// a privileged socket must hit its table before the VPN catch-all, an
// explicit network choice must beat the interface binding, and the main
// table fallback comes dead last.
pub const RULE_PRIORITY_PRIVILEGED_LEGACY: u32 = 11000;
pub const RULE_PRIORITY_SECURE_VPN: u32 = 12000;
pub const RULE_PRIORITY_PER_NETWORK_EXPLICIT: u32 = 13000;
pub const RULE_PRIORITY_PER_NETWORK_INTERFACE: u32 = 14000;
pub const RULE_PRIORITY_LEGACY: u32 = 16000;
pub const RULE_PRIORITY_PER_NETWORK_NORMAL: u32 = 17000;
pub const RULE_PRIORITY_DEFAULT_NETWORK: u32 = 19000;
pub const RULE_PRIORITY_MAIN: u32 = 20000;

const_assert!(RULE_PRIORITY_PRIVILEGED_LEGACY < RULE_PRIORITY_SECURE_VPN);
const_assert!(RULE_PRIORITY_SECURE_VPN < RULE_PRIORITY_PER_NETWORK_EXPLICIT);
const_assert!(RULE_PRIORITY_PER_NETWORK_EXPLICIT < RULE_PRIORITY_PER_NETWORK_INTERFACE);
const_assert!(RULE_PRIORITY_PER_NETWORK_INTERFACE < RULE_PRIORITY_LEGACY);
const_assert!(RULE_PRIORITY_LEGACY < RULE_PRIORITY_PER_NETWORK_NORMAL);
const_assert!(RULE_PRIORITY_PER_NETWORK_NORMAL < RULE_PRIORITY_DEFAULT_NETWORK);
const_assert!(RULE_PRIORITY_DEFAULT_NETWORK < RULE_PRIORITY_MAIN);

/// Builds the request for one routing rule in one address family.
///
/// A zero `table` turns the rule into an unreachable verdict instead of a
/// table lookup. A zero `mask` drops the fwmark match entirely, and `oif`
/// restricts the rule to packets leaving one interface.
pub fn rule_request(
    action: NetlinkAction,
    family: u8,
    priority: u32,
    table: u32,
    fwmark: u32,
    mask: u32,
    oif: Option<&str>,
    uid_start: Option<u32>,
    uid_end: Option<u32>,
) -> Result<NetlinkRequest, RouteError> {
    // A mark bit outside the mask can never match and hints at a caller bug.
    if fwmark & !mask != 0 {
        return Err(RouteError::MaskMismatch { fwmark, mask });
    }
    if let Some(name) = oif {
        // One byte is reserved for the NUL terminator.
        if name.len() + 1 > IFNAMSIZ {
            return Err(RouteError::InterfaceNameTooLong { name: name.to_string() });
        }
    }
    let uid_range = match (uid_start, uid_end) {
        (Some(start), Some(end)) => Some((start, end)),
        (None, None) => None,
        _ => return Err(RouteError::UnpairedUidRange),
    };

    let (message_type, flags) = match action {
        NetlinkAction::Add => (RTM_NEWRULE, NETLINK_CREATE_REQUEST_FLAGS),
        NetlinkAction::Delete => (RTM_DELRULE, NETLINK_REQUEST_FLAGS),
    };
    let header = RuleHeader {
        family,
        action: if table != 0 { FR_ACT_TO_TBL } else { FR_ACT_UNREACHABLE },
    };

    let mut attributes = vec![Attribute::u32(FRA_PRIORITY, priority)];
    if table != 0 {
        attributes.push(Attribute::u32(FRA_TABLE, table));
    }
    if mask != 0 {
        attributes.push(Attribute::u32(FRA_FWMARK, fwmark));
        attributes.push(Attribute::u32(FRA_FWMASK, mask));
    }
    if let Some((start, end)) = uid_range {
        attributes.push(Attribute::u32(FRA_UID_START, start));
        attributes.push(Attribute::u32(FRA_UID_END, end));
    }
    if let Some(name) = oif {
        attributes.push(Attribute::c_string(FRA_OIFNAME, name));
    }
    Ok(NetlinkRequest { message_type, flags, header: RequestHeader::Rule(header), attributes })
}
