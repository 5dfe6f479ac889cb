use strum::IntoStaticStr;

/// Network access level carried in the fwmark. Higher levels imply the lower
/// ones, so the field packs as a plain two bit integer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, IntoStaticStr)]
#[strum(serialize_all = "camelCase")]
pub enum Permission {
    #[default]
    None,
    ChangeNetworkState,
    ConnectivityInternal,
}

impl Permission {
    pub fn bits(self) -> u32 {
        match self {
            Self::None => 0x0,
            Self::ChangeNetworkState => 0x1,
            Self::ConnectivityInternal => 0x2,
        }
    }

    // Both high bits set never goes out on the wire, but unpack must not lose
    // information downward.
    fn from_bits(bits: u32) -> Self {
        match bits {
            0x0 => Self::None,
            0x1 => Self::ChangeNetworkState,
            _ => Self::ConnectivityInternal,
        }
    }

    pub fn as_static_str(&self) -> &'static str {
        self.into()
    }
}

/// The socket mark, as routing rules match on it.
///
/// The low 16 bits carry the network id. Bit 16 says the app chose this
/// network explicitly, bit 17 says the socket must never be routed into a
/// VPN, bits 18 and 19 carry the permission of the socket owner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Fwmark {
    pub net_id: u16,
    pub explicitly_selected: bool,
    pub protected_from_vpn: bool,
    pub permission: Permission,
}

const EXPLICITLY_SELECTED_BIT: u32 = 1 << 16;
const PROTECTED_FROM_VPN_BIT: u32 = 1 << 17;
const PERMISSION_SHIFT: u32 = 18;
const PERMISSION_BITS: u32 = 0x3 << PERMISSION_SHIFT;

impl Fwmark {
    pub const NET_ID_MASK: u32 = 0xffff;

    pub fn pack(self) -> u32 {
        let mut bits = u32::from(self.net_id);
        if self.explicitly_selected {
            bits |= EXPLICITLY_SELECTED_BIT;
        }
        if self.protected_from_vpn {
            bits |= PROTECTED_FROM_VPN_BIT;
        }
        bits | (self.permission.bits() << PERMISSION_SHIFT)
    }

    pub fn unpack(bits: u32) -> Self {
        Self {
            net_id: (bits & Self::NET_ID_MASK) as u16,
            explicitly_selected: bits & EXPLICITLY_SELECTED_BIT != 0,
            protected_from_vpn: bits & PROTECTED_FROM_VPN_BIT != 0,
            permission: Permission::from_bits((bits & PERMISSION_BITS) >> PERMISSION_SHIFT),
        }
    }
}

/// Selects which fwmark fields a rule compares. Packs to the mask handed to
/// the kernel next to the packed mark.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FwmarkMask {
    pub net_id: bool,
    pub explicitly_selected: bool,
    pub protected_from_vpn: bool,
    pub permission: Permission,
}

impl FwmarkMask {
    pub fn pack(self) -> u32 {
        let mut bits = 0;
        if self.net_id {
            bits |= Fwmark::NET_ID_MASK;
        }
        if self.explicitly_selected {
            bits |= EXPLICITLY_SELECTED_BIT;
        }
        if self.protected_from_vpn {
            bits |= PROTECTED_FROM_VPN_BIT;
        }
        bits | (self.permission.bits() << PERMISSION_SHIFT)
    }
}
