use crate::errors::RouteError;
use crate::fwmark::{Fwmark, FwmarkMask, Permission};
use crate::netlink::{NetlinkAction, NetlinkTransport, RouteSocket, ADDRESS_FAMILIES, RT_TABLE_MAIN};
use crate::packet_filter::{FilterAction, IpRouteFlusher, IptablesFilter, PacketFilter, RouteFlusher};
use crate::routes::{parse_destination, parse_nexthop, route_request, TableKind};
use crate::rules::{
    rule_request, RULE_PRIORITY_DEFAULT_NETWORK, RULE_PRIORITY_LEGACY, RULE_PRIORITY_MAIN, RULE_PRIORITY_PER_NETWORK_EXPLICIT,
    RULE_PRIORITY_PER_NETWORK_INTERFACE, RULE_PRIORITY_PER_NETWORK_NORMAL, RULE_PRIORITY_PRIVILEGED_LEGACY, RULE_PRIORITY_SECURE_VPN,
};
use crate::tables::{SystemIndexer, TableRegistry, ROUTE_TABLE_LEGACY, ROUTE_TABLE_PRIVILEGED_LEGACY};

/// Owns the kernel's policy routing state: one table per interface, fib
/// rules that pick a table from the socket fwmark, and the ingress marking
/// that keeps replies on the network their flow arrived on.
///
/// All methods apply changes immediately. There is no internal rollback, so
/// when a call fails partway the caller decides whether to retry or tear the
/// network down.
pub struct RouteController {
    transport: Box<dyn NetlinkTransport>,
    filter: Box<dyn PacketFilter>,
    flusher: Box<dyn RouteFlusher>,
    tables: TableRegistry,
}

impl Default for RouteController {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteController {
    pub fn new() -> Self {
        Self::with_parts(
            Box::new(RouteSocket),
            Box::new(IptablesFilter),
            Box::new(IpRouteFlusher),
            TableRegistry::new(Box::new(SystemIndexer)),
        )
    }

    pub fn with_parts(transport: Box<dyn NetlinkTransport>, filter: Box<dyn PacketFilter>, flusher: Box<dyn RouteFlusher>, tables: TableRegistry) -> Self {
        Self { transport, filter, flusher, tables }
    }

    /// Installs the baseline rules every network builds on. Called once at
    /// startup, before any interface is attached.
    pub fn initialize(&mut self) -> Result<(), RouteError> {
        tracing::info!(message_id = "fJ3qgV8x", "installing baseline routing rules");
        let mut fwmark = Fwmark::default();
        let mut mask = FwmarkMask::default();

        // Unmarked traffic falls through to the main table.
        mask.net_id = true;
        self.modify_ip_rule(NetlinkAction::Add, RULE_PRIORITY_MAIN, RT_TABLE_MAIN, fwmark.pack(), mask.pack(), None, None, None)?;

        // Marked traffic that did not choose its network explicitly may use
        // routes from the legacy table.
        mask.net_id = false;
        fwmark.explicitly_selected = false;
        mask.explicitly_selected = true;
        self.modify_ip_rule(NetlinkAction::Add, RULE_PRIORITY_LEGACY, ROUTE_TABLE_LEGACY, fwmark.pack(), mask.pack(), None, None, None)?;

        // Privileged sockets additionally see the privileged legacy table.
        fwmark.permission = Permission::ConnectivityInternal;
        mask.permission = Permission::ConnectivityInternal;
        self.modify_ip_rule(
            NetlinkAction::Add,
            RULE_PRIORITY_PRIVILEGED_LEGACY,
            ROUTE_TABLE_PRIVILEGED_LEGACY,
            fwmark.pack(),
            mask.pack(),
            None,
            None,
            None,
        )?;
        Ok(())
    }

    /// Attaches an interface to a network. Its table becomes reachable for
    /// sockets bound to the interface, marked with the network id, or
    /// explicitly selecting the network.
    pub fn add_interface_to_network(&mut self, net_id: u16, interface: &str, permission: Permission) -> Result<(), RouteError> {
        tracing::info!(message_id = "vX2wNc7q", net_id, interface, permission = permission.as_static_str(), "attaching interface to network");
        self.modify_per_network_rules(net_id, interface, permission, NetlinkAction::Add, true)
    }

    /// Detaches an interface from its network and empties its table.
    pub fn remove_interface_from_network(&mut self, net_id: u16, interface: &str, permission: Permission) -> Result<(), RouteError> {
        tracing::info!(message_id = "Rk5mW0aD", net_id, interface, "detaching interface from network");
        self.modify_per_network_rules(net_id, interface, permission, NetlinkAction::Delete, true)?;
        self.flush_routes(interface)
    }

    /// Attaches an interface as a secure VPN. Sockets without the protection
    /// bit route into it no matter which network they are marked for.
    pub fn add_interface_to_vpn(&mut self, net_id: u16, interface: &str) -> Result<(), RouteError> {
        tracing::info!(message_id = "PzS6t2gk", net_id, interface, "attaching interface to vpn");
        self.modify_per_network_rules(net_id, interface, Permission::None, NetlinkAction::Add, true)?;
        self.modify_vpn_rules(net_id, interface, NetlinkAction::Add)
    }

    /// Detaches a VPN interface and empties its table.
    pub fn remove_interface_from_vpn(&mut self, net_id: u16, interface: &str) -> Result<(), RouteError> {
        tracing::info!(message_id = "uB8eHw4N", net_id, interface, "detaching interface from vpn");
        self.modify_per_network_rules(net_id, interface, Permission::None, NetlinkAction::Delete, true)?;
        self.modify_vpn_rules(net_id, interface, NetlinkAction::Delete)?;
        self.flush_routes(interface)
    }

    /// Swaps the permission guarding a network's rules. The new rules go in
    /// before the old ones come out so matching traffic never hits a gap.
    pub fn modify_network_permission(&mut self, net_id: u16, interface: &str, old_permission: Permission, new_permission: Permission) -> Result<(), RouteError> {
        tracing::info!(
            message_id = "gQ1nYt6L",
            net_id,
            interface,
            old_permission = old_permission.as_static_str(),
            new_permission = new_permission.as_static_str(),
            "changing network permission"
        );
        self.modify_per_network_rules(net_id, interface, new_permission, NetlinkAction::Add, false)?;
        self.modify_per_network_rules(net_id, interface, old_permission, NetlinkAction::Delete, false)
    }

    /// Routes sockets with no marked network through this interface.
    pub fn add_to_default_network(&mut self, interface: &str, permission: Permission) -> Result<(), RouteError> {
        tracing::info!(message_id = "cM9rKs2T", interface, permission = permission.as_static_str(), "setting default network");
        self.modify_default_network_rules(interface, permission, NetlinkAction::Add)
    }

    pub fn remove_from_default_network(&mut self, interface: &str, permission: Permission) -> Result<(), RouteError> {
        tracing::info!(message_id = "eW4xPb7J", interface, "clearing default network");
        self.modify_default_network_rules(interface, permission, NetlinkAction::Delete)
    }

    /// Adds a route to one of the interface's tables. The uid parameter is
    /// reserved for per uid routing and currently ignored.
    pub fn add_route(&mut self, interface: &str, destination: &str, nexthop: Option<&str>, kind: TableKind, _uid: u32) -> Result<(), RouteError> {
        self.modify_route(NetlinkAction::Add, interface, destination, nexthop, kind)
    }

    pub fn remove_route(&mut self, interface: &str, destination: &str, nexthop: Option<&str>, kind: TableKind, _uid: u32) -> Result<(), RouteError> {
        self.modify_route(NetlinkAction::Delete, interface, destination, nexthop, kind)
    }

    fn modify_ip_rule(
        &mut self,
        action: NetlinkAction,
        priority: u32,
        table: u32,
        fwmark: u32,
        mask: u32,
        oif: Option<&str>,
        uid_start: Option<u32>,
        uid_end: Option<u32>,
    ) -> Result<(), RouteError> {
        for family in ADDRESS_FAMILIES {
            let request = rule_request(action, family, priority, table, fwmark, mask, oif, uid_start, uid_end)?;
            self.transport.send(&request)?;
        }
        Ok(())
    }

    fn modify_per_network_rules(&mut self, net_id: u16, interface: &str, permission: Permission, action: NetlinkAction, adjust_filter: bool) -> Result<(), RouteError> {
        let table = self.interface_table(interface)?;

        let mut fwmark = Fwmark { permission, ..Fwmark::default() };
        let mut mask = FwmarkMask { permission, ..FwmarkMask::default() };

        // A socket bound to the interface uses its table outright, provided
        // the owner holds the network's permission.
        self.modify_ip_rule(action, RULE_PRIORITY_PER_NETWORK_INTERFACE, table, fwmark.pack(), mask.pack(), Some(interface), None, None)?;

        // A socket marked with this network id uses the table.
        fwmark.net_id = net_id;
        mask.net_id = true;
        self.modify_ip_rule(action, RULE_PRIORITY_PER_NETWORK_NORMAL, table, fwmark.pack(), mask.pack(), None, None, None)?;

        // An explicit selection of this network outranks interface bindings.
        fwmark.explicitly_selected = true;
        mask.explicitly_selected = true;
        self.modify_ip_rule(action, RULE_PRIORITY_PER_NETWORK_EXPLICIT, table, fwmark.pack(), mask.pack(), None, None, None)?;

        if adjust_filter {
            let filter_action = match action {
                NetlinkAction::Add => FilterAction::Add,
                NetlinkAction::Delete => FilterAction::Remove,
            };
            self.filter.apply(filter_action, interface, net_id).map_err(|error| {
                tracing::error!(message_id = "aF8cVj3P", interface, ?error, "packet filter update failed");
                RouteError::PacketFilter(error)
            })?;
        }
        Ok(())
    }

    fn modify_vpn_rules(&mut self, net_id: u16, interface: &str, action: NetlinkAction) -> Result<(), RouteError> {
        let table = self.interface_table(interface)?;

        // Everything without the protection bit funnels into the VPN.
        let fwmark = Fwmark::default();
        let mask = FwmarkMask { protected_from_vpn: true, ..FwmarkMask::default() };
        self.modify_ip_rule(action, RULE_PRIORITY_SECURE_VPN, table, fwmark.pack(), mask.pack(), None, None, None)?;

        // Privileged sockets marked for this network keep their claim on its
        // table ahead of the per network tiers.
        let fwmark = Fwmark { net_id, permission: Permission::ConnectivityInternal, ..Fwmark::default() };
        let mask = FwmarkMask {
            net_id: true,
            protected_from_vpn: true,
            permission: Permission::ConnectivityInternal,
            ..FwmarkMask::default()
        };
        self.modify_ip_rule(action, RULE_PRIORITY_SECURE_VPN, table, fwmark.pack(), mask.pack(), None, None, None)
    }

    fn modify_default_network_rules(&mut self, interface: &str, permission: Permission, action: NetlinkAction) -> Result<(), RouteError> {
        let table = self.interface_table(interface)?;
        let fwmark = Fwmark { permission, ..Fwmark::default() };
        let mask = FwmarkMask { net_id: true, permission, ..FwmarkMask::default() };
        self.modify_ip_rule(action, RULE_PRIORITY_DEFAULT_NETWORK, table, fwmark.pack(), mask.pack(), None, None, None)
    }

    fn modify_route(&mut self, action: NetlinkAction, interface: &str, destination: &str, nexthop: Option<&str>, kind: TableKind) -> Result<(), RouteError> {
        tracing::debug!(message_id = "Wq7uFy5S", ?action, interface, destination, ?nexthop, ?kind, "modifying route");
        let table = self.route_table_for_kind(kind, interface)?;
        let destination = parse_destination(destination)?;
        let index = match self.tables.live_index(interface) {
            Some(index) => index,
            None => {
                tracing::error!(message_id = "tY2jBw6R", interface, "no device for interface");
                return Err(RouteError::NoSuchDevice { name: interface.to_string() });
            }
        };
        let nexthop = parse_nexthop(&destination, nexthop)?;

        let request = route_request(action, table, &destination, nexthop, Some(index));
        match self.transport.send(&request) {
            Ok(()) => {}
            // The legacy tables are shared, so a twin of this route may
            // already sit there.
            Err(error) if action == NetlinkAction::Add && kind != TableKind::Interface && error.is_exist() => {
                tracing::info!(message_id = "mLx32T9d", table, "route already present");
            }
            Err(error) => return Err(error.into()),
        }

        // A directly connected route also lands in the main table. Address
        // resolution for unmarked sockets consults main before any per
        // network rule has assigned them a network.
        if nexthop.is_none() {
            let request = route_request(action, RT_TABLE_MAIN, &destination, None, Some(index));
            match self.transport.send(&request) {
                Ok(()) => {}
                Err(error) if action == NetlinkAction::Add && error.is_exist() => {
                    tracing::info!(message_id = "kV5sQn8C", "main table twin already present");
                }
                Err(error) => return Err(error.into()),
            }
        }
        Ok(())
    }

    /// Empties the interface's table and drops its cached index. The rules
    /// pointing at the table must already be gone.
    fn flush_routes(&mut self, interface: &str) -> Result<(), RouteError> {
        let table = self.interface_table(interface)?;
        // The cached index dies with the routes, even if the flush fails
        // halfway. A later attach must resolve the device fresh.
        self.tables.forget(interface);
        self.flusher.flush(table).map_err(|error| {
            tracing::error!(message_id = "zD4hXk1M", table, ?error, "route flush failed");
            RouteError::RouteFlush(error)
        })
    }

    fn route_table_for_kind(&mut self, kind: TableKind, interface: &str) -> Result<u32, RouteError> {
        match kind {
            TableKind::Interface => self.interface_table(interface),
            TableKind::Legacy => Ok(ROUTE_TABLE_LEGACY),
            TableKind::PrivilegedLegacy => Ok(ROUTE_TABLE_PRIVILEGED_LEGACY),
        }
    }

    fn interface_table(&mut self, interface: &str) -> Result<u32, RouteError> {
        match self.tables.route_table(interface) {
            Some(table) => Ok(table),
            None => {
                tracing::error!(message_id = "d7PzTjcm", interface, "no routing table for interface");
                Err(RouteError::UnknownInterface { name: interface.to_string() })
            }
        }
    }
}
