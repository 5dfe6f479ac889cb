use std::collections::HashMap;
use std::num::NonZeroU32;

/// Each interface owns the routing table numbered a fixed offset above its
/// index. Must stay above any table the kernel or an administrator assigns.
pub const ROUTE_TABLE_OFFSET_FROM_INDEX: u32 = 1000;

/// Table for legacy requests that bypass per-network lookups.
pub const ROUTE_TABLE_LEGACY: u32 = ROUTE_TABLE_OFFSET_FROM_INDEX - 902;
/// Same, for requests from privileged callers.
pub const ROUTE_TABLE_PRIVILEGED_LEGACY: u32 = ROUTE_TABLE_OFFSET_FROM_INDEX - 901;

/// Resolves interface names to live kernel indices.
pub trait InterfaceIndexer {
    fn interface_index(&self, interface: &str) -> Option<NonZeroU32>;
}

/// Asks the kernel, via if_nametoindex.
pub struct SystemIndexer;

impl InterfaceIndexer for SystemIndexer {
    fn interface_index(&self, interface: &str) -> Option<NonZeroU32> {
        nix::net::if_::if_nametoindex(interface).ok().and_then(NonZeroU32::new)
    }
}

/// Maps interface names to routing table numbers.
///
/// Interface indices are cached on first use and kept after the device goes
/// away. Rules and routes installed for a downed interface still name its
/// old table, and tearing them down needs the same number the kernel no
/// longer remembers.
pub struct TableRegistry {
    indexer: Box<dyn InterfaceIndexer>,
    last_known: HashMap<String, NonZeroU32>,
}

impl TableRegistry {
    pub fn new(indexer: Box<dyn InterfaceIndexer>) -> Self {
        Self { indexer, last_known: HashMap::new() }
    }

    /// The routing table for an interface, from the live index when the
    /// device exists and from the cache otherwise.
    pub fn route_table(&mut self, interface: &str) -> Option<u32> {
        let index = match self.refresh(interface) {
            Some(index) => index,
            None => *self.last_known.get(interface)?,
        };
        Some(index.get() + ROUTE_TABLE_OFFSET_FROM_INDEX)
    }

    /// The live index only. Routes name the device itself, so a cached index
    /// is no substitute here.
    pub fn live_index(&mut self, interface: &str) -> Option<NonZeroU32> {
        self.refresh(interface)
    }

    /// Drops the cached index. Called once the interface's rules and routes
    /// are gone and the table number may be reused.
    pub fn forget(&mut self, interface: &str) {
        self.last_known.remove(interface);
    }

    fn refresh(&mut self, interface: &str) -> Option<NonZeroU32> {
        let index = self.indexer.interface_index(interface)?;
        self.last_known.insert(interface.to_string(), index);
        Some(index)
    }
}
