#![allow(clippy::too_many_arguments)]

pub mod controller;
pub mod errors;
pub mod fwmark;
pub mod logging;
pub mod netlink;
pub mod packet_filter;
pub mod routes;
pub mod rules;
pub mod tables;

#[cfg(test)]
mod routes_test;
#[cfg(test)]
mod rules_test;

pub use controller::RouteController;
pub use errors::{NetlinkError, RouteError};
pub use fwmark::{Fwmark, FwmarkMask, Permission};
pub use routes::TableKind;
