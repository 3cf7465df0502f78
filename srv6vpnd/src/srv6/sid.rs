use std::fmt;
use std::net::Ipv6Addr;

use ipnet::Ipv6Net;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use super::{Behavior, LocatorId};
use crate::fib::FibSid;

/// VRF a DT behavior decapsulates into, identified by its table id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VrfId(pub u32);

impl fmt::Display for VrfId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SidOwner {
    Static,
    Bgp,
    Sharp,
    Connected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalSid {
    pub address: Ipv6Addr,
    pub behavior: Behavior,
    pub context: Option<VrfId>,
    pub owner: SidOwner,
    pub installed: bool,
    pub degraded: bool,
    pub locator: LocatorId,
    pub function: u64,
    pub prefix_len: u8,
}

impl LocalSid {
    pub fn prefix(&self) -> Ipv6Net {
        Ipv6Net::new(self.address, self.prefix_len).unwrap_or_else(|_| self.address.into())
    }

    pub fn context_label(&self) -> String {
        match (self.behavior, self.context) {
            (Behavior::End, _) => "USP".to_string(),
            (_, Some(vrf)) => format!("table {}", vrf),
            (_, None) => "-".to_string(),
        }
    }

    pub fn fib_sid(&self) -> FibSid {
        FibSid {
            address: self.address,
            prefix_len: self.prefix_len,
            behavior: self.behavior,
            table: self.context.map(|vrf| vrf.0),
        }
    }
}
