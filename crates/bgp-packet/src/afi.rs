use std::net::IpAddr;

use serde::Serialize;
use strum_macros::Display;

/// Address family of a VPN route.
#[repr(u16)]
#[derive(Debug, Default, PartialEq, Eq, Ord, PartialOrd, Clone, Copy, Hash, Serialize, Display)]
pub enum Afi {
    #[default]
    #[strum(serialize = "IPv4")]
    Ip = 1,
    #[strum(serialize = "IPv6")]
    Ip6 = 2,
    #[strum(to_string = "Unknown({0})")]
    Unknown(u16),
}

impl Afi {
    /// Maximum prefix length in bits for the family.
    pub fn max_plen(&self) -> Option<u8> {
        match self {
            Afi::Ip => Some(32),
            Afi::Ip6 => Some(128),
            Afi::Unknown(_) => None,
        }
    }
}

impl From<&IpAddr> for Afi {
    fn from(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => Afi::Ip,
            IpAddr::V6(_) => Afi::Ip6,
        }
    }
}
