use std::fmt;
use std::net::{IpAddr, Ipv6Addr};

use bgp_packet::RouteDistinguisher;
use ipnet::IpNet;
use tokio::sync::oneshot;

use super::InstallError;
use crate::srv6::Behavior;

/// seg6local route for a local SID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FibSid {
    pub address: Ipv6Addr,
    pub prefix_len: u8,
    pub behavior: Behavior,
    pub table: Option<u32>,
}

/// SRv6 encapsulation: the outer destination is the remote SID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Srv6Encap {
    pub sid: Ipv6Addr,
    pub source: Option<Ipv6Addr>,
}

impl fmt::Display for Srv6Encap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seg6 mode encap segs {}", self.sid)?;
        if let Some(source) = self.source {
            write!(f, " src {}", source)?;
        }
        Ok(())
    }
}

/// VPN route keyed by (RD, prefix).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FibRoute {
    pub rd: RouteDistinguisher,
    pub prefix: IpNet,
    pub nexthop: IpAddr,
    pub encap: Option<Srv6Encap>,
}

#[derive(Debug, Clone)]
pub enum FibOp {
    SidAdd(FibSid),
    SidDel(FibSid),
    RouteAdd(FibRoute),
    RouteDel(FibRoute),
}

impl fmt::Display for FibOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FibOp::SidAdd(sid) => write!(f, "add {} {}", sid.address, sid.behavior),
            FibOp::SidDel(sid) => write!(f, "del {} {}", sid.address, sid.behavior),
            FibOp::RouteAdd(route) => write!(f, "add [{}]:{}", route.rd, route.prefix),
            FibOp::RouteDel(route) => write!(f, "del [{}]:{}", route.rd, route.prefix),
        }
    }
}

#[derive(Debug)]
pub struct FibRequest {
    pub op: FibOp,
    pub ack: oneshot::Sender<Result<(), InstallError>>,
}
