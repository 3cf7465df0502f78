use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv6Addr};

use bgp_packet::{PrefixSid, RouteDistinguisher};
use ipnet::IpNet;

use crate::fib::{FibRoute, Srv6Encap};

/// One path of a VPN prefix, as received from a single peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VpnRoute {
    pub rd: RouteDistinguisher,
    pub prefix: IpNet,
    pub peer: IpAddr,
    pub nexthop: IpAddr,
    pub prefix_sid: Option<PrefixSid>,
    pub valid: bool,
    pub selected: bool,
    pub installed: bool,
    pub degraded: bool,
}

impl VpnRoute {
    pub fn new(
        rd: RouteDistinguisher,
        prefix: IpNet,
        peer: IpAddr,
        nexthop: IpAddr,
        prefix_sid: Option<PrefixSid>,
    ) -> Self {
        Self {
            rd,
            prefix,
            peer,
            nexthop,
            prefix_sid,
            valid: true,
            selected: false,
            installed: false,
            degraded: false,
        }
    }

    /// Path kept after its Prefix-SID failed to decode.
    pub fn invalid(rd: RouteDistinguisher, prefix: IpNet, peer: IpAddr, nexthop: IpAddr) -> Self {
        Self {
            valid: false,
            ..Self::new(rd, prefix, peer, nexthop, None)
        }
    }

    pub fn remote_sid(&self) -> Option<Ipv6Addr> {
        self.prefix_sid.as_ref().map(|sid| sid.sid())
    }

    pub fn fib_route(&self, source: Option<Ipv6Addr>) -> FibRoute {
        FibRoute {
            rd: self.rd,
            prefix: self.prefix,
            nexthop: self.nexthop,
            encap: self.remote_sid().map(|sid| Srv6Encap { sid, source }),
        }
    }
}

pub type VpnKey = (RouteDistinguisher, IpNet);

/// Received VPN paths per (RD, prefix) in arrival order.
#[derive(Debug, Clone, Default)]
pub struct VpnRouteStore {
    table: BTreeMap<VpnKey, Vec<VpnRoute>>,
}

impl VpnRouteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `route`, replacing the path of the same peer in place.
    pub fn upsert(&mut self, route: VpnRoute) {
        let paths = self.table.entry((route.rd, route.prefix)).or_default();
        match paths.iter_mut().find(|path| path.peer == route.peer) {
            Some(path) => {
                let installed = path.installed;
                *path = route;
                path.installed = installed;
            }
            None => paths.push(route),
        }
    }

    pub fn remove(
        &mut self,
        rd: &RouteDistinguisher,
        prefix: &IpNet,
        peer: &IpAddr,
    ) -> Option<VpnRoute> {
        let key = (*rd, *prefix);
        let paths = self.table.get_mut(&key)?;
        let index = paths.iter().position(|path| path.peer == *peer)?;
        let route = paths.remove(index);
        if paths.is_empty() {
            self.table.remove(&key);
        }
        Some(route)
    }

    pub fn paths(&self, rd: &RouteDistinguisher, prefix: &IpNet) -> Option<&Vec<VpnRoute>> {
        self.table.get(&(*rd, *prefix))
    }

    /// Marks the first valid path as selected and returns it.
    pub fn select(&mut self, rd: &RouteDistinguisher, prefix: &IpNet) -> Option<VpnRoute> {
        let paths = self.table.get_mut(&(*rd, *prefix))?;
        let mut selected = None;
        for path in paths.iter_mut() {
            path.selected = selected.is_none() && path.valid;
            if path.selected {
                selected = Some(path.clone());
            }
        }
        selected
    }

    /// Records which path, if any, is in the forwarding table.
    pub fn set_installed(&mut self, rd: &RouteDistinguisher, prefix: &IpNet, peer: Option<IpAddr>) {
        if let Some(paths) = self.table.get_mut(&(*rd, *prefix)) {
            for path in paths.iter_mut() {
                path.installed = Some(path.peer) == peer;
                if path.installed {
                    path.degraded = false;
                }
            }
        }
    }

    pub fn set_degraded(&mut self, rd: &RouteDistinguisher, prefix: &IpNet, peer: &IpAddr) {
        if let Some(paths) = self.table.get_mut(&(*rd, *prefix)) {
            for path in paths.iter_mut().filter(|path| path.peer == *peer) {
                path.installed = false;
                path.degraded = true;
            }
        }
    }

    pub fn keys_from_peer(&self, peer: &IpAddr) -> Vec<VpnKey> {
        self.table
            .iter()
            .filter(|(_, paths)| paths.iter().any(|path| path.peer == *peer))
            .map(|(key, _)| *key)
            .collect()
    }

    pub fn keys(&self) -> Vec<VpnKey> {
        self.table.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&VpnKey, &Vec<VpnRoute>)> {
        self.table.iter()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rd() -> RouteDistinguisher {
        "1:1".parse().unwrap()
    }

    fn route(peer: &str, valid: bool) -> VpnRoute {
        let prefix: IpNet = "10.0.0.0/24".parse().unwrap();
        let peer: IpAddr = peer.parse().unwrap();
        if valid {
            VpnRoute::new(rd(), prefix, peer, peer, None)
        } else {
            VpnRoute::invalid(rd(), prefix, peer, peer)
        }
    }

    #[test]
    fn test_select_first_valid() {
        let mut store = VpnRouteStore::new();
        let prefix: IpNet = "10.0.0.0/24".parse().unwrap();
        store.upsert(route("192.0.2.1", false));
        store.upsert(route("192.0.2.2", true));
        store.upsert(route("192.0.2.3", true));

        let selected = store.select(&rd(), &prefix).unwrap();
        assert_eq!(selected.peer, "192.0.2.2".parse::<IpAddr>().unwrap());
        let flags: Vec<bool> = store
            .paths(&rd(), &prefix)
            .unwrap()
            .iter()
            .map(|path| path.selected)
            .collect();
        assert_eq!(flags, vec![false, true, false]);

        // Replacement keeps arrival position.
        store.upsert(route("192.0.2.1", true));
        let selected = store.select(&rd(), &prefix).unwrap();
        assert_eq!(selected.peer, "192.0.2.1".parse::<IpAddr>().unwrap());
        assert_eq!(store.paths(&rd(), &prefix).unwrap().len(), 3);
    }

    #[test]
    fn test_remove() {
        let mut store = VpnRouteStore::new();
        let prefix: IpNet = "10.0.0.0/24".parse().unwrap();
        let peer: IpAddr = "192.0.2.1".parse().unwrap();
        store.upsert(route("192.0.2.1", true));
        assert_eq!(store.keys_from_peer(&peer), vec![(rd(), prefix)]);

        assert!(store.remove(&rd(), &prefix, &peer).is_some());
        assert!(store.remove(&rd(), &prefix, &peer).is_none());
        assert!(store.is_empty());
        assert!(store.select(&rd(), &prefix).is_none());
    }
}
