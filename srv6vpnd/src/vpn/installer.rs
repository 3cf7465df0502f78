use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv6Addr};
use std::sync::Arc;

use bgp_packet::{DecodeError, PrefixSid, RouteDistinguisher};
use ipnet::IpNet;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{info, warn};

use super::{VpnKey, VpnRoute, VpnRouteStore};
use crate::fib::{FibHandle, FibOp, FibRoute, InstallError};
use crate::srv6::{LocalSid, LocatorTable, VrfId};

/// Route a key should have in the forwarding table, with the peer whose
/// path it comes from. `None` means no entry.
type Target = Option<(IpAddr, FibRoute)>;

/// Forwarding state of one (RD, prefix).
#[derive(Debug, Default)]
struct FibSlot {
    /// Entry the forwarding table holds. Kept after a rejected delete or
    /// replace, since the old entry is still there.
    programmed: Target,
    /// Target of the request in flight.
    pending: Option<Target>,
    /// Target whose last request was rejected. Not sent again until the
    /// next update, withdraw or shutdown touches the key.
    failed: Option<Target>,
}

/// Acknowledgement of a FIB request, fed back into the installer.
#[derive(Debug)]
pub struct FibAck {
    key: VpnKey,
    result: Result<(), InstallError>,
}

pub struct FibAckChannel {
    pub tx: UnboundedSender<FibAck>,
    pub rx: UnboundedReceiver<FibAck>,
}

impl FibAckChannel {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }
}

/// Applies received VPN paths to the route store and keeps the forwarding
/// table in step with the selected path of every (RD, prefix). FIB
/// requests are queued without waiting; their acknowledgements arrive on
/// `acks`.
pub struct RouteInstaller {
    pub store: VpnRouteStore,
    fib: FibHandle,
    pub acks: FibAckChannel,
    locators: Arc<LocatorTable>,
    encap_source: Option<Ipv6Addr>,
    slots: BTreeMap<VpnKey, FibSlot>,
    stopping: bool,
}

impl RouteInstaller {
    pub fn new(
        fib: FibHandle,
        locators: Arc<LocatorTable>,
        encap_source: Option<Ipv6Addr>,
    ) -> Self {
        Self {
            store: VpnRouteStore::new(),
            fib,
            acks: FibAckChannel::new(),
            locators,
            encap_source,
            slots: BTreeMap::new(),
            stopping: false,
        }
    }

    /// Handles a received path. A Prefix-SID that fails to decode leaves
    /// the path stored as invalid and the error is returned.
    pub fn on_receive(
        &mut self,
        peer: IpAddr,
        rd: RouteDistinguisher,
        prefix: IpNet,
        nexthop: IpAddr,
        attr: Option<&[u8]>,
    ) -> Result<(), DecodeError> {
        let decoded = attr.map(PrefixSid::decode).transpose();
        let result = match decoded {
            Ok(prefix_sid) => {
                self.store
                    .upsert(VpnRoute::new(rd, prefix, peer, nexthop, prefix_sid));
                Ok(())
            }
            Err(err) => {
                warn!(
                    "VPN [{}]:{} from {}: Prefix-SID decode error: {}",
                    rd, prefix, peer, err
                );
                self.store
                    .upsert(VpnRoute::invalid(rd, prefix, peer, nexthop));
                Err(err)
            }
        };
        self.sync_fib(rd, prefix, true);
        result
    }

    /// Removes the path of `peer`. A forwarding entry left behind by an
    /// earlier rejected delete is retried even when the path is gone.
    pub fn on_withdraw(&mut self, peer: IpAddr, rd: RouteDistinguisher, prefix: IpNet) {
        self.store.remove(&rd, &prefix, &peer);
        self.sync_fib(rd, prefix, true);
    }

    /// Prefix-SID to attach to a route originated from `vrf` that uses
    /// `sid`. Type-5 with the locator structure when the locator is known,
    /// Type-4 otherwise.
    pub fn on_local_sid_advertise(&self, sid: &LocalSid, vrf: Option<VrfId>) -> Option<PrefixSid> {
        if sid.context != vrf {
            return None;
        }
        let prefix_sid = match self.locators.get(sid.locator) {
            Some(locator) => PrefixSid::Type5Srv6L3Service {
                sid: sid.address,
                behavior: sid.behavior.codepoint(),
                structure: Some(locator.structure()),
            },
            None => PrefixSid::Type4L3Vpn { sid: sid.address },
        };
        Some(prefix_sid)
    }

    /// Drops every path learned from `peer`.
    pub fn peer_down(&mut self, peer: IpAddr) -> usize {
        let keys = self.store.keys_from_peer(&peer);
        for (rd, prefix) in keys.iter() {
            self.store.remove(rd, prefix, &peer);
            self.sync_fib(*rd, *prefix, true);
        }
        info!("VPN peer {} down: {} paths removed", peer, keys.len());
        keys.len()
    }

    /// Records the outcome of a FIB request and sends the next one if the
    /// selected path moved while it was in flight.
    pub fn on_fib_ack(&mut self, ack: FibAck) {
        let FibAck { key, result } = ack;
        let (rd, prefix) = key;
        let Some(slot) = self.slots.get_mut(&key) else {
            return;
        };
        let Some(target) = slot.pending.take() else {
            return;
        };
        match result {
            Ok(()) => {
                slot.programmed = target;
                slot.failed = None;
            }
            Err(err) => {
                match &target {
                    Some((peer, _)) => {
                        warn!("VPN [{}]:{} FIB install failed: {}", rd, prefix, err);
                        self.store.set_installed(&rd, &prefix, None);
                        self.store.set_degraded(&rd, &prefix, peer);
                    }
                    None => {
                        warn!("VPN [{}]:{} FIB delete failed: {}", rd, prefix, err);
                    }
                }
                slot.failed = Some(target);
            }
        }
        self.sync_fib(rd, prefix, false);
    }

    /// Number of keys with a FIB request in flight.
    pub fn pending(&self) -> usize {
        self.slots
            .values()
            .filter(|slot| slot.pending.is_some())
            .count()
    }

    /// Keys whose forwarding entry is left over from a rejected delete or
    /// replace.
    pub fn stale(&self) -> Vec<VpnKey> {
        self.slots
            .iter()
            .filter(|(_, slot)| slot.programmed.is_some() && slot.failed.is_some())
            .map(|(key, _)| *key)
            .collect()
    }

    /// Waits until every queued FIB request has been acknowledged.
    pub async fn settle(&mut self) {
        while self.pending() > 0 {
            match self.acks.rx.recv().await {
                Some(ack) => self.on_fib_ack(ack),
                None => break,
            }
        }
    }

    /// Withdraws every programmed route from the forwarding table,
    /// including entries whose delete was rejected earlier.
    pub async fn shutdown(&mut self) {
        self.stopping = true;
        let keys: Vec<VpnKey> = self.slots.keys().copied().collect();
        for (rd, prefix) in keys {
            self.sync_fib(rd, prefix, true);
        }
        self.settle().await;
        for (rd, prefix) in self.stale() {
            warn!("VPN [{}]:{} left in FIB at shutdown", rd, prefix);
        }
    }

    /// Compares the selected path with what the forwarding table holds and
    /// queues the request that closes the gap. `retry` lets a previously
    /// rejected target be sent again.
    fn sync_fib(&mut self, rd: RouteDistinguisher, prefix: IpNet, retry: bool) {
        let key = (rd, prefix);
        let desired: Target = if self.stopping {
            None
        } else {
            self.store
                .select(&rd, &prefix)
                .map(|route| (route.peer, route.fib_route(self.encap_source)))
        };

        let slot = self.slots.entry(key).or_default();
        if slot.pending.is_some() {
            return;
        }
        if slot.programmed == desired {
            slot.failed = None;
            if desired.is_none() {
                self.slots.remove(&key);
            }
            let peer = desired.as_ref().map(|(peer, _)| *peer);
            self.store.set_installed(&rd, &prefix, peer);
            return;
        }
        if retry {
            slot.failed = None;
        }
        if slot.failed.as_ref() == Some(&desired) {
            return;
        }

        let op = match (&desired, &slot.programmed) {
            (Some((_, route)), _) => FibOp::RouteAdd(route.clone()),
            (None, Some((_, prev))) => FibOp::RouteDel(prev.clone()),
            (None, None) => return,
        };
        slot.pending = Some(desired);
        self.submit(key, op);
    }

    fn submit(&self, key: VpnKey, op: FibOp) {
        let fib = self.fib.clone();
        let tx = self.acks.tx.clone();
        tokio::spawn(async move {
            let result = fib.request(op).await;
            let _ = tx.send(FibAck { key, result });
        });
    }
}
