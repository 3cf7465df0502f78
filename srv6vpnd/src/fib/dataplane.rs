use std::collections::BTreeMap;
use std::net::Ipv6Addr;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use bgp_packet::RouteDistinguisher;
use ipnet::IpNet;

use super::{DataplaneError, FibRoute, FibSid};
use crate::srv6::Behavior;

// seg6local actions from linux/seg6_local.h.
pub const SEG6_LOCAL_ACTION_END: u32 = 1;
pub const SEG6_LOCAL_ACTION_END_DT6: u32 = 7;
pub const SEG6_LOCAL_ACTION_END_DT4: u32 = 8;

/// Forwarding state programmed for a local SID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seg6Local {
    /// Pop the segment and forward on the next header's own route lookup
    /// in the default table.
    End,
    /// Decapsulate and look the inner IPv4 packet up in `table`.
    EndDT4 { table: u32 },
    /// Decapsulate and look the inner IPv6 packet up in `table`.
    EndDT6 { table: u32 },
}

impl Seg6Local {
    pub fn from_sid(sid: &FibSid) -> Result<Self, DataplaneError> {
        match sid.behavior {
            Behavior::End => Ok(Self::end()),
            Behavior::EndDT4 => Self::end_dt4(sid.table),
            Behavior::EndDT6 => Self::end_dt6(sid.table),
        }
    }

    fn end() -> Self {
        Seg6Local::End
    }

    fn end_dt4(table: Option<u32>) -> Result<Self, DataplaneError> {
        let table =
            table.ok_or_else(|| DataplaneError::Rejected("End.DT4 without table".to_string()))?;
        Ok(Seg6Local::EndDT4 { table })
    }

    fn end_dt6(table: Option<u32>) -> Result<Self, DataplaneError> {
        let table =
            table.ok_or_else(|| DataplaneError::Rejected("End.DT6 without table".to_string()))?;
        Ok(Seg6Local::EndDT6 { table })
    }

    pub fn action(&self) -> u32 {
        match self {
            Seg6Local::End => SEG6_LOCAL_ACTION_END,
            Seg6Local::EndDT4 { .. } => SEG6_LOCAL_ACTION_END_DT4,
            Seg6Local::EndDT6 { .. } => SEG6_LOCAL_ACTION_END_DT6,
        }
    }

    pub fn table(&self) -> Option<u32> {
        match self {
            Seg6Local::End => None,
            Seg6Local::EndDT4 { table } | Seg6Local::EndDT6 { table } => Some(*table),
        }
    }
}

/// Forwarding plane programmed by the FIB worker. Calls may block.
#[async_trait]
pub trait Dataplane: Send + Sync {
    async fn sid_add(&self, sid: &FibSid) -> Result<(), DataplaneError>;

    async fn sid_del(&self, sid: &FibSid) -> Result<(), DataplaneError>;

    /// Adds or replaces the route of `(route.rd, route.prefix)`.
    async fn route_add(&self, route: &FibRoute) -> Result<(), DataplaneError>;

    async fn route_del(&self, route: &FibRoute) -> Result<(), DataplaneError>;
}

/// Forwarding table kept in process memory. Rejections can be injected to
/// exercise the retry path.
#[derive(Default)]
pub struct MemoryDataplane {
    sids: Mutex<BTreeMap<Ipv6Addr, Seg6Local>>,
    routes: Mutex<BTreeMap<(RouteDistinguisher, IpNet), FibRoute>>,
    reject_next: AtomicU32,
    reject_always: AtomicBool,
    calls: AtomicU32,
}

impl MemoryDataplane {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects the next `count` calls.
    pub fn reject_next(&self, count: u32) {
        self.reject_next.store(count, Ordering::SeqCst);
    }

    pub fn reject_always(&self, reject: bool) {
        self.reject_always.store(reject, Ordering::SeqCst);
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn sid(&self, address: &Ipv6Addr) -> Option<Seg6Local> {
        self.sids.lock().ok()?.get(address).copied()
    }

    pub fn sid_count(&self) -> usize {
        self.sids.lock().map(|sids| sids.len()).unwrap_or(0)
    }

    pub fn route(&self, rd: &RouteDistinguisher, prefix: &IpNet) -> Option<FibRoute> {
        self.routes.lock().ok()?.get(&(*rd, *prefix)).cloned()
    }

    pub fn route_count(&self) -> usize {
        self.routes.lock().map(|routes| routes.len()).unwrap_or(0)
    }

    fn admit(&self) -> Result<(), DataplaneError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.reject_always.load(Ordering::SeqCst) {
            return Err(DataplaneError::Rejected("injected".to_string()));
        }
        let pending = self
            .reject_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if pending.is_ok() {
            return Err(DataplaneError::Rejected("injected".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Dataplane for MemoryDataplane {
    async fn sid_add(&self, sid: &FibSid) -> Result<(), DataplaneError> {
        self.admit()?;
        let entry = Seg6Local::from_sid(sid)?;
        let mut sids = self.sids.lock().unwrap_or_else(|e| e.into_inner());
        sids.insert(sid.address, entry);
        Ok(())
    }

    async fn sid_del(&self, sid: &FibSid) -> Result<(), DataplaneError> {
        self.admit()?;
        let mut sids = self.sids.lock().unwrap_or_else(|e| e.into_inner());
        sids.remove(&sid.address)
            .map(|_| ())
            .ok_or(DataplaneError::NotFound)
    }

    async fn route_add(&self, route: &FibRoute) -> Result<(), DataplaneError> {
        self.admit()?;
        let mut routes = self.routes.lock().unwrap_or_else(|e| e.into_inner());
        routes.insert((route.rd, route.prefix), route.clone());
        Ok(())
    }

    async fn route_del(&self, route: &FibRoute) -> Result<(), DataplaneError> {
        self.admit()?;
        let mut routes = self.routes.lock().unwrap_or_else(|e| e.into_inner());
        routes
            .remove(&(route.rd, route.prefix))
            .map(|_| ())
            .ok_or(DataplaneError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fib_sid(behavior: Behavior, table: Option<u32>) -> FibSid {
        FibSid {
            address: "2001:db8:1:1:1::".parse().unwrap(),
            prefix_len: 80,
            behavior,
            table,
        }
    }

    #[test]
    fn test_seg6local_per_behavior() {
        let end = Seg6Local::from_sid(&fib_sid(Behavior::End, None)).unwrap();
        assert_eq!(end.action(), SEG6_LOCAL_ACTION_END);
        assert_eq!(end.table(), None);

        let dt4 = Seg6Local::from_sid(&fib_sid(Behavior::EndDT4, Some(10))).unwrap();
        assert_eq!(dt4.action(), SEG6_LOCAL_ACTION_END_DT4);
        assert_eq!(dt4.table(), Some(10));

        let dt6 = Seg6Local::from_sid(&fib_sid(Behavior::EndDT6, Some(20))).unwrap();
        assert_eq!(dt6, Seg6Local::EndDT6 { table: 20 });

        assert!(Seg6Local::from_sid(&fib_sid(Behavior::EndDT6, None)).is_err());
    }

    #[tokio::test]
    async fn test_reject_next() {
        let dataplane = MemoryDataplane::new();
        let sid = fib_sid(Behavior::End, None);
        dataplane.reject_next(2);
        assert!(dataplane.sid_add(&sid).await.is_err());
        assert!(dataplane.sid_add(&sid).await.is_err());
        assert!(dataplane.sid_add(&sid).await.is_ok());
        assert_eq!(dataplane.calls(), 3);
        assert_eq!(dataplane.sid(&sid.address), Some(Seg6Local::End));

        assert!(dataplane.sid_del(&sid).await.is_ok());
        assert_eq!(dataplane.sid_del(&sid).await, Err(DataplaneError::NotFound));
    }
}
