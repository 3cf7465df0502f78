use std::collections::{BTreeMap, HashMap};
use std::net::Ipv6Addr;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::{info, warn};

use super::{AllocationError, Behavior, LocalSid, LocatorId, LocatorTable, SidOwner, VrfId};
use crate::fib::{FibHandle, FibOp, InstallError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SidError {
    #[error(transparent)]
    Allocation(#[from] AllocationError),
    #[error("{behavior} {reason}")]
    InvalidBehavior {
        behavior: Behavior,
        reason: &'static str,
    },
}

#[derive(Default)]
struct SidSet {
    seq: u64,
    sids: BTreeMap<u64, LocalSid>,
    index: HashMap<Ipv6Addr, u64>,
    /// Uninstalled SIDs whose forwarding delete was rejected. Their
    /// function values stay reserved until the delete goes through.
    stale: BTreeMap<Ipv6Addr, LocalSid>,
}

impl SidSet {
    fn get_mut(&mut self, address: &Ipv6Addr) -> Option<&mut LocalSid> {
        let seq = self.index.get(address)?;
        self.sids.get_mut(seq)
    }

    fn remove(&mut self, address: &Ipv6Addr) -> Option<LocalSid> {
        let seq = self.index.remove(address)?;
        self.sids.remove(&seq)
    }
}

/// Owns the local SIDs. Function values come from the locator table and
/// forwarding entries go through the FIB worker.
pub struct LocalSidManager {
    locators: Arc<LocatorTable>,
    fib: FibHandle,
    sids: Mutex<SidSet>,
}

impl LocalSidManager {
    pub fn new(locators: Arc<LocatorTable>, fib: FibHandle) -> Self {
        Self {
            locators,
            fib,
            sids: Mutex::new(SidSet::default()),
        }
    }

    pub fn allocate(
        &self,
        locator_id: LocatorId,
        behavior: Behavior,
        context: Option<VrfId>,
        owner: SidOwner,
    ) -> Result<LocalSid, SidError> {
        match (behavior.requires_context(), context) {
            (true, None) => {
                return Err(SidError::InvalidBehavior {
                    behavior,
                    reason: "requires a VRF context",
                });
            }
            (false, Some(_)) => {
                return Err(SidError::InvalidBehavior {
                    behavior,
                    reason: "does not take a VRF context",
                });
            }
            _ => {}
        }

        let locator = self
            .locators
            .get(locator_id)
            .ok_or(AllocationError::UnknownLocator(locator_id))?;
        let function = self.locators.reserve_function(locator_id)?;

        let sid = LocalSid {
            address: locator.sid_address(function),
            behavior,
            context,
            owner,
            installed: false,
            degraded: false,
            locator: locator_id,
            function,
            prefix_len: locator.sid_len(),
        };

        let mut set = self.lock();
        let seq = set.seq;
        set.seq += 1;
        set.index.insert(sid.address, seq);
        set.sids.insert(seq, sid.clone());

        info!(
            "SRv6 SID {} {} allocated from {} for {}",
            sid.prefix(),
            sid.behavior,
            locator.name,
            sid.owner
        );
        Ok(sid)
    }

    pub async fn install(&self, sid: &LocalSid) -> Result<(), InstallError> {
        let current = self
            .get(&sid.address)
            .ok_or(InstallError::NotAllocated(sid.address))?;
        if current.installed {
            return Ok(());
        }

        let result = self.fib.request(FibOp::SidAdd(current.fib_sid())).await;

        let mut set = self.lock();
        if let Some(entry) = set.get_mut(&sid.address) {
            match &result {
                Ok(()) => {
                    entry.installed = true;
                    entry.degraded = false;
                }
                Err(err) => {
                    warn!("SRv6 SID {} install failed: {}", entry.prefix(), err);
                    entry.degraded = true;
                }
            }
        }
        result
    }

    /// Removes the forwarding entry and gives the function value back to
    /// the locator. Earlier rejected deletes are retried first.
    pub async fn uninstall(&self, address: Ipv6Addr) {
        self.purge_stale().await;
        let Some(sid) = self.lock().remove(&address) else {
            return;
        };
        self.withdraw(sid).await;
    }

    /// Retries the forwarding deletes that were rejected. Returns how many
    /// SIDs were released.
    pub async fn purge_stale(&self) -> usize {
        let stale = std::mem::take(&mut self.lock().stale);
        let mut released = 0;
        for sid in stale.into_values() {
            if self.withdraw(sid).await {
                released += 1;
            }
        }
        released
    }

    /// SIDs whose forwarding entry may still be present after uninstall.
    pub fn stale(&self) -> Vec<LocalSid> {
        self.lock().stale.values().cloned().collect()
    }

    async fn withdraw(&self, mut sid: LocalSid) -> bool {
        // Sent even when not marked installed: an install may still be queued.
        match self.fib.request(FibOp::SidDel(sid.fib_sid())).await {
            Ok(()) => {
                self.locators.release_function(sid.locator, sid.function);
                info!("SRv6 SID {} {} released", sid.prefix(), sid.behavior);
                true
            }
            Err(err) => {
                warn!(
                    "SRv6 SID {} uninstall failed, address held: {}",
                    sid.prefix(),
                    err
                );
                sid.installed = false;
                sid.degraded = true;
                self.lock().stale.insert(sid.address, sid);
                false
            }
        }
    }

    pub async fn release_owner(&self, owner: SidOwner) {
        let addresses: Vec<Ipv6Addr> = self
            .list()
            .into_iter()
            .filter(|sid| sid.owner == owner)
            .map(|sid| sid.address)
            .collect();
        for address in addresses {
            self.uninstall(address).await;
        }
    }

    pub async fn shutdown(&self) {
        let addresses: Vec<Ipv6Addr> = self.list().into_iter().map(|sid| sid.address).collect();
        for address in addresses {
            self.uninstall(address).await;
        }
        self.purge_stale().await;
        for sid in self.stale() {
            warn!("SRv6 SID {} left in FIB at shutdown", sid.prefix());
        }
    }

    /// Local SIDs in allocation order.
    pub fn list(&self) -> Vec<LocalSid> {
        self.lock().sids.values().cloned().collect()
    }

    pub fn get(&self, address: &Ipv6Addr) -> Option<LocalSid> {
        let set = self.lock();
        set.index
            .get(address)
            .and_then(|seq| set.sids.get(seq))
            .cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SidSet> {
        self.sids.lock().unwrap_or_else(|e| e.into_inner())
    }
}
