use std::fmt;
use std::net::Ipv6Addr;
use std::sync::{Arc, Mutex, RwLock};

use bgp_packet::SidStructure;
use ipnet::Ipv6Net;
use serde::Serialize;
use thiserror::Error;

use super::FunctionPool;

/// Function field length used when a locator does not configure one.
pub const DEFAULT_FUNCTION_LEN: u8 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct LocatorId(pub u32);

impl fmt::Display for LocatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("locator {name}: prefix {prefix} overlaps locator {existing}")]
    Overlap {
        name: String,
        prefix: Ipv6Net,
        existing: String,
    },
    #[error("locator {name}: invalid length ({reason})")]
    InvalidLength { name: String, reason: String },
    #[error("locator {0} already exists")]
    Duplicate(String),
    #[error("locator {0} not found")]
    NotFound(String),
    #[error("locator {0} still has allocated functions")]
    InUse(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AllocationError {
    #[error("locator {locator}: function space exhausted")]
    AllocationExhausted { locator: String },
    #[error("locator id {0} not found")]
    UnknownLocator(LocatorId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatorSpec {
    pub name: String,
    pub prefix: Ipv6Net,
    pub block_len: u8,
    pub node_len: u8,
    pub function_len: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    pub id: LocatorId,
    pub name: String,
    pub prefix: Ipv6Net,
    pub block_len: u8,
    pub node_len: u8,
    pub function_len: u8,
}

impl Locator {
    pub fn fixed_len(&self) -> u8 {
        self.block_len + self.node_len
    }

    pub fn argument_len(&self) -> u8 {
        128 - self.fixed_len() - self.function_len
    }

    /// Prefix length of a SID allocated from this locator.
    pub fn sid_len(&self) -> u8 {
        self.fixed_len() + self.function_len
    }

    /// Places `function` in the bits right after the locator prefix.
    pub fn sid_address(&self, function: u64) -> Ipv6Addr {
        let shift = 128 - self.sid_len() as u32;
        let bits = (function as u128).checked_shl(shift).unwrap_or(0);
        Ipv6Addr::from(u128::from(self.prefix.network()) | bits)
    }

    pub fn contains(&self, addr: &Ipv6Addr) -> bool {
        self.prefix.contains(addr)
    }

    pub fn structure(&self) -> SidStructure {
        SidStructure::new(
            self.block_len,
            self.node_len,
            self.function_len,
            self.argument_len(),
        )
    }
}

struct LocatorEntry {
    locator: Locator,
    pool: Mutex<FunctionPool>,
}

#[derive(Default)]
struct LocatorSet {
    next_id: u32,
    entries: Vec<Arc<LocatorEntry>>,
}

impl LocatorSet {
    fn entry(&self, id: LocatorId) -> Option<Arc<LocatorEntry>> {
        self.entries
            .iter()
            .find(|e| e.locator.id == id)
            .cloned()
    }
}

fn overlaps(a: &Ipv6Net, b: &Ipv6Net) -> bool {
    a.contains(&b.network()) || b.contains(&a.network())
}

fn validate(spec: &LocatorSpec) -> Result<(), ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidLength {
        name: spec.name.clone(),
        reason,
    };
    let fixed = spec.block_len as u16 + spec.node_len as u16;
    if fixed > 128 {
        return Err(invalid(format!(
            "block-len {} + node-len {} exceeds 128",
            spec.block_len, spec.node_len
        )));
    }
    if spec.prefix.prefix_len() as u16 != fixed {
        return Err(invalid(format!(
            "prefix length {} differs from block-len + node-len {}",
            spec.prefix.prefix_len(),
            fixed
        )));
    }
    if fixed + spec.function_len as u16 > 128 {
        return Err(invalid(format!(
            "function-len {} does not fit after {} locator bits",
            spec.function_len, fixed
        )));
    }
    Ok(())
}

/// Configured locators in registration order, each with its own function
/// allocator lock.
#[derive(Default)]
pub struct LocatorTable {
    inner: RwLock<LocatorSet>,
}

impl LocatorTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        name: &str,
        prefix: Ipv6Net,
        block_len: u8,
        node_len: u8,
        function_len: u8,
    ) -> Result<LocatorId, ConfigError> {
        let spec = LocatorSpec {
            name: name.to_string(),
            prefix,
            block_len,
            node_len,
            function_len,
        };
        let ids = self.register_all(std::slice::from_ref(&spec))?;
        Ok(ids[0])
    }

    /// Registers every locator or none of them.
    pub fn register_all(&self, specs: &[LocatorSpec]) -> Result<Vec<LocatorId>, ConfigError> {
        let mut set = self.inner.write().unwrap_or_else(|e| e.into_inner());

        for (i, spec) in specs.iter().enumerate() {
            validate(spec)?;
            let prefix = spec.prefix.trunc();
            let existing = set
                .entries
                .iter()
                .map(|e| (&e.locator.name, &e.locator.prefix))
                .chain(specs[..i].iter().map(|s| (&s.name, &s.prefix)));
            for (name, other) in existing {
                if *name == spec.name {
                    return Err(ConfigError::Duplicate(spec.name.clone()));
                }
                if overlaps(&prefix, other) {
                    return Err(ConfigError::Overlap {
                        name: spec.name.clone(),
                        prefix,
                        existing: name.clone(),
                    });
                }
            }
        }

        let mut ids = Vec::with_capacity(specs.len());
        for spec in specs {
            let id = LocatorId(set.next_id);
            set.next_id += 1;
            let locator = Locator {
                id,
                name: spec.name.clone(),
                prefix: spec.prefix.trunc(),
                block_len: spec.block_len,
                node_len: spec.node_len,
                function_len: spec.function_len,
            };
            tracing::info!(
                "SRv6 locator {} {} registered (block {}, node {}, function {})",
                locator.name,
                locator.prefix,
                locator.block_len,
                locator.node_len,
                locator.function_len
            );
            set.entries.push(Arc::new(LocatorEntry {
                pool: Mutex::new(FunctionPool::new(locator.function_len)),
                locator,
            }));
            ids.push(id);
        }
        Ok(ids)
    }

    pub fn unregister(&self, name: &str) -> Result<Locator, ConfigError> {
        let mut set = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let pos = set
            .entries
            .iter()
            .position(|e| e.locator.name == name)
            .ok_or_else(|| ConfigError::NotFound(name.to_string()))?;
        let in_use = set.entries[pos]
            .pool
            .lock()
            .map(|pool| pool.in_use())
            .unwrap_or(0);
        if in_use > 0 {
            return Err(ConfigError::InUse(name.to_string()));
        }
        let entry = set.entries.remove(pos);
        Ok(entry.locator.clone())
    }

    pub fn lookup(&self, name: &str) -> Option<Locator> {
        let set = self.inner.read().unwrap_or_else(|e| e.into_inner());
        set.entries
            .iter()
            .find(|e| e.locator.name == name)
            .map(|e| e.locator.clone())
    }

    pub fn get(&self, id: LocatorId) -> Option<Locator> {
        let set = self.inner.read().unwrap_or_else(|e| e.into_inner());
        set.entry(id).map(|e| e.locator.clone())
    }

    pub fn list(&self) -> Vec<Locator> {
        let set = self.inner.read().unwrap_or_else(|e| e.into_inner());
        set.entries.iter().map(|e| e.locator.clone()).collect()
    }

    pub fn find_by_address(&self, addr: &Ipv6Addr) -> Option<Locator> {
        let set = self.inner.read().unwrap_or_else(|e| e.into_inner());
        set.entries
            .iter()
            .find(|e| e.locator.contains(addr))
            .map(|e| e.locator.clone())
    }

    pub fn reserve_function(&self, id: LocatorId) -> Result<u64, AllocationError> {
        let entry = self.entry(id)?;
        let mut pool = entry.pool.lock().unwrap_or_else(|e| e.into_inner());
        pool.allocate()
            .ok_or_else(|| AllocationError::AllocationExhausted {
                locator: entry.locator.name.clone(),
            })
    }

    pub fn release_function(&self, id: LocatorId, value: u64) {
        let Ok(entry) = self.entry(id) else {
            return;
        };
        let mut pool = entry.pool.lock().unwrap_or_else(|e| e.into_inner());
        if !pool.release(value) {
            tracing::debug!(
                "locator {}: function {} was not reserved",
                entry.locator.name,
                value
            );
        }
    }

    /// Functions reserved on a locator and the size of its function space.
    pub fn usage(&self, id: LocatorId) -> Option<(usize, Option<u64>)> {
        let entry = self.entry(id).ok()?;
        let pool = entry.pool.lock().unwrap_or_else(|e| e.into_inner());
        Some((pool.in_use(), pool.capacity()))
    }

    // The set lock is released before the caller takes the pool lock.
    fn entry(&self, id: LocatorId) -> Result<Arc<LocatorEntry>, AllocationError> {
        let set = self.inner.read().unwrap_or_else(|e| e.into_inner());
        set.entry(id).ok_or(AllocationError::UnknownLocator(id))
    }
}
