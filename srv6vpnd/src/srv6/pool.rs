use bit_vec::BitVec;

/// Function value allocator of one locator. Released values are reused
/// before the counter moves on, so a fixed sequence of allocate/release
/// calls always yields the same values.
#[derive(Debug)]
pub struct FunctionPool {
    limit: Option<u64>,
    allocated: BitVec,
    free_list: Vec<u64>,
}

impl FunctionPool {
    pub fn new(function_len: u8) -> Self {
        let limit = if function_len >= 64 {
            None
        } else {
            Some(1u64 << function_len)
        };
        Self {
            limit,
            allocated: BitVec::new(),
            free_list: Vec::new(),
        }
    }

    /// Number of values in the space, `None` when it does not fit in u64.
    pub fn capacity(&self) -> Option<u64> {
        self.limit
    }

    pub fn allocate(&mut self) -> Option<u64> {
        if let Some(value) = self.free_list.pop() {
            self.allocated.set(value as usize, true);
            return Some(value);
        }

        let next = self.allocated.len() as u64;
        if let Some(limit) = self.limit {
            if next >= limit {
                return None;
            }
        }
        self.allocated.push(true);
        Some(next)
    }

    /// Returns `false` when the value was not allocated.
    pub fn release(&mut self, value: u64) -> bool {
        let Ok(index) = usize::try_from(value) else {
            return false;
        };
        if index < self.allocated.len() && self.allocated[index] {
            self.allocated.set(index, false);
            self.free_list.push(value);
            true
        } else {
            false
        }
    }

    pub fn is_allocated(&self, value: u64) -> bool {
        usize::try_from(value)
            .ok()
            .and_then(|index| self.allocated.get(index))
            .unwrap_or(false)
    }

    pub fn in_use(&self) -> usize {
        self.allocated.len() - self.free_list.len()
    }
}
