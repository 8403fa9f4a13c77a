//! Maintenance postponed while a call is in progress

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Kinds of deferrable maintenance, in replay order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeferredOp {
    TokenRefresh,
    DeviceRefresh,
}

impl DeferredOp {
    pub fn as_str(self) -> &'static str {
        match self {
            DeferredOp::TokenRefresh => "tokenRefresh",
            DeferredOp::DeviceRefresh => "deviceRefresh",
        }
    }

    /// Activity line recorded when the operation is postponed
    pub fn deferred_message(self) -> &'static str {
        match self {
            DeferredOp::TokenRefresh => "Token refresh deferred - call in progress",
            DeferredOp::DeviceRefresh => "Device refresh deferred - call in progress",
        }
    }
}

impl fmt::Display for DeferredOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered set of pending operations, at most one per kind
#[derive(Debug, Default)]
pub struct DeferredOps {
    pending: Mutex<BTreeSet<DeferredOp>>,
}

impl DeferredOps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if `op` was already pending
    pub fn insert(&self, op: DeferredOp) -> bool {
        self.pending.lock().insert(op)
    }

    /// Take every pending operation in replay order, leaving the set empty
    pub fn drain(&self) -> Vec<DeferredOp> {
        std::mem::take(&mut *self.pending.lock()).into_iter().collect()
    }

    pub fn contains(&self, op: DeferredOp) -> bool {
        self.pending.lock().contains(&op)
    }

    pub fn snapshot(&self) -> Vec<DeferredOp> {
        self.pending.lock().iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    pub fn clear(&self) {
        self.pending.lock().clear();
    }
}
