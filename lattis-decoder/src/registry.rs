//! Handle registry: stable integer keys for loaded model contexts
//!
//! The foreign boundary cannot hold an `Arc` directly, so contexts are
//! parked here under monotonically increasing integer handles. Unlike a
//! raw pointer, an invalid or released handle fails with an explicit
//! error instead of undefined behavior, and `release` gives callers a
//! teardown path that does not rely on process exit.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, RwLock};

use crate::context::ModelContext;
use crate::error::{DecodeError, Result};

/// Opaque integer handle naming a registered [`ModelContext`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(u64);

impl Handle {
    pub fn as_raw(self) -> u64 {
        self.0
    }

    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

fn table() -> &'static RwLock<HashMap<u64, Arc<ModelContext>>> {
    static TABLE: OnceLock<RwLock<HashMap<u64, Arc<ModelContext>>>> = OnceLock::new();
    TABLE.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Park a context and return its handle
pub fn register(context: Arc<ModelContext>) -> Handle {
    let handle = NEXT_HANDLE.fetch_add(1, Ordering::Relaxed);
    let mut map = match table().write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    map.insert(handle, context);
    Handle(handle)
}

/// Look up a registered context. Decode calls clone the `Arc` and drop
/// the lock, so concurrent lookups never serialize decoding.
pub fn get(handle: Handle) -> Result<Arc<ModelContext>> {
    let map = match table().read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    map.get(&handle.0)
        .cloned()
        .ok_or(DecodeError::UnknownHandle(handle.0))
}

/// Drop a context from the registry. In-flight decode calls holding the
/// `Arc` finish normally; the context is freed when the last clone goes.
pub fn release(handle: Handle) -> Result<()> {
    let mut map = match table().write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    map.remove(&handle.0)
        .map(|_| ())
        .ok_or(DecodeError::UnknownHandle(handle.0))
}
