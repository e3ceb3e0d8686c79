//! Process-wide table pinning completion targets for foreign callbacks.
//!
//! The engine keeps an integer context per client and passes it back to
//! every callback. Contexts are [`HandleTable`] handles, so one that
//! outlives its client is ignored.

use std::sync::{Mutex, PoisonError};

use crate::core::completion::Completions;
use crate::core::handles::HandleTable;

static HANDLES: Mutex<HandleTable<Completions>> = Mutex::new(HandleTable::new());

/// Pins `completions` in the process-wide table.
pub(crate) fn register(completions: Completions) -> u64 {
    HANDLES
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(completions)
}

/// Clones the completion target of a live context.
pub(crate) fn lookup(handle: u64) -> Option<Completions> {
    HANDLES
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .get(handle)
        .cloned()
}

/// Releases a context pinned by [`register`].
pub(crate) fn release(handle: u64) -> bool {
    HANDLES
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(handle)
        .is_some()
}
