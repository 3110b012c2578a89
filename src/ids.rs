//! Process-wide monotonic identifiers.
//!
//! Starts at zero when the process starts, increments atomically, never
//! resets. Used for transcript entry keys and render target names.

use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

pub fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// A unique element id such as `transcript-17`.
pub fn next_render_target(prefix: &str) -> String {
    format!("{}-{}", prefix, next_id())
}
