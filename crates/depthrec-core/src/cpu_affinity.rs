//! Optional pinning of the writer thread to a CPU core.
//!
//! A writer that gets descheduled shows up as queue growth and eventually as
//! queue-full disconnects, so hosts recording many streams can dedicate cores
//! to the writer threads. Wraps the `core_affinity` crate.

use tracing::{info, warn};

/// Pin the calling thread to `core` when one is configured. Negative ids mean
/// "not pinned". Returns whether the thread ended up pinned.
pub fn pin_current_thread(label: &str, core: Option<i32>) -> bool {
    let Some(core) = core.and_then(|c| usize::try_from(c).ok()) else {
        return false;
    };

    let core_ids = core_affinity::get_core_ids().unwrap_or_default();
    match core_ids.get(core) {
        Some(id) if core_affinity::set_for_current(*id) => {
            info!("[{label}] pinned to CPU core {core}");
            true
        }
        Some(_) => {
            warn!("[{label}] OS refused pinning to CPU core {core}");
            false
        }
        None => {
            warn!("[{label}] CPU core {core} not available ({} cores)", core_ids.len());
            false
        }
    }
}
