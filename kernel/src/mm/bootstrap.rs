//! VM subsystem bootstrap
//!
//! Ordering here is load-bearing: the page table is sized and allocated via
//! the boot-time stealing allocator while the frame table does not exist
//! yet, so the frames it consumes must already show up as reserved once the
//! frame table is built. Building the frame table first would let it hand
//! those same frames out to someone else.

use log::info;

use super::{frame_table, page_table, PAGE_SIZE};
use crate::arch;

/// Bring up the VM subsystem. Must be called exactly once, early in kernel
/// boot, after RAM has been sized by the bootloader/arch layer.
pub fn vm_bootstrap() {
    let num_pages = 2 * arch::ram_size() / PAGE_SIZE;
    info!(target: "vm", "bootstrapping page table with {num_pages} entries");
    page_table::bootstrap(num_pages);

    info!(target: "vm", "bootstrapping frame table");
    frame_table::bootstrap();
}
