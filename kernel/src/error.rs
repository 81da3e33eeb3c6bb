//! Error types for the virtual memory subsystem
//!
//! Every fallible VM operation returns a [`VmError`] instead of a sentinel
//! value or a string, mirroring how the rest of a production kernel threads
//! typed errors through its call stack.

use core::fmt;

/// Error returned by a fallible VM operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "vm errors must be handled, not silently discarded"]
pub enum VmError {
    /// No free frame was available to satisfy an allocation.
    OutOfMemory { requested_pages: usize },
    /// A virtual address did not fall within any region of the current
    /// address space, and did not match the stack heuristic either.
    InvalidAddress { addr: usize },
    /// A write was attempted against a read-only mapping.
    PermissionDenied { addr: usize },
    /// The fault type passed to `vm_fault` was not READ/WRITE/READONLY.
    InvalidArgument { name: &'static str },
    /// The page table has no free slot left on the probe sequence.
    TableFull,
    /// A subsystem was used before its bootstrap routine ran.
    NotInitialized { subsystem: &'static str },
}

/// Result type alias for VM operations.
pub type VmResult<T> = Result<T, VmError>;

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory { requested_pages } => {
                write!(f, "out of memory: requested {requested_pages} page(s)")
            }
            Self::InvalidAddress { addr } => write!(f, "invalid address: {addr:#x}"),
            Self::PermissionDenied { addr } => {
                write!(f, "permission denied writing to {addr:#x}")
            }
            Self::InvalidArgument { name } => write!(f, "invalid argument: {name}"),
            Self::TableFull => write!(f, "page table is full"),
            Self::NotInitialized { subsystem } => {
                write!(f, "subsystem not initialized: {subsystem}")
            }
        }
    }
}
