//! Inbound frame size ceilings derived from a memory budget.

use sysinfo::System;

use super::transport::FrameLimits;

/// Smallest ceiling any budget resolves to: 64 KiB, enough for a complete
/// gateway handshake payload.
pub const MIN_BUDGET_BYTES: usize = 64 * 1024;

/// Ceiling used when no budget is configured.
pub const DEFAULT_BUDGET_BYTES: usize = 100_000_000;

/// How large an inbound message may be.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryBudget {
    /// A fixed number of bytes
    Fixed(usize),
    /// A share, in percent, of the memory available when connecting.
    /// Values above 100 are treated as 100.
    Percentage(u8),
}

impl Default for MemoryBudget {
    fn default() -> Self {
        Self::Fixed(DEFAULT_BUDGET_BYTES)
    }
}

impl MemoryBudget {
    /// Resolve against the host's memory.
    #[must_use]
    pub fn resolve(&self) -> usize {
        match self {
            Self::Fixed(_) => self.resolve_with(&0_u64),
            Self::Percentage(_) => self.resolve_with(&SystemMemory),
        }
    }

    /// Resolve against an explicit probe.
    ///
    /// Never returns less than [`MIN_BUDGET_BYTES`].
    #[must_use]
    pub fn resolve_with<P: MemoryProbe + ?Sized>(&self, probe: &P) -> usize {
        let bytes = match *self {
            Self::Fixed(bytes) => bytes,
            Self::Percentage(percent) => {
                let percent = u128::from(percent.min(100));
                let share = u128::from(probe.available_memory()) * percent / 100;
                usize::try_from(share).unwrap_or(usize::MAX)
            }
        };

        bytes.max(MIN_BUDGET_BYTES)
    }

    /// Resolve and apply the result to both message and frame ceilings.
    #[must_use]
    pub fn frame_limits(&self) -> FrameLimits {
        FrameLimits::uniform(self.resolve())
    }
}

/// Source of the memory figure a [`MemoryBudget::Percentage`] is taken from.
pub trait MemoryProbe {
    /// Bytes of memory the process may use.
    fn available_memory(&self) -> u64;
}

impl MemoryProbe for u64 {
    fn available_memory(&self) -> u64 {
        *self
    }
}

/// Reads available memory from the operating system, falling back to total
/// memory on platforms that do not report availability.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemMemory;

impl MemoryProbe for SystemMemory {
    fn available_memory(&self) -> u64 {
        let mut system = System::new();
        system.refresh_memory();

        match system.available_memory() {
            0 => system.total_memory(),
            available => available,
        }
    }
}
