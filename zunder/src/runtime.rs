use std::{alloc::Layout, ptr::NonNull};

use crate::{
    Allocator, GuestEntry, Heap, HeapCreateInfo, InitState, ModuleRegistry, Revision,
    SingletonCells, Strategy, demo_transform,
};

#[derive(Debug)]
pub struct RuntimeCreateInfo {
    pub heap: HeapCreateInfo,
    pub strategy: Strategy,
    pub revision: Revision,
    /// Guest compiled entry point; the built-in demo transform when `None`.
    pub guest: Option<GuestEntry>,
}

impl Default for RuntimeCreateInfo {
    fn default() -> Self {
        Self {
            heap: HeapCreateInfo::default(),
            strategy: Strategy::Selective,
            revision: Revision::Clean,
            guest: None,
        }
    }
}

/// The process-owned runtime context: heap, singleton cells, module init
/// flags, bootstrap state and the work-unit meter. Everything mutable and
/// process-wide lives here; there are no ambient globals in the library
/// (the exported C ABI keeps exactly one of these in a process slot).
pub struct Runtime {
    pub heap: Heap,
    pub cells: SingletonCells,
    pub modules: ModuleRegistry,
    pub strategy: Strategy,
    pub(crate) state: InitState,
    pub(crate) core_ready: bool,
    pub(crate) guest: GuestEntry,
    work: u64,
}

// the guest environment is single-threaded; Send only exists so the
// process slot behind the C ABI can hold a Runtime
unsafe impl Send for Runtime {}

impl Runtime {
    pub fn new(info: RuntimeCreateInfo) -> Self {
        Self {
            heap: Heap::new(info.heap),
            cells: SingletonCells::null(),
            modules: ModuleRegistry::new(info.revision),
            strategy: info.strategy,
            state: InitState::Uninitialized,
            core_ready: false,
            guest: info.guest.unwrap_or(demo_transform),
            work: 0,
        }
    }

    /// Charge `units` of initialization work to the meter. This is the
    /// stand-in for metered cycles: the whole point of the selective
    /// bootstrap is keeping this number small.
    #[inline]
    pub(crate) fn tick(&mut self, units: u64) {
        self.work += units;
    }

    /// Total work units charged so far.
    #[inline]
    pub fn work(&self) -> u64 {
        self.work
    }

    pub fn init_state(&self) -> InitState {
        self.state
    }

    /// Replace the guest compiled entry point. Only meaningful before the
    /// first `run` of a process slot; tests use it to force error paths.
    pub fn set_guest_entry(&mut self, guest: GuestEntry) {
        self.guest = guest;
    }
}

impl Allocator for Runtime {
    fn allocate(&mut self, layout: Layout) -> NonNull<u8> {
        self.heap.allocate(layout)
    }
}
