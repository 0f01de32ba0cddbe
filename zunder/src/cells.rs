use crate::Value;

/// Identity of a global singleton cell. The symbolic names are the stable
/// identities guest code is compiled against; the set is fixed per guest
/// build and must be re-derived when the guest's referenced symbols change.
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CellId {
    /// Canonical empty byte array.
    EmptyBytes = 0,
    /// Canonical inhabitant of the signed integer type.
    IntZero = 1,
    /// Canonical inhabitant of the 32-bit unsigned type.
    U32Zero = 2,
    /// Canonical inhabitant of the 64-bit unsigned type.
    U64Zero = 3,
}

impl CellId {
    pub const ALL: [CellId; 4] = [
        CellId::EmptyBytes,
        CellId::IntZero,
        CellId::U32Zero,
        CellId::U64Zero,
    ];

    pub fn symbol(self) -> &'static str {
        match self {
            CellId::EmptyBytes => "rt_bytes_empty",
            CellId::IntZero => "rt_int_zero",
            CellId::U32Zero => "rt_u32_default",
            CellId::U64Zero => "rt_u64_default",
        }
    }
}

bitflags::bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    struct CellReady: u8 {
        const EMPTY_BYTES = 1 << 0;
        const INT_ZERO    = 1 << 1;
        const U32_ZERO    = 1 << 2;
        const U64_ZERO    = 1 << 3;
    }
}

fn ready_bit(id: CellId) -> CellReady {
    match id {
        CellId::EmptyBytes => CellReady::EMPTY_BYTES,
        CellId::IntZero => CellReady::INT_ZERO,
        CellId::U32Zero => CellReady::U32_ZERO,
        CellId::U64Zero => CellReady::U64_ZERO,
    }
}

/// The process-wide singleton cell table. A cell is readable only after it
/// has been marked initialized; from then on its value never changes for
/// the rest of the process.
#[derive(Debug)]
pub struct SingletonCells {
    values: [Value; 4],
    ready: CellReady,
}

impl SingletonCells {
    pub fn null() -> Self {
        Self {
            values: [Value::zero(); 4],
            ready: CellReady::empty(),
        }
    }

    #[inline]
    pub fn is_ready(&self, id: CellId) -> bool {
        self.ready.contains(ready_bit(id))
    }

    /// Read a cell; `None` until its producer has run.
    #[inline]
    pub fn get(&self, id: CellId) -> Option<Value> {
        if self.is_ready(id) {
            return Some(self.values[id as usize]);
        }
        None
    }

    /// Write a cell and mark it initialized. Writing twice is allowed only
    /// with the identical value (a re-run of the producing initializer).
    pub fn set(&mut self, id: CellId, value: Value) {
        debug_assert!(
            !self.is_ready(id) || self.values[id as usize] == value,
            "singleton cell {} rewritten with a different value",
            id.symbol()
        );
        self.values[id as usize] = value;
        self.ready.insert(ready_bit(id));
    }
}
