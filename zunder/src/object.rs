use std::mem;

#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ValueTag {
    Scalar = 0b00,
    Reference = 0b01,
    Header = 0b11,
}

#[rustfmt::skip]
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ObjectType {
    ScalarArray = 0b00001,
    Ctor        = 0b00010,
    Max         = 0b11111,
}

bitflags::bitflags! {
    /// Header flags are intentionally tiny (currently only PERSISTENT).
    #[repr(transparent)]
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct HeaderFlags: u8 {
        /// Object is alive for the whole process and exempt from the
        /// refcount discipline. The bootstrap sets this on singleton cell
        /// values, exactly as the full initializer would.
        const PERSISTENT = 1 << 0;
    }
}

/// Every heap object starts with this header. The whole process is
/// single-shot, so there is no mark byte and no forwarding state; the only
/// lifetime information we track is the refcount and the PERSISTENT flag.
#[repr(C)]
#[derive(Debug)]
pub struct Header {
    /// Bits:
    /// [0..2) tag  (always ValueTag::Header for a live object)
    /// [3..8) type (5 bits: ObjectType)
    pub ty: u8,
    pub flags: HeaderFlags,
    /// Per-type payload: element size for scalar arrays, constructor tag
    /// for ctor objects.
    pub aux: u16,
    /// Reference count. Frozen once PERSISTENT is set.
    pub rc: u32,
}

pub trait Object: Sized {}

/// Values that fit in a pointer-sized word and travel unboxed.
pub trait PtrSizedObject: Object {
    fn to_ptr_sized(self) -> u64;
    fn from_ptr_sized(value: u64) -> Self;
}

pub trait HeapObject: Object {
    fn header(&self) -> &Header {
        // SAFETY: every heap object has a leading header
        unsafe { mem::transmute::<&Self, &Header>(self) }
    }

    fn header_mut(&mut self) -> &mut Header {
        // SAFETY: every heap object has a leading header
        unsafe { mem::transmute::<&mut Self, &mut Header>(self) }
    }

    fn heap_size(&self) -> usize {
        mem::size_of::<Self>()
    }
}

/// A heap object of statically unknown concrete type.
#[repr(C)]
#[derive(Debug)]
pub struct HeapValue {
    pub header: Header,
}

impl Header {
    pub const TAG_SHIFT: u8 = 0;
    pub const TAG_MASK: u8 = 0b11;

    pub const TYPE_SHIFT: u8 = 3;
    pub const TYPE_MASK: u8 = 0b1_1111 << Self::TYPE_SHIFT;

    pub const TAG_HEADER_BITS: u8 = 0b11;

    #[inline]
    pub fn new_object(ty: ObjectType, aux: u16) -> Self {
        let ty_byte = (Self::TAG_HEADER_BITS & Self::TAG_MASK)
            | ((((ty as u8) & 0x1F) << Self::TYPE_SHIFT) & Self::TYPE_MASK);
        Header {
            ty: ty_byte,
            flags: HeaderFlags::empty(),
            aux,
            rc: 1,
        }
    }

    #[inline]
    pub fn tag(&self) -> ValueTag {
        match self.ty & Self::TAG_MASK {
            0b00 => ValueTag::Scalar,
            0b01 => ValueTag::Reference,
            0b11 => ValueTag::Header,
            _ => unreachable!("2-bit tag only"),
        }
    }

    #[inline]
    pub fn type_bits(&self) -> u8 {
        (self.ty & Self::TYPE_MASK) >> Self::TYPE_SHIFT
    }

    #[inline]
    pub fn object_type(&self) -> Option<ObjectType> {
        Some(match self.type_bits() {
            0b00001 => ObjectType::ScalarArray,
            0b00010 => ObjectType::Ctor,
            0b11111 => ObjectType::Max,
            _ => return None,
        })
    }

    #[inline]
    pub fn is_persistent(&self) -> bool {
        self.flags.contains(HeaderFlags::PERSISTENT)
    }

    /// Exempt the object from the refcount discipline for the rest of the
    /// process. Singleton cell values must be marked this way because guest
    /// code neither retains nor releases them.
    #[inline]
    pub fn mark_persistent(&mut self) {
        self.flags.insert(HeaderFlags::PERSISTENT);
    }

    #[inline]
    pub fn retain(&mut self) {
        if self.is_persistent() {
            return;
        }
        self.rc += 1;
    }

    #[inline]
    pub fn release(&mut self) {
        if self.is_persistent() {
            return;
        }
        // memory is never reclaimed in a single-shot process, only the
        // count is kept honest
        self.rc = self.rc.saturating_sub(1);
    }
}

impl Object for HeapValue {}
impl HeapObject for HeapValue {}

impl Object for u64 {}
impl PtrSizedObject for u64 {
    #[inline]
    fn to_ptr_sized(self) -> u64 {
        self
    }
    fn from_ptr_sized(value: u64) -> Self {
        value
    }
}

impl Object for usize {}
impl PtrSizedObject for usize {
    #[inline]
    fn to_ptr_sized(self) -> u64 {
        self as u64
    }
    fn from_ptr_sized(value: u64) -> Self {
        value as usize
    }
}

impl Object for i64 {}
impl PtrSizedObject for i64 {
    #[inline]
    fn to_ptr_sized(self) -> u64 {
        self.cast_unsigned()
    }
    fn from_ptr_sized(value: u64) -> Self {
        value.cast_signed()
    }
}
