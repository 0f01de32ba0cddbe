use std::{alloc::Layout, mem, ptr};

use crate::{Header, HeapObject, Object, ObjectType, Tagged};

/// A variable-length array of raw scalars allocated in the object heap.
/// This is the runtime representation a byte buffer travels in: element
/// size 1, `size` bytes of payload, `capacity` bytes reserved.
///
/// The canonical empty array has size 0 and capacity 0. Guest code compares
/// against that shape structurally, so anything writing one of these into a
/// singleton cell must produce exactly it.
#[repr(C)]
#[derive(Debug)]
pub struct ScalarArray {
    pub header: Header,
    pub size: Tagged<usize>,
    pub capacity: Tagged<usize>,
    pub data: [u8; 0],
}

impl ScalarArray {
    pub const BYTE_ELEM: u16 = 1;

    pub fn required_layout(capacity: usize) -> Layout {
        let size = mem::size_of::<Self>() + capacity;
        // SAFETY: align is a power of two, size fits any real allocation
        unsafe { Layout::from_size_align_unchecked(size, mem::align_of::<Self>()) }
    }

    /// Initialize with correct header, size and capacity
    /// # Safety
    /// this sets metadata, should only be called internally, the memory
    /// allocation must hold at least `capacity` payload bytes
    pub unsafe fn init(&mut self, size: usize, capacity: usize) {
        self.header = Header::new_object(ObjectType::ScalarArray, Self::BYTE_ELEM);
        self.size = size.into();
        self.capacity = capacity.into();
    }

    /// Initialize with correct header, size, capacity and data
    /// # Safety
    /// same contract as [`ScalarArray::init`], data must fit the allocation
    pub unsafe fn init_data(&mut self, data: &[u8]) {
        let size = data.len();
        // SAFETY: same contract as above
        unsafe { self.init(size, size) };
        let own_data = self.data.as_mut_ptr();
        // SAFETY: allocated with at least `size` payload bytes
        unsafe { ptr::copy_nonoverlapping(data.as_ptr(), own_data, size) };
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size.into()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity.into()
    }

    #[inline]
    pub fn elem_size(&self) -> u16 {
        self.header.aux
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        let len = self.size();
        // SAFETY: the allocation holds at least `len` payload bytes
        unsafe { std::slice::from_raw_parts(self.data.as_ptr(), len) }
    }

    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        let len = self.size();
        // SAFETY: the allocation holds at least `len` payload bytes
        unsafe { std::slice::from_raw_parts_mut(self.data.as_mut_ptr(), len) }
    }
}

impl Object for ScalarArray {}
impl HeapObject for ScalarArray {
    fn heap_size(&self) -> usize {
        mem::size_of::<Self>() + self.capacity()
    }
}
