use std::{alloc, alloc::Layout, ptr::NonNull};

use crate::{Ctor, Handle, HeapObject, ScalarArray, Value};

const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;
const OBJECT_ALIGN: usize = 8;

pub trait Allocator: Sized {
    fn allocate(&mut self, layout: Layout) -> NonNull<u8>;

    /// Allocate a new object and return it as a typed handle
    /// # Safety
    /// the caller must initialize the object before any read through the
    /// handle
    unsafe fn allocate_handle<T: HeapObject>(&mut self, layout: Layout) -> Handle<T> {
        let raw = self.allocate(layout);
        // SAFETY: by contract this will be initialized right after
        unsafe { Handle::from_ptr(raw.cast().as_ptr()) }
    }

    fn allocate_scalar_array(&mut self, data: &[u8]) -> Handle<ScalarArray> {
        let layout = ScalarArray::required_layout(data.len());
        // SAFETY: initialized immediately
        let mut arr = unsafe { self.allocate_handle::<ScalarArray>(layout) };
        // SAFETY: allocation sized for `data`
        unsafe { arr.init_data(data) };
        arr
    }

    fn allocate_scalar_array_zeroed(&mut self, size: usize) -> Handle<ScalarArray> {
        let layout = ScalarArray::required_layout(size);
        // SAFETY: initialized immediately, chunk memory is zeroed
        let mut arr = unsafe { self.allocate_handle::<ScalarArray>(layout) };
        // SAFETY: allocation sized for `size` bytes
        unsafe { arr.init(size, size) };
        arr
    }

    fn allocate_ctor(&mut self, tag: u16, field: Value) -> Handle<Ctor> {
        let layout = Layout::new::<Ctor>();
        // SAFETY: initialized immediately
        let mut obj = unsafe { self.allocate_handle::<Ctor>(layout) };
        // SAFETY: allocation sized for a Ctor
        unsafe { obj.init(tag, field) };
        obj
    }
}

#[derive(Debug, Default)]
pub struct HeapCreateInfo {
    /// Chunk size in bytes, rounded up to the default when zero.
    pub chunk_size: usize,
}

struct Chunk {
    base: NonNull<u8>,
    layout: Layout,
    top: usize,
}

/// Chunked bump heap for runtime objects. Objects are never individually
/// freed and never move; the guest process terminates as a unit, so the
/// only reclamation is dropping the whole heap with the runtime context.
pub struct Heap {
    chunks: Vec<Chunk>,
    chunk_size: usize,
}

impl Heap {
    pub fn new(info: HeapCreateInfo) -> Self {
        let chunk_size = if info.chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            info.chunk_size
        };
        Self {
            chunks: Vec::new(),
            chunk_size,
        }
    }

    fn grow(&mut self, at_least: usize) -> &mut Chunk {
        let size = self.chunk_size.max(at_least);
        // SAFETY: size is nonzero, align is a power of two
        let layout = unsafe { Layout::from_size_align_unchecked(size, OBJECT_ALIGN) };
        // SAFETY: layout is valid; zeroed so uninitialized payload reads
        // after a short init are defined
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let Some(base) = NonNull::new(raw) else {
            alloc::handle_alloc_error(layout)
        };
        self.chunks.push(Chunk {
            base,
            layout,
            top: 0,
        });
        self.chunks.last_mut().expect("chunk just pushed")
    }
}

impl Allocator for Heap {
    fn allocate(&mut self, layout: Layout) -> NonNull<u8> {
        debug_assert!(
            layout.align() <= OBJECT_ALIGN,
            "runtime objects are at most word aligned"
        );
        let size = layout.size().next_multiple_of(OBJECT_ALIGN);

        let needs_new = match self.chunks.last() {
            Some(chunk) => chunk.top + size > chunk.layout.size(),
            None => true,
        };
        let chunk = if needs_new {
            self.grow(size)
        } else {
            self.chunks.last_mut().expect("checked above")
        };

        // SAFETY: top + size fits the chunk
        let ptr = unsafe { chunk.base.as_ptr().add(chunk.top) };
        chunk.top += size;
        // SAFETY: offset into a live allocation is never null
        unsafe { NonNull::new_unchecked(ptr) }
    }
}

impl Drop for Heap {
    fn drop(&mut self) {
        for chunk in &self.chunks {
            // SAFETY: allocated with exactly this layout in grow()
            unsafe { alloc::dealloc(chunk.base.as_ptr(), chunk.layout) };
        }
    }
}

#[cfg(test)]
mod heap_tests {
    use super::*;

    #[test]
    fn allocations_are_aligned_and_disjoint() {
        let mut heap = Heap::new(HeapCreateInfo::default());
        let a = heap.allocate(Layout::from_size_align(24, 8).unwrap());
        let b = heap.allocate(Layout::from_size_align(3, 1).unwrap());
        let c = heap.allocate(Layout::from_size_align(24, 8).unwrap());

        assert_eq!(a.as_ptr() as usize % OBJECT_ALIGN, 0);
        assert_eq!(b.as_ptr() as usize % OBJECT_ALIGN, 0);
        assert_eq!(c.as_ptr() as usize % OBJECT_ALIGN, 0);
        assert!(b.as_ptr() as usize >= a.as_ptr() as usize + 24);
        assert!(c.as_ptr() as usize >= b.as_ptr() as usize + 3);
    }

    #[test]
    fn zeroed_array_starts_blank() {
        let mut heap = Heap::new(HeapCreateInfo::default());
        let arr = heap.allocate_scalar_array_zeroed(16);
        assert_eq!(arr.size(), 16);
        assert_eq!(arr.capacity(), 16);
        assert_eq!(arr.as_bytes(), &[0u8; 16]);
    }

    #[test]
    fn oversized_allocation_gets_its_own_chunk() {
        let mut heap = Heap::new(HeapCreateInfo { chunk_size: 128 });
        let big = heap.allocate(Layout::from_size_align(1024, 8).unwrap());
        // still usable memory
        // SAFETY: freshly allocated, in bounds
        unsafe { big.as_ptr().write_bytes(0xAB, 1024) };
    }

    #[test]
    fn existing_objects_stay_put_across_growth() {
        let mut heap = Heap::new(HeapCreateInfo { chunk_size: 64 });
        let first = heap.allocate_scalar_array(&[7; 16]);
        let first_ptr = first.as_ptr();
        for _ in 0..32 {
            let _ = heap.allocate_scalar_array(&[0; 16]);
        }
        assert_eq!(first.as_ptr(), first_ptr);
        assert_eq!(first.as_bytes(), &[7; 16]);
    }
}
