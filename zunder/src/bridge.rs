//! Byte bridge between the host-facing ABI and runtime objects.
//!
//! The input edge pays exactly one copy: host bytes land in a fresh
//! scalar array the guest can own. The output edge pays none: the entry
//! point hands out a view straight into the result object's payload,
//! which is sound because heap objects never move and never free.

use crate::{Allocator, Handle, HeapValue, ObjectType, Runtime, ScalarArray, Value};

impl Runtime {
    /// Copy host bytes into a fresh scalar array of byte elements.
    pub fn array_from_bytes(&mut self, bytes: &[u8]) -> Handle<ScalarArray> {
        self.allocate_scalar_array(bytes)
    }
}

/// Borrow the payload of a byte-array value without copying. `None` when
/// the value is a scalar, a non-array object, or an array of wider
/// elements.
///
/// # Safety
/// A reference-tagged `value` must point at a live heap object; the
/// returned slice aliases that object and is valid for as long as it is.
pub unsafe fn array_view<'a>(value: Value) -> Option<&'a [u8]> {
    let tagged = value.as_tagged_object::<HeapValue>()?;
    // SAFETY: caller guarantees the object is live
    let obj = unsafe { tagged.as_ref() };
    if obj.header.object_type() != Some(ObjectType::ScalarArray) {
        return None;
    }
    // SAFETY: object type checked just above
    let arr = unsafe { value.as_tagged_object_unchecked::<ScalarArray>().as_ref() };
    if arr.elem_size() != ScalarArray::BYTE_ELEM {
        return None;
    }
    Some(arr.as_bytes())
}

#[cfg(test)]
mod bridge_tests {
    use super::*;
    use crate::{CTOR_IO_OK, RuntimeCreateInfo};

    #[test]
    fn input_edge_copies_host_bytes() {
        let mut rt = Runtime::new(RuntimeCreateInfo::default());
        let host = [1u8, 2, 3, 4, 5];
        let arr = rt.array_from_bytes(&host);
        assert_eq!(arr.as_bytes(), &host);
        assert_eq!(arr.size(), host.len());
        assert_eq!(arr.capacity(), host.len());
    }

    #[test]
    fn view_aliases_the_array_payload() {
        let mut rt = Runtime::new(RuntimeCreateInfo::default());
        let arr = rt.array_from_bytes(&[9, 8, 7]);
        let value = arr.as_value();

        // SAFETY: the array is live in `rt`
        let view = unsafe { array_view(value) }.expect("byte array");
        assert_eq!(view, &[9, 8, 7]);
        assert_eq!(view.as_ptr(), arr.as_bytes().as_ptr(), "no copy");
    }

    #[test]
    fn view_rejects_scalars_and_foreign_objects() {
        let mut rt = Runtime::new(RuntimeCreateInfo::default());
        // SAFETY: scalar, never dereferenced
        assert_eq!(unsafe { array_view(Value::from_scalar(7)) }, None);

        let ctor = rt.allocate_ctor(CTOR_IO_OK, Value::zero()).as_value();
        // SAFETY: the ctor is live in `rt`
        assert_eq!(unsafe { array_view(ctor) }, None);
    }
}
