//! The guest compiled program, as the shim sees it: a single entry taking
//! the input bytes as a runtime value and returning a runtime value.
//!
//! The built-in transform stands in for a real compiled guest. It touches
//! every singleton cell in [`CellId::ALL`], which makes that list the
//! referenced-cell set the selective bootstrap must satisfy.

use crate::{Allocator, CTOR_GUEST_ERROR, CellId, Runtime, Value, array_view};

/// Guest compiled entry point, `input value -> result value`. The result
/// is a byte array on success, anything else counts as a guest error.
pub type GuestEntry = fn(&mut Runtime, Value) -> Value;

fn cell_scalar(rt: &Runtime, id: CellId) -> Option<u64> {
    rt.cells.get(id)?.as_tagged_scalar::<u64>().map(|t| t.restore_u64())
}

fn error(rt: &mut Runtime) -> Value {
    rt.allocate_ctor(CTOR_GUEST_ERROR, Value::zero()).as_value()
}

/// A keyed byte scramble with a trailing 4-byte checksum. Nonempty input
/// of n bytes always produces n + 4 bytes; empty input produces the
/// canonical empty array. Output length is therefore 0 or at least 5,
/// never the length of the error sentinel.
pub fn demo_transform(rt: &mut Runtime, input: Value) -> Value {
    // SAFETY: the input value was built from host bytes by this runtime
    let Some(bytes) = (unsafe { array_view(input) }) else {
        return error(rt);
    };

    if bytes.is_empty() {
        match rt.cells.get(CellId::EmptyBytes) {
            Some(empty) => return empty,
            None => return error(rt),
        }
    }

    let (Some(acc0), Some(sum0), Some(fold0)) = (
        cell_scalar(rt, CellId::IntZero),
        cell_scalar(rt, CellId::U32Zero),
        cell_scalar(rt, CellId::U64Zero),
    ) else {
        return error(rt);
    };

    // the result lives in the object heap from the start, no staging copy
    let mut out = rt.allocate_scalar_array_zeroed(bytes.len() + 4);
    let payload = out.as_bytes_mut();

    let mut acc = acc0 as u8;
    let mut sum = sum0 as u32;
    for (slot, &b) in payload.iter_mut().zip(bytes) {
        acc = acc.wrapping_mul(31).wrapping_add(b);
        *slot = b ^ acc;
        sum = sum.wrapping_add(b as u32);
    }
    let checksum = (sum as u64).wrapping_add(fold0) as u32;
    payload[bytes.len()..].copy_from_slice(&checksum.to_le_bytes());

    out.as_value()
}

/// A guest that always fails. Tests use it to force the sentinel path.
pub fn guest_error(rt: &mut Runtime, _input: Value) -> Value {
    error(rt)
}

#[cfg(test)]
mod guest_tests {
    use super::*;
    use crate::{HeapValue, ObjectType, RuntimeCreateInfo};

    fn ready_runtime() -> Runtime {
        let mut rt = Runtime::new(RuntimeCreateInfo::default());
        rt.bootstrap().expect("bootstrap");
        rt
    }

    fn transform(rt: &mut Runtime, input: &[u8]) -> Vec<u8> {
        let value = rt.array_from_bytes(input).as_value();
        let result = demo_transform(rt, value);
        // SAFETY: the result is live in `rt`
        unsafe { array_view(result) }.expect("byte array result").to_vec()
    }

    #[test]
    fn nonempty_input_gains_exactly_the_checksum() {
        let mut rt = ready_runtime();
        for n in [1usize, 2, 3, 64] {
            let out = transform(&mut rt, &vec![0xA5; n]);
            assert_eq!(out.len(), n + 4);
        }
    }

    #[test]
    fn empty_input_returns_the_canonical_empty_array() {
        let mut rt = ready_runtime();
        let value = rt.array_from_bytes(&[]).as_value();
        let result = demo_transform(&mut rt, value);
        assert_eq!(
            Some(result),
            rt.cells.get(CellId::EmptyBytes),
            "must be the cell value itself, not a fresh empty array"
        );
    }

    #[test]
    fn transform_is_deterministic() {
        let mut a = ready_runtime();
        let mut b = ready_runtime();
        let input: Vec<u8> = (0..=255).collect();
        assert_eq!(transform(&mut a, &input), transform(&mut b, &input));
    }

    #[test]
    fn failing_guest_returns_an_error_object() {
        let mut rt = ready_runtime();
        let input = rt.array_from_bytes(&[1, 2, 3]).as_value();
        let result = guest_error(&mut rt, input);
        let tagged = result.as_tagged_object::<HeapValue>().expect("heap object");
        // SAFETY: just allocated in `rt`
        let obj = unsafe { tagged.as_ref() };
        assert_ne!(obj.header.object_type(), Some(ObjectType::ScalarArray));
    }
}
