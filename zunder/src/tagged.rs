//! Value: any raw runtime value, unboxed scalar or reference
//!
//! Tagged<T>: same layout as Value but typed, not safe to dereference on
//! its own
//!
//! Handle<T>: untagged reference to a heap object, safe to use for the
//! lifetime of the runtime (the heap never moves or frees objects), also
//! implements Deref and DerefMut
use std::{
    marker::PhantomData,
    ops::{Deref, DerefMut},
};

use crate::{HeapObject, Object, PtrSizedObject, ValueTag};

pub const VALUE_TAG_MASK: u64 = 0b11;

/// A generic runtime value
#[repr(transparent)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Value(u64);

/// A tagged value, same memory layout as Value but typed
#[derive(Debug)]
pub struct Tagged<T: Object> {
    data: u64,
    _marker: PhantomData<*mut T>,
}

/// Untagged reference to a heap object
#[derive(Debug)]
pub struct Handle<T: Object> {
    data: u64,
    _marker: PhantomData<*mut T>,
}

// custom clone, default would consider "owning" T but this represents a
// pointer to a T, not T itself
impl<T: Object> Clone for Tagged<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: Object> Copy for Tagged<T> {}

impl<T: Object> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: Object> Copy for Handle<T> {}

impl Value {
    pub fn from_scalar(value: i64) -> Self {
        let casted = value.cast_unsigned();
        Self(casted << 1)
    }

    pub fn from_u64(value: u64) -> Self {
        Self(value << 1)
    }

    pub fn zero() -> Self {
        Self::from_u64(0)
    }

    /// The world token threaded through module initializers.
    pub fn unit() -> Self {
        Self::zero()
    }

    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }

    pub fn is_scalar(&self) -> bool {
        self.0 & 0b1 == ValueTag::Scalar as u64
    }

    pub fn is_object(&self) -> bool {
        self.0 & VALUE_TAG_MASK == ValueTag::Reference as u64
    }

    pub fn as_tagged_scalar<T: PtrSizedObject>(self) -> Option<Tagged<T>> {
        if self.is_scalar() {
            // SAFETY: we tested this
            let tagged = unsafe { Tagged::new_raw(self.0) };
            return Some(tagged);
        }
        None
    }

    pub fn as_tagged_object<T: HeapObject>(self) -> Option<Tagged<T>> {
        if self.is_object() {
            // SAFETY: we tested this
            let tagged = unsafe { Tagged::new_raw(self.0) };
            return Some(tagged);
        }
        None
    }

    /// # Safety
    /// caller must have checked that this is a heap object
    pub unsafe fn as_tagged_object_unchecked<T: HeapObject>(self) -> Tagged<T> {
        // SAFETY: by contract this is a T
        unsafe { Tagged::new_raw(self.0) }
    }
}

impl<T: Object> Tagged<T> {
    #[inline]
    const unsafe fn new_raw(value: u64) -> Self {
        Self {
            data: value,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub fn as_value(&self) -> Value {
        Value(self.data)
    }

    #[inline]
    pub fn raw(self) -> u64 {
        self.data
    }
}

impl<T: PtrSizedObject> Tagged<T> {
    #[inline]
    pub fn new_value(value: T) -> Self {
        let value = value.to_ptr_sized();
        let tagged = value << 1;
        unsafe { Self::new_raw(tagged) }
    }

    pub fn restore_u64(self) -> u64 {
        self.data >> 1
    }
}

impl<T: HeapObject> Tagged<T> {
    #[inline]
    pub fn new_ptr(ptr: *mut T) -> Self {
        let value = ptr as u64;
        debug_assert_eq!(
            value & VALUE_TAG_MASK,
            0,
            "pointer must be aligned so low 2 bits are free"
        );
        let tagged = value | (ValueTag::Reference as u64);
        unsafe { Self::new_raw(tagged) }
    }

    #[inline]
    pub fn as_ptr(self) -> *mut T {
        let untagged = self.data & !(ValueTag::Reference as u64);
        untagged as _
    }

    /// Get a reference to a T
    /// # Safety
    /// the tagged value must point at a live, correctly typed heap object
    #[inline]
    pub unsafe fn as_ref<'a>(self) -> &'a T {
        debug_assert_eq!(
            self.data & VALUE_TAG_MASK,
            ValueTag::Reference as u64,
            "Tagged is not a valid pointer"
        );
        let untagged = self.data & !(ValueTag::Reference as u64);
        let ptr = untagged as *const T;
        // SAFETY: by contract this is a live T
        unsafe { &*ptr }
    }

    /// Get a mutable reference to a T
    /// # Safety
    /// same contract as [`Tagged::as_ref`], and the caller must guarantee
    /// exclusive access
    #[inline]
    pub unsafe fn as_mut<'a>(self) -> &'a mut T {
        debug_assert_eq!(
            self.data & VALUE_TAG_MASK,
            ValueTag::Reference as u64,
            "Tagged is not a valid pointer"
        );
        let untagged = self.data & !(ValueTag::Reference as u64);
        let ptr = untagged as *mut T;
        // SAFETY: by contract this is a live T
        unsafe { &mut *ptr }
    }
}

impl Tagged<i64> {
    pub fn as_i64(self) -> i64 {
        i64::from(self)
    }
}

impl<T: Object> From<Tagged<T>> for Value {
    fn from(value: Tagged<T>) -> Self {
        value.as_value()
    }
}

impl<T: PtrSizedObject> From<T> for Tagged<T> {
    #[inline]
    fn from(value: T) -> Self {
        Self::new_value(value)
    }
}

impl<T: Object> Handle<T> {
    /// Create a handle from a pointer
    /// # Safety
    /// the pointer must be a valid heap object
    pub unsafe fn from_ptr(ptr: *mut T) -> Self {
        Self {
            data: ptr as _,
            _marker: PhantomData,
        }
    }
}

impl<T: Object> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

impl<T: HeapObject> Handle<T> {
    #[inline]
    pub fn as_object(self) -> Tagged<T> {
        let raw = self.data;
        let tagged = raw | (ValueTag::Reference as u64);
        unsafe { Tagged::new_raw(tagged) }
    }

    #[inline]
    pub fn as_value(self) -> Value {
        self.as_object().as_value()
    }

    #[inline]
    pub fn as_ptr(self) -> *mut T {
        self.data as _
    }
}

impl Value {
    /// Promote a reference-tagged value back to a handle
    /// # Safety
    /// must be a reference-tagged value pointing at a live T
    pub unsafe fn as_handle_unchecked<T: HeapObject>(self) -> Handle<T> {
        let untagged = self.0 & !(ValueTag::Reference as u64);
        Handle {
            data: untagged,
            _marker: PhantomData,
        }
    }
}

impl<T: PtrSizedObject> From<Tagged<T>> for u64 {
    #[inline]
    fn from(value: Tagged<T>) -> Self {
        let untagged = value.data >> 1;
        Self::from_ptr_sized(untagged)
    }
}

impl<T: PtrSizedObject> From<Tagged<T>> for usize {
    #[inline]
    fn from(value: Tagged<T>) -> Self {
        let untagged = value.data >> 1;
        Self::from_ptr_sized(untagged)
    }
}

impl<T: PtrSizedObject> From<Tagged<T>> for i64 {
    #[inline]
    fn from(value: Tagged<T>) -> Self {
        let untagged = value.data >> 1;
        Self::from_ptr_sized(untagged)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::from_scalar(value)
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Value::from_u64(value)
    }
}

impl<T: HeapObject> Deref for Handle<T> {
    type Target = T;
    fn deref(&self) -> &Self::Target {
        // SAFETY: handles are only created from live heap objects and the
        // heap never moves or frees them
        unsafe { &*self.as_ptr() }
    }
}

impl<T: HeapObject> DerefMut for Handle<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        // SAFETY: same as Deref, execution is single-threaded
        unsafe { &mut *self.as_ptr() }
    }
}

impl Object for Value {}

#[cfg(test)]
mod value_tests {
    use super::*;
    use crate::HeapObject;

    #[repr(C)]
    struct TestObj {
        header: crate::Header,
        n: i64,
    }

    impl Object for TestObj {}
    impl HeapObject for TestObj {}

    fn boxed_test_obj(n: i64) -> Box<TestObj> {
        Box::new(TestObj {
            header: crate::Header::new_object(crate::ObjectType::Ctor, 0),
            n,
        })
    }

    #[test]
    fn value_from_scalar_sets_low_bit_zero_and_reports_scalar() {
        let v = Value::from_scalar(42);
        assert_eq!(v.raw() & 0b1, 0);

        assert!(v.is_scalar(), "expected Value::is_scalar for scalars");
        assert!(!v.is_object(), "scalar must not be reported as reference");
    }

    #[test]
    fn scalar_roundtrip_i64() {
        let t: Tagged<i64> = Tagged::new_value(-123);
        let v: Value = Value::from(t);
        assert!(v.is_scalar());

        let back = v.as_tagged_scalar::<i64>().expect("should be scalar");
        assert_eq!(back.as_i64(), -123);
    }

    #[test]
    fn scalar_roundtrip_usize() {
        let val = 0x1234usize;
        let tagged: Tagged<usize> = val.into();
        let orig: usize = tagged.into();
        assert_eq!(val, orig);
    }

    #[test]
    fn tagged_ptr_roundtrip_and_value_detection() {
        let mut obj = boxed_test_obj(7);
        let raw: *mut TestObj = &mut *obj;

        let tagged_ptr: Tagged<TestObj> = Tagged::new_ptr(raw);
        assert_eq!(tagged_ptr.raw() & VALUE_TAG_MASK, ValueTag::Reference as u64);
        assert_eq!(tagged_ptr.as_ptr(), raw);

        let v: Value = Value::from(tagged_ptr);
        assert!(v.is_object());
        assert!(!v.is_scalar(), "reference must not be reported as scalar");

        let t2 = v.as_tagged_object::<TestObj>().expect("should recover tagged object");
        assert_eq!(t2.as_ptr(), raw);
    }

    #[test]
    fn handle_deref_and_mutation() {
        let mut boxed = boxed_test_obj(10);
        let ptr = &mut *boxed as *mut TestObj;

        let handle: Handle<TestObj> = unsafe { Handle::from_ptr(ptr) };
        assert_eq!(handle.n, 10);

        {
            let mut h2 = handle;
            h2.n = 123;
        }
        assert_eq!(unsafe { (*ptr).n }, 123);
    }

    #[test]
    fn handle_value_roundtrip() {
        let mut boxed = boxed_test_obj(5);
        let ptr = &mut *boxed as *mut TestObj;

        let handle: Handle<TestObj> = unsafe { Handle::from_ptr(ptr) };
        let v = handle.as_value();
        assert!(v.is_object());

        let back: Handle<TestObj> = unsafe { v.as_handle_unchecked() };
        assert_eq!(back.as_ptr(), ptr);
    }

    #[test]
    fn unit_is_the_scalar_zero() {
        assert_eq!(Value::unit(), Value::from_scalar(0));
        assert_eq!(Value::unit().raw(), 0);
    }
}
