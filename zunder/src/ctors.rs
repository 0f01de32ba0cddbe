use std::mem;

use crate::{Header, HeapObject, HeapValue, Object, ObjectType, Value};

/// Constructor tag of a successful initializer result.
pub const CTOR_IO_OK: u16 = 0;
/// Constructor tag of a failed initializer result; the field carries the
/// error code as an unboxed scalar.
pub const CTOR_IO_ERROR: u16 = 1;
/// Constructor tag the guest entry point returns on internal failure.
/// Anything non-array-shaped triggers the sentinel path, this tag just
/// keeps the object self-describing.
pub const CTOR_GUEST_ERROR: u16 = 2;

/// A single-field constructor object. Initializer result tokens and the
/// guest's error representation are both built from this.
#[repr(C)]
#[derive(Debug)]
pub struct Ctor {
    pub header: Header,
    pub field: Value,
}

impl Ctor {
    /// Initialize with correct header and payload
    /// # Safety
    /// this sets metadata, should only be called internally
    pub unsafe fn init(&mut self, tag: u16, field: Value) {
        self.header = Header::new_object(ObjectType::Ctor, tag);
        self.field = field;
    }

    #[inline]
    pub fn tag(&self) -> u16 {
        self.header.aux
    }
}

impl Object for Ctor {}
impl HeapObject for Ctor {
    fn heap_size(&self) -> usize {
        mem::size_of::<Self>()
    }
}

fn ctor_tag_of(value: Value) -> Option<u16> {
    let tagged = value.as_tagged_object::<HeapValue>()?;
    // SAFETY: reference-tagged values point at live headers
    let obj = unsafe { tagged.as_ref() };
    if obj.header.object_type() == Some(ObjectType::Ctor) {
        return Some(obj.header.aux);
    }
    None
}

/// Status check the orchestrator applies to every result token it receives.
/// Only the constructor tag is inspected; a token carrying error code 0
/// still reports as an error here (the misreport the ordering workaround
/// exists for).
pub fn io_result_is_error(token: Value) -> bool {
    ctor_tag_of(token) == Some(CTOR_IO_ERROR)
}

/// Error code of a failed result token, if it is one.
pub fn io_result_error_code(token: Value) -> Option<u32> {
    if ctor_tag_of(token) != Some(CTOR_IO_ERROR) {
        return None;
    }
    // SAFETY: tag checked, the object is a Ctor
    let ctor = unsafe { token.as_tagged_object_unchecked::<Ctor>().as_ref() };
    let code = ctor.field.as_tagged_scalar::<u64>()?;
    Some(code.restore_u64() as u32)
}

/// Drop one reference to a transient result token. Scalars and persistent
/// objects are no-ops. Must be called exactly once per inspected token to
/// keep the count honest.
pub fn release_token(token: Value) {
    let Some(tagged) = token.as_tagged_object::<HeapValue>() else {
        return;
    };
    // SAFETY: tokens are live heap objects owned by the caller, execution
    // is single-threaded
    let obj = unsafe { tagged.as_mut() };
    obj.header.release();
}
