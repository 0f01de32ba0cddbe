//! The host-facing entry point and its C ABI.
//!
//! `run(bytes) -> bytes` is the whole surface: bootstrap if needed, bridge
//! the input in, call the guest entry, bridge the result out. A guest
//! error is reported in-band as the fixed two-byte sentinel; genuine
//! results are provably never two bytes long, so the host can always tell
//! them apart. A bootstrap failure is not reportable in-band and aborts
//! the process.
//!
//! One exported symbol exists per bootstrap strategy, mirroring one built
//! artifact per variant. Each process uses exactly one of them.

use std::slice;

use log::error;
use parking_lot::Mutex;

use crate::{BootstrapError, Runtime, RuntimeCreateInfo, Strategy, array_view};

/// In-band guest failure marker. Guest results are empty or at least five
/// bytes, so a two-byte output is unambiguous.
pub const ERROR_SENTINEL: [u8; 2] = [0xDE, 0xAD];

impl Runtime {
    /// Execute the guest on `input`, bootstrapping first when this is the
    /// first call. The returned slice aliases the result object's payload
    /// (the output edge copies nothing) and stays valid as long as the
    /// runtime, objects never move or free.
    pub fn run(&mut self, input: &[u8]) -> Result<&[u8], BootstrapError> {
        self.bootstrap()?;

        let input_value = self.array_from_bytes(input).as_value();
        let guest = self.guest;
        let result = guest(self, input_value);

        // SAFETY: the guest returns values owned by this runtime
        match unsafe { array_view(result) } {
            Some(bytes) => Ok(bytes),
            None => {
                error!("guest returned an error object, reporting the sentinel");
                Ok(ERROR_SENTINEL.as_slice())
            }
        }
    }
}

/// The one runtime context of this process. Created lazily by the first
/// entry call with that call's strategy; later calls reuse it as-is.
static PROCESS_RUNTIME: Mutex<Option<Runtime>> = Mutex::new(None);

unsafe fn run_process(
    strategy: Strategy,
    input_ptr: *const u8,
    input_len: usize,
    output_ptr: *mut *const u8,
    output_len: *mut usize,
) {
    let input = if input_len == 0 {
        &[]
    } else {
        // SAFETY: caller passes a readable region of input_len bytes
        unsafe { slice::from_raw_parts(input_ptr, input_len) }
    };

    let mut slot = PROCESS_RUNTIME.lock();
    let runtime = slot.get_or_insert_with(|| {
        Runtime::new(RuntimeCreateInfo {
            strategy,
            ..Default::default()
        })
    });

    match runtime.run(input) {
        Ok(bytes) => {
            // SAFETY: caller passes writable output slots; the payload
            // pointer stays valid because the runtime lives in the
            // process slot and its objects never move
            unsafe {
                *output_ptr = bytes.as_ptr();
                *output_len = bytes.len();
            }
        }
        Err(err) => {
            // not reportable in-band, the runtime is unusable
            error!("bootstrap failed: {err:?}");
            std::process::abort();
        }
    }
}

/// Entry with full transitive initialization.
///
/// # Safety
/// `input_ptr` must be readable for `input_len` bytes (ignored when the
/// length is zero) and both output pointers must be writable.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn zunder_run_full(
    input_ptr: *const u8,
    input_len: usize,
    output_ptr: *mut *const u8,
    output_len: *mut usize,
) {
    // SAFETY: forwarded caller contract
    unsafe { run_process(Strategy::Full, input_ptr, input_len, output_ptr, output_len) }
}

/// Entry with full initialization behind the ordering workaround.
///
/// # Safety
/// Same contract as [`zunder_run_full`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn zunder_run_full_ordered(
    input_ptr: *const u8,
    input_len: usize,
    output_ptr: *mut *const u8,
    output_len: *mut usize,
) {
    // SAFETY: forwarded caller contract
    unsafe {
        run_process(
            Strategy::FullPreInit,
            input_ptr,
            input_len,
            output_ptr,
            output_len,
        )
    }
}

/// Entry with selective initialization.
///
/// # Safety
/// Same contract as [`zunder_run_full`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn zunder_run_selective(
    input_ptr: *const u8,
    input_len: usize,
    output_ptr: *mut *const u8,
    output_len: *mut usize,
) {
    // SAFETY: forwarded caller contract
    unsafe {
        run_process(
            Strategy::Selective,
            input_ptr,
            input_len,
            output_ptr,
            output_len,
        )
    }
}

#[cfg(test)]
mod entry_tests {
    use super::*;
    use crate::{Revision, guest_error};
    use std::ptr;

    fn runtime(strategy: Strategy) -> Runtime {
        Runtime::new(RuntimeCreateInfo {
            strategy,
            ..Default::default()
        })
    }

    #[test]
    fn full_and_selective_produce_identical_output() {
        let inputs: [&[u8]; 4] = [&[], &[0x00], &[0xFF; 32], b"request payload"];
        for input in inputs {
            let mut full = runtime(Strategy::Full);
            let mut selective = runtime(Strategy::Selective);
            let a = full.run(input).expect("full run").to_vec();
            let b = selective.run(input).expect("selective run").to_vec();
            assert_eq!(a, b, "outputs diverged for input {input:?}");
        }
    }

    #[test]
    fn ordered_full_matches_plain_full_on_the_clean_revision() {
        let input = [4u8, 8, 15, 16, 23, 42];
        let mut full = runtime(Strategy::Full);
        let mut ordered = runtime(Strategy::FullPreInit);
        assert_eq!(
            full.run(&input).expect("full run").to_vec(),
            ordered.run(&input).expect("ordered run").to_vec()
        );
    }

    #[test]
    fn empty_input_yields_empty_output() {
        let mut rt = runtime(Strategy::Selective);
        assert_eq!(rt.run(&[]).expect("run"), &[] as &[u8]);
    }

    #[test]
    fn guest_failure_yields_exactly_the_sentinel() {
        let mut rt = runtime(Strategy::Selective);
        rt.set_guest_entry(guest_error);
        assert_eq!(rt.run(&[1, 2, 3]).expect("run"), ERROR_SENTINEL.as_slice());
    }

    #[test]
    fn successful_output_is_never_sentinel_sized() {
        let mut rt = runtime(Strategy::Selective);
        for n in 0..16usize {
            let input = vec![0xDE; n];
            let len = rt.run(&input).expect("run").len();
            assert_ne!(len, ERROR_SENTINEL.len(), "ambiguous output for n = {n}");
        }
    }

    #[test]
    fn bootstrap_error_propagates_instead_of_panicking() {
        let mut rt = Runtime::new(RuntimeCreateInfo {
            strategy: Strategy::Full,
            revision: Revision::NeutralClockInit,
            ..Default::default()
        });
        assert!(rt.run(&[1]).is_err());
    }

    #[test]
    fn exported_entry_round_trips_through_raw_pointers() {
        let input = [10u8, 20, 30];
        let mut out_ptr: *const u8 = ptr::null();
        let mut out_len: usize = 0;

        let mut expected_rt = runtime(Strategy::Selective);
        let expected = expected_rt.run(&input).expect("run").to_vec();

        for _ in 0..2 {
            // SAFETY: valid input region and writable output slots
            unsafe {
                zunder_run_selective(input.as_ptr(), input.len(), &mut out_ptr, &mut out_len);
            }
            assert!(!out_ptr.is_null());
            // SAFETY: the entry reported out_len readable bytes at out_ptr
            let out = unsafe { slice::from_raw_parts(out_ptr, out_len) };
            assert_eq!(out, expected.as_slice());
        }
    }
}
