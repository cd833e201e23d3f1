//! Function-pointer tables handed to the protocol engine
//!
//! The engine is a C library. It calls back into the host through two
//! tables, each carrying an opaque `user_data` pointer that it passes back on
//! every call:
//!
//! - `CryptoProviderTable`: HMAC-SHA256 init / update / final / cleanup
//! - `LockingTable`: lock / unlock
//!
//! # Safety Design
//!
//! All unsafe pointer handling is confined to this module. Each trampoline:
//! 1. Recovers the Rust provider from `user_data` (null is rejected)
//! 2. Converts raw buffers to slices, rejecting null with non-zero length
//! 3. Converts the opaque HMAC pointer to a generation-checked `Handle`
//! 4. Catches panics so no unwind crosses the foreign boundary
//!
//! HMAC state is never exposed as a real pointer: the "pointer" the engine
//! holds is an encoded `Handle` and carries no provenance.

use std::ffi::c_void;
use std::os::raw::c_int;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::{ptr, slice};

use tracing::error;

use super::bridge::{CallbackError, CryptoProvider, Locking, SG_ERR_UNKNOWN, SG_SUCCESS};
use super::handles::Handle;

/// `void (*)(void *user_data)`
pub type LockFn = unsafe extern "C" fn(user_data: *mut c_void);

/// `int (*)(void **hmac_context, const uint8_t *key, size_t key_len, void *user_data)`
pub type HmacInitFn = unsafe extern "C" fn(
    hmac_context: *mut *mut c_void,
    key: *const u8,
    key_len: usize,
    user_data: *mut c_void,
) -> c_int;

/// `int (*)(void *hmac_context, const uint8_t *data, size_t data_len, void *user_data)`
pub type HmacUpdateFn = unsafe extern "C" fn(
    hmac_context: *mut c_void,
    data: *const u8,
    data_len: usize,
    user_data: *mut c_void,
) -> c_int;

/// `int (*)(void *hmac_context, digest_buffer **output, void *user_data)`
pub type HmacFinalFn = unsafe extern "C" fn(
    hmac_context: *mut c_void,
    output: *mut *mut DigestBuffer,
    user_data: *mut c_void,
) -> c_int;

/// `void (*)(void *hmac_context, void *user_data)`
pub type HmacCleanupFn = unsafe extern "C" fn(hmac_context: *mut c_void, user_data: *mut c_void);

/// Crypto provider callbacks registered with the engine
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct CryptoProviderTable {
    pub hmac_sha256_init_func: HmacInitFn,
    pub hmac_sha256_update_func: HmacUpdateFn,
    pub hmac_sha256_final_func: HmacFinalFn,
    pub hmac_sha256_cleanup_func: HmacCleanupFn,
    pub user_data: *mut c_void,
}

impl CryptoProviderTable {
    /// Build a table that dispatches to `provider`.
    ///
    /// # Safety
    ///
    /// `provider` must stay at the same address and outlive every call the
    /// engine makes through the returned table.
    pub unsafe fn for_provider<P: CryptoProvider>(provider: &P) -> Self {
        Self {
            hmac_sha256_init_func: hmac_sha256_init::<P>,
            hmac_sha256_update_func: hmac_sha256_update::<P>,
            hmac_sha256_final_func: hmac_sha256_final::<P>,
            hmac_sha256_cleanup_func: hmac_sha256_cleanup::<P>,
            user_data: ptr::from_ref(provider).cast_mut().cast(),
        }
    }
}

/// Locking callbacks registered with the engine
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct LockingTable {
    pub lock: LockFn,
    pub unlock: LockFn,
    pub user_data: *mut c_void,
}

impl LockingTable {
    /// Build a table that dispatches to `locking`.
    ///
    /// # Safety
    ///
    /// Same contract as [`CryptoProviderTable::for_provider`].
    pub unsafe fn for_locking<L: Locking>(locking: &L) -> Self {
        Self {
            lock: lock::<L>,
            unlock: unlock::<L>,
            user_data: ptr::from_ref(locking).cast_mut().cast(),
        }
    }
}

/// Digest returned by `hmac_sha256_final`; owned by the engine once returned.
///
/// Release with [`sigil_digest_buffer_free`].
#[repr(C)]
#[derive(Debug)]
pub struct DigestBuffer {
    len: usize,
    data: *mut u8,
}

impl DigestBuffer {
    fn into_raw(bytes: Vec<u8>) -> *mut DigestBuffer {
        let bytes = Box::into_raw(bytes.into_boxed_slice());
        Box::into_raw(Box::new(DigestBuffer {
            len: bytes.len(),
            data: bytes.cast(),
        }))
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: `data` and `len` come from a boxed slice created in
        // `into_raw` and released only in `Drop`.
        unsafe { slice::from_raw_parts(self.data, self.len) }
    }
}

impl Drop for DigestBuffer {
    fn drop(&mut self) {
        // SAFETY: reconstructs the boxed slice leaked by `into_raw`.
        drop(unsafe { Box::from_raw(ptr::slice_from_raw_parts_mut(self.data, self.len)) });
    }
}

/// Free a digest returned through `hmac_sha256_final`. Null is a no-op.
///
/// # Safety
///
/// `buffer` must be null or a pointer produced by this crate's
/// `hmac_sha256_final` callback that has not been freed yet.
#[no_mangle]
pub unsafe extern "C" fn sigil_digest_buffer_free(buffer: *mut DigestBuffer) {
    if !buffer.is_null() {
        // SAFETY: caller guarantees `buffer` came from `DigestBuffer::into_raw`.
        drop(unsafe { Box::from_raw(buffer) });
    }
}

// ============================================================================
// Trampolines
// ============================================================================

unsafe extern "C" fn hmac_sha256_init<P: CryptoProvider>(
    hmac_context: *mut *mut c_void,
    key: *const u8,
    key_len: usize,
    user_data: *mut c_void,
) -> c_int {
    guard(|| {
        // SAFETY: `user_data` was set from a live `&P` in `for_provider`.
        let provider = unsafe { user_ref::<P>(user_data) }?;
        if hmac_context.is_null() {
            return Err(CallbackError::InvalidArgument);
        }
        // SAFETY: the engine passes `key_len` readable bytes at `key`.
        let key = unsafe { byte_slice(key, key_len) }.ok_or(CallbackError::Unknown)?;

        let handle = provider.hmac_sha256_init(key)?;
        // SAFETY: checked non-null above; the engine owns the slot.
        unsafe { *hmac_context = handle_to_ptr(handle) };
        Ok(())
    })
}

unsafe extern "C" fn hmac_sha256_update<P: CryptoProvider>(
    hmac_context: *mut c_void,
    data: *const u8,
    data_len: usize,
    user_data: *mut c_void,
) -> c_int {
    guard(|| {
        // SAFETY: see `hmac_sha256_init`.
        let provider = unsafe { user_ref::<P>(user_data) }?;
        let handle = handle_from_ptr(hmac_context).ok_or(CallbackError::Computation)?;
        // SAFETY: the engine passes `data_len` readable bytes at `data`.
        let data = unsafe { byte_slice(data, data_len) }.ok_or(CallbackError::Computation)?;

        provider.hmac_sha256_update(handle, data)
    })
}

unsafe extern "C" fn hmac_sha256_final<P: CryptoProvider>(
    hmac_context: *mut c_void,
    output: *mut *mut DigestBuffer,
    user_data: *mut c_void,
) -> c_int {
    guard(|| {
        // SAFETY: see `hmac_sha256_init`.
        let provider = unsafe { user_ref::<P>(user_data) }?;
        if output.is_null() {
            return Err(CallbackError::InvalidArgument);
        }
        let handle = handle_from_ptr(hmac_context).ok_or(CallbackError::Unknown)?;

        let digest = provider.hmac_sha256_final(handle)?;
        // SAFETY: checked non-null above; ownership of the buffer moves to
        // the engine.
        unsafe { *output = DigestBuffer::into_raw(digest) };
        Ok(())
    })
}

unsafe extern "C" fn hmac_sha256_cleanup<P: CryptoProvider>(
    hmac_context: *mut c_void,
    user_data: *mut c_void,
) {
    guard_void("hmac_sha256_cleanup", || {
        // SAFETY: see `hmac_sha256_init`.
        match unsafe { user_ref::<P>(user_data) } {
            Ok(provider) => provider.hmac_sha256_cleanup(handle_from_ptr(hmac_context)),
            Err(_) => error!("hmac cleanup called without provider"),
        }
    })
}

unsafe extern "C" fn lock<L: Locking>(user_data: *mut c_void) {
    guard_void("lock", || {
        // SAFETY: `user_data` was set from a live `&L` in `for_locking`.
        match unsafe { user_ref::<L>(user_data) } {
            Ok(locking) => locking.lock(),
            Err(_) => error!("engine lock called without user data"),
        }
    })
}

unsafe extern "C" fn unlock<L: Locking>(user_data: *mut c_void) {
    guard_void("unlock", || {
        // SAFETY: see `lock`.
        match unsafe { user_ref::<L>(user_data) } {
            Ok(locking) => locking.unlock(),
            Err(_) => error!("engine unlock called without user data"),
        }
    })
}

// ============================================================================
// Helpers
// ============================================================================

fn guard(f: impl FnOnce() -> Result<(), CallbackError>) -> c_int {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => SG_SUCCESS,
        Ok(Err(e)) => e.code(),
        Err(_) => {
            error!("panic in engine crypto callback");
            SG_ERR_UNKNOWN
        }
    }
}

fn guard_void(name: &'static str, f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        error!(callback = name, "panic in engine callback");
    }
}

/// # Safety
///
/// `user_data` must be null or point to a live `T`.
unsafe fn user_ref<'a, T>(user_data: *mut c_void) -> Result<&'a T, CallbackError> {
    // SAFETY: forwarded to the caller.
    unsafe { user_data.cast::<T>().cast_const().as_ref() }.ok_or(CallbackError::InvalidArgument)
}

/// # Safety
///
/// If `data` is non-null it must point to `len` readable bytes.
unsafe fn byte_slice<'a>(data: *const u8, len: usize) -> Option<&'a [u8]> {
    if len == 0 {
        return Some(&[]);
    }
    if data.is_null() {
        return None;
    }
    // SAFETY: forwarded to the caller.
    Some(unsafe { slice::from_raw_parts(data, len) })
}

fn handle_to_ptr(handle: Handle) -> *mut c_void {
    ptr::without_provenance_mut(handle.to_raw())
}

fn handle_from_ptr(hmac_context: *mut c_void) -> Option<Handle> {
    Handle::from_raw(hmac_context.addr())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::bridge::{CryptoBridge, SG_ERR_INVAL};

    #[test]
    fn test_digest_buffer_roundtrip() {
        let raw = DigestBuffer::into_raw(vec![1, 2, 3]);
        // SAFETY: freshly allocated above.
        let buffer = unsafe { &*raw };
        assert_eq!(buffer.as_slice(), &[1, 2, 3]);
        assert_eq!(buffer.len(), 3);

        unsafe { sigil_digest_buffer_free(raw) };
        unsafe { sigil_digest_buffer_free(ptr::null_mut()) };
    }

    #[test]
    fn test_init_rejects_null_out_pointer() {
        let bridge = CryptoBridge::new();
        let table = unsafe { CryptoProviderTable::for_provider(&bridge) };

        let rc = unsafe {
            (table.hmac_sha256_init_func)(ptr::null_mut(), b"k".as_ptr(), 1, table.user_data)
        };
        assert_eq!(rc, SG_ERR_INVAL);
        assert_eq!(bridge.live_hmacs(), 0);
    }

    #[test]
    fn test_init_rejects_null_key_with_length() {
        let bridge = CryptoBridge::new();
        let table = unsafe { CryptoProviderTable::for_provider(&bridge) };
        let mut context: *mut c_void = ptr::null_mut();

        let rc = unsafe {
            (table.hmac_sha256_init_func)(&mut context, ptr::null(), 16, table.user_data)
        };
        assert_eq!(rc, SG_ERR_UNKNOWN);
        assert!(context.is_null());
    }

    #[test]
    fn test_null_user_data_is_rejected() {
        let bridge = CryptoBridge::new();
        let table = unsafe { CryptoProviderTable::for_provider(&bridge) };
        let mut context: *mut c_void = ptr::null_mut();

        let rc = unsafe {
            (table.hmac_sha256_init_func)(&mut context, b"k".as_ptr(), 1, ptr::null_mut())
        };
        assert_eq!(rc, SG_ERR_INVAL);
    }

    #[test]
    fn test_handle_pointer_roundtrip() {
        let bridge = CryptoBridge::new();
        let handle = bridge.hmac_sha256_init(b"key").unwrap();

        let opaque = handle_to_ptr(handle);
        assert!(!opaque.is_null());
        assert_eq!(handle_from_ptr(opaque), Some(handle));
        assert_eq!(handle_from_ptr(ptr::null_mut()), None);

        bridge.hmac_sha256_cleanup(Some(handle));
    }
}
