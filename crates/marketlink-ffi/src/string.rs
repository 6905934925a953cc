//! Owned-string protocol and string argument marshaling.
//!
//! Strings crossing the boundary in the native→host direction are
//! NUL-terminated allocations made here and released exactly once by the
//! caller through `free_string`. Null is "no value" and needs no release.
//! Strings in the host→native direction are borrowed for the duration of
//! the call and never retained.

use std::ffi::{c_char, CStr, CString};
use std::ptr;

use marketlink_core::{ExchangeError, Result};

/// Allocate an owned, NUL-terminated copy of `s` for the caller.
///
/// Interior NUL bytes cannot be represented; the (unreachable for our own
/// messages) fallback keeps the invariant that a non-null pointer is
/// always a valid C string.
pub(crate) fn owned_string(s: &str) -> *mut c_char {
    CString::new(s)
        .unwrap_or_else(|_| CString::new("string contained interior nul byte").unwrap())
        .into_raw()
}

/// Owned string for an optional value; null when absent.
pub(crate) fn opt_owned_string(s: Option<&str>) -> *mut c_char {
    s.map_or_else(ptr::null_mut, owned_string)
}

/// Read an owned string and release it in the same step.
///
/// Null yields the empty string. This is the single-use accessor the host
/// side uses for every non-streaming string, so "read" and "release"
/// cannot be separated by a failure path.
///
/// # Safety
///
/// `ptr` must be null or an unreleased pointer produced by this library.
/// The pointer is invalid after this call.
pub unsafe fn consume_cstring(ptr: *mut c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    // SAFETY: ptr is non-null and was allocated by CString::into_raw
    let owned = unsafe { CString::from_raw(ptr) };
    owned.to_string_lossy().into_owned()
}

/// Read an owned string into an optional; null means "no value".
///
/// # Safety
///
/// Same contract as [`consume_cstring`].
pub unsafe fn consume_opt_cstring(ptr: *mut c_char) -> Option<String> {
    if ptr.is_null() {
        None
    } else {
        // SAFETY: forwarded contract, ptr is non-null
        Some(unsafe { consume_cstring(ptr) })
    }
}

/// Borrow a required string argument for the duration of the call.
///
/// # Safety
///
/// `ptr` must be null or a valid NUL-terminated string that outlives the
/// returned borrow.
pub(crate) unsafe fn arg_str<'a>(ptr: *const c_char, name: &str) -> Result<&'a str> {
    if ptr.is_null() {
        return Err(ExchangeError::missing_parameter(name));
    }
    // SAFETY: ptr is non-null and NUL-terminated per the caller contract
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .map_err(|_| ExchangeError::invalid_argument(format!("{name} is not valid UTF-8")))
}

/// Borrow an optional string argument; null means "no value".
///
/// # Safety
///
/// Same contract as [`arg_str`].
pub(crate) unsafe fn opt_arg_str<'a>(ptr: *const c_char, name: &str) -> Result<Option<&'a str>> {
    if ptr.is_null() {
        Ok(None)
    } else {
        // SAFETY: forwarded contract, ptr is non-null
        Ok(Some(unsafe { arg_str(ptr, name)? }))
    }
}

/// Free a string allocated by this library.
///
/// # Arguments
///
/// * `s` - String pointer to free, or NULL
///
/// # Safety
///
/// `s` must be a pointer returned by a marketlink function, or NULL.
/// After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn free_string(s: *mut c_char) {
    if !s.is_null() {
        // SAFETY: s is non-null and was allocated by CString::into_raw
        drop(unsafe { CString::from_raw(s) });
    }
}

/// Get the marketlink library version.
///
/// # Returns
///
/// A pointer to a null-terminated version string. This is a static string
/// and should NOT be freed.
///
/// # Safety
///
/// The returned pointer is valid for the lifetime of the process.
#[no_mangle]
pub extern "C" fn marketlink_version() -> *const c_char {
    // Static string, never freed
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr().cast()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_string_null() {
        // Should not crash
        // SAFETY: Testing null handling
        unsafe {
            free_string(ptr::null_mut());
        }
    }

    #[test]
    fn test_owned_string_round_trip() {
        let ptr = owned_string("Hello, FFI!");
        // SAFETY: ptr was just created
        let retrieved = unsafe { CStr::from_ptr(ptr).to_str().unwrap() };
        assert_eq!(retrieved, "Hello, FFI!");
        // SAFETY: ptr is valid and unreleased
        unsafe { free_string(ptr) };
    }

    #[test]
    fn test_consume_reads_and_releases() {
        let ptr = owned_string("one shot");
        // SAFETY: ptr is valid and unreleased
        let value = unsafe { consume_cstring(ptr) };
        assert_eq!(value, "one shot");
        // ptr is now invalid; no second release.
    }

    #[test]
    fn test_consume_null_is_empty() {
        // SAFETY: null is explicitly allowed
        assert_eq!(unsafe { consume_cstring(ptr::null_mut()) }, "");
        // SAFETY: null is explicitly allowed
        assert_eq!(unsafe { consume_opt_cstring(ptr::null_mut()) }, None);
    }

    #[test]
    fn test_arg_str_null_is_missing_parameter() {
        // SAFETY: null is explicitly allowed
        let err = unsafe { arg_str(ptr::null(), "market") }.unwrap_err();
        assert!(matches!(err, ExchangeError::MissingParameter(_)));

        // SAFETY: null is explicitly allowed
        assert_eq!(unsafe { opt_arg_str(ptr::null(), "market") }.unwrap(), None);
    }

    #[test]
    fn test_version() {
        let ptr = marketlink_version();
        assert!(!ptr.is_null());

        // SAFETY: ptr points to a static string
        let version = unsafe { CStr::from_ptr(ptr).to_str().unwrap() };
        assert!(version.chars().any(|c| c.is_ascii_digit()));
    }
}
