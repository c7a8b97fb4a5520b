//! Byte-level (re)interpretation helpers for the `repr(C, packed)` on-disk structures.
//!
//! Every structure this crate parses off disk is built only from integers and byte arrays, so
//! reinterpreting it as a byte slice (and back) is well-defined as long as the size matches
//! exactly; this mirrors the teacher's `reinterpret`/`mem::zeroed` + `slice::from_raw_parts`
//! idiom rather than pulling in a serialization crate for fixed, packed binary records.

use std::mem::{size_of, zeroed};
use std::slice;

/// Views `v` as its raw on-disk byte representation.
pub(crate) fn as_bytes<T>(v: &T) -> &[u8] {
    unsafe { slice::from_raw_parts(v as *const T as *const u8, size_of::<T>()) }
}

/// Builds a `T` by zero-initializing it and copying `buf` over its raw bytes.
///
/// `buf` may be shorter than `size_of::<T>()`; this is how a 128-byte on-disk inode record is
/// loaded into an in-memory layout with reserved trailing fields the format doesn't define for
/// revision 0.
pub(crate) fn from_bytes_prefix<T>(buf: &[u8]) -> T {
    debug_assert!(buf.len() <= size_of::<T>());
    unsafe {
        let mut v: T = zeroed();
        let dst = slice::from_raw_parts_mut(&mut v as *mut T as *mut u8, size_of::<T>());
        dst[..buf.len()].copy_from_slice(buf);
        v
    }
}
