//! Unwrap helpers with good error messages.
//!
//! These replace `unwrap_err()` in test code. `#[track_caller]` points
//! panics at the test line, not here.

use std::fmt::Debug;

/// Unwrap the error of a `Result` that is expected to fail.
///
/// ```rust
/// use smbusb_test_helpers::must_err;
///
/// let result: Result<u8, &str> = Err("nack");
/// assert_eq!(must_err(result), "nack");
/// ```
///
/// # Panics
///
/// Panics if the result is `Ok`.
#[track_caller]
pub fn must_err<T: Debug, E>(result: Result<T, E>) -> E {
    match result {
        Ok(v) => panic!("must_err: unexpected Ok: {v:?}"),
        Err(e) => e,
    }
}
