#![allow(clippy::missing_safety_doc)]

use std::ffi::{c_char, CStr, CString};
use std::mem::ManuallyDrop;
use std::ptr::null_mut;

use hcepay::Card;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;

static CARD: OnceCell<Card> = OnceCell::new();
static LAST_ERROR: Mutex<Option<String>> = parking_lot::const_mutex(None);

fn unwrap_or<T, E>(result: Result<T, E>, default: T) -> T
where
    E: ToString,
{
    // If result is an error, sets the message to LAST_ERROR.
    // Clears the last error otherwise.
    *LAST_ERROR.lock() = result.as_ref().err().map(|e| e.to_string());

    match result {
        Ok(value) => value,
        Err(_) => default,
    }
}

fn card() -> &'static Card {
    CARD.get_or_init(Card::default)
}

/// A struct represents a byte array.
/// Dependents can read it from ptr to ptr+len, and should ignore about cap.
/// ptr can be null pointer, so dependents must check the ptr is not null.
#[repr(C)]
#[derive(Copy, Clone)]
pub struct ByteArray {
    ptr: *mut u8,
    len: usize,
    cap: usize,
}

impl Default for ByteArray {
    fn default() -> Self {
        Self {
            ptr: null_mut(),
            len: 0,
            cap: 0,
        }
    }
}

impl From<Vec<u8>> for ByteArray {
    fn from(bytes: Vec<u8>) -> Self {
        let mut bytes = ManuallyDrop::new(bytes);
        Self {
            ptr: bytes.as_mut_ptr(),
            len: bytes.len(),
            cap: bytes.capacity(),
        }
    }
}

impl ByteArray {
    unsafe fn as_slice<'a>(&self) -> &'a [u8] {
        match self.ptr.is_null() {
            true => &[],
            _ => std::slice::from_raw_parts(self.ptr, self.len),
        }
    }
}

/// Initiates the card with the swipe data, or with the built-in test card if swipe_data is null.
/// Should be called once before answering any command; later calls have no effect.
#[no_mangle]
pub unsafe extern "C" fn hcepay_init(swipe_data: *const c_char) {
    match swipe_data.is_null() {
        true => CARD.get_or_init(Card::default),
        _ => {
            let swipe_data = CStr::from_ptr(swipe_data).to_string_lossy();
            CARD.get_or_init(|| Card::new(&swipe_data))
        }
    };
}

/// Returns the latest error occurred before calling this function.
/// If no error occurred before or failed to get the error, returns null pointer.
/// The string must be released with hcepay_string_free.
#[no_mangle]
pub extern "C" fn hcepay_last_error() -> *mut c_char {
    match LAST_ERROR.lock().clone().and_then(|e| CString::new(e).ok()) {
        Some(str) => str.into_raw(),
        None => null_mut(),
    }
}

/// Releases a string returned by this library.
#[no_mangle]
pub unsafe extern "C" fn hcepay_string_free(str: *mut c_char) {
    if !str.is_null() {
        let _ = CString::from_raw(str);
    }
}

/// Answers a command APDU received from the terminal.
/// The command stays owned by the caller; the response must be released with hcepay_byte_array_free.
#[no_mangle]
pub unsafe extern "C" fn hcepay_process_command_apdu(command: ByteArray) -> ByteArray {
    card().handle(command.as_slice()).into()
}

/// Rebuilds the Read Record response from new swipe data.
/// Returns false and keeps the previous response if the swipe data is not usable.
#[no_mangle]
pub unsafe extern "C" fn hcepay_on_swipe_data_changed(swipe_data: *const c_char) -> bool {
    if swipe_data.is_null() {
        return unwrap_or(Err("swipe_data is null"), false);
    }

    let swipe_data = CStr::from_ptr(swipe_data).to_string_lossy();

    unwrap_or(card().on_swipe_data_changed(&swipe_data).map(|_| true), false)
}

/// Tells the card the terminal went away.
#[no_mangle]
pub extern "C" fn hcepay_on_deactivated(reason: i32) {
    card().on_deactivated(reason.into());
}

/// Releases a byte array returned by this library.
#[no_mangle]
pub unsafe extern "C" fn hcepay_byte_array_free(bytes: ByteArray) {
    let ByteArray { ptr, len, cap } = bytes;

    if !ptr.is_null() {
        let _ = Vec::from_raw_parts(ptr, len, cap);
    }
}
