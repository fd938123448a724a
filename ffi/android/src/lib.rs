//! JNI entry points for a `HostApduService` answering payment terminals with the emulated card.
//!
//! The service forwards `processCommandApdu`, preference changes and `onDeactivated` here;
//! everything else (default payment app registration, preference UI) stays on the Java side.

#![allow(clippy::missing_safety_doc)]

#[macro_use]
extern crate log;
extern crate android_log;

use jni::objects::{JClass, JString};
use jni::sys::{jboolean, jbyteArray, jint, jstring, JNI_FALSE, JNI_TRUE};
use jni::JNIEnv;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use hcepay::settings::DEFAULT_SWIPE_DATA;
use hcepay::{card, Card};

const NULL: jbyteArray = 0 as jbyteArray;

static CARD: OnceCell<Card> = OnceCell::new();
static LAST_ERROR: Mutex<Option<String>> = parking_lot::const_mutex(None);

#[derive(thiserror::Error, Debug)]
enum Error {
    #[error("Card Error: {0}")]
    Card(#[from] card::Error),

    #[error("JNI Error: {0}")]
    Jni(#[from] jni::errors::Error),
}

fn unwrap_or<T>(result: Result<T, Error>, default: T) -> T {
    match result {
        Ok(value) => {
            *LAST_ERROR.lock() = None;
            value
        }
        Err(err) => {
            error!("{}", err);
            *LAST_ERROR.lock() = Some(err.to_string());
            default
        }
    }
}

fn card() -> &'static Card {
    CARD.get_or_init(|| {
        warn!("Card used before init, answering with the test card");
        Card::default()
    })
}

/// Reads a Java string, mapping null to None.
fn read_string(env: JNIEnv, str: JString) -> Result<Option<String>, Error> {
    if str.is_null() {
        return Ok(None);
    }

    Ok(Some(env.get_string(str)?.into()))
}

#[no_mangle]
pub extern "C" fn Java_io_hcepay_ffi_LibHcePay_init(
    env: JNIEnv,
    _class: JClass,
    swipe_data: JString,
) {
    let _ = android_log::init("HcePay");

    let swipe_data = unwrap_or(read_string(env, swipe_data), None);
    CARD.get_or_init(|| Card::new(swipe_data.as_deref().unwrap_or(DEFAULT_SWIPE_DATA)));

    info!("Card initialised");
}

#[no_mangle]
pub extern "C" fn Java_io_hcepay_ffi_LibHcePay_lastError(env: JNIEnv, _class: JClass) -> jstring {
    match LAST_ERROR.lock().clone() {
        Some(message) => unwrap_or(
            env.new_string(message)
                .map(|s| s.into_raw())
                .map_err(Error::Jni),
            0 as jstring,
        ),
        None => 0 as jstring,
    }
}

#[no_mangle]
pub extern "C" fn Java_io_hcepay_ffi_LibHcePay_processCommandApdu(
    env: JNIEnv,
    _class: JClass,
    command: jbyteArray,
) -> jbyteArray {
    unwrap_or(
        (|| -> Result<jbyteArray, Error> {
            let command = match command.is_null() {
                true => vec![],
                _ => env.convert_byte_array(command)?,
            };
            let response = card().handle(&command);

            Ok(env.byte_array_from_slice(&response)?)
        })(),
        NULL,
    )
}

#[no_mangle]
pub extern "C" fn Java_io_hcepay_ffi_LibHcePay_onSharedPreferenceChanged(
    env: JNIEnv,
    _class: JClass,
    key: JString,
    value: JString,
) -> jboolean {
    unwrap_or(
        (|| -> Result<jboolean, Error> {
            let key = read_string(env, key)?.unwrap_or_default();
            let value = read_string(env, value)?;

            card().on_setting_changed(&key, value.as_deref())?;

            Ok(JNI_TRUE)
        })(),
        JNI_FALSE,
    )
}

#[no_mangle]
pub extern "C" fn Java_io_hcepay_ffi_LibHcePay_onDeactivated(
    _env: JNIEnv,
    _class: JClass,
    reason: jint,
) {
    card().on_deactivated(reason.into());
}
