//! C ABI over the lattis decoder.
//!
//! Model contexts are exposed to foreign callers as opaque `i64` handles
//! backed by the decoder crate's registry, so a stale or released handle
//! yields an error code instead of undefined behavior. Memory rules:
//! - Handles: caller releases via [`lattis_release`]
//! - Strings returned by [`lattis_model_info`]: caller frees via
//!   [`lattis_string_free`]
//! - The [`lattis_last_error`] pointer is borrowed; it stays valid until
//!   the next failing call on any thread and must not be freed
//!
//! Status codes: `0` success, `1` completed without producing a lattice
//! (zero-length input, scoring failure or no viable path, with the reason
//! in the last-error slot), negative values are errors with a diagnostic
//! in the last-error slot.

use libc::c_char;
use std::ffi::{CStr, CString};
use std::path::Path;
use std::ptr;
use std::slice;
use std::sync::{Mutex, Once};
use tracing::info;

use lattis_decoder::{registry, DecodeError, DecodeSession, Handle, ModelContext};
use std::sync::Arc;

/// Decoded and the lattice was written
pub const LATTIS_OK: i32 = 0;
/// Call completed but no lattice was produced for the utterance
pub const LATTIS_NO_LATTICE: i32 = 1;
/// Null pointer, bad UTF-8 or negative size argument
pub const LATTIS_ERR_ARGUMENT: i32 = -1;
/// Handle was never issued or has been released
pub const LATTIS_ERR_HANDLE: i32 = -2;
/// Decode, archive or sink failure
pub const LATTIS_ERR_DECODE: i32 = -3;

// --- Error slot ---

static LAST_ERROR: Mutex<Option<CString>> = Mutex::new(None);

fn set_error(msg: impl Into<String>) {
    let msg = CString::new(msg.into())
        .unwrap_or_else(|_| CString::new("error message held interior NUL").unwrap());
    let mut slot = match LAST_ERROR.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    *slot = Some(msg);
}

fn code_for(err: &DecodeError) -> i32 {
    match err {
        DecodeError::UnknownHandle(_) => LATTIS_ERR_HANDLE,
        DecodeError::InvalidInput(_) => LATTIS_ERR_ARGUMENT,
        _ => LATTIS_ERR_DECODE,
    }
}

/// Borrowed pointer to the most recent error message, null if none.
/// Valid until the next failing call; do not free.
#[no_mangle]
pub extern "C" fn lattis_last_error() -> *const c_char {
    let slot = match LAST_ERROR.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    match slot.as_ref() {
        Some(msg) => msg.as_ptr(),
        None => ptr::null(),
    }
}

// --- Helpers ---

fn parse_cstr<'a>(ptr: *const c_char, what: &str) -> Result<&'a str, i32> {
    if ptr.is_null() {
        set_error(format!("{} pointer is null", what));
        return Err(LATTIS_ERR_ARGUMENT);
    }
    unsafe { CStr::from_ptr(ptr) }.to_str().map_err(|_| {
        set_error(format!("{} is not valid UTF-8", what));
        LATTIS_ERR_ARGUMENT
    })
}

fn to_cstring(s: String) -> *mut c_char {
    CString::new(s).map_or(ptr::null_mut(), |cs| cs.into_raw())
}

fn lookup(handle: i64) -> Result<Arc<ModelContext>, i32> {
    if handle <= 0 {
        set_error(format!("Invalid handle {}", handle));
        return Err(LATTIS_ERR_HANDLE);
    }
    registry::get(Handle::from_raw(handle as u64)).map_err(|e| {
        set_error(e.to_string());
        code_for(&e)
    })
}

fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

// --- Lifecycle ---

/// Load a model bundle (model stream, decode graph, word symbol table)
/// and register it. Returns a positive handle, or `0` on failure with the
/// diagnostic in the last-error slot. The loaded context is immutable and
/// may be used from any number of threads concurrently.
#[no_mangle]
pub extern "C" fn lattis_initialize(
    model_path: *const c_char,
    graph_path: *const c_char,
    symbols_path: *const c_char,
) -> i64 {
    init_tracing();

    let model = match parse_cstr(model_path, "model path") {
        Ok(s) => s,
        Err(_) => return 0,
    };
    let graph = match parse_cstr(graph_path, "graph path") {
        Ok(s) => s,
        Err(_) => return 0,
    };
    let symbols = match parse_cstr(symbols_path, "symbol table path") {
        Ok(s) => s,
        Err(_) => return 0,
    };

    match ModelContext::load(Path::new(model), Path::new(graph), Path::new(symbols)) {
        Ok(context) => {
            let handle = registry::register(Arc::new(context));
            info!("Model context registered as handle {}", handle.as_raw());
            handle.as_raw() as i64
        }
        Err(e) => {
            set_error(e.to_string());
            0
        }
    }
}

/// Release a handle. In-flight decode calls on the same handle finish
/// normally. Returns `0`, or an error code for an unknown handle.
#[no_mangle]
pub extern "C" fn lattis_release(handle: i64) -> i32 {
    if handle <= 0 {
        set_error(format!("Invalid handle {}", handle));
        return LATTIS_ERR_HANDLE;
    }
    match registry::release(Handle::from_raw(handle as u64)) {
        Ok(()) => {
            info!("Released model context handle {}", handle);
            LATTIS_OK
        }
        Err(e) => {
            set_error(e.to_string());
            code_for(&e)
        }
    }
}

/// Describe the loaded acoustic model. Returns a heap string the caller
/// must free with [`lattis_string_free`], or null for a bad handle.
#[no_mangle]
pub extern "C" fn lattis_model_info(handle: i64) -> *mut c_char {
    match lookup(handle) {
        Ok(context) => to_cstring(context.info()),
        Err(_) => ptr::null_mut(),
    }
}

/// Free a string returned by [`lattis_model_info`]. Null is a no-op.
///
/// # Safety
///
/// `s` must be a pointer previously returned by this library and not yet
/// freed.
#[no_mangle]
pub unsafe extern "C" fn lattis_string_free(s: *mut c_char) {
    if !s.is_null() {
        drop(unsafe { CString::from_raw(s) });
    }
}

// --- Decoding ---

/// Decode one utterance from a caller-owned feature buffer (row-major,
/// `frame_count` x `dimension` floats) and write its lattice to
/// `out_path` under `utterance_id`. The buffer is only read for the
/// duration of the call.
///
/// # Safety
///
/// `features` must point to at least `frame_count * dimension` readable
/// floats (it may be null when `frame_count` is zero).
#[no_mangle]
pub unsafe extern "C" fn lattis_decode(
    handle: i64,
    out_path: *const c_char,
    utterance_id: *const c_char,
    features: *const f32,
    frame_count: i32,
    dimension: i32,
) -> i32 {
    let out = match parse_cstr(out_path, "output path") {
        Ok(s) => s,
        Err(code) => return code,
    };
    let utt = match parse_cstr(utterance_id, "utterance id") {
        Ok(s) => s,
        Err(code) => return code,
    };
    if frame_count < 0 || dimension < 0 {
        set_error(format!(
            "Negative frame_count ({}) or dimension ({})",
            frame_count, dimension
        ));
        return LATTIS_ERR_ARGUMENT;
    }
    let len = frame_count as usize * dimension as usize;
    if features.is_null() && len > 0 {
        set_error("Feature buffer pointer is null");
        return LATTIS_ERR_ARGUMENT;
    }
    let buffer: &[f32] = if len == 0 {
        &[]
    } else {
        unsafe { slice::from_raw_parts(features, len) }
    };

    let context = match lookup(handle) {
        Ok(context) => context,
        Err(code) => return code,
    };
    let session = DecodeSession::with_defaults(context);
    match session.decode_buffer(out, utt, buffer, frame_count as usize, dimension as usize) {
        Ok(outcome) if outcome.success => LATTIS_OK,
        Ok(outcome) => {
            if let Some(reason) = outcome.reason {
                set_error(format!("{}: {}", utt, reason));
            }
            LATTIS_NO_LATTICE
        }
        Err(e) => {
            set_error(e.to_string());
            code_for(&e)
        }
    }
}

/// Decode every utterance of the keyed feature archive at `feature_path`
/// into one lattice archive at `out_path`. Returns the number of
/// utterances that produced no lattice (`0` when all succeeded), or a
/// negative error code when the archive or sink itself fails.
#[no_mangle]
pub extern "C" fn lattis_decode_with_feature_file(
    handle: i64,
    out_path: *const c_char,
    feature_path: *const c_char,
) -> i32 {
    let out = match parse_cstr(out_path, "output path") {
        Ok(s) => s,
        Err(code) => return code,
    };
    let feats = match parse_cstr(feature_path, "feature archive path") {
        Ok(s) => s,
        Err(code) => return code,
    };

    let context = match lookup(handle) {
        Ok(context) => context,
        Err(code) => return code,
    };
    let session = DecodeSession::with_defaults(context);
    match session.decode_archive(Path::new(feats), Path::new(out)) {
        Ok(stats) => i32::try_from(stats.num_fail).unwrap_or(i32::MAX),
        Err(e) => {
            set_error(e.to_string());
            code_for(&e)
        }
    }
}
