//! FFI layer for mobile hosts.
//!
//! C-compatible functions over a [`SyncEngine`]. The host owns all IO: it
//! performs the effects returned by `swizil_engine_dispatch`,
//! `swizil_engine_set_connected` and `swizil_engine_settle`, and reports each
//! outcome back through `swizil_engine_settle`. All data crosses the boundary
//! as JSON strings.
//!
//! # Memory Management
//!
//! - Strings returned by `swizil_*` functions are allocated by Rust
//! - Caller must free them with `swizil_string_free`
//! - Engine pointers must be freed with `swizil_engine_free`
//!
//! # Error Handling
//!
//! Functions return JSON with either:
//! - `{"ok": <result>}` on success
//! - `{"error": "<message>"}` on failure

use crate::{Command, Completion, EngineSnapshot, Effect, ItemFields, ItemId, SnapshotMetadata, SyncEngine};
use serde::de::DeserializeOwned;
use std::ffi::{c_char, CStr, CString};
use std::ptr;

/// Result wrapper for FFI responses.
#[derive(serde::Serialize)]
#[serde(untagged)]
enum FfiResult<T: serde::Serialize> {
    Ok { ok: T },
    Err { error: String },
}

impl<T: serde::Serialize> FfiResult<T> {
    fn ok(value: T) -> Self {
        FfiResult::Ok { ok: value }
    }

    fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|e| format!(r#"{{"error":"serialization failed: {}"}}"#, e))
    }
}

fn error_json(message: impl Into<String>) -> *mut c_char {
    to_c_string(
        FfiResult::<()>::Err {
            error: message.into(),
        }
        .to_json(),
    )
}

fn ok_json<T: serde::Serialize>(value: T) -> *mut c_char {
    to_c_string(FfiResult::ok(value).to_json())
}

/// Convert a Rust string to a C string pointer.
/// Caller must free with `swizil_string_free`.
fn to_c_string(s: String) -> *mut c_char {
    match CString::new(s) {
        Ok(cs) => cs.into_raw(),
        Err(_) => CString::from(c"{\"error\":\"string contained null bytes\"}").into_raw(),
    }
}

/// Convert a C string pointer to a Rust string.
/// Returns None if pointer is null or invalid UTF-8.
unsafe fn from_c_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Parse a JSON argument, describing the failure as an error message.
unsafe fn parse_arg<T: DeserializeOwned>(
    ptr: *const c_char,
    what: &str,
) -> std::result::Result<T, String> {
    let json = from_c_string(ptr).ok_or_else(|| format!("invalid {what} JSON"))?;
    serde_json::from_str(&json).map_err(|e| format!("parse error: {}", e))
}

// ============================================================================
// Engine Lifecycle
// ============================================================================

/// Create a new, empty, offline engine.
///
/// # Safety
/// Caller must free the returned pointer with `swizil_engine_free`.
#[no_mangle]
pub extern "C" fn swizil_engine_new() -> *mut SyncEngine {
    Box::into_raw(Box::new(SyncEngine::new()))
}

/// Create an offline engine from a persisted snapshot.
///
/// # Returns
/// Pointer to the engine, or null if the snapshot is missing or invalid.
///
/// # Safety
/// - `snapshot_json` must be a valid null-terminated C string or null
/// - Caller must free the returned pointer with `swizil_engine_free`
#[no_mangle]
pub unsafe extern "C" fn swizil_engine_restore(snapshot_json: *const c_char) -> *mut SyncEngine {
    let snapshot_str = match from_c_string(snapshot_json) {
        Some(s) => s,
        None => return ptr::null_mut(),
    };

    let engine = EngineSnapshot::from_json(&snapshot_str).and_then(SyncEngine::from_snapshot);
    match engine {
        Ok(engine) => Box::into_raw(Box::new(engine)),
        Err(_) => ptr::null_mut(),
    }
}

/// Free an engine.
///
/// # Safety
/// - `engine` must be a valid pointer from `swizil_engine_new` or
///   `swizil_engine_restore`
/// - Must not be called twice on the same pointer
#[no_mangle]
pub unsafe extern "C" fn swizil_engine_free(engine: *mut SyncEngine) {
    if !engine.is_null() {
        drop(Box::from_raw(engine));
    }
}

/// Free a string allocated by the engine.
///
/// # Safety
/// - `s` must be a valid pointer from a `swizil_*` function
/// - Must not be called twice on the same pointer
#[no_mangle]
pub unsafe extern "C" fn swizil_string_free(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}

// ============================================================================
// Engine Transitions
// ============================================================================

/// Process a user action.
///
/// # Arguments
/// - `command_json`: JSON string of Command
/// - `now`: Timestamp in milliseconds
///
/// # Returns
/// JSON string: `{"ok": [Effect]}` or `{"error": "message"}`
///
/// # Safety
/// - `engine` must be a valid engine pointer or null
/// - `command_json` must be a valid null-terminated C string or null
/// - Caller must free the returned string with `swizil_string_free`
#[no_mangle]
pub unsafe extern "C" fn swizil_engine_dispatch(
    engine: *mut SyncEngine,
    command_json: *const c_char,
    now: u64,
) -> *mut c_char {
    let engine = match engine.as_mut() {
        Some(e) => e,
        None => return error_json("null engine pointer"),
    };

    match parse_arg::<Command>(command_json, "command") {
        Ok(command) => ok_json(engine.dispatch(command, now)),
        Err(e) => error_json(e),
    }
}

#[derive(serde::Serialize)]
struct CreateResponse {
    id: ItemId,
    effects: Vec<Effect>,
}

/// Create an item and return its temporary identifier.
///
/// # Returns
/// JSON string: `{"ok": {"id": "temp-N", "effects": [Effect]}}` or
/// `{"error": "message"}`
///
/// # Safety
/// - `engine` must be a valid engine pointer or null
/// - `fields_json` must be a valid null-terminated C string or null
/// - Caller must free the returned string with `swizil_string_free`
#[no_mangle]
pub unsafe extern "C" fn swizil_engine_create(
    engine: *mut SyncEngine,
    fields_json: *const c_char,
    now: u64,
) -> *mut c_char {
    let engine = match engine.as_mut() {
        Some(e) => e,
        None => return error_json("null engine pointer"),
    };

    match parse_arg::<ItemFields>(fields_json, "fields") {
        Ok(fields) => {
            let (id, effects) = engine.create(fields, now);
            ok_json(CreateResponse { id, effects })
        }
        Err(e) => error_json(e),
    }
}

/// Feed a connectivity signal.
///
/// # Returns
/// JSON string: `{"ok": [Effect]}` or `{"error": "message"}`
///
/// # Safety
/// - `engine` must be a valid engine pointer or null
/// - Caller must free the returned string with `swizil_string_free`
#[no_mangle]
pub unsafe extern "C" fn swizil_engine_set_connected(
    engine: *mut SyncEngine,
    connected: bool,
    now: u64,
) -> *mut c_char {
    let engine = match engine.as_mut() {
        Some(e) => e,
        None => return error_json("null engine pointer"),
    };

    ok_json(engine.set_connected(connected, now))
}

/// Report the outcome of an effect.
///
/// # Arguments
/// - `completion_json`: JSON string of Completion
///
/// # Returns
/// JSON string: `{"ok": [Effect]}` or `{"error": "message"}`
///
/// # Safety
/// - `engine` must be a valid engine pointer or null
/// - `completion_json` must be a valid null-terminated C string or null
/// - Caller must free the returned string with `swizil_string_free`
#[no_mangle]
pub unsafe extern "C" fn swizil_engine_settle(
    engine: *mut SyncEngine,
    completion_json: *const c_char,
    now: u64,
) -> *mut c_char {
    let engine = match engine.as_mut() {
        Some(e) => e,
        None => return error_json("null engine pointer"),
    };

    let completion = match parse_arg::<Completion>(completion_json, "completion") {
        Ok(c) => c,
        Err(e) => return error_json(e),
    };

    match engine.settle(completion, now) {
        Ok(effects) => ok_json(effects),
        Err(e) => error_json(e.to_string()),
    }
}

// ============================================================================
// Queries
// ============================================================================

/// Get all items in display order.
///
/// # Returns
/// JSON string: `{"ok": [Item]}` or `{"error": "message"}`
///
/// # Safety
/// - `engine` must be a valid engine pointer or null
/// - Caller must free the returned string with `swizil_string_free`
#[no_mangle]
pub unsafe extern "C" fn swizil_engine_items(engine: *const SyncEngine) -> *mut c_char {
    match engine.as_ref() {
        Some(e) => ok_json(e.items()),
        None => error_json("null engine pointer"),
    }
}

/// Get the sync status.
///
/// # Returns
/// JSON string: `{"ok": SyncStatus}` or `{"error": "message"}`
///
/// # Safety
/// - `engine` must be a valid engine pointer or null
/// - Caller must free the returned string with `swizil_string_free`
#[no_mangle]
pub unsafe extern "C" fn swizil_engine_status(engine: *const SyncEngine) -> *mut c_char {
    match engine.as_ref() {
        Some(e) => ok_json(e.status()),
        None => error_json("null engine pointer"),
    }
}

/// Get the number of pending mutations.
///
/// # Returns
/// Count, or -1 if `engine` is null.
///
/// # Safety
/// `engine` must be a valid engine pointer or null.
#[no_mangle]
pub unsafe extern "C" fn swizil_engine_pending_count(engine: *const SyncEngine) -> i64 {
    match engine.as_ref() {
        Some(e) => e.pending().len() as i64,
        None => -1,
    }
}

// ============================================================================
// Persistence
// ============================================================================

/// Export the engine state as a snapshot.
///
/// # Returns
/// JSON string: `{"ok": EngineSnapshot}` or `{"error": "message"}`
///
/// # Safety
/// - `engine` must be a valid engine pointer or null
/// - Caller must free the returned string with `swizil_string_free`
#[no_mangle]
pub unsafe extern "C" fn swizil_engine_export(engine: *const SyncEngine) -> *mut c_char {
    match engine.as_ref() {
        Some(e) => ok_json(e.export_state()),
        None => error_json("null engine pointer"),
    }
}

/// Import state from a snapshot.
///
/// # Returns
/// JSON string: `{"ok": null}` or `{"error": "message"}`
///
/// # Safety
/// - `engine` must be a valid engine pointer or null
/// - `snapshot_json` must be a valid null-terminated C string or null
/// - Caller must free the returned string with `swizil_string_free`
#[no_mangle]
pub unsafe extern "C" fn swizil_engine_import(
    engine: *mut SyncEngine,
    snapshot_json: *const c_char,
) -> *mut c_char {
    let engine = match engine.as_mut() {
        Some(e) => e,
        None => return error_json("null engine pointer"),
    };

    let snapshot_str = match from_c_string(snapshot_json) {
        Some(s) => s,
        None => return error_json("invalid snapshot JSON"),
    };

    match EngineSnapshot::from_json(&snapshot_str).and_then(|s| engine.import_state(s)) {
        Ok(()) => ok_json(()),
        Err(e) => error_json(e.to_string()),
    }
}

/// Get snapshot metadata without full export.
///
/// # Safety
/// - `engine` must be a valid engine pointer or null
/// - Caller must free the returned string with `swizil_string_free`
#[no_mangle]
pub unsafe extern "C" fn swizil_engine_metadata(engine: *const SyncEngine) -> *mut c_char {
    match engine.as_ref() {
        Some(e) => ok_json(SnapshotMetadata::from(&e.export_state())),
        None => error_json("null engine pointer"),
    }
}

// ============================================================================
// Utility
// ============================================================================

/// Get the engine version.
///
/// # Returns
/// Static string pointer (do not free)
#[no_mangle]
pub extern "C" fn swizil_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

/// Get the snapshot format version.
#[no_mangle]
pub extern "C" fn swizil_snapshot_format_version() -> u32 {
    crate::SNAPSHOT_FORMAT_VERSION
}
