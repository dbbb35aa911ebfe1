//! C FFI bindings for the Sable bridge
//!
//! This module provides a C-compatible API for embedding the bridge in
//! other languages. The API follows these principles:
//! - ABI-stable (uses only C-compatible types)
//! - Thread-safe (a bridge instance can be used from multiple threads)
//! - Error reporting via numeric codes written to an out-parameter
//! - Opaque pointer for the bridge, u64 tokens for everything else
//! - Manual memory management for returned strings

use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::path::Path;
use std::ptr;

use crate::error::BridgeError;
use crate::handle::Handle;
use crate::Bridge;

/// Opaque handle to a bridge instance
#[repr(C)]
pub struct SableBridge {
    _private: [u8; 0],
}

const OK: i32 = 0;

/// Convert a Rust string to a C string (caller must free with
/// `sable_string_free`)
unsafe fn rust_to_c_string(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(c_str) => c_str.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Write an error code to the out-parameter, if one was supplied
unsafe fn set_err(err: *mut i32, code: i32) {
    if !err.is_null() {
        *err = code;
    }
}

unsafe fn bridge_ref<'a>(bridge: *mut SableBridge) -> &'a Bridge {
    &*(bridge as *const Bridge)
}

unsafe fn str_arg<'a>(s: *const c_char) -> Option<&'a str> {
    if s.is_null() {
        return None;
    }
    CStr::from_ptr(s).to_str().ok()
}

// ============================================================================
// Bridge Lifecycle
// ============================================================================

/// Create a new bridge instance
///
/// # Safety
/// The returned bridge must be freed with `sable_bridge_destroy`.
#[no_mangle]
pub unsafe extern "C" fn sable_bridge_new() -> *mut SableBridge {
    Box::into_raw(Box::new(Bridge::new())) as *mut SableBridge
}

/// Destroy a bridge instance and every handle it tracks
///
/// # Safety
/// `bridge` must come from `sable_bridge_new` and must not be used after
/// this call. Passing NULL is a no-op.
#[no_mangle]
pub unsafe extern "C" fn sable_bridge_destroy(bridge: *mut SableBridge) {
    if !bridge.is_null() {
        drop(Box::from_raw(bridge as *mut Bridge));
    }
}

// ============================================================================
// Scopes and Module Loading
// ============================================================================

/// Create an execution scope
///
/// `base_dir` may be NULL to anchor relative module paths at the running
/// executable's directory. Returns the scope handle token, or 0 on error
/// with a code in `err`.
///
/// # Safety
/// `bridge` must be a live bridge pointer; `base_dir`, if non-null, must
/// be NUL-terminated UTF-8.
#[no_mangle]
pub unsafe extern "C" fn sable_create_scope(
    bridge: *mut SableBridge,
    base_dir: *const c_char,
    err: *mut i32,
) -> u64 {
    set_err(err, OK);
    if bridge.is_null() {
        set_err(err, BridgeError::MissingRequiredArgument.code());
        return 0;
    }
    let base_dir = str_arg(base_dir).map(Path::new);
    bridge_ref(bridge).create_scope(base_dir).raw()
}

/// Unload a scope and invalidate every handle derived from it
///
/// # Safety
/// `bridge` must be a live bridge pointer.
#[no_mangle]
pub unsafe extern "C" fn sable_unload_scope(
    bridge: *mut SableBridge,
    scope: u64,
    err: *mut i32,
) -> c_int {
    set_err(err, OK);
    if bridge.is_null() {
        set_err(err, BridgeError::MissingRequiredArgument.code());
        return -1;
    }
    match bridge_ref(bridge).unload_scope(Handle::from_raw(scope)) {
        Ok(()) => 0,
        Err(e) => {
            set_err(err, e.code());
            -1
        }
    }
}

/// Load a module into a scope from a path relative to its base directory
///
/// Returns the module handle token, or 0 when the load fails for any
/// reason (missing file, invalid image, duplicate module name).
///
/// # Safety
/// `bridge` must be a live bridge pointer; `path` must be NUL-terminated
/// UTF-8.
#[no_mangle]
pub unsafe extern "C" fn sable_load_from_path(
    bridge: *mut SableBridge,
    scope: u64,
    path: *const c_char,
    err: *mut i32,
) -> u64 {
    set_err(err, OK);
    if bridge.is_null() {
        set_err(err, BridgeError::MissingRequiredArgument.code());
        return 0;
    }
    let path = match str_arg(path) {
        Some(path) => path,
        None => {
            set_err(err, BridgeError::MissingRequiredArgument.code());
            return 0;
        }
    };
    match bridge_ref(bridge).load_from_path(Handle::from_raw(scope), path) {
        Ok(Some(module)) => module.raw(),
        Ok(None) => 0,
        Err(e) => {
            set_err(err, e.code());
            0
        }
    }
}

/// Load a module into a scope from an in-memory image
///
/// The buffer is copied before the call returns; the caller may free it
/// immediately. Returns the module handle token, or 0 on failure.
///
/// # Safety
/// `buffer` must point to `len` readable bytes.
#[no_mangle]
pub unsafe extern "C" fn sable_load_from_bytes(
    bridge: *mut SableBridge,
    scope: u64,
    buffer: *const u8,
    len: usize,
    err: *mut i32,
) -> u64 {
    set_err(err, OK);
    if bridge.is_null() || buffer.is_null() {
        set_err(err, BridgeError::MissingRequiredArgument.code());
        return 0;
    }
    let bytes = std::slice::from_raw_parts(buffer, len);
    match bridge_ref(bridge).load_from_bytes(Handle::from_raw(scope), bytes) {
        Ok(Some(module)) => module.raw(),
        Ok(None) => 0,
        Err(e) => {
            set_err(err, e.code());
            0
        }
    }
}

// ============================================================================
// Resolution and Construction
// ============================================================================

/// Resolve a class by qualified name within a loaded module
///
/// # Safety
/// `bridge` must be a live bridge pointer; `name` must be NUL-terminated
/// UTF-8.
#[no_mangle]
pub unsafe extern "C" fn sable_get_class(
    bridge: *mut SableBridge,
    module: u64,
    name: *const c_char,
    err: *mut i32,
) -> u64 {
    set_err(err, OK);
    if bridge.is_null() {
        set_err(err, BridgeError::MissingRequiredArgument.code());
        return 0;
    }
    let name = match str_arg(name) {
        Some(name) => name,
        None => {
            set_err(err, BridgeError::MissingRequiredArgument.code());
            return 0;
        }
    };
    match bridge_ref(bridge).get_class(Handle::from_raw(module), name) {
        Ok(class) => class.raw(),
        Err(e) => {
            set_err(err, e.code());
            0
        }
    }
}

/// Resolve a method by name and parameter count on a resolved class
///
/// # Safety
/// `bridge` must be a live bridge pointer; `name` must be NUL-terminated
/// UTF-8.
#[no_mangle]
pub unsafe extern "C" fn sable_get_method(
    bridge: *mut SableBridge,
    class: u64,
    name: *const c_char,
    argc: i32,
    err: *mut i32,
) -> u64 {
    set_err(err, OK);
    if bridge.is_null() {
        set_err(err, BridgeError::MissingRequiredArgument.code());
        return 0;
    }
    let name = match str_arg(name) {
        Some(name) => name,
        None => {
            set_err(err, BridgeError::MissingRequiredArgument.code());
            return 0;
        }
    };
    match bridge_ref(bridge).get_method(Handle::from_raw(class), name, argc) {
        Ok(method) => method.raw(),
        Err(e) => {
            set_err(err, e.code());
            0
        }
    }
}

/// Construct an instance of a resolved class
///
/// # Safety
/// `bridge` must be a live bridge pointer.
#[no_mangle]
pub unsafe extern "C" fn sable_new_object(
    bridge: *mut SableBridge,
    class: u64,
    err: *mut i32,
) -> u64 {
    set_err(err, OK);
    if bridge.is_null() {
        set_err(err, BridgeError::MissingRequiredArgument.code());
        return 0;
    }
    match bridge_ref(bridge).new_object(Handle::from_raw(class)) {
        Ok(instance) => instance.raw(),
        Err(e) => {
            set_err(err, e.code());
            0
        }
    }
}

/// Check whether `target` instances can be used where `base` is required
///
/// Returns 1, 0, or -1 on error.
///
/// # Safety
/// `bridge` must be a live bridge pointer.
#[no_mangle]
pub unsafe extern "C" fn sable_is_assignable_from(
    bridge: *mut SableBridge,
    base: u64,
    target: u64,
    err: *mut i32,
) -> c_int {
    set_err(err, OK);
    if bridge.is_null() {
        set_err(err, BridgeError::MissingRequiredArgument.code());
        return -1;
    }
    match bridge_ref(bridge).is_assignable_from(Handle::from_raw(base), Handle::from_raw(target)) {
        Ok(answer) => answer as c_int,
        Err(e) => {
            set_err(err, e.code());
            -1
        }
    }
}

// ============================================================================
// Member Access
// ============================================================================

/// Fetch a class's member metadata as a JSON string
///
/// The returned string must be freed with `sable_string_free`. Returns
/// NULL on error with a code in `err`.
///
/// # Safety
/// `bridge` must be a live bridge pointer.
#[no_mangle]
pub unsafe extern "C" fn sable_get_meta_data(
    bridge: *mut SableBridge,
    class: u64,
    err: *mut i32,
) -> *mut c_char {
    set_err(err, OK);
    if bridge.is_null() {
        set_err(err, BridgeError::MissingRequiredArgument.code());
        return ptr::null_mut();
    }
    match bridge_ref(bridge).get_meta_data(Handle::from_raw(class)) {
        Ok(json) => rust_to_c_string(&json),
        Err(e) => {
            set_err(err, e.code());
            ptr::null_mut()
        }
    }
}

/// Read a field's value as a JSON string
///
/// `target` is an instance handle for instance fields or a class handle
/// for static fields. The returned string must be freed with
/// `sable_string_free`.
///
/// # Safety
/// `bridge` must be a live bridge pointer; `name` must be NUL-terminated
/// UTF-8.
#[no_mangle]
pub unsafe extern "C" fn sable_get_field_value(
    bridge: *mut SableBridge,
    target: u64,
    name: *const c_char,
    err: *mut i32,
) -> *mut c_char {
    set_err(err, OK);
    if bridge.is_null() {
        set_err(err, BridgeError::MissingRequiredArgument.code());
        return ptr::null_mut();
    }
    let name = match str_arg(name) {
        Some(name) => name,
        None => {
            set_err(err, BridgeError::MissingRequiredArgument.code());
            return ptr::null_mut();
        }
    };
    match bridge_ref(bridge).get_field_value(Handle::from_raw(target), name) {
        Ok(json) => rust_to_c_string(&json),
        Err(e) => {
            set_err(err, e.code());
            ptr::null_mut()
        }
    }
}

/// Write a field from a raw value slot
///
/// # Safety
/// `slot` must satisfy the marshaling contract for the field's declared
/// type: value-type slots point at the declared width, string slots at
/// NUL-terminated UTF-8, reference slots are handle tokens.
#[no_mangle]
pub unsafe extern "C" fn sable_set_field_value(
    bridge: *mut SableBridge,
    target: u64,
    name: *const c_char,
    slot: *const c_void,
    err: *mut i32,
) -> c_int {
    set_err(err, OK);
    if bridge.is_null() {
        set_err(err, BridgeError::MissingRequiredArgument.code());
        return -1;
    }
    let name = match str_arg(name) {
        Some(name) => name,
        None => {
            set_err(err, BridgeError::MissingRequiredArgument.code());
            return -1;
        }
    };
    match bridge_ref(bridge).set_field_value(Handle::from_raw(target), name, slot) {
        Ok(()) => 0,
        Err(e) => {
            set_err(err, e.code());
            -1
        }
    }
}

/// Read a property's value as a JSON string
///
/// The returned string must be freed with `sable_string_free`.
///
/// # Safety
/// `bridge` must be a live bridge pointer; `name` must be NUL-terminated
/// UTF-8.
#[no_mangle]
pub unsafe extern "C" fn sable_get_property_value(
    bridge: *mut SableBridge,
    target: u64,
    name: *const c_char,
    err: *mut i32,
) -> *mut c_char {
    set_err(err, OK);
    if bridge.is_null() {
        set_err(err, BridgeError::MissingRequiredArgument.code());
        return ptr::null_mut();
    }
    let name = match str_arg(name) {
        Some(name) => name,
        None => {
            set_err(err, BridgeError::MissingRequiredArgument.code());
            return ptr::null_mut();
        }
    };
    match bridge_ref(bridge).get_property_value(Handle::from_raw(target), name) {
        Ok(json) => rust_to_c_string(&json),
        Err(e) => {
            set_err(err, e.code());
            ptr::null_mut()
        }
    }
}

/// Write a property from a raw value slot
///
/// # Safety
/// Same slot contract as `sable_set_field_value`.
#[no_mangle]
pub unsafe extern "C" fn sable_set_property_value(
    bridge: *mut SableBridge,
    target: u64,
    name: *const c_char,
    slot: *const c_void,
    err: *mut i32,
) -> c_int {
    set_err(err, OK);
    if bridge.is_null() {
        set_err(err, BridgeError::MissingRequiredArgument.code());
        return -1;
    }
    let name = match str_arg(name) {
        Some(name) => name,
        None => {
            set_err(err, BridgeError::MissingRequiredArgument.code());
            return -1;
        }
    };
    match bridge_ref(bridge).set_property_value(Handle::from_raw(target), name, slot) {
        Ok(()) => 0,
        Err(e) => {
            set_err(err, e.code());
            -1
        }
    }
}

// ============================================================================
// Invocation
// ============================================================================

/// Invoke a resolved method with a flat argument slot buffer
///
/// `instance` is 0 for static methods. `argv` points at `argc` slots, one
/// per declared parameter; a mismatched count fails with code 8 before
/// any slot is read.
///
/// # Safety
/// Each slot must satisfy the marshaling contract for its declared
/// parameter type; `argv` must point to `argc` readable slots.
#[no_mangle]
pub unsafe extern "C" fn sable_invoke(
    bridge: *mut SableBridge,
    method: u64,
    instance: u64,
    argv: *const *const c_void,
    argc: usize,
    err: *mut i32,
) -> c_int {
    set_err(err, OK);
    if bridge.is_null() || (argv.is_null() && argc > 0) {
        set_err(err, BridgeError::MissingRequiredArgument.code());
        return -1;
    }
    let args = if argc == 0 {
        &[]
    } else {
        std::slice::from_raw_parts(argv, argc)
    };
    let instance = (instance != 0).then(|| Handle::from_raw(instance));
    match bridge_ref(bridge).invoke(Handle::from_raw(method), instance, args) {
        Ok(()) => 0,
        Err(e) => {
            set_err(err, e.code());
            -1
        }
    }
}

// ============================================================================
// Memory Management
// ============================================================================

/// Release a handle token
///
/// Releasing 0 or an already-released token is a no-op.
///
/// # Safety
/// `bridge` must be a live bridge pointer.
#[no_mangle]
pub unsafe extern "C" fn sable_release(bridge: *mut SableBridge, handle: u64) {
    if !bridge.is_null() {
        bridge_ref(bridge).release(Handle::from_raw(handle));
    }
}

/// Free a string returned by the bridge
///
/// # Safety
/// `s` must come from a bridge call that documents this free function,
/// and must not be used afterwards. Passing NULL is a no-op.
#[no_mangle]
pub unsafe extern "C" fn sable_string_free(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}
