//! C-compatible FFI API for cross-language bindings.
//!
//! # ABI Contract
//!
//! All exported functions use `extern "C"` calling convention and `#[no_mangle]`
//! to ensure stable symbol names.
//!
//! ## Memory management
//! - Buffers and strings returned by `acta_*` functions are allocated on the
//!   Rust heap.
//! - Callers **must** free them with `acta_free_buffer` / `acta_free_string`.
//! - Passing a null pointer to a free function is a no-op.
//!
//! ## Error handling
//! - Functions that can fail return a `c_int` (0 = success, non-zero = error):
//!   `1` null argument, `2` invalid input (UTF-8, JSON), `3` processing error.
//! - Error details can be retrieved via `acta_last_error`.
//!
//! ## Thread safety
//! - `acta_last_error` uses a thread-local, so it is safe to call from
//!   multiple threads.
//! - The image normaliser is created once per process and shared read-only.
//!
//! ## Usage from Python (ctypes)
//! ```text
//! lib = ctypes.CDLL("libacta_forge.so")
//! out = ctypes.c_char_p()
//! rc = lib.acta_generate_document(request_json, None, ctypes.byref(out))
//! ```

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};
use std::ptr;
use std::slice;
use std::sync::OnceLock;

use crate::inspect::inspect_bytes;
use crate::mapping::VariableMapping;
use crate::normalize::ImageNormalizer;
use crate::pipeline::{GenerationRequest, GeneratorConfig};

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = RefCell::new(None);
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

static NORMALIZER: OnceLock<ImageNormalizer> = OnceLock::new();

/// Install the process-wide normaliser (e.g. one wrapping a real detector)
/// before the first `acta_normalize_image` call. Returns false if one is
/// already in place.
pub fn install_normalizer(normalizer: ImageNormalizer) -> bool {
    NORMALIZER.set(normalizer).is_ok()
}

fn normalizer() -> &'static ImageNormalizer {
    NORMALIZER.get_or_init(ImageNormalizer::default)
}

/// Borrow a nullable C string as UTF-8. `Ok(None)` for null.
///
/// # Safety
/// `s`, if non-null, must point to a valid null-terminated string.
unsafe fn optional_str<'a>(s: *const c_char) -> Result<Option<&'a str>, String> {
    if s.is_null() {
        return Ok(None);
    }
    CStr::from_ptr(s)
        .to_str()
        .map(Some)
        .map_err(|e| format!("Invalid UTF-8: {e}"))
}

fn buffer_len(len: usize) -> Result<u32, String> {
    u32::try_from(len).map_err(|_| format!("Output of {len} bytes does not fit a 32-bit length"))
}

/// Hand a byte vector to the caller.
///
/// # Safety
/// `out_buf` and `out_len` must be valid pointers.
unsafe fn write_buffer(bytes: Vec<u8>, out_buf: *mut *mut u8, out_len: *mut u32) -> c_int {
    let len = match buffer_len(bytes.len()) {
        Ok(len) => len,
        Err(e) => {
            *out_buf = ptr::null_mut();
            *out_len = 0;
            set_last_error(&e);
            return 3;
        }
    };
    let buf = bytes.into_boxed_slice();
    *out_buf = Box::into_raw(buf) as *mut u8;
    *out_len = len;
    0
}

/// Hand a string to the caller.
///
/// # Safety
/// `out` must be a valid pointer.
unsafe fn write_string(s: String, out: *mut *mut c_char) -> c_int {
    match CString::new(s) {
        Ok(cs) => {
            *out = cs.into_raw();
            0
        }
        Err(_) => {
            *out = ptr::null_mut();
            set_last_error("Output contained a null byte");
            3
        }
    }
}

// ---------------------------------------------------------------------------
// Core API
// ---------------------------------------------------------------------------

/// Generate a document from a JSON [`GenerationRequest`].
///
/// # Parameters
/// - `request_json`: null-terminated UTF-8 JSON request
/// - `config_json`: optional null-terminated JSON [`GeneratorConfig`]; `NULL`
///   for defaults. A `config` inside the request takes precedence.
/// - `out_path`: on success, receives the generated file's path
///
/// # Returns
/// `0` on success, non-zero on error. On error, call `acta_last_error`.
///
/// # Safety
/// - `request_json` and `config_json` (if non-null) must be valid
///   null-terminated strings.
/// - `out_path` must be a valid pointer; free `*out_path` with
///   `acta_free_string`.
#[no_mangle]
pub unsafe extern "C" fn acta_generate_document(
    request_json: *const c_char,
    config_json: *const c_char,
    out_path: *mut *mut c_char,
) -> c_int {
    if request_json.is_null() || out_path.is_null() {
        set_last_error("Null pointer argument");
        return 1;
    }

    let (request, config) = match (optional_str(request_json), optional_str(config_json)) {
        (Ok(Some(r)), Ok(c)) => (r, c),
        (Err(e), _) | (_, Err(e)) => {
            set_last_error(&e);
            return 2;
        }
        (Ok(None), _) => {
            set_last_error("Null pointer argument");
            return 1;
        }
    };

    let request = match GenerationRequest::from_json(request) {
        Ok(r) => r,
        Err(e) => {
            set_last_error(&e.to_string());
            return 2;
        }
    };
    let config = match config.map(serde_json::from_str::<GeneratorConfig>) {
        None => GeneratorConfig::default(),
        Some(Ok(c)) => c,
        Some(Err(e)) => {
            set_last_error(&format!("Invalid configuration: {e}"));
            return 2;
        }
    };

    match request.generate(&config) {
        Ok(path) => write_string(path.display().to_string(), out_path),
        Err(e) => {
            set_last_error(&e.to_string());
            3
        }
    }
}

/// Normalise a captured photo. Never fails on bad image data: the original
/// bytes are returned instead.
///
/// # Parameters
/// - `img_ptr`, `img_len`: the encoded image
/// - `out_buf`, `out_len`: receive the JPEG (or original) bytes
///
/// # Returns
/// `0` on success, `1` on null arguments, `3` if the output exceeds a
/// 32-bit length.
///
/// # Safety
/// - `img_ptr` must point to `img_len` valid bytes.
/// - `out_buf` and `out_len` must be valid pointers; free `*out_buf` with
///   `acta_free_buffer`.
#[no_mangle]
pub unsafe extern "C" fn acta_normalize_image(
    img_ptr: *const u8,
    img_len: u32,
    out_buf: *mut *mut u8,
    out_len: *mut u32,
) -> c_int {
    if img_ptr.is_null() || out_buf.is_null() || out_len.is_null() {
        set_last_error("Null pointer argument");
        return 1;
    }

    let bytes = slice::from_raw_parts(img_ptr, img_len as usize);
    write_buffer(normalizer().normalize(bytes), out_buf, out_len)
}

/// Inspect a `.docx` template and report its tokens as JSON.
///
/// # Parameters
/// - `docx_ptr`, `docx_len`: the template bytes
/// - `mapping_json`: optional null-terminated mapping (list or object form)
/// - `out_json`: receives the report JSON
///
/// # Returns
/// `0` on success.
///
/// # Safety
/// - `docx_ptr` must point to `docx_len` valid bytes.
/// - `mapping_json`, if non-null, must be a valid null-terminated string.
/// - Free `*out_json` with `acta_free_string`.
#[no_mangle]
pub unsafe extern "C" fn acta_inspect_template(
    docx_ptr: *const u8,
    docx_len: u32,
    mapping_json: *const c_char,
    out_json: *mut *mut c_char,
) -> c_int {
    if docx_ptr.is_null() || out_json.is_null() {
        set_last_error("Null pointer argument");
        return 1;
    }

    let mapping = match optional_str(mapping_json) {
        Ok(None) => None,
        Ok(Some(raw)) => match VariableMapping::parse(raw) {
            Ok(m) => Some(m),
            Err(e) => {
                set_last_error(&e.to_string());
                return 2;
            }
        },
        Err(e) => {
            set_last_error(&e);
            return 2;
        }
    };

    let docx = slice::from_raw_parts(docx_ptr, docx_len as usize);
    let report = match inspect_bytes(docx, mapping.as_ref()) {
        Ok(r) => r,
        Err(e) => {
            set_last_error(&e.to_string());
            return 3;
        }
    };

    match serde_json::to_string(&report) {
        Ok(json) => write_string(json, out_json),
        Err(e) => {
            set_last_error(&format!("Could not serialise report: {e}"));
            3
        }
    }
}

// ---------------------------------------------------------------------------
// Memory management
// ---------------------------------------------------------------------------

/// Free a buffer returned by `acta_normalize_image`.
///
/// # Safety
/// `buf` must have been returned by a previous `acta_*` call, and `len` must
/// be the corresponding length.
#[no_mangle]
pub unsafe extern "C" fn acta_free_buffer(buf: *mut u8, len: u32) {
    if !buf.is_null() {
        let _ = Box::from_raw(slice::from_raw_parts_mut(buf, len as usize));
    }
}

/// Free a string returned by `acta_generate_document` or
/// `acta_inspect_template`.
///
/// # Safety
/// `s` must have been returned by Rust's `CString::into_raw`.
#[no_mangle]
pub unsafe extern "C" fn acta_free_string(s: *mut c_char) {
    if !s.is_null() {
        let _ = CString::from_raw(s);
    }
}

/// Retrieve the last error message. Returns a null-terminated string.
///
/// The returned pointer is valid until the next `acta_*` call on the same
/// thread. The caller should **not** free this pointer – it is managed
/// internally.
///
/// Returns null if no error has occurred.
#[no_mangle]
pub extern "C" fn acta_last_error() -> *const c_char {
    LAST_ERROR.with(|e| {
        let borrow = e.borrow();
        match borrow.as_ref() {
            Some(cs) => cs.as_ptr(),
            None => ptr::null(),
        }
    })
}

/// Return the library version as a null-terminated string.
/// The caller must **not** free this pointer.
#[no_mangle]
pub extern "C" fn acta_version() -> *const c_char {
    concat!(env!("CARGO_PKG_VERSION"), "\0").as_ptr() as *const c_char
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::{build_docx, ASSIGNMENT_BODY};

    fn last_error() -> String {
        unsafe { CStr::from_ptr(acta_last_error()) }.to_str().unwrap().to_string()
    }

    #[test]
    fn buffer_length_must_fit_u32() {
        assert_eq!(buffer_len(12), Ok(12));
        assert_eq!(buffer_len(u32::MAX as usize), Ok(u32::MAX));
        #[cfg(target_pointer_width = "64")]
        assert!(buffer_len(u32::MAX as usize + 1).is_err());
    }

    #[test]
    fn ffi_version() {
        let v = acta_version();
        let version = unsafe { CStr::from_ptr(v) }.to_str().unwrap();
        assert_eq!(version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn ffi_null_input() {
        let mut out: *mut c_char = ptr::null_mut();
        let rc = unsafe { acta_generate_document(ptr::null(), ptr::null(), &mut out) };
        assert_eq!(rc, 1);
        assert!(out.is_null());
    }

    #[test]
    fn ffi_generate_reports_missing_template() {
        let dir = tempfile::tempdir().unwrap();
        let request = CString::new(
            r#"{"template": {"name": "acta", "category": "ASSIGNMENT_COMPUTER"}, "context": {}}"#,
        )
        .unwrap();
        let config = CString::new(format!(
            r#"{{"base_dir": {}}}"#,
            serde_json::to_string(dir.path()).unwrap()
        ))
        .unwrap();
        let mut out: *mut c_char = ptr::null_mut();

        let rc = unsafe { acta_generate_document(request.as_ptr(), config.as_ptr(), &mut out) };
        assert_eq!(rc, 3);
        assert!(last_error().contains("Template not found"));
    }

    #[test]
    fn ffi_generate_rejects_bad_json() {
        let request = CString::new("{not json").unwrap();
        let mut out: *mut c_char = ptr::null_mut();
        let rc = unsafe { acta_generate_document(request.as_ptr(), ptr::null(), &mut out) };
        assert_eq!(rc, 2);
        assert!(last_error().starts_with("Invalid request"));
    }

    #[test]
    fn ffi_normalize_returns_original_on_garbage() {
        let input = b"not an image";
        let mut out_buf: *mut u8 = ptr::null_mut();
        let mut out_len: u32 = 0;

        let rc = unsafe {
            acta_normalize_image(input.as_ptr(), input.len() as u32, &mut out_buf, &mut out_len)
        };
        assert_eq!(rc, 0);
        let bytes = unsafe { slice::from_raw_parts(out_buf, out_len as usize) };
        assert_eq!(bytes, input);
        unsafe { acta_free_buffer(out_buf, out_len) };
    }

    #[test]
    fn ffi_inspect_template() {
        let docx = build_docx(ASSIGNMENT_BODY, &[]);
        let mapping = CString::new(r#"{"NOMBRE": "EMPLOYEE_NAME", "EQUIPOS": "DEVICE_TABLE"}"#).unwrap();
        let mut json_ptr: *mut c_char = ptr::null_mut();

        let rc = unsafe {
            acta_inspect_template(docx.as_ptr(), docx.len() as u32, mapping.as_ptr(), &mut json_ptr)
        };
        assert_eq!(rc, 0);
        let json = unsafe { CStr::from_ptr(json_ptr) }.to_str().unwrap();
        let report: serde_json::Value = serde_json::from_str(json).unwrap();
        assert_eq!(report["table_placeholder"], "EQUIPOS");
        assert_eq!(report["table_placeholder_present"], false);
        unsafe { acta_free_string(json_ptr) };
    }
}
