//! C-ABI FFI bindings for cross-language integration.
//!
//! Jobs and orders cross the boundary as JSON strings; results come back as
//! JSON in a [`FillpdfResult`].

use std::ffi::{c_char, CStr, CString};
use std::path::Path;
use std::ptr;

use crate::options::ExportSettings;
use crate::order::Order;
use crate::pipeline::ExportJob;
use crate::{default_flattener, list_fields};

/// Result structure returned by FFI functions.
#[repr(C)]
pub struct FillpdfResult {
    /// Whether the operation succeeded.
    pub success: bool,
    /// The result data (null if failed). Must be freed with `fillpdf_free_string`.
    pub data: *mut c_char,
    /// Error message (null if succeeded). Must be freed with `fillpdf_free_string`.
    pub error: *mut c_char,
}

impl FillpdfResult {
    fn success(data: String) -> Self {
        Self {
            success: true,
            data: CString::new(data).unwrap_or_default().into_raw(),
            error: ptr::null_mut(),
        }
    }

    fn error(message: String) -> Self {
        Self {
            success: false,
            data: ptr::null_mut(),
            error: CString::new(message).unwrap_or_default().into_raw(),
        }
    }

    fn from_result(result: crate::Result<String>) -> Self {
        match result {
            Ok(data) => Self::success(data),
            Err(e) => Self::error(e.to_string()),
        }
    }
}

unsafe fn arg<'a>(ptr: *const c_char, name: &str) -> Result<&'a str, FillpdfResult> {
    if ptr.is_null() {
        return Err(FillpdfResult::error(format!("{} cannot be null", name)));
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map_err(|_| FillpdfResult::error(format!("Invalid UTF-8 {}", name)))
}

fn json_error(e: serde_json::Error) -> crate::Error {
    crate::Error::InvalidJob(e.to_string())
}

/// Run an export job given as JSON.
///
/// Returns the saved document summary as JSON.
///
/// # Safety
///
/// The `job_json` must be a valid null-terminated UTF-8 string.
/// The returned result must be freed with `fillpdf_free_result`.
#[no_mangle]
pub unsafe extern "C" fn fillpdf_export_job(job_json: *const c_char) -> FillpdfResult {
    let json = match arg(job_json, "job") {
        Ok(s) => s,
        Err(e) => return e,
    };
    FillpdfResult::from_result(export_job_internal(json))
}

fn export_job_internal(json: &str) -> crate::Result<String> {
    let job: ExportJob = serde_json::from_str(json).map_err(json_error)?;
    let saved = job.run(default_flattener().as_ref())?;
    serde_json::to_string(&saved).map_err(json_error)
}

/// Export an order given as JSON using settings given as JSON.
///
/// Returns the output path.
///
/// # Safety
///
/// Both arguments must be valid null-terminated UTF-8 strings.
/// The returned result must be freed with `fillpdf_free_result`.
#[no_mangle]
pub unsafe extern "C" fn fillpdf_export_order(
    order_json: *const c_char,
    settings_json: *const c_char,
) -> FillpdfResult {
    let order = match arg(order_json, "order") {
        Ok(s) => s,
        Err(e) => return e,
    };
    let settings = match arg(settings_json, "settings") {
        Ok(s) => s,
        Err(e) => return e,
    };
    FillpdfResult::from_result(export_order_internal(order, settings))
}

fn export_order_internal(order: &str, settings: &str) -> crate::Result<String> {
    let order: Order = serde_json::from_str(order).map_err(json_error)?;
    let settings: ExportSettings = serde_json::from_str(settings).map_err(json_error)?;
    let path = order.export_pdf(&settings, default_flattener().as_ref())?;
    Ok(path.to_string_lossy().into_owned())
}

/// List a template's fields as a JSON array.
///
/// # Safety
///
/// The `path` must be a valid null-terminated UTF-8 string.
/// The returned result must be freed with `fillpdf_free_result`.
#[no_mangle]
pub unsafe extern "C" fn fillpdf_list_fields(path: *const c_char) -> FillpdfResult {
    let path = match arg(path, "Path") {
        Ok(s) => s,
        Err(e) => return e,
    };
    FillpdfResult::from_result(
        list_fields(Path::new(path))
            .and_then(|fields| serde_json::to_string(&fields).map_err(json_error)),
    )
}

/// Free a result returned by any fillpdf function.
///
/// # Safety
///
/// The `result` must have been returned by a fillpdf function.
/// This function should only be called once per result.
#[no_mangle]
pub unsafe extern "C" fn fillpdf_free_result(result: FillpdfResult) {
    if !result.data.is_null() {
        drop(CString::from_raw(result.data));
    }
    if !result.error.is_null() {
        drop(CString::from_raw(result.error));
    }
}

/// Free a string allocated by fillpdf.
///
/// # Safety
///
/// The `ptr` must have been allocated by fillpdf.
/// This function should only be called once per pointer.
#[no_mangle]
pub unsafe extern "C" fn fillpdf_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

/// Get the version of the fillpdf library.
///
/// The returned string is statically allocated and should not be freed.
#[no_mangle]
pub extern "C" fn fillpdf_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
