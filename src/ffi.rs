//! FFI (Foreign Function Interface) for desktop front-ends
//!
//! A process-wide [`JobManager`] backs these functions, so at most one render runs at a
//! time. `caoba_render` blocks the calling thread; call `caoba_cancel` from another one.

use crate::error::ErrorCode;
use crate::ffmpeg;
use crate::photos::{self, SortMode};
use crate::{
    AudioTrack, JobManager, PlacementMode, ProgressEvent, RenderRequest, VideoFormat,
};
use libc::{c_char, c_void, size_t};
use std::ffi::{CStr, CString};
use std::path::PathBuf;
use std::ptr;
use std::slice;
use std::sync::OnceLock;

static MANAGER: OnceLock<JobManager> = OnceLock::new();

fn manager() -> &'static JobManager {
    MANAGER.get_or_init(JobManager::default)
}

/// FFI result structure
#[repr(C)]
pub struct FfiResult {
    pub code: ErrorCode,
    /// Error message on failure, null on success
    pub message: *mut c_char,
    /// Output file of a successful render, null otherwise
    pub output_path: *mut c_char,
    /// Payload of listing calls such as `caoba_scan_photos`, null otherwise
    pub data: *mut c_char,
}

impl FfiResult {
    fn ok() -> Self {
        Self {
            code: ErrorCode::Ok,
            message: ptr::null_mut(),
            output_path: ptr::null_mut(),
            data: ptr::null_mut(),
        }
    }

    fn with_output(path: &str) -> Self {
        Self {
            output_path: into_c_string(path),
            ..Self::ok()
        }
    }

    fn with_data(data: &str) -> Self {
        Self {
            data: into_c_string(data),
            ..Self::ok()
        }
    }

    fn error(code: ErrorCode, message: &str) -> Self {
        Self {
            code,
            message: into_c_string(message),
            ..Self::ok()
        }
    }
}

fn into_c_string(s: &str) -> *mut c_char {
    CString::new(s)
        .or_else(|_| CString::new(s.replace('\0', "")))
        .map(CString::into_raw)
        .unwrap_or(ptr::null_mut())
}

/// How a music track is placed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub enum FfiPlacement {
    /// Right after the previous track, crossfaded
    Auto = 0,
    /// Starting with the photo at `start_photo_index`
    Manual = 1,
}

/// FFI music track structure
#[repr(C)]
pub struct FfiAudioTrack {
    pub path: *const c_char,
    pub placement: FfiPlacement,
    /// 0-based photo index, used with `FfiPlacement::Manual`
    pub start_photo_index: size_t,
}

/// FFI render request structure
#[repr(C)]
pub struct FfiRenderRequest {
    pub photos: *const *const c_char,
    pub photo_count: size_t,
    pub tracks: *const FfiAudioTrack,
    pub track_count: size_t,
    pub seconds_per_photo: f64,
    pub transition: bool,
    pub format: VideoFormat,
    pub destination: *const c_char,
    /// Can be null
    pub ffmpeg_path: *const c_char,
    /// Can be null
    pub ffprobe_path: *const c_char,
}

/// Progress callback: percent (0-100), current photo file name, user data
pub type FfiProgressCallback =
    Option<unsafe extern "C" fn(percent: u32, file_name: *const c_char, user_data: *mut c_void)>;

struct ProgressSink {
    callback: FfiProgressCallback,
    user_data: *mut c_void,
}

// SAFETY: the caller of `caoba_render` guarantees the callback and its user data may be
// used from the render thread until `caoba_render` returns.
unsafe impl Send for ProgressSink {}

impl ProgressSink {
    fn emit(&self, event: ProgressEvent) {
        if let Some(callback) = self.callback {
            let file = CString::new(event.current_file).unwrap_or_default();
            unsafe { callback(event.percent, file.as_ptr(), self.user_data) };
        }
    }
}

unsafe fn opt_str(ptr: *const c_char) -> Result<Option<String>, ()> {
    if ptr.is_null() {
        return Ok(None);
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map(|s| Some(s.to_string()))
        .map_err(|_| ())
}

/// Check that ffmpeg can be found and encodes H.264
///
/// # Safety
/// - `ffmpeg_path` must be a valid null-terminated string or null
#[no_mangle]
pub unsafe extern "C" fn caoba_available(ffmpeg_path: *const c_char) -> FfiResult {
    let ffmpeg_path = match opt_str(ffmpeg_path) {
        Ok(path) => path,
        Err(_) => return FfiResult::error(ErrorCode::InvalidInput, "Invalid ffmpeg path"),
    };

    match ffmpeg::check_available(ffmpeg_path.as_deref()) {
        Ok(()) => FfiResult::ok(),
        Err(e) => FfiResult::error(ErrorCode::from(&e), &e.to_string()),
    }
}

/// Count the valid photos of a folder
///
/// # Safety
/// - `folder` must be a valid null-terminated string
/// - `out_count` must be a valid pointer
#[no_mangle]
pub unsafe extern "C" fn caoba_count_photos(
    folder: *const c_char,
    out_count: *mut size_t,
) -> FfiResult {
    if out_count.is_null() {
        return FfiResult::error(ErrorCode::InvalidInput, "Output pointer is null");
    }
    let folder = match opt_str(folder) {
        Ok(Some(s)) => s,
        _ => return FfiResult::error(ErrorCode::InvalidInput, "Invalid folder path"),
    };

    *out_count = photos::count_photos(&folder);
    FfiResult::ok()
}

/// Render a slideshow, blocking until it ends
///
/// # Safety
/// - `request` must point to a valid `FfiRenderRequest` whose arrays hold
///   `photo_count` and `track_count` elements of valid null-terminated strings
/// - `progress` may be null; otherwise it is called from another thread until this
///   function returns, with `user_data` passed through
#[no_mangle]
pub unsafe extern "C" fn caoba_render(
    request: *const FfiRenderRequest,
    progress: FfiProgressCallback,
    user_data: *mut c_void,
) -> FfiResult {
    if request.is_null() {
        return FfiResult::error(ErrorCode::InvalidInput, "Request is null");
    }
    let request = &*request;

    let request = match convert_request(request) {
        Ok(r) => r,
        Err(message) => return FfiResult::error(ErrorCode::InvalidInput, message),
    };

    let sink = ProgressSink {
        callback: progress,
        user_data,
    };

    match manager().render(request, move |event| sink.emit(event)) {
        Ok(path) => FfiResult::with_output(&path.to_string_lossy()),
        Err(e) => FfiResult::error(ErrorCode::from(&e), &e.user_message()),
    }
}

unsafe fn convert_request(request: &FfiRenderRequest) -> Result<RenderRequest, &'static str> {
    if request.photos.is_null() && request.photo_count > 0 {
        return Err("Photo list is null");
    }
    let photo_ptrs = if request.photo_count == 0 {
        &[][..]
    } else {
        slice::from_raw_parts(request.photos, request.photo_count)
    };
    let mut photos = Vec::with_capacity(photo_ptrs.len());
    for ptr in photo_ptrs {
        match opt_str(*ptr) {
            Ok(Some(s)) => photos.push(PathBuf::from(s)),
            _ => return Err("Invalid photo path"),
        }
    }

    if request.tracks.is_null() && request.track_count > 0 {
        return Err("Track list is null");
    }
    let ffi_tracks = if request.track_count == 0 {
        &[][..]
    } else {
        slice::from_raw_parts(request.tracks, request.track_count)
    };
    let mut music = Vec::with_capacity(ffi_tracks.len());
    for (i, track) in ffi_tracks.iter().enumerate() {
        let path = match opt_str(track.path) {
            Ok(Some(s)) => s,
            _ => return Err("Invalid track path"),
        };
        let placement = match (i, track.placement) {
            (0, _) => PlacementMode::FirstTrackImplicit,
            (_, FfiPlacement::Auto) => PlacementMode::AutoSequential,
            (_, FfiPlacement::Manual) => PlacementMode::ManualIndex(track.start_photo_index),
        };
        music.push(AudioTrack::new(path, placement));
    }

    let destination = match opt_str(request.destination) {
        Ok(Some(s)) => PathBuf::from(s),
        _ => return Err("Invalid destination path"),
    };
    let ffmpeg_path = opt_str(request.ffmpeg_path).map_err(|_| "Invalid ffmpeg path")?;
    let ffprobe_path = opt_str(request.ffprobe_path).map_err(|_| "Invalid ffprobe path")?;

    Ok(RenderRequest {
        photos,
        music,
        seconds_per_photo: request.seconds_per_photo,
        transition: request.transition,
        format: request.format,
        destination,
        ffmpeg_path,
        ffprobe_path,
    })
}

/// Cancel the running render, if any. Returns without waiting for it to stop.
#[no_mangle]
pub extern "C" fn caoba_cancel() -> FfiResult {
    manager().cancel();
    FfiResult::ok()
}

/// List the photos of a folder in display order, one path per line
///
/// # Safety
/// - `folder` must be a valid null-terminated string
/// - the returned `data` field holds the list and must be released with
///   `caoba_free_result`
#[no_mangle]
pub unsafe extern "C" fn caoba_scan_photos(folder: *const c_char, sort: SortMode) -> FfiResult {
    let folder = match opt_str(folder) {
        Ok(Some(s)) => s,
        _ => return FfiResult::error(ErrorCode::InvalidInput, "Invalid folder path"),
    };

    let list = photos::scan(&folder, sort)
        .iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("\n");
    FfiResult::with_data(&list)
}

/// Free a result's strings
///
/// # Safety
/// - `result` must point to a valid `FfiResult` that was returned by a caoba function
#[no_mangle]
pub unsafe extern "C" fn caoba_free_result(result: *mut FfiResult) {
    if result.is_null() {
        return;
    }

    let result = &mut *result;
    for field in [&mut result.message, &mut result.output_path, &mut result.data] {
        if !field.is_null() {
            // Reclaim the CString and let it drop
            let _ = CString::from_raw(*field);
            *field = ptr::null_mut();
        }
    }
}

/// Get version string
#[no_mangle]
pub extern "C" fn caoba_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_null_request() {
        let mut result = unsafe { caoba_render(ptr::null(), None, ptr::null_mut()) };
        assert_eq!(result.code, ErrorCode::InvalidInput);
        unsafe { caoba_free_result(&mut result) };
        assert!(result.message.is_null());
    }

    #[test]
    fn test_render_too_few_photos() {
        let photo = CString::new("/nonexistent/a.jpg").unwrap();
        let dest = CString::new("/nonexistent/out.mp4").unwrap();
        let photos = [photo.as_ptr()];
        let request = FfiRenderRequest {
            photos: photos.as_ptr(),
            photo_count: photos.len(),
            tracks: ptr::null(),
            track_count: 0,
            seconds_per_photo: 3.0,
            transition: true,
            format: VideoFormat::Vertical916,
            destination: dest.as_ptr(),
            ffmpeg_path: ptr::null(),
            ffprobe_path: ptr::null(),
        };
        let mut result = unsafe { caoba_render(&request, None, ptr::null_mut()) };
        assert_eq!(result.code, ErrorCode::InvalidInput);
        unsafe { caoba_free_result(&mut result) };
    }

    #[test]
    fn test_count_photos_missing_folder() {
        let folder = CString::new("/nonexistent/folder").unwrap();
        let mut count: size_t = 7;
        let result = unsafe { caoba_count_photos(folder.as_ptr(), &mut count) };
        assert_eq!(result.code, ErrorCode::Ok);
        assert_eq!(count, 0);
    }

    #[test]
    fn test_available_missing_ffmpeg() {
        let path = CString::new("/nonexistent/bin/ffmpeg").unwrap();
        let mut result = unsafe { caoba_available(path.as_ptr()) };
        assert_eq!(result.code, ErrorCode::SpawnError);
        assert!(!result.message.is_null());
        unsafe { caoba_free_result(&mut result) };
    }

    #[test]
    fn test_scan_photos_returns_list_in_data() {
        let dir = tempfile::TempDir::new().unwrap();
        for name in ["b.jpg", "A.jpg", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        let folder = CString::new(dir.path().to_str().unwrap()).unwrap();

        let mut result = unsafe { caoba_scan_photos(folder.as_ptr(), SortMode::Name) };
        assert_eq!(result.code, ErrorCode::Ok);
        assert!(result.output_path.is_null());
        let list = unsafe { CStr::from_ptr(result.data) }.to_str().unwrap().to_string();
        let expected = [dir.path().join("A.jpg"), dir.path().join("b.jpg")]
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("\n");
        assert_eq!(list, expected);

        unsafe { caoba_free_result(&mut result) };
        assert!(result.data.is_null());
    }

    #[test]
    fn test_version() {
        let version = unsafe { CStr::from_ptr(caoba_version()) };
        assert_eq!(version.to_str().unwrap(), env!("CARGO_PKG_VERSION"));
    }
}
