use crate::{load_error, library::Library, search, OpenFlags, Result};
use core::{
    ffi::{c_void, CStr},
    ptr::{null, NonNull},
};
use spin::Mutex;
use std::{
    ffi::CString,
    os::unix::ffi::OsStrExt,
    path::{Path, PathBuf},
};

/// Serializes every platform call whose failure is reported through `dlerror`, so the message
/// read afterwards belongs to that call.
pub(crate) static LOCK: Mutex<()> = Mutex::new(());

/// Takes the pending `dlerror` message. Must be called with [`LOCK`] held.
pub(crate) fn take_dlerror() -> Option<String> {
    let err = unsafe { libc::dlerror() };
    if err.is_null() {
        None
    } else {
        Some(unsafe { CStr::from_ptr(err) }.to_string_lossy().into_owned())
    }
}

fn raw_open(
    name: Option<&CStr>,
    flags: OpenFlags,
) -> core::result::Result<NonNull<c_void>, String> {
    let _lock = LOCK.lock();
    let handle = unsafe { libc::dlopen(name.map_or(null(), CStr::as_ptr), flags.bits()) };
    NonNull::new(handle).ok_or_else(|| take_dlerror().unwrap_or_else(|| "dlopen failed".into()))
}

pub(crate) fn raw_close(handle: NonNull<c_void>) -> core::result::Result<(), String> {
    let _lock = LOCK.lock();
    if unsafe { libc::dlclose(handle.as_ptr()) } != 0 {
        return Err(take_dlerror().unwrap_or_else(|| "dlclose failed".into()));
    }
    Ok(())
}

impl Library {
    /// Load a shared library by path or by logical name.
    ///
    /// The `name` argument may be either:
    ///
    /// * A library filename, looked up through the platform search path;
    /// * A logical name such as `"libm"`, completed to `libm.so` or the highest installed
    ///   `libm.so.<N>` when the platform can not find it as given;
    /// * An absolute or relative path to the library.
    ///
    /// The library's initializers run before this returns.
    ///
    /// # Note
    /// When `LD_BIND_NOW` is set to any non-empty value the system dynamic linker binds eagerly
    /// regardless of `flags`, so `RTLD_LAZY` is upgraded to `RTLD_NOW` in that case.
    ///
    /// # Examples
    /// ```no_run
    /// use dyload::{Library, OpenFlags};
    ///
    /// let libm = Library::open("libm", OpenFlags::RTLD_LAZY).unwrap();
    /// ```
    pub fn open(name: impl AsRef<str>, flags: OpenFlags) -> Result<Library> {
        Self::open_in(name.as_ref(), flags, &[])
    }

    /// Open the running program itself. Symbols are looked up in the program and in every
    /// library loaded into its global scope.
    pub fn this() -> Result<Library> {
        let handle = raw_open(None, OpenFlags::RTLD_LAZY).map_err(load_error)?;
        log::info!("dlopen: Opened the running program");
        Ok(Library::from_handle(handle, String::from("<self>")))
    }

    pub(crate) fn open_in(name: &str, flags: OpenFlags, extra_dirs: &[PathBuf]) -> Result<Library> {
        flags.validate()?;
        if name.is_empty() {
            return Err(load_error("empty library name"));
        }
        let flags = if search::bind_now() {
            flags.with_lazy(false)
        } else {
            flags
        };
        let first_err = match Self::open_candidate(Path::new(name), flags)? {
            Ok(lib) => return Ok(lib),
            Err(msg) => msg,
        };
        for candidate in search::fallback_candidates(name, extra_dirs) {
            if let Ok(lib) = Self::open_candidate(&candidate, flags)? {
                return Ok(lib);
            }
        }
        Err(load_error(first_err))
    }

    /// The outer error is a malformed name, the inner one the platform diagnostic.
    fn open_candidate(
        path: &Path,
        flags: OpenFlags,
    ) -> Result<core::result::Result<Library, String>> {
        let cname = CString::new(path.as_os_str().as_bytes()).map_err(|_| {
            load_error(format!(
                "{}: library name contains a nul byte",
                path.display()
            ))
        })?;
        log::debug!("dlopen: Try [{}]", path.display());
        Ok(match raw_open(Some(&cname), flags) {
            Ok(handle) => {
                let name = path.to_string_lossy().into_owned();
                log::info!(
                    "dlopen: Opened [{}] with lazy binding {}",
                    name,
                    flags.is_lazy()
                );
                Ok(Library::from_handle(handle, name))
            }
            Err(msg) => {
                log::debug!("dlopen: [{}] failed: {}", path.display(), msg);
                Err(msg)
            }
        })
    }
}
