use crate::{dlopen::raw_close, load_error, Result};
use core::{
    ffi::c_void,
    fmt::Debug,
    mem::{self, ManuallyDrop},
    ptr::NonNull,
};

/// A shared library opened through the system dynamic linker.
///
/// The library stays mapped for as long as this value lives. Dropping it closes the library;
/// use [`Library::close`] to observe the platform's result instead.
pub struct Library {
    handle: NonNull<c_void>,
    name: String,
}

impl Debug for Library {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Library")
            .field("name", &self.name)
            .field("handle", &self.handle)
            .finish()
    }
}

// The handle is only passed back to the thread-safe dl* family.
unsafe impl Send for Library {}
unsafe impl Sync for Library {}

impl Library {
    #[inline]
    pub(crate) fn from_handle(handle: NonNull<c_void>, name: String) -> Library {
        Library { handle, name }
    }

    /// Convert a raw handle returned by a `dlopen`-family call into a `Library`.
    ///
    /// # Safety
    ///
    /// The pointer shall be a result of a successful call of the `dlopen`-family of functions.
    /// It must be valid to call `dlclose` with this pointer as an argument, and nothing else may
    /// close it afterwards.
    pub unsafe fn from_raw(handle: *mut c_void, name: &str) -> Result<Library> {
        match NonNull::new(handle) {
            Some(handle) => Ok(Library::from_handle(handle, name.to_owned())),
            None => Err(load_error(format!("{name}: null library handle"))),
        }
    }

    /// Give up ownership of the platform handle without closing it.
    pub fn into_raw(self) -> *mut c_void {
        let mut this = ManuallyDrop::new(self);
        drop(mem::take(&mut this.name));
        this.handle.as_ptr()
    }

    #[inline]
    pub fn as_raw(&self) -> *mut c_void {
        self.handle.as_ptr()
    }

    /// The name the library was loaded under. For logical names this is the completed name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub(crate) fn handle(&self) -> NonNull<c_void> {
        self.handle
    }

    /// Close the library and report the platform's result.
    ///
    /// Every symbol taken from this library borrows it, so none can be alive here. The library
    /// is released even when an error is returned.
    pub fn close(self) -> Result<()> {
        let mut this = ManuallyDrop::new(self);
        let name = mem::take(&mut this.name);
        log::info!("dlclose: Closing [{}]", name);
        raw_close(this.handle).map_err(|msg| load_error(format!("{name}: {msg}")))
    }

    /// The path of the library file as recorded in the dynamic linker's link map.
    ///
    /// The running program opened with [`Library::this`] reports an empty path.
    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    pub fn path(&self) -> Result<std::path::PathBuf> {
        use crate::dlopen::{take_dlerror, LOCK};
        use core::ffi::{c_char, CStr};
        use std::{ffi::OsStr, os::unix::ffi::OsStrExt};

        #[repr(C)]
        #[allow(unused)]
        struct LinkMap {
            l_addr: *mut c_void,
            l_name: *const c_char,
            l_ld: *mut c_void,
            l_next: *mut LinkMap,
            l_prev: *mut LinkMap,
        }

        let mut link_map: *const LinkMap = core::ptr::null();
        let ret = {
            let _lock = LOCK.lock();
            let ret = unsafe {
                libc::dlinfo(
                    self.handle.as_ptr(),
                    libc::RTLD_DI_LINKMAP,
                    (&mut link_map as *mut *const LinkMap).cast(),
                )
            };
            if ret != 0 {
                Err(take_dlerror().unwrap_or_else(|| "dlinfo failed".into()))
            } else {
                Ok(())
            }
        };
        ret.map_err(|msg| load_error(format!("{}: get link map fail: {}", self.name, msg)))?;
        if link_map.is_null() {
            return Err(load_error(format!("{}: get link map fail", self.name)));
        }
        let l_name = unsafe { (*link_map).l_name };
        if l_name.is_null() {
            return Ok(std::path::PathBuf::new());
        }
        let bytes = unsafe { CStr::from_ptr(l_name) }.to_bytes();
        Ok(OsStr::from_bytes(bytes).into())
    }
}

impl Drop for Library {
    fn drop(&mut self) {
        log::info!("dlclose: Closing [{}]", self.name);
        if let Err(msg) = raw_close(self.handle) {
            log::warn!("dlclose: [{}] failed: {}", self.name, msg);
        }
    }
}
