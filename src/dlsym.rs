use crate::{
    dlopen::{take_dlerror, LOCK},
    symbol_not_found_error, Library, Result,
};
use core::{
    ffi::{c_void, CStr},
    fmt::Debug,
    marker::PhantomData,
    ops,
    ptr::NonNull,
};
use std::ffi::CString;

fn raw_sym(handle: NonNull<c_void>, name: &CStr) -> core::result::Result<*mut c_void, String> {
    let _lock = LOCK.lock();
    // A null address is a valid symbol value, only a pending error means it is absent.
    take_dlerror();
    let sym = unsafe { libc::dlsym(handle.as_ptr(), name.as_ptr()) };
    if sym.is_null() {
        if let Some(msg) = take_dlerror() {
            return Err(msg);
        }
    }
    Ok(sym)
}

impl Library {
    /// Get a pointer to a function or static variable by symbol name.
    ///
    /// The symbol is interpreted as-is; no mangling is done. This means that symbols like `x::y` are
    /// most likely invalid.
    ///
    /// # Safety
    ///
    /// Users of this API must specify the correct type of the function or variable loaded.
    /// Dynamic symbol tables carry no type information, so a wrong `T` is undefined behavior
    /// rather than an error.
    ///
    /// # Examples
    ///
    /// Loading and using a function looks like this:
    ///
    /// ```no_run
    /// # use dyload::{Library, OpenFlags, Symbol};
    /// let lib = Library::open("libm", OpenFlags::RTLD_LAZY).unwrap();
    /// unsafe {
    ///     let cos: Symbol<extern "C" fn(f64) -> f64> = lib.get("cos").unwrap();
    ///     cos(2.0);
    /// }
    /// ```
    ///
    /// A static variable may also be loaded and inspected:
    ///
    /// ```no_run
    /// # use dyload::{Library, OpenFlags, Symbol};
    /// # let lib = Library::open("libawesome.so", OpenFlags::RTLD_LAZY).unwrap();
    /// unsafe {
    ///     let awesome_variable: Symbol<*mut f64> = lib.get("awesome_variable").unwrap();
    ///     **awesome_variable = 42.0;
    /// };
    /// ```
    pub unsafe fn get<'lib, T>(&'lib self, name: &str) -> Result<Symbol<'lib, T>> {
        let cname = CString::new(name).map_err(|_| {
            symbol_not_found_error(format!("{name}: symbol name contains a nul byte"))
        })?;
        let ptr = raw_sym(self.handle(), &cname).map_err(|msg| {
            symbol_not_found_error(format!("can not find symbol [{name}]: {msg}"))
        })?;
        log::debug!("dlsym: Found [{}] in [{}] at {:p}", name, self.name(), ptr);
        Ok(Symbol {
            ptr,
            pd: PhantomData,
        })
    }
}

/// A symbol resolved from a [`Library`], typed as `T`.
///
/// `T` is normally a function pointer such as `extern "C" fn(f64) -> f64` or a raw pointer to a
/// static. The symbol borrows its library, so the library can not be closed while it is alive.
pub struct Symbol<'lib, T: 'lib> {
    ptr: *mut c_void,
    pd: PhantomData<&'lib T>,
}

impl<'lib, T> Symbol<'lib, T> {
    /// The address of the symbol.
    #[inline]
    pub fn as_ptr(&self) -> *mut c_void {
        self.ptr
    }

    /// Drop the borrow of the library and return the bare address.
    ///
    /// The address is only valid while the library stays open.
    #[inline]
    pub fn into_raw(self) -> *mut c_void {
        self.ptr
    }
}

impl<'lib, T> Clone for Symbol<'lib, T> {
    fn clone(&self) -> Self {
        Symbol {
            ptr: self.ptr,
            pd: PhantomData,
        }
    }
}

impl<'lib, T> Debug for Symbol<'lib, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Symbol").field("ptr", &self.ptr).finish()
    }
}

impl<'lib, T> ops::Deref for Symbol<'lib, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*(&self.ptr as *const *mut _ as *const T) }
    }
}

unsafe impl<'lib, T: Send> Send for Symbol<'lib, T> {}
unsafe impl<'lib, T: Sync> Sync for Symbol<'lib, T> {}
