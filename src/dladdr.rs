use crate::{dlopen::LOCK, Symbol};
use core::ffi::{c_void, CStr};
use std::{ffi::OsStr, os::unix::ffi::OsStrExt, path::PathBuf};

/// Where a resolved address lives, as reported by the system `dladdr`.
#[derive(Debug, Clone)]
pub struct SymbolInfo {
    lib_path: PathBuf,
    lib_base: usize,
    sym_name: Option<String>,
    sym_addr: usize,
}

impl SymbolInfo {
    /// Path of the shared object containing the address.
    #[inline]
    pub fn lib_path(&self) -> &std::path::Path {
        &self.lib_path
    }

    /// Base address the shared object is mapped at.
    #[inline]
    pub fn lib_base(&self) -> usize {
        self.lib_base
    }

    /// Name of the nearest exported symbol at or below the address. Aliases share an address,
    /// so this may differ from the name the symbol was resolved with.
    #[inline]
    pub fn sym_name(&self) -> Option<&str> {
        self.sym_name.as_deref()
    }

    /// Exact address of that nearest symbol.
    #[inline]
    pub fn sym_addr(&self) -> usize {
        self.sym_addr
    }

    fn find(addr: *const c_void) -> Option<SymbolInfo> {
        if addr.is_null() {
            return None;
        }
        let mut info: libc::Dl_info = unsafe { core::mem::zeroed() };
        let ret = {
            let _lock = LOCK.lock();
            unsafe { libc::dladdr(addr, &mut info) }
        };
        if ret == 0 {
            log::debug!("dladdr: No object contains {:p}", addr);
            return None;
        }
        let lib_path = if info.dli_fname.is_null() {
            PathBuf::new()
        } else {
            OsStr::from_bytes(unsafe { CStr::from_ptr(info.dli_fname) }.to_bytes()).into()
        };
        let sym_name = (!info.dli_sname.is_null()).then(|| {
            unsafe { CStr::from_ptr(info.dli_sname) }
                .to_string_lossy()
                .into_owned()
        });
        Some(SymbolInfo {
            lib_path,
            lib_base: info.dli_fbase as usize,
            sym_name,
            sym_addr: info.dli_saddr as usize,
        })
    }
}

impl<'lib, T> Symbol<'lib, T> {
    /// Look up the shared object and nearest exported symbol for this address.
    ///
    /// Returns `None` for a null-valued symbol or when no loaded object contains the address.
    pub fn info(&self) -> Option<SymbolInfo> {
        SymbolInfo::find(self.as_ptr())
    }
}
