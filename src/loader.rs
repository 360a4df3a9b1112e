use crate::{invalid_handle_error, Library, OpenFlags, Result, Symbol};
use core::{
    fmt::Display,
    sync::atomic::{AtomicU64, Ordering},
};
use indexmap::IndexMap;
use std::path::PathBuf;

/// Loader ids are process-wide, so a handle from one loader is never valid in another.
static NEXT_LOADER: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier of a library opened by a [`Loader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LibraryHandle {
    loader: u64,
    index: u64,
}

impl Display for LibraryHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "#{}.{}", self.loader, self.index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    /// The library is mapped and symbols can be resolved.
    Open,
    /// The library was closed. A handle never leaves this state.
    Closed,
}

/// Owns a set of open libraries and hands out [`LibraryHandle`]s for them.
///
/// `open` and `close` take `&mut self` while `resolve` takes `&self`, so a resolved [`Symbol`]
/// keeps every library of the loader open for as long as it is alive. Share a loader between
/// threads behind a `RwLock` to resolve concurrently.
///
/// Closing is idempotent: closing an already closed handle does nothing. Only open libraries
/// are kept; a closed handle is recognized by falling inside the range this loader issued, so
/// opening and closing in a loop does not grow the loader. Dropping the loader closes the
/// libraries that are still open, most recently opened first.
///
/// # Examples
/// ```no_run
/// use dyload::{Loader, OpenFlags};
///
/// let mut loader = Loader::new();
/// let libm = loader.open("libm", OpenFlags::RTLD_NOW).unwrap();
/// let value = {
///     let cos = unsafe {
///         loader
///             .resolve::<extern "C" fn(f64) -> f64>(libm, "cos")
///             .unwrap()
///     };
///     cos(0.0)
/// };
/// assert_eq!(value, 1.0);
/// loader.close(libm).unwrap();
/// loader.close(libm).unwrap();
/// ```
#[derive(Debug)]
pub struct Loader {
    id: u64,
    next_index: u64,
    libs: IndexMap<LibraryHandle, Library>,
    search_paths: Vec<PathBuf>,
}

impl Default for Loader {
    fn default() -> Loader {
        Loader::new()
    }
}

impl Loader {
    pub fn new() -> Loader {
        Loader {
            id: NEXT_LOADER.fetch_add(1, Ordering::Relaxed),
            next_index: 0,
            libs: IndexMap::new(),
            search_paths: Vec::new(),
        }
    }

    /// Add a directory searched when completing logical library names, ahead of
    /// `LD_LIBRARY_PATH` and the system library directories.
    pub fn add_search_path(&mut self, dir: impl Into<PathBuf>) -> &mut Loader {
        self.search_paths.push(dir.into());
        self
    }

    /// Open a library and return a new handle for it. See [`Library::open`] for how `name` is
    /// looked up.
    ///
    /// Opening the same library twice yields two distinct handles.
    pub fn open(&mut self, name: impl AsRef<str>, flags: OpenFlags) -> Result<LibraryHandle> {
        let lib = Library::open_in(name.as_ref(), flags, &self.search_paths)?;
        let handle = LibraryHandle {
            loader: self.id,
            index: self.next_index,
        };
        self.next_index += 1;
        log::debug!("loader: [{}] is open as {}", lib.name(), handle);
        self.libs.insert(handle, lib);
        Ok(handle)
    }

    /// Resolve a symbol from an open library.
    ///
    /// # Safety
    ///
    /// `T` must match the real type of the symbol, see [`Library::get`].
    pub unsafe fn resolve<'lib, T>(
        &'lib self,
        handle: LibraryHandle,
        name: &str,
    ) -> Result<Symbol<'lib, T>> {
        self.library(handle)?.get(name)
    }

    /// Close a library. Closing a handle that is already closed is a no-op.
    ///
    /// The handle is closed even when the platform reports an error.
    pub fn close(&mut self, handle: LibraryHandle) -> Result<()> {
        match self.libs.shift_remove(&handle) {
            Some(lib) => lib.close(),
            None if self.issued(handle) => {
                log::debug!("loader: {} is already closed", handle);
                Ok(())
            }
            None => Err(invalid_handle_error(handle)),
        }
    }

    #[inline]
    fn issued(&self, handle: LibraryHandle) -> bool {
        handle.loader == self.id && handle.index < self.next_index
    }

    /// The state of `handle`, or `None` when this loader never issued it.
    pub fn state(&self, handle: LibraryHandle) -> Option<HandleState> {
        if self.libs.contains_key(&handle) {
            Some(HandleState::Open)
        } else if self.issued(handle) {
            Some(HandleState::Closed)
        } else {
            None
        }
    }

    /// Borrow the library behind an open handle.
    pub fn library(&self, handle: LibraryHandle) -> Result<&Library> {
        self.libs
            .get(&handle)
            .ok_or_else(|| invalid_handle_error(handle))
    }

    /// Open handles, in the order they were opened.
    pub fn handles(&self) -> impl Iterator<Item = LibraryHandle> + '_ {
        self.libs.keys().copied()
    }

    /// Number of open handles.
    pub fn len(&self) -> usize {
        self.libs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.libs.is_empty()
    }
}

impl Drop for Loader {
    fn drop(&mut self) {
        while let Some((handle, lib)) = self.libs.pop() {
            log::debug!("loader: Releasing {}", handle);
            drop(lib);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_handles_are_not_kept() {
        let mut loader = Loader::new();
        let mut closed = Vec::new();
        for _ in 0..16 {
            let handle = loader.open("libm", OpenFlags::RTLD_LAZY).unwrap();
            loader.close(handle).unwrap();
            closed.push(handle);
        }
        assert!(loader.libs.is_empty());
        assert_eq!(loader.next_index, 16);
        for handle in closed {
            assert_eq!(loader.state(handle), Some(HandleState::Closed));
            assert!(loader.close(handle).is_ok());
        }
    }

    #[test]
    fn handles_are_scoped_to_their_loader() {
        let mut first = Loader::new();
        let second = Loader::new();
        let handle = first.open("libm", OpenFlags::RTLD_LAZY).unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(second.state(handle), None);
        let unissued = LibraryHandle {
            loader: first.id,
            index: first.next_index,
        };
        assert_eq!(first.state(unissued), None);
    }
}
