//!A small Rust library for opening shared libraries at runtime and resolving typed symbols
//!through the system dynamic linker.
//!
//!It offers two layers:
//!1. [`Library`]: one open library. Dropping it closes the library, and the symbols it hands out
//!   borrow it, so a symbol can never outlive the mapping it points into.
//!2. [`Loader`]: a table of libraries addressed by [`LibraryHandle`]. Handles go from open to
//!   closed exactly once and are never reused.
//!
//!Library names may be paths or logical names such as `"libm"`, which are completed to the
//!installed shared object (`libm.so.6` on glibc) when the platform cannot find them as given.
//!
//! # Examples
//! ```no_run
//! use dyload::{Loader, OpenFlags};
//!
//! let mut loader = Loader::new();
//! let libm = loader.open("libm", OpenFlags::RTLD_LAZY).unwrap();
//! {
//!     let cos = unsafe {
//!         loader
//!             .resolve::<extern "C" fn(f64) -> f64>(libm, "cos")
//!             .unwrap()
//!     };
//!     println!("{:.6}", cos(2.0));
//! }
//! loader.close(libm).unwrap();
//! ```
mod dladdr;
mod dlopen;
mod dlsym;
mod flags;
mod library;
mod loader;
mod search;

use core::fmt::Display;
pub use dladdr::SymbolInfo;
pub use dlsym::Symbol;
pub use flags::OpenFlags;
pub use library::Library;
pub use loader::{HandleState, LibraryHandle, Loader};

#[cfg(not(unix))]
compile_error!("unsupport platform: dyload needs a unix dynamic linker");

#[derive(Debug)]
pub enum Error {
    /// Returned when a library can not be found, fails to initialize or fails to close.
    LoadError {
        msg: String,
    },
    /// Returned when a symbol is absent from the library's export table.
    SymbolNotFoundError {
        msg: String,
    },
    /// Returned when a handle is closed or was never issued by the loader.
    InvalidHandleError {
        handle: LibraryHandle,
    },
}

impl Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::LoadError { msg } => write!(f, "{msg}"),
            Error::SymbolNotFoundError { msg } => write!(f, "{msg}"),
            Error::InvalidHandleError { handle } => write!(f, "invalid handle: {handle}"),
        }
    }
}

impl std::error::Error for Error {}

#[cold]
#[inline(never)]
fn load_error(msg: impl ToString) -> Error {
    Error::LoadError {
        msg: msg.to_string(),
    }
}

#[cold]
#[inline(never)]
fn symbol_not_found_error(msg: impl ToString) -> Error {
    Error::SymbolNotFoundError {
        msg: msg.to_string(),
    }
}

#[cold]
#[inline(never)]
fn invalid_handle_error(handle: LibraryHandle) -> Error {
    Error::InvalidHandleError { handle }
}

pub type Result<T> = core::result::Result<T, Error>;
