use crate::{load_error, Result};
use bitflags::bitflags;
use core::ffi::c_int;

bitflags! {
    /// Mode passed to the system `dlopen`.
    ///
    /// Exactly one of [`RTLD_LAZY`](OpenFlags::RTLD_LAZY) and [`RTLD_NOW`](OpenFlags::RTLD_NOW)
    /// must be set. The remaining flags are optional modifiers.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct OpenFlags: c_int {
        /// Resolve function symbols the first time they are called.
        const RTLD_LAZY = libc::RTLD_LAZY;
        /// Resolve every undefined symbol before `open` returns.
        const RTLD_NOW = libc::RTLD_NOW;
        /// Make the library's symbols available to libraries opened later.
        const RTLD_GLOBAL = libc::RTLD_GLOBAL;
        /// Keep the library's symbols out of the global scope. This is the default.
        const RTLD_LOCAL = libc::RTLD_LOCAL;
        /// Only succeed if the library is already loaded.
        const RTLD_NOLOAD = libc::RTLD_NOLOAD;
        /// Never unmap the library, even after it is closed.
        const RTLD_NODELETE = libc::RTLD_NODELETE;
    }
}

const BINDING: OpenFlags = OpenFlags::RTLD_LAZY.union(OpenFlags::RTLD_NOW);

impl OpenFlags {
    /// Returns `true` when symbols are bound lazily.
    #[inline]
    pub fn is_lazy(self) -> bool {
        self.intersection(BINDING) == OpenFlags::RTLD_LAZY
    }

    /// Replaces the binding mode, keeping every modifier.
    #[inline]
    pub fn with_lazy(self, lazy: bool) -> OpenFlags {
        let binding = if lazy {
            OpenFlags::RTLD_LAZY
        } else {
            OpenFlags::RTLD_NOW
        };
        self.difference(BINDING).union(binding)
    }

    pub(crate) fn validate(self) -> Result<()> {
        if self.bits() & !OpenFlags::all().bits() != 0 {
            return Err(load_error(format!(
                "invalid mode for dlopen: unknown bits {:#x}",
                self.bits() & !OpenFlags::all().bits()
            )));
        }
        let binding = self.intersection(BINDING);
        if binding != OpenFlags::RTLD_LAZY && binding != OpenFlags::RTLD_NOW {
            return Err(load_error(
                "invalid mode for dlopen: exactly one of RTLD_LAZY or RTLD_NOW must be set",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_binding() {
        assert!(OpenFlags::RTLD_LAZY.validate().is_ok());
        assert!(OpenFlags::RTLD_NOW.validate().is_ok());
        assert!((OpenFlags::RTLD_LAZY | OpenFlags::RTLD_GLOBAL)
            .validate()
            .is_ok());
        assert!((OpenFlags::RTLD_NOW | OpenFlags::RTLD_NODELETE)
            .validate()
            .is_ok());
        assert!(OpenFlags::empty().validate().is_err());
        assert!((OpenFlags::RTLD_LAZY | OpenFlags::RTLD_NOW)
            .validate()
            .is_err());
    }

    #[test]
    fn validate_unknown_bits() {
        let flags = OpenFlags::from_bits_retain(libc::RTLD_LAZY | 0x8000_0000u32 as c_int);
        assert!(matches!(
            flags.validate(),
            Err(crate::Error::LoadError { .. })
        ));
    }

    #[test]
    fn replace_binding() {
        let flags = OpenFlags::RTLD_NOW | OpenFlags::RTLD_GLOBAL;
        assert!(!flags.is_lazy());
        let lazy = flags.with_lazy(true);
        assert!(lazy.is_lazy());
        assert!(lazy.contains(OpenFlags::RTLD_GLOBAL));
        assert!(lazy.validate().is_ok());
        assert_eq!(lazy.with_lazy(false), flags);
    }
}
