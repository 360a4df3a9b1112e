//! Environment configuration and completion of logical library names.
use spin::Once;
use std::{
    ffi::{OsStr, OsString},
    path::{Path, PathBuf},
};

static BIND_NOW: Once<bool> = Once::new();
static LD_LIBRARY_PATH: Once<Vec<PathBuf>> = Once::new();

cfg_if::cfg_if! {
    if #[cfg(target_os = "macos")] {
        const DYLIB_SUFFIX: &str = ".dylib";

        /// Version of `libfoo.<N>[.<M>...].dylib` for the logical name `libfoo`.
        fn version_of(file_name: &str, name: &str) -> Option<Vec<u32>> {
            file_name
                .strip_prefix(name)?
                .strip_prefix('.')?
                .strip_suffix(DYLIB_SUFFIX)
                .and_then(parse_version)
        }
    } else {
        const DYLIB_SUFFIX: &str = ".so";

        /// Version of `libfoo.so.<N>[.<M>...]` for the logical name `libfoo`.
        fn version_of(file_name: &str, name: &str) -> Option<Vec<u32>> {
            file_name
                .strip_prefix(name)?
                .strip_prefix(DYLIB_SUFFIX)?
                .strip_prefix('.')
                .and_then(parse_version)
        }
    }
}

/// Whether `LD_BIND_NOW` forces eager binding.
///
/// The system dynamic linker binds every library eagerly when the variable is set to any
/// non-empty value, whatever mode `dlopen` is given, so the requested mode is upgraded to match.
pub(crate) fn bind_now() -> bool {
    *BIND_NOW.call_once(|| {
        let bind_now = parse_bind_now(std::env::var_os("LD_BIND_NOW").as_deref());
        if bind_now {
            log::debug!("LD_BIND_NOW is set: every library is bound eagerly");
        }
        bind_now
    })
}

fn parse_bind_now(val: Option<&OsStr>) -> bool {
    val.is_some_and(|val| !val.is_empty())
}

fn ld_library_path() -> &'static [PathBuf] {
    LD_LIBRARY_PATH.call_once(|| {
        std::env::var_os("LD_LIBRARY_PATH")
            .map(|paths| split_paths(&paths))
            .unwrap_or_default()
    })
}

fn split_paths(paths: &OsString) -> Vec<PathBuf> {
    std::env::split_paths(paths)
        .filter(|path| !path.as_os_str().is_empty())
        .collect()
}

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        fn system_dirs() -> Vec<PathBuf> {
            let env = if cfg!(target_env = "musl") { "musl" } else { "gnu" };
            let multiarch = format!("{}-linux-{}", std::env::consts::ARCH, env);
            let mut dirs = Vec::new();
            for root in ["/lib", "/usr/lib"] {
                dirs.push(Path::new(root).join(&multiarch));
            }
            for dir in ["/lib64", "/usr/lib64", "/lib", "/usr/lib", "/usr/local/lib"] {
                dirs.push(PathBuf::from(dir));
            }
            dirs
        }
    } else if #[cfg(target_os = "macos")] {
        fn system_dirs() -> Vec<PathBuf> {
            ["/usr/lib", "/usr/local/lib", "/opt/homebrew/lib"]
                .into_iter()
                .map(PathBuf::from)
                .collect()
        }
    } else {
        fn system_dirs() -> Vec<PathBuf> {
            ["/lib", "/usr/lib", "/usr/local/lib"]
                .into_iter()
                .map(PathBuf::from)
                .collect()
        }
    }
}

/// Returns `true` when `name` should only be handed to the platform as given.
fn is_exact(name: &str) -> bool {
    name.contains('/') || name.ends_with(DYLIB_SUFFIX) || name.contains(".so.")
}

/// Names to try after `name` itself failed to load, in order.
///
/// `extra_dirs` are searched before `LD_LIBRARY_PATH` and the system library directories.
pub(crate) fn fallback_candidates(name: &str, extra_dirs: &[PathBuf]) -> Vec<PathBuf> {
    if name.is_empty() || is_exact(name) {
        return Vec::new();
    }
    let mut candidates = vec![PathBuf::from(format!("{name}{DYLIB_SUFFIX}"))];
    let dirs: Vec<PathBuf> = extra_dirs
        .iter()
        .chain(ld_library_path())
        .cloned()
        .chain(system_dirs())
        .collect();
    candidates.extend(versioned_candidates(name, &dirs));
    candidates
}

/// Finds the versioned files of `name` in `dirs` (`<name>.so.<N>`, or `<name>.<N>.dylib` on
/// macOS), highest version first.
///
/// Directories earlier in `dirs` win when two of them hold the same version.
pub(crate) fn versioned_candidates(name: &str, dirs: &[PathBuf]) -> Vec<PathBuf> {
    let mut found: Vec<(Vec<u32>, PathBuf)> = Vec::new();
    for dir in dirs {
        let Ok(entries) = std::fs::read_dir(dir) else {
            log::trace!("skip search dir [{}]", dir.display());
            continue;
        };
        for entry in entries.flatten() {
            let file_name = entry.file_name();
            let Some(version) = file_name
                .to_str()
                .and_then(|file_name| version_of(file_name, name))
            else {
                continue;
            };
            log::trace!("found candidate [{}]", entry.path().display());
            if !found.iter().any(|(v, _)| *v == version) {
                found.push((version, entry.path()));
            }
        }
    }
    found.sort_by(|(a, _), (b, _)| b.cmp(a));
    found.into_iter().map(|(_, path)| path).collect()
}

fn parse_version(suffix: &str) -> Option<Vec<u32>> {
    suffix.split('.').map(|part| part.parse().ok()).collect()
}
