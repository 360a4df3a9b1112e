//! Tests against shared objects built from `tests/fixtures` at test time.
#![cfg(target_os = "linux")]
use dyload::{Error, Library, Loader, OpenFlags};
use std::{
    fs,
    path::{Path, PathBuf},
    process::Command,
    sync::Once,
};

type Answer = extern "C" fn() -> i32;

fn init() {
    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

fn out_dir(tag: &str) -> PathBuf {
    let dir = Path::new(env!("CARGO_TARGET_TMPDIR"))
        .join(format!("{}-{}", tag, std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

/// Builds `tests/fixtures/<source>` into a shared object with lazy binding, so undefined
/// functions are only looked up when called.
fn compile(source: &str, output: &Path, defines: &[(&str, &str)]) {
    let mut cmd = Command::new("cc");
    cmd.arg("-shared")
        .arg("-fPIC")
        .arg("-Wl,-z,lazy")
        .arg("-o")
        .arg(output)
        .arg(Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(source));
    for (key, value) in defines {
        cmd.arg(format!("-D{key}={value}"));
    }
    assert!(cmd
        .status()
        .expect("could not compile the test fixtures!")
        .success());
}

fn bind_now_forced() -> bool {
    std::env::var_os("LD_BIND_NOW").is_some_and(|val| !val.is_empty())
}

#[test]
fn eager_binding_reports_undefined_function() {
    init();
    let dir = out_dir("eager");
    let path = dir.join("libundefeager.so");
    compile("undef.c", &path, &[]);
    let err = Library::open(path.to_str().unwrap(), OpenFlags::RTLD_NOW).unwrap_err();
    match err {
        Error::LoadError { msg } => {
            assert!(msg.contains("dyload_missing_fn"), "{msg}");
            assert!(msg.contains("undefined symbol"), "{msg}");
        }
        err => panic!("unexpected error: {err:?}"),
    }
}

#[test]
fn lazy_binding_defers_undefined_function() {
    init();
    if bind_now_forced() {
        return;
    }
    let dir = out_dir("lazy");
    let path = dir.join("libundeflazy.so");
    compile("undef.c", &path, &[]);
    let name = path.to_str().unwrap();
    // an object that failed to bind is not kept, so the lazy open below maps it afresh
    assert!(matches!(
        Library::open(name, OpenFlags::RTLD_NOW),
        Err(Error::LoadError { .. })
    ));
    let mut loader = Loader::new();
    let handle = loader.open(name, OpenFlags::RTLD_LAZY).unwrap();
    let answer = unsafe { loader.resolve::<Answer>(handle, "dyload_answer").unwrap() };
    assert_eq!(answer(), 42);
}

#[test]
fn search_path_completes_logical_name() {
    init();
    let dir = out_dir("search");
    compile("answer.c", &dir.join("libdyloadsearch.so.1"), &[]);

    let mut bare = Loader::new();
    assert!(matches!(
        bare.open("libdyloadsearch", OpenFlags::RTLD_LAZY),
        Err(Error::LoadError { .. })
    ));

    let mut loader = Loader::new();
    loader.add_search_path(&dir);
    let handle = loader.open("libdyloadsearch", OpenFlags::RTLD_LAZY).unwrap();
    assert_eq!(
        loader.library(handle).unwrap().name(),
        dir.join("libdyloadsearch.so.1").to_str().unwrap()
    );
    let answer = unsafe { loader.resolve::<Answer>(handle, "dyload_answer").unwrap() };
    assert_eq!(answer(), 42);
}

#[test]
fn drop_releases_in_reverse_order() {
    init();
    let dir = out_dir("fini");
    let log = dir.join("fini.log");
    let log_define = format!("\"{}\"", log.display());
    let mut libs = Vec::new();
    for tag in ["a", "b", "c"] {
        let path = dir.join(format!("libfini{tag}.so"));
        compile(
            "fini.c",
            &path,
            &[("FINI_LOG", &log_define), ("DYLOAD_TAG", &format!("\"{tag}\""))],
        );
        libs.push(path);
    }
    {
        let mut loader = Loader::new();
        for path in &libs {
            loader.open(path.to_str().unwrap(), OpenFlags::RTLD_LAZY).unwrap();
        }
        assert_eq!(loader.len(), 3);
        assert!(!log.exists());
    }
    assert_eq!(fs::read_to_string(&log).unwrap(), "cba");
}

#[test]
fn close_releases_before_drop() {
    init();
    let dir = out_dir("close");
    let log = dir.join("fini.log");
    let log_define = format!("\"{}\"", log.display());
    let first = dir.join("libclosea.so");
    let second = dir.join("libcloseb.so");
    compile("fini.c", &first, &[("FINI_LOG", &log_define), ("DYLOAD_TAG", "\"a\"")]);
    compile("fini.c", &second, &[("FINI_LOG", &log_define), ("DYLOAD_TAG", "\"b\"")]);

    let mut loader = Loader::new();
    let a = loader.open(first.to_str().unwrap(), OpenFlags::RTLD_LAZY).unwrap();
    loader.open(second.to_str().unwrap(), OpenFlags::RTLD_LAZY).unwrap();
    loader.close(a).unwrap();
    assert_eq!(fs::read_to_string(&log).unwrap(), "a");
    drop(loader);
    assert_eq!(fs::read_to_string(&log).unwrap(), "ab");
}
