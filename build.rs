#[cfg(target_os = "macos")]
fn main() {
    use std::env;
    use std::fs;
    use std::path::PathBuf;

    // screencapturekit links Swift bridging code against @rpath/libswift_Concurrency.dylib.
    // The system copy lives under /usr/lib/swift; point the rpath there.
    println!("cargo:rustc-link-arg=-Wl,-rpath,/usr/lib/swift");
    println!("cargo:rerun-if-changed=build.rs");

    // OUT_DIR is target/{profile}/build/{crate-hash}/out.
    let Some(profile_dir) = env::var("OUT_DIR")
        .ok()
        .map(PathBuf::from)
        .and_then(|out| out.ancestors().nth(3).map(PathBuf::from))
    else {
        return;
    };

    // A bundled copy next to the binary would be loaded twice alongside the system runtime.
    for stale in [
        profile_dir.join("libswift_Concurrency.dylib"),
        profile_dir.join("deps").join("libswift_Concurrency.dylib"),
    ] {
        let _ = fs::remove_file(stale);
    }
}

#[cfg(not(target_os = "macos"))]
fn main() {}
