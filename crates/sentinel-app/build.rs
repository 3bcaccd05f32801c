use std::env;
use std::fs;
use std::path::PathBuf;

/// Exports the workspace `VERSION` file as `SENTINEL_VERSION`.
fn main() {
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").expect("manifest dir"));
    let version_path = manifest_dir
        .ancestors()
        .nth(2)
        .expect("crate lives two levels below the workspace root")
        .join("VERSION");

    println!("cargo:rerun-if-changed={}", version_path.display());

    let version = fs::read_to_string(&version_path)
        .unwrap_or_else(|error| panic!("read {}: {error}", version_path.display()));
    let version = version.trim();
    assert!(!version.is_empty(), "VERSION must not be empty");

    println!("cargo:rustc-env=SENTINEL_VERSION={version}");
}
