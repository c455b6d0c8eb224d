use std::env;
use std::fs;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-changed=memory.x");
    println!("cargo:rerun-if-changed=build.rs");

    // Host builds (unit tests) link nothing from cortex-m-rt.
    let target = env::var("TARGET").unwrap_or_default();
    if !target.starts_with("thumbv7em") {
        return;
    }

    // memory.x goes next to cortex-m-rt's link.x, which includes it
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    fs::write(out_dir.join("memory.x"), include_bytes!("memory.x")).unwrap();
    println!("cargo:rustc-link-search={}", out_dir.display());
    println!("cargo:rustc-link-arg-bins=-Tlink.x");
}
