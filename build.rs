//! Writes `include/acta.h` for the `acta_*` C ABI declared in `src/ffi.rs`.

use std::env;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-changed=src/ffi.rs");
    println!("cargo:rerun-if-changed=cbindgen.toml");

    let crate_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".into()));
    let header = crate_dir.join("include").join("acta.h");

    // Only the FFI module is scanned; every exported item lives there.
    let generated = cbindgen::Config::from_file(crate_dir.join("cbindgen.toml")).and_then(|config| {
        cbindgen::Builder::new()
            .with_config(config)
            .with_src(crate_dir.join("src").join("ffi.rs"))
            .generate()
            .map_err(|e| e.to_string())
    });

    match generated {
        Ok(bindings) => {
            if let Some(dir) = header.parent() {
                if let Err(e) = std::fs::create_dir_all(dir) {
                    println!("cargo:warning=cannot create {}: {e}", dir.display());
                    return;
                }
            }
            bindings.write_to_file(&header);
        }
        // Rust-only consumers still build without the header.
        Err(e) => println!("cargo:warning=acta.h not generated: {e}"),
    }
}
