//! Generates `directblk.h` from the exported functions.
//!
//! The header is written to `OUT_DIR`, and additionally to
//! `$DIRECTBLK_HEADER_DIR` when that is set (for packaging).

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

fn main() {
    println!("cargo:rerun-if-changed=src/lib.rs");
    println!("cargo:rerun-if-env-changed=DIRECTBLK_HEADER_DIR");

    let (Ok(crate_dir), Ok(out_dir)) = (env::var("CARGO_MANIFEST_DIR"), env::var("OUT_DIR"))
    else {
        println!("cargo:warning=CARGO_MANIFEST_DIR or OUT_DIR not set; skipping C header");
        return;
    };

    // Header generation is best-effort; the library itself still builds.
    let bindings = match cbindgen::Builder::new()
        .with_crate(&crate_dir)
        .with_language(cbindgen::Language::C)
        .with_include_guard("DIRECTBLK_H")
        .with_documentation(true)
        .generate()
    {
        Ok(bindings) => bindings,
        Err(e) => {
            println!("cargo:warning=failed to generate C header: {e}");
            return;
        }
    };

    let mut header = Vec::new();
    bindings.write(&mut header);

    let mut targets = vec![PathBuf::from(out_dir)];
    if let Some(dir) = env::var_os("DIRECTBLK_HEADER_DIR") {
        targets.push(PathBuf::from(dir));
    }
    for dir in targets {
        if let Err(e) = write_header(&dir, &header) {
            println!(
                "cargo:warning=failed to write C header to {}: {e}",
                dir.display()
            );
        }
    }
}

fn write_header(dir: &Path, header: &[u8]) -> std::io::Result<()> {
    fs::create_dir_all(dir)?;
    fs::write(dir.join("directblk.h"), header)
}
