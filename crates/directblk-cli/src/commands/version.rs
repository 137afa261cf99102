//! Version command implementation.

use directblk_io::{DEFAULT_ALIGNMENT, DEFAULT_BLOCK_SIZE};

/// Version information for the CLI.
const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn run() {
    println!("directblk {VERSION}");
    println!();
    println!("Direct block-device I/O probe and benchmark.");
    println!();
    println!("Build info:");
    println!("  Target:       {}", std::env::consts::ARCH);
    println!("  OS:           {}", std::env::consts::OS);
    println!("  Direct I/O:   {}", direct_io_support());
    println!();
    println!("Defaults:");
    println!("  Block size:   {DEFAULT_BLOCK_SIZE} bytes");
    println!("  Alignment:    {DEFAULT_ALIGNMENT} bytes");
}

fn direct_io_support() -> &'static str {
    if cfg!(target_os = "linux") {
        "O_DIRECT"
    } else if cfg!(target_os = "macos") {
        "F_NOCACHE"
    } else {
        "unsupported (use --buffered)"
    }
}
