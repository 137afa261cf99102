//! Probe command: one write and one read-back at a single block.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use directblk_config::ConfigLoader;
use directblk_io::{BlockAddress, BlockGeometry, DeviceHandle, OpenMode};

use crate::style::{
    colors::SemanticStyle, print_hint, print_info_table, print_success, print_warn,
};

pub struct ProbeArgs {
    pub path: PathBuf,
    pub block: i64,
    pub buffered: bool,
    pub pattern: u8,
    pub block_size: Option<usize>,
    pub project_dir: PathBuf,
}

/// Overwrites `args.block` with the pattern, reads it back, and compares.
pub fn run(args: &ProbeArgs) -> Result<()> {
    let config = ConfigLoader::new()
        .with_project_dir(&args.project_dir)
        .load()
        .context("Failed to load configuration")?;

    let geometry = BlockGeometry::new(
        args.block_size.unwrap_or(config.geometry.block_size),
        config.geometry.alignment,
    )?;
    let mode = if args.buffered {
        OpenMode::Buffered
    } else {
        OpenMode::from_direct(config.device.direct)
    };
    let address = BlockAddress::try_from(args.block)?;
    let offset = geometry.offset_of(address)?;

    println!(
        "Probing {} ({mode}, {geometry})",
        args.path.display().path()
    );

    let mut handle = DeviceHandle::open(&args.path, mode, geometry).with_context(|| {
        format!("Failed to open {}", args.path.display())
    })?;

    let block_size = geometry.block_size();
    let written = handle.write_block(address, &vec![args.pattern; block_size])?;
    let mut readback = vec![!args.pattern; block_size];
    let read = handle.read_block(address, &mut readback, true)?;
    handle.close()?;

    let mismatched = readback[..read]
        .iter()
        .position(|&b| b != args.pattern);

    print_info_table(&[
        ("Device", args.path.display().to_string()),
        ("Mode", mode.to_string()),
        ("Block", address.to_string()),
        ("Byte offset", offset.to_string()),
        ("Pattern", format!("{:#04x}", args.pattern)),
        ("Written", format!("{written} / {block_size} bytes")),
        ("Read back", format!("{read} / {block_size} bytes")),
    ]);

    if written < block_size || read < block_size {
        print_warn("Short transfer; the device ended inside this block");
    }
    if let Some(at) = mismatched {
        bail!(
            "Verification failed at byte {at}: expected {:#04x}, read {:#04x}",
            args.pattern,
            readback[at]
        );
    }
    if read == 0 {
        print_hint("Nothing was read back; the block lies past the end of the device");
        bail!("Block {address} is not readable");
    }

    print_success(&format!(
        "Block {} verified ({read} bytes)",
        address.to_string().success()
    ));
    Ok(())
}
