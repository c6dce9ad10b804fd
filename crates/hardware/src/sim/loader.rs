//! Program loader.
//!
//! This module turns a file on disk into a [`Process`]. It supports:
//! 1. **ELF:** 64-bit little-endian executables; every loadable segment is placed at
//!    its virtual address and execution starts at the header's entry point.
//! 2. **Flat binaries:** Any other file is loaded verbatim at address zero with entry
//!    point zero.

use std::fs;
use std::path::Path;

use object::read::elf::ElfFile64;
use object::{Endianness, Object, ObjectSegment};
use tracing::debug;

use crate::common::error::{Result, SimError};
use crate::os::Process;

/// Magic bytes opening every ELF file.
const ELF_MAGIC: &[u8; 4] = b"\x7fELF";

/// Reads `path` and lays it out in a memory of `memory_size` bytes.
///
/// # Errors
///
/// Returns [`SimError::Io`] if the file cannot be read, [`SimError::Load`] for a
/// malformed ELF image and [`SimError::ProgramTooLarge`] if it does not fit.
pub fn load_program(path: impl AsRef<Path>, memory_size: u64) -> Result<Process> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|source| SimError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let (image, entry) = if bytes.starts_with(ELF_MAGIC) {
        elf_image(&bytes, memory_size)?
    } else {
        (bytes, 0)
    };
    debug!(
        path = %path.display(),
        size = image.len(),
        entry = format_args!("{entry:#x}"),
        "program loaded"
    );
    Process::new(image, entry, memory_size)
}

/// Flattens the loadable segments of an ELF file into an image based at zero.
///
/// # Returns
///
/// The image, long enough to cover the highest segment end, and the entry point.
///
/// # Errors
///
/// Returns [`SimError::Load`] if the file cannot be parsed and
/// [`SimError::ProgramTooLarge`] if a segment ends beyond `memory_size`.
pub fn elf_image(bytes: &[u8], memory_size: u64) -> Result<(Vec<u8>, u64)> {
    let elf = ElfFile64::<Endianness>::parse(bytes)
        .map_err(|e| SimError::Load(format!("invalid ELF file: {e}")))?;

    let mut image = Vec::new();
    for segment in elf.segments() {
        let address = segment.address();
        let data = segment
            .data()
            .map_err(|e| SimError::Load(format!("unreadable segment at {address:#x}: {e}")))?;
        let end = address.saturating_add(segment.size());
        if end > memory_size {
            return Err(SimError::ProgramTooLarge {
                size: end,
                memory: memory_size,
            });
        }
        let (start, end) = (address as usize, end as usize);
        if image.len() < end {
            image.resize(end, 0);
        }
        let len = data.len().min(end - start);
        image[start..start + len].copy_from_slice(&data[..len]);
    }
    Ok((image, elf.entry()))
}
