//! Flat raw-binary guest image loading.
//!
//! The guest binary format has no headers and no relocations: it is read
//! from disk in fixed-size chunks and written verbatim at guest-physical
//! address 0, the guest's entry point.

use super::memory::GuestMemory;
use super::GuestError;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Chunk size used when streaming the binary into guest memory.
const CHUNK_SIZE: usize = 4096;

/// Read `path` and write it verbatim at guest-physical address 0.
pub fn load_binary(memory: &GuestMemory, path: &Path) -> Result<(), GuestError> {
    let mut file = File::open(path).map_err(GuestError::ReadBinary)?;
    let mut chunk = [0u8; CHUNK_SIZE];
    let mut offset = 0u64;

    loop {
        let n = file.read(&mut chunk).map_err(GuestError::ReadBinary)?;
        if n == 0 {
            break;
        }
        memory.write(offset, &chunk[..n])?;
        offset += n as u64;
    }

    log::debug!("[guest] loaded {offset} bytes from {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_small_binary_at_address_zero() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0xAA, 0xBB, 0xCC, 0xDD]).unwrap();

        let memory = GuestMemory::new(4096).unwrap();
        load_binary(&memory, file.path()).unwrap();

        let mut buf = [0u8; 4];
        memory.read(0, &mut buf).unwrap();
        assert_eq!(buf, [0xAA, 0xBB, 0xCC, 0xDD]);
    }

    #[test]
    fn loads_binary_larger_than_one_chunk() {
        let data = vec![0x42u8; CHUNK_SIZE + 100];
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&data).unwrap();

        let memory = GuestMemory::new((CHUNK_SIZE * 2) as u64).unwrap();
        load_binary(&memory, file.path()).unwrap();

        let mut buf = vec![0u8; data.len()];
        memory.read(0, &mut buf).unwrap();
        assert_eq!(buf, data);
    }
}
