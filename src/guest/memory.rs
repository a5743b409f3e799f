//! Guest physical memory, backed by `vm-memory`.
//!
//! The guest's entire address space is a single contiguous region starting
//! at guest-physical address 0 - there is no E820 map, no reserved regions
//! below 1MB, and no identity-mapped page tables to build, since this guest
//! never enables paging.

use super::GuestError;
use vm_memory::{Bytes, GuestAddress, GuestMemory as GuestMemoryTrait, GuestMemoryMmap};

/// A flat guest physical memory region.
pub struct GuestMemory {
    inner: GuestMemoryMmap,
    size: u64,
}

impl GuestMemory {
    /// Allocate `size` bytes of guest memory starting at guest-physical 0.
    pub fn new(size: u64) -> Result<Self, GuestError> {
        let regions = vec![(GuestAddress(0), size as usize)];
        let inner = GuestMemoryMmap::from_ranges(&regions)
            .map_err(|e| GuestError::MemoryAllocation(std::io::Error::other(e.to_string())))?;

        Ok(Self { inner, size })
    }

    /// Host virtual address and size, for `set_user_memory_region`.
    ///
    /// # Safety
    ///
    /// The returned pointer is valid only while this `GuestMemory` is alive.
    pub fn as_raw_parts(&self) -> (u64, u64) {
        let region = self.inner.iter().next().expect("memory has no regions");
        (region.as_ptr() as u64, self.size)
    }

    /// Write `data` at guest physical address `addr`.
    pub fn write(&self, addr: u64, data: &[u8]) -> Result<(), GuestError> {
        self.inner
            .write_slice(data, GuestAddress(addr))
            .map_err(|e| {
                GuestError::MemoryAllocation(std::io::Error::other(format!(
                    "write to guest memory at {addr:#x} failed: {e}"
                )))
            })
    }

    /// Read `data.len()` bytes from guest physical address `addr`.
    #[cfg(test)]
    pub fn read(&self, addr: u64, data: &mut [u8]) -> Result<(), GuestError> {
        self.inner
            .read_slice(data, GuestAddress(addr))
            .map_err(|e| {
                GuestError::MemoryAllocation(std::io::Error::other(format!(
                    "read from guest memory at {addr:#x} failed: {e}"
                )))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_reports_requested_size() {
        let mem = GuestMemory::new(4096).unwrap();
        let (_, size) = mem.as_raw_parts();
        assert_eq!(size, 4096);
    }

    #[test]
    fn write_then_read_round_trips() {
        let mem = GuestMemory::new(4096).unwrap();
        mem.write(0, &[1, 2, 3, 4]).unwrap();
        let mut buf = [0u8; 4];
        mem.read(0, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4]);
    }

    #[test]
    fn write_out_of_bounds_errors() {
        let mem = GuestMemory::new(100).unwrap();
        assert!(mem.write(99, &[1, 2]).is_err());
    }
}
