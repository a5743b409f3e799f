//! Guest address space, image loading, and vCPU register bring-up.
//!
//! Everything in this module is external-collaborator glue: open the guest
//! binary, map it into guest memory, register that memory with KVM, and
//! point the vCPU at it in flat 32-bit protected mode. None of it is
//! guest-visible ABI - the guest only ever sees memory and the ports in
//! [`crate::devices`].

mod cpu;
mod loader;
mod memory;

pub use memory::GuestMemory;

use crate::kvm::{KvmError, VcpuFd, VmFd};
use std::path::Path;
use thiserror::Error;

/// Default guest memory size: 2 MiB.
pub const DEFAULT_MEM_SIZE: u64 = 2 * 1024 * 1024;

/// Errors that can occur while setting up the guest's address space or
/// initial vCPU state.
#[derive(Error, Debug)]
pub enum GuestError {
    #[error("failed to allocate guest memory: {0}")]
    MemoryAllocation(#[source] std::io::Error),

    #[error("failed to read guest binary: {0}")]
    ReadBinary(#[source] std::io::Error),

    #[error(transparent)]
    Kvm(#[from] KvmError),
}

/// Allocate guest memory, load `binary_path` at guest-physical 0, and
/// register the region with KVM.
pub fn setup_memory(vm: &VmFd, binary_path: &Path, mem_size: u64) -> Result<GuestMemory, GuestError> {
    let memory = GuestMemory::new(mem_size)?;
    loader::load_binary(&memory, binary_path)?;

    let (host_addr, size) = memory.as_raw_parts();
    unsafe {
        vm.set_user_memory_region(0, 0, size, host_addr)?;
    }

    Ok(memory)
}

/// Configure the vCPU for flat 32-bit protected-mode execution starting at
/// guest-physical address 0.
pub fn setup_vcpu_regs(vcpu: &VcpuFd) -> Result<(), GuestError> {
    cpu::setup_cpu_regs(vcpu)
}
