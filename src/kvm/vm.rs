//! Virtual Machine creation and memory management.
//!
//! This module handles VM-level KVM operations: registering the guest
//! memory region and creating the (single) vCPU.
//!
//! # Memory Regions
//!
//! Guest memory is managed through "memory slots". Each slot maps a range of
//! guest physical addresses to host virtual addresses:
//!
//! ```text
//! Guest Physical          Host Virtual
//! ┌──────────────┐       ┌──────────────┐
//! │ 0x00000000   │ ────► │ mmap'd region│
//! │              │       │              │
//! │ mem_size     │       │              │
//! └──────────────┘       └──────────────┘
//! ```
//!
//! KVM uses EPT (Extended Page Tables) or NPT (Nested Page Tables) to
//! translate guest physical addresses to host physical addresses through the
//! host's MMU.
//!
//! # Why no IRQ chip or PIT
//!
//! Many KVM VMMs set up an in-kernel IRQ chip and a PIT before creating
//! vCPUs, because a full Linux guest expects interrupt controllers and a
//! programmable timer during early boot. This design has no interrupt
//! injection (see the crate's non-goals): the guest polls device ports
//! instead of taking interrupts, so neither piece of in-kernel machinery is
//! needed.
//!
//! The TSS address is a different story: on Intel hosts KVM still needs a
//! region of guest physical memory set aside to hold the task-state segment
//! it uses internally for real-mode emulation, even though this guest never
//! touches real mode or task switching itself. `KVM_SET_TSS_ADDR` is cheap
//! and every x86 KVM guest ends up calling it, so it stays.

use super::{KvmError, VcpuFd};
use kvm_bindings::kvm_userspace_memory_region;

/// Guest-physical address KVM reserves for its internal TSS.
const TSS_ADDRESS: u64 = 0xfffb_d000;

/// Wrapper around the KVM VM file descriptor.
///
/// This structure represents a virtual machine and provides methods for
/// registering guest memory regions and creating the vCPU.
pub struct VmFd {
    /// The underlying KVM VM file descriptor.
    vm: kvm_ioctls::VmFd,
}

impl VmFd {
    /// Wrap a freshly created KVM VM file descriptor and configure the TSS
    /// address KVM needs for its internal real-mode emulation.
    pub fn new(vm: kvm_ioctls::VmFd) -> Result<Self, KvmError> {
        vm.set_tss_address(TSS_ADDRESS as usize)
            .map_err(KvmError::SetTssAddress)?;
        Ok(Self { vm })
    }

    /// Register a guest memory region with KVM.
    ///
    /// This maps a range of guest physical addresses to a region of host
    /// virtual memory. After registration, guest accesses to these physical
    /// addresses transparently access the host memory.
    ///
    /// # Arguments
    ///
    /// * `slot` - Memory slot number (0 for the sole region)
    /// * `guest_addr` - Starting guest physical address (always 0 here)
    /// * `memory_size` - Size of the region in bytes
    /// * `userspace_addr` - Host virtual address of the memory (from mmap)
    ///
    /// # Safety
    ///
    /// The caller must ensure the host memory region remains valid and
    /// unmoved for the lifetime of the VM.
    pub unsafe fn set_user_memory_region(
        &self,
        slot: u32,
        guest_addr: u64,
        memory_size: u64,
        userspace_addr: u64,
    ) -> Result<(), KvmError> {
        let region = kvm_userspace_memory_region {
            slot,
            guest_phys_addr: guest_addr,
            memory_size,
            userspace_addr,
            flags: 0,
        };

        unsafe {
            self.vm
                .set_user_memory_region(region)
                .map_err(KvmError::SetMemoryRegion)
        }
    }

    /// Create the (single) virtual CPU.
    ///
    /// No CPUID entries are configured: the guest in this design never
    /// executes CPUID, so KVM's defaults are sufficient.
    pub fn create_vcpu(&self, id: u64) -> Result<VcpuFd, KvmError> {
        let vcpu = self.vm.create_vcpu(id).map_err(KvmError::CreateVcpu)?;
        log::debug!("[kvm] created vCPU {id}");
        Ok(VcpuFd::new(vcpu))
    }
}
