//! KVM (Kernel-based Virtual Machine) wrapper module.
//!
//! This module provides a safe Rust interface to Linux KVM for hardware-assisted
//! virtualization. KVM allows running virtual machines with near-native performance
//! by leveraging CPU virtualization extensions (Intel VT-x or AMD-V).
//!
//! # KVM Architecture
//!
//! KVM operates as a kernel module that turns Linux into a hypervisor. The VMM
//! (Virtual Machine Monitor, i.e., us) communicates with KVM through ioctls on:
//!
//! - `/dev/kvm` - System-level operations (check capabilities, create VMs)
//! - VM file descriptor - VM-level operations (create vCPUs, set memory)
//! - vCPU file descriptor - vCPU-level operations (run, get/set registers)
//!
//! # VM Execution Model
//!
//! The vCPU runs in a loop:
//!
//! 1. VMM calls `vcpu.run_with_io()` - control transfers to the guest
//! 2. Guest executes until a VM exit occurs
//! 3. KVM returns control to the VMM with an exit reason
//! 4. The VMM handles the exit (port I/O or halt)
//! 5. The VMM calls `run_with_io()` again
//!
//! # Example Usage
//!
//! ```ignore
//! let vm = kvm::create_vm()?;
//! unsafe { vm.set_user_memory_region(0, 0, size, host_addr)? };
//! let mut vcpu = vm.create_vcpu(0)?;
//! vcpu.set_regs(&regs)?;
//! vcpu.set_sregs(&sregs)?;
//!
//! loop {
//!     match vcpu.run_with_io(&mut handler)? {
//!         VcpuExit::Io => { /* handled by handler */ }
//!         VcpuExit::Hlt => break,
//!         _ => {}
//!     }
//! }
//! ```

mod vcpu;
mod vm;

pub use vcpu::{IoData, IoHandler, VcpuExit, VcpuFd};
pub use vm::VmFd;

use kvm_ioctls::Kvm;
use thiserror::Error;

/// Errors that can occur during KVM operations.
#[derive(Error, Debug)]
pub enum KvmError {
    /// Failed to open /dev/kvm device.
    ///
    /// This usually means:
    /// - KVM is not available (not running on Linux, or KVM module not loaded)
    /// - Insufficient permissions (user not in kvm group)
    /// - Running in a VM without nested virtualization enabled
    #[error("Failed to open /dev/kvm: {0}")]
    OpenKvm(#[source] kvm_ioctls::Error),

    /// Failed to create a new VM.
    #[error("Failed to create VM: {0}")]
    CreateVm(#[source] kvm_ioctls::Error),

    /// Failed to create a vCPU.
    #[error("Failed to create vCPU: {0}")]
    CreateVcpu(#[source] kvm_ioctls::Error),

    /// Failed to register guest memory with KVM.
    #[error("Failed to set user memory region: {0}")]
    SetMemoryRegion(#[source] kvm_ioctls::Error),

    /// Failed to set CPU registers.
    #[error("Failed to set registers: {0}")]
    SetRegisters(#[source] kvm_ioctls::Error),

    /// Failed to get CPU registers.
    #[error("Failed to get registers: {0}")]
    GetRegisters(#[source] kvm_ioctls::Error),

    /// Failed to run vCPU.
    #[error("Failed to run vCPU: {0}")]
    Run(#[source] kvm_ioctls::Error),

    /// Failed to set the guest TSS address.
    #[error("Failed to set TSS address: {0}")]
    SetTssAddress(#[source] kvm_ioctls::Error),
}

/// Open the KVM device and create a new virtual machine.
///
/// This function opens `/dev/kvm`, creates a VM, and sets the TSS address
/// KVM requires. Unlike a full Linux guest VMM, no in-kernel IRQ chip or PIT
/// is configured here - see [`vm::VmFd`] for why.
///
/// # Errors
///
/// Returns an error if KVM is not available or accessible, or if VM or TSS
/// address creation fails.
pub fn create_vm() -> Result<VmFd, KvmError> {
    let kvm = Kvm::new().map_err(KvmError::OpenKvm)?;
    let vm = kvm.create_vm().map_err(KvmError::CreateVm)?;
    VmFd::new(vm)
}
