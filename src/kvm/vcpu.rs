//! Virtual CPU management and execution.
//!
//! This module provides the vCPU abstraction for running guest code. A vCPU
//! represents a virtual processor that executes guest instructions using
//! hardware-assisted virtualization.
//!
//! # vCPU Execution Model
//!
//! The vCPU operates in a run loop:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                      VMM (User Space)                   │
//! │  ┌─────────┐         ┌─────────────┐                   │
//! │  │  Loop   │◄────────│ Handle Exit │                   │
//! │  │  Start  │         │  (I/O, etc) │                   │
//! │  └────┬────┘         └──────▲──────┘                   │
//! │       │                     │                          │
//! │       │ vcpu.run()          │ VM Exit                  │
//! │       ▼                     │                          │
//! ├───────┼─────────────────────┼──────────────────────────┤
//! │       │      KVM (Kernel)   │                          │
//! │       │                     │                          │
//! │       ▼                     │                          │
//! │  ┌─────────┐          ┌─────┴─────┐                    │
//! │  │  VMXON  │─────────►│   VMEXIT  │                    │
//! │  │ /VMRUN  │  Guest   │           │                    │
//! │  └─────────┘  Runs    └───────────┘                    │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! # VM Exits
//!
//! This VMM only ever expects three exit reasons from a well-behaved guest:
//! port I/O (the guest's only way to talk to the outside world), HLT (normal
//! shutdown), and MMIO (never triggered by a correct guest, since there are
//! no MMIO devices, but tolerated and ignored rather than treated as fatal).
//! Anything else is a fatal condition - see [`VcpuExit::Unknown`].
//!
//! # I/O Handling
//!
//! When the guest accesses I/O ports, KVM exits to the VMM with the port
//! number, direction (in/out), and data. The VMM must emulate the device and,
//! for reads, provide the response data.
//!
//! The [`IoHandler`] trait provides a clean interface for device emulation.
//! It uses a fixed-size buffer (max 4 bytes) to avoid heap allocation.

use super::KvmError;
use kvm_bindings::{kvm_regs, kvm_sregs};
use kvm_ioctls::VcpuExit as KvmVcpuExit;

/// Maximum size for I/O operations (x86 supports 1, 2, or 4 byte I/O).
pub const MAX_IO_SIZE: usize = 4;

/// Fixed-size I/O data buffer to avoid heap allocation.
///
/// x86 IN/OUT instructions support 1, 2, or 4 byte operations. This type
/// holds the data without allocating.
#[derive(Debug, Clone, Copy)]
pub struct IoData {
    /// The data bytes (only first `len` bytes are valid).
    data: [u8; MAX_IO_SIZE],
    /// Number of valid bytes (1, 2, or 4).
    len: u8,
}

impl IoData {
    /// Create a new IoData with the specified length.
    #[inline]
    pub fn new(len: usize) -> Self {
        debug_assert!(len <= MAX_IO_SIZE);
        Self {
            data: [0; MAX_IO_SIZE],
            len: len as u8,
        }
    }

    /// Create IoData from a slice.
    #[inline]
    pub fn from_slice(slice: &[u8]) -> Self {
        let len = slice.len().min(MAX_IO_SIZE);
        let mut data = [0u8; MAX_IO_SIZE];
        data[..len].copy_from_slice(&slice[..len]);
        Self {
            data,
            len: len as u8,
        }
    }

    /// Get the data as a slice.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }

    /// Get the length.
    #[inline]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Set a byte at index.
    #[inline]
    pub fn set(&mut self, index: usize, value: u8) {
        if index < self.len as usize {
            self.data[index] = value;
        }
    }
}

impl Default for IoData {
    fn default() -> Self {
        Self::new(0)
    }
}

/// Wrapper around the KVM vCPU file descriptor.
///
/// Provides methods to get/set CPU registers and to run the vCPU, handling
/// exits by delegating port I/O to an [`IoHandler`].
pub struct VcpuFd {
    /// The underlying KVM vCPU file descriptor.
    vcpu: kvm_ioctls::VcpuFd,
}

/// Exit reasons from vCPU execution.
///
/// When `run_with_io` returns, it indicates why the guest stopped executing.
/// The VMM must handle the exit appropriately and typically call it again to
/// continue execution.
#[derive(Debug)]
pub enum VcpuExit {
    /// Port I/O or (ignored) MMIO was handled inline; keep running.
    Io,

    /// Guest executed HLT. Normal, voluntary shutdown.
    Hlt,

    /// Guest requested shutdown (triple fault or explicit shutdown).
    Shutdown,

    /// KVM internal error occurred.
    InternalError,

    /// Failed to enter guest mode. Contains the hardware-specific reason code.
    FailEntry(u64),

    /// Unknown or unhandled exit reason. Contains a static description for
    /// diagnostics; fatal by policy (see the crate's error handling docs).
    Unknown(&'static str),
}

/// Handles guest port I/O (IN/OUT instructions).
///
/// When the guest executes IN or OUT, KVM exits to the VMM. The handler
/// processes these operations by routing to the appropriate device.
pub trait IoHandler {
    /// Handle an I/O port read (IN instruction).
    ///
    /// The guest is trying to read from `port`. Fill `data` with the
    /// response (`data.len()` bytes, 1 or 2 for this device model).
    fn io_read(&mut self, port: u16, data: &mut IoData);

    /// Handle an I/O port write (OUT instruction).
    ///
    /// The guest is writing `data` to `port`.
    fn io_write(&mut self, port: u16, data: &IoData);
}

impl VcpuFd {
    /// Create a new VcpuFd wrapper.
    pub fn new(vcpu: kvm_ioctls::VcpuFd) -> Self {
        Self { vcpu }
    }

    /// Get the current general-purpose registers.
    pub fn get_regs(&self) -> Result<kvm_regs, KvmError> {
        self.vcpu.get_regs().map_err(KvmError::GetRegisters)
    }

    /// Set the general-purpose registers.
    pub fn set_regs(&self, regs: &kvm_regs) -> Result<(), KvmError> {
        self.vcpu.set_regs(regs).map_err(KvmError::SetRegisters)
    }

    /// Get the special registers.
    pub fn get_sregs(&self) -> Result<kvm_sregs, KvmError> {
        self.vcpu.get_sregs().map_err(KvmError::GetRegisters)
    }

    /// Set the special registers.
    pub fn set_sregs(&self, sregs: &kvm_sregs) -> Result<(), KvmError> {
        self.vcpu.set_sregs(sregs).map_err(KvmError::SetRegisters)
    }

    /// Run the vCPU until it exits, handling port I/O with the provided
    /// handler inline.
    ///
    /// This is the main execution loop entry point. It:
    /// 1. Enters guest mode (VMRESUME/VMRUN)
    /// 2. Executes guest code until a VM exit
    /// 3. Routes the exit and returns a [`VcpuExit`] describing what happened
    ///
    /// MMIO accesses are logged and ignored: there are no MMIO devices in
    /// this design, but tolerating a stray access (rather than treating it
    /// as fatal) keeps a misbehaving guest from taking down the host.
    pub fn run_with_io<H: IoHandler>(&mut self, handler: &mut H) -> Result<VcpuExit, KvmError> {
        match self.vcpu.run().map_err(KvmError::Run)? {
            KvmVcpuExit::IoIn(port, data) => {
                let mut io_data = IoData::new(data.len());
                handler.io_read(port, &mut io_data);
                let copy_len = io_data.len().min(data.len());
                data[..copy_len].copy_from_slice(&io_data.as_slice()[..copy_len]);
                Ok(VcpuExit::Io)
            }

            KvmVcpuExit::IoOut(port, data) => {
                let io_data = IoData::from_slice(data);
                handler.io_write(port, &io_data);
                Ok(VcpuExit::Io)
            }

            KvmVcpuExit::MmioRead(addr, _) | KvmVcpuExit::MmioWrite(addr, _) => {
                log::debug!("[kvm] ignoring MMIO access at {:#x}", addr);
                Ok(VcpuExit::Io)
            }

            KvmVcpuExit::Hlt => Ok(VcpuExit::Hlt),
            KvmVcpuExit::Shutdown => Ok(VcpuExit::Shutdown),
            KvmVcpuExit::InternalError => Ok(VcpuExit::InternalError),
            KvmVcpuExit::FailEntry(reason, _) => Ok(VcpuExit::FailEntry(reason)),

            KvmVcpuExit::Hypercall(_) => Ok(VcpuExit::Unknown("Hypercall")),
            KvmVcpuExit::Debug(_) => Ok(VcpuExit::Unknown("Debug")),
            KvmVcpuExit::Exception => Ok(VcpuExit::Unknown("Exception")),
            KvmVcpuExit::IrqWindowOpen => Ok(VcpuExit::Unknown("IrqWindowOpen")),
            KvmVcpuExit::SystemEvent(_, _) => Ok(VcpuExit::Unknown("SystemEvent")),
            _ => Ok(VcpuExit::Unknown("Other")),
        }
    }
}
