//! minivmm - a minimal single-vCPU protected-mode hypervisor.
//!
//! Boots a flat, freestanding 32-bit guest binary at guest-physical address
//! 0 and services it through a handful of port-mapped devices: a character
//! console, a line-buffered keyboard, and a polled millisecond timer. There
//! is no interrupt injection, no paging, and no BIOS - the guest talks to
//! the host purely through the port map in [`devices`].
//!
//! This VMM requires Linux with KVM support. It will not run on other
//! platforms.

#[cfg(target_os = "linux")]
mod clock;
#[cfg(target_os = "linux")]
mod devices;
#[cfg(target_os = "linux")]
mod guest;
#[cfg(target_os = "linux")]
mod kvm;

mod cli;

use cli::Args;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args = Args::parse_or_exit();

    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(e) = run(args) {
        log::error!("{e}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

#[cfg(target_os = "linux")]
fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    use devices::Devices;
    use kvm::VcpuExit;

    log::info!("minivmm starting");
    log::info!("guest binary: {}", args.binary.display());
    log::info!("guest memory: {} MiB", args.memory_mb);

    let vm = kvm::create_vm()?;
    // `_memory` must outlive the vCPU: KVM reads/writes guest-physical
    // addresses through this mapping for as long as the VM runs.
    let _memory = guest::setup_memory(&vm, &args.binary, args.mem_size())?;

    let mut vcpu = vm.create_vcpu(0)?;
    guest::setup_vcpu_regs(&vcpu)?;

    let mut handler = Devices::new(clock::Clock::new());

    log::debug!("entering vCPU run loop");
    loop {
        let exit = vcpu.run_with_io(&mut handler)?;

        match exit {
            VcpuExit::Io => {
                // Handled inline by `handler`.
            }
            VcpuExit::Hlt => {
                log::info!("guest halted, exiting");
                // The keyboard reader thread is detached and blocked in a
                // stdin read with no portable way to cancel it; terminate
                // the whole process here rather than trying to join it.
                std::process::exit(0);
            }
            VcpuExit::Shutdown => {
                return Err("guest requested shutdown (triple fault?)".into());
            }
            VcpuExit::InternalError => {
                return Err("KVM internal error".into());
            }
            VcpuExit::FailEntry(reason) => {
                return Err(format!("failed to enter guest: reason={reason:#x}").into());
            }
            VcpuExit::Unknown(reason) => {
                return Err(format!("unexpected vCPU exit: {reason}").into());
            }
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn run(_args: Args) -> Result<(), Box<dyn std::error::Error>> {
    Err("minivmm requires Linux with KVM support. This platform is not supported.".into())
}
