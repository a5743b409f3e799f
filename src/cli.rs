//! Command-line interface.
//!
//! Preserves the original two-positional-argument ABI (`<flag> <binary>`,
//! conventionally invoked as `-b <binary>`, where the flag's own content is
//! never inspected) and adds memory sizing and verbosity on top.

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "minivmm", about = "A minimal single-vCPU protected-mode hypervisor")]
pub struct Args {
    /// Legacy flag token (conventionally `-b`); its content is never inspected.
    #[arg(allow_hyphen_values = true)]
    pub flag: String,

    /// Path to the flat guest binary image, loaded at guest-physical 0.
    pub binary: PathBuf,

    /// Guest memory size in megabytes.
    #[arg(short = 'm', long = "memory-mb", default_value_t = 2)]
    pub memory_mb: u64,

    /// Enable verbose (debug-level) logging.
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Bytes of guest memory requested.
    pub fn mem_size(&self) -> u64 {
        self.memory_mb * 1024 * 1024
    }

    /// Parse `std::env::args_os()`, printing a usage line to stderr and
    /// exiting with code 1 on any parse failure - matching the original
    /// program's `argc != 3` check rather than clap's default exit code.
    pub fn parse_or_exit() -> Self {
        match Args::try_parse() {
            Ok(args) => args,
            Err(_) => {
                eprintln!("Usage: minivmm -b <BINARY FILE> [-m MEMORY_MB] [-v]");
                std::process::exit(1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_the_conventional_dash_b_flag() {
        let args = Args::try_parse_from(["minivmm", "-b", "guest.bin"]).unwrap();
        assert_eq!(args.flag, "-b");
        assert_eq!(args.binary, PathBuf::from("guest.bin"));
    }

    #[test]
    fn flag_content_is_never_inspected() {
        let args = Args::try_parse_from(["minivmm", "--anything", "guest.bin"]).unwrap();
        assert_eq!(args.flag, "--anything");
    }

    #[test]
    fn extra_flags_layer_on_top_of_the_positional_contract() {
        let args = Args::try_parse_from([
            "minivmm", "-b", "guest.bin", "-m", "64", "-v",
        ])
        .unwrap();
        assert_eq!(args.memory_mb, 64);
        assert!(args.verbose);
    }

    #[test]
    fn missing_binary_argument_fails_to_parse() {
        assert!(Args::try_parse_from(["minivmm", "-b"]).is_err());
    }
}
