//! Driver CLI for the AArch64 backend (spec §6).
//!
//! Subcommand shape and exit-code convention follow the teacher's own
//! `clif-util`: a small `clap`-derived struct, one subcommand per target,
//! process exit code doubling as pass/fail so the binary composes in a
//! shell pipeline or test harness without parsing stdout.

use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use viper_codegen_aarch64::il::text::parse_module;
use viper_codegen_aarch64::settings::{Flags, Os};

#[derive(Parser)]
#[command(name = "codegen", about = "AArch64 native code generator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile an IL text file to AArch64 assembly.
    Arm64 {
        input: PathBuf,

        #[arg(short = 'S', long = "output")]
        output: Option<PathBuf>,

        #[arg(long, value_enum)]
        os: Option<CliOs>,

        #[arg(long)]
        dump_mir_before_ra: bool,

        #[arg(long)]
        dump_mir_after_ra: bool,

        #[arg(long)]
        dump_mir_full: bool,

        #[arg(long)]
        quiet: bool,
    },
}

#[derive(Copy, Clone, clap::ValueEnum)]
enum CliOs {
    Darwin,
    Linux,
}

impl From<CliOs> for Os {
    fn from(os: CliOs) -> Os {
        match os {
            CliOs::Darwin => Os::Darwin,
            CliOs::Linux => Os::Linux,
        }
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let Command::Arm64 { input, output, os, dump_mir_before_ra, dump_mir_after_ra, dump_mir_full, quiet } =
        cli.command;

    let src = match fs::read_to_string(&input) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("codegen: cannot read {}: {e}", input.display());
            return ExitCode::FAILURE;
        }
    };

    let module = match parse_module(&src) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("codegen: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut flags = Flags::new(os.map(Os::from).unwrap_or_else(Os::host));
    flags.dump.before_ra = dump_mir_before_ra;
    flags.dump.after_ra = dump_mir_after_ra;
    flags.dump.full = dump_mir_full;
    if quiet {
        flags.verbosity = viper_codegen_aarch64::settings::Verbosity::Quiet;
    }

    let result = match viper_codegen_aarch64::compile_module(&module, &flags) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("codegen: {e}");
            return ExitCode::FAILURE;
        }
    };

    for warning in &result.diagnostics.warnings {
        eprintln!("codegen: {warning}");
    }

    if !result.manifest.symbols.is_empty() {
        log::debug!("codegen: runtime manifest: {:?}", result.manifest.symbols);
    }

    match output {
        Some(path) => {
            if let Err(e) = fs::write(&path, result.asm) {
                eprintln!("codegen: cannot write {}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        }
        None => print!("{}", result.asm),
    }

    ExitCode::SUCCESS
}
