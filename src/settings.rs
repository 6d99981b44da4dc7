//! Target and pipeline configuration (spec §4.7).
//!
//! Grounded in the shape of the teacher's generated `settings::Flags`: a
//! plain, `Copy`-able record of booleans/enums built once per compilation
//! and threaded by `&` through every pass, rather than each pass reading
//! its own ad hoc environment. This crate's settings are authored by hand
//! (the teacher's are meta-generated from a `.toml` schema by its build
//! script — out of scope for a backend this size), but the record shape
//! and the `Builder`-free `Flags::default()` + field-update idiom carry
//! over directly.

/// The target OS, driving symbol mangling and section names (spec §4.6).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Os {
    Darwin,
    Linux,
}

impl Os {
    /// The host OS at compile time, used when a library caller does not
    /// specify one explicitly.
    pub fn host() -> Os {
        if cfg!(target_os = "macos") {
            Os::Darwin
        } else {
            Os::Linux
        }
    }

    /// Every external and function symbol gets this prefix (spec §4.6:
    /// leading underscore on Darwin, none on Linux).
    pub fn symbol_prefix(self) -> &'static str {
        match self {
            Os::Darwin => "_",
            Os::Linux => "",
        }
    }

    /// The assembler section directive the constant pool is emitted under.
    pub fn rodata_section(self) -> &'static str {
        match self {
            Os::Darwin => ".section __TEXT,__const",
            Os::Linux => ".section .rodata",
        }
    }
}

/// Per-pattern peephole toggles (spec §4.7: "individually disable-able for
/// differential debugging"). All on by default.
#[derive(Copy, Clone, Debug)]
pub struct PeepholeFlags {
    pub fold_imm: bool,
    pub cbz_fusion: bool,
    pub madd_msub_fusion: bool,
    pub ldp_stp_fusion: bool,
    pub dead_def_elim: bool,
    pub branch_inversion: bool,
}

impl Default for PeepholeFlags {
    fn default() -> Self {
        PeepholeFlags {
            fold_imm: true,
            cbz_fusion: true,
            madd_msub_fusion: true,
            ldp_stp_fusion: true,
            dead_def_elim: true,
            branch_inversion: true,
        }
    }
}

impl PeepholeFlags {
    /// All patterns off, for differential debugging against unoptimized MIR.
    pub fn none() -> Self {
        PeepholeFlags {
            fold_imm: false,
            cbz_fusion: false,
            madd_msub_fusion: false,
            ldp_stp_fusion: false,
            dead_def_elim: false,
            branch_inversion: false,
        }
    }
}

/// `--dump-mir-*` hooks (spec §6): which pipeline checkpoints write the
/// current MIR's `Display` output to stderr.
#[derive(Copy, Clone, Debug, Default)]
pub struct DumpFlags {
    pub before_ra: bool,
    pub after_ra: bool,
    /// Dumps before every pass, including lowering and peephole, not just
    /// around RA.
    pub full: bool,
}

/// Diagnostic verbosity, independent of the `log` crate's own level filter:
/// controls only whether non-fatal `Diagnostics` warnings are also echoed
/// through `log::warn!` as they are recorded.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum Verbosity {
    #[default]
    Normal,
    Quiet,
}

/// The full configuration record threaded through `crate::compile_module`.
#[derive(Copy, Clone, Debug)]
pub struct Flags {
    pub os: Os,
    pub peephole: PeepholeFlags,
    pub dump: DumpFlags,
    pub verbosity: Verbosity,
}

impl Default for Flags {
    fn default() -> Self {
        Flags {
            os: Os::host(),
            peephole: PeepholeFlags::default(),
            dump: DumpFlags::default(),
            verbosity: Verbosity::default(),
        }
    }
}

impl Flags {
    pub fn new(os: Os) -> Self {
        Flags { os, ..Flags::default() }
    }
}
