//! Target description. A single target (`aarch64`) today; kept as its own
//! module so a future ISA could sit alongside it without disturbing the
//! rest of the pipeline, matching the teacher's `isa/` layout.

pub mod aarch64;
