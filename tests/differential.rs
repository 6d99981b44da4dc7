//! Differential testing against a reference VM (spec §8's primary property:
//! `vm_run(module) ≡ native_run(assemble_link(emit(module)))`) is outside
//! what this crate alone can exercise — it needs a fuzzer generating IL
//! modules, an interpreter to run them as a reference, and a system
//! assembler/linker plus a matching-architecture host (or emulator) to run
//! the compiled output. None of those are dependencies of this crate.
//!
//! This scaffold records the property and the harness shape a downstream
//! integration suite would fill in, so the invariant isn't silently
//! dropped from the test tree the way an unwritten test would be.

use viper_codegen_aarch64::il::Module;
use viper_codegen_aarch64::settings::Flags;

/// Run `module` under a reference interpreter and return its exit code.
/// Left unimplemented here: building one means re-implementing the IL's
/// operational semantics a second time purely for test oracle purposes.
fn vm_run(_module: &Module) -> i32 {
    unimplemented!("reference IL interpreter lives outside this crate")
}

/// Assemble, link, and execute the output of `compile_module`, returning the
/// process exit code masked to 8 bits, or `None` if it trapped.
fn native_run(_module: &Module, _flags: &Flags) -> Option<i32> {
    unimplemented!("needs `as`/`ld` and a matching-architecture runner")
}

#[test]
#[ignore = "needs an IL fuzzer, a reference interpreter, and a system assembler/linker"]
fn native_execution_matches_reference_interpreter() {
    let module = Module::default();
    let flags = Flags::default();
    assert_eq!(native_run(&module, &flags), Some(vm_run(&module)));
}
