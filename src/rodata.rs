//! Read-only data pool (spec §4.6, §3's "Rodata entry"): interns the
//! string/float globals an [`crate::il::Module`] carries, deduplicating by
//! exact content so `"Hello"` referenced by two different globals still
//! produces one label.
//!
//! Shaped after the teacher's `ir::constant::ConstantPool` (insert-or-return-
//! existing-handle keyed on the byte content), generalized to also dedupe
//! float bit patterns and to track, per original IL global name, which
//! canonical label it was folded into — lowering's `GlobalAddr` handler
//! names a global by its own name, not the pool's dedup label, so that
//! mapping is what `crate::lower`'s rename pass consults afterward.

use crate::il::{Global, Module};
use rustc_hash::FxHashMap;

/// One deduplicated entry: a stable label and its content.
#[derive(Clone, Debug)]
pub enum RodataEntry {
    /// A NUL-terminated byte string (the NUL is already present in `bytes`,
    /// per spec §3's "including the terminating NUL").
    Bytes { label: String, bytes: Vec<u8> },
    F64 { label: String, bits: u64 },
    F32 { label: String, bits: u32 },
}

impl RodataEntry {
    pub fn label(&self) -> &str {
        match self {
            RodataEntry::Bytes { label, .. }
            | RodataEntry::F64 { label, .. }
            | RodataEntry::F32 { label, .. } => label,
        }
    }
}

/// The module-wide constant pool. Built once per module, ahead of lowering;
/// `crate::lib::compile_module` rewrites every `AdrPage`/`AddPageOff` symbol
/// a lowered function carries through [`RodataPool::rewrite`] immediately
/// after lowering that function.
#[derive(Default)]
pub struct RodataPool {
    /// Insertion order is preserved (spec §6: "string literals first by
    /// insertion order, then FP constants"): strings and floats are tracked
    /// in two separate ordered lists rather than one interleaved one, since
    /// the emitter wants them partitioned by kind regardless of the order
    /// globals appeared in the source module.
    strings: Vec<RodataEntry>,
    floats: Vec<RodataEntry>,
    by_bytes: FxHashMap<Vec<u8>, usize>,
    by_f64: FxHashMap<u64, usize>,
    by_f32: FxHashMap<u32, usize>,
    /// Original IL global name → canonical dedup label.
    rewrites: FxHashMap<String, String>,
}

impl RodataPool {
    pub fn new() -> Self {
        RodataPool::default()
    }

    /// Interns every global in `module`, in order. Globals sharing identical
    /// content collapse onto the first-inserted entry's label.
    pub fn build(module: &Module) -> RodataPool {
        let mut pool = RodataPool::new();
        for global in &module.globals {
            match global {
                Global::Bytes { name, bytes } => {
                    let label = pool.intern_bytes(bytes.clone());
                    pool.rewrites.insert(name.clone(), label);
                }
                Global::F64 { name, bits } => {
                    let label = pool.intern_f64(*bits);
                    pool.rewrites.insert(name.clone(), label);
                }
                Global::F32 { name, bits } => {
                    let label = pool.intern_f32(*bits);
                    pool.rewrites.insert(name.clone(), label);
                }
            }
        }
        pool
    }

    fn intern_bytes(&mut self, bytes: Vec<u8>) -> String {
        if let Some(&idx) = self.by_bytes.get(&bytes) {
            return self.strings[idx].label().to_string();
        }
        let idx = self.strings.len();
        let label = format!(".Lstr{idx}");
        self.by_bytes.insert(bytes.clone(), idx);
        self.strings.push(RodataEntry::Bytes { label: label.clone(), bytes });
        label
    }

    /// Interns a float bit pattern directly, bypassing the per-global
    /// `rewrites` table: used by lowering to fold a non-`fmov`-encodable
    /// float immediate discovered mid-function into the same pool a
    /// module-level `f64`/`f32` global would land in.
    pub(crate) fn intern_f64(&mut self, bits: u64) -> String {
        if let Some(&idx) = self.by_f64.get(&bits) {
            return self.floats[idx].label().to_string();
        }
        let idx = self.floats.len();
        let label = format!(".Lf64_{idx}");
        self.by_f64.insert(bits, idx);
        self.floats.push(RodataEntry::F64 { label: label.clone(), bits });
        label
    }

    pub(crate) fn intern_f32(&mut self, bits: u32) -> String {
        if let Some(&idx) = self.by_f32.get(&bits) {
            return self.floats[idx].label().to_string();
        }
        let idx = self.floats.len();
        let label = format!(".Lf32_{idx}");
        self.by_f32.insert(bits, idx);
        self.floats.push(RodataEntry::F32 { label: label.clone(), bits });
        label
    }

    /// The canonical label an original IL global name was folded into, if
    /// it was ever interned.
    pub fn rewrite(&self, original_name: &str) -> Option<&str> {
        self.rewrites.get(original_name).map(String::as_str)
    }

    /// String entries, insertion order (spec §6's "string literals first").
    pub fn strings(&self) -> &[RodataEntry] {
        &self.strings
    }

    /// Float entries, insertion order, emitted after every string entry.
    pub fn floats(&self) -> &[RodataEntry] {
        &self.floats
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty() && self.floats.is_empty()
    }

    /// Rewrites every `AdrPage`/`AddPageOff` in `mfunc` whose `symbol` names
    /// an original IL global to this pool's canonical dedup label. Lowering
    /// stamps the IL global's own name on these instructions (spec §4.1);
    /// this is the rename pass `crate::lib::compile_module` runs directly
    /// afterward, the only consumer of [`RodataPool::rewrite`].
    pub fn rewrite_function(&self, mfunc: &mut crate::mir::MFunction) {
        use crate::mir::Inst;
        let keys: Vec<_> = mfunc.insts.keys().collect();
        for mi in keys {
            match &mut mfunc.insts[mi] {
                Inst::AdrPage { symbol, .. } | Inst::AddPageOff { symbol, .. } => {
                    if let Some(label) = self.rewrite(symbol) {
                        *symbol = label.to_string();
                    }
                }
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::il::Global;

    #[test]
    fn dedups_identical_strings_distinct_floats() {
        let module = Module {
            functions: Vec::new(),
            globals: vec![
                Global::Bytes { name: "g0".into(), bytes: b"Hello\0".to_vec() },
                Global::Bytes { name: "g1".into(), bytes: b"Hello\0".to_vec() },
                Global::Bytes { name: "g2".into(), bytes: b"World\0".to_vec() },
            ],
        };
        let pool = RodataPool::build(&module);
        assert_eq!(pool.strings().len(), 2);
        assert_eq!(pool.rewrite("g0"), pool.rewrite("g1"));
        assert_ne!(pool.rewrite("g0"), pool.rewrite("g2"));
    }

    #[test]
    fn floats_keyed_by_exact_bit_pattern() {
        let module = Module {
            functions: Vec::new(),
            globals: vec![
                Global::F64 { name: "a".into(), bits: 0.0_f64.to_bits() },
                Global::F64 { name: "b".into(), bits: (-0.0_f64).to_bits() },
            ],
        };
        let pool = RodataPool::build(&module);
        assert_eq!(pool.floats().len(), 2, "positive and negative zero have distinct bit patterns");
        assert_ne!(pool.rewrite("a"), pool.rewrite("b"));
    }
}
