//! Regression-corpus round-trip (`ct regressions <vm>`, SPEC_FULL.md §4):
//! reads a JSON array of recorded `(rule_name, pre, post)` entries -- the
//! natural reader for the dumps spec.md §6 says the (out-of-scope)
//! command-line driver writes when a rule fails during `test`/`run` -- and
//! replays `pre` through the named VM, diffing the result against `post`.

use std::fs;
use std::path::Path;

use ct_core::{TargetVm, VmState};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct RegressionEntry {
    pub rule_name: String,
    pub pre: VmState,
    pub post: VmState,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct RegressionCorpus {
    pub entries: Vec<RegressionEntry>,
}

pub fn load(path: &Path) -> eyre::Result<RegressionCorpus> {
    let raw = fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("reading {}: {e}", path.display()))?;
    serde_json::from_str(&raw).map_err(|e| eyre::eyre!("parsing {}: {e}", path.display()))
}

pub struct RegressionResult {
    pub rule_name: String,
    pub matched: bool,
    pub detail: Option<String>,
}

/// Replays every entry's `pre`-state through `vm` and compares the result to
/// the recorded `post`-state field-by-field. Pure diffing, no I/O -- `ct-cli`
/// prints the results.
pub fn replay(corpus: &RegressionCorpus, vm: &dyn TargetVm) -> Vec<RegressionResult> {
    corpus
        .entries
        .iter()
        .map(|entry| match vm.step(&entry.pre) {
            Ok(actual) if states_equal(&actual, &entry.post) => {
                RegressionResult { rule_name: entry.rule_name.clone(), matched: true, detail: None }
            }
            Ok(actual) => RegressionResult {
                rule_name: entry.rule_name.clone(),
                matched: false,
                detail: Some(format!(
                    "post-state mismatch: expected pc={} got pc={}",
                    entry.post.pc, actual.pc
                )),
            },
            Err(e) => RegressionResult {
                rule_name: entry.rule_name.clone(),
                matched: false,
                detail: Some(e.to_string()),
            },
        })
        .collect()
}

fn states_equal(a: &VmState, b: &VmState) -> bool {
    a.status == b.status
        && a.pc == b.pc
        && a.gas == b.gas
        && a.gas_refund == b.gas_refund
        && a.stack == b.stack
        && a.memory == b.memory
        && a.read_only == b.read_only
        && a.has_self_destructed == b.has_self_destructed
        && a.logs == b.logs
}
