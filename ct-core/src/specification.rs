//! The complete rule list plus the opcode-indexed dispatcher (spec.md §3,
//! §4.6). Built once from [`crate::rules::build_rules`] and thereafter
//! treated as a process-lifetime immutable value (spec.md §9 REDESIGN
//! FLAGS, last bullet: "Global mutable Spec" becomes "initialize once,
//! read thereafter", not a literal global — callers hold their own
//! [`Specification`] or reach for [`spec()`] if they want the shared one).

use lazy_static::lazy_static;
use rustc_hash::FxHashMap;

use crate::opcode::Opcode;
use crate::rules::{build_rules, Rule};
use crate::state::{Status, VmState};

/// The opcode-at-pc -> candidate-rule-indices index (spec.md §4.6).
/// Classification reads each rule's first-class `opcode_tag`, never the
/// condition's string form (spec.md §9 REDESIGN FLAGS item 1).
struct OpcodeIndex {
    buckets: FxHashMap<Opcode, Vec<usize>>,
    no_op: Vec<usize>,
}

impl OpcodeIndex {
    fn build(rules: &[Rule]) -> Self {
        let mut buckets: FxHashMap<Opcode, Vec<usize>> = FxHashMap::default();
        let mut no_op = Vec::new();
        for (i, rule) in rules.iter().enumerate() {
            match rule.opcode_tag {
                Some(op) => buckets.entry(op).or_default().push(i),
                None => no_op.push(i),
            }
        }
        Self { buckets, no_op }
    }

    /// Candidate rule indices for `state`: the no-op bucket alone when the
    /// state is not `Running` or uses the unknown-next revision, otherwise
    /// the no-op bucket plus whatever bucket the opcode at `pc` selects
    /// (falling back to no-op alone when `pc` is out of bounds or in data,
    /// per spec.md §4.6).
    fn candidates(&self, state: &VmState) -> Vec<usize> {
        if state.status != Status::Running || !state.revision.is_known() {
            return self.no_op.clone();
        }
        match state.current_opcode().and_then(Opcode::from_byte) {
            Some(op) => {
                let mut out = self.no_op.clone();
                if let Some(bucket) = self.buckets.get(&op) {
                    out.extend(bucket.iter().copied());
                }
                out
            }
            None => self.no_op.clone(),
        }
    }
}

/// The complete finite list of rules plus the secondary opcode index
/// (spec.md §3).
pub struct Specification {
    rules: Vec<Rule>,
    index: OpcodeIndex,
}

impl Specification {
    pub fn new() -> Self {
        let rules = build_rules();
        let index = OpcodeIndex::build(&rules);
        Self { rules, index }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn rule_by_name(&self, name: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.name == name)
    }

    /// Rules whose name matches `pattern` (the CLI's `--filter` flag,
    /// spec.md §6). Matching itself lives here rather than in `ct-cli` so
    /// `generator-info`/`stats` can reuse it without re-parsing a regex.
    pub fn rules_matching(&self, pattern: &regex::Regex) -> Vec<&Rule> {
        self.rules.iter().filter(|r| pattern.is_match(&r.name)).collect()
    }

    /// The opcode-indexed lookup (spec.md §4.6): `O(rules-for-opcode)`.
    pub fn applicable_rules(&self, state: &VmState) -> Vec<&Rule> {
        self.index.candidates(state).into_iter().map(|i| &self.rules[i]).collect()
    }

    /// A linear scan over every rule, evaluating each condition directly.
    /// Used only to prove dispatch equivalence (spec.md §8): the indexed
    /// and linear paths must always agree on which rules *match* (both
    /// return candidates; callers still need to call `condition.check` to
    /// get the final matching subset from either).
    pub fn applicable_rules_linear(&self) -> Vec<&Rule> {
        self.rules.iter().collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for Specification {
    fn default() -> Self {
        Self::new()
    }
}

lazy_static! {
    /// The shared, process-lifetime specification. `ct-cli` uses this
    /// directly; tests that want isolation can build their own
    /// `Specification::new()` instead.
    pub static ref SPEC: Specification = Specification::new();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Code;

    #[test]
    fn dispatch_equivalence_for_a_running_add_state() {
        let spec = Specification::new();
        let mut state = VmState::new(Code::new(vec![Opcode::Add.as_byte()]));
        state.gas = 100;
        state.push(crate::value::U256::from(1));
        state.push(crate::value::U256::from(2));

        let indexed: Vec<&str> = spec
            .applicable_rules(&state)
            .into_iter()
            .filter(|r| r.condition.check(&state).unwrap_or(false))
            .map(|r| r.name.as_str())
            .collect();
        let linear: Vec<&str> = spec
            .applicable_rules_linear()
            .into_iter()
            .filter(|r| r.condition.check(&state).unwrap_or(false))
            .map(|r| r.name.as_str())
            .collect();

        let mut indexed_sorted = indexed.clone();
        let mut linear_sorted = linear.clone();
        indexed_sorted.sort_unstable();
        linear_sorted.sort_unstable();
        assert_eq!(indexed_sorted, linear_sorted);
        assert!(indexed.contains(&"add_regular"));
    }

    #[test]
    fn unknown_revision_state_only_reaches_the_no_op_bucket() {
        let spec = Specification::new();
        let mut state = VmState::new(Code::new(vec![Opcode::Add.as_byte()]));
        state.revision = crate::state::Revision::R99UnknownNext;
        let candidates = spec.applicable_rules(&state);
        assert!(candidates.iter().all(|r| r.opcode_tag.is_none()));
        assert!(candidates.iter().any(|r| r.name == "unknown_revision_fails"));
    }

    #[test]
    fn every_known_opcode_has_at_least_one_tagged_rule() {
        let spec = Specification::new();
        for &op in Opcode::ALL {
            assert!(
                spec.rules.iter().any(|r| r.opcode_tag == Some(op)),
                "opcode {op:?} has no rule at all"
            );
        }
    }
}
