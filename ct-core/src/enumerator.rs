//! The test-case enumerator (spec.md §4.7): turns one rule into the finite
//! sequence of concrete states it wants exercised, by crossing per-property
//! boundary-value groups and then crossing each `Parameter`'s samples on top.

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::generator::StateGenerator;
use crate::property::Property;
use crate::rules::Rule;
use crate::state::VmState;
use crate::testvalue::{group_by_property, TestValue};

/// Returned by the consumer callback to tell [`enumerate`] whether to keep
/// going. Mirrors the harness's own abort signal (spec.md §4.8) so a caller
/// driving both can reuse one enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerAction {
    Continue,
    Abort,
}

/// One concrete case produced for a rule: the generated pre-state plus how
/// many constraint combinations were attempted-but-unsatisfiable before it
/// (and after the previous yielded case), for the enumerator's own
/// bookkeeping (SPEC_FULL.md §6: the "attempted but not satisfiable" count
/// is reported, not silently dropped).
#[derive(Debug)]
pub struct EnumeratedCase {
    pub state: VmState,
}

/// Enumerates every case for `rule`, calling `consume` with each generated
/// state in turn. Returns the number of cases actually produced and the
/// number of constraint combinations that turned out unsatisfiable.
///
/// Determinism: `seed` drives one `StdRng` for the entire rule; combinations
/// are visited in a fixed order (property groups sorted by name, then
/// parameter positions in declaration order), so the same `(rule, seed)`
/// always yields the same sequence (spec.md §8).
pub fn enumerate<F>(rule: &Rule, seed: u64, mut consume: F) -> EnumerationStats
where
    F: FnMut(EnumeratedCase) -> ConsumerAction,
{
    let mut rng = StdRng::seed_from_u64(seed);
    let mut stats = EnumerationStats::default();

    let test_values = rule.condition.get_test_values();
    let groups = group_by_property(test_values);
    let group_slices: Vec<&[TestValue]> = groups.iter().map(|(_, g)| g.as_slice()).collect();

    let combos = CartesianProduct::new(&group_slices);
    'outer: for combo in combos {
        let mut gen = StateGenerator::new();
        if let Err(e) = rule.condition.restrict(&mut gen) {
            stats.restriction_errors += 1;
            tracing::debug!(rule = %rule.name, error = %e, "condition restrict failed");
            continue;
        }
        for value in &combo {
            value.restrict(&mut gen);
        }

        let base_state = match gen.generate(&mut rng) {
            Ok(state) => state,
            Err(_) => {
                stats.unsatisfiable += 1;
                continue;
            }
        };

        let action = enumerate_parameters(base_state, &rule.parameters, 0, &mut stats, &mut consume);
        if action == ConsumerAction::Abort {
            break 'outer;
        }
    }

    stats
}

#[derive(Debug, Default, Clone, Copy)]
pub struct EnumerationStats {
    pub produced: u64,
    pub unsatisfiable: u64,
    pub restriction_errors: u64,
}

fn enumerate_parameters<F>(
    base: VmState,
    params: &[(usize, crate::rules::Parameter)],
    idx: usize,
    stats: &mut EnumerationStats,
    consume: &mut F,
) -> ConsumerAction
where
    F: FnMut(EnumeratedCase) -> ConsumerAction,
{
    if idx == params.len() {
        stats.produced += 1;
        return consume(EnumeratedCase { state: base });
    }

    let (pos, parameter) = &params[idx];
    let len = base.stack.len();
    if *pos >= len {
        return enumerate_parameters(base, params, idx + 1, stats, consume);
    }
    let vec_index = len - 1 - pos;

    for sample in &parameter.samples {
        let mut next = base.clone();
        next.stack[vec_index] = *sample;
        match enumerate_parameters(next, params, idx + 1, stats, consume) {
            ConsumerAction::Abort => return ConsumerAction::Abort,
            ConsumerAction::Continue => {}
        }
    }
    ConsumerAction::Continue
}

/// An upper bound on the number of cases [`enumerate`] could produce for
/// `rule`: product of test-value group sizes times product of parameter
/// sample counts. It over-counts combinations that turn out unsatisfiable
/// or whose parameter position doesn't exist on the generated stack, so
/// callers (`generator-info`, `stats`) should present it as an upper bound,
/// not an exact count.
pub fn total_number_of_cases(rule: &Rule) -> u64 {
    let test_values = rule.condition.get_test_values();
    let groups = group_by_property(test_values);
    let group_product: u64 = groups.iter().map(|(_, g)| g.len() as u64).product::<u64>().max(1);
    let param_product: u64 =
        rule.parameters.iter().map(|(_, p)| p.samples.len() as u64).product::<u64>().max(1);
    group_product * param_product
}

/// Lazily yields every combination of one element from each input slice, in
/// lexicographic (mixed-radix counter) order, without pulling in an
/// `itertools` dependency the rest of the workspace doesn't otherwise need.
struct CartesianProduct<'a> {
    groups: Vec<&'a [TestValue]>,
    indices: Vec<usize>,
    done: bool,
}

impl<'a> CartesianProduct<'a> {
    fn new(groups: &[&'a [TestValue]]) -> Self {
        let done = groups.iter().any(|g| g.is_empty());
        Self { groups: groups.to_vec(), indices: vec![0; groups.len()], done }
    }
}

impl<'a> Iterator for CartesianProduct<'a> {
    type Item = Vec<&'a TestValue>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let current: Vec<&TestValue> =
            self.groups.iter().zip(&self.indices).map(|(g, &i)| &g[i]).collect();

        // Advance the mixed-radix counter for the next call.
        let mut carry = true;
        for (i, group) in self.groups.iter().enumerate().rev() {
            if !carry {
                break;
            }
            self.indices[i] += 1;
            if self.indices[i] >= group.len() {
                self.indices[i] = 0;
            } else {
                carry = false;
            }
        }
        if carry {
            self.done = true;
        }
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::build_rules;

    #[test]
    fn empty_rule_list_produces_nothing() {
        let combos = CartesianProduct::new(&[]);
        assert_eq!(combos.count(), 1);
    }

    #[test]
    fn enumerating_a_regular_rule_yields_at_least_one_case() {
        let rules = build_rules();
        let rule = rules.iter().find(|r| r.name == "add_regular").expect("add_regular exists");
        let mut produced = 0u64;
        let stats = enumerate(rule, 42, |_case| {
            produced += 1;
            if produced >= 5 {
                ConsumerAction::Abort
            } else {
                ConsumerAction::Continue
            }
        });
        assert!(produced >= 1);
        assert_eq!(stats.produced, produced);
    }

    #[test]
    fn enumeration_is_deterministic_for_a_fixed_seed() {
        let rules = build_rules();
        let rule = rules.iter().find(|r| r.name == "add_regular").expect("add_regular exists");

        let mut gas_values_a = Vec::new();
        enumerate(rule, 7, |case| {
            gas_values_a.push(case.state.gas);
            ConsumerAction::Continue
        });

        let mut gas_values_b = Vec::new();
        enumerate(rule, 7, |case| {
            gas_values_b.push(case.state.gas);
            ConsumerAction::Continue
        });

        assert_eq!(gas_values_a, gas_values_b);
    }

    #[test]
    fn abort_stops_enumeration_early() {
        let rules = build_rules();
        let rule = rules.iter().find(|r| r.name == "add_regular").expect("add_regular exists");
        let mut produced = 0u64;
        enumerate(rule, 1, |_case| {
            produced += 1;
            ConsumerAction::Abort
        });
        assert_eq!(produced, 1);
    }

    #[test]
    fn total_number_of_cases_is_never_zero_for_a_real_rule() {
        let rules = build_rules();
        let rule = rules.iter().find(|r| r.name == "add_regular").expect("add_regular exists");
        assert!(total_number_of_cases(rule) >= 1);
    }
}
