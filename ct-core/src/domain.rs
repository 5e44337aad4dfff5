//! Domains: per-type equality, ordering, predecessor/successor, and
//! boundary-probing sample sets (spec.md §4.1).
//!
//! Some domains have no meaningful ordering (booleans, opcodes, status
//! codes) and signal it by panicking out of `less`/`predecessor`/`successor`
//! — callers (conditions, expressions) must not invoke them on such
//! domains, exactly as spec.md §4.1 requires.

use crate::opcode::Opcode;
use crate::state::{Revision, Status};
use crate::value::U256;

/// A domain for a type `T`. `Eq` is required for `equal`/dedup;
/// implementors that have no ordering implement `less`/`predecessor`/
/// `successor` as panics rather than omitting them, so a mis-authored rule
/// fails loudly instead of silently doing the wrong thing.
pub trait Domain {
    type Value: Clone + PartialEq;

    fn equal(&self, a: &Self::Value, b: &Self::Value) -> bool {
        a == b
    }

    fn has_ordering(&self) -> bool;

    fn less(&self, a: &Self::Value, b: &Self::Value) -> bool;

    fn predecessor(&self, a: &Self::Value) -> Self::Value;

    fn successor(&self, a: &Self::Value) -> Self::Value;

    /// Any value different from `a`; used where a condition needs "the
    /// negative instance" without caring which one.
    fn something_not_equal(&self, a: &Self::Value) -> Self::Value;

    /// Boundary-probing values near `a`: by default just `{predecessor(a),
    /// a, successor(a)}` for ordered domains, `{a}` for unordered ones.
    fn samples(&self, a: &Self::Value) -> Vec<Self::Value> {
        if !self.has_ordering() {
            return vec![a.clone()];
        }
        let mut out = vec![self.predecessor(a), a.clone(), self.successor(a)];
        dedup_by_eq(&mut out, |x, y| self.equal(x, y));
        out
    }

    /// The standard recipe from spec.md §4.1: extreme values, each input
    /// with its neighbours, interesting constants, duplicates removed.
    fn samples_for_all(&self, values: &[Self::Value]) -> Vec<Self::Value>;
}

fn dedup_by_eq<T: Clone>(items: &mut Vec<T>, eq: impl Fn(&T, &T) -> bool) {
    let mut out: Vec<T> = Vec::with_capacity(items.len());
    for item in items.drain(..) {
        if !out.iter().any(|kept| eq(kept, &item)) {
            out.push(item);
        }
    }
    *items = out;
}

pub struct U256Domain;

impl U256Domain {
    /// The "interesting constants" named in spec.md §4.1.
    pub fn interesting_constants() -> Vec<U256> {
        vec![
            U256::zero(),
            U256::one(),
            crate::value::constants::pow2(8),
            crate::value::constants::pow2(16),
            crate::value::constants::pow2(32),
            crate::value::constants::pow2(48),
            crate::value::constants::pow2(64),
            crate::value::constants::pow2(128),
            crate::value::constants::pow2(192),
            crate::value::constants::pow2(255),
            U256::MAX,
        ]
    }
}

impl Domain for U256Domain {
    type Value = U256;

    fn has_ordering(&self) -> bool {
        true
    }

    fn less(&self, a: &U256, b: &U256) -> bool {
        a < b
    }

    fn predecessor(&self, a: &U256) -> U256 {
        a.overflowing_sub(U256::one()).0
    }

    fn successor(&self, a: &U256) -> U256 {
        a.overflowing_add(U256::one()).0
    }

    fn something_not_equal(&self, a: &U256) -> U256 {
        if a.is_zero() { U256::one() } else { U256::zero() }
    }

    fn samples_for_all(&self, values: &[U256]) -> Vec<U256> {
        let mut out = Self::interesting_constants();
        for v in values {
            out.push(self.predecessor(v));
            out.push(v.clone());
            out.push(self.successor(v));
        }
        dedup_by_eq(&mut out, |a, b| a == b);
        out
    }
}

pub struct BoolDomain;

impl Domain for BoolDomain {
    type Value = bool;

    fn has_ordering(&self) -> bool {
        false
    }

    fn less(&self, _: &bool, _: &bool) -> bool {
        panic!("BoolDomain has no ordering; `less` must not be invoked on it")
    }

    fn predecessor(&self, _: &bool) -> bool {
        panic!("BoolDomain has no ordering; `predecessor` must not be invoked on it")
    }

    fn successor(&self, _: &bool) -> bool {
        panic!("BoolDomain has no ordering; `successor` must not be invoked on it")
    }

    fn something_not_equal(&self, a: &bool) -> bool {
        !a
    }

    fn samples_for_all(&self, values: &[bool]) -> Vec<bool> {
        let mut out = vec![true, false];
        out.extend(values.iter().copied());
        dedup_by_eq(&mut out, |a, b| a == b);
        out
    }
}

pub struct OpcodeDomain;

impl Domain for OpcodeDomain {
    type Value = Opcode;

    fn has_ordering(&self) -> bool {
        false
    }

    fn less(&self, _: &Opcode, _: &Opcode) -> bool {
        panic!("OpcodeDomain has no ordering; `less` must not be invoked on it")
    }

    fn predecessor(&self, _: &Opcode) -> Opcode {
        panic!("OpcodeDomain has no ordering; `predecessor` must not be invoked on it")
    }

    fn successor(&self, _: &Opcode) -> Opcode {
        panic!("OpcodeDomain has no ordering; `successor` must not be invoked on it")
    }

    fn something_not_equal(&self, a: &Opcode) -> Opcode {
        if *a == Opcode::Stop { Opcode::Add } else { Opcode::Stop }
    }

    fn samples_for_all(&self, values: &[Opcode]) -> Vec<Opcode> {
        let mut out = values.to_vec();
        dedup_by_eq(&mut out, |a, b| a == b);
        out
    }
}

pub struct StatusDomain;

impl Domain for StatusDomain {
    type Value = Status;

    fn has_ordering(&self) -> bool {
        false
    }

    fn less(&self, _: &Status, _: &Status) -> bool {
        panic!("StatusDomain has no ordering; `less` must not be invoked on it")
    }

    fn predecessor(&self, _: &Status) -> Status {
        panic!("StatusDomain has no ordering; `predecessor` must not be invoked on it")
    }

    fn successor(&self, _: &Status) -> Status {
        panic!("StatusDomain has no ordering; `successor` must not be invoked on it")
    }

    fn something_not_equal(&self, a: &Status) -> Status {
        if *a == Status::Running { Status::Failed } else { Status::Running }
    }

    fn samples_for_all(&self, _values: &[Status]) -> Vec<Status> {
        vec![Status::Running, Status::Stopped, Status::Returned, Status::Reverted, Status::Failed]
    }
}

/// Cyclic between `R_99_UnknownNext` and the oldest/newest known revision
/// (spec.md §4.1). `less`/ordering otherwise follows declaration order.
pub struct RevisionDomain;

impl Domain for RevisionDomain {
    type Value = Revision;

    fn has_ordering(&self) -> bool {
        true
    }

    fn less(&self, a: &Revision, b: &Revision) -> bool {
        a < b
    }

    fn predecessor(&self, a: &Revision) -> Revision {
        match a {
            Revision::R99UnknownNext => Revision::newest_known(),
            Revision::R07Istanbul => Revision::R99UnknownNext,
            other => {
                let idx = Revision::KNOWN.iter().position(|r| r == other).unwrap_or(0);
                Revision::KNOWN[idx.saturating_sub(1)]
            }
        }
    }

    fn successor(&self, a: &Revision) -> Revision {
        match a {
            Revision::R99UnknownNext => Revision::oldest_known(),
            Revision::R13Cancun => Revision::R99UnknownNext,
            other => {
                let idx = Revision::KNOWN.iter().position(|r| r == other).unwrap_or(0);
                Revision::KNOWN[(idx + 1).min(Revision::KNOWN.len() - 1)]
            }
        }
    }

    fn something_not_equal(&self, a: &Revision) -> Revision {
        if *a == Revision::R13Cancun { Revision::R07Istanbul } else { Revision::R13Cancun }
    }

    fn samples_for_all(&self, values: &[Revision]) -> Vec<Revision> {
        let mut out = vec![Revision::oldest_known(), Revision::newest_known(), Revision::R99UnknownNext];
        for v in values {
            out.push(self.predecessor(v));
            out.push(*v);
            out.push(self.successor(v));
        }
        dedup_by_eq(&mut out, |a, b| a == b);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revision_cycle_wraps_both_ends() {
        let d = RevisionDomain;
        assert_eq!(d.successor(&Revision::R13Cancun), Revision::R99UnknownNext);
        assert_eq!(d.successor(&Revision::R99UnknownNext), Revision::R07Istanbul);
        assert_eq!(d.predecessor(&Revision::R07Istanbul), Revision::R99UnknownNext);
        assert_eq!(d.predecessor(&Revision::R99UnknownNext), Revision::R13Cancun);
    }

    #[test]
    fn u256_samples_for_all_contains_neighbours() {
        let d = U256Domain;
        let samples = d.samples_for_all(&[U256::from(10)]);
        assert!(samples.contains(&U256::from(9)));
        assert!(samples.contains(&U256::from(10)));
        assert!(samples.contains(&U256::from(11)));
        assert!(samples.contains(&U256::zero()));
        assert!(samples.contains(&U256::MAX));
    }

    #[test]
    #[should_panic]
    fn bool_domain_less_panics() {
        BoolDomain.less(&true, &false);
    }
}
