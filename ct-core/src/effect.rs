//! Tagged effect representation (spec.md §9 REDESIGN FLAGS, third bullet):
//! rule effects are a sum type the harness can pattern-match (e.g. for the
//! soundness scan in spec.md §8) rather than opaque closures it can only
//! invoke.

use std::fmt;
use std::sync::Arc;

use crate::state::VmState;

/// A rule's state transition. `Transform` still carries a closure (the
/// instruction-specific mutation is genuinely arbitrary code), but
/// `NoEffect`/`Fail` are first-class so callers can recognize the two most
/// common shapes without invoking anything.
#[derive(Clone)]
pub enum Effect {
    /// The state is already terminal; stepping it is a no-op.
    NoEffect,
    /// Transition to `Failed` with gas zeroed, per spec.md §4.5's uniform
    /// fail-path effect.
    Fail,
    /// An arbitrary pure transformation, used for the regular-path rules.
    Transform(Arc<dyn Fn(&mut VmState) + Send + Sync>),
}

impl Effect {
    pub fn transform(f: impl Fn(&mut VmState) + Send + Sync + 'static) -> Self {
        Effect::Transform(Arc::new(f))
    }

    pub fn apply(&self, state: &mut VmState) {
        match self {
            Effect::NoEffect => {}
            Effect::Fail => state.fail(),
            Effect::Transform(f) => f(state),
        }
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Effect::NoEffect => write!(f, "NoEffect"),
            Effect::Fail => write!(f, "Fail"),
            Effect::Transform(_) => write!(f, "Transform(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Code, Status};

    #[test]
    fn fail_effect_zeroes_gas_and_sets_status() {
        let mut state = VmState::new(Code::new(vec![]));
        state.gas = 100;
        Effect::Fail.apply(&mut state);
        assert_eq!(state.status, Status::Failed);
        assert_eq!(state.gas, 0);
    }

    #[test]
    fn no_effect_leaves_state_untouched() {
        let mut state = VmState::new(Code::new(vec![]));
        let before = state.pc;
        Effect::NoEffect.apply(&mut state);
        assert_eq!(state.pc, before);
    }
}
