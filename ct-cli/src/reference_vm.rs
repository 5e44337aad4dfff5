//! A `TargetVm` built directly from the rules compendium's own effects
//! (SPEC_FULL.md §0, §4). Not a second independent EVM: it looks up the
//! rule that matches a state's opcode-and-condition and applies that same
//! rule's effect, so running the harness against it is a self-consistency
//! check of the engine rather than a conformance test of anything external.
//!
//! `probe`/`run`/`regressions` fall back to this adapter when no `<vm>`
//! argument names an external binary, and `cargo test` exercises it through
//! `ct-core`'s own harness unit tests.

use ct_core::{Specification, TargetVm};

/// Looks up the (first, by construction unique under soundness) matching
/// rule for a state and applies its effect. Ambiguity -- more than one
/// matching rule disagreeing on the resulting state -- would itself be a
/// soundness bug in the rule compendium, not something this adapter tries
/// to paper over.
pub struct ReferenceVm {
    spec: Specification,
}

impl ReferenceVm {
    pub fn new() -> Self {
        Self { spec: Specification::new() }
    }
}

impl Default for ReferenceVm {
    fn default() -> Self {
        Self::new()
    }
}

impl TargetVm for ReferenceVm {
    fn step(&self, state: &ct_core::VmState) -> Result<ct_core::VmState, ct_core::errors::VmError> {
        let matching: Vec<_> = self
            .spec
            .applicable_rules(state)
            .into_iter()
            .filter(|r| r.condition.check(state).unwrap_or(false))
            .collect();

        let Some(rule) = matching.first() else {
            return Err(ct_core::errors::VmError::Other(format!(
                "no rule matches state at pc={} (opcode {:?})",
                state.pc,
                state.current_opcode()
            )));
        };

        let mut next = state.clone();
        rule.effect.apply(&mut next);
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ct_core::state::Code;

    #[test]
    fn steps_an_add_instruction_via_its_regular_rule() {
        let vm = ReferenceVm::new();
        let mut state = ct_core::VmState::new(Code::new(vec![ct_core::opcode::Opcode::Add.as_byte()]));
        state.gas = 10;
        state.push(ct_core::value::U256::from(5));
        state.push(ct_core::value::U256::from(7));
        let next = vm.step(&state).expect("add should be steppable");
        assert_eq!(next.pc, 1);
        assert_eq!(next.stack_param(0), Some(ct_core::value::U256::from(12)));
    }
}
