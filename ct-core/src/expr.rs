//! Expressions: named, readable/restrictable state projections (spec.md
//! §4.2). Each expression knows its domain, can evaluate itself against a
//! concrete state, and can restrict a generator so the expression takes a
//! given value under a given [`RestrictKind`].

use crate::errors::{ExprError, RestrictKindTag};
use crate::generator::StateGenerator;
use crate::property::{Property, Var};
use crate::state::{Revision, Status, VmState};
use crate::value::U256;

/// `Lt`/`Le`/`Gt`/`Ge` set one-sided bounds; `Eq` fixes the value. Applying
/// an ordering kind to an unordered expression is a [`crate::errors::SpecificationError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestrictKind {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl From<RestrictKind> for RestrictKindTag {
    fn from(k: RestrictKind) -> Self {
        match k {
            RestrictKind::Eq => RestrictKindTag::Eq,
            RestrictKind::Lt => RestrictKindTag::Lt,
            RestrictKind::Le => RestrictKindTag::Le,
            RestrictKind::Gt => RestrictKindTag::Gt,
            RestrictKind::Ge => RestrictKindTag::Ge,
        }
    }
}

/// An expression over a concrete value type `T`.
pub trait Expression<T> {
    fn property(&self) -> Property;

    fn eval(&self, state: &VmState) -> Result<T, ExprError>;

    /// Pushes a constraint onto `gen` so that a state it later generates
    /// satisfies `self <kind> value`.
    fn restrict(&self, gen: &mut StateGenerator, kind: RestrictKind, value: T) -> Result<(), ExprError>;
}

macro_rules! unordered_guard {
    ($self:expr, $kind:expr) => {
        if !matches!($kind, RestrictKind::Eq) {
            return Err(ExprError::UnorderedRestriction { property: $self.property(), kind: $kind.into() });
        }
    };
}

pub struct Pc;

impl Expression<u16> for Pc {
    fn property(&self) -> Property {
        Property::Pc
    }

    fn eval(&self, state: &VmState) -> Result<u16, ExprError> {
        Ok(state.pc)
    }

    fn restrict(&self, gen: &mut StateGenerator, kind: RestrictKind, value: u16) -> Result<(), ExprError> {
        match kind {
            RestrictKind::Eq => gen.set_pc(value),
            RestrictKind::Lt => gen.set_max_pc(value.saturating_sub(1)),
            RestrictKind::Le => gen.set_max_pc(value),
            RestrictKind::Gt => gen.set_min_pc(value.saturating_add(1)),
            RestrictKind::Ge => gen.set_min_pc(value),
        }
        Ok(())
    }
}

pub struct Gas;

impl Expression<i64> for Gas {
    fn property(&self) -> Property {
        Property::Gas
    }

    fn eval(&self, state: &VmState) -> Result<i64, ExprError> {
        Ok(state.gas)
    }

    fn restrict(&self, gen: &mut StateGenerator, kind: RestrictKind, value: i64) -> Result<(), ExprError> {
        match kind {
            RestrictKind::Eq => gen.set_gas(value),
            RestrictKind::Lt => gen.set_max_gas(value.saturating_sub(1)),
            RestrictKind::Le => gen.set_max_gas(value),
            RestrictKind::Gt => gen.set_min_gas(value.saturating_add(1)),
            RestrictKind::Ge => gen.set_min_gas(value),
        }
        Ok(())
    }
}

pub struct GasRefund;

impl Expression<i64> for GasRefund {
    fn property(&self) -> Property {
        Property::GasRefund
    }

    fn eval(&self, state: &VmState) -> Result<i64, ExprError> {
        Ok(state.gas_refund)
    }

    fn restrict(&self, gen: &mut StateGenerator, kind: RestrictKind, value: i64) -> Result<(), ExprError> {
        unordered_guard!(self, kind);
        gen.set_gas_refund(value);
        Ok(())
    }
}

pub struct ReadOnly;

impl Expression<bool> for ReadOnly {
    fn property(&self) -> Property {
        Property::ReadOnly
    }

    fn eval(&self, state: &VmState) -> Result<bool, ExprError> {
        Ok(state.read_only)
    }

    fn restrict(&self, gen: &mut StateGenerator, kind: RestrictKind, value: bool) -> Result<(), ExprError> {
        unordered_guard!(self, kind);
        gen.set_read_only(value);
        Ok(())
    }
}

pub struct StatusExpr;

impl Expression<Status> for StatusExpr {
    fn property(&self) -> Property {
        Property::Status
    }

    fn eval(&self, state: &VmState) -> Result<Status, ExprError> {
        Ok(state.status)
    }

    fn restrict(&self, gen: &mut StateGenerator, kind: RestrictKind, value: Status) -> Result<(), ExprError> {
        unordered_guard!(self, kind);
        gen.set_status(value);
        Ok(())
    }
}

pub struct RevisionExpr;

impl Expression<Revision> for RevisionExpr {
    fn property(&self) -> Property {
        Property::Revision
    }

    fn eval(&self, state: &VmState) -> Result<Revision, ExprError> {
        Ok(state.revision)
    }

    fn restrict(&self, gen: &mut StateGenerator, kind: RestrictKind, value: Revision) -> Result<(), ExprError> {
        match kind {
            RestrictKind::Eq => gen.set_revision(value),
            _ => return Err(ExprError::UnorderedRestriction { property: self.property(), kind: kind.into() }),
        }
        Ok(())
    }
}

pub struct StackSize;

impl Expression<usize> for StackSize {
    fn property(&self) -> Property {
        Property::StackSize
    }

    fn eval(&self, state: &VmState) -> Result<usize, ExprError> {
        Ok(state.stack_size())
    }

    fn restrict(&self, gen: &mut StateGenerator, kind: RestrictKind, value: usize) -> Result<(), ExprError> {
        match kind {
            RestrictKind::Eq => gen.set_stack_size(value),
            RestrictKind::Lt => gen.set_max_stack_size(value.saturating_sub(1)),
            RestrictKind::Le => gen.set_max_stack_size(value),
            RestrictKind::Gt => gen.set_min_stack_size(value.saturating_add(1)),
            RestrictKind::Ge => gen.set_min_stack_size(value),
        }
        Ok(())
    }
}

/// The opcode byte at a stack-bound position. `position` must have been
/// bound to a variable via the generator's code-shape setters, or be `Pc`
/// itself (represented here by binding to [`Var`] `"pc"`, which the
/// generator treats specially).
pub struct Op(pub Var);

impl Expression<u8> for Op {
    fn property(&self) -> Property {
        Property::Op(self.0.clone())
    }

    fn eval(&self, state: &VmState) -> Result<u8, ExprError> {
        // Only the PC-bound case is evaluable without a generator binding
        // table; rules that bind `Op` to a stack variable resolve it during
        // generation rather than during plain evaluation.
        if self.0.0 == "pc" {
            return state
                .current_opcode()
                .ok_or(ExprError::StackUnderflow(state.pc as usize));
        }
        Err(ExprError::StackUnderflow(0))
    }

    fn restrict(&self, gen: &mut StateGenerator, kind: RestrictKind, value: u8) -> Result<(), ExprError> {
        unordered_guard!(self, kind);
        gen.add_code_operation(self.0.clone(), value);
        Ok(())
    }
}

/// The `i`-th stack entry, top is index 0. Supports equality constraints
/// only, per spec.md §4.2.
pub struct Param(pub usize, pub Var);

impl Expression<U256> for Param {
    fn property(&self) -> Property {
        Property::Param(self.1.clone())
    }

    fn eval(&self, state: &VmState) -> Result<U256, ExprError> {
        state.stack_param(self.0).ok_or(ExprError::StackUnderflow(self.0))
    }

    fn restrict(&self, gen: &mut StateGenerator, kind: RestrictKind, value: U256) -> Result<(), ExprError> {
        unordered_guard!(self, kind);
        gen.set_stack_value(self.0, value);
        gen.bind_stack_value(self.0, self.1.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Code;

    #[test]
    fn pc_evaluates_directly() {
        let mut state = VmState::new(Code::new(vec![0x01]));
        state.pc = 0;
        assert_eq!(Pc.eval(&state), Ok(0));
    }

    #[test]
    fn param_underflows_past_stack_size() {
        let state = VmState::new(Code::new(vec![]));
        assert_eq!(Param(0, Var::new("x")).eval(&state), Err(ExprError::StackUnderflow(0)));
    }

    #[test]
    fn gas_refund_restrict_with_lt_is_rejected() {
        let mut gen = StateGenerator::new();
        let err = GasRefund.restrict(&mut gen, RestrictKind::Lt, 5).unwrap_err();
        assert!(matches!(err, ExprError::UnorderedRestriction { .. }));
    }
}
