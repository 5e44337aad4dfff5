//! Error types for every layer of the engine, following the same
//! thiserror-per-concern split the teacher uses for `VMError` /
//! `ExceptionalHalt` / `InternalError`.

use thiserror::Error;

use crate::property::Property;

/// Failure evaluating an [`crate::expr::Expression`] against a concrete state.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExprError {
    /// `Param(i)`/`Op(pos)` referenced a stack slot past the current size.
    #[error("stack underflow evaluating expression at depth {0}")]
    StackUnderflow(usize),
    /// A restriction kind that only makes sense for ordered domains (`Lt`,
    /// `Le`, `Gt`, `Ge`) was applied to an expression whose domain has no
    /// ordering (booleans, opcodes, status codes, revisions-as-enum).
    #[error("restriction kind {kind:?} is not valid for unordered property {property}")]
    UnorderedRestriction { property: Property, kind: RestrictKindTag },
}

/// Tag-only copy of [`crate::expr::RestrictKind`] so errors don't need to
/// carry a generic value type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestrictKindTag {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
}

/// A condition authored with contradictory or malformed parameters. Always a
/// programming error in a rule definition, never a runtime/data condition --
/// callers should treat this as fatal, matching spec.md's "SpecificationError
/// (programmer fault) ... causes an immediate abort."
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SpecificationError {
    #[error("revision bounds [{min:?}, {max:?}] are empty (min > max)")]
    EmptyRevisionBounds { min: crate::state::Revision, max: crate::state::Revision },
    #[error("restriction kind {0:?} is invalid for this expression")]
    InvalidRestrictionKind(RestrictKindTag),
    #[error("rule '{0}' has no opcode constraint and no explicit no-op tag")]
    UntaggedRule(String),
    #[error(transparent)]
    Expr(#[from] ExprError),
}

/// Returned by [`crate::generator::StateGenerator::generate`] when the
/// accumulated constraints are mutually contradictory. Always silent to
/// callers: they skip the combination and move on.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unsatisfiable constraint set: {reason}")]
pub struct Unsatisfiable {
    pub reason: String,
}

impl Unsatisfiable {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

/// Top-level result of asking the generator for a state.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GeneratorError {
    #[error(transparent)]
    Unsatisfiable(#[from] Unsatisfiable),
    #[error(transparent)]
    Specification(#[from] SpecificationError),
}

/// Failure from the VM-under-test adapter.
#[derive(Debug, Error)]
pub enum VmError {
    #[error("VM does not support revision {0:?}")]
    UnsupportedRevision(crate::state::Revision),
    #[error("VM implementation panicked: {0}")]
    Panic(String),
    #[error("VM step failed: {0}")]
    Other(String),
}

/// Top-level harness error: a failure that aborts the whole run rather than
/// being recorded as a per-state issue.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error(transparent)]
    Specification(#[from] SpecificationError),
    #[error("generator produced an internal error (not Unsatisfiable): {0}")]
    GeneratorInternal(String),
    #[error("worker thread panicked")]
    WorkerPanicked,
}

/// Umbrella error used by public, fallible entry points that can fail for any
/// of the above reasons.
#[derive(Debug, Error)]
pub enum CtError {
    #[error(transparent)]
    Specification(#[from] SpecificationError),
    #[error(transparent)]
    Generator(#[from] GeneratorError),
    #[error(transparent)]
    Harness(#[from] HarnessError),
    #[error(transparent)]
    Vm(#[from] VmError),
}
