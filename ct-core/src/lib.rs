//! Conformance-testing core: the value algebra, state model, condition and
//! expression algebras, constraint-based generator, rule compendium,
//! opcode-indexed dispatcher, enumerator, and parallel harness.
//!
//! No CLI, no file I/O, no progress printing -- see `ct-cli` for the binary
//! that wires this crate to an actual VM-under-test and a terminal.

pub mod condition;
pub mod domain;
pub mod effect;
pub mod enumerator;
pub mod errors;
pub mod expr;
pub mod gas;
pub mod generator;
pub mod harness;
pub mod opcode;
pub mod property;
pub mod rules;
pub mod specification;
pub mod state;
pub mod testvalue;
pub mod value;

pub use enumerator::{enumerate, total_number_of_cases, ConsumerAction, EnumeratedCase, EnumerationStats};
pub use errors::CtError;
pub use harness::{HarnessConfig, HarnessReport, Issue, IssueKind, ProgressUpdate, TargetVm};
pub use rules::{build_rules, Rule};
pub use specification::Specification;
pub use state::VmState;
