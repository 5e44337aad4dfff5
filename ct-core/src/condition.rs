//! Conditions: boolean combinators over expressions (spec.md §4.3).
//!
//! Per the first two REDESIGN FLAGS in spec.md §9, this is a plain sum type
//! with one constructor per primitive condition plus an `All` combinator --
//! no string-parsed dispatch, no variadic-only boolean algebra. Flattening
//! of nested conjunctions and dropping of empty ones happens in
//! [`Condition::all`] at construction time, not lazily during evaluation.
//!
//! Conditions that talk about "the value at some stack position" (`IsCode`,
//! `IsStorageWarm`, `IsAddressWarm`, ...) refer to it by a [`Var`], bound to
//! a concrete stack position elsewhere in the same conjunction via
//! [`Condition::ParamBind`] or [`Condition::ParamEq`]. `check` resolves
//! every `Var` referenced anywhere in the conjunction to a concrete value
//! once, up front, the same way [`crate::generator::StateGenerator`]
//! resolves them once per generation (spec.md §4.4) -- a condition never
//! has its own private binding table, so a rule author who forgets to bind
//! a `Var` gets "this clause is vacuously false/true", not a panic.

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::domain::{Domain, RevisionDomain};
use crate::errors::ExprError;
use crate::expr::{Expression, Gas, GasRefund, Pc, ReadOnly, RestrictKind, RevisionExpr, StackSize, StatusExpr};
use crate::generator::StateGenerator;
use crate::property::{Property, Var};
use crate::state::{Revision, Status, StorageConfigClass, VmState};
use crate::testvalue::TestValue;
use crate::value::{Address, U256};

/// The five relational operators spec.md §4.3 lists for relational
/// conditions over ordered expressions. There is no `Ne`: "not equal to a
/// specific value" has no interval form a generator can realize, so
/// inequality is its own condition per expression (`OpNe`), not a `RelKind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelKind {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl fmt::Display for RelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RelKind::Eq => "==",
            RelKind::Lt => "<",
            RelKind::Le => "<=",
            RelKind::Gt => ">",
            RelKind::Ge => ">=",
        };
        write!(f, "{s}")
    }
}

/// The algebra from spec.md §4.3. Each variant is either a primitive
/// boolean predicate over state, or the `All` conjunction combinator.
#[derive(Debug, Clone)]
pub enum Condition {
    /// The empty conjunction: always true.
    True,
    All(Vec<Condition>),

    Pc(RelKind, u16),
    Gas(RelKind, i64),
    GasRefund(RelKind, i64),
    ReadOnly(bool),
    Status(Status),
    StackSize(RelKind, usize),

    /// `code[pos] == opcode`, where `pos` names either the literal `"pc"`
    /// or a variable bound to a stack position in the same conjunction.
    OpEq(Var, u8),
    OpNe(Var, u8),
    /// Binds `var` to stack position `pos`'s value without constraining it,
    /// so sibling clauses (`IsCode`, `IsStorageWarm`, ...) can refer to
    /// "whatever ended up there".
    ParamBind(usize, Var),
    /// Binds `var` to stack position `pos` *and* fixes its value.
    ParamEq(usize, Var, U256),

    RevisionBounds(Revision, Revision),
    IsRevision(Revision),
    AnyKnownRevision,

    IsCode(Var),
    IsData(Var),

    IsStorageWarm(Var),
    IsStorageCold(Var),
    StorageConfiguration(StorageConfigClass, Var, Option<Var>),

    BindTransientStorageToZero(Var),
    BindTransientStorageToNonZero(Var),

    IsAddressWarm(Var),
    IsAddressCold(Var),
    AccountIsEmpty(Var),
    AccountIsNotEmpty(Var),

    HasSelfDestructed,
    HasNotSelfDestructed,

    InRange256FromCurrentBlock(Var),
    OutOfRange256FromCurrentBlock(Var),

    HasBlobHash(Var),
    HasNoBlobHash(Var),

    /// Escape hatch for predicates that are a function of the *whole*
    /// concrete state rather than one bound variable — dynamic gas checks
    /// (memory expansion, EXP's per-byte exponent cost) whose threshold
    /// depends on stack operands that are themselves generator-bound, not
    /// compile-time constants. This is not a second opcode-dispatch
    /// mechanism (the dispatcher tag in [`crate::rules::Rule`] stays a
    /// first-class field, per spec.md §9's first REDESIGN FLAG); it only
    /// ever expresses "is this boundary crossed", never "what opcode is
    /// this".
    Custom(Arc<CustomCondition>),
}

/// Backing data for [`Condition::Custom`]. Carries its own boundary-probe
/// test values since there's no generic way to derive "samples near this
/// predicate's boundary" for an arbitrary closure.
pub struct CustomCondition {
    pub label: String,
    pub check: Box<dyn Fn(&VmState) -> bool + Send + Sync>,
    pub restrict: Box<dyn Fn(&mut StateGenerator) + Send + Sync>,
    pub test_values: Vec<TestValue>,
}

impl fmt::Debug for CustomCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CustomCondition({})", self.label)
    }
}

type Bindings = FxHashMap<Var, U256>;

impl Condition {
    /// Flattens nested conjunctions and drops `True` members, per the
    /// REDESIGN FLAGS note that this simplification belongs at construction
    /// time rather than in `check`/`restrict`.
    pub fn all(parts: impl IntoIterator<Item = Condition>) -> Condition {
        let mut flat = Vec::new();
        for part in parts {
            match part {
                Condition::True => {}
                Condition::All(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => Condition::True,
            1 => flat.into_iter().next().unwrap_or(Condition::True),
            _ => Condition::All(flat),
        }
    }

    pub fn check(&self, state: &VmState) -> Result<bool, ExprError> {
        let mut bindings = Bindings::default();
        self.collect_bindings(state, &mut bindings);
        self.check_with(state, &bindings)
    }

    fn collect_bindings(&self, state: &VmState, out: &mut Bindings) {
        match self {
            Condition::All(parts) => {
                for p in parts {
                    p.collect_bindings(state, out);
                }
            }
            Condition::ParamBind(pos, var) => {
                if let Some(v) = state.stack_param(*pos) {
                    out.insert(var.clone(), v);
                }
            }
            Condition::ParamEq(pos, var, _) => {
                if let Some(v) = state.stack_param(*pos) {
                    out.insert(var.clone(), v);
                }
            }
            _ => {}
        }
    }

    fn check_with(&self, state: &VmState, b: &Bindings) -> Result<bool, ExprError> {
        Ok(match self {
            Condition::True => true,
            Condition::All(parts) => {
                for part in parts {
                    if !part.check_with(state, b)? {
                        return Ok(false);
                    }
                }
                true
            }
            Condition::Pc(rel, v) => rel_ord(*rel, Pc.eval(state)?, *v),
            Condition::Gas(rel, v) => rel_ord(*rel, Gas.eval(state)?, *v),
            Condition::GasRefund(rel, v) => rel_ord(*rel, GasRefund.eval(state)?, *v),
            Condition::ReadOnly(v) => ReadOnly.eval(state)? == *v,
            Condition::Status(v) => StatusExpr.eval(state)? == *v,
            Condition::StackSize(rel, v) => rel_ord(*rel, StackSize.eval(state)?, *v),
            Condition::OpEq(var, opcode) => op_at(var, state, b) == Some(*opcode),
            Condition::OpNe(var, opcode) => op_at(var, state, b).map(|o| o != *opcode).unwrap_or(false),
            Condition::ParamBind(pos, _) => state.stack_param(*pos).is_some(),
            Condition::ParamEq(pos, _, value) => state.stack_param(*pos) == Some(*value),
            Condition::RevisionBounds(min, max) => {
                assert!(min <= max, "RevisionBounds with min > max is a specification error");
                let r = RevisionExpr.eval(state)?;
                r >= *min && r <= *max
            }
            Condition::IsRevision(r) => RevisionExpr.eval(state)? == *r,
            Condition::AnyKnownRevision => RevisionExpr.eval(state)?.is_known(),
            Condition::IsCode(var) => pos_of(var, state, b).map(|p| state.code.is_code(p)).unwrap_or(true),
            Condition::IsData(var) => pos_of(var, state, b).map(|p| state.code.is_data(p)).unwrap_or(false),
            Condition::IsStorageWarm(var) => key_of(var, b).map(|k| state.storage.is_warm(k)).unwrap_or(false),
            Condition::IsStorageCold(var) => key_of(var, b).map(|k| !state.storage.is_warm(k)).unwrap_or(true),
            Condition::StorageConfiguration(cfg, var, new_var) => {
                let Some(key) = key_of(var, b) else { return Ok(false) };
                let slot = state.storage.get(key);
                let new_value = new_var.as_ref().and_then(|nv| key_of(nv, b)).unwrap_or(slot.current);
                StorageConfigClass::classify(slot.original, slot.current, new_value) == *cfg
            }
            Condition::BindTransientStorageToZero(var) => {
                key_of(var, b).map(|k| state.transient_storage.get(k).is_zero()).unwrap_or(true)
            }
            Condition::BindTransientStorageToNonZero(var) => {
                key_of(var, b).map(|k| !state.transient_storage.get(k).is_zero()).unwrap_or(false)
            }
            Condition::IsAddressWarm(var) => address_of(var, b).map(|a| state.accounts.is_warm(a)).unwrap_or(false),
            Condition::IsAddressCold(var) => address_of(var, b).map(|a| !state.accounts.is_warm(a)).unwrap_or(true),
            Condition::AccountIsEmpty(var) => {
                address_of(var, b).map(|a| state.accounts.is_empty_account(a)).unwrap_or(true)
            }
            Condition::AccountIsNotEmpty(var) => {
                address_of(var, b).map(|a| !state.accounts.is_empty_account(a)).unwrap_or(false)
            }
            Condition::HasSelfDestructed => state.has_self_destructed,
            Condition::HasNotSelfDestructed => !state.has_self_destructed,
            Condition::InRange256FromCurrentBlock(var) => block_number_of(var, b)
                .map(|n| state.in_range_256_from_current_block(n))
                .unwrap_or(false),
            Condition::OutOfRange256FromCurrentBlock(var) => block_number_of(var, b)
                .map(|n| !state.in_range_256_from_current_block(n))
                .unwrap_or(true),
            Condition::HasBlobHash(var) => blob_index_of(var, b)
                .map(|i| state.blob_hashes.get(i).map(|h| *h != crate::value::H256::zero()).unwrap_or(false))
                .unwrap_or(false),
            Condition::HasNoBlobHash(var) => blob_index_of(var, b)
                .map(|i| state.blob_hashes.get(i).map(|h| *h == crate::value::H256::zero()).unwrap_or(true))
                .unwrap_or(true),
            Condition::Custom(custom) => (custom.check)(state),
        })
    }

    pub fn restrict(&self, gen: &mut StateGenerator) -> Result<(), ExprError> {
        match self {
            Condition::True => {}
            Condition::All(parts) => {
                for part in parts {
                    part.restrict(gen)?;
                }
            }
            Condition::Pc(rel, v) => restrict_rel(gen, &Pc, *rel, *v)?,
            Condition::Gas(rel, v) => restrict_rel(gen, &Gas, *rel, *v)?,
            Condition::GasRefund(rel, v) => restrict_rel(gen, &GasRefund, *rel, *v)?,
            Condition::ReadOnly(v) => gen.set_read_only(*v),
            Condition::Status(v) => gen.set_status(*v),
            Condition::StackSize(rel, v) => restrict_rel(gen, &StackSize, *rel, *v)?,
            Condition::OpEq(var, opcode) => gen.add_code_operation(var.clone(), *opcode),
            Condition::OpNe(var, opcode) => gen.add_code_operation(var.clone(), substitute_opcode(*opcode)),
            Condition::ParamBind(pos, var) => gen.bind_stack_value(*pos, var.clone()),
            Condition::ParamEq(pos, var, value) => {
                gen.set_stack_value(*pos, *value);
                gen.bind_stack_value(*pos, var.clone());
            }
            Condition::RevisionBounds(min, max) => {
                assert!(min <= max, "RevisionBounds with min > max is a specification error");
                gen.add_revision_bounds(*min, *max);
            }
            Condition::IsRevision(r) => gen.set_revision(*r),
            Condition::AnyKnownRevision => gen.add_revision_bounds(Revision::oldest_known(), Revision::newest_known()),
            Condition::IsCode(var) => gen.add_is_code(var.clone()),
            Condition::IsData(var) => gen.add_is_data(var.clone()),
            Condition::IsStorageWarm(var) => gen.bind_is_storage_warm(var.clone()),
            Condition::IsStorageCold(var) => gen.bind_is_storage_cold(var.clone()),
            Condition::StorageConfiguration(cfg, var, new_var) => {
                gen.bind_storage_configuration(*cfg, var.clone(), new_var.clone())
            }
            Condition::BindTransientStorageToZero(var) => gen.bind_transient_storage_zero(var.clone()),
            Condition::BindTransientStorageToNonZero(var) => gen.bind_transient_storage_nonzero(var.clone()),
            Condition::IsAddressWarm(var) => gen.bind_to_warm_address(var.clone()),
            Condition::IsAddressCold(var) => gen.bind_to_cold_address(var.clone()),
            Condition::AccountIsEmpty(var) => gen.bind_to_address_of_empty_account(var.clone()),
            Condition::AccountIsNotEmpty(var) => gen.bind_to_address_of_non_empty_account(var.clone()),
            Condition::HasSelfDestructed => gen.must_be_self_destructed(),
            Condition::HasNotSelfDestructed => gen.must_not_be_self_destructed(),
            Condition::InRange256FromCurrentBlock(var) => gen.restrict_variable_to_one_of_the_last_256_blocks(var.clone()),
            Condition::OutOfRange256FromCurrentBlock(var) => {
                gen.restrict_variable_to_none_of_the_last_256_blocks(var.clone())
            }
            Condition::HasBlobHash(var) => gen.is_present_blob_hash_index(var.clone()),
            Condition::HasNoBlobHash(var) => gen.is_absent_blob_hash_index(var.clone()),
            Condition::Custom(custom) => (custom.restrict)(gen),
        }
        Ok(())
    }

    /// The per-property boundary probe set (spec.md §4.3). Conjunctions
    /// concatenate their children's lists; the enumerator does the
    /// per-property dedup (spec.md §4.7).
    pub fn get_test_values(&self) -> Vec<TestValue> {
        match self {
            Condition::True => vec![],
            Condition::All(parts) => parts.iter().flat_map(Condition::get_test_values).collect(),
            Condition::Pc(_, v) => {
                let (a, b, c) = (v.wrapping_sub(1), *v, v.wrapping_add(1));
                [a, b, c].into_iter().map(|x| num_value(Property::Pc, x, |g, x| g.set_pc(x))).collect()
            }
            Condition::Gas(_, v) => i64_neighbors(Property::Gas, *v, |g, x| g.set_gas(x)),
            Condition::GasRefund(_, v) => i64_neighbors(Property::GasRefund, *v, |g, x| g.set_gas_refund(x)),
            Condition::ReadOnly(_) => bool_values(Property::ReadOnly, |g, x| g.set_read_only(x)),
            Condition::Status(_) => vec![],
            Condition::StackSize(_, v) => usize_neighbors(Property::StackSize, *v, |g, x| g.set_stack_size(x)),
            Condition::OpEq(var, opcode) => {
                let (var1, opcode1) = (var.clone(), *opcode);
                vec![TestValue::new(Property::Op(var.clone()), format!("{opcode:#04x}"), move |g| {
                    g.add_code_operation(var1.clone(), opcode1)
                })]
            }
            Condition::OpNe(var, opcode) => {
                let sub = substitute_opcode(*opcode);
                let var1 = var.clone();
                vec![TestValue::new(Property::Op(var.clone()), format!("!{opcode:#04x}"), move |g| {
                    g.add_code_operation(var1.clone(), sub)
                })]
            }
            Condition::ParamBind(_, _) => vec![],
            Condition::ParamEq(pos, var, value) => {
                let (pos, var1, value) = (*pos, var.clone(), *value);
                vec![TestValue::new(Property::Param(var.clone()), value.to_string(), move |g| {
                    g.set_stack_value(pos, value);
                    g.bind_stack_value(pos, var1.clone());
                })]
            }
            Condition::RevisionBounds(min, max) => RevisionDomain
                .samples_for_all(&[*min, *max])
                .into_iter()
                .map(|r| TestValue::new(Property::Revision, format!("{r:?}"), move |g| g.set_revision(r)))
                .collect(),
            Condition::IsRevision(r) => {
                let r = *r;
                vec![TestValue::new(Property::Revision, format!("{r:?}"), move |g| g.set_revision(r))]
            }
            Condition::AnyKnownRevision => Revision::KNOWN
                .iter()
                .map(|&r| TestValue::new(Property::Revision, format!("{r:?}"), move |g| g.set_revision(r)))
                .collect(),
            Condition::IsCode(var) => bound_bool_values(Property::IsCode(var.clone()), var, |g, v, positive| {
                if positive { g.add_is_code(v) } else { g.add_is_data(v) }
            }),
            Condition::IsData(var) => bound_bool_values(Property::IsData(var.clone()), var, |g, v, positive| {
                if positive { g.add_is_data(v) } else { g.add_is_code(v) }
            }),
            Condition::IsStorageWarm(var) => {
                bound_bool_values(Property::StorageWarm(var.clone()), var, |g, v, positive| {
                    if positive { g.bind_is_storage_warm(v) } else { g.bind_is_storage_cold(v) }
                })
            }
            Condition::IsStorageCold(var) => {
                bound_bool_values(Property::StorageWarm(var.clone()), var, |g, v, positive| {
                    if positive { g.bind_is_storage_cold(v) } else { g.bind_is_storage_warm(v) }
                })
            }
            Condition::StorageConfiguration(_, var, new_var) => StorageConfigClass::ALL
                .iter()
                .map(|&cfg| {
                    let (var1, new_var1) = (var.clone(), new_var.clone());
                    TestValue::new(Property::StorageConfiguration(var.clone()), format!("{cfg:?}"), move |g| {
                        g.bind_storage_configuration(cfg, var1.clone(), new_var1.clone())
                    })
                })
                .collect(),
            Condition::BindTransientStorageToZero(var) => {
                bound_bool_values(Property::TransientStorage(var.clone()), var, |g, v, positive| {
                    if positive { g.bind_transient_storage_zero(v) } else { g.bind_transient_storage_nonzero(v) }
                })
            }
            Condition::BindTransientStorageToNonZero(var) => {
                bound_bool_values(Property::TransientStorage(var.clone()), var, |g, v, positive| {
                    if positive { g.bind_transient_storage_nonzero(v) } else { g.bind_transient_storage_zero(v) }
                })
            }
            Condition::IsAddressWarm(var) => {
                bound_bool_values(Property::AddressWarm(var.clone()), var, |g, v, positive| {
                    if positive { g.bind_to_warm_address(v) } else { g.bind_to_cold_address(v) }
                })
            }
            Condition::IsAddressCold(var) => {
                bound_bool_values(Property::AddressWarm(var.clone()), var, |g, v, positive| {
                    if positive { g.bind_to_cold_address(v) } else { g.bind_to_warm_address(v) }
                })
            }
            Condition::AccountIsEmpty(var) => {
                bound_bool_values(Property::AccountEmpty(var.clone()), var, |g, v, positive| {
                    if positive { g.bind_to_address_of_empty_account(v) } else { g.bind_to_address_of_non_empty_account(v) }
                })
            }
            Condition::AccountIsNotEmpty(var) => {
                bound_bool_values(Property::AccountEmpty(var.clone()), var, |g, v, positive| {
                    if positive { g.bind_to_address_of_non_empty_account(v) } else { g.bind_to_address_of_empty_account(v) }
                })
            }
            Condition::HasSelfDestructed => bool_values(Property::SelfDestructed, |g, positive| {
                if positive { g.must_be_self_destructed() } else { g.must_not_be_self_destructed() }
            }),
            Condition::HasNotSelfDestructed => bool_values(Property::SelfDestructed, |g, positive| {
                if positive { g.must_not_be_self_destructed() } else { g.must_be_self_destructed() }
            }),
            Condition::InRange256FromCurrentBlock(var) => {
                bound_bool_values(Property::BlockNumberWindow(var.clone()), var, |g, v, positive| {
                    if positive {
                        g.restrict_variable_to_one_of_the_last_256_blocks(v)
                    } else {
                        g.restrict_variable_to_none_of_the_last_256_blocks(v)
                    }
                })
            }
            Condition::OutOfRange256FromCurrentBlock(var) => {
                bound_bool_values(Property::BlockNumberWindow(var.clone()), var, |g, v, positive| {
                    if positive {
                        g.restrict_variable_to_none_of_the_last_256_blocks(v)
                    } else {
                        g.restrict_variable_to_one_of_the_last_256_blocks(v)
                    }
                })
            }
            Condition::HasBlobHash(var) => bound_bool_values(Property::BlobHashPresence(var.clone()), var, |g, v, positive| {
                if positive { g.is_present_blob_hash_index(v) } else { g.is_absent_blob_hash_index(v) }
            }),
            Condition::HasNoBlobHash(var) => {
                bound_bool_values(Property::BlobHashPresence(var.clone()), var, |g, v, positive| {
                    if positive { g.is_absent_blob_hash_index(v) } else { g.is_present_blob_hash_index(v) }
                })
            }
            Condition::Custom(custom) => custom.test_values.clone(),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::True => write!(f, "true"),
            Condition::All(parts) => {
                write!(f, "(")?;
                for (i, p) in parts.iter().enumerate() {
                    if i > 0 {
                        write!(f, " && ")?;
                    }
                    write!(f, "{p}")?;
                }
                write!(f, ")")
            }
            Condition::Pc(rel, v) => write!(f, "pc {rel} {v}"),
            Condition::Gas(rel, v) => write!(f, "gas {rel} {v}"),
            Condition::GasRefund(rel, v) => write!(f, "gasRefund {rel} {v}"),
            Condition::ReadOnly(v) => write!(f, "readOnly == {v}"),
            Condition::Status(v) => write!(f, "status == {v:?}"),
            Condition::StackSize(rel, v) => write!(f, "stackSize {rel} {v}"),
            Condition::OpEq(var, op) => write!(f, "op[{var}] == {op:#04x}"),
            Condition::OpNe(var, op) => write!(f, "op[{var}] != {op:#04x}"),
            Condition::ParamBind(pos, var) => write!(f, "param_{pos} as {var}"),
            Condition::ParamEq(pos, var, v) => write!(f, "param_{pos}[{var}] == {v}"),
            Condition::RevisionBounds(min, max) => write!(f, "revision in [{min:?}, {max:?}]"),
            Condition::IsRevision(r) => write!(f, "revision == {r:?}"),
            Condition::AnyKnownRevision => write!(f, "revision != R_99_UnknownNext"),
            Condition::IsCode(var) => write!(f, "isCode[{var}]"),
            Condition::IsData(var) => write!(f, "isData[{var}]"),
            Condition::IsStorageWarm(var) => write!(f, "isStorageWarm[{var}]"),
            Condition::IsStorageCold(var) => write!(f, "isStorageCold[{var}]"),
            Condition::StorageConfiguration(cfg, var, _) => write!(f, "storageConfiguration[{var}] == {cfg:?}"),
            Condition::BindTransientStorageToZero(var) => write!(f, "transientStorage[{var}] == 0"),
            Condition::BindTransientStorageToNonZero(var) => write!(f, "transientStorage[{var}] != 0"),
            Condition::IsAddressWarm(var) => write!(f, "isAddressWarm[{var}]"),
            Condition::IsAddressCold(var) => write!(f, "isAddressCold[{var}]"),
            Condition::AccountIsEmpty(var) => write!(f, "accountIsEmpty[{var}]"),
            Condition::AccountIsNotEmpty(var) => write!(f, "accountIsNotEmpty[{var}]"),
            Condition::HasSelfDestructed => write!(f, "hasSelfDestructed"),
            Condition::HasNotSelfDestructed => write!(f, "!hasSelfDestructed"),
            Condition::InRange256FromCurrentBlock(var) => write!(f, "inRange256[{var}]"),
            Condition::OutOfRange256FromCurrentBlock(var) => write!(f, "outOfRange256[{var}]"),
            Condition::HasBlobHash(var) => write!(f, "hasBlobHash[{var}]"),
            Condition::HasNoBlobHash(var) => write!(f, "!hasBlobHash[{var}]"),
            Condition::Custom(custom) => write!(f, "{}", custom.label),
        }
    }
}

fn rel_ord<T: PartialOrd>(rel: RelKind, actual: T, expected: T) -> bool {
    match rel {
        RelKind::Eq => actual == expected,
        RelKind::Lt => actual < expected,
        RelKind::Le => actual <= expected,
        RelKind::Gt => actual > expected,
        RelKind::Ge => actual >= expected,
    }
}

fn restrict_rel<T, E>(gen: &mut StateGenerator, expr: &E, rel: RelKind, value: T) -> Result<(), ExprError>
where
    E: Expression<T>,
    T: Copy,
{
    match rel {
        RelKind::Eq => expr.restrict(gen, RestrictKind::Eq, value),
        RelKind::Lt => expr.restrict(gen, RestrictKind::Lt, value),
        RelKind::Le => expr.restrict(gen, RestrictKind::Le, value),
        RelKind::Gt => expr.restrict(gen, RestrictKind::Gt, value),
        RelKind::Ge => expr.restrict(gen, RestrictKind::Ge, value),
    }
}

fn op_at(var: &Var, state: &VmState, b: &Bindings) -> Option<u8> {
    if var.0 == "pc" {
        return state.current_opcode();
    }
    pos_for_var(var, state, b).and_then(|pos| state.code.opcode_at(pos))
}

fn pos_of(var: &Var, state: &VmState, b: &Bindings) -> Option<u16> {
    if var.0 == "pc" {
        return Some(state.pc);
    }
    pos_for_var(var, state, b)
}

fn pos_for_var(var: &Var, _state: &VmState, b: &Bindings) -> Option<u16> {
    b.get(var).map(|v| v.low_u64() as u16)
}

fn key_of(var: &Var, b: &Bindings) -> Option<U256> {
    b.get(var).copied()
}

fn address_of(var: &Var, b: &Bindings) -> Option<Address> {
    b.get(var).map(|v| {
        let bytes = v.to_big_endian();
        Address::from_slice(&bytes[12..32])
    })
}

fn block_number_of(var: &Var, b: &Bindings) -> Option<u64> {
    b.get(var).map(|v| v.low_u64())
}

fn blob_index_of(var: &Var, b: &Bindings) -> Option<usize> {
    b.get(var).map(|v| v.low_u64() as usize % 64)
}

/// An opcode byte guaranteed different from `opcode`, used to realize
/// `OpNe`'s boundary probes and generator restriction.
fn substitute_opcode(opcode: u8) -> u8 {
    if opcode == 0x00 { 0x01 } else { 0x00 }
}

fn num_value<T>(property: Property, v: T, set: impl Fn(&mut StateGenerator, T) + Copy + Send + Sync + 'static) -> TestValue
where
    T: fmt::Display + Send + Sync + 'static,
{
    let label = v.to_string();
    TestValue::new(property, label, move |g| set(g, v))
}

fn i64_neighbors(property: Property, v: i64, set: impl Fn(&mut StateGenerator, i64) + Copy + Send + Sync + 'static) -> Vec<TestValue> {
    [v.saturating_sub(1), v, v.saturating_add(1), 0, i64::MAX]
        .into_iter()
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .map(|x| num_value(property.clone(), x, set))
        .collect()
}

fn usize_neighbors(
    property: Property,
    v: usize,
    set: impl Fn(&mut StateGenerator, usize) + Copy + Send + Sync + 'static,
) -> Vec<TestValue> {
    [v.saturating_sub(1), v, v.saturating_add(1), 0, crate::state::MAX_STACK_SIZE]
        .into_iter()
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .map(|x| num_value(property.clone(), x, set))
        .collect()
}

fn bool_values(property: Property, set: impl Fn(&mut StateGenerator, bool) + Copy + Send + Sync + 'static) -> Vec<TestValue> {
    vec![
        TestValue::new(property.clone(), "true", move |g| set(g, true)),
        TestValue::new(property, "false", move |g| set(g, false)),
    ]
}

fn bound_bool_values(
    property: Property,
    var: &Var,
    apply: impl Fn(&mut StateGenerator, Var, bool) + Copy + Send + Sync + 'static,
) -> Vec<TestValue> {
    let v1 = var.clone();
    let v2 = var.clone();
    vec![
        TestValue::new(property.clone(), "true", move |g| apply(g, v1.clone(), true)),
        TestValue::new(property, "false", move |g| apply(g, v2.clone(), false)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Code;

    #[test]
    fn conjunction_flattens_nested_all() {
        let c = Condition::all([
            Condition::all([Condition::Gas(RelKind::Ge, 0), Condition::True]),
            Condition::ReadOnly(false),
        ]);
        match c {
            Condition::All(parts) => assert_eq!(parts.len(), 2),
            _ => panic!("expected All"),
        }
    }

    #[test]
    fn empty_conjunction_is_true() {
        assert!(matches!(Condition::all([]), Condition::True));
    }

    #[test]
    fn status_condition_checks_state() {
        let mut state = VmState::new(Code::new(vec![]));
        state.status = Status::Failed;
        assert!(Condition::Status(Status::Failed).check(&state).unwrap());
        assert!(!Condition::Status(Status::Running).check(&state).unwrap());
    }

    #[test]
    fn any_known_revision_excludes_unknown_next() {
        let mut state = VmState::new(Code::new(vec![]));
        state.revision = Revision::R99UnknownNext;
        assert!(!Condition::AnyKnownRevision.check(&state).unwrap());
        state.revision = Revision::R13Cancun;
        assert!(Condition::AnyKnownRevision.check(&state).unwrap());
    }

    #[test]
    fn param_bind_resolves_is_code_against_the_bound_position() {
        let var = Var::new("dest");
        let mut code = vec![0u8; 8];
        code[3] = 0x5b; // JUMPDEST
        let mut state = VmState::new(Code::new(code));
        state.push(U256::from(3));
        let cond = Condition::all([Condition::ParamBind(0, var.clone()), Condition::IsCode(var.clone())]);
        assert!(cond.check(&state).unwrap());
    }
}
