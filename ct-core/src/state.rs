//! The VM state data model (spec.md §3) plus the ambient sub-struct split
//! noted in SPEC_FULL.md §2 — a flat `VmState` for the spec's purposes,
//! internally factored into `CallContext`/`BlockContext`/`Storage`/
//! `Accounts`, mirroring the teacher's `Environment`/`Substate`/`CallFrame`
//! split in `vm.rs` without actually depending on call-frame semantics this
//! engine never models (no nested calls).

use bitvec::prelude::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::value::{Address, H256, U256};

pub const MAX_STACK_SIZE: usize = 1024;

/// Terminal vs. active execution status.
///
/// `Returned` is kept distinct from `Stopped` per the resolution recorded in
/// SPEC_FULL.md §6 item 1: both are terminal-success, but `RETURN` produced
/// output bytes and `STOP` did not, and some rules care which happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Running,
    Stopped,
    Returned,
    Reverted,
    Failed,
}

impl Status {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Status::Running)
    }
}

/// A named version of the instruction-set semantics.
///
/// Ordered oldest-to-newest for the known revisions; `R_99_UnknownNext`
/// compares unordered to all of them and is handled specially by
/// [`crate::domain::RevisionDomain`], whose predecessor/successor forms a
/// cycle back to the oldest/newest known revision (spec.md §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Revision {
    R07Istanbul,
    R09Berlin,
    R10London,
    R11Paris,
    R12Shanghai,
    R13Cancun,
    R99UnknownNext,
}

impl Revision {
    pub const KNOWN: [Revision; 6] = [
        Revision::R07Istanbul,
        Revision::R09Berlin,
        Revision::R10London,
        Revision::R11Paris,
        Revision::R12Shanghai,
        Revision::R13Cancun,
    ];

    pub fn is_known(self) -> bool {
        self != Revision::R99UnknownNext
    }

    pub fn oldest_known() -> Revision {
        Revision::R07Istanbul
    }

    pub fn newest_known() -> Revision {
        Revision::R13Cancun
    }

    /// EIP-2929 access lists only exist from Berlin onward.
    pub fn has_access_lists(self) -> bool {
        self >= Revision::R09Berlin
    }

    /// BASEFEE and EIP-1559 semantics gate at London.
    pub fn has_base_fee(self) -> bool {
        self >= Revision::R10London
    }

    /// EIP-1153 transient storage and EIP-4844 blob fields gate at Cancun.
    pub fn has_cancun_features(self) -> bool {
        self >= Revision::R13Cancun
    }
}

/// Immutable code plus a precomputed code/data bitmap (the same kind of
/// precomputation the teacher's JUMPDEST validity table avoids recomputing
/// per `IsCode`/`IsData` check).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Code {
    #[serde(with = "hex_bytes")]
    bytes: Vec<u8>,
    #[serde(skip)]
    data_bitmap: BitVec,
}

impl Code {
    pub fn new(bytes: Vec<u8>) -> Self {
        let data_bitmap = compute_data_bitmap(&bytes);
        Self { bytes, data_bitmap }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn opcode_at(&self, pc: u16) -> Option<u8> {
        self.bytes.get(pc as usize).copied()
    }

    /// Out-of-bounds positions are considered code, never data (spec.md §3).
    pub fn is_code(&self, pos: u16) -> bool {
        !self.is_data(pos)
    }

    pub fn is_data(&self, pos: u16) -> bool {
        let idx = pos as usize;
        idx < self.bytes.len() && self.data_bitmap.get(idx).map(|b| *b).unwrap_or(false)
    }
}

/// Rebuilds the bitmap on deserialize, since we don't serialize it directly.
mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        hex::encode(bytes).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        hex::decode(s.trim_start_matches("0x")).map_err(serde::de::Error::custom)
    }
}

/// Marks immediate-operand bytes (PUSH1..PUSH32) as data; everything else
/// (including the PUSH opcode itself) is code.
fn compute_data_bitmap(bytes: &[u8]) -> BitVec {
    const PUSH1: u8 = 0x60;
    const PUSH32: u8 = 0x7f;
    let mut bitmap = bitvec![0; bytes.len()];
    let mut i = 0;
    while i < bytes.len() {
        let op = bytes[i];
        if (PUSH1..=PUSH32).contains(&op) {
            let width = (op - PUSH1 + 1) as usize;
            let data_start = i + 1;
            let data_end = (data_start + width).min(bytes.len());
            bitmap[data_start..data_end].fill(true);
            i = data_end;
        } else {
            i += 1;
        }
    }
    bitmap
}

/// The EIP-2200 nine-way classification of a storage write, determined by
/// `(original, current, new)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageConfigClass {
    Assigned,
    Added,
    AddedDeleted,
    DeletedRestored,
    DeletedAdded,
    Deleted,
    Modified,
    ModifiedDeleted,
    ModifiedRestored,
}

impl StorageConfigClass {
    pub fn classify(original: U256, current: U256, new: U256) -> StorageConfigClass {
        use StorageConfigClass::*;
        let zero = U256::zero();
        if current == new {
            return Assigned;
        }
        if original == current {
            // current == original: first write this transaction.
            if original.is_zero() {
                Added
            } else if new.is_zero() {
                Deleted
            } else {
                Modified
            }
        } else {
            // Already written this transaction (current != original).
            if original.is_zero() {
                // original was zero: Added, then re-touched.
                if new.is_zero() { AddedDeleted } else { Assigned }
            } else if current.is_zero() {
                // was deleted this transaction, now written again.
                if new == original { DeletedRestored } else { DeletedAdded }
            } else if new.is_zero() {
                ModifiedDeleted
            } else if new == original {
                ModifiedRestored
            } else {
                let _ = zero;
                Modified
            }
        }
    }

    pub const ALL: [StorageConfigClass; 9] = [
        StorageConfigClass::Assigned,
        StorageConfigClass::Added,
        StorageConfigClass::AddedDeleted,
        StorageConfigClass::DeletedRestored,
        StorageConfigClass::DeletedAdded,
        StorageConfigClass::Deleted,
        StorageConfigClass::Modified,
        StorageConfigClass::ModifiedDeleted,
        StorageConfigClass::ModifiedRestored,
    ];
}

/// `(original, current, warm)` for one storage key; zero values and cold
/// warmth are implicit when a key is absent from [`Storage`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSlot {
    pub original: U256,
    pub current: U256,
    pub warm: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Storage {
    slots: FxHashMap<U256, StorageSlot>,
}

impl Storage {
    pub fn get(&self, key: U256) -> StorageSlot {
        self.slots.get(&key).copied().unwrap_or_default()
    }

    pub fn set(&mut self, key: U256, slot: StorageSlot) {
        self.slots.insert(key, slot);
    }

    pub fn is_warm(&self, key: U256) -> bool {
        self.slots.get(&key).map(|s| s.warm).unwrap_or(false)
    }

    pub fn mark_warm(&mut self, key: U256) {
        self.slots.entry(key).or_default().warm = true;
    }

    pub fn iter(&self) -> impl Iterator<Item = (&U256, &StorageSlot)> {
        self.slots.iter()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransientStorage {
    slots: FxHashMap<U256, U256>,
}

impl TransientStorage {
    pub fn get(&self, key: U256) -> U256 {
        self.slots.get(&key).copied().unwrap_or_default()
    }

    pub fn set(&mut self, key: U256, value: U256) {
        if value.is_zero() {
            self.slots.remove(&key);
        } else {
            self.slots.insert(key, value);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub balance: U256,
    #[serde(with = "hex_bytes")]
    pub code: Vec<u8>,
    /// Precomputed by the generator rather than hashed on demand by
    /// `EXTCODEHASH`'s effect -- the engine checks an implementation's
    /// answer against this value, it does not derive it (spec.md §1 keeps
    /// cryptographic primitives an external collaborator).
    pub code_hash: H256,
    pub warm: bool,
    pub empty: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Accounts {
    entries: FxHashMap<Address, Account>,
}

impl Accounts {
    pub fn get(&self, address: Address) -> Account {
        self.entries.get(&address).cloned().unwrap_or(Account {
            empty: true,
            ..Default::default()
        })
    }

    pub fn set(&mut self, address: Address, account: Account) {
        self.entries.insert(address, account);
    }

    pub fn is_warm(&self, address: Address) -> bool {
        self.entries.get(&address).map(|a| a.warm).unwrap_or(false)
    }

    pub fn mark_warm(&mut self, address: Address) {
        self.entries.entry(address).or_default().warm = true;
    }

    pub fn is_empty_account(&self, address: Address) -> bool {
        self.entries.get(&address).map(|a| a.empty).unwrap_or(true)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
    pub topics: Vec<H256>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallContext {
    pub caller: Address,
    pub origin: Address,
    pub callee: Address,
    pub value: U256,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockContext {
    pub block_number: u64,
    pub timestamp: u64,
    pub coinbase: Address,
    pub gas_limit: u64,
    pub difficulty: U256,
    pub base_fee: U256,
    pub chain_id: U256,
}

impl Default for BlockContext {
    fn default() -> Self {
        Self {
            block_number: 0,
            timestamp: 0,
            coinbase: Address::zero(),
            gas_limit: 30_000_000,
            difficulty: U256::zero(),
            base_fee: U256::zero(),
            chain_id: U256::one(),
        }
    }
}

/// Upper bound the generator honors for `gas` (SPEC_FULL.md §6 default: no
/// original-language source survived retrieval to supply one, so this is an
/// authorial default, recorded in DESIGN.md).
pub const MAX_GAS_USED_BY_CT: i64 = 10_000_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmState {
    pub status: Status,
    pub revision: Revision,
    pub read_only: bool,
    pub pc: u16,
    pub gas: i64,
    pub gas_refund: i64,
    pub code: Code,
    pub stack: Vec<U256>,
    pub memory: Vec<u8>,
    pub storage: Storage,
    pub transient_storage: TransientStorage,
    pub accounts: Accounts,
    pub logs: Vec<Log>,
    pub call_context: CallContext,
    pub block_context: BlockContext,
    pub has_self_destructed: bool,
    pub self_destructed_journal: Vec<Address>,
    pub recent_block_hashes: FxHashMap<u64, H256>,
    pub blob_hashes: Vec<H256>,
}

impl VmState {
    pub fn new(code: Code) -> Self {
        Self {
            status: Status::Running,
            revision: Revision::R13Cancun,
            read_only: false,
            pc: 0,
            gas: MAX_GAS_USED_BY_CT,
            gas_refund: 0,
            code,
            stack: Vec::new(),
            memory: Vec::new(),
            storage: Storage::default(),
            transient_storage: TransientStorage::default(),
            accounts: Accounts::default(),
            logs: Vec::new(),
            call_context: CallContext::default(),
            block_context: BlockContext::default(),
            has_self_destructed: false,
            self_destructed_journal: Vec::new(),
            recent_block_hashes: FxHashMap::default(),
            blob_hashes: Vec::new(),
        }
    }

    pub fn current_opcode(&self) -> Option<u8> {
        if self.code.is_data(self.pc) {
            None
        } else {
            self.code.opcode_at(self.pc)
        }
    }

    pub fn stack_size(&self) -> usize {
        self.stack.len()
    }

    /// Top is index 0, matching `Param(i)`'s spec.md §4.2 semantics.
    pub fn stack_param(&self, i: usize) -> Option<U256> {
        let len = self.stack.len();
        if i >= len {
            None
        } else {
            Some(self.stack[len - 1 - i])
        }
    }

    pub fn push(&mut self, value: U256) {
        self.stack.push(value);
    }

    pub fn pop(&mut self) -> Option<U256> {
        self.stack.pop()
    }

    /// Holds iff `bottom <= n < block_number` with `bottom = max(0,
    /// block_number - 256)` (spec.md §4.3).
    pub fn in_range_256_from_current_block(&self, n: u64) -> bool {
        let block_number = self.block_context.block_number;
        let bottom = block_number.saturating_sub(256);
        n >= bottom && n < block_number
    }

    pub fn fail(&mut self) {
        self.status = Status::Failed;
        self.gas = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push1_immediate_is_data() {
        let code = Code::new(vec![0x60, 0xAB, 0x00]);
        assert!(code.is_code(0));
        assert!(code.is_data(1));
        assert!(code.is_code(2));
    }

    #[test]
    fn out_of_bounds_position_is_code() {
        let code = Code::new(vec![0x00]);
        assert!(code.is_code(50));
        assert!(!code.is_data(50));
    }

    #[test]
    fn in_range_256_boundary() {
        let mut state = VmState::new(Code::new(vec![]));
        state.block_context.block_number = 1000;
        assert!(state.in_range_256_from_current_block(900));
        assert!(!state.in_range_256_from_current_block(1000));
        assert!(!state.in_range_256_from_current_block(1001));
        assert!(!state.in_range_256_from_current_block(743));
        assert!(state.in_range_256_from_current_block(744));
    }

    #[test]
    fn param_indexes_from_top_of_stack() {
        let mut state = VmState::new(Code::new(vec![]));
        state.push(U256::from(1));
        state.push(U256::from(2));
        state.push(U256::from(3));
        assert_eq!(state.stack_param(0), Some(U256::from(3)));
        assert_eq!(state.stack_param(2), Some(U256::from(1)));
        assert_eq!(state.stack_param(3), None);
    }
}
