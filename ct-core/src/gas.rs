//! Static and dynamic gas cost tables for the rules compendium (spec.md
//! §4.5). Grounded on the teacher's `gas_cost`/`memory::expansion_cost`
//! split: a constant base cost per opcode plus a handful of dynamic
//! surcharges (memory expansion, EXP's per-byte exponent cost, LOGn's
//! per-byte data cost, cold/warm access surcharges).

use crate::opcode::Opcode;
use crate::value::U256;

/// Quadratic memory-expansion coefficient divisor, matching the teacher's
/// `MEMORY_EXPANSION_QUOTIENT`.
pub const MEMORY_EXPANSION_QUOTIENT: u64 = 512;

/// EIP-2929 cold/warm surcharges.
pub const COLD_ACCOUNT_ACCESS_COST: i64 = 2600;
pub const WARM_ACCESS_COST: i64 = 100;
pub const COLD_SLOAD_COST: i64 = 2100;

/// Base (static) gas cost charged before any dynamic surcharge, for the
/// instructions this engine specifies rules for. Storage opcodes (SLOAD,
/// SSTORE) are revision/warmth-gated and handled entirely by their own
/// bespoke rule families in `rules.rs`, not through this table.
pub fn static_gas(op: Opcode) -> i64 {
    use Opcode::*;
    match op {
        Stop | Return | Revert | Invalid => 0,
        Add | Sub | Lt | Gt | Slt | Sgt | Eq | Iszero | And | Or | Xor | Not | Byte | Shl | Shr
        | Sar | Pop => 3,
        Mul | Div | Sdiv | Mod | Smod | Signextend => 5,
        Addmod | Mulmod | Jump => 8,
        Jumpi => 10,
        Exp => 10,
        Sha3 => 30,
        Address | Origin | Caller | Callvalue | Codesize | Gasprice | Coinbase | Timestamp
        | Number | Difficulty | Gaslimit | Chainid | Basefee | Blobbasefee | Pc | Msize | Gas
        | Jumpdest | Blobhash => 2,
        Selfbalance => 5,
        Balance | Extcodesize | Extcodehash => COLD_ACCOUNT_ACCESS_COST,
        Codecopy | Mload | Mstore | Mstore8 => 3,
        Extcodecopy => COLD_ACCOUNT_ACCESS_COST,
        Blockhash => 20,
        Tload | Tstore => 100,
        Sload | Sstore => 0, // fully bespoke, see rules::storage
        op if matches!(op.as_byte(), 0x60..=0x7f) => 3, // PUSH1..PUSH32
        op if matches!(op.as_byte(), 0x80..=0x8f) => 3, // DUP1..DUP16
        op if matches!(op.as_byte(), 0x90..=0x9f) => 3, // SWAP1..SWAP16
        Log0 => 375,
        Log1 => 375 * 2,
        Log2 => 375 * 3,
        Log3 => 375 * 4,
        Log4 => 375 * 5,
    }
}

/// The per-32-byte-word cost of growing memory to `new_size` bytes, given
/// it is currently `current_size` bytes, matching the teacher's
/// `Memory::expansion_cost` exactly (only the delta is charged).
pub fn memory_expansion_cost(new_size: u64, current_size: u64) -> i64 {
    if new_size <= current_size {
        return 0;
    }
    (word_cost(new_size) - word_cost(current_size)) as i64
}

fn word_cost(size: u64) -> u64 {
    let words = size.div_ceil(32);
    words * words / MEMORY_EXPANSION_QUOTIENT + 3 * words
}

/// EXP's dynamic surcharge: 50 gas per non-zero byte of the exponent
/// (spec.md §4.5).
pub fn exp_dynamic_gas(exponent: U256) -> i64 {
    50 * significant_bytes(exponent) as i64
}

fn significant_bytes(value: U256) -> u32 {
    let bits = value.bits();
    bits.div_ceil(8) as u32
}

/// LOGn's dynamic per-byte cost on top of the `375 * (1 + topics)` base
/// already folded into [`static_gas`].
pub fn log_data_cost(data_len: usize) -> i64 {
    8 * data_len as i64
}

/// CODECOPY/EXTCODECOPY's dynamic per-word copy cost on top of the 3-gas
/// base already folded into [`static_gas`].
pub fn copy_word_cost(len: usize) -> i64 {
    3 * (len as u64).div_ceil(32) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_expansion_only_charges_the_delta() {
        let full = memory_expansion_cost(64, 0);
        let half = memory_expansion_cost(32, 0);
        let rest = memory_expansion_cost(64, 32);
        assert_eq!(half + rest, full);
    }

    #[test]
    fn no_expansion_when_shrinking_or_equal() {
        assert_eq!(memory_expansion_cost(32, 64), 0);
        assert_eq!(memory_expansion_cost(32, 32), 0);
    }

    #[test]
    fn exp_charges_per_significant_byte() {
        assert_eq!(exp_dynamic_gas(U256::zero()), 0);
        assert_eq!(exp_dynamic_gas(U256::from(255)), 50);
        assert_eq!(exp_dynamic_gas(U256::from(256)), 100);
    }
}
