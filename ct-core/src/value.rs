//! 256-bit word arithmetic used by the rules compendium's effect functions.
//!
//! The concrete 256-bit integer library is an external collaborator (per
//! spec.md §1), so this module is a thin set of free functions over
//! `ethereum_types::U256` rather than a reimplementation -- the same split
//! the teacher keeps between its opcode handlers and `ethereum_types`/
//! `ethereum-types`.

pub use ethereum_types::{Address, H256, U256, U512};

/// Interesting constants used both by effect functions and by
/// [`crate::domain::U256Domain::samples_for_all`].
pub mod constants {
    use super::U256;

    pub fn pow2(bits: u32) -> U256 {
        if bits >= 256 {
            U256::zero()
        } else {
            U256::one() << bits
        }
    }
}

/// Two's-complement sign bit test, matching the teacher's
/// `opcode_handlers/arithmetic.rs::is_negative`.
#[inline]
pub fn is_negative(value: U256) -> bool {
    value.bit(255)
}

/// Two's-complement negation, matching the teacher's `negate`.
#[inline]
pub fn negate(value: U256) -> U256 {
    (!value).overflowing_add(U256::one()).0
}

#[inline]
pub fn abs(value: U256) -> U256 {
    if is_negative(value) { negate(value) } else { value }
}

#[inline]
pub fn wrapping_add(a: U256, b: U256) -> U256 {
    a.overflowing_add(b).0
}

#[inline]
pub fn wrapping_sub(a: U256, b: U256) -> U256 {
    a.overflowing_sub(b).0
}

#[inline]
pub fn wrapping_mul(a: U256, b: U256) -> U256 {
    a.overflowing_mul(b).0
}

#[inline]
pub fn checked_div(a: U256, b: U256) -> U256 {
    a.checked_div(b).unwrap_or_default()
}

#[inline]
pub fn checked_rem(a: U256, b: U256) -> U256 {
    a.checked_rem(b).unwrap_or_default()
}

pub fn signed_div(dividend: U256, divisor: U256) -> U256 {
    if divisor.is_zero() || dividend.is_zero() {
        return U256::zero();
    }
    let abs_dividend = abs(dividend);
    let abs_divisor = abs(divisor);
    match abs_dividend.checked_div(abs_divisor) {
        Some(quot) => {
            let negative = is_negative(dividend) ^ is_negative(divisor);
            if negative { negate(quot) } else { quot }
        }
        None => U256::zero(),
    }
}

pub fn signed_rem(dividend: U256, divisor: U256) -> U256 {
    if divisor.is_zero() || dividend.is_zero() {
        return U256::zero();
    }
    let abs_dividend = abs(dividend);
    let abs_divisor = abs(divisor);
    match abs_dividend.checked_rem(abs_divisor) {
        Some(rem) => {
            if is_negative(dividend) { negate(rem) } else { rem }
        }
        None => U256::zero(),
    }
}

pub fn addmod(a: U256, b: U256, modulus: U256) -> U256 {
    if modulus.is_zero() {
        return U256::zero();
    }
    let sum: U512 = U512::from(a) + U512::from(b);
    let result = sum % U512::from(modulus);
    U256::try_from(result).unwrap_or_default()
}

pub fn mulmod(a: U256, b: U256, modulus: U256) -> U256 {
    if modulus.is_zero() {
        return U256::zero();
    }
    let product = a.full_mul(b);
    let result = product % U512::from(modulus);
    U256::try_from(result).unwrap_or_default()
}

pub fn exp(base: U256, exponent: U256) -> U256 {
    base.overflowing_pow(exponent).0
}

pub fn signextend(byte_size_minus_one: U256, value: U256) -> U256 {
    if byte_size_minus_one > U256::from(31) {
        return value;
    }
    let byte_index = byte_size_minus_one.low_u32();
    let sign_bit_index = byte_index * 8 + 7;
    let sign_bit = (value >> sign_bit_index) & U256::one();
    let mask = (U256::one() << sign_bit_index) - U256::one();
    if sign_bit.is_zero() { value & mask } else { value | !mask }
}

pub fn byte_at(index: U256, value: U256) -> U256 {
    if index >= U256::from(32) {
        return U256::zero();
    }
    let i = index.low_u32();
    // Byte 0 is the most significant byte, matching EVM's BYTE semantics.
    let shift = 248u32.saturating_sub(i * 8);
    (value >> shift) & U256::from(0xffu64)
}

pub fn shl(shift: U256, value: U256) -> U256 {
    if shift >= U256::from(256) { U256::zero() } else { value << shift.low_u32() }
}

pub fn shr(shift: U256, value: U256) -> U256 {
    if shift >= U256::from(256) { U256::zero() } else { value >> shift.low_u32() }
}

pub fn sar(shift: U256, value: U256) -> U256 {
    let negative = is_negative(value);
    if shift >= U256::from(256) {
        return if negative { U256::MAX } else { U256::zero() };
    }
    let shift = shift.low_u32();
    if !negative {
        value >> shift
    } else if shift == 0 {
        value
    } else {
        let shifted = value >> shift;
        let mask = U256::MAX << (256u32.saturating_sub(shift));
        shifted | mask
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sar_preserves_sign_of_negative_one() {
        assert_eq!(sar(U256::from(4), negate(U256::one())), U256::MAX);
    }

    #[test]
    fn addmod_wraps_through_512_bits() {
        let max = U256::MAX;
        let expected: U256 = ((U512::from(max) + U512::from(max)) % U512::from(7u64)).try_into().unwrap_or_default();
        assert_eq!(addmod(max, max, U256::from(7)), expected);
    }

    #[test]
    fn signed_div_by_zero_is_zero() {
        assert_eq!(signed_div(U256::from(10), U256::zero()), U256::zero());
    }

    #[test]
    fn byte_extracts_most_significant_first() {
        let value = U256::from(0x1122u64);
        assert_eq!(byte_at(U256::from(31), value), U256::from(0x22u64));
        assert_eq!(byte_at(U256::from(30), value), U256::from(0x11u64));
    }
}
