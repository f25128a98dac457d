//! Fixed-width two's-complement arithmetic over BDD bits.

use crate::bdd::Bdd;
use crate::reference::Ref;

/// A vector of BDD functions, one per bit, least significant bit first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitVector {
    bits: Vec<Ref>,
}

impl BitVector {
    pub fn from_bits(bits: Vec<Ref>) -> Self {
        assert!(!bits.is_empty(), "Bit-vector must have at least one bit");
        Self { bits }
    }

    pub fn bits(&self) -> &[Ref] {
        &self.bits
    }

    pub fn width(&self) -> usize {
        self.bits.len()
    }

    pub fn constant(bdd: &Bdd, value: i64, width: u32) -> Self {
        let bits = (0..width)
            .map(|i| if (value >> i.min(63)) & 1 == 1 { bdd.one } else { bdd.zero })
            .collect();
        Self::from_bits(bits)
    }

    fn check_width(&self, other: &BitVector) {
        assert_eq!(self.width(), other.width(), "Bit-vector width mismatch");
    }

    pub fn add(&self, bdd: &Bdd, other: &BitVector) -> BitVector {
        self.check_width(other);
        let mut carry = bdd.zero;
        let mut bits = Vec::with_capacity(self.width());
        for (&a, &b) in self.bits.iter().zip(&other.bits) {
            let half = bdd.apply_xor(a, b);
            bits.push(bdd.apply_xor(half, carry));
            // Majority of (a, b, carry).
            carry = bdd.apply_or(bdd.apply_and(a, b), bdd.apply_and(carry, half));
        }
        BitVector::from_bits(bits)
    }

    pub fn not(&self, bdd: &Bdd) -> BitVector {
        BitVector::from_bits(self.bits.iter().map(|&b| bdd.apply_not(b)).collect())
    }

    pub fn neg(&self, bdd: &Bdd) -> BitVector {
        let one = BitVector::constant(bdd, 1, self.width() as u32);
        self.not(bdd).add(bdd, &one)
    }

    pub fn sub(&self, bdd: &Bdd, other: &BitVector) -> BitVector {
        self.add(bdd, &other.neg(bdd))
    }

    /// Shift-and-add multiplication, truncated to the operand width.
    pub fn mul(&self, bdd: &Bdd, other: &BitVector) -> BitVector {
        self.check_width(other);
        let width = self.width();
        let mut acc = BitVector::constant(bdd, 0, width as u32);
        for (i, &b) in other.bits.iter().enumerate() {
            if bdd.is_zero(b) {
                continue;
            }
            let partial = (0..width)
                .map(|j| if j < i { bdd.zero } else { bdd.apply_and(self.bits[j - i], b) })
                .collect();
            acc = acc.add(bdd, &BitVector::from_bits(partial));
        }
        acc
    }

    pub fn equals(&self, bdd: &Bdd, other: &BitVector) -> Ref {
        self.check_width(other);
        bdd.apply_and_many(self.bits.iter().zip(&other.bits).map(|(&a, &b)| bdd.apply_eq(a, b)))
    }

    /// Signed `self < other`.
    pub fn signed_lt(&self, bdd: &Bdd, other: &BitVector) -> Ref {
        self.check_width(other);
        let msb = self.width() - 1;
        // Unsigned comparison of the low bits: the highest differing bit decides.
        let mut lt = bdd.zero;
        for i in 0..msb {
            let (a, b) = (self.bits[i], other.bits[i]);
            lt = bdd.apply_ite(bdd.apply_xor(a, b), b, lt);
        }
        // Differing sign bits: the negative operand is smaller.
        let (a, b) = (self.bits[msb], other.bits[msb]);
        bdd.apply_ite(bdd.apply_xor(a, b), a, lt)
    }

    /// Signed `self <= other`.
    pub fn signed_le(&self, bdd: &Bdd, other: &BitVector) -> Ref {
        bdd.apply_not(other.signed_lt(bdd, self))
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::formula::wrap_to_width;

    const WIDTH: u32 = 4;

    fn all_values() -> impl Iterator<Item = i64> {
        -(1 << (WIDTH - 1))..(1 << (WIDTH - 1))
    }

    fn value_of(bdd: &Bdd, bv: &BitVector) -> i64 {
        let mut value = 0i64;
        for (i, &bit) in bv.bits().iter().enumerate() {
            assert!(bdd.is_terminal(bit));
            if bdd.is_one(bit) {
                value |= 1 << i;
            }
        }
        wrap_to_width(value, WIDTH)
    }

    #[test]
    fn test_constant() {
        let bdd = Bdd::default();
        for v in all_values() {
            assert_eq!(value_of(&bdd, &BitVector::constant(&bdd, v, WIDTH)), v);
        }
    }

    #[test]
    fn test_arithmetic_on_constants() {
        let bdd = Bdd::default();
        for a in all_values() {
            for b in all_values() {
                let x = BitVector::constant(&bdd, a, WIDTH);
                let y = BitVector::constant(&bdd, b, WIDTH);
                assert_eq!(value_of(&bdd, &x.add(&bdd, &y)), wrap_to_width(a + b, WIDTH));
                assert_eq!(value_of(&bdd, &x.sub(&bdd, &y)), wrap_to_width(a - b, WIDTH));
                assert_eq!(value_of(&bdd, &x.mul(&bdd, &y)), wrap_to_width(a * b, WIDTH));
                assert_eq!(bdd.is_one(x.signed_lt(&bdd, &y)), a < b);
                assert_eq!(bdd.is_one(x.signed_le(&bdd, &y)), a <= b);
                assert_eq!(bdd.is_one(x.equals(&bdd, &y)), a == b);
            }
            let x = BitVector::constant(&bdd, a, WIDTH);
            assert_eq!(value_of(&bdd, &x.neg(&bdd)), wrap_to_width(-a, WIDTH));
        }
    }

    #[test]
    fn test_symbolic_comparison() {
        let bdd = Bdd::default();
        let x = BitVector::from_bits((1..=WIDTH).rev().map(|v| bdd.mk_var(v)).collect());
        let zero = BitVector::constant(&bdd, 0, WIDTH);
        // x < 0 iff the sign bit is set.
        let negative = x.signed_lt(&bdd, &zero);
        assert_eq!(negative, x.bits()[WIDTH as usize - 1]);
        // x <= x is valid.
        assert!(bdd.is_one(x.signed_le(&bdd, &x)));
    }
}
