use std::fmt::{Display, Formatter};
use std::ops::Neg;

/// Handle to a BDD node, possibly complemented.
///
/// The sign carries the complement bit, the magnitude is the node index.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Ref(i32);

impl Ref {
    pub const fn positive(index: u32) -> Self {
        Self(index as i32)
    }

    pub const fn is_negated(self) -> bool {
        self.0 < 0
    }

    pub const fn negate(self) -> Self {
        Self(-self.0)
    }

    /// Return the index of the referenced node.
    pub const fn index(self) -> u32 {
        self.0.unsigned_abs()
    }

    /// Return the non-complemented reference to the same node.
    pub const fn regular(self) -> Self {
        Self(self.0.abs())
    }
}

impl Neg for Ref {
    type Output = Self;

    fn neg(self) -> Self::Output {
        self.negate()
    }
}

impl Display for Ref {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}@{}",
            if self.is_negated() { "~" } else { "" },
            self.index()
        )
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn test_negation_roundtrip() {
        let r = Ref::positive(7);
        assert!(!r.is_negated());
        assert!((-r).is_negated());
        assert_eq!(-(-r), r);
        assert_eq!((-r).index(), 7);
        assert_eq!((-r).regular(), r);
    }

    #[test]
    fn test_display() {
        assert_eq!(Ref::positive(3).to_string(), "@3");
        assert_eq!((-Ref::positive(3)).to_string(), "~@3");
    }
}
