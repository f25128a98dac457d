//! Core abstract domain trait and the flat lattice.

use std::fmt::Debug;
use std::marker::PhantomData;

/// Abstract domain interface.
///
/// An abstract domain represents a lattice structure used for
/// approximating program states.
///
/// # Lattice Properties
///
/// An abstract domain must satisfy:
/// - Reflexivity: `∀a. a ⊑ a`
/// - Transitivity: `∀a,b,c. a ⊑ b ∧ b ⊑ c ⇒ a ⊑ c`
/// - Join is the least upper bound: commutative, idempotent, associative up to equivalence
/// - `⊥ ⊑ a ⊑ ⊤` for every `a`
pub trait AbstractDomain: Clone + Debug {
    /// The type representing abstract elements.
    type Element: Clone + Debug + PartialEq;

    /// Create the bottom element (⊥): represents the empty set.
    fn bottom(&self) -> Self::Element;

    /// Create the top element (⊤): represents all possible states.
    fn top(&self) -> Self::Element;

    fn is_bottom(&self, elem: &Self::Element) -> bool;

    fn is_top(&self, elem: &Self::Element) -> bool;

    /// Partial order: `elem1 ⊑ elem2` (elem1 is more precise than elem2).
    fn le(&self, elem1: &Self::Element, elem2: &Self::Element) -> bool;

    /// Join (`⊔`): least upper bound, over-approximation.
    fn join(&self, elem1: &Self::Element, elem2: &Self::Element) -> Self::Element;

    /// Meet (`⊓`): greatest lower bound.
    fn meet(&self, elem1: &Self::Element, elem2: &Self::Element) -> Self::Element;

    /// Check equality of abstract elements.
    fn eq(&self, elem1: &Self::Element, elem2: &Self::Element) -> bool {
        self.le(elem1, elem2) && self.le(elem2, elem1)
    }

    /// Join multiple elements.
    fn join_many<'a, I>(&self, elems: I) -> Self::Element
    where
        I: IntoIterator<Item = &'a Self::Element>,
        Self::Element: 'a,
    {
        elems.into_iter().fold(self.bottom(), |acc, e| self.join(&acc, e))
    }
}

/// Flat lattice element: ⊥ below every value, ⊤ above, values incomparable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Flat<T> {
    Bottom,
    Value(T),
    Top,
}

impl<T> Flat<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Flat::Value(v) => Some(v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FlatDomain<T> {
    _marker: PhantomData<T>,
}

impl<T> FlatDomain<T> {
    pub fn new() -> Self {
        Self { _marker: PhantomData }
    }
}

impl<T> Default for FlatDomain<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Debug + PartialEq> AbstractDomain for FlatDomain<T> {
    type Element = Flat<T>;

    fn bottom(&self) -> Flat<T> {
        Flat::Bottom
    }

    fn top(&self) -> Flat<T> {
        Flat::Top
    }

    fn is_bottom(&self, elem: &Flat<T>) -> bool {
        matches!(elem, Flat::Bottom)
    }

    fn is_top(&self, elem: &Flat<T>) -> bool {
        matches!(elem, Flat::Top)
    }

    fn le(&self, elem1: &Flat<T>, elem2: &Flat<T>) -> bool {
        match (elem1, elem2) {
            (Flat::Bottom, _) | (_, Flat::Top) => true,
            (Flat::Value(a), Flat::Value(b)) => a == b,
            _ => false,
        }
    }

    fn join(&self, elem1: &Flat<T>, elem2: &Flat<T>) -> Flat<T> {
        match (elem1, elem2) {
            (Flat::Bottom, x) | (x, Flat::Bottom) => x.clone(),
            (Flat::Value(a), Flat::Value(b)) if a == b => elem1.clone(),
            _ => Flat::Top,
        }
    }

    fn meet(&self, elem1: &Flat<T>, elem2: &Flat<T>) -> Flat<T> {
        match (elem1, elem2) {
            (Flat::Top, x) | (x, Flat::Top) => x.clone(),
            (Flat::Value(a), Flat::Value(b)) if a == b => elem1.clone(),
            _ => Flat::Bottom,
        }
    }
}

#[cfg(test)]
pub mod tests {
    use test_log::test;

    use super::*;

    /// Test helper: validate basic lattice axioms
    pub fn test_lattice_axioms<D: AbstractDomain>(domain: &D, samples: &[D::Element]) {
        let bottom = domain.bottom();
        let top = domain.top();
        assert!(domain.is_bottom(&bottom), "Bottom is not bottom");
        assert!(domain.is_top(&top), "Top is not top");

        for a in samples {
            // Reflexivity: a ⊑ a
            assert!(domain.le(a, a), "Reflexivity failed for {:?}", a);

            // Bounds: ⊥ ⊑ a ⊑ ⊤
            assert!(domain.le(&bottom, a), "Bottom is not below {:?}", a);
            assert!(domain.le(a, &top), "Top is not above {:?}", a);

            // Idempotence: a ⊔ a = a
            assert!(domain.eq(&domain.join(a, a), a), "Join idempotence failed for {:?}", a);

            // Identity: a ⊔ ⊥ = a
            let joined = domain.join(a, &bottom);
            assert!(domain.eq(a, &joined), "Join with bottom failed for {:?}", a);

            // Identity: a ⊓ ⊤ = a
            let met = domain.meet(a, &top);
            assert!(domain.eq(a, &met), "Meet with top failed for {:?}", a);
        }

        for a in samples {
            for b in samples {
                // Commutativity: a ⊔ b = b ⊔ a
                let ab = domain.join(a, b);
                let ba = domain.join(b, a);
                assert!(domain.eq(&ab, &ba), "Join commutativity failed");

                // Join upper bound: a ⊑ (a ⊔ b)
                assert!(domain.le(a, &ab), "Join is not upper bound for a");
                assert!(domain.le(b, &ab), "Join is not upper bound for b");

                // Meet lower bound: (a ⊓ b) ⊑ a
                let met = domain.meet(a, b);
                assert!(domain.le(&met, a), "Meet is not lower bound of a");
                assert!(domain.le(&met, b), "Meet is not lower bound of b");

                for c in samples {
                    // Associativity up to equivalence.
                    let left = domain.join(&domain.join(a, b), c);
                    let right = domain.join(a, &domain.join(b, c));
                    assert!(domain.eq(&left, &right), "Join associativity failed");

                    // Transitivity.
                    if domain.le(a, b) && domain.le(b, c) {
                        assert!(domain.le(a, c), "Transitivity failed");
                    }
                }
            }
        }
    }

    #[test]
    fn test_flat_lattice() {
        let domain = FlatDomain::<i32>::new();
        let samples = [Flat::Bottom, Flat::Value(1), Flat::Value(2), Flat::Top];
        test_lattice_axioms(&domain, &samples);

        assert_eq!(domain.join(&Flat::Value(1), &Flat::Value(2)), Flat::Top);
        assert_eq!(domain.meet(&Flat::Value(1), &Flat::Value(2)), Flat::Bottom);
        assert_eq!(domain.join_many([&Flat::Value(3), &Flat::Value(3)]), Flat::Value(3));
    }
}
