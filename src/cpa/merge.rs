use super::domain::AbstractDomain;

/// How a new state is combined with a reached state at the same location.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MergeOperator {
    /// Never combine: the reached state is kept as is.
    #[default]
    Sep,
    /// Replace the reached state by the join of both.
    Join,
}

impl MergeOperator {
    /// Returns the state that should replace `reached`. A result equal to
    /// `reached` means nothing was merged.
    pub fn merge<D: AbstractDomain>(&self, domain: &D, new: &D::Element, reached: &D::Element) -> D::Element {
        match self {
            MergeOperator::Sep => reached.clone(),
            MergeOperator::Join => domain.join(new, reached),
        }
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::cpa::domain::{Flat, FlatDomain};

    #[test]
    fn test_merge() {
        let domain = FlatDomain::<u8>::new();
        let a = Flat::Value(1);
        let b = Flat::Value(2);
        assert_eq!(MergeOperator::Sep.merge(&domain, &a, &b), b);
        assert_eq!(MergeOperator::Join.merge(&domain, &a, &b), Flat::Top);
        assert_eq!(MergeOperator::Join.merge(&domain, &a, &a), a);
    }
}
