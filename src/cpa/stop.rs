use super::domain::AbstractDomain;

/// Coverage check of a new state against the states reached at its location.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StopOperator {
    /// Covered if some single reached state is above it.
    #[default]
    Sep,
    /// Covered if the join of all reached states is above it.
    Join,
    /// Never covered.
    Never,
}

impl StopOperator {
    pub fn stop<D: AbstractDomain>(&self, domain: &D, state: &D::Element, reached: &[&D::Element]) -> bool {
        match self {
            StopOperator::Sep => reached.iter().any(|r| domain.le(state, r)),
            StopOperator::Join => {
                !reached.is_empty() && domain.le(state, &domain.join_many(reached.iter().copied()))
            }
            StopOperator::Never => false,
        }
    }
}
