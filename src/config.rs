//! Knobs of a CEGAR run.

use std::time::Duration;

use crate::cpa::adjustment::BreakOnTargets;
use crate::cpa::merge::MergeOperator;
use crate::cpa::precision::{Precision, PrecisionScope};
use crate::cpa::stop::StopOperator;
use crate::formula::Formula;
use crate::interpolation::InterpolationPartition;
use crate::reached::WaitlistOrder;
use crate::refinement::RestartStrategy;

#[derive(Debug, Clone)]
pub struct CegarConfig {
    /// Run the interval analysis next to the predicate analysis.
    pub use_intervals: bool,
    pub merge: MergeOperator,
    pub stop: StopOperator,
    pub order: WaitlistOrder,
    pub partition: InterpolationPartition,
    /// Where refined predicates become visible.
    pub scope: PrecisionScope,
    pub restart: RestartStrategy,
    /// Refinement rounds before giving up with `UNKNOWN`.
    pub max_refinements: usize,
    /// Keep exploring past the first target; `None` stops at the first one.
    pub break_on_targets: Option<BreakOnTargets>,
    pub max_call_depth: usize,
    pub allow_recursion: bool,
    /// Try to cover nodes by earlier states before expanding them.
    pub forced_covering: bool,
    pub time_limit: Option<Duration>,
    /// Conjoined onto the last group of every trace formula.
    pub final_axioms: Formula,
    pub initial_precision: Precision,
}

impl Default for CegarConfig {
    fn default() -> Self {
        Self {
            use_intervals: true,
            merge: MergeOperator::Sep,
            stop: StopOperator::Sep,
            order: WaitlistOrder::default(),
            partition: InterpolationPartition::default(),
            scope: PrecisionScope::default(),
            restart: RestartStrategy::default(),
            max_refinements: 100,
            break_on_targets: None,
            max_call_depth: 16,
            allow_recursion: false,
            forced_covering: false,
            time_limit: None,
            final_axioms: Formula::True,
            initial_precision: Precision::empty(),
        }
    }
}
