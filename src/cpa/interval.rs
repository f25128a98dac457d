//! Interval analysis over signed machine integers.
//!
//! Each variable is bounded by an interval `[lo, hi]` within the range of
//! the machine width. Variables without an entry are unconstrained. Any
//! arithmetic result that may wrap around widens to the full range.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use super::precision::Precision;
use super::{ConfigurableProgramAnalysis, Element};
use crate::cfa::{is_local_to, return_variable, Cfa, CfaEdge, EdgeKind, NodeId};
use crate::cpa::domain::AbstractDomain;
use crate::error::CpaError;
use crate::formula::{wrap_to_width, Formula, Relation, Term};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Interval {
    pub lo: i64,
    pub hi: i64,
}

impl Interval {
    /// Returns `None` for an empty interval.
    pub fn new(lo: i64, hi: i64) -> Option<Self> {
        (lo <= hi).then_some(Self { lo, hi })
    }

    pub fn singleton(value: i64) -> Self {
        Self { lo: value, hi: value }
    }

    pub fn as_singleton(&self) -> Option<i64> {
        (self.lo == self.hi).then_some(self.lo)
    }

    pub fn contains(&self, value: i64) -> bool {
        self.lo <= value && value <= self.hi
    }

    pub fn is_subset(&self, other: &Interval) -> bool {
        other.lo <= self.lo && self.hi <= other.hi
    }

    pub fn hull(&self, other: &Interval) -> Interval {
        Interval {
            lo: self.lo.min(other.lo),
            hi: self.hi.max(other.hi),
        }
    }

    pub fn intersect(&self, other: &Interval) -> Option<Interval> {
        Interval::new(self.lo.max(other.lo), self.hi.min(other.hi))
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.lo, self.hi)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IntervalState {
    values: BTreeMap<String, Interval>,
    bottom: bool,
    /// Full range of the machine width the state was built for.
    range: Interval,
}

impl IntervalState {
    fn unconstrained(range: Interval) -> Self {
        Self {
            values: BTreeMap::new(),
            bottom: false,
            range,
        }
    }

    pub fn is_bottom(&self) -> bool {
        self.bottom
    }

    /// Constraint over unindexed variables equivalent to the state.
    pub fn to_formula(&self) -> Formula {
        if self.bottom {
            return Formula::False;
        }
        let mut parts = Vec::new();
        for (var, itv) in self.iter() {
            if itv.lo > self.range.lo {
                parts.push(Term::var(var).greater_eq(Term::constant(itv.lo)));
            }
            if itv.hi < self.range.hi {
                parts.push(Term::var(var).less_eq(Term::constant(itv.hi)));
            }
        }
        Formula::and(parts)
    }

    /// Bound of `variable`, `None` if unconstrained.
    pub fn get(&self, variable: &str) -> Option<Interval> {
        self.values.get(variable).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Interval)> {
        self.values.iter().map(|(k, &v)| (k.as_str(), v))
    }
}

impl fmt::Display for IntervalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.bottom {
            return write!(f, "⊥");
        }
        write!(f, "{{")?;
        for (i, (var, itv)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} ∈ {}", var, itv)?;
        }
        write!(f, "}}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalDomain {
    width: u32,
    min: i64,
    max: i64,
}

impl IntervalDomain {
    pub fn new(width: u32) -> Self {
        assert!((1..=32).contains(&width), "Unsupported width {}", width);
        Self {
            width,
            min: -(1i64 << (width - 1)),
            max: (1i64 << (width - 1)) - 1,
        }
    }

    pub fn full(&self) -> Interval {
        Interval {
            lo: self.min,
            hi: self.max,
        }
    }

    pub fn get(&self, state: &IntervalState, variable: &str) -> Interval {
        state.get(variable).unwrap_or_else(|| self.full())
    }

    /// Stores a bound; full-range bounds are not stored.
    pub fn set(&self, state: &mut IntervalState, variable: &str, value: Interval) {
        if value == self.full() {
            state.values.remove(variable);
        } else {
            state.values.insert(variable.to_string(), value);
        }
    }

    pub fn forget(&self, state: &mut IntervalState, variable: &str) {
        state.values.remove(variable);
    }

    /// Builds a state from explicit bounds.
    pub fn state(&self, bounds: impl IntoIterator<Item = (String, Interval)>) -> IntervalState {
        let mut state = self.top();
        for (var, itv) in bounds {
            self.set(&mut state, &var, itv);
        }
        state
    }

    fn clamp(&self, lo: i64, hi: i64) -> Interval {
        if lo < self.min || hi > self.max {
            self.full()
        } else {
            Interval { lo, hi }
        }
    }

    pub fn eval(&self, state: &IntervalState, term: &Term) -> Interval {
        match term {
            Term::Const(c) => Interval::singleton(wrap_to_width(*c, self.width)),
            Term::Var(s) => self.get(state, &s.name),
            Term::Add(a, b) => {
                let (a, b) = (self.eval(state, a), self.eval(state, b));
                self.clamp(a.lo + b.lo, a.hi + b.hi)
            }
            Term::Sub(a, b) => {
                let (a, b) = (self.eval(state, a), self.eval(state, b));
                self.clamp(a.lo - b.hi, a.hi - b.lo)
            }
            Term::Mul(a, b) => {
                let (a, b) = (self.eval(state, a), self.eval(state, b));
                let corners = [a.lo * b.lo, a.lo * b.hi, a.hi * b.lo, a.hi * b.hi];
                let lo = corners.iter().copied().min().unwrap_or(self.min);
                let hi = corners.iter().copied().max().unwrap_or(self.max);
                self.clamp(lo, hi)
            }
            Term::Neg(a) => {
                let a = self.eval(state, a);
                self.clamp(-a.hi, -a.lo)
            }
        }
    }


    /// Restricts the state by a condition; `None` if it cannot hold.
    pub fn assume(&self, state: &IntervalState, condition: &Formula) -> Option<IntervalState> {
        match condition {
            Formula::True | Formula::Bit(..) => Some(state.clone()),
            Formula::False => None,
            Formula::Compare(relation, a, b) => self.assume_compare(state, *relation, a, b),
            Formula::And(parts) => {
                let mut current = state.clone();
                for part in parts {
                    current = self.assume(&current, part)?;
                }
                Some(current)
            }
            Formula::Or(parts) => {
                let branches: Vec<IntervalState> = parts.iter().filter_map(|p| self.assume(state, p)).collect();
                if branches.is_empty() {
                    None
                } else {
                    Some(self.join_many(branches.iter()))
                }
            }
            Formula::Not(inner) => match inner.as_ref() {
                Formula::And(parts) => self.assume(state, &Formula::or(parts.iter().map(|p| p.clone().negate()))),
                Formula::Or(parts) => self.assume(state, &Formula::and(parts.iter().map(|p| p.clone().negate()))),
                Formula::Bit(..) => Some(state.clone()),
                other => self.assume(state, &other.clone().negate()),
            },
        }
    }

    fn assume_compare(&self, state: &IntervalState, relation: Relation, a: &Term, b: &Term) -> Option<IntervalState> {
        let ia = self.eval(state, a);
        let ib = self.eval(state, b);
        let feasible = match relation {
            Relation::Lt => ia.lo < ib.hi,
            Relation::Le => ia.lo <= ib.hi,
            Relation::Gt => ia.hi > ib.lo,
            Relation::Ge => ia.hi >= ib.lo,
            Relation::Eq => ia.intersect(&ib).is_some(),
            Relation::Ne => !matches!((ia.as_singleton(), ib.as_singleton()), (Some(x), Some(y)) if x == y),
        };
        if !feasible {
            return None;
        }

        let mut next = state.clone();
        if let Term::Var(s) = a {
            let restricted = restrict(self.get(&next, &s.name), relation, ib)?;
            self.set(&mut next, &s.name, restricted);
        }
        if let Term::Var(s) = b {
            let restricted = restrict(self.get(&next, &s.name), relation.flip(), ia)?;
            self.set(&mut next, &s.name, restricted);
        }
        Some(next)
    }
}

/// Narrows `value` so that `value R other` may hold.
fn restrict(value: Interval, relation: Relation, other: Interval) -> Option<Interval> {
    let (mut lo, mut hi) = (value.lo, value.hi);
    match relation {
        Relation::Lt => hi = hi.min(other.hi - 1),
        Relation::Le => hi = hi.min(other.hi),
        Relation::Gt => lo = lo.max(other.lo + 1),
        Relation::Ge => lo = lo.max(other.lo),
        Relation::Eq => return value.intersect(&other),
        Relation::Ne => {
            if let Some(v) = other.as_singleton() {
                if lo == v {
                    lo += 1;
                }
                if hi == v {
                    hi -= 1;
                }
            }
        }
    }
    Interval::new(lo, hi)
}

impl AbstractDomain for IntervalDomain {
    type Element = IntervalState;

    fn bottom(&self) -> IntervalState {
        IntervalState {
            bottom: true,
            ..IntervalState::unconstrained(self.full())
        }
    }

    fn top(&self) -> IntervalState {
        IntervalState::unconstrained(self.full())
    }

    fn is_bottom(&self, elem: &IntervalState) -> bool {
        elem.bottom
    }

    fn is_top(&self, elem: &IntervalState) -> bool {
        !elem.bottom && elem.values.is_empty()
    }

    fn le(&self, elem1: &IntervalState, elem2: &IntervalState) -> bool {
        if elem1.bottom {
            return true;
        }
        if elem2.bottom {
            return false;
        }
        elem2
            .iter()
            .all(|(var, bound)| self.get(elem1, var).is_subset(&bound))
    }

    fn join(&self, elem1: &IntervalState, elem2: &IntervalState) -> IntervalState {
        if elem1.bottom {
            return elem2.clone();
        }
        if elem2.bottom {
            return elem1.clone();
        }
        let mut res = self.top();
        for (var, a) in elem1.iter() {
            if let Some(b) = elem2.get(var) {
                self.set(&mut res, var, a.hull(&b));
            }
        }
        res
    }

    fn meet(&self, elem1: &IntervalState, elem2: &IntervalState) -> IntervalState {
        if elem1.bottom || elem2.bottom {
            return self.bottom();
        }
        let mut res = elem1.clone();
        for (var, b) in elem2.iter() {
            match self.get(&res, var).intersect(&b) {
                Some(itv) => self.set(&mut res, var, itv),
                None => return self.bottom(),
            }
        }
        res
    }
}

#[derive(Debug, Clone)]
pub struct IntervalCpa {
    cfa: Rc<Cfa>,
    domain: IntervalDomain,
}

impl IntervalCpa {
    pub fn new(cfa: Rc<Cfa>, width: u32) -> Self {
        Self {
            cfa,
            domain: IntervalDomain::new(width),
        }
    }

    fn post(&self, state: &IntervalState, edge: &CfaEdge) -> Result<Option<IntervalState>, CpaError> {
        let d = &self.domain;
        let mut next = state.clone();
        match &edge.kind {
            EdgeKind::Blank => {}
            EdgeKind::Assume { condition, truth } => {
                let condition = if *truth {
                    condition.clone()
                } else {
                    condition.clone().negate()
                };
                return Ok(d.assume(state, &condition));
            }
            EdgeKind::Assignment { variable, value } => {
                let value = d.eval(state, value);
                d.set(&mut next, variable, value);
            }
            EdgeKind::Havoc { variable } => d.forget(&mut next, variable),
            EdgeKind::Declaration { variable, initializer } => match initializer {
                Some(init) => {
                    let value = d.eval(state, init);
                    d.set(&mut next, variable, value);
                }
                None => d.forget(&mut next, variable),
            },
            EdgeKind::FunctionCall { callee, arguments, .. } => {
                let def = self.cfa.function(callee).ok_or_else(|| CpaError::UnrecognizedEdge {
                    edge: edge.id,
                    description: format!("call to unknown function `{}`", callee),
                })?;
                let values: Vec<Interval> = arguments.iter().map(|a| d.eval(state, a)).collect();
                for (param, value) in def.parameters.iter().zip(values) {
                    d.set(&mut next, param, value);
                }
            }
            EdgeKind::FunctionReturn { callee, result, .. } => {
                let value = d.get(state, &return_variable(callee));
                next.values.retain(|var, _| !is_local_to(var, callee));
                if let Some(variable) = result {
                    d.set(&mut next, variable, value);
                }
            }
            EdgeKind::Unsupported { statement } => {
                return Err(CpaError::UnrecognizedEdge {
                    edge: edge.id,
                    description: statement.clone(),
                })
            }
        }
        Ok(Some(next))
    }
}

impl ConfigurableProgramAnalysis for IntervalCpa {
    type Domain = IntervalDomain;

    fn domain(&self) -> &Self::Domain {
        &self.domain
    }

    fn initial_state(&self, _node: NodeId) -> IntervalState {
        self.domain.top()
    }

    fn successors(
        &self,
        state: &Element<Self>,
        edge: &CfaEdge,
        _precision: &Precision,
    ) -> Result<Vec<Element<Self>>, CpaError> {
        if state.bottom {
            return Ok(Vec::new());
        }
        let next = self.post(state, edge)?;
        log::trace!("interval post over {}: {:?}", edge, next);
        Ok(next.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::cfa::CfaBuilder;
    use crate::cpa::domain::tests::test_lattice_axioms;

    fn itv(lo: i64, hi: i64) -> Interval {
        Interval::new(lo, hi).unwrap()
    }

    #[test]
    fn test_lattice() {
        let d = IntervalDomain::new(8);
        let samples = [
            d.bottom(),
            d.top(),
            d.state([("x".to_string(), itv(0, 5))]),
            d.state([("x".to_string(), itv(3, 10))]),
            d.state([("x".to_string(), itv(-4, -1)), ("y".to_string(), itv(1, 1))]),
            d.state([("y".to_string(), itv(0, 2))]),
        ];
        test_lattice_axioms(&d, &samples);
    }

    #[test]
    fn test_eval_overflow_widens() {
        let d = IntervalDomain::new(8);
        let s = d.state([("x".to_string(), itv(100, 120))]);
        assert_eq!(d.eval(&s, &Term::var("x").add(Term::constant(5))), itv(105, 125));
        assert_eq!(d.eval(&s, &Term::var("x").add(Term::constant(10))), d.full());
        assert_eq!(d.eval(&s, &Term::var("x").neg()), itv(-120, -100));
        assert_eq!(d.eval(&s, &Term::constant(200)), Interval::singleton(-56));
    }

    #[test]
    fn test_assume() {
        let d = IntervalDomain::new(8);
        let s = d.state([("x".to_string(), itv(0, 10))]);
        let lt = Term::var("x").less_than(Term::constant(3));
        assert_eq!(d.assume(&s, &lt), Some(d.state([("x".to_string(), itv(0, 2))])));
        assert_eq!(d.assume(&s, &lt.clone().negate()), Some(d.state([("x".to_string(), itv(3, 10))])));
        assert_eq!(d.assume(&s, &Term::var("x").less_than(Term::constant(0))), None);

        // Constant on the left.
        let gt = Term::constant(4).greater_than(Term::var("x"));
        assert_eq!(d.assume(&s, &gt), Some(d.state([("x".to_string(), itv(0, 3))])));

        let ne = Term::var("x").not_equals(Term::constant(0));
        assert_eq!(d.assume(&s, &ne), Some(d.state([("x".to_string(), itv(1, 10))])));
    }

    #[test]
    fn test_transfer_drops_callee_locals() {
        let mut b = CfaBuilder::new();
        let (m_entry, m_exit) = b.function("main", &[]).unwrap();
        let (f_entry, f_exit) = b.function("f", &["a"]).unwrap();
        let (call, ret) = b
            .call(m_entry, m_exit, "f", vec![Term::constant(7)], Some("main::r"))
            .unwrap();
        let body = b
            .assign(f_entry, f_exit, "f::__retval__", Term::var("f::a").add(Term::constant(1)))
            .unwrap();
        let cfa = Rc::new(b.build("main").unwrap());
        let cpa = IntervalCpa::new(cfa.clone(), 8);
        let prec = Precision::empty();

        let s0 = cpa.initial_state(cfa.entry());
        let s1 = cpa.successors(&s0, cfa.edge(call), &prec).unwrap().remove(0);
        assert_eq!(s1.get("f::a"), Some(Interval::singleton(7)));
        let s2 = cpa.successors(&s1, cfa.edge(body), &prec).unwrap().remove(0);
        let s3 = cpa.successors(&s2, cfa.edge(ret), &prec).unwrap().remove(0);
        assert_eq!(s3.get("main::r"), Some(Interval::singleton(8)));
        assert_eq!(s3.get("f::a"), None);
        assert_eq!(s3.get("f::__retval__"), None);
    }

    #[test]
    fn test_to_formula() {
        let d = IntervalDomain::new(8);
        let s = d.state([("x".to_string(), itv(-128, 3))]);
        assert_eq!(s.to_formula(), Term::var("x").less_eq(Term::constant(3)));
        assert_eq!(d.bottom().to_formula(), Formula::False);
        assert_eq!(d.top().to_formula(), Formula::True);

        // The lower end of an 8-bit range is a real bound at 16 bits.
        let wide = IntervalDomain::new(16);
        let s = wide.state([("x".to_string(), itv(-128, 3))]);
        assert_eq!(
            s.to_formula(),
            Formula::and([
                Term::var("x").greater_eq(Term::constant(-128)),
                Term::var("x").less_eq(Term::constant(3)),
            ])
        );
    }
}
