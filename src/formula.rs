//! Quantifier-free formulas over fixed-width integer variables.
//!
//! Variables are [`Symbol`]s: a program variable name, optionally pinned to an
//! SSA index. Formulas attached to the CFA and to abstract states are
//! *uninstantiated* (no indices); formulas handed to the solver are
//! *instantiated* against an [`SsaMap`].

use std::collections::BTreeSet;
use std::fmt;

use crate::ssa::SsaMap;

/// Interprets the low `width` bits of `value` as a signed two's-complement number.
pub fn wrap_to_width(value: i64, width: u32) -> i64 {
    if width >= 64 {
        value
    } else {
        let shift = 64 - width;
        value.wrapping_shl(shift).wrapping_shr(shift)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Symbol {
    pub name: String,
    pub index: Option<u32>,
}

impl Symbol {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            index: None,
        }
    }

    pub fn indexed(name: impl Into<String>, index: u32) -> Self {
        Self {
            name: name.into(),
            index: Some(index),
        }
    }

    pub fn is_instantiated(&self) -> bool {
        self.index.is_some()
    }

    pub fn uninstantiated(&self) -> Self {
        Self::new(self.name.clone())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(index) => write!(f, "{}@{}", self.name, index),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Integer-valued term.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Term {
    Const(i64),
    Var(Symbol),
    Add(Box<Term>, Box<Term>),
    Sub(Box<Term>, Box<Term>),
    Mul(Box<Term>, Box<Term>),
    Neg(Box<Term>),
}

impl Term {
    pub fn var(name: impl Into<String>) -> Self {
        Term::Var(Symbol::new(name))
    }

    pub fn constant(value: i64) -> Self {
        Term::Const(value)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn add(self, other: Term) -> Self {
        Term::Add(Box::new(self), Box::new(other))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn sub(self, other: Term) -> Self {
        Term::Sub(Box::new(self), Box::new(other))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn mul(self, other: Term) -> Self {
        Term::Mul(Box::new(self), Box::new(other))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn neg(self) -> Self {
        Term::Neg(Box::new(self))
    }

    pub fn equals(self, other: Term) -> Formula {
        Formula::Compare(Relation::Eq, self, other)
    }

    pub fn not_equals(self, other: Term) -> Formula {
        Formula::Compare(Relation::Ne, self, other)
    }

    pub fn less_than(self, other: Term) -> Formula {
        Formula::Compare(Relation::Lt, self, other)
    }

    pub fn less_eq(self, other: Term) -> Formula {
        Formula::Compare(Relation::Le, self, other)
    }

    pub fn greater_than(self, other: Term) -> Formula {
        Formula::Compare(Relation::Gt, self, other)
    }

    pub fn greater_eq(self, other: Term) -> Formula {
        Formula::Compare(Relation::Ge, self, other)
    }

    fn map_symbols(&self, f: &dyn Fn(&Symbol) -> Symbol) -> Term {
        match self {
            Term::Const(c) => Term::Const(*c),
            Term::Var(s) => Term::Var(f(s)),
            Term::Add(a, b) => Term::Add(Box::new(a.map_symbols(f)), Box::new(b.map_symbols(f))),
            Term::Sub(a, b) => Term::Sub(Box::new(a.map_symbols(f)), Box::new(b.map_symbols(f))),
            Term::Mul(a, b) => Term::Mul(Box::new(a.map_symbols(f)), Box::new(b.map_symbols(f))),
            Term::Neg(a) => Term::Neg(Box::new(a.map_symbols(f))),
        }
    }

    pub fn instantiate(&self, ssa: &SsaMap) -> Term {
        self.map_symbols(&|s| instantiate_symbol(s, ssa))
    }

    pub fn uninstantiate(&self) -> Term {
        self.map_symbols(&Symbol::uninstantiated)
    }

    fn collect_symbols(&self, out: &mut BTreeSet<Symbol>) {
        match self {
            Term::Const(_) => {}
            Term::Var(s) => {
                out.insert(s.clone());
            }
            Term::Add(a, b) | Term::Sub(a, b) | Term::Mul(a, b) => {
                a.collect_symbols(out);
                b.collect_symbols(out);
            }
            Term::Neg(a) => a.collect_symbols(out),
        }
    }

    pub fn symbols(&self) -> BTreeSet<Symbol> {
        let mut out = BTreeSet::new();
        self.collect_symbols(&mut out);
        out
    }

    /// Evaluates the term with wrap-around arithmetic at the given width.
    pub fn evaluate(&self, valuation: &dyn Fn(&Symbol) -> Option<i64>, width: u32) -> Option<i64> {
        let value = match self {
            Term::Const(c) => *c,
            Term::Var(s) => valuation(s)?,
            Term::Add(a, b) => a.evaluate(valuation, width)?.wrapping_add(b.evaluate(valuation, width)?),
            Term::Sub(a, b) => a.evaluate(valuation, width)?.wrapping_sub(b.evaluate(valuation, width)?),
            Term::Mul(a, b) => a.evaluate(valuation, width)?.wrapping_mul(b.evaluate(valuation, width)?),
            Term::Neg(a) => a.evaluate(valuation, width)?.wrapping_neg(),
        };
        Some(wrap_to_width(value, width))
    }

    /// Returns the variable name if the term is a plain variable.
    pub fn as_variable(&self) -> Option<&Symbol> {
        match self {
            Term::Var(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Const(c) => write!(f, "{}", c),
            Term::Var(s) => write!(f, "{}", s),
            Term::Add(a, b) => write!(f, "({} + {})", a, b),
            Term::Sub(a, b) => write!(f, "({} - {})", a, b),
            Term::Mul(a, b) => write!(f, "({} * {})", a, b),
            Term::Neg(a) => write!(f, "-{}", a),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Relation {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Relation {
    pub fn negate(self) -> Self {
        match self {
            Relation::Eq => Relation::Ne,
            Relation::Ne => Relation::Eq,
            Relation::Lt => Relation::Ge,
            Relation::Le => Relation::Gt,
            Relation::Gt => Relation::Le,
            Relation::Ge => Relation::Lt,
        }
    }

    /// The relation with its operands swapped: `a R b` iff `b R' a`.
    pub fn flip(self) -> Self {
        match self {
            Relation::Eq => Relation::Eq,
            Relation::Ne => Relation::Ne,
            Relation::Lt => Relation::Gt,
            Relation::Le => Relation::Ge,
            Relation::Gt => Relation::Lt,
            Relation::Ge => Relation::Le,
        }
    }

    pub fn holds(self, a: i64, b: i64) -> bool {
        match self {
            Relation::Eq => a == b,
            Relation::Ne => a != b,
            Relation::Lt => a < b,
            Relation::Le => a <= b,
            Relation::Gt => a > b,
            Relation::Ge => a >= b,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Relation::Eq => "==",
            Relation::Ne => "!=",
            Relation::Lt => "<",
            Relation::Le => "<=",
            Relation::Gt => ">",
            Relation::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Formula {
    True,
    False,
    Compare(Relation, Term, Term),
    /// Bit `n` (0 = least significant) of the two's-complement encoding of a symbol.
    Bit(Symbol, u32),
    Not(Box<Formula>),
    And(Vec<Formula>),
    Or(Vec<Formula>),
}

impl Formula {
    pub fn and(parts: impl IntoIterator<Item = Formula>) -> Formula {
        let mut out = Vec::new();
        for part in parts {
            match part {
                Formula::True => {}
                Formula::False => return Formula::False,
                Formula::And(inner) => out.extend(inner),
                other => out.push(other),
            }
        }
        match out.len() {
            0 => Formula::True,
            1 => out.pop().unwrap_or(Formula::True),
            _ => Formula::And(out),
        }
    }

    pub fn or(parts: impl IntoIterator<Item = Formula>) -> Formula {
        let mut out = Vec::new();
        for part in parts {
            match part {
                Formula::False => {}
                Formula::True => return Formula::True,
                Formula::Or(inner) => out.extend(inner),
                other => out.push(other),
            }
        }
        match out.len() {
            0 => Formula::False,
            1 => out.pop().unwrap_or(Formula::False),
            _ => Formula::Or(out),
        }
    }

    pub fn negate(self) -> Formula {
        match self {
            Formula::True => Formula::False,
            Formula::False => Formula::True,
            Formula::Not(inner) => *inner,
            Formula::Compare(r, a, b) => Formula::Compare(r.negate(), a, b),
            other => Formula::Not(Box::new(other)),
        }
    }

    pub fn conjoin(self, other: Formula) -> Formula {
        Formula::and([self, other])
    }

    pub fn implies(self, other: Formula) -> Formula {
        Formula::or([self.negate(), other])
    }

    pub fn is_true(&self) -> bool {
        matches!(self, Formula::True)
    }

    pub fn is_false(&self) -> bool {
        matches!(self, Formula::False)
    }

    fn map_symbols(&self, f: &dyn Fn(&Symbol) -> Symbol) -> Formula {
        match self {
            Formula::True => Formula::True,
            Formula::False => Formula::False,
            Formula::Compare(r, a, b) => Formula::Compare(*r, a.map_symbols(f), b.map_symbols(f)),
            Formula::Bit(s, bit) => Formula::Bit(f(s), *bit),
            Formula::Not(inner) => Formula::Not(Box::new(inner.map_symbols(f))),
            Formula::And(parts) => Formula::And(parts.iter().map(|p| p.map_symbols(f)).collect()),
            Formula::Or(parts) => Formula::Or(parts.iter().map(|p| p.map_symbols(f)).collect()),
        }
    }

    /// Pins every unindexed symbol to its current index in `ssa`.
    pub fn instantiate(&self, ssa: &SsaMap) -> Formula {
        self.map_symbols(&|s| instantiate_symbol(s, ssa))
    }

    /// Strips all SSA indices.
    pub fn uninstantiate(&self) -> Formula {
        self.map_symbols(&Symbol::uninstantiated)
    }

    fn collect_symbols(&self, out: &mut BTreeSet<Symbol>) {
        match self {
            Formula::True | Formula::False => {}
            Formula::Compare(_, a, b) => {
                a.collect_symbols(out);
                b.collect_symbols(out);
            }
            Formula::Bit(s, _) => {
                out.insert(s.clone());
            }
            Formula::Not(inner) => inner.collect_symbols(out),
            Formula::And(parts) | Formula::Or(parts) => {
                for p in parts {
                    p.collect_symbols(out);
                }
            }
        }
    }

    pub fn symbols(&self) -> BTreeSet<Symbol> {
        let mut out = BTreeSet::new();
        self.collect_symbols(&mut out);
        out
    }

    /// Names of the program variables mentioned, ignoring SSA indices.
    pub fn variables(&self) -> BTreeSet<String> {
        self.symbols().into_iter().map(|s| s.name).collect()
    }

    /// Evaluates the formula; `None` if some symbol has no value.
    pub fn evaluate(&self, valuation: &dyn Fn(&Symbol) -> Option<i64>, width: u32) -> Option<bool> {
        Some(match self {
            Formula::True => true,
            Formula::False => false,
            Formula::Compare(r, a, b) => r.holds(a.evaluate(valuation, width)?, b.evaluate(valuation, width)?),
            Formula::Bit(s, bit) => {
                let value = wrap_to_width(valuation(s)?, width);
                (value >> bit) & 1 == 1
            }
            Formula::Not(inner) => !inner.evaluate(valuation, width)?,
            Formula::And(parts) => {
                for p in parts {
                    if !p.evaluate(valuation, width)? {
                        return Some(false);
                    }
                }
                true
            }
            Formula::Or(parts) => {
                for p in parts {
                    if p.evaluate(valuation, width)? {
                        return Some(true);
                    }
                }
                false
            }
        })
    }
}

fn instantiate_symbol(symbol: &Symbol, ssa: &SsaMap) -> Symbol {
    if symbol.is_instantiated() {
        symbol.clone()
    } else {
        Symbol::indexed(symbol.name.clone(), ssa.index(&symbol.name))
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Formula::True => write!(f, "true"),
            Formula::False => write!(f, "false"),
            Formula::Compare(r, a, b) => write!(f, "{} {} {}", a, r.as_str(), b),
            Formula::Bit(s, bit) => write!(f, "{}[{}]", s, bit),
            Formula::Not(inner) => write!(f, "!({})", inner),
            Formula::And(parts) | Formula::Or(parts) => {
                let sep = if matches!(self, Formula::And(_)) { " && " } else { " || " };
                write!(f, "(")?;
                for (i, p) in parts.iter().enumerate() {
                    if i > 0 {
                        write!(f, "{}", sep)?;
                    }
                    write!(f, "{}", p)?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn test_wrap_to_width() {
        assert_eq!(wrap_to_width(127, 8), 127);
        assert_eq!(wrap_to_width(128, 8), -128);
        assert_eq!(wrap_to_width(-129, 8), 127);
        assert_eq!(wrap_to_width(255, 8), -1);
        assert_eq!(wrap_to_width(5, 64), 5);
    }

    #[test]
    fn test_and_or_simplification() {
        let p = Term::var("x").less_than(Term::constant(0));
        assert_eq!(Formula::and([Formula::True, p.clone()]), p);
        assert_eq!(Formula::and([Formula::False, p.clone()]), Formula::False);
        assert_eq!(Formula::or([Formula::True, p.clone()]), Formula::True);
        assert_eq!(Formula::or(Vec::<Formula>::new()), Formula::False);
        assert_eq!(Formula::and(Vec::<Formula>::new()), Formula::True);

        let nested = Formula::and([Formula::and([p.clone(), p.clone()]), p.clone()]);
        assert_eq!(nested, Formula::And(vec![p.clone(), p.clone(), p]));
    }

    #[test]
    fn test_negate() {
        let p = Term::var("x").less_than(Term::constant(0));
        assert_eq!(p.clone().negate(), Term::var("x").greater_eq(Term::constant(0)));
        let bit = Formula::Bit(Symbol::new("x"), 7);
        assert_eq!(bit.clone().negate().negate(), bit);
    }

    #[test]
    fn test_instantiate_roundtrip() {
        let mut ssa = SsaMap::new();
        ssa.fresh("x");
        let p = Term::var("x").add(Term::var("y")).equals(Term::constant(3));
        let inst = p.instantiate(&ssa);
        let symbols = inst.symbols();
        assert!(symbols.contains(&Symbol::indexed("x", 2)));
        assert!(symbols.contains(&Symbol::indexed("y", 1)));
        assert_eq!(inst.uninstantiate(), p);
        // Already-indexed symbols are left alone.
        assert_eq!(inst.instantiate(&SsaMap::new()), inst);
    }

    #[test]
    fn test_evaluate_wraps() {
        let f = Term::var("x").add(Term::constant(1)).less_than(Term::var("x"));
        let at = |v: i64| move |_: &Symbol| Some(v);
        assert_eq!(f.evaluate(&at(127), 8), Some(true));
        assert_eq!(f.evaluate(&at(3), 8), Some(false));
        assert_eq!(f.evaluate(&|_| None, 8), None);

        let sign = Formula::Bit(Symbol::new("x"), 7);
        assert_eq!(sign.evaluate(&at(-1), 8), Some(true));
        assert_eq!(sign.evaluate(&at(5), 8), Some(false));
    }

    #[test]
    fn test_display() {
        let p = Formula::and([
            Term::var("x").less_than(Term::constant(0)),
            Formula::Bit(Symbol::indexed("y", 2), 3),
        ]);
        assert_eq!(p.to_string(), "(x < 0 && y@2[3])");
    }
}
