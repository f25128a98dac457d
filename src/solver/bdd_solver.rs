//! Bit-blasting solver backend on top of the BDD manager.
//!
//! Every instantiated symbol occupies a *slot*. Bit `b` of slot `s` is the
//! BDD variable `(W - 1 - b) * STRIDE + s + 1`, so variables are interleaved
//! by bit position with the most significant bits on top. Interpolants are
//! computed exactly by existential quantification of the local bits.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use log::{debug, trace};

use super::{GroupId, InterpolationStrategy, Model, Prover, Solver, SolverError};
use crate::bdd::Bdd;
use crate::bitvec::BitVector;
use crate::formula::{wrap_to_width, Formula, Relation, Symbol, Term};
use crate::reference::Ref;
use crate::shutdown::ShutdownNotifier;

const STRIDE: u32 = 1 << 20;

pub const DEFAULT_WIDTH: u32 = 8;
pub const MAX_WIDTH: u32 = 32;

pub struct BddSolver {
    bdd: Bdd,
    width: u32,
    strategy: InterpolationStrategy,
    slots: RefCell<HashMap<Symbol, u32>>,
    symbols: RefCell<Vec<Symbol>>,
    encoded: RefCell<HashMap<Formula, Ref>>,
    live: Cell<usize>,
}

impl Default for BddSolver {
    fn default() -> Self {
        Self::new(DEFAULT_WIDTH)
    }
}

impl std::fmt::Debug for BddSolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BddSolver")
            .field("width", &self.width)
            .field("strategy", &self.strategy)
            .field("symbols", &self.symbols.borrow().len())
            .field("bdd", &self.bdd)
            .finish()
    }
}

impl BddSolver {
    pub fn new(width: u32) -> Self {
        assert!(
            (1..=MAX_WIDTH).contains(&width),
            "Bit width must be in 1..={}, got {}",
            MAX_WIDTH,
            width
        );
        Self {
            bdd: Bdd::default(),
            width,
            strategy: InterpolationStrategy::default(),
            slots: RefCell::new(HashMap::new()),
            symbols: RefCell::new(Vec::new()),
            encoded: RefCell::new(HashMap::new()),
            live: Cell::new(0),
        }
    }

    pub fn with_strategy(mut self, strategy: InterpolationStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn strategy(&self) -> InterpolationStrategy {
        self.strategy
    }

    pub fn bdd(&self) -> &Bdd {
        &self.bdd
    }

    fn slot(&self, symbol: &Symbol) -> Result<u32, SolverError> {
        if let Some(&slot) = self.slots.borrow().get(symbol) {
            return Ok(slot);
        }
        let mut symbols = self.symbols.borrow_mut();
        let slot = symbols.len() as u32;
        if slot + 1 >= STRIDE {
            return Err(SolverError::Unsupported(format!("too many symbols (at {})", symbol)));
        }
        symbols.push(symbol.clone());
        self.slots.borrow_mut().insert(symbol.clone(), slot);
        trace!("slot {} <- {}", slot, symbol);
        Ok(slot)
    }

    fn bit_variable(&self, slot: u32, bit: u32) -> u32 {
        (self.width - 1 - bit) * STRIDE + slot + 1
    }

    /// Inverse of [`bit_variable`][Self::bit_variable]: `(slot, bit)`.
    fn split_variable(&self, variable: u32) -> (u32, u32) {
        let v = variable - 1;
        (v % STRIDE, self.width - 1 - v / STRIDE)
    }

    fn slot_variables(&self, slots: impl IntoIterator<Item = u32>) -> BTreeSet<u32> {
        let mut vars = BTreeSet::new();
        for slot in slots {
            for bit in 0..self.width {
                vars.insert(self.bit_variable(slot, bit));
            }
        }
        vars
    }

    fn symbol_vector(&self, symbol: &Symbol) -> Result<BitVector, SolverError> {
        let slot = self.slot(symbol)?;
        let bits = (0..self.width).map(|bit| self.bdd.mk_var(self.bit_variable(slot, bit))).collect();
        Ok(BitVector::from_bits(bits))
    }

    fn encode_term(&self, term: &Term) -> Result<BitVector, SolverError> {
        let bdd = &self.bdd;
        Ok(match term {
            Term::Const(c) => BitVector::constant(bdd, *c, self.width),
            Term::Var(symbol) => self.symbol_vector(symbol)?,
            Term::Add(a, b) => self.encode_term(a)?.add(bdd, &self.encode_term(b)?),
            Term::Sub(a, b) => self.encode_term(a)?.sub(bdd, &self.encode_term(b)?),
            Term::Mul(a, b) => self.encode_term(a)?.mul(bdd, &self.encode_term(b)?),
            Term::Neg(a) => self.encode_term(a)?.neg(bdd),
        })
    }

    /// Builds the BDD of a formula.
    pub fn encode(&self, formula: &Formula) -> Result<Ref, SolverError> {
        if let Some(&node) = self.encoded.borrow().get(formula) {
            return Ok(node);
        }
        let bdd = &self.bdd;
        let node = match formula {
            Formula::True => bdd.one,
            Formula::False => bdd.zero,
            Formula::Compare(relation, a, b) => {
                let a = self.encode_term(a)?;
                let b = self.encode_term(b)?;
                match relation {
                    Relation::Eq => a.equals(bdd, &b),
                    Relation::Ne => -a.equals(bdd, &b),
                    Relation::Lt => a.signed_lt(bdd, &b),
                    Relation::Le => a.signed_le(bdd, &b),
                    Relation::Gt => b.signed_lt(bdd, &a),
                    Relation::Ge => b.signed_le(bdd, &a),
                }
            }
            Formula::Bit(symbol, bit) => {
                if *bit >= self.width {
                    return Err(SolverError::Unsupported(format!(
                        "bit {} of {} exceeds width {}",
                        bit, symbol, self.width
                    )));
                }
                let slot = self.slot(symbol)?;
                bdd.mk_var(self.bit_variable(slot, *bit))
            }
            Formula::Not(inner) => -self.encode(inner)?,
            Formula::And(parts) => {
                let mut acc = bdd.one;
                for part in parts {
                    acc = bdd.apply_and(acc, self.encode(part)?);
                    if bdd.is_zero(acc) {
                        break;
                    }
                }
                acc
            }
            Formula::Or(parts) => {
                let mut acc = bdd.zero;
                for part in parts {
                    acc = bdd.apply_or(acc, self.encode(part)?);
                    if bdd.is_one(acc) {
                        break;
                    }
                }
                acc
            }
        };
        self.encoded.borrow_mut().insert(formula.clone(), node);
        Ok(node)
    }

    /// Turns a BDD back into a formula over bit atoms.
    pub fn decode(&self, node: Ref) -> Formula {
        let mut cache = HashMap::new();
        self.decode_(node, &mut cache)
    }

    fn decode_(&self, node: Ref, cache: &mut HashMap<Ref, Formula>) -> Formula {
        if self.bdd.is_one(node) {
            return Formula::True;
        }
        if self.bdd.is_zero(node) {
            return Formula::False;
        }
        if let Some(res) = cache.get(&node) {
            return res.clone();
        }

        let (slot, bit) = self.split_variable(self.bdd.variable(node));
        let symbol = self.symbols.borrow()[slot as usize].clone();
        let atom = Formula::Bit(symbol, bit);
        let low = self.decode_(self.bdd.low_node(node), cache);
        let high = self.decode_(self.bdd.high_node(node), cache);

        let res = match (low, high) {
            (Formula::False, Formula::True) => atom,
            (Formula::True, Formula::False) => atom.negate(),
            (Formula::False, high) => Formula::and([atom, high]),
            (low, Formula::False) => Formula::and([atom.negate(), low]),
            (Formula::True, high) => Formula::or([atom.negate(), high]),
            (low, Formula::True) => Formula::or([atom, low]),
            (low, high) => Formula::or([
                Formula::and([atom.clone(), high]),
                Formula::and([atom.negate(), low]),
            ]),
        };
        cache.insert(node, res.clone());
        res
    }

    fn slots_of(&self, formula: &Formula) -> Result<BTreeSet<u32>, SolverError> {
        formula.symbols().iter().map(|s| self.slot(s)).collect()
    }
}

impl Solver for BddSolver {
    fn new_prover(&self, shutdown: &ShutdownNotifier) -> Box<dyn Prover + '_> {
        self.live.set(self.live.get() + 1);
        trace!("new prover environment (live = {})", self.live.get());
        Box::new(BddProver {
            solver: self,
            shutdown: shutdown.clone(),
            groups: Vec::new(),
            next_group: 0,
        })
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn live_provers(&self) -> usize {
        self.live.get()
    }
}

#[derive(Debug)]
struct Group {
    id: GroupId,
    node: Ref,
    slots: BTreeSet<u32>,
}

/// Assertion stack of a [`BddSolver`]. Dropping it releases the environment.
pub struct BddProver<'a> {
    solver: &'a BddSolver,
    shutdown: ShutdownNotifier,
    groups: Vec<Group>,
    next_group: u32,
}

impl BddProver<'_> {
    fn conjunction<'g>(&self, groups: impl IntoIterator<Item = &'g Group>) -> Ref {
        self.solver.bdd.apply_and_many(groups.into_iter().map(|g| g.node))
    }
}

impl Drop for BddProver<'_> {
    fn drop(&mut self) {
        let live = &self.solver.live;
        live.set(live.get() - 1);
        trace!("prover environment released (live = {})", live.get());
    }
}

impl Prover for BddProver<'_> {
    fn push(&mut self, formula: &Formula) -> Result<GroupId, SolverError> {
        self.shutdown.check()?;
        let node = self.solver.encode(formula)?;
        let slots = self.solver.slots_of(formula)?;
        let id = GroupId(self.next_group);
        self.next_group += 1;
        trace!("push {} := {}", id, formula);
        self.groups.push(Group { id, node, slots });
        Ok(id)
    }

    fn pop(&mut self) -> Result<(), SolverError> {
        self.groups.pop().map(|_| ()).ok_or(SolverError::EmptyStack)
    }

    fn is_unsat(&mut self) -> Result<bool, SolverError> {
        self.shutdown.check()?;
        let conj = self.conjunction(&self.groups);
        Ok(self.solver.bdd.is_zero(conj))
    }

    fn interpolant(&mut self, a_part: &[GroupId]) -> Result<Formula, SolverError> {
        self.shutdown.check()?;
        for id in a_part {
            if !self.groups.iter().any(|g| g.id == *id) {
                return Err(SolverError::UnknownGroup(*id));
            }
        }

        let (a_groups, b_groups): (Vec<&Group>, Vec<&Group>) =
            self.groups.iter().partition(|g| a_part.contains(&g.id));
        let bdd = &self.solver.bdd;
        let a = self.conjunction(a_groups.iter().copied());
        let b = self.conjunction(b_groups.iter().copied());
        if !bdd.is_zero(bdd.apply_and(a, b)) {
            return Err(SolverError::NoInterpolant);
        }

        let a_slots: BTreeSet<u32> = a_groups.iter().flat_map(|g| g.slots.iter().copied()).collect();
        let b_slots: BTreeSet<u32> = b_groups.iter().flat_map(|g| g.slots.iter().copied()).collect();

        let node = match self.solver.strategy {
            InterpolationStrategy::Strongest => {
                let local = self.solver.slot_variables(a_slots.difference(&b_slots).copied());
                bdd.exists(a, &local)
            }
            InterpolationStrategy::Weakest => {
                let local = self.solver.slot_variables(b_slots.difference(&a_slots).copied());
                -bdd.exists(b, &local)
            }
        };
        let interpolant = self.solver.decode(node);
        debug!("interpolant for {:?}: {}", a_part, interpolant);
        Ok(interpolant)
    }

    fn model(&mut self) -> Result<Model, SolverError> {
        self.shutdown.check()?;
        let conj = self.conjunction(&self.groups);
        let path = self.solver.bdd.one_sat(conj).ok_or(SolverError::NoModel)?;

        let slots: BTreeSet<u32> = self.groups.iter().flat_map(|g| g.slots.iter().copied()).collect();
        let symbols = self.solver.symbols.borrow();
        let width = self.solver.width;
        let mut values = BTreeMap::new();
        for slot in slots {
            let mut raw = 0i64;
            for bit in 0..width {
                let var = self.solver.bit_variable(slot, bit);
                if path.get(&var).copied().unwrap_or(false) {
                    raw |= 1 << bit;
                }
            }
            values.insert(symbols[slot as usize].clone(), wrap_to_width(raw, width));
        }
        Ok(Model::new(values))
    }
}
