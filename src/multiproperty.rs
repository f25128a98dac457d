//! Checking many properties of one program, partition by partition.
//!
//! Every partition gets a fresh engine, precision and ARG. A violated
//! property is removed from its partition and the rest is checked again; an
//! inconclusive run marks the whole remaining partition `UNKNOWN` and moves
//! on. Only an interruption of the whole run stops early.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;

use log::{info, warn};

use crate::cegar::{Cegar, Verdict};
use crate::cfa::NodeId;
use crate::counterexample::Witness;
use crate::error::CegarError;
use crate::shutdown::Interrupt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Partitioning {
    /// One property per partition.
    #[default]
    Individual,
    All,
    /// Consecutive groups of the given size.
    Chunks(usize),
}

impl Partitioning {
    pub fn partition(&self, properties: &BTreeSet<String>) -> Vec<BTreeSet<String>> {
        let all: Vec<String> = properties.iter().cloned().collect();
        let size = match *self {
            Partitioning::Individual => 1,
            Partitioning::All => all.len().max(1),
            Partitioning::Chunks(n) => {
                assert!(n > 0, "Chunk size must be positive");
                n
            }
        };
        all.chunks(size).map(|chunk| chunk.iter().cloned().collect()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyVerdict {
    True,
    False { path: Vec<NodeId>, witness: Witness },
    Unknown { reason: String },
}

impl fmt::Display for PropertyVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyVerdict::True => write!(f, "TRUE"),
            PropertyVerdict::False { path, .. } => write!(f, "FALSE (path of {} locations)", path.len()),
            PropertyVerdict::Unknown { reason } => write!(f, "UNKNOWN ({})", reason),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyResults {
    pub verdicts: BTreeMap<String, PropertyVerdict>,
    /// Set if the whole run was cut short.
    pub interrupted: Option<Interrupt>,
}

impl PropertyResults {
    pub fn get(&self, property: &str) -> Option<&PropertyVerdict> {
        self.verdicts.get(property)
    }

    pub fn violated(&self) -> impl Iterator<Item = &str> {
        self.verdicts
            .iter()
            .filter(|(_, v)| matches!(v, PropertyVerdict::False { .. }))
            .map(|(p, _)| p.as_str())
    }

    fn mark_unknown<'a>(&mut self, properties: impl IntoIterator<Item = &'a String>, reason: &str) {
        for property in properties {
            self.verdicts.entry(property.clone()).or_insert_with(|| PropertyVerdict::Unknown {
                reason: reason.to_string(),
            });
        }
    }
}

impl fmt::Display for PropertyResults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (property, verdict) in &self.verdicts {
            writeln!(f, "{:<16} {}", property, verdict)?;
        }
        if let Some(interrupt) = self.interrupted {
            writeln!(f, "(interrupted: {})", interrupt)?;
        }
        Ok(())
    }
}

pub struct MultiPropertyDriver {
    cegar: Cegar,
    partitioning: Partitioning,
    inner_time_limit: Option<Duration>,
}

impl MultiPropertyDriver {
    pub fn new(cegar: Cegar) -> Self {
        Self {
            cegar,
            partitioning: Partitioning::default(),
            inner_time_limit: None,
        }
    }

    pub fn with_partitioning(mut self, partitioning: Partitioning) -> Self {
        self.partitioning = partitioning;
        self
    }

    /// Time budget of each partition run.
    pub fn with_inner_time_limit(mut self, limit: Duration) -> Self {
        self.inner_time_limit = Some(limit);
        self
    }

    pub fn cegar(&self) -> &Cegar {
        &self.cegar
    }

    pub fn run(&self) -> Result<PropertyResults, CegarError> {
        let properties = self.cegar.cfa().properties();
        let partitions = self.partitioning.partition(&properties);
        info!(
            "Checking {} properties in {} partition(s)",
            properties.len(),
            partitions.len()
        );

        let outer = self.cegar.shutdown();
        let mut results = PropertyResults::default();
        for partition in partitions {
            let mut pending = partition;
            while !pending.is_empty() {
                let shutdown = match self.inner_time_limit {
                    Some(limit) => outer.child_with_time_limit(limit),
                    None => outer.child(),
                };
                match self.cegar.run_for(Some(&pending), &shutdown) {
                    Ok(Verdict::True) => {
                        for property in std::mem::take(&mut pending) {
                            results.verdicts.insert(property, PropertyVerdict::True);
                        }
                    }
                    Ok(Verdict::False { property, path, witness }) => {
                        info!("Property `{}` is violated", property);
                        if !pending.remove(&property) {
                            warn!("Run reported unchecked property `{}`", property);
                            results.mark_unknown(&pending, "inconsistent verdict");
                            break;
                        }
                        results.verdicts.insert(property, PropertyVerdict::False { path, witness });
                    }
                    Ok(Verdict::Unknown { reason }) => {
                        results.mark_unknown(&pending, &reason);
                        break;
                    }
                    Err(CegarError::Interrupted(interrupt)) => {
                        warn!("Run interrupted: {}", interrupt);
                        results.interrupted = Some(interrupt);
                        results.mark_unknown(&properties, &interrupt.to_string());
                        return Ok(results);
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(results)
    }
}
