//! Kill-set subsumption over scored mutants.
//!
//! Mutants with equal kill sets collapse into one class. A class is dominated
//! when another class's kill set strictly contains its own; dominated classes
//! are traced to a surviving representative. The relation lives in an
//! index-based [`DominanceGraph`] and is checked for partial-order violations
//! before any mutant is eliminated.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, VecDeque};

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::SubsumptionConfig;
use crate::mutant::MutantId;
use crate::scoring::ScoredMutant;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubsumptionError {
    #[error("mutant {mutant} subsumes itself")]
    SelfSubsumption { mutant: MutantId },

    #[error("mutants {a} and {b} subsume each other")]
    Conflict { a: MutantId, b: MutantId },

    #[error("subsumption cycle through mutants {}", .mutants.join(", "))]
    Cycle { mutants: Vec<MutantId> },
}

/// Why a mutant was eliminated.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EliminationReason {
    /// Same kill set as its representative.
    Equivalent,

    /// Kill set strictly contained in a representative's kill set.
    Dominated,
}

/// Traceability entry for an eliminated mutant.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Trace {
    pub representative: MutantId,
    pub reason: EliminationReason,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ReductionStats {
    pub input: usize,
    pub equivalence_classes: usize,
    pub collapsed_equivalent: usize,
    pub dominated: usize,
    pub representatives: usize,
    pub unkilled: usize,
    pub reduction_percent: f64,
}

/// Outcome of subsumption analysis.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reduction {
    /// Indices into the analyzed slice, ascending.
    pub representatives: Vec<usize>,

    /// Eliminated mutant id -> representative standing in for it.
    pub trace: BTreeMap<MutantId, Trace>,

    /// Representative id -> number of mutants it stands for, itself included.
    pub class_sizes: BTreeMap<MutantId, usize>,

    pub stats: ReductionStats,
}

/// A partial-order violation found in a [`DominanceGraph`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderViolation {
    SelfLoop(usize),
    Mutual(usize, usize),
    Cycle(Vec<usize>),
}

/// Directed graph over node indices; an edge `b -> a` means `a` subsumes `b`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DominanceGraph {
    subsumed_by: Vec<Vec<usize>>,
}

impl DominanceGraph {
    pub fn new(nodes: usize) -> Self {
        Self {
            subsumed_by: vec![Vec::new(); nodes],
        }
    }

    pub fn node_count(&self) -> usize {
        self.subsumed_by.len()
    }

    /// Record that `to` subsumes `from`.
    pub fn add_edge(&mut self, from: usize, to: usize) {
        self.subsumed_by[from].push(to);
    }

    pub fn subsumers(&self, node: usize) -> &[usize] {
        &self.subsumed_by[node]
    }

    /// Nodes with no outgoing edge, i.e. not dominated by anything.
    pub fn is_source(&self, node: usize) -> bool {
        self.subsumed_by[node].is_empty()
    }

    /// Whether `to` is reachable from `from` (the transitive relation).
    #[cfg(test)]
    pub fn reaches(&self, from: usize, to: usize) -> bool {
        let mut seen = vec![false; self.node_count()];
        let mut queue = VecDeque::from([from]);

        while let Some(n) = queue.pop_front() {
            for &next in &self.subsumed_by[n] {
                if next == to {
                    return true;
                }
                if !seen[next] {
                    seen[next] = true;
                    queue.push_back(next);
                }
            }
        }

        false
    }

    /// Check irreflexivity, antisymmetry and acyclicity.
    ///
    /// Returns a topological order (dominated nodes before their dominators).
    pub fn check_partial_order(&self) -> Result<Vec<usize>, OrderViolation> {
        let n = self.node_count();

        for from in 0..n {
            for &to in &self.subsumed_by[from] {
                if to == from {
                    return Err(OrderViolation::SelfLoop(from));
                }
                if self.subsumed_by[to].contains(&from) {
                    return Err(OrderViolation::Mutual(from.min(to), from.max(to)));
                }
            }
        }

        // Kahn's algorithm.
        let mut indegree = vec![0usize; n];
        for edges in &self.subsumed_by {
            for &to in edges {
                indegree[to] += 1;
            }
        }

        let mut queue: VecDeque<usize> = (0..n).filter(|&i| indegree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);

        while let Some(node) = queue.pop_front() {
            order.push(node);
            for &to in &self.subsumed_by[node] {
                indegree[to] -= 1;
                if indegree[to] == 0 {
                    queue.push_back(to);
                }
            }
        }

        if order.len() < n {
            let stuck = (0..n).filter(|&i| indegree[i] > 0).collect();
            return Err(OrderViolation::Cycle(stuck));
        }

        Ok(order)
    }
}

/// Mutants sharing one kill set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KillClass {
    /// Interned, sorted test indices.
    pub kills: Vec<u32>,

    /// Indices into the analyzed slice, ascending.
    pub members: Vec<usize>,

    /// Member kept for the class.
    pub leader: usize,
}

/// Prefer higher composite score, then lower id.
fn prefer(scored: &[ScoredMutant], a: usize, b: usize) -> Ordering {
    scored[b]
        .score()
        .total_cmp(&scored[a].score())
        .then_with(|| scored[a].id().cmp(scored[b].id()))
}

/// Group mutants by kill set. Never-killed mutants each get their own class.
pub fn build_classes(scored: &[ScoredMutant]) -> Vec<KillClass> {
    let mut test_ids: BTreeMap<&str, u32> = BTreeMap::new();
    for s in scored {
        for t in &s.mutant.kill_set {
            let next = test_ids.len() as u32;
            test_ids.entry(t.as_str()).or_insert(next);
        }
    }

    let mut classes: Vec<KillClass> = Vec::new();
    let mut by_kills: HashMap<Vec<u32>, usize> = HashMap::new();

    for (idx, s) in scored.iter().enumerate() {
        let mut kills: Vec<u32> = s
            .mutant
            .kill_set
            .iter()
            .map(|t| test_ids[t.as_str()])
            .collect();
        kills.sort_unstable();

        let slot = if kills.is_empty() {
            None
        } else {
            by_kills.get(&kills).copied()
        };

        match slot {
            Some(c) => {
                let class = &mut classes[c];
                class.members.push(idx);
                if prefer(scored, idx, class.leader) == Ordering::Less {
                    class.leader = idx;
                }
            }
            None => {
                if !kills.is_empty() {
                    by_kills.insert(kills.clone(), classes.len());
                }
                classes.push(KillClass {
                    kills,
                    members: vec![idx],
                    leader: idx,
                });
            }
        }
    }

    classes
}

/// True when sorted `small` is a strict subset of sorted `large`.
fn strict_subset(small: &[u32], large: &[u32]) -> bool {
    if small.len() >= large.len() {
        return false;
    }

    let mut it = large.iter();
    'outer: for s in small {
        for l in it.by_ref() {
            match l.cmp(s) {
                Ordering::Less => continue,
                Ordering::Equal => continue 'outer,
                Ordering::Greater => return false,
            }
        }
        return false;
    }

    true
}

/// Containment edges between classes, gated by `min_similarity`.
///
/// Pairwise checks run in parallel per class and are merged in index order.
pub fn build_graph(classes: &[KillClass], config: &SubsumptionConfig) -> DominanceGraph {
    let edges: Vec<Vec<usize>> = classes
        .par_iter()
        .map(|lower| {
            if lower.kills.is_empty() {
                return Vec::new();
            }
            classes
                .iter()
                .enumerate()
                .filter(|(_, upper)| {
                    strict_subset(&lower.kills, &upper.kills)
                        && lower.kills.len() as f64 / upper.kills.len() as f64
                            >= config.min_similarity
                })
                .map(|(j, _)| j)
                .collect()
        })
        .collect();

    let mut graph = DominanceGraph::new(classes.len());
    for (from, tos) in edges.into_iter().enumerate() {
        for to in tos {
            graph.add_edge(from, to);
        }
    }
    graph
}

/// Collapse classes along a validated graph into representatives and traces.
pub fn reduce(
    scored: &[ScoredMutant],
    classes: &[KillClass],
    graph: &DominanceGraph,
) -> Result<Reduction, SubsumptionError> {
    let order = graph
        .check_partial_order()
        .map_err(|v| violation_error(scored, classes, v))?;

    // Best reachable source per class, filled from dominators down.
    let mut best: Vec<usize> = (0..classes.len()).collect();
    for &node in order.iter().rev() {
        if graph.is_source(node) {
            continue;
        }
        let mut pick: Option<usize> = None;
        for &up in graph.subsumers(node) {
            let candidate = best[up];
            pick = match pick {
                Some(p)
                    if prefer(scored, classes[p].leader, classes[candidate].leader)
                        != Ordering::Greater =>
                {
                    Some(p)
                }
                _ => Some(candidate),
            };
        }
        if let Some(p) = pick {
            best[node] = p;
        }
    }

    let mut reduction = Reduction::default();

    for (c, class) in classes.iter().enumerate() {
        let leader_id = scored[class.leader].id().to_string();

        if graph.is_source(c) {
            reduction.representatives.push(class.leader);
            for &m in &class.members {
                if m != class.leader {
                    reduction.trace.insert(
                        scored[m].id().to_string(),
                        Trace {
                            representative: leader_id.clone(),
                            reason: EliminationReason::Equivalent,
                        },
                    );
                }
            }
            continue;
        }

        let representative = scored[classes[best[c]].leader].id().to_string();
        for &m in &class.members {
            debug!(
                mutant = scored[m].id(),
                representative = %representative,
                "mutant dominated"
            );
            reduction.trace.insert(
                scored[m].id().to_string(),
                Trace {
                    representative: representative.clone(),
                    reason: EliminationReason::Dominated,
                },
            );
        }
    }

    reduction.representatives.sort_unstable();

    for &r in &reduction.representatives {
        reduction.class_sizes.insert(scored[r].id().to_string(), 1);
    }
    for t in reduction.trace.values() {
        if let Some(size) = reduction.class_sizes.get_mut(&t.representative) {
            *size += 1;
        }
    }

    let input = scored.len();
    let representatives = reduction.representatives.len();
    reduction.stats = ReductionStats {
        input,
        equivalence_classes: classes.len(),
        collapsed_equivalent: count_reason(&reduction, EliminationReason::Equivalent),
        dominated: count_reason(&reduction, EliminationReason::Dominated),
        representatives,
        unkilled: scored.iter().filter(|s| s.mutant.is_unkilled()).count(),
        reduction_percent: if input == 0 {
            0.0
        } else {
            (1.0 - representatives as f64 / input as f64) * 100.0
        },
    };

    Ok(reduction)
}

fn count_reason(reduction: &Reduction, reason: EliminationReason) -> usize {
    reduction
        .trace
        .values()
        .filter(|t| t.reason == reason)
        .count()
}

fn violation_error(
    scored: &[ScoredMutant],
    classes: &[KillClass],
    violation: OrderViolation,
) -> SubsumptionError {
    let leader = |c: usize| scored[classes[c].leader].id().to_string();

    match violation {
        OrderViolation::SelfLoop(c) => SubsumptionError::SelfSubsumption { mutant: leader(c) },
        OrderViolation::Mutual(a, b) => SubsumptionError::Conflict {
            a: leader(a),
            b: leader(b),
        },
        OrderViolation::Cycle(nodes) => {
            let mut mutants: Vec<MutantId> = nodes
                .iter()
                .flat_map(|&c| classes[c].members.iter())
                .map(|&m| scored[m].id().to_string())
                .collect();
            mutants.sort();
            SubsumptionError::Cycle { mutants }
        }
    }
}

/// Reduce a scored population to its representative set.
pub fn analyze(
    scored: &[ScoredMutant],
    config: &SubsumptionConfig,
) -> Result<Reduction, SubsumptionError> {
    let classes = build_classes(scored);
    let graph = build_graph(&classes, config);
    let reduction = reduce(scored, &classes, &graph)?;

    info!(
        input = reduction.stats.input,
        classes = reduction.stats.equivalence_classes,
        representatives = reduction.stats.representatives,
        reduction_percent = reduction.stats.reduction_percent,
        "subsumption analysis complete"
    );

    Ok(reduction)
}
