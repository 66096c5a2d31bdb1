// src/services/order_resolution_service.rs
//
// Order Resolution Engine
//
// Turns a (possibly partial, possibly contradictory) judgment set into one
// total order with a per-item conflict report.
//
// CRITICAL RULES:
// - Never fails on cycles; intransitive judgments are expected
// - Deterministic: nodes are indexed by path order, edges are built in
//   canonical key order, every tie breaks on path order
// - Pure: reads only its inputs, touches no repository or filesystem

use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};
use std::path::Path;
use std::sync::Arc;

use crate::domain::{
    validate_items, ConflictEdge, Item, JudgmentSet, OrderResult, PlacedItem, PlacementSource,
};
use crate::error::{AppError, AppResult};
use crate::events::{EventBus, OrderResolved};

// ============================================================================
// SETTINGS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolutionSettings {
    /// Edges evicted before falling back to net-score ordering
    pub max_cycle_breaks: usize,
}

impl Default for ResolutionSettings {
    fn default() -> Self {
        Self {
            max_cycle_breaks: 64,
        }
    }
}

// ============================================================================
// SERVICE
// ============================================================================

pub struct OrderResolutionService {
    event_bus: Arc<EventBus>,
    settings: ResolutionSettings,
}

impl OrderResolutionService {
    pub fn new(event_bus: Arc<EventBus>, settings: ResolutionSettings) -> Self {
        Self {
            event_bus,
            settings,
        }
    }

    /// Resolve a total order for `items`.
    ///
    /// Only malformed item lists are errors; inconsistent judgments show up
    /// as conflict flags.
    pub fn resolve(&self, items: &[Item], judgments: &JudgmentSet) -> AppResult<OrderResult> {
        validate_items(items)?;

        let result = resolve_order(items, judgments, self.settings.max_cycle_breaks);

        log::info!(
            "Resolved order for {} items: {} conflicts, {} edges evicted{}",
            result.len(),
            result.conflicts.len(),
            result.evicted_edges.len(),
            if result.fell_back_to_net_score {
                ", net-score fallback used"
            } else {
                ""
            }
        );

        if let Err(e) = Self::check_consistency(&result) {
            log::warn!("{}", e);
        }

        self.event_bus.emit(OrderResolved::new(
            result.len(),
            result.conflicts.len(),
            result.evicted_edges.len(),
            result.fell_back_to_net_score,
        ));

        Ok(result)
    }

    /// `InconsistentJudgmentSet` when any stored judgment contradicts the order
    pub fn check_consistency(result: &OrderResult) -> AppResult<()> {
        if result.has_conflicts() {
            return Err(AppError::InconsistentJudgmentSet {
                conflicts: result.conflicts.len(),
            });
        }
        Ok(())
    }
}

// ============================================================================
// ENGINE
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct Edge {
    from: usize,
    to: usize,
    weight: f64,
    active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Ready node in Kahn's queue: highest net score first, then lowest rank
#[derive(Debug, Clone, Copy)]
struct Ready {
    net_score: f64,
    rank: usize,
}

impl PartialEq for Ready {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ready {}

impl PartialOrd for Ready {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ready {
    fn cmp(&self, other: &Self) -> Ordering {
        self.net_score
            .total_cmp(&other.net_score)
            .then_with(|| other.rank.cmp(&self.rank))
    }
}

/// Resolves a total order. See the module header for the guarantees.
pub fn resolve_order(
    items: &[Item],
    judgments: &JudgmentSet,
    max_cycle_breaks: usize,
) -> OrderResult {
    // Rank = position in path order; the only tie-breaker used below
    let mut nodes: Vec<&Item> = items.iter().collect();
    nodes.sort_by(|a, b| a.path.cmp(&b.path));

    let index: BTreeMap<&Path, usize> = nodes
        .iter()
        .enumerate()
        .map(|(rank, item)| (item.path.as_path(), rank))
        .collect();

    let mut edges = build_edges(&index, judgments);
    let net_scores = net_scores(nodes.len(), &edges);

    let evicted = break_cycles(nodes.len(), &mut edges, max_cycle_breaks);

    let (order, sources) = place(nodes.len(), &edges, &net_scores);
    let fell_back_to_net_score = sources.iter().any(|s| *s == PlacementSource::NetScore);

    let mut position = vec![0usize; nodes.len()];
    for (pos, &node) in order.iter().enumerate() {
        position[node] = pos;
    }

    // Conflicts are judged against every stored edge, evicted ones included
    let mut agreeing = vec![0.0f64; nodes.len()];
    let mut incident = vec![0.0f64; nodes.len()];
    let mut conflicted = vec![false; nodes.len()];
    let mut conflicts = Vec::new();

    for edge in &edges {
        incident[edge.from] += edge.weight;
        incident[edge.to] += edge.weight;

        if position[edge.from] < position[edge.to] {
            agreeing[edge.from] += edge.weight;
            agreeing[edge.to] += edge.weight;
        } else {
            conflicted[edge.from] = true;
            conflicted[edge.to] = true;
            conflicts.push(edge);
        }
    }

    conflicts.sort_by_key(|e| (position[e.from], position[e.to]));
    let conflicts = conflicts
        .into_iter()
        .map(|e| conflict_edge(&nodes, e))
        .collect();

    let evicted_edges = evicted
        .iter()
        .map(|&idx| conflict_edge(&nodes, &edges[idx]))
        .collect();

    let items = order
        .iter()
        .enumerate()
        .map(|(pos, &node)| PlacedItem {
            item: nodes[node].clone(),
            position: pos,
            net_score: net_scores[node],
            confidence: if incident[node] > 0.0 {
                agreeing[node] / incident[node]
            } else {
                0.0
            },
            conflict: conflicted[node],
            placement: sources[pos],
        })
        .collect();

    OrderResult {
        items,
        conflicts,
        evicted_edges,
        fell_back_to_net_score,
    }
}

/// One edge per ordering judgment, in canonical key order.
/// Judgments naming items outside the run are ignored.
fn build_edges(index: &BTreeMap<&Path, usize>, judgments: &JudgmentSet) -> Vec<Edge> {
    judgments
        .iter()
        .filter_map(|judgment| {
            let (earlier, later, weight) = judgment.precedence()?;
            let from = *index.get(earlier)?;
            let to = *index.get(later)?;
            (from != to).then_some(Edge {
                from,
                to,
                weight,
                active: true,
            })
        })
        .collect()
}

fn net_scores(node_count: usize, edges: &[Edge]) -> Vec<f64> {
    let mut scores = vec![0.0f64; node_count];
    for edge in edges {
        scores[edge.from] += edge.weight;
        scores[edge.to] -= edge.weight;
    }
    scores
}

/// Evicts the lowest-weight edge of one cycle at a time, up to `budget`
/// times. Returns evicted edge indices in eviction order.
fn break_cycles(node_count: usize, edges: &mut [Edge], budget: usize) -> Vec<usize> {
    let mut evicted = Vec::new();

    while evicted.len() < budget {
        let Some(cycle) = find_cycle(node_count, edges) else {
            break;
        };

        let victim = cycle.iter().copied().min_by(|&a, &b| {
            edges[a]
                .weight
                .total_cmp(&edges[b].weight)
                .then_with(|| edges[a].from.cmp(&edges[b].from))
                .then_with(|| edges[a].to.cmp(&edges[b].to))
        });

        match victim {
            Some(idx) => {
                log::debug!(
                    "Evicting edge {} -> {} (weight {}) from a {}-cycle",
                    edges[idx].from,
                    edges[idx].to,
                    edges[idx].weight,
                    cycle.len()
                );
                edges[idx].active = false;
                evicted.push(idx);
            }
            None => break,
        }
    }

    evicted
}

/// Iterative DFS over active edges; returns the edge indices of the first
/// cycle found. Start nodes and neighbours are visited in rank order.
fn find_cycle(node_count: usize, edges: &[Edge]) -> Option<Vec<usize>> {
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); node_count];
    for (idx, edge) in edges.iter().enumerate() {
        if edge.active {
            adjacency[edge.from].push(idx);
        }
    }
    for outgoing in &mut adjacency {
        outgoing.sort_by_key(|&idx| edges[idx].to);
    }

    let mut color = vec![Color::White; node_count];
    let mut parent_edge: Vec<Option<usize>> = vec![None; node_count];

    for start in 0..node_count {
        if color[start] != Color::White {
            continue;
        }

        color[start] = Color::Gray;
        let mut stack: Vec<(usize, usize)> = vec![(start, 0)];

        while let Some(frame) = stack.last_mut() {
            let node = frame.0;

            if frame.1 == adjacency[node].len() {
                color[node] = Color::Black;
                stack.pop();
                continue;
            }

            let edge_idx = adjacency[node][frame.1];
            frame.1 += 1;
            let next = edges[edge_idx].to;

            match color[next] {
                Color::White => {
                    color[next] = Color::Gray;
                    parent_edge[next] = Some(edge_idx);
                    stack.push((next, 0));
                }
                Color::Gray => {
                    // Walk back along the DFS path from `node` to `next`
                    let mut cycle = vec![edge_idx];
                    let mut current = node;
                    while current != next {
                        let entered_by = parent_edge[current]?;
                        cycle.push(entered_by);
                        current = edges[entered_by].from;
                    }
                    return Some(cycle);
                }
                Color::Black => {}
            }
        }
    }

    None
}

/// Kahn's algorithm over active edges. Whatever it cannot place is
/// appended by net score (descending), ties by rank.
fn place(
    node_count: usize,
    edges: &[Edge],
    net_scores: &[f64],
) -> (Vec<usize>, Vec<PlacementSource>) {
    let mut in_degree = vec![0usize; node_count];
    let mut outgoing: Vec<Vec<usize>> = vec![Vec::new(); node_count];
    for edge in edges.iter().filter(|e| e.active) {
        in_degree[edge.to] += 1;
        outgoing[edge.from].push(edge.to);
    }

    let mut ready: BinaryHeap<Ready> = (0..node_count)
        .filter(|&n| in_degree[n] == 0)
        .map(|rank| Ready {
            net_score: net_scores[rank],
            rank,
        })
        .collect();

    let mut order = Vec::with_capacity(node_count);
    let mut placed = vec![false; node_count];

    while let Some(Ready { rank: node, .. }) = ready.pop() {
        order.push(node);
        placed[node] = true;

        for &next in &outgoing[node] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.push(Ready {
                    net_score: net_scores[next],
                    rank: next,
                });
            }
        }
    }

    let mut sources = vec![PlacementSource::Topological; order.len()];

    if order.len() < node_count {
        let mut remaining: Vec<usize> = (0..node_count).filter(|&n| !placed[n]).collect();
        remaining.sort_by(|&a, &b| {
            net_scores[b]
                .total_cmp(&net_scores[a])
                .then_with(|| a.cmp(&b))
        });

        log::debug!(
            "{} items left in cycles, ordering them by net score",
            remaining.len()
        );

        sources.extend(std::iter::repeat(PlacementSource::NetScore).take(remaining.len()));
        order.extend(remaining);
    }

    (order, sources)
}

fn conflict_edge(nodes: &[&Item], edge: &Edge) -> ConflictEdge {
    ConflictEdge {
        expected_before: nodes[edge.from].path.clone(),
        expected_after: nodes[edge.to].path.clone(),
        weight: edge.weight,
    }
}
