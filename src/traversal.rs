//! Deterministic path enumeration.
//!
//! The enumerator walks every route from the start passage with an
//! explicit stack, respecting a per-passage revisit budget, and returns
//! the routes in depth-first order.

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::types::{PathEnd, Passage, Route, StoryGraph};

/// Error type for traversal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TraversalError {
    /// The graph has no passages at all.
    #[error("Story graph has no passages")]
    EmptyGraph,
    /// The start passage does not resolve to a passage.
    #[error("Start passage not found: '{0}'")]
    StartPassageMissing(String),
}

/// Anomalies recovered during traversal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct TraversalStats {
    /// Links followed to passages that do not exist.
    pub dangling_links: usize,
    /// Edges not followed because the target's visit budget was spent.
    pub cycle_prunes: usize,
    /// Routes emitted because every continuation was pruned.
    pub cutoff_paths: usize,
}

/// Routes plus the anomalies met while enumerating them.
#[derive(Debug, Clone, Default)]
pub struct Enumeration {
    /// Routes in depth-first order.
    pub routes: Vec<Route>,
    /// Recovered anomalies.
    pub stats: TraversalStats,
}

/// Whether a passage already on the route `visits` times may be entered again.
///
/// With `max_cycles = 1` a passage may appear at most twice on one route.
pub fn within_cycle_budget(visits: usize, max_cycles: usize) -> bool {
    visits <= max_cycles
}

/// One level of the explicit DFS stack.
struct Frame<'g> {
    /// Outgoing links, deduplicated, in authored order.
    links: Vec<&'g str>,
    /// Index of the next link to try.
    next: usize,
    /// Whether any link from this passage was followed or ended a route.
    expanded: bool,
}

impl<'g> Frame<'g> {
    fn new(passage: &'g Passage) -> Self {
        let mut links: Vec<&'g str> = Vec::with_capacity(passage.links.len());
        for link in &passage.links {
            if !links.contains(&link.as_str()) {
                links.push(link.as_str());
            }
        }
        Self {
            links,
            next: 0,
            expanded: false,
        }
    }
}

/// Depth-first path enumerator.
///
/// ## Algorithm
///
/// 1. Resolve the start passage (error if absent)
/// 2. Push a frame for it; the route and per-passage visit counts are
///    maintained alongside the stack
/// 3. For the top frame, try its next link:
///    - Missing target: emit `route + [target]` as a missing-passage path
///    - Target over its visit budget: prune the edge
///    - Terminal target: emit `route + [target]`
///    - Otherwise push a frame for the target
/// 4. When a frame runs out of links, pop it; if none of its links was
///    usable, emit the route as a cycle cutoff
///
/// Terminates on any finite graph: every passage can be on the stack at
/// most `max_cycles + 1` times, so stack depth is bounded.
#[derive(Debug, Clone, Copy)]
pub struct PathEnumerator {
    max_cycles: usize,
}

impl PathEnumerator {
    /// Create an enumerator with a revisit budget.
    pub fn new(max_cycles: usize) -> Self {
        Self { max_cycles }
    }

    /// The revisit budget.
    pub fn max_cycles(&self) -> usize {
        self.max_cycles
    }

    /// Enumerate every route from the graph's start passage.
    pub fn enumerate(&self, graph: &StoryGraph) -> Result<Enumeration, TraversalError> {
        if graph.passages.is_empty() {
            return Err(TraversalError::EmptyGraph);
        }
        let (start_name, start) = graph
            .start()
            .ok_or_else(|| TraversalError::StartPassageMissing(graph.start_passage.clone()))?;

        let mut out = Enumeration::default();

        if start.is_terminal() {
            out.routes.push(Route::new(vec![start_name.to_string()], PathEnd::Terminal));
            return Ok(out);
        }

        let mut route: Vec<&str> = vec![start_name];
        let mut visits: HashMap<&str, usize> = HashMap::from([(start_name, 1)]);
        let mut stack: Vec<Frame<'_>> = vec![Frame::new(start)];

        while let Some(frame) = stack.last_mut() {
            if frame.next >= frame.links.len() {
                if !frame.expanded {
                    trace!(route = %route.join(" → "), "cycle budget exhausted, emitting cutoff");
                    out.routes.push(owned_route(&route, None, PathEnd::CycleCutoff));
                    out.stats.cutoff_paths += 1;
                }
                stack.pop();
                if let Some(name) = route.pop() {
                    leave(&mut visits, name);
                }
                continue;
            }

            let target = frame.links[frame.next];
            frame.next += 1;

            let Some(passage) = graph.passage(target) else {
                frame.expanded = true;
                debug!(from = route.last().copied().unwrap_or(""), to = target, "dangling link");
                out.routes.push(owned_route(&route, Some(target), PathEnd::MissingPassage));
                out.stats.dangling_links += 1;
                continue;
            };

            let seen = visits.get(target).copied().unwrap_or(0);
            if !within_cycle_budget(seen, self.max_cycles) {
                trace!(to = target, seen, "pruning edge over cycle budget");
                out.stats.cycle_prunes += 1;
                continue;
            }

            frame.expanded = true;
            if passage.is_terminal() {
                out.routes.push(owned_route(&route, Some(target), PathEnd::Terminal));
                continue;
            }

            route.push(target);
            *visits.entry(target).or_insert(0) += 1;
            stack.push(Frame::new(passage));
        }

        debug!(
            routes = out.routes.len(),
            dangling_links = out.stats.dangling_links,
            cycle_prunes = out.stats.cycle_prunes,
            "enumeration complete"
        );
        Ok(out)
    }
}

impl Default for PathEnumerator {
    fn default() -> Self {
        Self::new(1)
    }
}

fn owned_route(route: &[&str], last: Option<&str>, end: PathEnd) -> Route {
    let passages = route
        .iter()
        .copied()
        .chain(last)
        .map(str::to_string)
        .collect();
    Route::new(passages, end)
}

fn leave<'g>(visits: &mut HashMap<&'g str, usize>, name: &'g str) {
    if let Some(count) = visits.get_mut(name) {
        *count = count.saturating_sub(1);
    }
}
