//! Dependency graph resolver.
//!
//! Everything here is a pure function of a task snapshot. The snapshot is
//! indexed by id into an arena; edges are id references, never pointers:
//! - forward edges: task -> tasks it requires
//! - reverse edges: task -> tasks that require it
//!
//! Requirements naming tasks missing from the snapshot count as unmet.
//! Cycles are found by an explicit strongly-connected-components pass and
//! no cycle member is ever ready.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::state::{self, Guard};
use crate::task::{Task, TaskState};

/// Read-only dependency view over a snapshot of tasks.
pub struct DependencyGraph<'t> {
    tasks: HashMap<&'t str, &'t Task>,
    /// Forward edges restricted to tasks present in the snapshot.
    edges: HashMap<&'t str, Vec<&'t str>>,
    reverse_edges: HashMap<&'t str, Vec<&'t str>>,
}

impl<'t> DependencyGraph<'t> {
    /// Indexes a snapshot. If ids repeat, the last record wins.
    #[must_use]
    pub fn from_tasks(all: &'t [Task]) -> Self {
        let tasks: HashMap<&str, &Task> = all.iter().map(|t| (t.id.as_str(), t)).collect();
        let mut edges: HashMap<&str, Vec<&str>> = HashMap::new();
        let mut reverse_edges: HashMap<&str, Vec<&str>> = HashMap::new();
        for &task in tasks.values() {
            let id = task.id.as_str();
            // BTreeSet iteration keeps the edge lists sorted.
            for dep in &task.requires {
                reverse_edges.entry(dep.as_str()).or_default().push(id);
                if tasks.contains_key(dep.as_str()) {
                    edges.entry(id).or_default().push(dep.as_str());
                }
            }
        }
        for waiting in reverse_edges.values_mut() {
            waiting.sort_unstable();
        }
        Self { tasks, edges, reverse_edges }
    }

    /// Looks up a task by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&'t Task> {
        self.tasks.get(id).copied()
    }

    /// Ids of tasks whose `requires` names `id`, sorted.
    #[must_use]
    pub fn dependents(&self, id: &str) -> Vec<&'t str> {
        self.reverse_edges.get(id).cloned().unwrap_or_default()
    }

    /// Requirements of `task` that are not `done` (or not visible).
    #[must_use]
    pub fn unmet_requirements<'a>(&self, task: &'a Task) -> Vec<&'a str> {
        task.requires
            .iter()
            .map(String::as_str)
            .filter(|dep| !self.get(dep).is_some_and(|t| t.state == TaskState::Done))
            .collect()
    }

    /// Returns `true` if `id` can reach itself through `requires`.
    #[must_use]
    pub fn on_cycle(&self, id: &str) -> bool {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut stack: Vec<&str> = self.forward(id).to_vec();
        while let Some(node) = stack.pop() {
            if node == id {
                return true;
            }
            if visited.insert(node) {
                stack.extend_from_slice(self.forward(node));
            }
        }
        false
    }

    /// All dependency cycles: each cycle's ids sorted, cycles sorted by
    /// their first id. A self-dependency is a one-element cycle.
    #[must_use]
    pub fn cycles(&self) -> Vec<Vec<String>> {
        let mut cycles: Vec<Vec<String>> = self
            .strongly_connected()
            .into_iter()
            .filter(|component| {
                component.len() > 1 || self.forward(component[0]).contains(&component[0])
            })
            .map(|component| {
                let mut ids: Vec<String> = component.into_iter().map(String::from).collect();
                ids.sort();
                ids
            })
            .collect();
        cycles.sort();
        cycles
    }

    fn forward(&self, id: &str) -> &[&'t str] {
        self.edges.get(id).map_or(&[][..], Vec::as_slice)
    }

    /// Tarjan's algorithm with an explicit call stack, so deep chains do
    /// not recurse.
    fn strongly_connected(&self) -> Vec<Vec<&'t str>> {
        let mut roots: Vec<&str> = self.tasks.keys().copied().collect();
        roots.sort_unstable();

        let mut counter = 0usize;
        let mut index_of: HashMap<&str, usize> = HashMap::new();
        let mut lowlink: HashMap<&str, usize> = HashMap::new();
        let mut on_stack: HashSet<&str> = HashSet::new();
        let mut stack: Vec<&str> = Vec::new();
        let mut components = Vec::new();

        for root in roots {
            if index_of.contains_key(root) {
                continue;
            }
            index_of.insert(root, counter);
            lowlink.insert(root, counter);
            counter += 1;
            stack.push(root);
            on_stack.insert(root);
            let mut call: Vec<(&str, usize)> = vec![(root, 0)];

            while let Some(frame) = call.last_mut() {
                let node = frame.0;
                let deps = self.forward(node);
                if frame.1 < deps.len() {
                    let next = deps[frame.1];
                    frame.1 += 1;
                    if let Some(&seen) = index_of.get(next) {
                        if on_stack.contains(next) {
                            let low = lowlink[node].min(seen);
                            lowlink.insert(node, low);
                        }
                    } else {
                        index_of.insert(next, counter);
                        lowlink.insert(next, counter);
                        counter += 1;
                        stack.push(next);
                        on_stack.insert(next);
                        call.push((next, 0));
                    }
                    continue;
                }

                call.pop();
                if let Some(&(parent, _)) = call.last() {
                    let low = lowlink[parent].min(lowlink[node]);
                    lowlink.insert(parent, low);
                }
                if lowlink[node] == index_of[node] {
                    let mut component = Vec::new();
                    while let Some(member) = stack.pop() {
                        on_stack.remove(member);
                        component.push(member);
                        if member == node {
                            break;
                        }
                    }
                    components.push(component);
                }
            }
        }
        components
    }
}

/// `true` iff every requirement of `task` is `done` in `all` and `task` is
/// not on a dependency cycle.
#[must_use]
pub fn is_ready(task: &Task, all: &[Task]) -> bool {
    let graph = DependencyGraph::from_tasks(all);
    graph.unmet_requirements(task).is_empty() && !graph.on_cycle(&task.id)
}

/// Non-terminal ready tasks, highest priority first, then oldest first,
/// then by id.
#[must_use]
pub fn ready_set(all: &[Task]) -> Vec<Task> {
    let graph = DependencyGraph::from_tasks(all);
    let cyclic: HashSet<String> = graph.cycles().into_iter().flatten().collect();
    let mut ready: Vec<Task> = all
        .iter()
        .filter(|t| !t.state.is_terminal())
        .filter(|t| !cyclic.contains(&t.id))
        .filter(|t| graph.unmet_requirements(t).is_empty())
        .cloned()
        .collect();
    ready.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.id.cmp(&b.id))
    });
    ready
}

/// Ready tasks that can be claimed right now (`todo`), in ready-set order.
#[must_use]
pub fn claimable(all: &[Task]) -> Vec<Task> {
    ready_set(all).into_iter().filter(|t| t.state == TaskState::Todo).collect()
}

/// Computes the unblock cascade for `completed_id`.
///
/// For each non-terminal task that waits for or requires `completed_id`:
/// a matching `waiting_for` is cleared, and a `waiting` task left with
/// nothing to wait for moves to `todo`. Only changed tasks are returned,
/// so re-running on the updated snapshot yields nothing. If the snapshot
/// shows `completed_id` in a state other than `done`, nothing cascades.
#[must_use]
pub fn on_completed(completed_id: &str, all: &[Task], now: DateTime<Utc>) -> Vec<Task> {
    if let Some(task) = all.iter().find(|t| t.id == completed_id) {
        if task.state != TaskState::Done {
            log::debug!("not cascading {completed_id}: snapshot shows {}", task.state);
            return Vec::new();
        }
    }

    all.iter()
        .filter(|t| t.id != completed_id && !t.state.is_terminal())
        .filter(|t| {
            t.waiting_for.as_deref() == Some(completed_id) || t.requires.contains(completed_id)
        })
        .filter_map(|t| {
            let mut updated = t.clone();
            if updated.waiting_for.as_deref() == Some(completed_id) {
                updated.waiting_for = None;
            }
            if updated.state == TaskState::Waiting && updated.waiting_for.is_none() {
                // Waiting -> todo is always legal.
                state::transition(&mut updated, TaskState::Todo, &Guard::none(), now).ok()?;
            } else if updated.waiting_for != t.waiting_for {
                updated.touch(now);
            }
            (updated.state != t.state || updated.waiting_for != t.waiting_for).then_some(updated)
        })
        .collect()
}

/// All dependency cycles in the snapshot (see [`DependencyGraph::cycles`]).
#[must_use]
pub fn detect_cycles(all: &[Task]) -> Vec<Vec<String>> {
    DependencyGraph::from_tasks(all).cycles()
}

/// Inverse of `requires`: for each required id, the ids requiring it.
#[must_use]
pub fn derive_blocks(all: &[Task]) -> BTreeMap<String, BTreeSet<String>> {
    let mut blocks: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for task in all {
        for dep in &task.requires {
            blocks.entry(dep.clone()).or_default().insert(task.id.clone());
        }
    }
    blocks
}

/// Tasks whose stored `blocks` disagree with [`derive_blocks`], already
/// corrected.
#[must_use]
pub fn stale_blocks(all: &[Task], now: DateTime<Utc>) -> Vec<Task> {
    let derived = derive_blocks(all);
    let empty = BTreeSet::new();
    all.iter()
        .filter_map(|task| {
            let expected = derived.get(&task.id).unwrap_or(&empty);
            (task.blocks != *expected).then(|| {
                let mut fixed = task.clone();
                fixed.blocks.clone_from(expected);
                fixed.touch(now);
                fixed
            })
        })
        .collect()
}

/// Returns the cycle `task_id` would join if its `requires` became
/// `requires`, or `None` if the change keeps the graph acyclic.
#[must_use]
pub fn cycle_with_requires(
    all: &[Task],
    task_id: &str,
    requires: &BTreeSet<String>,
) -> Option<Vec<String>> {
    let mut snapshot = all.to_vec();
    if let Some(task) = snapshot.iter_mut().find(|t| t.id == task_id) {
        task.requires.clone_from(requires);
    }
    let graph = DependencyGraph::from_tasks(&snapshot);
    graph.cycles().into_iter().find(|cycle| cycle.iter().any(|id| id == task_id))
}
