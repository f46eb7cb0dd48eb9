use std::collections::{HashMap, HashSet, VecDeque};
use std::mem;

use hashlink::LinkedHashMap;
use snafu::Snafu;
use tracing::{debug, error, info, warn};

use crate::filesystem::{NodeId, NodeKind};
use crate::namespace::{NamespaceStore, Operation, Placement};

use super::conflict::{Conflict, ConflictKind, MoveReport, MoveStep, ProgressUpdate, Resolution};

/// A source waiting to be checked against `target`.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    source: NodeId,
    target: NodeId,
}

#[derive(Debug, Clone, Copy)]
struct PlannedMove {
    node: NodeId,
    from: NodeId,
    to: NodeId,
}

#[derive(Debug)]
enum Phase {
    Planning,
    ConflictPending {
        conflict: Conflict,
        candidate: Candidate,
        resolution: Option<Resolution>,
    },
    Executing {
        moves: Vec<PlannedMove>,
        next: usize,
    },
    Finished(MoveStep),
}

/// Step-wise move of several nodes into one directory.
///
/// The first phase walks the sources, merging directories into same-named
/// directories and stopping at every name collision until the caller answers
/// it with [`MoveSession::resolve`]. The second phase moves one node per
/// [`MoveSession::step`], reporting progress each time. Cancelling is only
/// possible while a conflict is pending and puts back anything a `replace`
/// had already removed.
///
/// The session holds no borrow of the store; the caller passes it to every
/// step and must not mutate the store through other means in between.
#[derive(Debug)]
pub struct MoveSession {
    queue: VecDeque<Candidate>,
    plan: LinkedHashMap<NodeId, PlannedMove>,
    claimed_names: HashMap<(NodeId, String), NodeId>,
    dissolved: Vec<Placement>,
    replaced: Vec<Placement>,
    skipped: usize,
    phase: Phase,
}

impl MoveSession {
    pub(crate) fn new(
        store: &NamespaceStore,
        sources: &[NodeId],
        target: NodeId,
    ) -> Result<Self, MoveError> {
        let tree = store.tree();
        let target_node = tree
            .get(target)
            .filter(|_| tree.is_attached(target))
            .ok_or(MoveError::UnknownTarget { target })?;
        if !target_node.is_directory() {
            return Err(MoveError::TargetNotADirectory {
                path: tree.full_path(target).unwrap_or_default(),
            });
        }

        let selected = sources.iter().copied().collect::<HashSet<_>>();
        let mut seen = HashSet::new();
        let mut queue = VecDeque::new();
        for &source in sources {
            if !seen.insert(source) {
                continue;
            }
            let Some(path) = tree.full_path(source).filter(|_| tree.is_attached(source)) else {
                warn!("Cannot move {}, it is not in the tree", source);
                continue;
            };
            if source == tree.root() {
                warn!("Cannot move the root");
            } else if source == target {
                warn!("Cannot move '{}' into itself", path);
            } else if tree.is_descendant_of(target, source) {
                warn!("Cannot move '{}' into its own descendant", path);
            } else if selected
                .iter()
                .any(|other| *other != source && tree.is_descendant_of(source, *other))
            {
                debug!("'{}' moves along with a selected ancestor", path);
            } else {
                queue.push_back(Candidate { source, target });
            }
        }

        debug!(
            "Move session into {} starts with {} source(s)",
            tree.full_path(target).unwrap_or_default(),
            queue.len()
        );
        Ok(Self {
            queue,
            plan: LinkedHashMap::new(),
            claimed_names: HashMap::new(),
            dissolved: Vec::new(),
            replaced: Vec::new(),
            skipped: 0,
            phase: Phase::Planning,
        })
    }

    /// The conflict waiting for a resolution, if any.
    pub fn pending_conflict(&self) -> Option<&Conflict> {
        match &self.phase {
            Phase::ConflictPending { conflict, .. } => Some(conflict),
            _ => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.phase, Phase::Finished(_))
    }

    /// Answers the pending conflict. Takes effect on the next [`step`](Self::step).
    pub fn resolve(&mut self, answer: Resolution) -> Result<(), MoveError> {
        match &mut self.phase {
            Phase::ConflictPending { resolution, .. } => {
                *resolution = Some(answer);
                Ok(())
            }
            _ => Err(MoveError::NoPendingConflict),
        }
    }

    /// Advances the session to its next suspension point.
    pub fn step(&mut self, store: &mut NamespaceStore) -> MoveStep {
        loop {
            match mem::replace(&mut self.phase, Phase::Planning) {
                Phase::Planning => {
                    if let Some((conflict, candidate)) = self.plan_next(store) {
                        self.phase = Phase::ConflictPending {
                            conflict: conflict.clone(),
                            candidate,
                            resolution: None,
                        };
                        return MoveStep::Conflict(conflict);
                    }
                    self.phase = self.start_execution(store);
                }
                Phase::ConflictPending {
                    conflict,
                    candidate,
                    resolution: None,
                } => {
                    self.phase = Phase::ConflictPending {
                        conflict: conflict.clone(),
                        candidate,
                        resolution: None,
                    };
                    return MoveStep::Conflict(conflict);
                }
                Phase::ConflictPending {
                    conflict,
                    candidate,
                    resolution: Some(resolution),
                } => {
                    self.phase = self.apply_resolution(store, &conflict, candidate, resolution);
                }
                Phase::Executing { moves, next } => {
                    if next < moves.len() {
                        let update = self.execute(store, &moves, next);
                        self.phase = Phase::Executing {
                            moves,
                            next: next + 1,
                        };
                        return MoveStep::Progress(update);
                    }
                    self.phase = self.finish(store, &moves);
                }
                Phase::Finished(outcome) => {
                    self.phase = Phase::Finished(outcome.clone());
                    return outcome;
                }
            }
        }
    }

    /// Plans queued candidates until one collides with an existing name.
    fn plan_next(&mut self, store: &NamespaceStore) -> Option<(Conflict, Candidate)> {
        let tree = store.tree();
        while let Some(candidate) = self.queue.pop_front() {
            let Some(source) = tree.get(candidate.source) else {
                warn!("Source {} vanished during planning", candidate.source);
                continue;
            };
            let name = source.name().to_string();
            // A directory being dissolved leaves its slot free for the move
            let existing = tree
                .get(candidate.target)
                .and_then(|target| target.child(&name))
                .filter(|existing| !self.is_dissolving(*existing));

            let clash = match existing {
                Some(existing) if existing == candidate.source => {
                    debug!("'{}' is already in the target", name);
                    continue;
                }
                Some(existing) => existing,
                None => match self.claimed_names.get(&(candidate.target, name.clone())) {
                    Some(claimed) => *claimed,
                    None => {
                        self.plan_move(store, candidate, name);
                        continue;
                    }
                },
            };

            let Some(clash_node) = tree.get(clash) else {
                error!(
                    "Conflicting node {} is missing from the arena {}",
                    clash,
                    snafu::location!()
                );
                continue;
            };
            let is_planned = self.plan.contains_key(&clash);
            let kind = match (source.kind(), clash_node.kind()) {
                (NodeKind::Directory, NodeKind::Directory) if !is_planned => {
                    self.merge(store, candidate, clash);
                    continue;
                }
                (a, b) if a == b => ConflictKind::NameTaken,
                _ => ConflictKind::KindMismatch,
            };

            let target_path = join_path(tree.full_path(candidate.target), &name);
            let message = match kind {
                ConflictKind::NameTaken if is_planned => {
                    format!("Another selected item named \"{name}\" is already moving to {target_path}")
                }
                ConflictKind::NameTaken => {
                    format!("{} \"{}\" already exists in target directory", capitalized(source.kind()), name)
                }
                ConflictKind::KindMismatch => format!(
                    "Cannot put {} \"{}\" where {} \"{}\" exists",
                    source.kind(),
                    name,
                    clash_node.kind(),
                    name
                ),
            };
            debug!("Conflict at {}: {}", target_path, kind);
            return Some((
                Conflict {
                    message,
                    kind,
                    source: candidate.source,
                    existing: clash,
                    target: candidate.target,
                    target_path,
                },
                candidate,
            ));
        }
        None
    }

    fn is_dissolving(&self, node: NodeId) -> bool {
        self.dissolved.iter().any(|placement| placement.node == node)
    }

    fn plan_move(&mut self, store: &NamespaceStore, candidate: Candidate, name: String) {
        let Some(from) = store.node(candidate.source).and_then(|n| n.parent()) else {
            warn!("Source {} has no parent, leaving it", candidate.source);
            return;
        };
        self.claimed_names
            .insert((candidate.target, name), candidate.source);
        self.plan.insert(
            candidate.source,
            PlannedMove {
                node: candidate.source,
                from,
                to: candidate.target,
            },
        );
    }

    /// Queues the children of `candidate.source` against the existing
    /// directory `into`, ahead of the remaining candidates.
    fn merge(&mut self, store: &NamespaceStore, candidate: Candidate, into: NodeId) {
        let Some(source) = store.node(candidate.source) else {
            return;
        };
        debug!(
            "Merging '{}' into {}",
            source.name(),
            store.full_path(into).unwrap_or_default()
        );
        if let Some(parent) = source.parent() {
            self.dissolved.push(Placement::new(candidate.source, parent));
        }
        let children = source.children().collect::<Vec<_>>();
        for child in children.into_iter().rev() {
            self.queue.push_front(Candidate {
                source: child,
                target: into,
            });
        }
    }

    fn apply_resolution(
        &mut self,
        store: &mut NamespaceStore,
        conflict: &Conflict,
        candidate: Candidate,
        resolution: Resolution,
    ) -> Phase {
        debug!("Resolving conflict at {} with {}", conflict.target_path, resolution);
        match resolution {
            Resolution::Skip => {
                self.skipped += 1;
                Phase::Planning
            }
            Resolution::Replace => {
                let Some(name) = store.node(candidate.source).map(|n| n.name().to_string()) else {
                    return Phase::Planning;
                };
                if self.plan.remove(&conflict.existing).is_some() {
                    debug!("Dropping earlier source {} in favour of {}", conflict.existing, candidate.source);
                    self.skipped += 1;
                } else {
                    match store.tree_mut().detach_child(conflict.target, &name) {
                        Ok(existing) => self
                            .replaced
                            .push(Placement::new(existing, conflict.target)),
                        Err(e) => warn!("Could not remove '{}' for replacement: {}", name, e),
                    }
                }
                self.plan_move(store, candidate, name);
                Phase::Planning
            }
            Resolution::Cancel => {
                self.rollback(store);
                info!("Move cancelled");
                Phase::Finished(MoveStep::Cancelled)
            }
        }
    }

    fn rollback(&mut self, store: &mut NamespaceStore) {
        for placement in self.replaced.drain(..).rev() {
            if let Err(e) = store
                .tree_mut()
                .attach_child(placement.parent, placement.node)
            {
                error!("Failed to restore {} after cancel: {}", placement.node, e);
            }
        }
    }

    fn start_execution(&mut self, store: &mut NamespaceStore) -> Phase {
        if self.plan.is_empty() && self.dissolved.is_empty() {
            info!("Nothing to move");
            return Phase::Finished(MoveStep::Completed(None));
        }
        // Merged directories go first so their names are free for the moves
        for placement in self.dissolved.iter().rev() {
            store.tree_mut().detach(placement.node);
        }
        let moves = mem::take(&mut self.plan)
            .into_iter()
            .map(|(_, planned)| planned)
            .collect::<Vec<_>>();
        info!("Moving {} node(s)", moves.len());
        Phase::Executing { moves, next: 0 }
    }

    fn execute(&mut self, store: &mut NamespaceStore, moves: &[PlannedMove], index: usize) -> ProgressUpdate {
        let planned = moves[index];
        let tree = store.tree_mut();
        let name = tree
            .get(planned.node)
            .map(|n| n.name().to_string())
            .unwrap_or_default();

        let already_there = tree.get(planned.to).and_then(|t| t.child(&name)) == Some(planned.node);
        if !already_there {
            tree.detach(planned.node);
            match tree.attach_child(planned.to, planned.node) {
                Ok(None) => {}
                Ok(Some(displaced)) => {
                    error!(
                        "Moving '{}' displaced unplanned node {} {}",
                        name,
                        displaced,
                        snafu::location!()
                    );
                    self.replaced.push(Placement::new(displaced, planned.to));
                }
                Err(e) => warn!("Failed to move '{}': {}", name, e),
            }
        }

        ProgressUpdate::new(index + 1, moves.len(), name)
    }

    fn finish(&mut self, store: &mut NamespaceStore, moves: &[PlannedMove]) -> Phase {
        let mut scopes = Vec::new();
        for planned in moves {
            scopes.push(planned.from);
            scopes.push(planned.to);
        }
        scopes.extend(self.dissolved.iter().map(|p| p.parent));
        scopes.extend(self.replaced.iter().map(|p| p.parent));
        crate::namespace::dedup_in_order(&mut scopes);

        let report = MoveReport {
            moved: moves.len(),
            replaced: self.replaced.len(),
            merged: self.dissolved.len(),
            skipped: self.skipped,
        };
        info!(
            "Moved {} node(s), replaced {}, merged {} directorie(s), skipped {}",
            report.moved, report.replaced, report.merged, report.skipped
        );

        store.record(
            Operation::Move {
                moved: moves
                    .iter()
                    .map(|planned| Placement::new(planned.node, planned.from))
                    .collect(),
                dissolved: mem::take(&mut self.dissolved),
                replaced: mem::take(&mut self.replaced),
            },
            scopes,
        );
        Phase::Finished(MoveStep::Completed(Some(report)))
    }
}

fn join_path(parent: Option<String>, name: &str) -> String {
    match parent.as_deref() {
        None | Some("/") => format!("/{name}"),
        Some(parent) => format!("{parent}/{name}"),
    }
}

fn capitalized(kind: NodeKind) -> &'static str {
    match kind {
        NodeKind::File => "File",
        NodeKind::Directory => "Directory",
    }
}

#[derive(Debug, Snafu)]
pub enum MoveError {
    #[snafu(display("Move target {} is not in the tree", target))]
    UnknownTarget { target: NodeId },
    #[snafu(display("Move target '{}' is not a directory", path))]
    TargetNotADirectory { path: String },
    #[snafu(display("There is no conflict waiting for a resolution"))]
    NoPendingConflict,
}
