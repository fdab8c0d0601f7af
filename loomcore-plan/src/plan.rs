//! The todo DAG itself: construction, status transitions, and re-planning.

use std::collections::HashSet;

use crate::error::PlanError;
use crate::id::{PlanId, TodoId};

/// Lifecycle state of one todo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Not yet started; blocked until its dependencies complete.
    Pending,
    /// Currently being worked.
    InProgress,
    /// Finished successfully. Terminal except via `replan`.
    Completed,
    /// Finished unsuccessfully. Terminal except via `replan`.
    Failed,
}

impl Status {
    fn label(self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::InProgress => "in_progress",
            Status::Completed => "completed",
            Status::Failed => "failed",
        }
    }
}

/// One todo as it will be inserted into a new [`Plan`].
///
/// `deps` are indices into the same draft list (a draft can only depend on
/// another draft passed in the same `create` call).
#[derive(Debug, Clone)]
pub struct TodoDraft {
    /// Human-readable description of the work.
    pub content: String,
    /// Indices, into the draft vector, of todos this one depends on.
    pub deps: Vec<usize>,
}

impl TodoDraft {
    /// A draft with no dependencies.
    pub fn new(content: impl Into<String>) -> Self {
        Self { content: content.into(), deps: Vec::new() }
    }

    /// Attach dependency indices.
    pub fn depends_on(mut self, deps: impl IntoIterator<Item = usize>) -> Self {
        self.deps = deps.into_iter().collect();
        self
    }
}

/// One node in the plan's todo arena.
#[derive(Debug, Clone)]
pub struct Todo {
    /// This todo's arena index.
    pub id: TodoId,
    /// Human-readable description.
    pub content: String,
    /// Current lifecycle state.
    pub status: Status,
    /// Todos that must be `Completed` before this one may `start`.
    pub deps: HashSet<TodoId>,
    /// Free-form result text recorded on completion.
    pub result: Option<String>,
}

/// One recorded status change, kept only for test assertions and for
/// building `plan_update` event payloads — never persisted, since a
/// `Plan`'s lifetime is bounded to one turn.
#[derive(Debug, Clone)]
pub struct TransitionEntry {
    /// Which todo transitioned.
    pub id: TodoId,
    /// Its state before the transition.
    pub from: Status,
    /// Its state after the transition.
    pub to: Status,
    /// Monotonic sequence number within this plan, for stable ordering.
    pub seq: u64,
}

/// An edit to apply to a live plan.
#[derive(Debug, Clone)]
pub enum ReplanOp {
    /// Insert a new todo depending on existing (non-removed) todos.
    Add {
        /// Description of the new work.
        content: String,
        /// Existing todos it depends on.
        deps: Vec<TodoId>,
    },
    /// Remove a todo. Rejected if it is `Completed`.
    Remove(TodoId),
    /// Change a pending/in-progress/failed todo's content and/or deps.
    /// Rejected if the todo is `Completed`.
    Edit {
        /// The todo to edit.
        id: TodoId,
        /// New content, if changing.
        content: Option<String>,
        /// New dependency set, if changing.
        deps: Option<Vec<TodoId>>,
    },
}

/// A batch of edits applied atomically by [`Plan::replan`].
#[derive(Debug, Clone, Default)]
pub struct ReplanDiff(pub Vec<ReplanOp>);

/// An acyclic DAG of todos, with status transitions and re-planning.
#[derive(Debug, Clone)]
pub struct Plan {
    id: PlanId,
    arena: Vec<Option<Todo>>,
    log: Vec<TransitionEntry>,
    next_seq: u64,
}

impl Plan {
    /// Build a plan from a draft list. Validates that dependency indices
    /// are in range and that the resulting DAG is acyclic.
    pub fn create(id: PlanId, drafts: Vec<TodoDraft>) -> Result<Self, PlanError> {
        let len = drafts.len();
        let mut arena = Vec::with_capacity(len);
        for (i, draft) in drafts.into_iter().enumerate() {
            let mut deps = HashSet::new();
            for dep_idx in &draft.deps {
                if *dep_idx >= len {
                    return Err(PlanError::UnknownDependency(*dep_idx));
                }
                deps.insert(TodoId(*dep_idx as u32));
            }
            arena.push(Some(Todo {
                id: TodoId(i as u32),
                content: draft.content,
                status: Status::Pending,
                deps,
                result: None,
            }));
        }
        check_acyclic(&arena)?;
        Ok(Self { id, arena, log: Vec::new(), next_seq: 0 })
    }

    /// This plan's id.
    pub fn id(&self) -> &PlanId {
        &self.id
    }

    /// All live (non-removed) todos, in arena order.
    pub fn todos(&self) -> impl Iterator<Item = &Todo> {
        self.arena.iter().filter_map(|t| t.as_ref())
    }

    /// Look up a single todo by id.
    pub fn get(&self, id: TodoId) -> Option<&Todo> {
        self.arena.get(id.0 as usize).and_then(|t| t.as_ref())
    }

    /// Every recorded transition, in the order it happened.
    pub fn transition_log(&self) -> &[TransitionEntry] {
        &self.log
    }

    fn todo_mut(&mut self, id: TodoId) -> Result<&mut Todo, PlanError> {
        self.arena.get_mut(id.0 as usize).and_then(|t| t.as_mut()).ok_or(PlanError::UnknownTodo(id))
    }

    fn record(&mut self, id: TodoId, from: Status, to: Status) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.log.push(TransitionEntry { id, from, to, seq });
    }

    /// Transition `id` to `InProgress`. Requires every dependency still
    /// present in the plan to be `Completed` (a dependency removed by a
    /// prior `replan` no longer blocks).
    pub fn start(&mut self, id: TodoId) -> Result<(), PlanError> {
        let deps: Vec<TodoId> = self.todo_mut(id)?.deps.iter().copied().collect();
        for dep in &deps {
            if let Some(dep_todo) = self.get(*dep) {
                if dep_todo.status != Status::Completed {
                    return Err(PlanError::DependenciesIncomplete(id));
                }
            }
        }
        let todo = self.todo_mut(id)?;
        if todo.status != Status::Pending {
            return Err(PlanError::InvalidTransition {
                id,
                state: todo.status.label().to_string(),
                attempted: "start".to_string(),
            });
        }
        todo.status = Status::InProgress;
        self.record(id, Status::Pending, Status::InProgress);
        Ok(())
    }

    /// Transition `id` to `Completed`. Requires it to be `InProgress`.
    pub fn complete(&mut self, id: TodoId, result: Option<String>) -> Result<(), PlanError> {
        let todo = self.todo_mut(id)?;
        if todo.status != Status::InProgress {
            return Err(PlanError::InvalidTransition {
                id,
                state: todo.status.label().to_string(),
                attempted: "complete".to_string(),
            });
        }
        todo.status = Status::Completed;
        todo.result = result;
        self.record(id, Status::InProgress, Status::Completed);
        Ok(())
    }

    /// Transition `id` to `Failed`. Descendants stay `Pending` — a failed
    /// dependency simply blocks `start`, it doesn't cascade failure.
    pub fn fail(&mut self, id: TodoId, reason: impl Into<String>) -> Result<(), PlanError> {
        let todo = self.todo_mut(id)?;
        if todo.status != Status::Pending && todo.status != Status::InProgress {
            return Err(PlanError::InvalidTransition {
                id,
                state: todo.status.label().to_string(),
                attempted: "fail".to_string(),
            });
        }
        let from = todo.status;
        todo.status = Status::Failed;
        todo.result = Some(reason.into());
        self.record(id, from, Status::Failed);
        Ok(())
    }

    /// Apply a batch of edits. Computed against a scratch copy first: the
    /// copy is validated for acyclicity and for leaving every already-
    /// `Completed` todo untouched, and only then swapped in. A rejected
    /// replan leaves the live plan unchanged.
    pub fn replan(&mut self, diff: ReplanDiff) -> Result<(), PlanError> {
        let mut scratch = self.arena.clone();

        for op in diff.0 {
            match op {
                ReplanOp::Add { content, deps } => {
                    let id = TodoId(scratch.len() as u32);
                    for dep in &deps {
                        if scratch.get(dep.0 as usize).and_then(|t| t.as_ref()).is_none() {
                            return Err(PlanError::UnknownTodo(*dep));
                        }
                    }
                    scratch.push(Some(Todo {
                        id,
                        content,
                        status: Status::Pending,
                        deps: deps.into_iter().collect(),
                        result: None,
                    }));
                }
                ReplanOp::Remove(id) => {
                    let slot = scratch.get(id.0 as usize).and_then(|t| t.as_ref()).ok_or(PlanError::UnknownTodo(id))?;
                    if slot.status == Status::Completed {
                        return Err(PlanError::ReplanWouldRegressCompletedTodo(id));
                    }
                    scratch[id.0 as usize] = None;
                }
                ReplanOp::Edit { id, content, deps } => {
                    let slot = scratch.get(id.0 as usize).and_then(|t| t.as_ref()).ok_or(PlanError::UnknownTodo(id))?;
                    if slot.status == Status::Completed {
                        return Err(PlanError::ReplanWouldRegressCompletedTodo(id));
                    }
                    if let Some(new_deps) = &deps {
                        for dep in new_deps {
                            if scratch.get(dep.0 as usize).and_then(|t| t.as_ref()).is_none() {
                                return Err(PlanError::UnknownTodo(*dep));
                            }
                        }
                    }
                    let slot = scratch[id.0 as usize].as_mut().unwrap();
                    if let Some(c) = content {
                        slot.content = c;
                    }
                    if let Some(d) = deps {
                        slot.deps = d.into_iter().collect();
                    }
                }
            }
        }

        check_acyclic(&scratch)?;
        for (i, original) in self.arena.iter().enumerate() {
            if let Some(original_todo) = original {
                if original_todo.status == Status::Completed {
                    match &scratch[i] {
                        Some(t) if t.status == Status::Completed => {}
                        _ => return Err(PlanError::ReplanWouldRegressCompletedTodo(TodoId(i as u32))),
                    }
                }
            }
        }

        self.arena = scratch;
        Ok(())
    }
}

fn check_acyclic(arena: &[Option<Todo>]) -> Result<(), PlanError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        InProgress,
        Done,
    }
    let mut marks = vec![Mark::Unvisited; arena.len()];

    fn visit(idx: usize, arena: &[Option<Todo>], marks: &mut [Mark]) -> Result<(), PlanError> {
        match marks[idx] {
            Mark::Done => return Ok(()),
            Mark::InProgress => return Err(PlanError::Cyclic),
            Mark::Unvisited => {}
        }
        marks[idx] = Mark::InProgress;
        if let Some(todo) = &arena[idx] {
            for dep in &todo.deps {
                if (dep.0 as usize) < arena.len() && arena[dep.0 as usize].is_some() {
                    visit(dep.0 as usize, arena, marks)?;
                }
            }
        }
        marks[idx] = Mark::Done;
        Ok(())
    }

    for i in 0..arena.len() {
        if arena[i].is_some() {
            visit(i, arena, &mut marks)?;
        }
    }
    Ok(())
}
