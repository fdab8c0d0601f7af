//! The Executor: the RVR-B loop itself, wired from every collaborating
//! crate into one `layer0::Turn` implementation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use layer0::content::Content;
use layer0::duration::DurationMs;
use layer0::error::{StateError, TurnError};
use layer0::hook::{HookAction, HookContext, HookPoint};
use layer0::id::{SnapshotId, TurnId};
use layer0::scope::Scope;
use layer0::state::{SearchResult, StateReader};
use layer0::turn::{ExitReason, ToolCallRecord, Turn, TurnInput, TurnMetadata, TurnOutput};

use loomcore_context::{ContextBuilder, PrefixSection, StablePrefix};
use loomcore_dispatch::{DispatchContext, ErrorKind, ToolDispatcher, ToolUse as DispatchCall};
use loomcore_hooks::HookRegistry;
use loomcore_intent::{AnalyzeInput, IntentAnalyzer, PlanningDepth};
use loomcore_plan::{Plan, PlanId, Status, TodoDraft};
use loomcore_snapshot::{RollbackScope, SnapshotManager};
use loomcore_termination::{Decision, StopReason as LoopStopReason, TerminationState, TurnBudget};
use loomcore_turn::convert::content_to_user_message;
use loomcore_turn::provider::{Provider, ProviderError};
use loomcore_turn::types::{
    ContentPart, ProviderMessage, ProviderRequest, Role, StopReason as ModelStopReason, ToolSchema,
};

use crate::backtrack::{reflect_deterministic, reflect_logic_error, BacktrackDecision};
use crate::clock::{CancelToken, Clock, IdSource};
use crate::config::ExecutorConfig;
use crate::event::{Event, EventKind, EventSink, SeqCounter};
use crate::hitl::{HitlRequest, RollbackChoice, UserChannel};

/// Why a turn ended in `LoopStopReason::Aborted`, so the post-loop mapping
/// can tell a user-caused abort from a system-caused one instead of
/// collapsing everything into a single generic failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AbortCause {
    /// Cooperative cancellation via `CancelToken` (user or supervisor
    /// requested the turn stop).
    Cancelled,
    /// A hook halted the turn (pre/post inference, pre/post tool use).
    HookHalt,
    /// A clarifying question timed out or was declined.
    HitlDeclined,
    /// Reflect chose `Abort` for an unrecoverable tool outcome.
    BacktrackAbort,
    /// The per-todo backtrack cap was exceeded.
    BacktrackCapExceeded,
}

/// A [`StateReader`] that always reports empty — the fallback for callers
/// with no conversation store wired up yet.
#[derive(Debug, Default)]
pub struct NullStateReader;

#[async_trait]
impl StateReader for NullStateReader {
    async fn read(&self, _scope: &Scope, _key: &str) -> Result<Option<serde_json::Value>, StateError> {
        Ok(None)
    }

    async fn list(&self, _scope: &Scope, _prefix: &str) -> Result<Vec<String>, StateError> {
        Ok(Vec::new())
    }

    async fn search(&self, _scope: &Scope, _query: &str, _limit: usize) -> Result<Vec<SearchResult>, StateError> {
        Ok(Vec::new())
    }
}

/// Everything the loop accumulates across iterations for one turn.
struct LoopState {
    turn_count: u32,
    tokens_in: u64,
    tokens_out: u64,
    cost: Decimal,
    wants_to_stop: bool,
    has_tool_use_or_pending_todo: bool,
    last_backtrack_was_abort: bool,
    abort_cause: Option<AbortCause>,
    backtracks_on_current_todo: u32,
    tools_called: Vec<ToolCallRecord>,
    live_turn: Vec<ProviderMessage>,
    final_text: String,
}

impl LoopState {
    fn tokens_so_far(&self) -> u64 {
        self.tokens_in + self.tokens_out
    }
}

async fn emit(sink: &dyn EventSink, seq: &mut SeqCounter, turn_id: &TurnId, kind: EventKind) {
    sink.send(Event { seq: seq.next(), turn_id: turn_id.clone(), kind }).await;
}

fn block_type_label(part: &ContentPart) -> &'static str {
    match part {
        ContentPart::Text { .. } => "text",
        ContentPart::ToolUse { .. } => "tool_use",
        ContentPart::ToolResult { .. } => "tool_result",
        ContentPart::Image { .. } => "image",
    }
}

fn block_fragment(part: &ContentPart) -> String {
    match part {
        ContentPart::Text { text } => text.clone(),
        ContentPart::ToolUse { name, input, .. } => format!("{name} {input}"),
        ContentPart::ToolResult { content, is_error, .. } => format!("{content} (error={is_error})"),
        ContentPart::Image { media_type, .. } => format!("[image {media_type}]"),
    }
}

fn status_label(status: Status) -> &'static str {
    match status {
        Status::Pending => "pending",
        Status::InProgress => "in_progress",
        Status::Completed => "completed",
        Status::Failed => "failed",
    }
}

fn truncate_output(value: &serde_json::Value, max_chars: usize) -> String {
    let text = value.to_string();
    if text.chars().count() > max_chars {
        let head: String = text.chars().take(max_chars).collect();
        format!("{head}... [truncated]")
    } else {
        text
    }
}

/// Advance a plan by one step after a successful tool call: complete the
/// in-progress todo, or start the next pending one. A plan's shape is
/// fixed for the turn — this is a best-effort tick, not a scheduler.
fn advance_plan_on_success(plan: &mut Plan) -> Option<(loomcore_plan::TodoId, Status, Status)> {
    if let Some(id) = plan.todos().find(|t| t.status == Status::InProgress).map(|t| t.id) {
        let before = plan.get(id).map(|t| t.status).unwrap_or(Status::InProgress);
        if plan.complete(id, None).is_ok() {
            return Some((id, before, Status::Completed));
        }
    } else if let Some(id) = plan.todos().find(|t| t.status == Status::Pending).map(|t| t.id) {
        let before = plan.get(id).map(|t| t.status).unwrap_or(Status::Pending);
        if plan.start(id).is_ok() {
            return Some((id, before, Status::InProgress));
        }
    }
    None
}

/// The RVR-B loop: React (model call), Validate (classify tool outcomes),
/// Reflect (choose a recovery), Backtrack (apply it), bounded by a
/// `TerminationController` and protected by lazy filesystem snapshots.
pub struct Executor<P: Provider> {
    provider: P,
    intent: IntentAnalyzer<P>,
    dispatcher: ToolDispatcher,
    hooks: HookRegistry,
    snapshots: SnapshotManager,
    context_builder: ContextBuilder,
    stable_prefix: StablePrefix,
    state: Arc<dyn StateReader>,
    user_channel: Arc<dyn UserChannel>,
    events: Arc<dyn EventSink>,
    config: ExecutorConfig,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdSource>,
    cancellations: Mutex<HashMap<TurnId, CancelToken>>,
}

impl<P: Provider> Executor<P> {
    /// Assemble an `Executor` from its collaborators. `provider` drives the
    /// loop's own model calls; `intent` owns a separate `P` instance for
    /// its own classification calls — the two are not required to share
    /// state, so `P` never needs to be `Clone`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        provider: P,
        intent: IntentAnalyzer<P>,
        dispatcher: ToolDispatcher,
        hooks: HookRegistry,
        snapshots: SnapshotManager,
        context_builder: ContextBuilder,
        stable_prefix: StablePrefix,
        state: Arc<dyn StateReader>,
        user_channel: Arc<dyn UserChannel>,
        events: Arc<dyn EventSink>,
        config: ExecutorConfig,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdSource>,
    ) -> Self {
        Self {
            provider,
            intent,
            dispatcher,
            hooks,
            snapshots,
            context_builder,
            stable_prefix,
            state,
            user_channel,
            events,
            config,
            clock,
            ids,
            cancellations: Mutex::new(HashMap::new()),
        }
    }

    /// Request cooperative cancellation of an in-flight turn. Has no effect
    /// if `turn_id` isn't currently running — cancellation is best-effort,
    /// observed at the loop's next suspension point.
    pub async fn request_cancel(&self, turn_id: &TurnId) {
        if let Some(token) = self.cancellations.lock().await.get(turn_id) {
            token.cancel();
        }
    }

    async fn recent_turns(&self, session: &Option<layer0::id::SessionId>) -> Vec<String> {
        let Some(session) = session else { return Vec::new() };
        match self.state.read(&Scope::Session(session.clone()), "recent_turns").await {
            Ok(Some(value)) => serde_json::from_value(value).unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    /// Prior turns' messages, for phase-2 decay in `ContextBuilder::build`.
    /// A caller with no state backend (or a stateless turn) sees an empty
    /// history, which is equivalent to skipping decay entirely.
    async fn turn_history(&self, session: &Option<layer0::id::SessionId>) -> Vec<ProviderMessage> {
        let Some(session) = session else { return Vec::new() };
        match self.state.read(&Scope::Session(session.clone()), "turn_history").await {
            Ok(Some(value)) => serde_json::from_value(value).unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    async fn call_provider(&self, request: ProviderRequest) -> Result<loomcore_turn::types::ProviderResponse, ProviderError> {
        const MAX_ATTEMPTS: u32 = 3;
        let mut attempt = 0;
        loop {
            match self.provider.complete(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && attempt + 1 < MAX_ATTEMPTS => {
                    attempt += 1;
                    tracing::warn!(error = %e, attempt, "provider call failed, retrying");
                    tokio::time::sleep(Duration::from_millis(100 * 2u64.pow(attempt))).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn tools_for(&self, allowlist: &std::collections::HashSet<String>) -> Vec<ToolSchema> {
        self.dispatcher
            .registry()
            .iter()
            .filter(|t| allowlist.contains(t.name()))
            .map(|t| ToolSchema { name: t.name().to_string(), description: t.description().to_string(), input_schema: t.input_schema() })
            .collect()
    }
}

#[async_trait]
impl<P: Provider> Turn for Executor<P> {
    async fn execute(&self, input: TurnInput) -> Result<TurnOutput, TurnError> {
        let turn_start = self.clock.now_millis();
        let turn_id = TurnId::new(self.ids.next_id());
        let snapshot_id = SnapshotId::new(self.ids.next_id());
        let mut seq = SeqCounter::default();
        emit(self.events.as_ref(), &mut seq, &turn_id, EventKind::SessionStart).await;

        let analyze_input = AnalyzeInput {
            user_text: input.message.as_text().unwrap_or_default().to_string(),
            conversation_signature: input.session.as_ref().map(|s| s.as_str().to_string()).unwrap_or_else(|| "no-session".into()),
            recent_turns: self.recent_turns(&input.session).await,
            available_skills: Vec::new(),
            has_active_plan: false,
        };
        let fp = self.intent.analyze(analyze_input).await;

        if fp.wants_to_stop {
            emit(self.events.as_ref(), &mut seq, &turn_id, EventKind::TurnComplete).await;
            let mut output = TurnOutput::new(Content::text(""), ExitReason::Complete);
            output.metadata.duration = DurationMs::from_millis(self.clock.now_millis().saturating_sub(turn_start));
            return Ok(output);
        }

        let turn_config = input.config.clone().unwrap_or_default();
        let tier = self.config.budget_for(fp.complexity);
        let max_turns = turn_config.max_turns.unwrap_or(tier.max_turns);
        let max_total_tokens = turn_config.max_total_tokens.unwrap_or(tier.max_total_tokens);
        let max_duration_millis = turn_config.max_duration.map(|d| d.as_millis()).unwrap_or(tier.max_duration_millis);
        let mut budget = TurnBudget::new(max_turns, max_total_tokens, turn_start + max_duration_millis);

        let allowlist = match &turn_config.allowed_tools {
            Some(restricted) => fp.tool_allowlist.iter().filter(|t| restricted.contains(t)).cloned().collect(),
            None => fp.tool_allowlist.clone(),
        };

        let mut plan = if fp.planning_depth == PlanningDepth::Full {
            let content = input.message.as_text().unwrap_or("complete the requested task").to_string();
            match Plan::create(PlanId::new(self.ids.next_id()), vec![TodoDraft::new(content)]) {
                Ok(p) => Some(p),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to create plan, proceeding without one");
                    None
                }
            }
        } else {
            None
        };

        let mut stable_prefix = self.stable_prefix.clone();
        if let Some(addendum) = &turn_config.system_addendum {
            stable_prefix.add_section(PrefixSection { label: "Turn addendum".into(), content: addendum.clone(), priority: u32::MAX });
        }

        let history = self.turn_history(&input.session).await;

        let cancel = CancelToken::new();
        self.cancellations.lock().await.insert(turn_id.clone(), cancel.clone());
        let handle = self.snapshots.begin(turn_id.clone(), snapshot_id).await;

        let mut state = LoopState {
            turn_count: 0,
            tokens_in: 0,
            tokens_out: 0,
            cost: Decimal::ZERO,
            wants_to_stop: false,
            has_tool_use_or_pending_todo: true,
            last_backtrack_was_abort: false,
            abort_cause: None,
            backtracks_on_current_todo: 0,
            tools_called: Vec::new(),
            live_turn: vec![content_to_user_message(&input.message)],
            final_text: String::new(),
        };

        let stop_reason = 'turn: loop {
            if cancel.is_cancelled() {
                state.final_text = "cancelled".into();
                state.abort_cause = Some(AbortCause::Cancelled);
                break 'turn LoopStopReason::Aborted;
            }

            let decision = loomcore_termination::evaluate(
                &budget,
                &TerminationState {
                    turn_count: state.turn_count,
                    tokens_so_far: state.tokens_so_far(),
                    now_millis: self.clock.now_millis(),
                    wants_to_stop: state.wants_to_stop,
                    has_tool_use_or_pending_todo: state.has_tool_use_or_pending_todo,
                    last_backtrack_was_abort: state.last_backtrack_was_abort,
                },
            );

            match decision {
                Decision::Continue => {}
                Decision::SuspendForConfirmation => {
                    emit(self.events.as_ref(), &mut seq, &turn_id, EventKind::LongRunConfirm { turns_so_far: state.turn_count }).await;
                    if self.user_channel.ask_continue(&turn_id, state.turn_count).await {
                        budget.user_confirmed_continue = true;
                        continue;
                    } else {
                        break 'turn LoopStopReason::WantsToStop;
                    }
                }
                Decision::Stop(reason) => break 'turn reason,
            }

            let build = self.context_builder.build(turn_id.clone(), &stable_prefix, history.clone(), state.live_turn.clone());
            emit(
                self.events.as_ref(),
                &mut seq,
                &turn_id,
                EventKind::ContextUsageUpdate { current_tokens: build.current_tokens, budget_tokens: build.budget_tokens, color_level: build.color_level },
            )
            .await;
            if let Some(layer0::lifecycle::CompactionEvent::CompactionComplete { tokens_freed, .. }) = &build.trimming {
                emit(self.events.as_ref(), &mut seq, &turn_id, EventKind::ContextTrimmingDone { tokens_saved: *tokens_freed }).await;
            }

            let mut pre_inference_ctx = HookContext::new(HookPoint::PreInference);
            pre_inference_ctx.tokens_used = state.tokens_so_far();
            pre_inference_ctx.cost = state.cost;
            pre_inference_ctx.turns_completed = state.turn_count;
            pre_inference_ctx.elapsed = DurationMs::from_millis(self.clock.now_millis().saturating_sub(turn_start));
            if let HookAction::Halt { reason } = self.hooks.dispatch(&pre_inference_ctx).await {
                state.final_text = reason;
                state.last_backtrack_was_abort = true;
                state.abort_cause = Some(AbortCause::HookHalt);
                break 'turn LoopStopReason::Aborted;
            }

            let request = ProviderRequest {
                model: turn_config.model.clone(),
                messages: build.messages,
                tools: self.tools_for(&allowlist),
                max_tokens: None,
                temperature: None,
                system: None,
                extra: serde_json::Value::Null,
            };

            let response = match self.call_provider(request).await {
                Ok(r) => r,
                Err(e) => {
                    self.cancellations.lock().await.remove(&turn_id);
                    return Err(TurnError::Model(e.to_string()));
                }
            };

            state.tokens_in += response.usage.input_tokens;
            state.tokens_out += response.usage.output_tokens;
            if let Some(cost) = response.cost {
                state.cost += cost;
            }
            emit(
                self.events.as_ref(),
                &mut seq,
                &turn_id,
                EventKind::TokenUsage { tokens_in: state.tokens_in, tokens_out: state.tokens_out },
            )
            .await;

            for (index, part) in response.content.iter().enumerate() {
                emit(self.events.as_ref(), &mut seq, &turn_id, EventKind::ContentStart { index, block_type: block_type_label(part) }).await;
                emit(self.events.as_ref(), &mut seq, &turn_id, EventKind::ContentDelta { index, fragment: block_fragment(part) }).await;
                emit(self.events.as_ref(), &mut seq, &turn_id, EventKind::ContentStop { index }).await;
            }

            let mut post_inference_ctx = HookContext::new(HookPoint::PostInference);
            post_inference_ctx.model_output = Some(loomcore_turn::convert::parts_to_content(&response.content));
            post_inference_ctx.tokens_used = state.tokens_so_far();
            post_inference_ctx.turns_completed = state.turn_count;
            if let HookAction::Halt { reason } = self.hooks.dispatch(&post_inference_ctx).await {
                state.final_text = reason;
                state.last_backtrack_was_abort = true;
                state.abort_cause = Some(AbortCause::HookHalt);
                break 'turn LoopStopReason::Aborted;
            }

            state.turn_count += 1;

            match response.stop_reason {
                ModelStopReason::MaxTokens | ModelStopReason::ContentFilter => {
                    self.cancellations.lock().await.remove(&turn_id);
                    return Err(TurnError::Model(format!("provider stopped early: {:?}", response.stop_reason)));
                }
                ModelStopReason::EndTurn => {
                    state.final_text = response
                        .content
                        .iter()
                        .find_map(|p| match p {
                            ContentPart::Text { text } => Some(text.clone()),
                            _ => None,
                        })
                        .unwrap_or_default();
                    let plan_pending = plan.as_ref().is_some_and(|p| p.todos().any(|t| t.status == Status::Pending || t.status == Status::InProgress));
                    state.has_tool_use_or_pending_todo = plan_pending;
                }
                ModelStopReason::ToolUse => {
                    state.has_tool_use_or_pending_todo = true;
                    let mut guidance = Vec::new();
                    let mut aborted_in_round = false;

                    for part in &response.content {
                        let ContentPart::ToolUse { id, name, input: tool_input } = part else { continue };
                        emit(self.events.as_ref(), &mut seq, &turn_id, EventKind::ToolCall { name: name.clone(), tool_use_id: id.clone() }).await;

                        let mut pre_tool_ctx = HookContext::new(HookPoint::PreToolUse);
                        pre_tool_ctx.tool_name = Some(name.clone());
                        pre_tool_ctx.tool_input = Some(tool_input.clone());
                        let mut effective_input = tool_input.clone();
                        match self.hooks.dispatch(&pre_tool_ctx).await {
                            HookAction::Halt { reason } => {
                                state.final_text = reason;
                                state.last_backtrack_was_abort = true;
                                state.abort_cause = Some(AbortCause::HookHalt);
                                aborted_in_round = true;
                                break;
                            }
                            HookAction::SkipTool { reason } => {
                                state.live_turn.push(ProviderMessage {
                                    role: Role::User,
                                    content: vec![ContentPart::ToolResult { tool_use_id: id.clone(), content: format!("skipped: {reason}"), is_error: true }],
                                });
                                emit(self.events.as_ref(), &mut seq, &turn_id, EventKind::ToolResult { tool_use_id: id.clone(), is_error: true }).await;
                                continue;
                            }
                            HookAction::ModifyToolInput { new_input } => effective_input = new_input,
                            _ => {}
                        }

                        let call = DispatchCall { id: id.clone(), name: name.clone(), input: effective_input };
                        let dispatch_ctx = DispatchContext { turn_id: turn_id.clone(), snapshot: Some((&self.snapshots, &handle)) };
                        let started = self.clock.now_millis();
                        let outcome = self.dispatcher.dispatch(call, &dispatch_ctx).await;
                        let elapsed = DurationMs::from_millis(self.clock.now_millis().saturating_sub(started));

                        let mut output_value = outcome.result.output.clone();
                        let mut is_error = outcome.result.is_error;
                        let mut post_tool_ctx = HookContext::new(HookPoint::PostToolUse);
                        post_tool_ctx.tool_name = Some(name.clone());
                        post_tool_ctx.tool_result = Some(output_value.to_string());
                        match self.hooks.dispatch(&post_tool_ctx).await {
                            HookAction::Halt { reason } => {
                                state.final_text = reason;
                                state.last_backtrack_was_abort = true;
                                state.abort_cause = Some(AbortCause::HookHalt);
                                aborted_in_round = true;
                                break;
                            }
                            HookAction::ModifyToolOutput { new_output } => output_value = new_output,
                            _ => {}
                        }

                        state.tools_called.push(ToolCallRecord::new(name.clone(), elapsed, !is_error));
                        let truncated = truncate_output(&output_value, self.config.max_tool_output_chars);
                        state.live_turn.push(ProviderMessage {
                            role: Role::User,
                            content: vec![ContentPart::ToolResult { tool_use_id: id.clone(), content: truncated.clone(), is_error }],
                        });
                        emit(self.events.as_ref(), &mut seq, &turn_id, EventKind::ToolResult { tool_use_id: id.clone(), is_error }).await;

                        if let Some(kind) = outcome.error_kind {
                            let decision = match reflect_deterministic(kind, name, &truncated) {
                                Some(d) => d,
                                None => reflect_logic_error(&self.provider, name, &truncated).await,
                            };

                            match decision {
                                BacktrackDecision::Continue => {}
                                BacktrackDecision::ParamAdjust { hints } => {
                                    state.backtracks_on_current_todo += 1;
                                    guidance.push(format!("Adjust your arguments to `{name}`: {hints}"));
                                }
                                BacktrackDecision::ToolReplace { new_tool } => {
                                    state.backtracks_on_current_todo += 1;
                                    guidance.push(format!("Try `{new_tool}` instead of `{name}`."));
                                }
                                BacktrackDecision::PlanReplan { reason } => {
                                    state.backtracks_on_current_todo += 1;
                                    tracing::info!(%reason, "reflect requested a replan");
                                    guidance.push(format!("Replanning needed: {reason}"));
                                }
                                BacktrackDecision::ContextEnrich { query } => {
                                    state.backtracks_on_current_todo += 1;
                                    guidance.push(format!("Additional context requested: {query}"));
                                }
                                BacktrackDecision::IntentClarify { question } => {
                                    emit(self.events.as_ref(), &mut seq, &turn_id, EventKind::HitlConfirm { request: question.clone() }).await;
                                    let request = HitlRequest {
                                        turn_id: turn_id.clone(),
                                        question: question.clone(),
                                        timeout: Duration::from_millis(self.config.hitl_timeout_millis),
                                    };
                                    match self.user_channel.ask_clarification(request).await {
                                        Some(answer) => guidance.push(answer),
                                        None => {
                                            state.final_text = format!("clarification for `{name}` timed out or was declined");
                                            state.last_backtrack_was_abort = true;
                                            state.abort_cause = Some(AbortCause::HitlDeclined);
                                        }
                                    }
                                }
                                BacktrackDecision::Abort { reason } => {
                                    state.final_text = reason;
                                    state.last_backtrack_was_abort = true;
                                    state.abort_cause = Some(AbortCause::BacktrackAbort);
                                }
                            }

                            if state.backtracks_on_current_todo >= self.config.max_backtracks_per_todo {
                                state.last_backtrack_was_abort = true;
                                state.abort_cause = Some(AbortCause::BacktrackCapExceeded);
                                state.final_text = format!("exceeded {} backtracks on `{name}`", self.config.max_backtracks_per_todo);
                            }
                        } else {
                            state.backtracks_on_current_todo = 0;
                            if let Some(plan) = plan.as_mut() {
                                if let Some((todo, from, to)) = advance_plan_on_success(plan) {
                                    emit(
                                        self.events.as_ref(),
                                        &mut seq,
                                        &turn_id,
                                        EventKind::PlanUpdate { todo, from: status_label(from).to_string(), to: status_label(to).to_string() },
                                    )
                                    .await;
                                }
                            }
                        }

                        if state.last_backtrack_was_abort {
                            break;
                        }
                    }

                    if aborted_in_round {
                        break 'turn LoopStopReason::Aborted;
                    }
                    if !guidance.is_empty() {
                        state.live_turn.push(ProviderMessage { role: Role::User, content: vec![ContentPart::Text { text: guidance.join("\n") }] });
                    }
                }
            }
        };

        self.cancellations.lock().await.remove(&turn_id);

        let should_commit = matches!(
            stop_reason,
            LoopStopReason::NaturalEnd | LoopStopReason::TokenBudgetExhausted | LoopStopReason::DeadlineExhausted
        ) || ((stop_reason == LoopStopReason::Aborted || stop_reason == LoopStopReason::WantsToStop) && self.config.commit_on_abort);

        if should_commit {
            if let Err(e) = self.snapshots.commit(&handle).await {
                tracing::warn!(error = %e, "snapshot commit failed");
            }
        } else {
            let paths = self.snapshots.captured_paths(&handle).await.unwrap_or_default();
            let choice = if paths.is_empty() {
                RollbackChoice::All
            } else {
                self.user_channel.offer_rollback(&turn_id, &paths).await
            };
            let scope = match choice {
                RollbackChoice::All => RollbackScope::All,
                RollbackChoice::Paths(selected) => RollbackScope::Paths(selected.into_iter().map(std::path::PathBuf::from).collect()),
            };
            match self.snapshots.rollback(&handle, scope).await {
                Ok(_) => emit(self.events.as_ref(), &mut seq, &turn_id, EventKind::RollbackOffered).await,
                Err(e) => tracing::warn!(error = %e, "snapshot rollback failed"),
            }
        }

        // `Aborted` covers several distinct causes; only the ones a user
        // actually triggered (cancelling, or declining/timing out a
        // clarification) surface as `UserAbort` rather than a generic
        // `Error`.
        let exit_reason = match stop_reason {
            LoopStopReason::WantsToStop => ExitReason::UserAbort,
            LoopStopReason::TokenBudgetExhausted => ExitReason::BudgetExhausted,
            LoopStopReason::DeadlineExhausted => ExitReason::Timeout,
            LoopStopReason::NaturalEnd => ExitReason::Complete,
            LoopStopReason::Aborted => match state.abort_cause {
                Some(AbortCause::Cancelled) | Some(AbortCause::HitlDeclined) => ExitReason::UserAbort,
                _ => ExitReason::Error,
            },
        };

        if matches!(exit_reason, ExitReason::Complete) {
            emit(self.events.as_ref(), &mut seq, &turn_id, EventKind::TurnComplete).await;
        } else {
            emit(
                self.events.as_ref(),
                &mut seq,
                &turn_id,
                EventKind::TurnFailed { reason: exit_reason.clone(), detail: state.final_text.clone() },
            )
            .await;
        }

        let mut output = TurnOutput::new(Content::text(state.final_text), exit_reason);
        output.metadata = TurnMetadata {
            tokens_in: state.tokens_in,
            tokens_out: state.tokens_out,
            cost: state.cost,
            turns_used: state.turn_count,
            tools_called: state.tools_called,
            duration: DurationMs::from_millis(self.clock.now_millis().saturating_sub(turn_start)),
        };
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{CounterIdSource, SystemClock};
    use crate::hitl::NullUserChannel;
    use layer0::turn::TriggerType;
    use loomcore_context::ContextConfig;
    use loomcore_dispatch::{PolicyEngine, PolicyRule};
    use loomcore_intent::PlanningDepth;
    use loomcore_tool::{ToolDyn, ToolError, ToolRegistry};
    use loomcore_turn::types::{ProviderResponse, TokenUsage};
    use std::collections::HashSet;
    use std::collections::VecDeque;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex as StdMutex;

    struct ScriptedProvider {
        responses: StdMutex<VecDeque<ProviderResponse>>,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<ProviderResponse>) -> Self {
            Self { responses: StdMutex::new(responses.into_iter().collect()) }
        }
    }

    impl Provider for ScriptedProvider {
        async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            let mut guard = self.responses.lock().unwrap();
            guard.pop_front().ok_or_else(|| ProviderError::RequestFailed("no more scripted responses".into()))
        }
    }

    fn text_response(text: &str, stop_reason: ModelStopReason) -> ProviderResponse {
        ProviderResponse {
            content: vec![ContentPart::Text { text: text.to_string() }],
            stop_reason,
            usage: TokenUsage::default(),
            model: "test".into(),
            cost: None,
            truncated: None,
        }
    }

    fn tool_use_response(id: &str, name: &str) -> ProviderResponse {
        ProviderResponse {
            content: vec![ContentPart::ToolUse { id: id.into(), name: name.into(), input: serde_json::json!({}) }],
            stop_reason: ModelStopReason::ToolUse,
            usage: TokenUsage::default(),
            model: "test".into(),
            cost: None,
            truncated: None,
        }
    }

    fn intent_fingerprint_json(wants_to_stop: bool) -> &'static str {
        if wants_to_stop {
            r#"{"complexity":"simple","selected_skills":[],"wants_to_stop":true,"planning_depth":"none"}"#
        } else {
            r#"{"complexity":"simple","selected_skills":[],"wants_to_stop":false,"planning_depth":"none"}"#
        }
    }

    fn input(text: &str) -> TurnInput {
        TurnInput::new(Content::text(text), TriggerType::User)
    }

    struct Harness {
        executor: Executor<ScriptedProvider>,
        _root: tempfile::TempDir,
    }

    fn build_executor(intent_responses: Vec<ProviderResponse>, exec_responses: Vec<ProviderResponse>, dispatcher: ToolDispatcher, config: ExecutorConfig) -> Harness {
        let root = tempfile::tempdir().unwrap();
        let intent_provider = ScriptedProvider::new(intent_responses);
        let analyzer = IntentAnalyzer::new(intent_provider, None, vec![], HashSet::new());
        let exec_provider = ScriptedProvider::new(exec_responses);
        let executor = Executor::new(
            exec_provider,
            analyzer,
            dispatcher,
            HookRegistry::new(),
            SnapshotManager::new(root.path()),
            ContextBuilder::new(ContextConfig::default(), vec![]),
            StablePrefix::new(),
            Arc::new(NullStateReader),
            Arc::new(NullUserChannel),
            Arc::new(crate::event::NullEventSink),
            config,
            Arc::new(SystemClock),
            Arc::new(CounterIdSource::new()),
        );
        Harness { executor, _root: root }
    }

    fn empty_dispatcher() -> ToolDispatcher {
        ToolDispatcher::new(ToolRegistry::new(), PolicyEngine::allow_all(), [])
    }

    #[tokio::test]
    async fn wants_to_stop_skips_the_loop_and_touches_no_snapshot_directory() {
        let harness = build_executor(vec![text_response(intent_fingerprint_json(true), ModelStopReason::EndTurn)], vec![], empty_dispatcher(), ExecutorConfig::default());
        let output = harness.executor.execute(input("please stop")).await.unwrap();
        assert_eq!(output.exit_reason, ExitReason::Complete);
        let mut entries = tokio::fs::read_dir(harness._root.path()).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn end_turn_with_no_tools_completes_naturally() {
        let harness = build_executor(
            vec![text_response(intent_fingerprint_json(false), ModelStopReason::EndTurn)],
            vec![text_response("hello there", ModelStopReason::EndTurn)],
            empty_dispatcher(),
            ExecutorConfig::default(),
        );
        let output = harness.executor.execute(input("hi")).await.unwrap();
        assert_eq!(output.exit_reason, ExitReason::Complete);
        assert_eq!(output.message, Content::text("hello there"));
        assert!(output.metadata.tools_called.is_empty());
    }

    struct FlakyTool;
    impl ToolDyn for FlakyTool {
        fn name(&self) -> &str {
            "flaky"
        }
        fn description(&self) -> &str {
            "fails with a transient error"
        }
        fn input_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        fn call(&self, _input: serde_json::Value) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, ToolError>> + Send + '_>> {
            Box::pin(async { Err(ToolError::ExecutionFailed("temporary failure".into())) })
        }
    }

    #[tokio::test]
    async fn transient_tool_error_backtracks_to_continue_and_then_completes() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(FlakyTool));
        let dispatcher = ToolDispatcher::new(registry, PolicyEngine::allow_all(), []);

        let harness = build_executor(
            vec![text_response(intent_fingerprint_json(false), ModelStopReason::EndTurn)],
            vec![tool_use_response("call_1", "flaky"), text_response("done", ModelStopReason::EndTurn)],
            dispatcher,
            ExecutorConfig::default(),
        );
        let output = harness.executor.execute(input("do the flaky thing")).await.unwrap();
        assert_eq!(output.exit_reason, ExitReason::Complete);
        assert_eq!(output.metadata.tools_called.len(), 1);
        assert!(!output.metadata.tools_called[0].success);
    }

    #[tokio::test]
    async fn policy_denied_tool_suspends_for_clarification_and_user_aborts_on_no_channel() {
        let policy = PolicyEngine::from_rules(vec![PolicyRule { pattern: "locked_tool *".into(), decision: loomcore_dispatch::PolicyDecision::Deny }]).unwrap();
        let dispatcher = ToolDispatcher::new(ToolRegistry::new(), policy, []);

        let harness = build_executor(
            vec![text_response(intent_fingerprint_json(false), ModelStopReason::EndTurn)],
            vec![tool_use_response("call_1", "locked_tool")],
            dispatcher,
            ExecutorConfig::default(),
        );
        let output = harness.executor.execute(input("do the locked thing")).await.unwrap();
        assert_eq!(output.exit_reason, ExitReason::UserAbort);
    }

    #[tokio::test]
    async fn token_budget_exhaustion_stops_the_turn() {
        let mut config = ExecutorConfig::default();
        config.simple.max_total_tokens = 1;
        let harness = build_executor(
            vec![text_response(intent_fingerprint_json(false), ModelStopReason::EndTurn)],
            vec![ProviderResponse {
                content: vec![ContentPart::Text { text: "partial".into() }],
                stop_reason: ModelStopReason::EndTurn,
                usage: TokenUsage { input_tokens: 100, output_tokens: 100, cache_read_tokens: None, cache_creation_tokens: None },
                model: "test".into(),
                cost: None,
                truncated: None,
            }],
            empty_dispatcher(),
            config,
        );
        let output = harness.executor.execute(input("hi")).await.unwrap();
        assert_eq!(output.exit_reason, ExitReason::BudgetExhausted);
        assert_eq!(output.metadata.tokens_in, 100);
        assert_eq!(output.metadata.tokens_out, 100);
    }

    fn tool_use_with_input(id: &str, name: &str, input: serde_json::Value) -> ProviderResponse {
        ProviderResponse {
            content: vec![ContentPart::ToolUse { id: id.into(), name: name.into(), input }],
            stop_reason: ModelStopReason::ToolUse,
            usage: TokenUsage::default(),
            model: "test".into(),
            cost: None,
            truncated: None,
        }
    }

    struct WriteTool;
    impl ToolDyn for WriteTool {
        fn name(&self) -> &str {
            "write"
        }
        fn description(&self) -> &str {
            "writes input.content to input.path"
        }
        fn input_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        fn call(&self, input: serde_json::Value) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, ToolError>> + Send + '_>> {
            Box::pin(async move {
                let path = input["path"].as_str().unwrap().to_string();
                let content = input["content"].as_str().unwrap().to_string();
                tokio::fs::write(&path, content.as_bytes()).await.map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
                Ok(serde_json::json!({"wrote": path}))
            })
        }
    }

    /// Halts the turn after the second `PostToolUse` it observes — enough
    /// to let two mutating writes land before the turn gives up.
    struct HaltAfterNWrites(std::sync::atomic::AtomicU32, u32);
    #[async_trait::async_trait]
    impl layer0::hook::Hook for HaltAfterNWrites {
        fn points(&self) -> &[HookPoint] {
            &[HookPoint::PostToolUse]
        }
        async fn on_event(&self, _ctx: &HookContext) -> Result<HookAction, layer0::error::HookError> {
            let count = self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
            if count >= self.1 {
                Ok(HookAction::Halt { reason: "enough writes for this turn".into() })
            } else {
                Ok(HookAction::Continue)
            }
        }
    }

    /// Always offers to roll back only the paths the test tells it to.
    struct ChoosePaths(Vec<String>);
    #[async_trait]
    impl UserChannel for ChoosePaths {
        async fn ask_clarification(&self, _request: HitlRequest) -> Option<String> {
            None
        }
        async fn ask_continue(&self, _turn_id: &TurnId, _turns_so_far: u32) -> bool {
            false
        }
        async fn offer_rollback(&self, _turn_id: &TurnId, _paths: &[String]) -> RollbackChoice {
            RollbackChoice::Paths(self.0.clone())
        }
    }

    #[tokio::test]
    async fn hook_halt_maps_to_generic_error_and_honors_a_selective_rollback_choice() {
        let work = tempfile::tempdir().unwrap();
        let f1 = work.path().join("a.txt");
        let f2 = work.path().join("b.txt");
        tokio::fs::write(&f1, b"a-original").await.unwrap();
        tokio::fs::write(&f2, b"b-original").await.unwrap();
        let f1_str = f1.to_string_lossy().to_string();
        let f2_str = f2.to_string_lossy().to_string();

        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(WriteTool));
        let dispatcher = ToolDispatcher::new(registry, PolicyEngine::allow_all(), ["write".to_string()]);

        let mut hooks = HookRegistry::new();
        hooks.add(Arc::new(HaltAfterNWrites(std::sync::atomic::AtomicU32::new(0), 2)));

        let root = tempfile::tempdir().unwrap();
        let intent_provider = ScriptedProvider::new(vec![text_response(intent_fingerprint_json(false), ModelStopReason::EndTurn)]);
        let analyzer = IntentAnalyzer::new(intent_provider, None, vec![], HashSet::new());
        let exec_provider = ScriptedProvider::new(vec![
            tool_use_with_input("call_1", "write", serde_json::json!({"path": f1_str, "content": "a-modified"})),
            tool_use_with_input("call_2", "write", serde_json::json!({"path": f2_str, "content": "b-modified"})),
        ]);
        let executor = Executor::new(
            exec_provider,
            analyzer,
            dispatcher,
            hooks,
            SnapshotManager::new(root.path()),
            ContextBuilder::new(ContextConfig::default(), vec![]),
            StablePrefix::new(),
            Arc::new(NullStateReader),
            Arc::new(ChoosePaths(vec![f1_str.clone()])),
            Arc::new(crate::event::NullEventSink),
            ExecutorConfig::default(),
            Arc::new(SystemClock),
            Arc::new(CounterIdSource::new()),
        );

        let output = executor.execute(input("write both files")).await.unwrap();
        assert_eq!(output.exit_reason, ExitReason::Error);

        assert_eq!(tokio::fs::read(&f1).await.unwrap(), b"a-original");
        assert_eq!(tokio::fs::read(&f2).await.unwrap(), b"b-modified");
    }
}
