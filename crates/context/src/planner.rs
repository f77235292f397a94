//! Planner / Orchestrator - the top-level state machine of a run
//!
//! `Init -> Decomposing -> InitialAnswering -> SufficiencyCheck ->
//! (Refining -> RefinementAnswering -> SufficiencyCheck)* -> Assembling -> Done`
//!
//! The planner is the only owner of mutable run state: the accumulator, the
//! citation registry and the budget. Cycles only see a shared read-only
//! context. Events and persisted messages are emitted from here, after each
//! round's fan-in.

use crate::aggregator::Accumulator;
use crate::assembler::{self, AssemblyInput};
use crate::budget::{BudgetState, BudgetTracker, Decision, StopReason};
use crate::calls::bounded;
use crate::citations::CitationRegistry;
use crate::cycle::{evidence, CycleContext};
use crate::decomposition::decompose;
use crate::events::{ProgressEvent, SubAnswerUpdate};
use crate::refinement::refine;
use crate::runner::{dispatch_round, RoundOutcome};
use chrono::{DateTime, Utc};
use citeforge_common::errors::{AppError, Result};
use citeforge_common::models::{LogEntry, Question, RetrievedSection, RunResult, Termination};
use citeforge_common::{MessageRole, MessageSink};
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlannerState {
    Init,
    Decomposing,
    InitialAnswering,
    SufficiencyCheck,
    Refining,
    RefinementAnswering,
    Assembling,
    Done,
}

impl fmt::Display for PlannerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlannerState::Init => "init",
            PlannerState::Decomposing => "decomposing",
            PlannerState::InitialAnswering => "initial_answering",
            PlannerState::SufficiencyCheck => "sufficiency_check",
            PlannerState::Refining => "refining",
            PlannerState::RefinementAnswering => "refinement_answering",
            PlannerState::Assembling => "assembling",
            PlannerState::Done => "done",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Transition {
    pub from: PlannerState,
    pub to: PlannerState,
    pub at: DateTime<Utc>,
}

/// Drives one run from question to `RunResult`
pub struct Orchestrator {
    ctx: Arc<CycleContext>,
    sink: Arc<dyn MessageSink>,
    events: mpsc::Sender<ProgressEvent>,
    token: CancellationToken,
    state: PlannerState,
    transitions: Vec<Transition>,
    log: Vec<LogEntry>,
}

impl Orchestrator {
    pub fn new(
        ctx: Arc<CycleContext>,
        sink: Arc<dyn MessageSink>,
        events: mpsc::Sender<ProgressEvent>,
        token: CancellationToken,
    ) -> Self {
        Self {
            ctx,
            sink,
            events,
            token,
            state: PlannerState::Init,
            transitions: Vec::new(),
            log: Vec::new(),
        }
    }

    pub fn state(&self) -> PlannerState {
        self.state
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    /// Run to completion. Only cancellation is returned as an error.
    pub async fn run(&mut self, question: &str) -> Result<RunResult> {
        let original = Question::original(question);
        let config = self.ctx.config.clone();
        let tracker = BudgetTracker::new(config.max_rounds, config.max_budget)
            .with_signal_limit(config.max_insufficient_signals);

        let mut budget = tracker.init();
        let mut accumulator = Accumulator::new();
        let mut registry = CitationRegistry::new();
        let mut direct_evidence: Vec<RetrievedSection> = Vec::new();

        let termination = 'answering: {
            let mut pending = if config.decomposition_enabled {
                self.transition(PlannerState::Decomposing).await;
                let started = Utc::now();
                let (decomposed, gathered) = self
                    .cancellable(async {
                        let gather = async {
                            if config.direct_retrieval_enabled {
                                evidence::gather(&self.ctx, original.text()).await
                            } else {
                                Vec::new()
                            }
                        };
                        let (decomposed, gathered) =
                            tokio::join!(decompose(self.ctx.llm.as_ref(), &original, &config), gather);
                        Ok((decomposed, gathered))
                    })
                    .await?;
                direct_evidence = gathered;
                if config.direct_retrieval_enabled {
                    self.log_step("direct retrieval", started, format!("{} sections", direct_evidence.len()));
                }

                match decomposed {
                    Ok(questions) => {
                        self.log_step("decompose", started, format!("{} sub-questions", questions.len()));
                        if questions.is_empty() {
                            break 'answering Termination::EmptyDecomposition;
                        }
                        questions
                    }
                    Err(e) if e.is_cancelled() => return Err(e),
                    Err(e) => break 'answering interface_failure(&e),
                }
            } else {
                vec![original.clone()]
            };

            self.transition(PlannerState::InitialAnswering).await;

            loop {
                let round = budget.iteration_nr + 1;
                self.emit(ProgressEvent::QuestionsPlanned {
                    round,
                    questions: pending.iter().map(|q| (q.id(), q.text().to_string())).collect(),
                })
                .await;

                let started = Utc::now();
                let outcome = dispatch_round(Arc::clone(&self.ctx), pending, round, &self.token).await?;
                self.log_step(
                    "answer round",
                    started,
                    format!("round {} with {} sub-questions", round, outcome.answers.len()),
                );

                let (next_budget, fan_in) = self.fan_in(&tracker, budget, outcome, &mut registry, &mut accumulator).await;
                budget = next_budget;

                if round == 1 {
                    registry.assign_all(&direct_evidence);
                }
                if self.token.is_cancelled() {
                    return Err(AppError::Cancelled);
                }

                if let Some(e) = fan_in {
                    break 'answering interface_failure(&e);
                }

                self.transition(PlannerState::SufficiencyCheck).await;
                let signal = accumulator.signal();
                budget = tracker.record_signal(budget, &signal);

                match tracker.decide_continue(&budget, &signal) {
                    Decision::Stop(reason) => {
                        tracing::info!(run_id = %self.ctx.run_id, reason = ?reason, "Refinement stopped");
                        break 'answering termination_for(reason);
                    }
                    Decision::ContinueRefine => {}
                }

                self.transition(PlannerState::Refining).await;
                let started = Utc::now();
                let refined = self
                    .cancellable(refine(self.ctx.llm.as_ref(), &original, &accumulator, round + 1, &config))
                    .await;

                pending = match refined {
                    Ok(questions) if questions.is_empty() => {
                        break 'answering Termination::NoFurtherRefinement;
                    }
                    Ok(questions) => {
                        self.log_step("refine", started, format!("{} refined questions", questions.len()));
                        questions
                    }
                    Err(e) if e.is_cancelled() => return Err(e),
                    Err(e) => break 'answering interface_failure(&e),
                };

                self.transition(PlannerState::RefinementAnswering).await;
            }
        };

        self.transition(PlannerState::Assembling).await;
        // Early stops skip the first fan-in
        registry.assign_all(&direct_evidence);

        let input = AssemblyInput {
            run_id: self.ctx.run_id,
            question: original,
            accumulator,
            registry,
            evidence: direct_evidence,
            termination,
            log: std::mem::take(&mut self.log),
        };
        let result = self
            .cancellable(async { Ok(assembler::assemble(self.ctx.llm.as_ref(), &config, input).await) })
            .await?;

        self.persist(MessageRole::Assistant, &result.final_answer_text).await;
        self.transition(PlannerState::Done).await;
        Ok(result)
    }

    /// Round fan-in: number citations, persist, merge, then charge the budget
    async fn fan_in(
        &self,
        tracker: &BudgetTracker,
        budget: BudgetState,
        outcome: RoundOutcome,
        registry: &mut CitationRegistry,
        accumulator: &mut Accumulator,
    ) -> (BudgetState, Option<AppError>) {
        let cost = outcome.cost();
        let RoundOutcome {
            round,
            answers,
            interface_failure,
        } = outcome;

        registry.assign_round(&answers);

        for answer in &answers {
            let rendered = registry.render(answer);
            self.persist(
                MessageRole::Agent,
                &format!("[{}] {}\n\n{}", answer.question_id(), answer.question.text(), rendered),
            )
            .await;
            self.emit(ProgressEvent::SubAnswer(SubAnswerUpdate {
                question_id: answer.question_id(),
                question: answer.question.text().to_string(),
                answer: rendered,
                sufficiency: answer.sufficiency,
                degraded: answer.degraded,
            }))
            .await;
        }

        *accumulator = std::mem::take(accumulator).merge(answers);

        let (budget, status) = tracker.charge(budget, cost);
        tracing::info!(
            run_id = %self.ctx.run_id,
            round = round,
            cost = cost,
            remaining_budget = budget.remaining_budget,
            status = ?status,
            "Round merged"
        );
        self.emit(ProgressEvent::BudgetUpdated(budget)).await;

        (budget, interface_failure)
    }

    /// Race a phase against cancellation
    async fn cancellable<T>(&self, phase: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(AppError::Cancelled),
            result = phase => result,
        }
    }

    async fn transition(&mut self, to: PlannerState) {
        let from = self.state;
        self.state = to;
        self.transitions.push(Transition {
            from,
            to,
            at: Utc::now(),
        });
        tracing::info!(run_id = %self.ctx.run_id, from = %from, to = %to, "Planner transition");
        self.emit(ProgressEvent::StateChanged { from, to }).await;
    }

    /// Send a progress event. A dropped receiver only means nobody is
    /// listening; after cancellation a full buffer is not waited on.
    async fn emit(&self, event: ProgressEvent) {
        let _ = self.cancellable(async { Ok(self.events.send(event).await) }).await;
    }

    /// Append a run message. Failures, timeouts and cancellation are logged
    /// and never affect the run.
    async fn persist(&self, role: MessageRole, content: &str) {
        let append = bounded(
            "persistence",
            self.ctx.config.timeouts.persistence(),
            self.sink.append_message(self.ctx.run_id, role, content),
        );

        match self.cancellable(append).await {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => {
                tracing::debug!(run_id = %self.ctx.run_id, "Run message dropped after cancellation");
            }
            Err(e) => {
                tracing::warn!(run_id = %self.ctx.run_id, error = %e, "Failed to persist run message");
            }
        }
    }

    fn log_step(&mut self, step: &str, started: DateTime<Utc>, detail: String) {
        let entry = LogEntry::finish("main", step, started, Some(detail));
        tracing::debug!(run_id = %self.ctx.run_id, "{}", entry);
        self.log.push(entry);
    }
}

fn interface_failure(e: &AppError) -> Termination {
    tracing::error!(error = %e, code = e.code().as_code(), "Unrecoverable interface failure, assembling early");
    Termination::InterfaceFailure {
        message: e.to_string(),
    }
}

fn termination_for(reason: StopReason) -> Termination {
    match reason {
        StopReason::NoGaps => Termination::Sufficient,
        StopReason::BudgetExhausted => Termination::BudgetExhausted,
        StopReason::RoundLimit | StopReason::SignalLimit => Termination::RoundLimit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run_config::RunConfig;
    use crate::testing::{section, FakeSearch, RecordingSink, ScriptedLlm};
    use citeforge_common::LlmPurpose;
    use uuid::Uuid;

    fn orchestrator(
        llm: ScriptedLlm,
        search: FakeSearch,
        config: RunConfig,
        sink: RecordingSink,
    ) -> (Orchestrator, mpsc::Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel(1024);
        let ctx = Arc::new(CycleContext {
            run_id: Uuid::now_v7(),
            llm: Arc::new(llm),
            search: Arc::new(search),
            reranker: None,
            config,
        });
        (Orchestrator::new(ctx, Arc::new(sink), tx, CancellationToken::new()), rx)
    }

    fn states(orchestrator: &Orchestrator) -> Vec<PlannerState> {
        orchestrator.transitions().iter().map(|t| t.to).collect()
    }

    fn answering_llm() -> ScriptedLlm {
        ScriptedLlm::new()
            .on(LlmPurpose::Decomposition, r#"{"questions": ["Refund window?", "Refund approver?"]}"#)
            .on(LlmPurpose::Verification, r#"{"relevant": true}"#)
            .on(LlmPurpose::AnswerGeneration, r#"{"answer": "Thirty days [D1].", "cited": [1]}"#)
            .on(LlmPurpose::Sufficiency, r#"{"verdict": "ANSWERED"}"#)
            .on(LlmPurpose::Synthesis, "Refunds are accepted for thirty days [1].")
    }

    fn refund_search() -> FakeSearch {
        FakeSearch::new().on("refund", vec![section("policy", 0, 0.9)])
    }

    #[tokio::test]
    async fn test_happy_path_transitions() {
        let sink = RecordingSink::new();
        let (mut orchestrator, mut rx) =
            orchestrator(answering_llm(), refund_search(), RunConfig::default(), sink.clone());

        let result = orchestrator.run("What is the refund policy?").await.unwrap();

        assert_eq!(
            states(&orchestrator),
            vec![
                PlannerState::Decomposing,
                PlannerState::InitialAnswering,
                PlannerState::SufficiencyCheck,
                PlannerState::Assembling,
                PlannerState::Done,
            ]
        );
        assert_eq!(result.termination, Termination::Sufficient);
        assert_eq!(result.sub_answers.len(), 2);
        // Both sub-answers cite the same passage
        assert_eq!(result.citation_numbers(), vec![1]);

        let messages = sink.messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[2].0, MessageRole::Assistant);
        assert!(messages[0].1.contains("Thirty days [1]."));

        let mut saw_budget = false;
        while let Ok(event) = rx.try_recv() {
            saw_budget |= matches!(event, ProgressEvent::BudgetUpdated(b) if b.remaining_budget == 18);
        }
        assert!(saw_budget);
    }

    #[tokio::test]
    async fn test_empty_decomposition_assembles_immediately() {
        let llm = answering_llm().on(LlmPurpose::Decomposition, r#"{"questions": []}"#);
        let (mut orchestrator, _rx) = orchestrator(llm, refund_search(), RunConfig::default(), RecordingSink::new());

        let result = orchestrator.run("q").await.unwrap();
        assert_eq!(
            states(&orchestrator),
            vec![PlannerState::Decomposing, PlannerState::Assembling, PlannerState::Done]
        );
        assert_eq!(result.termination, Termination::EmptyDecomposition);
        assert!(result.sub_answers.is_empty());
        assert!(result.possibly_incomplete);
    }

    #[tokio::test]
    async fn test_no_refined_questions_forces_assembly() {
        let llm = answering_llm()
            .on(LlmPurpose::Sufficiency, r#"{"verdict": "UNANSWERED", "gap": "no numbers"}"#)
            .on(LlmPurpose::Refinement, r#"{"questions": []}"#);
        let (mut orchestrator, _rx) = orchestrator(llm, refund_search(), RunConfig::default(), RecordingSink::new());

        let result = orchestrator.run("q").await.unwrap();
        assert_eq!(result.termination, Termination::NoFurtherRefinement);
        assert_eq!(
            states(&orchestrator)[2..],
            [PlannerState::SufficiencyCheck, PlannerState::Refining, PlannerState::Assembling, PlannerState::Done]
        );
    }

    #[tokio::test]
    async fn test_round_limit() {
        let llm = answering_llm()
            .on(LlmPurpose::Sufficiency, r#"{"verdict": "PARTIALLY_ANSWERED", "gap": "missing"}"#)
            .on_prompt(LlmPurpose::Refinement, "Refund window?", r#"{"questions": ["Exact refund days?"]}"#);
        let config = RunConfig {
            max_rounds: 2,
            max_insufficient_signals: 10,
            ..RunConfig::default()
        };
        let (mut orchestrator, _rx) = orchestrator(llm, refund_search(), config, RecordingSink::new());

        let result = orchestrator.run("q").await.unwrap();
        assert_eq!(result.termination, Termination::RoundLimit);
        let ids: Vec<String> = result.sub_answers.iter().map(|a| a.question_id().to_string()).collect();
        assert_eq!(ids, vec!["1.1", "1.2", "2.1"]);
        assert_eq!(result.sub_answers[2].question.parent_id().map(|p| p.to_string()), Some("0.0".into()));
    }

    #[tokio::test]
    async fn test_unauthorized_decomposition_ends_early() {
        let (mut orchestrator, _rx) = orchestrator(
            ScriptedLlm::new().reject_credentials(),
            refund_search(),
            RunConfig::default(),
            RecordingSink::new(),
        );

        let result = orchestrator.run("q").await.unwrap();
        assert!(matches!(result.termination, Termination::InterfaceFailure { .. }));
        assert!(result.possibly_incomplete);
        assert_eq!(orchestrator.state(), PlannerState::Done);
    }

    fn evidence_search() -> FakeSearch {
        FakeSearch::new()
            .on("window", vec![section("policy", 0, 0.9)])
            .on("policy?", vec![section("handbook", 1, 0.8), section("policy", 0, 0.9)])
    }

    fn single_question_llm() -> ScriptedLlm {
        answering_llm()
            .on(LlmPurpose::Decomposition, r#"{"questions": ["Refund window?"]}"#)
            .on(LlmPurpose::Synthesis, "Thirty days [1], receipt required [2].")
    }

    #[tokio::test]
    async fn test_direct_evidence_numbered_after_first_round() {
        let llm = single_question_llm();
        let (mut orchestrator, mut rx) =
            orchestrator(llm.clone(), evidence_search(), RunConfig::default(), RecordingSink::new());

        let result = orchestrator.run("What is the refund policy?").await.unwrap();

        let docs: Vec<&str> = result.all_cited_sections.iter().map(|c| c.section.doc_id.as_str()).collect();
        assert_eq!(docs, vec!["policy", "handbook"]);
        assert_eq!(result.final_answer_text, "Thirty days [1], receipt required [2].");
        assert!(llm.prompts(LlmPurpose::Synthesis)[0].contains("[2] handbook: Content of handbook chunk 1"));

        // Sub-answers never see the direct evidence
        assert!(result.sub_answers[0].sections.iter().all(|s| s.doc_id != "handbook"));
        while let Ok(event) = rx.try_recv() {
            if let ProgressEvent::SubAnswer(update) = event {
                assert!(!update.answer.contains("[2]"));
            }
        }
    }

    #[tokio::test]
    async fn test_direct_retrieval_failure_leaves_run_intact() {
        let search = FakeSearch::new()
            .fail_on("policy?")
            .on("window", vec![section("policy", 0, 0.9)]);
        let (mut orchestrator, _rx) =
            orchestrator(single_question_llm(), search, RunConfig::default(), RecordingSink::new());

        let result = orchestrator.run("What is the refund policy?").await.unwrap();
        assert_eq!(result.termination, Termination::Sufficient);
        assert_eq!(result.citation_numbers(), vec![1]);
        assert!(!result.possibly_incomplete);
    }

    #[tokio::test]
    async fn test_direct_retrieval_can_be_disabled() {
        let search = evidence_search();
        let config = RunConfig {
            direct_retrieval_enabled: false,
            ..RunConfig::default()
        };
        let (mut orchestrator, _rx) = orchestrator(single_question_llm(), search.clone(), config, RecordingSink::new());

        let result = orchestrator.run("What is the refund policy?").await.unwrap();
        assert_eq!(result.citation_numbers(), vec![1]);
        assert!(!search.queries().iter().any(|q| q == "What is the refund policy?"));
    }

    #[tokio::test]
    async fn test_persistence_failures_are_ignored() {
        let (mut orchestrator, _rx) =
            orchestrator(answering_llm(), refund_search(), RunConfig::default(), RecordingSink::failing());
        let result = orchestrator.run("q").await.unwrap();
        assert_eq!(result.termination, Termination::Sufficient);
    }
}
