//! The flow store: single authoritative in-memory representation of
//! questionnaire traversal state.
//!
//! The store mediates between the view layer and the evaluation service,
//! owns all persistence side effects, and serializes state mutation at
//! await resumption. State lives behind a mutex that is never held across
//! an await; every network-bound operation captures the generation counter
//! before the request and re-checks it before merging, so a response that
//! outlives a `reset()` or re-`initialize()` is discarded instead of
//! resurrecting cleared state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{FlowError, FlowResult, PersistenceError, ServiceError};
use crate::model::{
    AnswerMap, AnswerValue, Conclusion, Evaluation, Module, NextAction, NextNode, Outcome,
    Parameters, Question, QuestionKind,
};
use crate::persistence::{Persistence, ANSWERS_KEY, SESSION_KEY};
use crate::service::{
    AnswerRequest, AnswerResponse, ConclusionResponse, EvaluateRequest, EvaluationClient,
    SubmitRequest, SubmitResponse,
};

/// Traversal phase of a flow
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FlowPhase {
    /// No session; nothing loaded
    #[default]
    Uninitialized,
    /// `initialize()` in flight
    Initializing,
    /// A question or module is displayed, waiting for user input
    AwaitingAnswer,
    /// `submit()`/`evaluate()` in flight
    Submitting,
    /// Terminal result or conclusion reached
    Concluded,
}

/// Session identity issued by the evaluation service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Server-issued session identifier
    pub id: String,
    /// When this client first saw the session
    pub started_at: DateTime<Utc>,
}

/// A loaded flow node: either a question or a terminal result
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// A question to present next
    Question(Question),
    /// A terminal result
    Outcome(Outcome),
}

#[derive(Debug, Default)]
struct FlowState {
    phase: FlowPhase,
    session: Option<SessionInfo>,
    start_id: Option<String>,
    questions: HashMap<String, Question>,
    outcomes: HashMap<String, Outcome>,
    current_module: Option<Module>,
    answers: AnswerMap,
    parameters: Parameters,
    conclusion: Option<Conclusion>,
    last_evaluation: Option<Evaluation>,
    loading: bool,
    error: Option<String>,
    generation: u64,
}

impl FlowState {
    fn cache_module_questions(&mut self, module: &Module) {
        for q in &module.questions {
            self.questions.insert(q.id.clone(), q.clone());
        }
    }
}

/// The questionnaire flow controller.
///
/// One instance per traversal; construct with [`FlowStore::new`] and share
/// behind an `Arc` if multiple components need it.
pub struct FlowStore {
    client: EvaluationClient,
    persistence: Arc<dyn Persistence>,
    state: Mutex<FlowState>,
}

impl FlowStore {
    /// Create a store and restore persisted answers and session identity.
    ///
    /// Unreadable or shape-incompatible persisted state is discarded and
    /// never fatal.
    pub async fn new(client: EvaluationClient, persistence: Arc<dyn Persistence>) -> Self {
        let store = Self {
            client,
            persistence,
            state: Mutex::new(FlowState::default()),
        };
        store.restore().await;
        store
    }

    async fn restore(&self) {
        match self.persistence.get(SESSION_KEY).await {
            Ok(Some(raw)) => {
                // Older deployments stored the bare id rather than JSON
                let session = serde_json::from_str::<SessionInfo>(&raw).unwrap_or(SessionInfo {
                    id: raw,
                    started_at: Utc::now(),
                });
                debug!(session_id = %session.id, "Restored persisted session");
                self.state().session = Some(session);
            }
            Ok(None) => {}
            Err(e) => debug!(error = %e, "Ignoring unreadable persisted session"),
        }

        match self.persistence.get(ANSWERS_KEY).await {
            Ok(Some(raw)) => {
                let answers = parse_persisted_answers(&raw);
                debug!(count = answers.len(), "Restored persisted answers");
                self.state().answers = answers;
            }
            Ok(None) => {}
            Err(e) => debug!(error = %e, "Ignoring unreadable persisted answers"),
        }
    }

    /// Begin a new session, overwriting any prior one.
    ///
    /// On success the session id is stored durably, in-memory and persisted
    /// answers are cleared, and the first module becomes current.
    pub async fn initialize(&self) -> FlowResult<Module> {
        let gen = {
            let mut s = self.state();
            s.generation += 1;
            s.phase = FlowPhase::Initializing;
            s.loading = true;
            s.error = None;
            s.generation
        };

        let response = match self.client.start().await {
            Ok(r) => r,
            Err(e) => {
                let err = FlowError::Initialization(e);
                let mut s = self.state();
                if s.generation == gen {
                    s.phase = FlowPhase::Uninitialized;
                    s.loading = false;
                    s.error = Some(err.to_string());
                }
                return Err(err);
            }
        };

        if self.state().generation != gen {
            warn!("Discarding initialize response superseded by reset");
            return Err(FlowError::Superseded);
        }

        let session = SessionInfo {
            id: response.session_id.clone(),
            started_at: Utc::now(),
        };
        let serialized = serde_json::to_string(&session)
            .map_err(|e| PersistenceError::Query {
                message: format!("Failed to serialize session: {}", e),
            })
            .map_err(FlowError::Persistence)?;
        let persisted = async {
            self.persistence.set(SESSION_KEY, &serialized).await?;
            self.persistence.set(ANSWERS_KEY, "{}").await
        }
        .await;
        if let Err(e) = persisted {
            let err = FlowError::Persistence(e);
            let mut s = self.state();
            if s.generation == gen {
                s.phase = FlowPhase::Uninitialized;
                s.loading = false;
                s.error = Some(err.to_string());
            }
            return Err(err);
        }

        {
            let mut s = self.state();
            if s.generation == gen {
                info!(session_id = %session.id, module_id = %response.module.id, "Flow initialized");
                s.session = Some(session);
                s.answers.clear();
                s.parameters.clear();
                s.conclusion = None;
                s.last_evaluation = None;
                s.cache_module_questions(&response.module);
                s.current_module = Some(response.module.clone());
                s.phase = FlowPhase::AwaitingAnswer;
                s.loading = false;
                return Ok(response.module);
            }
        }

        // A reset interleaved with the durable writes; remove the keys it
        // already cleared.
        warn!("Discarding initialize response superseded by reset");
        if let Err(e) = self.persistence.remove(SESSION_KEY).await {
            debug!(error = %e, "Failed to remove superseded session key");
        }
        if let Err(e) = self.persistence.remove(ANSWERS_KEY).await {
            debug!(error = %e, "Failed to remove superseded answers key");
        }
        Err(FlowError::Superseded)
    }

    /// Preload the full question tree and result set (tree-walk variant)
    pub async fn load_tree(&self) -> FlowResult<()> {
        let gen = {
            let mut s = self.state();
            s.loading = true;
            s.error = None;
            s.generation
        };

        let tree = match self.client.fetch_tree().await {
            Ok(t) => t,
            Err(e) => return Err(self.fail(e.into())),
        };
        let results = match self.client.fetch_results().await {
            Ok(r) => r,
            Err(e) => return Err(self.fail(e.into())),
        };

        let mut s = self.state();
        if s.generation != gen {
            warn!("Discarding tree response superseded by reset");
            return Err(FlowError::Superseded);
        }
        debug!(
            questions = tree.questions.len(),
            results = results.results.len(),
            start = %tree.start,
            "Question tree loaded"
        );
        s.start_id = Some(tree.start);
        for q in tree.questions {
            s.questions.insert(q.id.clone(), q);
        }
        for r in results.results {
            s.outcomes.insert(r.id.clone(), r);
        }
        if s.phase == FlowPhase::Uninitialized {
            s.phase = FlowPhase::AwaitingAnswer;
        }
        s.loading = false;
        Ok(())
    }

    /// Fetch a question by id, cache-first
    pub async fn load_question(&self, id: &str) -> FlowResult<Question> {
        if let Some(q) = self.state().questions.get(id).cloned() {
            return Ok(q);
        }
        let gen = self.state().generation;

        match self.client.fetch_question(id).await {
            Ok(resp) => {
                let mut s = self.state();
                if s.generation != gen {
                    return Err(FlowError::Superseded);
                }
                s.questions.insert(resp.question.id.clone(), resp.question.clone());
                Ok(resp.question)
            }
            Err(ServiceError::Api { .. }) => Err(self.fail(FlowError::NotFound {
                id: id.to_string(),
            })),
            Err(e) => Err(self.fail(e.into())),
        }
    }

    /// Fetch a module payload for the active session.
    ///
    /// Module payloads carry session-dependent answered state, so they are
    /// always refetched; the module's questions are memoized.
    pub async fn load_module(&self, id: &str) -> FlowResult<Module> {
        let session_id = match self.session_id() {
            Some(id) => id,
            None => return Err(self.fail(FlowError::NoSession)),
        };
        let gen = self.state().generation;

        match self.client.fetch_module(id, &session_id).await {
            Ok(resp) => {
                let mut s = self.state();
                if s.generation != gen {
                    return Err(FlowError::Superseded);
                }
                s.cache_module_questions(&resp.module);
                s.current_module = Some(resp.module.clone());
                if s.phase == FlowPhase::Uninitialized {
                    s.phase = FlowPhase::AwaitingAnswer;
                }
                Ok(resp.module)
            }
            Err(ServiceError::Api { .. }) => Err(self.fail(FlowError::NotFound {
                id: id.to_string(),
            })),
            Err(e) => Err(self.fail(e.into())),
        }
    }

    /// Fetch a terminal result by id, cache-first
    pub async fn load_outcome(&self, id: &str) -> FlowResult<Outcome> {
        if let Some(r) = self.state().outcomes.get(id).cloned() {
            return Ok(r);
        }
        let gen = self.state().generation;

        match self.client.fetch_outcome(id).await {
            Ok(resp) => {
                let mut s = self.state();
                if s.generation != gen {
                    return Err(FlowError::Superseded);
                }
                s.outcomes.insert(resp.result.id.clone(), resp.result.clone());
                Ok(resp.result)
            }
            Err(ServiceError::Api { .. }) => Err(self.fail(FlowError::NotFound {
                id: id.to_string(),
            })),
            Err(e) => Err(self.fail(e.into())),
        }
    }

    /// Load whatever a [`NextNode`] points at
    pub async fn load_node(&self, next: &NextNode) -> FlowResult<Node> {
        match next {
            NextNode::Question { id } => Ok(Node::Question(self.load_question(id).await?)),
            NextNode::Result { id } => Ok(Node::Outcome(self.load_outcome(id).await?)),
        }
    }

    /// Record an answer and persist the whole map write-through.
    ///
    /// Validates the value shape against the question kind; does not by
    /// itself trigger navigation.
    pub async fn record_answer(&self, question_id: &str, value: AnswerValue) -> FlowResult<()> {
        let (serialized, previous) = {
            let mut s = self.state();
            let kind = match s.questions.get(question_id) {
                Some(q) => q.kind,
                None => {
                    drop(s);
                    return Err(self.fail(FlowError::Validation {
                        question_id: question_id.to_string(),
                        reason: "unknown question".to_string(),
                    }));
                }
            };
            if !kind.accepts(&value) {
                let reason = match kind {
                    QuestionKind::MultiChoice => "expected a scalar or array of scalars",
                    _ => "expected a scalar",
                };
                drop(s);
                return Err(self.fail(FlowError::Validation {
                    question_id: question_id.to_string(),
                    reason: reason.to_string(),
                }));
            }
            let previous = s.answers.insert(question_id.to_string(), value);
            s.error = None;
            (serialize_answers(&s.answers)?, previous)
        };

        if let Err(e) = self.persistence.set(ANSWERS_KEY, &serialized).await {
            let err = FlowError::from(e);
            // Memory and durable storage stay in step on the error branch
            let mut s = self.state();
            match previous {
                Some(prior) => {
                    s.answers.insert(question_id.to_string(), prior);
                }
                None => {
                    s.answers.remove(question_id);
                }
            }
            s.loading = false;
            s.error = Some(err.to_string());
            return Err(err);
        }
        debug!(question_id, "Answer recorded");
        Ok(())
    }

    /// Purely local next-step lookup for single-choice tree flows.
    ///
    /// Returns `None` when the question is unknown, not single-choice, or
    /// no option matches the value. No network access.
    pub fn compute_next(&self, question_id: &str, value: &AnswerValue) -> Option<NextNode> {
        let s = self.state();
        let question = s.questions.get(question_id)?;
        if question.kind != QuestionKind::SingleChoice {
            return None;
        }
        let AnswerValue::Scalar(scalar) = value else {
            return None;
        };
        question.option(scalar).and_then(|c| c.next.clone())
    }

    /// Submit a single answer for server-side tree traversal.
    ///
    /// Records the answer first (write-through), then posts it together with
    /// the accumulated map; the response's question/result payloads are
    /// memoized and a terminal result concludes the flow.
    pub async fn answer(&self, question_id: &str, value: AnswerValue) -> FlowResult<AnswerResponse> {
        self.record_answer(question_id, value.clone()).await?;

        let (gen, request) = {
            let mut s = self.state();
            s.phase = FlowPhase::Submitting;
            s.loading = true;
            (
                s.generation,
                AnswerRequest {
                    question_id: question_id.to_string(),
                    value,
                    answers: s.answers.clone(),
                },
            )
        };

        match self.client.answer(&request).await {
            Ok(resp) => {
                let mut s = self.state();
                if s.generation != gen {
                    warn!("Discarding answer response superseded by reset");
                    return Err(FlowError::Superseded);
                }
                if let Some(q) = &resp.question {
                    s.questions.insert(q.id.clone(), q.clone());
                }
                if let Some(r) = &resp.result {
                    s.outcomes.insert(r.id.clone(), r.clone());
                    s.last_evaluation = Some(Evaluation {
                        result_id: r.id.clone(),
                        path: resp.path.clone(),
                        result: r.clone(),
                    });
                }
                s.phase = match resp.next {
                    NextNode::Result { .. } => FlowPhase::Concluded,
                    NextNode::Question { .. } => FlowPhase::AwaitingAnswer,
                };
                s.loading = false;
                Ok(resp)
            }
            Err(e) => Err(self.fail_submission(gen, e)),
        }
    }

    /// Submit accumulated answers for a module (module-driven flows).
    ///
    /// Merges parameters, next action, module payload and conclusion
    /// atomically; on failure nothing is applied and the store returns to
    /// `AwaitingAnswer` with the server detail recorded.
    pub async fn submit(
        &self,
        module_id: Option<&str>,
        replace: bool,
    ) -> FlowResult<SubmitResponse> {
        let (gen, request) = {
            let mut s = self.state();
            let session = match &s.session {
                Some(session) => session.id.clone(),
                None => {
                    drop(s);
                    return Err(self.fail(FlowError::NoSession));
                }
            };
            s.phase = FlowPhase::Submitting;
            s.loading = true;
            s.error = None;
            (
                s.generation,
                SubmitRequest {
                    session_id: session,
                    module_id: module_id.map(str::to_string),
                    answers: s.answers.clone(),
                    replace,
                },
            )
        };

        match self.client.submit(&request).await {
            Ok(resp) => {
                let mut s = self.state();
                if s.generation != gen {
                    warn!("Discarding submit response superseded by reset");
                    return Err(FlowError::Superseded);
                }
                s.parameters = resp.parameters.clone();
                if let Some(module) = &resp.module {
                    s.cache_module_questions(module);
                    s.current_module = Some(module.clone());
                }
                match &resp.next {
                    NextAction::Result { .. } => {
                        s.conclusion = resp.conclusion.clone();
                        s.phase = FlowPhase::Concluded;
                        info!(session_id = %resp.session_id, "Flow concluded");
                    }
                    NextAction::Module { module_id, .. } => {
                        s.phase = FlowPhase::AwaitingAnswer;
                        debug!(
                            next_module = module_id.as_deref().unwrap_or(""),
                            module_complete = resp.module_complete,
                            "Submit merged"
                        );
                    }
                }
                s.loading = false;
                Ok(resp)
            }
            Err(e) => Err(self.fail_submission(gen, e)),
        }
    }

    /// Evaluate the complete answer map server-side (tree-walk variant).
    ///
    /// Does not mutate the answer map.
    pub async fn evaluate(&self) -> FlowResult<Evaluation> {
        let (gen, request) = {
            let mut s = self.state();
            s.phase = FlowPhase::Submitting;
            s.loading = true;
            s.error = None;
            (
                s.generation,
                EvaluateRequest {
                    answers: s.answers.clone(),
                },
            )
        };

        match self.client.evaluate(&request).await {
            Ok(eval) => {
                let mut s = self.state();
                if s.generation != gen {
                    warn!("Discarding evaluation superseded by reset");
                    return Err(FlowError::Superseded);
                }
                info!(result_id = %eval.result_id, "Evaluation complete");
                s.outcomes.insert(eval.result.id.clone(), eval.result.clone());
                s.last_evaluation = Some(eval.clone());
                s.phase = FlowPhase::Concluded;
                s.loading = false;
                Ok(eval)
            }
            Err(e) => {
                let err = match e {
                    ServiceError::Api { status, detail } => FlowError::Evaluation {
                        status: Some(status),
                        detail: detail.unwrap_or_else(|| format!("http_{}", status)),
                    },
                    other => FlowError::Evaluation {
                        status: None,
                        detail: other.to_string(),
                    },
                };
                let mut s = self.state();
                if s.generation == gen {
                    s.phase = FlowPhase::AwaitingAnswer;
                    s.loading = false;
                    s.error = Some(err.to_string());
                }
                Err(err)
            }
        }
    }

    /// Fetch the parameter-driven conclusion for the active session.
    ///
    /// Cache-first: a conclusion already merged by `submit()` is returned
    /// without network access.
    pub async fn fetch_conclusion(&self) -> FlowResult<ConclusionResponse> {
        {
            let s = self.state();
            if let Some(conclusion) = &s.conclusion {
                return Ok(ConclusionResponse {
                    parameters: s.parameters.clone(),
                    conclusion: Some(conclusion.clone()),
                });
            }
        }

        let session_id = match self.session_id() {
            Some(id) => id,
            None => return Err(self.fail(FlowError::NoSession)),
        };
        let gen = self.state().generation;

        match self.client.fetch_conclusion(&session_id).await {
            Ok(resp) => {
                let mut s = self.state();
                if s.generation != gen {
                    warn!("Discarding conclusion superseded by reset");
                    return Err(FlowError::Superseded);
                }
                s.parameters = resp.parameters.clone();
                if let Some(conclusion) = &resp.conclusion {
                    s.conclusion = Some(conclusion.clone());
                    s.phase = FlowPhase::Concluded;
                }
                Ok(resp)
            }
            Err(e) => Err(self.fail(e.into())),
        }
    }

    /// Clear all traversal state and durable persistence. Idempotent.
    ///
    /// Does not abort in-flight requests; their late responses fail the
    /// generation check and are discarded.
    pub async fn reset(&self) -> FlowResult<()> {
        {
            let mut s = self.state();
            let generation = s.generation + 1;
            *s = FlowState {
                generation,
                ..FlowState::default()
            };
        }

        self.persist_remove_or_fail(ANSWERS_KEY).await?;
        self.persist_remove_or_fail(SESSION_KEY).await?;
        info!("Flow reset");
        Ok(())
    }

    // Read accessors; all return clones so no lock escapes.

    /// Current traversal phase
    pub fn phase(&self) -> FlowPhase {
        self.state().phase
    }

    /// Whether a network-bound operation is in flight
    pub fn loading(&self) -> bool {
        self.state().loading
    }

    /// Human-readable message from the most recent failure, if any
    pub fn last_error(&self) -> Option<String> {
        self.state().error.clone()
    }

    /// Active session, if one has been started or restored
    pub fn session(&self) -> Option<SessionInfo> {
        self.state().session.clone()
    }

    /// Active session id
    pub fn session_id(&self) -> Option<String> {
        self.state().session.as_ref().map(|s| s.id.clone())
    }

    /// Entry question id of a loaded tree
    pub fn start_id(&self) -> Option<String> {
        self.state().start_id.clone()
    }

    /// Snapshot of the accumulated answer map
    pub fn answers(&self) -> AnswerMap {
        self.state().answers.clone()
    }

    /// The recorded answer for a single question
    pub fn answer_for(&self, question_id: &str) -> Option<AnswerValue> {
        self.state().answers.get(question_id).cloned()
    }

    /// A cached question by id, without network access
    pub fn question(&self, id: &str) -> Option<Question> {
        self.state().questions.get(id).cloned()
    }

    /// A cached terminal result by id, without network access
    pub fn outcome(&self, id: &str) -> Option<Outcome> {
        self.state().outcomes.get(id).cloned()
    }

    /// The module currently presented, if any
    pub fn current_module(&self) -> Option<Module> {
        self.state().current_module.clone()
    }

    /// Snapshot of the server-computed parameters
    pub fn parameters(&self) -> Parameters {
        self.state().parameters.clone()
    }

    /// The merged conclusion, once the flow has concluded
    pub fn conclusion(&self) -> Option<Conclusion> {
        self.state().conclusion.clone()
    }

    /// The most recent tree-walk evaluation
    pub fn last_evaluation(&self) -> Option<Evaluation> {
        self.state().last_evaluation.clone()
    }

    fn state(&self) -> MutexGuard<'_, FlowState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record a failure for the view layer and hand the error back
    fn fail(&self, err: FlowError) -> FlowError {
        let mut s = self.state();
        s.loading = false;
        s.error = Some(err.to_string());
        err
    }

    /// Map a submit/answer transport failure, restoring `AwaitingAnswer`
    /// unless a reset already moved the state on.
    fn fail_submission(&self, gen: u64, e: ServiceError) -> FlowError {
        let err = match e {
            ServiceError::Api { status, detail } => FlowError::Submission {
                status: Some(status),
                detail: detail.unwrap_or_else(|| format!("http_{}", status)),
            },
            other => FlowError::Submission {
                status: None,
                detail: other.to_string(),
            },
        };
        let mut s = self.state();
        if s.generation == gen {
            s.phase = FlowPhase::AwaitingAnswer;
            s.loading = false;
            s.error = Some(err.to_string());
        }
        err
    }

    async fn persist_remove_or_fail(&self, key: &str) -> FlowResult<()> {
        match self.persistence.remove(key).await {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fail(e.into())),
        }
    }
}

fn serialize_answers(answers: &AnswerMap) -> FlowResult<String> {
    serde_json::to_string(answers)
        .map_err(|e| {
            PersistenceError::Query {
                message: format!("Failed to serialize answers: {}", e),
            }
        })
        .map_err(FlowError::Persistence)
}

/// Parse a persisted answer map, dropping entries that no longer fit the
/// answer shape. A wholly malformed value yields an empty map.
fn parse_persisted_answers(raw: &str) -> AnswerMap {
    let Ok(serde_json::Value::Object(entries)) = serde_json::from_str(raw) else {
        debug!("Discarding malformed persisted answers");
        return AnswerMap::new();
    };
    let mut answers = AnswerMap::new();
    for (key, value) in entries {
        match serde_json::from_value::<AnswerValue>(value) {
            Ok(v) => {
                answers.insert(key, v);
            }
            Err(_) => debug!(question_id = %key, "Dropping incompatible persisted answer"),
        }
    }
    answers
}
