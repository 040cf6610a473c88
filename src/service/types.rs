use serde::{Deserialize, Serialize};

use crate::model::{
    AnswerMap, Conclusion, Evaluation, Module, NextAction, NextNode, Outcome, Parameters, Question,
};

/// Response from `POST /start`: a new or resumed session and its first module
#[derive(Debug, Clone, Deserialize)]
pub struct StartResponse {
    pub session_id: String,
    pub module: Module,
}

/// Response from `GET /tree`: the full question set for client-side traversal
#[derive(Debug, Clone, Deserialize)]
pub struct TreeResponse {
    pub start: String,
    pub questions: Vec<Question>,
}

/// Response from `GET /results`: the full terminal result set
#[derive(Debug, Clone, Deserialize)]
pub struct ResultsResponse {
    pub results: Vec<Outcome>,
}

/// Response from `GET /question/{id}`
#[derive(Debug, Clone, Deserialize)]
pub struct QuestionResponse {
    pub question: Question,
}

/// Response from `GET /module/{id}`
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleResponse {
    pub module: Module,
}

/// Response from `GET /result/{id}`
#[derive(Debug, Clone, Deserialize)]
pub struct OutcomeResponse {
    pub result: Outcome,
}

/// Request body for `POST /answer` (tree-walk variant)
#[derive(Debug, Clone, Serialize)]
pub struct AnswerRequest {
    pub question_id: String,
    pub value: crate::model::AnswerValue,
    pub answers: AnswerMap,
}

/// Response from `POST /answer`: the next node plus its payload when known
#[derive(Debug, Clone, Deserialize)]
pub struct AnswerResponse {
    pub next: NextNode,
    pub path: Vec<String>,
    #[serde(default)]
    pub question: Option<Question>,
    #[serde(default)]
    pub result: Option<Outcome>,
}

/// Request body for `POST /submit-answer` (module variant)
#[derive(Debug, Clone, Serialize)]
pub struct SubmitRequest {
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module_id: Option<String>,
    pub answers: AnswerMap,
    pub replace: bool,
}

/// Response from `POST /submit-answer`
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitResponse {
    pub session_id: String,
    pub parameters: Parameters,
    pub next: NextAction,
    pub module_complete: bool,
    #[serde(default)]
    pub module: Option<Module>,
    #[serde(default)]
    pub conclusion: Option<Conclusion>,
}

/// Request body for `POST /evaluate`
#[derive(Debug, Clone, Serialize)]
pub struct EvaluateRequest {
    pub answers: AnswerMap,
}

/// Response from `POST /evaluate`: the full traversal outcome
pub type EvaluateResponse = Evaluation;

/// Response from `GET /result?session_id=` (parameter-driven conclusion)
#[derive(Debug, Clone, Deserialize)]
pub struct ConclusionResponse {
    pub parameters: Parameters,
    #[serde(default)]
    pub conclusion: Option<Conclusion>,
}
