//! Evaluation service client: typed request/response mapping over HTTP JSON.
//!
//! The remote service owns all branching decisions; this module only moves
//! bytes and maps failures onto the [`crate::error::ServiceError`] taxonomy.

mod client;
mod types;

pub use client::EvaluationClient;
pub use types::{
    AnswerRequest, AnswerResponse, ConclusionResponse, EvaluateRequest, EvaluateResponse,
    ModuleResponse, OutcomeResponse, QuestionResponse, ResultsResponse, StartResponse,
    SubmitRequest, SubmitResponse, TreeResponse,
};
