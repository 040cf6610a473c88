//! Data contracts shared by the flow store and the evaluation service client.
//!
//! One canonical model covers both historical wire variants: the tree-walk
//! variant (single-choice questions whose options carry a literal `next`
//! target) and the module/parameter variant (questions grouped into modules,
//! branching decided server-side). Branching targets and question kinds are
//! tagged unions so every consumption site matches exhaustively.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single scalar answer value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerScalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// An answer: a scalar, or an array of scalars for multi-choice questions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Scalar(AnswerScalar),
    Many(Vec<AnswerScalar>),
}

/// Answer map keyed by question id; one entry per question
pub type AnswerMap = HashMap<String, AnswerValue>;

/// Server-computed parameters accumulated over a session
pub type Parameters = HashMap<String, serde_json::Value>;

/// Free-form conclusion computed server-side from parameters
pub type Conclusion = serde_json::Map<String, serde_json::Value>;

/// Question kind, determining the accepted answer shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    #[serde(alias = "single")]
    SingleChoice,
    #[serde(alias = "multiple_choice", alias = "multi")]
    MultiChoice,
    Boolean,
}

/// A selectable option on a question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    pub value: AnswerScalar,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cite: Option<String>,
    /// Selecting an exclusive option deselects all siblings
    #[serde(default)]
    pub exclusive: bool,
    /// Flow target for single-choice tree traversal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<NextNode>,
}

/// Tagged pointer to the subsequent node in a tree-walk flow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NextNode {
    Question { id: String },
    Result { id: String },
}

impl NextNode {
    /// The target node id
    pub fn id(&self) -> &str {
        match self {
            NextNode::Question { id } => id,
            NextNode::Result { id } => id,
        }
    }
}

/// Server-decided next step in a module-driven flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NextAction {
    Module {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        module_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Result {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

/// A single question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub text: String,
    /// Citation reference, e.g. a regulation clause
    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(alias = "type")]
    pub kind: QuestionKind,
    #[serde(default)]
    pub options: Vec<Choice>,
    /// Flow target when any option is selected (multi-choice tree flows)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_any: Option<NextNode>,
    /// Flow target when no option is selected (multi-choice tree flows)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_none: Option<NextNode>,
}

/// A named, ordered group of questions presented and submitted together
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub questions: Vec<Question>,
}

/// A terminal result node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Supporting bullet points
    #[serde(default)]
    pub points: Vec<String>,
}

/// The outcome of a completed tree-walk evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub result_id: String,
    /// Ordered sequence of visited node ids
    pub path: Vec<String>,
    pub result: Outcome,
}

impl QuestionKind {
    /// Whether a value has the shape this kind accepts: a scalar for
    /// single-choice and boolean questions, scalar or array for multi-choice.
    pub fn accepts(&self, value: &AnswerValue) -> bool {
        match self {
            QuestionKind::SingleChoice | QuestionKind::Boolean => {
                matches!(value, AnswerValue::Scalar(_))
            }
            QuestionKind::MultiChoice => true,
        }
    }
}

impl Question {
    /// Look up the option matching a value
    pub fn option(&self, value: &AnswerScalar) -> Option<&Choice> {
        self.options.iter().find(|c| &c.value == value)
    }

    fn is_exclusive(&self, value: &AnswerScalar) -> bool {
        self.option(value).map(|c| c.exclusive).unwrap_or(false)
    }

    /// Multi-choice flow target: `next_any` when the selection is non-empty,
    /// `next_none` otherwise
    pub fn multi_next(&self, selection: &[AnswerScalar]) -> Option<&NextNode> {
        if selection.is_empty() {
            self.next_none.as_ref()
        } else {
            self.next_any.as_ref()
        }
    }
}

/// Apply a multi-choice selection toggle and return the new selection.
///
/// Picking an already-selected value deselects it. Picking an `exclusive`
/// option clears all other selections; picking any option clears a
/// previously selected exclusive one.
pub fn toggle_choice(
    question: &Question,
    current: &[AnswerScalar],
    value: AnswerScalar,
) -> Vec<AnswerScalar> {
    if current.contains(&value) {
        return current.iter().filter(|v| **v != value).cloned().collect();
    }
    if question.is_exclusive(&value) {
        return vec![value];
    }
    let mut next: Vec<AnswerScalar> = current
        .iter()
        .filter(|v| !question.is_exclusive(v))
        .cloned()
        .collect();
    next.push(value);
    next
}
