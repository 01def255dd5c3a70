//! Arguments of the requests the session model issues to a DAP server
use serde::{Deserialize, Serialize};

use crate::types::{StackFrameId, ThreadId, VariablesReference};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variables {
    pub variables_reference: VariablesReference,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackTrace {
    pub thread_id: ThreadId,
    pub start_frame: Option<i64>,
    pub levels: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scopes {
    pub frame_id: StackFrameId,
}

/// The context in which an `evaluate` request is made
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EvaluateContext {
    Repl,
    Watch,
    Hover,
}

impl EvaluateContext {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvaluateContext::Repl => "repl",
            EvaluateContext::Watch => "watch",
            EvaluateContext::Hover => "hover",
        }
    }
}

impl std::fmt::Display for EvaluateContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluate {
    pub expression: String,
    pub frame_id: Option<StackFrameId>,
    pub context: EvaluateContext,
}
