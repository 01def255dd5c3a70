//! Responses in reply to [`crate::requests`] from a DAP server
use crate::types::{Scope, StackFrame, Variable, VariablePresentationHint, VariablesReference};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackTraceResponse {
    /// Adapters may report `null` entries, which are kept to preserve frame indices
    pub stack_frames: Vec<Option<StackFrame>>,
    pub total_frames: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopesResponse {
    pub scopes: Vec<Scope>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariablesResponse {
    pub variables: Vec<Variable>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateResponse {
    pub result: String,
    pub r#type: Option<String>,
    pub presentation_hint: Option<VariablePresentationHint>,
    #[serde(default)]
    pub variables_reference: VariablesReference,
    pub named_variables: Option<usize>,
    pub indexed_variables: Option<usize>,
    pub memory_reference: Option<String>,
}

impl EvaluateResponse {
    pub fn new(result: impl Into<String>, variables_reference: VariablesReference) -> Self {
        Self {
            result: result.into(),
            r#type: None,
            presentation_hint: None,
            variables_reference,
            named_variables: None,
            indexed_variables: None,
            memory_reference: None,
        }
    }
}
