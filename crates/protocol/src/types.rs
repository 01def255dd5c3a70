//! General types used common to [`crate::requests`], [`crate::responses`] or [`crate::events`].
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub type ThreadId = i64;
pub type BreakpointId = i64;
pub type StackFrameId = i64;
pub type VariablesReference = i64;
pub type SourceReference = i64;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Thread {
    pub id: ThreadId,
    pub name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PresentationHint {
    Arguments,
    Locals,
    Registers,
    #[serde(untagged)]
    Other(String),
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
    pub name: String,
    pub variables_reference: VariablesReference,
    pub presentation_hint: Option<PresentationHint>,
    pub named_variables: Option<usize>,
    pub indexed_variables: Option<usize>,
    #[serde(default)]
    pub expensive: bool,
    pub line: Option<i64>,
    pub column: Option<i64>,
    pub source: Option<Source>,
    pub end_line: Option<i64>,
    pub end_column: Option<i64>,
}

impl Scope {
    pub fn new(name: impl Into<String>, variables_reference: VariablesReference) -> Self {
        Self {
            name: name.into(),
            variables_reference,
            presentation_hint: None,
            named_variables: None,
            indexed_variables: None,
            expensive: false,
            line: None,
            column: None,
            source: None,
            end_line: None,
            end_column: None,
        }
    }
}

#[derive(Default, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub name: Option<String>,
    pub path: Option<PathBuf>,
    #[serde(rename = "sourceReference")]
    pub source_reference: Option<SourceReference>,
    #[serde(rename = "presentationHint")]
    pub presentation_hint: Option<String>,
    pub origin: Option<String>,
    pub sources: Option<Vec<Source>>,
}

/// Breakpoint state as reported by the debug adapter
#[derive(Default, Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Breakpoint {
    pub id: Option<BreakpointId>,
    pub verified: bool,
    pub message: Option<String>,
    pub source: Option<Source>,
    pub line: Option<usize>,
    pub column: Option<usize>,
    pub end_line: Option<usize>,
    pub end_column: Option<usize>,
}

/// An exception filter the debug adapter advertises in its capabilities
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionBreakpointsFilter {
    pub filter: String,
    pub label: String,
    #[serde(default)]
    pub default: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct StackFrame {
    pub id: StackFrameId,
    pub name: String,
    pub source: Option<Source>,
    pub line: usize,
    pub column: usize,
    pub end_line: Option<usize>,
    pub end_column: Option<usize>,
    pub can_restart: Option<bool>,
    pub presentation_hint: Option<String>,
}

impl StackFrame {
    pub fn new(id: StackFrameId, name: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            id,
            name: name.into(),
            source: None,
            line,
            column,
            end_line: None,
            end_column: None,
            can_restart: None,
            presentation_hint: None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct VariablePresentationHint {
    pub kind: Option<String>,
    pub attributes: Option<Vec<String>>,
    pub visibility: Option<String>,
    pub lazy: Option<bool>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    pub name: String,
    pub value: String,
    pub r#type: Option<String>,
    #[serde(default)]
    pub variables_reference: VariablesReference,
    pub presentation_hint: Option<VariablePresentationHint>,
}

impl Variable {
    pub fn new(
        name: impl Into<String>,
        value: impl Into<String>,
        variables_reference: VariablesReference,
    ) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            r#type: None,
            variables_reference,
            presentation_hint: None,
        }
    }
}
