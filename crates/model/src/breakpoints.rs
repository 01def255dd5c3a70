use protocol::types::{self, BreakpointId};

use crate::{ElementId, Source};

/// A line breakpoint as requested by the user
#[derive(Debug, Clone)]
pub struct RawBreakpoint {
    pub source: Source,
    pub line: usize,
    /// Defaults to enabled
    pub enabled: Option<bool>,
    pub condition: Option<String>,
}

impl RawBreakpoint {
    pub fn new(source: Source, line: usize) -> Self {
        Self {
            source,
            line,
            enabled: None,
            condition: None,
        }
    }
}

/// A line breakpoint and the state the debug adapter reported for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakpoint {
    id: ElementId,
    pub source: Source,
    /// The line the user asked for
    pub desired_line: usize,
    /// The line the adapter placed the breakpoint on, once verified
    pub line: usize,
    pub enabled: bool,
    pub condition: Option<String>,
    pub verified: bool,
    pub id_from_adapter: Option<BreakpointId>,
    pub message: Option<String>,
}

impl Breakpoint {
    pub fn new(raw: RawBreakpoint) -> Self {
        Self {
            id: ElementId::generated(),
            source: raw.source,
            desired_line: raw.line,
            line: raw.line,
            enabled: raw.enabled.unwrap_or(true),
            condition: raw.condition,
            verified: false,
            id_from_adapter: None,
            message: None,
        }
    }

    pub fn id(&self) -> &ElementId {
        &self.id
    }

    /// Disabling drops whatever the adapter reported
    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.line = self.desired_line;
            self.verified = false;
        }
    }

    pub(crate) fn apply_adapter_state(&mut self, data: &types::Breakpoint) {
        if let Some(line) = data.line {
            self.line = line;
        }
        self.verified = data.verified;
        self.id_from_adapter = data.id;
        self.message = data.message.clone();
    }
}

/// A breakpoint on entry to a named function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionBreakpoint {
    id: ElementId,
    pub name: String,
    pub enabled: bool,
    pub verified: bool,
    pub id_from_adapter: Option<BreakpointId>,
}

impl FunctionBreakpoint {
    pub fn new(name: impl Into<String>, enabled: bool) -> Self {
        Self {
            id: ElementId::generated(),
            name: name.into(),
            enabled,
            verified: false,
            id_from_adapter: None,
        }
    }

    pub fn id(&self) -> &ElementId {
        &self.id
    }
}

/// An exception filter the adapter offers, and whether the user enabled it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionBreakpoint {
    id: ElementId,
    pub filter: String,
    pub label: String,
    pub enabled: bool,
}

impl ExceptionBreakpoint {
    pub fn new(filter: impl Into<String>, label: impl Into<String>, enabled: bool) -> Self {
        Self {
            id: ElementId::generated(),
            filter: filter.into(),
            label: label.into(),
            enabled,
        }
    }

    pub fn id(&self) -> &ElementId {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enabled_by_default() {
        let bp = Breakpoint::new(RawBreakpoint::new(Source::from_path("/tmp/a.py"), 4));
        assert!(bp.enabled);
        assert_eq!(bp.line, 4);
        assert!(!bp.verified);
    }

    #[test]
    fn disabling_resets_adapter_state() {
        let mut bp = Breakpoint::new(RawBreakpoint::new(Source::from_path("/tmp/a.py"), 4));
        bp.apply_adapter_state(&types::Breakpoint {
            id: Some(3),
            verified: true,
            line: Some(6),
            ..Default::default()
        });
        assert_eq!((bp.line, bp.verified, bp.id_from_adapter), (6, true, Some(3)));

        bp.set_enabled(false);
        assert_eq!(bp.line, 4);
        assert!(!bp.verified);
    }

    #[test]
    fn adapter_state_without_line_keeps_line() {
        let mut bp = Breakpoint::new(RawBreakpoint::new(Source::from_path("/tmp/a.py"), 4));
        bp.apply_adapter_state(&types::Breakpoint {
            verified: false,
            message: Some("no code at line".to_string()),
            ..Default::default()
        });
        assert_eq!(bp.line, 4);
        assert_eq!(bp.message.as_deref(), Some("no code at line"));
    }
}
