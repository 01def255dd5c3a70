use std::fmt;

use protocol::types::{StackFrameId, ThreadId, VariablesReference};

/// Stable identifier of a tree element.
///
/// Ids are derived from the element kind, its parent and a discriminator, so the same logical node
/// gets the same id each time it is re-created from a fresh fetch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(String);

impl ElementId {
    pub fn root() -> Self {
        Self("root".to_string())
    }

    pub fn thread(name: &str, thread_id: ThreadId) -> Self {
        Self(format!("thread:{name}:{thread_id}"))
    }

    pub fn stack_frame(thread_id: ThreadId, frame_id: StackFrameId) -> Self {
        Self(format!("stackframe:{thread_id}:{frame_id}"))
    }

    pub fn scope(thread_id: ThreadId, name: &str, reference: VariablesReference) -> Self {
        Self(format!("scope:{thread_id}:{name}:{reference}"))
    }

    pub fn variable(parent: &ElementId, name: &str) -> Self {
        Self(format!("variable:{}:{name}", parent.0))
    }

    pub fn output(counter: u64) -> Self {
        Self(format!("outputelement:{counter}"))
    }

    pub fn output_child(parent: &ElementId, key: &str) -> Self {
        Self(format!("{}:{key}", parent.0))
    }

    /// A fresh random id, for elements with no natural key (expressions, breakpoints)
    pub fn generated() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_ids_are_deterministic() {
        assert_eq!(ElementId::stack_frame(1, 7), ElementId::stack_frame(1, 7));
        assert_eq!(
            ElementId::scope(1, "Locals", 4).as_str(),
            "scope:1:Locals:4"
        );
    }

    #[test]
    fn variable_ids_nest_under_parent() {
        let scope = ElementId::scope(1, "Locals", 4);
        let var = ElementId::variable(&scope, "x");
        assert_eq!(var.as_str(), "variable:scope:1:Locals:4:x");
        assert_ne!(var, ElementId::variable(&ElementId::scope(2, "Locals", 4), "x"));
    }

    #[test]
    fn generated_ids_differ() {
        assert_ne!(ElementId::generated(), ElementId::generated());
    }
}
