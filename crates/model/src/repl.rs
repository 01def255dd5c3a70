//! The REPL output buffer
//!
//! An append-only, bounded log of console output, logged values and REPL expressions. Consecutive
//! identical log lines collapse into one counted element and streamed program output continues
//! the previous line until a newline arrives.
use std::{
    collections::VecDeque,
    sync::{Arc, OnceLock},
};

use serde_json::Value;

use crate::{ElementId, Expression, massage_value};

const OUTPUT_CATEGORY: &str = "output";
const SNAPSHOT_ANNOTATION: &str = "Only primitive values are shown for this object.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Ignore,
    Info,
    Warning,
    Error,
}

impl Severity {
    /// Severity of program output in the given adapter category
    pub fn from_output_category(category: Option<&str>) -> Self {
        match category {
            Some("stderr") => Severity::Error,
            Some("console") => Severity::Warning,
            _ => Severity::Info,
        }
    }
}

/// One line of text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueOutput {
    id: ElementId,
    pub value: String,
    pub severity: Severity,
    pub category: Option<String>,
    /// How many identical consecutive lines this element stands for
    pub counter: usize,
}

impl ValueOutput {
    pub fn id(&self) -> &ElementId {
        &self.id
    }
}

/// A structured value, expanded one level at a time
#[derive(Debug)]
pub struct KeyValueOutput {
    id: ElementId,
    key: String,
    value: Value,
    annotation: Option<String>,
    max_children: usize,
    children: OnceLock<Vec<KeyValueOutput>>,
}

impl KeyValueOutput {
    fn new(
        id: ElementId,
        key: impl Into<String>,
        value: Value,
        annotation: Option<String>,
        max_children: usize,
    ) -> Self {
        Self {
            id,
            key: key.into(),
            value,
            annotation,
            max_children,
            children: OnceLock::new(),
        }
    }

    pub fn id(&self) -> &ElementId {
        &self.id
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn annotation(&self) -> Option<&str> {
        self.annotation.as_deref()
    }

    pub fn raw_value(&self) -> &Value {
        &self.value
    }

    pub fn display_value(&self) -> String {
        match &self.value {
            Value::Null => "null".to_string(),
            Value::Array(items) => format!("Array[{}]", items.len()),
            Value::Object(_) => "Object".to_string(),
            Value::String(s) => format!("\"{}\"", massage_value(s)),
            other => other.to_string(),
        }
    }

    /// Entries of an array or object, capped in number; computed on first access
    pub fn children(&self) -> &[KeyValueOutput] {
        self.children.get_or_init(|| {
            let child = |key: String, value: &Value| {
                KeyValueOutput::new(
                    ElementId::output_child(&self.id, &key),
                    key,
                    value.clone(),
                    None,
                    self.max_children,
                )
            };
            match &self.value {
                Value::Array(items) => items
                    .iter()
                    .take(self.max_children)
                    .enumerate()
                    .map(|(index, value)| child(index.to_string(), value))
                    .collect(),
                Value::Object(map) => map
                    .iter()
                    .take(self.max_children)
                    .map(|(key, value)| child(key.clone(), value))
                    .collect(),
                _ => Vec::new(),
            }
        })
    }
}

#[derive(Debug)]
pub enum ReplElement {
    Value(ValueOutput),
    KeyValue(KeyValueOutput),
    Expression(Arc<Expression>),
}

impl ReplElement {
    pub fn id(&self) -> ElementId {
        match self {
            ReplElement::Value(output) => output.id.clone(),
            ReplElement::KeyValue(output) => output.id.clone(),
            ReplElement::Expression(expression) => expression.id().clone(),
        }
    }

    pub fn display_value(&self) -> String {
        match self {
            ReplElement::Value(output) => output.value.clone(),
            ReplElement::KeyValue(output) => output.display_value(),
            ReplElement::Expression(expression) => expression.value(),
        }
    }

    /// Children of structured output. Expression children are fetched through
    /// [`Expression::children`].
    pub fn children(&self) -> &[KeyValueOutput] {
        match self {
            ReplElement::KeyValue(output) => output.children(),
            _ => &[],
        }
    }

    pub fn as_value(&self) -> Option<&ValueOutput> {
        match self {
            ReplElement::Value(output) => Some(output),
            _ => None,
        }
    }

    fn as_value_mut(&mut self) -> Option<&mut ValueOutput> {
        match self {
            ReplElement::Value(output) => Some(output),
            _ => None,
        }
    }
}

pub struct ReplBuffer {
    elements: VecDeque<ReplElement>,
    max_length: usize,
    max_key_value_children: usize,
    next_output_id: u64,
}

impl ReplBuffer {
    pub fn new(max_length: usize, max_key_value_children: usize) -> Self {
        Self {
            elements: VecDeque::new(),
            max_length,
            max_key_value_children,
            next_output_id: 0,
        }
    }

    pub fn elements(&self) -> impl Iterator<Item = &ReplElement> {
        self.elements.iter()
    }

    pub fn get(&self, index: usize) -> Option<&ReplElement> {
        self.elements.get(index)
    }

    pub fn last(&self) -> Option<&ReplElement> {
        self.elements.back()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    fn next_id(&mut self) -> ElementId {
        let id = ElementId::output(self.next_output_id);
        self.next_output_id += 1;
        id
    }

    fn value_output(&mut self, value: &str, severity: Severity, category: Option<&str>) -> ReplElement {
        ReplElement::Value(ValueOutput {
            id: self.next_id(),
            value: value.to_string(),
            severity,
            category: category.map(str::to_string),
            counter: 1,
        })
    }

    /// Log a message or a structured value.
    ///
    /// Strings are split into one element per line, unless the whole string repeats the previous
    /// line at the same severity, which only increments that line's counter.
    pub fn log(&mut self, value: Value, severity: Severity) {
        let text = match value {
            Value::String(text) => text,
            structured => {
                let element = ReplElement::KeyValue(KeyValueOutput::new(
                    self.next_id(),
                    String::new(),
                    structured,
                    Some(SNAPSHOT_ANNOTATION.to_string()),
                    self.max_key_value_children,
                ));
                self.push_all(vec![element]);
                return;
            }
        };

        if !text.trim().is_empty() {
            let previous = self.elements.back_mut().and_then(ReplElement::as_value_mut);
            if let Some(previous) = previous.filter(|p| p.value == text && p.severity == severity) {
                previous.counter += 1;
                return;
            }
        }

        let elements = text
            .trim()
            .split('\n')
            .map(|line| self.value_output(line, severity, None))
            .collect::<Vec<_>>();
        self.push_all(elements);
    }

    /// Append streamed program output.
    ///
    /// Text up to the first newline continues the previous element when that is program output of
    /// the same severity; an empty previous line is dropped otherwise.
    pub fn append_output(&mut self, text: &str, severity: Severity) {
        let mut lines = text.split('\n');

        let mut drop_previous = false;
        if let Some(previous) = self.elements.back_mut().and_then(ReplElement::as_value_mut) {
            if previous.category.as_deref() == Some(OUTPUT_CATEGORY) && previous.severity == severity
            {
                previous.value.push_str(lines.next().unwrap_or_default());
            } else {
                drop_previous = previous.value.is_empty();
            }
        }
        if drop_previous {
            self.elements.pop_back();
        }

        let elements = lines
            .map(|line| self.value_output(line, severity, Some(OUTPUT_CATEGORY)))
            .collect::<Vec<_>>();
        self.push_all(elements);
    }

    pub fn push_expression(&mut self, expression: Arc<Expression>) {
        self.push_all(vec![ReplElement::Expression(expression)]);
    }

    /// Remove every element, returning whether there were any
    pub fn clear(&mut self) -> bool {
        let had_elements = !self.elements.is_empty();
        self.elements.clear();
        had_elements
    }

    fn push_all(&mut self, elements: Vec<ReplElement>) {
        self.elements.extend(elements);
        if self.elements.len() > self.max_length {
            let excess = self.elements.len() - self.max_length;
            tracing::trace!(excess, "trimming repl buffer");
            self.elements.drain(..excess);
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn buffer() -> ReplBuffer {
        ReplBuffer::new(10_000, 1_000)
    }

    fn values(buffer: &ReplBuffer) -> Vec<String> {
        buffer.elements().map(|e| e.display_value()).collect()
    }

    #[test]
    fn repeated_lines_are_counted() {
        let mut buffer = buffer();
        buffer.log(json!("hello"), Severity::Info);
        buffer.log(json!("hello"), Severity::Info);

        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.get(0).and_then(|e| e.as_value()).unwrap().counter, 2);
    }

    #[test]
    fn repeats_need_the_same_severity() {
        let mut buffer = buffer();
        buffer.log(json!("hello"), Severity::Info);
        buffer.log(json!("hello"), Severity::Error);
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn blank_lines_are_never_merged() {
        let mut buffer = buffer();
        buffer.log(json!("  "), Severity::Info);
        buffer.log(json!("  "), Severity::Info);
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn multi_line_logs_are_split() {
        let mut buffer = buffer();
        buffer.log(json!("a\nb\n"), Severity::Warning);
        assert_eq!(values(&buffer), vec!["a", "b"]);
    }

    #[test]
    fn structured_values_expand_lazily() {
        let mut buffer = ReplBuffer::new(10, 2);
        buffer.log(json!({ "a": [1, 2, 3], "b": "x\ty", "c": null }), Severity::Info);

        let element = buffer.get(0).unwrap();
        assert_eq!(element.display_value(), "Object");
        let children = element.children();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].key(), "a");
        assert_eq!(children[0].display_value(), "Array[3]");
        assert_eq!(children[0].children().len(), 2);
        assert_eq!(children[1].display_value(), "\"x\\ty\"");
        assert_ne!(children[0].id(), children[1].id());
    }

    #[test]
    fn object_children_keep_property_order() {
        let mut buffer = ReplBuffer::new(10, 2);
        buffer.log(
            serde_json::from_str(r#"{"zeta": 1, "beta": 2, "alpha": 3}"#).unwrap(),
            Severity::Info,
        );

        let keys: Vec<_> = buffer.get(0).unwrap().children().iter().map(|c| c.key()).collect();
        assert_eq!(keys, vec!["zeta", "beta"]);
    }

    #[test]
    fn output_continues_previous_line() {
        let mut buffer = buffer();
        buffer.append_output("Hello, ", Severity::Info);
        buffer.append_output("world\nnext", Severity::Info);

        assert_eq!(values(&buffer), vec!["Hello, world", "next"]);
    }

    #[test]
    fn output_of_other_severity_starts_a_new_line() {
        let mut buffer = buffer();
        buffer.append_output("out", Severity::Info);
        buffer.append_output("err", Severity::Error);
        assert_eq!(values(&buffer), vec!["out", "err"]);
    }

    #[test]
    fn empty_separator_is_dropped() {
        let mut buffer = buffer();
        buffer.log(json!("first"), Severity::Info);
        buffer.append_output("trailing\n", Severity::Error);
        assert_eq!(values(&buffer), vec!["first", "trailing", ""]);

        buffer.log(json!("done"), Severity::Info);
        buffer.append_output("more", Severity::Warning);
        assert_eq!(values(&buffer), vec!["first", "trailing", "", "done", "more"]);

        // an empty line from another stream is replaced rather than kept
        buffer.append_output("x\n", Severity::Warning);
        buffer.append_output("y", Severity::Error);
        assert_eq!(values(&buffer).last().map(String::as_str), Some("y"));
        assert!(!values(&buffer).iter().rev().take(2).any(|v| v.is_empty()));
    }

    #[test]
    fn buffer_is_bounded() {
        let mut buffer = ReplBuffer::new(3, 10);
        for i in 0..5 {
            buffer.log(json!(format!("line {i}")), Severity::Info);
        }
        assert_eq!(values(&buffer), vec!["line 2", "line 3", "line 4"]);

        buffer.append_output("a\nb\nc\nd", Severity::Info);
        assert_eq!(values(&buffer), vec!["b", "c", "d"]);
    }

    #[test]
    fn output_ids_are_unique() {
        let mut buffer = buffer();
        buffer.log(json!("a\nb"), Severity::Info);
        assert_ne!(buffer.get(0).unwrap().id(), buffer.get(1).unwrap().id());
    }
}
