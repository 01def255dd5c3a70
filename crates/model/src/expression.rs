//! Inspectable values: variables fetched from the adapter and user-entered expressions.
//!
//! Both are expression containers: when their reference is positive they have children, which are
//! fetched lazily with a `variables` request. Children are re-created on every fetch, never
//! mutated.
use std::{
    collections::HashSet,
    sync::{Arc, Mutex, Weak},
};

use futures::FutureExt;
use protocol::{
    requests::{self, EvaluateContext},
    types::VariablesReference,
};

use crate::{
    ElementId, Scope, SessionHandle, StackFrame, ValueTracker,
    fetch::{Memo, lock},
    massage_value,
};

/// Value of an expression that has not been (or could not be) evaluated
pub(crate) const DEFAULT_VALUE: &str = "not available";
pub(crate) const START_SESSION_FIRST: &str = "Please start a debug session to evaluate";

/// The node a variable was fetched from
#[derive(Clone)]
pub enum ExpressionParent {
    Scope(Arc<Scope>),
    Variable(Arc<Variable>),
    Expression(Arc<Expression>),
}

impl ExpressionParent {
    pub fn id(&self) -> ElementId {
        match self {
            ExpressionParent::Scope(scope) => scope.id(),
            ExpressionParent::Variable(variable) => variable.id().clone(),
            ExpressionParent::Expression(expression) => expression.id().clone(),
        }
    }
}

/// Parents are held weakly: a variable navigates to its parent but does not keep it alive
#[derive(Clone)]
pub(crate) enum WeakParent {
    Scope(Weak<Scope>),
    Variable(Weak<Variable>),
    Expression(Weak<Expression>),
}

impl WeakParent {
    fn upgrade(&self) -> Option<ExpressionParent> {
        match self {
            WeakParent::Scope(scope) => scope.upgrade().map(ExpressionParent::Scope),
            WeakParent::Variable(variable) => variable.upgrade().map(ExpressionParent::Variable),
            WeakParent::Expression(expression) => {
                expression.upgrade().map(ExpressionParent::Expression)
            }
        }
    }
}

/// Fetch the children of `reference`, deduplicated by name with the first occurrence winning
pub(crate) async fn fetch_variables(
    session: SessionHandle,
    parent: WeakParent,
    parent_id: ElementId,
    reference: VariablesReference,
    values: ValueTracker,
) -> eyre::Result<Vec<Arc<Variable>>> {
    tracing::debug!(%parent_id, reference, "fetching variables");
    let response = session
        .variables(requests::Variables {
            variables_reference: reference,
        })
        .await?;

    let mut seen = HashSet::new();
    Ok(response
        .variables
        .into_iter()
        .filter(|v| seen.insert(v.name.clone()))
        .map(|v| {
            Arc::new(Variable::new(
                parent.clone(),
                &parent_id,
                v.variables_reference,
                v.name,
                &v.value,
                true,
                &values,
            ))
        })
        .collect())
}

/// Children of an expression container; a failed fetch yields a single error child
async fn resolve_children(
    session: SessionHandle,
    parent: WeakParent,
    parent_id: ElementId,
    reference: VariablesReference,
    values: ValueTracker,
) -> Vec<Arc<Variable>> {
    match fetch_variables(session, parent.clone(), parent_id.clone(), reference, values.clone())
        .await
    {
        Ok(children) => children,
        Err(e) => {
            tracing::warn!(error = %e, %parent_id, reference, "fetching children failed");
            vec![Arc::new(Variable::new(
                parent,
                &parent_id,
                0,
                String::new(),
                &e.to_string(),
                false,
                &values,
            ))]
        }
    }
}

/// Shared children logic of variables and expressions
async fn container_children(
    memo: Option<&Memo<Vec<Arc<Variable>>>>,
    session: Option<&SessionHandle>,
    parent: WeakParent,
    parent_id: &ElementId,
    reference: VariablesReference,
    values: &ValueTracker,
) -> Vec<Arc<Variable>> {
    // only nodes with a positive reference have children
    let Some(session) = session.filter(|_| reference > 0) else {
        return Vec::new();
    };

    let session = Arc::clone(session);
    let parent_id = parent_id.clone();
    let values = values.clone();
    match memo {
        Some(memo) => {
            memo.get_or_fetch(move |_| {
                resolve_children(session, parent, parent_id, reference, values).boxed()
            })
            .await
        }
        None => resolve_children(session, parent, parent_id, reference, values).await,
    }
}

/// A named value fetched as the child of a scope, variable or expression
pub struct Variable {
    id: ElementId,
    parent: WeakParent,
    name: String,
    value: String,
    available: bool,
    value_changed: bool,
    reference: VariablesReference,
    values: ValueTracker,
    children: Memo<Vec<Arc<Variable>>>,
}

impl Variable {
    pub(crate) fn new(
        parent: WeakParent,
        parent_id: &ElementId,
        reference: VariablesReference,
        name: String,
        value: &str,
        available: bool,
        values: &ValueTracker,
    ) -> Self {
        let id = ElementId::variable(parent_id, &name);
        let value_changed = values.record(&id, value, None);
        Self {
            id,
            parent,
            name,
            value: massage_value(value),
            available,
            value_changed,
            reference,
            values: values.clone(),
            children: Memo::new(),
        }
    }

    pub fn id(&self) -> &ElementId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The display value, with control characters escaped
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn available(&self) -> bool {
        self.available
    }

    /// Whether the value differs from the one seen for the same variable before this fetch
    pub fn value_changed(&self) -> bool {
        self.value_changed
    }

    pub fn reference(&self) -> VariablesReference {
        self.reference
    }

    pub fn has_children(&self) -> bool {
        self.reference > 0
    }

    /// The node this variable was fetched from, if it is still alive
    pub fn parent(&self) -> Option<ExpressionParent> {
        self.parent.upgrade()
    }

    /// Children are fetched once and cached for the lifetime of this variable
    #[tracing::instrument(skip_all, fields(id = %self.id))]
    pub async fn children(self: &Arc<Self>, session: Option<&SessionHandle>) -> Vec<Arc<Variable>> {
        container_children(
            Some(&self.children),
            session,
            WeakParent::Variable(Arc::downgrade(self)),
            &self.id,
            self.reference,
            &self.values,
        )
        .await
    }

    /// Build an expression that evaluates to this variable from the names of its ancestors
    pub fn full_expression_name(&self, session_type: &str) -> String {
        let mut names = vec![self.name.clone()];
        let mut parent = self.parent();
        while let Some(node) = parent {
            parent = match node {
                ExpressionParent::Variable(variable) => {
                    names.push(variable.name.clone());
                    variable.parent()
                }
                ExpressionParent::Expression(expression) => {
                    names.push(expression.name());
                    None
                }
                ExpressionParent::Scope(_) => None,
            };
        }
        names.reverse();
        join_expression_names(&names, session_type)
    }
}

impl std::fmt::Debug for Variable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Variable")
            .field("id", &self.id)
            .field("value", &self.value)
            .field("reference", &self.reference)
            .finish()
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_array_element(name: &str) -> bool {
    name.strip_suffix(']')
        .map(|rest| rest.contains('['))
        .unwrap_or(false)
}

fn join_expression_names(names: &[String], session_type: &str) -> String {
    let mut result = String::new();
    for name in names {
        if result.is_empty() {
            result = name.clone();
        } else if is_array_element(name) || (session_type == "node" && !is_identifier(name)) {
            // a['property'] also covers array elements
            if name.starts_with('[') {
                result.push_str(name);
            } else {
                result = format!("{result}['{name}']");
            }
        } else {
            result = format!("{result}.{name}");
        }
    }
    result
}

#[derive(Debug)]
struct ExpressionState {
    name: String,
    value: String,
    available: bool,
    value_changed: bool,
    reference: VariablesReference,
}

/// A user-entered watch or REPL expression, re-evaluated in place
pub struct Expression {
    id: ElementId,
    cache_children: bool,
    values: ValueTracker,
    state: Mutex<ExpressionState>,
    children: Memo<Vec<Arc<Variable>>>,
}

impl Expression {
    pub fn new(name: impl Into<String>, cache_children: bool, values: &ValueTracker) -> Self {
        let expression = Self {
            id: ElementId::generated(),
            cache_children,
            values: values.clone(),
            state: Mutex::new(ExpressionState {
                name: name.into(),
                value: String::new(),
                available: false,
                value_changed: false,
                reference: 0,
            }),
            children: Memo::new(),
        };
        expression.set_value(DEFAULT_VALUE);
        expression
    }

    pub fn id(&self) -> &ElementId {
        &self.id
    }

    pub fn name(&self) -> String {
        lock(&self.state).name.clone()
    }

    pub fn value(&self) -> String {
        lock(&self.state).value.clone()
    }

    pub fn available(&self) -> bool {
        lock(&self.state).available
    }

    pub fn value_changed(&self) -> bool {
        lock(&self.state).value_changed
    }

    pub fn reference(&self) -> VariablesReference {
        lock(&self.state).reference
    }

    pub fn has_children(&self) -> bool {
        self.reference() > 0
    }

    pub(crate) fn set_name(&self, name: impl Into<String>) {
        lock(&self.state).name = name.into();
    }

    pub(crate) fn set_value(&self, value: &str) {
        let value_changed = self.values.record(&self.id, value, Some(DEFAULT_VALUE));
        let mut state = lock(&self.state);
        state.value = massage_value(value);
        state.value_changed = value_changed;
    }

    pub(crate) fn set_unavailable(&self, value: &str) {
        self.set_value(value);
        let mut state = lock(&self.state);
        state.available = false;
        state.reference = 0;
    }

    /// Children of the last evaluation result.
    ///
    /// Watch expressions do not cache children and fetch them on every call; REPL expressions
    /// fetch once.
    #[tracing::instrument(skip_all, fields(id = %self.id))]
    pub async fn children(self: &Arc<Self>, session: Option<&SessionHandle>) -> Vec<Arc<Variable>> {
        let memo = self.cache_children.then_some(&self.children);
        container_children(
            memo,
            session,
            WeakParent::Expression(Arc::downgrade(self)),
            &self.id,
            self.reference(),
            &self.values,
        )
        .await
    }
}

impl std::fmt::Debug for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Expression")
            .field("id", &self.id)
            .field("state", &*lock(&self.state))
            .finish()
    }
}

/// Evaluate `expression` in the context of `frame`, storing the outcome on the expression.
///
/// Never fails: without a session the expression gets a placeholder value and no request is made,
/// and a failed request stores the error message as an unavailable value.
#[tracing::instrument(skip(session, frame, expression), fields(id = %expression.id()))]
pub async fn evaluate_expression(
    session: Option<&SessionHandle>,
    frame: Option<&StackFrame>,
    expression: &Expression,
    context: EvaluateContext,
) {
    let Some(session) = session else {
        let placeholder = match context {
            EvaluateContext::Repl => START_SESSION_FIRST,
            _ => DEFAULT_VALUE,
        };
        expression.set_unavailable(placeholder);
        return;
    };

    let args = requests::Evaluate {
        expression: expression.name(),
        frame_id: frame.map(|f| f.frame_id()),
        context,
    };
    match session.evaluate(args).await {
        Ok(response) => {
            expression.set_value(&response.result);
            let mut state = lock(&expression.state);
            state.available = true;
            state.reference = response.variables_reference;
        }
        Err(e) => {
            tracing::warn!(error = %e, "evaluate request failed");
            expression.set_unavailable(&e.to_string());
        }
    }
}
