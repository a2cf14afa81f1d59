//! Execution engine contract
//!
//! The package manager never runs Ember code itself. It drives an engine
//! through [`ExecutionEngine`] (context creation) and [`ExecutionContext`]
//! (evaluation, symbol-table access). Embedders implement both traits for
//! their interpreter.

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Host function signature
pub type NativeFn = Arc<dyn Fn(&[Value]) -> Value + Send + Sync>;

/// Script-defined function as seen from the host
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub arity: usize,
}

/// A value stored in a context's global table
#[derive(Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Number(f64),
    Str(String),
    /// Script function
    Function(Arc<Function>),
    /// Host function
    Native(NativeFn),
}

impl Value {
    /// Functions and host functions are the only exportable values
    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Function(_) | Value::Native(_))
    }

    /// Wrap a closure as a host function value
    pub fn native<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> Value + Send + Sync + 'static,
    {
        Value::Native(Arc::new(f))
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "Nil"),
            Value::Bool(b) => write!(f, "Bool({})", b),
            Value::Number(n) => write!(f, "Number({})", n),
            Value::Str(s) => write!(f, "Str({:?})", s),
            Value::Function(func) => write!(f, "Function({})", func.name),
            Value::Native(_) => write!(f, "Native(<fn>)"),
        }
    }
}

/// One entry of a context's global table
#[derive(Debug, Clone)]
pub struct Global {
    pub name: String,
    pub value: Value,
}

impl Global {
    pub fn is_callable(&self) -> bool {
        self.value.is_callable()
    }
}

/// Errors reported by an engine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Source text failed to compile or run
    #[error("evaluation failed: {0}")]
    Evaluation(String),

    /// The global table cannot take another entry
    #[error("global table full")]
    CapacityExceeded,
}

/// An isolated execution context (one VM instance).
///
/// A context is owned by exactly one package or consumer. It is released
/// through [`ExecutionContext::dispose`], which consumes the box so a context
/// can never be released twice.
pub trait ExecutionContext: Send {
    /// Evaluate source text, defining its globals in this context
    fn evaluate(&mut self, source: &str) -> Result<(), EngineError>;

    /// Snapshot of the global table
    fn globals(&self) -> Vec<Global>;

    /// Define or overwrite a global
    fn set_global(&mut self, name: &str, value: Value) -> Result<(), EngineError>;

    /// Whether a global named `name` exists
    fn has_global(&self, name: &str) -> bool {
        self.globals().iter().any(|g| g.name == name)
    }

    /// Release engine resources
    fn dispose(self: Box<Self>) {}
}

/// Factory for execution contexts
pub trait ExecutionEngine: Send + Sync {
    fn new_context(&self) -> Box<dyn ExecutionContext>;
}
