//! Invocable descriptions and local dispatch
//!
//! Work sent to a member is either a zero-argument closure or a named
//! operation (module, function, arguments). Every member owns an
//! [`OperationTable`] that resolves named operations to handlers.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::Fault;
use crate::types::{Region, Value};

/// Module of the built-in introspection operations
pub const INTROSPECT_MODULE: &str = "introspect";
/// `introspect:function_exported(Module, Function, Arity) -> bool`
pub const FUNCTION_EXPORTED: &str = "function_exported";
/// Module exposing a member's region
pub const REGION_MODULE: &str = "region";
/// `region:own_region() -> string`
pub const OWN_REGION: &str = "own_region";

/// Handler for a named operation
pub type Handler = Arc<dyn Fn(&[Value]) -> Result<Value, Fault> + Send + Sync>;

/// Zero-argument closure executed on the target member
pub type Thunk = Box<dyn FnOnce() -> Result<Value, Fault> + Send + 'static>;

/// Explicit operation descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub module: String,
    pub function: String,
    pub args: Vec<Value>,
}

impl Operation {
    /// Create an operation descriptor
    pub fn new(module: impl Into<String>, function: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            module: module.into(),
            function: function.into(),
            args,
        }
    }

    /// Number of arguments
    pub fn arity(&self) -> usize {
        self.args.len()
    }

    /// `module:function/arity`
    pub fn label(&self) -> String {
        format!("{}:{}/{}", self.module, self.function, self.arity())
    }

    /// The probe asking whether `module:function/arity` exists on a member
    pub fn function_exported(module: &str, function: &str, arity: usize) -> Self {
        Self::new(
            INTROSPECT_MODULE,
            FUNCTION_EXPORTED,
            vec![json!(module), json!(function), json!(arity)],
        )
    }

    /// Ask a member for its region
    pub fn own_region() -> Self {
        Self::new(REGION_MODULE, OWN_REGION, vec![])
    }
}

/// Work to run on some member
pub enum Invocable {
    Closure(Thunk),
    Named(Operation),
}

impl Invocable {
    /// Wrap a closure to run on the target member
    pub fn closure<F>(f: F) -> Self
    where
        F: FnOnce() -> Result<Value, Fault> + Send + 'static,
    {
        Invocable::Closure(Box::new(f))
    }

    /// Describe a named operation to run on the target member
    pub fn named(module: impl Into<String>, function: impl Into<String>, args: Vec<Value>) -> Self {
        Invocable::Named(Operation::new(module, function, args))
    }

    /// Short description for log lines
    pub fn label(&self) -> String {
        match self {
            Invocable::Closure(_) => "closure".to_string(),
            Invocable::Named(op) => op.label(),
        }
    }
}

impl From<Operation> for Invocable {
    fn from(op: Operation) -> Self {
        Invocable::Named(op)
    }
}

impl fmt::Debug for Invocable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Invocable::Closure(_) => f.write_str("Closure(<fn>)"),
            Invocable::Named(op) => f.debug_tuple("Named").field(op).finish(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct OperationKey {
    module: String,
    function: String,
    arity: usize,
}

impl OperationKey {
    fn new(module: &str, function: &str, arity: usize) -> Self {
        Self {
            module: module.to_string(),
            function: function.to_string(),
            arity,
        }
    }
}

/// Named operations a member can execute
#[derive(Default)]
pub struct OperationTable {
    handlers: DashMap<OperationKey, Handler>,
}

impl fmt::Debug for OperationTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationTable")
            .field("operations", &self.handlers.len())
            .finish()
    }
}

impl OperationTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Table of a member that speaks the region protocol
    pub fn for_region(region: Region) -> Self {
        let table = Self::new();
        table.register_region(region);
        table
    }

    /// Register a handler, replacing any previous one with the same arity
    pub fn register<F>(&self, module: &str, function: &str, arity: usize, handler: F)
    where
        F: Fn(&[Value]) -> Result<Value, Fault> + Send + Sync + 'static,
    {
        self.handlers
            .insert(OperationKey::new(module, function, arity), Arc::new(handler));
    }

    /// Expose `region:own_region/0`
    pub fn register_region(&self, region: Region) {
        self.register(REGION_MODULE, OWN_REGION, 0, move |_| {
            Ok(json!(region.as_str()))
        });
    }

    /// Remove a handler if registered
    pub fn unregister(&self, module: &str, function: &str, arity: usize) {
        self.handlers
            .remove(&OperationKey::new(module, function, arity));
    }

    /// Whether `module:function/arity` can be dispatched here
    pub fn is_exported(&self, module: &str, function: &str, arity: usize) -> bool {
        if module == INTROSPECT_MODULE && function == FUNCTION_EXPORTED && arity == 3 {
            return true;
        }
        self.handlers
            .contains_key(&OperationKey::new(module, function, arity))
    }

    /// Run a named operation
    pub fn dispatch(&self, op: &Operation) -> Result<Value, Fault> {
        if op.module == INTROSPECT_MODULE && op.function == FUNCTION_EXPORTED {
            return self.function_exported(&op.args);
        }

        // Clone the handler out so the shard lock is not held while it runs
        let handler = self
            .handlers
            .get(&OperationKey::new(&op.module, &op.function, op.arity()))
            .map(|entry| Arc::clone(entry.value()));

        match handler {
            Some(handler) => handler(&op.args),
            None => Err(Fault::Error(json!({ "undef": op.label() }))),
        }
    }

    /// Run any invocable in the calling context
    pub fn execute(&self, invocable: Invocable) -> Result<Value, Fault> {
        match invocable {
            Invocable::Closure(f) => f(),
            Invocable::Named(op) => self.dispatch(&op),
        }
    }

    fn function_exported(&self, args: &[Value]) -> Result<Value, Fault> {
        match args {
            [Value::String(module), Value::String(function), arity] => {
                let arity = arity
                    .as_u64()
                    .ok_or_else(|| Fault::Error(json!({ "badarg": arity })))?;
                Ok(Value::Bool(self.is_exported(module, function, arity as usize)))
            }
            _ => Err(Fault::Error(json!({ "badarg": args }))),
        }
    }
}
