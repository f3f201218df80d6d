//! # Native Modules
//!
//! Host-provided extension modules importable from scripts. Factories and
//! callbacks are plain function pointers so a registry stays `Send` and
//! can cross into the worker thread that boots the runtime.

use indexmap::IndexMap;

use super::fault::{FaultKind, ScriptFault};
use super::value::Value;

/// Callback signature for functions exposed to scripts.
pub type NativeCallback = fn(&[Value]) -> Result<Value, ScriptFault>;

/// Factory invoked the first time a module is imported.
pub type ModuleFactory = fn() -> NativeModule;

/// Arity marker for native functions accepting any number of arguments.
pub const VARIADIC: usize = usize::MAX;

#[derive(Clone)]
pub struct NativeFunction {
    pub name: &'static str,
    pub arity: usize,
    callback: NativeCallback,
}

impl NativeFunction {
    pub fn new(name: &'static str, arity: usize, callback: NativeCallback) -> Self {
        Self {
            name,
            arity,
            callback,
        }
    }

    /// Checks arity, then invokes the callback.
    pub fn call(&self, args: &[Value]) -> Result<Value, ScriptFault> {
        if self.arity != VARIADIC && args.len() != self.arity {
            return Err(ScriptFault::new(
                FaultKind::TypeError,
                format!(
                    "{}() takes {} arguments ({} given)",
                    self.name,
                    self.arity,
                    args.len()
                ),
            ));
        }
        (self.callback)(args)
    }
}

/// A named bag of native functions, visible to scripts as attributes of
/// the imported module object.
#[derive(Clone)]
pub struct NativeModule {
    pub name: String,
    functions: IndexMap<String, NativeFunction>,
}

impl NativeModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functions: IndexMap::new(),
        }
    }

    /// Builder-style registration of one exported function.
    pub fn function(mut self, name: &'static str, arity: usize, callback: NativeCallback) -> Self {
        self.functions
            .insert(name.to_string(), NativeFunction::new(name, arity, callback));
        self
    }

    pub fn attribute(&self, name: &str) -> Option<Value> {
        self.functions
            .get(name)
            .map(|function| Value::native_function(function.clone()))
    }
}

/// Ordered mapping from module name to factory. Handed to the runtime at
/// boot; imports afterwards resolve against it, so late registration is
/// impossible by construction.
#[derive(Clone, Default)]
pub struct ModuleRegistry {
    factories: IndexMap<String, ModuleFactory>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory under `name`. Registering the same name twice
    /// replaces the earlier factory.
    pub fn register(&mut self, name: impl Into<String>, factory: ModuleFactory) {
        self.factories.insert(name.into(), factory);
    }

    pub fn instantiate(&self, name: &str) -> Option<NativeModule> {
        self.factories.get(name).map(|factory| factory())
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}
