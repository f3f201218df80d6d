//! # The embedded tansy language
//!
//! A small dynamic scripting language: tokenizer, recursive-descent
//! parser, and a tree-walking evaluator over reference-counted values.
//! Nothing in here knows about threads or events; the engine in the
//! crate root drives these pieces from its worker.

pub mod ast;
pub mod fault;
pub mod interp;
pub mod module;
pub mod namespace;
pub mod parser;
pub mod token;
pub mod value;

pub use fault::{FaultKind, ScriptFault, TraceFrame};
pub use module::{ModuleRegistry, NativeFunction, NativeModule};
pub use value::{Value, ValueKind};
