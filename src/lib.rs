//! # tansy
//!
//! An asynchronous, stateful evaluation engine for the tansy scripting
//! language. Statements are queued from any thread and executed one at a
//! time by a worker hosting the embedded runtime; the results come back
//! on a broadcast event bus.
//!
//! ```no_run
//! use tansy::{Interpreter, InterpreterEvent};
//! use tansy::script::ModuleRegistry;
//!
//! # async fn demo() {
//! let mut engine = Interpreter::new(ModuleRegistry::new());
//! let mut events = engine.subscribe();
//! engine.start().unwrap();
//!
//! engine.evaluate("x = 2");
//! engine.evaluate("x + 2");
//! while let Ok(event) = events.recv().await {
//!     if let InterpreterEvent::Evaluated { output, .. } = event {
//!         if !output.is_empty() {
//!             println!("{output}"); // "4"
//!             break;
//!         }
//!     }
//! }
//! engine.stop();
//! # }
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod instance;
pub mod interpreter;
pub mod queue;
pub mod script;

// Re-exports
pub use config::*;
pub use error::*;
pub use event::*;
pub use interpreter::*;
