//! # Runtime Instance
//!
//! A booted embedded runtime: the evaluator plus the builtins and
//! top-level namespaces it hands to execution contexts. The runtime is a
//! process singleton, the way embedded interpreters with global state
//! are, so booting a second instance while one is alive panics.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, trace};

use crate::context::ExecutionContext;
use crate::script::ast::{Expr, Stmt};
use crate::script::interp::{self, Evaluator};
use crate::script::namespace::{Namespace, NamespaceRef};
use crate::script::parser;
use crate::script::{ModuleRegistry, ScriptFault, Value};

static RUNTIME_ACTIVE: AtomicBool = AtomicBool::new(false);

pub struct RuntimeInstance {
    evaluator: Evaluator,
    top_level: NamespaceRef,
}

impl RuntimeInstance {
    /// Boots the runtime: claims the process-wide slot, installs the
    /// builtins, and creates the top level scripts define into.
    ///
    /// # Panics
    ///
    /// Panics if another instance is alive in this process.
    pub fn boot(modules: ModuleRegistry, max_call_depth: usize) -> Self {
        let was_active = RUNTIME_ACTIVE.swap(true, Ordering::SeqCst);
        assert!(
            !was_active,
            "embedded runtime is already booted in this process"
        );
        for name in modules.names() {
            trace!(module = name, "native module available");
        }
        debug!(max_call_depth, "booting embedded runtime");
        let builtins = Namespace::root();
        interp::install_builtins(&builtins);
        let top_level = Namespace::with_parent(builtins);
        Self {
            evaluator: Evaluator::new(modules, max_call_depth),
            top_level,
        }
    }

    /// The top-level namespace fresh execution contexts chain onto.
    pub fn top_level(&self) -> NamespaceRef {
        self.top_level.clone()
    }

    pub fn compile_expression(&self, source: &str) -> Result<Expr, ScriptFault> {
        parser::compile_expression(source)
    }

    pub fn compile_block(&self, source: &str) -> Result<Vec<Stmt>, ScriptFault> {
        parser::compile_block(source)
    }

    pub fn eval_expression(
        &mut self,
        expression: &Expr,
        context: &ExecutionContext,
    ) -> Result<Value, ScriptFault> {
        self.evaluator.eval_expression(expression, context.local())
    }

    pub fn run_block(
        &mut self,
        block: &[Stmt],
        context: &ExecutionContext,
    ) -> Result<(), ScriptFault> {
        self.evaluator.run_block(block, context.local())
    }

    /// Clears whatever a fault left behind so the next statement starts
    /// from a clean runtime.
    pub fn clear_fault_state(&mut self) {
        self.evaluator.reset_frames();
    }
}

impl Drop for RuntimeInstance {
    fn drop(&mut self) {
        debug!("finalizing embedded runtime");
        RUNTIME_ACTIVE.store(false, Ordering::SeqCst);
    }
}
