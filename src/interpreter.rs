//! # Interpreter Engine
//!
//! The public face of the crate. The engine owns a statement queue, an
//! event bus, and one worker thread hosting the embedded runtime.
//! Callers submit statements from any thread and never block; results
//! come back as [`InterpreterEvent`]s in submission order.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use thiserror::Error;
use tracing::{debug, debug_span, trace, warn};

use crate::config::InterpreterConfig;
use crate::context::ExecutionContext;
use crate::error::TansyResult;
use crate::event::{EventBus, EventReceiver, InterpreterEvent};
use crate::instance::RuntimeInstance;
use crate::queue::StatementQueue;
use crate::script::{ModuleRegistry, ScriptFault};

/// What executing one statement produced.
#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationOutcome {
    /// An expression produced a value; the string is its REPL form.
    Value(String),
    /// A statement block (or an expression evaluating to `none`) ran to
    /// completion without producing output.
    Empty,
    /// Compilation or evaluation failed.
    Failure(ScriptFault),
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Failed to spawn worker thread: {message}")]
    SpawnFailed { message: String },
}

/// Asynchronous, stateful evaluation engine.
///
/// Statements queue up FIFO and are executed one at a time on the worker
/// thread, against an execution context that persists across statements
/// until [`stop`](Self::stop).
pub struct Interpreter {
    config: InterpreterConfig,
    modules: ModuleRegistry,
    queue: Arc<StatementQueue>,
    bus: Arc<EventBus>,
    worker: Option<JoinHandle<()>>,
}

impl Interpreter {
    pub fn new(modules: ModuleRegistry) -> Self {
        Self::with_config(modules, InterpreterConfig::default())
    }

    pub fn with_config(modules: ModuleRegistry, config: InterpreterConfig) -> Self {
        let bus = Arc::new(EventBus::new(config.event_capacity));
        Self {
            config,
            modules,
            queue: Arc::new(StatementQueue::new()),
            bus,
            worker: None,
        }
    }

    /// Subscribes to the engine's events. Subscribe before
    /// [`start`](Self::start) to see everything the worker publishes.
    pub fn subscribe(&self) -> EventReceiver {
        self.bus.subscribe()
    }

    /// Queues a statement for evaluation and returns immediately. Empty
    /// and whitespace-only submissions are dropped without an event.
    pub fn evaluate(&self, statement: impl Into<String>) {
        self.queue.enqueue(statement);
    }

    /// Whether the queue is empty right now. The statement currently
    /// executing, if any, has already left the queue.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Spawns the worker thread. Calling it again while the worker is
    /// alive is a no-op.
    pub fn start(&mut self) -> TansyResult<()> {
        if self.worker.is_some() {
            warn!("interpreter is already running");
            return Ok(());
        }
        // ワーカーが最初のwait_for_signalで眠れるように先にrunningを立てる
        self.queue.mark_running();
        let queue = Arc::clone(&self.queue);
        let bus = Arc::clone(&self.bus);
        let modules = self.modules.clone();
        let max_call_depth = self.config.max_call_depth;

        let mut builder = thread::Builder::new().name("tansy-worker".to_string());
        if let Some(stack_size) = self.config.worker_stack_size {
            builder = builder.stack_size(stack_size);
        }
        let handle = builder
            .spawn(move || worker_loop(queue, bus, modules, max_call_depth))
            .map_err(|e| {
                self.queue.request_stop();
                EngineError::SpawnFailed {
                    message: e.to_string(),
                }
            })?;
        self.worker = Some(handle);
        debug!("interpreter started");
        Ok(())
    }

    /// Requests a stop and waits for the worker to exit. An in-flight
    /// statement finishes; statements still queued stay queued.
    /// Idempotent.
    ///
    /// # Panics
    ///
    /// Resumes the worker's panic if the worker panicked.
    pub fn stop(&mut self) {
        self.queue.request_stop();
        if let Some(handle) = self.worker.take() {
            if let Err(panic) = handle.join() {
                std::panic::resume_unwind(panic);
            }
        }
        debug!("interpreter stopped");
    }
}

impl Drop for Interpreter {
    fn drop(&mut self) {
        self.queue.request_stop();
        if let Some(handle) = self.worker.take() {
            let result = handle.join();
            // すでにパニック中なら二重パニックを避けるため結果は捨てる
            if !thread::panicking() {
                if let Err(panic) = result {
                    std::panic::resume_unwind(panic);
                }
            }
        }
    }
}

/// The worker: boots the runtime, drains statements until a stop is
/// requested, then tears the runtime down and announces the exit.
fn worker_loop(
    queue: Arc<StatementQueue>,
    bus: Arc<EventBus>,
    modules: ModuleRegistry,
    max_call_depth: usize,
) {
    let span = debug_span!("worker");
    let _enter = span.enter();

    let mut instance = RuntimeInstance::boot(modules, max_call_depth);
    // 最初のステートメントが来るまでコンテキスト作成を遅らせる
    let mut context: Option<ExecutionContext> = None;

    while queue.is_running() {
        queue.wait_for_signal();
        // 単一コンシューマなのでis_emptyの後のdequeueは外れない
        while queue.is_running() && !queue.is_empty() {
            let statement = queue.dequeue();
            publish(&bus, InterpreterEvent::StateChanged { busy: true });
            let current = context.get_or_insert_with(|| ExecutionContext::create(&instance));
            match execute(&mut instance, current, &statement) {
                EvaluationOutcome::Value(output) => {
                    publish(&bus, InterpreterEvent::Evaluated { statement, output });
                }
                EvaluationOutcome::Empty => {
                    publish(
                        &bus,
                        InterpreterEvent::Evaluated {
                            statement,
                            output: String::new(),
                        },
                    );
                }
                EvaluationOutcome::Failure(fault) => {
                    publish(
                        &bus,
                        InterpreterEvent::Error {
                            statement,
                            message: fault.render(),
                        },
                    );
                    instance.clear_fault_state();
                }
            }
            publish(&bus, InterpreterEvent::StateChanged { busy: false });
        }
    }

    // Terminatedを観測した時点で再起動できるように、先にランタイムを畳む
    drop(context);
    drop(instance);
    publish(&bus, InterpreterEvent::Terminated);
}

/// Expression-first dispatch: compile the text as an expression and
/// evaluate it; if it does not compile as one, run it as a statement
/// block. Only the block form's diagnostic is ever reported.
fn execute(
    instance: &mut RuntimeInstance,
    context: &ExecutionContext,
    statement: &str,
) -> EvaluationOutcome {
    match instance.compile_expression(statement) {
        Ok(expression) => match instance.eval_expression(&expression, context) {
            Ok(value) if value.is_none() => EvaluationOutcome::Empty,
            Ok(value) => EvaluationOutcome::Value(value.repr()),
            Err(fault) => EvaluationOutcome::Failure(fault),
        },
        Err(_) => {
            trace!("not an expression, retrying as a statement block");
            match instance.compile_block(statement) {
                Ok(block) => match instance.run_block(&block, context) {
                    Ok(()) => EvaluationOutcome::Empty,
                    Err(fault) => EvaluationOutcome::Failure(fault),
                },
                Err(fault) => EvaluationOutcome::Failure(fault),
            }
        }
    }
}

// 購読者がいない場合のSendFailedは失敗ではない
fn publish(bus: &EventBus, event: InterpreterEvent) {
    trace!(event = event.as_ref(), "publishing");
    if let Err(error) = bus.publish(event) {
        trace!(%error, "event had no subscribers");
    }
}
