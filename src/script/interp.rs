//! # Evaluator
//!
//! Tree-walking evaluation with explicit control flow. Faults raised here
//! carry a snapshot of the live call frames, outermost call first, which
//! is what rendered tracebacks are built from.

use std::cmp::Ordering;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::trace;

use super::ast::{BinaryOp, Expr, ExprKind, Literal, Stmt, StmtKind, UnaryOp};
use super::fault::{FaultKind, ScriptFault, TraceFrame};
use super::module::{ModuleRegistry, NativeFunction, VARIADIC};
use super::namespace::{Namespace, NamespaceRef};
use super::value::{UserFunction, Value, ValueKind};

/// Pseudo file name reported in trace frames. Everything the engine runs
/// arrives as submitted text, never from a file on disk.
const SOURCE_NAME: &str = "<stdin>";

/// How control leaves a statement.
#[derive(Debug)]
enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

/// A live call frame. `line` follows the statement currently executing
/// in the frame so a fault raised deeper down reports the right call
/// site.
#[derive(Debug, Clone)]
struct Frame {
    function: String,
    line: u32,
}

/// Tree-walking evaluator. One lives per runtime instance and owns the
/// call-frame stack, the module registry, and the cache of modules a
/// script has already imported.
pub struct Evaluator {
    frames: Vec<Frame>,
    max_call_depth: usize,
    registry: ModuleRegistry,
    loaded: IndexMap<String, Value>,
}

impl Evaluator {
    pub fn new(registry: ModuleRegistry, max_call_depth: usize) -> Self {
        Self {
            frames: Vec::new(),
            max_call_depth,
            registry,
            loaded: IndexMap::new(),
        }
    }

    /// Evaluates a single expression in `namespace` and returns its value.
    pub fn eval_expression(
        &mut self,
        expression: &Expr,
        namespace: &NamespaceRef,
    ) -> Result<Value, ScriptFault> {
        self.frames.push(Frame {
            function: "<module>".to_string(),
            line: expression.line,
        });
        let result = self.eval(expression, namespace);
        self.frames.pop();
        result
    }

    /// Runs a statement block in `namespace`. Loop-control and `return`
    /// escaping the block are reported as syntax faults, the way a REPL
    /// rejects them at top level.
    pub fn run_block(
        &mut self,
        block: &[Stmt],
        namespace: &NamespaceRef,
    ) -> Result<(), ScriptFault> {
        let Some(first) = block.first() else {
            return Ok(());
        };
        self.frames.push(Frame {
            function: "<module>".to_string(),
            line: first.line,
        });
        let result = match self.run(block, namespace) {
            Ok(Flow::Normal) => Ok(()),
            Ok(Flow::Break) => Err(self.raise(FaultKind::SyntaxError, "'break' outside loop")),
            Ok(Flow::Continue) => {
                Err(self.raise(FaultKind::SyntaxError, "'continue' not properly in loop"))
            }
            Ok(Flow::Return(_)) => {
                Err(self.raise(FaultKind::SyntaxError, "'return' outside function"))
            }
            Err(fault) => Err(fault),
        };
        self.frames.pop();
        result
    }

    /// Drops any frames left over from a fault so the next evaluation
    /// starts from a clean stack.
    pub(crate) fn reset_frames(&mut self) {
        self.frames.clear();
    }

    fn run(&mut self, block: &[Stmt], namespace: &NamespaceRef) -> Result<Flow, ScriptFault> {
        for statement in block {
            let flow = self.exec(statement, namespace)?;
            if !matches!(flow, Flow::Normal) {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&mut self, statement: &Stmt, namespace: &NamespaceRef) -> Result<Flow, ScriptFault> {
        self.set_line(statement.line);
        match &statement.kind {
            StmtKind::Expr(expression) => {
                self.eval(expression, namespace)?;
                Ok(Flow::Normal)
            }
            StmtKind::Assign { name, value } => {
                let value = self.eval(value, namespace)?;
                namespace.borrow_mut().define(name.clone(), value);
                Ok(Flow::Normal)
            }
            StmtKind::FunctionDef { name, params, body } => {
                let function = UserFunction {
                    name: name.clone(),
                    params: params.clone(),
                    body: Rc::new(body.clone()),
                    defined_in: namespace.clone(),
                };
                namespace
                    .borrow_mut()
                    .define(name.clone(), Value::function(function));
                Ok(Flow::Normal)
            }
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expression) => self.eval(expression, namespace)?,
                    None => Value::none(),
                };
                Ok(Flow::Return(value))
            }
            StmtKind::If {
                condition,
                then_body,
                else_body,
            } => {
                if self.eval(condition, namespace)?.is_truthy() {
                    self.run(then_body, namespace)
                } else if let Some(else_body) = else_body {
                    self.run(else_body, namespace)
                } else {
                    Ok(Flow::Normal)
                }
            }
            StmtKind::While { condition, body } => {
                loop {
                    self.set_line(statement.line);
                    if !self.eval(condition, namespace)?.is_truthy() {
                        break;
                    }
                    match self.run(body, namespace)? {
                        Flow::Normal | Flow::Continue => {}
                        Flow::Break => break,
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
                Ok(Flow::Normal)
            }
            StmtKind::Break => Ok(Flow::Break),
            StmtKind::Continue => Ok(Flow::Continue),
            StmtKind::Import(name) => {
                let module = self.import_module(name)?;
                namespace.borrow_mut().define(name.clone(), module);
                Ok(Flow::Normal)
            }
        }
    }

    fn eval(&mut self, expression: &Expr, namespace: &NamespaceRef) -> Result<Value, ScriptFault> {
        self.set_line(expression.line);
        match &expression.kind {
            ExprKind::Literal(literal) => Ok(literal_value(literal)),
            ExprKind::Name(name) => Namespace::lookup(namespace, name).ok_or_else(|| {
                self.raise(
                    FaultKind::NameError,
                    format!("name '{}' is not defined", name),
                )
            }),
            ExprKind::List(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(item, namespace)?);
                }
                Ok(Value::list(values))
            }
            ExprKind::Unary { op, operand } => {
                let value = self.eval(operand, namespace)?;
                self.unary(*op, value)
            }
            ExprKind::Binary {
                op: BinaryOp::And,
                left,
                right,
            } => {
                let left_value = self.eval(left, namespace)?;
                if left_value.is_truthy() {
                    self.eval(right, namespace)
                } else {
                    Ok(left_value)
                }
            }
            ExprKind::Binary {
                op: BinaryOp::Or,
                left,
                right,
            } => {
                let left_value = self.eval(left, namespace)?;
                if left_value.is_truthy() {
                    Ok(left_value)
                } else {
                    self.eval(right, namespace)
                }
            }
            ExprKind::Binary { op, left, right } => {
                let left_value = self.eval(left, namespace)?;
                let right_value = self.eval(right, namespace)?;
                self.binary(*op, left_value, right_value)
            }
            ExprKind::Call { callee, args } => {
                let callee_value = self.eval(callee, namespace)?;
                let mut arg_values = Vec::with_capacity(args.len());
                for arg in args {
                    arg_values.push(self.eval(arg, namespace)?);
                }
                // フレームには引数ではなく呼び出し位置の行を残す
                self.set_line(expression.line);
                self.call(callee_value, arg_values)
            }
            ExprKind::Index { target, index } => {
                let target_value = self.eval(target, namespace)?;
                let index_value = self.eval(index, namespace)?;
                self.index(target_value, index_value)
            }
            ExprKind::Attribute { target, name } => {
                let target_value = self.eval(target, namespace)?;
                self.attribute(target_value, name)
            }
        }
    }

    fn unary(&mut self, op: UnaryOp, value: Value) -> Result<Value, ScriptFault> {
        match op {
            UnaryOp::Neg => match &*value.0 {
                ValueKind::Int(operand) => Ok(Value::int(operand.wrapping_neg())),
                ValueKind::Float(operand) => Ok(Value::float(-operand)),
                _ => Err(self.raise(
                    FaultKind::TypeError,
                    format!("bad operand type for unary -: '{}'", value.type_name()),
                )),
            },
            UnaryOp::Not => Ok(Value::bool(!value.is_truthy())),
        }
    }

    fn binary(&mut self, op: BinaryOp, left: Value, right: Value) -> Result<Value, ScriptFault> {
        match op {
            BinaryOp::Add => self.add(left, right),
            BinaryOp::Sub | BinaryOp::Mul => self.arithmetic(op, left, right),
            BinaryOp::Div => self.divide(left, right),
            BinaryOp::Mod => self.modulo(left, right),
            BinaryOp::Eq => Ok(Value::bool(left.equals(&right))),
            BinaryOp::NotEq => Ok(Value::bool(!left.equals(&right))),
            BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
                self.compare(op, left, right)
            }
            // 短絡評価はevalで処理済み
            BinaryOp::And | BinaryOp::Or => unreachable!("short-circuit operators never get here"),
        }
    }

    fn add(&mut self, left: Value, right: Value) -> Result<Value, ScriptFault> {
        match (&*left.0, &*right.0) {
            (ValueKind::Int(a), ValueKind::Int(b)) => Ok(Value::int(a.wrapping_add(*b))),
            (ValueKind::Str(a), ValueKind::Str(b)) => Ok(Value::string(format!("{}{}", a, b))),
            (ValueKind::List(a), ValueKind::List(b)) => {
                let mut joined = a.clone();
                joined.extend(b.iter().cloned());
                Ok(Value::list(joined))
            }
            _ if is_numeric(&left) && is_numeric(&right) => {
                Ok(Value::float(as_float(&left) + as_float(&right)))
            }
            _ => Err(self.unsupported_operands(BinaryOp::Add, &left, &right)),
        }
    }

    fn arithmetic(&mut self, op: BinaryOp, left: Value, right: Value) -> Result<Value, ScriptFault> {
        match (&*left.0, &*right.0) {
            (ValueKind::Int(a), ValueKind::Int(b)) => {
                let result = if op == BinaryOp::Sub {
                    a.wrapping_sub(*b)
                } else {
                    a.wrapping_mul(*b)
                };
                Ok(Value::int(result))
            }
            _ if is_numeric(&left) && is_numeric(&right) => {
                let (a, b) = (as_float(&left), as_float(&right));
                let result = if op == BinaryOp::Sub { a - b } else { a * b };
                Ok(Value::float(result))
            }
            _ => Err(self.unsupported_operands(op, &left, &right)),
        }
    }

    fn divide(&mut self, left: Value, right: Value) -> Result<Value, ScriptFault> {
        if !is_numeric(&left) || !is_numeric(&right) {
            return Err(self.unsupported_operands(BinaryOp::Div, &left, &right));
        }
        let divisor = as_float(&right);
        if divisor == 0.0 {
            return Err(self.raise(FaultKind::ZeroDivisionError, "division by zero"));
        }
        // 整数同士でも除算は常に浮動小数点
        Ok(Value::float(as_float(&left) / divisor))
    }

    fn modulo(&mut self, left: Value, right: Value) -> Result<Value, ScriptFault> {
        match (&*left.0, &*right.0) {
            (ValueKind::Int(a), ValueKind::Int(b)) => {
                if *b == 0 {
                    return Err(self.raise(FaultKind::ZeroDivisionError, "modulo by zero"));
                }
                // 剰余の符号は除数に合わせる
                let mut result = a.wrapping_rem(*b);
                if result != 0 && (result < 0) != (*b < 0) {
                    result = result.wrapping_add(*b);
                }
                Ok(Value::int(result))
            }
            _ if is_numeric(&left) && is_numeric(&right) => {
                let divisor = as_float(&right);
                if divisor == 0.0 {
                    return Err(self.raise(FaultKind::ZeroDivisionError, "modulo by zero"));
                }
                let mut result = as_float(&left) % divisor;
                if result != 0.0 && (result < 0.0) != (divisor < 0.0) {
                    result += divisor;
                }
                Ok(Value::float(result))
            }
            _ => Err(self.unsupported_operands(BinaryOp::Mod, &left, &right)),
        }
    }

    fn compare(&mut self, op: BinaryOp, left: Value, right: Value) -> Result<Value, ScriptFault> {
        let ordering = match (&*left.0, &*right.0) {
            (ValueKind::Str(a), ValueKind::Str(b)) => a.partial_cmp(b),
            _ if is_numeric(&left) && is_numeric(&right) => {
                as_float(&left).partial_cmp(&as_float(&right))
            }
            _ => {
                return Err(self.raise(
                    FaultKind::TypeError,
                    format!(
                        "'{}' not supported between instances of '{}' and '{}'",
                        op,
                        left.type_name(),
                        right.type_name()
                    ),
                ));
            }
        };
        // NaNとの比較はすべて偽
        let satisfied = match op {
            BinaryOp::Lt => ordering == Some(Ordering::Less),
            BinaryOp::LtEq => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
            BinaryOp::Gt => ordering == Some(Ordering::Greater),
            BinaryOp::GtEq => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
            _ => unreachable!("not a comparison operator"),
        };
        Ok(Value::bool(satisfied))
    }

    fn unsupported_operands(&self, op: BinaryOp, left: &Value, right: &Value) -> ScriptFault {
        self.raise(
            FaultKind::TypeError,
            format!(
                "unsupported operand type(s) for {}: '{}' and '{}'",
                op,
                left.type_name(),
                right.type_name()
            ),
        )
    }

    fn call(&mut self, callee: Value, args: Vec<Value>) -> Result<Value, ScriptFault> {
        match &*callee.0 {
            ValueKind::Function(function) => self.call_function(function, args),
            ValueKind::NativeFunction(native) => {
                trace!(function = native.name, "calling native function");
                native.call(&args).map_err(|fault| self.ensure_trace(fault))
            }
            _ => Err(self.raise(
                FaultKind::TypeError,
                format!("'{}' object is not callable", callee.type_name()),
            )),
        }
    }

    fn call_function(
        &mut self,
        function: &UserFunction,
        args: Vec<Value>,
    ) -> Result<Value, ScriptFault> {
        if args.len() != function.params.len() {
            return Err(self.raise(
                FaultKind::TypeError,
                format!(
                    "{}() takes {} arguments ({} given)",
                    function.name,
                    function.params.len(),
                    args.len()
                ),
            ));
        }
        if self.frames.len() >= self.max_call_depth {
            return Err(self.raise(
                FaultKind::RecursionError,
                "maximum recursion depth exceeded",
            ));
        }
        let namespace = Namespace::with_parent(function.defined_in.clone());
        for (param, arg) in function.params.iter().zip(args) {
            namespace.borrow_mut().define(param.clone(), arg);
        }
        let entry_line = function.body.first().map_or(0, |statement| statement.line);
        self.frames.push(Frame {
            function: function.name.clone(),
            line: entry_line,
        });
        // 失敗時のスナップショットに深いフレームを残すため、popは結果確定後
        let result = match self.run(&function.body, &namespace) {
            Ok(Flow::Return(value)) => Ok(value),
            Ok(Flow::Normal) => Ok(Value::none()),
            Ok(Flow::Break) => Err(self.raise(FaultKind::SyntaxError, "'break' outside loop")),
            Ok(Flow::Continue) => {
                Err(self.raise(FaultKind::SyntaxError, "'continue' not properly in loop"))
            }
            Err(fault) => Err(fault),
        };
        self.frames.pop();
        result
    }

    fn index(&mut self, target: Value, index: Value) -> Result<Value, ScriptFault> {
        match (&*target.0, &*index.0) {
            (ValueKind::List(items), ValueKind::Int(position)) => {
                normalize_index(*position, items.len())
                    .and_then(|position| items.get(position))
                    .cloned()
                    .ok_or_else(|| self.raise(FaultKind::IndexError, "list index out of range"))
            }
            (ValueKind::List(_), _) => Err(self.raise(
                FaultKind::TypeError,
                format!("list indices must be integers, not '{}'", index.type_name()),
            )),
            (ValueKind::Str(value), ValueKind::Int(position)) => {
                let chars: Vec<char> = value.chars().collect();
                normalize_index(*position, chars.len())
                    .and_then(|position| chars.get(position))
                    .map(|c| Value::string(c.to_string()))
                    .ok_or_else(|| self.raise(FaultKind::IndexError, "string index out of range"))
            }
            (ValueKind::Str(_), _) => Err(self.raise(
                FaultKind::TypeError,
                format!("string indices must be integers, not '{}'", index.type_name()),
            )),
            _ => Err(self.raise(
                FaultKind::TypeError,
                format!("'{}' object is not subscriptable", target.type_name()),
            )),
        }
    }

    fn attribute(&mut self, target: Value, name: &str) -> Result<Value, ScriptFault> {
        match &*target.0 {
            ValueKind::Module(module) => module.attribute(name).ok_or_else(|| {
                self.raise(
                    FaultKind::AttributeError,
                    format!("module '{}' has no attribute '{}'", module.name, name),
                )
            }),
            _ => Err(self.raise(
                FaultKind::AttributeError,
                format!("'{}' object has no attribute '{}'", target.type_name(), name),
            )),
        }
    }

    fn import_module(&mut self, name: &str) -> Result<Value, ScriptFault> {
        if let Some(module) = self.loaded.get(name) {
            return Ok(module.clone());
        }
        match self.registry.instantiate(name) {
            Some(module) => {
                trace!(module = name, "instantiated native module");
                let value = Value::module(module);
                self.loaded.insert(name.to_string(), value.clone());
                Ok(value)
            }
            None => Err(self.raise(
                FaultKind::ImportError,
                format!("No module named '{}'", name),
            )),
        }
    }

    fn set_line(&mut self, line: u32) {
        if let Some(frame) = self.frames.last_mut() {
            frame.line = line;
        }
    }

    fn snapshot(&self) -> Vec<TraceFrame> {
        self.frames
            .iter()
            .map(|frame| TraceFrame {
                file: SOURCE_NAME.to_string(),
                line: frame.line,
                function: frame.function.clone(),
            })
            .collect()
    }

    fn raise(&self, kind: FaultKind, message: impl Into<String>) -> ScriptFault {
        ScriptFault::new(kind, message).with_trace(self.snapshot())
    }

    /// Faults coming back from native callbacks have no frames of their
    /// own; attach the interpreter's so they render like script faults.
    fn ensure_trace(&self, fault: ScriptFault) -> ScriptFault {
        if fault.trace.is_empty() {
            let trace = self.snapshot();
            fault.with_trace(trace)
        } else {
            fault
        }
    }
}

/// Defines the always-available functions on the builtins namespace.
pub(crate) fn install_builtins(namespace: &NamespaceRef) {
    let mut scope = namespace.borrow_mut();
    scope.define(
        "print",
        Value::native_function(NativeFunction::new("print", VARIADIC, builtin_print)),
    );
    scope.define(
        "len",
        Value::native_function(NativeFunction::new("len", 1, builtin_len)),
    );
    scope.define(
        "str",
        Value::native_function(NativeFunction::new("str", 1, builtin_str)),
    );
    scope.define(
        "repr",
        Value::native_function(NativeFunction::new("repr", 1, builtin_repr)),
    );
    scope.define(
        "type",
        Value::native_function(NativeFunction::new("type", 1, builtin_type)),
    );
}

fn builtin_print(args: &[Value]) -> Result<Value, ScriptFault> {
    let rendered: Vec<String> = args.iter().map(Value::display).collect();
    println!("{}", rendered.join(" "));
    Ok(Value::none())
}

fn builtin_len(args: &[Value]) -> Result<Value, ScriptFault> {
    match &*args[0].0 {
        ValueKind::Str(value) => Ok(Value::int(value.chars().count() as i64)),
        ValueKind::List(values) => Ok(Value::int(values.len() as i64)),
        _ => Err(ScriptFault::new(
            FaultKind::TypeError,
            format!("object of type '{}' has no len()", args[0].type_name()),
        )),
    }
}

fn builtin_str(args: &[Value]) -> Result<Value, ScriptFault> {
    Ok(Value::string(args[0].display()))
}

fn builtin_repr(args: &[Value]) -> Result<Value, ScriptFault> {
    Ok(Value::string(args[0].repr()))
}

fn builtin_type(args: &[Value]) -> Result<Value, ScriptFault> {
    Ok(Value::string(args[0].type_name()))
}

fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::Int(value) => Value::int(*value),
        Literal::Float(value) => Value::float(*value),
        Literal::Str(value) => Value::string(value.clone()),
        Literal::Bool(value) => Value::bool(*value),
        Literal::None => Value::none(),
    }
}

fn is_numeric(value: &Value) -> bool {
    matches!(&*value.0, ValueKind::Int(_) | ValueKind::Float(_))
}

fn as_float(value: &Value) -> f64 {
    match &*value.0 {
        ValueKind::Int(value) => *value as f64,
        ValueKind::Float(value) => *value,
        _ => unreachable!("callers check is_numeric first"),
    }
}

fn normalize_index(position: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let adjusted = if position < 0 { position + len } else { position };
    if (0..len).contains(&adjusted) {
        Some(adjusted as usize)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::module::NativeModule;
    use crate::script::parser;
    use pretty_assertions::assert_eq;

    fn test_evaluator() -> (Evaluator, NamespaceRef) {
        let builtins = Namespace::root();
        install_builtins(&builtins);
        let namespace = Namespace::with_parent(builtins);
        (Evaluator::new(ModuleRegistry::new(), 64), namespace)
    }

    /// Mirrors the engine dispatch: try the source as an expression, fall
    /// back to running it as a block.
    fn eval_source(
        evaluator: &mut Evaluator,
        namespace: &NamespaceRef,
        source: &str,
    ) -> Result<Value, ScriptFault> {
        match parser::compile_expression(source) {
            Ok(expression) => evaluator.eval_expression(&expression, namespace),
            Err(_) => {
                let block = parser::compile_block(source)?;
                evaluator.run_block(&block, namespace)?;
                Ok(Value::none())
            }
        }
    }

    fn eval_repr(evaluator: &mut Evaluator, namespace: &NamespaceRef, source: &str) -> String {
        eval_source(evaluator, namespace, source).unwrap().repr()
    }

    #[test]
    fn test_arithmetic_precedence() {
        let (mut evaluator, namespace) = test_evaluator();
        assert_eq!(eval_repr(&mut evaluator, &namespace, "2 + 3 * 4"), "14");
        assert_eq!(eval_repr(&mut evaluator, &namespace, "(2 + 3) * 4"), "20");
        assert_eq!(eval_repr(&mut evaluator, &namespace, "-2 * 3"), "-6");
    }

    #[test]
    fn test_division_always_returns_float() {
        let (mut evaluator, namespace) = test_evaluator();
        assert_eq!(eval_repr(&mut evaluator, &namespace, "4 / 2"), "2.0");
        assert_eq!(eval_repr(&mut evaluator, &namespace, "7 / 2"), "3.5");
    }

    #[test]
    fn test_division_by_zero_faults() {
        let (mut evaluator, namespace) = test_evaluator();
        let fault = eval_source(&mut evaluator, &namespace, "1 / 0").unwrap_err();
        assert_eq!(fault.kind, FaultKind::ZeroDivisionError);
        assert_eq!(fault.message, "division by zero");
        let fault = eval_source(&mut evaluator, &namespace, "1 % 0").unwrap_err();
        assert_eq!(fault.message, "modulo by zero");
    }

    #[test]
    fn test_modulo_sign_follows_divisor() {
        let (mut evaluator, namespace) = test_evaluator();
        assert_eq!(eval_repr(&mut evaluator, &namespace, "-7 % 3"), "2");
        assert_eq!(eval_repr(&mut evaluator, &namespace, "7 % -3"), "-2");
        assert_eq!(eval_repr(&mut evaluator, &namespace, "7 % 3"), "1");
    }

    #[test]
    fn test_concatenation() {
        let (mut evaluator, namespace) = test_evaluator();
        assert_eq!(
            eval_repr(&mut evaluator, &namespace, r#""ab" + "cd""#),
            r#""abcd""#
        );
        assert_eq!(
            eval_repr(&mut evaluator, &namespace, "[1] + [2, 3]"),
            "[1, 2, 3]"
        );
    }

    #[test]
    fn test_unsupported_operands_fault() {
        let (mut evaluator, namespace) = test_evaluator();
        let fault = eval_source(&mut evaluator, &namespace, r#"1 + "x""#).unwrap_err();
        assert_eq!(fault.kind, FaultKind::TypeError);
        assert_eq!(
            fault.message,
            "unsupported operand type(s) for +: 'int' and 'str'"
        );
    }

    #[test]
    fn test_equality_never_crosses_types() {
        let (mut evaluator, namespace) = test_evaluator();
        assert_eq!(eval_repr(&mut evaluator, &namespace, "1 == 1.0"), "false");
        assert_eq!(eval_repr(&mut evaluator, &namespace, r#"1 == "1""#), "false");
        assert_eq!(eval_repr(&mut evaluator, &namespace, r#"1 != "1""#), "true");
    }

    #[test]
    fn test_ordering_type_mismatch_faults() {
        let (mut evaluator, namespace) = test_evaluator();
        let fault = eval_source(&mut evaluator, &namespace, r#"1 < "2""#).unwrap_err();
        assert_eq!(fault.kind, FaultKind::TypeError);
        assert_eq!(
            fault.message,
            "'<' not supported between instances of 'int' and 'str'"
        );
    }

    #[test]
    fn test_and_or_return_operands() {
        let (mut evaluator, namespace) = test_evaluator();
        // 右辺は評価されないので未定義名でも失敗しない
        assert_eq!(eval_repr(&mut evaluator, &namespace, "0 and boom"), "0");
        assert_eq!(eval_repr(&mut evaluator, &namespace, "2 or boom"), "2");
        assert_eq!(eval_repr(&mut evaluator, &namespace, "2 and 3"), "3");
        assert_eq!(eval_repr(&mut evaluator, &namespace, r#""" or 5"#), "5");
    }

    #[test]
    fn test_name_error_message() {
        let (mut evaluator, namespace) = test_evaluator();
        let fault = eval_source(&mut evaluator, &namespace, "nope").unwrap_err();
        assert_eq!(fault.kind, FaultKind::NameError);
        assert_eq!(fault.message, "name 'nope' is not defined");
    }

    #[test]
    fn test_functions_close_over_their_namespace() {
        let (mut evaluator, namespace) = test_evaluator();
        let source = "fn make(n) { fn inner(m) { return n + m } return inner }\nadd3 = make(3)";
        eval_source(&mut evaluator, &namespace, source).unwrap();
        assert_eq!(eval_repr(&mut evaluator, &namespace, "add3(4)"), "7");
    }

    #[test]
    fn test_while_loop_with_break_and_continue() {
        let (mut evaluator, namespace) = test_evaluator();
        let source = "total = 0\ni = 0\nwhile true { i = i + 1; if i % 2 == 0 { continue } if i > 7 { break } total = total + i }";
        eval_source(&mut evaluator, &namespace, source).unwrap();
        assert_eq!(eval_repr(&mut evaluator, &namespace, "total"), "16");
    }

    #[test]
    fn test_if_else_chains() {
        let (mut evaluator, namespace) = test_evaluator();
        let source = r#"fn grade(n) { if n > 2 { return "big" } else if n > 0 { return "small" } else { return "zero" } }"#;
        eval_source(&mut evaluator, &namespace, source).unwrap();
        assert_eq!(eval_repr(&mut evaluator, &namespace, "grade(5)"), r#""big""#);
        assert_eq!(
            eval_repr(&mut evaluator, &namespace, "grade(1)"),
            r#""small""#
        );
        assert_eq!(
            eval_repr(&mut evaluator, &namespace, "grade(0)"),
            r#""zero""#
        );
    }

    #[test]
    fn test_recursion_depth_is_capped() {
        let (mut evaluator, namespace) = test_evaluator();
        eval_source(
            &mut evaluator,
            &namespace,
            "fn loop_forever() { return loop_forever() }",
        )
        .unwrap();
        let fault = eval_source(&mut evaluator, &namespace, "loop_forever()").unwrap_err();
        assert_eq!(fault.kind, FaultKind::RecursionError);
        assert_eq!(fault.message, "maximum recursion depth exceeded");
    }

    #[test]
    fn test_arity_mismatch_reports_counts() {
        let (mut evaluator, namespace) = test_evaluator();
        eval_source(&mut evaluator, &namespace, "fn f(a, b) { return a }").unwrap();
        let fault = eval_source(&mut evaluator, &namespace, "f(1)").unwrap_err();
        assert_eq!(fault.kind, FaultKind::TypeError);
        assert_eq!(fault.message, "f() takes 2 arguments (1 given)");
    }

    #[test]
    fn test_fault_trace_lists_frames_outermost_first() {
        let (mut evaluator, namespace) = test_evaluator();
        eval_source(&mut evaluator, &namespace, "fn boom() { return 1 / 0 }").unwrap();
        let fault = eval_source(&mut evaluator, &namespace, "boom()").unwrap_err();
        assert_eq!(fault.trace.len(), 2);
        assert_eq!(fault.trace[0].function, "<module>");
        assert_eq!(fault.trace[1].function, "boom");
        assert!(fault.trace.iter().all(|frame| frame.file == "<stdin>"));
        assert_eq!(
            fault.render(),
            "Traceback (most recent call last):\n  File \"<stdin>\", line 1, in <module>\n  File \"<stdin>\", line 1, in boom\nZeroDivisionError: division by zero"
        );
    }

    #[test]
    fn test_loop_control_outside_loop_faults() {
        let (mut evaluator, namespace) = test_evaluator();
        let fault = eval_source(&mut evaluator, &namespace, "break").unwrap_err();
        assert_eq!(fault.kind, FaultKind::SyntaxError);
        assert_eq!(fault.message, "'break' outside loop");
        let fault = eval_source(&mut evaluator, &namespace, "continue").unwrap_err();
        assert_eq!(fault.message, "'continue' not properly in loop");
        let fault = eval_source(&mut evaluator, &namespace, "return 1").unwrap_err();
        assert_eq!(fault.message, "'return' outside function");

        // 関数本体から漏れたbreakも同じ扱い
        eval_source(&mut evaluator, &namespace, "fn f() { break }").unwrap();
        let fault = eval_source(&mut evaluator, &namespace, "f()").unwrap_err();
        assert_eq!(fault.message, "'break' outside loop");
    }

    #[test]
    fn test_negative_and_out_of_range_indexing() {
        let (mut evaluator, namespace) = test_evaluator();
        assert_eq!(eval_repr(&mut evaluator, &namespace, "[1, 2, 3][-1]"), "3");
        assert_eq!(
            eval_repr(&mut evaluator, &namespace, r#""abc"[-2]"#),
            r#""b""#
        );
        let fault = eval_source(&mut evaluator, &namespace, "[1][5]").unwrap_err();
        assert_eq!(fault.kind, FaultKind::IndexError);
        assert_eq!(fault.message, "list index out of range");
        let fault = eval_source(&mut evaluator, &namespace, r#"[1]["x"]"#).unwrap_err();
        assert_eq!(fault.kind, FaultKind::TypeError);
        assert_eq!(fault.message, "list indices must be integers, not 'str'");
    }

    #[test]
    fn test_not_callable_and_missing_attributes() {
        let (mut evaluator, namespace) = test_evaluator();
        let fault = eval_source(&mut evaluator, &namespace, "3(1)").unwrap_err();
        assert_eq!(fault.message, "'int' object is not callable");
        let fault = eval_source(&mut evaluator, &namespace, "3.x").unwrap_err();
        assert_eq!(fault.kind, FaultKind::AttributeError);
        assert_eq!(fault.message, "'int' object has no attribute 'x'");
    }

    fn tools_module() -> NativeModule {
        NativeModule::new("tools").function("answer", 0, |_| Ok(Value::int(42)))
    }

    #[test]
    fn test_import_uses_registry_and_caches() {
        let mut registry = ModuleRegistry::new();
        registry.register("tools", tools_module);
        let builtins = Namespace::root();
        install_builtins(&builtins);
        let namespace = Namespace::with_parent(builtins);
        let mut evaluator = Evaluator::new(registry, 64);

        eval_source(&mut evaluator, &namespace, "import tools").unwrap();
        assert_eq!(
            eval_repr(&mut evaluator, &namespace, "tools.answer()"),
            "42"
        );
        let first = Namespace::lookup(&namespace, "tools").unwrap();

        // 再インポートはキャッシュされた同じモジュールを返す
        eval_source(&mut evaluator, &namespace, "import tools").unwrap();
        let second = Namespace::lookup(&namespace, "tools").unwrap();
        assert!(Rc::ptr_eq(&first.0, &second.0));

        let fault = eval_source(&mut evaluator, &namespace, "tools.nope").unwrap_err();
        assert_eq!(fault.kind, FaultKind::AttributeError);
        assert_eq!(fault.message, "module 'tools' has no attribute 'nope'");
    }

    #[test]
    fn test_unknown_import_faults() {
        let (mut evaluator, namespace) = test_evaluator();
        let fault = eval_source(&mut evaluator, &namespace, "import missing").unwrap_err();
        assert_eq!(fault.kind, FaultKind::ImportError);
        assert_eq!(fault.message, "No module named 'missing'");
    }

    #[test]
    fn test_builtins() {
        let (mut evaluator, namespace) = test_evaluator();
        assert_eq!(eval_repr(&mut evaluator, &namespace, r#"len("日本語")"#), "3");
        assert_eq!(eval_repr(&mut evaluator, &namespace, "len([1, 2])"), "2");
        assert_eq!(
            eval_repr(&mut evaluator, &namespace, "str(2.0)"),
            r#""2.0""#
        );
        assert_eq!(
            eval_repr(&mut evaluator, &namespace, r#"repr("x")"#),
            r#""\"x\"""#
        );
        assert_eq!(
            eval_repr(&mut evaluator, &namespace, "type([])"),
            r#""list""#
        );
        let fault = eval_source(&mut evaluator, &namespace, "len(3)").unwrap_err();
        assert_eq!(fault.kind, FaultKind::TypeError);
        assert_eq!(fault.message, "object of type 'int' has no len()");
        assert!(eval_source(&mut evaluator, &namespace, r#"print(1, "two")"#)
            .unwrap()
            .is_none());
    }
}
