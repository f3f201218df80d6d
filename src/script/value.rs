use std::fmt;
use std::rc::Rc;

use super::ast::Stmt;
use super::module::{NativeFunction, NativeModule};
use super::namespace::NamespaceRef;

/// A runtime value. Cheap to clone; the payload is reference counted.
#[derive(Clone)]
pub struct Value(pub Rc<ValueKind>);

pub enum ValueKind {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Function(UserFunction),
    NativeFunction(NativeFunction),
    Module(NativeModule),
}

/// A script-defined function. The body is shared, and calls resolve free
/// names through the namespace the function was defined in.
#[derive(Clone)]
pub struct UserFunction {
    pub name: String,
    pub params: Vec<String>,
    pub body: Rc<Vec<Stmt>>,
    pub defined_in: NamespaceRef,
}

impl Value {
    pub fn new(kind: ValueKind) -> Self {
        Self(Rc::new(kind))
    }

    pub fn none() -> Self {
        Self::new(ValueKind::None)
    }

    pub fn bool(value: bool) -> Self {
        Self::new(ValueKind::Bool(value))
    }

    pub fn int(value: i64) -> Self {
        Self::new(ValueKind::Int(value))
    }

    pub fn float(value: f64) -> Self {
        Self::new(ValueKind::Float(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::new(ValueKind::Str(value.into()))
    }

    pub fn list(values: Vec<Value>) -> Self {
        Self::new(ValueKind::List(values))
    }

    pub fn function(function: UserFunction) -> Self {
        Self::new(ValueKind::Function(function))
    }

    pub fn native_function(function: NativeFunction) -> Self {
        Self::new(ValueKind::NativeFunction(function))
    }

    pub fn module(module: NativeModule) -> Self {
        Self::new(ValueKind::Module(module))
    }

    pub fn is_none(&self) -> bool {
        matches!(&*self.0, ValueKind::None)
    }

    pub fn is_truthy(&self) -> bool {
        match &*self.0 {
            ValueKind::None => false,
            ValueKind::Bool(value) => *value,
            ValueKind::Int(value) => *value != 0,
            ValueKind::Float(value) => *value != 0.0,
            ValueKind::Str(value) => !value.is_empty(),
            ValueKind::List(values) => !values.is_empty(),
            ValueKind::Function(_) | ValueKind::NativeFunction(_) | ValueKind::Module(_) => true,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match &*self.0 {
            ValueKind::None => "none",
            ValueKind::Bool(_) => "bool",
            ValueKind::Int(_) => "int",
            ValueKind::Float(_) => "float",
            ValueKind::Str(_) => "str",
            ValueKind::List(_) => "list",
            ValueKind::Function(_) | ValueKind::NativeFunction(_) => "function",
            ValueKind::Module(_) => "module",
        }
    }

    /// REPL form: strings quoted and escaped, floats always with a
    /// decimal point.
    pub fn repr(&self) -> String {
        match &*self.0 {
            ValueKind::None => "none".to_string(),
            ValueKind::Bool(true) => "true".to_string(),
            ValueKind::Bool(false) => "false".to_string(),
            ValueKind::Int(value) => value.to_string(),
            ValueKind::Float(value) => format_float(*value),
            ValueKind::Str(value) => quote_string(value),
            ValueKind::List(values) => {
                let rendered: Vec<String> = values.iter().map(Value::repr).collect();
                format!("[{}]", rendered.join(", "))
            }
            ValueKind::Function(function) => format!("<function {}>", function.name),
            ValueKind::NativeFunction(function) => {
                format!("<built-in function {}>", function.name)
            }
            ValueKind::Module(module) => format!("<module '{}'>", module.name),
        }
    }

    /// String-conversion form: strings render raw, everything else as in
    /// [`repr`](Self::repr). Used by `print` and the `str` builtin.
    pub fn display(&self) -> String {
        match &*self.0 {
            ValueKind::Str(value) => value.clone(),
            _ => self.repr(),
        }
    }

    /// Structural equality. Values of mismatched types are never equal;
    /// functions and modules compare by identity.
    pub fn equals(&self, other: &Value) -> bool {
        match (&*self.0, &*other.0) {
            (ValueKind::None, ValueKind::None) => true,
            (ValueKind::Bool(a), ValueKind::Bool(b)) => a == b,
            (ValueKind::Int(a), ValueKind::Int(b)) => a == b,
            (ValueKind::Float(a), ValueKind::Float(b)) => a == b,
            (ValueKind::Str(a), ValueKind::Str(b)) => a == b,
            (ValueKind::List(a), ValueKind::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.equals(y))
            }
            (ValueKind::Function(_), ValueKind::Function(_))
            | (ValueKind::NativeFunction(_), ValueKind::NativeFunction(_))
            | (ValueKind::Module(_), ValueKind::Module(_)) => Rc::ptr_eq(&self.0, &other.0),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display())
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.repr())
    }
}

fn format_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}

fn quote_string(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\t' => quoted.push_str("\\t"),
            _ => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_repr_forms() {
        assert_eq!(Value::none().repr(), "none");
        assert_eq!(Value::bool(true).repr(), "true");
        assert_eq!(Value::int(-3).repr(), "-3");
        assert_eq!(Value::float(2.5).repr(), "2.5");
        // 整数値の浮動小数点も小数点付きで表示する
        assert_eq!(Value::float(2.0).repr(), "2.0");
        assert_eq!(Value::string("a\"b\n").repr(), r#""a\"b\n""#);
        let list = Value::list(vec![Value::int(1), Value::string("x")]);
        assert_eq!(list.repr(), r#"[1, "x"]"#);
    }

    #[test]
    fn test_display_renders_strings_raw() {
        assert_eq!(Value::string("plain").display(), "plain");
        assert_eq!(Value::int(7).display(), "7");
        assert_eq!(format!("{}", Value::string("plain")), "plain");
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::none().is_truthy());
        assert!(!Value::int(0).is_truthy());
        assert!(!Value::float(0.0).is_truthy());
        assert!(!Value::string("").is_truthy());
        assert!(!Value::list(vec![]).is_truthy());
        assert!(Value::int(-1).is_truthy());
        assert!(Value::string(" ").is_truthy());
        assert!(Value::list(vec![Value::none()]).is_truthy());
    }

    #[test]
    fn test_equality_never_crosses_types() {
        assert!(Value::int(1).equals(&Value::int(1)));
        assert!(!Value::int(1).equals(&Value::float(1.0)));
        assert!(!Value::string("1").equals(&Value::int(1)));
        assert!(!Value::bool(false).equals(&Value::none()));
    }

    #[test]
    fn test_list_equality_is_structural() {
        let a = Value::list(vec![Value::int(1), Value::list(vec![Value::string("x")])]);
        let b = Value::list(vec![Value::int(1), Value::list(vec![Value::string("x")])]);
        assert!(a.equals(&b));
        let c = Value::list(vec![Value::int(1), Value::list(vec![Value::string("y")])]);
        assert!(!a.equals(&c));
    }
}
