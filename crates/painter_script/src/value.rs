use std::{cell::RefCell, fmt, rc::Rc};

use crate::{ast::NodeId, native::Native, scope::Scope};

/// A user-defined function together with the scope it closes over.
pub struct Closure {
    pub node: NodeId,
    pub name: Option<String>,
    pub scope: Rc<Scope>,
}

/// Errors raised by the language itself (as opposed to by a native function). Scripts can
/// catch these.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScriptError {
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Reference,
    Type,
    Range,
}

impl ErrorKind {
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::Reference => "ReferenceError",
            ErrorKind::Type => "TypeError",
            ErrorKind::Range => "RangeError",
        }
    }
}

impl ScriptError {
    pub fn reference(message: impl Into<String>) -> ScriptError {
        ScriptError {
            kind: ErrorKind::Reference,
            message: message.into(),
        }
    }

    pub fn type_error(message: impl Into<String>) -> ScriptError {
        ScriptError {
            kind: ErrorKind::Type,
            message: message.into(),
        }
    }

    pub fn range(message: impl Into<String>) -> ScriptError {
        ScriptError {
            kind: ErrorKind::Range,
            message: message.into(),
        }
    }
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.name(), self.message)
    }
}

/// Object properties, kept in insertion order.
#[derive(Clone, Debug, Default)]
pub struct Object {
    props: Vec<(Rc<str>, Value)>,
}

impl Object {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.props
            .iter()
            .find(|(k, _)| &**k == key)
            .map(|(_, v)| v)
    }

    pub fn set(&mut self, key: &str, value: Value) {
        match self.props.iter_mut().find(|(k, _)| &**k == key) {
            Some((_, v)) => *v = value,
            None => self.props.push((key.into(), value)),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &Rc<str>> {
        self.props.iter().map(|(k, _)| k)
    }

    pub fn len(&self) -> usize {
        self.props.len()
    }

    pub fn is_empty(&self) -> bool {
        self.props.is_empty()
    }
}

impl FromIterator<(String, Value)> for Object {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        let mut obj = Object::default();
        for (k, v) in iter {
            obj.set(&k, v);
        }
        obj
    }
}

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Num(f64),
    Str(Rc<str>),
    Array(Rc<RefCell<Vec<Value>>>),
    Object(Rc<RefCell<Object>>),
    Error(Rc<ScriptError>),
    Function(Rc<Closure>),
    Native(Rc<dyn Native>),
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Function(c) => write!(f, "function {}", c.name.as_deref().unwrap_or("")),
            Value::Native(n) => write!(f, "native {}", n.name()),
            other => write!(f, "{other}"),
        }
    }
}

/// Strict (`===`) equality: so `NaN != NaN`, and arrays and objects compare by identity.
impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        self.strict_eq(other)
    }
}

/// Formats a number the way scripts expect to see it: integers without a fractional part.
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_owned()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_owned()
    } else if n == n.trunc() && n.abs() < 1e21 {
        // Also takes care of -0.
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

fn string_to_number(s: &str) -> f64 {
    let s = s.trim();
    match s {
        "" => 0.0,
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        _ if s.chars().any(|c| c.is_alphabetic() && c != 'e' && c != 'E') => f64::NAN,
        _ => s.parse().unwrap_or(f64::NAN),
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => fmt::Display::fmt(b, f),
            Value::Num(n) => f.write_str(&number_to_string(*n)),
            Value::Str(s) => f.write_str(s),
            Value::Array(items) => {
                for (i, item) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    if !matches!(item, Value::Undefined | Value::Null) {
                        fmt::Display::fmt(item, f)?;
                    }
                }
                Ok(())
            }
            Value::Object(_) => f.write_str("[object Object]"),
            Value::Error(e) => fmt::Display::fmt(e, f),
            Value::Function(c) => {
                write!(f, "function {}() {{ ... }}", c.name.as_deref().unwrap_or(""))
            }
            Value::Native(n) => write!(f, "function {}() {{ [native code] }}", n.name()),
        }
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Num(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s.into())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(items)))
    }
}

impl From<Object> for Value {
    fn from(obj: Object) -> Self {
        Value::Object(Rc::new(RefCell::new(obj)))
    }
}

impl From<ScriptError> for Value {
    fn from(e: ScriptError) -> Self {
        Value::Error(Rc::new(e))
    }
}

impl Value {
    pub fn truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Num(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Num(n) => *n,
            Value::Str(s) => string_to_number(s),
            Value::Array(_) => string_to_number(&self.to_string()),
            _ => f64::NAN,
        }
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Bool(_) => "boolean",
            Value::Num(_) => "number",
            Value::Str(_) => "string",
            Value::Function(_) | Value::Native(_) => "function",
            Value::Null | Value::Array(_) | Value::Object(_) | Value::Error(_) => "object",
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Function(_) | Value::Native(_))
    }

    fn is_primitive(&self) -> bool {
        matches!(
            self,
            Value::Undefined | Value::Null | Value::Bool(_) | Value::Num(_) | Value::Str(_)
        )
    }

    pub fn strict_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Num(a), Value::Num(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Error(a), Value::Error(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => true,
            (Value::Undefined | Value::Null, _) | (_, Value::Undefined | Value::Null) => false,
            (a, b) if a.type_of() == b.type_of() => a.strict_eq(b),
            (a, b) if a.is_primitive() && b.is_primitive() => a.to_number() == b.to_number(),
            (a, b) if a.is_primitive() || b.is_primitive() => {
                a.to_string().as_str() == b.to_string().as_str()
            }
            _ => false,
        }
    }

    /// `+`, which concatenates as soon as either side is not a number-like primitive.
    pub fn add(&self, other: &Value) -> Value {
        let stringy = |v: &Value| !matches!(v, Value::Undefined | Value::Null | Value::Bool(_) | Value::Num(_));
        if stringy(self) || stringy(other) {
            Value::Str(format!("{self}{other}").into())
        } else {
            Value::Num(self.to_number() + other.to_number())
        }
    }

    /// Relational comparison; strings compare lexicographically, everything else numerically.
    pub fn less_than(&self, other: &Value) -> Option<bool> {
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => Some(a < b),
            _ => {
                let (a, b) = (self.to_number(), other.to_number());
                if a.is_nan() || b.is_nan() {
                    None
                } else {
                    Some(a < b)
                }
            }
        }
    }

    /// Reads a property, or returns `Err` when reading from `undefined` or `null`.
    pub fn get_property(&self, key: &Value) -> Result<Value, ScriptError> {
        let name = key.to_string();
        match self {
            Value::Undefined | Value::Null => Err(ScriptError::type_error(format!(
                "Cannot read properties of {self} (reading '{name}')"
            ))),
            Value::Str(s) => Ok(match name.as_str() {
                "length" => Value::Num(s.chars().count() as f64),
                _ => index(key)
                    .and_then(|i| s.chars().nth(i))
                    .map(|c| Value::Str(c.to_string().into()))
                    .unwrap_or_default(),
            }),
            Value::Array(items) => {
                let items = items.borrow();
                Ok(match name.as_str() {
                    "length" => Value::Num(items.len() as f64),
                    _ => index(key)
                        .and_then(|i| items.get(i).cloned())
                        .unwrap_or_default(),
                })
            }
            Value::Object(obj) => Ok(obj.borrow().get(&name).cloned().unwrap_or_default()),
            Value::Error(e) => Ok(match name.as_str() {
                "name" => e.kind.name().into(),
                "message" => e.message.as_str().into(),
                _ => Value::Undefined,
            }),
            Value::Function(c) if name == "name" => {
                Ok(c.name.as_deref().unwrap_or("").into())
            }
            Value::Native(n) if name == "name" => Ok(n.name().into()),
            _ => Ok(Value::Undefined),
        }
    }

    pub fn set_property(&self, key: &Value, value: Value) -> Result<(), ScriptError> {
        match self {
            Value::Undefined | Value::Null => Err(ScriptError::type_error(format!(
                "Cannot set properties of {self} (setting '{key}')"
            ))),
            Value::Array(items) => {
                let mut items = items.borrow_mut();
                if let Some(i) = index(key) {
                    if i >= items.len() {
                        let len = i.checked_add(1).filter(|&n| n <= MAX_DENSE_LENGTH);
                        let len = len.ok_or_else(|| ScriptError::range("Invalid array length"))?;
                        items.resize(len, Value::Undefined);
                    }
                    items[i] = value;
                } else if key.to_string() == "length" {
                    let len = value.to_number();
                    if !(0.0..=MAX_DENSE_LENGTH as f64).contains(&len) || len != len.trunc() {
                        return Err(ScriptError::range("Invalid array length"));
                    }
                    items.resize(len as usize, Value::Undefined);
                }
                // Arrays have no storage for other named properties, so those writes are dropped.
                Ok(())
            }
            Value::Object(obj) => {
                obj.borrow_mut().set(&key.to_string(), value);
                Ok(())
            }
            // Properties on other primitives are silently dropped.
            _ => Ok(()),
        }
    }

    /// The keys a `for (.. in ..)` loop visits.
    pub fn enumerable_keys(&self) -> Vec<Value> {
        match self {
            Value::Array(items) => (0..items.borrow().len())
                .map(|i| Value::Str(i.to_string().into()))
                .collect(),
            Value::Str(s) => (0..s.chars().count())
                .map(|i| Value::Str(i.to_string().into()))
                .collect(),
            Value::Object(obj) => obj.borrow().keys().map(|k| Value::Str(k.clone())).collect(),
            _ => Vec::new(),
        }
    }
}

/// The largest array index; anything above it is an ordinary property name.
const MAX_INDEX: f64 = 4_294_967_294.0;

/// Arrays are stored densely, so they can't grow past this.
const MAX_DENSE_LENGTH: usize = 1 << 24;

fn index(key: &Value) -> Option<usize> {
    let n = match key {
        Value::Num(n) => *n,
        Value::Str(s) => s.parse::<u64>().ok()? as f64,
        _ => return None,
    };
    (n >= 0.0 && n <= MAX_INDEX && n == n.trunc()).then_some(n as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_print_like_scripts_expect() {
        assert_eq!(number_to_string(3.0), "3");
        assert_eq!(number_to_string(-0.0), "0");
        assert_eq!(number_to_string(0.5), "0.5");
        assert_eq!(number_to_string(f64::NAN), "NaN");
        assert_eq!(number_to_string(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn conversions() {
        assert_eq!(Value::from(" 12 ").to_number(), 12.0);
        assert_eq!(Value::from("").to_number(), 0.0);
        assert!(Value::from("twelve").to_number().is_nan());
        assert!(Value::from("inf").to_number().is_nan());
        assert!(!Value::from("").truthy());
        assert!(Value::from(vec![]).truthy());
        assert_eq!(Value::from(vec![1.0.into(), "a".into()]).to_string(), "1,a");
    }

    #[test]
    fn equality() {
        assert!(Value::from(1.0).loose_eq(&"1".into()));
        assert!(!Value::from(1.0).strict_eq(&"1".into()));
        assert!(Value::Null.loose_eq(&Value::Undefined));
        assert!(!Value::Null.loose_eq(&0.0.into()));
        assert!(Value::from(true).loose_eq(&1.0.into()));
        let arr = Value::from(vec![]);
        assert!(arr.strict_eq(&arr.clone()));
        assert!(!arr.strict_eq(&Value::from(vec![])));
    }

    #[test]
    fn addition_concatenates() {
        assert_eq!(Value::from(1.0).add(&2.0.into()).to_string(), "3");
        assert_eq!(Value::from("a").add(&2.0.into()).to_string(), "a2");
        assert_eq!(Value::from(true).add(&1.0.into()).to_string(), "2");
    }

    #[test]
    fn properties() {
        let arr = Value::from(vec![1.0.into()]);
        arr.set_property(&2.0.into(), "x".into()).unwrap();
        assert_eq!(arr.get_property(&"length".into()).unwrap().to_number(), 3.0);
        assert_eq!(arr.to_string(), "1,,x");
        assert!(Value::Undefined.get_property(&"x".into()).is_err());
        let err = Value::from(ScriptError::type_error("bad"));
        assert_eq!(err.get_property(&"message".into()).unwrap().to_string(), "bad");
        assert_eq!(err.to_string(), "TypeError: bad");
    }

    #[test]
    fn huge_array_writes_are_refused() {
        let arr = Value::from(vec![]);
        arr.set_property(&f64::INFINITY.into(), 1.0.into()).unwrap();
        arr.set_property(&4_294_967_295.0.into(), 1.0.into()).unwrap();
        assert_eq!(arr.get_property(&"length".into()).unwrap().to_number(), 0.0);

        let err = arr.set_property(&"length".into(), 1e19.into()).unwrap_err();
        assert_eq!(err.to_string(), "RangeError: Invalid array length");
        let err = arr.set_property(&4_000_000_000.0.into(), 1.0.into()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Range);
        assert!(arr.set_property(&"length".into(), f64::NAN.into()).is_err());

        arr.set_property(&"length".into(), 3.0.into()).unwrap();
        assert_eq!(arr.to_string(), ",,");
    }
}
