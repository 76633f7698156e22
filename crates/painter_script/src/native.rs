use std::rc::Rc;

use crate::{
    scope::{Accessor, Scope},
    value::{Object, Value},
};

/// What a native function hands back to the evaluator.
#[derive(Clone, Debug)]
pub enum Reply {
    Value(Value),
    /// Evaluation stops until the host calls [`Machine::resume`](crate::Machine::resume) with
    /// the call's result.
    Suspend,
}

/// A function implemented by the host.
///
/// Returning `Err` is a host fault: it aborts the script and cannot be caught by a `try`.
pub trait Native {
    fn name(&self) -> &str;
    fn call(&self, args: &[Value]) -> Result<Reply, String>;
}

struct NativeFn<F> {
    f: F,
    name: &'static str,
}

impl<F> Native for NativeFn<F>
where
    F: Fn(&[Value]) -> Result<Value, String>,
{
    fn name(&self) -> &str {
        self.name
    }

    fn call(&self, args: &[Value]) -> Result<Reply, String> {
        (self.f)(args).map(Reply::Value)
    }
}

struct SuspendingFn<F> {
    f: F,
    name: &'static str,
}

impl<F> Native for SuspendingFn<F>
where
    F: Fn(&[Value]) -> Result<(), String>,
{
    fn name(&self) -> &str {
        self.name
    }

    fn call(&self, args: &[Value]) -> Result<Reply, String> {
        (self.f)(args).map(|()| Reply::Suspend)
    }
}

/// Wraps a closure as a synchronous native function.
pub fn function<F>(name: &'static str, f: F) -> Rc<dyn Native>
where
    F: Fn(&[Value]) -> Result<Value, String> + 'static,
{
    Rc::new(NativeFn { f, name })
}

/// Wraps a closure as a native function that suspends the script once it returns.
pub fn suspending<F>(name: &'static str, f: F) -> Rc<dyn Native>
where
    F: Fn(&[Value]) -> Result<(), String> + 'static,
{
    Rc::new(SuspendingFn { f, name })
}

/// The `i`th argument as a number, or NaN if it wasn't passed.
pub fn num_arg(args: &[Value], i: usize) -> f64 {
    args.get(i).map_or(f64::NAN, Value::to_number)
}

/// The `i`th argument as a number, or `None` if it was missing or `undefined`.
pub fn opt_num_arg(args: &[Value], i: usize) -> Option<f64> {
    match args.get(i) {
        None | Some(Value::Undefined) => None,
        Some(v) => Some(v.to_number()),
    }
}

#[derive(Clone)]
enum Global {
    Value(Value),
    Accessor(Accessor),
}

/// The names a script starts out with.
#[derive(Clone, Default)]
pub struct Globals {
    entries: Vec<(String, Global)>,
}

impl Globals {
    /// An environment containing `Math`, `Infinity`, `NaN` and `isNaN`.
    pub fn standard() -> Globals {
        let mut ret = Globals::default();
        ret.value("Math", math());
        ret.value("Infinity", f64::INFINITY);
        ret.value("NaN", f64::NAN);
        ret.function(function("isNaN", |args| Ok(num_arg(args, 0).is_nan().into())));
        ret
    }

    pub fn value(&mut self, name: &str, value: impl Into<Value>) -> &mut Self {
        self.entries.push((name.to_owned(), Global::Value(value.into())));
        self
    }

    pub fn function(&mut self, native: Rc<dyn Native>) -> &mut Self {
        let name = native.name().to_owned();
        self.entries.push((name, Global::Value(Value::Native(native))));
        self
    }

    pub fn accessor(
        &mut self,
        name: &str,
        get: Option<Rc<dyn Native>>,
        set: Option<Rc<dyn Native>>,
    ) -> &mut Self {
        self.entries
            .push((name.to_owned(), Global::Accessor(Accessor { get, set })));
        self
    }

    pub(crate) fn install(&self, scope: &Scope) {
        for (name, global) in &self.entries {
            match global {
                Global::Value(v) => scope.declare(name, v.clone()),
                Global::Accessor(a) => scope.define_accessor(name, a.clone()),
            }
        }
    }
}

fn math_fn1(name: &'static str, f: fn(f64) -> f64) -> Value {
    Value::Native(function(name, move |args| Ok(f(num_arg(args, 0)).into())))
}

fn math() -> Value {
    let mut obj = Object::default();
    obj.set("PI", std::f64::consts::PI.into());
    obj.set("abs", math_fn1("abs", f64::abs));
    obj.set("floor", math_fn1("floor", f64::floor));
    obj.set("ceil", math_fn1("ceil", f64::ceil));
    // Rounds half-way cases up, not away from zero.
    obj.set("round", math_fn1("round", |x| (x + 0.5).floor()));
    obj.set("sqrt", math_fn1("sqrt", f64::sqrt));
    obj.set("sin", math_fn1("sin", f64::sin));
    obj.set("cos", math_fn1("cos", f64::cos));
    obj.set(
        "pow",
        Value::Native(function("pow", |args| {
            Ok(num_arg(args, 0).powf(num_arg(args, 1)).into())
        })),
    );
    obj.set(
        "atan2",
        Value::Native(function("atan2", |args| {
            Ok(num_arg(args, 0).atan2(num_arg(args, 1)).into())
        })),
    );
    obj.set(
        "min",
        Value::Native(function("min", |args| {
            Ok(args
                .iter()
                .map(Value::to_number)
                .fold(f64::INFINITY, |a, b| if a.is_nan() || b.is_nan() { f64::NAN } else { a.min(b) })
                .into())
        })),
    );
    obj.set(
        "max",
        Value::Native(function("max", |args| {
            Ok(args
                .iter()
                .map(Value::to_number)
                .fold(f64::NEG_INFINITY, |a, b| if a.is_nan() || b.is_nan() { f64::NAN } else { a.max(b) })
                .into())
        })),
    );
    obj.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(v: &Value, args: &[Value]) -> Value {
        let Value::Native(n) = v else {
            panic!("not a native: {v:?}");
        };
        match n.call(args).unwrap() {
            Reply::Value(v) => v,
            Reply::Suspend => panic!("unexpected suspension"),
        }
    }

    #[test]
    fn math_functions() {
        let m = math();
        let get = |k: &str| m.get_property(&k.into()).unwrap();
        assert_eq!(call(&get("floor"), &[2.7.into()]).to_number(), 2.0);
        assert_eq!(call(&get("round"), &[(-2.5).into()]).to_number(), -2.0);
        assert_eq!(call(&get("max"), &[1.0.into(), 5.0.into(), 3.0.into()]).to_number(), 5.0);
        assert_eq!(call(&get("min"), &[]).to_number(), f64::INFINITY);
        assert!(call(&get("max"), &[1.0.into(), "x".into()]).to_number().is_nan());
        assert!((get("PI").to_number() - std::f64::consts::PI).abs() < 1e-12);
    }

    #[test]
    fn standard_numbers() {
        let g = Globals::standard();
        let get = |name: &str| match g.entries.iter().find(|(n, _)| n == name) {
            Some((_, Global::Value(v))) => v.clone(),
            _ => panic!("{name} is missing"),
        };
        assert_eq!(get("Infinity").to_number(), f64::INFINITY);
        assert!(get("NaN").to_number().is_nan());
        assert_eq!(call(&get("isNaN"), &["x".into()]).to_string(), "true");
        assert_eq!(call(&get("isNaN"), &[1.0.into()]).to_string(), "false");
    }

    #[test]
    fn argument_helpers() {
        let args = [Value::from("4"), Value::Undefined];
        assert_eq!(num_arg(&args, 0), 4.0);
        assert!(num_arg(&args, 5).is_nan());
        assert_eq!(opt_num_arg(&args, 1), None);
        assert_eq!(opt_num_arg(&args, 0), Some(4.0));
    }
}
