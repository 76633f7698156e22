use std::{cell::RefCell, collections::HashMap, rc::Rc};

use crate::{native::Native, value::Value};

/// A global property backed by native functions instead of a stored value.
#[derive(Clone, Default)]
pub struct Accessor {
    pub get: Option<Rc<dyn Native>>,
    pub set: Option<Rc<dyn Native>>,
}

#[derive(Clone)]
enum Binding {
    Mutable(Value),
    Const(Value),
    Accessor(Accessor),
}

/// What a name resolved to.
pub enum Lookup {
    Value(Value),
    Getter(Rc<dyn Native>),
}

/// What an assignment needs to do next.
pub enum Assigned {
    Stored,
    Setter(Rc<dyn Native>),
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ScopeError {
    #[error("{0} is not defined")]
    Undeclared(String),
    #[error("Assignment to constant variable '{0}'")]
    Const(String),
    #[error("Cannot set property {0} which has only a getter")]
    ReadOnly(String),
}

/// One link of a scope chain.
#[derive(Default)]
pub struct Scope {
    parent: Option<Rc<Scope>>,
    bindings: RefCell<HashMap<String, Binding>>,
}

impl Scope {
    pub fn global() -> Rc<Scope> {
        Rc::new(Scope::default())
    }

    pub fn child(parent: &Rc<Scope>) -> Rc<Scope> {
        Rc::new(Scope {
            parent: Some(parent.clone()),
            bindings: RefCell::default(),
        })
    }

    /// Declares (or redeclares) a mutable binding in this scope.
    pub fn declare(&self, name: &str, value: Value) {
        self.bindings
            .borrow_mut()
            .insert(name.to_owned(), Binding::Mutable(value));
    }

    pub fn declare_const(&self, name: &str, value: Value) {
        self.bindings
            .borrow_mut()
            .insert(name.to_owned(), Binding::Const(value));
    }

    /// Makes sure `name` exists in this scope without touching an existing value, the way a
    /// hoisted `var` does.
    pub fn declare_hoisted(&self, name: &str) {
        self.bindings
            .borrow_mut()
            .entry(name.to_owned())
            .or_insert(Binding::Mutable(Value::Undefined));
    }

    pub fn define_accessor(&self, name: &str, accessor: Accessor) {
        self.bindings
            .borrow_mut()
            .insert(name.to_owned(), Binding::Accessor(accessor));
    }

    pub fn lookup(&self, name: &str) -> Option<Lookup> {
        if let Some(binding) = self.bindings.borrow().get(name) {
            return Some(match binding {
                Binding::Mutable(v) | Binding::Const(v) => Lookup::Value(v.clone()),
                Binding::Accessor(Accessor { get: Some(get), .. }) => Lookup::Getter(get.clone()),
                Binding::Accessor(_) => Lookup::Value(Value::Undefined),
            });
        }
        self.parent.as_ref().and_then(|p| p.lookup(name))
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.bindings.borrow().contains_key(name)
            || self.parent.as_ref().map_or(false, |p| p.is_declared(name))
    }

    /// Assigns to the innermost binding of `name`. Undeclared names are an error: scripts
    /// always run in strict mode.
    pub fn assign(&self, name: &str, value: Value) -> Result<Assigned, ScopeError> {
        let mut bindings = self.bindings.borrow_mut();
        match bindings.get_mut(name) {
            Some(Binding::Mutable(v)) => {
                *v = value;
                Ok(Assigned::Stored)
            }
            Some(Binding::Const(_)) => Err(ScopeError::Const(name.to_owned())),
            Some(Binding::Accessor(Accessor { set: Some(set), .. })) => {
                Ok(Assigned::Setter(set.clone()))
            }
            Some(Binding::Accessor(_)) => Err(ScopeError::ReadOnly(name.to_owned())),
            None => match &self.parent {
                Some(p) => p.assign(name, value),
                None => Err(ScopeError::Undeclared(name.to_owned())),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inner_scopes_shadow_and_assign_through() {
        let global = Scope::global();
        global.declare("x", 1.0.into());
        let inner = Scope::child(&global);
        inner.declare("y", 2.0.into());

        assert!(matches!(inner.assign("x", 3.0.into()), Ok(Assigned::Stored)));
        let Some(Lookup::Value(x)) = global.lookup("x") else {
            panic!("x should be a plain value");
        };
        assert_eq!(x.to_number(), 3.0);
        assert!(global.lookup("y").is_none());
    }

    #[test]
    fn strict_assignment() {
        let global = Scope::global();
        global.declare_const("c", 1.0.into());
        assert_eq!(
            global.assign("nope", Value::Null).err(),
            Some(ScopeError::Undeclared("nope".to_owned()))
        );
        assert_eq!(
            global.assign("c", Value::Null).err(),
            Some(ScopeError::Const("c".to_owned()))
        );
    }

    #[test]
    fn hoisting_keeps_existing_values() {
        let global = Scope::global();
        global.declare("a", 5.0.into());
        global.declare_hoisted("a");
        global.declare_hoisted("b");
        assert!(matches!(global.lookup("a"), Some(Lookup::Value(Value::Num(n))) if n == 5.0));
        assert!(matches!(global.lookup("b"), Some(Lookup::Value(Value::Undefined))));
    }
}
