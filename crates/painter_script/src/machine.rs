//! A small-step evaluator.
//!
//! Instead of recursing through the tree, the machine keeps an explicit stack of [`Frame`]s, one
//! per node being evaluated. Every call to [`Machine::step`] does one small thing to the top frame
//! (push a child, combine a child's result, pop itself) and then reports the new top frame as a
//! [`PauseState`]. This means a host can stop between any two sub-expressions and pick up later
//! without re-running anything.

use std::rc::Rc;

use crate::{
    ast::{
        Ast, BinaryOp, DeclKind, Function, Hoisted, Kind, Literal, LogicalOp, NodeId, NodeKind,
        Property, UnaryOp, UpdateOp,
    },
    error::Fault,
    native::{Globals, Native, Reply},
    scope::{Assigned, Lookup, Scope, ScopeError},
    value::{Closure, ErrorKind, ScriptError, Value},
};

// Deep enough for reasonable recursion, shallow enough that a runaway one fails quickly.
const MAX_DEPTH: usize = 10_000;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ForMode {
    /// About to run the initializer.
    Init,
    /// About to evaluate the test.
    Test,
    /// The test has a value; about to run the body or leave.
    Body,
    /// The body has finished; about to run the update.
    Update,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ForInMode {
    Bind,
    Object,
    Iterate,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum IfMode {
    Start,
    Test,
    Body,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SwitchMode {
    Start,
    Discriminant,
    Cases,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CondMode {
    Start,
    Test,
    Branch,
}

/// How far along the evaluation of a node is. There is one variant per family of node kinds.
#[derive(Clone, Debug)]
pub enum Phase {
    Program {
        n: usize,
    },
    Block {
        n: usize,
    },
    For {
        mode: ForMode,
    },
    ForIn {
        mode: ForInMode,
        looping: bool,
    },
    /// Both `while` and `do .. while`.
    While {
        do_while: bool,
        started: bool,
        test_done: bool,
        looping: bool,
    },
    If {
        mode: IfMode,
    },
    Switch {
        mode: SwitchMode,
        index: usize,
        // Statements of the current case already started.
        n: usize,
        matched: bool,
        in_body: bool,
        tested: bool,
        default_case: Option<usize>,
        switch_value: Option<Value>,
    },
    Try {
        block_done: bool,
        handler_done: bool,
        finalizer_done: bool,
    },
    Catch {
        bound: bool,
    },
    Conditional {
        mode: CondMode,
    },
    Sequence {
        n: usize,
    },
    Call {
        callee_done: bool,
        /// Arguments started so far.
        n: usize,
        args_done: bool,
        exec_done: bool,
    },
    /// `break` and `continue`.
    Jump,
    /// Simple statements: expressions, declarations, `return`, `throw`.
    Statement {
        n: usize,
    },
    /// A function declaration, which was bound before its scope started running.
    Hoisted,
    Expression {
        n: usize,
    },
}

impl Phase {
    fn initial(kind: Kind) -> Phase {
        match kind {
            Kind::Program => Phase::Program { n: 0 },
            Kind::Block => Phase::Block { n: 0 },
            Kind::For => Phase::For {
                mode: ForMode::Init,
            },
            Kind::ForIn => Phase::ForIn {
                mode: ForInMode::Bind,
                looping: false,
            },
            Kind::While | Kind::DoWhile => Phase::While {
                do_while: kind == Kind::DoWhile,
                started: false,
                test_done: false,
                looping: false,
            },
            Kind::If => Phase::If {
                mode: IfMode::Start,
            },
            Kind::Switch => Phase::Switch {
                mode: SwitchMode::Start,
                index: 0,
                n: 0,
                matched: false,
                in_body: false,
                tested: false,
                default_case: None,
                switch_value: None,
            },
            Kind::Try => Phase::Try {
                block_done: false,
                handler_done: false,
                finalizer_done: false,
            },
            Kind::Catch => Phase::Catch { bound: false },
            Kind::Conditional => Phase::Conditional {
                mode: CondMode::Start,
            },
            Kind::Sequence => Phase::Sequence { n: 0 },
            Kind::Call => Phase::Call {
                callee_done: false,
                n: 0,
                args_done: false,
                exec_done: false,
            },
            Kind::Break | Kind::Continue => Phase::Jump,
            Kind::Expression
            | Kind::Var
            | Kind::Return
            | Kind::Throw
            | Kind::Empty
            | Kind::Case => Phase::Statement { n: 0 },
            Kind::FunctionDecl => Phase::Hoisted,
            Kind::Literal
            | Kind::Identifier
            | Kind::Array
            | Kind::Object
            | Kind::FunctionExpr
            | Kind::Unary
            | Kind::Update
            | Kind::Binary
            | Kind::Logical
            | Kind::Assign
            | Kind::Member => Phase::Expression { n: 0 },
        }
    }
}

/// A snapshot of the frame on top of the stack.
#[derive(Clone, Debug)]
pub struct PauseState {
    pub node: NodeId,
    pub phase: Phase,
    /// The most recent value handed to this frame by a child expression.
    pub value: Value,
    /// Set on a `try` frame that is about to route an exception to its handler.
    pub thrown: bool,
}

#[derive(Clone, Debug)]
pub enum Step {
    Paused(PauseState),
    /// Waiting for [`Machine::resume`].
    Suspended,
    Done,
}

#[derive(Clone, Debug)]
enum Completion {
    Break,
    Continue,
    Return(Value),
    Throw(Value),
}

#[derive(Default)]
struct Scratch {
    operands: Vec<Value>,
    // Remaining for-in keys, last one first.
    keys: Vec<Value>,
    pending: Option<Completion>,
    callee: Option<Value>,
    awaiting: bool,
}

struct Frame {
    node: NodeId,
    scope: Rc<Scope>,
    phase: Phase,
    value: Value,
    scratch: Scratch,
}

enum Action {
    Push(NodeId),
    PushScoped(NodeId, Rc<Scope>),
    PushCatch(NodeId, Value),
    Pop(Option<Value>),
    Unwind(Completion),
    Call {
        callee: Value,
        args: Vec<Value>,
        callee_node: NodeId,
    },
    Nothing,
}

enum Flow {
    Continue,
    Suspend,
}

enum Interrupt {
    Script(ScriptError),
    Fault(Fault),
}

impl From<ScriptError> for Interrupt {
    fn from(e: ScriptError) -> Self {
        Interrupt::Script(e)
    }
}

impl From<Fault> for Interrupt {
    fn from(f: Fault) -> Self {
        Interrupt::Fault(f)
    }
}

impl From<ScopeError> for Interrupt {
    fn from(e: ScopeError) -> Self {
        let message = e.to_string();
        Interrupt::Script(match e {
            ScopeError::Undeclared(_) => ScriptError::reference(message),
            ScopeError::Const(_) | ScopeError::ReadOnly(_) => ScriptError::type_error(message),
        })
    }
}

fn call_sync(native: &Rc<dyn Native>, args: &[Value]) -> Result<Value, Interrupt> {
    match native.call(args) {
        Ok(Reply::Value(v)) => Ok(v),
        Ok(Reply::Suspend) => Err(Fault::new(format!("{} cannot suspend here", native.name())).into()),
        Err(msg) => Err(Fault::new(msg).into()),
    }
}

fn read_var(scope: &Scope, name: &str) -> Result<Value, Interrupt> {
    match scope.lookup(name) {
        Some(Lookup::Value(v)) => Ok(v),
        Some(Lookup::Getter(get)) => call_sync(&get, &[]),
        None => Err(ScriptError::reference(format!("{name} is not defined")).into()),
    }
}

fn write_var(scope: &Scope, name: &str, value: Value) -> Result<(), Interrupt> {
    match scope.assign(name, value.clone())? {
        Assigned::Stored => Ok(()),
        Assigned::Setter(set) => call_sync(&set, &[value]).map(|_| ()),
    }
}

fn unary(op: UnaryOp, v: &Value) -> Value {
    match op {
        UnaryOp::Not => (!v.truthy()).into(),
        UnaryOp::Neg => (-v.to_number()).into(),
        UnaryOp::Plus => v.to_number().into(),
        UnaryOp::TypeOf => v.type_of().into(),
    }
}

fn binary(op: BinaryOp, a: &Value, b: &Value) -> Value {
    let num = |f: fn(f64, f64) -> f64| Value::Num(f(a.to_number(), b.to_number()));
    match op {
        BinaryOp::Add => a.add(b),
        BinaryOp::Sub => num(|x, y| x - y),
        BinaryOp::Mul => num(|x, y| x * y),
        BinaryOp::Div => num(|x, y| x / y),
        BinaryOp::Rem => num(|x, y| x % y),
        BinaryOp::Lt => (a.less_than(b) == Some(true)).into(),
        BinaryOp::Gt => (b.less_than(a) == Some(true)).into(),
        BinaryOp::Le => (b.less_than(a) == Some(false)).into(),
        BinaryOp::Ge => (a.less_than(b) == Some(false)).into(),
        BinaryOp::Eq => a.loose_eq(b).into(),
        BinaryOp::Ne => (!a.loose_eq(b)).into(),
        BinaryOp::StrictEq => a.strict_eq(b).into(),
        BinaryOp::StrictNe => (!a.strict_eq(b)).into(),
    }
}

fn literal(lit: &Literal) -> Value {
    match lit {
        Literal::Undefined => Value::Undefined,
        Literal::Null => Value::Null,
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Num(x) => Value::Num(*x),
        Literal::Str(s) => Value::Str(s.clone()),
    }
}

fn closure(ast: &Ast, node: NodeId, scope: &Rc<Scope>) -> Value {
    let name = match &ast[node].kind {
        NodeKind::FunctionDecl(f) | NodeKind::FunctionExpr(f) => f.name.clone(),
        _ => None,
    };
    Value::Function(Rc::new(Closure {
        node,
        name,
        scope: scope.clone(),
    }))
}

fn hoist(ast: &Ast, hoisted: &Hoisted, scope: &Rc<Scope>) {
    for name in &hoisted.vars {
        scope.declare_hoisted(name);
    }
    for &id in &hoisted.functions {
        if let NodeKind::FunctionDecl(f) = &ast[id].kind {
            if let Some(name) = &f.name {
                scope.declare(name, closure(ast, id, scope));
            }
        }
    }
}

fn uncaught(completion: Completion) -> Fault {
    match completion {
        Completion::Throw(Value::Error(e)) => Fault::new(e.to_string()),
        Completion::Throw(v) => Fault::new(format!("Uncaught {v}")),
        Completion::Return(_) => Fault::new("Illegal return statement"),
        Completion::Break => Fault::new("Illegal break statement"),
        Completion::Continue => Fault::new("Illegal continue statement"),
    }
}

enum Unwound {
    // The frame took the completion and stays on the stack.
    Caught,
    // The frame took the completion by finishing.
    Finished,
    Passed,
    Fault(Fault),
}

pub struct Machine {
    ast: Rc<Ast>,
    global: Rc<Scope>,
    stack: Vec<Frame>,
    suspended: bool,
}

impl Machine {
    pub fn new(ast: Rc<Ast>, globals: &Globals) -> Machine {
        let global = Scope::global();
        globals.install(&global);
        let root = ast.root();
        if let NodeKind::Program { hoisted, .. } = &ast[root].kind {
            hoist(&ast, hoisted, &global);
        }
        let mut machine = Machine {
            ast,
            global: global.clone(),
            stack: Vec::new(),
            suspended: false,
        };
        machine.push_frame(root, global);
        machine
    }

    pub fn ast(&self) -> &Rc<Ast> {
        &self.ast
    }

    /// The number of frames on the stack.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn is_done(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// Reads a global variable, for hosts and tests. Accessor properties read as `None`.
    pub fn global(&self, name: &str) -> Option<Value> {
        match self.global.lookup(name)? {
            Lookup::Value(v) => Some(v),
            Lookup::Getter(_) => None,
        }
    }

    pub fn pause_state(&self) -> Option<PauseState> {
        let frame = self.stack.last()?;
        let thrown = match (&self.ast[frame.node].kind, &frame.phase) {
            (
                NodeKind::Try {
                    handler: Some(_), ..
                },
                Phase::Try {
                    handler_done: false,
                    ..
                },
            ) => matches!(frame.scratch.pending, Some(Completion::Throw(_))),
            _ => false,
        };
        Some(PauseState {
            node: frame.node,
            phase: frame.phase.clone(),
            value: frame.value.clone(),
            thrown,
        })
    }

    /// Hands the result of a suspended native call back to the script.
    pub fn resume(&mut self, value: Value) {
        if !self.suspended {
            log::warn!("resume called on a machine that isn't suspended");
            return;
        }
        self.suspended = false;
        if let Some(frame) = self.stack.last_mut() {
            frame.scratch.awaiting = false;
            frame.value = value;
        }
    }

    /// Performs one small step of evaluation.
    pub fn step(&mut self) -> Result<Step, Fault> {
        if self.suspended {
            return Ok(Step::Suspended);
        }
        if self.stack.is_empty() {
            return Ok(Step::Done);
        }

        let ast = self.ast.clone();
        let flow = match self.advance(&ast).and_then(|action| self.apply(&ast, action)) {
            Ok(flow) => flow,
            Err(Interrupt::Script(e)) => {
                self.unwind(&ast, Completion::Throw(e.into()))?;
                Flow::Continue
            }
            Err(Interrupt::Fault(f)) => {
                self.stack.clear();
                return Err(f);
            }
        };

        if let Flow::Suspend = flow {
            self.suspended = true;
            return Ok(Step::Suspended);
        }
        Ok(self.pause_state().map_or(Step::Done, Step::Paused))
    }

    /// Steps until the program finishes or suspends.
    pub fn run(&mut self) -> Result<Step, Fault> {
        loop {
            match self.step()? {
                Step::Paused(_) => {}
                other => return Ok(other),
            }
        }
    }

    fn push_frame(&mut self, node: NodeId, scope: Rc<Scope>) {
        self.stack.push(Frame {
            node,
            scope,
            phase: Phase::initial(self.ast[node].kind.kind()),
            value: Value::Undefined,
            scratch: Scratch::default(),
        });
    }

    fn push_child(&mut self, node: NodeId, scope: Rc<Scope>) -> Result<(), Interrupt> {
        if self.stack.len() >= MAX_DEPTH {
            return Err(ScriptError {
                kind: ErrorKind::Range,
                message: "Maximum call stack size exceeded".to_owned(),
            }
            .into());
        }
        self.push_frame(node, scope);
        Ok(())
    }

    fn apply(&mut self, ast: &Ast, action: Action) -> Result<Flow, Interrupt> {
        match action {
            Action::Push(node) => {
                let scope = self.top_scope();
                self.push_child(node, scope)?;
            }
            Action::PushScoped(node, scope) => self.push_child(node, scope)?,
            Action::PushCatch(node, thrown) => {
                let scope = self.top_scope();
                self.push_child(node, scope)?;
                if let Some(frame) = self.stack.last_mut() {
                    frame.value = thrown;
                }
            }
            Action::Pop(value) => {
                self.stack.pop();
                if let (Some(value), Some(parent)) = (value, self.stack.last_mut()) {
                    parent.value = value;
                }
            }
            Action::Unwind(completion) => self.unwind(ast, completion)?,
            Action::Call {
                callee,
                args,
                callee_node,
            } => return self.call(ast, callee, args, callee_node),
            Action::Nothing => {}
        }
        Ok(Flow::Continue)
    }

    fn top_scope(&self) -> Rc<Scope> {
        self.stack
            .last()
            .map_or_else(|| self.global.clone(), |f| f.scope.clone())
    }

    fn call(
        &mut self,
        ast: &Ast,
        callee: Value,
        args: Vec<Value>,
        callee_node: NodeId,
    ) -> Result<Flow, Interrupt> {
        match callee {
            Value::Native(native) => match native.call(&args) {
                Ok(Reply::Value(v)) => {
                    if let Some(frame) = self.stack.last_mut() {
                        frame.value = v;
                    }
                    Ok(Flow::Continue)
                }
                Ok(Reply::Suspend) => {
                    if let Some(frame) = self.stack.last_mut() {
                        frame.scratch.awaiting = true;
                    }
                    Ok(Flow::Suspend)
                }
                Err(msg) => Err(Fault::new(msg).into()),
            },
            Value::Function(c) => {
                let (NodeKind::FunctionDecl(f) | NodeKind::FunctionExpr(f)) = &ast[c.node].kind
                else {
                    return Err(Fault::new("closure does not point at a function").into());
                };
                let scope = Scope::child(&c.scope);
                if let (NodeKind::FunctionExpr(_), Some(name)) = (&ast[c.node].kind, &c.name) {
                    scope.declare(name, Value::Function(c.clone()));
                }
                for (i, param) in f.params.iter().enumerate() {
                    scope.declare(param, args.get(i).cloned().unwrap_or_default());
                }
                hoist(ast, &f.hoisted, &scope);
                self.push_child(f.body, scope)?;
                Ok(Flow::Continue)
            }
            _ => Err(ScriptError::type_error(format!("{} is not a function", ast.text(callee_node))).into()),
        }
    }

    fn unwind(&mut self, ast: &Ast, completion: Completion) -> Result<(), Fault> {
        loop {
            let Some(frame) = self.stack.last_mut() else {
                return Err(uncaught(completion));
            };
            let outcome = match (&ast[frame.node].kind, &frame.phase) {
                (
                    NodeKind::Try {
                        handler, finalizer, ..
                    },
                    Phase::Try {
                        block_done: true,
                        handler_done,
                        finalizer_done,
                    },
                ) => {
                    let catches = matches!(completion, Completion::Throw(_))
                        && !handler_done
                        && handler.is_some();
                    if catches || (!finalizer_done && finalizer.is_some()) {
                        Unwound::Caught
                    } else {
                        Unwound::Passed
                    }
                }
                (NodeKind::For { .. } | NodeKind::ForIn { .. } | NodeKind::While { .. } | NodeKind::DoWhile { .. }, _) => {
                    match completion {
                        Completion::Break => Unwound::Finished,
                        Completion::Continue => return Ok(()),
                        _ => Unwound::Passed,
                    }
                }
                (NodeKind::Switch { .. }, _) if matches!(completion, Completion::Break) => {
                    Unwound::Finished
                }
                (NodeKind::Call { .. }, _) => match completion {
                    Completion::Return(v) => {
                        frame.value = v;
                        return Ok(());
                    }
                    Completion::Throw(_) => Unwound::Passed,
                    Completion::Break | Completion::Continue => {
                        Unwound::Fault(uncaught(completion.clone()))
                    }
                },
                _ => Unwound::Passed,
            };
            match outcome {
                Unwound::Caught => {
                    frame.scratch.pending = Some(completion);
                    return Ok(());
                }
                Unwound::Finished => {
                    self.stack.pop();
                    return Ok(());
                }
                Unwound::Passed => {
                    self.stack.pop();
                }
                Unwound::Fault(f) => {
                    self.stack.clear();
                    return Err(f);
                }
            }
        }
    }

    /// Decides what the top frame does next, updating its phase.
    fn advance(&mut self, ast: &Ast) -> Result<Action, Interrupt> {
        let Some(frame) = self.stack.last_mut() else {
            return Ok(Action::Nothing);
        };
        let node = &ast[frame.node];
        let scratch = &mut frame.scratch;
        let value = &frame.value;

        let action = match (&node.kind, &mut frame.phase) {
            (NodeKind::Program { body, .. }, Phase::Program { n }) => match body.get(*n) {
                Some(&child) => {
                    *n += 1;
                    Action::Push(child)
                }
                None => Action::Pop(None),
            },

            (NodeKind::Block { body, scoped }, Phase::Block { n }) => {
                if *n == 0 && *scoped {
                    let scope = Scope::child(&frame.scope);
                    for &id in body {
                        if let NodeKind::FunctionDecl(Function { name: Some(name), .. }) = &ast[id].kind {
                            scope.declare(name, closure(ast, id, &scope));
                        }
                    }
                    frame.scope = scope;
                }
                match body.get(*n) {
                    Some(&child) => {
                        *n += 1;
                        Action::Push(child)
                    }
                    None => Action::Pop(None),
                }
            }

            (NodeKind::Expression { expr }, Phase::Statement { n }) => {
                if *n == 0 {
                    *n = 1;
                    Action::Push(*expr)
                } else {
                    Action::Pop(None)
                }
            }

            (NodeKind::Var { kind, decls }, Phase::Statement { n }) => {
                if scratch.awaiting {
                    scratch.awaiting = false;
                    if let Some(decl) = decls.get(*n) {
                        bind(&frame.scope, *kind, &decl.name, value.clone())?;
                    }
                    *n += 1;
                }
                loop {
                    match decls.get(*n) {
                        Some(decl) => {
                            if let Some(init) = decl.init {
                                scratch.awaiting = true;
                                break Action::Push(init);
                            }
                            if *kind != DeclKind::Var {
                                bind(&frame.scope, *kind, &decl.name, Value::Undefined)?;
                            }
                            *n += 1;
                        }
                        None => break Action::Pop(None),
                    }
                }
            }

            (NodeKind::Return { arg }, Phase::Statement { n }) => match arg {
                Some(arg) if *n == 0 => {
                    *n = 1;
                    Action::Push(*arg)
                }
                Some(_) => Action::Unwind(Completion::Return(value.clone())),
                None => Action::Unwind(Completion::Return(Value::Undefined)),
            },

            (NodeKind::Throw { arg }, Phase::Statement { n }) => {
                if *n == 0 {
                    *n = 1;
                    Action::Push(*arg)
                } else {
                    Action::Unwind(Completion::Throw(value.clone()))
                }
            }

            (NodeKind::Empty | NodeKind::Case { .. }, _) | (NodeKind::FunctionDecl(_), _) => {
                Action::Pop(None)
            }

            (NodeKind::Break, _) => Action::Unwind(Completion::Break),
            (NodeKind::Continue, _) => Action::Unwind(Completion::Continue),

            (
                NodeKind::If {
                    test,
                    consequent,
                    alternate,
                },
                Phase::If { mode },
            ) => match mode {
                IfMode::Start => {
                    *mode = IfMode::Test;
                    Action::Push(*test)
                }
                IfMode::Test => {
                    *mode = IfMode::Body;
                    match (value.truthy(), alternate) {
                        (true, _) => Action::Push(*consequent),
                        (false, Some(alt)) => Action::Push(*alt),
                        (false, None) => Action::Pop(None),
                    }
                }
                IfMode::Body => Action::Pop(None),
            },

            (
                NodeKind::For {
                    init,
                    test,
                    update,
                    body,
                },
                Phase::For { mode },
            ) => match mode {
                ForMode::Init => {
                    *mode = ForMode::Test;
                    init.map_or(Action::Nothing, Action::Push)
                }
                ForMode::Test => {
                    *mode = ForMode::Body;
                    match test {
                        Some(test) => Action::Push(*test),
                        None => {
                            frame.value = Value::Bool(true);
                            Action::Nothing
                        }
                    }
                }
                ForMode::Body => {
                    if test.is_some() && !value.truthy() {
                        Action::Pop(None)
                    } else {
                        *mode = ForMode::Update;
                        Action::Push(*body)
                    }
                }
                ForMode::Update => {
                    *mode = ForMode::Test;
                    update.map_or(Action::Nothing, Action::Push)
                }
            },

            (NodeKind::ForIn { left, right, body }, Phase::ForIn { mode, looping }) => match mode {
                ForInMode::Bind => {
                    *mode = ForInMode::Object;
                    Action::Push(*right)
                }
                ForInMode::Object => {
                    scratch.keys = value.enumerable_keys();
                    scratch.keys.reverse();
                    *looping = true;
                    *mode = ForInMode::Iterate;
                    Action::Nothing
                }
                ForInMode::Iterate => match scratch.keys.pop() {
                    Some(key) => {
                        match &ast[*left].kind {
                            NodeKind::Var { kind, decls } => {
                                if let Some(decl) = decls.first() {
                                    bind(&frame.scope, *kind, &decl.name, key)?;
                                }
                            }
                            NodeKind::Expression { expr } => match &ast[*expr].kind {
                                NodeKind::Identifier(name) => write_var(&frame.scope, name, key)?,
                                _ => return Err(ScriptError::type_error("Invalid left-hand side in for-in").into()),
                            },
                            _ => return Err(ScriptError::type_error("Invalid left-hand side in for-in").into()),
                        }
                        Action::Push(*body)
                    }
                    None => Action::Pop(None),
                },
            },

            (
                NodeKind::While { test, body } | NodeKind::DoWhile { body, test },
                Phase::While {
                    do_while,
                    started,
                    test_done,
                    looping,
                },
            ) => {
                if *do_while && !*started {
                    *test_done = true;
                    frame.value = Value::Bool(true);
                }
                *started = true;
                if !*test_done {
                    *test_done = true;
                    Action::Push(*test)
                } else if !frame.value.truthy() {
                    Action::Pop(None)
                } else {
                    *test_done = false;
                    *looping = true;
                    Action::Push(*body)
                }
            }

            (
                NodeKind::Switch {
                    discriminant,
                    cases,
                },
                Phase::Switch {
                    mode,
                    index,
                    n,
                    matched,
                    in_body,
                    tested,
                    default_case,
                    switch_value,
                },
            ) => {
                if *mode == SwitchMode::Start {
                    *mode = SwitchMode::Discriminant;
                    return Ok(Action::Push(*discriminant));
                }
                if *mode == SwitchMode::Discriminant {
                    *mode = SwitchMode::Cases;
                    *switch_value = Some(value.clone());
                }
                loop {
                    let case = cases.get(*index).and_then(|&id| match &ast[id].kind {
                        NodeKind::Case { test, consequent } => Some((*test, consequent)),
                        _ => None,
                    });
                    match case {
                        Some((None, _)) if !*matched => {
                            *default_case = Some(*index);
                            *index += 1;
                        }
                        None if !*matched && default_case.is_some() => {
                            *matched = true;
                            *index = default_case.unwrap_or_default();
                        }
                        Some((test, consequent)) => {
                            if let (false, false, Some(test)) = (*matched, *tested, test) {
                                *tested = true;
                                break Action::Push(test);
                            }
                            let hit = match switch_value {
                                Some(sv) => value.strict_eq(sv),
                                None => false,
                            };
                            if *matched || (test.is_some() && hit) {
                                *matched = true;
                                if let Some(&stmt) = consequent.get(*n) {
                                    *in_body = true;
                                    *n += 1;
                                    break Action::Push(stmt);
                                }
                            }
                            *tested = false;
                            *n = 0;
                            *index += 1;
                        }
                        None => break Action::Pop(None),
                    }
                }
            }

            (
                NodeKind::Try {
                    block,
                    handler,
                    finalizer,
                },
                Phase::Try {
                    block_done,
                    handler_done,
                    finalizer_done,
                },
            ) => {
                let throw_pending = matches!(scratch.pending, Some(Completion::Throw(_)));
                if !*block_done {
                    *block_done = true;
                    Action::Push(*block)
                } else if let (true, false, Some(handler)) = (throw_pending, *handler_done, *handler) {
                    *handler_done = true;
                    match scratch.pending.take() {
                        Some(Completion::Throw(thrown)) => Action::PushCatch(handler, thrown),
                        _ => Action::Nothing,
                    }
                } else if let (false, Some(finalizer)) = (*finalizer_done, *finalizer) {
                    *finalizer_done = true;
                    Action::Push(finalizer)
                } else {
                    match scratch.pending.take() {
                        Some(completion) => Action::Unwind(completion),
                        None => Action::Pop(None),
                    }
                }
            }

            (NodeKind::Catch { param, body }, Phase::Catch { bound }) => {
                if *bound {
                    Action::Pop(None)
                } else {
                    *bound = true;
                    let scope = Scope::child(&frame.scope);
                    if let Some(NodeKind::Identifier(name)) = param.map(|p| &ast[p].kind) {
                        scope.declare(name, value.clone());
                    }
                    Action::PushScoped(*body, scope)
                }
            }

            (
                NodeKind::Conditional {
                    test,
                    consequent,
                    alternate,
                },
                Phase::Conditional { mode },
            ) => match mode {
                CondMode::Start => {
                    *mode = CondMode::Test;
                    Action::Push(*test)
                }
                CondMode::Test => {
                    *mode = CondMode::Branch;
                    Action::Push(if value.truthy() { *consequent } else { *alternate })
                }
                CondMode::Branch => Action::Pop(Some(value.clone())),
            },

            (NodeKind::Sequence(exprs), Phase::Sequence { n }) => match exprs.get(*n) {
                Some(&e) => {
                    *n += 1;
                    Action::Push(e)
                }
                None => Action::Pop(Some(value.clone())),
            },

            (
                NodeKind::Call { callee, args },
                Phase::Call {
                    callee_done,
                    n,
                    args_done,
                    exec_done,
                },
            ) => {
                if !*callee_done {
                    *callee_done = true;
                    return Ok(Action::Push(*callee));
                }
                if !*args_done {
                    if *n > 0 {
                        scratch.operands.push(value.clone());
                    } else if scratch.callee.is_none() {
                        scratch.callee = Some(value.clone());
                    }
                    if let Some(&arg) = args.get(*n) {
                        *n += 1;
                        return Ok(Action::Push(arg));
                    }
                    *args_done = true;
                }
                if !*exec_done {
                    *exec_done = true;
                    let callee_value = scratch.callee.take().unwrap_or_default();
                    let call_args = std::mem::take(&mut scratch.operands);
                    frame.value = Value::Undefined;
                    Action::Call {
                        callee: callee_value,
                        args: call_args,
                        callee_node: *callee,
                    }
                } else {
                    Action::Pop(Some(value.clone()))
                }
            }

            (NodeKind::Literal(lit), _) => Action::Pop(Some(literal(lit))),

            (NodeKind::Identifier(name), _) => Action::Pop(Some(read_var(&frame.scope, name)?)),

            (NodeKind::Array(elems), Phase::Expression { n }) => {
                if *n > 0 {
                    scratch.operands.push(value.clone());
                }
                match elems.get(*n) {
                    Some(&e) => {
                        *n += 1;
                        Action::Push(e)
                    }
                    None => Action::Pop(Some(std::mem::take(&mut scratch.operands).into())),
                }
            }

            (NodeKind::Object(props), Phase::Expression { n }) => {
                if *n > 0 {
                    scratch.operands.push(value.clone());
                }
                match props.get(*n) {
                    Some((_, e)) => {
                        *n += 1;
                        Action::Push(*e)
                    }
                    None => {
                        let values = std::mem::take(&mut scratch.operands);
                        let obj: crate::value::Object = props
                            .iter()
                            .map(|(k, _)| k.clone())
                            .zip(values)
                            .collect();
                        Action::Pop(Some(obj.into()))
                    }
                }
            }

            (NodeKind::FunctionExpr(_), _) => Action::Pop(Some(closure(ast, frame.node, &frame.scope))),

            (NodeKind::Unary { op, arg }, Phase::Expression { n }) => {
                if *n == 0 {
                    if let (UnaryOp::TypeOf, NodeKind::Identifier(name)) = (op, &ast[*arg].kind) {
                        if !frame.scope.is_declared(name) {
                            return Ok(Action::Pop(Some("undefined".into())));
                        }
                    }
                    *n = 1;
                    Action::Push(*arg)
                } else {
                    Action::Pop(Some(unary(*op, value)))
                }
            }

            (NodeKind::Binary { op, left, right }, Phase::Expression { n }) => match *n {
                0 => {
                    *n = 1;
                    Action::Push(*left)
                }
                1 => {
                    scratch.operands.push(value.clone());
                    *n = 2;
                    Action::Push(*right)
                }
                _ => {
                    let lhs = scratch.operands.pop().unwrap_or_default();
                    Action::Pop(Some(binary(*op, &lhs, value)))
                }
            },

            (NodeKind::Logical { op, left, right }, Phase::Expression { n }) => match *n {
                0 => {
                    *n = 1;
                    Action::Push(*left)
                }
                1 => {
                    let short = match op {
                        LogicalOp::And => !value.truthy(),
                        LogicalOp::Or => value.truthy(),
                    };
                    if short {
                        Action::Pop(Some(value.clone()))
                    } else {
                        *n = 2;
                        Action::Push(*right)
                    }
                }
                _ => Action::Pop(Some(value.clone())),
            },

            (NodeKind::Member { object, property }, Phase::Expression { n }) => match (*n, property) {
                (0, _) => {
                    *n = 1;
                    Action::Push(*object)
                }
                (1, Property::Named(name)) => {
                    Action::Pop(Some(value.get_property(&name.as_str().into())?))
                }
                (1, Property::Computed(key)) => {
                    scratch.operands.push(value.clone());
                    *n = 2;
                    Action::Push(*key)
                }
                _ => {
                    let obj = scratch.operands.pop().unwrap_or_default();
                    Action::Pop(Some(obj.get_property(value)?))
                }
            },

            (NodeKind::Assign { op, target, value: rhs }, Phase::Expression { n }) => {
                match &ast[*target].kind {
                    NodeKind::Identifier(name) => {
                        if *n == 0 {
                            if op.binary().is_some() {
                                scratch.operands.push(read_var(&frame.scope, name)?);
                            }
                            *n = 1;
                            Action::Push(*rhs)
                        } else {
                            let result = match (op.binary(), scratch.operands.pop()) {
                                (Some(b), Some(old)) => binary(b, &old, value),
                                _ => value.clone(),
                            };
                            write_var(&frame.scope, name, result.clone())?;
                            Action::Pop(Some(result))
                        }
                    }
                    NodeKind::Member { object, property } => {
                        match member_target(n, *object, property, value, scratch) {
                            Some(push) => push,
                            None if *n == 3 => {
                                if op.binary().is_some() {
                                    let old = scratch.operands[0].get_property(&scratch.operands[1])?;
                                    scratch.operands.push(old);
                                }
                                *n = 4;
                                Action::Push(*rhs)
                            }
                            None => {
                                let result = match (op.binary(), scratch.operands.get(2)) {
                                    (Some(b), Some(old)) => binary(b, old, value),
                                    _ => value.clone(),
                                };
                                scratch.operands[0].set_property(&scratch.operands[1], result.clone())?;
                                Action::Pop(Some(result))
                            }
                        }
                    }
                    _ => return Err(ScriptError::type_error("Invalid assignment target").into()),
                }
            }

            (NodeKind::Update { op, prefix, target }, Phase::Expression { n }) => {
                let step = |old: f64| match op {
                    UpdateOp::Inc => old + 1.0,
                    UpdateOp::Dec => old - 1.0,
                };
                match &ast[*target].kind {
                    NodeKind::Identifier(name) => {
                        let old = read_var(&frame.scope, name)?.to_number();
                        let new = step(old);
                        write_var(&frame.scope, name, new.into())?;
                        Action::Pop(Some(if *prefix { new } else { old }.into()))
                    }
                    NodeKind::Member { object, property } => {
                        match member_target(n, *object, property, value, scratch) {
                            Some(push) => push,
                            None => {
                                let (obj, key) = (&scratch.operands[0], &scratch.operands[1]);
                                let old = obj.get_property(key)?.to_number();
                                let new = step(old);
                                obj.set_property(key, new.into())?;
                                Action::Pop(Some(if *prefix { new } else { old }.into()))
                            }
                        }
                    }
                    _ => return Err(ScriptError::type_error("Invalid update target").into()),
                }
            }

            (kind, phase) => {
                return Err(Fault::new(format!(
                    "no evaluation rule for {:?} in phase {phase:?}",
                    kind.kind()
                ))
                .into())
            }
        };
        Ok(action)
    }
}

/// Evaluates the object and key of a member-expression target into `scratch.operands[0..2]`.
/// Returns the child to push, or `None` once both are ready (at which point `n >= 3`).
fn member_target(
    n: &mut usize,
    object: NodeId,
    property: &Property,
    value: &Value,
    scratch: &mut Scratch,
) -> Option<Action> {
    match *n {
        0 => {
            *n = 1;
            Some(Action::Push(object))
        }
        1 => {
            scratch.operands.push(value.clone());
            match property {
                Property::Computed(key) => {
                    *n = 2;
                    Some(Action::Push(*key))
                }
                Property::Named(name) => {
                    scratch.operands.push(name.as_str().into());
                    *n = 3;
                    None
                }
            }
        }
        2 => {
            scratch.operands.push(value.clone());
            *n = 3;
            None
        }
        _ => None,
    }
}

fn bind(scope: &Scope, kind: DeclKind, name: &str, value: Value) -> Result<(), Interrupt> {
    match kind {
        DeclKind::Var => write_var(scope, name, value),
        DeclKind::Let => {
            scope.declare(name, value);
            Ok(())
        }
        DeclKind::Const => {
            scope.declare_const(name, value);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native;

    fn machine(src: &str) -> Machine {
        Machine::new(Rc::new(Ast::parse(src).unwrap()), &Globals::standard())
    }

    fn run(src: &str) -> Machine {
        let mut m = machine(src);
        assert!(matches!(m.run().unwrap(), Step::Done));
        m
    }

    fn global(m: &Machine, name: &str) -> String {
        m.global(name).unwrap().to_string()
    }

    #[test]
    fn loops_and_continue() {
        let m = run("var total = 0; for (var i = 0; i < 5; i++) { if (i == 3) continue; total += i; }");
        assert_eq!(global(&m, "total"), "7");

        let m = run("var n = 0; do { n++; } while (false); while (n < 10) { n += 4; if (n > 6) break; }");
        assert_eq!(global(&m, "n"), "9");
    }

    #[test]
    fn recursion_and_closures() {
        let m = run("function fib(n) { return n < 2 ? n : fib(n - 1) + fib(n - 2); } var r = fib(10);");
        assert_eq!(global(&m, "r"), "55");

        let m = run(
            "function counter() { var c = 0; return function() { c++; return c; }; }
             var next = counter(); next(); var r = next();",
        );
        assert_eq!(global(&m, "r"), "2");
    }

    #[test]
    fn switch_falls_through() {
        let m = run(
            "var out = '';
             switch (2) { case 1: out += 'a'; case 2: out += 'b'; case 3: out += 'c'; break; default: out += 'd'; }
             switch (9) { case 1: out += 'a'; default: out += 'd'; case 2: out += 'b'; }",
        );
        assert_eq!(global(&m, "out"), "bcdb");
    }

    #[test]
    fn exceptions() {
        let m = run(
            "var log = '';
             try { log += 'a'; throw 'x'; log += 'b'; } catch (e) { log += e; } finally { log += 'f'; }
             function f() { try { return 1; } finally { log += 'g'; } }
             var r = f();",
        );
        assert_eq!(global(&m, "log"), "axfg");
        assert_eq!(global(&m, "r"), "1");

        let m = run("var msg; try { nope; } catch (e) { msg = e; }");
        assert_eq!(global(&m, "msg"), "ReferenceError: nope is not defined");

        let m = run("var msg; var x = 3; try { x(); } catch (e) { msg = e; }");
        assert_eq!(global(&m, "msg"), "TypeError: x is not a function");
    }

    #[test]
    fn faults() {
        assert_eq!(machine("throw 'boom';").run().unwrap_err(), Fault::new("Uncaught boom"));
        assert_eq!(
            machine("const c = 1; c = 2;").run().unwrap_err(),
            Fault::new("TypeError: Assignment to constant variable 'c'")
        );
        assert_eq!(machine("break;").run().unwrap_err(), Fault::new("Illegal break statement"));
        let mut m = machine("function f() { return f(); } f();");
        assert_eq!(
            m.run().unwrap_err(),
            Fault::new("RangeError: Maximum call stack size exceeded")
        );
        assert!(m.is_done());
    }

    #[test]
    fn expressions() {
        let m = run(
            "var t = typeof missing; var o = {a: 1, b: [1, 2]}; o.b[1] += 5; o['c'] = o.a++;
             var ks = ''; for (var k in o) ks += k;
             var s = (1, 2, 3); var l = 0 || 'x';",
        );
        assert_eq!(global(&m, "t"), "undefined");
        assert_eq!(global(&m, "ks"), "abc");
        assert_eq!(m.global("o").unwrap().get_property(&"b".into()).unwrap().to_string(), "1,7");
        assert_eq!(m.global("o").unwrap().get_property(&"a".into()).unwrap().to_string(), "2");
        assert_eq!(m.global("o").unwrap().get_property(&"c".into()).unwrap().to_string(), "1");
        assert_eq!(global(&m, "s"), "3");
        assert_eq!(global(&m, "l"), "x");
    }

    #[test]
    fn suspend_and_resume() {
        let mut globals = Globals::standard();
        globals.function(native::suspending("ask", |_| Ok(())));
        let ast = Rc::new(Ast::parse("var a = ask('q') + 1;").unwrap());
        let mut m = Machine::new(ast, &globals);

        assert!(matches!(m.run().unwrap(), Step::Suspended));
        assert!(m.is_suspended());
        assert!(matches!(m.step().unwrap(), Step::Suspended));
        m.resume(41.0.into());
        assert!(matches!(m.run().unwrap(), Step::Done));
        assert_eq!(global(&m, "a"), "42");
    }

    #[test]
    fn call_phases() {
        let mut m = machine("function f(x) { return x; } f(1);");
        let mut seen = Vec::new();
        while let Step::Paused(p) = m.step().unwrap() {
            if let Phase::Call {
                callee_done,
                n,
                args_done,
                exec_done,
            } = p.phase
            {
                seen.push((callee_done, n, args_done, exec_done));
            }
        }
        assert_eq!(
            seen,
            vec![
                (false, 0, false, false),
                (true, 0, false, false),
                (true, 1, false, false),
                (true, 1, true, true),
            ]
        );
    }

    #[test]
    fn thrown_flag_marks_the_catch() {
        let mut m = machine("try { throw 1; } catch (e) {}");
        let mut thrown = 0;
        while let Step::Paused(p) = m.step().unwrap() {
            if p.thrown {
                assert_eq!(m.ast()[p.node].kind.kind(), Kind::Try);
                thrown += 1;
            }
        }
        assert_eq!(thrown, 1);
    }
}
