//! The parsed program, stored as an immutable arena.
//!
//! Nodes refer to each other by [`NodeId`], which doubles as the node's identity: two
//! activations of the same loop have the same id, and the evaluator never mutates the
//! arena after lowering.

use std::{ops::Index, rc::Rc};

use crate::parse::{self, Input};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A half-open byte range into the source text.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Span {
        Span { start, end }
    }

    pub fn union(&self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// The slice of `source` covered by this span, or the empty string if it is out of range.
    pub fn slice<'a>(&self, source: &'a str) -> &'a str {
        source.get(self.start..self.end).unwrap_or("")
    }
}

impl From<Input<'_>> for Span {
    fn from(sp: Input) -> Self {
        Span {
            start: sp.location_offset(),
            end: sp.location_offset() + sp.fragment().len(),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DeclKind {
    Var,
    Let,
    Const,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    StrictEq,
    StrictNe,
}

impl BinaryOp {
    pub fn name(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::Le => "<=",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::StrictEq => "===",
            BinaryOp::StrictNe => "!==",
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
    TypeOf,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum UpdateOp {
    Inc,
    Dec,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AssignOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl AssignOp {
    /// The binary operator a compound assignment applies, if any.
    pub fn binary(&self) -> Option<BinaryOp> {
        match self {
            AssignOp::Assign => None,
            AssignOp::Add => Some(BinaryOp::Add),
            AssignOp::Sub => Some(BinaryOp::Sub),
            AssignOp::Mul => Some(BinaryOp::Mul),
            AssignOp::Div => Some(BinaryOp::Div),
            AssignOp::Rem => Some(BinaryOp::Rem),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    Undefined,
    Null,
    Bool(bool),
    Num(f64),
    Str(Rc<str>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Declarator {
    pub name: String,
    pub span: Span,
    pub init: Option<NodeId>,
}

/// Names that must exist as soon as a function (or the program) starts running.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Hoisted {
    pub vars: Vec<String>,
    pub functions: Vec<NodeId>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Function {
    pub name: Option<String>,
    pub params: Vec<String>,
    pub body: NodeId,
    pub hoisted: Hoisted,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Property {
    Named(String),
    Computed(NodeId),
}

#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    Program {
        body: Vec<NodeId>,
        hoisted: Hoisted,
    },
    Block {
        body: Vec<NodeId>,
        // Whether entering the block opens a new lexical scope.
        scoped: bool,
    },
    Empty,
    Expression {
        expr: NodeId,
    },
    Var {
        kind: DeclKind,
        decls: Vec<Declarator>,
    },
    FunctionDecl(Function),
    Return {
        arg: Option<NodeId>,
    },
    Throw {
        arg: NodeId,
    },
    If {
        test: NodeId,
        consequent: NodeId,
        alternate: Option<NodeId>,
    },
    For {
        init: Option<NodeId>,
        test: Option<NodeId>,
        update: Option<NodeId>,
        body: NodeId,
    },
    ForIn {
        left: NodeId,
        right: NodeId,
        body: NodeId,
    },
    While {
        test: NodeId,
        body: NodeId,
    },
    DoWhile {
        body: NodeId,
        test: NodeId,
    },
    Break,
    Continue,
    Switch {
        discriminant: NodeId,
        cases: Vec<NodeId>,
    },
    Case {
        test: Option<NodeId>,
        consequent: Vec<NodeId>,
    },
    Try {
        block: NodeId,
        handler: Option<NodeId>,
        finalizer: Option<NodeId>,
    },
    Catch {
        param: Option<NodeId>,
        body: NodeId,
    },
    Literal(Literal),
    Identifier(String),
    Array(Vec<NodeId>),
    Object(Vec<(String, NodeId)>),
    FunctionExpr(Function),
    Unary {
        op: UnaryOp,
        arg: NodeId,
    },
    Update {
        op: UpdateOp,
        prefix: bool,
        target: NodeId,
    },
    Binary {
        op: BinaryOp,
        left: NodeId,
        right: NodeId,
    },
    Logical {
        op: LogicalOp,
        left: NodeId,
        right: NodeId,
    },
    Assign {
        op: AssignOp,
        target: NodeId,
        value: NodeId,
    },
    Conditional {
        test: NodeId,
        consequent: NodeId,
        alternate: NodeId,
    },
    Sequence(Vec<NodeId>),
    Call {
        callee: NodeId,
        args: Vec<NodeId>,
    },
    Member {
        object: NodeId,
        property: Property,
    },
}

/// The kind tag of a node, without its children.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Kind {
    Program,
    Block,
    Empty,
    Expression,
    Var,
    FunctionDecl,
    Return,
    Throw,
    If,
    For,
    ForIn,
    While,
    DoWhile,
    Break,
    Continue,
    Switch,
    Case,
    Try,
    Catch,
    Literal,
    Identifier,
    Array,
    Object,
    FunctionExpr,
    Unary,
    Update,
    Binary,
    Logical,
    Assign,
    Conditional,
    Sequence,
    Call,
    Member,
}

impl NodeKind {
    pub fn kind(&self) -> Kind {
        match self {
            NodeKind::Program { .. } => Kind::Program,
            NodeKind::Block { .. } => Kind::Block,
            NodeKind::Empty => Kind::Empty,
            NodeKind::Expression { .. } => Kind::Expression,
            NodeKind::Var { .. } => Kind::Var,
            NodeKind::FunctionDecl(_) => Kind::FunctionDecl,
            NodeKind::Return { .. } => Kind::Return,
            NodeKind::Throw { .. } => Kind::Throw,
            NodeKind::If { .. } => Kind::If,
            NodeKind::For { .. } => Kind::For,
            NodeKind::ForIn { .. } => Kind::ForIn,
            NodeKind::While { .. } => Kind::While,
            NodeKind::DoWhile { .. } => Kind::DoWhile,
            NodeKind::Break => Kind::Break,
            NodeKind::Continue => Kind::Continue,
            NodeKind::Switch { .. } => Kind::Switch,
            NodeKind::Case { .. } => Kind::Case,
            NodeKind::Try { .. } => Kind::Try,
            NodeKind::Catch { .. } => Kind::Catch,
            NodeKind::Literal(_) => Kind::Literal,
            NodeKind::Identifier(_) => Kind::Identifier,
            NodeKind::Array(_) => Kind::Array,
            NodeKind::Object(_) => Kind::Object,
            NodeKind::FunctionExpr(_) => Kind::FunctionExpr,
            NodeKind::Unary { .. } => Kind::Unary,
            NodeKind::Update { .. } => Kind::Update,
            NodeKind::Binary { .. } => Kind::Binary,
            NodeKind::Logical { .. } => Kind::Logical,
            NodeKind::Assign { .. } => Kind::Assign,
            NodeKind::Conditional { .. } => Kind::Conditional,
            NodeKind::Sequence(_) => Kind::Sequence,
            NodeKind::Call { .. } => Kind::Call,
            NodeKind::Member { .. } => Kind::Member,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct Ast {
    nodes: Vec<Node>,
    root: NodeId,
    source: Rc<str>,
}

impl Ast {
    /// Parse and lower a whole program.
    pub fn parse(source: &str) -> Result<Ast, crate::ParseError> {
        let program = parse::parse_program(source)?;
        let mut lower = Lower::default();
        let root = lower.program(program);
        Ok(Ast {
            nodes: lower.nodes,
            root,
            source: source.into(),
        })
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The source text a node was parsed from.
    pub fn text(&self, id: NodeId) -> &str {
        self[id].span.slice(&self.source)
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (NodeId(i as u32), node))
    }
}

impl Index<NodeId> for Ast {
    type Output = Node;

    fn index(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }
}

use parse::syn;

#[derive(Default)]
struct Lower {
    nodes: Vec<Node>,
    // One entry per function being lowered; `var`s and top-level function
    // declarations are collected into the innermost one.
    hoisting: Vec<Hoisted>,
}

impl Lower {
    fn push(&mut self, kind: NodeKind, span: Span) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node { kind, span });
        id
    }

    fn program(&mut self, program: syn::Program) -> NodeId {
        self.hoisting.push(Hoisted::default());
        let body = self.function_body(program.body);
        let hoisted = self.hoisting.pop().unwrap_or_default();
        self.push(NodeKind::Program { body, hoisted }, program.span)
    }

    // Statements directly in a function body live in the function's own scope, so
    // their function declarations are hoisted rather than bound by a block.
    fn function_body(&mut self, body: Vec<syn::Stmt>) -> Vec<NodeId> {
        let mut ids = Vec::with_capacity(body.len());
        for stmt in body {
            let is_fn = matches!(stmt.kind, syn::StmtKind::Function(_));
            let id = self.stmt(stmt);
            if is_fn {
                if let Some(h) = self.hoisting.last_mut() {
                    h.functions.push(id);
                }
            }
            ids.push(id);
        }
        ids
    }

    fn function(&mut self, f: syn::Function) -> Function {
        self.hoisting.push(Hoisted::default());
        let body = self.function_body(f.body);
        let hoisted = self.hoisting.pop().unwrap_or_default();
        let body = self.push(
            NodeKind::Block {
                body,
                scoped: false,
            },
            f.body_span,
        );
        Function {
            name: f.name,
            params: f.params,
            body,
            hoisted,
        }
    }

    fn hoist_var(&mut self, name: &str) {
        if let Some(h) = self.hoisting.last_mut() {
            if !h.vars.iter().any(|v| v == name) {
                h.vars.push(name.to_owned());
            }
        }
    }

    fn stmts(&mut self, stmts: Vec<syn::Stmt>) -> Vec<NodeId> {
        stmts.into_iter().map(|s| self.stmt(s)).collect()
    }

    fn opt_stmt(&mut self, stmt: Option<Box<syn::Stmt>>) -> Option<NodeId> {
        stmt.map(|s| self.stmt(*s))
    }

    fn opt_expr(&mut self, expr: Option<syn::Expr>) -> Option<NodeId> {
        expr.map(|e| self.expr(e))
    }

    fn stmt(&mut self, stmt: syn::Stmt) -> NodeId {
        use syn::StmtKind as S;

        let span = stmt.span;
        let kind = match stmt.kind {
            S::Empty => NodeKind::Empty,
            S::Expr(e) => NodeKind::Expression { expr: self.expr(e) },
            S::Var(kind, decls) => {
                let decls = decls
                    .into_iter()
                    .map(|d| {
                        if kind == DeclKind::Var {
                            self.hoist_var(&d.name);
                        }
                        Declarator {
                            name: d.name,
                            span: d.span,
                            init: self.opt_expr(d.init),
                        }
                    })
                    .collect();
                NodeKind::Var { kind, decls }
            }
            S::Function(f) => NodeKind::FunctionDecl(self.function(f)),
            S::Return(arg) => NodeKind::Return {
                arg: self.opt_expr(arg),
            },
            S::Throw(arg) => NodeKind::Throw {
                arg: self.expr(arg),
            },
            S::If(test, consequent, alternate) => NodeKind::If {
                test: self.expr(test),
                consequent: self.stmt(*consequent),
                alternate: self.opt_stmt(alternate),
            },
            S::Block(body) => {
                let scoped = body.iter().any(|s| {
                    matches!(
                        s.kind,
                        S::Function(_) | S::Var(DeclKind::Let | DeclKind::Const, _)
                    )
                });
                NodeKind::Block {
                    body: self.stmts(body),
                    scoped,
                }
            }
            S::For(init, test, update, body) => NodeKind::For {
                init: self.opt_stmt(init),
                test: self.opt_expr(test),
                update: self.opt_expr(update),
                body: self.stmt(*body),
            },
            S::ForIn(left, right, body) => NodeKind::ForIn {
                left: self.stmt(*left),
                right: self.expr(right),
                body: self.stmt(*body),
            },
            S::While(test, body) => NodeKind::While {
                test: self.expr(test),
                body: self.stmt(*body),
            },
            S::DoWhile(body, test) => NodeKind::DoWhile {
                body: self.stmt(*body),
                test: self.expr(test),
            },
            S::Break => NodeKind::Break,
            S::Continue => NodeKind::Continue,
            S::Switch(discriminant, cases) => {
                let discriminant = self.expr(discriminant);
                let cases = cases
                    .into_iter()
                    .map(|case| {
                        let kind = NodeKind::Case {
                            test: self.opt_expr(case.test),
                            consequent: self.stmts(case.body),
                        };
                        self.push(kind, case.span)
                    })
                    .collect();
                NodeKind::Switch {
                    discriminant,
                    cases,
                }
            }
            S::Try(block, handler, finalizer) => {
                let block = self.stmt(*block);
                let handler = handler.map(|c| {
                    let param = c
                        .param
                        .map(|(name, span)| self.push(NodeKind::Identifier(name), span));
                    let body = self.stmt(*c.body);
                    self.push(NodeKind::Catch { param, body }, c.span)
                });
                NodeKind::Try {
                    block,
                    handler,
                    finalizer: self.opt_stmt(finalizer),
                }
            }
        };
        self.push(kind, span)
    }

    fn expr(&mut self, expr: syn::Expr) -> NodeId {
        use syn::ExprKind as E;

        let span = expr.span;
        let kind = match expr.kind {
            E::Lit(lit) => NodeKind::Literal(lit),
            E::Ident(name) => NodeKind::Identifier(name),
            E::Array(elems) => NodeKind::Array(elems.into_iter().map(|e| self.expr(e)).collect()),
            E::Object(props) => NodeKind::Object(
                props
                    .into_iter()
                    .map(|(k, v)| (k, self.expr(v)))
                    .collect(),
            ),
            E::Function(f) => NodeKind::FunctionExpr(self.function(f)),
            E::Unary(op, arg) => NodeKind::Unary {
                op,
                arg: self.expr(*arg),
            },
            E::Update(op, prefix, target) => NodeKind::Update {
                op,
                prefix,
                target: self.expr(*target),
            },
            E::Binary(op, left, right) => NodeKind::Binary {
                op,
                left: self.expr(*left),
                right: self.expr(*right),
            },
            E::Logical(op, left, right) => NodeKind::Logical {
                op,
                left: self.expr(*left),
                right: self.expr(*right),
            },
            E::Assign(op, target, value) => NodeKind::Assign {
                op,
                target: self.expr(*target),
                value: self.expr(*value),
            },
            E::Conditional(test, consequent, alternate) => NodeKind::Conditional {
                test: self.expr(*test),
                consequent: self.expr(*consequent),
                alternate: self.expr(*alternate),
            },
            E::Sequence(exprs) => {
                NodeKind::Sequence(exprs.into_iter().map(|e| self.expr(e)).collect())
            }
            E::Call(callee, args) => NodeKind::Call {
                callee: self.expr(*callee),
                args: args.into_iter().map(|e| self.expr(e)).collect(),
            },
            E::Member(object, property) => NodeKind::Member {
                object: self.expr(*object),
                property: match property {
                    syn::Prop::Named(name) => Property::Named(name),
                    syn::Prop::Computed(e) => Property::Computed(self.expr(*e)),
                },
            },
        };
        self.push(kind, span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hoists_vars_and_functions() {
        let ast = Ast::parse("var a = 1; function f(x) { var b; return x; } for (var i = 0; i < 2; i++) {}")
            .unwrap();
        let NodeKind::Program { hoisted, .. } = &ast[ast.root()].kind else {
            panic!("root should be a program");
        };
        assert_eq!(hoisted.vars, vec!["a".to_owned(), "i".to_owned()]);
        assert_eq!(hoisted.functions.len(), 1);

        let NodeKind::FunctionDecl(f) = &ast[hoisted.functions[0]].kind else {
            panic!("should be a function");
        };
        assert_eq!(f.hoisted.vars, vec!["b".to_owned()]);
        assert_eq!(f.params, vec!["x".to_owned()]);
    }

    #[test]
    fn spans_cover_source_text() {
        let src = "  forward(10 + 2);\nleft( 90 )";
        let ast = Ast::parse(src).unwrap();
        let calls: Vec<_> = ast
            .iter()
            .filter(|(_, n)| n.kind.kind() == Kind::Call)
            .map(|(id, _)| ast.text(id))
            .collect();
        assert_eq!(calls, vec!["forward(10 + 2)", "left( 90 )"]);
    }

    #[test]
    fn block_scoping_is_detected() {
        let ast = Ast::parse("{ let x = 1; } { var y = 2; }").unwrap();
        let scoped: Vec<bool> = ast
            .iter()
            .filter_map(|(_, n)| match n.kind {
                NodeKind::Block { scoped, .. } => Some(scoped),
                _ => None,
            })
            .collect();
        assert_eq!(scoped, vec![true, false]);
    }
}
