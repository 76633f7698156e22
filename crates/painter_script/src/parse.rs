use nom::{
    branch::alt,
    bytes::complete::{tag, take_until},
    character::complete::{multispace1, not_line_ending, one_of, satisfy},
    combinator::{consumed, eof, map, not, opt, peek, recognize, value, verify},
    error::{context, ErrorKind, ParseError as _, VerboseError, VerboseErrorKind},
    multi::{many0, many0_count, separated_list0, separated_list1},
    number::complete::double,
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult, InputTake,
};

use crate::{
    ast::{AssignOp, BinaryOp, DeclKind, Literal, LogicalOp, Span, UnaryOp, UpdateOp},
    ParseError,
};

pub type Input<'a> = nom_locate::LocatedSpan<&'a str>;
type PResult<'a, O> = IResult<Input<'a>, O, VerboseError<Input<'a>>>;

/// The tree that comes straight out of the parser, before it gets lowered into an
/// [`Ast`](crate::Ast).
pub(crate) mod syn {
    use crate::ast::{
        AssignOp, BinaryOp, DeclKind, Literal, LogicalOp, Span, UnaryOp, UpdateOp,
    };

    #[derive(Clone, Debug)]
    pub struct Program {
        pub body: Vec<Stmt>,
        pub span: Span,
    }

    #[derive(Clone, Debug)]
    pub struct Stmt {
        pub kind: StmtKind,
        pub span: Span,
    }

    #[derive(Clone, Debug)]
    pub enum StmtKind {
        Empty,
        Expr(Expr),
        Var(DeclKind, Vec<Declarator>),
        Function(Function),
        Return(Option<Expr>),
        Throw(Expr),
        If(Expr, Box<Stmt>, Option<Box<Stmt>>),
        Block(Vec<Stmt>),
        For(Option<Box<Stmt>>, Option<Expr>, Option<Expr>, Box<Stmt>),
        ForIn(Box<Stmt>, Expr, Box<Stmt>),
        While(Expr, Box<Stmt>),
        DoWhile(Box<Stmt>, Expr),
        Break,
        Continue,
        Switch(Expr, Vec<Case>),
        Try(Box<Stmt>, Option<Catch>, Option<Box<Stmt>>),
    }

    #[derive(Clone, Debug)]
    pub struct Declarator {
        pub name: String,
        pub span: Span,
        pub init: Option<Expr>,
    }

    #[derive(Clone, Debug)]
    pub struct Function {
        pub name: Option<String>,
        pub params: Vec<String>,
        pub body: Vec<Stmt>,
        pub body_span: Span,
    }

    #[derive(Clone, Debug)]
    pub struct Case {
        pub test: Option<Expr>,
        pub body: Vec<Stmt>,
        pub span: Span,
    }

    #[derive(Clone, Debug)]
    pub struct Catch {
        pub param: Option<(String, Span)>,
        pub body: Box<Stmt>,
        pub span: Span,
    }

    #[derive(Clone, Debug)]
    pub struct Expr {
        pub kind: ExprKind,
        pub span: Span,
    }

    #[derive(Clone, Debug)]
    pub enum ExprKind {
        Lit(Literal),
        Ident(String),
        Array(Vec<Expr>),
        Object(Vec<(String, Expr)>),
        Function(Function),
        Unary(UnaryOp, Box<Expr>),
        Update(UpdateOp, bool, Box<Expr>),
        Binary(BinaryOp, Box<Expr>, Box<Expr>),
        Logical(LogicalOp, Box<Expr>, Box<Expr>),
        Assign(AssignOp, Box<Expr>, Box<Expr>),
        Conditional(Box<Expr>, Box<Expr>, Box<Expr>),
        Sequence(Vec<Expr>),
        Call(Box<Expr>, Vec<Expr>),
        Member(Box<Expr>, Prop),
    }

    #[derive(Clone, Debug)]
    pub enum Prop {
        Named(String),
        Computed(Box<Expr>),
    }
}

use syn::{Expr, ExprKind, Stmt, StmtKind};

const RESERVED: &[&str] = &[
    "break", "case", "catch", "const", "continue", "default", "do", "else", "false", "finally",
    "for", "function", "if", "in", "let", "null", "return", "switch", "throw", "true", "try",
    "typeof", "undefined", "var", "while",
];

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Whitespace and comments.
fn sp(input: Input) -> PResult<()> {
    let line_comment = recognize(pair(tag("//"), not_line_ending));
    let block_comment = recognize(tuple((tag("/*"), take_until("*/"), tag("*/"))));
    value((), many0_count(alt((multispace1, line_comment, block_comment))))(input)
}

fn ws<'a, F: 'a, O>(inner: F) -> impl FnMut(Input<'a>) -> PResult<'a, O>
where
    F: FnMut(Input<'a>) -> PResult<'a, O>,
{
    preceded(sp, inner)
}

/// Runs `inner` after skipping whitespace, and also returns the span it consumed.
fn spanned<'a, F: 'a, O>(mut inner: F) -> impl FnMut(Input<'a>) -> PResult<'a, (O, Span)>
where
    F: FnMut(Input<'a>) -> PResult<'a, O>,
{
    move |input| {
        let (input, _) = sp(input)?;
        let (rest, (text, out)) = consumed(&mut inner)(input)?;
        Ok((rest, (out, text.into())))
    }
}

fn sym<'a>(s: &'static str) -> impl FnMut(Input<'a>) -> PResult<'a, Input<'a>> {
    ws(tag(s))
}

/// A punctuation token that must not be directly followed by any character in `forbid`.
fn op<'a, T: Clone + 'a>(
    s: &'static str,
    forbid: &'static str,
    out: T,
) -> impl FnMut(Input<'a>) -> PResult<'a, T> {
    value(out, ws(terminated(tag(s), not(one_of(forbid)))))
}

fn keyword<'a>(k: &'static str) -> impl FnMut(Input<'a>) -> PResult<'a, Input<'a>> {
    ws(terminated(tag(k), not(satisfy(is_ident_char))))
}

/// A token that has to be there, now that we know what we are parsing.
fn expect<'a>(
    s: &'static str,
    message: &'static str,
) -> impl FnMut(Input<'a>) -> PResult<'a, Input<'a>> {
    context(message, nom::combinator::cut(sym(s)))
}

/// Turns a recoverable error into a hard one.
fn commit<T>(res: PResult<T>) -> PResult<T> {
    match res {
        Err(nom::Err::Error(e)) => Err(nom::Err::Failure(e)),
        other => other,
    }
}

fn fail<'a, T>(input: Input<'a>, message: &'static str) -> PResult<'a, T> {
    Err(nom::Err::Failure(VerboseError {
        errors: vec![(input, VerboseErrorKind::Context(message))],
    }))
}

fn word(input: Input) -> PResult<Input> {
    recognize(pair(satisfy(is_ident_start), many0_count(satisfy(is_ident_char))))(input)
}

fn identifier(input: Input) -> PResult<(String, Span)> {
    let (input, _) = sp(input)?;
    let (rest, name) = verify(word, |s: &Input| !RESERVED.contains(s.fragment()))(input)?;
    Ok((rest, (name.fragment().to_string(), name.into())))
}

/// Property names may be reserved words.
fn property_name(input: Input) -> PResult<String> {
    map(ws(word), |s: Input| s.fragment().to_string())(input)
}

fn number(input: Input) -> PResult<f64> {
    preceded(peek(satisfy(|c| c.is_ascii_digit() || c == '.')), double)(input)
}

fn string_literal(input: Input) -> PResult<String> {
    let quote = match input.fragment().chars().next() {
        Some(c @ ('"' | '\'')) => c,
        _ => {
            return Err(nom::Err::Error(VerboseError::from_error_kind(
                input,
                ErrorKind::Char,
            )))
        }
    };
    let mut out = String::new();
    let mut chars = input.fragment().char_indices().skip(1);
    while let Some((i, c)) = chars.next() {
        match c {
            c if c == quote => {
                let (rest, _) = input.take_split(i + c.len_utf8());
                return Ok((rest, out));
            }
            '\\' => match chars.next() {
                Some((_, 'n')) => out.push('\n'),
                Some((_, 't')) => out.push('\t'),
                Some((_, 'r')) => out.push('\r'),
                Some((_, '0')) => out.push('\0'),
                Some((_, other)) => out.push(other),
                None => break,
            },
            '\n' => break,
            c => out.push(c),
        }
    }
    fail(input, "unterminated string")
}

fn expr_node(kind: ExprKind, span: Span) -> Expr {
    Expr { kind, span }
}

fn is_assignable(e: &Expr) -> bool {
    matches!(e.kind, ExprKind::Ident(_) | ExprKind::Member(..))
}

fn primary(input: Input) -> PResult<Expr> {
    let literal = alt((
        map(number, Literal::Num),
        map(string_literal, |s| Literal::Str(s.into())),
        value(Literal::Bool(true), keyword("true")),
        value(Literal::Bool(false), keyword("false")),
        value(Literal::Null, keyword("null")),
        value(Literal::Undefined, keyword("undefined")),
    ));
    let array = delimited(
        sym("["),
        terminated(separated_list0(sym(","), assignment), opt(sym(","))),
        expect("]", "expected ']'"),
    );
    let object_key = alt((
        property_name,
        ws(string_literal),
        map(ws(number), |n| crate::value::number_to_string(n)),
    ));
    let object = delimited(
        sym("{"),
        terminated(
            separated_list0(
                sym(","),
                pair(object_key, preceded(expect(":", "expected ':'"), assignment)),
            ),
            opt(sym(",")),
        ),
        expect("}", "expected '}'"),
    );
    let function = preceded(keyword("function"), nom::combinator::cut(function_syntax));

    alt((
        map(spanned(literal), |(lit, span)| {
            expr_node(ExprKind::Lit(lit), span)
        }),
        map(spanned(function), |(f, span)| {
            expr_node(ExprKind::Function(f), span)
        }),
        map(spanned(array), |(elems, span)| {
            expr_node(ExprKind::Array(elems), span)
        }),
        map(spanned(object), |(props, span)| {
            expr_node(ExprKind::Object(props), span)
        }),
        delimited(sym("("), expression, expect(")", "expected ')'")),
        map(identifier, |(name, span)| {
            expr_node(ExprKind::Ident(name), span)
        }),
    ))(input)
}

fn arguments(input: Input) -> PResult<Vec<Expr>> {
    terminated(
        separated_list0(sym(","), assignment),
        expect(")", "expected ')'"),
    )(input)
}

fn call_member(input: Input) -> PResult<Expr> {
    let (mut input, mut expr) = primary(input)?;
    loop {
        let start = expr.span.start;
        if let Ok((rest, _)) = op(".", "0123456789", ())(input) {
            let (rest, name) = commit(property_name(rest))?;
            let span = Span::new(start, rest.location_offset());
            expr = expr_node(ExprKind::Member(Box::new(expr), syn::Prop::Named(name)), span);
            input = rest;
        } else if let Ok((rest, _)) = sym("[")(input) {
            let (rest, index) = commit(expression(rest))?;
            let (rest, _) = expect("]", "expected ']'")(rest)?;
            let span = Span::new(start, rest.location_offset());
            let prop = syn::Prop::Computed(Box::new(index));
            expr = expr_node(ExprKind::Member(Box::new(expr), prop), span);
            input = rest;
        } else if let Ok((rest, _)) = sym("(")(input) {
            let (rest, args) = arguments(rest)?;
            let span = Span::new(start, rest.location_offset());
            expr = expr_node(ExprKind::Call(Box::new(expr), args), span);
            input = rest;
        } else {
            return Ok((input, expr));
        }
    }
}

fn update_op(input: Input) -> PResult<UpdateOp> {
    alt((
        value(UpdateOp::Inc, sym("++")),
        value(UpdateOp::Dec, sym("--")),
    ))(input)
}

fn postfix(input: Input) -> PResult<Expr> {
    let (input, expr) = call_member(input)?;
    match update_op(input) {
        Ok((rest, op)) => {
            if !is_assignable(&expr) {
                return fail(input, "invalid update target");
            }
            let span = Span::new(expr.span.start, rest.location_offset());
            Ok((
                rest,
                expr_node(ExprKind::Update(op, false, Box::new(expr)), span),
            ))
        }
        Err(nom::Err::Error(_)) => Ok((input, expr)),
        Err(e) => Err(e),
    }
}

fn unary(input: Input) -> PResult<Expr> {
    let (input, _) = sp(input)?;
    let start = input.location_offset();

    if let Ok((rest, op)) = update_op(input) {
        let (rest, target) = commit(unary(rest))?;
        if !is_assignable(&target) {
            return fail(input, "invalid update target");
        }
        let span = Span::new(start, target.span.end);
        return Ok((
            rest,
            expr_node(ExprKind::Update(op, true, Box::new(target)), span),
        ));
    }

    let mut unary_op = alt((
        op("!", "=", UnaryOp::Not),
        op("-", "-=", UnaryOp::Neg),
        op("+", "+=", UnaryOp::Plus),
        value(UnaryOp::TypeOf, keyword("typeof")),
    ));
    if let Ok((rest, op)) = unary_op(input) {
        let (rest, arg) = commit(unary(rest))?;
        let span = Span::new(start, arg.span.end);
        return Ok((rest, expr_node(ExprKind::Unary(op, Box::new(arg)), span)));
    }

    postfix(input)
}

/// Parses a left-associative chain `operand (operator operand)*`.
fn chain<'a, O>(
    input: Input<'a>,
    mut operand: impl FnMut(Input<'a>) -> PResult<'a, Expr>,
    mut operator: impl FnMut(Input<'a>) -> PResult<'a, O>,
    build: impl Fn(O, Box<Expr>, Box<Expr>) -> ExprKind,
) -> PResult<'a, Expr> {
    let (mut input, mut lhs) = operand(input)?;
    loop {
        match operator(input) {
            Ok((rest, op)) => {
                let (rest, rhs) = commit(operand(rest))?;
                let span = lhs.span.union(rhs.span);
                lhs = expr_node(build(op, Box::new(lhs), Box::new(rhs)), span);
                input = rest;
            }
            Err(nom::Err::Error(_)) => return Ok((input, lhs)),
            Err(e) => return Err(e),
        }
    }
}

fn multiplicative(input: Input) -> PResult<Expr> {
    let ops = alt((
        op("*", "=", BinaryOp::Mul),
        op("/", "=/*", BinaryOp::Div),
        op("%", "=", BinaryOp::Rem),
    ));
    chain(input, unary, ops, ExprKind::Binary)
}

fn additive(input: Input) -> PResult<Expr> {
    let ops = alt((op("+", "+=", BinaryOp::Add), op("-", "-=", BinaryOp::Sub)));
    chain(input, multiplicative, ops, ExprKind::Binary)
}

fn relational(input: Input) -> PResult<Expr> {
    let ops = alt((
        op("<=", "", BinaryOp::Le),
        op(">=", "", BinaryOp::Ge),
        op("<", "=", BinaryOp::Lt),
        op(">", "=", BinaryOp::Gt),
    ));
    chain(input, additive, ops, ExprKind::Binary)
}

fn equality(input: Input) -> PResult<Expr> {
    let ops = alt((
        op("===", "", BinaryOp::StrictEq),
        op("!==", "", BinaryOp::StrictNe),
        op("==", "", BinaryOp::Eq),
        op("!=", "", BinaryOp::Ne),
    ));
    chain(input, relational, ops, ExprKind::Binary)
}

fn logical_and(input: Input) -> PResult<Expr> {
    chain(
        input,
        equality,
        value(LogicalOp::And, sym("&&")),
        ExprKind::Logical,
    )
}

fn logical_or(input: Input) -> PResult<Expr> {
    chain(
        input,
        logical_and,
        value(LogicalOp::Or, sym("||")),
        ExprKind::Logical,
    )
}

fn conditional(input: Input) -> PResult<Expr> {
    let (input, test) = logical_or(input)?;
    let Ok((rest, _)) = sym("?")(input) else {
        return Ok((input, test));
    };
    let (rest, consequent) = commit(assignment(rest))?;
    let (rest, _) = expect(":", "expected ':'")(rest)?;
    let (rest, alternate) = commit(assignment(rest))?;
    let span = test.span.union(alternate.span);
    let kind = ExprKind::Conditional(Box::new(test), Box::new(consequent), Box::new(alternate));
    Ok((rest, expr_node(kind, span)))
}

fn assignment(input: Input) -> PResult<Expr> {
    let (input, target) = conditional(input)?;
    let mut assign_op = alt((
        op("=", "=", AssignOp::Assign),
        op("+=", "", AssignOp::Add),
        op("-=", "", AssignOp::Sub),
        op("*=", "", AssignOp::Mul),
        op("/=", "", AssignOp::Div),
        op("%=", "", AssignOp::Rem),
    ));
    match assign_op(input) {
        Ok((rest, op)) => {
            if !is_assignable(&target) {
                return fail(input, "invalid assignment target");
            }
            let (rest, value) = commit(assignment(rest))?;
            let span = target.span.union(value.span);
            let kind = ExprKind::Assign(op, Box::new(target), Box::new(value));
            Ok((rest, expr_node(kind, span)))
        }
        Err(nom::Err::Error(_)) => Ok((input, target)),
        Err(e) => Err(e),
    }
}

pub(crate) fn expression(input: Input) -> PResult<Expr> {
    let (input, mut exprs) = separated_list1(sym(","), assignment)(input)?;
    if exprs.len() == 1 {
        return Ok((input, exprs.remove(0)));
    }
    let span = exprs[0].span.union(exprs[exprs.len() - 1].span);
    Ok((input, expr_node(ExprKind::Sequence(exprs), span)))
}

fn function_syntax(input: Input) -> PResult<syn::Function> {
    let (input, name) = opt(identifier)(input)?;
    let (input, _) = expect("(", "expected '('")(input)?;
    let (input, params) = separated_list0(sym(","), identifier)(input)?;
    let (input, _) = expect(")", "expected ')'")(input)?;
    let (input, (body, body_span)) = commit(spanned(block_body)(input))?;
    Ok((
        input,
        syn::Function {
            name: name.map(|(n, _)| n),
            params: params.into_iter().map(|(p, _)| p).collect(),
            body,
            body_span,
        },
    ))
}

fn semi(input: Input) -> PResult<()> {
    context(
        "expected ';'",
        nom::combinator::cut(alt((
            value((), sym(";")),
            value((), peek(sym("}"))),
            value((), ws(eof)),
        ))),
    )(input)
}

fn decl_kind(input: Input) -> PResult<DeclKind> {
    alt((
        value(DeclKind::Var, keyword("var")),
        value(DeclKind::Let, keyword("let")),
        value(DeclKind::Const, keyword("const")),
    ))(input)
}

fn declarator(input: Input) -> PResult<syn::Declarator> {
    let (input, (name, span)) = commit(identifier(input))?;
    let (input, init) = opt(preceded(op("=", "=", ()), |i| commit(assignment(i))))(input)?;
    Ok((input, syn::Declarator { name, span, init }))
}

fn var_decl(input: Input) -> PResult<StmtKind> {
    map(
        pair(decl_kind, separated_list1(sym(","), declarator)),
        |(kind, decls)| StmtKind::Var(kind, decls),
    )(input)
}

fn block_body(input: Input) -> PResult<Vec<Stmt>> {
    delimited(sym("{"), many0(statement), expect("}", "expected '}'"))(input)
}

fn block(input: Input) -> PResult<Stmt> {
    map(spanned(block_body), |(body, span)| Stmt {
        kind: StmtKind::Block(body),
        span,
    })(input)
}

fn boxed(input: Input) -> PResult<Box<Stmt>> {
    map(statement, Box::new)(input)
}

fn condition(input: Input) -> PResult<Expr> {
    delimited(
        expect("(", "expected '('"),
        |i| commit(expression(i)),
        expect(")", "expected ')'"),
    )(input)
}

fn if_stmt(input: Input) -> PResult<StmtKind> {
    let (input, _) = keyword("if")(input)?;
    let (input, test) = condition(input)?;
    let (input, consequent) = commit(boxed(input))?;
    let (input, alternate) = opt(preceded(keyword("else"), |i| commit(boxed(i))))(input)?;
    Ok((input, StmtKind::If(test, consequent, alternate)))
}

fn for_in_head(input: Input) -> PResult<(Stmt, Expr)> {
    let left = alt((
        map(pair(decl_kind, identifier), |(kind, (name, span))| {
            StmtKind::Var(
                kind,
                vec![syn::Declarator {
                    name,
                    span,
                    init: None,
                }],
            )
        }),
        map(identifier, |(name, span)| {
            StmtKind::Expr(expr_node(ExprKind::Ident(name), span))
        }),
    ));
    let (input, (left, span)) = spanned(left)(input)?;
    let (input, _) = keyword("in")(input)?;
    let (input, right) = commit(expression(input))?;
    let (input, _) = expect(")", "expected ')'")(input)?;
    Ok((input, (Stmt { kind: left, span }, right)))
}

type ForHead = (Option<Box<Stmt>>, Option<Expr>, Option<Expr>);

fn for_head(input: Input) -> PResult<ForHead> {
    let init = alt((
        spanned(var_decl),
        map(spanned(expression), |(e, span)| (StmtKind::Expr(e), span)),
    ));
    let (input, init) = opt(init)(input)?;
    let (input, _) = expect(";", "expected ';'")(input)?;
    let (input, test) = opt(expression)(input)?;
    let (input, _) = expect(";", "expected ';'")(input)?;
    let (input, update) = opt(expression)(input)?;
    let (input, _) = expect(")", "expected ')'")(input)?;
    let init = init.map(|(kind, span)| Box::new(Stmt { kind, span }));
    Ok((input, (init, test, update)))
}

fn for_stmt(input: Input) -> PResult<StmtKind> {
    let (input, _) = keyword("for")(input)?;
    let (input, _) = expect("(", "expected '('")(input)?;
    if let Ok((input, (left, right))) = for_in_head(input) {
        let (input, body) = commit(boxed(input))?;
        return Ok((input, StmtKind::ForIn(Box::new(left), right, body)));
    }
    let (input, (init, test, update)) = for_head(input)?;
    let (input, body) = commit(boxed(input))?;
    Ok((input, StmtKind::For(init, test, update, body)))
}

fn while_stmt(input: Input) -> PResult<StmtKind> {
    let (input, _) = keyword("while")(input)?;
    let (input, test) = condition(input)?;
    let (input, body) = commit(boxed(input))?;
    Ok((input, StmtKind::While(test, body)))
}

fn do_while_stmt(input: Input) -> PResult<StmtKind> {
    let (input, _) = keyword("do")(input)?;
    let (input, body) = commit(boxed(input))?;
    let (input, _) = context("expected 'while'", nom::combinator::cut(keyword("while")))(input)?;
    let (input, test) = condition(input)?;
    let (input, _) = opt(sym(";"))(input)?;
    Ok((input, StmtKind::DoWhile(body, test)))
}

fn switch_case(input: Input) -> PResult<syn::Case> {
    let label = alt((
        map(
            preceded(
                keyword("case"),
                terminated(|i| commit(expression(i)), expect(":", "expected ':'")),
            ),
            Some,
        ),
        value(None, pair(keyword("default"), expect(":", "expected ':'"))),
    ));
    map(spanned(pair(label, many0(statement))), |((test, body), span)| {
        syn::Case { test, body, span }
    })(input)
}

fn switch_stmt(input: Input) -> PResult<StmtKind> {
    let (input, _) = keyword("switch")(input)?;
    let (input, discriminant) = condition(input)?;
    let (input, _) = expect("{", "expected '{'")(input)?;
    let (input, cases) = many0(switch_case)(input)?;
    let (input, _) = expect("}", "expected '}'")(input)?;
    Ok((input, StmtKind::Switch(discriminant, cases)))
}

fn try_stmt(input: Input) -> PResult<StmtKind> {
    let (input, _) = keyword("try")(input)?;
    let (input, body) = commit(block(input))?;
    let catch = spanned(preceded(
        keyword("catch"),
        pair(
            opt(delimited(sym("("), |i| commit(identifier(i)), expect(")", "expected ')'"))),
            |i| commit(block(i)),
        ),
    ));
    let (input, handler) = opt(map(catch, |((param, body), span)| syn::Catch {
        param,
        body: Box::new(body),
        span,
    }))(input)?;
    let (after, finalizer) = opt(preceded(keyword("finally"), |i| commit(block(i))))(input)?;
    if handler.is_none() && finalizer.is_none() {
        return fail(after, "missing catch or finally after try");
    }
    Ok((
        after,
        StmtKind::Try(Box::new(body), handler, finalizer.map(Box::new)),
    ))
}

fn function_decl(input: Input) -> PResult<StmtKind> {
    let (input, _) = keyword("function")(input)?;
    let (rest, f) = commit(function_syntax(input))?;
    if f.name.is_none() {
        return fail(input, "function statement requires a name");
    }
    Ok((rest, StmtKind::Function(f)))
}

fn statement_kind(input: Input) -> PResult<StmtKind> {
    alt((
        map(block_body, StmtKind::Block),
        terminated(var_decl, semi),
        if_stmt,
        for_stmt,
        while_stmt,
        do_while_stmt,
        switch_stmt,
        try_stmt,
        map(
            preceded(keyword("return"), terminated(opt(expression), semi)),
            StmtKind::Return,
        ),
        map(
            preceded(
                keyword("throw"),
                terminated(|i| commit(expression(i)), semi),
            ),
            StmtKind::Throw,
        ),
        value(StmtKind::Break, terminated(keyword("break"), semi)),
        value(StmtKind::Continue, terminated(keyword("continue"), semi)),
        function_decl,
        value(StmtKind::Empty, sym(";")),
        map(terminated(expression, semi), StmtKind::Expr),
    ))(input)
}

pub(crate) fn statement(input: Input) -> PResult<Stmt> {
    map(spanned(statement_kind), |(kind, span)| Stmt { kind, span })(input)
}

pub(crate) fn parse_program(source: &str) -> Result<syn::Program, ParseError> {
    let input = Input::new(source);
    match terminated(many0(statement), ws(eof))(input) {
        Ok((_, body)) => Ok(syn::Program {
            body,
            span: Span::new(0, source.len()),
        }),
        Err(nom::Err::Error(e) | nom::Err::Failure(e)) => Err(ParseError::from_verbose(e)),
        Err(nom::Err::Incomplete(_)) => Err(ParseError {
            message: "unexpected end of input".to_owned(),
            line: 1,
            column: 1,
            offset: source.len(),
        }),
    }
}

impl ParseError {
    fn from_verbose(e: VerboseError<Input>) -> ParseError {
        let context = e.errors.iter().find_map(|(input, kind)| match kind {
            VerboseErrorKind::Context(ctx) => Some((*input, ctx.to_string())),
            _ => None,
        });
        let (input, message) = match (context, e.errors.first()) {
            (Some(ctx), _) => ctx,
            (None, Some((input, VerboseErrorKind::Char(c)))) => (*input, format!("expected '{c}'")),
            (None, Some((input, _))) => (*input, "unexpected token".to_owned()),
            (None, None) => (Input::new(""), "unexpected token".to_owned()),
        };
        ParseError {
            message,
            line: input.location_line(),
            column: input.get_utf8_column(),
            offset: input.location_offset(),
        }
    }
}
