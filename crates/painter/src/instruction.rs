//! Working out which part of the source an evaluator pause corresponds to.

use painter_script::{
    Ast, CondMode, ForMode, IfMode, NodeId, NodeKind, PauseState, Phase, Span, SwitchMode,
};

use crate::mutation::Mutation;

/// The part of the program that is currently running.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Active {
    Node(NodeId),
    /// A range that doesn't belong to any one node, like the `x in xs` of a for-in loop.
    Range(Span),
}

impl Active {
    pub fn span(&self, ast: &Ast) -> Span {
        match *self {
            Active::Node(id) => ast[id].span,
            Active::Range(span) => span,
        }
    }
}

/// One visible step of a running script.
#[derive(Debug)]
pub struct Instruction {
    pub state: PauseState,
    pub active: Active,
    pub span: Span,
    /// The script is blocked on the host, for instance waiting for an answer to `ask`.
    pub suspended: bool,
    pub mutation: Option<Mutation>,
}

/// Finds the active part of the program for a pause state.
///
/// `branch` is which way the conditional expression at `state.node` went, if it has been
/// decided.
pub fn resolve(ast: &Ast, state: &PauseState, branch: Option<bool>) -> Active {
    let id = state.node;
    let node = Active::Node;
    match (&ast[id].kind, &state.phase) {
        (NodeKind::For { test, .. }, Phase::For { mode: ForMode::Test }) => {
            node(test.unwrap_or(id))
        }
        (NodeKind::For { update, .. }, Phase::For { mode: ForMode::Update }) => {
            node(update.unwrap_or(id))
        }
        (NodeKind::ForIn { left, right, .. }, Phase::ForIn { looping: true, .. }) => {
            Active::Range(Span::new(ast[*left].span.start, ast[*right].span.end))
        }
        (
            NodeKind::While { test, .. } | NodeKind::DoWhile { test, .. },
            Phase::While { looping: true, .. },
        ) => node(*test),
        (NodeKind::If { test, .. }, Phase::If { mode: IfMode::Test }) => node(*test),
        (
            NodeKind::Switch {
                discriminant,
                cases,
            },
            Phase::Switch {
                mode,
                index,
                tested,
                switch_value,
                ..
            },
        ) => {
            let matched = *mode == SwitchMode::Cases
                && *tested
                && switch_value
                    .as_ref()
                    .map_or(false, |sv| sv.to_number() == state.value.to_number());
            match cases.get(*index) {
                Some(&case) if matched => node(case),
                _ if *mode != SwitchMode::Start => node(*discriminant),
                _ => node(id),
            }
        }
        (NodeKind::Try { handler: Some(handler), .. }, _) if state.thrown => {
            match &ast[*handler].kind {
                NodeKind::Catch { param: Some(param), .. } => node(*param),
                _ => node(*handler),
            }
        }
        (
            NodeKind::Conditional {
                test,
                consequent,
                alternate,
            },
            Phase::Conditional { mode },
        ) => match (mode, branch) {
            (CondMode::Test, _) => node(*test),
            (CondMode::Branch, Some(true)) => node(*consequent),
            (CondMode::Branch, Some(false)) => node(*alternate),
            _ => node(id),
        },
        (NodeKind::Sequence(exprs), Phase::Sequence { n }) if *n > 0 => {
            node(exprs.get(*n - 1).copied().unwrap_or(id))
        }
        (
            NodeKind::Call { args, .. },
            Phase::Call {
                n, args_done: false, ..
            },
        ) if *n > 0 => node(args.get(*n - 1).copied().unwrap_or(id)),
        _ => node(id),
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use painter_script::{Globals, Kind, Machine, Step};

    use super::*;

    /// Steps through `source`, collecting the text of every active range.
    fn active_texts(source: &str, kind: Kind) -> Vec<String> {
        let ast = Rc::new(Ast::parse(source).unwrap());
        let mut machine = Machine::new(ast.clone(), &Globals::standard());
        let mut ret = Vec::new();
        while let Step::Paused(state) = machine.step().unwrap() {
            if ast[state.node].kind.kind() == kind {
                let text = resolve(&ast, &state, None).span(&ast).slice(ast.source()).to_owned();
                if ret.last() != Some(&text) {
                    ret.push(text);
                }
            }
        }
        ret
    }

    #[test]
    fn for_loops() {
        let texts = active_texts("for (var i = 0; i < 2; i++) {}", Kind::For);
        assert_eq!(texts[0], "for (var i = 0; i < 2; i++) {}");
        assert!(texts.contains(&"i < 2".to_owned()));
        assert!(texts.contains(&"i++".to_owned()));
    }

    #[test]
    fn for_in_loops_highlight_the_binding() {
        let texts = active_texts("var o = {a: 1}; for (var k in o) {}", Kind::ForIn);
        assert!(texts.contains(&"var k in o".to_owned()));
    }

    #[test]
    fn while_and_if_highlight_their_tests() {
        let texts = active_texts("var i = 0; while (i < 1) i++;", Kind::While);
        assert!(texts.contains(&"i < 1".to_owned()));
        let texts = active_texts("if (1 > 2) {}", Kind::If);
        assert!(texts.contains(&"1 > 2".to_owned()));
    }

    #[test]
    fn calls_highlight_their_arguments() {
        let texts = active_texts("Math.max(1, 2 + 3);", Kind::Call);
        assert!(texts.contains(&"1".to_owned()));
        assert!(texts.contains(&"2 + 3".to_owned()));
        assert_eq!(texts.last().map(String::as_str), Some("Math.max(1, 2 + 3)"));
    }

    #[test]
    fn switches_highlight_the_matching_case() {
        let texts = active_texts("switch (2) { case 1: break; case '2': break; }", Kind::Switch);
        assert!(texts.contains(&"2".to_owned()));
        assert!(texts.contains(&"case '2': break;".to_owned()));
        assert!(!texts.contains(&"case 1: break;".to_owned()));
    }

    #[test]
    fn caught_exceptions_highlight_the_parameter() {
        let texts = active_texts("try { throw 1; } catch (err) {}", Kind::Try);
        assert!(texts.contains(&"err".to_owned()));
    }

    #[test]
    fn conditionals_use_the_recorded_branch() {
        let source = "var x = true ? 1 : 2;";
        let ast = Rc::new(Ast::parse(source).unwrap());
        let mut machine = Machine::new(ast.clone(), &Globals::standard());
        while let Step::Paused(state) = machine.step().unwrap() {
            if let Phase::Conditional {
                mode: CondMode::Branch,
            } = state.phase
            {
                let active = resolve(&ast, &state, Some(true));
                assert_eq!(active.span(&ast).slice(source), "1");
                let active = resolve(&ast, &state, Some(false));
                assert_eq!(active.span(&ast).slice(source), "2");
                return;
            }
        }
        panic!("never saw the branch");
    }
}
