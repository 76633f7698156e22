//! Groups the evaluator's small steps into visible instructions.
//!
//! The evaluator pauses after every sub-expression, which is far too fine-grained to show
//! anyone. [`Interpreter::next_instruction`] keeps stepping until it reaches a point worth
//! showing: a statement finishing, a loop test, an argument being evaluated, and so on. To tell
//! the first visit of a loop from a later one it keeps its own stack of open constructs, each
//! tagged with the evaluator depth it was opened at.

use std::{cell::RefCell, collections::HashMap, rc::Rc};

use painter_script::{
    Ast, CondMode, ForInMode, ForMode, Globals, IfMode, Machine, NodeId, PauseState, Phase, Step,
    SwitchMode, Value,
};

use crate::{
    bezier::CurveWorker,
    builtins::{self, Host},
    config::{Config, CurveStrategy},
    error::{ParseFault, RuntimeFault},
    instruction::{resolve, Active, Instruction},
};

type Key = (NodeId, usize);

pub struct Interpreter {
    ast: Rc<Ast>,
    globals: Globals,
    host: Rc<RefCell<Host>>,
    machine: Machine,
    stack: Vec<Key>,
    // Which way each open conditional expression went.
    branches: HashMap<Key, bool>,
    faulted: bool,
}

impl Interpreter {
    pub fn new(source: &str, config: &Config) -> Result<Interpreter, ParseFault> {
        let ast = Ast::parse(source).map_err(|e| ParseFault::new(e, source))?;
        let ast = Rc::new(ast);
        let worker = match config.curve_strategy {
            CurveStrategy::Inline => None,
            CurveStrategy::Worker => Some(Rc::new(CurveWorker::spawn())),
        };
        let host = Rc::new(RefCell::new(Host::new(config, worker)));
        let globals = builtins::globals(&host);
        let machine = Machine::new(ast.clone(), &globals);
        log::info!("loaded script ({} nodes)", ast.len());
        Ok(Interpreter {
            ast,
            globals,
            host,
            machine,
            stack: Vec::new(),
            branches: HashMap::new(),
            faulted: false,
        })
    }

    pub fn ast(&self) -> &Rc<Ast> {
        &self.ast
    }

    /// Whether a runtime fault has stopped this engine. A faulted engine produces no more
    /// instructions; it has to be replaced.
    pub fn is_faulted(&self) -> bool {
        self.faulted
    }

    pub fn is_suspended(&self) -> bool {
        self.machine.is_suspended()
    }

    /// Starts the program over without parsing it again.
    pub fn reset(&mut self) {
        log::info!("restarting script");
        self.host.borrow_mut().reset();
        self.machine = Machine::new(self.ast.clone(), &self.globals);
        self.stack.clear();
        self.branches.clear();
        self.faulted = false;
    }

    /// Hands the answer to a suspending builtin back to the script.
    pub fn resume(&mut self, value: Value) {
        self.machine.resume(value);
    }

    /// Text printed by the script since the last call.
    pub fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.host.borrow_mut().output)
    }

    /// Runs until the next visible instruction. Returns `None` once the program has finished.
    pub fn next_instruction(&mut self) -> Result<Option<Instruction>, RuntimeFault> {
        if self.faulted {
            log::debug!("not stepping a faulted engine");
            return Ok(None);
        }
        loop {
            let before = self.machine.pause_state();
            let state = match self.machine.step() {
                Ok(Step::Paused(state)) => state,
                Ok(Step::Suspended) => {
                    let Some(state) = self.machine.pause_state() else {
                        return Ok(None);
                    };
                    // Keeps the stack in step even though this pause isn't a boundary.
                    self.visit(&state);
                    return Ok(Some(self.instruction(state, true)));
                }
                Ok(Step::Done) => {
                    log::info!("script finished");
                    if self.host.borrow_mut().pending.take().is_some() {
                        log::warn!("dropping a mutation made by the last step");
                    }
                    return Ok(None);
                }
                Err(fault) => {
                    self.faulted = true;
                    self.host.borrow_mut().pending = None;
                    let span = before
                        .as_ref()
                        .map(|s| self.ast[s.node].span)
                        .unwrap_or_default();
                    log::error!("runtime fault: {}", fault.message);
                    return Err(RuntimeFault {
                        message: fault.message,
                        state: before,
                        span,
                    });
                }
            };

            if self.visit(&state) {
                let instruction = self.instruction(state, false);
                log::debug!(
                    "instruction {:?}{}",
                    instruction.span.slice(self.ast.source()),
                    if instruction.mutation.is_some() { " (animated)" } else { "" }
                );
                return Ok(Some(instruction));
            }
        }
    }

    fn active(&self, state: &PauseState) -> Active {
        let branch = self.branches.get(&(state.node, self.machine.depth())).copied();
        resolve(&self.ast, state, branch)
    }

    fn instruction(&mut self, state: PauseState, suspended: bool) -> Instruction {
        let active = self.active(&state);
        if let Phase::Conditional {
            mode: CondMode::Branch,
        } = state.phase
        {
            self.branches.remove(&(state.node, self.machine.depth()));
        }
        Instruction {
            span: active.span(&self.ast),
            active,
            suspended,
            mutation: self.host.borrow_mut().pending.take(),
            state,
        }
    }

    fn on_top(&self, key: Key) -> bool {
        self.stack.last() == Some(&key)
    }

    fn open(&mut self, key: Key) {
        self.stack.push(key);
    }

    fn close(&mut self, key: Key) {
        if self.on_top(key) {
            self.stack.pop();
        }
    }

    /// Updates the stack for a pause, and decides whether the pause is a visible boundary.
    fn visit(&mut self, state: &PauseState) -> bool {
        let depth = self.machine.depth();
        // Anything opened deeper than this has been left, whether by finishing or unwinding.
        while self.stack.last().map_or(false, |&(_, d)| d > depth) {
            self.stack.pop();
        }

        let key = (state.node, depth);
        let falsy = !state.value.truthy();
        match &state.phase {
            Phase::For { mode } => {
                if !self.on_top(key) {
                    self.open(key);
                } else if *mode == ForMode::Body && falsy {
                    self.close(key);
                }
                true
            }
            // Evaluating the object is part of the first visit, not a step of its own.
            Phase::ForIn { mode, .. } => *mode != ForInMode::Object,
            Phase::While { looping, .. } => {
                if !self.on_top(key) {
                    self.open(key);
                    true
                } else if *looping {
                    if falsy {
                        self.close(key);
                    }
                    true
                } else {
                    false
                }
            }
            Phase::Block { n } => *n == 0,
            Phase::If { mode } => match mode {
                IfMode::Start => {
                    self.open(key);
                    true
                }
                IfMode::Test => {
                    if falsy {
                        self.close(key);
                    }
                    true
                }
                IfMode::Body => {
                    self.close(key);
                    false
                }
            },
            Phase::Switch {
                mode,
                in_body,
                tested,
                switch_value,
                ..
            } => match mode {
                SwitchMode::Start | SwitchMode::Discriminant => true,
                SwitchMode::Cases => {
                    !*in_body
                        && *tested
                        && switch_value
                            .as_ref()
                            .map_or(false, |sv| sv.to_number() == state.value.to_number())
                }
            },
            Phase::Try { block_done, .. } => state.thrown || !*block_done,
            Phase::Conditional { mode } => match mode {
                CondMode::Start => true,
                CondMode::Test => {
                    self.branches.insert(key, state.value.truthy());
                    self.open(key);
                    true
                }
                CondMode::Branch => {
                    self.close(key);
                    true
                }
            },
            Phase::Sequence { .. } => true,
            Phase::Call {
                callee_done,
                n,
                args_done,
                exec_done,
            } => {
                if *exec_done {
                    self.close(key);
                } else if *n > 0 && !*args_done {
                    return true;
                } else if !*callee_done {
                    self.open(key);
                }
                false
            }
            Phase::Jump => true,
            Phase::Statement { .. } => {
                if self.on_top(key) {
                    self.close(key);
                    true
                } else {
                    self.open(key);
                    false
                }
            }
            Phase::Program { .. } | Phase::Catch { .. } | Phase::Hoisted | Phase::Expression { .. } => {
                false
            }
        }
    }
}
