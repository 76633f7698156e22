//! A small JavaScript-like language for turtle scripts, evaluated one small step at a time.
//!
//! ```
//! use std::rc::Rc;
//! use painter_script::{Ast, Globals, Machine, Step};
//!
//! let ast = Rc::new(Ast::parse("var x = 1 + 2;").unwrap());
//! let mut machine = Machine::new(ast, &Globals::standard());
//! while let Step::Paused(_) = machine.step().unwrap() {}
//! assert_eq!(machine.global("x").unwrap().to_number(), 3.0);
//! ```

pub mod ast;
mod error;
pub mod machine;
pub mod native;
mod parse;
pub mod scope;
pub mod value;

pub use ast::{Ast, Kind, Node, NodeId, NodeKind, Span};
pub use error::{Fault, ParseError};
pub use machine::{
    CondMode, ForInMode, ForMode, IfMode, Machine, PauseState, Phase, Step, SwitchMode,
};
pub use native::{Globals, Native, Reply};
pub use value::Value;
