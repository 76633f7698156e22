//! Turtle scripts, run one visible instruction at a time and animated against a clock.
//!
//! The [`Interpreter`] drives a [`painter_script::Machine`] until it reaches something worth
//! showing, and hands back an [`Instruction`] that may carry a [`Mutation`]. The [`Scheduler`]
//! plays those mutations back over time, applying them to an [`AppState`] that a renderer can
//! turn into a [`DrawableFrame`].

pub mod bezier;
pub mod builtins;
mod config;
mod error;
pub mod geom;
pub mod instruction;
mod interpreter;
pub mod io;
pub mod mutation;
pub mod scene;
mod scheduler;
pub mod state;

pub use config::{Config, CurveStrategy, Timings};
pub use error::{Error, ParseFault, RuntimeFault};
pub use instruction::Instruction;
pub use interpreter::Interpreter;
pub use io::{Marker, Output};
pub use mutation::{Animation, AsyncMutation, Mutation};
pub use scene::{DrawableFrame, Segment, Stroke};
pub use scheduler::{Scheduler, Status, Transport};
pub use state::{AppState, StatePatch};
