//! Playing a script back in time.
//!
//! The [`Scheduler`] owns the [`AppState`] and the engine. A host calls [`Scheduler::update`]
//! once per frame with the wall-clock time since the last one; the scheduler turns that into
//! script time, advances the current mutation, and pulls new instructions from the engine as
//! mutations finish.

use painter_script::Value;

use crate::{
    config::Config,
    error::{Error, ParseFault, RuntimeFault},
    interpreter::Interpreter,
    io::{Marker, Output},
    mutation::{AsyncMutation, Mutation},
    state::AppState,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transport {
    /// Nothing has run yet, or the run was stopped.
    Ready,
    Playing,
    Paused,
    /// Paused after a single step.
    StepFwd,
    FastFwd,
    /// The script finished or failed.
    Done,
}

/// What [`Scheduler::update`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    /// Not playing, so no time passed.
    Idle,
    /// Partway through a mutation.
    Running,
    /// Waiting for [`Scheduler::answer`].
    Awaiting,
    /// The script has ended.
    Finished,
}

pub struct Scheduler<O, M> {
    source: String,
    config: Config,
    state: AppState,
    interpreter: Option<Interpreter>,
    current: Option<Mutation>,
    transport: Transport,
    output: O,
    marker: M,
}

impl<O: Output, M: Marker> Scheduler<O, M> {
    pub fn new(source: impl Into<String>, config: Config, output: O, marker: M) -> Self {
        Scheduler {
            source: source.into(),
            config,
            state: AppState::new(),
            interpreter: None,
            current: None,
            transport: Transport::Ready,
            output,
            marker,
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    pub fn marker(&self) -> &M {
        &self.marker
    }

    /// Replaces the script. Whatever was running is stopped.
    pub fn set_source(&mut self, source: impl Into<String>) {
        self.stop();
        self.source = source.into();
        self.interpreter = None;
    }

    /// The question the script is waiting on, if any.
    pub fn question(&self) -> Option<&AsyncMutation> {
        match &self.current {
            Some(Mutation::Async(q)) => Some(q),
            _ => None,
        }
    }

    pub fn play(&mut self) -> Result<(), Error> {
        self.ensure_running()?;
        self.transport = Transport::Playing;
        Ok(())
    }

    pub fn fast_forward(&mut self) -> Result<(), Error> {
        self.ensure_running()?;
        self.transport = Transport::FastFwd;
        Ok(())
    }

    pub fn pause(&mut self) {
        if matches!(self.transport, Transport::Playing | Transport::FastFwd) {
            self.transport = Transport::Paused;
        }
    }

    /// Abandons the run and clears everything it drew and printed.
    pub fn stop(&mut self) {
        log::info!("stopping");
        self.interpreter = None;
        self.current = None;
        self.state.reset();
        self.output.clear();
        self.marker.clear_marks();
        self.transport = Transport::Ready;
    }

    /// Starts a fresh run unless one is already under way.
    fn ensure_running(&mut self) -> Result<(), Error> {
        if !matches!(self.transport, Transport::Ready | Transport::Done) {
            return Ok(());
        }
        self.state.reset();
        self.output.clear();
        self.marker.clear_marks();
        self.current = None;

        match self.interpreter.as_mut().filter(|i| !i.is_faulted()) {
            Some(i) => i.reset(),
            None => match Interpreter::new(&self.source, &self.config) {
                Ok(i) => self.interpreter = Some(i),
                Err(fault) => return Err(self.parse_failed(fault)),
            },
        }
        Ok(())
    }

    fn parse_failed(&mut self, fault: ParseFault) -> Error {
        log::error!("parse error: {fault}");
        self.interpreter = None;
        self.transport = Transport::Done;
        self.marker.mark_error(fault.span);
        self.output.error(&fault.to_string());
        fault.into()
    }

    fn runtime_failed(&mut self, fault: RuntimeFault) -> Error {
        self.transport = Transport::Done;
        self.current = None;
        self.marker.mark_error(fault.span);
        self.output.error(&fault.message);
        fault.into()
    }

    fn drain_output(&mut self) {
        if let Some(i) = &mut self.interpreter {
            for line in i.take_output() {
                self.output.info(&line);
            }
        }
    }

    /// The mutation to work on, fetching one from the engine if there's none in progress.
    fn next_mutation(&mut self) -> Result<Option<&mut Mutation>, Error> {
        if self.current.is_none() {
            self.current = self.fetch()?;
        }
        Ok(self.current.as_mut())
    }

    fn fetch(&mut self) -> Result<Option<Mutation>, Error> {
        let mut skipped = 0;
        loop {
            let Some(interpreter) = &mut self.interpreter else {
                return Ok(None);
            };
            let next = interpreter.next_instruction();
            self.drain_output();
            let instruction = match next {
                Ok(Some(instruction)) => instruction,
                Ok(None) => return Ok(None),
                Err(fault) => return Err(self.runtime_failed(fault)),
            };

            if self.config.trace {
                self.marker.clear_marks();
                self.marker.mark_instruction(instruction.span);
                let wait = self.config.trace_wait;
                return Ok(Some(instruction.mutation.unwrap_or_else(|| Mutation::wait(wait))));
            }
            if let Some(mutation) = instruction.mutation {
                return Ok(Some(mutation));
            }

            skipped += 1;
            if skipped > self.config.max_loop_count {
                log::warn!(
                    "{} instructions without any animation, assuming an infinite loop",
                    self.config.max_loop_count
                );
                self.marker.clear_marks();
                self.marker.mark_error(instruction.span);
                self.output.clear();
                self.output.error("WARNING: Possible infinite loop!");
                let wait = if self.transport == Transport::FastFwd {
                    self.config.loop_wait_fast
                } else {
                    self.config.loop_wait
                };
                return Ok(Some(Mutation::wait(wait)));
            }
        }
    }

    fn finished(&mut self) -> Status {
        log::info!("script done");
        self.transport = Transport::Done;
        Status::Finished
    }

    /// Lets `ms` milliseconds of wall-clock time pass.
    pub fn update(&mut self, ms: f64) -> Result<Status, Error> {
        let mut delta = ms / 1000.0 * self.state.speed;
        match self.transport {
            Transport::Playing => {}
            Transport::FastFwd => delta *= self.config.fast_forward_factor,
            _ => return Ok(Status::Idle),
        }

        // Zero-length mutations take no time, so cap how many can finish in one frame.
        let mut completed = 0;
        while completed <= self.config.max_loop_count {
            if self.next_mutation()?.is_none() {
                return Ok(self.finished());
            }
            let Some(mutation) = self.current.as_mut() else {
                continue;
            };
            if mutation.is_async() {
                return Ok(Status::Awaiting);
            }

            let (patch, leftover) = mutation.advance(delta, &self.state);
            let done = mutation.is_complete();
            self.state.apply(patch);
            if !done {
                return Ok(Status::Running);
            }
            self.state.commit();
            self.current = None;
            delta = leftover;
            completed += 1;
        }
        Ok(Status::Running)
    }

    /// Runs exactly one animated instruction to completion, then pauses.
    pub fn step(&mut self) -> Result<Status, Error> {
        self.ensure_running()?;
        if self.next_mutation()?.is_none() {
            return Ok(self.finished());
        }
        let Some(mutation) = self.current.as_mut() else {
            return Ok(self.finished());
        };
        if mutation.is_async() {
            self.transport = Transport::StepFwd;
            return Ok(Status::Awaiting);
        }
        if let Some(patch) = mutation.finish(&self.state) {
            self.state.apply(patch);
        }
        self.state.commit();
        self.current = None;
        self.transport = Transport::StepFwd;
        Ok(Status::Running)
    }

    /// Answers the pending question. `None` means the user gave no answer.
    pub fn answer(&mut self, input: Option<&str>) {
        let Some(Mutation::Async(q)) = &self.current else {
            log::warn!("answer given, but nothing was asked");
            return;
        };
        let value: Value = q.resolve(input);
        log::debug!("answered {value:?}");
        self.current = None;
        if let Some(i) = &mut self.interpreter {
            i.resume(value);
        }
    }
}
