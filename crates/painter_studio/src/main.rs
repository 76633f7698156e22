use std::{
    io::{BufRead, Write},
    path::PathBuf,
    process::exit,
};

use anyhow::Context;
use clap::Parser;
use painter::{Config, CurveStrategy, Marker, Output, Scheduler, Status};
use painter_script::Span;

mod render;

#[derive(Parser)]
#[command(about = "Runs a turtle script without a screen")]
struct Args {
    script: PathBuf,
    /// Where to write the finished drawing.
    #[arg(long)]
    svg: Option<PathBuf>,
    /// Play back at fast-forward speed.
    #[arg(long)]
    fast: bool,
    /// Run one instruction at a time instead of playing against a clock.
    #[arg(long)]
    step: bool,
    /// Pause on every instruction, even ones that don't draw anything.
    #[arg(long)]
    trace: bool,
    /// Simulated time between frames.
    #[arg(long, default_value_t = 16.0)]
    frame_ms: f64,
    #[arg(long, default_value_t = 0)]
    seed: u64,
    /// Compute curve tables on a background thread.
    #[arg(long)]
    worker: bool,
}

impl Args {
    fn config(&self) -> Config {
        Config {
            trace: self.trace,
            seed: self.seed,
            curve_strategy: if self.worker {
                CurveStrategy::Worker
            } else {
                CurveStrategy::Inline
            },
            ..Config::default()
        }
    }
}

/// Script output goes to stdout, errors to stderr.
struct Console;

impl Output for Console {
    fn info(&mut self, text: &str) {
        println!("{text}");
    }

    fn error(&mut self, text: &str) {
        eprintln!("{text}");
    }

    fn clear(&mut self) {}
}

/// Reports marked ranges by their position in the script.
struct Highlights {
    source: String,
}

impl Highlights {
    fn describe(&self, span: Span) -> String {
        let before = self.source.get(..span.start).unwrap_or(&self.source);
        let line = before.matches('\n').count() + 1;
        let column = before.len() - before.rfind('\n').map_or(0, |i| i + 1) + 1;
        let text = span.slice(&self.source).lines().next().unwrap_or_default();
        format!("{line}:{column}: {text}")
    }
}

impl Marker for Highlights {
    fn mark_instruction(&mut self, span: Span) {
        log::debug!("at {}", self.describe(span));
    }

    fn mark_error(&mut self, span: Span) {
        eprintln!("  at {}", self.describe(span));
    }

    fn clear_marks(&mut self) {}
}

type Studio = Scheduler<Console, Highlights>;

fn ask(question: &str) -> anyhow::Result<Option<String>> {
    print!("{question} ");
    std::io::stdout().flush()?;
    let mut line = String::new();
    let read = std::io::stdin().lock().read_line(&mut line)?;
    Ok((read > 0).then(|| line.trim_end_matches(['\r', '\n']).to_owned()))
}

fn answer(studio: &mut Studio) -> anyhow::Result<()> {
    let question = studio
        .question()
        .map(|q| q.question.clone())
        .unwrap_or_default();
    let reply = ask(&question)?;
    studio.answer(reply.as_deref());
    Ok(())
}

/// Plays the script against simulated frames. Returns `false` if it failed.
fn play(studio: &mut Studio, fast: bool, frame_ms: f64) -> anyhow::Result<bool> {
    let started = if fast {
        studio.fast_forward()
    } else {
        studio.play()
    };
    if started.is_err() {
        return Ok(false);
    }
    let mut frames = 0u64;
    loop {
        match studio.update(frame_ms) {
            Ok(Status::Finished) => break,
            Ok(Status::Awaiting) => answer(studio)?,
            Ok(Status::Running | Status::Idle) => {}
            Err(_) => return Ok(false),
        }
        frames += 1;
    }
    log::info!("finished after {frames} frames");
    Ok(true)
}

fn step(studio: &mut Studio) -> anyhow::Result<bool> {
    let mut steps = 0u64;
    loop {
        match studio.step() {
            Ok(Status::Finished) => break,
            Ok(Status::Awaiting) => answer(studio)?,
            Ok(_) => {
                steps += 1;
                let s = studio.state();
                log::debug!("step {steps}: at {:?} facing {}", s.position, s.facing);
            }
            Err(_) => return Ok(false),
        }
    }
    log::info!("finished after {steps} steps");
    Ok(true)
}

fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();
    let args = Args::parse();

    let source = std::fs::read_to_string(&args.script)
        .with_context(|| format!("failed to read {}", args.script.display()))?;
    let highlights = Highlights {
        source: source.clone(),
    };
    let mut studio = Scheduler::new(source, args.config(), Console, highlights);

    let ok = if args.step {
        step(&mut studio)?
    } else {
        play(&mut studio, args.fast, args.frame_ms)?
    };

    if let Some(path) = &args.svg {
        let state = studio.state();
        let document = render::document(&state.drawable_frame(), state.background.as_deref());
        svg::save(path, &document).with_context(|| format!("failed to write {}", path.display()))?;
        log::info!("wrote {}", path.display());
    }

    if !ok {
        // The scheduler has already reported the fault.
        exit(1);
    }
    Ok(())
}
