//! The functions and properties a script can use.
//!
//! Builtins never touch the [`AppState`](crate::AppState). Anything visible they do is
//! described by a [`Mutation`] left in [`Host::pending`], which the engine hands to the
//! scheduler along with the instruction that made the call.

use std::{cell::RefCell, rc::Rc};

use painter_script::{
    native::{self, num_arg, opt_num_arg},
    value::number_to_string,
    Globals, Value,
};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{
    bezier::{self, Curve, CurveWorker, Sample},
    config::{Config, Timings},
    geom::polar,
    mutation::{Animation, AsyncMutation, Mutation},
    scene::Stroke,
    state::{KeyFrame, StatePatch},
};

/// State shared between the builtins of one engine.
pub struct Host {
    pub(crate) pending: Option<Mutation>,
    pub(crate) output: Vec<String>,
    color: Value,
    foreground: Value,
    background: Value,
    speed: Value,
    rng: StdRng,
    seed: u64,
    timings: Timings,
    max_curve_samples: usize,
    worker: Option<Rc<CurveWorker>>,
}

impl Host {
    pub fn new(config: &Config, worker: Option<Rc<CurveWorker>>) -> Host {
        Host {
            pending: None,
            output: Vec::new(),
            color: Value::Null,
            foreground: "black".into(),
            background: Value::Null,
            speed: 100.0.into(),
            rng: StdRng::seed_from_u64(config.seed),
            seed: config.seed,
            timings: config.timings,
            max_curve_samples: config.max_curve_samples,
            worker,
        }
    }

    /// Back to the state of a fresh run.
    pub fn reset(&mut self) {
        self.pending = None;
        self.output.clear();
        self.color = Value::Null;
        self.foreground = "black".into();
        self.background = Value::Null;
        self.speed = 100.0.into();
        self.rng = StdRng::seed_from_u64(self.seed);
        if let Some(worker) = &self.worker {
            worker.reset();
        }
    }

    fn set_pending(&mut self, name: &str, mutation: impl Into<Mutation>) {
        if self.pending.is_some() {
            log::warn!("{name} replaced a mutation that was never collected");
        }
        self.pending = Some(mutation.into());
    }

    fn pen_color(&self) -> Option<String> {
        match &self.color {
            Value::Undefined | Value::Null => None,
            c => Some(c.to_string()).filter(|c| !c.is_empty()),
        }
    }
}

type Builtin = fn(&mut Host, &[Value]) -> Result<Value, String>;

fn builtin(globals: &mut Globals, host: &Rc<RefCell<Host>>, name: &'static str, f: Builtin) {
    let host = host.clone();
    globals.function(native::function(name, move |args| {
        f(&mut host.borrow_mut(), args)
    }));
}

fn property(
    globals: &mut Globals,
    host: &Rc<RefCell<Host>>,
    name: &'static str,
    get: fn(&Host) -> Value,
    set: fn(&mut Host, &Value) -> Result<(), String>,
) {
    let getter = {
        let host = host.clone();
        native::function(name, move |_| Ok(get(&host.borrow())))
    };
    let setter = {
        let host = host.clone();
        native::function(name, move |args| {
            set(&mut host.borrow_mut(), args.first().unwrap_or(&Value::Undefined))?;
            Ok(Value::Undefined)
        })
    };
    globals.accessor(name, Some(getter), Some(setter));
}

/// The global environment for a script, with every builtin bound to `host`.
pub fn globals(host: &Rc<RefCell<Host>>) -> Globals {
    let mut g = Globals::standard();

    builtin(&mut g, host, "forward", |h, args| travel(h, "forward", args, 1.0));
    builtin(&mut g, host, "back", |h, args| travel(h, "back", args, -1.0));
    builtin(&mut g, host, "left", |h, args| turn(h, "left", args, 1.0));
    builtin(&mut g, host, "right", |h, args| turn(h, "right", args, -1.0));
    builtin(&mut g, host, "bezier", bezier);
    builtin(&mut g, host, "up", |h, _| {
        let a = Animation::new(h.timings.rise, |ratio, _| StatePatch {
            height: Some(ratio),
            ..StatePatch::default()
        });
        h.set_pending("up", a);
        Ok(Value::Undefined)
    });
    builtin(&mut g, host, "down", |h, _| {
        let a = Animation::new(h.timings.fall, |ratio, _| StatePatch {
            height: Some(1.0 - ratio),
            ..StatePatch::default()
        });
        h.set_pending("down", a);
        Ok(Value::Undefined)
    });
    builtin(&mut g, host, "hide", |h, _| {
        let a = Animation::new(h.timings.fade, |ratio, _| StatePatch {
            opacity: Some(1.0 - ratio),
            ..StatePatch::default()
        });
        h.set_pending("hide", a);
        Ok(Value::Undefined)
    });
    builtin(&mut g, host, "show", |h, _| {
        let a = Animation::new(h.timings.fade, |ratio, _| StatePatch {
            opacity: Some(ratio),
            ..StatePatch::default()
        });
        h.set_pending("show", a);
        Ok(Value::Undefined)
    });
    builtin(&mut g, host, "wait", |h, args| {
        let seconds = number(args, 0, "wait", "seconds")?;
        let duration = h.timings.wait * seconds.max(0.0);
        h.set_pending("wait", Animation::wait(duration));
        Ok(Value::Undefined)
    });

    builtin(&mut g, host, "print", |h, args| {
        let words: Vec<String> = args.iter().map(Value::to_string).collect();
        h.output.push(words.join(" "));
        Ok(Value::Undefined)
    });
    builtin(&mut g, host, "println", |h, args| {
        let lines: Vec<String> = args.iter().map(Value::to_string).collect();
        h.output.push(lines.join("\n") + "\n");
        Ok(Value::Undefined)
    });
    {
        let host = host.clone();
        g.function(native::suspending("ask", move |args| {
            let question = match args.first() {
                None | Some(Value::Undefined) => String::new(),
                Some(q) => q.to_string(),
            };
            let default = args.get(1).cloned().unwrap_or_default();
            host.borrow_mut()
                .set_pending("ask", AsyncMutation::new(question, default));
            Ok(())
        }));
    }

    builtin(&mut g, host, "random", random);
    builtin(&mut g, host, "rgb", |_, args| rgb(args));
    builtin(&mut g, host, "hsl", |_, args| hsl(args));

    property(&mut g, host, "color", |h| h.color.clone(), |h, v| {
        let color = v.to_string();
        h.color = color.as_str().into();
        h.set_pending(
            "color",
            Animation::change(move |_| StatePatch {
                color: Some(color.clone()),
                ..StatePatch::default()
            }),
        );
        Ok(())
    });
    property(&mut g, host, "foreground", |h| h.foreground.clone(), |h, v| {
        let foreground = v.to_string();
        h.foreground = foreground.as_str().into();
        h.set_pending(
            "foreground",
            Animation::change(move |_| StatePatch {
                foreground: Some(foreground.clone()),
                ..StatePatch::default()
            }),
        );
        Ok(())
    });
    property(&mut g, host, "background", |h| h.background.clone(), |h, v| {
        let background = v.to_string();
        h.background = background.as_str().into();
        h.set_pending(
            "background",
            Animation::change(move |_| StatePatch {
                background: Some(background.clone()),
                ..StatePatch::default()
            }),
        );
        Ok(())
    });
    property(&mut g, host, "speed", |h| h.speed.clone(), |h, v| {
        let speed = v.to_number();
        if speed.is_nan() {
            return Err("speed must be a number".to_owned());
        }
        h.speed = speed.into();
        h.set_pending(
            "speed",
            Animation::change(move |_| StatePatch {
                speed: Some(speed),
                ..StatePatch::default()
            }),
        );
        Ok(())
    });

    g
}

/// A required numeric argument.
fn number(args: &[Value], i: usize, func: &str, what: &str) -> Result<f64, String> {
    let n = num_arg(args, i);
    if n.is_finite() {
        Ok(n)
    } else {
        Err(format!("{func}: {what} must be a number (was {})", number_to_string(n)))
    }
}

/// Truncates towards zero, like `x | 0`.
fn int(x: f64) -> f64 {
    if x.is_finite() {
        x.trunc()
    } else {
        0.0
    }
}

fn travel(h: &mut Host, name: &str, args: &[Value], sign: f64) -> Result<Value, String> {
    let distance = sign * number(args, 0, name, "distance")?;
    let color = match args.get(1) {
        None | Some(Value::Undefined) => h.pen_color(),
        Some(c) => Some(c.to_string()),
    };
    let duration = h.timings.movement * distance.abs();
    let a = Animation::new(duration, move |ratio, key| {
        let to = key.position + polar(key.facing_radians(), distance * ratio);
        StatePatch {
            position: Some(to),
            current_strokes: (key.height == 0.0)
                .then(|| vec![Stroke::new(key.position, to, color.clone())]),
            ..StatePatch::default()
        }
    });
    h.set_pending(name, a);
    Ok(Value::Undefined)
}

fn turn(h: &mut Host, name: &str, args: &[Value], sign: f64) -> Result<Value, String> {
    let angle = sign * number(args, 0, name, "angle")?;
    let duration = h.timings.rotation * angle.abs();
    let a = Animation::new(duration, move |ratio, key| StatePatch {
        facing: Some(key.facing + angle * ratio),
        ..StatePatch::default()
    });
    h.set_pending(name, a);
    Ok(Value::Undefined)
}

/// A curve that has been moved to where the turtle was when it started drawing it.
struct Placed {
    curve: Curve,
    max_samples: usize,
    lut: Option<Vec<Sample>>,
    ticket: Option<u64>,
}

impl Placed {
    fn new(
        curve: Curve,
        max_samples: usize,
        worker: Option<&CurveWorker>,
        immediately: bool,
    ) -> Placed {
        let ticket = match worker {
            Some(w) if !immediately => w.request(curve, max_samples),
            _ => None,
        };
        let lut = ticket.is_none().then(|| curve.lookup_table(max_samples));
        Placed {
            curve,
            max_samples,
            lut,
            ticket,
        }
    }

    fn samples(&mut self, worker: Option<&CurveWorker>, ratio: f64) -> Vec<Sample> {
        if self.lut.is_none() {
            if let (Some(id), Some(w)) = (self.ticket, worker) {
                self.lut = w.take(id);
            }
            if self.lut.is_none() && ratio == 1.0 {
                log::debug!("curve table not ready at the end, computing it here");
                self.lut = Some(self.curve.lookup_table(self.max_samples));
            }
        }
        bezier::lookup(&self.curve, self.lut.as_deref(), ratio)
    }
}

fn bezier(h: &mut Host, args: &[Value]) -> Result<Value, String> {
    let third = match (opt_num_arg(args, 3), opt_num_arg(args, 4)) {
        (None, _) => None,
        (Some(_), None) => return Err("segment 3 length unspecified".to_owned()),
        (Some(_), Some(_)) => Some((
            number(args, 3, "bezier", "a2")?,
            number(args, 4, "bezier", "d3")?,
        )),
    };
    let d1 = number(args, 0, "bezier", "d1")?;
    let a1 = number(args, 1, "bezier", "a1")?;
    let d2 = number(args, 2, "bezier", "d2")?;

    let curve = Curve::from_turtle(d1, a1, d2, third);
    let duration = h.timings.movement * curve.approx_length();
    let max_samples = h.max_curve_samples;
    let color = h.pen_color();
    let worker = h.worker.clone();
    let mut placed: Option<Placed> = None;

    let a = Animation::new(duration, move |ratio, key: &KeyFrame| {
        let worker = worker.as_deref();
        let placed = placed.get_or_insert_with(|| {
            Placed::new(curve.positioned(key), max_samples, worker, ratio == 1.0)
        });
        let samples = placed.samples(worker, ratio);
        let last = samples
            .last()
            .copied()
            .unwrap_or_else(|| placed.curve.sample(ratio));

        let strokes = (key.height == 0.0).then(|| {
            let mut from = key.position;
            let mut strokes = Vec::with_capacity(samples.len());
            for s in &samples {
                if s.position != from {
                    strokes.push(Stroke::new(from, s.position, color.clone()));
                }
                from = s.position;
            }
            strokes
        });
        StatePatch {
            position: Some(last.position),
            facing: Some(last.facing),
            current_strokes: strokes,
            ..StatePatch::default()
        }
    });
    h.set_pending("bezier", a);
    Ok(Value::Undefined)
}

fn random(h: &mut Host, args: &[Value]) -> Result<Value, String> {
    let r: f64 = h.rng.gen();
    let (min, max) = match (opt_num_arg(args, 0), opt_num_arg(args, 1)) {
        (None, _) => return Ok(r.into()),
        (Some(max), None) => (0.0, max),
        (Some(min), Some(max)) => (min, max),
    };
    Ok(int(min + r * (max - min)).into())
}

fn check_range(name: &str, value: f64, min: f64, max: f64) -> Result<(), String> {
    let s = number_to_string;
    if value < min {
        Err(format!("{name} should be >= {} (was {})", s(min), s(value)))
    } else if value > max {
        Err(format!("{name} should be <= {} (was {})", s(max), s(value)))
    } else {
        Ok(())
    }
}

fn alpha(args: &[Value], i: usize) -> f64 {
    opt_num_arg(args, i).unwrap_or(1.0)
}

fn rgb(args: &[Value]) -> Result<Value, String> {
    let (r, g, b, a) = (num_arg(args, 0), num_arg(args, 1), num_arg(args, 2), alpha(args, 3));
    check_range("red", r, 0.0, 255.0)?;
    check_range("green", g, 0.0, 255.0)?;
    check_range("blue", b, 0.0, 255.0)?;
    check_range("alpha", a, 0.0, 1.0)?;
    let s = number_to_string;
    Ok(format!("rgb({} {} {} / {})", s(int(r)), s(int(g)), s(int(b)), s(a)).into())
}

fn hsl(args: &[Value]) -> Result<Value, String> {
    let (h, s, l, a) = (num_arg(args, 0), num_arg(args, 1), num_arg(args, 2), alpha(args, 3));
    check_range("saturation", s, 0.0, 1.0)?;
    check_range("lightness", l, 0.0, 1.0)?;
    check_range("alpha", a, 0.0, 1.0)?;
    let f = number_to_string;
    Ok(format!("hsl({} {} {} / {})", f(int(h)), f(s * 100.0), f(l * 100.0), f(a * 100.0)).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AppState;

    fn host() -> Host {
        Host::new(&Config::default(), None)
    }

    #[test]
    fn colors() {
        let v = rgb(&[255.0.into(), 0.0.into(), 0.0.into(), 1.0.into()]).unwrap();
        assert_eq!(v.to_string(), "rgb(255 0 0 / 1)");
        let v = rgb(&[12.7.into(), 0.0.into(), 3.0.into()]).unwrap();
        assert_eq!(v.to_string(), "rgb(12 0 3 / 1)");
        assert_eq!(
            rgb(&[256.0.into(), 0.0.into(), 0.0.into()]).unwrap_err(),
            "red should be <= 255 (was 256)"
        );
        assert_eq!(
            rgb(&[0.0.into(), 0.0.into(), 0.0.into(), (-0.5).into()]).unwrap_err(),
            "alpha should be >= 0 (was -0.5)"
        );

        let v = hsl(&[120.5.into(), 0.5.into(), 0.25.into()]).unwrap();
        assert_eq!(v.to_string(), "hsl(120 50 25 / 100)");
        assert!(hsl(&[0.0.into(), 2.0.into(), 0.0.into()]).is_err());
    }

    #[test]
    fn random_ranges() {
        let mut h = host();
        for _ in 0..100 {
            let x = random(&mut h, &[]).unwrap().to_number();
            assert!((0.0..1.0).contains(&x));
            let x = random(&mut h, &[6.0.into()]).unwrap().to_number();
            assert!((0.0..6.0).contains(&x) && x == x.trunc());
            let x = random(&mut h, &[10.0.into(), 20.0.into()]).unwrap().to_number();
            assert!((10.0..20.0).contains(&x) && x == x.trunc());
        }
    }

    #[test]
    fn random_is_seeded() {
        let draw = |h: &mut Host| -> Vec<f64> {
            (0..5).map(|_| random(h, &[]).unwrap().to_number()).collect()
        };
        let mut h = host();
        let first = draw(&mut h);
        h.reset();
        assert_eq!(draw(&mut h), first);
    }

    #[test]
    fn bezier_needs_its_last_length() {
        let mut h = host();
        let err = bezier(&mut h, &[10.0.into(), 90.0.into(), 10.0.into(), 90.0.into()]);
        assert_eq!(err.unwrap_err(), "segment 3 length unspecified");
        assert!(h.pending.is_none());

        bezier(&mut h, &[10.0.into(), 90.0.into(), 10.0.into()]).unwrap();
        assert!(h.pending.is_some());
    }

    #[test]
    fn huge_curves_draw_a_bounded_number_of_strokes() {
        let config = Config {
            max_curve_samples: 64,
            ..Config::default()
        };
        let mut h = Host::new(&config, None);
        bezier(&mut h, &[1e20.into(), 0.0.into(), 1e20.into()]).unwrap();
        let Some(Mutation::Animation(mut a)) = h.pending.take() else {
            panic!("expected an animation");
        };
        assert!(a.duration() > 1e20);
        let patch = a.finish(&AppState::default());
        assert_eq!(patch.current_strokes.map(|s| s.len()), Some(63));
        let end = patch.position.unwrap();
        assert!((end.y / 2e20 - 1.0).abs() < 1e-9 && end.x.abs() < 1e10);
    }

    #[test]
    fn motion_rejects_non_numbers() {
        let mut h = host();
        assert!(travel(&mut h, "forward", &["far".into()], 1.0).is_err());
        assert!(h.pending.is_none());
    }

    #[test]
    fn durations_scale_with_size() {
        let mut h = host();
        travel(&mut h, "back", &[(-20.0).into()], -1.0).unwrap();
        let Some(Mutation::Animation(a)) = h.pending.take() else {
            panic!("expected an animation");
        };
        assert_eq!(a.duration(), 100.0);

        turn(&mut h, "right", &[30.0.into()], -1.0).unwrap();
        let Some(Mutation::Animation(a)) = h.pending.take() else {
            panic!("expected an animation");
        };
        assert_eq!(a.duration(), 30.0);
    }
}
