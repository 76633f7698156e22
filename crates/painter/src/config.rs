/// How long each kind of motion takes, in units of script time per unit of motion.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Timings {
    /// Per unit of distance travelled.
    pub movement: f64,
    /// Per degree turned.
    pub rotation: f64,
    pub rise: f64,
    pub fall: f64,
    pub fade: f64,
    /// Per second passed to `wait`.
    pub wait: f64,
}

impl Default for Timings {
    fn default() -> Self {
        Timings {
            movement: 5.0,
            rotation: 1.0,
            rise: 25.0,
            fall: 25.0,
            fade: 25.0,
            wait: 80.0,
        }
    }
}

/// Where curve lookup tables get computed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CurveStrategy {
    #[default]
    Inline,
    /// On a background thread, falling back to inline computation if the table isn't ready
    /// by the time the curve finishes.
    Worker,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub timings: Timings,
    /// How many instructions in a row may go by without animating anything before we assume
    /// the script is stuck in a loop.
    pub max_loop_count: usize,
    /// How long to pause after the loop warning.
    pub loop_wait: f64,
    /// The same, when fast-forwarding.
    pub loop_wait_fast: f64,
    /// In trace mode, how long to linger on an instruction that doesn't animate.
    pub trace_wait: f64,
    pub fast_forward_factor: f64,
    pub trace: bool,
    /// Seed for the script's `random`.
    pub seed: u64,
    pub curve_strategy: CurveStrategy,
    /// Upper bound on the size of a curve's lookup table, however long the curve is.
    pub max_curve_samples: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            timings: Timings::default(),
            max_loop_count: 10_000,
            loop_wait: 20.0,
            loop_wait_fast: 20_000.0,
            trace_wait: 10.0,
            fast_forward_factor: 1000.0,
            trace: false,
            seed: 0,
            curve_strategy: CurveStrategy::default(),
            max_curve_samples: 10_000,
        }
    }
}
