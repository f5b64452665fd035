//! Value evaluation.
//!
//! A value produces a voltage from its source, pipes it through its calc
//! chain in order, and optionally snaps the result to the nearest twelfth
//! of a volt. Evaluation never fails: division and remainder by zero, and
//! reads of unset variables, all produce 0.

use crate::processor::ProcessCtx;
use crate::script::model::{RoundDirection, SignDirection};

/// A resolved 0-based port address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PortAddr {
    pub port: usize,
    pub channel: usize,
}

/// A fully resolved value: refs are gone, notes are baked to voltages,
/// tunings are inlined.
#[derive(Debug)]
pub struct ValueRt {
    pub(crate) source: SourceRt,
    pub(crate) quantize: bool,
    pub(crate) calcs: Vec<CalcRt>,
}

#[derive(Debug)]
pub(crate) enum SourceRt {
    Voltage(f32),
    Variable(String),
    Input(PortAddr),
    Output(PortAddr),
    Rand {
        lower: Box<ValueRt>,
        upper: Box<ValueRt>,
    },
}

#[derive(Debug)]
pub(crate) enum CalcRt {
    Add(ValueRt),
    Sub(ValueRt),
    Mult(ValueRt),
    Div(ValueRt),
    Max(ValueRt),
    Min(ValueRt),
    Remain(ValueRt),
    Trunc,
    Frac,
    Round(RoundDirection),
    Sign(SignDirection),
    Quantize(TuningRt),
    Vtof,
}

/// Sorted, deduplicated in-octave tuning notes.
#[derive(Debug)]
pub struct TuningRt {
    pub(crate) notes: Vec<f32>,
}

impl TuningRt {
    pub fn new(mut notes: Vec<f32>) -> Self {
        notes.sort_by(|a, b| a.total_cmp(b));
        notes.dedup();
        TuningRt { notes }
    }
}

impl ValueRt {
    pub fn voltage(volts: f32) -> Self {
        ValueRt {
            source: SourceRt::Voltage(volts),
            quantize: false,
            calcs: Vec::new(),
        }
    }

    pub fn eval(&self, ctx: &mut ProcessCtx) -> f32 {
        let mut value = match &self.source {
            SourceRt::Voltage(volts) => *volts,
            SourceRt::Variable(name) => ctx.vars.get(name),
            SourceRt::Input(addr) => ctx.host.input_voltage(addr.port, addr.channel),
            SourceRt::Output(addr) => ctx.host.output_voltage(addr.port, addr.channel),
            SourceRt::Rand { lower, upper } => {
                let a = lower.eval(ctx);
                let b = upper.eval(ctx);
                let (low, high) = if a <= b { (a, b) } else { (b, a) };
                low + ctx.rng.next() * (high - low)
            }
        };

        for calc in &self.calcs {
            value = calc.apply(value, ctx);
        }

        if self.quantize {
            value = snap_twelfth(value);
        }
        value
    }
}

impl CalcRt {
    fn apply(&self, value: f32, ctx: &mut ProcessCtx) -> f32 {
        match self {
            CalcRt::Add(operand) => value + operand.eval(ctx),
            CalcRt::Sub(operand) => value - operand.eval(ctx),
            CalcRt::Mult(operand) => value * operand.eval(ctx),
            CalcRt::Div(operand) => {
                let divisor = operand.eval(ctx);
                if divisor == 0.0 { 0.0 } else { value / divisor }
            }
            CalcRt::Max(operand) => value.max(operand.eval(ctx)),
            CalcRt::Min(operand) => value.min(operand.eval(ctx)),
            CalcRt::Remain(operand) => {
                let divisor = operand.eval(ctx);
                if divisor == 0.0 { 0.0 } else { value % divisor }
            }
            CalcRt::Trunc => value.trunc(),
            CalcRt::Frac => value.fract(),
            CalcRt::Round(RoundDirection::Up) => value.ceil(),
            CalcRt::Round(RoundDirection::Down) => value.floor(),
            CalcRt::Round(RoundDirection::Near) => value.round(),
            CalcRt::Sign(SignDirection::Pos) => value.abs(),
            CalcRt::Sign(SignDirection::Neg) => -value.abs(),
            CalcRt::Quantize(tuning) => quantize_to_tuning(value, &tuning.notes),
            CalcRt::Vtof => 440.0 * (value - 0.75).exp2(),
        }
    }
}

/// Snap to the nearest 1/12 V, halves rounding away from zero.
pub fn snap_twelfth(value: f32) -> f32 {
    (value * 12.0).round() / 12.0
}

/// Snap `value` to the tuning note with the smallest circular in-octave
/// distance, carrying the octave over on wrap. Ties snap downward.
pub fn quantize_to_tuning(value: f32, notes: &[f32]) -> f32 {
    let octave = value.floor();
    let frac = value - octave;

    // Nearest candidates around `frac`: the notes just below and above,
    // where "below" and "above" wrap into the neighboring octave.
    let split = notes.partition_point(|note| *note <= frac);
    let below = if split > 0 {
        notes[split - 1]
    } else {
        notes[notes.len() - 1] - 1.0
    };
    let above = if split < notes.len() {
        notes[split]
    } else {
        notes[0] + 1.0
    };

    let note = if frac - below <= above - frac { below } else { above };
    octave + note
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{TriggerBus, VariableStore};
    use crate::host::Host;
    use crate::random::XorShift;

    struct NullHost;

    impl Host for NullHost {
        fn input_voltage(&self, _port: usize, _channel: usize) -> f32 {
            0.0
        }
        fn output_voltage(&self, _port: usize, _channel: usize) -> f32 {
            0.0
        }
        fn set_output_voltage(&mut self, _port: usize, _channel: usize, _voltage: f32) {}
        fn set_output_channels(&mut self, _port: usize, _channels: usize) {}
        fn set_output_label(&mut self, _port: usize, _label: &str) {}
        fn sample_rate(&self) -> u32 {
            48_000
        }
    }

    fn with_ctx<R>(f: impl FnOnce(&mut ProcessCtx) -> R) -> R {
        let mut host = NullHost;
        let mut vars = VariableStore::default();
        let mut triggers = TriggerBus::default();
        let mut rng = XorShift::new(0);
        let mut ctx = ProcessCtx {
            host: &mut host,
            vars: &mut vars,
            triggers: &mut triggers,
            rng: &mut rng,
            sample_rate: 48_000,
            stop_requested: false,
        };
        f(&mut ctx)
    }

    fn eval_calcs(input: f32, calcs: Vec<CalcRt>) -> f32 {
        let value = ValueRt {
            source: SourceRt::Voltage(input),
            quantize: false,
            calcs,
        };
        with_ctx(|ctx| value.eval(ctx))
    }

    #[test]
    fn division_by_zero_is_zero() {
        assert_eq!(eval_calcs(7.04, vec![CalcRt::Div(ValueRt::voltage(0.0))]), 0.0);
        assert_eq!(
            eval_calcs(7.04, vec![CalcRt::Remain(ValueRt::voltage(0.0))]),
            0.0
        );
    }

    #[test]
    fn calcs_apply_in_order() {
        // (1 + 2) * 3 = 9, not 1 + (2 * 3)
        let result = eval_calcs(
            1.0,
            vec![
                CalcRt::Add(ValueRt::voltage(2.0)),
                CalcRt::Mult(ValueRt::voltage(3.0)),
            ],
        );
        assert_eq!(result, 9.0);
    }

    #[test]
    fn frac_keeps_the_sign_of_the_input() {
        assert!((eval_calcs(1.25, vec![CalcRt::Frac]) - 0.25).abs() < 1e-6);
        assert!((eval_calcs(-1.25, vec![CalcRt::Frac]) + 0.25).abs() < 1e-6);
    }

    #[test]
    fn round_near_goes_away_from_zero_on_halves() {
        assert_eq!(eval_calcs(0.5, vec![CalcRt::Round(RoundDirection::Near)]), 1.0);
        assert_eq!(
            eval_calcs(-0.5, vec![CalcRt::Round(RoundDirection::Near)]),
            -1.0
        );
    }

    #[test]
    fn sign_forces_the_direction() {
        assert_eq!(eval_calcs(-3.0, vec![CalcRt::Sign(SignDirection::Pos)]), 3.0);
        assert_eq!(eval_calcs(3.0, vec![CalcRt::Sign(SignDirection::Neg)]), -3.0);
    }

    #[test]
    fn vtof_uses_c4_reference() {
        // 0.75 V above C4 is concert A.
        assert!((eval_calcs(0.75, vec![CalcRt::Vtof]) - 440.0).abs() < 1e-3);
        assert!((eval_calcs(1.75, vec![CalcRt::Vtof]) - 880.0).abs() < 1e-3);
    }

    #[test]
    fn quantize_flag_snaps_to_twelfths() {
        let value = ValueRt {
            source: SourceRt::Voltage(1.0 / 12.0 - 0.0005),
            quantize: true,
            calcs: Vec::new(),
        };
        let result = with_ctx(|ctx| value.eval(ctx));
        assert!((result - 1.0 / 12.0).abs() < 1e-6);
    }

    #[test]
    fn rand_swaps_inverted_bounds() {
        let value = ValueRt {
            source: SourceRt::Rand {
                lower: Box::new(ValueRt::voltage(5.0)),
                upper: Box::new(ValueRt::voltage(2.0)),
            },
            quantize: false,
            calcs: Vec::new(),
        };
        with_ctx(|ctx| {
            for _ in 0..100 {
                let draw = value.eval(ctx);
                assert!((2.0..=5.0).contains(&draw), "draw out of bounds: {draw}");
            }
        });
    }

    #[test]
    fn missing_variable_reads_as_zero() {
        let value = ValueRt {
            source: SourceRt::Variable("missing".to_string()),
            quantize: false,
            calcs: Vec::new(),
        };
        assert_eq!(with_ctx(|ctx| value.eval(ctx)), 0.0);
    }

    #[test]
    fn tuning_quantize_wraps_across_the_octave() {
        let notes = TuningRt::new(vec![0.23]);
        assert!((quantize_to_tuning(0.72999, &notes.notes) - 0.23).abs() < 1e-6);
        assert!((quantize_to_tuning(0.73001, &notes.notes) - 1.23).abs() < 1e-6);
    }

    #[test]
    fn tuning_quantize_is_idempotent() {
        let notes = TuningRt::new(vec![0.0, 0.25, 0.5, 0.75]);
        for input in [-2.3, -0.1, 0.0, 0.37, 0.88, 1.6, 4.99] {
            let once = quantize_to_tuning(input, &notes.notes);
            let twice = quantize_to_tuning(once, &notes.notes);
            assert_eq!(once, twice, "not idempotent for {input}");
        }
    }

    #[test]
    fn tuning_quantize_carries_the_octave_downward() {
        // 2.01 is closest to the 0.9 note of the octave below.
        let notes = TuningRt::new(vec![0.5, 0.9]);
        assert!((quantize_to_tuning(2.01, &notes.notes) - 1.9).abs() < 1e-6);
    }
}
