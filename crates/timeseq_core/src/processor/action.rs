//! Action execution.
//!
//! Start and end actions fire once per occasion; glide and gate actions are
//! armed when their segment starts and then update every sample. An action
//! with a condition is skipped for the whole occasion when the condition
//! evaluates false.

use crate::processor::ProcessCtx;
use crate::processor::cond::CondRt;
use crate::processor::value::{PortAddr, ValueRt};
use crate::script::model::EaseAlgorithm;

/// Voltage written while a gate is high.
pub const GATE_HIGH_VOLTAGE: f32 = 10.0;
/// Voltage written once a gate drops low.
pub const GATE_LOW_VOLTAGE: f32 = 0.0;

#[derive(Debug)]
pub struct ActionRt {
    pub(crate) condition: Option<CondRt>,
    pub(crate) kind: ActionKind,
}

#[derive(Debug)]
pub(crate) enum ActionKind {
    SetValue {
        output: PortAddr,
        value: ValueRt,
    },
    SetVariable {
        name: String,
        value: ValueRt,
    },
    SetPolyphony {
        port: usize,
        channels: usize,
    },
    SetLabel {
        port: usize,
        label: String,
    },
    Trigger(String),
    Assert {
        name: String,
        expect: CondRt,
        stop_on_fail: bool,
    },
}

impl ActionRt {
    pub fn run(&self, ctx: &mut ProcessCtx) {
        if let Some(condition) = &self.condition {
            if !condition.eval(ctx) {
                return;
            }
        }

        match &self.kind {
            ActionKind::SetValue { output, value } => {
                let volts = value.eval(ctx);
                ctx.host.set_output_voltage(output.port, output.channel, volts);
            }
            ActionKind::SetVariable { name, value } => {
                let volts = value.eval(ctx);
                ctx.vars.set(name, volts);
            }
            ActionKind::SetPolyphony { port, channels } => {
                ctx.host.set_output_channels(*port, *channels);
            }
            ActionKind::SetLabel { port, label } => {
                ctx.host.set_output_label(*port, label);
            }
            ActionKind::Trigger(name) => {
                ctx.raise_trigger(name);
            }
            ActionKind::Assert {
                name,
                expect,
                stop_on_fail,
            } => {
                if !expect.eval(ctx) {
                    let message = expect.describe(ctx);
                    ctx.fail_assert(name, &message, *stop_on_fail);
                }
            }
        }
    }
}

/// Map a linear phase `t` in `[0, 1]` through an easing curve.
///
/// `pow` bends the curve toward one end: positive factors move quickly away
/// from the start, negative factors approach the end quickly. `sig` is a
/// symmetric S-curve whose steepness grows with the factor; negative
/// factors invert it. A factor of 0 is the identity for both.
pub fn ease(algorithm: EaseAlgorithm, factor: f32, t: f64) -> f64 {
    if factor == 0.0 {
        return t;
    }
    let factor = factor as f64;
    match algorithm {
        EaseAlgorithm::Pow => {
            if factor > 0.0 {
                t.powf((-factor).exp2())
            } else {
                1.0 - (1.0 - t).powf(factor.exp2())
            }
        }
        EaseAlgorithm::Sig => {
            let power = factor.exp2();
            let rising = t.powf(power);
            rising / (rising + (1.0 - t).powf(power))
        }
    }
}

#[derive(Debug)]
pub(crate) enum GlideTargetRt {
    Output(PortAddr),
    Variable(String),
}

/// A glide in flight: armed at segment start, written every sample.
#[derive(Debug)]
pub struct GlideRt {
    pub(crate) condition: Option<CondRt>,
    pub(crate) start_value: ValueRt,
    pub(crate) end_value: ValueRt,
    pub(crate) algorithm: EaseAlgorithm,
    pub(crate) factor: f32,
    pub(crate) target: GlideTargetRt,
    active: bool,
    from: f32,
    to: f32,
}

impl GlideRt {
    pub(crate) fn new(
        condition: Option<CondRt>,
        start_value: ValueRt,
        end_value: ValueRt,
        algorithm: EaseAlgorithm,
        factor: f32,
        target: GlideTargetRt,
    ) -> Self {
        GlideRt {
            condition,
            start_value,
            end_value,
            algorithm,
            factor,
            target,
            active: false,
            from: 0.0,
            to: 0.0,
        }
    }

    /// Evaluate the condition and endpoints once for this pass through the
    /// segment.
    pub fn begin(&mut self, ctx: &mut ProcessCtx) {
        self.active = match &self.condition {
            Some(condition) => condition.eval(ctx),
            None => true,
        };
        if self.active {
            self.from = self.start_value.eval(ctx);
            self.to = self.end_value.eval(ctx);
        }
    }

    pub fn update(&mut self, ctx: &mut ProcessCtx, position: u64, length: u64) {
        if !self.active {
            return;
        }
        let t = if length > 1 {
            position as f64 / (length - 1) as f64
        } else {
            0.0
        };
        let eased = ease(self.algorithm, self.factor, t);
        let volts = self.from + (self.to - self.from) * eased as f32;
        match &self.target {
            GlideTargetRt::Output(addr) => {
                ctx.host.set_output_voltage(addr.port, addr.channel, volts)
            }
            GlideTargetRt::Variable(name) => ctx.vars.set(name, volts),
        }
    }

    pub fn reset(&mut self) {
        self.active = false;
    }
}

/// A gate in flight: high from segment start, low from the transition
/// sample. Writes happen only on the two edges.
#[derive(Debug)]
pub struct GateRt {
    pub(crate) condition: Option<CondRt>,
    pub(crate) output: PortAddr,
    pub(crate) high_ratio: Option<f32>,
    active: bool,
    high_samples: u64,
}

impl GateRt {
    pub(crate) fn new(condition: Option<CondRt>, output: PortAddr, high_ratio: Option<f32>) -> Self {
        GateRt {
            condition,
            output,
            high_ratio,
            active: false,
            high_samples: 0,
        }
    }

    pub fn begin(&mut self, ctx: &mut ProcessCtx, length: u64) {
        self.active = match &self.condition {
            Some(condition) => condition.eval(ctx),
            None => true,
        };
        if self.active {
            let ratio = self.high_ratio.unwrap_or(0.5);
            let high = (ratio as f64 * length as f64).floor() as u64;
            // At least one high sample, and the drop must land inside the
            // segment so every gate closes before it ends.
            self.high_samples = high.clamp(1, length.saturating_sub(1).max(1));
        }
    }

    pub fn update(&mut self, ctx: &mut ProcessCtx, position: u64) {
        if !self.active {
            return;
        }
        if position == 0 {
            ctx.host
                .set_output_voltage(self.output.port, self.output.channel, GATE_HIGH_VOLTAGE);
        } else if position == self.high_samples {
            ctx.host
                .set_output_voltage(self.output.port, self.output.channel, GATE_LOW_VOLTAGE);
        }
    }

    pub fn reset(&mut self) {
        self.active = false;
    }
}
