//! Segment duration computation with fractional drift accounting.
//!
//! Declared durations rarely divide evenly into samples (a beat at 88 bpm
//! and 48 kHz is 32727.27 samples). Each segment instance keeps the
//! fractional residue of every computation in a drift accumulator; once the
//! residue reaches a whole sample it is folded into the next computation.
//! Over any repetition interval the emitted sample count converges on the
//! exact declared time.

use crate::processor::ProcessCtx;
use crate::processor::value::ValueRt;

/// Timeline time-scale, baked into every duration of that timeline.
#[derive(Clone, Copy, Debug, Default)]
pub struct TimeScaleRt {
    pub sample_rate: Option<u32>,
    pub bpm: Option<u32>,
    pub bpb: Option<u32>,
}

#[derive(Debug)]
pub struct DurationRt {
    spec: DurationSpec,
    scale: TimeScaleRt,
    drift: f64,
}

#[derive(Debug)]
pub(crate) enum DurationSpec {
    Samples(Quantity),
    Millis(Quantity),
    Hz(Quantity),
    Beats { beats: Quantity, bars: u64 },
}

#[derive(Debug)]
pub(crate) enum Quantity {
    Literal(f64),
    Value(ValueRt),
}

impl Quantity {
    fn get(&self, ctx: &mut ProcessCtx) -> f64 {
        match self {
            Quantity::Literal(n) => *n,
            Quantity::Value(value) => value.eval(ctx) as f64,
        }
    }

    fn is_dynamic(&self) -> bool {
        matches!(self, Quantity::Value(_))
    }
}

impl DurationRt {
    pub(crate) fn new(spec: DurationSpec, scale: TimeScaleRt) -> Self {
        DurationRt {
            spec,
            scale,
            drift: 0.0,
        }
    }

    /// Whether the duration must be re-queried after the segment's start
    /// actions have run.
    pub fn is_dynamic(&self) -> bool {
        match &self.spec {
            DurationSpec::Samples(q) | DurationSpec::Millis(q) | DurationSpec::Hz(q) => {
                q.is_dynamic()
            }
            DurationSpec::Beats { beats, .. } => beats.is_dynamic(),
        }
    }

    /// Snapshot of the drift accumulator, for undoing a provisional
    /// computation before the dynamic re-query.
    pub fn mark(&self) -> f64 {
        self.drift
    }

    pub fn restore(&mut self, mark: f64) {
        self.drift = mark;
    }

    /// Compute the next sample count and fold the fractional residue into
    /// the drift accumulator. Never returns less than one sample; a clamped
    /// computation discards its residue so short durations do not build up
    /// unbounded debt.
    pub fn advance(&mut self, ctx: &mut ProcessCtx) -> u64 {
        let total = self.nominal(ctx) + self.drift;
        let samples = total.floor();
        if samples < 1.0 {
            self.drift = 0.0;
            return 1;
        }
        self.drift = total - samples;
        samples as u64
    }

    pub fn reset(&mut self) {
        self.drift = 0.0;
    }

    fn nominal(&self, ctx: &mut ProcessCtx) -> f64 {
        let rate = ctx.sample_rate as f64;
        match &self.spec {
            DurationSpec::Samples(q) => {
                let samples = q.get(ctx).max(0.0);
                match self.scale.sample_rate {
                    Some(scale_rate) => samples * rate / scale_rate as f64,
                    None => samples,
                }
            }
            DurationSpec::Millis(q) => q.get(ctx).max(0.0) * rate / 1000.0,
            DurationSpec::Hz(q) => {
                let hz = q.get(ctx);
                if hz > 0.0 { rate / hz } else { 0.0 }
            }
            DurationSpec::Beats { beats, bars } => {
                // bpm is validated present whenever a beats duration loads,
                // bpb whenever bars are used.
                let Some(bpm) = self.scale.bpm else { return 0.0 };
                let bpb = self.scale.bpb.unwrap_or(0);
                let total_beats = beats.get(ctx).max(0.0) + (*bars * bpb as u64) as f64;
                total_beats * 60.0 * rate / bpm as f64
            }
        }
    }
}
