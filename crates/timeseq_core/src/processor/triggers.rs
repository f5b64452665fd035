//! Input-trigger edge detection.
//!
//! Each configured input trigger watches one input channel and raises its
//! named trigger on a rising edge through 1 V. The detector keeps only the
//! previous comparator state, so a voltage that stays high raises exactly
//! one trigger until it drops below the threshold again.

use crate::processor::ProcessCtx;
use crate::processor::value::PortAddr;

const TRIGGER_THRESHOLD: f32 = 1.0;

#[derive(Debug)]
pub struct InputTriggerRt {
    pub(crate) name: String,
    pub(crate) input: PortAddr,
    high: bool,
}

impl InputTriggerRt {
    pub(crate) fn new(name: String, input: PortAddr) -> Self {
        InputTriggerRt {
            name,
            input,
            high: false,
        }
    }

    pub fn process(&mut self, ctx: &mut ProcessCtx) {
        let voltage = ctx.host.input_voltage(self.input.port, self.input.channel);
        let high = voltage >= TRIGGER_THRESHOLD;
        if high && !self.high {
            ctx.raise_trigger(&self.name);
        }
        self.high = high;
    }

    pub fn reset(&mut self) {
        self.high = false;
    }
}
