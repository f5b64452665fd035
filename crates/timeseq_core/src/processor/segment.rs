//! Per-segment sample stepping.
//!
//! Within one tick a segment runs its pieces in a fixed order: on the first
//! sample the start actions (script order), then the dynamic duration
//! re-query, then every glide and gate update, and on the last sample the
//! end actions. A one-sample segment does all of that in a single tick.

use crate::processor::ProcessCtx;
use crate::processor::action::{ActionRt, GateRt, GlideRt};
use crate::processor::duration::DurationRt;

#[derive(Debug)]
pub struct SegmentRt {
    pub(crate) duration: DurationRt,
    pub(crate) start_actions: Vec<ActionRt>,
    pub(crate) end_actions: Vec<ActionRt>,
    pub(crate) glides: Vec<GlideRt>,
    pub(crate) gates: Vec<GateRt>,
    pub(crate) disable_ui: bool,
    position: u64,
    length: u64,
}

impl SegmentRt {
    pub(crate) fn new(
        duration: DurationRt,
        start_actions: Vec<ActionRt>,
        end_actions: Vec<ActionRt>,
        glides: Vec<GlideRt>,
        gates: Vec<GateRt>,
        disable_ui: bool,
    ) -> Self {
        SegmentRt {
            duration,
            start_actions,
            end_actions,
            glides,
            gates,
            disable_ui,
            position: 0,
            length: 0,
        }
    }

    /// Advance the segment by one sample. Returns true when this tick
    /// consumed the segment's last sample.
    pub fn process(&mut self, ctx: &mut ProcessCtx, lane_disable_ui: bool) -> bool {
        if self.position == 0 {
            self.enter(ctx, lane_disable_ui);
        }

        let length = self.length;
        for glide in &mut self.glides {
            glide.update(ctx, self.position, length);
        }
        for gate in &mut self.gates {
            gate.update(ctx, self.position);
        }

        if self.position + 1 >= length {
            for action in &self.end_actions {
                action.run(ctx);
            }
            self.position = 0;
            true
        } else {
            self.position += 1;
            false
        }
    }

    fn enter(&mut self, ctx: &mut ProcessCtx, lane_disable_ui: bool) {
        if !(lane_disable_ui || self.disable_ui) {
            ctx.host.segment_started();
        }

        // Dynamic durations are re-queried after the start actions have
        // run, so a start action can set the variable the duration reads.
        // The provisional computation must not double-count its drift.
        let drift_mark = self.duration.mark();
        self.length = self.duration.advance(ctx);

        for action in &self.start_actions {
            action.run(ctx);
        }

        if self.duration.is_dynamic() {
            self.duration.restore(drift_mark);
            self.length = self.duration.advance(ctx);
        }

        for glide in &mut self.glides {
            glide.begin(ctx);
        }
        let length = self.length;
        for gate in &mut self.gates {
            gate.begin(ctx, length);
        }
    }

    /// Drop all per-pass state so the next `process` re-enters the segment.
    pub fn rewind(&mut self) {
        self.position = 0;
        for glide in &mut self.glides {
            glide.reset();
        }
        for gate in &mut self.gates {
            gate.reset();
        }
    }

    /// Return to the pre-start configuration, including timing drift.
    pub fn reset(&mut self) {
        self.rewind();
        self.duration.reset();
    }
}
