//! Timeline orchestration.
//!
//! A timeline steps its lanes in declaration order. With loop-lock enabled
//! the looping lanes form a barrier: each one parks when it finishes its
//! segment list, and once every participating lane is parked they all wrap
//! on the same tick. Non-looping lanes never park and never hold the
//! barrier up.

use crate::processor::ProcessCtx;
use crate::processor::lane::LaneRt;

#[derive(Debug)]
pub struct TimelineRt {
    pub(crate) loop_lock: bool,
    pub(crate) lanes: Vec<LaneRt>,
}

impl TimelineRt {
    pub fn process(&mut self, ctx: &mut ProcessCtx) {
        if self.loop_lock {
            let mut gating = 0;
            let mut parked = 0;
            for lane in &self.lanes {
                if lane.gates_loop_lock() {
                    gating += 1;
                    if lane.waiting() {
                        parked += 1;
                    }
                }
            }
            if gating > 0 && gating == parked {
                for lane in &mut self.lanes {
                    lane.release_loop_wait();
                }
            }
        }

        for lane in &mut self.lanes {
            lane.process(ctx, self.loop_lock);
        }
    }

    pub fn reset(&mut self) {
        for lane in &mut self.lanes {
            lane.reset();
        }
    }
}
