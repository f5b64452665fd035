//! Lane stepping.
//!
//! A lane walks its expanded segment list one sample at a time. Trigger
//! handling happens first on every tick: a restart trigger re-enters the
//! lane from the top regardless of its state, a start trigger (re)starts an
//! idle lane, and a stop trigger takes effect after the tick's effects have
//! been produced. A lane entered on a tick processes its first sample on
//! that same tick.

use crate::processor::ProcessCtx;
use crate::processor::segment::SegmentRt;

#[derive(Debug)]
pub struct LaneRt {
    pub(crate) auto_start: bool,
    pub(crate) looping: bool,
    pub(crate) repeat: u32,
    pub(crate) disable_ui: bool,
    pub(crate) start_trigger: Option<String>,
    pub(crate) restart_trigger: Option<String>,
    pub(crate) stop_trigger: Option<String>,
    pub(crate) segments: Vec<SegmentRt>,
    running: bool,
    index: usize,
    remaining: u32,
    /// Parked at the end of the list, waiting for the timeline's loop-lock
    /// barrier to open.
    waiting: bool,
    /// A wrap happened; announce it when the first segment is re-entered.
    announce_loop: bool,
}

impl LaneRt {
    pub(crate) fn new(
        auto_start: bool,
        looping: bool,
        repeat: u32,
        disable_ui: bool,
        start_trigger: Option<String>,
        restart_trigger: Option<String>,
        stop_trigger: Option<String>,
        segments: Vec<SegmentRt>,
    ) -> Self {
        LaneRt {
            auto_start,
            looping,
            repeat,
            disable_ui,
            start_trigger,
            restart_trigger,
            stop_trigger,
            segments,
            running: auto_start,
            index: 0,
            remaining: repeat,
            waiting: false,
            announce_loop: false,
        }
    }

    /// Whether this lane takes part in its timeline's loop-lock barrier.
    pub fn gates_loop_lock(&self) -> bool {
        self.looping && self.running && !self.segments.is_empty()
    }

    pub fn waiting(&self) -> bool {
        self.waiting
    }

    /// Open the loop-lock barrier: the lane wraps and re-enters its first
    /// segment on the tick this is called.
    pub fn release_loop_wait(&mut self) {
        if self.waiting {
            self.waiting = false;
            self.index = 0;
            self.announce_loop = true;
        }
    }

    pub fn process(&mut self, ctx: &mut ProcessCtx, loop_lock: bool) {
        if self.segments.is_empty() {
            return;
        }

        let restart = self.fired(ctx, &self.restart_trigger);
        let start = self.fired(ctx, &self.start_trigger);
        let stop = self.fired(ctx, &self.stop_trigger);

        if restart || (start && !self.running) {
            self.rewind_all();
        }

        if self.running && !self.waiting {
            if self.announce_loop {
                if !self.disable_ui {
                    ctx.host.lane_looped();
                }
                self.announce_loop = false;
            }

            let completed = self.segments[self.index].process(ctx, self.disable_ui);
            if completed {
                self.advance(loop_lock);
            }
        }

        if stop {
            self.running = false;
        }
    }

    fn advance(&mut self, loop_lock: bool) {
        self.index += 1;
        if self.index < self.segments.len() {
            return;
        }
        self.index = 0;
        if self.looping {
            if loop_lock {
                self.waiting = true;
            } else {
                self.announce_loop = true;
            }
        } else if self.remaining > 1 {
            self.remaining -= 1;
        } else {
            self.running = false;
        }
    }

    fn fired(&self, ctx: &ProcessCtx, trigger: &Option<String>) -> bool {
        trigger
            .as_deref()
            .is_some_and(|name| ctx.triggers.fired(name))
    }

    fn rewind_all(&mut self) {
        for segment in &mut self.segments {
            segment.rewind();
        }
        self.index = 0;
        self.remaining = self.repeat;
        self.running = true;
        self.waiting = false;
        self.announce_loop = false;
    }

    /// Return the lane to its pre-start configuration.
    pub fn reset(&mut self) {
        for segment in &mut self.segments {
            segment.reset();
        }
        self.index = 0;
        self.remaining = self.repeat;
        self.running = self.auto_start;
        self.waiting = false;
        self.announce_loop = false;
    }
}
