//! The runtime graph built from a loaded script.
//!
//! Everything here is fully resolved: no references, no JSON, no lookups on
//! the hot path. One `process` call advances the whole graph by exactly one
//! sample, in a fixed order: input triggers, then timelines in declaration
//! order, lanes in declaration order within each timeline.

pub mod action;
pub mod build;
pub mod cond;
pub mod duration;
pub mod lane;
pub mod segment;
pub mod timeline;
pub mod triggers;
pub mod value;

pub use build::build_processor;

use crate::engine::{TriggerBus, VariableStore};
use crate::host::Host;
use crate::random::RandSource;

/// Mutable engine state handed down through one tick.
pub struct ProcessCtx<'a> {
    pub host: &'a mut dyn Host,
    pub vars: &'a mut VariableStore,
    pub triggers: &'a mut TriggerBus,
    pub rng: &'a mut dyn RandSource,
    pub sample_rate: u32,
    /// Set when a failed assertion asks the engine to pause.
    pub stop_requested: bool,
}

impl ProcessCtx<'_> {
    /// Raise a named trigger. It lands in the pending buffer, so consumers
    /// observe it on the next tick.
    pub fn raise_trigger(&mut self, name: &str) {
        self.triggers.raise(name);
        self.host.trigger_triggered();
    }

    pub fn fail_assert(&mut self, name: &str, message: &str, stop: bool) {
        self.host.assert_failed(name, message, stop);
        if stop {
            self.stop_requested = true;
        }
    }
}

#[derive(Debug)]
pub struct Processor {
    pub(crate) input_triggers: Vec<triggers::InputTriggerRt>,
    pub(crate) timelines: Vec<timeline::TimelineRt>,
    pub(crate) global_actions: Vec<action::ActionRt>,
}

impl Processor {
    /// Advance every active lane by one sample.
    pub fn process(&mut self, ctx: &mut ProcessCtx) {
        for trigger in &mut self.input_triggers {
            trigger.process(ctx);
        }
        for timeline in &mut self.timelines {
            timeline.process(ctx);
        }
    }

    /// Return every lane to its pre-start configuration and run the
    /// script's global actions.
    pub fn reset(&mut self, ctx: &mut ProcessCtx) {
        for trigger in &mut self.input_triggers {
            trigger.reset();
        }
        for timeline in &mut self.timelines {
            timeline.reset();
        }
        for action in &self.global_actions {
            action.run(ctx);
        }
    }
}
