//! The engine: script lifecycle, per-tick state, and the sample clock.
//!
//! The engine owns everything mutable that outlives a tick: the variable
//! store, the trigger double buffer, the random stream, and the elapsed
//! sample counter. The runtime graph reads and writes that state through a
//! [`ProcessCtx`](crate::processor::ProcessCtx) handed down on every call.
//!
//! The engine itself is single-owner; a host that drives `process` from an
//! audio thread and the control entry points from a UI thread must
//! serialize access externally. Swapped-out runtimes are parked in a
//! dangling slot and dropped at the start of the next `process` call, so a
//! load never frees the graph a tick might still be using.

use std::collections::HashMap;

use log::{debug, warn};

use crate::host::Host;
use crate::processor::{ProcessCtx, Processor, build_processor};
use crate::random::{RandSource, XorShift};
use crate::script::model::Script;
use crate::script::{ValidationError, parse_script};

/// Engine lifecycle state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Status {
    /// No script loaded.
    #[default]
    Empty,
    /// Script loaded, scheduler not running.
    Idle,
    Running,
    Paused,
}

/// Keyed scalar storage. Absent keys read as zero, and writing zero removes
/// the key, keeping the map sparse.
#[derive(Default)]
pub struct VariableStore {
    map: HashMap<String, f32>,
}

impl VariableStore {
    pub fn get(&self, name: &str) -> f32 {
        self.map.get(name).copied().unwrap_or(0.0)
    }

    pub fn set(&mut self, name: &str, value: f32) {
        if value == 0.0 {
            self.map.remove(name);
        } else {
            match self.map.get_mut(name) {
                Some(slot) => *slot = value,
                None => {
                    self.map.insert(name.to_string(), value);
                }
            }
        }
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }
}

/// The trigger double buffer. Raised triggers land in the pending buffer;
/// `rotate` makes them current (and observable) on the next tick. This
/// one-tick delay is what lets scripts chain lanes through triggers without
/// ordering effects inside a tick.
#[derive(Default)]
pub struct TriggerBus {
    buffers: [Vec<String>; 2],
    current: usize,
}

impl TriggerBus {
    /// Append to the pending buffer.
    pub fn raise(&mut self, name: &str) {
        self.buffers[1 - self.current].push(name.to_string());
    }

    /// Triggers observable on this tick.
    pub fn current(&self) -> &[String] {
        &self.buffers[self.current]
    }

    pub fn fired(&self, name: &str) -> bool {
        self.current().iter().any(|trigger| trigger == name)
    }

    /// Make the pending buffer current and empty the other one for new
    /// arrivals.
    pub fn rotate(&mut self) {
        self.current = 1 - self.current;
        self.buffers[1 - self.current].clear();
    }

    pub fn clear(&mut self) {
        self.buffers[0].clear();
        self.buffers[1].clear();
    }
}

/// The sequencing engine.
pub struct TimeSeq {
    status: Status,
    script: Option<Script>,
    processor: Option<Processor>,
    /// Runtime swapped out by a load, kept alive until the next tick.
    dangling: Option<Processor>,
    vars: VariableStore,
    triggers: TriggerBus,
    rng: Box<dyn RandSource>,
    sample_rate: u32,
    samples_per_hour: u64,
    elapsed_samples: u64,
}

impl TimeSeq {
    pub fn new() -> Self {
        TimeSeq::with_rand_source(Box::new(XorShift::default()))
    }

    /// Use a custom random stream for `rand` values.
    pub fn with_rand_source(rng: Box<dyn RandSource>) -> Self {
        TimeSeq {
            status: Status::Empty,
            script: None,
            processor: None,
            dangling: None,
            vars: VariableStore::default(),
            triggers: TriggerBus::default(),
            rng,
            sample_rate: 0,
            samples_per_hour: 0,
            elapsed_samples: 0,
        }
    }

    // ── Script lifecycle ────────────────────────────────────────────────

    /// Load a script from JSON text. On success the previous runtime moves
    /// to the dangling slot, the engine re-enters `Idle`, and the new
    /// runtime is reset. On failure the returned list is non-empty and the
    /// engine keeps its current script, runtime, and status untouched.
    pub fn load_script(&mut self, text: &str, host: &mut dyn Host) -> Vec<ValidationError> {
        let script = match parse_script(text) {
            Ok(script) => script,
            Err(errors) => return errors,
        };
        let processor = match build_processor(&script) {
            Ok(processor) => processor,
            Err(errors) => return errors,
        };

        self.install(script, processor, host);
        debug!(
            "script loaded ({} timelines, {} input triggers)",
            self.script.as_ref().map_or(0, |s| s.timelines.len()),
            self.processor.as_ref().map_or(0, |p| p.input_triggers.len()),
        );
        Vec::new()
    }

    /// Rebuild the runtime from the already loaded script, re-capturing the
    /// host sample rate. The engine re-enters `Idle` and resets.
    pub fn reload_script(&mut self, host: &mut dyn Host) {
        let Some(script) = self.script.take() else {
            return;
        };
        match build_processor(&script) {
            Ok(processor) => {
                self.install(script, processor, host);
                debug!("script reloaded at {} Hz", self.sample_rate);
            }
            Err(errors) => {
                // A script that built once builds again; nothing sensible
                // to do beyond keeping the current runtime.
                warn!("script reload failed unexpectedly: {} errors", errors.len());
                self.script = Some(script);
            }
        }
    }

    fn install(&mut self, script: Script, processor: Processor, host: &mut dyn Host) {
        self.sample_rate = host.sample_rate();
        self.samples_per_hour = self.sample_rate as u64 * 3600;
        self.script = Some(script);
        self.dangling = self.processor.take();
        self.processor = Some(processor);
        self.status = Status::Idle;
        self.reset(host);
    }

    /// Drop the script and runtime and return to `Empty`.
    pub fn clear_script(&mut self, host: &mut dyn Host) {
        self.status = Status::Empty;
        self.processor = None;
        self.script = None;
        self.reset(host);
    }

    // ── Transport ───────────────────────────────────────────────────────

    /// Start (or resume) the scheduler. Progress, variables, and triggers
    /// are preserved; starting an already running engine changes nothing.
    /// The seed feeds the random stream when the engine actually starts.
    pub fn start(&mut self, seed: u64) {
        if self.processor.is_none() {
            self.status = Status::Empty;
            return;
        }
        if self.status != Status::Running {
            self.rng.reseed(seed);
            self.status = Status::Running;
        }
    }

    pub fn pause(&mut self) {
        if self.processor.is_some() {
            self.status = Status::Paused;
        } else {
            self.status = Status::Empty;
        }
    }

    /// Return the engine to its post-load state: triggers, variables, the
    /// elapsed counter, and every lane go back to their pre-start
    /// configuration, and the script's global actions run. The status is
    /// left as it is, so a running engine restarts from the top.
    pub fn reset(&mut self, host: &mut dyn Host) {
        host.script_reset();
        self.triggers.clear();
        self.vars.clear();
        self.elapsed_samples = 0;

        if let Some(processor) = self.processor.as_mut() {
            let mut ctx = ProcessCtx {
                host,
                vars: &mut self.vars,
                triggers: &mut self.triggers,
                rng: self.rng.as_mut(),
                sample_rate: self.sample_rate,
                stop_requested: false,
            };
            processor.reset(&mut ctx);
            if ctx.stop_requested && self.status == Status::Running {
                self.status = Status::Paused;
            }
        }
    }

    /// Advance the engine by exactly one sample.
    ///
    /// Runs whenever a runtime is loaded, regardless of status: gating
    /// per-tick calls on [`Status::Running`] is the host's job, as is any
    /// rate division. The sample rate used for durations is the one
    /// captured at load time; a host that changes its rate mid-run should
    /// call [`reload_script`](TimeSeq::reload_script).
    pub fn process(&mut self, host: &mut dyn Host) {
        // The previous runtime was kept alive for one tick; release it.
        self.dangling = None;

        let Some(processor) = self.processor.as_mut() else {
            return;
        };

        // Triggers raised during the previous tick become observable now.
        self.triggers.rotate();

        let mut ctx = ProcessCtx {
            host,
            vars: &mut self.vars,
            triggers: &mut self.triggers,
            rng: self.rng.as_mut(),
            sample_rate: self.sample_rate,
            stop_requested: false,
        };
        processor.process(&mut ctx);
        if ctx.stop_requested {
            self.status = Status::Paused;
        }

        self.elapsed_samples += 1;
        if self.elapsed_samples >= self.samples_per_hour {
            self.elapsed_samples = 0;
        }
    }

    // ── State access ────────────────────────────────────────────────────

    pub fn status(&self) -> Status {
        self.status
    }

    /// Samples processed since the last reset, wrapping every hour.
    pub fn elapsed_samples(&self) -> u64 {
        self.elapsed_samples
    }

    /// The host sample rate captured at load time.
    pub fn current_sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn variable(&self, name: &str) -> f32 {
        self.vars.get(name)
    }

    pub fn set_variable(&mut self, name: &str, value: f32) {
        self.vars.set(name, value);
    }

    /// Triggers observable on the current tick.
    pub fn triggers(&self) -> &[String] {
        self.triggers.current()
    }

    /// Raise a trigger from the host side. Like script triggers it becomes
    /// observable on the next tick.
    pub fn set_trigger(&mut self, name: &str, host: &mut dyn Host) {
        self.triggers.raise(name);
        host.trigger_triggered();
    }
}

impl Default for TimeSeq {
    fn default() -> Self {
        TimeSeq::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variables_read_zero_when_absent() {
        let vars = VariableStore::default();
        assert_eq!(vars.get("missing"), 0.0);
    }

    #[test]
    fn setting_zero_removes_the_entry() {
        let mut vars = VariableStore::default();
        vars.set("x", 1.5);
        assert_eq!(vars.get("x"), 1.5);
        vars.set("x", 0.0);
        assert_eq!(vars.get("x"), 0.0);
        assert!(vars.map.is_empty());
    }

    #[test]
    fn triggers_become_current_after_a_rotate() {
        let mut bus = TriggerBus::default();
        bus.raise("t1");
        assert!(!bus.fired("t1"));
        bus.rotate();
        assert!(bus.fired("t1"));
        assert_eq!(bus.current(), ["t1".to_string()]);
        bus.rotate();
        assert!(!bus.fired("t1"));
    }

    #[test]
    fn rotate_clears_the_new_pending_buffer() {
        let mut bus = TriggerBus::default();
        bus.raise("t1");
        bus.rotate();
        bus.raise("t2");
        bus.raise("t3");
        bus.rotate();
        assert_eq!(bus.current(), ["t2".to_string(), "t3".to_string()]);
        bus.rotate();
        assert!(bus.current().is_empty());
    }
}
