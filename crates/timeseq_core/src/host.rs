//! Host interface boundary.
//!
//! The engine owns no ports itself; it pulls voltages from and pushes
//! voltages to whatever implements [`Host`]. The notification methods have
//! no-op defaults so a minimal host only has to wire up the port accessors.

/// Callbacks between the engine and its host.
///
/// Port and channel indices are 0-based at this boundary; scripts address
/// ports 1-based and the engine translates when it builds the runtime.
///
/// Every method is called synchronously from within `process` (or from the
/// control-side entry points like `load_script`), so implementations must
/// not block.
pub trait Host {
    fn input_voltage(&self, port: usize, channel: usize) -> f32;
    fn output_voltage(&self, port: usize, channel: usize) -> f32;
    fn set_output_voltage(&mut self, port: usize, channel: usize, voltage: f32);
    /// Set the channel count of a polyphonic output port.
    fn set_output_channels(&mut self, port: usize, channels: usize);
    /// Set a UI label on an output port. No scheduling effect.
    fn set_output_label(&mut self, port: usize, label: &str);
    fn sample_rate(&self) -> u32;

    /// The loaded script was returned to its initial state.
    fn script_reset(&mut self) {}
    /// A lane entered a segment on this tick.
    fn segment_started(&mut self) {}
    /// A looping lane wrapped back to its first segment.
    fn lane_looped(&mut self) {}
    /// A trigger was raised, by an action, an input trigger, or the host.
    fn trigger_triggered(&mut self) {}
    /// An assertion failed. When `stop` is set the engine pauses once the
    /// current tick completes.
    fn assert_failed(&mut self, _name: &str, _message: &str, _stop: bool) {}
}
