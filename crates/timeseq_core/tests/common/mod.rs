//! Shared test host: a fake module that records everything the engine
//! does to it, so scenario tests can assert on voltages, notifications,
//! and their ordering.

use timeseq_core::{Host, INPUT_PORTS, OUTPUT_PORTS, PORT_MAX_CHANNELS};

#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    ScriptReset,
    SegmentStarted,
    LaneLooped,
    TriggerTriggered,
    AssertFailed {
        name: String,
        message: String,
        stop: bool,
    },
}

pub struct TestHost {
    pub sample_rate: u32,
    pub inputs: [[f32; PORT_MAX_CHANNELS]; INPUT_PORTS],
    pub outputs: [[f32; PORT_MAX_CHANNELS]; OUTPUT_PORTS],
    pub channels: [usize; OUTPUT_PORTS],
    pub labels: Vec<(usize, String)>,
    pub events: Vec<Event>,
    /// Every `set_output_voltage` call in order: (port, channel, voltage).
    pub writes: Vec<(usize, usize, f32)>,
}

impl TestHost {
    pub fn new(sample_rate: u32) -> Self {
        TestHost {
            sample_rate,
            inputs: [[0.0; PORT_MAX_CHANNELS]; INPUT_PORTS],
            outputs: [[0.0; PORT_MAX_CHANNELS]; OUTPUT_PORTS],
            channels: [1; OUTPUT_PORTS],
            labels: Vec::new(),
            events: Vec::new(),
            writes: Vec::new(),
        }
    }

    pub fn count(&self, event: &Event) -> usize {
        self.events.iter().filter(|e| *e == event).count()
    }

    pub fn assert_failures(&self) -> Vec<(String, String, bool)> {
        self.events
            .iter()
            .filter_map(|event| match event {
                Event::AssertFailed {
                    name,
                    message,
                    stop,
                } => Some((name.clone(), message.clone(), *stop)),
                _ => None,
            })
            .collect()
    }
}

impl Host for TestHost {
    fn input_voltage(&self, port: usize, channel: usize) -> f32 {
        self.inputs[port][channel]
    }

    fn output_voltage(&self, port: usize, channel: usize) -> f32 {
        self.outputs[port][channel]
    }

    fn set_output_voltage(&mut self, port: usize, channel: usize, voltage: f32) {
        self.outputs[port][channel] = voltage;
        self.writes.push((port, channel, voltage));
    }

    fn set_output_channels(&mut self, port: usize, channels: usize) {
        self.channels[port] = channels;
    }

    fn set_output_label(&mut self, port: usize, label: &str) {
        self.labels.push((port, label.to_string()));
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn script_reset(&mut self) {
        self.events.push(Event::ScriptReset);
    }

    fn segment_started(&mut self) {
        self.events.push(Event::SegmentStarted);
    }

    fn lane_looped(&mut self) {
        self.events.push(Event::LaneLooped);
    }

    fn trigger_triggered(&mut self) {
        self.events.push(Event::TriggerTriggered);
    }

    fn assert_failed(&mut self, name: &str, message: &str, stop: bool) {
        self.events.push(Event::AssertFailed {
            name: name.to_string(),
            message: message.to_string(),
            stop,
        });
    }
}
