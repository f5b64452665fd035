//! Script IR to runtime graph.
//!
//! The builder resolves every reference against the component pool, expands
//! segment-blocks into flat per-lane segment lists, bakes notes and tunings
//! into plain numbers, and groups actions by timing. Like the JSON walker
//! it is batched: all resolution problems are collected, and any error
//! discards the runtime as a whole.
//!
//! Reference chains are guarded by a visited-id stack; revisiting an id
//! that is already on the stack reports `Ref_CircularFound` at the point of
//! the repeated reference.

use std::collections::HashMap;

use crate::processor::Processor;
use crate::processor::action::{ActionKind, ActionRt, GateRt, GlideRt, GlideTargetRt};
use crate::processor::cond::{CondOp, CondRt};
use crate::processor::duration::{DurationRt, DurationSpec, Quantity, TimeScaleRt};
use crate::processor::lane::LaneRt;
use crate::processor::segment::SegmentRt;
use crate::processor::timeline::TimelineRt;
use crate::processor::triggers::InputTriggerRt;
use crate::processor::value::{CalcRt, PortAddr, SourceRt, TuningRt, ValueRt};
use crate::script::model::*;
use crate::script::notes;
use crate::script::validate::{ErrorCode, ValidationError};

/// Build the runtime graph for a parsed script. Returns every resolution
/// error when the script does not link together.
pub fn build_processor(script: &Script) -> Result<Processor, Vec<ValidationError>> {
    let mut builder = Builder::new(script);
    let processor = builder.build();
    if builder.errors.is_empty() {
        Ok(processor)
    } else {
        Err(builder.errors)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Kind {
    Segment,
    SegmentBlock,
    Action,
    Value,
    Calc,
    If,
}

struct Builder<'s> {
    script: &'s Script,
    errors: Vec<ValidationError>,
    path: Vec<String>,
    visiting: Vec<(Kind, &'s str)>,
    segments: HashMap<&'s str, usize>,
    blocks: HashMap<&'s str, usize>,
    actions: HashMap<&'s str, usize>,
    values: HashMap<&'s str, usize>,
    calcs: HashMap<&'s str, usize>,
    ifs: HashMap<&'s str, usize>,
    inputs: HashMap<&'s str, usize>,
    outputs: HashMap<&'s str, usize>,
    tunings: HashMap<&'s str, usize>,
}

/// A resolved action, routed by its timing.
enum BuiltAction {
    Plain(ActionTiming, ActionRt),
    Glide(GlideRt),
    Gate(GateRt),
}

fn index_by_id<'s, T>(items: &'s [T], id: impl Fn(&'s T) -> Option<&'s str>) -> HashMap<&'s str, usize> {
    items
        .iter()
        .enumerate()
        .filter_map(|(index, item)| id(item).map(|id| (id, index)))
        .collect()
}

impl<'s> Builder<'s> {
    fn new(script: &'s Script) -> Self {
        let pool = &script.pool;
        Builder {
            script,
            errors: Vec::new(),
            path: Vec::new(),
            visiting: Vec::new(),
            segments: index_by_id(&pool.segments, |s| s.id.as_deref()),
            blocks: index_by_id(&pool.segment_blocks, |b| Some(b.id.as_str())),
            actions: index_by_id(&pool.actions, |a| a.id.as_deref()),
            values: index_by_id(&pool.values, |v| v.id.as_deref()),
            calcs: index_by_id(&pool.calcs, |c| c.id.as_deref()),
            ifs: index_by_id(&pool.ifs, |i| i.id.as_deref()),
            inputs: index_by_id(&pool.inputs, |p| p.id.as_deref()),
            outputs: index_by_id(&pool.outputs, |p| p.id.as_deref()),
            tunings: index_by_id(&pool.tunings, |t| Some(t.id.as_str())),
        }
    }

    // ── Bookkeeping ─────────────────────────────────────────────────────

    fn pointer(&self) -> String {
        if self.path.is_empty() {
            String::new()
        } else {
            format!("/{}", self.path.join("/"))
        }
    }

    fn enter(&mut self, segment: impl ToString) {
        self.path.push(segment.to_string());
    }

    fn leave(&mut self) {
        self.path.pop();
    }

    fn error(&mut self, code: ErrorCode, message: impl Into<String>) {
        self.errors
            .push(ValidationError::new(self.pointer(), code, message));
    }

    /// Jump the location to a pool definition, returning the saved path.
    fn enter_pool(&mut self, kind: &str, index: usize) -> Vec<String> {
        std::mem::replace(
            &mut self.path,
            vec![
                "component-pool".to_string(),
                kind.to_string(),
                index.to_string(),
            ],
        )
    }

    fn leave_pool(&mut self, saved: Vec<String>) {
        self.path = saved;
    }

    /// Guard a reference against cycles. Reports and returns false when the
    /// id is already being resolved further up the chain.
    fn visit(&mut self, kind: Kind, id: &'s str) -> bool {
        if self.visiting.contains(&(kind, id)) {
            self.error(
                ErrorCode::RefCircularFound,
                format!("'{id}' is part of a circular reference chain"),
            );
            return false;
        }
        self.visiting.push((kind, id));
        true
    }

    fn unvisit(&mut self) {
        self.visiting.pop();
    }

    // ── Top level ───────────────────────────────────────────────────────

    fn build(&mut self) -> Processor {
        let script = self.script;

        self.enter("timelines");
        let mut timelines = Vec::with_capacity(script.timelines.len());
        for (index, timeline) in script.timelines.iter().enumerate() {
            self.enter(index);
            timelines.push(self.timeline(timeline));
            self.leave();
        }
        self.leave();

        self.enter("input-triggers");
        let mut input_triggers = Vec::with_capacity(script.input_triggers.len());
        for (index, trigger) in script.input_triggers.iter().enumerate() {
            self.enter(index);
            if let Some(built) = self.input_trigger(trigger) {
                input_triggers.push(built);
            }
            self.leave();
        }
        self.leave();

        self.enter("global-actions");
        let mut global_actions = Vec::with_capacity(script.global_actions.len());
        for (index, slot) in script.global_actions.iter().enumerate() {
            self.enter(index);
            match self.action_slot(slot) {
                Some(BuiltAction::Plain(ActionTiming::Start, action)) => {
                    global_actions.push(action)
                }
                Some(_) => self.error(
                    ErrorCode::ScriptGlobalActionTiming,
                    "global actions must use 'start' timing",
                ),
                None => {}
            }
            self.leave();
        }
        self.leave();

        Processor {
            input_triggers,
            timelines,
            global_actions,
        }
    }

    fn timeline(&mut self, timeline: &'s Timeline) -> TimelineRt {
        let scale = match &timeline.time_scale {
            Some(scale) => TimeScaleRt {
                sample_rate: scale.sample_rate,
                bpm: scale.bpm,
                bpb: scale.bpb,
            },
            None => TimeScaleRt::default(),
        };

        self.enter("lanes");
        let mut lanes = Vec::with_capacity(timeline.lanes.len());
        for (index, lane) in timeline.lanes.iter().enumerate() {
            self.enter(index);
            lanes.push(self.lane(lane, scale));
            self.leave();
        }
        self.leave();

        TimelineRt {
            loop_lock: timeline.loop_lock,
            lanes,
        }
    }

    fn lane(&mut self, lane: &'s Lane, scale: TimeScaleRt) -> LaneRt {
        self.enter("segments");
        let mut segments = Vec::new();
        for (index, slot) in lane.segments.iter().enumerate() {
            self.enter(index);
            self.segment_slot(slot, scale, &mut segments);
            self.leave();
        }
        self.leave();

        LaneRt::new(
            lane.auto_start,
            lane.looping,
            lane.repeat,
            lane.disable_ui,
            lane.start_trigger.clone(),
            lane.restart_trigger.clone(),
            lane.stop_trigger.clone(),
            segments,
        )
    }

    // ── Segments and segment-blocks ─────────────────────────────────────

    fn segment_slot(
        &mut self,
        slot: &'s Slot<Segment>,
        scale: TimeScaleRt,
        out: &mut Vec<SegmentRt>,
    ) {
        match slot {
            Slot::Ref(id) => {
                let Some(&index) = self.segments.get(id.as_str()) else {
                    self.enter("ref");
                    self.error(
                        ErrorCode::RefNotFound,
                        format!("could not find the referenced segment with id '{id}'"),
                    );
                    self.leave();
                    return;
                };
                if !self.visit(Kind::Segment, id) {
                    return;
                }
                let saved = self.enter_pool("segments", index);
                let script: &'s Script = self.script;
                self.segment(&script.pool.segments[index], scale, out);
                self.leave_pool(saved);
                self.unvisit();
            }
            Slot::Inline(segment) => self.segment(segment, scale, out),
        }
    }

    fn segment(&mut self, segment: &'s Segment, scale: TimeScaleRt, out: &mut Vec<SegmentRt>) {
        match &segment.body {
            SegmentBody::Block(name) => {
                self.enter("segment-block");
                self.segment_block(name, scale, out);
                self.leave();
            }
            SegmentBody::Timed { duration, actions } => {
                if let Some(built) = self.timed_segment(segment, duration, actions, scale) {
                    out.push(built);
                }
            }
        }
    }

    fn segment_block(&mut self, name: &'s str, scale: TimeScaleRt, out: &mut Vec<SegmentRt>) {
        let Some(&index) = self.blocks.get(name) else {
            self.error(
                ErrorCode::RefNotFound,
                format!("could not find the referenced segment-block with id '{name}'"),
            );
            return;
        };
        if !self.visit(Kind::SegmentBlock, name) {
            return;
        }

        let saved = self.enter_pool("segment-blocks", index);
        let script: &'s Script = self.script;
        let block = &script.pool.segment_blocks[index];
        // Each repetition expands to fresh runtime instances, so every use
        // keeps its own position and drift state.
        for _ in 0..block.repeat {
            self.enter("segments");
            for (segment_index, slot) in block.segments.iter().enumerate() {
                self.enter(segment_index);
                self.segment_slot(slot, scale, out);
                self.leave();
            }
            self.leave();
        }
        self.leave_pool(saved);
        self.unvisit();
    }

    fn timed_segment(
        &mut self,
        segment: &'s Segment,
        duration: &'s Duration,
        actions: &'s [Slot<Action>],
        scale: TimeScaleRt,
    ) -> Option<SegmentRt> {
        self.enter("duration");
        let duration = self.duration(duration, scale);
        self.leave();

        let mut start_actions = Vec::new();
        let mut end_actions = Vec::new();
        let mut glides = Vec::new();
        let mut gates = Vec::new();

        self.enter("actions");
        for (index, slot) in actions.iter().enumerate() {
            self.enter(index);
            match self.action_slot(slot) {
                Some(BuiltAction::Plain(ActionTiming::Start, action)) => {
                    start_actions.push(action)
                }
                Some(BuiltAction::Plain(_, action)) => end_actions.push(action),
                Some(BuiltAction::Glide(glide)) => glides.push(glide),
                Some(BuiltAction::Gate(gate)) => gates.push(gate),
                None => {}
            }
            self.leave();
        }
        self.leave();

        Some(SegmentRt::new(
            duration?,
            start_actions,
            end_actions,
            glides,
            gates,
            segment.disable_ui,
        ))
    }

    fn duration(&mut self, duration: &'s Duration, scale: TimeScaleRt) -> Option<DurationRt> {
        let spec = match duration {
            Duration::Samples(samples) => {
                self.enter("samples");
                let quantity = match samples {
                    NumberOr::Literal(n) => Some(Quantity::Literal(*n as f64)),
                    NumberOr::Value(slot) => self.value_slot(slot).map(Quantity::Value),
                };
                self.leave();
                DurationSpec::Samples(quantity?)
            }
            Duration::Millis(millis) => {
                self.enter("millis");
                let quantity = self.quantity(millis);
                self.leave();
                DurationSpec::Millis(quantity?)
            }
            Duration::Hz(hz) => {
                self.enter("hz");
                let quantity = self.quantity(hz);
                self.leave();
                DurationSpec::Hz(quantity?)
            }
            Duration::Beats { beats, bars } => {
                if scale.bpm.is_none() {
                    self.error(
                        ErrorCode::DurationBeatsButNoBpm,
                        "a beats duration needs a 'bpm' in the timeline time-scale",
                    );
                    return None;
                }
                if bars.is_some() && scale.bpb.is_none() {
                    self.error(
                        ErrorCode::DurationBarsButNoBpb,
                        "a bars duration needs a 'bpb' in the timeline time-scale",
                    );
                    return None;
                }
                self.enter("beats");
                let quantity = self.quantity(beats);
                self.leave();
                DurationSpec::Beats {
                    beats: quantity?,
                    bars: bars.unwrap_or(0),
                }
            }
        };
        Some(DurationRt::new(spec, scale))
    }

    fn quantity(&mut self, number: &'s NumberOr<f64>) -> Option<Quantity> {
        match number {
            NumberOr::Literal(n) => Some(Quantity::Literal(*n)),
            NumberOr::Value(slot) => self.value_slot(slot).map(Quantity::Value),
        }
    }

    // ── Actions ─────────────────────────────────────────────────────────

    fn action_slot(&mut self, slot: &'s Slot<Action>) -> Option<BuiltAction> {
        match slot {
            Slot::Ref(id) => {
                let Some(&index) = self.actions.get(id.as_str()) else {
                    self.enter("ref");
                    self.error(
                        ErrorCode::RefNotFound,
                        format!("could not find the referenced action with id '{id}'"),
                    );
                    self.leave();
                    return None;
                };
                if !self.visit(Kind::Action, id) {
                    return None;
                }
                let saved = self.enter_pool("actions", index);
                let script: &'s Script = self.script;
                let built = self.action(&script.pool.actions[index]);
                self.leave_pool(saved);
                self.unvisit();
                built
            }
            Slot::Inline(action) => self.action(action),
        }
    }

    fn action(&mut self, action: &'s Action) -> Option<BuiltAction> {
        let condition = match &action.condition {
            Some(slot) => {
                self.enter("if");
                let condition = self.if_slot(slot);
                self.leave();
                Some(condition?)
            }
            None => None,
        };

        match &action.body {
            ActionBody::Glide {
                start_value,
                end_value,
                ease_algorithm,
                ease_factor,
                target,
            } => {
                self.enter("start-value");
                let start = self.value_slot(start_value);
                self.leave();
                self.enter("end-value");
                let end = self.value_slot(end_value);
                self.leave();
                let target = match target {
                    GlideTarget::Output(slot) => {
                        self.enter("output");
                        let addr = self.output_slot(slot);
                        self.leave();
                        GlideTargetRt::Output(addr?)
                    }
                    GlideTarget::Variable(name) => GlideTargetRt::Variable(name.clone()),
                };
                Some(BuiltAction::Glide(GlideRt::new(
                    condition,
                    start?,
                    end?,
                    *ease_algorithm,
                    *ease_factor,
                    target,
                )))
            }
            ActionBody::Gate {
                output,
                gate_high_ratio,
            } => {
                self.enter("output");
                let addr = self.output_slot(output);
                self.leave();
                Some(BuiltAction::Gate(GateRt::new(
                    condition,
                    addr?,
                    *gate_high_ratio,
                )))
            }
            body => {
                let kind = self.plain_kind(body)?;
                Some(BuiltAction::Plain(
                    action.timing,
                    ActionRt { condition, kind },
                ))
            }
        }
    }

    fn plain_kind(&mut self, body: &'s ActionBody) -> Option<ActionKind> {
        match body {
            ActionBody::SetValue { output, value } => {
                self.enter("set-value");
                self.enter("output");
                let addr = self.output_slot(output);
                self.leave();
                self.enter("value");
                let value = self.value_slot(value);
                self.leave();
                self.leave();
                Some(ActionKind::SetValue {
                    output: addr?,
                    value: value?,
                })
            }
            ActionBody::SetVariable { name, value } => {
                self.enter("set-variable");
                self.enter("value");
                let value = self.value_slot(value);
                self.leave();
                self.leave();
                Some(ActionKind::SetVariable {
                    name: name.clone(),
                    value: value?,
                })
            }
            ActionBody::SetPolyphony { index, channels } => Some(ActionKind::SetPolyphony {
                port: (*index - 1) as usize,
                channels: *channels as usize,
            }),
            ActionBody::SetLabel { index, label } => Some(ActionKind::SetLabel {
                port: (*index - 1) as usize,
                label: label.clone(),
            }),
            ActionBody::Trigger(name) => Some(ActionKind::Trigger(name.clone())),
            ActionBody::Assert(assert) => {
                self.enter("assert");
                self.enter("expect");
                let expect = self.if_slot(&assert.expect);
                self.leave();
                self.leave();
                Some(ActionKind::Assert {
                    name: assert.name.clone(),
                    expect: expect?,
                    stop_on_fail: assert.stop_on_fail,
                })
            }
            _ => unreachable!("glide and gate bodies are handled by the caller"),
        }
    }

    // ── Values, calcs and conditions ────────────────────────────────────

    fn value_slot(&mut self, slot: &'s Slot<Value>) -> Option<ValueRt> {
        match slot {
            Slot::Ref(id) => {
                let Some(&index) = self.values.get(id.as_str()) else {
                    self.enter("ref");
                    self.error(
                        ErrorCode::RefNotFound,
                        format!("could not find the referenced value with id '{id}'"),
                    );
                    self.leave();
                    return None;
                };
                if !self.visit(Kind::Value, id) {
                    return None;
                }
                let saved = self.enter_pool("values", index);
                let script: &'s Script = self.script;
                let built = self.value(&script.pool.values[index]);
                self.leave_pool(saved);
                self.unvisit();
                built
            }
            Slot::Inline(value) => self.value(value),
        }
    }

    fn value(&mut self, value: &'s Value) -> Option<ValueRt> {
        let source = match &value.source {
            ValueSource::Voltage(volts) => Some(SourceRt::Voltage(*volts)),
            // The note format was validated at parse time.
            ValueSource::Note(note) => {
                Some(SourceRt::Voltage(notes::note_voltage(note).unwrap_or(0.0)))
            }
            ValueSource::Variable(name) => Some(SourceRt::Variable(name.clone())),
            ValueSource::Input(slot) => {
                self.enter("input");
                let addr = self.input_slot(slot);
                self.leave();
                addr.map(SourceRt::Input)
            }
            ValueSource::Output(slot) => {
                self.enter("output");
                let addr = self.output_slot(slot);
                self.leave();
                addr.map(SourceRt::Output)
            }
            ValueSource::Rand { lower, upper } => {
                self.enter("rand");
                self.enter("lower");
                let lower = self.value_slot(lower);
                self.leave();
                self.enter("upper");
                let upper = self.value_slot(upper);
                self.leave();
                self.leave();
                match (lower, upper) {
                    (Some(lower), Some(upper)) => Some(SourceRt::Rand {
                        lower: Box::new(lower),
                        upper: Box::new(upper),
                    }),
                    _ => None,
                }
            }
        };

        self.enter("calc");
        let mut calcs = Vec::with_capacity(value.calc.len());
        let mut calcs_ok = true;
        for (index, slot) in value.calc.iter().enumerate() {
            self.enter(index);
            match self.calc_slot(slot) {
                Some(calc) => calcs.push(calc),
                None => calcs_ok = false,
            }
            self.leave();
        }
        self.leave();

        if !calcs_ok {
            return None;
        }
        Some(ValueRt {
            source: source?,
            quantize: value.quantize,
            calcs,
        })
    }

    fn calc_slot(&mut self, slot: &'s Slot<Calc>) -> Option<CalcRt> {
        match slot {
            Slot::Ref(id) => {
                let Some(&index) = self.calcs.get(id.as_str()) else {
                    self.enter("ref");
                    self.error(
                        ErrorCode::RefNotFound,
                        format!("could not find the referenced calc with id '{id}'"),
                    );
                    self.leave();
                    return None;
                };
                if !self.visit(Kind::Calc, id) {
                    return None;
                }
                let saved = self.enter_pool("calcs", index);
                let script: &'s Script = self.script;
                let built = self.calc(&script.pool.calcs[index]);
                self.leave_pool(saved);
                self.unvisit();
                built
            }
            Slot::Inline(calc) => self.calc(calc),
        }
    }

    fn calc(&mut self, calc: &'s Calc) -> Option<CalcRt> {
        let operand = |builder: &mut Self, key: &str, slot: &'s Slot<Value>| {
            builder.enter(key);
            let value = builder.value_slot(slot);
            builder.leave();
            value
        };

        match &calc.op {
            CalcOp::Add(slot) => Some(CalcRt::Add(operand(self, "add", slot)?)),
            CalcOp::Sub(slot) => Some(CalcRt::Sub(operand(self, "sub", slot)?)),
            CalcOp::Mult(slot) => Some(CalcRt::Mult(operand(self, "mult", slot)?)),
            CalcOp::Div(slot) => Some(CalcRt::Div(operand(self, "div", slot)?)),
            CalcOp::Max(slot) => Some(CalcRt::Max(operand(self, "max", slot)?)),
            CalcOp::Min(slot) => Some(CalcRt::Min(operand(self, "min", slot)?)),
            CalcOp::Remain(slot) => Some(CalcRt::Remain(operand(self, "remain", slot)?)),
            CalcOp::Trunc => Some(CalcRt::Trunc),
            CalcOp::Frac => Some(CalcRt::Frac),
            CalcOp::Round(direction) => Some(CalcRt::Round(*direction)),
            CalcOp::Sign(direction) => Some(CalcRt::Sign(*direction)),
            CalcOp::Vtof => Some(CalcRt::Vtof),
            CalcOp::Quantize(tuning_id) => {
                let Some(&index) = self.tunings.get(tuning_id.as_str()) else {
                    self.enter("quantize");
                    self.error(
                        ErrorCode::CalcTuningNotFound,
                        format!("could not find the referenced tuning with id '{tuning_id}'"),
                    );
                    self.leave();
                    return None;
                };
                let notes = self.script.pool.tunings[index].notes.clone();
                Some(CalcRt::Quantize(TuningRt::new(notes)))
            }
        }
    }

    fn if_slot(&mut self, slot: &'s Slot<If>) -> Option<CondRt> {
        match slot {
            Slot::Ref(id) => {
                let Some(&index) = self.ifs.get(id.as_str()) else {
                    self.enter("ref");
                    self.error(
                        ErrorCode::RefNotFound,
                        format!("could not find the referenced if with id '{id}'"),
                    );
                    self.leave();
                    return None;
                };
                if !self.visit(Kind::If, id) {
                    return None;
                }
                let saved = self.enter_pool("ifs", index);
                let script: &'s Script = self.script;
                let built = self.condition(&script.pool.ifs[index]);
                self.leave_pool(saved);
                self.unvisit();
                built
            }
            Slot::Inline(condition) => self.condition(condition),
        }
    }

    fn condition(&mut self, condition: &'s If) -> Option<CondRt> {
        let op = match &condition.op {
            IfOp::Cmp { op, a, b, tolerance } => {
                self.enter(op.as_str());
                self.enter(0);
                let a = self.value_slot(a);
                self.leave();
                self.enter(1);
                let b = self.value_slot(b);
                self.leave();
                self.leave();
                CondOp::Cmp {
                    op: *op,
                    a: a?,
                    b: b?,
                    tolerance: tolerance.unwrap_or(0.0),
                }
            }
            IfOp::And(left, right) => {
                let (left, right) = self.condition_pair("and", left, right)?;
                CondOp::And(Box::new(left), Box::new(right))
            }
            IfOp::Or(left, right) => {
                let (left, right) = self.condition_pair("or", left, right)?;
                CondOp::Or(Box::new(left), Box::new(right))
            }
        };
        Some(CondRt { op })
    }

    fn condition_pair(
        &mut self,
        key: &str,
        left: &'s Slot<If>,
        right: &'s Slot<If>,
    ) -> Option<(CondRt, CondRt)> {
        self.enter(key);
        self.enter(0);
        let left = self.if_slot(left);
        self.leave();
        self.enter(1);
        let right = self.if_slot(right);
        self.leave();
        self.leave();
        Some((left?, right?))
    }

    // ── Ports and input triggers ────────────────────────────────────────

    fn input_slot(&mut self, slot: &'s Slot<Port>) -> Option<PortAddr> {
        match slot {
            Slot::Ref(id) => {
                let Some(&index) = self.inputs.get(id.as_str()) else {
                    self.error(
                        ErrorCode::RefNotFound,
                        format!("could not find the referenced input with id '{id}'"),
                    );
                    return None;
                };
                Some(port_addr(&self.script.pool.inputs[index]))
            }
            Slot::Inline(port) => Some(port_addr(port)),
        }
    }

    fn output_slot(&mut self, slot: &'s Slot<Port>) -> Option<PortAddr> {
        match slot {
            Slot::Ref(id) => {
                let Some(&index) = self.outputs.get(id.as_str()) else {
                    self.error(
                        ErrorCode::RefNotFound,
                        format!("could not find the referenced output with id '{id}'"),
                    );
                    return None;
                };
                Some(port_addr(&self.script.pool.outputs[index]))
            }
            Slot::Inline(port) => Some(port_addr(port)),
        }
    }

    fn input_trigger(&mut self, trigger: &'s InputTrigger) -> Option<InputTriggerRt> {
        self.enter("input");
        let addr = self.input_slot(&trigger.input);
        self.leave();
        Some(InputTriggerRt::new(trigger.id.clone(), addr?))
    }
}

/// Translate a 1-based script port reference to a 0-based host address.
fn port_addr(port: &Port) -> PortAddr {
    PortAddr {
        port: (port.index - 1) as usize,
        channel: port.channel.map_or(0, |channel| (channel - 1) as usize),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::parse_script;
    use serde_json::json;

    fn build(script: serde_json::Value) -> Result<Processor, Vec<ValidationError>> {
        let script = parse_script(&script.to_string()).expect("script should parse");
        build_processor(&script)
    }

    fn expect_error(errors: &[ValidationError], code: ErrorCode, location: &str) {
        assert!(
            errors.iter().any(|e| e.code == code && e.location == location),
            "expected {code} at {location}, got: {errors:?}"
        );
    }

    fn lane_json(segments: serde_json::Value) -> serde_json::Value {
        json!({
            "type": "timeseq-script",
            "version": "1.1.0",
            "timelines": [ { "lanes": [ { "segments": segments } ] } ]
        })
    }

    #[test]
    fn unknown_segment_ref_is_reported_at_the_use_site() {
        let errors = build(lane_json(json!([{ "ref": "missing" }]))).unwrap_err();
        expect_error(
            &errors,
            ErrorCode::RefNotFound,
            "/timelines/0/lanes/0/segments/0/ref",
        );
        assert!(errors[0].message.contains("'missing'"));
    }

    #[test]
    fn unknown_segment_block_is_reported() {
        let errors = build(lane_json(json!([{ "segment-block": "missing" }]))).unwrap_err();
        expect_error(
            &errors,
            ErrorCode::RefNotFound,
            "/timelines/0/lanes/0/segments/0/segment-block",
        );
    }

    #[test]
    fn nested_block_errors_point_into_the_pool() {
        let mut script = lane_json(json!([{ "segment-block": "block-1" }]));
        script["component-pool"] = json!({
            "segment-blocks": [
                { "id": "block-1", "segments": [ { "segment-block": "block-2" } ] },
                { "id": "block-2", "segments": [ { "segment-block": "block-3" } ] }
            ]
        });
        let errors = build(script).unwrap_err();
        expect_error(
            &errors,
            ErrorCode::RefNotFound,
            "/component-pool/segment-blocks/1/segments/0/segment-block",
        );
    }

    #[test]
    fn segment_block_cycles_are_rejected() {
        let mut script = lane_json(json!([{ "segment-block": "block-1" }]));
        script["component-pool"] = json!({
            "segment-blocks": [
                { "id": "block-1", "segments": [ { "segment-block": "block-2" } ] },
                { "id": "block-2", "segments": [ { "segment-block": "block-1" } ] }
            ]
        });
        let errors = build(script).unwrap_err();
        expect_error(
            &errors,
            ErrorCode::RefCircularFound,
            "/component-pool/segment-blocks/1/segments/0/segment-block",
        );
        assert!(errors[0].message.contains("'block-1'"));
    }

    #[test]
    fn value_calc_cycles_are_rejected() {
        let mut script = lane_json(json!([
            { "duration": { "samples": 1 }, "actions": [
                { "set-variable": { "name": "out", "value": { "ref": "value-1" } } }
            ] }
        ]));
        script["component-pool"] = json!({
            "values": [
                { "id": "value-1", "voltage": 1.0, "calc": [ { "ref": "calc-1" } ] },
                { "id": "value-2", "voltage": 1.0, "calc": [ { "ref": "calc-2" } ] }
            ],
            "calcs": [
                { "id": "calc-1", "sub": { "ref": "value-2" } },
                { "id": "calc-2", "sub": { "ref": "value-1" } }
            ]
        });
        let errors = build(script).unwrap_err();
        assert!(
            errors.iter().any(|e| e.code == ErrorCode::RefCircularFound),
            "expected a circular-reference error, got {errors:?}"
        );
    }

    #[test]
    fn segment_blocks_expand_with_repeats() {
        let mut script = lane_json(json!([{ "segment-block": "block-1" }]));
        script["component-pool"] = json!({
            "segments": [
                { "id": "segment-1", "duration": { "samples": 1 } },
                { "id": "segment-2", "duration": { "samples": 2 } }
            ],
            "segment-blocks": [
                { "id": "block-1", "repeat": 3,
                  "segments": [ { "ref": "segment-1" }, { "ref": "segment-2" } ] }
            ]
        });
        let processor = build(script).unwrap();
        assert_eq!(processor.timelines[0].lanes[0].segments.len(), 6);
    }

    #[test]
    fn beats_without_bpm_is_rejected() {
        let errors = build(lane_json(json!([{ "duration": { "beats": 1.0 } }]))).unwrap_err();
        expect_error(
            &errors,
            ErrorCode::DurationBeatsButNoBpm,
            "/timelines/0/lanes/0/segments/0/duration",
        );
    }

    #[test]
    fn bars_without_bpb_is_rejected() {
        let script = json!({
            "type": "timeseq-script",
            "version": "1.1.0",
            "timelines": [ { "time-scale": { "bpm": 120 }, "lanes": [ { "segments": [
                { "duration": { "beats": 1.0, "bars": 2 } }
            ] } ] } ]
        });
        let errors = build(script).unwrap_err();
        expect_error(
            &errors,
            ErrorCode::DurationBarsButNoBpb,
            "/timelines/0/lanes/0/segments/0/duration",
        );
    }

    #[test]
    fn missing_tuning_is_reported() {
        let mut script = lane_json(json!([
            { "duration": { "samples": 1 }, "actions": [
                { "set-variable": { "name": "out", "value":
                    { "voltage": 0.5, "calc": [ { "quantize": "missing" } ] } } }
            ] }
        ]));
        script["component-pool"] = json!({});
        let errors = build(script).unwrap_err();
        assert!(errors.iter().any(|e| e.code == ErrorCode::CalcTuningNotFound));
    }

    #[test]
    fn global_action_refs_must_use_start_timing() {
        let script = json!({
            "type": "timeseq-script",
            "version": "1.1.0",
            "global-actions": [ { "ref": "action-1" } ],
            "component-pool": {
                "actions": [ { "id": "action-1", "timing": "end", "trigger": "t" } ]
            }
        });
        let errors = build(script).unwrap_err();
        expect_error(
            &errors,
            ErrorCode::ScriptGlobalActionTiming,
            "/global-actions/0",
        );
    }

    #[test]
    fn input_trigger_refs_resolve_through_the_pool() {
        let script = json!({
            "type": "timeseq-script",
            "version": "1.1.0",
            "input-triggers": [ { "id": "go", "input": { "ref": "in-1" } } ],
            "component-pool": {
                "inputs": [ { "id": "in-1", "index": 4, "channel": 2 } ]
            }
        });
        let processor = build(script).unwrap();
        assert_eq!(processor.input_triggers.len(), 1);
        assert_eq!(processor.input_triggers[0].input, PortAddr { port: 3, channel: 1 });
    }

    #[test]
    fn unknown_input_ref_is_reported() {
        let script = json!({
            "type": "timeseq-script",
            "version": "1.1.0",
            "input-triggers": [ { "id": "go", "input": { "ref": "missing" } } ]
        });
        let errors = build(script).unwrap_err();
        expect_error(&errors, ErrorCode::RefNotFound, "/input-triggers/0/input");
    }
}
