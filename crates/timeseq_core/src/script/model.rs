//! Typed script IR.
//!
//! The loader turns the JSON document into these structures; the processor
//! builder then resolves references and flattens the result into a runtime
//! graph. The IR is immutable after load and kept around so the runtime can
//! be rebuilt from it (`reload_script`).

/// An inline definition, or a reference (by id) to a definition of the same
/// kind in the component pool.
#[derive(Clone, Debug, PartialEq)]
pub enum Slot<T> {
    Inline(T),
    Ref(String),
}

/// Root of a loaded script.
#[derive(Clone, Debug, PartialEq)]
pub struct Script {
    pub script_type: String,
    pub version: Version,
    pub timelines: Vec<Timeline>,
    pub global_actions: Vec<Slot<Action>>,
    pub input_triggers: Vec<InputTrigger>,
    pub pool: ComponentPool,
}

/// Supported script format versions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Version {
    V1_0_0,
    V1_1_0,
}

/// Reusable definitions, addressable by id. Ids are unique per kind only.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ComponentPool {
    pub segments: Vec<Segment>,
    pub segment_blocks: Vec<SegmentBlock>,
    pub actions: Vec<Action>,
    pub values: Vec<Value>,
    pub calcs: Vec<Calc>,
    pub ifs: Vec<If>,
    pub inputs: Vec<Port>,
    pub outputs: Vec<Port>,
    pub tunings: Vec<Tuning>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Timeline {
    pub time_scale: Option<TimeScale>,
    pub loop_lock: bool,
    pub lanes: Vec<Lane>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TimeScale {
    pub sample_rate: Option<u32>,
    pub bpm: Option<u32>,
    pub bpb: Option<u32>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Lane {
    pub auto_start: bool,
    pub looping: bool,
    pub repeat: u32,
    pub start_trigger: Option<String>,
    pub restart_trigger: Option<String>,
    pub stop_trigger: Option<String>,
    pub disable_ui: bool,
    pub segments: Vec<Slot<Segment>>,
}

/// A segment is either a timed list of actions or a reference to a
/// segment-block that expands in its place.
#[derive(Clone, Debug, PartialEq)]
pub struct Segment {
    pub id: Option<String>,
    pub disable_ui: bool,
    pub body: SegmentBody,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SegmentBody {
    Timed {
        duration: Duration,
        actions: Vec<Slot<Action>>,
    },
    Block(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct SegmentBlock {
    pub id: String,
    pub repeat: u32,
    pub segments: Vec<Slot<Segment>>,
}

/// A segment duration in one of the supported units. The numeric forms may
/// be given as a value expression instead of a literal, in which case the
/// duration is re-queried every time the segment starts.
#[derive(Clone, Debug, PartialEq)]
pub enum Duration {
    Samples(NumberOr<u64>),
    Millis(NumberOr<f64>),
    Hz(NumberOr<f64>),
    Beats {
        beats: NumberOr<f64>,
        bars: Option<u64>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub enum NumberOr<N> {
    Literal(N),
    Value(Box<Slot<Value>>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Action {
    pub id: Option<String>,
    pub timing: ActionTiming,
    pub condition: Option<Slot<If>>,
    pub body: ActionBody,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ActionTiming {
    Start,
    #[default]
    End,
    Glide,
    Gate,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ActionBody {
    SetValue {
        output: Slot<Port>,
        value: Slot<Value>,
    },
    SetVariable {
        name: String,
        value: Slot<Value>,
    },
    SetPolyphony {
        index: u32,
        channels: u32,
    },
    SetLabel {
        index: u32,
        label: String,
    },
    Trigger(String),
    Assert(Assert),
    Glide {
        start_value: Slot<Value>,
        end_value: Slot<Value>,
        ease_algorithm: EaseAlgorithm,
        ease_factor: f32,
        target: GlideTarget,
    },
    Gate {
        output: Slot<Port>,
        gate_high_ratio: Option<f32>,
    },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EaseAlgorithm {
    #[default]
    Pow,
    Sig,
}

#[derive(Clone, Debug, PartialEq)]
pub enum GlideTarget {
    Output(Slot<Port>),
    Variable(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Assert {
    pub name: String,
    pub expect: Slot<If>,
    pub stop_on_fail: bool,
}

/// A port reference: 1-based port index plus optional 1-based channel
/// (defaulting to the first channel).
#[derive(Clone, Debug, PartialEq)]
pub struct Port {
    pub id: Option<String>,
    pub index: u32,
    pub channel: Option<u32>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Value {
    pub id: Option<String>,
    pub source: ValueSource,
    pub quantize: bool,
    pub calc: Vec<Slot<Calc>>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ValueSource {
    Voltage(f32),
    /// Kept as the raw note string; converted when the runtime is built.
    Note(String),
    Variable(String),
    Input(Slot<Port>),
    Output(Slot<Port>),
    Rand {
        lower: Box<Slot<Value>>,
        upper: Box<Slot<Value>>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Calc {
    pub id: Option<String>,
    pub op: CalcOp,
}

#[derive(Clone, Debug, PartialEq)]
pub enum CalcOp {
    Add(Slot<Value>),
    Sub(Slot<Value>),
    Mult(Slot<Value>),
    Div(Slot<Value>),
    Max(Slot<Value>),
    Min(Slot<Value>),
    Remain(Slot<Value>),
    Trunc,
    Frac,
    Round(RoundDirection),
    Sign(SignDirection),
    /// Quantize into the tuning with the given id.
    Quantize(String),
    Vtof,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoundDirection {
    Up,
    Down,
    Near,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignDirection {
    Pos,
    Neg,
}

#[derive(Clone, Debug, PartialEq)]
pub struct If {
    pub id: Option<String>,
    pub op: IfOp,
}

#[derive(Clone, Debug, PartialEq)]
pub enum IfOp {
    Cmp {
        op: CmpOp,
        a: Slot<Value>,
        b: Slot<Value>,
        tolerance: Option<f32>,
    },
    And(Box<Slot<If>>, Box<Slot<If>>),
    Or(Box<Slot<If>>, Box<Slot<If>>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl CmpOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            CmpOp::Eq => "eq",
            CmpOp::Ne => "ne",
            CmpOp::Lt => "lt",
            CmpOp::Lte => "lte",
            CmpOp::Gt => "gt",
            CmpOp::Gte => "gte",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct InputTrigger {
    /// Name of the trigger this input raises.
    pub id: String,
    pub input: Slot<Port>,
}

/// Ordered in-octave voltage targets in `[0, 1)` used by the `quantize`
/// calc operation.
#[derive(Clone, Debug, PartialEq)]
pub struct Tuning {
    pub id: String,
    pub notes: Vec<f32>,
}
