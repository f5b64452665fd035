//! JSON document to script IR.
//!
//! The walker validates as it goes and keeps going after an error, so one
//! load reports everything that is wrong with the document. Each error
//! carries the JSON pointer of the element it refers to.

use serde_json::{Map, Value as Json};

use super::model::*;
use super::notes;
use super::validate::{ErrorCode, ValidationError};

type JsonObject = Map<String, Json>;

/// Parse and validate a script document. Returns the typed IR, or every
/// problem found in the document.
pub fn parse_script(text: &str) -> Result<Script, Vec<ValidationError>> {
    let root: Json = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(err) => {
            return Err(vec![ValidationError::new(
                "",
                ErrorCode::JsonSyntax,
                format!("script is not valid JSON: {err}"),
            )]);
        }
    };

    let mut parser = Parser::default();
    let script = parser.script(&root);
    match script {
        Some(script) if parser.errors.is_empty() => Ok(script),
        _ => Err(parser.errors),
    }
}

#[derive(Default)]
struct Parser {
    errors: Vec<ValidationError>,
    path: Vec<String>,
    version: Option<Version>,
}

const VALUE_SOURCE_KEYS: [&str; 6] = ["voltage", "note", "variable", "input", "output", "rand"];
const ACTION_PAYLOAD_KEYS: [&str; 6] = [
    "set-value",
    "set-variable",
    "set-polyphony",
    "set-label",
    "trigger",
    "assert",
];
const CMP_KEYS: [(&str, CmpOp); 6] = [
    ("eq", CmpOp::Eq),
    ("ne", CmpOp::Ne),
    ("lt", CmpOp::Lt),
    ("lte", CmpOp::Lte),
    ("gt", CmpOp::Gt),
    ("gte", CmpOp::Gte),
];

/// Calc operations and whether they are only available from version 1.1.0.
const CALC_KEYS: [(&str, bool); 13] = [
    ("add", false),
    ("sub", false),
    ("mult", false),
    ("div", false),
    ("max", true),
    ("min", true),
    ("remain", true),
    ("trunc", true),
    ("frac", true),
    ("round", true),
    ("sign", true),
    ("quantize", true),
    ("vtof", true),
];

/// Which side of the host boundary a port reference addresses; selects the
/// error codes and the valid index range.
#[derive(Clone, Copy, PartialEq)]
enum PortKind {
    Input,
    Output,
}

impl Parser {
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

    fn object<'a>(&mut self, value: &'a Json) -> Option<&'a JsonObject> {
        match value.as_object() {
            Some(obj) => Some(obj),
            None => {
                self.error(ErrorCode::FieldType, "expected an object");
                None
            }
        }
    }

    fn check_fields(&mut self, obj: &JsonObject, allowed: &[&str]) {
        for key in obj.keys() {
            if !allowed.contains(&key.as_str()) {
                self.error(ErrorCode::FieldUnknown, format!("unknown field '{key}'"));
            }
        }
    }

    fn string_field(&mut self, obj: &JsonObject, key: &str) -> Option<String> {
        let value = obj.get(key)?;
        match value.as_str() {
            Some(s) => Some(s.to_string()),
            None => {
                self.enter(key);
                self.error(ErrorCode::FieldType, format!("'{key}' must be a string"));
                self.leave();
                None
            }
        }
    }

    fn bool_field(&mut self, obj: &JsonObject, key: &str, default: bool) -> bool {
        let Some(value) = obj.get(key) else {
            return default;
        };
        match value.as_bool() {
            Some(b) => b,
            None => {
                self.enter(key);
                self.error(ErrorCode::FieldType, format!("'{key}' must be a boolean"));
                self.leave();
                default
            }
        }
    }

    fn version_at_least(&self, version: Version) -> bool {
        self.version.is_some_and(|v| v >= version)
    }

    // ── Script root ─────────────────────────────────────────────────────

    fn script(&mut self, root: &Json) -> Option<Script> {
        let Some(obj) = root.as_object() else {
            self.error(ErrorCode::JsonRootObject, "the script root must be an object");
            return None;
        };

        self.check_fields(
            obj,
            &[
                "type",
                "version",
                "timelines",
                "global-actions",
                "input-triggers",
                "component-pool",
            ],
        );

        let script_type = match self.string_field(obj, "type") {
            Some(t) => t,
            None => {
                self.error(ErrorCode::ScriptTypeMissing, "the script 'type' is missing");
                String::new()
            }
        };

        let version = match self.string_field(obj, "version").as_deref() {
            Some("1.0.0") => Version::V1_0_0,
            Some("1.1.0") => Version::V1_1_0,
            Some(other) => {
                self.enter("version");
                self.error(
                    ErrorCode::ScriptVersionUnsupported,
                    format!("unsupported script version '{other}'"),
                );
                self.leave();
                Version::V1_0_0
            }
            None => {
                self.error(
                    ErrorCode::ScriptVersionMissing,
                    "the script 'version' is missing",
                );
                Version::V1_0_0
            }
        };
        self.version = Some(version);

        let timelines = self.list(obj, "timelines", Parser::timeline);
        let global_actions = self.list(obj, "global-actions", Parser::global_action);
        let input_triggers = self.list(obj, "input-triggers", Parser::input_trigger);

        let pool = match obj.get("component-pool") {
            Some(value) => {
                self.enter("component-pool");
                let pool = self.component_pool(value);
                self.leave();
                pool
            }
            None => ComponentPool::default(),
        };

        Some(Script {
            script_type,
            version,
            timelines,
            global_actions,
            input_triggers,
            pool,
        })
    }

    /// Parse an optional array field, one element at a time.
    fn list<T>(
        &mut self,
        obj: &JsonObject,
        key: &str,
        mut each: impl FnMut(&mut Self, &Json) -> Option<T>,
    ) -> Vec<T> {
        let Some(value) = obj.get(key) else {
            return Vec::new();
        };
        self.enter(key);
        let items = self.array(value, &mut each);
        self.leave();
        items
    }

    fn array<T>(
        &mut self,
        value: &Json,
        each: &mut impl FnMut(&mut Self, &Json) -> Option<T>,
    ) -> Vec<T> {
        let Some(array) = value.as_array() else {
            self.error(ErrorCode::FieldType, "expected an array");
            return Vec::new();
        };
        let mut items = Vec::with_capacity(array.len());
        for (index, item) in array.iter().enumerate() {
            self.enter(index);
            if let Some(parsed) = each(self, item) {
                items.push(parsed);
            }
            self.leave();
        }
        items
    }

    // ── Timelines and lanes ─────────────────────────────────────────────

    fn timeline(&mut self, value: &Json) -> Option<Timeline> {
        let obj = self.object(value)?;
        self.check_fields(obj, &["time-scale", "loop-lock", "lanes"]);

        let time_scale = match obj.get("time-scale") {
            Some(value) => {
                self.enter("time-scale");
                let scale = self.time_scale(value);
                self.leave();
                scale
            }
            None => None,
        };

        Some(Timeline {
            time_scale,
            loop_lock: self.bool_field(obj, "loop-lock", false),
            lanes: self.list(obj, "lanes", Parser::lane),
        })
    }

    fn time_scale(&mut self, value: &Json) -> Option<TimeScale> {
        let obj = self.object(value)?;
        self.check_fields(obj, &["sample-rate", "bpm", "bpb"]);
        Some(TimeScale {
            sample_rate: self.positive_u32(obj, "sample-rate"),
            bpm: self.positive_u32(obj, "bpm"),
            bpb: self.positive_u32(obj, "bpb"),
        })
    }

    fn positive_u32(&mut self, obj: &JsonObject, key: &str) -> Option<u32> {
        let value = obj.get(key)?;
        self.enter(key);
        let parsed = match value.as_u64() {
            Some(n) if n >= 1 && n <= u32::MAX as u64 => Some(n as u32),
            _ => {
                self.error(
                    ErrorCode::TimeScaleNumber,
                    format!("'{key}' must be a positive integer"),
                );
                None
            }
        };
        self.leave();
        parsed
    }

    fn lane(&mut self, value: &Json) -> Option<Lane> {
        let obj = self.object(value)?;
        self.check_fields(
            obj,
            &[
                "auto-start",
                "loop",
                "repeat",
                "start-trigger",
                "restart-trigger",
                "stop-trigger",
                "disable-ui",
                "segments",
            ],
        );

        let repeat = match obj.get("repeat") {
            Some(value) => {
                self.enter("repeat");
                let repeat = match value.as_u64() {
                    Some(n) if n <= u32::MAX as u64 => n as u32,
                    _ => {
                        self.error(
                            ErrorCode::LaneRepeatNumber,
                            "'repeat' must be a non-negative integer",
                        );
                        0
                    }
                };
                self.leave();
                repeat
            }
            None => 0,
        };

        Some(Lane {
            auto_start: self.bool_field(obj, "auto-start", true),
            looping: self.bool_field(obj, "loop", false),
            repeat,
            start_trigger: self.string_field(obj, "start-trigger"),
            restart_trigger: self.string_field(obj, "restart-trigger"),
            stop_trigger: self.string_field(obj, "stop-trigger"),
            disable_ui: self.bool_field(obj, "disable-ui", false),
            segments: self.list(obj, "segments", Parser::segment_slot),
        })
    }

    // ── Segments ────────────────────────────────────────────────────────

    fn segment_slot(&mut self, value: &Json) -> Option<Slot<Segment>> {
        let obj = self.object(value)?;
        if let Some(reference) = self.string_field(obj, "ref") {
            if obj.keys().any(|k| k != "ref") {
                self.error(
                    ErrorCode::RefInlineConflict,
                    "a segment reference can not carry inline fields",
                );
            }
            return Some(Slot::Ref(reference));
        }
        self.segment(value, false).map(Slot::Inline)
    }

    fn segment(&mut self, value: &Json, require_id: bool) -> Option<Segment> {
        let obj = self.object(value)?;
        self.check_fields(
            obj,
            &["id", "segment-block", "duration", "actions", "disable-ui"],
        );

        let id = self.pool_id(obj, require_id);
        let disable_ui = self.bool_field(obj, "disable-ui", false);

        if let Some(block) = self.string_field(obj, "segment-block") {
            if obj.contains_key("duration") || obj.contains_key("actions") {
                self.error(
                    ErrorCode::RefInlineConflict,
                    "a segment-block segment can not also carry a duration or actions",
                );
            }
            return Some(Segment {
                id,
                disable_ui,
                body: SegmentBody::Block(block),
            });
        }

        let duration = match obj.get("duration") {
            Some(value) => {
                self.enter("duration");
                let duration = self.duration(value);
                self.leave();
                duration?
            }
            None => {
                self.error(ErrorCode::DurationMissing, "the segment has no duration");
                return None;
            }
        };

        Some(Segment {
            id,
            disable_ui,
            body: SegmentBody::Timed {
                duration,
                actions: self.list(obj, "actions", Parser::action_slot),
            },
        })
    }

    fn duration(&mut self, value: &Json) -> Option<Duration> {
        let obj = self.object(value)?;
        self.check_fields(obj, &["samples", "millis", "beats", "bars", "hz"]);

        let primaries: Vec<&str> = ["samples", "millis", "beats", "hz"]
            .into_iter()
            .filter(|key| obj.contains_key(*key))
            .collect();
        match primaries.len() {
            0 => {
                self.error(
                    ErrorCode::DurationMissing,
                    "a duration needs one of 'samples', 'millis', 'beats' or 'hz'",
                );
                return None;
            }
            1 => {}
            _ => {
                self.error(
                    ErrorCode::DurationMultiple,
                    "a duration can only use one unit",
                );
                return None;
            }
        }

        if obj.contains_key("bars") && primaries[0] != "beats" {
            self.error(
                ErrorCode::DurationBarsButNoBeats,
                "'bars' can only be combined with 'beats'",
            );
        }

        match primaries[0] {
            "samples" => {
                self.enter("samples");
                let samples = match obj.get("samples").unwrap() {
                    Json::Number(n) => match n.as_u64() {
                        Some(n) if n >= 1 => Some(NumberOr::Literal(n)),
                        _ => {
                            self.error(
                                ErrorCode::DurationSamplesNumber,
                                "'samples' must be a positive integer",
                            );
                            None
                        }
                    },
                    value => self
                        .value_slot(value)
                        .map(|slot| NumberOr::Value(Box::new(slot))),
                };
                self.leave();
                Some(Duration::Samples(samples?))
            }
            "millis" => {
                self.enter("millis");
                let millis = self.positive_number_or_value(
                    obj.get("millis").unwrap(),
                    ErrorCode::DurationMillisNumber,
                    "'millis' must be a positive number",
                );
                self.leave();
                Some(Duration::Millis(millis?))
            }
            "hz" => {
                self.enter("hz");
                let hz = self.positive_number_or_value(
                    obj.get("hz").unwrap(),
                    ErrorCode::DurationHzNumber,
                    "'hz' must be a positive number",
                );
                self.leave();
                Some(Duration::Hz(hz?))
            }
            _ => {
                self.enter("beats");
                let beats = match obj.get("beats").unwrap() {
                    Json::Number(n) => match n.as_f64() {
                        Some(b) if b >= 0.0 => Some(NumberOr::Literal(b)),
                        _ => {
                            self.error(
                                ErrorCode::DurationBeatsNumber,
                                "'beats' must be a non-negative number",
                            );
                            None
                        }
                    },
                    value => self
                        .value_slot(value)
                        .map(|slot| NumberOr::Value(Box::new(slot))),
                };
                self.leave();

                let bars = match obj.get("bars") {
                    Some(value) => {
                        self.enter("bars");
                        let bars = match value.as_u64() {
                            Some(n) => Some(n),
                            None => {
                                self.error(
                                    ErrorCode::DurationBarsNumber,
                                    "'bars' must be a non-negative integer",
                                );
                                None
                            }
                        };
                        self.leave();
                        bars
                    }
                    None => None,
                };

                Some(Duration::Beats {
                    beats: beats?,
                    bars,
                })
            }
        }
    }

    fn positive_number_or_value(
        &mut self,
        value: &Json,
        code: ErrorCode,
        message: &str,
    ) -> Option<NumberOr<f64>> {
        match value {
            Json::Number(n) => match n.as_f64() {
                Some(f) if f > 0.0 => Some(NumberOr::Literal(f)),
                _ => {
                    self.error(code, message);
                    None
                }
            },
            value => self
                .value_slot(value)
                .map(|slot| NumberOr::Value(Box::new(slot))),
        }
    }

    // ── Actions ─────────────────────────────────────────────────────────

    fn global_action(&mut self, value: &Json) -> Option<Slot<Action>> {
        let slot = self.action_slot(value)?;
        if let Slot::Inline(action) = &slot {
            if action.timing != ActionTiming::Start {
                self.error(
                    ErrorCode::ScriptGlobalActionTiming,
                    "global actions must use 'start' timing",
                );
                return None;
            }
        }
        Some(slot)
    }

    fn action_slot(&mut self, value: &Json) -> Option<Slot<Action>> {
        let obj = self.object(value)?;
        if let Some(reference) = self.string_field(obj, "ref") {
            if obj.keys().any(|k| k != "ref") {
                self.error(
                    ErrorCode::RefInlineConflict,
                    "an action reference can not carry inline fields",
                );
            }
            return Some(Slot::Ref(reference));
        }
        self.action(value, false).map(Slot::Inline)
    }

    fn action(&mut self, value: &Json, require_id: bool) -> Option<Action> {
        let obj = self.object(value)?;

        let id = self.pool_id(obj, require_id);

        let timing = match self.string_field(obj, "timing").as_deref() {
            Some("start") => ActionTiming::Start,
            Some("end") => ActionTiming::End,
            Some("glide") => ActionTiming::Glide,
            Some("gate") => ActionTiming::Gate,
            Some(other) => {
                self.enter("timing");
                self.error(
                    ErrorCode::ActionTimingEnum,
                    format!("unknown action timing '{other}'"),
                );
                self.leave();
                return None;
            }
            None => ActionTiming::End,
        };

        let condition = match obj.get("if") {
            Some(value) => {
                self.enter("if");
                let condition = self.if_slot(value);
                self.leave();
                Some(condition?)
            }
            None => None,
        };

        let body = match timing {
            ActionTiming::Glide => self.glide_body(obj)?,
            ActionTiming::Gate => self.gate_body(obj)?,
            _ => self.plain_body(obj)?,
        };

        Some(Action {
            id,
            timing,
            condition,
            body,
        })
    }

    fn glide_body(&mut self, obj: &JsonObject) -> Option<ActionBody> {
        self.check_fields(
            obj,
            &[
                "id",
                "timing",
                "if",
                "start-value",
                "end-value",
                "ease-algorithm",
                "ease-factor",
                "output",
                "variable",
            ],
        );

        let start_value = self.required_value(obj, "start-value")?;
        let end_value = self.required_value(obj, "end-value")?;

        let ease_algorithm = match self.string_field(obj, "ease-algorithm").as_deref() {
            Some("pow") => EaseAlgorithm::Pow,
            Some("sig") => EaseAlgorithm::Sig,
            Some(other) => {
                self.enter("ease-algorithm");
                self.error(
                    ErrorCode::ActionEaseAlgorithm,
                    format!("unknown ease algorithm '{other}'"),
                );
                self.leave();
                EaseAlgorithm::Pow
            }
            None => EaseAlgorithm::Pow,
        };

        let ease_factor = match obj.get("ease-factor") {
            Some(value) => {
                self.enter("ease-factor");
                let factor = match value.as_f64() {
                    Some(f) => f as f32,
                    None => {
                        self.error(
                            ErrorCode::ActionEaseFactorFloat,
                            "'ease-factor' must be a number",
                        );
                        0.0
                    }
                };
                self.leave();
                factor
            }
            None => 0.0,
        };

        let target = match (obj.get("output"), obj.get("variable")) {
            (Some(output), None) => {
                self.enter("output");
                let port = self.port_slot(output, PortKind::Output);
                self.leave();
                GlideTarget::Output(port?)
            }
            (None, Some(variable)) => match variable.as_str() {
                Some(name) => GlideTarget::Variable(name.to_string()),
                None => {
                    self.enter("variable");
                    self.error(ErrorCode::FieldType, "'variable' must be a string");
                    self.leave();
                    return None;
                }
            },
            _ => {
                self.error(
                    ErrorCode::ActionGlideTarget,
                    "a glide action needs either an 'output' or a 'variable' target",
                );
                return None;
            }
        };

        Some(ActionBody::Glide {
            start_value,
            end_value,
            ease_algorithm,
            ease_factor,
            target,
        })
    }

    fn gate_body(&mut self, obj: &JsonObject) -> Option<ActionBody> {
        self.check_fields(obj, &["id", "timing", "if", "output", "gate-high-ratio"]);

        let output = match obj.get("output") {
            Some(value) => {
                self.enter("output");
                let port = self.port_slot(value, PortKind::Output);
                self.leave();
                port?
            }
            None => {
                self.error(
                    ErrorCode::ActionGateOutput,
                    "a gate action needs an 'output'",
                );
                return None;
            }
        };

        let gate_high_ratio = match obj.get("gate-high-ratio") {
            Some(value) => {
                self.enter("gate-high-ratio");
                let ratio = match value.as_f64() {
                    Some(r) if (0.0..=1.0).contains(&r) => Some(r as f32),
                    _ => {
                        self.error(
                            ErrorCode::ActionGateHighRatio,
                            "'gate-high-ratio' must be a number between 0 and 1",
                        );
                        None
                    }
                };
                self.leave();
                ratio
            }
            None => None,
        };

        Some(ActionBody::Gate {
            output,
            gate_high_ratio,
        })
    }

    fn plain_body(&mut self, obj: &JsonObject) -> Option<ActionBody> {
        let mut allowed = vec!["id", "timing", "if"];
        allowed.extend(ACTION_PAYLOAD_KEYS);
        self.check_fields(obj, &allowed);

        let present: Vec<&str> = ACTION_PAYLOAD_KEYS
            .into_iter()
            .filter(|key| obj.contains_key(*key))
            .collect();
        match present.len() {
            0 => {
                self.error(
                    ErrorCode::ActionMissingPayload,
                    "the action does not specify what to do",
                );
                return None;
            }
            1 => {}
            _ => {
                self.error(
                    ErrorCode::ActionMultiplePayloads,
                    "the action specifies more than one operation",
                );
                return None;
            }
        }

        let key = present[0];
        let value = obj.get(key).unwrap();
        self.enter(key);
        let body = match key {
            "set-value" => self.set_value(value),
            "set-variable" => self.set_variable(value),
            "set-polyphony" => self.set_polyphony(value),
            "set-label" => self.set_label(value),
            "trigger" => match value.as_str() {
                Some(name) => Some(ActionBody::Trigger(name.to_string())),
                None => {
                    self.error(ErrorCode::ActionTriggerString, "'trigger' must be a string");
                    None
                }
            },
            _ => self.assert(value),
        };
        self.leave();
        body
    }

    fn set_value(&mut self, value: &Json) -> Option<ActionBody> {
        let obj = self.object(value)?;
        self.check_fields(obj, &["output", "value"]);

        let output = match obj.get("output") {
            Some(value) => {
                self.enter("output");
                let port = self.port_slot(value, PortKind::Output);
                self.leave();
                port?
            }
            None => {
                self.error(ErrorCode::OutputIndexNumber, "'output' is missing");
                return None;
            }
        };

        Some(ActionBody::SetValue {
            output,
            value: self.required_value(obj, "value")?,
        })
    }

    fn set_variable(&mut self, value: &Json) -> Option<ActionBody> {
        let obj = self.object(value)?;
        self.check_fields(obj, &["name", "value"]);

        let name = match self.string_field(obj, "name") {
            Some(name) if !name.is_empty() => name,
            _ => {
                self.error(
                    ErrorCode::ActionNameString,
                    "'name' must be a non-empty string",
                );
                return None;
            }
        };

        Some(ActionBody::SetVariable {
            name,
            value: self.required_value(obj, "value")?,
        })
    }

    fn set_polyphony(&mut self, value: &Json) -> Option<ActionBody> {
        let obj = self.object(value)?;
        self.check_fields(obj, &["index", "channels"]);

        let index = self.port_index(obj, PortKind::Output)?;
        let channels = match obj.get("channels").and_then(Json::as_u64) {
            Some(n) if (1..=crate::PORT_MAX_CHANNELS as u64).contains(&n) => n as u32,
            _ => {
                self.error(
                    ErrorCode::ActionChannelsNumber,
                    format!(
                        "'channels' must be an integer between 1 and {}",
                        crate::PORT_MAX_CHANNELS
                    ),
                );
                return None;
            }
        };

        Some(ActionBody::SetPolyphony { index, channels })
    }

    fn set_label(&mut self, value: &Json) -> Option<ActionBody> {
        let obj = self.object(value)?;
        self.check_fields(obj, &["index", "label"]);

        let index = self.port_index(obj, PortKind::Output)?;
        let label = match self.string_field(obj, "label") {
            Some(label) => label,
            None => {
                self.error(ErrorCode::ActionLabelString, "'label' must be a string");
                return None;
            }
        };

        Some(ActionBody::SetLabel { index, label })
    }

    fn assert(&mut self, value: &Json) -> Option<ActionBody> {
        let obj = self.object(value)?;
        self.check_fields(obj, &["name", "expect", "stop-on-fail"]);

        let name = match self.string_field(obj, "name") {
            Some(name) => name,
            None => {
                self.error(ErrorCode::AssertNameMissing, "the assert has no name");
                return None;
            }
        };

        let expect = match obj.get("expect") {
            Some(value) => {
                self.enter("expect");
                let expect = self.if_slot(value);
                self.leave();
                expect?
            }
            None => {
                self.error(ErrorCode::AssertExpectMissing, "the assert has no 'expect'");
                return None;
            }
        };

        Some(ActionBody::Assert(Assert {
            name,
            expect,
            stop_on_fail: self.bool_field(obj, "stop-on-fail", true),
        }))
    }

    fn required_value(&mut self, obj: &JsonObject, key: &str) -> Option<Slot<Value>> {
        match obj.get(key) {
            Some(value) => {
                self.enter(key);
                let slot = self.value_slot(value);
                self.leave();
                slot
            }
            None => {
                self.error(ErrorCode::ValueNoSource, format!("'{key}' is missing"));
                None
            }
        }
    }

    // ── Values and calcs ────────────────────────────────────────────────

    fn value_slot(&mut self, value: &Json) -> Option<Slot<Value>> {
        if let Json::Number(n) = value {
            // Bare numbers are shorthand for a voltage value.
            return Some(Slot::Inline(Value {
                id: None,
                source: ValueSource::Voltage(n.as_f64().unwrap_or(0.0) as f32),
                quantize: false,
                calc: Vec::new(),
            }));
        }

        let obj = self.object(value)?;
        if let Some(reference) = self.string_field(obj, "ref") {
            if obj.keys().any(|k| k != "ref") {
                self.error(
                    ErrorCode::RefInlineConflict,
                    "a value reference can not carry inline fields",
                );
            }
            return Some(Slot::Ref(reference));
        }
        self.value(value, false).map(Slot::Inline)
    }

    fn value(&mut self, value: &Json, require_id: bool) -> Option<Value> {
        let obj = self.object(value)?;
        let mut allowed = vec!["id", "quantize", "calc"];
        allowed.extend(VALUE_SOURCE_KEYS);
        self.check_fields(obj, &allowed);

        let id = self.pool_id(obj, require_id);

        let present: Vec<&str> = VALUE_SOURCE_KEYS
            .into_iter()
            .filter(|key| obj.contains_key(*key))
            .collect();
        match present.len() {
            0 => {
                self.error(ErrorCode::ValueNoSource, "the value has no source");
                return None;
            }
            1 => {}
            _ => {
                self.error(
                    ErrorCode::ValueMultipleSources,
                    "the value has more than one source",
                );
                return None;
            }
        }

        let key = present[0];
        let source_value = obj.get(key).unwrap();
        self.enter(key);
        let source = match key {
            "voltage" => match source_value.as_f64() {
                Some(v) => Some(ValueSource::Voltage(v as f32)),
                None => {
                    self.error(ErrorCode::ValueVoltageFloat, "'voltage' must be a number");
                    None
                }
            },
            "note" => match source_value.as_str() {
                Some(note) if notes::note_voltage(note).is_some() => {
                    Some(ValueSource::Note(note.to_string()))
                }
                _ => {
                    self.error(
                        ErrorCode::ValueNoteFormat,
                        "a note is a letter, an octave digit and an optional '+' or '-'",
                    );
                    None
                }
            },
            "variable" => match source_value.as_str() {
                Some(name) if !name.is_empty() => Some(ValueSource::Variable(name.to_string())),
                _ => {
                    self.error(
                        ErrorCode::ValueVariableString,
                        "'variable' must be a non-empty string",
                    );
                    None
                }
            },
            "input" => self
                .port_slot(source_value, PortKind::Input)
                .map(ValueSource::Input),
            "output" => self
                .port_slot(source_value, PortKind::Output)
                .map(ValueSource::Output),
            _ => self.rand(source_value),
        };
        self.leave();
        let source = source?;

        let quantize = match obj.get("quantize") {
            Some(value) => match value.as_bool() {
                Some(q) => q,
                None => {
                    self.enter("quantize");
                    self.error(ErrorCode::ValueQuantizeBool, "'quantize' must be a boolean");
                    self.leave();
                    false
                }
            },
            None => false,
        };

        Some(Value {
            id,
            source,
            quantize,
            calc: self.list(obj, "calc", Parser::calc_slot),
        })
    }

    fn rand(&mut self, value: &Json) -> Option<ValueSource> {
        let obj = self.object(value)?;
        self.check_fields(obj, &["lower", "upper"]);

        let (Some(lower), Some(upper)) = (obj.get("lower"), obj.get("upper")) else {
            self.error(
                ErrorCode::ValueRandBounds,
                "'rand' needs both a 'lower' and an 'upper' bound",
            );
            return None;
        };

        self.enter("lower");
        let lower = self.value_slot(lower);
        self.leave();
        self.enter("upper");
        let upper = self.value_slot(upper);
        self.leave();

        Some(ValueSource::Rand {
            lower: Box::new(lower?),
            upper: Box::new(upper?),
        })
    }

    fn calc_slot(&mut self, value: &Json) -> Option<Slot<Calc>> {
        let obj = self.object(value)?;
        if let Some(reference) = self.string_field(obj, "ref") {
            if obj.keys().any(|k| k != "ref") {
                self.error(
                    ErrorCode::RefInlineConflict,
                    "a calc reference can not carry inline fields",
                );
            }
            return Some(Slot::Ref(reference));
        }
        self.calc(value, false).map(Slot::Inline)
    }

    fn calc(&mut self, value: &Json, require_id: bool) -> Option<Calc> {
        let obj = self.object(value)?;
        let mut allowed = vec!["id"];
        allowed.extend(CALC_KEYS.iter().map(|(key, _)| *key));
        self.check_fields(obj, &allowed);

        let id = self.pool_id(obj, require_id);

        let present: Vec<(&str, bool)> = CALC_KEYS
            .into_iter()
            .filter(|(key, _)| obj.contains_key(*key))
            .collect();
        match present.len() {
            0 => {
                self.error(ErrorCode::CalcUnknown, "the calc has no known operation");
                return None;
            }
            1 => {}
            _ => {
                self.error(
                    ErrorCode::CalcMultipleOperations,
                    "the calc has more than one operation",
                );
                return None;
            }
        }

        let (key, gated) = present[0];
        if gated && !self.version_at_least(Version::V1_1_0) {
            self.enter(key);
            self.error(
                ErrorCode::ScriptVersionFeature,
                format!("the '{key}' operation requires script version 1.1.0"),
            );
            self.leave();
            return None;
        }

        let operand = obj.get(key).unwrap();
        self.enter(key);
        let op = match key {
            "add" => self.value_slot(operand).map(CalcOp::Add),
            "sub" => self.value_slot(operand).map(CalcOp::Sub),
            "mult" => self.value_slot(operand).map(CalcOp::Mult),
            "div" => self.value_slot(operand).map(CalcOp::Div),
            "max" => self.value_slot(operand).map(CalcOp::Max),
            "min" => self.value_slot(operand).map(CalcOp::Min),
            "remain" => self.value_slot(operand).map(CalcOp::Remain),
            "trunc" => self.flag_op(operand, CalcOp::Trunc),
            "frac" => self.flag_op(operand, CalcOp::Frac),
            "vtof" => self.flag_op(operand, CalcOp::Vtof),
            "round" => match operand.as_str() {
                Some("up") => Some(CalcOp::Round(RoundDirection::Up)),
                Some("down") => Some(CalcOp::Round(RoundDirection::Down)),
                Some("near") => Some(CalcOp::Round(RoundDirection::Near)),
                _ => {
                    self.error(
                        ErrorCode::CalcRoundDirection,
                        "'round' must be 'up', 'down' or 'near'",
                    );
                    None
                }
            },
            "sign" => match operand.as_str() {
                Some("pos") => Some(CalcOp::Sign(SignDirection::Pos)),
                Some("neg") => Some(CalcOp::Sign(SignDirection::Neg)),
                _ => {
                    self.error(ErrorCode::CalcSignDirection, "'sign' must be 'pos' or 'neg'");
                    None
                }
            },
            _ => match operand.as_str() {
                Some(tuning) if !tuning.is_empty() => Some(CalcOp::Quantize(tuning.to_string())),
                _ => {
                    self.error(ErrorCode::FieldType, "'quantize' must name a tuning");
                    None
                }
            },
        };
        self.leave();

        Some(Calc { id, op: op? })
    }

    fn flag_op(&mut self, operand: &Json, op: CalcOp) -> Option<CalcOp> {
        match operand.as_bool() {
            Some(true) => Some(op),
            _ => {
                self.error(ErrorCode::FieldType, "expected the boolean value true");
                None
            }
        }
    }

    // ── Conditions ──────────────────────────────────────────────────────

    fn if_slot(&mut self, value: &Json) -> Option<Slot<If>> {
        let obj = self.object(value)?;
        if let Some(reference) = self.string_field(obj, "ref") {
            if obj.keys().any(|k| k != "ref") {
                self.error(
                    ErrorCode::RefInlineConflict,
                    "an if reference can not carry inline fields",
                );
            }
            return Some(Slot::Ref(reference));
        }
        self.if_(value, false).map(Slot::Inline)
    }

    fn if_(&mut self, value: &Json, require_id: bool) -> Option<If> {
        let obj = self.object(value)?;
        let mut allowed = vec!["id", "tolerance", "and", "or"];
        allowed.extend(CMP_KEYS.iter().map(|(key, _)| *key));
        self.check_fields(obj, &allowed);

        let id = self.pool_id(obj, require_id);

        let cmp: Vec<(&str, CmpOp)> = CMP_KEYS
            .into_iter()
            .filter(|(key, _)| obj.contains_key(*key))
            .collect();
        let boolean: Vec<&str> = ["and", "or"]
            .into_iter()
            .filter(|key| obj.contains_key(*key))
            .collect();

        if cmp.len() + boolean.len() != 1 {
            self.error(
                ErrorCode::IfOperatorUnknown,
                "an if needs exactly one operator",
            );
            return None;
        }

        if let Some((key, op)) = cmp.first().copied() {
            let tolerance = match obj.get("tolerance") {
                Some(value) => {
                    self.enter("tolerance");
                    let tolerance = match value.as_f64() {
                        Some(t) => Some(t as f32),
                        None => {
                            self.error(ErrorCode::IfToleranceFloat, "'tolerance' must be a number");
                            None
                        }
                    };
                    self.leave();
                    tolerance
                }
                None => None,
            };

            self.enter(key);
            let operands = self.pair(obj.get(key).unwrap(), Parser::value_slot);
            self.leave();
            let (a, b) = operands?;

            return Some(If {
                id,
                op: IfOp::Cmp { op, a, b, tolerance },
            });
        }

        if obj.contains_key("tolerance") {
            self.enter("tolerance");
            self.error(
                ErrorCode::IfToleranceFloat,
                "'tolerance' only applies to comparison operators",
            );
            self.leave();
        }

        let key = boolean[0];
        self.enter(key);
        let operands = self.pair(obj.get(key).unwrap(), Parser::if_slot);
        self.leave();
        let (a, b) = operands?;
        let (a, b) = (Box::new(a), Box::new(b));

        Some(If {
            id,
            op: if key == "and" {
                IfOp::And(a, b)
            } else {
                IfOp::Or(a, b)
            },
        })
    }

    /// Parse a two-element array operand.
    fn pair<T>(
        &mut self,
        value: &Json,
        mut each: impl FnMut(&mut Self, &Json) -> Option<T>,
    ) -> Option<(T, T)> {
        let Some(array) = value.as_array() else {
            self.error(ErrorCode::IfOperandCount, "expected an array of two operands");
            return None;
        };
        if array.len() != 2 {
            self.error(
                ErrorCode::IfOperandCount,
                format!("expected two operands, found {}", array.len()),
            );
            return None;
        }
        self.enter(0);
        let a = each(self, &array[0]);
        self.leave();
        self.enter(1);
        let b = each(self, &array[1]);
        self.leave();
        Some((a?, b?))
    }

    // ── Ports ───────────────────────────────────────────────────────────

    fn port_slot(&mut self, value: &Json, kind: PortKind) -> Option<Slot<Port>> {
        if let Json::Number(_) = value {
            // Bare numbers are shorthand for a port index on channel 1.
            let index = self.checked_port_index(value, kind)?;
            return Some(Slot::Inline(Port {
                id: None,
                index,
                channel: None,
            }));
        }

        let obj = self.object(value)?;
        if let Some(reference) = self.string_field(obj, "ref") {
            if obj.keys().any(|k| k != "ref") {
                self.error(
                    ErrorCode::RefInlineConflict,
                    "a port reference can not carry inline fields",
                );
            }
            return Some(Slot::Ref(reference));
        }
        self.port(value, kind, false).map(Slot::Inline)
    }

    fn port(&mut self, value: &Json, kind: PortKind, require_id: bool) -> Option<Port> {
        let obj = self.object(value)?;
        self.check_fields(obj, &["id", "index", "channel"]);

        let id = self.pool_id(obj, require_id);
        let index = self.port_index(obj, kind)?;

        let channel = match obj.get("channel") {
            Some(value) => {
                self.enter("channel");
                let (number_code, range_code) = match kind {
                    PortKind::Input => (ErrorCode::InputChannelNumber, ErrorCode::InputChannelRange),
                    PortKind::Output => {
                        (ErrorCode::OutputChannelNumber, ErrorCode::OutputChannelRange)
                    }
                };
                let channel = match value.as_u64() {
                    Some(c) if (1..=crate::PORT_MAX_CHANNELS as u64).contains(&c) => Some(c as u32),
                    Some(_) => {
                        self.error(
                            range_code,
                            format!(
                                "'channel' must be between 1 and {}",
                                crate::PORT_MAX_CHANNELS
                            ),
                        );
                        None
                    }
                    None => {
                        self.error(number_code, "'channel' must be an integer");
                        None
                    }
                };
                self.leave();
                Some(channel?)
            }
            None => None,
        };

        Some(Port { id, index, channel })
    }

    fn port_index(&mut self, obj: &JsonObject, kind: PortKind) -> Option<u32> {
        let (number_code, range_code) = match kind {
            PortKind::Input => (ErrorCode::InputIndexNumber, ErrorCode::InputIndexRange),
            PortKind::Output => (ErrorCode::OutputIndexNumber, ErrorCode::OutputIndexRange),
        };
        match obj.get("index") {
            Some(value) => {
                self.enter("index");
                let index = self.checked_port_index_with(value, number_code, range_code, kind);
                self.leave();
                index
            }
            None => {
                self.error(number_code, "'index' is missing");
                None
            }
        }
    }

    fn checked_port_index(&mut self, value: &Json, kind: PortKind) -> Option<u32> {
        let (number_code, range_code) = match kind {
            PortKind::Input => (ErrorCode::InputIndexNumber, ErrorCode::InputIndexRange),
            PortKind::Output => (ErrorCode::OutputIndexNumber, ErrorCode::OutputIndexRange),
        };
        self.checked_port_index_with(value, number_code, range_code, kind)
    }

    fn checked_port_index_with(
        &mut self,
        value: &Json,
        number_code: ErrorCode,
        range_code: ErrorCode,
        kind: PortKind,
    ) -> Option<u32> {
        let ports = match kind {
            PortKind::Input => crate::INPUT_PORTS,
            PortKind::Output => crate::OUTPUT_PORTS,
        };
        match value.as_u64() {
            Some(n) if (1..=ports as u64).contains(&n) => Some(n as u32),
            Some(_) => {
                self.error(
                    range_code,
                    format!("the port index must be between 1 and {ports}"),
                );
                None
            }
            None => {
                self.error(number_code, "the port index must be an integer");
                None
            }
        }
    }

    // ── Input triggers, tunings and the component pool ──────────────────

    fn input_trigger(&mut self, value: &Json) -> Option<InputTrigger> {
        let obj = self.object(value)?;
        self.check_fields(obj, &["id", "input"]);

        let id = match self.string_field(obj, "id") {
            Some(id) if !id.is_empty() => id,
            _ => {
                self.error(
                    ErrorCode::InputTriggerIdMissing,
                    "an input trigger needs an id naming the trigger it raises",
                );
                return None;
            }
        };

        let input = match obj.get("input") {
            Some(value) => {
                self.enter("input");
                let port = self.port_slot(value, PortKind::Input);
                self.leave();
                port?
            }
            None => {
                self.error(ErrorCode::InputIndexNumber, "'input' is missing");
                return None;
            }
        };

        Some(InputTrigger { id, input })
    }

    fn tuning(&mut self, value: &Json) -> Option<Tuning> {
        let obj = self.object(value)?;
        self.check_fields(obj, &["id", "notes"]);

        let id = self.pool_id(obj, true)?;

        let Some(notes_value) = obj.get("notes") else {
            self.error(ErrorCode::TuningNotesEmpty, "the tuning has no notes");
            return None;
        };

        self.enter("notes");
        let notes = self.array(notes_value, &mut |parser, note| match note.as_f64() {
            Some(n) if (0.0..1.0).contains(&n) => Some(n as f32),
            _ => {
                parser.error(
                    ErrorCode::TuningNotesFormat,
                    "tuning notes are voltages at least 0 and below 1",
                );
                None
            }
        });
        self.leave();

        if notes.is_empty() {
            self.enter("notes");
            self.error(ErrorCode::TuningNotesEmpty, "the tuning has no notes");
            self.leave();
            return None;
        }

        Some(Tuning { id, notes })
    }

    fn pool_id(&mut self, obj: &JsonObject, required: bool) -> Option<String> {
        match self.string_field(obj, "id") {
            Some(id) if !id.is_empty() => Some(id),
            _ if required => {
                self.error(ErrorCode::IdMissing, "pool entries need a non-empty id");
                None
            }
            _ => None,
        }
    }

    fn component_pool(&mut self, value: &Json) -> ComponentPool {
        let Some(obj) = value.as_object() else {
            self.error(ErrorCode::FieldType, "'component-pool' must be an object");
            return ComponentPool::default();
        };
        self.check_fields(
            obj,
            &[
                "segments",
                "segment-blocks",
                "actions",
                "values",
                "calcs",
                "ifs",
                "inputs",
                "outputs",
                "tunings",
            ],
        );

        let segments = self.list(obj, "segments", |p, v| p.segment(v, true));
        let segment_blocks = self.list(obj, "segment-blocks", Parser::segment_block);
        let actions = self.list(obj, "actions", |p, v| p.action(v, true));
        let values = self.list(obj, "values", |p, v| p.value(v, true));
        let calcs = self.list(obj, "calcs", |p, v| p.calc(v, true));
        let ifs = self.list(obj, "ifs", |p, v| p.if_(v, true));
        let inputs = self.list(obj, "inputs", |p, v| p.port(v, PortKind::Input, true));
        let outputs = self.list(obj, "outputs", |p, v| p.port(v, PortKind::Output, true));
        let tunings = self.list(obj, "tunings", Parser::tuning);

        self.enter("segments");
        self.check_duplicate_ids(segments.iter().map(|s| s.id.as_deref()));
        self.leave();
        self.enter("segment-blocks");
        self.check_duplicate_ids(segment_blocks.iter().map(|b| Some(b.id.as_str())));
        self.leave();
        self.enter("actions");
        self.check_duplicate_ids(actions.iter().map(|a| a.id.as_deref()));
        self.leave();
        self.enter("values");
        self.check_duplicate_ids(values.iter().map(|v| v.id.as_deref()));
        self.leave();
        self.enter("calcs");
        self.check_duplicate_ids(calcs.iter().map(|c| c.id.as_deref()));
        self.leave();
        self.enter("ifs");
        self.check_duplicate_ids(ifs.iter().map(|i| i.id.as_deref()));
        self.leave();
        self.enter("inputs");
        self.check_duplicate_ids(inputs.iter().map(|p| p.id.as_deref()));
        self.leave();
        self.enter("outputs");
        self.check_duplicate_ids(outputs.iter().map(|p| p.id.as_deref()));
        self.leave();
        self.enter("tunings");
        self.check_duplicate_ids(tunings.iter().map(|t| Some(t.id.as_str())));
        self.leave();

        ComponentPool {
            segments,
            segment_blocks,
            actions,
            values,
            calcs,
            ifs,
            inputs,
            outputs,
            tunings,
        }
    }

    fn segment_block(&mut self, value: &Json) -> Option<SegmentBlock> {
        let obj = self.object(value)?;
        self.check_fields(obj, &["id", "repeat", "segments"]);

        let id = self.pool_id(obj, true)?;

        let repeat = match obj.get("repeat") {
            Some(value) => {
                self.enter("repeat");
                let repeat = match value.as_u64() {
                    Some(n) if n >= 1 && n <= u32::MAX as u64 => n as u32,
                    _ => {
                        self.error(
                            ErrorCode::LaneRepeatNumber,
                            "'repeat' must be a positive integer",
                        );
                        1
                    }
                };
                self.leave();
                repeat
            }
            None => 1,
        };

        Some(SegmentBlock {
            id,
            repeat,
            segments: self.list(obj, "segments", Parser::segment_slot),
        })
    }

    fn check_duplicate_ids<'a>(&mut self, ids: impl Iterator<Item = Option<&'a str>>) {
        let mut seen = std::collections::HashSet::new();
        let duplicates: Vec<(usize, String)> = ids
            .enumerate()
            .filter_map(|(index, id)| {
                let id = id?;
                (!seen.insert(id)).then(|| (index, id.to_string()))
            })
            .collect();
        for (index, id) in duplicates {
            self.enter(index);
            self.error(ErrorCode::IdDuplicate, format!("the id '{id}' is already in use"));
            self.leave();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Json) -> Result<Script, Vec<ValidationError>> {
        parse_script(&value.to_string())
    }

    fn minimal() -> Json {
        json!({ "type": "timeseq-script", "version": "1.1.0" })
    }

    fn expect_error(errors: &[ValidationError], code: ErrorCode, location: &str) {
        assert!(
            errors.iter().any(|e| e.code == code && e.location == location),
            "expected {code} at {location}, got: {errors:?}"
        );
    }

    #[test]
    fn minimal_script_loads() {
        let script = parse(minimal()).unwrap();
        assert_eq!(script.version, Version::V1_1_0);
        assert!(script.timelines.is_empty());
    }

    #[test]
    fn invalid_json_reports_syntax_error() {
        let errors = parse_script("{ not json").unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, ErrorCode::JsonSyntax);
        assert_eq!(errors[0].location, "");
    }

    #[test]
    fn missing_version_is_reported() {
        let errors = parse(json!({ "type": "t" })).unwrap_err();
        expect_error(&errors, ErrorCode::ScriptVersionMissing, "");
    }

    #[test]
    fn unknown_version_is_reported() {
        let errors = parse(json!({ "type": "t", "version": "2.0.0" })).unwrap_err();
        expect_error(&errors, ErrorCode::ScriptVersionUnsupported, "/version");
    }

    #[test]
    fn v1_1_calc_ops_rejected_in_v1_0_scripts() {
        let mut script = json!({ "type": "t", "version": "1.0.0" });
        script["component-pool"] = json!({
            "values": [ { "id": "v", "voltage": 1.0, "calc": [ { "round": "up" } ] } ]
        });
        let errors = parse(script).unwrap_err();
        expect_error(
            &errors,
            ErrorCode::ScriptVersionFeature,
            "/component-pool/values/0/calc/0/round",
        );
    }

    #[test]
    fn every_error_in_the_document_is_reported() {
        let mut script = minimal();
        script["timelines"] = json!([
            { "lanes": [ { "segments": [
                { "duration": { "samples": "nope" } },
                { "duration": { "millis": -1.0 } }
            ] } ] }
        ]);
        let errors = parse(script).unwrap_err();
        assert_eq!(errors.len(), 2);
        expect_error(
            &errors,
            ErrorCode::DurationMillisNumber,
            "/timelines/0/lanes/0/segments/1/duration/millis",
        );
    }

    #[test]
    fn duration_units_are_exclusive() {
        let mut script = minimal();
        script["timelines"] = json!([
            { "lanes": [ { "segments": [
                { "duration": { "samples": 10, "millis": 5.0 } }
            ] } ] }
        ]);
        let errors = parse(script).unwrap_err();
        expect_error(
            &errors,
            ErrorCode::DurationMultiple,
            "/timelines/0/lanes/0/segments/0/duration",
        );
    }

    #[test]
    fn bars_require_beats() {
        let mut script = minimal();
        script["timelines"] = json!([
            { "lanes": [ { "segments": [
                { "duration": { "samples": 10, "bars": 2 } }
            ] } ] }
        ]);
        let errors = parse(script).unwrap_err();
        expect_error(
            &errors,
            ErrorCode::DurationBarsButNoBeats,
            "/timelines/0/lanes/0/segments/0/duration",
        );
    }

    #[test]
    fn global_actions_must_use_start_timing() {
        let mut script = minimal();
        script["global-actions"] = json!([
            { "timing": "end", "trigger": "t" },
            { "timing": "start", "trigger": "t" }
        ]);
        let errors = parse(script).unwrap_err();
        expect_error(&errors, ErrorCode::ScriptGlobalActionTiming, "/global-actions/0");
    }

    #[test]
    fn gate_output_index_must_be_a_number() {
        let mut script = minimal();
        script["timelines"] = json!([
            { "lanes": [ { "segments": [ { "duration": { "samples": 1 }, "actions": [
                { "timing": "gate", "output": { "index": "1" } }
            ] } ] } ] }
        ]);
        let errors = parse(script).unwrap_err();
        expect_error(
            &errors,
            ErrorCode::OutputIndexNumber,
            "/timelines/0/lanes/0/segments/0/actions/0/output/index",
        );
    }

    #[test]
    fn port_indices_are_range_checked() {
        let mut script = minimal();
        script["timelines"] = json!([
            { "lanes": [ { "segments": [ { "duration": { "samples": 1 }, "actions": [
                { "set-value": { "output": 9, "value": 1.0 } }
            ] } ] } ] }
        ]);
        let errors = parse(script).unwrap_err();
        expect_error(
            &errors,
            ErrorCode::OutputIndexRange,
            "/timelines/0/lanes/0/segments/0/actions/0/set-value/output",
        );
    }

    #[test]
    fn value_needs_exactly_one_source() {
        let mut script = minimal();
        script["component-pool"] = json!({
            "values": [
                { "id": "none" },
                { "id": "both", "voltage": 1.0, "note": "C4" }
            ]
        });
        let errors = parse(script).unwrap_err();
        expect_error(&errors, ErrorCode::ValueNoSource, "/component-pool/values/0");
        expect_error(
            &errors,
            ErrorCode::ValueMultipleSources,
            "/component-pool/values/1",
        );
    }

    #[test]
    fn note_format_is_validated() {
        let mut script = minimal();
        script["component-pool"] = json!({
            "values": [ { "id": "v", "note": "H4" } ]
        });
        let errors = parse(script).unwrap_err();
        expect_error(
            &errors,
            ErrorCode::ValueNoteFormat,
            "/component-pool/values/0/note",
        );
    }

    #[test]
    fn duplicate_pool_ids_are_rejected() {
        let mut script = minimal();
        script["component-pool"] = json!({
            "values": [
                { "id": "v", "voltage": 1.0 },
                { "id": "v", "voltage": 2.0 }
            ]
        });
        let errors = parse(script).unwrap_err();
        expect_error(&errors, ErrorCode::IdDuplicate, "/component-pool/values/1");
    }

    #[test]
    fn bare_numbers_are_voltage_and_port_shorthand() {
        let mut script = minimal();
        script["timelines"] = json!([
            { "lanes": [ { "segments": [ { "duration": { "samples": 1 }, "actions": [
                { "set-value": { "output": 3, "value": 2.5 } }
            ] } ] } ] }
        ]);
        let script = parse(script).unwrap();
        let Slot::Inline(segment) = &script.timelines[0].lanes[0].segments[0] else {
            panic!("expected an inline segment");
        };
        let SegmentBody::Timed { actions, .. } = &segment.body else {
            panic!("expected a timed segment");
        };
        let Slot::Inline(action) = &actions[0] else {
            panic!("expected an inline action");
        };
        let ActionBody::SetValue { output, value } = &action.body else {
            panic!("expected a set-value action");
        };
        assert_eq!(
            *output,
            Slot::Inline(Port { id: None, index: 3, channel: None })
        );
        let Slot::Inline(value) = value else {
            panic!("expected an inline value");
        };
        assert_eq!(value.source, ValueSource::Voltage(2.5));
    }

    #[test]
    fn assert_defaults_stop_on_fail() {
        let mut script = minimal();
        script["timelines"] = json!([
            { "lanes": [ { "segments": [ { "duration": { "samples": 1 }, "actions": [
                { "assert": { "name": "a", "expect": { "eq": [1.0, 0.0] } } }
            ] } ] } ] }
        ]);
        let script = parse(script).unwrap();
        let Slot::Inline(segment) = &script.timelines[0].lanes[0].segments[0] else {
            panic!("expected an inline segment");
        };
        let SegmentBody::Timed { actions, .. } = &segment.body else {
            panic!("expected a timed segment");
        };
        let Slot::Inline(action) = &actions[0] else {
            panic!("expected an inline action");
        };
        let ActionBody::Assert(assert) = &action.body else {
            panic!("expected an assert action");
        };
        assert!(assert.stop_on_fail);
    }
}
