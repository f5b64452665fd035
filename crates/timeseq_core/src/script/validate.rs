//! Validation error reporting.

use serde::{Serialize, Serializer};
use thiserror::Error;

macro_rules! error_codes {
    ($($variant:ident => $name:literal,)*) => {
        /// Machine-readable validation failure category.
        #[derive(Clone, Copy, Debug, PartialEq, Eq)]
        pub enum ErrorCode {
            $($variant,)*
        }

        impl ErrorCode {
            /// Canonical wire name of the code.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(ErrorCode::$variant => $name,)*
                }
            }
        }
    };
}

error_codes! {
    JsonSyntax => "Json_Syntax",
    JsonRootObject => "Json_RootObject",
    FieldUnknown => "Field_Unknown",
    FieldType => "Field_Type",
    IdMissing => "Id_Missing",
    IdDuplicate => "Id_Duplicate",
    RefNotFound => "Ref_NotFound",
    RefCircularFound => "Ref_CircularFound",
    RefInlineConflict => "Ref_InlineConflict",
    ScriptTypeMissing => "Script_TypeMissing",
    ScriptVersionMissing => "Script_VersionMissing",
    ScriptVersionUnsupported => "Script_VersionUnsupported",
    ScriptVersionFeature => "Script_VersionFeature",
    ScriptGlobalActionTiming => "Script_GlobalActionTiming",
    ValueNoSource => "Value_NoSource",
    ValueMultipleSources => "Value_MultipleSources",
    ValueVoltageFloat => "Value_VoltageFloat",
    ValueNoteFormat => "Value_NoteFormat",
    ValueVariableString => "Value_VariableString",
    ValueRandBounds => "Value_RandBounds",
    ValueQuantizeBool => "Value_QuantizeBool",
    CalcUnknown => "Calc_Unknown",
    CalcOperandMissing => "Calc_OperandMissing",
    CalcMultipleOperations => "Calc_MultipleOperations",
    CalcRoundDirection => "Calc_RoundDirection",
    CalcSignDirection => "Calc_SignDirection",
    CalcTuningNotFound => "Calc_TuningNotFound",
    IfOperatorUnknown => "If_OperatorUnknown",
    IfOperandCount => "If_OperandCount",
    IfToleranceFloat => "If_ToleranceFloat",
    DurationMissing => "Duration_Missing",
    DurationMultiple => "Duration_Multiple",
    DurationSamplesNumber => "Duration_SamplesNumber",
    DurationMillisNumber => "Duration_MillisNumber",
    DurationBeatsNumber => "Duration_BeatsNumber",
    DurationBarsNumber => "Duration_BarsNumber",
    DurationHzNumber => "Duration_HzNumber",
    DurationBarsButNoBeats => "Duration_BarsButNoBeats",
    DurationBeatsButNoBpm => "Duration_BeatsButNoBmp",
    DurationBarsButNoBpb => "Duration_BarsButNoBpb",
    ActionTimingEnum => "Action_TimingEnum",
    ActionMissingPayload => "Action_MissingPayload",
    ActionMultiplePayloads => "Action_MultiplePayloads",
    ActionGateOutput => "Action_GateOutput",
    ActionGateHighRatio => "Action_GateHighRatio",
    ActionGlideTarget => "Action_GlideTarget",
    ActionEaseAlgorithm => "Action_EaseAlgorithm",
    ActionEaseFactorFloat => "Action_EaseFactorFloat",
    ActionNameString => "Action_NameString",
    ActionLabelString => "Action_LabelString",
    ActionTriggerString => "Action_TriggerString",
    ActionChannelsNumber => "Action_ChannelsNumber",
    AssertNameMissing => "Assert_NameMissing",
    AssertExpectMissing => "Assert_ExpectMissing",
    InputIndexNumber => "Input_IndexNumber",
    InputIndexRange => "Input_IndexRange",
    InputChannelNumber => "Input_ChannelNumber",
    InputChannelRange => "Input_ChannelRange",
    OutputIndexNumber => "Output_IndexNumber",
    OutputIndexRange => "Output_IndexRange",
    OutputChannelNumber => "Output_ChannelNumber",
    OutputChannelRange => "Output_ChannelRange",
    TuningNotesEmpty => "Tuning_NotesEmpty",
    TuningNotesFormat => "Tuning_NotesFormat",
    InputTriggerIdMissing => "InputTrigger_IdMissing",
    LaneRepeatNumber => "Lane_RepeatNumber",
    TimeScaleNumber => "TimeScale_Number",
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A single problem found while loading a script.
///
/// `location` is a JSON pointer into the script document (empty string for
/// document-level problems such as syntax errors).
#[derive(Clone, Debug, PartialEq, Serialize, Error)]
#[error("{location}: [{code}] {message}")]
pub struct ValidationError {
    pub location: String,
    pub code: ErrorCode,
    pub message: String,
}

impl ValidationError {
    pub fn new(location: impl Into<String>, code: ErrorCode, message: impl Into<String>) -> Self {
        ValidationError {
            location: location.into(),
            code,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_serialize_as_wire_names() {
        let error = ValidationError::new("/timelines/0", ErrorCode::RefNotFound, "nope");
        let json = serde_json::to_value(&error).unwrap();
        assert_eq!(json["code"], "Ref_NotFound");
        assert_eq!(json["location"], "/timelines/0");
    }

    #[test]
    fn display_includes_location_and_code() {
        let error = ValidationError::new("/a/b", ErrorCode::ValueNoteFormat, "bad note");
        assert_eq!(error.to_string(), "/a/b: [Value_NoteFormat] bad note");
    }
}
