use anyhow::Result;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use std::fmt::Debug;
use std::{
    collections::HashMap,
    sync::{self, Arc},
};

use crate::patch::Patch;
use crate::poly::PolyOutput;

pub trait MessageHandler {
    fn handled_message_tags(&self) -> &'static [MessageTag] {
        &[]
    }

    fn handle_message(&self, _message: &Message) -> Result<()> {
        Ok(())
    }
}

/// Implemented by modules whose runtime state (beyond params) is worth
/// persisting across sessions. Opt in with `#[stateful]` on the module.
pub trait StatefulModule {
    fn get_state(&self) -> Option<Value> {
        None
    }

    /// Restore previously saved state. Implementations are tolerant: absent
    /// fields keep their current values and malformed entries are skipped.
    fn set_state(&mut self, _state: &Value) {}
}

pub trait Sampleable: MessageHandler + Send + Sync {
    fn get_id(&self) -> &String;
    fn tick(&self) -> ();
    fn update(&self) -> ();
    /// Get polyphonic sample output for a port.
    fn get_poly_sample(&self, port: &str) -> Result<PolyOutput>;
    fn get_module_type(&self) -> String;
    fn try_update_params(&self, params: Value) -> Result<()>;
    fn connect(&self, patch: &Patch);
    fn get_state(&self) -> Option<Value> {
        None
    }
    fn set_state(&self, _state: &Value) -> Result<()> {
        Ok(())
    }
}

pub trait Module {
    fn install_constructor(map: &mut HashMap<String, SampleableConstructor>);
    fn get_schema() -> ModuleSchema;

    /// Register this module's parameter validator in the provided map.
    ///
    /// The key is the module type string (e.g. "chance"). The value is a
    /// function that attempts to deserialize a JSON params object into the
    /// module's concrete `*Params` type.
    fn install_params_validator(map: &mut HashMap<String, ParamsValidator>);

    /// Validate a JSON params object by attempting to parse it as the module's
    /// concrete params type.
    ///
    /// This is intended for host-side patch validation before applying the patch.
    fn validate_params_json(params: &Value) -> Result<()>;
}

/// Function pointer type used to validate a module's params JSON.
pub type ParamsValidator = fn(&Value) -> Result<()>;

pub type SampleableMap = HashMap<String, Arc<Box<dyn Sampleable>>>;

pub trait Connect {
    fn connect(&mut self, patch: &Patch);
}

/// A module input: either a constant voltage block, a cable to another
/// module's output, or nothing.
#[derive(Clone, Debug, Default)]
pub enum Signal {
    /// Static voltage value(s) - mono is just channels=1
    Volts(PolyOutput),
    /// Cable connection to another module's output
    Cable {
        module: String,
        module_ptr: std::sync::Weak<Box<dyn Sampleable>>,
        port: String,
    },
    #[default]
    Disconnected,
}

// Custom serde deserialization to allow a bare number as shorthand for volts.
//
// Examples accepted:
// - 0.5                      -> Signal::Volts(PolyOutput::mono(0.5))
// - [0.5, 1.0, 1.5]          -> Signal::Volts(PolyOutput::poly(&[0.5, 1.0, 1.5]))
// - {"type": "cable", "module": "...", "port": "..."}
impl<'de> Deserialize<'de> for Signal {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum SignalDe {
            Number(f64),
            NumberArray(Vec<f64>),
            Tagged(SignalTagged),
        }

        #[derive(Deserialize)]
        #[serde(
            tag = "type",
            rename_all = "camelCase",
            rename_all_fields = "camelCase"
        )]
        enum SignalTagged {
            Cable { module: String, port: String },
            Disconnected,
        }

        match SignalDe::deserialize(deserializer)? {
            SignalDe::Number(value) => Ok(Signal::Volts(PolyOutput::mono(value as f32))),
            SignalDe::NumberArray(values) => Ok(Signal::Volts(PolyOutput::poly(
                &values.into_iter().map(|v| v as f32).collect::<Vec<_>>(),
            ))),
            SignalDe::Tagged(tagged) => Ok(match tagged {
                SignalTagged::Cable { module, port } => Signal::Cable {
                    module,
                    module_ptr: sync::Weak::new(),
                    port,
                },
                SignalTagged::Disconnected => Signal::Disconnected,
            }),
        }
    }
}

#[derive(JsonSchema)]
#[serde(untagged)]
#[allow(dead_code)]
enum SignalSchema {
    Number(f64),
    NumberArray(Vec<f64>),
    Tagged(SignalTaggedSchema),
}

#[derive(JsonSchema)]
#[serde(
    tag = "type",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
#[allow(dead_code)]
enum SignalTaggedSchema {
    Cable { module: String, port: String },
    Disconnected,
}

impl JsonSchema for Signal {
    fn schema_name() -> Cow<'static, str> {
        Cow::Borrowed("Signal")
    }

    fn json_schema(r#gen: &mut schemars::SchemaGenerator) -> schemars::Schema {
        SignalSchema::json_schema(r#gen)
    }
}

impl Signal {
    /// Get the full polyphonic block carried by this signal.
    pub fn get_poly(&self) -> PolyOutput {
        match self {
            Signal::Volts(poly) => *poly,
            Signal::Cable {
                module_ptr, port, ..
            } => match module_ptr.upgrade() {
                Some(module_ptr) => module_ptr.get_poly_sample(port).unwrap_or_default(),
                None => PolyOutput::default(),
            },
            Signal::Disconnected => PolyOutput::default(),
        }
    }

    /// Get the mono voltage (channel 0).
    pub fn get_value(&self) -> f32 {
        self.get_poly().get(0)
    }

    /// Get the mono voltage, or `default` when disconnected (normalled input).
    pub fn get_value_or(&self, default: f32) -> f32 {
        if self.is_disconnected() {
            default
        } else {
            self.get_value()
        }
    }

    /// Check if the signal is disconnected
    pub fn is_disconnected(&self) -> bool {
        matches!(self, Signal::Disconnected)
    }
}

impl Connect for Signal {
    fn connect(&mut self, patch: &Patch) {
        match self {
            Signal::Cable {
                module,
                module_ptr,
                port: _,
            } => {
                if let Some(sampleable) = patch.sampleables.get(module) {
                    *module_ptr = Arc::downgrade(sampleable);
                }
            }
            _ => {}
        }
    }
}

impl PartialEq for Box<dyn Sampleable> {
    fn eq(&self, other: &Self) -> bool {
        self.get_id() == other.get_id()
    }
}

impl PartialEq for Signal {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Signal::Volts(poly1), Signal::Volts(poly2)) => poly1 == poly2,
            (
                Signal::Cable {
                    module: module_1,
                    module_ptr: module_ptr_1,
                    port: port_1,
                },
                Signal::Cable {
                    module: module_2,
                    module_ptr: module_ptr_2,
                    port: port_2,
                },
            ) => {
                module_ptr_1.upgrade() == module_ptr_2.upgrade()
                    && port_1 == port_2
                    && module_1 == module_2
            }
            (Signal::Disconnected, Signal::Disconnected) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Ord, PartialOrd, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputSchema {
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub default: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub polyphonic: bool,
}

pub trait OutputStruct: Default + Send + Sync + 'static {
    fn copy_from(&mut self, other: &Self);
    /// Get polyphonic sample output for a port.
    fn get_poly_sample(&self, port: &str) -> Option<PolyOutput>;
    fn schemas() -> Vec<OutputSchema>
    where
        Self: Sized;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaContainer {
    pub schema: schemars::Schema,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionalArg {
    pub name: String,
    pub optional: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleSchema {
    pub name: String,
    pub description: String,
    pub params_schema: SchemaContainer,
    pub outputs: Vec<OutputSchema>,
    pub positional_args: Vec<PositionalArg>,
}

pub type SampleableConstructor = Box<dyn Fn(&String, f32) -> Result<Arc<Box<dyn Sampleable>>>>;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClockMessages {
    Start,
    Stop,
    Reset,
}

/// Structural sequencer edits that cannot be expressed as a params update.
/// Dispatched through the patch so they run under the module mutex instead
/// of touching DSP state from the UI thread directly.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum EditMessages {
    MoveSelectionUp,
    MoveSelectionDown,
    ClearSelectedRule,
    /// Append a symbol tag (0..=3) to the selected rule. Out-of-range tags
    /// are ignored.
    AppendToSelectedRule(u8),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, EnumTag, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum Message {
    Clock(ClockMessages),
    SeqEdit(EditMessages),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::from_str;

    #[test]
    fn test_signal_deserialization_volts() {
        let s: Signal = from_str("0.5").unwrap();
        match s {
            Signal::Volts(poly) => assert_eq!(poly.get(0), 0.5),
            _ => panic!("Expected Volts"),
        }
    }

    #[test]
    fn test_signal_deserialization_poly_volts() {
        let s: Signal = from_str("[1.0, 2.0, 3.0]").unwrap();
        match s {
            Signal::Volts(poly) => {
                assert_eq!(poly.channels(), 3);
                assert_eq!(poly.get(2), 3.0);
            }
            _ => panic!("Expected Volts"),
        }
    }

    #[test]
    fn test_signal_deserialization_cable() {
        let s: Signal =
            from_str(r#"{"type": "cable", "module": "clock1", "port": "out"}"#).unwrap();
        match s {
            Signal::Cable { module, port, .. } => {
                assert_eq!(module, "clock1");
                assert_eq!(port, "out");
            }
            _ => panic!("Expected Cable"),
        }
    }

    #[test]
    fn test_signal_deserialization_disconnected() {
        let s: Signal = from_str(r#"{"type": "disconnected"}"#).unwrap();
        assert!(s.is_disconnected());
    }

    #[test]
    fn test_signal_normalled_default() {
        let s = Signal::Disconnected;
        assert_eq!(s.get_value_or(10.0), 10.0);

        let s: Signal = from_str("2.5").unwrap();
        assert_eq!(s.get_value_or(10.0), 2.5);
    }

    #[test]
    fn test_message_tags() {
        assert_eq!(
            Message::Clock(ClockMessages::Reset).tag(),
            MessageTag::Clock
        );
        assert_eq!(
            Message::SeqEdit(EditMessages::MoveSelectionUp).tag(),
            MessageTag::SeqEdit
        );
    }

    #[test]
    fn test_message_serde() {
        let m: Message = from_str(
            r#"{"type": "seqEdit", "data": {"type": "appendToSelectedRule", "data": 2}}"#,
        )
        .unwrap();
        assert_eq!(m, Message::SeqEdit(EditMessages::AppendToSelectedRule(2)));
    }
}
