//! Range mapper with sample-and-hold gating.
//!
//! Maps the input from `min..max` onto `start..end`. With gating enabled the
//! output only updates on a gate, holding its last value in between.

use schemars::JsonSchema;
use serde::Deserialize;

use crate::dsp::utils::{GateTrigger, cv_scale, map_range};
use crate::types::Signal;

const EPSILON: f32 = 1e-6;

#[derive(Deserialize, JsonSchema, Connect)]
#[serde(default, rename_all = "camelCase")]
struct HoldmeParams {
    input: Signal,
    /// input range low (-5..10)
    min: f32,
    min_cv: Signal,
    /// input range high (-5..10)
    max: f32,
    max_cv: Signal,
    /// output range low (-5..10)
    start: f32,
    start_cv: Signal,
    /// output range high (-5..10)
    end: f32,
    end_cv: Signal,
    /// only update the output on a gate
    gating: bool,
    gating_cv: Signal,
    /// sample button
    gate: bool,
    gate_cv: Signal,
}

impl Default for HoldmeParams {
    fn default() -> Self {
        Self {
            input: Signal::Disconnected,
            min: 0.0,
            min_cv: Signal::Disconnected,
            max: 10.0,
            max_cv: Signal::Disconnected,
            start: 0.0,
            start_cv: Signal::Disconnected,
            end: 10.0,
            end_cv: Signal::Disconnected,
            gating: false,
            gating_cv: Signal::Disconnected,
            gate: false,
            gate_cv: Signal::Disconnected,
        }
    }
}

#[derive(Outputs, JsonSchema)]
struct HoldmeOutputs {
    #[output("out", "mapped (and held) output", default)]
    out: f32,
}

#[derive(Default, Module)]
#[module("holdme", "Range mapper with sample-and-hold gating")]
pub struct Holdme {
    outputs: HoldmeOutputs,
    params: HoldmeParams,
    gating_trigger: GateTrigger,
    gate_trigger: GateTrigger,
}

message_handlers!(impl Holdme {});

impl Holdme {
    fn update(&mut self, _sample_rate: f32) {
        if self
            .gating_trigger
            .process(self.params.gating_cv.get_value_or(0.0))
        {
            self.params.gating = !self.params.gating;
        }

        if self.params.input.is_disconnected() {
            return;
        }

        let min = cv_scale(self.params.min, &self.params.min_cv);
        let max = cv_scale(self.params.max, &self.params.max_cv);
        let start = cv_scale(self.params.start, &self.params.start_cv);
        let end = cv_scale(self.params.end, &self.params.end_cv);

        let mapped = if (max - min).abs() < EPSILON {
            0.0
        } else {
            map_range(self.params.input.get_value(), min, max, start, end)
        };

        if self.params.gating {
            let gate_edge = self
                .gate_trigger
                .process(self.params.gate_cv.get_value_or(0.0));
            if self.params.gate || gate_edge {
                self.outputs.out = mapped;
            }
        } else {
            self.outputs.out = mapped;
        }
    }
}
