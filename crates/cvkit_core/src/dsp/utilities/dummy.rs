//! Patch-point placeholder.
//!
//! Accepts the full complement of inputs and parameters but produces
//! nothing. Useful for reserving a slot in a patch, and as the minimal
//! example of the module surface.

use schemars::JsonSchema;
use serde::Deserialize;

use crate::types::Signal;

#[derive(Default, Deserialize, JsonSchema, Connect)]
#[serde(default, rename_all = "camelCase")]
struct DummyParams {
    gate: Signal,
    p_1: f32,
    p_2: f32,
    p_3: f32,
    p_4: f32,
    cv_1: Signal,
    cv_2: Signal,
    cv_3: Signal,
    cv_4: Signal,
}

#[derive(Outputs, JsonSchema)]
struct DummyOutputs {
    #[output("out1", "unused output", default)]
    out_1: f32,
    #[output("out2", "unused output")]
    out_2: f32,
    #[output("out3", "unused output")]
    out_3: f32,
    #[output("out4", "unused output")]
    out_4: f32,
}

#[derive(Default, Module)]
#[module("dummy", "Placeholder module with inert inputs and outputs")]
pub struct Dummy {
    outputs: DummyOutputs,
    params: DummyParams,
}

message_handlers!(impl Dummy {});

impl Dummy {
    fn update(&mut self, _sample_rate: f32) {}
}
