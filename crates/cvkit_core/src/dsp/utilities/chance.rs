//! Probabilistic gate router.
//!
//! On each rising gate edge every lane independently rolls against its
//! chance parameter; lanes that win pass the gate voltage through until the
//! next edge.

use schemars::JsonSchema;
use serde::Deserialize;

use crate::dsp::utils::{GateTrigger, LcgRng, cv_scale};
use crate::types::Signal;

const NUM_LANES: usize = 4;

#[derive(Deserialize, JsonSchema, Connect)]
#[serde(default, rename_all = "camelCase")]
struct ChanceParams {
    gate: Signal,
    /// per-lane pass probability (0..1)
    chance: [f32; NUM_LANES],
    cv: [Signal; NUM_LANES],
}

impl Default for ChanceParams {
    fn default() -> Self {
        Self {
            gate: Signal::Disconnected,
            chance: [0.5; NUM_LANES],
            cv: Default::default(),
        }
    }
}

#[derive(Outputs, JsonSchema)]
struct ChanceOutputs {
    #[output("out1", "lane 1 gate output", default)]
    out_1: f32,
    #[output("out2", "lane 2 gate output")]
    out_2: f32,
    #[output("out3", "lane 3 gate output")]
    out_3: f32,
    #[output("out4", "lane 4 gate output")]
    out_4: f32,
}

#[derive(Default, Module)]
#[module("chance", "Probabilistic gate router with four independent lanes")]
pub struct Chance {
    outputs: ChanceOutputs,
    params: ChanceParams,
    trigger: GateTrigger,
    rng: LcgRng,
    open: [bool; NUM_LANES],
}

message_handlers!(impl Chance {});

impl Chance {
    fn update(&mut self, _sample_rate: f32) {
        if self.params.gate.is_disconnected() {
            return;
        }

        let voltage = self.params.gate.get_value();
        if self.trigger.process(voltage) {
            for lane in 0..NUM_LANES {
                let chance = cv_scale(self.params.chance[lane], &self.params.cv[lane]);
                self.open[lane] = self.rng.uniform() < chance;
            }
        }

        self.outputs.out_1 = if self.open[0] { voltage } else { 0.0 };
        self.outputs.out_2 = if self.open[1] { voltage } else { 0.0 };
        self.outputs.out_3 = if self.open[2] { voltage } else { 0.0 };
        self.outputs.out_4 = if self.open[3] { voltage } else { 0.0 };
    }
}
