//! Windowed channel mixer.
//!
//! Mixes its inputs through a triangular window positioned along the lane
//! axis: lanes near `center` contribute fully, lanes further than `width`
//! away contribute nothing. With a polyphonic cable on the first input the
//! window runs over that cable's channels; otherwise it runs over the four
//! mono inputs.

use schemars::JsonSchema;
use serde::Deserialize;

use crate::dsp::utils::cv_scale;
use crate::types::Signal;

#[derive(Deserialize, JsonSchema, Connect)]
#[serde(default, rename_all = "camelCase")]
struct PolyamoryParams {
    /// first input; a polyphonic cable here switches to per-channel mixing
    a: Signal,
    b: Signal,
    c: Signal,
    d: Signal,
    /// window half-width along the lane axis (0..1)
    width: f32,
    width_cv: Signal,
    /// window center along the lane axis (0..1)
    center: f32,
    center_cv: Signal,
    /// output level (0..2)
    mul: f32,
    mul_cv: Signal,
}

impl Default for PolyamoryParams {
    fn default() -> Self {
        Self {
            a: Signal::Disconnected,
            b: Signal::Disconnected,
            c: Signal::Disconnected,
            d: Signal::Disconnected,
            width: 0.1,
            width_cv: Signal::Disconnected,
            center: 0.5,
            center_cv: Signal::Disconnected,
            mul: 1.0,
            mul_cv: Signal::Disconnected,
        }
    }
}

#[derive(Outputs, JsonSchema)]
struct PolyamoryOutputs {
    #[output("out", "windowed mix output", default)]
    out: f32,
}

#[derive(Default, Module)]
#[module("polyamory", "Windowed mixer scanning across lanes or poly channels")]
pub struct Polyamory {
    outputs: PolyamoryOutputs,
    params: PolyamoryParams,
}

message_handlers!(impl Polyamory {});

/// Triangular window weight for lane `i` of `n`, centered on the lane's
/// midpoint.
fn kernel(width: f32, center: f32, n: usize, i: usize) -> f32 {
    let x = (i as f32 + 0.5) / n as f32;
    let distance = (center - x).abs();
    if distance >= width {
        0.0
    } else {
        width - distance
    }
}

impl Polyamory {
    fn update(&mut self, _sample_rate: f32) {
        let width = cv_scale(self.params.width, &self.params.width_cv);
        let center = cv_scale(self.params.center, &self.params.center_cv);
        let mul = cv_scale(self.params.mul, &self.params.mul_cv);

        let poly = self.params.a.get_poly();
        if poly.channels() > 1 {
            let n = poly.channels();
            let mut sum = 0.0;
            for i in 0..n {
                sum += kernel(width, center, n, i) * poly.get(i);
            }
            self.outputs.out = sum / n as f32 * mul;
            return;
        }

        let lanes = [&self.params.a, &self.params.b, &self.params.c, &self.params.d];
        let connected = lanes.iter().filter(|s| !s.is_disconnected()).count();
        if connected == 0 {
            self.outputs.out = 0.0;
            return;
        }
        let mut sum = 0.0;
        for (i, lane) in lanes.iter().enumerate() {
            sum += kernel(width, center, lanes.len(), i) * lane.get_value_or(0.0);
        }
        self.outputs.out = sum / connected as f32 * mul;
    }
}
