//! Triggered burst generator.
//!
//! On a gate, emits `div` evenly spaced triggers across a window of `dur`
//! beats at the current BPM, then goes quiet until the next gate.

use schemars::JsonSchema;
use serde::Deserialize;

use crate::dsp::utils::{GateTrigger, PulseGenerator, Timer, cv_scale};
use crate::types::Signal;

const TRIGGER_WIDTH: f32 = 1e-3;

#[derive(Deserialize, JsonSchema, Connect)]
#[serde(default, rename_all = "camelCase")]
struct SnapParams {
    /// beats per minute (1..1920)
    bpm: f32,
    bpm_cv: Signal,
    /// burst window length in beats (0..128)
    dur: f32,
    dur_cv: Signal,
    /// number of triggers in the window (1..16)
    div: f32,
    div_cv: Signal,
    /// fire button
    gate: bool,
    gate_cv: Signal,
}

impl Default for SnapParams {
    fn default() -> Self {
        Self {
            bpm: 120.0,
            bpm_cv: Signal::Disconnected,
            dur: 1.0,
            dur_cv: Signal::Disconnected,
            div: 3.0,
            div_cv: Signal::Disconnected,
            gate: false,
            gate_cv: Signal::Disconnected,
        }
    }
}

#[derive(Outputs, JsonSchema)]
struct SnapOutputs {
    #[output("out", "burst trigger output", default)]
    out: f32,
}

#[derive(Default, Module)]
#[module("snap", "Triggered burst generator spacing divisions over beats")]
pub struct Snap {
    outputs: SnapOutputs,
    params: SnapParams,
    gate_trigger: GateTrigger,
    timer: Timer,
    pulse: PulseGenerator,
    div: u32,
    count: u32,
    active: bool,
}

message_handlers!(impl Snap {});

impl Snap {
    fn start_burst(&mut self) {
        self.div = cv_scale(self.params.div, &self.params.div_cv)
            .floor()
            .max(1.0) as u32;
        self.timer.reset();
        self.pulse.trigger(TRIGGER_WIDTH);
        self.count = 0;
        self.active = true;
    }

    fn update(&mut self, sample_rate: f32) {
        let delta = 1.0 / sample_rate;

        let gate_voltage = if self.params.gate { 10.0 } else { 0.0 }
            + self.params.gate_cv.get_value_or(0.0);
        if self.gate_trigger.process(gate_voltage) {
            self.start_burst();
        }

        if self.active {
            let bpm = cv_scale(self.params.bpm, &self.params.bpm_cv).max(1.0);
            let beat = 60.0 / bpm * cv_scale(self.params.dur, &self.params.dur_cv);
            let spacing = beat / self.div as f32;
            if self.count >= self.div - 1 {
                self.count = 0;
                self.active = false;
            } else if self.timer.process(delta) >= spacing {
                self.timer.reset();
                self.pulse.trigger(TRIGGER_WIDTH);
                self.count += 1;
            }
        }

        self.outputs.out = if self.pulse.process(delta) { 10.0 } else { 0.0 };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poly::PolyOutput;

    const SAMPLE_RATE: f32 = 1000.0;

    fn collect_edges(module: &mut Snap, ticks: usize) -> Vec<usize> {
        let mut edges = Vec::new();
        let mut was_high = false;
        for t in 0..ticks {
            module.update(SAMPLE_RATE);
            let high = module.outputs.out > 5.0;
            if high && !was_high {
                edges.push(t);
            }
            was_high = high;
        }
        edges
    }

    #[test]
    fn test_idle_until_gated() {
        let mut module = Snap::default();
        assert!(collect_edges(&mut module, 1000).is_empty());
    }

    #[test]
    fn test_burst_spacing() {
        let mut module = Snap::default();
        module.params.div = 4.0;
        module.update(SAMPLE_RATE);
        module.params.gate = true;
        // 120 BPM, 1 beat, 4 divisions: triggers at 0, 125, 250, 375 ms.
        let edges = collect_edges(&mut module, 1000);
        assert_eq!(edges.len(), 4);
        let gap = edges[1] - edges[0];
        assert!((124..=126).contains(&gap), "gap was {}", gap);
        assert!(edges[3] < 400);
    }

    #[test]
    fn test_burst_ends_after_div_triggers() {
        let mut module = Snap::default();
        module.update(SAMPLE_RATE);
        module.params.gate = true;
        let edges = collect_edges(&mut module, 2000);
        assert_eq!(edges.len(), 3);
        assert!(!module.active);
    }

    #[test]
    fn test_gate_cv_edge_fires_burst() {
        let mut module = Snap::default();
        module.params.div = 2.0;
        module.params.gate_cv = Signal::Volts(PolyOutput::mono(0.0));
        module.update(SAMPLE_RATE);
        module.params.gate_cv = Signal::Volts(PolyOutput::mono(5.0));
        let edges = collect_edges(&mut module, 1000);
        assert_eq!(edges.len(), 2);
        // Dropping to 0 V re-arms the trigger; the next edge fires a
        // fresh burst.
        module.params.gate_cv = Signal::Volts(PolyOutput::mono(0.0));
        module.update(SAMPLE_RATE);
        module.params.gate_cv = Signal::Volts(PolyOutput::mono(5.0));
        let edges = collect_edges(&mut module, 1000);
        assert_eq!(edges.len(), 2);
    }

    #[test]
    fn test_retrigger_restarts_burst() {
        let mut module = Snap::default();
        module.update(SAMPLE_RATE);
        module.params.gate = true;
        // Let one trigger out, then retrigger mid-burst.
        collect_edges(&mut module, 100);
        module.params.gate = false;
        module.update(SAMPLE_RATE);
        module.params.gate = true;
        let edges = collect_edges(&mut module, 2000);
        assert_eq!(edges.len(), 3);
    }

    #[test]
    fn test_div_floor_clamps_to_one() {
        let mut module = Snap::default();
        module.params.div = 0.0;
        module.update(SAMPLE_RATE);
        module.params.gate = true;
        let edges = collect_edges(&mut module, 1000);
        assert_eq!(edges.len(), 1);
    }
}
