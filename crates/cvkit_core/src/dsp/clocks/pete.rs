//! Beat-synced loop recorder.
//!
//! Continuously records its input into a ring buffer sized to four beats at
//! the current BPM. Toggling playback on freezes a copy of the buffer and
//! replays a tail section of it, selected by a binary divider, at a variable
//! speed and level. While playback is off the input passes through.

use schemars::JsonSchema;
use serde::Deserialize;

use crate::dsp::utils::{GateTrigger, cv_scale, map_range};
use crate::types::Signal;

const BPM_MIN: f32 = 1.0;
const BPM_MAX: f32 = 1920.0;
const LOOP_BEATS: f32 = 4.0;

#[derive(Deserialize, JsonSchema, Connect)]
#[serde(default, rename_all = "camelCase")]
struct PeteParams {
    input: Signal,
    /// beats per minute (1..1920)
    bpm: f32,
    /// when connected, |voltage| maps 0..10 onto the BPM range and the
    /// bpm param is ignored
    bpm_cv: Signal,
    /// playback toggle
    on: bool,
    on_cv: Signal,
    /// binary divider exponent (0..8): play the last 1/2^div of the loop
    div: f32,
    div_cv: Signal,
    /// playback speed in samples per sample (-8..8)
    speed: f32,
    speed_cv: Signal,
    /// playback level (0..2)
    mul: f32,
    mul_cv: Signal,
}

impl Default for PeteParams {
    fn default() -> Self {
        Self {
            input: Signal::Disconnected,
            bpm: 120.0,
            bpm_cv: Signal::Disconnected,
            on: false,
            on_cv: Signal::Disconnected,
            div: 0.0,
            div_cv: Signal::Disconnected,
            speed: 1.0,
            speed_cv: Signal::Disconnected,
            mul: 1.0,
            mul_cv: Signal::Disconnected,
        }
    }
}

#[derive(Outputs, JsonSchema)]
struct PeteOutputs {
    #[output("out", "loop or passthrough output", default)]
    out: f32,
}

#[derive(Default, Module)]
#[module("pete", "Beat-synced loop recorder with divided tail playback")]
pub struct Pete {
    outputs: PeteOutputs,
    params: PeteParams,
    on_trigger: GateTrigger,
    record: Vec<f32>,
    playback: Vec<f32>,
    write_pos: usize,
    read_pos: f64,
    start_pos: f64,
    was_on: bool,
}

message_handlers!(impl Pete {});

impl Pete {
    fn beat_duration(&self) -> f32 {
        let bpm = if self.params.bpm_cv.is_disconnected() {
            self.params.bpm
        } else {
            map_range(
                self.params.bpm_cv.get_value().abs(),
                0.0,
                10.0,
                BPM_MIN,
                BPM_MAX,
            )
        };
        60.0 / bpm.clamp(BPM_MIN, BPM_MAX)
    }

    fn update(&mut self, sample_rate: f32) {
        let target = (self.beat_duration() * sample_rate * LOOP_BEATS) as usize;
        if target == 0 {
            return;
        }
        // Converge on the target length one sample per tick so BPM changes
        // never cause a bulk reallocation on the audio thread.
        if self.record.len() < target {
            self.record.push(0.0);
        } else if self.record.len() > target {
            self.record.pop();
        }
        if self.record.is_empty() {
            return;
        }

        let input = self.params.input.get_value_or(0.0);
        if !self.params.input.is_disconnected() {
            let len = self.record.len();
            self.record[self.write_pos % len] = input;
            self.write_pos = (self.write_pos + 1) % len;
        }

        if self.on_trigger.process(self.params.on_cv.get_value_or(0.0)) {
            self.params.on = !self.params.on;
        }

        if self.params.on && !self.was_on {
            self.playback.clear();
            self.playback.extend_from_slice(&self.record);
            let divider = 2_f32.powi(cv_scale(self.params.div, &self.params.div_cv) as i32);
            self.start_pos = (1.0 - 1.0 / divider as f64) * self.playback.len() as f64;
            self.read_pos = self.start_pos;
        }
        self.was_on = self.params.on;

        if self.params.on && !self.playback.is_empty() {
            let len = self.playback.len();
            let level = self.params.mul * self.params.mul_cv.get_value_or(10.0) / 10.0;
            self.outputs.out = self.playback[(self.read_pos as usize) % len] * level;
            self.read_pos += cv_scale(self.params.speed, &self.params.speed_cv) as f64;
            if self.read_pos >= len as f64 || self.read_pos < 0.0 {
                self.read_pos = self.start_pos;
            }
        } else {
            self.outputs.out = input;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poly::PolyOutput;

    const SAMPLE_RATE: f32 = 1000.0;

    fn input(voltage: f32) -> Signal {
        Signal::Volts(PolyOutput::mono(voltage))
    }

    /// Run enough ticks for the ring buffer to reach its target length
    /// (2000 samples at 120 BPM and 1 kHz).
    fn fill_buffer(module: &mut Pete, voltage: f32, ticks: usize) {
        module.params.input = input(voltage);
        for _ in 0..ticks {
            module.update(SAMPLE_RATE);
        }
    }

    #[test]
    fn test_passthrough_while_off() {
        let mut module = Pete::default();
        fill_buffer(&mut module, 3.5, 10);
        assert_eq!(module.outputs.out, 3.5);
    }

    #[test]
    fn test_disconnected_input_outputs_zero() {
        let mut module = Pete::default();
        for _ in 0..10 {
            module.update(SAMPLE_RATE);
        }
        assert_eq!(module.outputs.out, 0.0);
    }

    #[test]
    fn test_buffer_converges_to_four_beats() {
        let mut module = Pete::default();
        // 120 BPM at 1 kHz: 0.5s per beat, 4 beats = 2000 samples.
        fill_buffer(&mut module, 0.0, 2500);
        assert_eq!(module.record.len(), 2000);
    }

    #[test]
    fn test_playback_replays_recorded_signal() {
        let mut module = Pete::default();
        fill_buffer(&mut module, 2.0, 4100);
        module.params.on = true;
        module.update(SAMPLE_RATE);
        assert_eq!(module.outputs.out, 2.0);
    }

    #[test]
    fn test_mul_scales_playback() {
        let mut module = Pete::default();
        fill_buffer(&mut module, 2.0, 4100);
        module.params.on = true;
        module.params.mul = 0.5;
        module.update(SAMPLE_RATE);
        assert_eq!(module.outputs.out, 1.0);
    }

    #[test]
    fn test_playback_is_frozen_copy() {
        let mut module = Pete::default();
        fill_buffer(&mut module, 2.0, 4100);
        module.params.on = true;
        module.update(SAMPLE_RATE);
        // New input keeps recording but playback stays on the frozen copy.
        fill_buffer(&mut module, 9.0, 50);
        assert_eq!(module.outputs.out, 2.0);
    }

    #[test]
    fn test_on_cv_edge_toggles_playback() {
        let mut module = Pete::default();
        fill_buffer(&mut module, 2.0, 4100);
        module.params.on_cv = input(0.0);
        module.update(SAMPLE_RATE);
        module.params.on_cv = input(5.0);
        module.update(SAMPLE_RATE);
        assert!(module.params.on);
        assert_eq!(module.outputs.out, 2.0);
        module.params.on_cv = input(0.0);
        module.update(SAMPLE_RATE);
        module.params.on_cv = input(5.0);
        module.update(SAMPLE_RATE);
        assert!(!module.params.on);
    }

    #[test]
    fn test_div_selects_loop_tail() {
        let mut module = Pete::default();
        fill_buffer(&mut module, 1.0, 4100);
        module.params.div = 1.0;
        module.params.on = true;
        module.update(SAMPLE_RATE);
        // div 1 plays the last half of the 2000-sample loop.
        assert_eq!(module.start_pos, 1000.0);
    }

    #[test]
    fn test_loop_wraps_back_to_tail_start() {
        let mut module = Pete::default();
        fill_buffer(&mut module, 1.0, 4100);
        // div 1: the tail starts at sample 1000 of the 2000-sample loop.
        module.params.div = 1.0;
        module.params.on = true;
        // 1000 reads cover the tail exactly; the cursor lands back on the
        // tail start, never on sample 0.
        for _ in 0..1000 {
            module.update(SAMPLE_RATE);
            assert!(module.read_pos >= module.start_pos);
        }
        assert_eq!(module.read_pos, module.start_pos);
    }

    #[test]
    fn test_negative_speed_rewinds_to_start() {
        let mut module = Pete::default();
        fill_buffer(&mut module, 1.0, 4100);
        module.params.speed = -1.0;
        module.params.on = true;
        module.update(SAMPLE_RATE);
        // Reading backwards from start_pos 0 immediately wraps back.
        for _ in 0..10 {
            module.update(SAMPLE_RATE);
        }
        assert!(module.read_pos >= 0.0);
    }
}
