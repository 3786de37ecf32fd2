//! Master BPM clock with binary divisions.
//!
//! Emits a trigger every beat plus divided triggers every 2, 4, 8, and 16
//! beats, and a CV encoding of the current beat duration. Four mutually
//! exclusive multiplier toggles rescale the tempo by 1/4, 1/2, 2, or 4.

use anyhow::Result;
use schemars::JsonSchema;
use serde::Deserialize;

use crate::dsp::utils::{GateTrigger, PulseGenerator, Timer, map_range};
use crate::types::{ClockMessages, Signal};

const BPM_MIN: f32 = 1.0;
const BPM_MAX: f32 = 1920.0;
const TRIGGER_WIDTH: f32 = 1e-3;

#[derive(Deserialize, JsonSchema, Connect)]
#[serde(default, rename_all = "camelCase")]
struct TimothyParams {
    /// beats per minute (1..1920)
    bpm: f32,
    /// when connected, |voltage| maps 0..10 onto the BPM range and the
    /// bpm param is ignored
    bpm_cv: Signal,
    reset: bool,
    reset_cv: Signal,
    /// clock runs while set
    run: bool,
    /// multiply tempo by 1/4
    mul_quarter: bool,
    mul_quarter_cv: Signal,
    /// multiply tempo by 1/2
    mul_half: bool,
    mul_half_cv: Signal,
    /// multiply tempo by 2
    mul_two: bool,
    mul_two_cv: Signal,
    /// multiply tempo by 4
    mul_four: bool,
    mul_four_cv: Signal,
}

impl Default for TimothyParams {
    fn default() -> Self {
        Self {
            bpm: 120.0,
            bpm_cv: Signal::Disconnected,
            reset: false,
            reset_cv: Signal::Disconnected,
            run: true,
            mul_quarter: false,
            mul_quarter_cv: Signal::Disconnected,
            mul_half: false,
            mul_half_cv: Signal::Disconnected,
            mul_two: false,
            mul_two_cv: Signal::Disconnected,
            mul_four: false,
            mul_four_cv: Signal::Disconnected,
        }
    }
}

#[derive(Outputs, JsonSchema)]
struct TimothyOutputs {
    #[output("bpmOut", "beat duration as CV (0..10)")]
    bpm_out: f32,
    #[output("out1", "trigger every beat", default)]
    out_1: f32,
    #[output("out2", "trigger every 2 beats")]
    out_2: f32,
    #[output("out4", "trigger every 4 beats")]
    out_4: f32,
    #[output("out8", "trigger every 8 beats")]
    out_8: f32,
    #[output("out16", "trigger every 16 beats")]
    out_16: f32,
}

#[derive(Default, Module)]
#[module(
    "timothy",
    "Master BPM clock with binary divisions and tempo multiplier toggles"
)]
pub struct Timothy {
    outputs: TimothyOutputs,
    params: TimothyParams,
    timer: Timer,
    pulse: PulseGenerator,
    reset_trigger: GateTrigger,
    mul_triggers: [GateTrigger; 4],
    prev_toggles: [bool; 4],
    count: u32,
    fire: [bool; 4],
    /// remaining dead time after a reset, in seconds
    dead_time: f32,
}

message_handlers!(impl Timothy {
    Clock(m) => Timothy::on_clock_message,
});

impl Timothy {
    fn on_clock_message(&mut self, m: &ClockMessages) -> Result<()> {
        match m {
            ClockMessages::Start => self.params.run = true,
            ClockMessages::Stop => self.params.run = false,
            ClockMessages::Reset => self.reset(),
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.timer.reset();
        self.count = 0;
        self.fire = [false; 4];
        self.dead_time = TRIGGER_WIDTH;
    }

    /// Flip toggles on their CV edges, then enforce mutual exclusion: a
    /// newly active toggle wins and clears the others.
    fn resolve_toggles(&mut self) {
        let edges = [
            self.mul_triggers[0]
                .process(self.params.mul_quarter_cv.get_value_or(0.0)),
            self.mul_triggers[1].process(self.params.mul_half_cv.get_value_or(0.0)),
            self.mul_triggers[2].process(self.params.mul_two_cv.get_value_or(0.0)),
            self.mul_triggers[3].process(self.params.mul_four_cv.get_value_or(0.0)),
        ];
        let mut toggles = [
            self.params.mul_quarter,
            self.params.mul_half,
            self.params.mul_two,
            self.params.mul_four,
        ];
        for (toggle, edge) in toggles.iter_mut().zip(edges) {
            if edge {
                *toggle = !*toggle;
            }
        }
        if let Some(winner) = (0..4).find(|&i| toggles[i] && !self.prev_toggles[i]) {
            for (i, toggle) in toggles.iter_mut().enumerate() {
                *toggle = i == winner;
            }
        }
        self.prev_toggles = toggles;
        self.params.mul_quarter = toggles[0];
        self.params.mul_half = toggles[1];
        self.params.mul_two = toggles[2];
        self.params.mul_four = toggles[3];
    }

    fn tempo_factor(&self) -> f32 {
        if self.params.mul_quarter {
            0.25
        } else if self.params.mul_half {
            0.5
        } else if self.params.mul_two {
            2.0
        } else if self.params.mul_four {
            4.0
        } else {
            1.0
        }
    }

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
        60.0 / (bpm * self.tempo_factor()).clamp(BPM_MIN, BPM_MAX)
    }

    fn update(&mut self, sample_rate: f32) {
        let delta = 1.0 / sample_rate;

        self.resolve_toggles();

        let duration = self.beat_duration();
        self.outputs.bpm_out =
            map_range(duration, 60.0 / BPM_MAX, 60.0 / BPM_MIN, 0.0, 10.0);

        if !self.params.run {
            return;
        }

        let reset_voltage = if self.params.reset { 10.0 } else { 0.0 }
            + self.params.reset_cv.get_value_or(0.0);
        if self.reset_trigger.process(reset_voltage) {
            self.reset();
        }
        if self.dead_time > 0.0 {
            self.dead_time -= delta;
            return;
        }

        if self.timer.process(delta) >= duration {
            self.timer.reset();
            self.pulse.trigger(TRIGGER_WIDTH);
            self.fire = [
                self.count % 2 == 0,
                self.count % 4 == 0,
                self.count % 8 == 0,
                self.count % 16 == 0,
            ];
            self.count = (self.count + 1) % 16;
        }

        let high = self.pulse.process(delta);
        self.outputs.out_1 = if high { 10.0 } else { 0.0 };
        self.outputs.out_2 = if high && self.fire[0] { 10.0 } else { 0.0 };
        self.outputs.out_4 = if high && self.fire[1] { 10.0 } else { 0.0 };
        self.outputs.out_8 = if high && self.fire[2] { 10.0 } else { 0.0 };
        self.outputs.out_16 = if high && self.fire[3] { 10.0 } else { 0.0 };
    }
}
