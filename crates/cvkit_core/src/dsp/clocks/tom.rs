//! Eight-lane polyrhythmic pulse clock.
//!
//! Lane `i` completes a cycle every `9 - i` seconds at tempo 1, so the lanes
//! run at integer-ratio speeds (9:8:7:...:2) and slowly drift in and out of
//! phase. A reset realigns all lanes, optionally to randomized offsets.

use anyhow::Result;
use schemars::JsonSchema;
use serde::Deserialize;

use crate::dsp::utils::{GateTrigger, LcgRng, PulseGenerator};
use crate::types::{ClockMessages, Signal};

const NUM_LANES: usize = 8;
const TRIGGER_WIDTH: f32 = 1e-3;

#[derive(Deserialize, JsonSchema, Connect)]
#[serde(default, rename_all = "camelCase")]
struct TomParams {
    /// tempo factor (0..16)
    tempo: f32,
    /// reset button
    reset: f32,
    reset_cv: Signal,
    /// when set, a reset scatters lanes 2-8 to random phase offsets
    randomize_offsets: bool,
}

impl Default for TomParams {
    fn default() -> Self {
        Self {
            tempo: 1.0,
            reset: 0.0,
            reset_cv: Signal::Disconnected,
            randomize_offsets: false,
        }
    }
}

#[derive(Outputs, JsonSchema)]
struct TomOutputs {
    #[output("out1", "lane 1 trigger (9s cycle)", default)]
    out_1: f32,
    #[output("out2", "lane 2 trigger (8s cycle)")]
    out_2: f32,
    #[output("out3", "lane 3 trigger (7s cycle)")]
    out_3: f32,
    #[output("out4", "lane 4 trigger (6s cycle)")]
    out_4: f32,
    #[output("out5", "lane 5 trigger (5s cycle)")]
    out_5: f32,
    #[output("out6", "lane 6 trigger (4s cycle)")]
    out_6: f32,
    #[output("out7", "lane 7 trigger (3s cycle)")]
    out_7: f32,
    #[output("out8", "lane 8 trigger (2s cycle)")]
    out_8: f32,
}

#[derive(Default, Module)]
#[module(
    "tom",
    "Eight-lane polyrhythmic pulse clock with integer-ratio speeds"
)]
pub struct Tom {
    outputs: TomOutputs,
    params: TomParams,
    phases: [f32; NUM_LANES],
    pulses: [PulseGenerator; NUM_LANES],
    reset_trigger: GateTrigger,
    rng: LcgRng,
}

message_handlers!(impl Tom {
    Clock(m) => Tom::on_clock_message,
});

impl Tom {
    fn on_clock_message(&mut self, m: &ClockMessages) -> Result<()> {
        match m {
            ClockMessages::Reset | ClockMessages::Start => self.reset_phases(),
            ClockMessages::Stop => {}
        }
        Ok(())
    }

    fn reset_phases(&mut self) {
        if self.params.randomize_offsets {
            self.phases[0] = 0.0;
            for lane in 1..NUM_LANES {
                self.phases[lane] = (self.rng.uniform() * 6.0 + 1.0) / 8.0;
            }
        } else {
            self.phases = [0.0; NUM_LANES];
        }
    }

    fn update(&mut self, sample_rate: f32) {
        let delta = 1.0 / sample_rate;

        let reset_voltage = self.params.reset + self.params.reset_cv.get_value_or(0.0);
        if self.reset_trigger.process(reset_voltage) {
            self.reset_phases();
        }

        for lane in 0..NUM_LANES {
            let period = (NUM_LANES + 1 - lane) as f32;
            self.phases[lane] += (delta / period) * self.params.tempo;
            if self.phases[lane] >= 1.0 {
                self.phases[lane] %= 1.0;
                self.pulses[lane].trigger(TRIGGER_WIDTH);
            }
        }

        self.outputs.out_1 = if self.pulses[0].process(delta) { 10.0 } else { 0.0 };
        self.outputs.out_2 = if self.pulses[1].process(delta) { 10.0 } else { 0.0 };
        self.outputs.out_3 = if self.pulses[2].process(delta) { 10.0 } else { 0.0 };
        self.outputs.out_4 = if self.pulses[3].process(delta) { 10.0 } else { 0.0 };
        self.outputs.out_5 = if self.pulses[4].process(delta) { 10.0 } else { 0.0 };
        self.outputs.out_6 = if self.pulses[5].process(delta) { 10.0 } else { 0.0 };
        self.outputs.out_7 = if self.pulses[6].process(delta) { 10.0 } else { 0.0 };
        self.outputs.out_8 = if self.pulses[7].process(delta) { 10.0 } else { 0.0 };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: f32 = 1000.0;

    fn count_lane_8_triggers(module: &mut Tom, ticks: usize) -> usize {
        let mut count = 0;
        let mut was_high = false;
        for _ in 0..ticks {
            module.update(SAMPLE_RATE);
            let high = module.outputs.out_8 > 5.0;
            if high && !was_high {
                count += 1;
            }
            was_high = high;
        }
        count
    }

    #[test]
    fn test_fastest_lane_cycles_every_two_seconds() {
        let mut module = Tom::default();
        // 5 seconds at tempo 1: lane 8 (2s cycle) fires at 2s and 4s.
        let count = count_lane_8_triggers(&mut module, 5000);
        assert_eq!(count, 2);
    }

    #[test]
    fn test_tempo_scales_all_lanes() {
        let mut module = Tom::default();
        module.params.tempo = 4.0;
        // Lane 8 now cycles every 0.5s: 5 seconds gives 10 triggers.
        let count = count_lane_8_triggers(&mut module, 5000);
        assert!((9..=10).contains(&count), "count was {}", count);
    }

    #[test]
    fn test_zero_tempo_freezes() {
        let mut module = Tom::default();
        module.params.tempo = 0.0;
        assert_eq!(count_lane_8_triggers(&mut module, 5000), 0);
        assert_eq!(module.phases[7], 0.0);
    }

    #[test]
    fn test_reset_zeroes_phases() {
        let mut module = Tom::default();
        for _ in 0..1500 {
            module.update(SAMPLE_RATE);
        }
        assert!(module.phases[7] > 0.5);
        module.params.reset = 5.0;
        module.update(SAMPLE_RATE);
        assert!(module.phases[7] < 0.01);
    }

    #[test]
    fn test_randomized_offsets_in_range() {
        let mut module = Tom::default();
        module.params.randomize_offsets = true;
        module.on_clock_message(&ClockMessages::Reset).unwrap();
        assert_eq!(module.phases[0], 0.0);
        for lane in 1..NUM_LANES {
            let phase = module.phases[lane];
            assert!((0.125..0.875).contains(&phase), "lane {} at {}", lane, phase);
        }
    }

    #[test]
    fn test_reset_cv_fires_on_every_edge() {
        let mut module = Tom::default();
        module.params.reset_cv = Signal::Volts(crate::poly::PolyOutput::mono(0.0));
        module.update(SAMPLE_RATE);
        for _ in 0..2 {
            for _ in 0..200 {
                module.update(SAMPLE_RATE);
            }
            assert!(module.phases[7] > 0.0);
            // The 0 V low between pulses re-arms the trigger.
            module.params.reset_cv = Signal::Volts(crate::poly::PolyOutput::mono(10.0));
            module.update(SAMPLE_RATE);
            assert!(module.phases[7] < 0.01);
            module.params.reset_cv = Signal::Volts(crate::poly::PolyOutput::mono(0.0));
            module.update(SAMPLE_RATE);
        }
    }

    #[test]
    fn test_reset_edge_fires_once() {
        let mut module = Tom::default();
        module.update(SAMPLE_RATE);
        module.params.reset = 5.0;
        module.update(SAMPLE_RATE);
        // Holding the button does not keep resetting: phases accumulate.
        for _ in 0..100 {
            module.update(SAMPLE_RATE);
        }
        assert!(module.phases[7] > 0.0);
    }
}
