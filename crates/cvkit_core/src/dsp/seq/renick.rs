//! Free-running rewrite-system sequencer.
//!
//! Steps through the current word on its own clock: each symbol holds for a
//! per-symbol duration in milliseconds (attenuated by CV), scaled by a global
//! time factor. When the cursor wraps, the word is rewritten through the rule
//! table. Rules, word, cursor, and selection survive save/restore.

use anyhow::Result;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::dsp::seq::word::{RewriteSystem, SYMBOL_COUNT};
use crate::dsp::utils::{PulseGenerator, Timer, cv_scale};
use crate::types::{ClockMessages, EditMessages, Signal};

const WORD_MAX: usize = 16;
const RULE_MAX: usize = 8;
const TRIGGER_WIDTH: f32 = 1e-3;

#[derive(Deserialize, JsonSchema, Connect)]
#[serde(default, rename_all = "camelCase")]
struct RenickParams {
    /// duration of symbol A in milliseconds
    a: f32,
    /// duration of symbol B in milliseconds
    b: f32,
    /// duration of symbol C in milliseconds
    c: f32,
    /// duration of symbol D in milliseconds
    d: f32,
    a_cv: Signal,
    b_cv: Signal,
    c_cv: Signal,
    d_cv: Signal,
    /// global time factor: durations are divided by this
    time: f32,
}

impl Default for RenickParams {
    fn default() -> Self {
        Self {
            a: 250.0,
            b: 500.0,
            c: 750.0,
            d: 1000.0,
            a_cv: Signal::Disconnected,
            b_cv: Signal::Disconnected,
            c_cv: Signal::Disconnected,
            d_cv: Signal::Disconnected,
            time: 1.0,
        }
    }
}

#[derive(Outputs, JsonSchema)]
struct RenickOutputs {
    #[output("out", "step trigger output", default)]
    out: f32,
}

#[derive(Default, Module)]
#[module(
    "renick",
    "Rewrite-system sequencer with per-symbol step durations"
)]
#[stateful]
pub struct Renick {
    outputs: RenickOutputs,
    params: RenickParams,
    system: RewriteSystem<WORD_MAX, RULE_MAX>,
    timer: Timer,
    pulse: PulseGenerator,
    /// current step duration in milliseconds
    dur: f32,
}

message_handlers!(impl Renick {
    Clock(m) => Renick::on_clock_message,
    SeqEdit(m) => Renick::on_seq_edit,
});

impl Renick {
    fn symbol_duration(&self, symbol: u8) -> f32 {
        match symbol {
            0 => cv_scale(self.params.a, &self.params.a_cv),
            1 => cv_scale(self.params.b, &self.params.b_cv),
            2 => cv_scale(self.params.c, &self.params.c_cv),
            _ => cv_scale(self.params.d, &self.params.d_cv),
        }
    }

    fn on_clock_message(&mut self, m: &ClockMessages) -> Result<()> {
        match m {
            ClockMessages::Reset => {
                self.system.clear();
                self.timer.reset();
                self.dur = 0.0;
            }
            ClockMessages::Start | ClockMessages::Stop => {}
        }
        Ok(())
    }

    fn on_seq_edit(&mut self, m: &EditMessages) -> Result<()> {
        match m {
            EditMessages::MoveSelectionUp => self.system.move_selection_up(),
            EditMessages::MoveSelectionDown => self.system.move_selection_down(),
            EditMessages::ClearSelectedRule => self.system.clear_selected_rule(),
            EditMessages::AppendToSelectedRule(symbol) => {
                self.system.append_to_selected_rule(*symbol)
            }
        }
        Ok(())
    }

    fn update(&mut self, sample_rate: f32) {
        let delta = 1.0 / sample_rate;

        // An empty word (fresh module, or collapsed by all-empty rules)
        // reseeds to a single symbol A.
        if self.system.is_empty() {
            self.system.seed();
            self.dur = self.symbol_duration(self.system.current());
        }

        let time_scale = self.params.time.max(0.01);
        if self.timer.process(delta) >= self.dur / (1000.0 * time_scale) {
            self.pulse.trigger(TRIGGER_WIDTH);
            self.timer.reset();
            if self.system.advance() {
                self.system.rewrite();
            }
            self.dur = self.symbol_duration(self.system.current());
        }

        self.outputs.out = if self.pulse.process(delta) { 10.0 } else { 0.0 };
    }
}

impl crate::types::StatefulModule for Renick {
    fn get_state(&self) -> Option<Value> {
        Some(json!({
            "selection": self.system.selection(),
            "pos": self.system.pos(),
            "word": self.system.word(),
            "rule_0": self.system.rule(0),
            "rule_1": self.system.rule(1),
            "rule_2": self.system.rule(2),
            "rule_3": self.system.rule(3),
        }))
    }

    fn set_state(&mut self, state: &Value) {
        // Tolerant restore: absent or malformed fields keep current values,
        // invalid entries are skipped, oversized arrays truncate.
        fn symbols(value: &Value) -> Option<impl Iterator<Item = u8> + '_> {
            value.as_array().map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_u64)
                    .filter_map(|v| u8::try_from(v).ok())
            })
        }

        if let Some(word) = state.get("word").and_then(|v| symbols(v)) {
            self.system.set_word(word);
        }
        for i in 0..SYMBOL_COUNT {
            if let Some(rule) = state.get(format!("rule_{}", i)).and_then(|v| symbols(v)) {
                self.system.set_rule(i, rule);
            }
        }
        if let Some(selection) = state.get("selection").and_then(Value::as_u64) {
            self.system.set_selection(selection as usize);
        }
        if let Some(pos) = state.get("pos").and_then(Value::as_u64) {
            self.system.set_pos(pos as usize);
        }
        self.dur = self.symbol_duration(self.system.current());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StatefulModule;

    const SAMPLE_RATE: f32 = 1000.0;

    /// Step `module` for `ticks` samples, returning the tick index of every
    /// rising edge on the trigger output.
    fn collect_edges(module: &mut Renick, ticks: usize) -> Vec<usize> {
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
    fn test_default_word_steps_at_symbol_a_duration() {
        let mut module = Renick::default();
        // Symbol A defaults to 250ms; at 1kHz that is one pulse per 250 ticks.
        let edges = collect_edges(&mut module, 1100);
        assert_eq!(edges.len(), 4);
        let gap = edges[1] - edges[0];
        assert!((249..=251).contains(&gap), "gap was {}", gap);
    }

    #[test]
    fn test_time_factor_speeds_up_steps() {
        let mut module = Renick::default();
        module.params.time = 2.0;
        let edges = collect_edges(&mut module, 1100);
        // 250ms / 2 = 125ms per step
        assert_eq!(edges.len(), 8);
    }

    #[test]
    fn test_word_follows_rule_durations() {
        let mut module = Renick::default();
        // A -> AB: after the first wrap the word alternates 250ms and 500ms
        // steps.
        module
            .on_seq_edit(&EditMessages::AppendToSelectedRule(0))
            .unwrap();
        module
            .on_seq_edit(&EditMessages::AppendToSelectedRule(1))
            .unwrap();
        // First step (250ms) rewrites to [A, B]; then 250ms + 500ms cycles.
        let edges = collect_edges(&mut module, 1600);
        assert!(edges.len() >= 3);
        let second_gap = edges[2] - edges[1];
        assert!((499..=501).contains(&second_gap), "gap was {}", second_gap);
    }

    #[test]
    fn test_empty_rules_reseed_keeps_stepping() {
        let mut module = Renick::default();
        // No rules: every wrap collapses the word, which reseeds to [A].
        let edges = collect_edges(&mut module, 2000);
        assert_eq!(edges.len(), 8);
    }

    #[test]
    fn test_edit_messages_cycle_selection() {
        let mut module = Renick::default();
        module
            .on_seq_edit(&EditMessages::MoveSelectionDown)
            .unwrap();
        assert_eq!(module.system.selection(), 1);
        module.on_seq_edit(&EditMessages::MoveSelectionUp).unwrap();
        module.on_seq_edit(&EditMessages::MoveSelectionUp).unwrap();
        assert_eq!(module.system.selection(), 3);
    }

    #[test]
    fn test_state_round_trip() {
        let mut module = Renick::default();
        module
            .on_seq_edit(&EditMessages::AppendToSelectedRule(0))
            .unwrap();
        module
            .on_seq_edit(&EditMessages::AppendToSelectedRule(1))
            .unwrap();
        for _ in 0..600 {
            module.update(SAMPLE_RATE);
        }
        let state = module.get_state().unwrap();

        let mut restored = Renick::default();
        restored.set_state(&state);
        assert_eq!(restored.system.word(), module.system.word());
        assert_eq!(restored.system.pos(), module.system.pos());
        assert_eq!(restored.system.rule(0), module.system.rule(0));
    }

    #[test]
    fn test_state_restore_is_tolerant() {
        let mut module = Renick::default();
        // Malformed word entries are skipped, oversized rule truncates,
        // unknown fields are ignored, pos reclamps.
        module.set_state(&json!({
            "word": [0, "x", 1, 99, 2],
            "rule_0": [0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
            "pos": 12,
            "bogus": true,
        }));
        assert_eq!(module.system.word(), &[0, 1, 2]);
        assert_eq!(module.system.rule(0).len(), RULE_MAX);
        assert_eq!(module.system.pos(), 0);

        // A state that is not even an object leaves everything untouched.
        module.set_state(&json!("garbage"));
        assert_eq!(module.system.word(), &[0, 1, 2]);
    }

    #[test]
    fn test_reset_message_clears_sequence() {
        let mut module = Renick::default();
        module
            .on_seq_edit(&EditMessages::AppendToSelectedRule(1))
            .unwrap();
        for _ in 0..300 {
            module.update(SAMPLE_RATE);
        }
        module.on_clock_message(&ClockMessages::Reset).unwrap();
        assert!(module.system.is_empty());
        assert!(module.system.rule(0).is_empty());
        // Stepping resumes from a fresh seed.
        let edges = collect_edges(&mut module, 600);
        assert_eq!(edges.len(), 2);
    }
}
