//! Gate-driven rewrite-system divider.
//!
//! Advances on rising gate edges instead of its own clock. Each symbol maps
//! to an integer division value: the gate passes through once per `div`
//! edges. Rewrite depth is bounded; past the bound the word resets to the
//! seed so the pattern breathes instead of growing forever.

use anyhow::Result;
use schemars::JsonSchema;
use serde::Deserialize;

use crate::dsp::seq::word::RewriteSystem;
use crate::dsp::utils::GateTrigger;
use crate::types::{ClockMessages, EditMessages, Signal};

const WORD_MAX: usize = 8;
const RULE_MAX: usize = 4;
const DEPTH_MAX: u32 = 4;

#[derive(Deserialize, JsonSchema, Connect)]
#[serde(default, rename_all = "camelCase")]
struct RenickGateParams {
    gate: Signal,
    /// division value of symbol A (integer, 1..16)
    a: f32,
    /// division value of symbol B (integer, 1..16)
    b: f32,
    /// division value of symbol C (integer, 1..16)
    c: f32,
    /// division value of symbol D (integer, 1..16)
    d: f32,
}

impl Default for RenickGateParams {
    fn default() -> Self {
        Self {
            gate: Signal::Disconnected,
            a: 1.0,
            b: 1.0,
            c: 1.0,
            d: 1.0,
        }
    }
}

#[derive(Outputs, JsonSchema)]
struct RenickGateOutputs {
    #[output("out", "gate passthrough output", default)]
    out: f32,
}

#[derive(Default, Module)]
#[module(
    "renickGate",
    "Depth-bounded rewrite-system gate divider"
)]
pub struct RenickGate {
    outputs: RenickGateOutputs,
    params: RenickGateParams,
    system: RewriteSystem<WORD_MAX, RULE_MAX>,
    trigger: GateTrigger,
    depth: u32,
    count: u32,
    div: u32,
    open: bool,
}

message_handlers!(impl RenickGate {
    Clock(m) => RenickGate::on_clock_message,
    SeqEdit(m) => RenickGate::on_seq_edit,
});

impl RenickGate {
    fn symbol_div(&self, symbol: u8) -> u32 {
        let param = match symbol {
            0 => self.params.a,
            1 => self.params.b,
            2 => self.params.c,
            _ => self.params.d,
        };
        (param.floor() as u32).max(1)
    }

    fn on_clock_message(&mut self, m: &ClockMessages) -> Result<()> {
        match m {
            ClockMessages::Reset => {
                self.system.clear();
                self.depth = 0;
                self.count = 0;
                self.open = false;
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

    fn update(&mut self, _sample_rate: f32) {
        if self.params.gate.is_disconnected() {
            return;
        }

        if self.system.is_empty() {
            self.system.seed();
            self.div = self.symbol_div(self.system.current());
        }

        let voltage = self.params.gate.get_value();
        if self.trigger.process(voltage) {
            if self.count == 0 {
                if self.system.advance() {
                    if self.depth < DEPTH_MAX {
                        self.system.rewrite();
                        self.depth += 1;
                    } else {
                        self.depth = 0;
                        self.system.seed();
                    }
                }
                self.div = self.symbol_div(self.system.current());
                self.open = true;
            } else {
                self.open = false;
            }
            self.count = (self.count + 1) % self.div;
        }

        self.outputs.out = if self.open { voltage } else { 0.0 };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poly::PolyOutput;
    use crate::types::Signal;

    fn gate_signal(voltage: f32) -> Signal {
        Signal::Volts(PolyOutput::mono(voltage))
    }

    /// Send one full gate cycle (low to arm, then high) and return whether
    /// the output passed the gate on the high phase.
    fn pulse_gate(module: &mut RenickGate) -> bool {
        module.params.gate = gate_signal(0.0);
        module.update(48000.0);
        module.params.gate = gate_signal(5.0);
        module.update(48000.0);
        module.outputs.out > 0.0
    }

    #[test]
    fn test_disconnected_gate_is_inert() {
        let mut module = RenickGate::default();
        module.update(48000.0);
        assert!(module.system.is_empty());
        assert_eq!(module.outputs.out, 0.0);
    }

    #[test]
    fn test_unit_divisions_pass_every_edge() {
        let mut module = RenickGate::default();
        for _ in 0..8 {
            assert!(pulse_gate(&mut module));
        }
    }

    #[test]
    fn test_division_gates_out_intermediate_edges() {
        let mut module = RenickGate::default();
        module.params.a = 3.0;
        // div = 3: one open edge followed by two closed ones
        assert!(pulse_gate(&mut module));
        assert!(!pulse_gate(&mut module));
        assert!(!pulse_gate(&mut module));
        assert!(pulse_gate(&mut module));
    }

    #[test]
    fn test_open_output_passes_gate_voltage() {
        let mut module = RenickGate::default();
        module.params.gate = gate_signal(0.0);
        module.update(48000.0);
        module.params.gate = gate_signal(7.5);
        module.update(48000.0);
        assert_eq!(module.outputs.out, 7.5);
    }

    #[test]
    fn test_closed_output_is_zero_while_gate_high() {
        let mut module = RenickGate::default();
        module.params.a = 2.0;
        assert!(pulse_gate(&mut module));
        // Second edge is gated out even while the voltage is high.
        module.params.gate = gate_signal(0.0);
        module.update(48000.0);
        module.params.gate = gate_signal(5.0);
        module.update(48000.0);
        assert_eq!(module.outputs.out, 0.0);
    }

    #[test]
    fn test_depth_bound_reseeds_word() {
        let mut module = RenickGate::default();
        // A -> AA doubles the word every wrap until the depth bound.
        module
            .on_seq_edit(&EditMessages::AppendToSelectedRule(0))
            .unwrap();
        module
            .on_seq_edit(&EditMessages::AppendToSelectedRule(0))
            .unwrap();

        let mut max_len = 0;
        for _ in 0..64 {
            pulse_gate(&mut module);
            max_len = max_len.max(module.system.len());
            assert!(module.system.len() <= WORD_MAX);
        }
        // The word grew, hit the cap, and later reseeded back to length 1.
        assert_eq!(max_len, WORD_MAX);
        let mut reseeded = false;
        for _ in 0..64 {
            pulse_gate(&mut module);
            if module.system.len() == 1 {
                reseeded = true;
                break;
            }
        }
        assert!(reseeded);
    }

    #[test]
    fn test_reset_message_clears_state() {
        let mut module = RenickGate::default();
        module.params.a = 4.0;
        pulse_gate(&mut module);
        pulse_gate(&mut module);
        module.on_clock_message(&ClockMessages::Reset).unwrap();
        assert_eq!(module.count, 0);
        assert!(module.system.is_empty());
        // First edge after reset opens again immediately.
        assert!(pulse_gate(&mut module));
    }
}
