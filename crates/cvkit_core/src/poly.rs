//! Polyphonic voltage blocks for multichannel cables.
//!
//! A single cable can carry up to 16 independent channels. Module outputs
//! publish `PolyOutput` blocks; mono outputs are 1-channel blocks.

use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use std::borrow::Cow;

/// Maximum channels per cable (matches VCV Rack / MIDI convention)
pub const PORT_MAX_CHANNELS: usize = 16;

/// A polyphonic output buffer with channel count metadata.
///
/// The `channels` field indicates how many channels are semantically valid:
/// - 0 = disconnected
/// - 1 = monophonic
/// - 2-16 = polyphonic
#[derive(Clone, Copy, Debug)]
pub struct PolyOutput {
    /// Voltage values for each channel (always allocated, not all may be active)
    voltages: [f32; PORT_MAX_CHANNELS],
    /// Number of active channels: 0 = disconnected, 1 = mono, 2-16 = poly
    channels: usize,
}

impl Default for PolyOutput {
    fn default() -> Self {
        Self {
            voltages: [0.0; PORT_MAX_CHANNELS],
            channels: 0, // Disconnected
        }
    }
}

impl PartialEq for PolyOutput {
    fn eq(&self, other: &Self) -> bool {
        if self.channels != other.channels {
            return false;
        }
        // Only compare active channels
        for i in 0..self.channels {
            if self.voltages[i] != other.voltages[i] {
                return false;
            }
        }
        true
    }
}

impl PolyOutput {
    /// Create a monophonic block with a single value
    pub fn mono(value: f32) -> Self {
        let mut sig = Self::default();
        sig.voltages[0] = value;
        sig.channels = 1;
        sig
    }

    /// Create a polyphonic block from a slice of voltages
    pub fn poly(voltages: &[f32]) -> Self {
        let mut sig = Self::default();
        sig.channels = voltages.len().min(PORT_MAX_CHANNELS);
        sig.voltages[..sig.channels].copy_from_slice(&voltages[..sig.channels]);
        sig
    }

    /// Get voltage for a specific channel (returns 0.0 if out of range)
    pub fn get(&self, channel: usize) -> f32 {
        if channel < self.channels {
            self.voltages[channel]
        } else {
            0.0
        }
    }

    /// Set voltage for a specific channel
    pub fn set(&mut self, channel: usize, value: f32) {
        if channel < PORT_MAX_CHANNELS {
            self.voltages[channel] = value;
        }
    }

    /// Get voltage with modulo cycling: channel wraps around available channels.
    /// A mono block cycles to all channels, a 2-ch block alternates, etc.
    pub fn get_cycling(&self, channel: usize) -> f32 {
        if self.channels == 0 {
            0.0 // Disconnected
        } else {
            self.voltages[channel % self.channels]
        }
    }

    /// Set the number of active channels (clears higher channels to 0)
    pub fn set_channels(&mut self, channels: usize) {
        let channels = channels.clamp(0, PORT_MAX_CHANNELS);
        // Clear channels beyond the new count
        for c in channels..self.channels {
            self.voltages[c] = 0.0;
        }
        self.channels = channels;
    }

    pub fn channels(&self) -> usize {
        self.channels
    }
}

// === Serialization ===

impl Serialize for PolyOutput {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("PolyOutput", 2)?;
        state.serialize_field("channels", &self.channels)?;
        state.serialize_field("voltages", &self.voltages[..self.channels])?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for PolyOutput {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct PolyOutputDe {
            channels: usize,
            voltages: Vec<f32>,
        }

        let de = PolyOutputDe::deserialize(deserializer)?;
        let mut sig = PolyOutput::default();
        sig.channels = de.channels.min(PORT_MAX_CHANNELS);
        for (i, &v) in de.voltages.iter().enumerate().take(sig.channels) {
            sig.voltages[i] = v;
        }
        Ok(sig)
    }
}

// === JsonSchema ===

impl JsonSchema for PolyOutput {
    fn schema_name() -> Cow<'static, str> {
        Cow::Borrowed("PolyOutput")
    }

    fn json_schema(r#gen: &mut schemars::SchemaGenerator) -> schemars::Schema {
        // Schema matches the serialized form
        #[derive(JsonSchema)]
        #[allow(dead_code)]
        struct PolyOutputSchema {
            channels: usize,
            voltages: Vec<f32>,
        }
        PolyOutputSchema::json_schema(r#gen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mono_block() {
        let p = PolyOutput::mono(2.5);
        assert_eq!(p.channels(), 1);
        assert_eq!(p.get(0), 2.5);
        assert_eq!(p.get(1), 0.0);
    }

    #[test]
    fn test_poly_block_cycling() {
        let p = PolyOutput::poly(&[1.0, 2.0, 3.0]);
        assert_eq!(p.channels(), 3);
        assert_eq!(p.get_cycling(4), 2.0);
        // Disconnected block cycles to 0
        assert_eq!(PolyOutput::default().get_cycling(7), 0.0);
    }

    #[test]
    fn test_set_channels_clears_tail() {
        let mut p = PolyOutput::poly(&[1.0, 2.0, 3.0]);
        p.set_channels(1);
        p.set_channels(3);
        assert_eq!(p.get(1), 0.0);
        assert_eq!(p.get(2), 0.0);
    }

    #[test]
    fn test_serde_round_trip() {
        let p = PolyOutput::poly(&[1.0, -2.0]);
        let json = serde_json::to_string(&p).unwrap();
        let back: PolyOutput = serde_json::from_str(&json).unwrap();
        assert_eq!(p, back);
    }
}
