use crate::types::Signal;

/// Map a value from one range to another. If the input range is degenerate, returns `y0`.
pub fn map_range(x: f32, x0: f32, x1: f32, y0: f32, y1: f32) -> f32 {
    let denom = x1 - x0;
    if denom.abs() < f32::EPSILON {
        return y0;
    }
    (x - x0) * (y1 - y0) / denom + y0
}

/// Attenuate a parameter by its CV input.
///
/// The CV is normalled to 10 V, rectified, and scaled to 0..1, so a
/// disconnected CV yields the bare parameter value and a full-scale CV
/// leaves it unchanged.
pub fn cv_scale(param: f32, cv: &Signal) -> f32 {
    param * cv.get_value_or(10.0).abs() / 10.0
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SchmittState {
    Low,
    High,
    Uninitialized,
}

/// Reusable Schmitt trigger with hysteresis
#[derive(Debug, Clone, Copy)]
pub struct SchmittTrigger {
    pub state: SchmittState,
    low_threshold: f32,
    high_threshold: f32,
}

impl SchmittTrigger {
    /// Create a new Schmitt trigger with the given thresholds
    pub fn new(low_threshold: f32, high_threshold: f32) -> Self {
        Self {
            state: SchmittState::Uninitialized,
            low_threshold,
            high_threshold,
        }
    }

    /// Process a sample through the Schmitt trigger
    /// Returns true if it toggled from low to high
    pub fn process(&mut self, input: f32) -> bool {
        match self.state {
            SchmittState::Uninitialized => {
                // Initialize state based on input
                if input >= self.high_threshold {
                    self.state = SchmittState::High;
                } else {
                    self.state = SchmittState::Low;
                }
            }
            SchmittState::High => {
                // Currently high - check if we should go low
                if input < self.low_threshold {
                    self.state = SchmittState::Low;
                }
            }
            SchmittState::Low => {
                // Currently low - check if we should go high
                if input > self.high_threshold {
                    self.state = SchmittState::High;
                    return true;
                }
            }
        }

        false
    }

    /// Get current state
    pub fn state(&self) -> SchmittState {
        self.state
    }

    /// Reset state to Uninitialized
    pub fn reset(&mut self) {
        self.state = SchmittState::Uninitialized;
    }
}

impl Default for SchmittTrigger {
    fn default() -> Self {
        Self::new(0.0, 1.0)
    }
}

/// Edge detector for gate CV inputs.
///
/// The incoming voltage is remapped so the trigger fires once above ~2 V and
/// re-arms below ~0.1 V, which keeps noisy gate signals from double-firing.
#[derive(Debug, Clone, Copy, Default)]
pub struct GateTrigger {
    inner: SchmittTrigger,
}

impl GateTrigger {
    /// Returns true on a rising edge of the gate voltage.
    pub fn process(&mut self, voltage: f32) -> bool {
        self.inner.process(map_range(voltage, 0.1, 2.0, 0.0, 1.0))
    }

    pub fn reset(&mut self) {
        self.inner.reset();
    }
}

/// Accumulates elapsed time in seconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct Timer {
    time: f32,
}

impl Timer {
    /// Advance by `delta` seconds and return the accumulated time.
    pub fn process(&mut self, delta: f32) -> f32 {
        self.time += delta;
        self.time
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn reset(&mut self) {
        self.time = 0.0;
    }
}

/// Emits a fixed-width pulse. Re-triggering restarts the pulse.
#[derive(Debug, Clone, Copy, Default)]
pub struct PulseGenerator {
    remaining: f32,
}

impl PulseGenerator {
    pub fn trigger(&mut self, width: f32) {
        self.remaining = width;
    }

    /// Advance by `delta` seconds; returns true while the pulse is high.
    pub fn process(&mut self, delta: f32) -> bool {
        if self.remaining > 0.0 {
            self.remaining -= delta;
            return true;
        }
        false
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LcgRng {
    state: u64,
}

impl Default for LcgRng {
    fn default() -> Self {
        Self {
            state: 0x1234_5678_9abc_def0,
        }
    }
}

impl LcgRng {
    /// Next value in [0, 1).
    pub fn uniform(&mut self) -> f32 {
        self.state = self.state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bits = (self.state >> 32) as u32;
        bits as f32 / (u32::MAX as f32 + 1.0)
    }
}
