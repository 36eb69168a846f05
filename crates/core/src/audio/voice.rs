use std::f64::consts::PI;

/// Naive sawtooth generator with a fixed detune.
#[derive(Debug, Clone)]
pub struct Sawtooth {
    phase: f64,
    increment: f64,
    detune_ratio: f64,
}

impl Sawtooth {
    pub fn new(detune_cents: f32, initial_phase: f64) -> Self {
        Self {
            phase: initial_phase.rem_euclid(1.0),
            increment: 0.0,
            detune_ratio: 2.0f64.powf(f64::from(detune_cents) / 1200.0),
        }
    }

    pub fn set_frequency(&mut self, frequency_hz: f64, sample_rate: f64) {
        self.increment = frequency_hz * self.detune_ratio / sample_rate;
    }

    /// Frequency actually produced, detune included.
    pub fn frequency(&self, sample_rate: f64) -> f64 {
        self.increment * sample_rate
    }

    pub fn next_sample(&mut self) -> f32 {
        let value = 2.0 * self.phase - 1.0;
        self.phase += self.increment;
        if self.phase >= 1.0 {
            self.phase -= self.phase.floor();
        }
        value as f32
    }
}

/// Two cascaded one-pole sections, 12 dB per octave.
#[derive(Debug, Clone, Default)]
pub struct LowPass {
    coefficient: f32,
    stages: [f32; 2],
    cutoff_hz: f64,
}

impl LowPass {
    pub fn set_cutoff(&mut self, cutoff_hz: f64, sample_rate: f64) {
        self.cutoff_hz = cutoff_hz;
        self.coefficient = (1.0 - (-2.0 * PI * cutoff_hz / sample_rate).exp()) as f32;
    }

    pub fn cutoff_hz(&self) -> f64 {
        self.cutoff_hz
    }

    pub fn reset(&mut self) {
        self.stages = [0.0; 2];
    }

    pub fn process(&mut self, input: f32) -> f32 {
        let mut signal = input;
        for stage in &mut self.stages {
            *stage += self.coefficient * (signal - *stage);
            signal = *stage;
        }
        signal
    }
}

/// Linear gain automation on the sample clock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainRamp {
    from: f32,
    to: f32,
    start: u64,
    end: u64,
}

impl GainRamp {
    pub fn hold(value: f32) -> Self {
        Self {
            from: value,
            to: value,
            start: 0,
            end: 0,
        }
    }

    /// Ramps from `from` at sample `start` to `to` over `length` samples.
    pub fn linear(from: f32, to: f32, start: u64, length: u64) -> Self {
        Self {
            from,
            to,
            start,
            end: start + length.max(1),
        }
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn target(&self) -> f32 {
        self.to
    }

    pub fn value_at(&self, sample: u64) -> f32 {
        if sample >= self.end {
            return self.to;
        }
        if sample <= self.start {
            return self.from;
        }
        let progress = (sample - self.start) as f32 / (self.end - self.start) as f32;
        self.from + (self.to - self.from) * progress
    }
}
