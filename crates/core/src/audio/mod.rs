//! Tone synthesis graph: detuned generators, gain envelope, low-pass and
//! convolution reverb, rendered against a sample-accurate clock.

pub mod reverb;
pub mod voice;

use crate::config::AudioConfig;
use crate::mapping::clamp;
use crate::{Result, ThereminError};

use reverb::{noise_impulse, Convolver};
use voice::{GainRamp, LowPass, Sawtooth};

/// Destination for rendered audio.
pub trait AudioOutput {
    /// Opens or resumes the device at the graph's sample rate. Fails when no
    /// device exists or the host refuses to start playback.
    fn resume(&mut self, sample_rate: u32) -> Result<()>;

    fn write(&mut self, block: &[f32]) -> Result<()>;
}

/// In-memory output, mostly for tests and offline analysis.
#[derive(Debug, Clone)]
pub struct BufferOutput {
    sample_rate: Option<u32>,
    available: bool,
    samples: Vec<f32>,
}

impl BufferOutput {
    pub fn new() -> Self {
        Self {
            sample_rate: None,
            available: true,
            samples: Vec::new(),
        }
    }

    /// An output whose device can never be opened.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    /// Rate requested by the last successful `resume`.
    pub fn sample_rate(&self) -> Option<u32> {
        self.sample_rate
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }
}

impl Default for BufferOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioOutput for BufferOutput {
    fn resume(&mut self, sample_rate: u32) -> Result<()> {
        if self.available {
            self.sample_rate = Some(sample_rate);
            Ok(())
        } else {
            Err(ThereminError::AudioUnavailable(
                "no output device".to_string(),
            ))
        }
    }

    fn write(&mut self, block: &[f32]) -> Result<()> {
        self.samples.extend_from_slice(block);
        Ok(())
    }
}

/// Control surface shared by every frequency producer.
pub trait ToneEngine {
    /// Prepares the output and begins sounding. No-op while already playing.
    fn start(&mut self) -> Result<()>;

    /// Resumes sound on an already started engine. No-op while playing.
    fn play(&mut self) -> Result<()>;

    /// Fades out, then releases the generators once the fade has elapsed.
    /// No-op when silent or already fading.
    fn stop(&mut self);

    /// Moves every generator to `frequency_hz` immediately. Returns the
    /// frequency actually applied after range clamping.
    fn retune(&mut self, frequency_hz: f64) -> f64;

    fn is_playing(&self) -> bool;

    fn frequency(&self) -> f64;

    /// Live generators; zero once a stop has fully released them.
    fn generator_count(&self) -> usize;

    /// Bounds every retune is clamped into.
    fn frequency_range(&self) -> (f64, f64);

    /// Renders `seconds` of audio to the output. Does nothing before the
    /// first successful `start`; negative or non-finite spans are rejected.
    fn advance(&mut self, seconds: f64) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    Silent,
    Sounding,
    /// Fading out; generators are released at the given sample.
    Releasing(u64),
}

/// Generators plus their shaping stages. Dropped as a unit on release.
#[derive(Debug)]
struct Voices {
    generators: Vec<Sawtooth>,
    filter: LowPass,
}

/// Software rendition of the oscillator/gain/filter/reverb graph.
#[derive(Debug)]
pub struct SynthGraph<O: AudioOutput> {
    config: AudioConfig,
    output: O,
    sample_rate: f64,
    range: (f64, f64),
    started: bool,
    phase: Phase,
    frequency_hz: f64,
    voices: Option<Voices>,
    gain: GainRamp,
    reverb: Option<Convolver>,
    clock: u64,
    carry: f64,
    block: Vec<f32>,
}

impl<O: AudioOutput> SynthGraph<O> {
    /// Builds a silent graph rendering at `config.sample_rate`. Retunes are
    /// clamped into `range`.
    pub fn new(config: AudioConfig, range: (f64, f64), output: O) -> Self {
        let sample_rate = f64::from(config.sample_rate);
        let frequency_hz = clamp(440.0, range.0, range.1);
        Self {
            config,
            output,
            sample_rate,
            range,
            started: false,
            phase: Phase::Silent,
            frequency_hz,
            voices: None,
            gain: GainRamp::hold(0.0),
            reverb: None,
            clock: 0,
            carry: 0.0,
            block: Vec::new(),
        }
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    pub fn into_output(self) -> O {
        self.output
    }

    /// Seconds rendered so far.
    pub fn clock_seconds(&self) -> f64 {
        self.clock as f64 / self.sample_rate
    }

    /// Current gain stage value.
    pub fn gain(&self) -> f32 {
        self.gain.value_at(self.clock)
    }

    pub fn cutoff_hz(&self) -> Option<f64> {
        self.voices.as_ref().map(|voices| voices.filter.cutoff_hz())
    }

    /// True between `stop` and the release of the generators.
    pub fn is_releasing(&self) -> bool {
        matches!(self.phase, Phase::Releasing(_))
    }

    /// Replaces the reverb response with fresh noise from `rng`.
    pub fn regenerate_impulse<R: rand::Rng>(&mut self, rng: &mut R) -> Result<()> {
        if self.config.reverb_mix <= 0.0 {
            return Ok(());
        }
        let impulse = noise_impulse(
            self.config.sample_rate,
            self.config.reverb_seconds,
            self.config.reverb_decay,
            rng,
        );
        match self.reverb.as_mut() {
            Some(reverb) => reverb.load_impulse(&impulse)?,
            None => self.reverb = Some(Convolver::new(&impulse)?),
        }
        Ok(())
    }

    /// Fills `out` with mono samples, advancing the synthesis clock.
    pub fn render(&mut self, out: &mut [f32]) -> Result<()> {
        let mix = self.config.reverb_mix;
        let count = self.config.detune_cents.len().max(1) as f32;

        for sample in out.iter_mut() {
            let gain = self.gain.value_at(self.clock);
            let dry = match self.voices.as_mut() {
                Some(voices) => {
                    let sum: f32 = voices
                        .generators
                        .iter_mut()
                        .map(Sawtooth::next_sample)
                        .sum();
                    voices.filter.process(sum / count)
                }
                None => 0.0,
            };
            let wet = match self.reverb.as_mut() {
                Some(reverb) => reverb.process(dry)?,
                None => 0.0,
            };
            *sample = gain * (dry * (1.0 - mix) + wet * mix);

            self.clock += 1;
            if let Phase::Releasing(release_at) = self.phase {
                if self.clock >= release_at {
                    self.release();
                }
            }
        }
        Ok(())
    }

    fn release(&mut self) {
        self.voices = None;
        self.phase = Phase::Silent;
        self.gain = GainRamp::hold(0.0);
        if let Some(reverb) = self.reverb.as_mut() {
            reverb.reset();
        }
        tracing::debug!(clock = self.clock, "generators released");
    }

    fn seconds_to_samples(&self, seconds: f32) -> u64 {
        (f64::from(seconds) * self.sample_rate).round() as u64
    }

    fn build_voices(&self) -> Voices {
        let count = self.config.detune_cents.len();
        let generators = self
            .config
            .detune_cents
            .iter()
            .enumerate()
            .map(|(index, cents)| Sawtooth::new(*cents, index as f64 / count as f64))
            .collect();
        Voices {
            generators,
            filter: LowPass::default(),
        }
    }

    fn apply_frequency(&mut self) {
        let frequency = self.frequency_hz;
        let sample_rate = self.sample_rate;
        let cutoff = (frequency * f64::from(self.config.cutoff_ratio)).min(sample_rate / 2.0);
        if let Some(voices) = self.voices.as_mut() {
            for generator in &mut voices.generators {
                generator.set_frequency(frequency, sample_rate);
            }
            voices.filter.set_cutoff(cutoff, sample_rate);
        }
    }

    fn fade_in(&mut self) {
        if self.voices.is_none() {
            self.voices = Some(self.build_voices());
            self.apply_frequency();
        }
        let current = self.gain.value_at(self.clock);
        let length = self.seconds_to_samples(self.config.ramp_up_seconds);
        self.gain = GainRamp::linear(current, self.config.level, self.clock, length);
        self.phase = Phase::Sounding;
    }
}

impl<O: AudioOutput> ToneEngine for SynthGraph<O> {
    fn start(&mut self) -> Result<()> {
        if !self.started {
            self.output.resume(self.config.sample_rate)?;
            self.regenerate_impulse(&mut rand::rng())?;
            self.started = true;
            tracing::info!(
                sample_rate = self.sample_rate,
                generators = self.config.detune_cents.len(),
                "audio graph started"
            );
        }
        self.play()
    }

    fn play(&mut self) -> Result<()> {
        if !self.started {
            return Err(ThereminError::AudioUnavailable(
                "audio graph has not been started".to_string(),
            ));
        }
        if self.phase == Phase::Sounding {
            return Ok(());
        }
        self.fade_in();
        Ok(())
    }

    fn stop(&mut self) {
        if self.phase != Phase::Sounding {
            return;
        }
        let current = self.gain.value_at(self.clock);
        let length = self.seconds_to_samples(self.config.ramp_down_seconds);
        self.gain = GainRamp::linear(current, 0.0, self.clock, length);
        self.phase = Phase::Releasing(self.gain.end());
    }

    fn retune(&mut self, frequency_hz: f64) -> f64 {
        if frequency_hz.is_finite() {
            self.frequency_hz = clamp(frequency_hz, self.range.0, self.range.1);
            self.apply_frequency();
        }
        self.frequency_hz
    }

    fn is_playing(&self) -> bool {
        self.phase == Phase::Sounding
    }

    fn frequency(&self) -> f64 {
        self.frequency_hz
    }

    fn generator_count(&self) -> usize {
        self.voices
            .as_ref()
            .map(|voices| voices.generators.len())
            .unwrap_or(0)
    }

    fn frequency_range(&self) -> (f64, f64) {
        self.range
    }

    fn advance(&mut self, seconds: f64) -> Result<()> {
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(ThereminError::msg(format!(
                "cannot render {seconds} seconds of audio"
            )));
        }
        if !self.started {
            return Ok(());
        }
        let exact = seconds * self.sample_rate + self.carry;
        let count = exact.floor().max(0.0);
        self.carry = exact - count;

        let mut block = std::mem::take(&mut self.block);
        block.resize(count as usize, 0.0);
        let rendered = self.render(&mut block);
        let written = rendered.and_then(|_| self.output.write(&block));
        self.block = block;
        written
    }
}
