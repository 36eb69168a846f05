use std::{fmt, sync::Arc};

use rand::Rng;
use realfft::{num_complex::Complex32, ComplexToReal, RealFftPlanner, RealToComplex};

use crate::Result;

/// Input samples gathered before each FFT pass.
pub const CONVOLVER_BLOCK: usize = 4096;

/// Decaying noise burst used as a synthetic room response.
///
/// Sample `n` of `length` is uniform noise in `[-1, 1]` scaled by
/// `(1 - n / length)^decay`.
pub fn noise_impulse<R: Rng>(
    sample_rate: u32,
    seconds: f32,
    decay: f32,
    rng: &mut R,
) -> Vec<f32> {
    let length = ((sample_rate as f32 * seconds).round() as usize).max(1);
    (0..length)
        .map(|n| {
            let envelope = (1.0 - n as f32 / length as f32).powf(decay);
            rng.random_range(-1.0f32..=1.0) * envelope
        })
        .collect()
}

/// Block-based overlap-add convolution.
///
/// Output lags input by one [`CONVOLVER_BLOCK`]; the graph only uses it for
/// the wet path, where the lag reads as pre-delay.
pub struct Convolver {
    fft_size: usize,
    forward: Arc<dyn RealToComplex<f32>>,
    inverse: Arc<dyn ComplexToReal<f32>>,
    impulse_spectrum: Vec<Complex32>,
    time: Vec<f32>,
    spectrum: Vec<Complex32>,
    forward_scratch: Vec<Complex32>,
    inverse_scratch: Vec<Complex32>,
    input: Vec<f32>,
    output: Vec<f32>,
    tail: Vec<f32>,
    position: usize,
}

impl Convolver {
    pub fn new(impulse: &[f32]) -> Result<Self> {
        let fft_size = (CONVOLVER_BLOCK + impulse.len().max(1) - 1).next_power_of_two();
        let mut planner = RealFftPlanner::<f32>::new();
        let forward = planner.plan_fft_forward(fft_size);
        let inverse = planner.plan_fft_inverse(fft_size);

        let mut convolver = Self {
            fft_size,
            time: forward.make_input_vec(),
            spectrum: forward.make_output_vec(),
            forward_scratch: forward.make_scratch_vec(),
            inverse_scratch: inverse.make_scratch_vec(),
            impulse_spectrum: forward.make_output_vec(),
            forward,
            inverse,
            input: vec![0.0; CONVOLVER_BLOCK],
            output: vec![0.0; CONVOLVER_BLOCK],
            tail: vec![0.0; fft_size],
            position: 0,
        };
        convolver.load_impulse(impulse)?;
        Ok(convolver)
    }

    pub fn impulse_capacity(&self) -> usize {
        self.fft_size - CONVOLVER_BLOCK + 1
    }

    /// Replaces the impulse response. Responses longer than the planned
    /// capacity are truncated.
    pub fn load_impulse(&mut self, impulse: &[f32]) -> Result<()> {
        let usable = impulse.len().min(self.impulse_capacity());
        self.time.fill(0.0);
        self.time[..usable].copy_from_slice(&impulse[..usable]);
        self.forward.process_with_scratch(
            &mut self.time,
            &mut self.impulse_spectrum,
            &mut self.forward_scratch,
        )?;
        // Fold the inverse transform's 1/N normalisation into the response.
        let scale = 1.0 / self.fft_size as f32;
        for bin in &mut self.impulse_spectrum {
            *bin *= scale;
        }
        self.reset();
        Ok(())
    }

    pub fn reset(&mut self) {
        self.input.fill(0.0);
        self.output.fill(0.0);
        self.tail.fill(0.0);
        self.position = 0;
    }

    pub fn process(&mut self, sample: f32) -> Result<f32> {
        let out = self.output[self.position];
        self.input[self.position] = sample;
        self.position += 1;
        if self.position == CONVOLVER_BLOCK {
            self.flush_block()?;
            self.position = 0;
        }
        Ok(out)
    }

    fn flush_block(&mut self) -> Result<()> {
        self.time.fill(0.0);
        self.time[..CONVOLVER_BLOCK].copy_from_slice(&self.input);
        self.forward.process_with_scratch(
            &mut self.time,
            &mut self.spectrum,
            &mut self.forward_scratch,
        )?;

        for (bin, response) in self.spectrum.iter_mut().zip(&self.impulse_spectrum) {
            *bin *= *response;
        }
        if let Some(first) = self.spectrum.first_mut() {
            first.im = 0.0;
        }
        if let Some(last) = self.spectrum.last_mut() {
            last.im = 0.0;
        }

        self.inverse.process_with_scratch(
            &mut self.spectrum,
            &mut self.time,
            &mut self.inverse_scratch,
        )?;

        for (acc, value) in self.tail.iter_mut().zip(&self.time) {
            *acc += *value;
        }
        self.output.copy_from_slice(&self.tail[..CONVOLVER_BLOCK]);
        self.tail.copy_within(CONVOLVER_BLOCK.., 0);
        let len = self.tail.len();
        self.tail[len - CONVOLVER_BLOCK..].fill(0.0);
        Ok(())
    }
}

impl fmt::Debug for Convolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Convolver")
            .field("fft_size", &self.fft_size)
            .field("position", &self.position)
            .finish()
    }
}
