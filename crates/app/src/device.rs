use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use face_theremin_core::{AudioOutput, Result, ThereminError};

/// Live output on the host's default audio device.
///
/// Rendered blocks are queued and drained by the cpal callback, which
/// copies the mono signal to every channel and plays silence on underrun.
pub struct DeviceOutput {
    queue: Arc<Mutex<VecDeque<f32>>>,
    stream: Option<cpal::Stream>,
    max_queued: usize,
}

impl DeviceOutput {
    pub fn new() -> Self {
        Self {
            queue: Arc::new(Mutex::new(VecDeque::new())),
            stream: None,
            max_queued: 0,
        }
    }

    /// Samples written but not yet played.
    pub fn queued(&self) -> usize {
        lock(&self.queue).len()
    }
}

impl Default for DeviceOutput {
    fn default() -> Self {
        Self::new()
    }
}

fn lock(queue: &Mutex<VecDeque<f32>>) -> std::sync::MutexGuard<'_, VecDeque<f32>> {
    queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Fills an interleaved device buffer from the mono queue.
fn fill_interleaved(queue: &mut VecDeque<f32>, data: &mut [f32], channels: usize) {
    for frame in data.chunks_mut(channels.max(1)) {
        // Hard limit keeps a misconfigured level from clipping the device.
        let sample = queue.pop_front().unwrap_or(0.0).clamp(-0.5, 0.5);
        frame.fill(sample);
    }
}

fn unavailable(context: &str, err: impl std::fmt::Display) -> ThereminError {
    ThereminError::AudioUnavailable(format!("{context}: {err}"))
}

impl AudioOutput for DeviceOutput {
    fn resume(&mut self, sample_rate: u32) -> Result<()> {
        if let Some(stream) = &self.stream {
            return stream.play().map_err(|err| unavailable("resuming stream", err));
        }

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| ThereminError::AudioUnavailable("no output device found".to_string()))?;
        let supported = device
            .default_output_config()
            .map_err(|err| unavailable("querying output config", err))?;
        let channels = usize::from(supported.channels());
        let config = cpal::StreamConfig {
            channels: supported.channels(),
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let queue = Arc::clone(&self.queue);
        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    fill_interleaved(&mut lock(&queue), data, channels);
                },
                |err| tracing::warn!(error = %err, "audio stream error"),
                None,
            )
            .map_err(|err| unavailable("building output stream", err))?;
        stream
            .play()
            .map_err(|err| unavailable("starting output stream", err))?;

        tracing::info!(
            device = %device.name().unwrap_or_else(|_| "unknown".to_string()),
            sample_rate,
            channels,
            "audio device opened"
        );
        // Half a second of backlog at most; older audio is dropped.
        self.max_queued = sample_rate as usize / 2;
        self.stream = Some(stream);
        Ok(())
    }

    fn write(&mut self, block: &[f32]) -> Result<()> {
        if self.stream.is_none() {
            return Err(ThereminError::AudioUnavailable(
                "audio device not opened".to_string(),
            ));
        }
        let mut queue = lock(&self.queue);
        queue.extend(block.iter().copied());
        let excess = queue.len().saturating_sub(self.max_queued);
        queue.drain(..excess);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mono_samples_fan_out_to_every_channel() {
        let mut queue: VecDeque<f32> = [0.1, 0.2].into_iter().collect();
        let mut data = [1.0f32; 6];
        fill_interleaved(&mut queue, &mut data, 2);
        assert_eq!(data, [0.1, 0.1, 0.2, 0.2, 0.0, 0.0]);
        assert!(queue.is_empty());
    }

    #[test]
    fn loud_samples_are_limited() {
        let mut queue: VecDeque<f32> = [0.9, -0.9].into_iter().collect();
        let mut data = [0.0f32; 2];
        fill_interleaved(&mut queue, &mut data, 1);
        assert_eq!(data, [0.5, -0.5]);
    }

    #[test]
    fn writing_without_a_device_is_reported() {
        let mut output = DeviceOutput::new();
        assert!(matches!(
            output.write(&[0.0; 4]),
            Err(ThereminError::AudioUnavailable(_))
        ));
        assert_eq!(output.queued(), 0);
    }
}
