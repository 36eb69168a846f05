use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use face_theremin_core::{AudioOutput, Result, ThereminError};

/// Audio output that records the rendered stream to a 32-bit float WAV file.
///
/// The file is created on `resume`, so a graph that never starts leaves no
/// file behind.
pub struct WavOutput {
    path: PathBuf,
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    written: u64,
}

impl WavOutput {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            writer: None,
            written: 0,
        }
    }

    /// Flushes the header and returns the number of samples written.
    pub fn finalize(self) -> Result<u64> {
        if let Some(writer) = self.writer {
            writer
                .finalize()
                .map_err(|err| ThereminError::msg(format!("finalising WAV file: {err}")))?;
        }
        Ok(self.written)
    }
}

impl AudioOutput for WavOutput {
    fn resume(&mut self, sample_rate: u32) -> Result<()> {
        if self.writer.is_some() {
            return Ok(());
        }
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let writer = hound::WavWriter::create(&self.path, spec).map_err(|err| {
            ThereminError::AudioUnavailable(format!("{}: {err}", self.path.display()))
        })?;
        tracing::debug!(path = %self.path.display(), sample_rate, "WAV output opened");
        self.writer = Some(writer);
        Ok(())
    }

    fn write(&mut self, block: &[f32]) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| ThereminError::AudioUnavailable("WAV output not opened".to_string()))?;
        for sample in block {
            writer
                .write_sample(*sample)
                .map_err(|err| ThereminError::msg(format!("writing WAV sample: {err}")))?;
        }
        self.written += block.len() as u64;
        Ok(())
    }
}
