//! Fixed melodies stepped one note per trigger.

use serde::{Deserialize, Serialize};

use crate::audio::ToneEngine;
use crate::notes::note_frequency;
use crate::{Result, ThereminError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MelodyStep {
    pub note: String,
    /// How long the caller should hold this step before advancing.
    pub duration_ms: u32,
}

impl MelodyStep {
    pub fn new(note: impl Into<String>, duration_ms: u32) -> Self {
        Self {
            note: note.into(),
            duration_ms,
        }
    }
}

/// Ordered steps whose note names have been resolved against the table.
#[derive(Debug, Clone, PartialEq)]
pub struct MelodySequence {
    steps: Vec<MelodyStep>,
    frequencies: Vec<f64>,
}

impl MelodySequence {
    /// Fails on the first step naming a note that is not in the table.
    pub fn new(steps: Vec<MelodyStep>) -> Result<Self> {
        let frequencies = steps
            .iter()
            .map(|step| {
                note_frequency(&step.note)
                    .ok_or_else(|| ThereminError::UnknownNote(step.note.clone()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { steps, frequencies })
    }

    /// "Twinkle, Twinkle, Little Star", first phrase pair.
    pub fn twinkle() -> Result<Self> {
        const QUARTER: u32 = 500;
        const HALF: u32 = 1000;
        let notes = [
            ("C4", QUARTER),
            ("C4", QUARTER),
            ("G4", QUARTER),
            ("G4", QUARTER),
            ("A4", QUARTER),
            ("A4", QUARTER),
            ("G4", HALF),
            ("F4", QUARTER),
            ("F4", QUARTER),
            ("E4", QUARTER),
            ("E4", QUARTER),
            ("D4", QUARTER),
            ("D4", QUARTER),
            ("C4", HALF),
        ];
        Self::new(
            notes
                .iter()
                .map(|(note, duration)| MelodyStep::new(*note, *duration))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[MelodyStep] {
        &self.steps
    }

    pub fn get(&self, index: usize) -> Option<(&MelodyStep, f64)> {
        self.steps
            .get(index)
            .zip(self.frequencies.get(index).copied())
    }
}

/// Result of asking the sequencer for the next step.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Played {
        index: usize,
        note: String,
        /// Frequency the tone engine actually applied.
        frequency_hz: f64,
        duration_ms: u32,
    },
    /// The cursor already sits past the last step; nothing was retuned.
    Finished,
}

#[derive(Debug, Clone)]
pub struct MelodySequencer {
    sequence: MelodySequence,
    cursor: usize,
}

impl MelodySequencer {
    pub fn new(sequence: MelodySequence) -> Self {
        Self {
            sequence,
            cursor: 0,
        }
    }

    pub fn sequence(&self) -> &MelodySequence {
        &self.sequence
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn has_next(&self) -> bool {
        self.cursor < self.sequence.len()
    }

    /// The step `next` would play, so callers can read its duration first.
    pub fn peek(&self) -> Option<&MelodyStep> {
        self.sequence.get(self.cursor).map(|(step, _)| step)
    }

    /// Retunes `engine` to the step under the cursor and advances.
    pub fn next(&mut self, engine: &mut dyn ToneEngine) -> StepOutcome {
        let Some((step, frequency)) = self.sequence.get(self.cursor) else {
            return StepOutcome::Finished;
        };
        let outcome = StepOutcome::Played {
            index: self.cursor,
            note: step.note.clone(),
            frequency_hz: engine.retune(frequency),
            duration_ms: step.duration_ms,
        };
        self.cursor += 1;
        outcome
    }

    pub fn reset(&mut self) {
        self.cursor = 0;
    }
}
