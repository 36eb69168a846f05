//! Static note table and the nearest-note / solfège classifier.

use std::fmt;

use serde::Serialize;

/// A named pitch from the static table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NoteEntry {
    pub name: &'static str,
    pub frequency_hz: f64,
}

const fn entry(name: &'static str, frequency_hz: f64) -> NoteEntry {
    NoteEntry { name, frequency_hz }
}

const NOTES: [NoteEntry; 73] = [
    entry("C2", 65.41),
    entry("C#2/Db2", 69.3),
    entry("D2", 73.42),
    entry("D#2/Eb2", 77.78),
    entry("E2", 82.41),
    entry("F2", 87.31),
    entry("F#2/Gb2", 92.5),
    entry("G2", 98.0),
    entry("G#2/Ab2", 103.83),
    entry("A2", 110.0),
    entry("A#2/Bb2", 116.54),
    entry("B2", 123.47),
    entry("C3", 130.81),
    entry("C#3/Db3", 138.59),
    entry("D3", 146.83),
    entry("D#3/Eb3", 155.56),
    entry("E3", 164.81),
    entry("F3", 174.61),
    entry("F#3/Gb3", 185.0),
    entry("G3", 196.0),
    entry("G#3/Ab3", 207.65),
    entry("A3", 220.0),
    entry("A#3/Bb3", 233.08),
    entry("B3", 246.94),
    entry("C4", 261.63),
    entry("C#4/Db4", 277.18),
    entry("D4", 293.66),
    entry("D#4/Eb4", 311.13),
    entry("E4", 329.63),
    entry("F4", 349.23),
    entry("F#4/Gb4", 369.99),
    entry("G4", 392.0),
    entry("G#4/Ab4", 415.3),
    entry("A4", 440.0),
    entry("A#4/Bb4", 466.16),
    entry("B4", 493.88),
    entry("C5", 523.25),
    entry("C#5/Db5", 554.37),
    entry("D5", 587.33),
    entry("D#5/Eb5", 622.25),
    entry("E5", 659.25),
    entry("F5", 698.46),
    entry("F#5/Gb5", 739.99),
    entry("G5", 783.99),
    entry("G#5/Ab5", 830.61),
    entry("A5", 880.0),
    entry("A#5/Bb5", 932.33),
    entry("B5", 987.77),
    entry("C6", 1046.5),
    entry("C#6/Db6", 1108.73),
    entry("D6", 1174.66),
    entry("D#6/Eb6", 1244.51),
    entry("E6", 1318.51),
    entry("F6", 1396.91),
    entry("F#6/Gb6", 1479.98),
    entry("G6", 1567.98),
    entry("G#6/Ab6", 1661.22),
    entry("A6", 1760.0),
    entry("A#6/Bb6", 1864.66),
    entry("B6", 1975.53),
    entry("C7", 2093.0),
    entry("C#7/Db7", 2217.46),
    entry("D7", 2349.32),
    entry("D#7/Eb7", 2489.02),
    entry("E7", 2637.02),
    entry("F7", 2793.83),
    entry("F#7/Gb7", 2959.96),
    entry("G7", 3135.96),
    entry("G#7/Ab7", 3322.44),
    entry("A7", 3520.0),
    entry("A#7/Bb7", 3729.31),
    entry("B7", 3951.07),
    entry("C8", 4186.01),
];

/// Equal-tempered pitches from C2 to C8, ascending, enharmonics sharing a slot.
pub static NOTE_TABLE: [NoteEntry; 73] = NOTES;

/// Lower bound of the default playable range (F#3/Gb3).
pub const MIN_FREQUENCY: f64 = NOTES[12 * 2 - 6].frequency_hz;
/// Upper bound of the default playable range (F#5/Gb5).
pub const MAX_FREQUENCY: f64 = NOTES[12 * 3 + 6].frequency_hz;

const SOLFEGE: [(&str, &str); 17] = [
    ("C", "ド"),
    ("C#", "ド♯"),
    ("Db", "レ♭"),
    ("D", "レ"),
    ("D#", "レ♯"),
    ("Eb", "ミ♭"),
    ("E", "ミ"),
    ("F", "ファ"),
    ("F#", "ファ♯"),
    ("Gb", "ソ♭"),
    ("G", "ソ"),
    ("G#", "ソ♯"),
    ("Ab", "ラ♭"),
    ("A", "ラ"),
    ("A#", "ラ♯"),
    ("Bb", "シ♭"),
    ("B", "シ"),
];

/// Returns the table entry closest to `frequency_hz` in log2 distance.
///
/// Ties resolve to the first (lowest) entry. Non-positive or non-finite input
/// yields the lowest entry, since every distance is NaN and none compares
/// smaller.
pub fn nearest_note(frequency_hz: f64) -> &'static NoteEntry {
    let mut closest = &NOTE_TABLE[0];
    let mut min_distance = log_distance(frequency_hz, closest.frequency_hz);

    for candidate in &NOTE_TABLE[1..] {
        let distance = log_distance(frequency_hz, candidate.frequency_hz);
        if distance < min_distance {
            closest = candidate;
            min_distance = distance;
        }
    }

    closest
}

/// Exact-name lookup, e.g. `"A4"` or `"C#4/Db4"`.
pub fn note_frequency(name: &str) -> Option<f64> {
    NOTE_TABLE
        .iter()
        .find(|entry| entry.name == name)
        .map(|entry| entry.frequency_hz)
}

fn log_distance(frequency_hz: f64, reference_hz: f64) -> f64 {
    (frequency_hz / reference_hz).log2().abs()
}

/// One `/`-separated piece of a note name after solfège translation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolfegeFragment {
    Mapped(&'static str),
    /// A letter/accidental token with no syllable in the table.
    Unmapped(String),
}

/// Solfège rendering of a note name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Solfege {
    fragments: Vec<SolfegeFragment>,
}

impl Solfege {
    pub fn fragments(&self) -> &[SolfegeFragment] {
        &self.fragments
    }

    /// True when every token had a syllable.
    pub fn is_complete(&self) -> bool {
        self.fragments
            .iter()
            .all(|fragment| matches!(fragment, SolfegeFragment::Mapped(_)))
    }

    /// Tokens that could not be translated.
    pub fn unmapped(&self) -> impl Iterator<Item = &str> {
        self.fragments.iter().filter_map(|fragment| match fragment {
            SolfegeFragment::Unmapped(token) => Some(token.as_str()),
            SolfegeFragment::Mapped(_) => None,
        })
    }
}

impl fmt::Display for Solfege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for fragment in &self.fragments {
            if let SolfegeFragment::Mapped(syllable) = fragment {
                if !first {
                    f.write_str("/")?;
                }
                f.write_str(syllable)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Translates a note name into solfège syllables.
///
/// Only the octave digits at the end of the whole name are removed before
/// splitting on `/`, so `"C#4/Db4"` yields an unmapped `"C#4"` followed by
/// `レ♭`.
pub fn solfege_of(note_name: &str) -> Solfege {
    let without_octave = note_name.trim_end_matches(|c: char| c.is_ascii_digit());

    let fragments = without_octave
        .split('/')
        .map(|token| match SOLFEGE.iter().find(|(letter, _)| *letter == token) {
            Some(&(_, syllable)) => SolfegeFragment::Mapped(syllable),
            None => SolfegeFragment::Unmapped(token.to_string()),
        })
        .collect();

    Solfege { fragments }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_strictly_ascending() {
        for pair in NOTE_TABLE.windows(2) {
            assert!(pair[0].frequency_hz < pair[1].frequency_hz, "{:?}", pair);
        }
    }

    #[test]
    fn default_range_spans_two_octaves() {
        assert_eq!(MIN_FREQUENCY, 185.0);
        assert_eq!(MAX_FREQUENCY, 739.99);
    }

    #[test]
    fn stored_frequencies_classify_as_themselves() {
        for entry in NOTE_TABLE.iter() {
            assert_eq!(nearest_note(entry.frequency_hz).name, entry.name);
        }
    }

    #[test]
    fn doubling_moves_one_octave() {
        let interior = NOTE_TABLE.len() - 24;
        for (index, entry) in NOTE_TABLE.iter().enumerate().skip(12).take(interior) {
            let up = nearest_note(entry.frequency_hz * 2.0);
            let down = nearest_note(entry.frequency_hz / 2.0);
            assert_eq!(up.name, NOTE_TABLE[index + 12].name);
            assert_eq!(down.name, NOTE_TABLE[index - 12].name);
        }
    }

    #[test]
    fn nearby_frequencies_snap_to_closest_pitch() {
        assert_eq!(nearest_note(445.0).name, "A4");
        assert_eq!(nearest_note(455.0).name, "A#4/Bb4");
        assert_eq!(nearest_note(20.0).name, "C2");
        assert_eq!(nearest_note(10_000.0).name, "C8");
    }

    #[test]
    fn looks_up_exact_names() {
        assert_eq!(note_frequency("A4"), Some(440.0));
        assert_eq!(note_frequency("C#4/Db4"), Some(277.18));
        assert_eq!(note_frequency("C#4"), None);
    }

    #[test]
    fn translates_single_names() {
        assert_eq!(solfege_of("A4").to_string(), "ラ");
        assert_eq!(solfege_of("C4").to_string(), "ド");
        assert!(solfege_of("B7").is_complete());
    }

    #[test]
    fn enharmonic_pairs_keep_the_leading_octave_gap() {
        // Only the trailing octave is stripped, so the first half keeps its digit.
        let solfege = solfege_of("C#4/Db4");
        assert_eq!(
            solfege.fragments(),
            &[
                SolfegeFragment::Unmapped("C#4".to_string()),
                SolfegeFragment::Mapped("レ♭"),
            ]
        );
        assert!(!solfege.is_complete());
        assert_eq!(solfege.to_string(), "レ♭");
    }

    #[test]
    fn every_enharmonic_entry_reports_its_gap() {
        for entry in NOTE_TABLE.iter().filter(|entry| entry.name.contains('/')) {
            let solfege = solfege_of(entry.name);
            let unmapped: Vec<&str> = solfege.unmapped().collect();
            assert_eq!(unmapped.len(), 1, "{}", entry.name);
            assert!(entry.name.starts_with(unmapped[0]));
        }
    }

    #[test]
    fn keeps_unmapped_tokens_explicit() {
        let solfege = solfege_of("E#4/F4");
        assert!(!solfege.is_complete());
        assert_eq!(solfege.unmapped().collect::<Vec<_>>(), vec!["E#4"]);
        assert_eq!(solfege.to_string(), "ファ");
    }
}
