//! Note names, pitch conversion and tempo-sync divisions.
//!
//! Pitch follows 12-tone equal temperament with A4 = 440 Hz at MIDI
//! note 69; C4 is MIDI 60.

/// Parse a note name like `"C4"`, `"F#3"` or `"Eb-1"` to a MIDI note
/// number. Octaves run -1..=9, giving the full 0..=127 range.
pub fn note_to_midi(name: &str) -> Option<u8> {
    let mut chars = name.trim().chars();
    let letter = chars.next()?;
    let base: i32 = match letter.to_ascii_uppercase() {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return None,
    };
    let rest = chars.as_str();
    let (accidental, octave_str) = match rest.as_bytes().first() {
        Some(b'#') => (1, &rest[1..]),
        Some(b'b') => (-1, &rest[1..]),
        _ => (0, rest),
    };
    let octave: i32 = octave_str.parse().ok()?;
    if !(-1..=9).contains(&octave) {
        return None;
    }
    let midi = (octave + 1) * 12 + base + accidental;
    u8::try_from(midi).ok().filter(|&m| m <= 127)
}

/// MIDI note number to frequency in Hz. Fractional note numbers give
/// detuned pitches.
pub fn midi_to_freq(midi: f32) -> f32 {
    440.0 * libm::powf(2.0, (midi - 69.0) / 12.0)
}

/// Note name straight to frequency; `None` for unparseable names.
pub fn note_to_freq(name: &str) -> Option<f32> {
    note_to_midi(name).map(|m| midi_to_freq(m as f32))
}

/// Tempo-synced time divisions for delays, pre-delay and LFO rates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SyncDivision {
    Whole,
    Half,
    Quarter,
    Eighth,
    DottedEighth,
    TripletEighth,
    #[default]
    Sixteenth,
    ThirtySecond,
}

impl SyncDivision {
    /// Length of the division in beats (quarter notes).
    pub fn beats(self) -> f32 {
        match self {
            SyncDivision::Whole => 4.0,
            SyncDivision::Half => 2.0,
            SyncDivision::Quarter => 1.0,
            SyncDivision::Eighth => 0.5,
            SyncDivision::DottedEighth => 0.75,
            SyncDivision::TripletEighth => 1.0 / 3.0,
            SyncDivision::Sixteenth => 0.25,
            SyncDivision::ThirtySecond => 0.125,
        }
    }

    /// Length in seconds at `tempo` BPM.
    pub fn seconds(self, tempo: f32) -> f32 {
        let tempo = if tempo > 0.0 { tempo } else { 120.0 };
        self.beats() * 60.0 / tempo
    }
}
