//! Note name to 1 V/oct voltage conversion.
//!
//! A note is two or three characters: a letter (`A`-`G`, either case), an
//! octave digit, and an optional trailing accidental (`+` sharp, `-` flat).
//! `C4` is 0 V; each octave is one volt, each semitone 1/12 V.

use regex::Regex;

lazy_static! {
    static ref RE_NOTE: Regex = Regex::new(r"^([A-Ga-g])([0-9])([+-]?)$").unwrap();
}

/// Semitone offsets within the octave, indexed by letter (A..G).
const SEMITONES: [f32; 7] = [9.0, 11.0, 0.0, 2.0, 4.0, 5.0, 7.0];

/// Parse a note string into its 1 V/oct voltage. Returns `None` when the
/// string is not a valid note.
pub fn note_voltage(note: &str) -> Option<f32> {
    let caps = RE_NOTE.captures(note)?;

    let letter = caps[1].chars().next().unwrap().to_ascii_uppercase();
    let semitone = SEMITONES[(letter as u8 - b'A') as usize];
    let octave: i32 = caps[2].parse().unwrap();
    let accidental = match &caps[3] {
        "+" => 1.0,
        "-" => -1.0,
        _ => 0.0,
    };

    Some((octave - 4) as f32 + (semitone + accidental) / 12.0)
}
