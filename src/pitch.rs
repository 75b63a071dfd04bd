//! Pitch classes and tonic placement.
//!
//! Tonics are named the way musicians write them ("C", "F#", "Bb") and placed around
//! middle C for playback. All arithmetic happens on semitone offsets from C.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TrainerError;

/// MIDI note number of middle C (C4).
pub const MIDDLE_C: u8 = 60;

/// Natural note letter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Letter {
    C,
    D,
    E,
    F,
    G,
    A,
    B,
}

impl Letter {
    fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'C' => Some(Letter::C),
            'D' => Some(Letter::D),
            'E' => Some(Letter::E),
            'F' => Some(Letter::F),
            'G' => Some(Letter::G),
            'A' => Some(Letter::A),
            'B' => Some(Letter::B),
            _ => None,
        }
    }

    fn semitone(self) -> i8 {
        match self {
            Letter::C => 0,
            Letter::D => 2,
            Letter::E => 4,
            Letter::F => 5,
            Letter::G => 7,
            Letter::A => 9,
            Letter::B => 11,
        }
    }
}

/// A pitch class: semitones above C, always in 0..=11.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PitchClass(u8);

impl PitchClass {
    pub const C: PitchClass = PitchClass(0);

    pub fn new(semitone: i32) -> Self {
        PitchClass(semitone.rem_euclid(12) as u8)
    }

    pub fn semitone(self) -> u8 {
        self.0
    }

    /// Transpose by a signed number of semitones, wrapping around the octave.
    pub fn transpose(self, semitones: i32) -> Self {
        PitchClass::new(self.0 as i32 + semitones)
    }

    /// Tonic placement for playback: C4..=F#4 stay in octave 4, G..B drop to octave 3 so
    /// material built above the tonic stays in a comfortable singing range.
    pub fn tonic_midi(self) -> u8 {
        if self.0 <= 6 {
            MIDDLE_C + self.0
        } else {
            MIDDLE_C - 12 + self.0
        }
    }

    /// Spelling used in prompts. Flat spellings for the black keys except F#, matching
    /// the common key-signature names.
    pub fn name(self) -> &'static str {
        match self.0 {
            0 => "C",
            1 => "Db",
            2 => "D",
            3 => "Eb",
            4 => "E",
            5 => "F",
            6 => "F#",
            7 => "G",
            8 => "Ab",
            9 => "A",
            10 => "Bb",
            _ => "B",
        }
    }
}

impl Default for PitchClass {
    fn default() -> Self {
        PitchClass::C
    }
}

impl fmt::Display for PitchClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PitchClass {
    type Err = TrainerError;

    /// Parse a note name like "C", "F#", "Bb", "eb".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let mut chars = trimmed.chars();
        let letter = chars
            .next()
            .and_then(Letter::from_char)
            .ok_or_else(|| TrainerError::ConfigError(format!("Unknown note name: '{}'", s)))?;

        let mut offset = letter.semitone() as i32;
        for c in chars {
            match c {
                '#' | '♯' => offset += 1,
                'b' | '♭' => offset -= 1,
                _ => {
                    return Err(TrainerError::ConfigError(format!(
                        "Unknown note name: '{}'",
                        s
                    )))
                }
            }
        }
        Ok(PitchClass::new(offset))
    }
}

impl Serialize for PitchClass {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for PitchClass {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
