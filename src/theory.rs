//! # Theory Tables
//!
//! Pure lookups for scale degrees, modes, chord qualities and interval names.
//!
//! ## Degree Labels
//! - Diatonic labels `1`..`7` resolve through the table of the active [`TonalMode`]
//! - Altered labels (`b2`, `b3`, `#4`, `b6`, `b7`, ...) are chromatic: the major-scale offset
//!   plus the alteration, the same in every mode (b3 = 3, #4 = 6, b7 = 10)
//!
//! ## Example
//! ```rust
//! use eartrain::theory::{degree_semitone, Degree, TonalMode};
//!
//! let third: Degree = "3".parse().unwrap();
//! assert_eq!(degree_semitone(third, TonalMode::Major), 4);
//! assert_eq!(degree_semitone(third, TonalMode::NaturalMinor), 3);
//!
//! let flat_seven: Degree = "b7".parse().unwrap();
//! assert_eq!(degree_semitone(flat_seven, TonalMode::HarmonicMinor), 10);
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TrainerError;

const MAJOR: [u8; 7] = [0, 2, 4, 5, 7, 9, 11];
const NATURAL_MINOR: [u8; 7] = [0, 2, 3, 5, 7, 8, 10];
const HARMONIC_MINOR: [u8; 7] = [0, 2, 3, 5, 7, 8, 11];
const MELODIC_MINOR: [u8; 7] = [0, 2, 3, 5, 7, 9, 11];
const DORIAN: [u8; 7] = [0, 2, 3, 5, 7, 9, 10];
const MIXOLYDIAN: [u8; 7] = [0, 2, 4, 5, 7, 9, 10];

/// Scale used to resolve diatonic degree labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TonalMode {
    #[default]
    Major,
    NaturalMinor,
    HarmonicMinor,
    MelodicMinor,
    Dorian,
    Mixolydian,
}

impl TonalMode {
    pub const ALL: [TonalMode; 6] = [
        TonalMode::Major,
        TonalMode::NaturalMinor,
        TonalMode::HarmonicMinor,
        TonalMode::MelodicMinor,
        TonalMode::Dorian,
        TonalMode::Mixolydian,
    ];

    pub fn table(self) -> &'static [u8; 7] {
        match self {
            TonalMode::Major => &MAJOR,
            TonalMode::NaturalMinor => &NATURAL_MINOR,
            TonalMode::HarmonicMinor => &HARMONIC_MINOR,
            TonalMode::MelodicMinor => &MELODIC_MINOR,
            TonalMode::Dorian => &DORIAN,
            TonalMode::Mixolydian => &MIXOLYDIAN,
        }
    }

    /// Major-third modes belong to the major family, minor-third modes to the minor family.
    pub fn family(self) -> TonalFamily {
        if self.table()[2] == 4 {
            TonalFamily::Major
        } else {
            TonalFamily::Minor
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TonalMode::Major => "major",
            TonalMode::NaturalMinor => "natural minor",
            TonalMode::HarmonicMinor => "harmonic minor",
            TonalMode::MelodicMinor => "melodic minor",
            TonalMode::Dorian => "dorian",
            TonalMode::Mixolydian => "mixolydian",
        }
    }
}

/// Grouping used to partition mastery tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TonalFamily {
    Major,
    Minor,
    /// Tonality-neutral material (rhythm) or deliberately mixed practice
    Mixed,
}

impl TonalFamily {
    pub fn as_str(self) -> &'static str {
        match self {
            TonalFamily::Major => "major",
            TonalFamily::Minor => "minor",
            TonalFamily::Mixed => "mixed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "major" => Some(TonalFamily::Major),
            "minor" => Some(TonalFamily::Minor),
            "mixed" => Some(TonalFamily::Mixed),
            _ => None,
        }
    }
}

/// A scale-degree label: step 1..=7 with an optional chromatic alteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Degree {
    step: u8,
    alteration: i8,
}

impl Degree {
    pub const TONIC: Degree = Degree { step: 1, alteration: 0 };

    /// Diatonic degree. Steps outside 1..=7 wrap around the octave.
    pub fn diatonic(step: u8) -> Self {
        Degree {
            step: (step.max(1) - 1) % 7 + 1,
            alteration: 0,
        }
    }

    pub fn altered(step: u8, alteration: i8) -> Self {
        Degree {
            step: (step.max(1) - 1) % 7 + 1,
            alteration: alteration.clamp(-1, 1),
        }
    }

    pub fn step(self) -> u8 {
        self.step
    }

    pub fn alteration(self) -> i8 {
        self.alteration
    }

    pub fn is_altered(self) -> bool {
        self.alteration != 0
    }

    /// The diatonic degree `steps` scale steps above this one (wrapping, alteration dropped).
    pub fn step_above(self, steps: u8) -> Degree {
        Degree::diatonic((self.step - 1 + steps) % 7 + 1)
    }
}

impl Default for Degree {
    fn default() -> Self {
        Degree::TONIC
    }
}

impl fmt::Display for Degree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.alteration {
            -1 => write!(f, "b{}", self.step),
            1 => write!(f, "#{}", self.step),
            _ => write!(f, "{}", self.step),
        }
    }
}

impl FromStr for Degree {
    type Err = TrainerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (alteration, rest) = if let Some(rest) = trimmed.strip_prefix('b') {
            (-1, rest)
        } else if let Some(rest) = trimmed.strip_prefix('#') {
            (1, rest)
        } else {
            (0, trimmed)
        };
        match rest.parse::<u8>() {
            Ok(step @ 1..=7) => Ok(Degree { step, alteration }),
            _ => Err(TrainerError::UnknownConcept(format!("degree label '{}'", s))),
        }
    }
}

impl Serialize for Degree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Degree {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Semitone offset above the tonic, always in 0..=11.
pub fn degree_semitone(degree: Degree, mode: TonalMode) -> u8 {
    let index = (degree.step - 1) as usize;
    if degree.is_altered() {
        (MAJOR[index] as i8 + degree.alteration).rem_euclid(12) as u8
    } else {
        mode.table()[index]
    }
}

/// String-label variant of [`degree_semitone`]. Unknown labels resolve to the tonic and are
/// reported, since they usually mean a mistyped concept key.
pub fn degree_semitone_label(label: &str, mode: TonalMode) -> u8 {
    match label.parse::<Degree>() {
        Ok(degree) => degree_semitone(degree, mode),
        Err(_) => {
            tracing::warn!(label, "unknown degree label, resolving to the tonic");
            0
        }
    }
}

/// How strongly a degree pulls toward resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stability {
    Stable,
    ModeratelyUnstable,
    StrongTendency,
}

impl Stability {
    pub fn as_str(self) -> &'static str {
        match self {
            Stability::Stable => "stable",
            Stability::ModeratelyUnstable => "moderately_unstable",
            Stability::StrongTendency => "strong_tendency",
        }
    }
}

pub fn stability(degree: Degree) -> Stability {
    if degree.is_altered() {
        return Stability::StrongTendency;
    }
    match degree.step {
        1 | 3 | 5 => Stability::Stable,
        7 => Stability::StrongTendency,
        _ => Stability::ModeratelyUnstable,
    }
}

/// Movable-do syllable (do-based minor), chosen by the sounding semitone so that the
/// minor-mode third reads "me" and raised degrees use sharp syllables.
pub fn solfege(degree: Degree, mode: TonalMode) -> &'static str {
    let semitone = degree_semitone(degree, mode);
    if degree.alteration > 0 {
        match semitone {
            1 => "di",
            3 => "ri",
            6 => "fi",
            8 => "si",
            10 => "li",
            _ => flat_syllable(semitone),
        }
    } else {
        flat_syllable(semitone)
    }
}

fn flat_syllable(semitone: u8) -> &'static str {
    match semitone {
        0 => "do",
        1 => "ra",
        2 => "re",
        3 => "me",
        4 => "mi",
        5 => "fa",
        6 => "se",
        7 => "sol",
        8 => "le",
        9 => "la",
        10 => "te",
        _ => "ti",
    }
}

/// Canonical name for a simple interval. Only 1..=12 semitones are named.
pub fn interval_name(semitones: u8) -> String {
    let name = match semitones {
        1 => "minor 2nd",
        2 => "major 2nd",
        3 => "minor 3rd",
        4 => "major 3rd",
        5 => "perfect 4th",
        6 => "tritone",
        7 => "perfect 5th",
        8 => "minor 6th",
        9 => "major 6th",
        10 => "minor 7th",
        11 => "major 7th",
        12 => "octave",
        n => return format!("{} semitones", n),
    };
    name.to_string()
}

pub fn interval_short_name(semitones: u8) -> String {
    let name = match semitones {
        1 => "m2",
        2 => "M2",
        3 => "m3",
        4 => "M3",
        5 => "P4",
        6 => "TT",
        7 => "P5",
        8 => "m6",
        9 => "M6",
        10 => "m7",
        11 => "M7",
        12 => "P8",
        n => return format!("{}st", n),
    };
    name.to_string()
}

/// Signed semitone distance from `from` to `to` along the shorter way round, in -5..=6.
/// A tritone counts as upward motion.
pub fn nearest_motion(from: Degree, to: Degree, mode: TonalMode) -> i8 {
    let delta = (degree_semitone(to, mode) as i8 - degree_semitone(from, mode) as i8).rem_euclid(12);
    if delta > 6 {
        delta - 12
    } else {
        delta
    }
}

/// Chord quality with its intervals above the root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChordQuality {
    Major,
    Minor,
    Diminished,
    Augmented,
    Dominant7,
    Major7,
    Minor7,
}

impl ChordQuality {
    pub const TRIADS: [ChordQuality; 4] = [
        ChordQuality::Major,
        ChordQuality::Minor,
        ChordQuality::Diminished,
        ChordQuality::Augmented,
    ];

    pub const SEVENTHS: [ChordQuality; 3] = [
        ChordQuality::Dominant7,
        ChordQuality::Major7,
        ChordQuality::Minor7,
    ];

    pub fn intervals(self) -> &'static [u8] {
        match self {
            ChordQuality::Major => &[0, 4, 7],
            ChordQuality::Minor => &[0, 3, 7],
            ChordQuality::Diminished => &[0, 3, 6],
            ChordQuality::Augmented => &[0, 4, 8],
            ChordQuality::Dominant7 => &[0, 4, 7, 10],
            ChordQuality::Major7 => &[0, 4, 7, 11],
            ChordQuality::Minor7 => &[0, 3, 7, 10],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChordQuality::Major => "major",
            ChordQuality::Minor => "minor",
            ChordQuality::Diminished => "diminished",
            ChordQuality::Augmented => "augmented",
            ChordQuality::Dominant7 => "dominant7",
            ChordQuality::Major7 => "major7",
            ChordQuality::Minor7 => "minor7",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "major" => Some(ChordQuality::Major),
            "minor" => Some(ChordQuality::Minor),
            "diminished" => Some(ChordQuality::Diminished),
            "augmented" => Some(ChordQuality::Augmented),
            "dominant7" => Some(ChordQuality::Dominant7),
            "major7" => Some(ChordQuality::Major7),
            "minor7" => Some(ChordQuality::Minor7),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ChordQuality::Major => "Major",
            ChordQuality::Minor => "Minor",
            ChordQuality::Diminished => "Diminished",
            ChordQuality::Augmented => "Augmented",
            ChordQuality::Dominant7 => "Dominant 7th",
            ChordQuality::Major7 => "Major 7th",
            ChordQuality::Minor7 => "Minor 7th",
        }
    }
}

/// Quality of the triad built on `degree` from the notes of `mode`.
pub fn diatonic_triad(degree: Degree, mode: TonalMode) -> ChordQuality {
    let root = degree_semitone(Degree::diatonic(degree.step), mode) as i8;
    let third = (degree_semitone(degree.step_above(2), mode) as i8 - root).rem_euclid(12);
    let fifth = (degree_semitone(degree.step_above(4), mode) as i8 - root).rem_euclid(12);
    match (third, fifth) {
        (3, 7) => ChordQuality::Minor,
        (3, 6) => ChordQuality::Diminished,
        (4, 8) => ChordQuality::Augmented,
        _ => ChordQuality::Major,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diatonic_offsets_per_mode() {
        let sixth = Degree::diatonic(6);
        assert_eq!(degree_semitone(sixth, TonalMode::Major), 9);
        assert_eq!(degree_semitone(sixth, TonalMode::NaturalMinor), 8);
        assert_eq!(degree_semitone(sixth, TonalMode::MelodicMinor), 9);
        assert_eq!(degree_semitone(Degree::diatonic(7), TonalMode::HarmonicMinor), 11);
        assert_eq!(degree_semitone(Degree::diatonic(7), TonalMode::Mixolydian), 10);
    }

    #[test]
    fn test_altered_degrees_ignore_mode() {
        for mode in TonalMode::ALL {
            assert_eq!(degree_semitone_label("b3", mode), 3);
            assert_eq!(degree_semitone_label("#4", mode), 6);
            assert_eq!(degree_semitone_label("b7", mode), 10);
        }
    }

    #[test]
    fn test_unknown_label_falls_back_to_tonic() {
        assert_eq!(degree_semitone_label("9", TonalMode::Major), 0);
        assert_eq!(degree_semitone_label("x", TonalMode::Dorian), 0);
        assert!("8".parse::<Degree>().is_err());
        assert!("bb3".parse::<Degree>().is_err());
    }

    #[test]
    fn test_degree_display_round_trips() {
        for label in ["1", "5", "b2", "b3", "#4", "b6", "b7"] {
            let degree: Degree = label.parse().unwrap();
            assert_eq!(degree.to_string(), label);
        }
    }

    #[test]
    fn test_stability_classes() {
        assert_eq!(stability(Degree::diatonic(1)), Stability::Stable);
        assert_eq!(stability(Degree::diatonic(5)), Stability::Stable);
        assert_eq!(stability(Degree::diatonic(4)), Stability::ModeratelyUnstable);
        assert_eq!(stability(Degree::diatonic(7)), Stability::StrongTendency);
        assert_eq!(stability(Degree::altered(4, 1)), Stability::StrongTendency);
    }

    #[test]
    fn test_solfege_follows_mode() {
        assert_eq!(solfege(Degree::diatonic(3), TonalMode::Major), "mi");
        assert_eq!(solfege(Degree::diatonic(3), TonalMode::NaturalMinor), "me");
        assert_eq!(solfege(Degree::altered(4, 1), TonalMode::Major), "fi");
        assert_eq!(solfege(Degree::altered(7, -1), TonalMode::Major), "te");
    }

    #[test]
    fn test_interval_names() {
        assert_eq!(interval_name(7), "perfect 5th");
        assert_eq!(interval_name(12), "octave");
        assert_eq!(interval_name(0), "0 semitones");
        assert_eq!(interval_name(14), "14 semitones");
        assert_eq!(interval_short_name(6), "TT");
    }

    #[test]
    fn test_diatonic_triads() {
        assert_eq!(diatonic_triad(Degree::diatonic(2), TonalMode::Major), ChordQuality::Minor);
        assert_eq!(diatonic_triad(Degree::diatonic(5), TonalMode::Major), ChordQuality::Major);
        assert_eq!(diatonic_triad(Degree::diatonic(7), TonalMode::Major), ChordQuality::Diminished);
        assert_eq!(diatonic_triad(Degree::diatonic(5), TonalMode::HarmonicMinor), ChordQuality::Major);
        assert_eq!(diatonic_triad(Degree::diatonic(3), TonalMode::HarmonicMinor), ChordQuality::Augmented);
    }

    #[test]
    fn test_nearest_motion() {
        let d = Degree::diatonic;
        assert_eq!(nearest_motion(d(7), d(1), TonalMode::Major), 1);
        assert_eq!(nearest_motion(d(1), d(7), TonalMode::Major), -1);
        assert_eq!(nearest_motion(d(1), d(5), TonalMode::Major), -5);
        assert_eq!(nearest_motion(d(4), d(7), TonalMode::Major), 6);
        assert_eq!(nearest_motion(d(7), d(4), TonalMode::Major), 6);
        assert_eq!(nearest_motion(d(1), d(3), TonalMode::NaturalMinor), 3);
    }

    proptest::proptest! {
        #[test]
        fn prop_diatonic_semitones_in_octave(step in 1u8..=7, mode_index in 0usize..6) {
            let mode = TonalMode::ALL[mode_index];
            let semitone = degree_semitone(Degree::diatonic(step), mode);
            proptest::prop_assert!(semitone <= 11);
            proptest::prop_assert_eq!(semitone, mode.table()[(step - 1) as usize]);
        }

        #[test]
        fn prop_altered_labels_ignore_mode(mode_index in 0usize..6) {
            let mode = TonalMode::ALL[mode_index];
            proptest::prop_assert_eq!(degree_semitone_label("b3", mode), 3);
            proptest::prop_assert_eq!(degree_semitone_label("#4", mode), 6);
            proptest::prop_assert_eq!(degree_semitone_label("b7", mode), 10);
        }

        #[test]
        fn prop_nearest_motion_is_short(from in 1u8..=7, to in 1u8..=7, mode_index in 0usize..6) {
            let mode = TonalMode::ALL[mode_index];
            let delta = nearest_motion(Degree::diatonic(from), Degree::diatonic(to), mode);
            proptest::prop_assert!((-5..=6).contains(&delta));
            let expected = (degree_semitone(Degree::diatonic(to), mode) as i16 - degree_semitone(Degree::diatonic(from), mode) as i16).rem_euclid(12);
            proptest::prop_assert_eq!((delta as i16).rem_euclid(12), expected);
        }
    }
}
