//! Melodic phrase builder.
//!
//! Phrases are 2-4 bars of four notes, written as degree labels and always closing on the
//! tonic. Wrong answers are copies of the phrase with exactly one note changed.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::pitch::PitchClass;
use crate::theory::{degree_semitone, Degree, TonalMode};

pub const NOTES_PER_BAR: usize = 4;

/// How many attempts a distractor gets before a duplicate is accepted.
const MUTATION_ATTEMPTS: usize = 16;

/// Melodic shape of a phrase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Contour {
    Stepwise,
    Triadic,
    Chromatic,
}

impl Contour {
    pub const ALL: [Contour; 3] = [Contour::Stepwise, Contour::Triadic, Contour::Chromatic];

    pub fn as_str(self) -> &'static str {
        match self {
            Contour::Stepwise => "stepwise",
            Contour::Triadic => "triadic",
            Contour::Chromatic => "chromatic",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Contour::ALL.into_iter().find(|c| c.as_str() == s)
    }

    pub fn pool(level: u8) -> Vec<Contour> {
        Contour::ALL[..(level.clamp(1, 3) as usize)].to_vec()
    }

    /// Degrees a phrase with this contour may use.
    pub fn degree_pool(self, mode: TonalMode) -> Vec<Degree> {
        match self {
            Contour::Stepwise => (1..=7).map(Degree::diatonic).collect(),
            Contour::Triadic => [1, 3, 5, 7, 2].into_iter().map(Degree::diatonic).collect(),
            Contour::Chromatic => chromatic_pool(mode),
        }
    }
}

/// Diatonic degrees plus b3, #4 and b7, ordered by sounding pitch in `mode`. Altered degrees
/// that coincide with a diatonic note of the mode are left out.
fn chromatic_pool(mode: TonalMode) -> Vec<Degree> {
    let mut pool: Vec<Degree> = (1..=7).map(Degree::diatonic).collect();
    for altered in [Degree::altered(3, -1), Degree::altered(4, 1), Degree::altered(7, -1)] {
        let semitone = degree_semitone(altered, mode);
        if pool.iter().all(|d| degree_semitone(*d, mode) != semitone) {
            pool.push(altered);
        }
    }
    pool.sort_by_key(|d| degree_semitone(*d, mode));
    pool
}

/// A generated phrase
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Phrase {
    pub contour: Contour,
    pub bars: usize,
    pub degrees: Vec<Degree>,
}

impl Phrase {
    pub fn label(&self) -> String {
        format_degrees(&self.degrees)
    }
}

pub fn format_degrees(degrees: &[Degree]) -> String {
    degrees
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn bars_for_level(level: u8) -> usize {
    (level.clamp(1, 3) as usize) + 1
}

/// Build a phrase of `bars` bars with the given contour.
pub fn build_phrase<R: Rng + ?Sized>(
    contour: Contour,
    bars: usize,
    mode: TonalMode,
    rng: &mut R,
) -> Phrase {
    let bars = bars.clamp(2, 4);
    let length = bars * NOTES_PER_BAR;
    let pool = contour.degree_pool(mode);

    let mut degrees = Vec::with_capacity(length);
    match contour {
        Contour::Stepwise | Contour::Chromatic => {
            let max_leap: isize = if contour == Contour::Stepwise { 1 } else { 2 };
            let starts: Vec<usize> = pool
                .iter()
                .enumerate()
                .filter(|(_, d)| !d.is_altered() && matches!(d.step(), 1 | 3 | 5))
                .map(|(i, _)| i)
                .collect();
            let mut index = *starts.choose(rng).unwrap_or(&0) as isize;
            degrees.push(pool[index as usize]);
            while degrees.len() < length - 1 {
                let mut step = rng.gen_range(1..=max_leap);
                if rng.gen_bool(0.5) {
                    step = -step;
                }
                let last = pool.len() as isize - 1;
                let next = index + step;
                index = if next < 0 || next > last { index - step } else { next };
                degrees.push(pool[index as usize]);
            }
        }
        Contour::Triadic => {
            let chord_tones = &pool[..3];
            degrees.push(*chord_tones.choose(rng).unwrap_or(&Degree::TONIC));
            while degrees.len() < length - 1 {
                let previous = degrees[degrees.len() - 1];
                let source = if rng.gen_bool(0.8) { chord_tones } else { &pool[..] };
                let options: Vec<Degree> = source.iter().copied().filter(|d| *d != previous).collect();
                degrees.push(*options.choose(rng).unwrap_or(&Degree::TONIC));
            }
        }
    }
    degrees.push(Degree::TONIC);

    Phrase {
        contour,
        bars,
        degrees,
    }
}

/// Three wrong answers, each a copy of `phrase` with one note replaced by a different degree
/// from the contour's pool. Distractors avoid duplicating each other when the pool allows.
pub fn mutated_distractors<R: Rng + ?Sized>(
    phrase: &Phrase,
    mode: TonalMode,
    rng: &mut R,
) -> Vec<Vec<Degree>> {
    let pool = phrase.contour.degree_pool(mode);
    let mut distractors: Vec<Vec<Degree>> = Vec::with_capacity(3);

    while distractors.len() < 3 {
        let mut candidate = phrase.degrees.clone();
        for attempt in 0..MUTATION_ATTEMPTS {
            candidate = phrase.degrees.clone();
            let position = rng.gen_range(0..candidate.len());
            let original = candidate[position];
            let replacements: Vec<Degree> = pool.iter().copied().filter(|d| *d != original).collect();
            if let Some(replacement) = replacements.choose(rng) {
                candidate[position] = *replacement;
            }
            if !distractors.contains(&candidate) || attempt + 1 == MUTATION_ATTEMPTS {
                break;
            }
        }
        distractors.push(candidate);
    }
    distractors
}

/// MIDI pitches for a degree sequence, each note placed in the octave closest to the note
/// before it so steps sound as steps.
pub fn realize(degrees: &[Degree], tonic: PitchClass, mode: TonalMode) -> Vec<u8> {
    let base = tonic.tonic_midi() as i32;
    let mut previous: Option<i32> = None;
    degrees
        .iter()
        .map(|degree| {
            let pitch = base + degree_semitone(*degree, mode) as i32;
            let placed = match previous {
                None => pitch,
                Some(prev) => {
                    let mut best = pitch;
                    for candidate in [pitch - 12, pitch, pitch + 12] {
                        if (candidate - prev).abs() < (best - prev).abs() {
                            best = candidate;
                        }
                    }
                    best
                }
            };
            previous = Some(placed);
            placed.clamp(0, 127) as u8
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_phrase_shape() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        for contour in Contour::ALL {
            for bars in 2..=4 {
                let phrase = build_phrase(contour, bars, TonalMode::Major, &mut rng);
                assert_eq!(phrase.degrees.len(), bars * NOTES_PER_BAR);
                assert_eq!(*phrase.degrees.last().unwrap(), Degree::TONIC);
                let pool = contour.degree_pool(TonalMode::Major);
                assert!(phrase.degrees.iter().all(|d| pool.contains(d)));
            }
        }
    }

    #[test]
    fn test_stepwise_moves_by_step() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let phrase = build_phrase(Contour::Stepwise, 4, TonalMode::Major, &mut rng);
        let body = &phrase.degrees[..phrase.degrees.len() - 1];
        for pair in body.windows(2) {
            let gap = (pair[0].step() as i8 - pair[1].step() as i8).abs();
            assert_eq!(gap, 1, "{}", phrase.label());
        }
    }

    #[test]
    fn test_distractors_differ_at_one_position() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        for contour in Contour::ALL {
            let phrase = build_phrase(contour, 2, TonalMode::NaturalMinor, &mut rng);
            let distractors = mutated_distractors(&phrase, TonalMode::NaturalMinor, &mut rng);
            assert_eq!(distractors.len(), 3);
            for distractor in &distractors {
                let differences = distractor
                    .iter()
                    .zip(&phrase.degrees)
                    .filter(|(a, b)| a != b)
                    .count();
                assert_eq!(differences, 1);
            }
            assert_ne!(distractors[0], distractors[1]);
            assert_ne!(distractors[1], distractors[2]);
            assert_ne!(distractors[0], distractors[2]);
        }
    }

    #[test]
    fn test_chromatic_pool_skips_duplicates() {
        let pool = chromatic_pool(TonalMode::Major);
        assert_eq!(pool.len(), 10);
        // b3 is diatonic 3 in minor
        let pool = chromatic_pool(TonalMode::NaturalMinor);
        assert!(!pool.contains(&Degree::altered(3, -1)));
        assert!(pool.contains(&Degree::altered(4, 1)));
    }

    #[test]
    fn test_realize_keeps_steps_close() {
        let degrees: Vec<Degree> = ["5", "6", "7", "1"].iter().map(|d| d.parse().unwrap()).collect();
        assert_eq!(realize(&degrees, PitchClass::C, TonalMode::Major), vec![67, 69, 71, 72]);
    }
}
