//! # Progression Library
//!
//! A fixed library of Roman-numeral chord paths, each tagged with the cadence it ends on, a
//! difficulty stage and the tonal family it belongs to.
//!
//! ## Numeral Syntax
//! - Case gives the quality: `V` major, `ii` minor
//! - `°` (or `o`) marks diminished, `+` augmented, a trailing `7` adds the seventh
//! - A `b` or `#` prefix alters the root chromatically (`bVII`)
//!
//! Roots resolve through the active tonal mode, so `VI` in a minor key sits a minor sixth
//! above the tonic.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::pitch::PitchClass;
use crate::theory::{degree_semitone, diatonic_triad, ChordQuality, Degree, TonalFamily, TonalMode};

/// Cadence a progression ends on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CadenceType {
    Authentic,
    Plagal,
    Half,
}

impl CadenceType {
    pub const ALL: [CadenceType; 3] = [CadenceType::Authentic, CadenceType::Plagal, CadenceType::Half];

    pub fn as_str(self) -> &'static str {
        match self {
            CadenceType::Authentic => "authentic",
            CadenceType::Plagal => "plagal",
            CadenceType::Half => "half",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "authentic" => Some(CadenceType::Authentic),
            "plagal" => Some(CadenceType::Plagal),
            "half" => Some(CadenceType::Half),
            _ => None,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            CadenceType::Authentic => "dominant resolving to tonic (V → I)",
            CadenceType::Plagal => "subdominant resolving to tonic (IV → I), the 'amen' cadence",
            CadenceType::Half => "phrase pauses on the dominant, leaving the music open",
        }
    }
}

/// One entry of the built-in library
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressionDef {
    pub id: &'static str,
    pub numerals: &'static [&'static str],
    pub cadence: CadenceType,
    pub stage: u8,
    pub family: TonalFamily,
}

const fn def(
    id: &'static str,
    numerals: &'static [&'static str],
    cadence: CadenceType,
    stage: u8,
    family: TonalFamily,
) -> ProgressionDef {
    ProgressionDef {
        id,
        numerals,
        cadence,
        stage,
        family,
    }
}

pub static LIBRARY: &[ProgressionDef] = &[
    // Major
    def("I-V-I", &["I", "V", "I"], CadenceType::Authentic, 1, TonalFamily::Major),
    def("I-IV-I", &["I", "IV", "I"], CadenceType::Plagal, 1, TonalFamily::Major),
    def("I-IV-V-I", &["I", "IV", "V", "I"], CadenceType::Authentic, 1, TonalFamily::Major),
    def("I-IV-V", &["I", "IV", "V"], CadenceType::Half, 1, TonalFamily::Major),
    def("ii-V-I", &["ii", "V", "I"], CadenceType::Authentic, 2, TonalFamily::Major),
    def("I-ii-V-I", &["I", "ii", "V", "I"], CadenceType::Authentic, 2, TonalFamily::Major),
    def("I-vi-IV-V", &["I", "vi", "IV", "V"], CadenceType::Half, 2, TonalFamily::Major),
    def("I-vi-IV-I", &["I", "vi", "IV", "I"], CadenceType::Plagal, 2, TonalFamily::Major),
    def("I-vi-ii-V", &["I", "vi", "ii", "V"], CadenceType::Half, 2, TonalFamily::Major),
    def("vi-ii-V-I", &["vi", "ii", "V", "I"], CadenceType::Authentic, 3, TonalFamily::Major),
    def("I-iii-IV-V", &["I", "iii", "IV", "V"], CadenceType::Half, 3, TonalFamily::Major),
    def("I-bVII-IV-I", &["I", "bVII", "IV", "I"], CadenceType::Plagal, 3, TonalFamily::Major),
    def("ii7-V7-Imaj7", &["ii7", "V7", "Imaj7"], CadenceType::Authentic, 3, TonalFamily::Major),
    // Minor
    def("i-V-i", &["i", "V", "i"], CadenceType::Authentic, 1, TonalFamily::Minor),
    def("i-iv-i", &["i", "iv", "i"], CadenceType::Plagal, 1, TonalFamily::Minor),
    def("i-iv-V-i", &["i", "iv", "V", "i"], CadenceType::Authentic, 1, TonalFamily::Minor),
    def("i-iv-V", &["i", "iv", "V"], CadenceType::Half, 2, TonalFamily::Minor),
    def("ii°-V-i", &["ii°", "V", "i"], CadenceType::Authentic, 2, TonalFamily::Minor),
    def("i-VI-iv-V", &["i", "VI", "iv", "V"], CadenceType::Half, 2, TonalFamily::Minor),
    def("i-VI-iv-i", &["i", "VI", "iv", "i"], CadenceType::Plagal, 2, TonalFamily::Minor),
    def("i-VII-VI-V", &["i", "VII", "VI", "V"], CadenceType::Half, 3, TonalFamily::Minor),
    def("i-VI-ii°-V-i", &["i", "VI", "ii°", "V", "i"], CadenceType::Authentic, 3, TonalFamily::Minor),
];

/// Look up a progression by id.
pub fn find(id: &str) -> Option<&'static ProgressionDef> {
    LIBRARY.iter().find(|p| p.id == id)
}

/// Progressions available for a tonal family at a difficulty ceiling, in library order.
/// The mixed family draws from both halves of the library.
pub fn pool(family: TonalFamily, level: u8) -> Vec<&'static ProgressionDef> {
    LIBRARY
        .iter()
        .filter(|p| p.stage <= level.max(1))
        .filter(|p| family == TonalFamily::Mixed || p.family == family)
        .collect()
}

/// Parsed Roman numeral
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RomanNumeral {
    pub degree: Degree,
    pub quality: ChordQuality,
}

impl RomanNumeral {
    /// Parse `V`, `ii°`, `bVII`, `V7`, `Imaj7`, `ii7`. Unknown input yields `None`.
    pub fn parse(numeral: &str) -> Option<Self> {
        let (alteration, rest) = match numeral.chars().next()? {
            'b' => (-1, &numeral[1..]),
            '#' => (1, &numeral[1..]),
            _ => (0, numeral),
        };

        let roman_len = rest
            .char_indices()
            .take_while(|(_, c)| matches!(c, 'I' | 'V' | 'i' | 'v'))
            .map(|(i, c)| i + c.len_utf8())
            .last()?;
        let (roman, suffix) = rest.split_at(roman_len);

        let step = match roman.to_ascii_uppercase().as_str() {
            "I" => 1,
            "II" => 2,
            "III" => 3,
            "IV" => 4,
            "V" => 5,
            "VI" => 6,
            "VII" => 7,
            _ => return None,
        };
        let upper = roman.chars().all(|c| c.is_ascii_uppercase());

        let quality = match (upper, suffix) {
            (true, "") => ChordQuality::Major,
            (false, "") => ChordQuality::Minor,
            (_, "°") | (_, "o") => ChordQuality::Diminished,
            (_, "+") => ChordQuality::Augmented,
            (true, "7") => ChordQuality::Dominant7,
            (true, "maj7") => ChordQuality::Major7,
            (false, "7") => ChordQuality::Minor7,
            _ => return None,
        };

        Some(RomanNumeral {
            degree: Degree::altered(step, alteration),
            quality,
        })
    }

    /// Canonical label for a degree/quality pair.
    pub fn label(degree: Degree, quality: ChordQuality) -> String {
        const ROMANS: [&str; 7] = ["I", "II", "III", "IV", "V", "VI", "VII"];
        let roman = ROMANS[(degree.step() - 1) as usize];
        let prefix = match degree.alteration() {
            -1 => "b",
            1 => "#",
            _ => "",
        };
        match quality {
            ChordQuality::Major => format!("{}{}", prefix, roman),
            ChordQuality::Minor => format!("{}{}", prefix, roman.to_lowercase()),
            ChordQuality::Diminished => format!("{}{}°", prefix, roman.to_lowercase()),
            ChordQuality::Augmented => format!("{}{}+", prefix, roman),
            ChordQuality::Dominant7 => format!("{}{}7", prefix, roman),
            ChordQuality::Major7 => format!("{}{}maj7", prefix, roman),
            ChordQuality::Minor7 => format!("{}{}7", prefix, roman.to_lowercase()),
        }
    }
}

/// A chord resolved against a concrete tonic.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedChord {
    pub numeral: String,
    pub degree: Degree,
    /// Semitones above the tonic
    pub root_offset: u8,
    pub quality: ChordQuality,
    pub midi_notes: Vec<u8>,
}

/// Build one chord in close position, root in the octave below the tonic.
pub fn voice_chord(tonic: PitchClass, root_offset: u8, quality: ChordQuality) -> Vec<u8> {
    let root = tonic.tonic_midi() - 12 + root_offset;
    quality.intervals().iter().map(|i| root + i).collect()
}

pub fn resolve_numeral(
    numeral: &str,
    tonic: PitchClass,
    mode: TonalMode,
) -> ResolvedChord {
    let parsed = RomanNumeral::parse(numeral).unwrap_or_else(|| {
        tracing::warn!(numeral, "unparseable roman numeral, using the tonic triad");
        RomanNumeral {
            degree: Degree::TONIC,
            quality: ChordQuality::Major,
        }
    });
    let root_offset = degree_semitone(parsed.degree, mode);
    ResolvedChord {
        numeral: numeral.to_string(),
        degree: parsed.degree,
        root_offset,
        quality: parsed.quality,
        midi_notes: voice_chord(tonic, root_offset, parsed.quality),
    }
}

/// Resolve every numeral of a progression relative to `tonic` in `mode`.
pub fn resolve(def: &ProgressionDef, tonic: PitchClass, mode: TonalMode) -> Vec<ResolvedChord> {
    def.numerals
        .iter()
        .map(|numeral| resolve_numeral(numeral, tonic, mode))
        .collect()
}

/// A progression with one chord swapped out
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangedProgression {
    pub original: Vec<ResolvedChord>,
    pub changed: Vec<ResolvedChord>,
    /// 0-based index of the substituted chord, never 0
    pub changed_index: usize,
}

/// Replace one non-initial chord with the diatonic triad of a different scale degree.
pub fn changed_variant<R: Rng + ?Sized>(
    def: &ProgressionDef,
    tonic: PitchClass,
    mode: TonalMode,
    rng: &mut R,
) -> ChangedProgression {
    let original = resolve(def, tonic, mode);
    let mut changed = original.clone();
    if original.len() < 2 {
        return ChangedProgression {
            original,
            changed,
            changed_index: 0,
        };
    }

    let changed_index = rng.gen_range(1..original.len());
    let replaced = &original[changed_index];
    let candidates: Vec<Degree> = (1..=7)
        .map(Degree::diatonic)
        .filter(|d| degree_semitone(*d, mode) != replaced.root_offset)
        .collect();
    let degree = candidates[rng.gen_range(0..candidates.len())];
    let quality = diatonic_triad(degree, mode);
    let root_offset = degree_semitone(degree, mode);

    changed[changed_index] = ResolvedChord {
        numeral: RomanNumeral::label(degree, quality),
        degree,
        root_offset,
        quality,
        midi_notes: voice_chord(tonic, root_offset, quality),
    };

    ChangedProgression {
        original,
        changed,
        changed_index,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_numeral_parsing() {
        let v = RomanNumeral::parse("V").unwrap();
        assert_eq!(v.degree, Degree::diatonic(5));
        assert_eq!(v.quality, ChordQuality::Major);

        let ii = RomanNumeral::parse("ii°").unwrap();
        assert_eq!(ii.degree, Degree::diatonic(2));
        assert_eq!(ii.quality, ChordQuality::Diminished);

        let flat_seven = RomanNumeral::parse("bVII").unwrap();
        assert_eq!(flat_seven.degree, Degree::altered(7, -1));

        assert_eq!(RomanNumeral::parse("V7").unwrap().quality, ChordQuality::Dominant7);
        assert_eq!(RomanNumeral::parse("ii7").unwrap().quality, ChordQuality::Minor7);
        assert_eq!(RomanNumeral::parse("Imaj7").unwrap().quality, ChordQuality::Major7);
        assert!(RomanNumeral::parse("X").is_none());
        assert!(RomanNumeral::parse("Vsus").is_none());
    }

    #[test]
    fn test_every_library_numeral_parses() {
        for def in LIBRARY {
            for numeral in def.numerals {
                assert!(RomanNumeral::parse(numeral).is_some(), "{} in {}", numeral, def.id);
            }
        }
    }

    #[test]
    fn test_pool_filters_by_family_and_stage() {
        let major_easy = pool(TonalFamily::Major, 1);
        assert!(!major_easy.is_empty());
        assert!(major_easy.iter().all(|p| p.stage == 1 && p.family == TonalFamily::Major));

        let minor_all = pool(TonalFamily::Minor, 3);
        assert!(minor_all.iter().all(|p| p.family == TonalFamily::Minor));
        assert!(minor_all.len() > pool(TonalFamily::Minor, 1).len());

        assert_eq!(pool(TonalFamily::Mixed, 3).len(), LIBRARY.len());
    }

    #[test]
    fn test_resolve_ii_v_i_in_c() {
        let chords = resolve(find("ii-V-I").unwrap(), PitchClass::C, TonalMode::Major);
        assert_eq!(chords[0].midi_notes, vec![50, 53, 57]); // D3 F3 A3
        assert_eq!(chords[1].midi_notes, vec![55, 59, 62]); // G3 B3 D4
        assert_eq!(chords[2].midi_notes, vec![48, 52, 55]); // C3 E3 G3
    }

    #[test]
    fn test_resolve_minor_submediant() {
        let chords = resolve(find("i-VI-iv-V").unwrap(), PitchClass::new(9), TonalMode::HarmonicMinor);
        assert_eq!(chords[1].root_offset, 8);
        assert_eq!(chords[1].quality, ChordQuality::Major);
        assert_eq!(chords[3].root_offset, 7);
    }

    #[test]
    fn test_changed_variant_never_touches_first_chord() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let def = find("I-vi-IV-V").unwrap();
        for _ in 0..50 {
            let variant = changed_variant(def, PitchClass::C, TonalMode::Major, &mut rng);
            assert!(variant.changed_index >= 1);
            assert_eq!(variant.original[0], variant.changed[0]);
            let i = variant.changed_index;
            assert_ne!(variant.original[i].root_offset, variant.changed[i].root_offset);
            for j in (0..variant.original.len()).filter(|j| *j != i) {
                assert_eq!(variant.original[j], variant.changed[j]);
            }
        }
    }
}
