//! # Concept and Context Keys
//!
//! A concept key names one testable musical fact. It is used both to choose what to ask and
//! to record how well the learner knows it, so it must stay stable across sessions.
//!
//! ## Key Families
//! ```text
//! degree:3             scale degree
//! movement:7->1        functional interval between two degrees
//! chord:minor          chord quality
//! progression:ii-V-I   progression identity
//! cadence:authentic    cadence type
//! meter:4/4            meter identification
//! subdivision:eighth   subdivision identification
//! syncopation:present  syncopation detection
//! rhythm:4/4           tap reproduction
//! phrase:stepwise      melodic phrase dictation
//! ```
//!
//! Keys are a tagged union in memory and only become strings at the persistence boundary.
//! Parsing rejects anything outside these families, which keeps stale or hand-edited keys out
//! of review queues.
//!
//! A [`ContextKey`] partitions mastery by mode, hearing context and tonal family, so degree 3
//! heard melodically in major is tracked apart from degree 3 over harmonic minor chords.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TrainerError;
use crate::phrase::Contour;
use crate::progression::{self, CadenceType};
use crate::theory::{ChordQuality, Degree, TonalFamily};
use crate::timing::{Meter, Subdivision};

/// Kind of question being asked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConceptMode {
    ScaleDegree,
    FunctionalInterval,
    ChordQuality,
    Progression,
    Timing,
    Phrase,
}

impl ConceptMode {
    pub const ALL: [ConceptMode; 6] = [
        ConceptMode::ScaleDegree,
        ConceptMode::FunctionalInterval,
        ConceptMode::ChordQuality,
        ConceptMode::Progression,
        ConceptMode::Timing,
        ConceptMode::Phrase,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ConceptMode::ScaleDegree => "scale_degree",
            ConceptMode::FunctionalInterval => "functional_interval",
            ConceptMode::ChordQuality => "chord_quality",
            ConceptMode::Progression => "progression",
            ConceptMode::Timing => "timing",
            ConceptMode::Phrase => "phrase",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        ConceptMode::ALL.into_iter().find(|mode| mode.as_str() == s)
    }

    /// Relative weight when sampling a mode for a fresh question. Degrees and intervals are
    /// the backbone of the course; harmony, rhythm and phrases are mixed in less often.
    pub fn sampling_weight(self) -> f64 {
        match self {
            ConceptMode::ScaleDegree => 5.0,
            ConceptMode::FunctionalInterval => 5.0,
            ConceptMode::ChordQuality => 2.5,
            ConceptMode::Progression => 2.0,
            ConceptMode::Timing => 2.0,
            ConceptMode::Phrase => 1.5,
        }
    }

    /// Modes whose answer can be sung back before it is revealed.
    pub fn is_singable(self) -> bool {
        matches!(
            self,
            ConceptMode::ScaleDegree | ConceptMode::FunctionalInterval | ConceptMode::Phrase
        )
    }
}

impl fmt::Display for ConceptMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether material is heard one note at a time or stacked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HearingContext {
    Melodic,
    Harmonic,
}

impl HearingContext {
    pub fn as_str(self) -> &'static str {
        match self {
            HearingContext::Melodic => "melodic",
            HearingContext::Harmonic => "harmonic",
        }
    }
}

/// Partition under which a concept's mastery is tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextKey {
    pub mode: ConceptMode,
    pub hearing: HearingContext,
    pub family: TonalFamily,
}

impl ContextKey {
    pub fn new(mode: ConceptMode, hearing: HearingContext, family: TonalFamily) -> Self {
        Self {
            mode,
            hearing,
            family,
        }
    }
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}",
            self.mode.as_str(),
            self.hearing.as_str(),
            self.family.as_str()
        )
    }
}

impl FromStr for ContextKey {
    type Err = TrainerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || TrainerError::UnknownConcept(format!("context '{}'", s));
        let mut parts = s.split('|');
        let mode = parts.next().and_then(ConceptMode::from_str).ok_or_else(unknown)?;
        let hearing = match parts.next() {
            Some("melodic") => HearingContext::Melodic,
            Some("harmonic") => HearingContext::Harmonic,
            _ => return Err(unknown()),
        };
        let family = parts.next().and_then(TonalFamily::from_str).ok_or_else(unknown)?;
        if parts.next().is_some() {
            return Err(unknown());
        }
        Ok(ContextKey::new(mode, hearing, family))
    }
}

impl Serialize for ContextKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ContextKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// One testable musical fact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConceptKey {
    Degree(Degree),
    Movement { from: Degree, to: Degree },
    Chord(ChordQuality),
    /// Progression id from the built-in library, e.g. `ii-V-I`
    Progression(String),
    Cadence(CadenceType),
    Meter(Meter),
    Subdivision(Subdivision),
    /// `true` when the pattern is syncopated
    Syncopation(bool),
    /// Tap reproduction of a pattern in the given meter
    Rhythm(Meter),
    Phrase(Contour),
}

impl ConceptKey {
    /// Concept used when a candidate pool is unexpectedly empty.
    pub fn fallback() -> Self {
        ConceptKey::Degree(Degree::TONIC)
    }

    /// Mode that normally asks about this concept.
    pub fn mode(&self) -> ConceptMode {
        match self {
            ConceptKey::Degree(_) => ConceptMode::ScaleDegree,
            ConceptKey::Movement { .. } => ConceptMode::FunctionalInterval,
            ConceptKey::Chord(_) => ConceptMode::ChordQuality,
            ConceptKey::Progression(_) | ConceptKey::Cadence(_) => ConceptMode::Progression,
            ConceptKey::Meter(_)
            | ConceptKey::Subdivision(_)
            | ConceptKey::Syncopation(_)
            | ConceptKey::Rhythm(_) => ConceptMode::Timing,
            ConceptKey::Phrase(_) => ConceptMode::Phrase,
        }
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            ConceptKey::Degree(_) => "degree",
            ConceptKey::Movement { .. } => "movement",
            ConceptKey::Chord(_) => "chord",
            ConceptKey::Progression(_) => "progression",
            ConceptKey::Cadence(_) => "cadence",
            ConceptKey::Meter(_) => "meter",
            ConceptKey::Subdivision(_) => "subdivision",
            ConceptKey::Syncopation(_) => "syncopation",
            ConceptKey::Rhythm(_) => "rhythm",
            ConceptKey::Phrase(_) => "phrase",
        }
    }
}

impl fmt::Display for ConceptKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.prefix())?;
        match self {
            ConceptKey::Degree(degree) => write!(f, "{}", degree),
            ConceptKey::Movement { from, to } => write!(f, "{}->{}", from, to),
            ConceptKey::Chord(quality) => f.write_str(quality.as_str()),
            ConceptKey::Progression(id) => f.write_str(id),
            ConceptKey::Cadence(cadence) => f.write_str(cadence.as_str()),
            ConceptKey::Meter(meter) | ConceptKey::Rhythm(meter) => write!(f, "{}", meter),
            ConceptKey::Subdivision(subdivision) => f.write_str(subdivision.as_str()),
            ConceptKey::Syncopation(true) => f.write_str("present"),
            ConceptKey::Syncopation(false) => f.write_str("absent"),
            ConceptKey::Phrase(contour) => f.write_str(contour.as_str()),
        }
    }
}

impl FromStr for ConceptKey {
    type Err = TrainerError;

    /// Parse the persisted string form.
    ///
    /// ```
    /// use eartrain::ConceptKey;
    ///
    /// let key: ConceptKey = "movement:7->1".parse().unwrap();
    /// assert_eq!(key.to_string(), "movement:7->1");
    /// assert!("tempo:fast".parse::<ConceptKey>().is_err());
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || TrainerError::UnknownConcept(s.to_string());
        let (prefix, subject) = s.split_once(':').ok_or_else(unknown)?;
        let key = match prefix {
            "degree" => ConceptKey::Degree(subject.parse().map_err(|_| unknown())?),
            "movement" => {
                let (from, to) = subject.split_once("->").ok_or_else(unknown)?;
                let from: Degree = from.parse().map_err(|_| unknown())?;
                let to: Degree = to.parse().map_err(|_| unknown())?;
                if from == to {
                    return Err(unknown());
                }
                ConceptKey::Movement { from, to }
            }
            "chord" => ConceptKey::Chord(ChordQuality::from_str(subject).ok_or_else(unknown)?),
            "progression" => {
                if progression::find(subject).is_none() {
                    return Err(unknown());
                }
                ConceptKey::Progression(subject.to_string())
            }
            "cadence" => ConceptKey::Cadence(CadenceType::from_str(subject).ok_or_else(unknown)?),
            "meter" => ConceptKey::Meter(Meter::from_str(subject).ok_or_else(unknown)?),
            "subdivision" => {
                ConceptKey::Subdivision(Subdivision::from_str(subject).ok_or_else(unknown)?)
            }
            "syncopation" => match subject {
                "present" => ConceptKey::Syncopation(true),
                "absent" => ConceptKey::Syncopation(false),
                _ => return Err(unknown()),
            },
            "rhythm" => ConceptKey::Rhythm(Meter::from_str(subject).ok_or_else(unknown)?),
            "phrase" => ConceptKey::Phrase(Contour::from_str(subject).ok_or_else(unknown)?),
            _ => return Err(unknown()),
        };
        Ok(key)
    }
}

impl Serialize for ConceptKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ConceptKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concept_keys_round_trip_through_strings() {
        for raw in [
            "degree:3",
            "degree:b7",
            "movement:7->1",
            "movement:#4->5",
            "chord:diminished",
            "progression:ii-V-I",
            "cadence:plagal",
            "meter:6/8",
            "subdivision:triplet",
            "syncopation:present",
            "rhythm:4/4",
            "phrase:chromatic",
        ] {
            let key: ConceptKey = raw.parse().unwrap();
            assert_eq!(key.to_string(), raw);
        }
    }

    #[test]
    fn test_unrecognised_keys_are_rejected() {
        for raw in [
            "degree:9",
            "movement:3->3",
            "movement:3",
            "progression:I-bogus",
            "meter:7/16",
            "syncopation:maybe",
            "tempo:fast",
            "degree3",
        ] {
            assert!(raw.parse::<ConceptKey>().is_err(), "{} should not parse", raw);
        }
    }

    #[test]
    fn test_key_modes() {
        let key: ConceptKey = "cadence:half".parse().unwrap();
        assert_eq!(key.mode(), ConceptMode::Progression);
        let key: ConceptKey = "rhythm:3/4".parse().unwrap();
        assert_eq!(key.mode(), ConceptMode::Timing);
        assert_eq!(ConceptKey::fallback().to_string(), "degree:1");
    }

    #[test]
    fn test_context_key_format() {
        let context = ContextKey::new(
            ConceptMode::ScaleDegree,
            HearingContext::Melodic,
            TonalFamily::Major,
        );
        assert_eq!(context.to_string(), "scale_degree|melodic|major");
        assert_eq!("scale_degree|melodic|major".parse::<ContextKey>().unwrap(), context);
        assert!("scale_degree|loud|major".parse::<ContextKey>().is_err());
        assert!("scale_degree|melodic|major|x".parse::<ContextKey>().is_err());
    }
}
