//! # Generator Configuration
//!
//! Parameters for one practice session, usually loaded from YAML:
//!
//! ```yaml
//! modes: [scale_degree, functional_interval, progression]
//! levels:
//!   progression: 2
//! key-mode: mixed
//! interval-style: scale-context
//! tonics: [C, G, Bb]
//! shift-tonic-every: 4
//! sing-quota: 2
//! tempo: 96
//! ```
//!
//! Every key is optional; missing keys take the values of [`GeneratorConfig::default`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::concept::ConceptMode;
use crate::error::TrainerError;
use crate::pitch::PitchClass;
use crate::theory::{TonalFamily, TonalMode};

pub const MAX_LEVEL: u8 = 3;

/// Tonal mode used for pitched questions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyMode {
    Fixed(TonalMode),
    /// Major, natural minor or harmonic minor, chosen per question
    Mixed,
}

impl KeyMode {
    pub const MIXED_POOL: [TonalMode; 3] = [
        TonalMode::Major,
        TonalMode::NaturalMinor,
        TonalMode::HarmonicMinor,
    ];

    pub fn family(self) -> TonalFamily {
        match self {
            KeyMode::Fixed(mode) => mode.family(),
            KeyMode::Mixed => TonalFamily::Mixed,
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        if s == "mixed" {
            return Some(KeyMode::Mixed);
        }
        TonalMode::ALL
            .into_iter()
            .find(|mode| mode.label() == s || mode.label().replace(' ', "-") == s)
            .map(KeyMode::Fixed)
    }
}

/// How a scale-degree question establishes the key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DegreeStyle {
    /// I-IV-V-I lead-in, then the tone
    #[default]
    CadenceThenTone,
    /// Tonic drone under the tone
    Drone,
    /// Tonic, then the tone
    Bare,
}

impl DegreeStyle {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "cadence-then-tone" | "cadence" => Some(DegreeStyle::CadenceThenTone),
            "drone" => Some(DegreeStyle::Drone),
            "bare" => Some(DegreeStyle::Bare),
            _ => None,
        }
    }
}

/// How the two notes of an interval are played
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum IntervalStyle {
    /// Both notes together
    Stacked,
    /// Second note right after the first
    #[default]
    Immediate,
    /// A beat of silence between the notes
    Paused,
    /// Tonic lead-in, then the movement
    ScaleContext,
}

impl IntervalStyle {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "stacked" => Some(IntervalStyle::Stacked),
            "immediate" => Some(IntervalStyle::Immediate),
            "paused" => Some(IntervalStyle::Paused),
            "scale-context" => Some(IntervalStyle::ScaleContext),
            _ => None,
        }
    }
}

/// How chords are sounded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum HarmonyStyle {
    #[default]
    Block,
    Arpeggiated,
}

impl HarmonyStyle {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "block" => Some(HarmonyStyle::Block),
            "arpeggiated" => Some(HarmonyStyle::Arpeggiated),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackStyles {
    pub degree: DegreeStyle,
    pub interval: IntervalStyle,
    pub harmony: HarmonyStyle,
}

/// Validated session parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratorConfig {
    pub modes: Vec<ConceptMode>,
    /// Difficulty 1-3 per mode; missing modes play at level 1
    pub levels: BTreeMap<ConceptMode, u8>,
    pub key_mode: KeyMode,
    pub styles: PlaybackStyles,
    pub tonic_pool: Vec<PitchClass>,
    /// Rotate the tonic every N questions
    pub shift_tonic_every: Option<usize>,
    /// Leading singable questions that must be sung before the answer is revealed
    pub sing_quota: usize,
    /// Chance that a scale-degree question tests 7 -> 1 instead
    pub predictive_resolution_chance: f64,
    pub tempo: u16,
    pub tap_tolerance_beats: f64,
    /// Answer choices for multiple-choice questions (interval movements always offer 4)
    pub choice_count: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            modes: ConceptMode::ALL.to_vec(),
            levels: BTreeMap::new(),
            key_mode: KeyMode::Fixed(TonalMode::Major),
            styles: PlaybackStyles::default(),
            tonic_pool: [0, 7, 5, 2, 10].into_iter().map(PitchClass::new).collect(),
            shift_tonic_every: None,
            sing_quota: 0,
            predictive_resolution_chance: 0.15,
            tempo: 90,
            tap_tolerance_beats: 0.22,
            choice_count: 4,
        }
    }
}

/// Raw configuration for YAML deserialization
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case")]
pub struct RawConfig {
    pub modes: Option<Vec<String>>,
    pub levels: Option<BTreeMap<String, u8>>,
    pub key_mode: Option<String>,
    pub degree_style: Option<String>,
    pub interval_style: Option<String>,
    pub harmony_style: Option<String>,
    pub tonics: Option<Vec<String>>,
    pub shift_tonic_every: Option<usize>,
    pub sing_quota: Option<usize>,
    pub predictive_resolution_chance: Option<f64>,
    pub tempo: Option<u32>,
    pub tap_tolerance_beats: Option<f64>,
    pub choice_count: Option<usize>,
}

fn invalid(message: String) -> TrainerError {
    TrainerError::ConfigError(message)
}

impl GeneratorConfig {
    /// Parse and validate a YAML configuration.
    ///
    /// ```
    /// use eartrain::GeneratorConfig;
    /// use eartrain::concept::ConceptMode;
    ///
    /// let config = GeneratorConfig::from_yaml("modes: [timing]\ntempo: 72").unwrap();
    /// assert_eq!(config.modes, vec![ConceptMode::Timing]);
    /// assert_eq!(config.tempo, 72);
    /// assert!(GeneratorConfig::from_yaml("levels: { timing: 4 }").is_err());
    /// ```
    pub fn from_yaml(yaml: &str) -> Result<Self, TrainerError> {
        let raw: RawConfig = if yaml.trim().is_empty() {
            RawConfig::default()
        } else {
            serde_yaml::from_str(yaml)?
        };
        Self::from_raw(raw)
    }

    pub fn from_raw(raw: RawConfig) -> Result<Self, TrainerError> {
        let defaults = Self::default();

        let modes = match raw.modes {
            Some(names) => {
                let mut modes = Vec::with_capacity(names.len());
                for name in &names {
                    let mode = ConceptMode::from_str(name)
                        .ok_or_else(|| invalid(format!("unknown mode '{}'", name)))?;
                    if !modes.contains(&mode) {
                        modes.push(mode);
                    }
                }
                modes
            }
            None => defaults.modes,
        };
        if modes.is_empty() {
            return Err(invalid("at least one mode must be enabled".to_string()));
        }

        let mut levels = BTreeMap::new();
        for (name, level) in raw.levels.unwrap_or_default() {
            let mode = ConceptMode::from_str(&name)
                .ok_or_else(|| invalid(format!("unknown mode '{}' in levels", name)))?;
            if !(1..=MAX_LEVEL).contains(&level) {
                return Err(invalid(format!(
                    "level for {} must be between 1 and {}, got {}",
                    name, MAX_LEVEL, level
                )));
            }
            levels.insert(mode, level);
        }

        let key_mode = match raw.key_mode {
            Some(s) => KeyMode::from_str(&s).ok_or_else(|| invalid(format!("unknown key mode '{}'", s)))?,
            None => defaults.key_mode,
        };

        let mut styles = defaults.styles;
        if let Some(s) = raw.degree_style {
            styles.degree = DegreeStyle::from_str(&s)
                .ok_or_else(|| invalid(format!("unknown degree style '{}'", s)))?;
        }
        if let Some(s) = raw.interval_style {
            styles.interval = IntervalStyle::from_str(&s)
                .ok_or_else(|| invalid(format!("unknown interval style '{}'", s)))?;
        }
        if let Some(s) = raw.harmony_style {
            styles.harmony = HarmonyStyle::from_str(&s)
                .ok_or_else(|| invalid(format!("unknown harmony style '{}'", s)))?;
        }

        let tonic_pool = match raw.tonics {
            Some(names) => {
                let mut pool = Vec::with_capacity(names.len());
                for name in &names {
                    let tonic: PitchClass = name.parse()?;
                    if !pool.contains(&tonic) {
                        pool.push(tonic);
                    }
                }
                pool
            }
            None => defaults.tonic_pool,
        };
        if tonic_pool.is_empty() {
            return Err(invalid("tonic pool is empty".to_string()));
        }

        let predictive_resolution_chance = raw
            .predictive_resolution_chance
            .unwrap_or(defaults.predictive_resolution_chance);
        if !(0.0..=1.0).contains(&predictive_resolution_chance) {
            return Err(invalid(format!(
                "predictive-resolution-chance must be between 0 and 1, got {}",
                predictive_resolution_chance
            )));
        }

        let tempo = match raw.tempo {
            Some(t) if t == 0 || t > 400 => {
                return Err(invalid(format!("tempo must be between 1 and 400, got {}", t)))
            }
            Some(t) => t as u16,
            None => defaults.tempo,
        };

        let tap_tolerance_beats = raw.tap_tolerance_beats.unwrap_or(defaults.tap_tolerance_beats);
        if !(tap_tolerance_beats > 0.0 && tap_tolerance_beats <= 1.0) {
            return Err(invalid(format!(
                "tap-tolerance-beats must be in (0, 1], got {}",
                tap_tolerance_beats
            )));
        }

        let choice_count = raw.choice_count.unwrap_or(defaults.choice_count);
        if !(2..=8).contains(&choice_count) {
            return Err(invalid(format!(
                "choice-count must be between 2 and 8, got {}",
                choice_count
            )));
        }

        Ok(Self {
            modes,
            levels,
            key_mode,
            styles,
            tonic_pool,
            shift_tonic_every: raw.shift_tonic_every.filter(|n| *n > 0),
            sing_quota: raw.sing_quota.unwrap_or(defaults.sing_quota),
            predictive_resolution_chance,
            tempo,
            tap_tolerance_beats,
            choice_count,
        })
    }

    pub fn level(&self, mode: ConceptMode) -> u8 {
        self.levels.get(&mode).copied().unwrap_or(1).clamp(1, MAX_LEVEL)
    }

    pub fn is_enabled(&self, mode: ConceptMode) -> bool {
        self.modes.contains(&mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_yaml_gives_defaults() {
        let config = GeneratorConfig::from_yaml("").unwrap();
        assert_eq!(config, GeneratorConfig::default());
        assert_eq!(config.level(ConceptMode::Phrase), 1);
    }

    #[test]
    fn test_full_yaml() {
        let yaml = r#"
modes: [scale_degree, functional_interval, progression]
levels:
  progression: 2
  functional_interval: 3
key-mode: mixed
degree-style: drone
interval-style: scale-context
harmony-style: arpeggiated
tonics: [C, G, Bb]
shift-tonic-every: 4
sing-quota: 2
predictive-resolution-chance: 0.5
tempo: 96
tap-tolerance-beats: 0.25
choice-count: 3
"#;
        let config = GeneratorConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.modes.len(), 3);
        assert_eq!(config.level(ConceptMode::Progression), 2);
        assert_eq!(config.level(ConceptMode::FunctionalInterval), 3);
        assert_eq!(config.level(ConceptMode::ScaleDegree), 1);
        assert_eq!(config.key_mode, KeyMode::Mixed);
        assert_eq!(config.key_mode.family(), TonalFamily::Mixed);
        assert_eq!(config.styles.degree, DegreeStyle::Drone);
        assert_eq!(config.styles.interval, IntervalStyle::ScaleContext);
        assert_eq!(config.styles.harmony, HarmonyStyle::Arpeggiated);
        assert_eq!(config.tonic_pool, vec![PitchClass::new(0), PitchClass::new(7), PitchClass::new(10)]);
        assert_eq!(config.shift_tonic_every, Some(4));
        assert_eq!(config.sing_quota, 2);
        assert_eq!(config.tempo, 96);
        assert_eq!(config.choice_count, 3);
    }

    #[test]
    fn test_fixed_key_mode() {
        let config = GeneratorConfig::from_yaml("key-mode: dorian").unwrap();
        assert_eq!(config.key_mode, KeyMode::Fixed(TonalMode::Dorian));
        assert_eq!(config.key_mode.family(), TonalFamily::Minor);
        let config = GeneratorConfig::from_yaml("key-mode: harmonic-minor").unwrap();
        assert_eq!(config.key_mode, KeyMode::Fixed(TonalMode::HarmonicMinor));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        for yaml in [
            "modes: []",
            "modes: [karaoke]",
            "levels: { phrase: 0 }",
            "key-mode: lydian-dominant",
            "interval-style: sideways",
            "tonics: [H]",
            "tonics: []",
            "predictive-resolution-chance: 1.5",
            "tempo: 0",
            "tap-tolerance-beats: 0",
            "choice-count: 1",
        ] {
            assert!(GeneratorConfig::from_yaml(yaml).is_err(), "{} should be rejected", yaml);
        }
        assert!(matches!(
            GeneratorConfig::from_yaml("tempo: 0"),
            Err(TrainerError::ConfigError(_))
        ));
        assert!(matches!(
            GeneratorConfig::from_yaml("tempo: [fast"),
            Err(TrainerError::Yaml(_))
        ));
    }

    #[test]
    fn test_zero_shift_disables_rotation() {
        let config = GeneratorConfig::from_yaml("shift-tonic-every: 0").unwrap();
        assert_eq!(config.shift_tonic_every, None);
    }
}
