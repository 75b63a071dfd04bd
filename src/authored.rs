//! Hand-written drill text.
//!
//! An authored override replaces the generated prompt and explanation for one
//! `(mode, concept)` pair. It never changes the answer. A library of overrides is loaded from
//! YAML:
//!
//! ```yaml
//! drills:
//!   - mode: scale_degree
//!     concept: "degree:7"
//!     prompt: Which degree leans hardest toward home?
//!     explanation: The leading tone sits a half step under the tonic.
//! ```

use serde::Deserialize;

use crate::concept::{ConceptKey, ConceptMode};
use crate::error::TrainerError;

#[derive(Debug, Clone, PartialEq)]
pub struct AuthoredOverride {
    pub mode: ConceptMode,
    pub key: ConceptKey,
    pub prompt: Option<String>,
    pub explanation: Option<String>,
}

/// Lookup of authored text for a generated question.
pub trait AuthoredContent {
    fn find(&self, mode: ConceptMode, key: &ConceptKey) -> Option<&AuthoredOverride>;

    /// Drills whose mode is one of `modes`, in authored order.
    fn drills_for_modes(&self, modes: &[ConceptMode]) -> Vec<&AuthoredOverride>;
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "kebab-case")]
struct RawDrill {
    mode: String,
    concept: String,
    prompt: Option<String>,
    explanation: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
struct RawLibrary {
    #[serde(default)]
    drills: Vec<RawDrill>,
}

/// Authored overrides in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthoredLibrary {
    drills: Vec<AuthoredOverride>,
}

impl AuthoredLibrary {
    pub fn new(drills: Vec<AuthoredOverride>) -> Self {
        Self { drills }
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, TrainerError> {
        let raw: RawLibrary = if yaml.trim().is_empty() {
            RawLibrary::default()
        } else {
            serde_yaml::from_str(yaml)?
        };

        let mut drills = Vec::with_capacity(raw.drills.len());
        for drill in raw.drills {
            let mode = ConceptMode::from_str(&drill.mode).ok_or_else(|| {
                TrainerError::ConfigError(format!("unknown mode '{}' in authored drill", drill.mode))
            })?;
            let key: ConceptKey = drill.concept.parse()?;
            drills.push(AuthoredOverride {
                mode,
                key,
                prompt: drill.prompt,
                explanation: drill.explanation,
            });
        }
        Ok(Self { drills })
    }

    pub fn len(&self) -> usize {
        self.drills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drills.is_empty()
    }
}

impl AuthoredContent for AuthoredLibrary {
    fn find(&self, mode: ConceptMode, key: &ConceptKey) -> Option<&AuthoredOverride> {
        self.drills
            .iter()
            .find(|drill| drill.mode == mode && &drill.key == key)
    }

    fn drills_for_modes(&self, modes: &[ConceptMode]) -> Vec<&AuthoredOverride> {
        self.drills
            .iter()
            .filter(|drill| modes.contains(&drill.mode))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIBRARY: &str = r#"
drills:
  - mode: scale_degree
    concept: "degree:7"
    prompt: Which degree leans hardest toward home?
  - mode: progression
    concept: "cadence:plagal"
    explanation: IV to I, the "amen" cadence.
"#;

    #[test]
    fn test_load_and_find() {
        let library = AuthoredLibrary::from_yaml(LIBRARY).unwrap();
        assert_eq!(library.len(), 2);

        let key: ConceptKey = "degree:7".parse().unwrap();
        let drill = library.find(ConceptMode::ScaleDegree, &key).unwrap();
        assert_eq!(drill.prompt.as_deref(), Some("Which degree leans hardest toward home?"));
        assert!(drill.explanation.is_none());
        assert!(library.find(ConceptMode::FunctionalInterval, &key).is_none());
    }

    #[test]
    fn test_drills_for_modes() {
        let library = AuthoredLibrary::from_yaml(LIBRARY).unwrap();
        assert_eq!(library.drills_for_modes(&[ConceptMode::Progression]).len(), 1);
        assert!(library.drills_for_modes(&[ConceptMode::Timing]).is_empty());
        assert!(AuthoredLibrary::from_yaml("").unwrap().is_empty());
    }

    #[test]
    fn test_bad_drills_are_rejected() {
        let bad_key = "drills:\n  - mode: scale_degree\n    concept: \"degree:12\"\n";
        assert!(matches!(
            AuthoredLibrary::from_yaml(bad_key),
            Err(TrainerError::UnknownConcept(_))
        ));
        let bad_mode = "drills:\n  - mode: karaoke\n    concept: \"degree:1\"\n";
        assert!(matches!(
            AuthoredLibrary::from_yaml(bad_mode),
            Err(TrainerError::ConfigError(_))
        ));
    }
}
