//! Session assembly.
//!
//! A session is a run of questions produced by calling the generator repeatedly, threading the
//! tonic from one question to the next. Review sources pin each question to a concept taken
//! from the learner's progress; the authored source pins the concepts of hand-written drills.

use rand::Rng;
use serde::Serialize;

use crate::concept::{ConceptKey, ConceptMode, ContextKey};
use crate::generator::{GenerationRequest, QuestionGenerator};
use crate::mastery::{ProgressSnapshot, ReviewFilter, ReviewStrategy};
use crate::pitch::PitchClass;
use crate::question::TrainingQuestion;

/// Where the concepts of a session come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionSource {
    /// Adaptive sampling over the enabled modes
    #[default]
    Fresh,
    /// Concepts whose review date has passed, earliest first
    Due,
    /// Concepts with low mastery, weakest first
    Weak,
    /// Concepts of authored drills for the enabled modes
    Authored,
}

impl SessionSource {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "fresh" => Some(SessionSource::Fresh),
            "due" => Some(SessionSource::Due),
            "weak" => Some(SessionSource::Weak),
            "authored" => Some(SessionSource::Authored),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionSource::Fresh => "fresh",
            SessionSource::Due => "due",
            SessionSource::Weak => "weak",
            SessionSource::Authored => "authored",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionRequest {
    /// Most questions to produce. Pinned sources stop early when they run out of concepts.
    pub count: usize,
    pub start_tonic: PitchClass,
    pub source: SessionSource,
    /// Applied to review sources only
    pub filter: ReviewFilter,
}

impl SessionRequest {
    pub fn new(count: usize, start_tonic: PitchClass) -> Self {
        Self {
            count,
            start_tonic,
            source: SessionSource::Fresh,
            filter: ReviewFilter::default(),
        }
    }

    pub fn with_source(mut self, source: SessionSource) -> Self {
        self.source = source;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub questions: Vec<TrainingQuestion>,
    /// Tonic of the last question, to start the next session from
    pub final_tonic: PitchClass,
}

/// Concept a single question is pinned to.
#[derive(Debug, Clone)]
struct Pin {
    mode: ConceptMode,
    key: ConceptKey,
    /// Bucket under review, absent for authored drills
    context: Option<ContextKey>,
}

/// Concepts each question is pinned to, or `None` for fresh sampling.
fn pinned_concepts<R: Rng>(
    generator: &QuestionGenerator<'_, R>,
    request: &SessionRequest,
    progress: &ProgressSnapshot,
    now: i64,
) -> Option<Vec<Pin>> {
    let review = |strategy: ReviewStrategy| -> Vec<Pin> {
        progress
            .review_entries(strategy, &request.filter, now)
            .into_iter()
            .map(|entry| Pin {
                mode: entry.context.mode,
                key: entry.key,
                context: Some(entry.context),
            })
            .collect()
    };
    match request.source {
        SessionSource::Fresh => None,
        SessionSource::Due => Some(review(ReviewStrategy::Due)),
        SessionSource::Weak => Some(review(ReviewStrategy::Weak)),
        SessionSource::Authored => Some(
            generator
                .authored()
                .map(|content| {
                    content
                        .drills_for_modes(&generator.config().modes)
                        .into_iter()
                        .map(|drill| Pin {
                            mode: drill.mode,
                            key: drill.key.clone(),
                            context: None,
                        })
                        .collect()
                })
                .unwrap_or_default(),
        ),
    }
}

/// Build a session of up to `request.count` questions.
///
/// Fresh questions are sampled with the adaptive weights of `progress` at `now`. The first
/// `sing_quota` singable questions are marked as requiring the learner to sing.
pub fn generate_session<R: Rng>(
    generator: &mut QuestionGenerator<'_, R>,
    request: &SessionRequest,
    progress: &ProgressSnapshot,
    now: i64,
) -> Session {
    let weights = progress.weights_at(now);
    let pins = pinned_concepts(generator, request, progress, now);
    let count = match &pins {
        Some(pins) => pins.len().min(request.count),
        None => request.count,
    };
    if count == 0 && request.count > 0 {
        tracing::info!(source = request.source.as_str(), "nothing to review, empty session");
    }

    let mut tonic = request.start_tonic;
    let mut questions = Vec::with_capacity(count);
    for index in 0..count {
        let mut generation = GenerationRequest::new(index, tonic);
        if let Some(pin) = pins.as_ref().and_then(|pins| pins.get(index)) {
            generation = generation.forced(Some(pin.mode), Some(pin.key.clone()));
            if let Some(context) = pin.context {
                generation = generation.in_context(context);
            }
        }
        let generated = generator.generate(&generation, &weights);
        tonic = generated.tonic;
        questions.push(generated.question);
    }

    let mut quota = generator.config().sing_quota;
    for question in questions.iter_mut() {
        if quota == 0 {
            break;
        }
        if question.mode.is_singable() {
            question.requires_singing = true;
            quota -= 1;
        }
    }

    tracing::info!(
        source = request.source.as_str(),
        questions = questions.len(),
        final_tonic = %tonic,
        "session assembled"
    );
    Session {
        questions,
        final_tonic: tonic,
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::authored::{AuthoredLibrary, AuthoredOverride};
    use crate::concept::ContextKey;
    use crate::config::GeneratorConfig;
    use crate::mastery::AttemptRecord;
    use crate::theory::TonalFamily;

    const NOW: i64 = 1_700_000_000_000;

    fn key(raw: &str) -> ConceptKey {
        raw.parse().unwrap()
    }

    fn progress_with(records: &[(&str, &str, bool)]) -> ProgressSnapshot {
        let mut progress = ProgressSnapshot::default();
        for (concept, context, correct) in records {
            progress.record(
                &AttemptRecord {
                    concept_keys: vec![key(concept)],
                    context: context.parse::<ContextKey>().unwrap(),
                    correct: *correct,
                    response_ms: None,
                },
                NOW - 10,
            );
        }
        progress
    }

    #[test]
    fn test_fresh_session_threads_tonic() {
        let config = GeneratorConfig {
            shift_tonic_every: Some(3),
            ..GeneratorConfig::default()
        };
        let mut generator = QuestionGenerator::new(&config, ChaCha8Rng::seed_from_u64(1));
        let request = SessionRequest::new(7, PitchClass::C);
        let session = generate_session(&mut generator, &request, &ProgressSnapshot::default(), NOW);

        assert_eq!(session.questions.len(), 7);
        assert!(session.questions[..3].iter().all(|q| q.tonic == PitchClass::C));
        assert_ne!(session.questions[3].tonic, PitchClass::C);
        assert_eq!(session.questions[3].tonic, session.questions[5].tonic);
        assert_eq!(session.final_tonic, session.questions[6].tonic);
    }

    #[test]
    fn test_due_session_pins_review_keys() {
        let config = GeneratorConfig {
            predictive_resolution_chance: 0.0,
            ..GeneratorConfig::default()
        };
        let progress = progress_with(&[
            ("degree:4", "scale_degree|melodic|major", false),
            ("chord:minor", "chord_quality|harmonic|major", false),
            ("movement:7->1", "scale_degree|melodic|major", false),
        ]);
        let mut generator = QuestionGenerator::new(&config, ChaCha8Rng::seed_from_u64(2));
        let request = SessionRequest::new(10, PitchClass::C).with_source(SessionSource::Due);
        let session = generate_session(&mut generator, &request, &progress, NOW);

        assert_eq!(session.questions.len(), 3);
        let keys: Vec<String> = session.questions.iter().map(|q| q.focus_key.to_string()).collect();
        assert!(keys.contains(&"degree:4".to_string()));
        assert!(keys.contains(&"chord:minor".to_string()));
        let resolution = session
            .questions
            .iter()
            .find(|q| q.focus_key == key("movement:7->1"))
            .unwrap();
        assert_eq!(resolution.mode, ConceptMode::ScaleDegree);
    }

    #[test]
    fn test_due_minor_degree_replays_until_learned() {
        let config = GeneratorConfig {
            predictive_resolution_chance: 0.0,
            ..GeneratorConfig::default()
        };
        let mut progress = progress_with(&[("degree:3", "scale_degree|melodic|minor", false)]);
        let mut generator = QuestionGenerator::new(&config, ChaCha8Rng::seed_from_u64(5));
        let request = SessionRequest::new(5, PitchClass::C).with_source(SessionSource::Due);
        let filter = ReviewFilter::default();

        for _ in 0..12 {
            let session = generate_session(&mut generator, &request, &progress, NOW);
            let Some(question) = session.questions.first() else {
                break;
            };
            assert_eq!(question.focus_key, key("degree:3"));
            assert_eq!(question.context.to_string(), "scale_degree|melodic|minor");
            assert_eq!(question.tonal_mode.family(), TonalFamily::Minor);
            progress.record(&question.attempt(true, None), NOW);
        }

        assert!(progress.review_entries(ReviewStrategy::Due, &filter, NOW).is_empty());
    }

    #[test]
    fn test_due_replay_keeps_family_and_hearing() {
        let config = GeneratorConfig {
            modes: vec![ConceptMode::Progression, ConceptMode::FunctionalInterval],
            ..GeneratorConfig::default()
        };
        let progress = progress_with(&[
            ("progression:i-iv-i", "progression|harmonic|minor", false),
            ("movement:1->2", "functional_interval|harmonic|major", false),
        ]);
        let mut generator = QuestionGenerator::new(&config, ChaCha8Rng::seed_from_u64(6));
        let request = SessionRequest::new(5, PitchClass::C).with_source(SessionSource::Due);
        let session = generate_session(&mut generator, &request, &progress, NOW);

        assert_eq!(session.questions.len(), 2);
        let mut replayed: Vec<(String, String)> = session
            .questions
            .iter()
            .map(|q| (q.focus_key.to_string(), q.context.to_string()))
            .collect();
        replayed.sort();
        assert_eq!(
            replayed,
            vec![
                (
                    "movement:1->2".to_string(),
                    "functional_interval|harmonic|major".to_string()
                ),
                (
                    "progression:i-iv-i".to_string(),
                    "progression|harmonic|minor".to_string()
                ),
            ]
        );
    }

    #[test]
    fn test_review_filter_and_empty_queue() {
        let config = GeneratorConfig::default();
        let progress = progress_with(&[("degree:4", "scale_degree|melodic|major", false)]);
        let mut generator = QuestionGenerator::new(&config, ChaCha8Rng::seed_from_u64(3));

        let mut request = SessionRequest::new(5, PitchClass::C).with_source(SessionSource::Due);
        request.filter.modes = vec![ConceptMode::Timing];
        assert!(generate_session(&mut generator, &request, &progress, NOW).questions.is_empty());

        let weak = SessionRequest::new(5, PitchClass::C).with_source(SessionSource::Weak);
        assert!(generate_session(&mut generator, &weak, &progress, NOW).questions.is_empty());
    }

    #[test]
    fn test_authored_session() {
        let config = GeneratorConfig {
            modes: vec![ConceptMode::ScaleDegree],
            predictive_resolution_chance: 0.0,
            ..GeneratorConfig::default()
        };
        let library = AuthoredLibrary::new(vec![
            AuthoredOverride {
                mode: ConceptMode::ScaleDegree,
                key: key("degree:5"),
                prompt: Some("Find sol.".to_string()),
                explanation: None,
            },
            AuthoredOverride {
                mode: ConceptMode::Timing,
                key: key("meter:3/4"),
                prompt: Some("Count the waltz.".to_string()),
                explanation: None,
            },
        ]);
        let mut generator =
            QuestionGenerator::new(&config, ChaCha8Rng::seed_from_u64(4)).with_authored(&library);
        let request = SessionRequest::new(4, PitchClass::C).with_source(SessionSource::Authored);
        let session = generate_session(&mut generator, &request, &ProgressSnapshot::default(), NOW);

        assert_eq!(session.questions.len(), 1);
        assert_eq!(session.questions[0].prompt, "Find sol.");
        assert!(session.questions[0].authored);

        let mut plain = QuestionGenerator::new(&config, ChaCha8Rng::seed_from_u64(4));
        assert!(generate_session(&mut plain, &request, &ProgressSnapshot::default(), NOW)
            .questions
            .is_empty());
    }

    #[test]
    fn test_sing_quota() {
        let config = GeneratorConfig {
            modes: vec![ConceptMode::ChordQuality, ConceptMode::ScaleDegree],
            sing_quota: 2,
            ..GeneratorConfig::default()
        };
        let mut generator = QuestionGenerator::new(&config, ChaCha8Rng::seed_from_u64(5));
        let session = generate_session(
            &mut generator,
            &SessionRequest::new(12, PitchClass::C),
            &ProgressSnapshot::default(),
            NOW,
        );

        let singing: Vec<&TrainingQuestion> =
            session.questions.iter().filter(|q| q.requires_singing).collect();
        assert!(singing.len() <= 2);
        assert!(singing.iter().all(|q| q.mode.is_singable()));
        let singable = session.questions.iter().filter(|q| q.mode.is_singable()).count();
        assert_eq!(singing.len(), singable.min(2));
        if let Some(first) = session.questions.iter().position(|q| q.mode.is_singable()) {
            assert!(session.questions[first].requires_singing);
        }
    }

    #[test]
    fn test_source_names() {
        for source in [
            SessionSource::Fresh,
            SessionSource::Due,
            SessionSource::Weak,
            SessionSource::Authored,
        ] {
            assert_eq!(SessionSource::from_str(source.as_str()), Some(source));
        }
        assert_eq!(SessionSource::from_str("random"), None);
    }
}
