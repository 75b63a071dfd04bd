pub mod authored;
pub mod concept;
pub mod config;
pub mod error;
pub mod generator;
pub mod mastery;
pub mod phrase;
pub mod pitch;
pub mod playback;
pub mod progression;
pub mod question;
pub mod session;
pub mod sung;
pub mod theory;
pub mod timing;

pub use authored::{AuthoredContent, AuthoredLibrary, AuthoredOverride};
pub use concept::{ConceptKey, ConceptMode, ContextKey, HearingContext};
pub use config::GeneratorConfig;
pub use error::*;
pub use generator::{GeneratedQuestion, GenerationRequest, QuestionGenerator};
pub use mastery::{AdaptiveStore, AttemptRecord, MemoryStore, ReviewFilter, ReviewStrategy};
pub use question::{Assessment, Response, TrainingQuestion};
pub use session::{generate_session, Session, SessionRequest, SessionSource};

use rand::Rng;

use mastery::{Clock, KeyValueStore};
use pitch::PitchClass;

/// Generate one question for the learner behind `store`.
/// This is the main entry point for a single-question UI.
pub fn next_question<R: Rng, S: KeyValueStore, C: Clock>(
    generator: &mut QuestionGenerator<'_, R>,
    store: &AdaptiveStore<S, C>,
    index: usize,
    tonic: PitchClass,
) -> GeneratedQuestion {
    let progress = store.snapshot();
    let weights = progress.weights_at(store.now_ms());
    generator.generate(&GenerationRequest::new(index, tonic), &weights)
}
