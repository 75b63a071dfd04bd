//! # Generator Module
//!
//! Builds one [`TrainingQuestion`] at a time from a [`GeneratorConfig`], the running tonic and
//! the learner's adaptive weights.
//!
//! ## Decision Order
//! 1. Rotate the tonic every `shift_tonic_every` questions
//! 2. Pick the concept mode (forced, or weighted by [`ConceptMode::sampling_weight`])
//!    and the tonal mode. A replayed [`ContextKey`] keeps its tonal family and interval hearing
//! 3. Pick the concept (forced key when it is a candidate, otherwise weighted by adaptive weight)
//! 4. Build playback, choices and teaching text for that concept
//! 5. Splice authored prompt/explanation text over the defaults
//!
//! Generation has no error path. An empty candidate pool falls back to `degree:1`.
//!
//! ## Example
//! ```rust
//! use eartrain::generator::{GenerationRequest, QuestionGenerator};
//! use eartrain::mastery::UniformWeights;
//! use eartrain::pitch::PitchClass;
//! use eartrain::GeneratorConfig;
//! use rand::SeedableRng;
//! use rand_chacha::ChaCha8Rng;
//!
//! let config = GeneratorConfig::default();
//! let mut generator = QuestionGenerator::new(&config, ChaCha8Rng::seed_from_u64(7));
//! let generated = generator.generate(&GenerationRequest::new(0, PitchClass::C), &UniformWeights);
//!
//! let question = generated.question;
//! assert!(question.choices.is_empty() || question.correct_choice().is_some());
//! ```

mod builders;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::authored::AuthoredContent;
use crate::concept::{ConceptKey, ConceptMode, ContextKey, HearingContext};
use crate::config::{GeneratorConfig, IntervalStyle, KeyMode};
use crate::mastery::AdaptiveWeights;
use crate::phrase::Contour;
use crate::pitch::PitchClass;
use crate::progression::{self, CadenceType};
use crate::question::TrainingQuestion;
use crate::theory::{ChordQuality, Degree, TonalFamily, TonalMode};
use crate::timing::{Meter, Subdivision};

pub use builders::diatonic_movements;

/// Inputs for one question.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// Position in the session, 0-based
    pub index: usize,
    /// Tonic of the previous question
    pub tonic: PitchClass,
    pub forced_mode: Option<ConceptMode>,
    /// Concept to replay, honoured when it is a candidate for the chosen mode
    pub forced_key: Option<ConceptKey>,
    /// Mastery bucket being replayed. Its tonal family and hearing carry into the question.
    pub forced_context: Option<ContextKey>,
}

impl GenerationRequest {
    pub fn new(index: usize, tonic: PitchClass) -> Self {
        Self {
            index,
            tonic,
            forced_mode: None,
            forced_key: None,
            forced_context: None,
        }
    }

    pub fn forced(mut self, mode: Option<ConceptMode>, key: Option<ConceptKey>) -> Self {
        self.forced_mode = mode;
        self.forced_key = key;
        self
    }

    /// Replay inside `context`, so the attempt lands back in the same bucket.
    pub fn in_context(mut self, context: ContextKey) -> Self {
        self.forced_context = Some(context);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedQuestion {
    pub question: TrainingQuestion,
    /// Tonic to carry into the next request
    pub tonic: PitchClass,
}

/// Index drawn with probability proportional to its weight. Non-finite or negative weights
/// count as zero; when every weight is zero the first index wins.
pub fn weighted_index<R: Rng + ?Sized>(weights: &[f64], rng: &mut R) -> Option<usize> {
    if weights.is_empty() {
        return None;
    }
    let clean = |w: f64| if w.is_finite() && w > 0.0 { w } else { 0.0 };
    let total: f64 = weights.iter().map(|w| clean(*w)).sum();
    if total <= 0.0 {
        return Some(0);
    }
    let target = rng.gen::<f64>() * total;
    let mut cumulative = 0.0;
    for (i, w) in weights.iter().enumerate() {
        cumulative += clean(*w);
        if target < cumulative {
            return Some(i);
        }
    }
    weights.iter().rposition(|w| clean(*w) > 0.0)
}

/// Forced key when it is one of the candidates, otherwise a weighted draw in candidate order.
pub fn select_concept<R, F>(
    candidates: &[ConceptKey],
    forced: Option<&ConceptKey>,
    weight: F,
    rng: &mut R,
) -> ConceptKey
where
    R: Rng + ?Sized,
    F: Fn(&ConceptKey) -> f64,
{
    if let Some(forced) = forced {
        if candidates.contains(forced) {
            return forced.clone();
        }
        tracing::debug!(key = %forced, "forced key is not a candidate, sampling instead");
    }
    let weights: Vec<f64> = candidates.iter().map(weight).collect();
    match weighted_index(&weights, rng) {
        Some(i) => candidates[i].clone(),
        None => {
            tracing::warn!("empty concept pool, falling back to degree:1");
            ConceptKey::fallback()
        }
    }
}

/// Degrees asked at a difficulty level.
pub fn degree_pool(level: u8, mode: TonalMode) -> Vec<Degree> {
    match level {
        0 | 1 => (1..=5).map(Degree::diatonic).collect(),
        2 => (1..=7).map(Degree::diatonic).collect(),
        _ => Contour::Chromatic.degree_pool(mode),
    }
}

pub fn chord_pool(level: u8) -> Vec<ChordQuality> {
    match level {
        0 | 1 => vec![ChordQuality::Major, ChordQuality::Minor],
        2 => ChordQuality::TRIADS.to_vec(),
        _ => ChordQuality::TRIADS
            .into_iter()
            .chain(ChordQuality::SEVENTHS)
            .collect(),
    }
}

/// Largest scale-step distance (either way round) between the degrees of an asked movement.
fn movement_span(level: u8) -> u8 {
    match level {
        0 | 1 => 2,
        2 => 3,
        _ => 6,
    }
}

/// Movements asked at a difficulty level.
pub fn movement_pool(level: u8) -> Vec<(Degree, Degree)> {
    let span = movement_span(level);
    diatonic_movements()
        .into_iter()
        .filter(|(from, to)| {
            let up = (to.step() + 7 - from.step()) % 7;
            up.min(7 - up) <= span
        })
        .collect()
}

/// Every concept the generator may ask about in `mode`.
pub fn candidate_pool(mode: ConceptMode, level: u8, tonal_mode: TonalMode) -> Vec<ConceptKey> {
    match mode {
        ConceptMode::ScaleDegree => degree_pool(level, tonal_mode)
            .into_iter()
            .map(ConceptKey::Degree)
            .collect(),
        ConceptMode::FunctionalInterval => movement_pool(level)
            .into_iter()
            .map(|(from, to)| ConceptKey::Movement { from, to })
            .collect(),
        ConceptMode::ChordQuality => chord_pool(level).into_iter().map(ConceptKey::Chord).collect(),
        ConceptMode::Progression => {
            let defs = progression::pool(tonal_mode.family(), level);
            let mut keys: Vec<ConceptKey> = defs
                .iter()
                .map(|def| ConceptKey::Progression(def.id.to_string()))
                .collect();
            for cadence in CadenceType::ALL {
                if defs.iter().any(|def| def.cadence == cadence) {
                    keys.push(ConceptKey::Cadence(cadence));
                }
            }
            keys
        }
        ConceptMode::Timing => {
            let mut keys: Vec<ConceptKey> = Meter::pool(level).into_iter().map(ConceptKey::Meter).collect();
            keys.extend(Subdivision::pool(level).into_iter().map(ConceptKey::Subdivision));
            keys.push(ConceptKey::Syncopation(true));
            keys.push(ConceptKey::Syncopation(false));
            keys.extend(Meter::pool(level).into_iter().map(ConceptKey::Rhythm));
            keys
        }
        ConceptMode::Phrase => Contour::pool(level).into_iter().map(ConceptKey::Phrase).collect(),
    }
}

/// The leading-tone resolution tested by predictive scale-degree questions.
pub fn resolution_key() -> ConceptKey {
    ConceptKey::Movement {
        from: Degree::diatonic(7),
        to: Degree::TONIC,
    }
}

/// Per-question facts shared by the builders.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Setting {
    pub index: usize,
    pub tonic: PitchClass,
    pub tonal_mode: TonalMode,
    pub level: u8,
    pub interval_style: IntervalStyle,
}

impl Setting {
    pub fn context(&self, mode: ConceptMode, hearing: HearingContext) -> ContextKey {
        let family = if mode == ConceptMode::Timing {
            TonalFamily::Mixed
        } else {
            self.tonal_mode.family()
        };
        ContextKey::new(mode, hearing, family)
    }
}

/// Question generator over a borrowed configuration.
pub struct QuestionGenerator<'a, R: Rng> {
    config: &'a GeneratorConfig,
    rng: R,
    authored: Option<&'a dyn AuthoredContent>,
}

impl<'a, R: Rng> QuestionGenerator<'a, R> {
    pub fn new(config: &'a GeneratorConfig, rng: R) -> Self {
        Self {
            config,
            rng,
            authored: None,
        }
    }

    pub fn with_authored(mut self, authored: &'a dyn AuthoredContent) -> Self {
        self.authored = Some(authored);
        self
    }

    pub fn config(&self) -> &GeneratorConfig {
        self.config
    }

    pub fn authored(&self) -> Option<&'a dyn AuthoredContent> {
        self.authored
    }

    /// Tonic for question `index`: a different tonic from the pool at every non-zero multiple
    /// of `shift_tonic_every`, otherwise unchanged. `Some(0)` never rotates.
    pub fn rotate_tonic(&mut self, index: usize, tonic: PitchClass) -> PitchClass {
        match self.config.shift_tonic_every {
            Some(every) if every > 0 && index > 0 && index % every == 0 => {
                let options: Vec<PitchClass> = self
                    .config
                    .tonic_pool
                    .iter()
                    .copied()
                    .filter(|candidate| *candidate != tonic)
                    .collect();
                let next = options.choose(&mut self.rng).copied().unwrap_or(tonic);
                tracing::debug!(index, from = %tonic, to = %next, "rotating tonic");
                next
            }
            _ => tonic,
        }
    }

    fn pick_mode(&mut self) -> ConceptMode {
        let weights: Vec<f64> = self.config.modes.iter().map(|m| m.sampling_weight()).collect();
        weighted_index(&weights, &mut self.rng)
            .map(|i| self.config.modes[i])
            .unwrap_or(ConceptMode::ScaleDegree)
    }

    /// Configured tonal mode, swapped for one of `family` when a replay needs it.
    fn pick_tonal_mode(&mut self, family: Option<TonalFamily>) -> TonalMode {
        let mode = match self.config.key_mode {
            KeyMode::Fixed(mode) => mode,
            KeyMode::Mixed => *KeyMode::MIXED_POOL
                .choose(&mut self.rng)
                .unwrap_or(&TonalMode::Major),
        };
        match family {
            Some(family) if family != TonalFamily::Mixed && mode.family() != family => {
                let options: Vec<TonalMode> = KeyMode::MIXED_POOL
                    .iter()
                    .copied()
                    .filter(|candidate| candidate.family() == family)
                    .collect();
                options.choose(&mut self.rng).copied().unwrap_or(mode)
            }
            _ => mode,
        }
    }

    /// Configured interval style, swapped when a replay was heard the other way.
    fn interval_style(&self, hearing: Option<HearingContext>) -> IntervalStyle {
        let style = self.config.styles.interval;
        match hearing {
            Some(HearingContext::Harmonic) if style != IntervalStyle::Stacked => IntervalStyle::Stacked,
            Some(HearingContext::Melodic) if style == IntervalStyle::Stacked => IntervalStyle::Immediate,
            _ => style,
        }
    }

    fn hearing_for(&self, setting: &Setting, mode: ConceptMode) -> HearingContext {
        match mode {
            ConceptMode::FunctionalInterval if setting.interval_style == IntervalStyle::Stacked => {
                HearingContext::Harmonic
            }
            ConceptMode::ChordQuality | ConceptMode::Progression => HearingContext::Harmonic,
            _ => HearingContext::Melodic,
        }
    }

    /// Build one question.
    pub fn generate(&mut self, request: &GenerationRequest, weights: &dyn AdaptiveWeights) -> GeneratedQuestion {
        let tonic = self.rotate_tonic(request.index, request.tonic);
        let mode = match (request.forced_mode, &request.forced_key) {
            (Some(mode), _) => mode,
            (None, Some(key)) => key.mode(),
            (None, None) => self.pick_mode(),
        };
        let replay = request.forced_context.filter(|context| context.mode == mode);
        let interval_style = match mode {
            ConceptMode::FunctionalInterval => self.interval_style(replay.map(|c| c.hearing)),
            _ => self.config.styles.interval,
        };
        let setting = Setting {
            index: request.index,
            tonic,
            tonal_mode: self.pick_tonal_mode(replay.map(|c| c.family)),
            level: self.config.level(mode),
            interval_style,
        };
        let context = setting.context(mode, self.hearing_for(&setting, mode));
        let forced = request.forced_key.as_ref();

        let mut question = if mode == ConceptMode::ScaleDegree && self.wants_resolution(forced) {
            self.build_resolution(&setting)
        } else {
            let candidates = candidate_pool(mode, setting.level, setting.tonal_mode);
            let key = select_concept(
                &candidates,
                forced,
                |key| weights.weight_for(key, &context),
                &mut self.rng,
            );
            self.build(&setting, mode, key)
        };

        if let Some(authored) = self.authored.and_then(|a| a.find(question.mode, &question.focus_key)) {
            if let Some(prompt) = &authored.prompt {
                question.prompt = prompt.clone();
            }
            if let Some(explanation) = &authored.explanation {
                question.explanation = explanation.clone();
            }
            question.authored = true;
        }

        tracing::debug!(
            index = request.index,
            mode = %question.mode,
            key = %question.focus_key,
            tonic = %tonic,
            "generated question"
        );
        GeneratedQuestion { question, tonic }
    }

    fn wants_resolution(&mut self, forced: Option<&ConceptKey>) -> bool {
        match forced {
            Some(key) => *key == resolution_key(),
            None => {
                let chance = self.config.predictive_resolution_chance;
                chance > 0.0 && self.rng.gen_bool(chance.min(1.0))
            }
        }
    }

    fn build(&mut self, setting: &Setting, mode: ConceptMode, key: ConceptKey) -> TrainingQuestion {
        match (mode, key) {
            (ConceptMode::ScaleDegree, ConceptKey::Degree(degree)) => self.build_degree(setting, degree),
            (ConceptMode::FunctionalInterval, ConceptKey::Movement { from, to }) => {
                self.build_interval(setting, from, to)
            }
            (ConceptMode::ChordQuality, ConceptKey::Chord(quality)) => self.build_chord(setting, quality),
            (ConceptMode::Progression, key @ (ConceptKey::Progression(_) | ConceptKey::Cadence(_))) => {
                self.build_progression(setting, key)
            }
            (ConceptMode::Timing, key) if key.mode() == ConceptMode::Timing => self.build_timing(setting, key),
            (ConceptMode::Phrase, ConceptKey::Phrase(contour)) => self.build_phrase(setting, contour),
            (mode, key) => {
                tracing::warn!(%mode, %key, "concept does not fit the mode, asking degree 1");
                self.build_degree(setting, Degree::TONIC)
            }
        }
    }
}
