//! Training questions and response scoring.
//!
//! A [`TrainingQuestion`] is built once by the generator, shown and played once, scored once
//! and dropped. Only the [`AttemptRecord`] produced from the learner's response outlives it.

use serde::{Deserialize, Serialize};

use crate::concept::{ConceptKey, ConceptMode, ContextKey};
use crate::mastery::AttemptRecord;
use crate::phrase::Contour;
use crate::pitch::PitchClass;
use crate::playback::{PlaybackPlan, PlaybackSink, VoiceSettings};
use crate::progression::{CadenceType, ResolvedChord};
use crate::sung::{self, PitchSample, SungCriteria, SungVerdict};
use crate::theory::{ChordQuality, Degree, Stability, TonalMode};
use crate::timing::{self, Meter, Subdivision, TapScore};

/// One selectable answer. `value` is what gets compared, `label` is what gets shown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnswerChoice {
    pub value: String,
    pub label: String,
}

impl AnswerChoice {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn of(delta: i8) -> Self {
        if delta >= 0 {
            Direction::Up
        } else {
            Direction::Down
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }
}

/// What a timing question asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimingShape {
    Meter,
    Subdivision,
    Syncopation,
    Tap,
}

/// Mode-specific facts about a question, for feedback screens.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum QuestionDetail {
    ScaleDegree {
        degree: Degree,
        stability: Stability,
        solfege: String,
        semitones: u8,
    },
    Interval {
        from: Degree,
        to: Degree,
        /// Signed nearest-motion distance
        semitones: i8,
        direction: Direction,
        interval_name: String,
        /// Leading-tone resolution asked from a scale-degree question
        predictive: bool,
    },
    Chord {
        quality: ChordQuality,
        midi_notes: Vec<u8>,
    },
    Progression {
        progression_id: String,
        cadence: CadenceType,
        chords: Vec<ResolvedChord>,
        changed_index: Option<usize>,
    },
    Timing {
        shape: TimingShape,
        meter: Meter,
        subdivision: Subdivision,
        bars: usize,
        /// Target onsets in beats from the start of the pattern
        onsets: Vec<f64>,
        /// Beats of count-in before the pattern starts in the plan
        count_in_beats: f64,
        syncopated: bool,
        notation: String,
        tolerance_beats: f64,
    },
    Phrase {
        contour: Contour,
        degrees: Vec<Degree>,
    },
}

/// Hint for the UI to draw alongside feedback
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum VisualCue {
    HighlightDegree { degree: Degree },
    KeyboardNotes { midi_notes: Vec<u8> },
    Arrow { direction: Direction },
    BeatGrid { slots: usize, onsets: Vec<usize> },
}

/// A fully built question.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingQuestion {
    pub id: String,
    pub mode: ConceptMode,
    pub tonic: PitchClass,
    pub tonal_mode: TonalMode,
    pub context: ContextKey,
    pub prompt: String,
    pub plan: PlaybackPlan,
    /// Empty for tap questions
    pub choices: Vec<AnswerChoice>,
    pub correct_answer: String,
    pub focus_key: ConceptKey,
    pub explanation: String,
    pub comparison: Option<PlaybackPlan>,
    pub requires_singing: bool,
    /// Prompt or explanation came from authored content
    pub authored: bool,
    /// Pitch to sing back, when the question is singable
    pub sing_target_midi: Option<u8>,
    pub detail: QuestionDetail,
    pub visual_cues: Vec<VisualCue>,
}

/// What the learner did.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Response {
    /// Value of the picked [`AnswerChoice`]
    Choice(String),
    /// Free text, matched loosely against the correct value and label
    Typed(String),
    /// Tapped onsets in beats from the start of the pattern
    Tapped(Vec<f64>),
    Sung(Vec<PitchSample>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    pub correct: bool,
    pub expected: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub taps: Option<TapScore>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sung: Option<SungVerdict>,
}

/// Lower-case, collapse whitespace, and spell arrows as `->`.
pub fn normalize_answer(raw: &str) -> String {
    let lowered = raw
        .trim()
        .to_lowercase()
        .replace(['→', '⟶'], "->")
        .replace("=>", "->");
    let collapsed: Vec<&str> = lowered.split_whitespace().collect();
    collapsed.join(" ").replace(" ->", "->").replace("-> ", "->")
}

impl TrainingQuestion {
    pub fn correct_choice(&self) -> Option<&AnswerChoice> {
        self.choices.iter().find(|c| c.value == self.correct_answer)
    }

    pub fn tolerance_beats(&self) -> Option<f64> {
        match &self.detail {
            QuestionDetail::Timing { tolerance_beats, .. } => Some(*tolerance_beats),
            _ => None,
        }
    }

    /// Score one response with default sung-note criteria.
    pub fn assess(&self, response: &Response) -> Assessment {
        self.assess_with(response, &SungCriteria::default())
    }

    pub fn assess_with(&self, response: &Response, criteria: &SungCriteria) -> Assessment {
        let mut assessment = Assessment {
            correct: false,
            expected: self.correct_answer.clone(),
            taps: None,
            sung: None,
        };

        match response {
            Response::Choice(value) => {
                assessment.correct = *value == self.correct_answer;
            }
            Response::Typed(text) => {
                let given = normalize_answer(text);
                let label = self.correct_choice().map(|c| normalize_answer(&c.label));
                assessment.correct = given == normalize_answer(&self.correct_answer)
                    || label.is_some_and(|label| label == given);
            }
            Response::Tapped(taps) => {
                if let QuestionDetail::Timing {
                    shape: TimingShape::Tap,
                    onsets,
                    tolerance_beats,
                    ..
                } = &self.detail
                {
                    let score = timing::score_taps(onsets, taps, *tolerance_beats, self.plan.tempo as f64);
                    assessment.correct = score.passed;
                    assessment.taps = Some(score);
                } else {
                    tracing::warn!(id = %self.id, "tapped response to a question that is not a tap question");
                }
            }
            Response::Sung(samples) => match self.sing_target_midi {
                Some(target) => {
                    let verdict = sung::evaluate(samples, target, criteria);
                    assessment.correct = verdict.matched;
                    assessment.sung = Some(verdict);
                }
                None => {
                    tracing::warn!(id = %self.id, "sung response to a question with no sing target");
                }
            },
        }
        assessment
    }

    /// The attempt to record for this question's focus concept.
    pub fn attempt(&self, correct: bool, response_ms: Option<u64>) -> AttemptRecord {
        AttemptRecord {
            concept_keys: vec![self.focus_key.clone()],
            context: self.context,
            correct,
            response_ms,
        }
    }
}

/// Sound a question: tonic drone first when the plan wants one, then the question, then the
/// comparison example.
pub fn perform<S: PlaybackSink + ?Sized>(question: &TrainingQuestion, sink: &mut S, voice: &VoiceSettings) {
    if let Some(drone) = &question.plan.drone {
        sink.schedule_drone(drone.midi_note, drone);
    }
    sink.play(&question.plan, voice);
    if let Some(comparison) = &question.comparison {
        sink.play(comparison, voice);
    }
}
