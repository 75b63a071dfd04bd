//! Per-mode question construction.

use std::collections::BTreeSet;

use rand::seq::SliceRandom;
use rand::Rng;

use super::{chord_pool, degree_pool, movement_pool, resolution_key, QuestionGenerator, Setting};
use crate::concept::{ConceptKey, ConceptMode, HearingContext};
use crate::config::{DegreeStyle, HarmonyStyle, IntervalStyle};
use crate::phrase::{self, format_degrees, Contour};
use crate::pitch::PitchClass;
use crate::playback::{DroneConfig, PlaybackPlan};
use crate::progression::{self, ProgressionDef, ResolvedChord};
use crate::question::{AnswerChoice, Direction, QuestionDetail, TimingShape, TrainingQuestion, VisualCue};
use crate::theory::{
    degree_semitone, diatonic_triad, interval_name, nearest_motion, solfege, stability, ChordQuality,
    Degree, Stability, TonalFamily, TonalMode,
};
use crate::timing::{self, Meter, RhythmGrid, RhythmPattern, Subdivision};

/// Beats taken by the I-IV-V-I lead-in, including the rest after it.
const LEAD_IN_BEATS: f64 = 5.0;
const DRONE_GAIN: f32 = 0.35;
/// Chance that a progression question at level 2+ asks which chord changed.
const CHANGED_CHORD_CHANCE: f64 = 0.3;

/// Every ordered pair of distinct diatonic degrees.
pub fn diatonic_movements() -> Vec<(Degree, Degree)> {
    let mut movements = Vec::with_capacity(42);
    for from in 1..=7 {
        for to in 1..=7 {
            if from != to {
                movements.push((Degree::diatonic(from), Degree::diatonic(to)));
            }
        }
    }
    movements
}

fn degree_midi(tonic: PitchClass, degree: Degree, mode: TonalMode) -> u8 {
    tonic.tonic_midi() + degree_semitone(degree, mode)
}

fn offset_midi(midi: u8, delta: i8) -> u8 {
    (midi as i16 + delta as i16).clamp(0, 127) as u8
}

fn tonic_triad(tonic: PitchClass, mode: TonalMode) -> Vec<u8> {
    progression::voice_chord(tonic, 0, diatonic_triad(Degree::TONIC, mode))
}

/// I-IV-V-I in `mode`, one beat per chord. The dominant is always major.
fn add_lead_in(plan: &mut PlaybackPlan, tonic: PitchClass, mode: TonalMode) {
    for (beat, step) in [1u8, 4, 5, 1].into_iter().enumerate() {
        let degree = Degree::diatonic(step);
        let quality = if step == 5 {
            ChordQuality::Major
        } else {
            diatonic_triad(degree, mode)
        };
        let notes = progression::voice_chord(tonic, degree_semitone(degree, mode), quality);
        plan.chord(notes, beat as f64, 1.0);
    }
}

fn add_chord(plan: &mut PlaybackPlan, notes: &[u8], start: f64, beats: f64, style: HarmonyStyle) {
    match style {
        HarmonyStyle::Block => {
            plan.chord(notes.to_vec(), start, beats);
        }
        HarmonyStyle::Arpeggiated => {
            let step = beats / notes.len().max(1) as f64;
            for (i, note) in notes.iter().enumerate() {
                plan.note(*note, start + i as f64 * step, step);
            }
        }
    }
}

/// Correct choice plus up to `wanted` distractors from `pool`, shuffled.
fn shuffled_choices<T, R, F>(correct: &T, pool: &[T], wanted: usize, rng: &mut R, choice: F) -> Vec<AnswerChoice>
where
    T: Clone + PartialEq,
    R: Rng + ?Sized,
    F: Fn(&T) -> AnswerChoice,
{
    let mut others: Vec<&T> = pool.iter().filter(|item| *item != correct).collect();
    others.shuffle(rng);
    let mut choices: Vec<AnswerChoice> = std::iter::once(correct)
        .chain(others.into_iter().take(wanted))
        .map(choice)
        .collect();
    choices.shuffle(rng);
    choices
}

fn degree_choice(degree: Degree, mode: TonalMode) -> AnswerChoice {
    AnswerChoice::new(degree.to_string(), format!("{} ({})", degree, solfege(degree, mode)))
}

fn movement_choice(from: Degree, to: Degree) -> AnswerChoice {
    AnswerChoice::new(format!("{}->{}", from, to), format!("{} → {}", from, to))
}

fn stability_text(stability: Stability) -> &'static str {
    match stability {
        Stability::Stable => "rests comfortably on the tonic chord",
        Stability::ModeratelyUnstable => "leans toward a neighbouring stable degree",
        Stability::StrongTendency => "pulls hard toward resolution",
    }
}

fn key_name(setting: &Setting) -> String {
    format!("{} {}", setting.tonic, setting.tonal_mode.label())
}

/// Movements from `pool` closest to the correct one: same starting degree first, then
/// nearest size.
fn ranked_movements<R: Rng + ?Sized>(
    from: Degree,
    to: Degree,
    mode: TonalMode,
    upward: bool,
    pool: &[(Degree, Degree)],
    rng: &mut R,
) -> Vec<(Degree, Degree)> {
    let size = nearest_motion(from, to, mode).abs();
    let mut candidates: Vec<(Degree, Degree)> = pool
        .iter()
        .copied()
        .filter(|(f, t)| (*f, *t) != (from, to) && (nearest_motion(*f, *t, mode) > 0) == upward)
        .collect();
    candidates.shuffle(rng);
    candidates.sort_by_key(|(f, t)| (*f != from, (nearest_motion(*f, *t, mode).abs() - size).abs()));
    candidates
}

fn neighbour_quality(quality: ChordQuality) -> ChordQuality {
    match quality {
        ChordQuality::Major => ChordQuality::Minor,
        ChordQuality::Minor => ChordQuality::Major,
        ChordQuality::Diminished => ChordQuality::Minor,
        ChordQuality::Augmented => ChordQuality::Major,
        ChordQuality::Dominant7 => ChordQuality::Major7,
        ChordQuality::Major7 => ChordQuality::Dominant7,
        ChordQuality::Minor7 => ChordQuality::Dominant7,
    }
}

fn numerals_label(numerals: &[&str]) -> String {
    numerals.join(" → ")
}

/// Tonal mode a progression is played in: the session's mode when the families agree,
/// otherwise the plain major or harmonic minor scale.
fn mode_for_progression(def: &ProgressionDef, mode: TonalMode) -> TonalMode {
    if def.family == mode.family() {
        mode
    } else if def.family == TonalFamily::Major {
        TonalMode::Major
    } else {
        TonalMode::HarmonicMinor
    }
}

fn add_progression(plan: &mut PlaybackPlan, chords: &[ResolvedChord], start: f64, style: HarmonyStyle) -> f64 {
    let mut beat = start;
    for chord in chords {
        add_chord(plan, &chord.midi_notes, beat, 2.0, style);
        beat += 2.0;
    }
    beat
}

fn add_pattern(plan: &mut PlaybackPlan, pattern: &RhythmPattern, start: f64, midi: u8) {
    let beats = pattern.target_beats();
    let end = pattern.grid.total_beats() as f64;
    for (i, onset) in beats.iter().enumerate() {
        let next = beats.get(i + 1).copied().unwrap_or(end);
        plan.note(midi, start + onset, (next - onset).max(0.1));
    }
}

fn add_pulse(plan: &mut PlaybackPlan, beats: usize, per_bar: usize, start: f64) {
    for beat in 0..beats {
        plan.click(start + beat as f64, beat % per_bar.max(1) == 0);
    }
}

impl<'a, R: Rng> QuestionGenerator<'a, R> {
    /// Wrong choices offered beside the correct one. At least one, whatever the config says.
    fn distractor_count(&self) -> usize {
        self.config.choice_count.max(2) - 1
    }

    fn question_id(setting: &Setting, key: &ConceptKey) -> String {
        format!("q{}-{}", setting.index + 1, key)
    }

    pub(super) fn build_degree(&mut self, setting: &Setting, degree: Degree) -> TrainingQuestion {
        let mode = setting.tonal_mode;
        let tonic_midi = setting.tonic.tonic_midi();
        let target = degree_midi(setting.tonic, degree, mode);
        let style = self.config.styles.degree;

        let mut plan = PlaybackPlan::new(self.config.tempo);
        let prompt = match style {
            DegreeStyle::CadenceThenTone => {
                add_lead_in(&mut plan, setting.tonic, mode);
                plan.note(target, LEAD_IN_BEATS, 2.0);
                "Which scale degree follows the cadence?"
            }
            DegreeStyle::Drone => {
                plan.drone = Some(DroneConfig {
                    midi_note: tonic_midi - 12,
                    gain: DRONE_GAIN,
                    with_fifth: true,
                });
                plan.note(target, 0.0, 3.0);
                "Which scale degree sounds over the drone?"
            }
            DegreeStyle::Bare => {
                plan.note(tonic_midi, 0.0, 1.0).note(target, 2.0, 2.0);
                "The tonic sounds first. Which scale degree follows?"
            }
        };

        let pool = degree_pool(setting.level, mode);
        let choices = shuffled_choices(
            &degree,
            &pool,
            self.distractor_count(),
            &mut self.rng,
            |d| degree_choice(*d, mode),
        );

        let neighbour = if degree.step() == 7 {
            Degree::diatonic(6)
        } else {
            degree.step_above(1)
        };
        let mut comparison = PlaybackPlan::new(self.config.tempo);
        comparison
            .note(tonic_midi, 0.0, 1.0)
            .note(degree_midi(setting.tonic, neighbour, mode), 2.0, 2.0);

        let semitones = degree_semitone(degree, mode);
        let class = stability(degree);
        let syllable = solfege(degree, mode);
        let distance = if semitones == 0 {
            "the tonic itself".to_string()
        } else {
            format!("a {} above the tonic", interval_name(semitones))
        };
        let key = ConceptKey::Degree(degree);

        TrainingQuestion {
            id: Self::question_id(setting, &key),
            mode: ConceptMode::ScaleDegree,
            tonic: setting.tonic,
            tonal_mode: mode,
            context: setting.context(ConceptMode::ScaleDegree, HearingContext::Melodic),
            prompt: format!("In {}: {}", key_name(setting), prompt),
            plan,
            choices,
            correct_answer: degree.to_string(),
            focus_key: key,
            explanation: format!(
                "Degree {} ({}) is {} and {}. Compare it with degree {}.",
                degree,
                syllable,
                distance,
                stability_text(class),
                neighbour
            ),
            comparison: Some(comparison),
            requires_singing: false,
            authored: false,
            sing_target_midi: Some(target),
            detail: QuestionDetail::ScaleDegree {
                degree,
                stability: class,
                solfege: syllable.to_string(),
                semitones,
            },
            visual_cues: vec![
                VisualCue::HighlightDegree { degree },
                VisualCue::KeyboardNotes { midi_notes: vec![target] },
            ],
        }
    }

    /// Scale-degree question that stops on the leading tone and asks where it resolves.
    pub(super) fn build_resolution(&mut self, setting: &Setting) -> TrainingQuestion {
        let mode = setting.tonal_mode;
        let leading = Degree::diatonic(7);
        let from_midi = degree_midi(setting.tonic, leading, mode);
        let delta = nearest_motion(leading, Degree::TONIC, mode);
        let to_midi = offset_midi(from_midi, delta);

        let mut plan = PlaybackPlan::new(self.config.tempo);
        add_lead_in(&mut plan, setting.tonic, mode);
        plan.note(from_midi, LEAD_IN_BEATS, 2.0);

        let mut comparison = PlaybackPlan::new(self.config.tempo);
        comparison.note(from_midi, 0.0, 1.0).note(to_midi, 1.0, 2.0);

        let targets: Vec<Degree> = [1, 2, 3, 5, 6].into_iter().map(Degree::diatonic).collect();
        let choices = shuffled_choices(
            &Degree::TONIC,
            &targets,
            self.distractor_count(),
            &mut self.rng,
            |d| degree_choice(*d, mode),
        );

        let key = resolution_key();
        TrainingQuestion {
            id: Self::question_id(setting, &key),
            mode: ConceptMode::ScaleDegree,
            tonic: setting.tonic,
            tonal_mode: mode,
            context: setting.context(ConceptMode::ScaleDegree, HearingContext::Melodic),
            prompt: format!(
                "In {}: the melody stops on degree 7. Which degree does it want to resolve to?",
                key_name(setting)
            ),
            plan,
            choices,
            correct_answer: Degree::TONIC.to_string(),
            focus_key: key,
            explanation: format!(
                "Degree 7 ({}) sits a {} from the tonic and resolves {} to 1 (do).",
                solfege(leading, mode),
                interval_name(delta.unsigned_abs()),
                Direction::of(delta).as_str()
            ),
            comparison: Some(comparison),
            requires_singing: false,
            authored: false,
            sing_target_midi: Some(to_midi),
            detail: QuestionDetail::Interval {
                from: leading,
                to: Degree::TONIC,
                semitones: delta,
                direction: Direction::of(delta),
                interval_name: interval_name(delta.unsigned_abs()),
                predictive: true,
            },
            visual_cues: vec![
                VisualCue::HighlightDegree { degree: leading },
                VisualCue::Arrow {
                    direction: Direction::of(delta),
                },
            ],
        }
    }

    pub(super) fn build_interval(&mut self, setting: &Setting, from: Degree, to: Degree) -> TrainingQuestion {
        let mode = setting.tonal_mode;
        let delta = nearest_motion(from, to, mode);
        let direction = Direction::of(delta);
        let from_midi = degree_midi(setting.tonic, from, mode);
        let to_midi = offset_midi(from_midi, delta);
        let style = setting.interval_style;

        let mut plan = PlaybackPlan::new(self.config.tempo);
        match style {
            IntervalStyle::Stacked => {
                let mut notes = vec![from_midi, to_midi];
                notes.sort_unstable();
                plan.chord(notes, 0.0, 2.0);
            }
            IntervalStyle::Immediate => {
                plan.note(from_midi, 0.0, 1.0).note(to_midi, 1.0, 1.5);
            }
            IntervalStyle::Paused => {
                plan.note(from_midi, 0.0, 1.0).note(to_midi, 2.0, 1.5);
            }
            IntervalStyle::ScaleContext => {
                plan.chord(tonic_triad(setting.tonic, mode), 0.0, 1.5);
                plan.note(from_midi, 2.0, 1.0).note(to_midi, 3.0, 1.5);
            }
        }

        let upward = delta > 0;
        let level_pool = movement_pool(setting.level);
        let mut same = ranked_movements(from, to, mode, upward, &level_pool, &mut self.rng);
        let mut opposite = ranked_movements(from, to, mode, !upward, &level_pool, &mut self.rng);
        // too few neighbours at this level
        if same.is_empty() || opposite.len() < 2 {
            let all = diatonic_movements();
            same = ranked_movements(from, to, mode, upward, &all, &mut self.rng);
            opposite = ranked_movements(from, to, mode, !upward, &all, &mut self.rng);
        }
        let mut movements = vec![(from, to)];
        movements.extend(same.iter().take(1).copied());
        movements.extend(opposite.iter().take(2).copied());
        movements.shuffle(&mut self.rng);
        let choices: Vec<AnswerChoice> = movements.iter().map(|(f, t)| movement_choice(*f, *t)).collect();

        let comparison = same.first().map(|(f, t)| {
            let start = degree_midi(setting.tonic, *f, mode);
            let end = offset_midi(start, nearest_motion(*f, *t, mode));
            let mut plan = PlaybackPlan::new(self.config.tempo);
            plan.note(start, 0.0, 1.0).note(end, 1.0, 1.5);
            plan
        });

        let mut explanation = format!(
            "{} → {} moves {} a {} ({} to {}).",
            from,
            to,
            direction.as_str(),
            interval_name(delta.unsigned_abs()),
            solfege(from, mode),
            solfege(to, mode)
        );
        if from.step() == 7 && to == Degree::TONIC {
            explanation.push_str(" The leading tone resolves home.");
        }

        let hearing = if style == IntervalStyle::Stacked {
            HearingContext::Harmonic
        } else {
            HearingContext::Melodic
        };
        let prompt = if style == IntervalStyle::Stacked {
            "Which degree movement do the two notes form?"
        } else {
            "Which degree movement did you hear?"
        };
        let key = ConceptKey::Movement { from, to };

        TrainingQuestion {
            id: Self::question_id(setting, &key),
            mode: ConceptMode::FunctionalInterval,
            tonic: setting.tonic,
            tonal_mode: mode,
            context: setting.context(ConceptMode::FunctionalInterval, hearing),
            prompt: format!("In {}: {}", key_name(setting), prompt),
            plan,
            choices,
            correct_answer: format!("{}->{}", from, to),
            focus_key: key,
            explanation,
            comparison,
            requires_singing: false,
            authored: false,
            sing_target_midi: Some(to_midi),
            detail: QuestionDetail::Interval {
                from,
                to,
                semitones: delta,
                direction,
                interval_name: interval_name(delta.unsigned_abs()),
                predictive: false,
            },
            visual_cues: vec![
                VisualCue::Arrow { direction },
                VisualCue::KeyboardNotes {
                    midi_notes: vec![from_midi, to_midi],
                },
            ],
        }
    }

    pub(super) fn build_chord(&mut self, setting: &Setting, quality: ChordQuality) -> TrainingQuestion {
        let root_offset = self.rng.gen_range(0..12u8);
        let notes = progression::voice_chord(setting.tonic, root_offset, quality);
        let style = self.config.styles.harmony;

        let mut plan = PlaybackPlan::new(self.config.tempo);
        add_chord(&mut plan, &notes, 0.0, 2.0, style);
        if style == HarmonyStyle::Arpeggiated {
            plan.chord(notes.clone(), 2.0, 2.0);
        }

        let neighbour = neighbour_quality(quality);
        let mut comparison = PlaybackPlan::new(self.config.tempo);
        add_chord(
            &mut comparison,
            &progression::voice_chord(setting.tonic, root_offset, neighbour),
            0.0,
            2.0,
            style,
        );

        let pool = chord_pool(setting.level);
        let choices = shuffled_choices(
            &quality,
            &pool,
            self.distractor_count(),
            &mut self.rng,
            |q| AnswerChoice::new(q.as_str(), q.label()),
        );

        let stack: Vec<String> = quality.intervals()[1..]
            .iter()
            .map(|semitones| interval_name(*semitones))
            .collect();
        let key = ConceptKey::Chord(quality);

        TrainingQuestion {
            id: Self::question_id(setting, &key),
            mode: ConceptMode::ChordQuality,
            tonic: setting.tonic,
            tonal_mode: setting.tonal_mode,
            context: setting.context(ConceptMode::ChordQuality, HearingContext::Harmonic),
            prompt: "What is the quality of this chord?".to_string(),
            plan,
            choices,
            correct_answer: quality.as_str().to_string(),
            focus_key: key,
            explanation: format!(
                "A {} chord stacks a {} above its root. Compare it with {}.",
                quality.label().to_lowercase(),
                stack.join(", a "),
                neighbour.label().to_lowercase()
            ),
            comparison: Some(comparison),
            requires_singing: false,
            authored: false,
            sing_target_midi: None,
            detail: QuestionDetail::Chord {
                quality,
                midi_notes: notes.clone(),
            },
            visual_cues: vec![VisualCue::KeyboardNotes { midi_notes: notes }],
        }
    }

    pub(super) fn build_progression(&mut self, setting: &Setting, key: ConceptKey) -> TrainingQuestion {
        let pool = progression::pool(setting.tonal_mode.family(), setting.level);
        let def: &'static ProgressionDef = match &key {
            ConceptKey::Progression(id) => progression::find(id),
            ConceptKey::Cadence(cadence) => {
                let matching: Vec<&'static ProgressionDef> =
                    pool.iter().copied().filter(|def| def.cadence == *cadence).collect();
                matching.choose(&mut self.rng).copied().or_else(|| {
                    progression::LIBRARY
                        .iter()
                        .find(|def| def.cadence == *cadence && def.stage <= setting.level)
                })
            }
            _ => None,
        }
        .or_else(|| pool.first().copied())
        .unwrap_or(&progression::LIBRARY[0]);

        let mode = mode_for_progression(def, setting.tonal_mode);
        let setting = Setting {
            tonal_mode: mode,
            ..*setting
        };
        let style = self.config.styles.harmony;
        let wanted = self.distractor_count();
        let family_pool = progression::pool(mode.family(), setting.level);

        let changed = matches!(key, ConceptKey::Progression(_))
            && setting.level >= 2
            && def.numerals.len() >= 3
            && self.rng.gen_bool(CHANGED_CHORD_CHANCE);

        let mut plan = PlaybackPlan::new(self.config.tempo);
        let (prompt, choices, correct_answer, explanation, comparison, chords, changed_index) = if changed {
            let variant = progression::changed_variant(def, setting.tonic, mode, &mut self.rng);
            let end = add_progression(&mut plan, &variant.original, 0.0, style);
            add_progression(&mut plan, &variant.changed, end + 2.0, style);
            let choices: Vec<AnswerChoice> = (2..=variant.original.len())
                .map(|n| AnswerChoice::new(n.to_string(), format!("Chord {}", n)))
                .collect();
            let index = variant.changed_index;
            (
                "The progression plays twice. Which chord changed the second time?",
                choices,
                (index + 1).to_string(),
                format!(
                    "Chord {} changed from {} to {}.",
                    index + 1,
                    variant.original[index].numeral,
                    variant.changed[index].numeral
                ),
                None,
                variant.changed,
                Some(index),
            )
        } else {
            let chords = progression::resolve(def, setting.tonic, mode);
            add_progression(&mut plan, &chords, 0.0, style);
            let explanation = format!(
                "{}: {}. It closes with a {} cadence, {}.",
                def.id,
                numerals_label(def.numerals),
                def.cadence.as_str(),
                def.cadence.description()
            );
            match &key {
                ConceptKey::Cadence(_) => {
                    let choices = shuffled_choices(
                        &def.cadence,
                        &progression::CadenceType::ALL,
                        wanted,
                        &mut self.rng,
                        |c| AnswerChoice::new(c.as_str(), format!("{} cadence", c.as_str())),
                    );
                    (
                        "Which cadence closes the progression?",
                        choices,
                        def.cadence.as_str().to_string(),
                        explanation,
                        None,
                        chords,
                        None,
                    )
                }
                _ => {
                    let choices = shuffled_choices(&def, &family_pool, wanted, &mut self.rng, |d| {
                        AnswerChoice::new(d.id, numerals_label(d.numerals))
                    });
                    let neighbour = family_pool
                        .iter()
                        .find(|other| other.id != def.id && other.numerals.len() == def.numerals.len());
                    let comparison = neighbour.map(|other| {
                        let mut plan = PlaybackPlan::new(self.config.tempo);
                        add_progression(&mut plan, &progression::resolve(other, setting.tonic, mode), 0.0, style);
                        plan
                    });
                    (
                        "Which progression is this?",
                        choices,
                        def.id.to_string(),
                        explanation,
                        comparison,
                        chords,
                        None,
                    )
                }
            }
        };

        let final_notes = chords.last().map(|c| c.midi_notes.clone()).unwrap_or_default();
        let focus_key = match key {
            ConceptKey::Cadence(_) => ConceptKey::Cadence(def.cadence),
            _ => ConceptKey::Progression(def.id.to_string()),
        };

        TrainingQuestion {
            id: Self::question_id(&setting, &focus_key),
            mode: ConceptMode::Progression,
            tonic: setting.tonic,
            tonal_mode: mode,
            context: setting.context(ConceptMode::Progression, HearingContext::Harmonic),
            prompt: format!("In {}: {}", key_name(&setting), prompt),
            plan,
            choices,
            correct_answer,
            focus_key,
            explanation,
            comparison,
            requires_singing: false,
            authored: false,
            sing_target_midi: None,
            detail: QuestionDetail::Progression {
                progression_id: def.id.to_string(),
                cadence: def.cadence,
                chords,
                changed_index,
            },
            visual_cues: vec![VisualCue::KeyboardNotes { midi_notes: final_notes }],
        }
    }

    pub(super) fn build_timing(&mut self, setting: &Setting, key: ConceptKey) -> TrainingQuestion {
        let level = setting.level;
        let meters = Meter::pool(level);
        let subdivisions = Subdivision::pool(level);
        let bars = timing::bars_for_level(level);
        let chance = timing::syncopation_chance(level);
        let simple: Vec<Meter> = meters.iter().copied().filter(|m| !m.is_compound()).collect();
        let random_meter = |rng: &mut R, from: &[Meter]| *from.choose(rng).unwrap_or(&Meter::FOUR_FOUR);
        let random_subdivision =
            |rng: &mut R, from: &[Subdivision]| *from.choose(rng).unwrap_or(&Subdivision::Eighth);

        let (shape, pattern) = match &key {
            ConceptKey::Meter(meter) => {
                let grid = RhythmGrid::new(*meter, random_subdivision(&mut self.rng, &subdivisions[..]), bars);
                (TimingShape::Meter, timing::build_pattern(grid, None, chance, &mut self.rng))
            }
            ConceptKey::Subdivision(subdivision) => {
                let grid = RhythmGrid::new(random_meter(&mut self.rng, &simple[..]), *subdivision, bars);
                (TimingShape::Subdivision, timing::build_pattern(grid, None, chance, &mut self.rng))
            }
            ConceptKey::Syncopation(wanted) => {
                let fine: Vec<Subdivision> = subdivisions
                    .iter()
                    .copied()
                    .filter(|s| s.steps_per_beat() > 1)
                    .collect();
                let grid = RhythmGrid::new(
                    random_meter(&mut self.rng, &simple[..]),
                    random_subdivision(&mut self.rng, &fine[..]),
                    bars,
                );
                (
                    TimingShape::Syncopation,
                    timing::build_pattern(grid, Some(*wanted), chance, &mut self.rng),
                )
            }
            ConceptKey::Rhythm(meter) => {
                let grid = RhythmGrid::new(*meter, random_subdivision(&mut self.rng, &subdivisions[..]), bars);
                (TimingShape::Tap, timing::build_pattern(grid, None, chance, &mut self.rng))
            }
            other => {
                tracing::warn!(key = %other, "not a timing concept, asking for the meter");
                let grid = RhythmGrid::new(Meter::FOUR_FOUR, Subdivision::Eighth, bars);
                (TimingShape::Meter, timing::build_pattern(grid, None, chance, &mut self.rng))
            }
        };

        let grid = pattern.grid;
        let per_bar = grid.meter.beats_per_bar();
        let pitch = setting.tonic.tonic_midi();
        let mut plan = PlaybackPlan::new(self.config.tempo);
        let count_in = if shape == TimingShape::Tap {
            add_pulse(&mut plan, per_bar, per_bar, 0.0);
            per_bar as f64
        } else {
            add_pulse(&mut plan, grid.total_beats(), per_bar, 0.0);
            0.0
        };
        add_pattern(&mut plan, &pattern, count_in, pitch);

        let wanted = self.distractor_count();
        let (focus_key, prompt, choices, correct_answer, explanation) = match shape {
            TimingShape::Meter => {
                let choices = shuffled_choices(&grid.meter, &Meter::ALL, wanted, &mut self.rng, |m| {
                    AnswerChoice::new(m.to_string(), m.to_string())
                });
                (
                    ConceptKey::Meter(grid.meter),
                    "What meter is this rhythm in?",
                    choices,
                    grid.meter.to_string(),
                    format!(
                        "The accents fall every {} beats: {}{}.",
                        per_bar,
                        grid.meter,
                        if grid.meter.is_compound() {
                            ", each beat split in three"
                        } else {
                            ""
                        }
                    ),
                )
            }
            TimingShape::Subdivision => {
                let pool = if subdivisions.len() > wanted { subdivisions.clone() } else { Subdivision::ALL.to_vec() };
                let choices = shuffled_choices(&grid.subdivision, &pool, wanted, &mut self.rng, |s| {
                    AnswerChoice::new(s.as_str(), s.as_str())
                });
                (
                    ConceptKey::Subdivision(grid.subdivision),
                    "What is the smallest subdivision of the beat?",
                    choices,
                    grid.subdivision.as_str().to_string(),
                    format!(
                        "Each beat divides into {} {} notes.",
                        grid.steps_per_beat(),
                        grid.subdivision.as_str()
                    ),
                )
            }
            TimingShape::Syncopation => {
                let answer = if pattern.syncopated { "present" } else { "absent" };
                let mut choices = vec![
                    AnswerChoice::new("present", "Syncopated"),
                    AnswerChoice::new("absent", "Straight"),
                ];
                choices.shuffle(&mut self.rng);
                (
                    ConceptKey::Syncopation(pattern.syncopated),
                    "Is this rhythm syncopated?",
                    choices,
                    answer.to_string(),
                    if pattern.syncopated {
                        "An off-beat onset is held across the next beat, so the accent shifts.".to_string()
                    } else {
                        "Every off-beat onset is followed by an onset on the beat.".to_string()
                    },
                )
            }
            TimingShape::Tap => (
                ConceptKey::Rhythm(grid.meter),
                "Tap the rhythm back after the one-bar count-in.",
                Vec::new(),
                pattern.notation(),
                format!("{} onsets over {} bars of {}.", pattern.onset_slots.len(), grid.bars, grid.meter),
            ),
        };

        let onsets: BTreeSet<usize> = pattern.onset_slots.iter().copied().collect();
        TrainingQuestion {
            id: Self::question_id(setting, &focus_key),
            mode: ConceptMode::Timing,
            tonic: setting.tonic,
            tonal_mode: setting.tonal_mode,
            context: setting.context(ConceptMode::Timing, HearingContext::Melodic),
            prompt: prompt.to_string(),
            plan,
            choices,
            correct_answer,
            focus_key,
            explanation,
            comparison: None,
            requires_singing: false,
            authored: false,
            sing_target_midi: None,
            detail: QuestionDetail::Timing {
                shape,
                meter: grid.meter,
                subdivision: grid.subdivision,
                bars: grid.bars,
                onsets: pattern.target_beats(),
                count_in_beats: count_in,
                syncopated: pattern.syncopated,
                notation: pattern.notation(),
                tolerance_beats: self.config.tap_tolerance_beats,
            },
            visual_cues: vec![VisualCue::BeatGrid {
                slots: grid.slot_count(),
                onsets: onsets.into_iter().collect(),
            }],
        }
    }

    pub(super) fn build_phrase(&mut self, setting: &Setting, contour: Contour) -> TrainingQuestion {
        let mode = setting.tonal_mode;
        let bars = phrase::bars_for_level(setting.level);
        let melody = phrase::build_phrase(contour, bars, mode, &mut self.rng);
        let distractors = phrase::mutated_distractors(&melody, mode, &mut self.rng);
        let midi = phrase::realize(&melody.degrees, setting.tonic, mode);

        let mut plan = PlaybackPlan::new(self.config.tempo);
        plan.chord(tonic_triad(setting.tonic, mode), 0.0, 2.0);
        let last = midi.len().saturating_sub(1);
        for (i, note) in midi.iter().enumerate() {
            plan.note(*note, 2.0 + i as f64, if i == last { 2.0 } else { 1.0 });
        }

        let label = melody.label();
        let mut choices = vec![AnswerChoice::new(label.clone(), label.clone())];
        for distractor in &distractors {
            let text = format_degrees(distractor);
            if choices.iter().all(|c| c.value != text) {
                choices.push(AnswerChoice::new(text.clone(), text));
            }
        }
        choices.shuffle(&mut self.rng);

        let comparison = distractors.first().map(|degrees| {
            let mut plan = PlaybackPlan::new(self.config.tempo);
            for (i, note) in phrase::realize(degrees, setting.tonic, mode).iter().enumerate() {
                plan.note(*note, i as f64, 1.0);
            }
            plan
        });

        let shape = match contour {
            Contour::Stepwise => "moves by step",
            Contour::Triadic => "outlines the tonic triad",
            Contour::Chromatic => "borrows chromatic neighbours",
        };
        let key = ConceptKey::Phrase(contour);

        TrainingQuestion {
            id: Self::question_id(setting, &key),
            mode: ConceptMode::Phrase,
            tonic: setting.tonic,
            tonal_mode: mode,
            context: setting.context(ConceptMode::Phrase, HearingContext::Melodic),
            prompt: format!("In {}: which degrees spell the phrase?", key_name(setting)),
            plan,
            choices,
            correct_answer: label.clone(),
            focus_key: key,
            explanation: format!("The phrase {} and closes on the tonic: {}.", shape, label),
            comparison,
            requires_singing: false,
            authored: false,
            sing_target_midi: midi.first().copied(),
            detail: QuestionDetail::Phrase {
                contour,
                degrees: melody.degrees.clone(),
            },
            visual_cues: vec![VisualCue::KeyboardNotes { midi_notes: midi }],
        }
    }
}
