//! Sung-response evaluation.
//!
//! Consumes the pitch-detection stream as `{timestamp, detected pitch}` samples. Matching is
//! octave-agnostic: a learner singing degree 5 an octave below the played note is correct.

use serde::{Deserialize, Serialize};

/// One frame from the pitch detector. `midi_pitch` is fractional (60.5 is a quarter tone above
/// C4) and `None` when no fundamental was found.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PitchSample {
    pub timestamp_ms: u64,
    pub midi_pitch: Option<f64>,
}

/// Thresholds for accepting a sung note
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SungCriteria {
    pub tolerance_cents: f64,
    pub min_hold_ms: u64,
}

impl Default for SungCriteria {
    fn default() -> Self {
        Self {
            tolerance_cents: 50.0,
            min_hold_ms: 400,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SungVerdict {
    pub matched: bool,
    /// Longest continuous in-tune stretch
    pub held_ms: u64,
    /// Mean deviation over that stretch, folded into one octave
    pub cents_off: Option<f64>,
}

/// Signed distance in cents from `pitch` to the nearest octave of `target`, in [-600, 600).
pub fn pitch_class_cents(pitch: f64, target: u8) -> f64 {
    let cents = (pitch - target as f64) * 100.0;
    (cents + 600.0).rem_euclid(1200.0) - 600.0
}

fn close_run(run: &mut Vec<(u64, f64)>, best: &mut Option<(u64, f64)>) {
    if let (Some(first), Some(last)) = (run.first(), run.last()) {
        let held = last.0 - first.0;
        let mean = run.iter().map(|(_, c)| c).sum::<f64>() / run.len() as f64;
        if best.map_or(true, |(b, _)| held > b) {
            *best = Some((held, mean));
        }
    }
    run.clear();
}

pub fn evaluate(samples: &[PitchSample], target_midi: u8, criteria: &SungCriteria) -> SungVerdict {
    let mut ordered: Vec<&PitchSample> = samples.iter().collect();
    ordered.sort_by_key(|s| s.timestamp_ms);

    let mut best: Option<(u64, f64)> = None;
    let mut run: Vec<(u64, f64)> = Vec::new();

    for sample in ordered {
        match sample.midi_pitch {
            Some(pitch) => {
                let cents = pitch_class_cents(pitch, target_midi);
                if cents.abs() <= criteria.tolerance_cents {
                    run.push((sample.timestamp_ms, cents));
                } else {
                    close_run(&mut run, &mut best);
                }
            }
            None => close_run(&mut run, &mut best),
        }
    }
    close_run(&mut run, &mut best);

    match best {
        Some((held_ms, cents)) => SungVerdict {
            matched: held_ms >= criteria.min_hold_ms,
            held_ms,
            cents_off: Some(cents),
        },
        None => SungVerdict {
            matched: false,
            held_ms: 0,
            cents_off: None,
        },
    }
}
