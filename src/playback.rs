//! Playback plan types.
//!
//! The trainer never touches audio hardware. It describes what should sound as a declarative
//! plan (notes, chords and clicks positioned in beats) and hands the plan to a
//! [`PlaybackSink`] supplied by the host.

use serde::{Deserialize, Serialize};

/// A single pitched note.
///
/// # Fields
/// - `midi_note`: MIDI note number (60 = C4)
/// - `start_time`: start in beats from the beginning of the plan
/// - `duration`: length in beats
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackNote {
    pub midi_note: u8,
    pub start_time: f64,
    pub duration: f64,
}

/// Several notes sounding together
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackChord {
    pub midi_notes: Vec<u8>,
    pub start_time: f64,
    pub duration: f64,
}

/// Unpitched percussive onset for rhythm material and count-ins
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackClick {
    pub start_time: f64,
    /// Downbeats are accented
    pub accent: bool,
}

/// Sustained reference tone under a question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DroneConfig {
    pub midi_note: u8,
    /// Gain relative to the main voice, 0..=1
    pub gain: f32,
    /// Add the fifth above the drone note
    pub with_fifth: bool,
}

/// Everything needed to sound one question or comparison example.
///
/// # Fields
/// - `tempo`: beats per minute, beat = quarter note
/// - `notes`, `chords`, `clicks`: events in beats
/// - `drone`: optional tonic drone scheduled for the whole plan
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackPlan {
    pub tempo: u16,
    pub notes: Vec<PlaybackNote>,
    pub chords: Vec<PlaybackChord>,
    pub clicks: Vec<PlaybackClick>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drone: Option<DroneConfig>,
}

impl PlaybackPlan {
    pub fn new(tempo: u16) -> Self {
        Self {
            tempo,
            notes: Vec::new(),
            chords: Vec::new(),
            clicks: Vec::new(),
            drone: None,
        }
    }

    pub fn note(&mut self, midi_note: u8, start_time: f64, duration: f64) -> &mut Self {
        self.notes.push(PlaybackNote {
            midi_note,
            start_time,
            duration,
        });
        self
    }

    pub fn chord(&mut self, midi_notes: Vec<u8>, start_time: f64, duration: f64) -> &mut Self {
        self.chords.push(PlaybackChord {
            midi_notes,
            start_time,
            duration,
        });
        self
    }

    pub fn click(&mut self, start_time: f64, accent: bool) -> &mut Self {
        self.clicks.push(PlaybackClick { start_time, accent });
        self
    }

    /// Beat at which the last event finishes.
    pub fn total_beats(&self) -> f64 {
        let notes = self.notes.iter().map(|n| n.start_time + n.duration);
        let chords = self.chords.iter().map(|c| c.start_time + c.duration);
        let clicks = self.clicks.iter().map(|c| c.start_time + 0.25);
        notes.chain(chords).chain(clicks).fold(0.0, f64::max)
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty() && self.chords.is_empty() && self.clicks.is_empty()
    }
}

/// Timbre requested from the sound engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timbre {
    #[default]
    Piano,
    Sine,
    Organ,
}

/// Per-call voice settings passed alongside a plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceSettings {
    pub tempo: u16,
    pub gain: f32,
    pub timbre: Timbre,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            tempo: 90,
            gain: 0.8,
            timbre: Timbre::Piano,
        }
    }
}

/// Host-side sound engine.
pub trait PlaybackSink {
    fn play(&mut self, plan: &PlaybackPlan, voice: &VoiceSettings);
    fn schedule_drone(&mut self, midi_note: u8, config: &DroneConfig);
}
