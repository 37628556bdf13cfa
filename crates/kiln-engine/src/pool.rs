//! Voice pool: allocation, stealing, and reclaim.
//!
//! Voices live from trigger until their natural stop time, which the
//! builder computed as envelope gesture plus safety tail. When a new
//! voice would push the live count past the cap, the oldest voice by
//! stop time is stolen: faded over ~15ms and dropped ~50ms later.
//! The fade phase keeps the eviction click-free; the delayed drop
//! keeps the graph alive while the fade plays out. Stolen voices no
//! longer count toward the cap, which is what lets the replacement
//! voice in immediately.

use core::cmp::Ordering;
use slotmap::SlotMap;

use kiln_model::TrackId;

use crate::dsp::VoiceGraph;

slotmap::new_key_type! {
    /// Stable handle to a pooled voice.
    pub struct VoiceKey;
}

/// Hard cap on concurrently sounding voices.
pub const MAX_VOICES: usize = 64;
/// Fade applied to a stolen voice before removal.
pub const STEAL_FADE_SECONDS: f32 = 0.015;
/// Delay between stealing a voice and dropping it.
pub const STEAL_REMOVE_SECONDS: f64 = 0.050;

#[derive(Clone, Copy, Debug, PartialEq)]
enum VoiceState {
    Sounding,
    Stolen { remove_at: f64 },
}

pub struct Voice {
    pub track: TrackId,
    pub graph: VoiceGraph,
    pub started_at: f64,
    pub stop_time: f64,
    state: VoiceState,
    fade: f32,
    fade_step: f32,
}

impl Voice {
    /// Render one sample, applying the steal fade if one is active.
    pub fn render(&mut self) -> f32 {
        let s = self.graph.render();
        match self.state {
            VoiceState::Sounding => s,
            VoiceState::Stolen { .. } => {
                self.fade = (self.fade - self.fade_step).max(0.0);
                s * self.fade
            }
        }
    }

    pub fn is_stolen(&self) -> bool {
        matches!(self.state, VoiceState::Stolen { .. })
    }
}

pub struct VoicePool {
    voices: SlotMap<VoiceKey, Voice>,
    sample_rate: f32,
}

impl VoicePool {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            // Room for a full pool plus fading corpses, so steady
            // state never grows the map.
            voices: SlotMap::with_capacity_and_key(MAX_VOICES + 32),
            sample_rate: sample_rate.max(1.0),
        }
    }

    /// Total voices present, stolen ones included.
    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    /// Voices counting toward the cap.
    pub fn live_count(&self) -> usize {
        self.voices.values().filter(|v| !v.is_stolen()).count()
    }

    pub fn get(&self, key: VoiceKey) -> Option<&Voice> {
        self.voices.get(key)
    }

    pub fn get_mut(&mut self, key: VoiceKey) -> Option<&mut Voice> {
        self.voices.get_mut(key)
    }

    /// Register a voice, stealing first if the pool is at the cap so
    /// the live count never exceeds it, even transiently.
    pub fn insert(
        &mut self,
        track: TrackId,
        graph: VoiceGraph,
        now: f64,
        stop_time: f64,
    ) -> VoiceKey {
        while self.live_count() >= MAX_VOICES {
            if !self.steal_oldest(now) {
                break;
            }
        }
        self.voices.insert(Voice {
            track,
            graph,
            started_at: now,
            stop_time,
            state: VoiceState::Sounding,
            fade: 1.0,
            fade_step: 1.0 / (STEAL_FADE_SECONDS * self.sample_rate),
        })
    }

    /// Fade out the sounding voice with the earliest stop time.
    fn steal_oldest(&mut self, now: f64) -> bool {
        let victim = self
            .voices
            .iter()
            .filter(|(_, v)| !v.is_stolen())
            .min_by(|a, b| {
                a.1.stop_time
                    .partial_cmp(&b.1.stop_time)
                    .unwrap_or(Ordering::Equal)
            })
            .map(|(k, _)| k);
        match victim {
            Some(key) => {
                if let Some(voice) = self.voices.get_mut(key) {
                    voice.state = VoiceState::Stolen {
                        remove_at: now + STEAL_REMOVE_SECONDS,
                    };
                }
                true
            }
            None => false,
        }
    }

    /// Drop voices past their stop time and stolen voices past their
    /// removal time. Called from the scheduling tick.
    pub fn reap(&mut self, now: f64) {
        self.voices.retain(|_, v| match v.state {
            VoiceState::Stolen { remove_at } => now < remove_at,
            VoiceState::Sounding => now < v.stop_time,
        });
    }

    /// Drop everything immediately. Safe to call repeatedly.
    pub fn stop_all(&mut self) {
        self.voices.clear();
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (VoiceKey, &mut Voice)> {
        self.voices.iter_mut()
    }
}
