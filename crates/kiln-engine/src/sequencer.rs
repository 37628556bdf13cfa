//! Look-ahead step scheduler.
//!
//! The scheduler walks a global sixteenth-note grid ahead of the audio
//! clock. Each tick schedules every row whose grid time falls inside
//! the look-ahead window: trigger conditions are evaluated right here,
//! and rows that fire become [`StepEvent`]s in a time-ordered pending
//! queue. The engine drains the queue on the exact frame each event's
//! timestamp falls on, so evaluation order is always musical order
//! even when a tick schedules across a loop boundary.

use kiln_model::{Project, Track, TrackId};

use crate::trig::TrigEngine;

/// How far ahead of the audio clock rows are scheduled.
pub const LOOKAHEAD_SECONDS: f64 = 0.100;
/// Scheduling cadence; the engine ticks when rendered time crosses
/// this boundary.
pub const TICK_SECONDS: f64 = 0.025;
/// In song mode, rows later than this are dropped instead of clamped.
pub const LATE_THRESHOLD_SECONDS: f64 = 0.050;
/// Global loop length; trigger history wraps here.
pub const LOOP_STEPS: u32 = 64;
/// External sync runs at 24 pulses per quarter, six per sixteenth.
const PULSES_PER_STEP: u32 = 6;

/// Seconds per sixteenth step at a given tempo.
pub fn step_seconds(tempo: f32) -> f64 {
    let tempo = if tempo.is_finite() && tempo > 0.0 { tempo } else { 120.0 };
    60.0 / tempo as f64 / 4.0
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Transport {
    #[default]
    Stopped,
    Playing,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PlayMode {
    #[default]
    Pattern,
    Song,
}

/// One fired step, scheduled at an absolute audio-clock time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepEvent {
    pub time: f64,
    pub track: TrackId,
    /// Index into the track's pattern list.
    pub pattern: usize,
    /// Step index within that pattern.
    pub step: usize,
    pub loop_count: u32,
    /// Automation time base: seconds from the top of the 64-step loop.
    pub loop_time: f32,
}

pub struct Sequencer {
    transport: Transport,
    mode: PlayMode,
    external_clock: bool,
    next_step_time: f64,
    total_steps: u64,
    loop_count: u32,
    pulse_count: u32,
    pending: Vec<StepEvent>,
    cursor: usize,
    /// Tracks whose live pattern substitutes for their song clips.
    overlays: Vec<TrackId>,
}

impl Sequencer {
    pub fn new() -> Self {
        Self {
            transport: Transport::Stopped,
            mode: PlayMode::Pattern,
            external_clock: false,
            next_step_time: 0.0,
            total_steps: 0,
            loop_count: 0,
            pulse_count: 0,
            pending: Vec::with_capacity(256),
            cursor: 0,
            overlays: Vec::new(),
        }
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    pub fn is_playing(&self) -> bool {
        self.transport == Transport::Playing
    }

    pub fn mode(&self) -> PlayMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: PlayMode) {
        self.mode = mode;
    }

    pub fn set_external_clock(&mut self, enabled: bool) {
        self.external_clock = enabled;
        self.pulse_count = 0;
    }

    pub fn external_clock(&self) -> bool {
        self.external_clock
    }

    /// Current grid step within the 64-step loop.
    pub fn grid_step(&self) -> u32 {
        (self.total_steps % LOOP_STEPS as u64) as u32
    }

    pub fn loop_count(&self) -> u32 {
        self.loop_count
    }

    /// Song-position beat derived from the grid.
    pub fn beat(&self) -> f64 {
        self.total_steps as f64 * 0.25
    }

    pub fn set_live_overlay(&mut self, track: TrackId, on: bool) {
        if on {
            if !self.overlays.contains(&track) {
                self.overlays.push(track);
            }
        } else {
            self.overlays.retain(|t| *t != track);
        }
    }

    fn is_overlaid(&self, track: TrackId) -> bool {
        self.overlays.contains(&track)
    }

    /// Start playing; the first row lands exactly at `now`.
    pub fn play(&mut self, now: f64) {
        self.transport = Transport::Playing;
        self.next_step_time = now;
        self.total_steps = 0;
        self.loop_count = 0;
        self.pulse_count = 0;
        self.pending.clear();
        self.cursor = 0;
    }

    /// Stop and cancel everything not yet dispatched. Idempotent.
    pub fn stop(&mut self) {
        self.transport = Transport::Stopped;
        self.pending.clear();
        self.cursor = 0;
    }

    /// Schedule every row whose grid time falls inside the look-ahead
    /// window. Called from the engine's 25ms tick.
    pub fn tick(&mut self, now: f64, project: &Project, trig: &mut TrigEngine) {
        if self.transport != Transport::Playing || self.external_clock {
            return;
        }
        let step_dur = step_seconds(project.tempo);
        match self.mode {
            PlayMode::Pattern => {
                // Catch-up after a stall jumps the grid to now instead
                // of firing the backlog.
                if self.next_step_time < now {
                    self.next_step_time = now;
                }
                while self.next_step_time < now + LOOKAHEAD_SECONDS {
                    self.schedule_pattern_row(project, trig, self.next_step_time, step_dur);
                    self.advance(step_dur, trig);
                }
            }
            PlayMode::Song => {
                while self.next_step_time < now + LOOKAHEAD_SECONDS {
                    let at = self.next_step_time;
                    if at >= now {
                        self.schedule_song_row(project, trig, at, step_dur);
                    } else if now - at <= LATE_THRESHOLD_SECONDS {
                        // Slightly late rows clamp to now; later ones
                        // are dropped outright.
                        self.schedule_song_row(project, trig, now, step_dur);
                    }
                    self.advance(step_dur, trig);
                }
            }
        }
    }

    /// One external timing pulse. The first pulse after start is the
    /// downbeat; every sixth pulse after that advances a step,
    /// scheduled immediately.
    pub fn clock_pulse(&mut self, now: f64, project: &Project, trig: &mut TrigEngine) {
        if !self.external_clock || self.transport != Transport::Playing {
            return;
        }
        let on_step = self.pulse_count % PULSES_PER_STEP == 0;
        self.pulse_count = self.pulse_count.wrapping_add(1);
        if !on_step {
            return;
        }
        let step_dur = step_seconds(project.tempo);
        match self.mode {
            PlayMode::Pattern => self.schedule_pattern_row(project, trig, now, step_dur),
            PlayMode::Song => self.schedule_song_row(project, trig, now, step_dur),
        }
        self.advance(step_dur, trig);
    }

    pub fn clock_start(&mut self, now: f64) {
        self.play(now);
    }

    pub fn clock_stop(&mut self) {
        self.stop();
    }

    /// Pop the next event whose timestamp has been reached.
    pub fn pop_due(&mut self, now: f64) -> Option<StepEvent> {
        if self.cursor >= self.pending.len() {
            return None;
        }
        if self.pending[self.cursor].time > now {
            return None;
        }
        let ev = self.pending[self.cursor];
        self.cursor += 1;
        if self.cursor == self.pending.len() {
            self.pending.clear();
            self.cursor = 0;
        } else if self.cursor > 64 {
            self.pending.drain(..self.cursor);
            self.cursor = 0;
        }
        Some(ev)
    }

    fn advance(&mut self, step_dur: f64, trig: &mut TrigEngine) {
        self.next_step_time += step_dur;
        self.total_steps += 1;
        if self.total_steps % LOOP_STEPS as u64 == 0 {
            self.loop_count += 1;
            trig.on_loop_wrap();
        }
    }

    fn audible(project: &Project, track: &Track) -> bool {
        match project.solo {
            Some(soloed) => soloed == track.id,
            None => !track.strip.muted,
        }
    }

    /// The live pattern index, falling back to the first pattern when
    /// the active index is stale. Mirrors [`Track::pattern`].
    fn live_pattern_index(track: &Track) -> usize {
        if track.active_pattern < track.patterns.len() {
            track.active_pattern
        } else {
            0
        }
    }

    /// Swing delays every odd sixteenth by a fraction of a step.
    fn swung(&self, at: f64, project: &Project, step_dur: f64) -> f64 {
        if self.total_steps % 2 == 1 {
            at + project.swing.clamp(0.0, 0.6) as f64 * step_dur
        } else {
            at
        }
    }

    fn loop_time(&self, step_dur: f64) -> f32 {
        (self.grid_step() as f64 * step_dur) as f32
    }

    fn schedule_pattern_row(
        &mut self,
        project: &Project,
        trig: &mut TrigEngine,
        at: f64,
        step_dur: f64,
    ) {
        let at = self.swung(at, project, step_dur);
        let loop_time = self.loop_time(step_dur);
        for track in &project.tracks {
            if !Self::audible(project, track) {
                continue;
            }
            let pattern_index = Self::live_pattern_index(track);
            self.schedule_step(trig, track, pattern_index, self.total_steps, at, loop_time);
        }
    }

    fn schedule_song_row(
        &mut self,
        project: &Project,
        trig: &mut TrigEngine,
        at: f64,
        step_dur: f64,
    ) {
        let at = self.swung(at, project, step_dur);
        let loop_time = self.loop_time(step_dur);
        let beat = self.beat() as f32;
        for track in &project.tracks {
            if !Self::audible(project, track) {
                continue;
            }
            if self.is_overlaid(track.id) {
                // Live overlay: the track's own pattern replaces its
                // clips for as long as the overlay is set.
                let pattern_index = Self::live_pattern_index(track);
                self.schedule_step(trig, track, pattern_index, self.total_steps, at, loop_time);
                continue;
            }
            for clip in project.arrangement.clips() {
                if clip.track != track.id || !clip.contains(beat) {
                    continue;
                }
                let local_step = ((beat - clip.start_beat) / 0.25).round() as u64;
                self.schedule_step(trig, track, clip.pattern, local_step, at, loop_time);
            }
        }
    }

    /// Evaluate one track's step at a grid position and enqueue it if
    /// it fires. Commit happens here so later rows in the same tick
    /// see the updated history.
    fn schedule_step(
        &mut self,
        trig: &mut TrigEngine,
        track: &Track,
        pattern_index: usize,
        grid_position: u64,
        at: f64,
        loop_time: f32,
    ) {
        let Some(pattern) = track.patterns.get(pattern_index) else {
            return;
        };
        let step_index = (grid_position % pattern.len.max(1) as u64) as usize;
        let Some(step) = pattern.steps.get(step_index) else {
            return;
        };
        if !step.active {
            return;
        }
        if !trig.evaluate(track.id, step.condition, self.loop_count) {
            return;
        }
        trig.commit_fire(track.id, self.loop_count);
        self.push_event(StepEvent {
            time: at,
            track: track.id,
            pattern: pattern_index,
            step: step_index,
            loop_count: self.loop_count,
            loop_time,
        });
    }

    /// Insert keeping the queue time-ordered; equal timestamps keep
    /// their push order, which is track-list order within a row.
    fn push_event(&mut self, ev: StepEvent) {
        let at = self.pending.partition_point(|e| e.time <= ev.time);
        self.pending.insert(at, ev);
    }
}

impl Default for Sequencer {
    fn default() -> Self {
        Self::new()
    }
}
