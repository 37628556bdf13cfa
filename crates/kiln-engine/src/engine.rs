//! The engine facade.
//!
//! One `Engine` owns the whole audio timeline: project data, the
//! look-ahead sequencer, trigger history, the voice pool, per-track
//! strips, the three send buses, the master chain and the outbound
//! MIDI queue. The host calls [`Engine::render_frame`] once per output
//! frame; the ~25ms scheduling tick runs inside that call whenever the
//! sample clock crosses the next tick boundary.

use arrayvec::ArrayVec;

use kiln_model::{
    note_to_freq, note_to_midi, Archetype, CharacterConfig, CompressorConfig, DelayConfig,
    DriveConfig, MasterFilterConfig, Project, ReverbConfig, Step, Track, TrackId, MAX_STEP_NOTES,
};

use crate::dsp::SendLevels;
use crate::fx::{DelayBus, DriveBus, ReverbBus};
use crate::master::MasterChain;
use crate::midi::{MidiEvent, MidiQueue};
use crate::pool::VoicePool;
use crate::sequencer::{step_seconds, PlayMode, Sequencer, StepEvent, TICK_SECONDS};
use crate::shapes::ShapeCache;
use crate::strip::StripState;
use crate::trig::TrigEngine;
use crate::voices::{build_voice, BuildCtx};

/// Strip slots the engine carries; tracks with ids past this have no
/// channel and never sound.
pub const MAX_TRACKS: usize = 16;

/// Pitch used when a melodic step carries no parseable note (A3).
const FALLBACK_FREQ: f32 = 220.0;
/// Per-trigger stride for the noise-seed sequence.
const SEED_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;
const DEFAULT_NOISE_SEED: u64 = 0x4B49_4C4E;

/// A stereo audio frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Frame {
    pub left: f32,
    pub right: f32,
}

impl Frame {
    /// The silent frame.
    pub const fn silence() -> Self {
        Self { left: 0.0, right: 0.0 }
    }

    /// Absolute peak across both channels.
    pub fn peak(&self) -> f32 {
        self.left.abs().max(self.right.abs())
    }
}

/// Transport position, read by the UI between frames.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Position {
    /// Grid step within the 64-step loop.
    pub step: u32,
    pub loop_count: u32,
    /// Song-position beat derived from the grid.
    pub beat: f64,
}

/// Peak levels for every strip slot plus the master bus.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MeterSnapshot {
    pub tracks: [f32; MAX_TRACKS],
    pub master: f32,
}

/// Sidechain dip depth for one source fire: the compressor's
/// threshold depth shaped by its ratio, scaled by step velocity.
pub fn duck_depth(config: &CompressorConfig, velocity: f32) -> f32 {
    let threshold =
        if config.threshold_db.is_finite() { config.threshold_db.clamp(-60.0, 0.0) } else { -18.0 };
    let ratio = if config.ratio.is_finite() { config.ratio.clamp(1.0, 20.0) } else { 4.0 };
    let velocity = if velocity.is_finite() { velocity.clamp(0.0, 1.0) } else { 1.0 };
    let depth = (-threshold / 60.0) * (1.0 - 1.0 / ratio);
    (depth * velocity).clamp(0.0, 1.0)
}

/// Per-trigger scalars shared by the scheduled and audition paths.
#[derive(Clone, Copy)]
struct FireInfo {
    at: f64,
    loop_time: f32,
    /// Gate length in grid steps, already truncated at the pattern
    /// end; only MIDI note-offs consume it.
    span_steps: u16,
    tempo: f32,
    sample_rate: f32,
    seed: u64,
}

pub struct Engine {
    project: Project,
    sample_rate: f32,
    frames: u64,
    next_tick: f64,
    sequencer: Sequencer,
    trig: TrigEngine,
    pool: VoicePool,
    shapes: ShapeCache,
    strips: [Option<StripState>; MAX_TRACKS],
    reverb: ReverbBus,
    delay: DelayBus,
    drive: DriveBus,
    master: MasterChain,
    midi: MidiQueue,
    noise_seed: u64,
}

impl Engine {
    /// Create an engine for the given project.
    pub fn new(project: Project, sample_rate: u32) -> Self {
        Self::build(project, sample_rate, TrigEngine::new(), DEFAULT_NOISE_SEED)
    }

    /// Like [`Engine::new`] but with seeded randomness, so probability
    /// trigs and noise sources render reproducibly.
    pub fn with_seed(project: Project, sample_rate: u32, seed: u64) -> Self {
        Self::build(project, sample_rate, TrigEngine::with_seed(seed), seed)
    }

    fn build(project: Project, sample_rate: u32, trig: TrigEngine, noise_seed: u64) -> Self {
        let sr = sample_rate.max(1) as f32;
        let mut shapes = ShapeCache::new();
        let master = MasterChain::new(sr, &mut shapes);
        let drive = DriveBus::new(sr, &mut shapes);
        let mut engine = Self {
            project,
            sample_rate: sr,
            frames: 0,
            next_tick: 0.0,
            sequencer: Sequencer::new(),
            trig,
            pool: VoicePool::new(sr),
            shapes,
            strips: [None; MAX_TRACKS],
            reverb: ReverbBus::new(sr),
            delay: DelayBus::new(sr),
            drive,
            master,
            midi: MidiQueue::new(),
            noise_seed,
        };
        engine.create_track_channels();
        engine.apply_configs();
        engine
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Frames rendered since construction; the engine's audio clock.
    pub fn frames_rendered(&self) -> u64 {
        self.frames
    }

    pub fn frames_to_seconds(&self, frames: u64) -> f64 {
        frames as f64 / self.sample_rate as f64
    }

    pub fn seconds_to_frames(&self, seconds: f64) -> u64 {
        seconds_to_frame(seconds, self.sample_rate)
    }

    fn clock_seconds(&self) -> f64 {
        self.frames_to_seconds(self.frames)
    }

    /// Replace the project wholesale, as on load. Silences everything
    /// and rebuilds the strip topology.
    pub fn set_project(&mut self, project: Project) {
        self.stop_all();
        self.project = project;
        self.create_track_channels();
        self.apply_configs();
    }

    /// Rebuild the per-track strips from the current track list.
    /// Tracks without a strip slot never produce voices.
    pub fn create_track_channels(&mut self) {
        let sr = self.sample_rate;
        self.strips = [None; MAX_TRACKS];
        let Engine { project, strips, .. } = self;
        for track in &project.tracks {
            let idx = track.id.0 as usize;
            if idx < MAX_TRACKS {
                strips[idx] = Some(StripState::new(&track.strip, sr));
            }
        }
    }

    fn apply_configs(&mut self) {
        let Engine { project, shapes, reverb, delay, drive, master, .. } = self;
        reverb.set_config(&project.reverb, project.tempo);
        delay.set_config(&project.delay, project.tempo);
        drive.set_config(&project.drive, shapes);
        master.set_filter(&project.master_filter);
        master.set_character(&project.character, shapes);
        master.set_compressor(&project.compressor);
        master.set_volume(project.master_volume);
    }

    // === Transport ===

    /// Start playback; the first row lands on the next frame.
    pub fn play(&mut self) {
        let now = self.clock_seconds();
        self.trig.reset();
        self.sequencer.play(now);
        self.next_tick = now;
    }

    /// Stop scheduling. Sounding voices ring out; pending rows and
    /// queued MIDI are cancelled and all-notes-off goes out instead.
    pub fn stop(&mut self) {
        self.sequencer.stop();
        self.trig.reset();
        self.midi.clear();
        self.broadcast_all_notes_off();
    }

    /// Hard stop: cancel scheduling and silence everything now,
    /// including bus tails. Idempotent.
    pub fn stop_all(&mut self) {
        self.stop();
        self.pool.stop_all();
        self.reverb.clear();
        self.delay.clear();
        self.drive.clear();
        self.master.reset();
        for strip in self.strips.iter_mut().flatten() {
            strip.reset();
        }
    }

    pub fn is_playing(&self) -> bool {
        self.sequencer.is_playing()
    }

    pub fn set_mode(&mut self, mode: PlayMode) {
        self.sequencer.set_mode(mode);
    }

    pub fn mode(&self) -> PlayMode {
        self.sequencer.mode()
    }

    pub fn position(&self) -> Position {
        Position {
            step: self.sequencer.grid_step(),
            loop_count: self.sequencer.loop_count(),
            beat: self.sequencer.beat(),
        }
    }

    /// Substitute a track's live pattern for its song-mode clips.
    pub fn set_live_overlay(&mut self, track: TrackId, on: bool) {
        self.sequencer.set_live_overlay(track, on);
    }

    // === External clock ===

    pub fn set_external_clock(&mut self, enabled: bool) {
        self.sequencer.set_external_clock(enabled);
    }

    /// One external timing pulse (24 per quarter note).
    pub fn clock_pulse(&mut self) {
        let now = self.clock_seconds();
        self.sequencer.clock_pulse(now, &self.project, &mut self.trig);
    }

    pub fn clock_start(&mut self) {
        let now = self.clock_seconds();
        self.trig.reset();
        self.sequencer.clock_start(now);
        self.next_tick = now;
    }

    pub fn clock_stop(&mut self) {
        self.stop();
    }

    // === Maintenance ===

    /// Reclaim sweep: drop voices past their stop time.
    pub fn cleanup_voices(&mut self) {
        let now = self.clock_seconds();
        self.pool.reap(now);
    }

    /// Clear all trigger history (fire counts, flags, loop memory).
    pub fn reset_trigger_states(&mut self) {
        self.trig.reset();
    }

    /// Voices counting toward the pool cap.
    pub fn live_voices(&self) -> usize {
        self.pool.live_count()
    }

    /// All pooled voices, stolen fading ones included.
    pub fn total_voices(&self) -> usize {
        self.pool.len()
    }

    // === Triggering ===

    /// Fire one step on a track at an absolute clock time. Steps on
    /// tracks without a strip slot are dropped.
    pub fn play_step(&mut self, track: TrackId, step: &Step, at: f64, loop_time: f32) {
        self.noise_seed = self.noise_seed.wrapping_add(SEED_STRIDE);
        let info = FireInfo {
            at,
            loop_time,
            span_steps: step.duration.max(1),
            tempo: self.project.tempo,
            sample_rate: self.sample_rate,
            seed: self.noise_seed,
        };
        let Engine { project, strips, shapes, pool, midi, master, .. } = self;
        let Some(track_ref) = project.track(track) else {
            return;
        };
        let idx = track.0 as usize;
        if idx >= MAX_TRACKS || strips[idx].is_none() {
            return;
        }
        let fired = fire_step(track_ref, step, &info, shapes, pool, midi);
        if fired && project.sidechain_source == Some(track) {
            master.duck(duck_depth(&project.compressor, step.velocity));
        }
    }

    /// Audition a single note on a track right now, outside the grid.
    pub fn play_note(&mut self, track: TrackId, note: &str, velocity: f32) {
        let now = self.clock_seconds();
        let loop_time =
            (self.sequencer.grid_step() as f64 * step_seconds(self.project.tempo)) as f32;
        let mut step = Step::on(velocity);
        step.push_note(note);
        self.play_step(track, &step, now, loop_time);
    }

    /// Resolve a scheduled row against the project and fire it.
    fn dispatch_step(&mut self, ev: StepEvent) {
        self.noise_seed = self.noise_seed.wrapping_add(SEED_STRIDE);
        let seed = self.noise_seed;
        let Engine { project, strips, shapes, pool, midi, master, sample_rate, .. } = self;
        let Some(track) = project.track(ev.track) else {
            return;
        };
        let idx = ev.track.0 as usize;
        if idx >= MAX_TRACKS || strips[idx].is_none() {
            return;
        }
        let Some(pattern) = track.patterns.get(ev.pattern) else {
            return;
        };
        let Some(step) = pattern.steps.get(ev.step) else {
            return;
        };
        // Gates never wrap: a duration past the pattern end stops at
        // the boundary.
        let remaining = pattern.len.max(1).saturating_sub(ev.step).max(1);
        let span = (step.duration.max(1) as usize).min(remaining) as u16;
        let info = FireInfo {
            at: ev.time,
            loop_time: ev.loop_time,
            span_steps: span,
            tempo: project.tempo,
            sample_rate: *sample_rate,
            seed,
        };
        let fired = fire_step(track, step, &info, shapes, pool, midi);
        if fired && project.sidechain_source == Some(ev.track) {
            master.duck(duck_depth(&project.compressor, step.velocity));
        }
    }

    // === Rendering ===

    /// Generate one frame of audio. Runs the scheduling tick when the
    /// sample clock crosses the next 25ms boundary, commits due rows,
    /// then mixes voices through strips, buses and the master chain.
    pub fn render_frame(&mut self) -> Frame {
        let now = self.clock_seconds();
        if now >= self.next_tick {
            self.sequencer.tick(now, &self.project, &mut self.trig);
            self.pool.reap(now);
            while self.next_tick <= now {
                self.next_tick += TICK_SECONDS;
            }
        }
        while let Some(ev) = self.sequencer.pop_due(now) {
            self.dispatch_step(ev);
        }

        let mut track_l = [0.0f32; MAX_TRACKS];
        let mut track_r = [0.0f32; MAX_TRACKS];
        let mut rev_in = 0.0f32;
        let mut del_in = 0.0f32;
        let mut drv_in = 0.0f32;
        for (_, voice) in self.pool.iter_mut() {
            let s = voice.render();
            let sends = voice.graph.sends();
            rev_in += s * sends.reverb;
            del_in += s * sends.delay;
            drv_in += s * sends.drive;
            let idx = voice.track.0 as usize;
            if idx < MAX_TRACKS {
                let angle = (voice.graph.pan() + 1.0) * core::f32::consts::FRAC_PI_4;
                track_l[idx] += s * angle.cos();
                track_r[idx] += s * angle.sin();
            }
        }

        let mut pre_l = 0.0f32;
        let mut pre_r = 0.0f32;
        for (idx, slot) in self.strips.iter_mut().enumerate() {
            if let Some(strip) = slot {
                let (l, r) = strip.process_stereo(track_l[idx], track_r[idx]);
                pre_l += l;
                pre_r += r;
            }
        }
        let (rl, rr) = self.reverb.process(rev_in);
        let (dl, dr) = self.delay.process(del_in);
        let (vl, vr) = self.drive.process(drv_in);
        pre_l += rl + dl + vl;
        pre_r += rr + dr + vr;

        let (left, right) = self.master.process(pre_l, pre_r);
        self.frames += 1;
        Frame { left, right }
    }

    // === Meters and MIDI ===

    pub fn meters(&self) -> MeterSnapshot {
        let mut tracks = [0.0f32; MAX_TRACKS];
        for (i, slot) in self.strips.iter().enumerate() {
            if let Some(strip) = slot {
                tracks[i] = strip.meter_level();
            }
        }
        MeterSnapshot { tracks, master: self.master.meter_level() }
    }

    /// Move every MIDI event due by the current frame into `out`.
    pub fn drain_midi(&mut self, out: &mut Vec<MidiEvent>) {
        self.midi.drain_due(self.frames, out);
    }

    fn broadcast_all_notes_off(&mut self) {
        let frame = self.frames;
        let Engine { project, midi, .. } = self;
        let mut sent = [false; 16];
        for track in &project.tracks {
            if track.archetype != Archetype::Midi {
                continue;
            }
            let ch = track.midi_channel as usize;
            if ch < 16 && !sent[ch] {
                sent[ch] = true;
                if let Some(ev) = MidiEvent::all_notes_off(frame, track.midi_channel) {
                    midi.push(ev);
                }
            }
        }
    }

    // === Live setters ===

    pub fn set_tempo(&mut self, tempo: f32) {
        if !tempo.is_finite() {
            return;
        }
        self.project.tempo = tempo.clamp(20.0, 999.0);
        // Tempo-synced bus times move with the grid.
        self.reverb.set_config(&self.project.reverb, self.project.tempo);
        self.delay.set_config(&self.project.delay, self.project.tempo);
    }

    pub fn set_swing(&mut self, swing: f32) {
        if swing.is_finite() {
            self.project.swing = swing.clamp(0.0, 0.6);
        }
    }

    pub fn set_track_volume(&mut self, track: TrackId, volume: f32) {
        if let Some(t) = self.project.track_mut(track) {
            t.strip.volume = volume.clamp(0.0, 1.5);
        }
        if let Some(strip) = self.strip_mut(track) {
            strip.set_volume(volume);
        }
    }

    pub fn set_track_pan(&mut self, track: TrackId, pan: f32) {
        if let Some(t) = self.project.track_mut(track) {
            t.strip.pan = pan.clamp(-1.0, 1.0);
        }
        if let Some(strip) = self.strip_mut(track) {
            strip.set_pan(pan);
        }
    }

    /// Update a track's send levels. Applies from the next trigger on;
    /// live voices keep the snapshot they were built with.
    pub fn set_track_send(&mut self, track: TrackId, sends: SendLevels) {
        if let Some(t) = self.project.track_mut(track) {
            t.strip.send_reverb = sends.reverb.clamp(0.0, 1.0);
            t.strip.send_delay = sends.delay.clamp(0.0, 1.0);
            t.strip.send_drive = sends.drive.clamp(0.0, 1.0);
        }
    }

    pub fn set_muted(&mut self, track: TrackId, muted: bool) {
        if let Some(t) = self.project.track_mut(track) {
            t.strip.muted = muted;
        }
    }

    pub fn set_solo(&mut self, solo: Option<TrackId>) {
        self.project.solo = solo;
    }

    pub fn set_active_pattern(&mut self, track: TrackId, index: usize) {
        if let Some(t) = self.project.track_mut(track) {
            if index < t.patterns.len() {
                t.active_pattern = index;
            }
        }
    }

    pub fn set_midi_channel(&mut self, track: TrackId, channel: u8) {
        if let Some(t) = self.project.track_mut(track) {
            t.midi_channel = channel;
        }
    }

    pub fn set_sidechain_source(&mut self, track: Option<TrackId>) {
        self.project.sidechain_source = track;
    }

    pub fn set_reverb(&mut self, config: ReverbConfig) {
        self.reverb.set_config(&config, self.project.tempo);
        self.project.reverb = config;
    }

    pub fn set_delay(&mut self, config: DelayConfig) {
        self.delay.set_config(&config, self.project.tempo);
        self.project.delay = config;
    }

    pub fn set_drive(&mut self, config: DriveConfig) {
        self.drive.set_config(&config, &mut self.shapes);
        self.project.drive = config;
    }

    pub fn set_character(&mut self, config: CharacterConfig) {
        self.master.set_character(&config, &mut self.shapes);
        self.project.character = config;
    }

    pub fn set_compressor(&mut self, config: CompressorConfig) {
        self.master.set_compressor(&config);
        self.project.compressor = config;
    }

    pub fn set_master_filter(&mut self, config: MasterFilterConfig) {
        self.master.set_filter(&config);
        self.project.master_filter = config;
    }

    pub fn set_master_volume(&mut self, volume: f32) {
        self.master.set_volume(volume);
        self.project.master_volume = volume.clamp(0.0, 1.5);
    }

    fn strip_mut(&mut self, track: TrackId) -> Option<&mut StripState> {
        let idx = track.0 as usize;
        if idx < MAX_TRACKS {
            self.strips[idx].as_mut()
        } else {
            None
        }
    }
}

/// Fire one step: build a voice per note (or queue MIDI bytes for the
/// passthrough archetype). Returns whether anything fired.
fn fire_step(
    track: &Track,
    step: &Step,
    info: &FireInfo,
    shapes: &mut ShapeCache,
    pool: &mut VoicePool,
    midi: &mut MidiQueue,
) -> bool {
    if track.archetype == Archetype::Midi {
        return queue_midi_step(track, step, info, midi);
    }

    let mut freqs = ArrayVec::<f32, MAX_STEP_NOTES>::new();
    if track.archetype.is_melodic() {
        for note in &step.notes {
            if let Some(f) = note_to_freq(note) {
                let _ = freqs.try_push(f);
            }
        }
    }
    if freqs.is_empty() {
        // Drum voices ignore pitch; melodic steps with no parseable
        // note fall back to A3.
        freqs.push(FALLBACK_FREQ);
    }

    let mut fired = false;
    for (i, freq) in freqs.iter().enumerate() {
        let ctx = BuildCtx {
            track,
            locks: step.locks.as_ref(),
            loop_time: info.loop_time,
            tempo: info.tempo,
            sample_rate: info.sample_rate,
            note_freq: *freq,
            velocity: step.velocity,
            noise_seed: info.seed.wrapping_add(i as u64),
        };
        let Some(built) = build_voice(track.archetype, &ctx, shapes) else {
            continue;
        };
        let mut graph = built.graph;
        graph.set_sends(SendLevels {
            reverb: ctx.num("send.reverb", track.strip.send_reverb).clamp(0.0, 1.0),
            delay: ctx.num("send.delay", track.strip.send_delay).clamp(0.0, 1.0),
            drive: ctx.num("send.drive", track.strip.send_drive).clamp(0.0, 1.0),
        });
        pool.insert(track.id, graph, info.at, info.at + built.stop_seconds as f64);
        fired = true;
    }
    fired
}

/// Queue note-on/off pairs for a fired step on a MIDI track. Notes
/// that fail to parse and out-of-range channels drop silently.
fn queue_midi_step(track: &Track, step: &Step, info: &FireInfo, midi: &mut MidiQueue) -> bool {
    let on_frame = seconds_to_frame(info.at, info.sample_rate);
    let gate = info.span_steps as f64 * step_seconds(info.tempo);
    let off_frame = on_frame + (gate * info.sample_rate as f64).round().max(1.0) as u64;
    let mut queued = false;
    for note in &step.notes {
        let Some(key) = note_to_midi(note) else {
            continue;
        };
        let Some(on) = MidiEvent::note_on(on_frame, track.midi_channel, key, step.velocity) else {
            continue;
        };
        let Some(off) = MidiEvent::note_off(off_frame, track.midi_channel, key) else {
            continue;
        };
        midi.push(on);
        midi.push(off);
        queued = true;
    }
    queued
}

fn seconds_to_frame(seconds: f64, sample_rate: f32) -> u64 {
    (seconds.max(0.0) * sample_rate as f64).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: u32 = 48_000;

    fn render_seconds(engine: &mut Engine, seconds: f64) -> f32 {
        let frames = (seconds * SR as f64) as usize;
        let mut peak = 0.0f32;
        for _ in 0..frames {
            let frame = engine.render_frame();
            assert!(frame.left.is_finite() && frame.right.is_finite());
            peak = peak.max(frame.peak());
        }
        peak
    }

    fn one_step_project(archetype: Archetype) -> Project {
        let mut project = Project::default();
        let mut track = Track::new(TrackId(0), archetype);
        if let Some(p) = track.pattern_mut() {
            *p.step_mut(0) = Step::on(1.0);
        }
        project.tracks.push(track);
        project
    }

    // === Rendering ===

    #[test]
    fn idle_engine_renders_silence() {
        let mut engine = Engine::with_seed(Project::demo(), SR, 1);
        for _ in 0..256 {
            assert_eq!(engine.render_frame(), Frame::silence());
        }
    }

    #[test]
    fn demo_project_renders_audio() {
        let mut engine = Engine::with_seed(Project::demo(), SR, 1);
        engine.play();
        let peak = render_seconds(&mut engine, 1.0);
        assert!(peak > 0.05, "demo peaked at {}", peak);
        assert!(peak <= 1.0, "master limiter breached: {}", peak);
    }

    #[test]
    fn first_row_fires_on_the_first_frame() {
        // Demo step 0 has the kick and the bass; both should be live
        // after a single frame.
        let mut engine = Engine::with_seed(Project::demo(), SR, 1);
        engine.play();
        engine.render_frame();
        assert_eq!(engine.live_voices(), 2);
    }

    #[test]
    fn stop_lets_voices_ring_then_reaps_them() {
        let mut engine = Engine::with_seed(Project::demo(), SR, 1);
        engine.play();
        render_seconds(&mut engine, 0.2);
        engine.stop();
        assert!(engine.live_voices() > 0);
        assert!(!engine.is_playing());
        render_seconds(&mut engine, 3.0);
        assert_eq!(engine.live_voices(), 0);
    }

    #[test]
    fn stop_all_silences_immediately_and_is_idempotent() {
        let mut engine = Engine::with_seed(Project::demo(), SR, 1);
        engine.play();
        render_seconds(&mut engine, 0.3);
        engine.stop_all();
        assert_eq!(engine.live_voices(), 0);
        let peak = render_seconds(&mut engine, 0.1);
        assert!(peak < 1e-6, "residual audio after stop_all: {}", peak);
        engine.stop_all();
        assert_eq!(engine.live_voices(), 0);
    }

    #[test]
    fn position_tracks_the_grid() {
        let mut project = one_step_project(Archetype::Kick);
        project.tempo = 480.0;
        let mut engine = Engine::with_seed(project, SR, 1);
        assert_eq!(engine.position(), Position::default());
        engine.play();
        // At 480 BPM a step is 31.25ms; half a second covers 16 steps.
        render_seconds(&mut engine, 0.5);
        let pos = engine.position();
        assert!(pos.step >= 8, "step {}", pos.step);
        assert!(pos.beat > 1.0);
    }

    #[test]
    fn meters_follow_playback() {
        let mut engine = Engine::with_seed(Project::demo(), SR, 1);
        engine.play();
        render_seconds(&mut engine, 0.5);
        let meters = engine.meters();
        assert!(meters.tracks[0] > 0.01, "kick meter {}", meters.tracks[0]);
        assert!(meters.master > 0.01, "master meter {}", meters.master);
        assert_eq!(meters.tracks[5], 0.0);
    }

    // === Strip gating ===

    #[test]
    fn track_without_strip_slot_never_sounds() {
        let mut project = Project::default();
        let mut track = Track::new(TrackId(99), Archetype::Kick);
        if let Some(p) = track.pattern_mut() {
            *p.step_mut(0) = Step::on(1.0);
        }
        project.tracks.push(track);
        let mut engine = Engine::with_seed(project, SR, 1);
        engine.play();
        render_seconds(&mut engine, 0.2);
        assert_eq!(engine.live_voices(), 0);
        engine.play_note(TrackId(99), "C3", 1.0);
        assert_eq!(engine.live_voices(), 0);
    }

    #[test]
    fn unknown_track_is_ignored() {
        let mut engine = Engine::with_seed(Project::demo(), SR, 1);
        engine.play_note(TrackId(7), "C3", 1.0);
        assert_eq!(engine.live_voices(), 0);
    }

    // === Audition ===

    #[test]
    fn play_note_builds_a_voice_while_stopped() {
        let mut engine = Engine::with_seed(Project::demo(), SR, 1);
        engine.play_note(TrackId(2), "A2", 0.9);
        assert_eq!(engine.live_voices(), 1);
        let peak = render_seconds(&mut engine, 0.1);
        assert!(peak > 1e-4, "audition was silent: {}", peak);
    }

    // === MIDI ===

    fn midi_project(duration: u16) -> Project {
        let mut project = Project::default();
        project.tempo = 120.0;
        let mut track = Track::new(TrackId(0), Archetype::Midi);
        track.midi_channel = 3;
        if let Some(p) = track.pattern_mut() {
            *p.step_mut(0) = Step::with_note("C3", 1.0);
            p.step_mut(0).duration = duration;
        }
        project.tracks.push(track);
        project
    }

    #[test]
    fn midi_step_emits_note_on_and_off() {
        let mut engine = Engine::with_seed(midi_project(2), SR, 1);
        engine.play();
        // Two steps at 120 BPM is 0.25s; render past the note-off.
        render_seconds(&mut engine, 0.3);
        let mut out = Vec::new();
        engine.drain_midi(&mut out);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].status(), 0x90);
        assert_eq!(out[0].channel(), 3);
        assert_eq!(out[0].data[1], 48);
        assert_eq!(out[1].status(), 0x80);
        let gate = out[1].frame - out[0].frame;
        let expected = (2.0 * 0.125 * SR as f64) as u64;
        assert!(gate.abs_diff(expected) <= 1, "gate {} vs {}", gate, expected);
    }

    #[test]
    fn midi_gate_truncates_at_the_pattern_end() {
        // Step 0 of a 16-step pattern with duration 99 gates for 16.
        let mut engine = Engine::with_seed(midi_project(99), SR, 1);
        engine.play();
        render_seconds(&mut engine, 2.2);
        let mut out = Vec::new();
        engine.drain_midi(&mut out);
        assert!(out.len() >= 2);
        let gate = out[1].frame - out[0].frame;
        let expected = (16.0 * 0.125 * SR as f64) as u64;
        assert!(gate.abs_diff(expected) <= 1, "gate {} vs {}", gate, expected);
    }

    #[test]
    fn stop_sends_all_notes_off() {
        let mut engine = Engine::with_seed(midi_project(8), SR, 1);
        engine.play();
        render_seconds(&mut engine, 0.05);
        let mut out = Vec::new();
        engine.drain_midi(&mut out);
        out.clear();
        engine.stop();
        engine.drain_midi(&mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].data, [0xB3, 123, 0]);
        // The pending note-off was cancelled along with the queue.
        render_seconds(&mut engine, 1.5);
        out.clear();
        engine.drain_midi(&mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn out_of_range_midi_channel_drops_steps() {
        let mut project = midi_project(1);
        project.tracks[0].midi_channel = 16;
        let mut engine = Engine::with_seed(project, SR, 1);
        engine.play();
        render_seconds(&mut engine, 0.3);
        let mut out = Vec::new();
        engine.drain_midi(&mut out);
        assert!(out.is_empty());
    }

    // === External clock ===

    #[test]
    fn clock_pulses_step_the_grid() {
        let project = one_step_project(Archetype::Kick);
        let mut engine = Engine::with_seed(project, SR, 1);
        engine.set_external_clock(true);
        engine.clock_start();
        engine.clock_pulse();
        engine.render_frame();
        assert_eq!(engine.live_voices(), 1);
        // Five more pulses complete the first step; nothing new fires
        // until the next step-0 wrap.
        for _ in 0..5 {
            engine.clock_pulse();
        }
        engine.render_frame();
        assert_eq!(engine.live_voices(), 1);
    }

    // === Setters ===

    #[test]
    fn set_track_volume_updates_project_and_strip() {
        let mut engine = Engine::with_seed(Project::demo(), SR, 1);
        engine.set_track_volume(TrackId(0), 0.25);
        let volume = engine.project().track(TrackId(0)).map(|t| t.strip.volume);
        assert_eq!(volume, Some(0.25));
        // Out-of-range ids are harmless.
        engine.set_track_volume(TrackId(42), 1.0);
    }

    #[test]
    fn set_tempo_clamps_and_ignores_nan() {
        let mut engine = Engine::with_seed(Project::demo(), SR, 1);
        engine.set_tempo(f32::NAN);
        assert_eq!(engine.project().tempo, 132.0);
        engine.set_tempo(5.0);
        assert_eq!(engine.project().tempo, 20.0);
        engine.set_tempo(174.0);
        assert_eq!(engine.project().tempo, 174.0);
    }

    #[test]
    fn set_project_rebuilds_strips() {
        let mut engine = Engine::with_seed(Project::demo(), SR, 1);
        engine.play();
        render_seconds(&mut engine, 0.1);
        let mut next = Project::default();
        next.tracks.push(Track::new(TrackId(5), Archetype::Hat));
        engine.set_project(next);
        assert_eq!(engine.live_voices(), 0);
        engine.play_note(TrackId(5), "C3", 1.0);
        assert_eq!(engine.live_voices(), 1);
        engine.play_note(TrackId(0), "C3", 1.0);
        assert_eq!(engine.live_voices(), 1);
    }

    #[test]
    fn muted_track_stays_silent() {
        let mut project = one_step_project(Archetype::Kick);
        project.tracks[0].strip.muted = true;
        let mut engine = Engine::with_seed(project, SR, 1);
        engine.play();
        render_seconds(&mut engine, 0.3);
        assert_eq!(engine.live_voices(), 0);
    }

    // === Sidechain ===

    #[test]
    fn duck_depth_shape() {
        let mut config = CompressorConfig::default();
        config.threshold_db = -30.0;
        config.ratio = 1.0;
        assert_eq!(duck_depth(&config, 1.0), 0.0);
        config.ratio = 4.0;
        let full = duck_depth(&config, 1.0);
        assert!((full - 0.375).abs() < 1e-6, "depth {}", full);
        let half = duck_depth(&config, 0.5);
        assert!((half - full * 0.5).abs() < 1e-6);
        config.ratio = 20.0;
        assert!(duck_depth(&config, 1.0) > full);
        config.threshold_db = f32::NAN;
        assert!(duck_depth(&config, 1.0).is_finite());
    }

    // === Clock conversions ===

    #[test]
    fn frame_second_round_trip() {
        let engine = Engine::with_seed(Project::demo(), SR, 1);
        assert_eq!(engine.seconds_to_frames(1.0), SR as u64);
        assert!((engine.frames_to_seconds(SR as u64) - 1.0).abs() < 1e-12);
        assert_eq!(engine.seconds_to_frames(-5.0), 0);
    }
}
