//! Headless session controller for the kiln drum machine.
//!
//! Provides a unified API for owning a project, realtime playback and
//! offline rendering that a UI and the CLI can share. Playback runs an
//! [`Engine`] on a dedicated thread paced by the audio device; live
//! edits travel to it as [`SessionCommand`]s over a bounded channel
//! and are mirrored into the session's own project copy so the next
//! playback starts from the same state.

mod wav;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Receiver, Sender};

use kiln_audio::{AudioOutput, CpalOutput};
use kiln_engine::Engine;
use kiln_model::{NoteName, Project, TrackId};

// Re-export common types so callers don't need kiln-engine directly.
pub use kiln_engine::{Frame, MidiEvent, PlayMode, Position, SendLevels};
pub use kiln_model::{
    CharacterConfig, CompressorConfig, DelayConfig, DriveConfig, MasterFilterConfig, ReverbConfig,
};

pub use wav::{frames_to_wav, write_wav};

/// In-flight capacity for live edits and outbound MIDI. Both channels
/// preallocate, so the audio thread never allocates when using them.
const COMMAND_CAP: usize = 256;
const MIDI_CAP: usize = 256;

/// Seed for offline rendering, so bounces are reproducible.
const RENDER_SEED: u64 = 0x4B49_4C4E;

/// A live edit applied to the running engine and to the session's
/// project copy.
#[derive(Clone, Copy, Debug)]
pub enum SessionCommand {
    SetTempo(f32),
    SetSwing(f32),
    SetTrackVolume(TrackId, f32),
    SetTrackPan(TrackId, f32),
    SetTrackSend(TrackId, SendLevels),
    SetMuted(TrackId, bool),
    SetSolo(Option<TrackId>),
    SetActivePattern(TrackId, usize),
    SetMidiChannel(TrackId, u8),
    SetSidechainSource(Option<TrackId>),
    SetReverb(ReverbConfig),
    SetDelay(DelayConfig),
    SetDrive(DriveConfig),
    SetCharacter(CharacterConfig),
    SetCompressor(CompressorConfig),
    SetMasterFilter(MasterFilterConfig),
    SetMasterVolume(f32),
    SetMode(PlayMode),
    SetLiveOverlay(TrackId, bool),
    SetExternalClock(bool),
    ClockStart,
    ClockStop,
    ClockPulse,
    /// Audition a note outside the grid.
    PlayNote(TrackId, NoteName, f32),
}

/// Session controller — owns a project and manages playback.
pub struct Session {
    project: Project,
    playback: Option<PlaybackHandle>,
}

struct PlaybackHandle {
    stop_signal: Arc<AtomicBool>,
    position_bits: Arc<AtomicU64>,
    finished: Arc<AtomicBool>,
    commands: Sender<SessionCommand>,
    midi: Receiver<MidiEvent>,
    thread: Option<JoinHandle<()>>,
}

impl Session {
    pub fn new(project: Project) -> Self {
        Self { project, playback: None }
    }

    // --- Project management ---

    pub fn project(&self) -> &Project {
        &self.project
    }

    /// Replace the project wholesale, as on load. Stops playback.
    pub fn set_project(&mut self, project: Project) {
        self.stop();
        self.project = project;
    }

    // --- Real-time playback ---

    /// Start playback on a fresh audio thread. A running playback is
    /// stopped and joined first.
    pub fn play(&mut self) {
        self.stop();

        let project = self.project.clone();
        let stop_signal = Arc::new(AtomicBool::new(false));
        let position_bits = Arc::new(AtomicU64::new(0));
        let finished = Arc::new(AtomicBool::new(false));
        let (command_tx, command_rx) = bounded(COMMAND_CAP);
        let (midi_tx, midi_rx) = bounded(MIDI_CAP);

        let stop = stop_signal.clone();
        let position = position_bits.clone();
        let done = finished.clone();

        let thread = std::thread::spawn(move || {
            audio_thread(project, stop, position, done, command_rx, midi_tx);
        });

        self.playback = Some(PlaybackHandle {
            stop_signal,
            position_bits,
            finished,
            commands: command_tx,
            midi: midi_rx,
            thread: Some(thread),
        });
    }

    pub fn stop(&mut self) {
        if let Some(mut pb) = self.playback.take() {
            pb.stop_signal.store(true, Ordering::Relaxed);
            if let Some(handle) = pb.thread.take() {
                let _ = handle.join();
            }
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playback
            .as_ref()
            .is_some_and(|p| !p.finished.load(Ordering::Relaxed))
    }

    /// Transport position, or `None` when nothing is playing.
    pub fn position(&self) -> Option<Position> {
        let pb = self.playback.as_ref()?;
        if pb.finished.load(Ordering::Relaxed) {
            return None;
        }
        Some(unpack_position(pb.position_bits.load(Ordering::Relaxed)))
    }

    /// Apply a live edit: mirrored into the session's project and
    /// forwarded to the running engine, if any.
    pub fn send(&mut self, command: SessionCommand) {
        apply_to_project(&mut self.project, &command);
        if let Some(pb) = &self.playback {
            let _ = pb.commands.send(command);
        }
    }

    /// Audition a note on a track right now.
    pub fn play_note(&mut self, track: TrackId, note: &str, velocity: f32) {
        let mut name = NoteName::new();
        let _ = name.try_push_str(note);
        self.send(SessionCommand::PlayNote(track, name, velocity));
    }

    /// MIDI bytes emitted since the last call, in frame order.
    pub fn drain_midi(&mut self, out: &mut Vec<MidiEvent>) {
        if let Some(pb) = &self.playback {
            while let Ok(ev) = pb.midi.try_recv() {
                out.push(ev);
            }
        }
    }

    // --- Offline rendering ---

    /// Render the project from the top for exactly `max_frames`,
    /// without touching an audio device. Deterministic for a given
    /// project.
    pub fn render_frames(&self, sample_rate: u32, max_frames: usize) -> Vec<Frame> {
        let mut engine = Engine::with_seed(self.project.clone(), sample_rate, RENDER_SEED);
        engine.play();
        let mut frames = Vec::with_capacity(max_frames);
        for _ in 0..max_frames {
            frames.push(engine.render_frame());
        }
        frames
    }

    pub fn render_to_wav(&self, sample_rate: u32, max_seconds: u32) -> Vec<u8> {
        let max_frames = (sample_rate * max_seconds) as usize;
        let frames = self.render_frames(sample_rate, max_frames);
        wav::frames_to_wav(&frames, sample_rate)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop();
    }
}

fn audio_thread(
    project: Project,
    stop_signal: Arc<AtomicBool>,
    position_bits: Arc<AtomicU64>,
    finished: Arc<AtomicBool>,
    commands: Receiver<SessionCommand>,
    midi: Sender<MidiEvent>,
) {
    let Ok((mut output, consumer)) = CpalOutput::new() else {
        finished.store(true, Ordering::Relaxed);
        return;
    };

    let sample_rate = output.sample_rate();
    let mut engine = Engine::new(project, sample_rate);
    engine.play();

    if output.build_stream(consumer).is_err() {
        finished.store(true, Ordering::Relaxed);
        return;
    }
    let _ = output.start();

    // Mirror the position and flush MIDI every 10ms of audio.
    let tick_interval = (sample_rate / 100).max(1) as u64;
    let mut frame_count: u64 = 0;
    let mut midi_scratch: Vec<MidiEvent> = Vec::with_capacity(MIDI_CAP);

    while !stop_signal.load(Ordering::Relaxed) {
        while let Ok(command) = commands.try_recv() {
            apply_to_engine(&mut engine, command);
        }
        output.write_spin(engine.render_frame());
        frame_count += 1;
        if frame_count % tick_interval == 0 {
            position_bits.store(pack_position(engine.position()), Ordering::Relaxed);
            engine.drain_midi(&mut midi_scratch);
            for ev in midi_scratch.drain(..) {
                // Overflow drops, same policy as the engine queue.
                let _ = midi.try_send(ev);
            }
        }
    }

    // Cut the engine, then feed the device silence long enough to
    // drain what the ring buffer still holds.
    engine.stop_all();
    for _ in 0..sample_rate {
        output.write_spin(Frame::silence());
    }

    finished.store(true, Ordering::Relaxed);
}

fn apply_to_engine(engine: &mut Engine, command: SessionCommand) {
    match command {
        SessionCommand::SetTempo(t) => engine.set_tempo(t),
        SessionCommand::SetSwing(s) => engine.set_swing(s),
        SessionCommand::SetTrackVolume(track, v) => engine.set_track_volume(track, v),
        SessionCommand::SetTrackPan(track, p) => engine.set_track_pan(track, p),
        SessionCommand::SetTrackSend(track, sends) => engine.set_track_send(track, sends),
        SessionCommand::SetMuted(track, muted) => engine.set_muted(track, muted),
        SessionCommand::SetSolo(solo) => engine.set_solo(solo),
        SessionCommand::SetActivePattern(track, index) => engine.set_active_pattern(track, index),
        SessionCommand::SetMidiChannel(track, channel) => engine.set_midi_channel(track, channel),
        SessionCommand::SetSidechainSource(track) => engine.set_sidechain_source(track),
        SessionCommand::SetReverb(config) => engine.set_reverb(config),
        SessionCommand::SetDelay(config) => engine.set_delay(config),
        SessionCommand::SetDrive(config) => engine.set_drive(config),
        SessionCommand::SetCharacter(config) => engine.set_character(config),
        SessionCommand::SetCompressor(config) => engine.set_compressor(config),
        SessionCommand::SetMasterFilter(config) => engine.set_master_filter(config),
        SessionCommand::SetMasterVolume(v) => engine.set_master_volume(v),
        SessionCommand::SetMode(mode) => engine.set_mode(mode),
        SessionCommand::SetLiveOverlay(track, on) => engine.set_live_overlay(track, on),
        SessionCommand::SetExternalClock(on) => engine.set_external_clock(on),
        SessionCommand::ClockStart => engine.clock_start(),
        SessionCommand::ClockStop => engine.clock_stop(),
        SessionCommand::ClockPulse => engine.clock_pulse(),
        SessionCommand::PlayNote(track, note, velocity) => {
            engine.play_note(track, note.as_str(), velocity)
        }
    }
}

/// Mirror a command into a project so stopped sessions stay in sync
/// with what the engine would have stored. Transport and audition
/// commands carry no project state.
fn apply_to_project(project: &mut Project, command: &SessionCommand) {
    match *command {
        SessionCommand::SetTempo(t) => {
            if t.is_finite() {
                project.tempo = t.clamp(20.0, 999.0);
            }
        }
        SessionCommand::SetSwing(s) => {
            if s.is_finite() {
                project.swing = s.clamp(0.0, 0.6);
            }
        }
        SessionCommand::SetTrackVolume(track, v) => {
            if let Some(t) = project.track_mut(track) {
                t.strip.volume = v.clamp(0.0, 1.5);
            }
        }
        SessionCommand::SetTrackPan(track, p) => {
            if let Some(t) = project.track_mut(track) {
                t.strip.pan = p.clamp(-1.0, 1.0);
            }
        }
        SessionCommand::SetTrackSend(track, sends) => {
            if let Some(t) = project.track_mut(track) {
                t.strip.send_reverb = sends.reverb.clamp(0.0, 1.0);
                t.strip.send_delay = sends.delay.clamp(0.0, 1.0);
                t.strip.send_drive = sends.drive.clamp(0.0, 1.0);
            }
        }
        SessionCommand::SetMuted(track, muted) => {
            if let Some(t) = project.track_mut(track) {
                t.strip.muted = muted;
            }
        }
        SessionCommand::SetSolo(solo) => project.solo = solo,
        SessionCommand::SetActivePattern(track, index) => {
            if let Some(t) = project.track_mut(track) {
                if index < t.patterns.len() {
                    t.active_pattern = index;
                }
            }
        }
        SessionCommand::SetMidiChannel(track, channel) => {
            if let Some(t) = project.track_mut(track) {
                t.midi_channel = channel;
            }
        }
        SessionCommand::SetSidechainSource(track) => project.sidechain_source = track,
        SessionCommand::SetReverb(config) => project.reverb = config,
        SessionCommand::SetDelay(config) => project.delay = config,
        SessionCommand::SetDrive(config) => project.drive = config,
        SessionCommand::SetCharacter(config) => project.character = config,
        SessionCommand::SetCompressor(config) => project.compressor = config,
        SessionCommand::SetMasterFilter(config) => project.master_filter = config,
        SessionCommand::SetMasterVolume(v) => project.master_volume = v.clamp(0.0, 1.5),
        SessionCommand::SetMode(_)
        | SessionCommand::SetLiveOverlay(..)
        | SessionCommand::SetExternalClock(_)
        | SessionCommand::ClockStart
        | SessionCommand::ClockStop
        | SessionCommand::ClockPulse
        | SessionCommand::PlayNote(..) => {}
    }
}

fn pack_position(position: Position) -> u64 {
    (position.loop_count as u64) << 32 | position.step as u64
}

fn unpack_position(bits: u64) -> Position {
    let step = (bits & 0xFFFF_FFFF) as u32;
    let loop_count = (bits >> 32) as u32;
    let total_steps = loop_count as u64 * 64 + step as u64;
    Position { step, loop_count, beat: total_steps as f64 * 0.25 }
}
