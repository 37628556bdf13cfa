//! Realtime core of the kiln drum machine.
//!
//! The [`Engine`] owns everything that happens on the audio timeline:
//! the look-ahead step sequencer, trigger condition evaluation,
//! parameter resolution, per-note voice graphs, the voice pool, the
//! channel strips and effect buses, and the master chain. The owner
//! calls [`Engine::render_frame`] once per output frame; scheduling
//! ticks run inside that call whenever the audio clock crosses a tick
//! boundary, so the whole engine has a single exclusive owner.
//!
//! Nothing in here returns errors: malformed data degrades to safe
//! defaults or to silence, never to a halted scheduler.

mod dsp;
mod engine;
mod envelope;
mod fx;
mod master;
mod midi;
mod pool;
mod resolver;
mod sequencer;
mod shapes;
mod strip;
mod trig;
mod voices;

pub use dsp::{
    DspNode, FilterMode, LfoParam, LfoRoute, MixOp, OscShape, SendLevels, VoiceGraph, MAX_NODES,
};
pub use engine::{duck_depth, Engine, Frame, MeterSnapshot, Position, MAX_TRACKS};
pub use envelope::{DecayEnv, EnvSpec, GainEnv, ENV_FLOOR, MIN_ATTACK_SECONDS};
pub use fx::{DelayBus, DriveBus, ReverbBus};
pub use master::MasterChain;
pub use midi::{MidiEvent, MidiQueue};
pub use pool::{
    Voice, VoiceKey, VoicePool, MAX_VOICES, STEAL_FADE_SECONDS, STEAL_REMOVE_SECONDS,
};
pub use resolver::{resolve, resolve_choice, resolve_num};
pub use sequencer::{
    step_seconds, PlayMode, Sequencer, StepEvent, Transport, LATE_THRESHOLD_SECONDS,
    LOOKAHEAD_SECONDS, LOOP_STEPS, TICK_SECONDS,
};
pub use shapes::{shape_sample, wavetable_sample, ShapeCache, ShapeKey};
pub use strip::{Limiter, Meter, Smoothed, StripState};
pub use trig::TrigEngine;
pub use voices::{build_voice, BuildCtx, BuiltVoice};
