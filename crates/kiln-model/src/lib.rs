//! Project data model for the kiln drum machine.
//!
//! Everything in this crate is plain data: tracks, patterns, steps,
//! parameter bags, automation curves and the song arrangement. Editors
//! mutate these types and the playback engine consumes them; nothing
//! here owns any runtime state.
//!
//! Designed to be `no_std` compatible with the `alloc` crate.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod arrangement;
mod automation;
mod params;
mod pattern;
mod project;
mod track;
mod tuning;

pub use arrangement::{Arrangement, Clip};
pub use automation::{Curve, CurvePoint};
pub use params::{ParamBag, ParamPath, ParamValue, CHOICE_CAP, PATH_CAP};
pub use pattern::{
    NoteName, Pattern, Step, TrigCondition, MAX_PATTERN_STEPS, MAX_STEP_NOTES,
};
pub use project::{
    CharacterConfig, CharacterMode, CompressorConfig, DelayConfig, DriveConfig,
    MasterFilterConfig, Project, ReverbConfig,
};
pub use track::{Archetype, LfoSettings, LfoWave, StripSettings, Track, TrackId};
pub use tuning::{midi_to_freq, note_to_freq, note_to_midi, SyncDivision};
