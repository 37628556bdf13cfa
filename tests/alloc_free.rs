//! Allocation-free render path tests.
//!
//! These verify that `Engine::render_frame()` does not allocate once
//! playback is warmed up. Shape tables and per-track trigger state are
//! built lazily on first use, so each test renders a warm-up stretch
//! first, then keeps rendering inside the no-alloc window to catch
//! allocations from triggers, voice stealing, trig conditions, p-locks
//! and the bus chain.
//!
//! Runs under plain `cargo test`; no feature flags needed.

use assert_no_alloc::{assert_no_alloc, AllocDisabler};

#[cfg(debug_assertions)]
#[global_allocator]
static A: AllocDisabler = AllocDisabler;

use kiln_engine::Engine;
use kiln_model::{Archetype, ParamValue, Project, Step, Track, TrackId, TrigCondition};

const SR: u32 = 48_000;

/// Play `project`, render `warm_frames` to populate every lazy table,
/// then render `checked_frames` more, aborting on any heap allocation.
fn assert_render_alloc_free(project: Project, warm_frames: usize, checked_frames: usize) {
    let mut engine = Engine::with_seed(project, SR, 7);
    engine.play();
    for _ in 0..warm_frames {
        engine.render_frame();
    }

    assert_no_alloc(|| {
        for _ in 0..checked_frames {
            engine.render_frame();
        }
    });
}

#[test]
fn demo_project_renders_alloc_free() {
    // Every demo track fires within its first pattern pass (1.82s at
    // 132 BPM), so four seconds of warm-up covers all lazy growth.
    assert_render_alloc_free(Project::demo(), 4 * SR as usize, 5 * SR as usize);
}

#[test]
fn full_kit_with_conditions_renders_alloc_free() {
    // One track per synthesis archetype plus a MIDI track, all with an
    // unconditional downbeat so trigger state and shape tables exist
    // after one loop. The conditional and p-locked steps then run
    // inside the checked window. 480 BPM puts a full 64-step loop at
    // exactly two seconds.
    let mut project = Project::new();
    project.tempo = 480.0;

    let kit = [
        (Archetype::Kick, None),
        (Archetype::Hat, None),
        (Archetype::Arcane, Some("C3")),
        (Archetype::Ruin, None),
        (Archetype::Artifice, None),
        (Archetype::Shift, Some("E3")),
        (Archetype::Reson, Some("D4")),
        (Archetype::Alloy, Some("A2")),
        (Archetype::Midi, Some("C3")),
    ];
    for (i, (arch, note)) in kit.iter().enumerate() {
        let mut track = Track::new(TrackId(i as u32), *arch);
        if let Some(p) = track.pattern_mut() {
            *p.step_mut(0) = match note {
                Some(n) => Step::with_note(n, 0.9),
                None => Step::on(0.9),
            };
        }
        project.tracks.push(track);
    }

    let conditions = [
        (0, 4, TrigCondition::Probability(50)),
        (1, 8, TrigCondition::Cycle { a: 3, b: 4 }),
        (2, 12, TrigCondition::Pre),
        (3, 2, TrigCondition::First),
        (4, 6, TrigCondition::NotFirst),
        (5, 10, TrigCondition::NotPre),
    ];
    for (track, step, condition) in conditions {
        if let Some(p) = project.tracks[track].pattern_mut() {
            *p.step_mut(step) = Step::on(0.7);
            p.step_mut(step).condition = condition;
        }
    }

    // P-locked trigger on the bassline: envelope and send overrides
    // resolve per-fire inside the window.
    if let Some(p) = project.tracks[7].pattern_mut() {
        *p.step_mut(3) = Step::with_note("A1", 0.8);
        p.step_mut(3).set_lock("env.decay", ParamValue::Num(0.1));
        p.step_mut(3).set_lock("send.reverb", ParamValue::Num(0.4));
    }

    assert_render_alloc_free(project, 2 * SR as usize, 2 * SR as usize);
}

#[test]
fn voice_steal_pressure_renders_alloc_free() {
    // Four long-tail tracks firing on every step at 480 BPM push the
    // pool past its ceiling within the warm-up, so the checked window
    // renders under continuous stealing.
    let mut project = Project::new();
    project.tempo = 480.0;

    for i in 0..4u32 {
        let mut track = Track::new(TrackId(i), Archetype::Reson);
        if let Some(p) = track.pattern_mut() {
            for step in 0..16 {
                *p.step_mut(step) = Step::with_note("A3", 0.6);
            }
        }
        project.tracks.push(track);
    }

    assert_render_alloc_free(project, 2 * SR as usize, 2 * SR as usize);
}
