//! Voice pool behavior at and past the polyphony ceiling.

use kiln_engine::{build_voice, BuildCtx, ShapeCache, VoiceGraph, VoicePool, MAX_VOICES};
use kiln_model::{Archetype, Track, TrackId};

const SR: f32 = 48_000.0;

fn kick_graph(shapes: &mut ShapeCache) -> VoiceGraph {
    let track = Track::new(TrackId(0), Archetype::Kick);
    let ctx = BuildCtx {
        track: &track,
        locks: None,
        loop_time: 0.0,
        tempo: 120.0,
        sample_rate: SR,
        note_freq: 220.0,
        velocity: 1.0,
        noise_seed: 1,
    };
    build_voice(Archetype::Kick, &ctx, shapes).unwrap().graph
}

#[test]
fn steal_targets_the_earliest_stop_time() {
    let mut shapes = ShapeCache::new();
    let mut pool = VoicePool::new(SR);
    let mut keys = Vec::new();
    for i in 0..MAX_VOICES {
        let stop = 1.0 + i as f64 * 0.1;
        keys.push(pool.insert(TrackId(0), kick_graph(&mut shapes), 0.0, stop));
    }
    assert_eq!(pool.live_count(), MAX_VOICES);

    pool.insert(TrackId(0), kick_graph(&mut shapes), 0.0, 100.0);
    assert_eq!(pool.live_count(), MAX_VOICES);
    assert_eq!(pool.len(), MAX_VOICES + 1);
    assert!(pool.get(keys[0]).unwrap().is_stolen());
    assert!(!pool.get(keys[1]).unwrap().is_stolen());
}

#[test]
fn stolen_voices_fade_to_zero_and_reap() {
    let mut shapes = ShapeCache::new();
    let mut pool = VoicePool::new(SR);
    let mut first = None;
    for i in 0..=MAX_VOICES {
        let key = pool.insert(TrackId(0), kick_graph(&mut shapes), 0.0, 5.0 + i as f64);
        first.get_or_insert(key);
    }
    let key = first.unwrap();
    assert!(pool.get(key).unwrap().is_stolen());

    // A 15ms fade at 48k is 720 frames; well past that the stolen
    // voice renders exact silence.
    let voice = pool.get_mut(key).unwrap();
    let mut last = 0.0f32;
    for _ in 0..2048 {
        last = voice.render();
    }
    assert_eq!(last, 0.0);

    // The corpse outlives the fade only until its removal horizon.
    pool.reap(0.01);
    assert_eq!(pool.len(), MAX_VOICES + 1);
    pool.reap(0.2);
    assert_eq!(pool.len(), MAX_VOICES);
    assert_eq!(pool.live_count(), MAX_VOICES);
}

#[test]
fn reap_drops_voices_past_their_stop_time() {
    let mut shapes = ShapeCache::new();
    let mut pool = VoicePool::new(SR);
    pool.insert(TrackId(0), kick_graph(&mut shapes), 0.0, 0.5);
    pool.insert(TrackId(1), kick_graph(&mut shapes), 0.0, 2.0);
    pool.reap(1.0);
    assert_eq!(pool.len(), 1);
    pool.reap(3.0);
    assert!(pool.is_empty());
}

#[test]
fn stop_all_clears_and_stays_clear() {
    let mut shapes = ShapeCache::new();
    let mut pool = VoicePool::new(SR);
    for _ in 0..8 {
        pool.insert(TrackId(0), kick_graph(&mut shapes), 0.0, 10.0);
    }
    pool.stop_all();
    assert!(pool.is_empty());
    assert_eq!(pool.live_count(), 0);
    pool.stop_all();
    assert!(pool.is_empty());
}
