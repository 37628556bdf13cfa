//! Master bus chain.
//!
//! The pre-master sum passes through, in order: the sidechain duck
//! gain, the sweepable master filter, the character waveshaper, the
//! compressor, makeup gain, master volume and a final linked-stereo
//! limiter. Everything is a setter-driven insert; the engine forwards
//! the matching config structs when the host changes them.

use std::sync::Arc;

use biquad::{Biquad, Coefficients, DirectForm2Transposed, ToHertz};
use kiln_model::{CharacterConfig, CompressorConfig, MasterFilterConfig};

use crate::shapes::{shape_sample, ShapeCache, ShapeKey};
use crate::strip::{Limiter, Meter, Smoothed, SMOOTH_SECONDS};

/// Filter positions inside this band around center leave the filter
/// out of the chain entirely.
const FILTER_DEAD_BAND: f32 = 0.05;
/// Sidechain duck recovery time constant.
const DUCK_RECOVERY_SECONDS: f32 = 0.25;

/// Shared ducking gain: dips instantly on trigger, recovers
/// exponentially toward unity.
#[derive(Clone, Copy, Debug)]
struct Duck {
    gain: f32,
    recovery: f32,
}

impl Duck {
    fn new(sample_rate: f32) -> Self {
        Self { gain: 1.0, recovery: (-1.0 / (DUCK_RECOVERY_SECONDS * sample_rate)).exp() }
    }

    /// Deepen the dip; an already-deeper dip wins.
    fn trigger(&mut self, depth: f32) {
        self.gain = self.gain.min(1.0 - depth.clamp(0.0, 1.0));
    }

    fn next(&mut self) -> f32 {
        self.gain = 1.0 + (self.gain - 1.0) * self.recovery;
        self.gain
    }

    fn reset(&mut self) {
        self.gain = 1.0;
    }
}

/// dB-domain compressor gain computer.
#[derive(Clone, Copy, Debug)]
struct Compressor {
    env_db: f32,
    attack: f32,
    release: f32,
    threshold_db: f32,
    ratio: f32,
}

impl Compressor {
    const FLOOR_DB: f32 = -96.0;

    fn new(sample_rate: f32) -> Self {
        let mut comp = Self {
            env_db: Self::FLOOR_DB,
            attack: 0.0,
            release: 0.0,
            threshold_db: -18.0,
            ratio: 4.0,
        };
        comp.configure(&CompressorConfig::default(), sample_rate);
        comp
    }

    fn configure(&mut self, config: &CompressorConfig, sample_rate: f32) {
        let attack =
            if config.attack.is_finite() { config.attack.clamp(0.0005, 0.5) } else { 0.01 };
        let release =
            if config.release.is_finite() { config.release.clamp(0.01, 2.0) } else { 0.18 };
        self.attack = (-1.0 / (attack * sample_rate)).exp();
        self.release = (-1.0 / (release * sample_rate)).exp();
        self.threshold_db =
            if config.threshold_db.is_finite() { config.threshold_db.clamp(-60.0, 0.0) } else { -18.0 };
        self.ratio = if config.ratio.is_finite() { config.ratio.clamp(1.0, 20.0) } else { 4.0 };
    }

    /// Gain for the current peak level, linked across channels.
    fn gain(&mut self, level: f32) -> f32 {
        let level_db = 20.0 * level.max(1e-5).log10();
        let coeff = if level_db > self.env_db { self.attack } else { self.release };
        self.env_db = level_db + (self.env_db - level_db) * coeff;
        let over = (self.env_db - self.threshold_db).max(0.0);
        let reduction_db = over * (1.0 - 1.0 / self.ratio);
        10f32.powf(-reduction_db / 20.0)
    }

    fn reset(&mut self) {
        self.env_db = Self::FLOOR_DB;
    }
}

pub struct MasterChain {
    filter_l: DirectForm2Transposed<f32>,
    filter_r: DirectForm2Transposed<f32>,
    filter_active: bool,
    character: Arc<[f32]>,
    character_active: bool,
    duck: Duck,
    comp: Compressor,
    makeup: f32,
    volume: Smoothed,
    limiter: Limiter,
    meter: Meter,
    sample_rate: f32,
}

impl MasterChain {
    pub fn new(sample_rate: f32, shapes: &mut ShapeCache) -> Self {
        let sr = sample_rate.max(1.0);
        let identity = Coefficients { a1: 0.0, a2: 0.0, b0: 1.0, b1: 0.0, b2: 0.0 };
        let mut chain = Self {
            filter_l: DirectForm2Transposed::<f32>::new(identity),
            filter_r: DirectForm2Transposed::<f32>::new(identity),
            filter_active: false,
            character: shapes.get_or_build(ShapeKey::character(Default::default(), 0.0)),
            character_active: false,
            duck: Duck::new(sr),
            comp: Compressor::new(sr),
            makeup: 1.0,
            volume: Smoothed::new(0.9, SMOOTH_SECONDS, sr),
            limiter: Limiter::new(sr),
            meter: Meter::new(sr),
            sample_rate: sr,
        };
        chain.set_filter(&MasterFilterConfig::default());
        chain.set_compressor(&CompressorConfig::default());
        chain
    }

    /// One knob: negative closes a lowpass, positive raises a
    /// highpass, the dead band around zero bypasses.
    pub fn set_filter(&mut self, config: &MasterFilterConfig) {
        let position =
            if config.position.is_finite() { config.position.clamp(-1.0, 1.0) } else { 0.0 };
        if position.abs() <= FILTER_DEAD_BAND {
            self.filter_active = false;
            return;
        }
        let q = if config.q.is_finite() { config.q.clamp(0.1, 8.0) } else { 0.9 };
        // Normalize the throw outside the dead band to 0..1.
        let t = (position.abs() - FILTER_DEAD_BAND) / (1.0 - FILTER_DEAD_BAND);
        let (kind, cutoff) = if position < 0.0 {
            // 18kHz down to 40Hz as the knob closes.
            (biquad::Type::LowPass, 18_000.0 * (40.0f32 / 18_000.0).powf(t))
        } else {
            // 25Hz up to 8kHz as the knob rises.
            (biquad::Type::HighPass, 25.0 * (8_000.0f32 / 25.0).powf(t))
        };
        let cutoff = cutoff.clamp(10.0, self.sample_rate * 0.45);
        let coeffs = Coefficients::<f32>::from_params(
            kind,
            self.sample_rate.hz(),
            cutoff.hz(),
            q,
        )
        .unwrap_or(Coefficients { a1: 0.0, a2: 0.0, b0: 1.0, b1: 0.0, b2: 0.0 });
        self.filter_l.update_coefficients(coeffs);
        self.filter_r.update_coefficients(coeffs);
        self.filter_active = true;
    }

    pub fn set_character(&mut self, config: &CharacterConfig, shapes: &mut ShapeCache) {
        let amount = if config.amount.is_finite() { config.amount.clamp(0.0, 1.0) } else { 0.0 };
        if amount <= 0.0 {
            self.character_active = false;
            return;
        }
        self.character = shapes.get_or_build(ShapeKey::character(config.mode, amount));
        self.character_active = true;
    }

    pub fn set_compressor(&mut self, config: &CompressorConfig) {
        self.comp.configure(config, self.sample_rate);
        let makeup_db =
            if config.makeup_db.is_finite() { config.makeup_db.clamp(-12.0, 24.0) } else { 0.0 };
        self.makeup = 10f32.powf(makeup_db / 20.0);
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume.set(volume.clamp(0.0, 1.5));
    }

    /// Dip the shared duck gain for one sidechain-source fire.
    pub fn duck(&mut self, depth: f32) {
        self.duck.trigger(depth);
    }

    pub fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        let duck = self.duck.next();
        let mut l = left * duck;
        let mut r = right * duck;
        if self.filter_active {
            l = self.filter_l.run(l);
            r = self.filter_r.run(r);
        }
        if self.character_active {
            l = shape_sample(&self.character, l);
            r = shape_sample(&self.character, r);
        }
        let comp_gain = self.comp.gain(l.abs().max(r.abs()));
        let gain = comp_gain * self.makeup * self.volume.next();
        l *= gain;
        r *= gain;
        let limit = self.limiter.gain(l.abs().max(r.abs()));
        l *= limit;
        r *= limit;
        self.meter.feed(l.abs().max(r.abs()));
        (l, r)
    }

    pub fn meter_level(&self) -> f32 {
        self.meter.level()
    }

    pub fn reset(&mut self) {
        self.duck.reset();
        self.comp.reset();
        self.limiter.reset();
        self.meter.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 48_000.0;

    /// A chain configured for unity: no compression, no makeup, full
    /// volume, filter centered.
    fn unity_chain(shapes: &mut ShapeCache) -> MasterChain {
        let mut chain = MasterChain::new(SR, shapes);
        chain.set_compressor(&CompressorConfig {
            threshold_db: 0.0,
            ratio: 1.0,
            attack: 0.01,
            release: 0.18,
            makeup_db: 0.0,
        });
        chain.set_volume(1.0);
        // Settle volume smoothing.
        for _ in 0..4800 {
            chain.process(0.0, 0.0);
        }
        chain
    }

    fn tone_peak(chain: &mut MasterChain, freq: f32, level: f32) -> f32 {
        let mut peak = 0.0f32;
        for i in 0..9600 {
            let x = level * (i as f32 * freq / SR * core::f32::consts::TAU).sin();
            let (l, r) = chain.process(x, x);
            // Skip the filter warmup.
            if i > 2400 {
                peak = peak.max(l.abs().max(r.abs()));
            }
        }
        peak
    }

    // === Filter ===

    #[test]
    fn dead_band_bypasses_filter() {
        let mut shapes = ShapeCache::new();
        let mut chain = unity_chain(&mut shapes);
        chain.set_filter(&MasterFilterConfig { position: 0.03, q: 0.9 });
        let peak = tone_peak(&mut chain, 1000.0, 0.5);
        assert!((peak - 0.5).abs() < 0.01, "colored at {}", peak);
    }

    #[test]
    fn closed_lowpass_kills_highs() {
        let mut shapes = ShapeCache::new();
        let mut chain = unity_chain(&mut shapes);
        chain.set_filter(&MasterFilterConfig { position: -0.9, q: 0.9 });
        let peak = tone_peak(&mut chain, 8000.0, 0.5);
        assert!(peak < 0.05, "high tone leaked {}", peak);
    }

    #[test]
    fn raised_highpass_kills_lows() {
        let mut shapes = ShapeCache::new();
        let mut chain = unity_chain(&mut shapes);
        chain.set_filter(&MasterFilterConfig { position: 0.9, q: 0.9 });
        let peak = tone_peak(&mut chain, 60.0, 0.5);
        assert!(peak < 0.05, "low tone leaked {}", peak);
    }

    // === Character ===

    #[test]
    fn zero_amount_character_is_transparent() {
        let mut shapes = ShapeCache::new();
        let mut chain = unity_chain(&mut shapes);
        chain.set_character(
            &CharacterConfig { mode: Default::default(), amount: 0.0 },
            &mut shapes,
        );
        let peak = tone_peak(&mut chain, 1000.0, 0.5);
        assert!((peak - 0.5).abs() < 0.01);
    }

    #[test]
    fn character_insert_changes_the_signal() {
        let mut shapes = ShapeCache::new();
        let mut plain = unity_chain(&mut shapes);
        let mut colored = unity_chain(&mut shapes);
        colored.set_character(
            &CharacterConfig { mode: Default::default(), amount: 0.9 },
            &mut shapes,
        );
        let p0 = tone_peak(&mut plain, 1000.0, 0.5);
        let p1 = tone_peak(&mut colored, 1000.0, 0.5);
        assert!((p0 - p1).abs() > 0.01, "plain {} colored {}", p0, p1);
    }

    // === Compressor ===

    #[test]
    fn compressor_reduces_loud_material() {
        let mut shapes = ShapeCache::new();
        let mut chain = unity_chain(&mut shapes);
        chain.set_compressor(&CompressorConfig {
            threshold_db: -20.0,
            ratio: 8.0,
            attack: 0.002,
            release: 0.2,
            makeup_db: 0.0,
        });
        // -6dBFS input is 14dB over threshold; expect most of the
        // overshoot reduced once the follower settles.
        let peak = tone_peak(&mut chain, 500.0, 0.5);
        assert!(peak < 0.25, "not compressed: {}", peak);
        assert!(peak > 0.02);
    }

    #[test]
    fn makeup_gain_boosts() {
        let mut shapes = ShapeCache::new();
        let mut chain = unity_chain(&mut shapes);
        chain.set_compressor(&CompressorConfig {
            threshold_db: 0.0,
            ratio: 1.0,
            attack: 0.01,
            release: 0.18,
            makeup_db: 6.0,
        });
        let peak = tone_peak(&mut chain, 500.0, 0.1);
        assert!((peak - 0.2).abs() < 0.01, "6dB makeup gave {}", peak);
    }

    // === Duck ===

    #[test]
    fn duck_dips_then_recovers() {
        let mut shapes = ShapeCache::new();
        let mut chain = unity_chain(&mut shapes);
        chain.duck(0.8);
        let (l, _) = chain.process(0.5, 0.5);
        assert!(l < 0.5 * 0.25, "no dip: {}", l);
        // One second later the duck has recovered.
        for _ in 0..SR as usize {
            chain.process(0.0, 0.0);
        }
        let (l, _) = chain.process(0.5, 0.5);
        assert!(l > 0.45, "stuck at {}", l);
    }

    #[test]
    fn deeper_duck_wins_overlap() {
        let mut shapes = ShapeCache::new();
        let mut chain = unity_chain(&mut shapes);
        chain.duck(0.3);
        chain.duck(0.8);
        chain.duck(0.1);
        let (l, _) = chain.process(1.0, 1.0);
        assert!(l < 0.25, "shallow trigger overrode deep: {}", l);
    }

    // === Limiter and metering ===

    #[test]
    fn limiter_bounds_hot_output() {
        let mut shapes = ShapeCache::new();
        let mut chain = unity_chain(&mut shapes);
        chain.set_volume(1.5);
        for _ in 0..4800 {
            chain.process(0.0, 0.0);
        }
        let peak = tone_peak(&mut chain, 200.0, 1.0);
        assert!(peak <= 0.96, "peak {}", peak);
    }

    #[test]
    fn meter_follows_output() {
        let mut shapes = ShapeCache::new();
        let mut chain = unity_chain(&mut shapes);
        let _ = tone_peak(&mut chain, 500.0, 0.5);
        assert!(chain.meter_level() > 0.3);
        chain.reset();
        assert_eq!(chain.meter_level(), 0.0);
    }
}
