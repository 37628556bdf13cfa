//! Saturation bus: soft-clip waveshaper into a post lowpass.
//!
//! The transfer curve comes from the shared shape cache, so two
//! projects at the same drive amount share one table. The bus sums its
//! sends to mono and returns a centered stereo pair.

use std::sync::Arc;

use kiln_model::DriveConfig;

use crate::shapes::{shape_sample, ShapeCache, ShapeKey};
use crate::strip::{Smoothed, SMOOTH_SECONDS};

pub struct DriveBus {
    table: Arc<[f32]>,
    lp: f32,
    lp_coeff: f32,
    mix: Smoothed,
    sample_rate: f32,
}

impl DriveBus {
    pub fn new(sample_rate: f32, shapes: &mut ShapeCache) -> Self {
        let sr = sample_rate.max(1.0);
        let mut bus = Self {
            table: shapes.get_or_build(ShapeKey::soft_clip(0.35, 1.0)),
            lp: 0.0,
            lp_coeff: 1.0,
            mix: Smoothed::new(0.0, SMOOTH_SECONDS, sr),
            sample_rate: sr,
        };
        bus.set_config(&DriveConfig::default(), shapes);
        bus
    }

    pub fn set_config(&mut self, config: &DriveConfig, shapes: &mut ShapeCache) {
        let amount = if config.amount.is_finite() { config.amount.clamp(0.0, 1.0) } else { 0.35 };
        self.table = shapes.get_or_build(ShapeKey::soft_clip(amount, 1.0));
        let tone = if config.tone.is_finite() { config.tone.clamp(0.0, 1.0) } else { 0.6 };
        // Post lowpass from ~600Hz up to fully open.
        let cutoff = 600.0 * (tone * 5.0).exp2();
        self.lp_coeff = 1.0 - (-core::f32::consts::TAU * cutoff / self.sample_rate).exp();
        self.mix.set(config.mix.clamp(0.0, 1.0));
    }

    /// One frame of the bus: mono send sum in, centered wet out.
    pub fn process(&mut self, input: f32) -> (f32, f32) {
        let shaped = shape_sample(&self.table, input);
        self.lp += self.lp_coeff * (shaped - self.lp);
        let wet = self.lp * self.mix.next();
        (wet, wet)
    }

    pub fn clear(&mut self) {
        self.lp = 0.0;
    }
}
