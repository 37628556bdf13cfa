//! Stereo delay bus with tone-filtered feedback and optional
//! ping-pong.
//!
//! The delay time is slewed rather than jumped: the read head glides
//! to a new tap position over the smoothing time, which detunes the
//! repeats briefly instead of clicking. Feedback passes through a
//! one-pole lowpass per side so repeats darken at low tone settings.

use kiln_model::DelayConfig;

use crate::strip::Smoothed;

/// Delay line ceiling in seconds.
const MAX_DELAY: f32 = 2.0;
const MIN_DELAY: f32 = 0.01;
/// The read head moves slower than ordinary parameter smoothing so a
/// time change sounds like tape slew, not a glitch.
const TIME_SLEW_SECONDS: f32 = 0.08;

pub struct DelayBus {
    line_l: Vec<f32>,
    line_r: Vec<f32>,
    pos: usize,
    delay_samples: Smoothed,
    feedback: f32,
    tone_coeff: f32,
    tone_l: f32,
    tone_r: f32,
    ping_pong: bool,
    mix: Smoothed,
    sample_rate: f32,
}

impl DelayBus {
    pub fn new(sample_rate: f32) -> Self {
        let sr = sample_rate.max(1.0);
        let len = (MAX_DELAY * sr) as usize + 2;
        let mut bus = Self {
            line_l: vec![0.0; len],
            line_r: vec![0.0; len],
            pos: 0,
            delay_samples: Smoothed::new(0.3 * sr, TIME_SLEW_SECONDS, sr),
            feedback: 0.45,
            tone_coeff: 0.2,
            tone_l: 0.0,
            tone_r: 0.0,
            ping_pong: true,
            mix: Smoothed::new(0.0, crate::strip::SMOOTH_SECONDS, sr),
            sample_rate: sr,
        };
        bus.set_config(&DelayConfig::default(), 120.0);
        bus
    }

    /// Apply a config change. `tempo` resolves a synced time.
    pub fn set_config(&mut self, config: &DelayConfig, tempo: f32) {
        let time = match config.sync {
            Some(div) => div.seconds(tempo),
            None => config.time,
        };
        let time = if time.is_finite() { time.clamp(MIN_DELAY, MAX_DELAY) } else { 0.3 };
        self.delay_samples.set(time * self.sample_rate);
        self.feedback =
            if config.feedback.is_finite() { config.feedback.clamp(0.0, 0.95) } else { 0.45 };
        let tone = if config.tone.is_finite() { config.tone.clamp(0.0, 1.0) } else { 0.5 };
        // Tone maps to a feedback-path cutoff from ~500Hz to ~16kHz.
        let cutoff = 500.0 * (tone * 5.0).exp2();
        self.tone_coeff =
            1.0 - (-core::f32::consts::TAU * cutoff / self.sample_rate).exp();
        self.ping_pong = config.ping_pong;
        self.mix.set(config.mix.clamp(0.0, 1.0));
    }

    /// Read both lines `delay` samples behind the write head, with
    /// linear interpolation for the slewed fractional part.
    fn read(&self, delay: f32) -> (f32, f32) {
        let len = self.line_l.len() as f32;
        let at = self.pos as f32 - delay;
        let at = if at < 0.0 { at + len } else { at };
        let i0 = at as usize % self.line_l.len();
        let i1 = (i0 + 1) % self.line_l.len();
        let frac = at - at.floor();
        let l = self.line_l[i0] + (self.line_l[i1] - self.line_l[i0]) * frac;
        let r = self.line_r[i0] + (self.line_r[i1] - self.line_r[i0]) * frac;
        (l, r)
    }

    /// One frame of the bus: mono send sum in, stereo wet out.
    pub fn process(&mut self, input: f32) -> (f32, f32) {
        let max = (self.line_l.len() - 2) as f32;
        let delay = self.delay_samples.next().clamp(1.0, max);
        let (tap_l, tap_r) = self.read(delay);

        // Darken the repeats inside the loop.
        self.tone_l += self.tone_coeff * (tap_l - self.tone_l);
        self.tone_r += self.tone_coeff * (tap_r - self.tone_r);

        if self.ping_pong {
            // Input enters the left line; echoes cross between sides.
            self.line_l[self.pos] = input + self.tone_r * self.feedback;
            self.line_r[self.pos] = self.tone_l * self.feedback;
        } else {
            self.line_l[self.pos] = input + self.tone_l * self.feedback;
            self.line_r[self.pos] = input + self.tone_r * self.feedback;
        }
        self.pos += 1;
        if self.pos == self.line_l.len() {
            self.pos = 0;
        }

        let mix = self.mix.next();
        (tap_l * mix, tap_r * mix)
    }

    pub fn clear(&mut self) {
        self.line_l.fill(0.0);
        self.line_r.fill(0.0);
        self.tone_l = 0.0;
        self.tone_r = 0.0;
    }
}
