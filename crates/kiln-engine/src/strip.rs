//! Per-track channel strip: limiter, smoothed gain and pan, metering.
//!
//! Strips sit between the summed voice output of a track and the
//! master bus. Setter changes land through short one-pole smoothing so
//! live tweaks never click.

use kiln_model::StripSettings;

/// Time constant for parameter smoothing.
pub(crate) const SMOOTH_SECONDS: f32 = 0.015;

const LIMIT_THRESHOLD: f32 = 0.95;
const LIMIT_RELEASE_SECONDS: f32 = 0.05;
const METER_DECAY_SECONDS: f32 = 0.3;

/// A parameter that glides toward its target: `y += a * (target - y)`.
#[derive(Clone, Copy, Debug)]
pub struct Smoothed {
    current: f32,
    target: f32,
    coeff: f32,
}

impl Smoothed {
    pub fn new(value: f32, seconds: f32, sample_rate: f32) -> Self {
        let coeff = if seconds > 0.0 && sample_rate > 0.0 {
            1.0 - (-1.0 / (seconds * sample_rate)).exp()
        } else {
            1.0
        };
        Self { current: value, target: value, coeff }
    }

    /// Move toward `target` over the smoothing time. Non-finite
    /// targets are ignored.
    pub fn set(&mut self, target: f32) {
        if target.is_finite() {
            self.target = target;
        }
    }

    /// Jump immediately, no glide.
    pub fn snap(&mut self, value: f32) {
        if value.is_finite() {
            self.current = value;
            self.target = value;
        }
    }

    pub fn next(&mut self) -> f32 {
        self.current += self.coeff * (self.target - self.current);
        self.current
    }

    pub fn current(&self) -> f32 {
        self.current
    }
}

/// Hard peak limiter: instant attack, exponential release.
#[derive(Clone, Copy, Debug)]
pub struct Limiter {
    threshold: f32,
    envelope: f32,
    release: f32,
}

impl Limiter {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            threshold: LIMIT_THRESHOLD,
            envelope: 0.0,
            release: (-1.0 / (LIMIT_RELEASE_SECONDS * sample_rate.max(1.0))).exp(),
        }
    }

    pub fn process(&mut self, input: f32) -> f32 {
        input * self.gain(input.abs())
    }

    /// Gain for a detected peak; lets linked stereo apply one gain to
    /// both channels.
    pub fn gain(&mut self, peak: f32) -> f32 {
        self.envelope = peak.max(self.envelope * self.release);
        if self.envelope > self.threshold {
            self.threshold / self.envelope
        } else {
            1.0
        }
    }

    pub fn reset(&mut self) {
        self.envelope = 0.0;
    }
}

/// Peak meter with a slow fall, read by the UI between frames.
#[derive(Clone, Copy, Debug)]
pub struct Meter {
    level: f32,
    decay: f32,
}

impl Meter {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            level: 0.0,
            decay: (-1.0 / (METER_DECAY_SECONDS * sample_rate.max(1.0))).exp(),
        }
    }

    pub fn feed(&mut self, sample: f32) {
        let peak = sample.abs();
        self.level = peak.max(self.level * self.decay);
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn reset(&mut self) {
        self.level = 0.0;
    }
}

/// One track's strip: limiter, then gain, then pan, then meter.
#[derive(Clone, Copy, Debug)]
pub struct StripState {
    limiter: Limiter,
    volume: Smoothed,
    pan: Smoothed,
    meter: Meter,
}

impl StripState {
    pub fn new(settings: &StripSettings, sample_rate: f32) -> Self {
        Self {
            limiter: Limiter::new(sample_rate),
            volume: Smoothed::new(
                settings.volume.clamp(0.0, 1.5),
                SMOOTH_SECONDS,
                sample_rate,
            ),
            pan: Smoothed::new(settings.pan.clamp(-1.0, 1.0), SMOOTH_SECONDS, sample_rate),
            meter: Meter::new(sample_rate),
        }
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume.set(volume.clamp(0.0, 1.5));
    }

    pub fn set_pan(&mut self, pan: f32) {
        self.pan.set(pan.clamp(-1.0, 1.0));
    }

    /// Run the track's mono sum through the strip for one frame.
    pub fn process(&mut self, input: f32) -> (f32, f32) {
        let split = core::f32::consts::FRAC_1_SQRT_2 * input;
        self.process_stereo(split, split)
    }

    /// Run an already-panned stereo sum through the strip. The limiter
    /// is linked on the louder channel; pan acts as an equal-power
    /// balance, unity at center.
    pub fn process_stereo(&mut self, left: f32, right: f32) -> (f32, f32) {
        let g = self.limiter.gain(left.abs().max(right.abs()));
        let gained = g * self.volume.next();
        let angle = (self.pan.next() + 1.0) * core::f32::consts::FRAC_PI_4;
        let out_l = left * gained * angle.cos() * core::f32::consts::SQRT_2;
        let out_r = right * gained * angle.sin() * core::f32::consts::SQRT_2;
        self.meter.feed(out_l.abs().max(out_r.abs()));
        (out_l, out_r)
    }

    pub fn meter_level(&self) -> f32 {
        self.meter.level()
    }

    pub fn reset(&mut self) {
        self.limiter.reset();
        self.meter.reset();
    }
}
