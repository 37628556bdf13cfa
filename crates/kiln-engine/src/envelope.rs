//! Fixed-gesture amplitude envelopes.
//!
//! Every voice plays one self-terminating gesture: a linear attack,
//! an exponential decay toward the sustain level, then a release that
//! begins on its own once the decay span has elapsed. There is no
//! note-off; the step's resolved ADSR fully determines the shape.

/// Attacks shorter than this are inaudible as ramps and click instead.
pub const MIN_ATTACK_SECONDS: f32 = 0.002;
/// Below this gain a voice is considered silent.
pub const ENV_FLOOR: f32 = 1e-4;

/// Resolved envelope timings, all in seconds except `sustain` (gain).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EnvSpec {
    pub attack: f32,
    pub decay: f32,
    pub sustain: f32,
    pub release: f32,
}

impl EnvSpec {
    pub fn new(attack: f32, decay: f32, sustain: f32, release: f32) -> Self {
        let clean = |v: f32, fallback: f32| if v.is_finite() { v.max(0.0) } else { fallback };
        Self {
            attack: clean(attack, 0.01).max(MIN_ATTACK_SECONDS),
            decay: clean(decay, 0.2),
            sustain: clean(sustain, 0.0).min(1.0),
            release: clean(release, 0.2),
        }
    }

    /// Seconds from trigger until the release tail is effectively done.
    pub fn gesture_seconds(&self) -> f32 {
        self.attack + self.decay + self.release
    }
}

impl Default for EnvSpec {
    fn default() -> Self {
        Self::new(0.005, 0.3, 0.2, 0.25)
    }
}

/// Per-sample gain envelope driving a voice's output stage.
#[derive(Clone, Debug)]
pub struct GainEnv {
    value: f32,
    pos: u64,
    attack_samples: u64,
    release_start: u64,
    sustain: f32,
    decay_mul: f32,
    release_mul: f32,
}

impl GainEnv {
    pub fn new(spec: EnvSpec, sample_rate: f32) -> Self {
        let sr = sample_rate.max(1.0);
        let attack_samples = (spec.attack * sr) as u64;
        let decay_samples = (spec.decay * sr) as u64;
        let decay_tau = (spec.decay / 4.0).max(1e-3);
        let release_tau = (spec.release / 4.0).max(0.005);
        Self {
            value: 0.0,
            pos: 0,
            attack_samples: attack_samples.max(1),
            release_start: attack_samples.max(1) + decay_samples,
            sustain: spec.sustain,
            decay_mul: libm::expf(-1.0 / (decay_tau * sr)),
            release_mul: libm::expf(-1.0 / (release_tau * sr)),
        }
    }

    /// Advance one sample and return the gain for it.
    pub fn next(&mut self) -> f32 {
        if self.pos < self.attack_samples {
            self.value = (self.pos + 1) as f32 / self.attack_samples as f32;
        } else if self.pos < self.release_start {
            self.value = self.sustain + (self.value - self.sustain) * self.decay_mul;
        } else {
            self.value *= self.release_mul;
        }
        self.pos += 1;
        self.value
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    /// True once the release has pulled the gain under the floor.
    pub fn is_quiet(&self) -> bool {
        self.pos >= self.release_start && self.value < ENV_FLOOR
    }
}

/// One-way exponential decay from 1 to 0, for sweeps and click bursts.
#[derive(Clone, Copy, Debug)]
pub struct DecayEnv {
    value: f32,
    mul: f32,
}

impl DecayEnv {
    pub fn new(decay_seconds: f32, sample_rate: f32) -> Self {
        let sr = sample_rate.max(1.0);
        let tau = if decay_seconds.is_finite() {
            decay_seconds.max(1e-4)
        } else {
            0.05
        };
        Self { value: 1.0, mul: libm::expf(-1.0 / (tau * sr)) }
    }

    pub fn next(&mut self) -> f32 {
        let out = self.value;
        self.value *= self.mul;
        out
    }

    pub fn value(&self) -> f32 {
        self.value
    }
}
