//! Schroeder reverb bus.
//!
//! Four parallel feedback combs into two series allpasses per side,
//! with a pre-delay line in front. The right channel's comb delays are
//! offset a few samples from the left so the tail decorrelates into
//! stereo. Comb feedback follows the RT60 rule: gain^(decay/delay)
//! reaches -60dB when the configured decay time has elapsed.

use kiln_model::ReverbConfig;

use crate::strip::{Smoothed, SMOOTH_SECONDS};

/// Comb delays in samples at the 44.1kHz reference rate.
const COMB_TUNING: [usize; 4] = [1557, 1617, 1491, 1422];
/// Right-channel offset for stereo spread.
const STEREO_SPREAD: usize = 23;
const ALLPASS_TUNING: [usize; 2] = [225, 556];
const ALLPASS_G: f32 = 0.5;
/// Pre-delay buffer ceiling in seconds.
const MAX_PRE_DELAY: f32 = 1.0;

struct Comb {
    buf: Vec<f32>,
    pos: usize,
    feedback: f32,
    damp: f32,
    lp: f32,
}

impl Comb {
    fn new(len: usize) -> Self {
        Self { buf: vec![0.0; len.max(1)], pos: 0, feedback: 0.8, damp: 0.4, lp: 0.0 }
    }

    fn process(&mut self, input: f32) -> f32 {
        let out = self.buf[self.pos];
        // One-pole damping inside the feedback loop darkens the tail.
        self.lp += (1.0 - self.damp) * (out - self.lp);
        self.buf[self.pos] = input + self.lp * self.feedback;
        self.pos += 1;
        if self.pos == self.buf.len() {
            self.pos = 0;
        }
        out
    }

    fn clear(&mut self) {
        self.buf.fill(0.0);
        self.lp = 0.0;
    }
}

struct Allpass {
    buf: Vec<f32>,
    pos: usize,
}

impl Allpass {
    fn new(len: usize) -> Self {
        Self { buf: vec![0.0; len.max(1)], pos: 0 }
    }

    fn process(&mut self, input: f32) -> f32 {
        let delayed = self.buf[self.pos];
        let out = delayed - ALLPASS_G * input;
        self.buf[self.pos] = input + ALLPASS_G * delayed;
        self.pos += 1;
        if self.pos == self.buf.len() {
            self.pos = 0;
        }
        out
    }

    fn clear(&mut self) {
        self.buf.fill(0.0);
    }
}

pub struct ReverbBus {
    pre: Vec<f32>,
    pre_pos: usize,
    pre_samples: usize,
    combs_l: Vec<Comb>,
    combs_r: Vec<Comb>,
    allpasses_l: Vec<Allpass>,
    allpasses_r: Vec<Allpass>,
    mix: Smoothed,
    sample_rate: f32,
}

impl ReverbBus {
    pub fn new(sample_rate: f32) -> Self {
        let sr = sample_rate.max(1.0);
        let scale = sr / 44_100.0;
        let scaled = |n: usize| ((n as f32 * scale) as usize).max(1);
        let mut bus = Self {
            pre: vec![0.0; (MAX_PRE_DELAY * sr) as usize + 1],
            pre_pos: 0,
            pre_samples: 0,
            combs_l: COMB_TUNING.iter().map(|&n| Comb::new(scaled(n))).collect(),
            combs_r: COMB_TUNING
                .iter()
                .map(|&n| Comb::new(scaled(n + STEREO_SPREAD)))
                .collect(),
            allpasses_l: ALLPASS_TUNING.iter().map(|&n| Allpass::new(scaled(n))).collect(),
            allpasses_r: ALLPASS_TUNING
                .iter()
                .map(|&n| Allpass::new(scaled(n + STEREO_SPREAD)))
                .collect(),
            mix: Smoothed::new(0.0, SMOOTH_SECONDS, sr),
            sample_rate: sr,
        };
        bus.set_config(&ReverbConfig::default(), 120.0);
        bus
    }

    /// Apply a config change. `tempo` resolves a synced pre-delay.
    pub fn set_config(&mut self, config: &ReverbConfig, tempo: f32) {
        let decay = if config.decay.is_finite() { config.decay.clamp(0.1, 20.0) } else { 2.0 };
        let damp = if config.damping.is_finite() { config.damping.clamp(0.0, 1.0) } else { 0.4 };
        for comb in self.combs_l.iter_mut().chain(self.combs_r.iter_mut()) {
            let delay_seconds = comb.buf.len() as f32 / self.sample_rate;
            comb.feedback = 0.001f32.powf(delay_seconds / decay);
            comb.damp = damp;
        }
        let pre_seconds = match config.pre_delay_sync {
            Some(div) => div.seconds(tempo),
            None => config.pre_delay,
        };
        let pre_seconds =
            if pre_seconds.is_finite() { pre_seconds.clamp(0.0, MAX_PRE_DELAY) } else { 0.0 };
        self.pre_samples =
            ((pre_seconds * self.sample_rate) as usize).min(self.pre.len() - 1);
        self.mix.set(config.mix.clamp(0.0, 1.0));
    }

    /// One frame of the bus: mono send sum in, stereo wet out.
    pub fn process(&mut self, input: f32) -> (f32, f32) {
        // Pre-delay.
        self.pre[self.pre_pos] = input;
        let read = (self.pre_pos + self.pre.len() - self.pre_samples) % self.pre.len();
        let x = self.pre[read];
        self.pre_pos += 1;
        if self.pre_pos == self.pre.len() {
            self.pre_pos = 0;
        }

        let mut left = 0.0;
        for comb in &mut self.combs_l {
            left += comb.process(x);
        }
        let mut right = 0.0;
        for comb in &mut self.combs_r {
            right += comb.process(x);
        }
        left *= 0.25;
        right *= 0.25;
        for ap in &mut self.allpasses_l {
            left = ap.process(left);
        }
        for ap in &mut self.allpasses_r {
            right = ap.process(right);
        }
        let mix = self.mix.next();
        (left * mix, right * mix)
    }

    pub fn clear(&mut self) {
        self.pre.fill(0.0);
        for comb in self.combs_l.iter_mut().chain(self.combs_r.iter_mut()) {
            comb.clear();
        }
        for ap in self.allpasses_l.iter_mut().chain(self.allpasses_r.iter_mut()) {
            ap.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 48_000.0;

    fn configured(decay: f32, mix: f32, pre_delay: f32) -> ReverbBus {
        let mut bus = ReverbBus::new(SR);
        bus.set_config(
            &ReverbConfig { decay, mix, pre_delay, pre_delay_sync: None, damping: 0.3 },
            120.0,
        );
        // Let the mix smoothing settle before measuring.
        for _ in 0..4800 {
            bus.process(0.0);
        }
        bus
    }

    fn tail_energy(bus: &mut ReverbBus, seconds: f32) -> f32 {
        let n = (seconds * SR) as usize;
        let mut sum = 0.0f32;
        for _ in 0..n {
            let (l, r) = bus.process(0.0);
            sum += l * l + r * r;
        }
        sum
    }

    #[test]
    fn impulse_produces_a_tail() {
        let mut bus = configured(2.0, 1.0, 0.0);
        bus.process(1.0);
        let early = tail_energy(&mut bus, 0.25);
        assert!(early > 1e-4, "no tail, energy {}", early);
    }

    #[test]
    fn longer_decay_rings_longer() {
        let mut short = configured(0.3, 1.0, 0.0);
        let mut long = configured(6.0, 1.0, 0.0);
        short.process(1.0);
        long.process(1.0);
        // Skip the early reflections, compare the late tail.
        let _ = tail_energy(&mut short, 0.5);
        let _ = tail_energy(&mut long, 0.5);
        let late_short = tail_energy(&mut short, 0.5);
        let late_long = tail_energy(&mut long, 0.5);
        assert!(
            late_long > late_short * 4.0,
            "late tails: long {} short {}",
            late_long,
            late_short
        );
    }

    #[test]
    fn pre_delay_postpones_onset() {
        let mut bus = configured(2.0, 1.0, 0.1);
        bus.process(1.0);
        // Inside the pre-delay window the bus is still silent.
        let early = tail_energy(&mut bus, 0.05);
        assert!(early < 1e-12, "leaked {}", early);
        let after = tail_energy(&mut bus, 0.25);
        assert!(after > 1e-4);
    }

    #[test]
    fn zero_mix_is_silent() {
        let mut bus = configured(2.0, 0.0, 0.0);
        bus.process(1.0);
        assert!(tail_energy(&mut bus, 0.2) < 1e-12);
    }

    #[test]
    fn stereo_tails_decorrelate() {
        let mut bus = configured(2.0, 1.0, 0.0);
        bus.process(1.0);
        let mut differ = false;
        for _ in 0..(0.2 * SR) as usize {
            let (l, r) = bus.process(0.0);
            if (l - r).abs() > 1e-6 {
                differ = true;
            }
        }
        assert!(differ, "tail is mono");
    }

    #[test]
    fn tail_stays_finite_at_extreme_decay() {
        let mut bus = configured(20.0, 1.0, 0.0);
        for _ in 0..100 {
            bus.process(1.0);
        }
        for _ in 0..(1.0 * SR) as usize {
            let (l, r) = bus.process(0.0);
            assert!(l.is_finite() && r.is_finite());
            assert!(l.abs() < 100.0 && r.abs() < 100.0);
        }
    }

    #[test]
    fn clear_silences_the_tail() {
        let mut bus = configured(4.0, 1.0, 0.0);
        bus.process(1.0);
        let _ = tail_energy(&mut bus, 0.1);
        bus.clear();
        assert!(tail_energy(&mut bus, 0.2) < 1e-12);
    }

    #[test]
    fn synced_pre_delay_follows_tempo() {
        use kiln_model::SyncDivision;
        let mut bus = ReverbBus::new(SR);
        bus.set_config(
            &ReverbConfig {
                decay: 2.0,
                mix: 1.0,
                pre_delay: 0.0,
                pre_delay_sync: Some(SyncDivision::Sixteenth),
                damping: 0.3,
            },
            120.0,
        );
        for _ in 0..4800 {
            bus.process(0.0);
        }
        bus.process(1.0);
        // A sixteenth at 120 BPM is 125ms; nothing before that.
        let early = tail_energy(&mut bus, 0.1);
        assert!(early < 1e-12, "leaked {}", early);
    }
}
