//! Memoized transfer curves and wavetable spectra.
//!
//! Shaper tables and wavetables are pure functions of a handful of
//! parameters, so they are built once per quantized parameter set and
//! shared into voices as `Arc<[f32]>`. Keys quantize to the resolution
//! the mix engine actually sweeps at (whole percent amounts, 2-decimal
//! mixes), so continuous knob movements keep hitting the cache. The
//! cache is unbounded; the key space is small.

use std::collections::BTreeMap;
use std::sync::Arc;

use kiln_model::CharacterMode;

/// Samples in a transfer curve (input span -1..1).
pub const SHAPE_LEN: usize = 1024;
/// Samples in a single-cycle wavetable.
pub const WAVETABLE_LEN: usize = 2048;
/// Distinct wavetable spectra available to the wavetable voice.
pub const WAVETABLE_COUNT: usize = 4;

fn quant_100(v: f32) -> u16 {
    let v = if v.is_finite() { v } else { 0.0 };
    libm::roundf(v.clamp(0.0, 1.0) * 100.0) as u16
}

/// Cache key: curve kind plus parameters quantized to stable steps.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ShapeKey {
    /// Asymmetric saturation; `amount` and `mix` in hundredths.
    SoftClip { amount: u16, mix: u16 },
    /// Linear re-quantization to `bits` bit depth.
    Bitcrush { bits: u8 },
    /// Sinusoidal wave folder; `amount` in hundredths.
    Fold { amount: u16 },
    /// One of the two master character curves.
    Character { mode: CharacterMode, amount: u16 },
    /// Inharmonic additive spectrum for the wavetable voice.
    Wavetable { index: u8 },
}

impl ShapeKey {
    pub fn soft_clip(amount: f32, mix: f32) -> Self {
        ShapeKey::SoftClip { amount: quant_100(amount), mix: quant_100(mix) }
    }

    pub fn bitcrush(bits: f32) -> Self {
        let bits = if bits.is_finite() { bits } else { 16.0 };
        ShapeKey::Bitcrush { bits: bits.clamp(1.0, 16.0) as u8 }
    }

    pub fn fold(amount: f32) -> Self {
        ShapeKey::Fold { amount: quant_100(amount) }
    }

    pub fn character(mode: CharacterMode, amount: f32) -> Self {
        ShapeKey::Character { mode, amount: quant_100(amount) }
    }

    pub fn wavetable(index: f32) -> Self {
        let index = if index.is_finite() { index.max(0.0) } else { 0.0 };
        ShapeKey::Wavetable { index: (index as usize % WAVETABLE_COUNT) as u8 }
    }
}

/// The process-lifetime table cache.
#[derive(Default)]
pub struct ShapeCache {
    entries: BTreeMap<ShapeKey, Arc<[f32]>>,
}

impl ShapeCache {
    pub fn new() -> Self {
        Self { entries: BTreeMap::new() }
    }

    /// Number of distinct tables built so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fetch a table, building it on first use only.
    pub fn get_or_build(&mut self, key: ShapeKey) -> Arc<[f32]> {
        self.entries.entry(key).or_insert_with(|| build(key)).clone()
    }
}

fn build(key: ShapeKey) -> Arc<[f32]> {
    match key {
        ShapeKey::SoftClip { amount, mix } => {
            soft_clip_table(amount as f32 / 100.0, mix as f32 / 100.0)
        }
        ShapeKey::Bitcrush { bits } => bitcrush_table(bits),
        ShapeKey::Fold { amount } => fold_table(amount as f32 / 100.0),
        ShapeKey::Character { mode, amount } => {
            character_table(mode, amount as f32 / 100.0)
        }
        ShapeKey::Wavetable { index } => wavetable(index),
    }
}

fn transfer_curve(f: impl Fn(f32) -> f32) -> Arc<[f32]> {
    let mut table = Vec::with_capacity(SHAPE_LEN);
    for i in 0..SHAPE_LEN {
        let x = i as f32 / (SHAPE_LEN - 1) as f32 * 2.0 - 1.0;
        table.push(f(x));
    }
    Arc::from(table)
}

/// Saturation with a harder negative lobe, normalized to hit ±1.
fn soft_clip_table(amount: f32, mix: f32) -> Arc<[f32]> {
    let drive = 1.0 + 9.0 * amount;
    let neg_drive = drive * 1.3;
    let pos_norm = libm::tanhf(drive);
    let neg_norm = libm::tanhf(neg_drive);
    transfer_curve(|x| {
        let shaped = if x >= 0.0 {
            libm::tanhf(x * drive) / pos_norm
        } else {
            libm::tanhf(x * neg_drive) / neg_norm
        };
        x * (1.0 - mix) + shaped * mix
    })
}

fn bitcrush_table(bits: u8) -> Arc<[f32]> {
    let levels = libm::powf(2.0, bits as f32 - 1.0);
    transfer_curve(|x| libm::roundf(x * levels) / levels)
}

/// Sinusoidal folding; at zero amount the curve is a plain quarter
/// sine, indistinguishable from gentle saturation.
fn fold_table(amount: f32) -> Arc<[f32]> {
    let k = 1.0 + 7.0 * amount;
    transfer_curve(|x| libm::sinf(x * k * core::f32::consts::FRAC_PI_2))
}

fn character_table(mode: CharacterMode, amount: f32) -> Arc<[f32]> {
    match mode {
        // Rounded knee with a touch of even-harmonic asymmetry.
        CharacterMode::Tape => {
            let drive = 1.0 + 2.0 * amount;
            let norm = libm::tanhf(drive);
            transfer_curve(move |x| {
                let bent = x + 0.08 * amount * x * x;
                let shaped = libm::tanhf(bent * drive) / norm;
                x * (1.0 - amount) + shaped * amount
            })
        }
        // Upward expansion that hardens low-level detail.
        CharacterMode::Grit => {
            let exponent = 1.0 / (1.0 + 1.5 * amount);
            transfer_curve(move |x| {
                let shaped = x.signum() * libm::powf(x.abs(), exponent);
                let shaped = shaped.clamp(-1.0, 1.0);
                x * (1.0 - amount) + shaped * amount
            })
        }
    }
}

/// Inharmonic partial sets, loosely metallic to organ-like.
const SPECTRA: [&[(f32, f32)]; WAVETABLE_COUNT] = [
    &[(1.0, 1.0), (2.0, 0.5), (3.0, 0.33), (4.0, 0.25), (5.0, 0.2)],
    &[(1.0, 1.0), (2.76, 0.55), (5.4, 0.3), (8.93, 0.15)],
    &[(1.0, 1.0), (1.58, 0.7), (2.24, 0.5), (2.92, 0.35), (3.6, 0.22)],
    &[(1.0, 1.0), (3.0, 0.45), (5.0, 0.22), (7.0, 0.12), (9.0, 0.07)],
];

fn wavetable(index: u8) -> Arc<[f32]> {
    let partials = SPECTRA[index as usize % WAVETABLE_COUNT];
    let mut table = vec![0.0f32; WAVETABLE_LEN];
    for (i, slot) in table.iter_mut().enumerate() {
        let phase = i as f32 / WAVETABLE_LEN as f32;
        let mut acc = 0.0;
        for &(ratio, amp) in partials {
            acc += amp * libm::sinf(core::f32::consts::TAU * phase * ratio);
        }
        *slot = acc;
    }
    let peak = table.iter().fold(0.0f32, |m, v| m.max(v.abs())).max(1e-9);
    for v in &mut table {
        *v /= peak;
    }
    Arc::from(table)
}

/// Apply a transfer curve to a sample in -1..1, linearly interpolated.
pub fn shape_sample(table: &[f32], x: f32) -> f32 {
    if table.is_empty() {
        return x;
    }
    let x = if x.is_finite() { x.clamp(-1.0, 1.0) } else { 0.0 };
    let pos = (x + 1.0) * 0.5 * (table.len() - 1) as f32;
    let i = pos as usize;
    if i + 1 >= table.len() {
        return table[table.len() - 1];
    }
    let t = pos - i as f32;
    table[i] + (table[i + 1] - table[i]) * t
}

/// Read a single-cycle wavetable at a phase in 0..1, wrapping.
pub fn wavetable_sample(table: &[f32], phase: f32) -> f32 {
    if table.is_empty() {
        return 0.0;
    }
    let phase = phase - libm::floorf(phase);
    let pos = phase * table.len() as f32;
    let i = pos as usize % table.len();
    let j = (i + 1) % table.len();
    let t = pos - pos as usize as f32;
    table[i] + (table[j] - table[i]) * t
}
