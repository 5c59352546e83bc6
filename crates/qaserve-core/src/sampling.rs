use std::collections::HashSet;

use candle_core::{DType, Tensor};

use crate::error::CoreResult;
use crate::model::SamplingParams;

/// Sample the next token id from the logits of the last position.
///
/// ## Pipeline
///
/// 1. Temperature scaling on the device (scalar division).
/// 2. Single device→CPU transfer (`to_vec1`).
/// 3. Repetition penalty over the whole sequence, prompt included.
/// 4. No-repeat-n-gram ban: any token that would complete an n-gram already
///    present in `history` is masked to `-∞`.
/// 5. Top-K mask, then softmax + top-P nucleus + multinomial draw.
pub fn sample_token(
    logits: &Tensor,
    params: &SamplingParams,
    history: &[u32],
    rng: &mut SampleRng,
) -> CoreResult<u32> {
    let scaled = apply_temperature(logits, params.temperature)?;
    let mut logits_vec: Vec<f32> = scaled.to_dtype(DType::F32)?.to_vec1()?;

    if (params.repetition_penalty - 1.0).abs() > f64::EPSILON {
        apply_repetition_penalty(&mut logits_vec, history, params.repetition_penalty);
    }

    for id in banned_ngram_tokens(history, params.no_repeat_ngram_size) {
        if let Some(v) = logits_vec.get_mut(id as usize) {
            *v = f32::NEG_INFINITY;
        }
    }

    top_k_filter(&mut logits_vec, params.top_k);

    Ok(sample_top_p(&logits_vec, params.top_p, rng.next_f32()))
}

/// Scale logits by 1/temperature. Returns a clone if temperature is 1.0 or
/// non-positive.
fn apply_temperature(logits: &Tensor, temperature: f64) -> CoreResult<Tensor> {
    if temperature <= 0.0 || (temperature - 1.0).abs() < f64::EPSILON {
        return Ok(logits.clone());
    }
    Ok((logits / temperature)?)
}

/// Push the logit of every token seen in `history` toward zero.
///
/// Each distinct token is penalised once, however often it occurs.
fn apply_repetition_penalty(logits: &mut [f32], history: &[u32], penalty: f64) {
    if penalty <= 0.0 || (penalty - 1.0).abs() < f64::EPSILON {
        return;
    }
    let p = penalty as f32;
    let seen: HashSet<u32> = history.iter().copied().collect();
    for id in seen {
        if let Some(v) = logits.get_mut(id as usize) {
            if *v >= 0.0 {
                *v /= p;
            } else {
                *v *= p;
            }
        }
    }
}

/// Tokens that would repeat an n-gram of size `n` already present in `history`.
///
/// The last `n - 1` tokens form the current prefix; every earlier position
/// where the same prefix occurs bans the token that followed it.
pub fn banned_ngram_tokens(history: &[u32], n: usize) -> Vec<u32> {
    if n == 0 || history.len() + 1 < n {
        return Vec::new();
    }
    if n == 1 {
        return history.to_vec();
    }
    let prefix = &history[history.len() - (n - 1)..];
    history
        .windows(n)
        .filter(|w| &w[..n - 1] == prefix)
        .map(|w| w[n - 1])
        .collect()
}

/// Keep only the top-`k` logits; set all others to `-∞`.
fn top_k_filter(logits: &mut [f32], k: usize) {
    if k == 0 || k >= logits.len() {
        return;
    }
    let mut indexed: Vec<(usize, f32)> = logits.iter().copied().enumerate().collect();
    indexed.select_nth_unstable_by(k - 1, |a, b| b.1.total_cmp(&a.1));
    let threshold = indexed[k - 1].1;
    for v in logits.iter_mut() {
        if *v < threshold {
            *v = f32::NEG_INFINITY;
        }
    }
}

/// Softmax → top-P nucleus filter → multinomial draw with `r` in [0, 1).
fn sample_top_p(logits: &[f32], top_p: f64, r: f32) -> u32 {
    let n = logits.len();

    let max_logit = logits
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(f32::NEG_INFINITY, f32::max);
    let mut probs: Vec<f32> = logits.iter().map(|&v| (v - max_logit).exp()).collect();
    let sum: f32 = probs.iter().sum();
    if sum > 0.0 {
        for p in probs.iter_mut() {
            *p /= sum;
        }
    }

    if top_p < 1.0 {
        let mut indexed: Vec<(usize, f32)> = probs.iter().copied().enumerate().collect();
        indexed.sort_unstable_by(|a, b| b.1.total_cmp(&a.1));

        let mut cumsum = 0.0f32;
        let mut nucleus_end = n;
        for (i, (_, p)) in indexed.iter().enumerate() {
            cumsum += p;
            if cumsum as f64 >= top_p {
                nucleus_end = i + 1;
                break;
            }
        }

        let mut keep = vec![false; n];
        for (idx, _) in indexed.iter().take(nucleus_end) {
            keep[*idx] = true;
        }
        let mut new_sum = 0.0f32;
        for (i, p) in probs.iter_mut().enumerate() {
            if keep[i] {
                new_sum += *p;
            } else {
                *p = 0.0;
            }
        }
        if new_sum > 0.0 {
            for p in probs.iter_mut() {
                *p /= new_sum;
            }
        }
    }

    let mut cumsum = 0.0f32;
    for (i, &p) in probs.iter().enumerate() {
        cumsum += p;
        if r < cumsum {
            return i as u32;
        }
    }
    // Rounding left the CDF short of r: take the last token with mass.
    probs
        .iter()
        .rposition(|&p| p > 0.0)
        .unwrap_or(n.saturating_sub(1)) as u32
}

// ─── RNG ─────────────────────────────────────────────────────────────────────

/// Small xorshift generator, one per generation call.
///
/// Quality is sufficient for sampling and avoids an RNG dependency.
#[derive(Debug, Clone)]
pub struct SampleRng {
    state: u64,
}

impl SampleRng {
    pub fn new(seed: u64) -> Self {
        // One splitmix64 round spreads small seeds over all 64 bits; xorshift
        // alone keeps them in the low bits and the first draw rounds to 0.0.
        let mut z = seed.wrapping_add(0x9E37_79B9_7F4A_7C15);
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^= z >> 31;
        // xorshift must never hold an all-zero state.
        Self { state: z.max(1) }
    }

    /// Seed from wall-clock nanoseconds.
    pub fn from_clock() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0x9E37_79B9_7F4A_7C15);
        Self::new(seed)
    }

    /// Uniform float in [0, 1).
    pub fn next_f32(&mut self) -> f32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        // Top 24 bits fit an f32 mantissa exactly.
        (x >> 40) as f32 / (1u64 << 24) as f32
    }
}
