use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Source of uniform choices for prompt variety (action, quality, director,
/// mission, scene picks).
pub trait RandomSource: Send {
    /// Returns an index in `0..len`. Callers never pass `len == 0`.
    fn pick(&mut self, len: usize) -> usize;
}

pub fn choose<'a, T>(rng: &mut dyn RandomSource, items: &'a [T]) -> Option<&'a T> {
    if items.is_empty() {
        return None;
    }
    items.get(rng.pick(items.len()))
}

/// Draws `count` distinct items, keeping draw order.
pub fn sample_distinct<T: Clone>(rng: &mut dyn RandomSource, items: &[T], count: usize) -> Vec<T> {
    let mut pool = items.to_vec();
    let mut out = Vec::with_capacity(count.min(pool.len()));
    while out.len() < count && !pool.is_empty() {
        let idx = rng.pick(pool.len());
        out.push(pool.swap_remove(idx));
    }
    out
}

#[derive(Debug)]
pub struct EntropyRandom {
    rng: StdRng,
}

impl EntropyRandom {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }
}

impl Default for EntropyRandom {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomSource for EntropyRandom {
    fn pick(&mut self, len: usize) -> usize {
        self.rng.gen_range(0..len.max(1))
    }
}

#[derive(Debug)]
pub struct SeededRandom {
    rng: StdRng,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl RandomSource for SeededRandom {
    fn pick(&mut self, len: usize) -> usize {
        self.rng.gen_range(0..len.max(1))
    }
}

/// Replays a fixed list of indices (each taken modulo `len`), then yields 0.
#[derive(Debug, Clone, Default)]
pub struct ScriptedRandom {
    picks: VecDeque<usize>,
}

impl ScriptedRandom {
    pub fn new(picks: impl IntoIterator<Item = usize>) -> Self {
        Self {
            picks: picks.into_iter().collect(),
        }
    }
}

impl RandomSource for ScriptedRandom {
    fn pick(&mut self, len: usize) -> usize {
        self.picks.pop_front().unwrap_or(0) % len.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_random_replays_modulo_len() {
        let mut rng = ScriptedRandom::new([1, 5, 2]);
        assert_eq!(rng.pick(3), 1);
        assert_eq!(rng.pick(3), 2);
        assert_eq!(rng.pick(10), 2);
        assert_eq!(rng.pick(10), 0);
    }

    #[test]
    fn choose_handles_empty_slices() {
        let mut rng = ScriptedRandom::new([4]);
        let empty: [&str; 0] = [];
        assert_eq!(choose(&mut rng, &empty), None);
        assert_eq!(choose(&mut rng, &["a", "b"]), Some(&"a"));
    }

    #[test]
    fn sample_distinct_never_repeats() {
        let mut rng = SeededRandom::new(7);
        let items: Vec<u32> = (0..12).collect();
        let mut picked = sample_distinct(&mut rng, &items, 5);
        assert_eq!(picked.len(), 5);
        picked.sort_unstable();
        picked.dedup();
        assert_eq!(picked.len(), 5);

        let all = sample_distinct(&mut rng, &items[..3], 5);
        assert_eq!(all.len(), 3);
    }
}
