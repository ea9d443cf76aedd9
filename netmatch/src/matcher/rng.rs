//! Seeded pseudo-random tie-breaking.

/// A 32-bit xorshift generator.
///
/// Used to shuffle candidate lists when seeded tie-breaking is requested, so
/// that runs with the same seed explore candidates in the same order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XorShift32 {
    state: u32,
}

impl XorShift32 {
    /// The seed used when none is given.
    pub const DEFAULT_SEED: u32 = 12345678;

    /// Create a generator. A zero seed is replaced by [`Self::DEFAULT_SEED`],
    /// as xorshift never leaves the zero state.
    pub fn new(seed: u32) -> Self {
        let state = if seed == 0 { Self::DEFAULT_SEED } else { seed };
        Self { state }
    }

    /// The next value of the sequence.
    pub fn next_u32(&mut self) -> u32 {
        self.state ^= self.state << 13;
        self.state ^= self.state >> 17;
        self.state ^= self.state << 5;
        self.state
    }

    /// A value in `0..n`.
    ///
    /// # Panics
    ///
    /// If `n` is zero.
    pub fn below(&mut self, n: usize) -> usize {
        assert!(n > 0, "cannot draw from an empty range");
        self.next_u32() as usize % n
    }

    /// Shuffle a slice in place (Fisher-Yates).
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.below(i + 1);
            items.swap(i, j);
        }
    }
}

impl Default for XorShift32 {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SEED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xorshift_sequence() {
        let mut rng = XorShift32::default();
        let mut state = XorShift32::DEFAULT_SEED;
        for _ in 0..4 {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            assert_eq!(rng.next_u32(), state);
        }
    }

    #[test]
    fn same_seed_same_shuffle() {
        let mut a: Vec<usize> = (0..20).collect();
        let mut b = a.clone();
        XorShift32::new(7).shuffle(&mut a);
        XorShift32::new(7).shuffle(&mut b);
        assert_eq!(a, b);

        let mut sorted = a.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn zero_seed_is_replaced() {
        assert_eq!(XorShift32::new(0), XorShift32::default());
    }
}
