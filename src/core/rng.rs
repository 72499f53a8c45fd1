//! Random Number Sources
//!
//! Dice rolls, portal placement and portal colors all draw from a
//! [`RandomSource`]. The default implementation is Xorshift128+, seeded
//! either from configuration (reproducible boards) or from the clock.

use std::time::{SystemTime, UNIX_EPOCH};

/// Uniform integer generator.
///
/// Implementations must be `Send` so a single source can live behind the
/// hub's dice lock and be used from any connection task.
pub trait RandomSource: Send {
    /// Generate the next 64-bit random value.
    fn next_u64(&mut self) -> u64;

    /// Generate a random integer in range [0, max).
    ///
    /// Returns 0 when `max` is 0.
    fn next_below(&mut self, max: u32) -> u32 {
        if max == 0 {
            return 0;
        }
        // Simple modulo - slight bias for very large max, but acceptable
        (self.next_u64() % max as u64) as u32
    }

    /// Generate a random integer in range [min, max] (inclusive).
    fn next_in_range(&mut self, min: u32, max: u32) -> u32 {
        if min >= max {
            return min;
        }
        min + self.next_below(max - min + 1)
    }
}

/// Xorshift128+ generator.
///
/// # Example
///
/// ```
/// use portals::core::rng::{RandomSource, XorShiftRng};
///
/// let mut a = XorShiftRng::new(12345);
/// let mut b = XorShiftRng::new(12345);
/// assert_eq!(a.next_u64(), b.next_u64());
/// ```
#[derive(Clone, Debug)]
pub struct XorShiftRng {
    state: [u64; 2],
}

impl Default for XorShiftRng {
    fn default() -> Self {
        Self::from_clock()
    }
}

impl XorShiftRng {
    /// Create a new RNG from a 64-bit seed.
    ///
    /// Uses SplitMix64 to initialize the internal state, ensuring
    /// good distribution even from weak seeds.
    pub fn new(seed: u64) -> Self {
        let mut s = seed;
        let state0 = splitmix64(&mut s);
        let state1 = splitmix64(&mut s);

        // Ensure state is never all zeros
        let state = if state0 == 0 && state1 == 0 {
            [1, 1]
        } else {
            [state0, state1]
        };

        Self { state }
    }

    /// Create an RNG seeded from the system clock.
    pub fn from_clock() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        Self::new(nanos as u64 ^ (nanos >> 64) as u64)
    }

    /// Create an RNG from an optional seed, falling back to the clock.
    pub fn from_seed_or_clock(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::new(seed),
            None => Self::from_clock(),
        }
    }
}

impl RandomSource for XorShiftRng {
    #[inline]
    fn next_u64(&mut self) -> u64 {
        let s0 = self.state[0];
        let mut s1 = self.state[1];
        let result = s0.wrapping_add(s1);

        s1 ^= s0;
        self.state[0] = s0.rotate_left(24) ^ s1 ^ (s1 << 16);
        self.state[1] = s1.rotate_left(37);

        result
    }
}

/// SplitMix64 for seed initialization.
#[inline]
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

/// Generate a light `#RRGGBB` color (each channel in 150..230).
pub fn light_color(rng: &mut dyn RandomSource) -> String {
    let r = 150 + rng.next_below(80);
    let g = 150 + rng.next_below(80);
    let b = 150 + rng.next_below(80);
    format!("#{:02X}{:02X}{:02X}", r, g, b)
}

/// Inclusive die range plus the source that rolls it.
pub struct Dice {
    min: u32,
    max: u32,
    source: Box<dyn RandomSource>,
}

impl Dice {
    /// Create dice rolling in `[min, max]`.
    pub fn new(min: u32, max: u32, source: Box<dyn RandomSource>) -> Self {
        Self { min, max, source }
    }

    /// Standard six-sided die.
    pub fn d6(source: Box<dyn RandomSource>) -> Self {
        Self::new(1, 6, source)
    }

    /// Roll once.
    pub fn roll(&mut self) -> u32 {
        self.source.next_in_range(self.min, self.max)
    }

    /// Inclusive range of this die.
    pub fn range(&self) -> (u32, u32) {
        (self.min, self.max)
    }
}

impl std::fmt::Debug for Dice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dice")
            .field("min", &self.min)
            .field("max", &self.max)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rng_determinism() {
        let mut rng1 = XorShiftRng::new(12345);
        let mut rng2 = XorShiftRng::new(12345);

        for _ in 0..1000 {
            assert_eq!(rng1.next_u64(), rng2.next_u64());
        }
    }

    #[test]
    fn test_rng_different_seeds() {
        let mut rng1 = XorShiftRng::new(12345);
        let mut rng2 = XorShiftRng::new(54321);

        assert_ne!(rng1.next_u64(), rng2.next_u64());
    }

    #[test]
    fn test_next_below() {
        let mut rng = XorShiftRng::new(1234);

        for _ in 0..1000 {
            assert!(rng.next_below(100) < 100);
        }

        // Edge cases
        assert_eq!(rng.next_below(0), 0);
        assert_eq!(rng.next_below(1), 0);
    }

    #[test]
    fn test_next_in_range_inclusive() {
        let mut rng = XorShiftRng::new(5678);
        let mut seen = [false; 7];

        for _ in 0..1000 {
            let val = rng.next_in_range(1, 6);
            assert!((1..=6).contains(&val));
            seen[val as usize] = true;
        }

        // Both ends are reachable
        assert!(seen[1] && seen[6]);
        assert_eq!(rng.next_in_range(5, 5), 5);
    }

    #[test]
    fn test_light_color_format() {
        let mut rng = XorShiftRng::new(42);

        for _ in 0..100 {
            let color = light_color(&mut rng);
            assert_eq!(color.len(), 7);
            assert!(color.starts_with('#'));

            let r = u8::from_str_radix(&color[1..3], 16).unwrap();
            let g = u8::from_str_radix(&color[3..5], 16).unwrap();
            let b = u8::from_str_radix(&color[5..7], 16).unwrap();
            for channel in [r, g, b] {
                assert!((150..230).contains(&channel));
            }
        }
    }

    #[test]
    fn test_dice_roll_range() {
        let mut dice = Dice::d6(Box::new(XorShiftRng::new(7)));
        assert_eq!(dice.range(), (1, 6));

        for _ in 0..500 {
            let roll = dice.roll();
            assert!((1..=6).contains(&roll));
        }
    }
}
