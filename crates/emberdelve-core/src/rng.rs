/// Deterministic PRNG with 256-bit state, so a logged seed reproduces a
/// dungeon exactly on any platform.
///
/// This is `xoshiro256**` seeded via SplitMix64.
#[derive(Clone, Copy, Debug)]
pub struct GameRng {
    state: [u64; 4],
}

impl GameRng {
    pub fn seed_from_u64(seed: u64) -> Self {
        let mut sm = SplitMix64 { state: seed };
        Self {
            state: [sm.next(), sm.next(), sm.next(), sm.next()],
        }
    }

    pub fn next_u64(&mut self) -> u64 {
        // xoshiro256**
        let result = self.state[1].wrapping_mul(5).rotate_left(7).wrapping_mul(9);

        let t = self.state[1] << 17;

        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];

        self.state[2] ^= t;

        self.state[3] = self.state[3].rotate_left(45);

        result
    }

    pub fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }

    /// Uniform draw below `bound` via rejection sampling (no modulo bias).
    fn next_below(&mut self, bound: u32) -> u32 {
        debug_assert!(bound > 0, "empty range");
        let threshold = u32::MAX - (u32::MAX % bound);
        loop {
            let x = self.next_u32();
            if x < threshold {
                return x % bound;
            }
        }
    }

    /// Uniform draw from the inclusive range `[low, high]`.
    pub fn gen_range_u16(&mut self, low: u16, high: u16) -> u16 {
        assert!(low <= high, "inverted range");
        let span = u32::from(high - low) + 1;
        low + self.next_below(span) as u16
    }

    /// Uniform index into a collection of `len` elements.
    pub fn gen_index(&mut self, len: usize) -> usize {
        assert!(len > 0, "empty collection");
        debug_assert!(len <= u32::MAX as usize);
        self.next_below(len as u32) as usize
    }
}

struct SplitMix64 {
    state: u64,
}

impl SplitMix64 {
    fn next(&mut self) -> u64 {
        let mut z = self.state.wrapping_add(0x9e37_79b9_7f4a_7c15);
        self.state = z;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        z ^ (z >> 31)
    }
}
