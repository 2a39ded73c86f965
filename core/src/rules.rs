use crate::grid::{DEFAULT_DIFFICULTY, GRID_SIDE_MAX, GRID_SIDE_MIN};

pub const TICK_INTERVAL_MS_DEFAULT: u32 = 1000;
pub const TICK_INTERVAL_MS_MIN: u32 = 100;
pub const TICK_INTERVAL_MS_MAX: u32 = 60_000;

pub const ELIGIBILITY_SCALE_DEFAULT: f64 = 10.0;

pub const FREQUENCY_MIN: u32 = 1;
pub const FREQUENCY_MAX: u32 = 100;
pub const FREQUENCY_DEFAULT: u32 = 5;

pub const FEED_CAPACITY_DEFAULT: u32 = 10;
pub const FEED_CAPACITY_MIN: u32 = 1;
pub const FEED_CAPACITY_MAX: u32 = 4096;

#[derive(Debug, Clone, Copy, PartialEq, rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)]
pub struct HuntRules {
    pub tick_interval_ms: u32,
    /// Numerator of the per-tab eligibility draw, `min(1, scale / frequency)`.
    pub eligibility_scale: f64,
    pub default_frequency: u32,
    pub feed_capacity: u32,
    pub default_difficulty: u32,
    pub random_rotation: bool,
}

impl Default for HuntRules {
    fn default() -> Self {
        Self {
            tick_interval_ms: TICK_INTERVAL_MS_DEFAULT,
            eligibility_scale: ELIGIBILITY_SCALE_DEFAULT,
            default_frequency: FREQUENCY_DEFAULT,
            feed_capacity: FEED_CAPACITY_DEFAULT,
            default_difficulty: DEFAULT_DIFFICULTY,
            random_rotation: true,
        }
    }
}

impl HuntRules {
    /// Pulls every field back into its supported range. Persisted settings
    /// pass through here before use.
    pub fn sanitized(mut self) -> Self {
        self.tick_interval_ms = self
            .tick_interval_ms
            .clamp(TICK_INTERVAL_MS_MIN, TICK_INTERVAL_MS_MAX);
        if !self.eligibility_scale.is_finite() || self.eligibility_scale <= 0.0 {
            self.eligibility_scale = ELIGIBILITY_SCALE_DEFAULT;
        }
        self.default_frequency = self.default_frequency.clamp(FREQUENCY_MIN, FREQUENCY_MAX);
        self.feed_capacity = self.feed_capacity.clamp(FEED_CAPACITY_MIN, FEED_CAPACITY_MAX);
        self.default_difficulty = self.default_difficulty.clamp(GRID_SIDE_MIN, GRID_SIDE_MAX);
        self
    }
}
