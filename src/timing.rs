/// Slot timings of the 1-Wire bus in ticks of a quarter microsecond.
///
/// The letters follow the naming of Maxim application note 126. All values
/// are minimums: waiting longer is tolerated by the slaves, waiting shorter
/// is not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Low time of a write-1 slot and of a read slot
    pub a: u32,
    /// Recovery after a write-1 slot
    pub b: u32,
    /// Low time of a write-0 slot
    pub c: u32,
    /// Recovery after a write-0 slot
    pub d: u32,
    /// Release to sample in a read slot
    pub e: u32,
    /// Remainder of a read slot after sampling
    pub f: u32,
    /// Idle time before a reset pulse
    pub g: u32,
    /// Reset pulse low time
    pub h: u32,
    /// Release to presence sample
    pub i: u32,
    /// Presence sample to end of the reset sequence
    pub j: u32,
}

impl Timing {
    /// Nanoseconds per tick
    pub const TICK_NS: u32 = 250;

    /// Standard speed profile
    pub const STANDARD: Timing = Timing {
        a: 6 * 4,
        b: 64 * 4,
        c: 60 * 4,
        d: 10 * 4,
        e: 9 * 4,
        f: 55 * 4,
        g: 0,
        h: 480 * 4,
        i: 70 * 4,
        j: 410 * 4,
    };

    /// Converts a tick count to nanoseconds, saturating at `u32::MAX`.
    pub const fn ticks_to_ns(ticks: u32) -> u32 {
        ticks.saturating_mul(Self::TICK_NS)
    }

    /// Duration of a whole bit slot, which is the same for all three kinds of slots.
    pub const fn slot_ticks(&self) -> u32 {
        self.a + self.b
    }
}

impl Default for Timing {
    fn default() -> Self {
        Self::STANDARD
    }
}
