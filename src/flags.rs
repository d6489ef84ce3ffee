use std::{
    fmt,
    ops::{BitAnd, BitOr, BitOrAssign},
    sync::atomic::{AtomicU32, Ordering},
};

/// Set of state flags of an asynchronous computation.
///
/// Several flags may be set at once, e.g. `STARTED | RUNNING`.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct StateFlags(u32);

impl StateFlags {
    /// No flag set, the computation was not started yet
    pub const NONE: Self = Self(0);
    /// The producer reported the start of the computation
    pub const STARTED: Self = Self(1);
    /// The computation is in progress
    pub const RUNNING: Self = Self(1 << 1);
    /// The computation completed
    pub const FINISHED: Self = Self(1 << 2);
    /// The computation was canceled or failed
    pub const CANCELED: Self = Self(1 << 3);
    /// A pause was requested
    pub const PAUSED: Self = Self(1 << 4);
    /// Advisory backpressure is active
    pub const THROTTLED: Self = Self(1 << 5);

    const NAMES: [(Self, &'static str); 6] = [
        (Self::STARTED, "Started"),
        (Self::RUNNING, "Running"),
        (Self::FINISHED, "Finished"),
        (Self::CANCELED, "Canceled"),
        (Self::PAUSED, "Paused"),
        (Self::THROTTLED, "Throttled"),
    ];

    /// Raw bits of the set
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Whether every flag of `other` is set
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether at least one flag of `other` is set
    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Whether Finished or Canceled is set
    pub fn is_terminal(self) -> bool {
        self.intersects(Self::FINISHED | Self::CANCELED)
    }

    /// The set without the flags of `other`
    pub fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }
}

impl BitOr for StateFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for StateFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for StateFlags {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Debug for StateFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut set = f.debug_set();
        for (flag, name) in Self::NAMES.iter() {
            if self.contains(*flag) {
                set.entry(&format_args!("{}", name));
            }
        }
        set.finish()
    }
}

/* Flags readable without the state lock, only written with it held */
#[derive(Default)]
pub(crate) struct AtomicFlags(AtomicU32);

impl AtomicFlags {
    pub(crate) fn load(&self) -> StateFlags {
        StateFlags(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn insert(&self, flags: StateFlags) {
        self.0.fetch_or(flags.0, Ordering::AcqRel);
    }

    pub(crate) fn remove(&self, flags: StateFlags) {
        self.0.fetch_and(!flags.0, Ordering::AcqRel);
    }

    /* Remove `from` and insert `to` in one step */
    pub(crate) fn switch(&self, from: StateFlags, to: StateFlags) {
        let current = self.load();
        self.0
            .store((current.without(from) | to).0, Ordering::Release);
    }
}
