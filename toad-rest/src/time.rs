use embedded_time::clock;
use embedded_time::duration::Milliseconds;

/// A duration, in milliseconds
pub type Millis = Milliseconds<u64>;

/// Supertrait of [`embedded_time::Clock`] pinning the
/// type of "ticks" to u64
pub trait Clock: embedded_time::Clock<T = u64> {}
impl<C: embedded_time::Clock<T = u64>> Clock for C {}

/// Read the clock, yielding the number of milliseconds
/// since the clock's epoch.
pub fn now<C: Clock>(clock: &C) -> Result<Millis, clock::Error> {
  clock.try_now()
       .and_then(|now| {
         Millis::try_from(now.duration_since_epoch()).map_err(|_| clock::Error::Unspecified)
       })
}

/// Milliseconds elapsed from `earlier` to `later`.
///
/// Saturates to zero if `later` is before `earlier`.
pub const fn elapsed(Milliseconds(earlier): Millis, Milliseconds(later): Millis) -> Millis {
  Milliseconds(later.saturating_sub(earlier))
}

/// A recurring deadline
///
/// ```
/// use embedded_time::duration::Milliseconds;
/// use toad_rest::time::Timer;
///
/// let mut timer = Timer::arm(Milliseconds(1_000), Milliseconds(250));
/// assert!(!timer.expired(Milliseconds(1_249)));
/// assert!(timer.expired(Milliseconds(1_250)));
///
/// // rearming always counts from the moment of rearm
/// timer.rearm(Milliseconds(1_900), Milliseconds(250));
/// assert_eq!(timer.deadline(), Milliseconds(2_150u64));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timer {
  armed_at: Millis,
  period: Millis,
}

impl Timer {
  /// Start a timer at `now` that expires after `period`
  pub const fn arm(now: Millis, period: Millis) -> Self {
    Self { armed_at: now,
           period }
  }

  /// Restart the timer at `now`
  pub fn rearm(&mut self, now: Millis, period: Millis) {
    self.armed_at = now;
    self.period = period;
  }

  /// The instant this timer expires at
  pub const fn deadline(&self) -> Millis {
    Milliseconds(self.armed_at.0.saturating_add(self.period.0))
  }

  /// Has `now` reached the deadline?
  pub const fn expired(&self, now: Millis) -> bool {
    now.0 >= self.deadline().0
  }
}
