use core::ops::RangeInclusive;

use embedded_time::duration::Milliseconds;
use rand::{Rng, SeedableRng};

use crate::time::{self, Millis};

/// A non-blocking timer that decides when an outstanding
/// transaction should be retransmitted, and when to give up.
///
/// It does not _contain_ the packet to resend; it lives alongside
/// it in a [`Transaction`](crate::core::transaction::Transaction).
///
/// ```
/// use embedded_time::duration::Milliseconds;
/// use toad_rest::retry::{Attempts, RetryTimer, Strategy, YouShould};
///
/// let strategy = Strategy::Delay { min: Milliseconds(100),
///                                  max: Milliseconds(100) };
/// let mut retry = RetryTimer::new(Milliseconds(0), strategy, Attempts(2));
///
/// assert_eq!(retry.what_should_i_do(Milliseconds(50)),
///            Err(nb::Error::WouldBlock));
/// assert_eq!(retry.what_should_i_do(Milliseconds(100)),
///            Ok(YouShould::Retry));
/// assert_eq!(retry.what_should_i_do(Milliseconds(200)), Ok(YouShould::Cry));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryTimer {
  start: Millis,
  init: Millis,
  strategy: Strategy,
  attempts: Attempts,
  max_attempts: Attempts,
}

/// A number of attempts
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Attempts(pub u16);

/// Result of [`RetryTimer.what_should_i_do`].
///
/// This tells you if a retry should be attempted or not.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum YouShould {
  /// Attempts have been exhausted and the transaction
  /// should be completed without a response.
  Cry,
  /// The packet should be sent again
  Retry,
}

impl RetryTimer {
  /// Create a new retrier, considering `start` to be the moment of the first attempt.
  pub fn new(start: Millis, strategy: Strategy, max_attempts: Attempts) -> Self {
    let init = if strategy.has_jitter() {
      let mut rand = rand_chacha::ChaCha8Rng::seed_from_u64(start.0);
      Milliseconds(rand.gen_range(strategy.range()))
    } else {
      Milliseconds(*strategy.range().start())
    };

    Self { start,
           strategy,
           init,
           max_attempts,
           attempts: Attempts(1) }
  }

  /// Number of attempts made so far (including the first)
  pub fn attempts(&self) -> Attempts {
    self.attempts
  }

  /// When the thing we keep trying has not yet succeeded, invoke this to
  /// tell the retrytimer "still nothing! what do I do??"
  ///
  /// Returns `nb::Error::WouldBlock` when we have not yet
  /// waited the appropriate amount of time to retry.
  pub fn what_should_i_do(&mut self,
                          now: Millis)
                          -> nb::Result<YouShould, core::convert::Infallible> {
    if self.attempts >= self.max_attempts {
      if self.is_ready(time::elapsed(self.start, now), self.attempts.0) {
        Ok(YouShould::Cry)
      } else {
        Err(nb::Error::WouldBlock)
      }
    } else if self.is_ready(time::elapsed(self.start, now), self.attempts.0) {
      self.attempts.0 += 1;
      Ok(YouShould::Retry)
    } else {
      Err(nb::Error::WouldBlock)
    }
  }

  /// Check if the strategy says an appropriate time has passed
  pub fn is_ready(&self, Milliseconds(time_passed): Millis, attempts: u16) -> bool {
    if attempts == 0 {
      return true;
    }

    match self.strategy {
      | Strategy::Delay { .. } => time_passed >= self.init.0 * attempts as u64,
      | Strategy::Exponential { .. } => {
        time_passed >= Strategy::total_delay_exp(self.init, attempts)
      },
    }
  }
}

/// Strategy to employ when retrying
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Strategy {
  /// Generate a random delay between `min` and `max`,
  /// and wait until this delay has passed between attempts.
  ///
  /// After each failed attempt, double the delay before retrying again.
  Exponential {
    /// Minimum (inclusive) delay for second attempt
    init_min: Millis,
    /// Maximum (inclusive) delay for second attempt
    init_max: Millis,
  },
  /// Generate a random delay between `min` and `max`,
  /// and wait until this delay has passed between attempts.
  Delay {
    /// Minimum (inclusive) delay for attempts
    min: Millis,
    /// Maximum (inclusive) delay for attempts
    max: Millis,
  },
}

impl Strategy {
  /// Are min & max delays the same? if so, we should probably skip the random number generation.
  pub fn has_jitter(&self) -> bool {
    let rng = self.range();
    rng.start() != rng.end()
  }

  /// Get the min & max durations as an inclusive range
  pub fn range(&self) -> RangeInclusive<u64> {
    match self {
      | &Self::Delay { min: Milliseconds(min),
                       max: Milliseconds(max), } => min..=max,

      | &Self::Exponential { init_min: Milliseconds(min),
                             init_max: Milliseconds(max), } => min..=max,
    }
  }

  /// Get the amount of time this strategy will take if all attempts fail
  pub fn max_time(&self, max_attempts: Attempts) -> Millis {
    Milliseconds(match self {
                   | Self::Exponential { init_max, .. } => {
                     Self::total_delay_exp(*init_max, max_attempts.0)
                   },
                   | Self::Delay { max: Milliseconds(max),
                                   .. } => max * max_attempts.0 as u64,
                 })
  }

  /// Given the initial delay and number of attempts that have been performed,
  /// yields the total delay (since the first attempt) until the next one.
  const fn total_delay_exp(Milliseconds(init): Millis, attempt: u16) -> u64 {
    // | attempt | total delay      |
    // | 1       | init             |
    // | 2       | init * 3         |
    // | 3       | init * 7         |
    // | n       | init * (2^n - 1) |
    init * (2u64.pow(attempt as u32) - 1)
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn delay_retrier() {
    let mut retry = RetryTimer::new(Milliseconds(0),
                                    Strategy::Delay { min: Milliseconds(1000),
                                                      max: Milliseconds(1000) },
                                    Attempts(3));

    // attempt 1 happens before asking what_should_i_do
    assert_eq!(retry.what_should_i_do(Milliseconds(999)),
               Err(nb::Error::WouldBlock));
    assert_eq!(retry.what_should_i_do(Milliseconds(1000)),
               Ok(YouShould::Retry));
    assert_eq!(retry.attempts(), Attempts(2));

    assert_eq!(retry.what_should_i_do(Milliseconds(1999)),
               Err(nb::Error::WouldBlock));
    assert_eq!(retry.what_should_i_do(Milliseconds(2000)),
               Ok(YouShould::Retry));

    // the last attempt still gets its full delay before giving up
    assert_eq!(retry.what_should_i_do(Milliseconds(2999)),
               Err(nb::Error::WouldBlock));
    assert_eq!(retry.what_should_i_do(Milliseconds(3000)), Ok(YouShould::Cry));
  }

  #[test]
  fn exponential_retrier() {
    let mut retry = RetryTimer::new(Milliseconds(0),
                                    Strategy::Exponential { init_min: Milliseconds(1000),
                                                            init_max: Milliseconds(1000) },
                                    Attempts(4));

    assert_eq!(retry.what_should_i_do(Milliseconds(999)),
               Err(nb::Error::WouldBlock));
    assert_eq!(retry.what_should_i_do(Milliseconds(1000)),
               Ok(YouShould::Retry));

    assert_eq!(retry.what_should_i_do(Milliseconds(2999)),
               Err(nb::Error::WouldBlock));
    assert_eq!(retry.what_should_i_do(Milliseconds(3000)),
               Ok(YouShould::Retry));

    assert_eq!(retry.what_should_i_do(Milliseconds(6999)),
               Err(nb::Error::WouldBlock));
    assert_eq!(retry.what_should_i_do(Milliseconds(7000)),
               Ok(YouShould::Retry));

    assert_eq!(retry.what_should_i_do(Milliseconds(15_000)),
               Ok(YouShould::Cry));
  }

  #[test]
  fn jittered_init_stays_in_range() {
    let strategy = Strategy::Exponential { init_min: Milliseconds(500),
                                           init_max: Milliseconds(1000) };

    for start in 0..32u64 {
      let retry = RetryTimer::new(Milliseconds(start * 7919), strategy, Attempts(4));
      assert!(strategy.range().contains(&retry.init.0));
    }
  }

  #[test]
  fn exp_calculation() {
    let init = Milliseconds(100);
    assert_eq!(Strategy::total_delay_exp(init, 1), 100);
    assert_eq!(Strategy::total_delay_exp(init, 2), 300);
    assert_eq!(Strategy::total_delay_exp(init, 3), 700);
  }
}
