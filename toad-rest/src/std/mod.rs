use embedded_time::rate::Fraction;

/// Networking! woohoo!
///
/// Implements [`Socket`](crate::net::Socket) for [`std::net::UdpSocket`].
pub mod net;

/// Implement [`embedded_time::Clock`] using [`std::time`] primitives
#[derive(Debug, Clone, Copy)]
pub struct Clock(std::time::Instant);

impl Default for Clock {
  fn default() -> Self {
    Self::new()
  }
}

impl Clock {
  /// Create a new clock
  pub fn new() -> Self {
    Self(std::time::Instant::now())
  }
}

impl embedded_time::Clock for Clock {
  type T = u64;

  // microseconds
  const SCALING_FACTOR: Fraction = Fraction::new(1, 1_000_000);

  fn try_now(&self) -> Result<embedded_time::Instant<Self>, embedded_time::clock::Error> {
    let now = std::time::Instant::now();
    let elapsed = now.duration_since(self.0);
    Ok(embedded_time::Instant::new(elapsed.as_micros() as u64))
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::time;

  #[test]
  fn clock_counts_up_in_millis() {
    let clock = Clock::new();
    let before = time::now(&clock).unwrap();
    ::std::thread::sleep(::std::time::Duration::from_millis(5));
    let after = time::now(&clock).unwrap();

    assert!(after.0 >= before.0 + 5);
  }
}
