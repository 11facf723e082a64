use core::ops::BitOr;

use crate::req::Request;
use crate::time::Millis;

use super::Reply;

/// Capabilities a [`Resource`] declares when registered
///
/// ```
/// use toad_rest::server::Flags;
///
/// let flags = Flags::OBSERVABLE | Flags::PERIODIC;
/// assert!(flags.contains(Flags::PERIODIC));
/// assert!(!flags.contains(Flags::SUB_RESOURCES));
/// ```
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Flags(u8);

impl Flags {
  /// No capabilities
  pub const NONE: Self = Self(0);

  /// The resource also answers requests for paths below it,
  /// e.g. `sensors` answering `sensors/temp`
  pub const SUB_RESOURCES: Self = Self(1);

  /// Successful requests are passed to the [`Observe`](super::Observe) hook
  pub const OBSERVABLE: Self = Self(1 << 1);

  /// The registry calls [`Resource::tick`] every [`Resource::period`]
  pub const PERIODIC: Self = Self(1 << 2);

  /// Are all flags in `other` set in `self`?
  pub const fn contains(&self, other: Self) -> bool {
    self.0 & other.0 == other.0
  }
}

impl BitOr for Flags {
  type Output = Self;

  fn bitor(self, rhs: Self) -> Self {
    Self(self.0 | rhs.0)
  }
}

/// Returned by a method handler the resource does not implement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodNotAllowed;

/// A path-addressable unit exposing method handlers
/// and, optionally, a timer-driven side effect.
///
/// Handlers are synchronous: they write their answer into the
/// [`Reply`] and return. They have no access to the registry and so
/// cannot re-enter dispatch.
///
/// Methods left unimplemented answer `4.05 Method Not Allowed`.
///
/// ```
/// use toad_rest::req::Request;
/// use toad_rest::server::{MethodNotAllowed, Reply, Resource};
///
/// struct Hello;
///
/// impl Resource for Hello {
///   fn get(&mut self, _: &Request, reply: &mut Reply) -> Result<(), MethodNotAllowed> {
///     reply.write(b"hello!");
///     Ok(())
///   }
/// }
/// ```
pub trait Resource {
  /// Capabilities of this resource
  fn flags(&self) -> Flags {
    Flags::NONE
  }

  /// Handle a GET request
  fn get(&mut self, _req: &Request, _reply: &mut Reply<'_>) -> Result<(), MethodNotAllowed> {
    Err(MethodNotAllowed)
  }

  /// Handle a POST request
  fn post(&mut self, _req: &Request, _reply: &mut Reply<'_>) -> Result<(), MethodNotAllowed> {
    Err(MethodNotAllowed)
  }

  /// Handle a PUT request
  fn put(&mut self, _req: &Request, _reply: &mut Reply<'_>) -> Result<(), MethodNotAllowed> {
    Err(MethodNotAllowed)
  }

  /// Handle a DELETE request
  fn delete(&mut self, _req: &Request, _reply: &mut Reply<'_>) -> Result<(), MethodNotAllowed> {
    Err(MethodNotAllowed)
  }

  /// How often [`Resource::tick`] should run.
  ///
  /// Only consulted for resources flagged [`Flags::PERIODIC`];
  /// `None` or a zero period disables the timer.
  fn period(&self) -> Option<Millis> {
    None
  }

  /// Periodic side effect, e.g. sampling a sensor and notifying observers
  fn tick(&mut self) {}
}
