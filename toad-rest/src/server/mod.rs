use embedded_time::clock;
use tinyvec::ArrayVec;

use crate::req::{Method, Request};
use crate::resp::{code, Response};
use crate::time::{self, Clock, Millis, Timer};

mod reply;
mod resource;

#[doc(inline)]
pub use reply::{Observe, Reply};
#[doc(inline)]
pub use resource::{Flags, MethodNotAllowed, Resource};

/// Handle to a registered resource, valid until [`Registry::teardown`]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceId(usize);

/// Errors encounterable registering a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterError {
  /// The registry has no free slot
  Full,
  /// The resource is periodic, and reading the clock to arm its timer failed.
  ///
  /// See [`embedded_time::clock::Error`]
  Clock,
}

struct Entry<'a> {
  path: &'a str,
  flags: Flags,
  resource: &'a mut dyn Resource,
}

impl<'a> core::fmt::Debug for Entry<'a> {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    f.debug_struct("Entry")
     .field("path", &self.path)
     .field("flags", &self.flags)
     .finish()
  }
}

impl<'a> Entry<'a> {
  fn matches(&self, path: &str) -> bool {
    match path.strip_prefix(self.path) {
      | Some("") => true,
      | Some(rest) => self.flags.contains(Flags::SUB_RESOURCES) && rest.starts_with('/'),
      | None => false,
    }
  }

  fn period(&self) -> Option<Millis> {
    match self.resource.period() {
      | Some(p) if self.resource.flags().contains(Flags::PERIODIC) && p.0 > 0 => Some(p),
      | _ => None,
    }
  }
}

#[derive(Debug, Clone, Copy)]
struct Periodic {
  resource: ResourceId,
  timer: Timer,
}

/// The set of resources served by this node, in registration order,
/// along with the timers driving periodic resources.
///
/// Registering happens at startup; afterwards the registry is
/// only read by [`Registry::dispatch`] and written by [`Registry::poll_timers`].
///
/// ```
/// use toad_rest::req::Request;
/// use toad_rest::resp::{code, Response};
/// use toad_rest::server::{MethodNotAllowed, Registry, Reply, Resource};
/// # use embedded_time::{Clock, Instant, rate::Fraction};
/// # #[derive(Debug)]
/// # struct Zero;
/// # impl Clock for Zero {
/// #   type T = u64;
/// #   const SCALING_FACTOR: Fraction = Fraction::new(1, 1000);
/// #   fn try_now(&self) -> Result<Instant<Self>, embedded_time::clock::Error> { Ok(Instant::new(0)) }
/// # }
///
/// struct Hello;
///
/// impl Resource for Hello {
///   fn get(&mut self, _: &Request, reply: &mut Reply) -> Result<(), MethodNotAllowed> {
///     reply.write(b"hello!");
///     Ok(())
///   }
/// }
///
/// let clock = Zero;
/// let mut hello = Hello;
/// let mut registry = Registry::<_, 4>::new(&clock);
/// registry.register("hello", &mut hello).unwrap();
/// registry.init();
///
/// let req = Request::get("hello");
/// let mut resp = Response::for_request(&req);
/// assert!(registry.dispatch(&req, &mut Reply::new(&req, &mut resp, 64)));
/// assert_eq!(resp.payload(), b"hello!");
///
/// let req = Request::delete("hello");
/// let mut resp = Response::for_request(&req);
/// assert!(!registry.dispatch(&req, &mut Reply::new(&req, &mut resp, 64)));
/// assert_eq!(resp.code(), code::METHOD_NOT_ALLOWED);
/// ```
#[derive(Debug)]
pub struct Registry<'a, C, const N: usize> {
  clock: &'a C,
  entries: ArrayVec<[Option<Entry<'a>>; N]>,
  timers: ArrayVec<[Option<Periodic>; N]>,
  initialized: bool,
}

impl<'a, C: Clock, const N: usize> Registry<'a, C, N> {
  /// Create an empty, uninitialized registry
  pub fn new(clock: &'a C) -> Self {
    Self { clock,
           entries: Default::default(),
           timers: Default::default(),
           initialized: false }
  }

  /// Mark the registry as ready to serve requests and run periodic handlers.
  ///
  /// Calling this more than once has no further effect.
  pub fn init(&mut self) {
    if self.initialized {
      log::warn!("registry already initialized");
      return;
    }

    log::debug!("registry initialized with {} resources", self.entries.len());
    self.initialized = true;
  }

  /// Has [`Registry::init`] been called (since the last [`Registry::teardown`])?
  pub fn is_initialized(&self) -> bool {
    self.initialized
  }

  /// Release every resource and timer, returning the registry to
  /// the state [`Registry::new`] created it in.
  pub fn teardown(&mut self) {
    log::debug!("tearing down {} resources, {} timers",
                self.entries.len(),
                self.timers.len());
    self.entries.clear();
    self.timers.clear();
    self.initialized = false;
  }

  /// Bind `path` (e.g. `"sensors/temp"`, without leading `/`) to a resource.
  ///
  /// Resources are matched in registration order. If the resource
  /// is [periodic](Flags::PERIODIC) with a non-zero [period](Resource::period),
  /// its timer is armed now.
  pub fn register(&mut self,
                  path: &'a str,
                  resource: &'a mut dyn Resource)
                  -> Result<ResourceId, RegisterError> {
    if self.entries.len() >= N {
      log::warn!("no room to register {}", path);
      return Err(RegisterError::Full);
    }

    let entry = Entry { path,
                        flags: resource.flags(),
                        resource };
    let id = ResourceId(self.entries.len());

    if let Some(period) = entry.period() {
      let now = time::now(self.clock).map_err(|_| RegisterError::Clock)?;
      log::trace!("arming {} every {}ms", path, period.0);
      self.timers.push(Some(Periodic { resource: id,
                                       timer: Timer::arm(now, period) }));
    }

    log::debug!("registered {} ({:?})", path, entry.flags);
    self.entries.push(Some(entry));
    Ok(id)
  }

  /// Number of registered resources
  pub fn len(&self) -> usize {
    self.entries.len()
  }

  /// Is nothing registered?
  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// The path a resource was registered at
  pub fn path(&self, id: ResourceId) -> Option<&'a str> {
    self.entries
        .get(id.0)
        .and_then(Option::as_ref)
        .map(|e| e.path)
  }

  /// [`Registry::dispatch_with`] without an observe hook
  pub fn dispatch(&mut self, req: &Request, reply: &mut Reply<'_>) -> bool {
    self.dispatch_with(req, reply, &mut ())
  }

  /// Route a request to the first resource matching its path.
  ///
  /// A resource matches when its path equals the request path, or when it
  /// supports [sub-resources](Flags::SUB_RESOURCES) and the request path
  /// continues it after a `/`.
  ///
  /// - no match: the reply gets `4.04 Not Found`
  /// - the resource does not handle the method: `4.05 Method Not Allowed`
  /// - the registry is not initialized: `5.03 Service Unavailable`
  ///
  /// After a successful handler on an [observable](Flags::OBSERVABLE) resource,
  /// `observe` is invoked.
  ///
  /// Returns whether a handler accepted the request.
  pub fn dispatch_with(&mut self,
                       req: &Request,
                       reply: &mut Reply<'_>,
                       observe: &mut impl Observe)
                       -> bool {
    let path = req.path();

    if !self.initialized {
      log::debug!("{} before init", path);
      reply.set_code(code::SERVICE_UNAVAILABLE);
      return false;
    }

    let entry = match self.entries
                          .iter_mut()
                          .flatten()
                          .find(|e| e.matches(&path))
    {
      | Some(entry) => entry,
      | None => {
        log::debug!("{} not found", path);
        reply.set_code(code::NOT_FOUND);
        return false;
      },
    };

    let handled = match req.method() {
      | Some(Method::Get) => entry.resource.get(req, reply),
      | Some(Method::Post) => entry.resource.post(req, reply),
      | Some(Method::Put) => entry.resource.put(req, reply),
      | Some(Method::Delete) => entry.resource.delete(req, reply),
      | None => Err(MethodNotAllowed),
    };

    match handled {
      | Ok(()) => {
        log::debug!("{:?} {} handled by {}", req.method(), path, entry.path);
        if entry.flags.contains(Flags::OBSERVABLE) {
          observe.subscribe(entry.path, req, reply.response());
        }
        true
      },
      | Err(MethodNotAllowed) => {
        log::debug!("{:?} {} not allowed by {}", req.method(), path, entry.path);
        let resp: &mut Response = reply.response();
        resp.set_payload(core::iter::empty());
        resp.set_code(code::METHOD_NOT_ALLOWED);
        false
      },
    }
  }

  /// Earliest deadline among armed periodic timers
  pub fn next_deadline(&self) -> Option<Millis> {
    self.timers
        .iter()
        .flatten()
        .map(|p| p.timer.deadline())
        .min()
  }

  /// Fire every expired periodic timer, in deadline order.
  ///
  /// Each fired timer is re-armed once, counting from now; missed
  /// periods are not caught up. Handlers are skipped (but timers
  /// still re-armed) while the registry is not initialized, and a
  /// timer whose resource stopped being periodic is dropped.
  ///
  /// Returns the number of handlers invoked.
  pub fn poll_timers(&mut self) -> Result<usize, clock::Error> {
    let now = time::now(self.clock)?;

    let mut expired: ArrayVec<[(u64, usize); N]> = Default::default();
    self.timers
        .iter()
        .enumerate()
        .filter_map(|(ix, p)| p.as_ref().map(|p| (ix, p)))
        .filter(|(_, p)| p.timer.expired(now))
        .for_each(|(ix, p)| expired.push((p.timer.deadline().0, ix)));
    expired.sort_unstable();

    let mut fired = 0;
    for (_, ix) in expired {
      let periodic = match self.timers[ix].as_mut() {
        | Some(p) => p,
        | None => continue,
      };

      let entry = match self.entries
                            .get_mut(periodic.resource.0)
                            .and_then(Option::as_mut)
      {
        | Some(e) => e,
        | None => {
          self.timers[ix] = None;
          continue;
        },
      };

      let period = match entry.period() {
        | Some(p) => p,
        | None => {
          log::trace!("{} no longer periodic", entry.path);
          self.timers[ix] = None;
          continue;
        },
      };

      if self.initialized {
        log::trace!("tick {}", entry.path);
        entry.resource.tick();
        fired += 1;
      }

      periodic.timer.rearm(now, period);
    }

    Ok(fired)
  }
}
