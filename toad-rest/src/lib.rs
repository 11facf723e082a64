//! `toad-rest` is the request/response core of a constrained-device CoAP stack.
//!
//! It is made of three pieces that share one cooperative, single-threaded runtime:
//! - a [resource registry & dispatcher](crate::server) that routes incoming requests
//!   to handlers and drives periodic resources from timers,
//! - a [transport multiplexer](crate::transport) unifying a plaintext datagram socket and a
//!   DTLS-secured channel behind one [`Endpoint`](crate::endpoint::Endpoint) abstraction,
//!   with [pre-shared key lookup](crate::keystore) keyed by peer,
//! - a [blocking request engine](crate::client) performing block-wise transfer with
//!   bounded retry.
//!
//! [`core::Core`](crate::core::Core) glues these together with a
//! [transaction table](crate::core::transaction) tracking outstanding requests.
//!
//! ## Scheduling
//! Nothing in this crate spawns threads or blocks on I/O. Sockets are polled with
//! [`nb`], timers are compared against an [`embedded_time::Clock`], and the only place that
//! "waits" is the explicit resume point of [`client::BlockingRequest`].
//!
//! ## DTLS
//! Record-layer cryptography is out of scope; a [`transport::SecureChannel`] implementation
//! is plugged in by the platform, and this crate supplies it with credentials
//! through [`keystore::Keystore`].

// x-release-please-version
#![doc(html_root_url = "https://docs.rs/toad-rest/0.1.0")]
// x-release-please-end
#![cfg_attr(any(docsrs, feature = "docs"), feature(doc_cfg))]
// -
// style
#![allow(clippy::unused_unit)]
// -
// deny
#![deny(missing_docs)]
#![deny(missing_debug_implementations)]
#![deny(missing_copy_implementations)]
#![cfg_attr(not(test), deny(unsafe_code))]
// -
// warnings
#![cfg_attr(not(test), warn(unreachable_pub))]
// -
// features
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc as std_alloc;


pub(crate) mod logging;

/// Block-wise transfer option values
pub mod block;

/// configuring runtime behavior
pub mod config;

/// peer identity
pub mod endpoint;

/// pre-shared key lookup for secure channels
pub mod keystore;

/// network abstractions
pub mod net;

/// time abstractions
pub mod time;

/// customizable retrying of fallible operations
pub mod retry;

/// requests
pub mod req;

/// responses
pub mod resp;

/// resource registry & request dispatch
pub mod server;

/// plaintext / secure datagram multiplexing
pub mod transport;

/// transaction bookkeeping and the polling runtime
pub mod core;

/// blocking, block-wise client requests
pub mod client;

/// `std`-only toad-rest stuff
#[cfg(feature = "std")]
#[cfg_attr(docsrs, doc(cfg(feature = "std")))]
pub mod std;

mod option;

pub use option::ContentFormat;

/// CoAP message with heap-allocated payload & options
pub type Message = toad_msg::alloc::Message;

macro_rules! code {
  (rfc7252($section:literal) $name:ident = $c:literal * $d:literal) => {
    #[doc = toad_macros::rfc_7252_doc!($section)]
    #[allow(clippy::zero_prefixed_literal)]
    pub const $name: toad_msg::Code = toad_msg::Code::new($c, $d);
  };
}

pub(crate) use code;
