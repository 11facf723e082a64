use tinyvec::ArrayVec;

use crate::config::Config;
use crate::endpoint::Endpoint;
use crate::logging;

/// Pre-shared key information exchanged with a [`CredentialSource`].
///
/// The secure channel fills in what the peer told it (a hint, or the identity
/// the peer presented), the source fills in what is being asked for.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PskInfo<'a> {
  /// Identity hint sent by the server, if any
  pub identity_hint: Option<&'a [u8]>,
  /// Our identity (when `None` or empty, the identity is being asked for)
  pub identity: Option<&'a [u8]>,
  /// Key for `identity`
  pub key: Option<&'a [u8]>,
}

/// Something that knows which pre-shared keys to use with which peers.
///
/// Implementors are registered once at startup with [`Keystore::set_source`].
pub trait CredentialSource {
  /// Resolve credentials for `peer`.
  ///
  /// - If `info.identity` is unset or empty, set it to our identity for this peer.
  /// - Otherwise set `info.key` to the key for that identity, if it is known.
  ///
  /// Returns whether anything was found.
  fn psk_info<'a>(&'a self, peer: &Endpoint, info: &mut PskInfo<'a>) -> bool;
}

/// What the secure channel is asking for during a handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialRequest<'a> {
  /// "What identity should I present to this peer?"
  Identity {
    /// PSK identity hint the server sent, if any
    hint: Option<&'a [u8]>,
  },
  /// "What key belongs to this identity?"
  Key {
    /// Identity presented during the handshake
    identity: &'a [u8],
  },
}

/// DTLS alert a failed lookup should abort the handshake with
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Alert {
  /// `illegal_parameter(47)`
  IllegalParameter,
  /// `internal_error(80)`
  InternalError,
}

/// Errors encounterable looking up credentials
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CredentialError {
  /// No credential source is registered, and the
  /// default PSK is disabled
  NoKeystore,
  /// No identity is known for this peer
  NoIdentity,
  /// A key was requested for an identity we don't know
  UnknownIdentity,
  /// The resolved credential does not fit in the caller's buffer
  BufferTooSmall {
    /// Length of the credential
    needed: usize,
    /// Length of the buffer
    capacity: usize,
  },
}

impl CredentialError {
  /// The fatal alert the handshake should be aborted with, if any.
  ///
  /// Errors without an alert simply fail the lookup.
  pub fn alert(&self) -> Option<Alert> {
    match self {
      | Self::NoKeystore | Self::NoIdentity => None,
      | Self::UnknownIdentity => Some(Alert::IllegalParameter),
      | Self::BufferTooSmall { .. } => Some(Alert::InternalError),
    }
  }
}

/// Resolves pre-shared keys on behalf of the secure channel
/// by consulting a pluggable [`CredentialSource`].
///
/// ```
/// use toad_rest::endpoint::Endpoint;
/// use toad_rest::keystore::{CredentialError, CredentialRequest, Keystore, PskEntry, PskTable};
///
/// let server = Endpoint::parse("coaps://[fd00::1]").unwrap();
///
/// let mut table = PskTable::<2>::new();
/// table.add(PskEntry::psk("coaps://[fd00::1]", b"device-7", b"s3cr3t"))
///      .unwrap();
///
/// let mut keystore = Keystore::new();
/// keystore.set_source(&table);
///
/// let mut buf = [0u8; 32];
/// let n = keystore.lookup(&server, CredentialRequest::Identity { hint: None }, &mut buf)
///                 .unwrap();
/// assert_eq!(&buf[..n], b"device-7");
///
/// let n = keystore.lookup(&server,
///                         CredentialRequest::Key { identity: b"device-7" },
///                         &mut buf)
///                 .unwrap();
/// assert_eq!(&buf[..n], b"s3cr3t");
///
/// let stranger = Endpoint::parse("coaps://[fd00::2]").unwrap();
/// assert_eq!(keystore.lookup(&stranger, CredentialRequest::Identity { hint: None }, &mut buf),
///            Err(CredentialError::NoIdentity));
/// ```
#[derive(Clone, Copy, Default)]
pub struct Keystore<'a> {
  source: Option<&'a dyn CredentialSource>,
  default_psk: bool,
}

impl<'a> core::fmt::Debug for Keystore<'a> {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    f.debug_struct("Keystore")
     .field("source", &self.source.map(|_| "<dyn CredentialSource>"))
     .field("default_psk", &self.default_psk)
     .finish()
  }
}

impl<'a> Keystore<'a> {
  /// A keystore with no credential source and the default PSK disabled
  pub fn new() -> Self {
    Self::default()
  }

  /// A keystore with no credential source, using the default PSK
  /// if [`Config::default_psk`] allows it.
  pub fn from_config(config: &Config) -> Self {
    Self { source: None,
           default_psk: config.default_psk }
  }

  /// Register the credential source
  pub fn set_source(&mut self, source: &'a dyn CredentialSource) {
    self.source = Some(source);
  }

  /// Is a credential source registered?
  pub fn has_source(&self) -> bool {
    self.source.is_some()
  }

  /// Resolve an identity or key for `peer`, copying it into `out`
  /// and yielding its length.
  ///
  /// The credential is never truncated; if it does not fit in `out`
  /// the lookup fails with [`CredentialError::BufferTooSmall`].
  pub fn lookup(&self,
                peer: &Endpoint,
                request: CredentialRequest<'_>,
                out: &mut [u8])
                -> Result<usize, CredentialError> {
    let source: &dyn CredentialSource = match (self.source, self.default_psk) {
      | (Some(source), _) => source,
      | (None, true) => &DefaultPsk,
      | (None, false) => {
        log::debug!("no credential source for {}", logging::endpoint(peer));
        return Err(CredentialError::NoKeystore);
      },
    };

    let found = match request {
      | CredentialRequest::Identity { hint } => {
        let mut info = PskInfo { identity_hint: hint.filter(|h| !h.is_empty()),
                                 ..PskInfo::default() };
        source.psk_info(peer, &mut info);
        info.identity
            .filter(|id| !id.is_empty())
            .ok_or(CredentialError::NoIdentity)
      },
      | CredentialRequest::Key { identity } => {
        let mut info = PskInfo { identity: Some(identity),
                                 ..PskInfo::default() };
        source.psk_info(peer, &mut info);
        info.key
            .filter(|key| !key.is_empty())
            .ok_or(CredentialError::UnknownIdentity)
      },
    };

    let found = found.map_err(|e| {
                       log::debug!("credential lookup for {} failed: {:?}",
                                   logging::endpoint(peer),
                                   e);
                       e
                     })?;

    if found.len() > out.len() {
      log::warn!("credential for {} does not fit in {} bytes",
                 logging::endpoint(peer),
                 out.len());
      return Err(CredentialError::BufferTooSmall { needed: found.len(),
                                                   capacity: out.len() });
    }

    out[..found.len()].copy_from_slice(found);
    Ok(found.len())
  }
}

/// Well-known PSK identity & key, usable with any peer.
///
/// Only consulted when no credential source is registered and
/// [`Config::default_psk`] is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultPsk;

impl DefaultPsk {
  /// `Client_identity`
  pub const IDENTITY: &'static [u8] = b"Client_identity";
  /// `secretPSK`
  pub const KEY: &'static [u8] = b"secretPSK";
}

impl CredentialSource for DefaultPsk {
  fn psk_info<'a>(&'a self, _: &Endpoint, info: &mut PskInfo<'a>) -> bool {
    match info.identity {
      | None | Some([]) => {
        info.identity = Some(Self::IDENTITY);
        true
      },
      | Some(id) if id == Self::IDENTITY => {
        info.key = Some(Self::KEY);
        true
      },
      | Some(_) => false,
    }
  }
}

/// How a server entry expects us to authenticate
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SecurityMode {
  /// Pre-shared key
  Psk,
  /// Raw public key
  RawPublicKey,
  /// X.509 certificate
  Certificate,
  /// No security
  NoSec,
}

impl Default for SecurityMode {
  fn default() -> Self {
    Self::NoSec
  }
}

/// Security settings for one server
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PskEntry<'a> {
  /// URI of the server, e.g. `coaps://[fd00::1]:5684`
  pub server_uri: &'a str,
  /// Authentication mode; only [`SecurityMode::Psk`] entries are used for lookups.
  pub mode: SecurityMode,
  /// PSK identity we present to this server
  pub identity: &'a [u8],
  /// PSK shared with this server
  pub key: &'a [u8],
}

impl<'a> PskEntry<'a> {
  /// Create a PSK-mode entry
  pub fn psk(server_uri: &'a str, identity: &'a [u8], key: &'a [u8]) -> Self {
    Self { server_uri,
           mode: SecurityMode::Psk,
           identity,
           key }
  }
}

/// A fixed-capacity table of per-server security settings,
/// usable as a [`CredentialSource`].
///
/// Entries match a peer when their URI parses to an [`Endpoint`]
/// equal to the peer (address, port and security flag).
#[derive(Debug, Clone, Default)]
pub struct PskTable<'a, const N: usize> {
  entries: ArrayVec<[Option<PskEntry<'a>>; N]>,
}

impl<'a, const N: usize> PskTable<'a, N> {
  /// An empty table
  pub fn new() -> Self {
    Self { entries: ArrayVec::new() }
  }

  /// Add an entry, yielding it back if the table is full
  pub fn add(&mut self, entry: PskEntry<'a>) -> Result<(), PskEntry<'a>> {
    match self.entries.try_push(Some(entry)) {
      | None => Ok(()),
      | Some(rejected) => Err(rejected.unwrap_or(entry)),
    }
  }

  /// Iterate over the entries in insertion order
  pub fn entries(&self) -> impl Iterator<Item = &PskEntry<'a>> {
    self.entries.iter().flatten()
  }

  fn find(&self, peer: &Endpoint, identity: Option<&[u8]>) -> Option<&PskEntry<'a>> {
    self.entries().find(|e| {
                    if e.server_uri.is_empty() || e.mode != SecurityMode::Psk {
                      return false;
                    }

                    match Endpoint::parse(e.server_uri) {
                      | Ok(ep) if ep == *peer => (),
                      | Ok(_) => return false,
                      | Err(err) => {
                        log::debug!("skipping security entry with bad uri {:?}: {:?}",
                                    e.server_uri,
                                    err);
                        return false;
                      },
                    }

                    identity.map(|id| id == e.identity).unwrap_or(true)
                  })
  }
}

impl<'t, const N: usize> CredentialSource for PskTable<'t, N> {
  fn psk_info<'a>(&'a self, peer: &Endpoint, info: &mut PskInfo<'a>) -> bool {
    let identity = info.identity.filter(|id| !id.is_empty());

    match (self.find(peer, identity), identity) {
      | (None, _) => false,
      | (Some(entry), None) => {
        info.identity = Some(entry.identity);
        true
      },
      | (Some(entry), Some(_)) if entry.key.is_empty() => false,
      | (Some(entry), Some(_)) => {
        info.key = Some(entry.key);
        true
      },
    }
  }
}

#[cfg(test)]
mod test {
  use super::*;

  fn server(uri: &str) -> Endpoint {
    Endpoint::parse(uri).unwrap()
  }

  #[test]
  fn no_source_no_credential() {
    let keys = Keystore::new();
    let mut buf = [0u8; 16];
    assert_eq!(keys.lookup(&server("coaps://[::1]"),
                           CredentialRequest::Identity { hint: None },
                           &mut buf),
               Err(CredentialError::NoKeystore));
  }

  #[test]
  fn default_psk_only_when_enabled() {
    let mut config = Config::default();
    let mut buf = [0u8; 16];
    let peer = server("coaps://[::1]");

    assert_eq!(Keystore::from_config(&config).lookup(&peer,
                                                     CredentialRequest::Identity { hint: None },
                                                     &mut buf),
               Err(CredentialError::NoKeystore));

    config.default_psk = true;
    let keys = Keystore::from_config(&config);

    let n = keys.lookup(&peer, CredentialRequest::Identity { hint: Some(b"hint") }, &mut buf)
                .unwrap();
    assert_eq!(&buf[..n], DefaultPsk::IDENTITY);

    let n = keys.lookup(&peer,
                        CredentialRequest::Key { identity: DefaultPsk::IDENTITY },
                        &mut buf)
                .unwrap();
    assert_eq!(&buf[..n], DefaultPsk::KEY);

    let err = keys.lookup(&peer, CredentialRequest::Key { identity: b"mallory" }, &mut buf)
                  .unwrap_err();
    assert_eq!(err, CredentialError::UnknownIdentity);
    assert_eq!(err.alert(), Some(Alert::IllegalParameter));
  }

  #[test]
  fn registered_source_shadows_default() {
    let table = PskTable::<1>::new();
    let mut keys = Keystore::from_config(&Config { default_psk: true,
                                                   ..Config::default() });
    keys.set_source(&table);

    let mut buf = [0u8; 16];
    assert_eq!(keys.lookup(&server("coaps://[::1]"),
                           CredentialRequest::Identity { hint: None },
                           &mut buf),
               Err(CredentialError::NoIdentity));
  }

  #[test]
  fn no_credential_for_other_peer() {
    let mut table = PskTable::<4>::new();
    table.add(PskEntry::psk("coaps://[fd00::1]", b"me", b"key"))
         .unwrap();

    let mut keys = Keystore::new();
    keys.set_source(&table);

    let mut buf = [0u8; 16];
    let other = server("coaps://[fd00::2]");
    assert_eq!(keys.lookup(&other, CredentialRequest::Identity { hint: None }, &mut buf),
               Err(CredentialError::NoIdentity));
    assert_eq!(keys.lookup(&other, CredentialRequest::Key { identity: b"me" }, &mut buf),
               Err(CredentialError::UnknownIdentity));

    // same address, different port
    let other_port = server("coaps://[fd00::1]:6000");
    assert_eq!(keys.lookup(&other_port, CredentialRequest::Identity { hint: None }, &mut buf),
               Err(CredentialError::NoIdentity));
  }

  #[test]
  fn table_skips_unusable_entries() {
    let mut table = PskTable::<4>::new();
    table.add(PskEntry { mode: SecurityMode::Certificate,
                         ..PskEntry::psk("coaps://[fd00::1]", b"cert", b"x") })
         .unwrap();
    table.add(PskEntry::psk("", b"empty-uri", b"x")).unwrap();
    table.add(PskEntry::psk("coaps://fd00::1", b"bad-uri", b"x"))
         .unwrap();
    table.add(PskEntry::psk("coaps://[fd00::1]", b"good", b"k"))
         .unwrap();

    let mut info = PskInfo::default();
    assert!(table.psk_info(&server("coaps://[fd00::1]"), &mut info));
    assert_eq!(info.identity, Some(b"good".as_ref()));
  }

  #[test]
  fn table_requires_matching_identity() {
    let mut table = PskTable::<2>::new();
    table.add(PskEntry::psk("coaps://[fd00::1]", b"a", b"key-a"))
         .unwrap();
    table.add(PskEntry::psk("coaps://[fd00::1]", b"b", b""))
         .unwrap();

    let peer = server("coaps://[fd00::1]");

    let mut info = PskInfo { identity: Some(b"a"),
                             ..PskInfo::default() };
    assert!(table.psk_info(&peer, &mut info));
    assert_eq!(info.key, Some(b"key-a".as_ref()));

    let mut info = PskInfo { identity: Some(b"b"),
                             ..PskInfo::default() };
    assert!(!table.psk_info(&peer, &mut info));

    let mut info = PskInfo { identity: Some(b"c"),
                             ..PskInfo::default() };
    assert!(!table.psk_info(&peer, &mut info));
  }

  #[test]
  fn table_full() {
    let mut table = PskTable::<1>::new();
    let entry = PskEntry::psk("coaps://[fd00::1]", b"a", b"k");
    assert_eq!(table.add(entry), Ok(()));
    assert_eq!(table.add(entry), Err(entry));
  }

  #[test]
  fn credential_never_truncated() {
    let mut table = PskTable::<1>::new();
    table.add(PskEntry::psk("coaps://[fd00::1]", b"a-rather-long-identity", b"k"))
         .unwrap();
    let mut keys = Keystore::new();
    keys.set_source(&table);

    let mut buf = [0u8; 4];
    let err = keys.lookup(&server("coaps://[fd00::1]"),
                          CredentialRequest::Identity { hint: None },
                          &mut buf)
                  .unwrap_err();

    assert_eq!(err,
               CredentialError::BufferTooSmall { needed: 22,
                                                 capacity: 4 });
    assert_eq!(err.alert(), Some(Alert::InternalError));
    assert_eq!(buf, [0u8; 4]);
  }
}
