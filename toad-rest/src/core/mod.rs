use toad_msg::{Code, Id, Payload, Type};

use crate::client::Exchange;
use crate::config::Config;
use crate::endpoint::Endpoint;
use crate::logging;
use crate::net::Socket;
use crate::option;
use crate::req::Request;
use crate::resp::Response;
use crate::server::{Observe, Registry, Reply};
use crate::time::{self, Clock, Millis};
use crate::transport::{Datagram, Deliver, SecureChannel, Transport};
use crate::Message;

mod error;
#[doc(inline)]
pub use error::*;

/// Outstanding request bookkeeping
pub mod transaction;

use transaction::{AllocError, SendError, TransactionTable};

/// A CoAP runtime that drives client- and server-side behavior
/// from one cooperative `poll` loop.
///
/// - `R` is the capacity of the resource registry
/// - `T` is the capacity of the transaction table
#[derive(Debug)]
pub struct Core<'a, S, D, C, const R: usize, const T: usize> {
  transport: Transport<'a, S, D>,
  registry: Registry<'a, C, R>,
  transactions: TransactionTable<T>,
  clock: &'a C,
  config: Config,
}

impl<'a, S, D, C, const R: usize, const T: usize> Core<'a, S, D, C, R, T>
  where S: Socket,
        D: SecureChannel,
        C: Clock
{
  /// Create a runtime.
  ///
  /// The message id generator is seeded with
  /// [`Config::mid_seed`] and the current time.
  pub fn new(config: Config,
             clock: &'a C,
             transport: Transport<'a, S, D>,
             registry: Registry<'a, C, R>)
             -> Result<Self, Error<S::Error, D::Error>> {
    let boot = time::now(clock).map_err(|_| When::Polling.what(What::ClockError))?;
    let seed = (u64::from(config.mid_seed) << 48) ^ boot.0;

    Ok(Self { transport,
              registry,
              transactions: TransactionTable::new(seed),
              clock,
              config })
  }

  /// Runtime config
  pub fn config(&self) -> &Config {
    &self.config
  }

  /// Borrow the transport
  pub fn transport(&self) -> &Transport<'a, S, D> {
    &self.transport
  }

  /// Mutably borrow the transport, e.g. to connect to a secure peer
  pub fn transport_mut(&mut self) -> &mut Transport<'a, S, D> {
    &mut self.transport
  }

  /// Borrow the resource registry
  pub fn registry(&self) -> &Registry<'a, C, R> {
    &self.registry
  }

  /// Mutably borrow the resource registry
  pub fn registry_mut(&mut self) -> &mut Registry<'a, C, R> {
    &mut self.registry
  }

  /// Borrow the transaction table
  pub fn transactions(&self) -> &TransactionTable<T> {
    &self.transactions
  }

  fn now(&self, when: When) -> Result<Millis, Error<S::Error, D::Error>> {
    time::now(self.clock).map_err(|_| when.what(What::ClockError))
  }

  /// [`Core::poll_with`] without an observe hook
  pub fn poll(&mut self) -> Result<(), Error<S::Error, D::Error>> {
    self.poll_with(&mut ())
  }

  /// Run one turn of the runtime:
  /// 1. handle every datagram waiting on the transport, in arrival order
  /// 2. retransmit (or give up on) outstanding transactions
  /// 3. fire expired periodic timers
  pub fn poll_with(&mut self, observe: &mut impl Observe) -> Result<(), Error<S::Error, D::Error>> {
    loop {
      match self.transport.poll() {
        | Ok(dgram) => self.handle(dgram, observe)?,
        | Err(nb::Error::WouldBlock) => break,
        | Err(nb::Error::Other(e)) => return Err(When::Polling.what(What::Transport(e))),
      }
    }

    let now = self.now(When::Polling)?;
    self.transactions.poll_retransmit(now, &mut self.transport);

    self.registry
        .poll_timers()
        .map_err(|_| When::Polling.what(What::ClockError))?;

    Ok(())
  }

  fn handle(&mut self,
            Datagram { from, payload }: Datagram,
            observe: &mut impl Observe)
            -> Result<(), Error<S::Error, D::Error>> {
    let msg = match option::parse_message(&payload) {
      | Ok(msg) => msg,
      | Err(e) => {
        log::warn!("dropping unparseable datagram from {}: {:?}",
                   logging::endpoint(&from),
                   e);
        return Ok(());
      },
    };

    log::trace!("{} from {}",
                logging::msg_summary(&msg),
                logging::endpoint(&from));

    match (msg.code.class, msg.code.detail) {
      | (0, 0) => self.handle_empty(from, msg),
      | (0, _) => self.handle_request(from, msg, observe),
      | _ => self.handle_response(from, msg),
    }
  }

  fn handle_empty(&mut self, from: Endpoint, msg: Message) -> Result<(), Error<S::Error, D::Error>> {
    if msg.ty == Type::Con {
      // CoAP ping
      self.send_empty(&from, Type::Reset, msg.id);
    } else {
      let now = self.now(When::Polling)?;
      self.transactions.on_response(&msg, &self.config.con, now);
    }

    Ok(())
  }

  fn handle_request(&mut self,
                    from: Endpoint,
                    msg: Message,
                    observe: &mut impl Observe)
                    -> Result<(), Error<S::Error, D::Error>> {
    let req = Request::from(msg);
    let mut resp = Response::for_request(&req);

    if resp.ty() == Type::Non {
      resp.set_id(self.transactions.next_mid());
    }

    {
      let mut reply = Reply::new(&req, &mut resp, self.config.block.chunk_size);
      self.registry.dispatch_with(&req, &mut reply, observe);
    }

    let bytes = resp.to_bytes()
                    .map_err(|e| When::Replying(req.id()).what(What::ToBytes(e)))?;

    log::trace!("replying {} to {}",
                logging::msg_summary(resp.msg()),
                logging::endpoint(&from));
    self.transport.deliver(&from, &bytes);

    Ok(())
  }

  fn handle_response(&mut self, from: Endpoint, msg: Message) -> Result<(), Error<S::Error, D::Error>> {
    let now = self.now(When::Polling)?;
    let matched = self.transactions.on_response(&msg, &self.config.con, now);

    match (msg.ty, matched) {
      | (Type::Con, Some(_)) => self.send_empty(&from, Type::Ack, msg.id),
      | (Type::Con, None) | (Type::Non, None) => {
        log::debug!("unexpected response from {}", logging::endpoint(&from));
        self.send_empty(&from, Type::Reset, msg.id);
      },
      | _ => (),
    }

    Ok(())
  }

  fn send_empty(&mut self, to: &Endpoint, ty: Type, id: Id) {
    let msg = Message { id,
                        ty,
                        ver: Default::default(),
                        token: toad_msg::Token(Default::default()),
                        code: Code::new(0, 0),
                        opts: Default::default(),
                        payload: Payload(Default::default()) };

    match Response::from(msg).to_bytes() {
      | Ok(bytes) => self.transport.deliver(to, &bytes),
      | Err(e) => log::error!("failed to serialize empty {:?}: {:?}", ty, e),
    }
  }
}

impl<'a, S, D, C, const R: usize, const T: usize> Exchange for Core<'a, S, D, C, R, T>
  where S: Socket,
        D: SecureChannel,
        C: Clock
{
  type Error = Error<S::Error, D::Error>;

  fn next_mid(&mut self) -> Id {
    self.transactions.next_mid()
  }

  fn new_transaction(&mut self, mid: Id, dest: &Endpoint) -> Result<(), AllocError> {
    self.transactions.new_transaction(mid, *dest)
  }

  fn send_transaction(&mut self, mid: Id, req: &Request) -> Result<(), SendError> {
    let now = time::now(self.clock).map_err(|_| SendError::Clock)?;

    let mut msg = req.msg().clone();
    if msg.token.0.is_empty() {
      msg.token = self.transactions.next_token();
    }

    self.transactions
        .send_transaction(mid, msg, &self.config.con, now, &mut self.transport)
  }

  fn poll_completion(&mut self, mid: Id) -> nb::Result<Option<Response>, Self::Error> {
    self.poll().map_err(nb::Error::Other)?;

    match self.transactions.take_completion(mid) {
      | Ok(resp) => Ok(resp),
      | Err(nb::Error::WouldBlock) => Err(nb::Error::WouldBlock),
      | Err(nb::Error::Other(never)) => match never {},
    }
  }

  fn cancel(&mut self, mid: Id) {
    self.transactions.cancel(mid);
  }
}

#[cfg(test)]
mod test {
  use embedded_time::duration::Milliseconds;
  use std_alloc::vec::Vec;
  use toad_msg::{Token, TryIntoBytes};

  use super::*;
  use crate::block::Block;
  use crate::client::{BlockingRequest, Client, Event, Failure, State};
  use crate::config::BlockTransfer;
  use crate::keystore::Keystore;
  use crate::net::Addrd;
  use crate::resp::code;
  use crate::server::{MethodNotAllowed, Resource};
  use crate::test::{addr, ChannelMock, ClockMock, SockMock};

  type TestCore<'a, const T: usize> = Core<'a, SockMock, ChannelMock, ClockMock, 4, T>;
  type Queue = std_alloc::sync::Arc<::std::sync::Mutex<Vec<Addrd<Vec<u8>>>>>;

  struct Hello;

  impl Resource for Hello {
    fn get(&mut self, _: &Request, reply: &mut Reply<'_>) -> Result<(), MethodNotAllowed> {
      reply.write(b"hello");
      Ok(())
    }
  }

  struct Socks {
    plain_rx: Queue,
    plain_tx: Queue,
    secure_rx: Queue,
    secure_tx: Queue,
  }

  fn runtime<'a, const T: usize>(clock: &'a ClockMock, registry: Registry<'a, ClockMock, 4>) -> (TestCore<'a, T>, Socks) {
    let (plain, secure) = (SockMock::new(), SockMock::new());
    let socks = Socks { plain_rx: plain.rx.clone(),
                        plain_tx: plain.tx.clone(),
                        secure_rx: secure.rx.clone(),
                        secure_tx: secure.tx.clone() };

    let transport = Transport::new(plain, Keystore::new(), 1152).with_secure(secure, ChannelMock::default());
    let core = Core::new(Config::default(), clock, transport, registry).unwrap();
    (core, socks)
  }

  fn push(q: &Queue, from: u16, bytes: Vec<u8>) {
    q.lock().unwrap().push(Addrd(bytes, addr(from)));
  }

  fn take(q: &Queue) -> Vec<Message> {
    q.lock()
     .unwrap()
     .drain(..)
     .map(|Addrd(bytes, _)| option::parse_message(&bytes).unwrap())
     .collect()
  }

  fn response_to(req: &Message, ty: Type, id: Id, payload: &[u8], block: Option<Block>) -> Vec<u8> {
    let mut resp = Response::from(Message { id,
                                            ty,
                                            ver: Default::default(),
                                            token: req.token,
                                            code: code::CONTENT,
                                            opts: Default::default(),
                                            payload: Payload(payload.to_vec()) });
    if let Some(block) = block {
      resp.set_block2(block);
    }
    resp.to_bytes().unwrap()
  }

  #[test]
  fn requests_are_dispatched_and_answered() {
    let clock = ClockMock::new();
    let mut hello = Hello;
    let mut registry = Registry::new(&clock);
    registry.register("hello", &mut hello).unwrap();
    registry.init();

    let (mut core, socks) = runtime::<2>(&clock, registry);

    let mut req = Request::get("hello");
    req.set_id(Id(7));
    push(&socks.plain_rx, 1, req.to_bytes().unwrap());

    let mut missing = Request::get("nope");
    missing.set_id(Id(8));
    push(&socks.plain_rx, 2, missing.to_bytes().unwrap());

    core.poll().unwrap();

    let sent = take(&socks.plain_tx);
    assert_eq!(sent.len(), 2);
    assert_eq!((sent[0].ty, sent[0].id, sent[0].code), (Type::Ack, Id(7), code::CONTENT));
    assert_eq!(sent[0].payload.0, b"hello".to_vec());
    assert_eq!((sent[1].id, sent[1].code), (Id(8), code::NOT_FOUND));
  }

  struct Echo;

  impl Resource for Echo {
    fn flags(&self) -> crate::server::Flags {
      crate::server::Flags::SUB_RESOURCES
    }

    fn get(&mut self, req: &Request, reply: &mut Reply<'_>) -> Result<(), MethodNotAllowed> {
      reply.write(req.path().as_bytes());
      Ok(())
    }
  }

  #[test]
  fn multi_segment_paths_are_dispatched() {
    let clock = ClockMock::new();
    let mut temp = Hello;
    let mut registry = Registry::new(&clock);
    registry.register("sensors/temp", &mut temp).unwrap();
    registry.init();

    let (mut core, socks) = runtime::<2>(&clock, registry);

    // CON GET, mid 0, no token, Uri-Path "sensors" / "temp"
    let mut bytes = vec![0x40, 0x01, 0x00, 0x00, 0xb7];
    bytes.extend_from_slice(b"sensors");
    bytes.push(0x04);
    bytes.extend_from_slice(b"temp");
    push(&socks.plain_rx, 1, bytes);

    let mut shallow = Request::get("sensors");
    shallow.set_id(Id(1));
    push(&socks.plain_rx, 1, shallow.to_bytes().unwrap());

    core.poll().unwrap();

    let sent = take(&socks.plain_tx);
    assert_eq!(sent.len(), 2);
    assert_eq!((sent[0].id, sent[0].code), (Id(0), code::CONTENT));
    assert_eq!(sent[0].payload.0, b"hello".to_vec());
    assert_eq!((sent[1].id, sent[1].code), (Id(1), code::NOT_FOUND));
  }

  #[test]
  fn sub_resources_are_dispatched() {
    let clock = ClockMock::new();
    let mut echo = Echo;
    let mut registry = Registry::new(&clock);
    registry.register("sensors", &mut echo).unwrap();
    registry.init();

    let (mut core, socks) = runtime::<2>(&clock, registry);

    for (id, path) in [(1u16, "sensors/temp/max"), (2, "sensors"), (3, "sensorsx/temp")] {
      let mut req = Request::get(path);
      req.set_id(Id(id));
      push(&socks.plain_rx, 1, req.to_bytes().unwrap());
    }

    core.poll().unwrap();

    let sent = take(&socks.plain_tx);
    assert_eq!(sent.len(), 3);
    assert_eq!(sent[0].code, code::CONTENT);
    assert_eq!(sent[0].payload.0, b"sensors/temp/max".to_vec());
    assert_eq!(sent[1].code, code::CONTENT);
    assert_eq!(sent[1].payload.0, b"sensors".to_vec());
    assert_eq!(sent[2].code, code::NOT_FOUND);
  }

  #[test]
  fn secure_requests_are_answered_securely() {
    let clock = ClockMock::new();
    let mut hello = Hello;
    let mut registry = Registry::new(&clock);
    registry.register("hello", &mut hello).unwrap();
    registry.init();

    let (mut core, socks) = runtime::<2>(&clock, registry);

    let req = Request::get("hello");
    push(&socks.secure_rx, 1, ChannelMock::seal(&req.to_bytes().unwrap()));
    push(&socks.secure_rx, 1, b"not a record".to_vec());
    core.poll().unwrap();

    assert!(socks.plain_tx.lock().unwrap().is_empty());
    let sent = socks.secure_tx.lock().unwrap().drain(..).collect::<Vec<_>>();
    assert_eq!(sent.len(), 1);

    let sealed = sent[0].data();
    let msg = option::parse_message(&sealed[4..]).unwrap();
    assert_eq!(msg.payload.0, b"hello".to_vec());
  }

  #[test]
  fn ping_is_reset() {
    let clock = ClockMock::new();
    let (mut core, socks) = runtime::<2>(&clock, Registry::new(&clock));

    let ping = Message { id: Id(3),
                         ty: Type::Con,
                         ver: Default::default(),
                         token: Token(Default::default()),
                         code: Code::new(0, 0),
                         opts: Default::default(),
                         payload: Payload(Default::default()) };
    push(&socks.plain_rx, 1, ping.try_into_bytes::<Vec<u8>>().unwrap());
    core.poll().unwrap();

    let sent = take(&socks.plain_tx);
    assert_eq!((sent[0].ty, sent[0].id), (Type::Reset, Id(3)));
  }

  #[test]
  fn blocking_request_through_core() {
    simple_logger::init_with_level(log::Level::Trace).ok();

    let clock = ClockMock::new();
    let (mut core, socks) = runtime::<2>(&clock, Registry::new(&clock));
    let dest = Endpoint::from_addr(addr(9), false);

    let mut blocking = BlockingRequest::new(Request::get("big"), dest, BlockTransfer::default());
    let mut payload = Vec::new();

    let mut state = blocking.resume(&mut core, Event::Start, |_| ());

    for (num, more) in [(0u32, true), (1, false)] {
      let mid = match state {
        | State::AwaitingResponse { mid } => mid,
        | other => panic!("unexpected {:?}", other),
      };
      assert_eq!(core.poll_completion(mid), Err(nb::Error::WouldBlock));

      let sent = take(&socks.plain_tx);
      assert_eq!(sent.len(), 1);
      assert_eq!(sent[0].id, mid);
      assert!(!sent[0].token.0.is_empty());

      push(&socks.plain_rx,
           9,
           response_to(&sent[0], Type::Ack, mid, &[num as u8; 64], Some(Block::new(64, num, more))));

      let resp = core.poll_completion(mid).unwrap();
      state = blocking.resume(&mut core, Event::Completed(resp.as_ref()), |r| {
                        payload.extend_from_slice(r.payload())
                      });
    }

    assert_eq!(state, State::Done);
    assert_eq!(payload.len(), 128);
    assert!(core.transactions().is_empty());
  }

  #[test]
  fn separate_response_is_acked() {
    let clock = ClockMock::new();
    let (mut core, socks) = runtime::<2>(&clock, Registry::new(&clock));
    let dest = Endpoint::from_addr(addr(9), false);

    let mid = core.next_mid();
    core.new_transaction(mid, &dest).unwrap();
    core.send_transaction(mid, &Request::get("slow")).unwrap();
    let req = take(&socks.plain_tx).remove(0);

    let empty_ack = Message { id: mid,
                              ty: Type::Ack,
                              ver: Default::default(),
                              token: Token(Default::default()),
                              code: Code::new(0, 0),
                              opts: Default::default(),
                              payload: Payload(Default::default()) };
    push(&socks.plain_rx, 9, empty_ack.try_into_bytes::<Vec<u8>>().unwrap());
    assert_eq!(core.poll_completion(mid), Err(nb::Error::WouldBlock));

    push(&socks.plain_rx, 9, response_to(&req, Type::Con, Id(500), b"late", None));
    let resp = core.poll_completion(mid).unwrap().unwrap();
    assert_eq!(resp.payload(), b"late");

    let sent = take(&socks.plain_tx);
    assert_eq!((sent[0].ty, sent[0].id), (Type::Ack, Id(500)));
  }

  #[test]
  fn unanswered_transaction_completes_empty() {
    let clock = ClockMock::new();
    let (mut core, socks) = runtime::<2>(&clock, Registry::new(&clock));
    let dest = Endpoint::from_addr(addr(9), false);

    let mut blocking = BlockingRequest::new(Request::get("void"), dest, BlockTransfer::default());
    let mid = match blocking.resume(&mut core, Event::Start, |_| ()) {
      | State::AwaitingResponse { mid } => mid,
      | other => panic!("unexpected {:?}", other),
    };

    // well past the longest possible wait
    clock.set(core.config().con.max_transmit_wait().0 + 1);
    let resp = loop {
      match core.poll_completion(mid) {
        | Err(nb::Error::WouldBlock) => continue,
        | other => break other.unwrap(),
      }
    };
    assert_eq!(resp, None);

    // sent once, then retransmitted until out of attempts
    assert_eq!(take(&socks.plain_tx).len(), 4);

    let state = blocking.resume(&mut core, Event::Completed(resp.as_ref()), |_| ());
    assert_eq!(state, State::Failed(Failure::NoResponse));
    assert!(core.transactions().is_empty());
  }

  #[test]
  fn client_reports_allocation_failure() {
    let clock = ClockMock::new();
    let (mut core, _socks) = runtime::<0>(&clock, Registry::new(&clock));
    let dest = Endpoint::from_addr(addr(9), false);

    let mut client = Client::new(&mut core, BlockTransfer::default());
    assert_eq!(client.get(dest, "x", |_| ()),
               Err(crate::client::Error::Request(Failure::TransactionUnavailable(AllocError::Full))));
  }

  #[test]
  fn periodic_resources_tick_from_poll() {
    struct Tick(usize);
    impl Resource for Tick {
      fn flags(&self) -> crate::server::Flags {
        crate::server::Flags::PERIODIC
      }

      fn period(&self) -> Option<Millis> {
        Some(Milliseconds(50))
      }

      fn tick(&mut self) {
        self.0 += 1;
      }
    }

    let clock = ClockMock::new();
    let mut tick = Tick(0);

    {
      let mut registry = Registry::new(&clock);
      registry.register("tick", &mut tick).unwrap();
      registry.init();
      let (mut core, _socks) = runtime::<2>(&clock, registry);

      clock.set(50);
      core.poll().unwrap();
      clock.set(100);
      core.poll().unwrap();
    }

    assert_eq!(tick.0, 2);
  }
}
