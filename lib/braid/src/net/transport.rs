//! Connection establishment. For every unordered pair of peers exactly one
//! TCP connection exists: the lower identity listens, the higher identity
//! dials, and the connection is used in both directions. The dialer opens
//! with an identity preamble so the listener can attribute the socket.

use crate::net::channel::Channel;
use crate::net::{ErrorType, NetworkError, NetworkResult};
use keel::logging::{self, Logger};
use keel::Identity;
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};
use std::io::{Read, Write};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

const CONNECT_DEADLINE: Duration = Duration::from_secs(30);
const RETRY_DELAY: Duration = Duration::from_millis(200);
const POLL_INTERVAL: Duration = Duration::from_millis(50);

const LISTENER_TOKEN: Token = Token(usize::MAX - 1);
const ACCEPT_BASE: usize = 4096;

/// One row of the peer table: who a peer is and where it listens.
#[derive(Debug, Clone)]
pub struct PeerInfo<I: Identity> {
    pub identity: I,
    pub address: SocketAddr,
}

impl<I: Identity> PeerInfo<I> {
    pub fn new(identity: I, address: SocketAddr) -> PeerInfo<I> {
        PeerInfo { identity, address }
    }
}

struct Dial<I: Identity> {
    identity: I,
    address: SocketAddr,
    stream: Option<TcpStream>,
    preamble: Vec<u8>,
    written: usize,
    connected: bool,
    next_attempt: Instant,
}

struct PendingAccept {
    stream: TcpStream,
    buffer: Vec<u8>,
    token: Token,
}

/// Open one channel per remote peer. Returns once every expected connection
/// is up, with all sockets deregistered so the caller can re-register them
/// under its own tokens.
pub(crate) fn establish<I: Identity>(
    self_identity: &I,
    peers: &[PeerInfo<I>],
    poll: &mut Poll,
    log: &Logger,
) -> NetworkResult<Vec<(I, Channel)>> {
    let self_info = peers
        .iter()
        .find(|p| p.identity == *self_identity)
        .ok_or(NetworkError::Fatal(ErrorType::AddressMissing))?;

    let mut preamble = Vec::new();
    self_identity.write_bytes(&mut preamble);

    // lower identities listen for us, so we dial them; higher identities
    // dial us, so we listen
    let mut dials: Vec<Dial<I>> = peers
        .iter()
        .filter(|p| p.identity < *self_identity)
        .map(|p| Dial {
            identity: p.identity.clone(),
            address: p.address,
            stream: None,
            preamble: preamble.clone(),
            written: 0,
            connected: false,
            next_attempt: Instant::now(),
        })
        .collect();
    dials.sort_by(|a, b| a.identity.cmp(&b.identity));

    let mut expected: Vec<I> = peers
        .iter()
        .filter(|p| p.identity > *self_identity)
        .map(|p| p.identity.clone())
        .collect();

    let mut listener = if expected.is_empty() {
        None
    } else {
        let mut listener = TcpListener::bind(self_info.address)?;
        poll.registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;
        Some(listener)
    };

    logging::debug!(log, "establishing connections";
                    "context" => "establish",
                    "dialing" => dials.len(),
                    "accepting" => expected.len());

    let mut pending: Vec<PendingAccept> = Vec::new();
    let mut accept_serial = 0usize;
    let mut completed: Vec<(I, Channel)> = Vec::new();
    let total = dials.len() + expected.len();
    let deadline = Instant::now() + CONNECT_DEADLINE;
    let mut events = Events::with_capacity(128);

    while completed.len() < total {
        if Instant::now() > deadline {
            logging::error!(log, "peers did not come up in time"; "context" => "establish");
            return Err(NetworkError::Fatal(ErrorType::ConnectTimeout));
        }

        // (re)start dials that are due
        for (index, dial) in dials.iter_mut().enumerate() {
            if dial.stream.is_none() && !dial.connected && Instant::now() >= dial.next_attempt {
                match TcpStream::connect(dial.address) {
                    Ok(mut stream) => {
                        poll.registry().register(
                            &mut stream,
                            Token(index),
                            Interest::READABLE | Interest::WRITABLE,
                        )?;
                        dial.stream = Some(stream);
                    }
                    Err(_) => dial.next_attempt = Instant::now() + RETRY_DELAY,
                }
            }
        }

        poll.poll(&mut events, Some(POLL_INTERVAL))?;

        for event in events.iter() {
            let token = event.token();

            if token == LISTENER_TOKEN {
                if let Some(listener) = listener.as_mut() {
                    accept_all(listener, poll, &mut pending, &mut accept_serial, log)?;
                }
                continue;
            }

            if token.0 < dials.len() {
                if let Some(peer) =
                    drive_dial(&mut dials[token.0], poll, event.is_writable(), log)?
                {
                    completed.push(peer);
                }
                continue;
            }

            if token.0 >= ACCEPT_BASE {
                if let Some(done) =
                    drive_accept(&mut pending, token, &mut expected, poll, log)?
                {
                    completed.push(done);
                }
            }
        }
    }

    if let Some(mut listener) = listener.take() {
        poll.registry().deregister(&mut listener)?;
    }

    logging::info!(log, "all peers connected"; "context" => "establish", "channels" => completed.len());
    Ok(completed)
}

fn accept_all(
    listener: &mut TcpListener,
    poll: &mut Poll,
    pending: &mut Vec<PendingAccept>,
    accept_serial: &mut usize,
    log: &Logger,
) -> NetworkResult<()> {
    loop {
        match listener.accept() {
            Ok((mut stream, address)) => {
                stream.set_nodelay(true)?;
                let token = Token(ACCEPT_BASE + *accept_serial);
                *accept_serial += 1;
                poll.registry()
                    .register(&mut stream, token, Interest::READABLE)?;
                logging::debug!(log, "inbound connection";
                                "context" => "establish", "from" => %address);
                pending.push(PendingAccept {
                    stream,
                    buffer: Vec::new(),
                    token,
                });
            }
            Err(ref err) if err.kind() == std::io::ErrorKind::WouldBlock => return Ok(()),
            Err(ref err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        }
    }
}

/// Move one dial forward: detect connection, push the preamble, hand the
/// finished channel back.
fn drive_dial<I: Identity>(
    dial: &mut Dial<I>,
    poll: &mut Poll,
    writable: bool,
    log: &Logger,
) -> NetworkResult<Option<(I, Channel)>> {
    if !writable || dial.stream.is_none() {
        return Ok(None);
    }

    if !dial.connected {
        let failed = {
            let stream = dial.stream.as_mut().expect("dial stream checked above");
            match stream.take_error()? {
                Some(_) => true,
                None => match stream.peer_addr() {
                    Ok(_) => false,
                    Err(ref err) if err.kind() == std::io::ErrorKind::NotConnected => {
                        return Ok(None)
                    }
                    Err(_) => true,
                },
            }
        };

        if failed {
            let mut stream = dial.stream.take().expect("dial stream checked above");
            poll.registry().deregister(&mut stream)?;
            dial.next_attempt = Instant::now() + RETRY_DELAY;
            logging::debug!(log, "dial refused, will retry";
                            "context" => "establish", "peer" => %dial.identity);
            return Ok(None);
        }

        let stream = dial.stream.as_mut().expect("dial stream checked above");
        stream.set_nodelay(true)?;
        dial.connected = true;
    }

    // connection is up: push the rest of the preamble
    let stream = dial.stream.as_mut().expect("dial stream checked above");
    while dial.written < dial.preamble.len() {
        match stream.write(&dial.preamble[dial.written..]) {
            Ok(0) => return Err(NetworkError::Fatal(ErrorType::Io(std::io::ErrorKind::WriteZero))),
            Ok(count) => dial.written += count,
            Err(ref err) if err.kind() == std::io::ErrorKind::WouldBlock => return Ok(None),
            Err(ref err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        }
    }

    let mut stream = dial.stream.take().expect("dial stream checked above");
    poll.registry().deregister(&mut stream)?;
    let mut channel = Channel::new(log);
    channel.open(stream);
    logging::debug!(log, "outbound connection ready";
                    "context" => "establish", "peer" => %dial.identity);
    Ok(Some((dial.identity.clone(), channel)))
}

/// Read preamble bytes off a pending inbound connection; once the identity
/// parses, promote it to a channel.
fn drive_accept<I: Identity>(
    pending: &mut Vec<PendingAccept>,
    token: Token,
    expected: &mut Vec<I>,
    poll: &mut Poll,
    log: &Logger,
) -> NetworkResult<Option<(I, Channel)>> {
    let slot = match pending.iter().position(|p| p.token == token) {
        Some(slot) => slot,
        None => return Ok(None),
    };

    let mut scratch = [0u8; 256];
    loop {
        match pending[slot].stream.read(&mut scratch) {
            Ok(0) => {
                // peer gave up before identifying itself
                let mut dead = pending.remove(slot);
                poll.registry().deregister(&mut dead.stream)?;
                logging::debug!(log, "inbound connection dropped before preamble";
                                "context" => "establish");
                return Ok(None);
            }
            Ok(count) => {
                pending[slot].buffer.extend_from_slice(&scratch[..count]);
                if let Some((identity, used)) = I::read_bytes(&pending[slot].buffer) {
                    let at = match expected.iter().position(|e| *e == identity) {
                        Some(at) => at,
                        None => {
                            logging::error!(log, "unexpected identity in preamble";
                                            "context" => "establish", "identity" => %identity);
                            return Err(NetworkError::Fatal(ErrorType::PreambleMismatch));
                        }
                    };
                    expected.remove(at);

                    let mut done = pending.remove(slot);
                    poll.registry().deregister(&mut done.stream)?;
                    let mut channel = Channel::new(log);
                    channel.open(done.stream);
                    channel.inject(&done.buffer[used..]);
                    logging::debug!(log, "inbound connection ready";
                                    "context" => "establish", "peer" => %identity);
                    return Ok(Some((identity, channel)));
                }
            }
            Err(ref err) if err.kind() == std::io::ErrorKind::WouldBlock => return Ok(None),
            Err(ref err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        }
    }
}
