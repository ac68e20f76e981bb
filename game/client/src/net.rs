use crate::config::ClientConfig;
use lattice::codec::{self, Header};
use lattice::message::{self, Message};
use pulse::logging::{self, Logger};
use pulse::time::timestamp_ms;
use pulse::PlayerId;
use std::fmt;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Duration;

/// Base INIT response wait; grows by the step on every further attempt.
const INIT_TIMEOUT_BASE: Duration = Duration::from_millis(500);
const INIT_TIMEOUT_STEP: Duration = Duration::from_millis(200);
/// Receive wait in the main loop; also paces the retransmit sweep.
const RECV_TIMEOUT: Duration = Duration::from_millis(50);
const RECV_BUF_SIZE: usize = 4096;

#[derive(Debug)]
pub enum ConnectError {
    Io(io::Error),
    /// Every INIT attempt went unanswered.
    Exhausted,
}

impl From<io::Error> for ConnectError {
    fn from(err: io::Error) -> Self {
        ConnectError::Io(err)
    }
}

impl fmt::Display for ConnectError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConnectError::Io(err) => write!(f, "socket error: {}", err),
            ConnectError::Exhausted => write!(f, "no INIT_ACK within the retry budget"),
        }
    }
}

impl std::error::Error for ConnectError {}

/// The client's half of the datagram protocol: one socket, a sender-local
/// sequence counter and the INIT handshake.
pub struct Connector {
    socket: UdpSocket,
    server: SocketAddr,
    sequence: u32,
    recv_buf: [u8; RECV_BUF_SIZE],
    log: Logger,
}

impl Connector {
    pub fn new(server: &str, log: &Logger) -> Result<Connector, ConnectError> {
        let server = server
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                ConnectError::Io(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "server address resolved to nothing",
                ))
            })?;

        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.set_read_timeout(Some(RECV_TIMEOUT))?;

        Ok(Connector {
            socket,
            server,
            sequence: 0,
            recv_buf: [0; RECV_BUF_SIZE],
            log: log.new(logging::o!()),
        })
    }

    /// INIT/INIT_ACK handshake. Re-sends INIT with a growing wait until the
    /// echoed nonce comes back or the attempt budget is spent; the nonce
    /// check discards stray late responses to earlier attempts.
    pub fn connect(&mut self, config: &ClientConfig) -> Result<PlayerId, ConnectError> {
        let name = message::pack_name(&config.name);

        for attempt in 0..config.init_attempts {
            let nonce = timestamp_ms();
            self.send(&Message::Init { nonce, name }, 0);
            self.socket
                .set_read_timeout(Some(INIT_TIMEOUT_BASE + INIT_TIMEOUT_STEP * attempt))?;

            match self.recv() {
                Some((
                    _,
                    Message::InitAck {
                        nonce: echoed,
                        player_id,
                        snapshot_id,
                        ..
                    },
                )) if echoed == nonce => {
                    if player_id == 0 || player_id > u32::from(u8::MAX) {
                        // Nonsense assignment; treat like no answer.
                        continue;
                    }

                    self.socket.set_read_timeout(Some(RECV_TIMEOUT))?;
                    logging::info!(self.log, "connected";
                                   "player_id" => player_id,
                                   "server_snapshot_id" => snapshot_id);
                    return Ok(player_id as PlayerId);
                }
                _ => {
                    logging::debug!(self.log, "handshake attempt unanswered";
                                    "attempt" => attempt + 1,
                                    "budget" => config.init_attempts);
                }
            }
        }

        Err(ConnectError::Exhausted)
    }

    /// Fires one message at the server. Send errors on the unreliable
    /// transport are logged and absorbed; retransmission policy lives with
    /// the callers.
    pub fn send(&mut self, message: &Message, snapshot_id: u32) {
        self.sequence = self.sequence.wrapping_add(1);

        let payload = message.to_payload();
        match codec::encode(
            message.kind(),
            snapshot_id,
            self.sequence,
            timestamp_ms(),
            &payload,
        ) {
            Ok(datagram) => {
                if let Err(err) = self.socket.send_to(&datagram, self.server) {
                    logging::warn!(self.log, "send failed"; "error" => %err);
                }
            }
            Err(reason) => {
                logging::error!(self.log, "encode failed";
                                "kind" => ?message.kind(),
                                "reason" => ?reason);
            }
        }
    }

    /// Sends one claim attempt for the cell, stamped with a fresh clock.
    pub fn send_claim(&mut self, row: u16, col: u16) {
        let event = Message::Event {
            timestamp_ms: timestamp_ms(),
            row,
            col,
        };
        self.send(&event, 0);
    }

    /// Waits up to the read timeout for one well-formed datagram from the
    /// server. Malformed or stray datagrams are dropped silently and surface
    /// as None, exactly like a timeout.
    pub fn recv(&mut self) -> Option<(Header, Message)> {
        let len = match self.socket.recv_from(&mut self.recv_buf) {
            Ok((len, source)) if source == self.server => len,
            Ok((_, source)) => {
                logging::trace!(self.log, "dropping stray datagram"; "source" => %source);
                return None;
            }
            Err(ref err)
                if err.kind() == io::ErrorKind::WouldBlock
                    || err.kind() == io::ErrorKind::TimedOut =>
            {
                return None;
            }
            Err(err) => {
                logging::warn!(self.log, "socket receive failed"; "error" => %err);
                return None;
            }
        };

        match codec::decode(&self.recv_buf[..len])
            .and_then(|(header, payload)| {
                Message::from_payload(header.kind, payload).map(|message| (header, message))
            }) {
            Ok(decoded) => Some(decoded),
            Err(reason) => {
                logging::trace!(self.log, "dropping datagram"; "reason" => ?reason);
                None
            }
        }
    }
}
