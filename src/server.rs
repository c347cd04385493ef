//! Command server
//!
//! Serves at most one connection per call to [`serve_once`]: accept without
//! blocking, read one command, apply it to the [`Fsm`], reply, close.
//! Nothing that goes wrong here reaches the caller as an error; bad requests
//! and I/O failures are logged and the connection is dropped in silence.

use embassy_time::Instant;
use log::{debug, info, warn};

use crate::fsm::Fsm;
use crate::gpo::Actuators;
use crate::protocol::{self, Command, ProtocolError, SessionKind, StateReport, ACK, MAX_REQUEST};
use crate::types::LightReadings;

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    #[error("accept failed")]
    Accept,
    #[error("receive failed")]
    Receive,
    #[error("timed out waiting for the request")]
    Timeout,
    #[error("send failed")]
    Send,
}

/// One accepted client. Dropping it closes the connection.
pub trait CommandConn {
    /// Reads what is available; `Ok(0)` means the peer closed its side
    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, LinkError>;

    fn send(&mut self, bytes: &[u8]) -> Result<(), LinkError>;
}

/// Where remote commands come from
pub trait CommandLink {
    type Conn<'a>: CommandConn
    where
        Self: 'a;

    /// Returns immediately; `Ok(None)` when no client is waiting
    fn try_accept(&mut self) -> Result<Option<Self::Conn<'_>>, LinkError>;
}

#[derive(Debug, thiserror::Error)]
enum ServeError {
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("connection closed before a command arrived")]
    Empty,
}

/// What happened during one [`serve_once`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServeOutcome {
    /// Nobody was waiting
    Idle,
    /// A command was applied (its reply may still have failed to send)
    Handled(Command),
    /// A client connected but its request was unusable
    Dropped,
}

/// Reply to a handled command
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    State(StateReport),
    Ack,
    /// Close without answering
    Silent,
}

pub fn serve_once<L, A>(
    link: &mut L,
    fsm: &mut Fsm,
    act: &mut A,
    light: LightReadings,
    now: Instant,
) -> ServeOutcome
where
    L: CommandLink,
    A: Actuators,
{
    let mut conn = match link.try_accept() {
        Ok(Some(conn)) => conn,
        Ok(None) => return ServeOutcome::Idle,
        Err(e) => {
            warn!("server: {}", e);
            return ServeOutcome::Idle;
        }
    };

    let cmd = match read_command(&mut conn) {
        Ok(cmd) => cmd,
        Err(e) => {
            warn!("server: dropping request: {}", e);
            return ServeOutcome::Dropped;
        }
    };
    debug!("server: {:?}", cmd);

    let sent = match dispatch(fsm, act, cmd, light, now) {
        Reply::State(report) => match protocol::encode_state(&report) {
            Ok(body) => conn.send(&body),
            Err(e) => {
                warn!("server: {}", e);
                Ok(())
            }
        },
        Reply::Ack => conn.send(ACK),
        Reply::Silent => Ok(()),
    };
    if let Err(e) = sent {
        warn!("server: reply lost: {}", e);
    }
    ServeOutcome::Handled(cmd)
}

fn read_command<C: CommandConn>(conn: &mut C) -> Result<Command, ServeError> {
    let mut buf = [0u8; MAX_REQUEST];
    let mut len = 0;
    loop {
        let n = conn.receive(&mut buf[len..])?;
        if n == 0 {
            if len == 0 {
                return Err(ServeError::Empty);
            }
            return Ok(protocol::parse(&buf[..len])?);
        }
        len += n;
        match protocol::parse(&buf[..len]) {
            Ok(cmd) => return Ok(cmd),
            Err(e) if e.is_incomplete() && len < MAX_REQUEST => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

/// Applies a remote command to the controller
pub fn dispatch<A: Actuators>(
    fsm: &mut Fsm,
    act: &mut A,
    cmd: Command,
    light: LightReadings,
    now: Instant,
) -> Reply {
    match cmd {
        Command::State => Reply::State(report(fsm, light)),
        Command::Led { space, value } => {
            fsm.set_space(act, space, value);
            Reply::Ack
        }
        Command::Gate { value } => {
            info!("remote gate override: {}", if value { "open" } else { "close" });
            fsm.set_gate(act, value);
            Reply::Ack
        }
        Command::Session {
            vehicle_id,
            kind: SessionKind::Entry,
        } => match fsm.record_entry(vehicle_id, now) {
            Ok(()) => Reply::Ack,
            Err(e) => {
                warn!("server: session {} not recorded: {}", vehicle_id, e);
                Reply::Silent
            }
        },
        Command::Session {
            vehicle_id,
            kind: SessionKind::Exit,
        } => {
            fsm.record_exit(vehicle_id);
            Reply::Ack
        }
    }
}

/// Snapshot answered to `state`
pub fn report(fsm: &Fsm, light: LightReadings) -> StateReport {
    StateReport {
        free: fsm.free_spaces(),
        gate: fsm.gate_open(),
        sessions: fsm.ledger().len(),
        light: light.0,
        leds: fsm.occupancy().indicators(),
        pending_fee: fsm.pending_fee().map(|fee| fee.colones()),
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use alloc::collections::VecDeque;
    use alloc::vec::Vec;

    use super::*;

    /// Scripted client: the chunks it will send, and what it got back
    #[derive(Default)]
    pub struct ScriptedConn {
        pub chunks: VecDeque<Result<Vec<u8>, LinkError>>,
        pub replies: Vec<Vec<u8>>,
    }

    impl CommandConn for &mut ScriptedConn {
        fn receive(&mut self, buf: &mut [u8]) -> Result<usize, LinkError> {
            match self.chunks.pop_front() {
                None => Ok(0),
                Some(Err(e)) => Err(e),
                Some(Ok(chunk)) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    Ok(n)
                }
            }
        }

        fn send(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
            self.replies.push(bytes.to_vec());
            Ok(())
        }
    }

    /// Link with a queue of pending clients
    #[derive(Default)]
    pub struct ScriptedLink {
        pub pending: VecDeque<ScriptedConn>,
        pub served: Vec<ScriptedConn>,
        pub accepts: usize,
    }

    impl ScriptedLink {
        pub fn client(&mut self, chunks: &[&[u8]]) {
            self.pending.push_back(ScriptedConn {
                chunks: chunks.iter().map(|c| Ok(c.to_vec())).collect(),
                replies: Vec::new(),
            });
        }

        pub fn last_reply(&self) -> Option<&[u8]> {
            self.served.last()?.replies.last().map(|r| r.as_slice())
        }
    }

    impl CommandLink for ScriptedLink {
        type Conn<'a> = &'a mut ScriptedConn;

        fn try_accept(&mut self) -> Result<Option<Self::Conn<'_>>, LinkError> {
            self.accepts += 1;
            match self.pending.pop_front() {
                Some(conn) => {
                    self.served.push(conn);
                    Ok(self.served.last_mut())
                }
                None => Ok(None),
            }
        }
    }
}
