//! The duplex channel boundary.
//!
//! A channel splits into a send half and a receive half so that the write
//! path and the read task each own exactly one direction. Neither half is
//! shared, so no locking is needed on the channel itself.

use std::time::Instant;

use crate::error::Result;
use crate::message::{FinalStatus, Request, Response};

/// Outbound half of a duplex channel.
pub trait MessageSender: Send {
    /// Write one message. Messages arrive in the order they are sent.
    fn send(&mut self, request: &Request) -> Result<()>;

    /// Half-close: no further messages follow. Inbound traffic continues.
    fn writes_done(&mut self) -> Result<()>;
}

/// Inbound half of a duplex channel.
pub trait MessageReceiver: Send {
    /// Next inbound message, or `Ok(None)` once the peer has nothing more to send.
    fn recv(&mut self) -> Result<Option<Response>>;

    /// Final status of the exchange. Call after `recv` has returned `Ok(None)`.
    fn finish(&mut self) -> Result<FinalStatus>;
}

/// An established, ordered, full-duplex message channel.
pub trait DuplexChannel: Send {
    type Sender: MessageSender;
    type Receiver: MessageReceiver;

    fn into_split(self) -> (Self::Sender, Self::Receiver);
}

/// Establishes channels for new exchanges.
pub trait ChannelFactory {
    type Channel: DuplexChannel;

    /// Connect, failing with `DeadlineExceeded` if the channel is not ready
    /// before `deadline`.
    fn connect(&self, deadline: Instant) -> Result<Self::Channel>;
}
