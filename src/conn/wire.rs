//! # Wire: framed TCP stream with mutual keyed authentication.
//!
//! A [`Wire`] wraps a [`TcpStream`] in a [`LengthDelimitedCodec`] and carries
//! JSON-encoded values as frames. Before any payload crosses, both sides run
//! a mutual challenge-response handshake over the same framing:
//!
//! ```text
//!  challenger                          responder
//!  ──────────                          ─────────
//!  nonce (random bytes)  ───────────►
//!                        ◄───────────  HMAC-SHA256(secret, nonce)
//!  verdict #OK# / #NO#   ───────────►
//! ```
//!
//! Each side plays challenger once; the accept side challenges first. A
//! mismatched digest is rejected with a `#NO#` verdict and the connection is
//! dropped — neither endpoint learns anything about the secret beyond the
//! single keyed digest.
//!
//! ### Notes
//! - Digest comparison is constant-time (`subtle`).
//! - The verdict frame exists so the answering side learns the outcome
//!   without relying on a TCP reset arriving in time.

use std::net::SocketAddr;

use bytes::{Bytes, BytesMut};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use hmac::{Hmac, Mac};
use serde::Serialize;
use serde_json::Value;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::error::ConnectionError;

/// Size of the random challenge nonce.
const NONCE_LEN: usize = 20;

/// Verdict frame sent by a challenger that accepted the answer.
const VERDICT_OK: &[u8] = b"#OK#";
/// Verdict frame sent by a challenger that rejected the answer.
const VERDICT_NO: &[u8] = b"#NO#";

/// Send half of a split [`Wire`].
pub type WireSink = SplitSink<Framed<TcpStream, LengthDelimitedCodec>, Bytes>;
/// Receive half of a split [`Wire`].
pub type WireStream = SplitStream<Framed<TcpStream, LengthDelimitedCodec>>;

/// An authenticated, length-delimited message stream.
pub struct Wire {
    framed: Framed<TcpStream, LengthDelimitedCodec>,
    peer: Option<SocketAddr>,
}

impl Wire {
    /// Connects to `addr` and authenticates with `secret`.
    ///
    /// The connect side answers the listener's challenge first, then issues
    /// its own. Fails with [`ConnectionError::AuthRejected`] when either
    /// direction fails verification.
    pub async fn connect(addr: SocketAddr, secret: &[u8]) -> Result<Self, ConnectionError> {
        let stream = TcpStream::connect(addr).await?;
        let mut wire = Self::framed(stream);
        wire.answer_challenge(secret).await?;
        wire.deliver_challenge(secret).await?;
        Ok(wire)
    }

    /// Authenticates an accepted `stream` with `secret`.
    ///
    /// The accept side challenges first, then answers the peer's challenge.
    pub async fn accept(stream: TcpStream, secret: &[u8]) -> Result<Self, ConnectionError> {
        let mut wire = Self::framed(stream);
        wire.deliver_challenge(secret).await?;
        wire.answer_challenge(secret).await?;
        Ok(wire)
    }

    fn framed(stream: TcpStream) -> Self {
        let peer = stream.peer_addr().ok();
        Self {
            framed: Framed::new(stream, LengthDelimitedCodec::new()),
            peer,
        }
    }

    /// Remote address, when the socket can still report one.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Serializes `value` to JSON and sends it as one frame.
    pub async fn send<T: Serialize>(&mut self, value: &T) -> Result<(), ConnectionError> {
        let encoded = serde_json::to_vec(value)?;
        self.send_raw(Bytes::from(encoded)).await
    }

    /// Receives one frame and decodes it as a JSON value.
    pub async fn recv(&mut self) -> Result<Value, ConnectionError> {
        let frame = self.recv_raw().await?;
        Ok(serde_json::from_slice(&frame)?)
    }

    /// Splits the wire into independent send and receive halves.
    pub fn split(self) -> (WireSink, WireStream) {
        self.framed.split()
    }

    async fn send_raw(&mut self, frame: Bytes) -> Result<(), ConnectionError> {
        self.framed.send(frame).await.map_err(ConnectionError::Io)
    }

    async fn recv_raw(&mut self) -> Result<BytesMut, ConnectionError> {
        match self.framed.next().await {
            Some(Ok(frame)) => Ok(frame),
            Some(Err(err)) => Err(ConnectionError::Io(err)),
            None => Err(ConnectionError::Closed),
        }
    }

    /// Challenger role: nonce out, digest in, verdict out.
    async fn deliver_challenge(&mut self, secret: &[u8]) -> Result<(), ConnectionError> {
        let nonce: [u8; NONCE_LEN] = rand::random();
        self.send_raw(Bytes::copy_from_slice(&nonce)).await?;
        let answer = self.recv_raw().await?;
        if verify(secret, &nonce, &answer) {
            self.send_raw(Bytes::from_static(VERDICT_OK)).await?;
            Ok(())
        } else {
            self.send_raw(Bytes::from_static(VERDICT_NO)).await?;
            Err(ConnectionError::AuthRejected)
        }
    }

    /// Responder role: nonce in, digest out, verdict in.
    async fn answer_challenge(&mut self, secret: &[u8]) -> Result<(), ConnectionError> {
        let nonce = self.recv_raw().await?;
        self.send_raw(Bytes::from(keyed_digest(secret, &nonce)))
            .await?;
        let verdict = self.recv_raw().await?;
        if verdict.as_ref() == VERDICT_OK {
            Ok(())
        } else {
            Err(ConnectionError::AuthRejected)
        }
    }
}

fn keyed_digest(secret: &[u8], nonce: &[u8]) -> Vec<u8> {
    // HMAC accepts keys of any length.
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret).expect("hmac accepts keys of any length");
    mac.update(nonce);
    mac.finalize().into_bytes().to_vec()
}

fn verify(secret: &[u8], nonce: &[u8], answer: &[u8]) -> bool {
    keyed_digest(secret, nonce).ct_eq(answer).into()
}
