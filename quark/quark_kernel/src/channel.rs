//! Channel endpoints.
//!
//! A channel is a pair of endpoints, each with its own FIFO inbox. Writing
//! on one endpoint enqueues onto the peer's inbox; reading dequeues from the
//! endpoint's own inbox. Messages in flight carry detached kernel objects
//! rather than handles: the sender's handles are removed before the message
//! is enqueued, and the receiver gets fresh handles when it dequeues.
//!
//! Each inbox is guarded by its own mutex and paired with a [`Notify`] for
//! blocked readers, so channel traffic is never serialized behind the
//! kernel's handle table lock.

use std::collections::VecDeque;
use std::sync::{OnceLock, Weak};

use parking_lot::Mutex;
use tokio::sync::Notify;

use quark_core::{Koid, ReadLimits};

use crate::object::KernelObject;

/// A message in flight between two endpoints.
///
/// Transferred handles travel as detached objects; they belong to no handle
/// table until the receiver dequeues the packet.
#[derive(Debug)]
pub(crate) struct MessagePacket {
    pub(crate) bytes: Vec<u8>,
    pub(crate) objects: Vec<KernelObject>,
}

/// Why a receive did not produce a packet.
#[derive(Debug)]
pub(crate) enum RecvError {
    /// Inbox is empty; a later write may succeed.
    Empty,

    /// This endpoint has been closed.
    Closed,

    /// Inbox is empty and the peer endpoint has been closed.
    PeerClosed,

    /// The front packet exceeds the caller's read limits. With discarding
    /// limits the packet is dequeued and handed back for teardown.
    TooBig {
        needed_bytes: usize,
        needed_handles: usize,
        discarded: Option<MessagePacket>,
    },
}

struct EndpointState {
    queue: VecDeque<MessagePacket>,
    closed: bool,
    peer_closed: bool,
}

/// One endpoint of a channel.
pub struct Endpoint {
    koid: Koid,
    peer_koid: Koid,
    peer: OnceLock<Weak<Endpoint>>,
    state: Mutex<EndpointState>,
    readable: Notify,
}

impl Endpoint {
    fn new(koid: Koid, peer_koid: Koid) -> Self {
        Self {
            koid,
            peer_koid,
            peer: OnceLock::new(),
            state: Mutex::new(EndpointState {
                queue: VecDeque::new(),
                closed: false,
                peer_closed: false,
            }),
            readable: Notify::new(),
        }
    }

    /// Create a connected pair of endpoints.
    pub(crate) fn create_pair(
        koid_a: Koid,
        koid_b: Koid,
    ) -> (std::sync::Arc<Endpoint>, std::sync::Arc<Endpoint>) {
        let a = std::sync::Arc::new(Endpoint::new(koid_a, koid_b));
        let b = std::sync::Arc::new(Endpoint::new(koid_b, koid_a));
        let _ = a.peer.set(std::sync::Arc::downgrade(&b));
        let _ = b.peer.set(std::sync::Arc::downgrade(&a));
        (a, b)
    }

    /// This endpoint's koid.
    pub fn koid(&self) -> Koid {
        self.koid
    }

    /// The peer endpoint's koid.
    pub fn peer_koid(&self) -> Koid {
        self.peer_koid
    }

    /// Enqueue a packet onto the peer's inbox and wake one blocked reader.
    ///
    /// Returns the packet on failure so the caller can tear down the
    /// objects it carries.
    pub(crate) fn send(&self, packet: MessagePacket) -> Result<(), MessagePacket> {
        let peer = match self.peer.get().and_then(Weak::upgrade) {
            Some(peer) => peer,
            None => return Err(packet),
        };

        {
            let mut state = peer.state.lock();
            if state.closed {
                return Err(packet);
            }
            state.queue.push_back(packet);
        }
        peer.readable.notify_one();
        Ok(())
    }

    /// Dequeue the front packet without blocking.
    pub(crate) fn try_recv(&self, limits: &ReadLimits) -> Result<MessagePacket, RecvError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(RecvError::Closed);
        }

        let packet = match state.queue.pop_front() {
            Some(packet) => packet,
            None => {
                return if state.peer_closed {
                    Err(RecvError::PeerClosed)
                } else {
                    Err(RecvError::Empty)
                };
            }
        };

        let needed_bytes = packet.bytes.len();
        let needed_handles = packet.objects.len();
        if needed_bytes > limits.max_bytes || needed_handles > limits.max_handles {
            let discarded = if limits.may_discard {
                Some(packet)
            } else {
                state.queue.push_front(packet);
                None
            };
            return Err(RecvError::TooBig {
                needed_bytes,
                needed_handles,
                discarded,
            });
        }

        Ok(packet)
    }

    /// Dequeue the front packet, waiting for one to arrive.
    ///
    /// Resolves with an error when this endpoint is closed under the waiter
    /// or when the inbox is drained and the peer is gone.
    pub(crate) async fn recv(&self, limits: &ReadLimits) -> Result<MessagePacket, RecvError> {
        loop {
            let notified = self.readable.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.try_recv(limits) {
                Err(RecvError::Empty) => {}
                other => return other,
            }

            notified.await;
        }
    }

    /// Close this endpoint.
    ///
    /// Wakes this endpoint's blocked readers, marks the peer as orphaned and
    /// wakes its readers too, and returns the undelivered packets so the
    /// caller can tear down the objects they carry. Closing twice is a
    /// no-op; the second call returns nothing.
    pub(crate) fn close(&self) -> Vec<MessagePacket> {
        let drained = {
            let mut state = self.state.lock();
            if state.closed {
                return Vec::new();
            }
            state.closed = true;
            state.queue.drain(..).collect::<Vec<_>>()
        };
        self.readable.notify_waiters();

        if let Some(peer) = self.peer.get().and_then(Weak::upgrade) {
            peer.state.lock().peer_closed = true;
            peer.readable.notify_waiters();
        }

        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn packet(bytes: &[u8]) -> MessagePacket {
        MessagePacket {
            bytes: bytes.to_vec(),
            objects: Vec::new(),
        }
    }

    fn pair() -> (std::sync::Arc<Endpoint>, std::sync::Arc<Endpoint>) {
        Endpoint::create_pair(Koid::from_raw(1), Koid::from_raw(2))
    }

    #[test]
    fn test_send_and_try_recv_fifo() {
        let (a, b) = pair();
        a.send(packet(b"first")).unwrap();
        a.send(packet(b"second")).unwrap();

        let limits = ReadLimits::default();
        assert_eq!(b.try_recv(&limits).unwrap().bytes, b"first");
        assert_eq!(b.try_recv(&limits).unwrap().bytes, b"second");
        assert!(matches!(b.try_recv(&limits), Err(RecvError::Empty)));
    }

    #[test]
    fn test_peer_koids() {
        let (a, b) = pair();
        assert_eq!(a.peer_koid(), b.koid());
        assert_eq!(b.peer_koid(), a.koid());
    }

    #[test]
    fn test_buffered_packets_survive_peer_close() {
        let (a, b) = pair();
        a.send(packet(b"parting")).unwrap();
        a.close();

        let limits = ReadLimits::default();
        assert_eq!(b.try_recv(&limits).unwrap().bytes, b"parting");
        assert!(matches!(b.try_recv(&limits), Err(RecvError::PeerClosed)));
    }

    #[test]
    fn test_send_to_closed_peer_returns_packet() {
        let (a, b) = pair();
        b.close();
        assert!(a.send(packet(b"late")).is_err());
    }

    #[test]
    fn test_recv_on_closed_endpoint() {
        let (a, _b) = pair();
        a.close();
        assert!(matches!(
            a.try_recv(&ReadLimits::default()),
            Err(RecvError::Closed)
        ));
    }

    #[test]
    fn test_close_is_idempotent() {
        let (a, b) = pair();
        a.send(packet(b"queued")).unwrap();
        let drained = b.close();
        assert_eq!(drained.len(), 1);
        assert!(b.close().is_empty());
    }

    #[test]
    fn test_oversized_packet_stays_queued() {
        let (a, b) = pair();
        a.send(packet(b"0123456789")).unwrap();

        let limits = ReadLimits::bounded(4, 0);
        match b.try_recv(&limits) {
            Err(RecvError::TooBig {
                needed_bytes,
                discarded,
                ..
            }) => {
                assert_eq!(needed_bytes, 10);
                assert!(discarded.is_none());
            }
            other => panic!("expected TooBig, got {:?}", other.map(|p| p.bytes)),
        }

        // Still deliverable with wider limits
        assert_eq!(b.try_recv(&ReadLimits::default()).unwrap().bytes.len(), 10);
    }

    #[test]
    fn test_oversized_packet_discarded_when_allowed() {
        let (a, b) = pair();
        a.send(packet(b"0123456789")).unwrap();
        a.send(packet(b"ok")).unwrap();

        let limits = ReadLimits::bounded(4, 0).discarding();
        match b.try_recv(&limits) {
            Err(RecvError::TooBig { discarded, .. }) => assert!(discarded.is_some()),
            other => panic!("expected TooBig, got {:?}", other.map(|p| p.bytes)),
        }

        // The oversized packet is gone; the next one is readable
        assert_eq!(b.try_recv(&limits).unwrap().bytes, b"ok");
    }

    #[tokio::test]
    async fn test_recv_wakes_on_send() {
        let (a, b) = pair();

        let reader = tokio::spawn(async move {
            b.recv(&ReadLimits::default()).await.map(|p| p.bytes)
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        a.send(packet(b"wake")).unwrap();

        let received = reader.await.unwrap().unwrap();
        assert_eq!(received, b"wake");
    }

    #[tokio::test]
    async fn test_recv_wakes_on_peer_close() {
        let (a, b) = pair();

        let reader =
            tokio::spawn(async move { b.recv(&ReadLimits::default()).await.map(|p| p.bytes) });

        tokio::time::sleep(Duration::from_millis(20)).await;
        a.close();

        assert!(matches!(
            reader.await.unwrap(),
            Err(RecvError::PeerClosed)
        ));
    }
}
