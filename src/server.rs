//! UDP dispatcher loop.
//!
//! One socket, one thread: receive a datagram, sample the wall clock
//! once, sweep expired reservations, then answer. The arrival time at
//! the server is authoritative; a redeem datagram sent before a
//! deadline but received after it finds the reservation gone.

use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::Result;
use crate::catalog::EventSeed;
use crate::config::Config;
use crate::proto::{self, MAX_DATAGRAM, Message};
use crate::store::Store;

pub struct Server {
    socket: UdpSocket,
    store: Store,
    shutdown: Arc<AtomicBool>,
}

impl Server {
    /// Bind the listening socket and build the store.
    ///
    /// Listens on all interfaces. Port 0 asks the OS for an ephemeral
    /// port; `local_addr` reports the one chosen.
    pub fn bind(config: &Config, seeds: Vec<EventSeed>) -> Result<Self> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, config.port))?;
        tracing::info!(
            addr = %socket.local_addr()?,
            timeout = config.timeout,
            "listening"
        );
        Ok(Self {
            socket,
            store: Store::new(seeds, u64::from(config.timeout)),
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Serve until a shutdown signal arrives or the socket fails.
    pub fn run(mut self) -> Result<()> {
        let _ = signal_hook::flag::register(signal_hook::consts::SIGTERM, self.shutdown.clone());
        let _ = signal_hook::flag::register(signal_hook::consts::SIGINT, self.shutdown.clone());

        // One extra byte: an oversize datagram shows up as
        // len > MAX_DATAGRAM instead of a plausible truncation.
        let mut buf = [0u8; MAX_DATAGRAM + 1];
        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                tracing::info!("shutdown signal received");
                return Ok(());
            }

            let (len, peer) = match self.socket.recv_from(&mut buf) {
                Ok(received) => received,
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    tracing::error!(error = %err, "receive failed");
                    return Err(err.into());
                }
            };
            if len > MAX_DATAGRAM {
                tracing::trace!(%peer, len, "dropped oversize datagram");
                continue;
            }

            let now = unix_now_secs();
            self.store.sweep_expired(now);

            let message = match proto::decode(&buf[..len]) {
                Ok(message) => message,
                Err(err) => {
                    tracing::trace!(%peer, error = %err, "dropped malformed datagram");
                    continue;
                }
            };

            let Some(reply) = dispatch(&mut self.store, message, now) else {
                continue;
            };
            if let Err(err) = self.socket.send_to(&proto::encode(&reply), peer) {
                tracing::warn!(%peer, error = %err, "send failed");
            }
        }
    }
}

/// Map one decoded request to its reply.
///
/// Only the three request kinds get answers; a reply-kind message
/// arriving at the server is dropped like any other noise. Store
/// refusals become `BAD_REQUEST` echoing the id the request named.
fn dispatch(store: &mut Store, message: Message, now: u64) -> Option<Message> {
    match message {
        Message::GetEvents => Some(Message::Events(store.list_events())),
        Message::GetReservation {
            event_id,
            ticket_count,
        } => match store.reserve(event_id, ticket_count, now) {
            Ok(issued) => Some(Message::Reservation {
                reservation_id: issued.reservation_id,
                event_id: issued.event_id,
                ticket_count: issued.ticket_count,
                cookie: issued.cookie,
                expires_at: issued.expires_at,
            }),
            Err(err) => {
                tracing::debug!(event_id, error = %err, "reservation refused");
                Some(Message::BadRequest { id: event_id })
            }
        },
        Message::GetTickets {
            reservation_id,
            cookie,
        } => match store.redeem(reservation_id, &cookie) {
            Ok(codes) => Some(Message::Tickets {
                reservation_id,
                codes,
            }),
            Err(err) => {
                tracing::debug!(reservation_id, error = %err, "redeem refused");
                Some(Message::BadRequest { id: reservation_id })
            }
        },
        Message::Events(_)
        | Message::Reservation { .. }
        | Message::Tickets { .. }
        | Message::BadRequest { .. } => None,
    }
}

fn unix_now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
