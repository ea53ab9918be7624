//! Reservation bookkeeping.
//!
//! The store owns the event inventory, all live reservations, the
//! pending-expiry queue and both id counters. It is the single
//! serialization point of the server: one dispatcher loop drives it,
//! so there is no locking. Every operation takes `now` as an argument;
//! the store never reads a clock.

use std::collections::{HashMap, VecDeque};

use rand::Rng;
use thiserror::Error;

use crate::catalog::EventSeed;
use crate::proto::{COOKIE_LEN, EventEntry, MAX_DATAGRAM};
use crate::ticket::{TICKET_CODE_LEN, ticket_code};

/// Reservation ids start above this; the first issued id is 1_000_001.
const RESERVATION_ID_FLOOR: u32 = 1_000_000;

/// Cookie bytes are printable ASCII without space and DEL.
const COOKIE_MIN: u8 = 33;
const COOKIE_MAX: u8 = 126;

/// Fixed wire overhead of a TICKETS reply: type + reservation id + count.
const TICKETS_HEADER_LEN: usize = 7;

/// One catalog event with its remaining inventory.
///
/// Membership is fixed at startup; only `ticket_count` mutates.
pub struct Event {
    pub description: Vec<u8>,
    pub ticket_count: u16,
}

/// Whether the tickets of a reservation have been handed out yet.
///
/// A collected reservation keeps its ticket range forever and stays
/// redeemable; expiry only ever deletes pending holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Hold {
    Pending,
    Collected { first_ticket: u64 },
}

struct Reservation {
    event_id: u32,
    ticket_count: u16,
    cookie: [u8; COOKIE_LEN],
    hold: Hold,
}

/// A freshly issued reservation, as echoed to the client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Issued {
    pub reservation_id: u32,
    pub event_id: u32,
    pub ticket_count: u16,
    pub cookie: [u8; COOKIE_LEN],
    pub expires_at: u64,
}

/// Why a request was refused. Logged server-side; on the wire only the
/// offending id is echoed back.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("ticket count must be at least 1")]
    ZeroTickets,
    #[error("{count} ticket codes do not fit in one reply datagram")]
    ReplyTooLarge { count: u16 },
    #[error("unknown event {0}")]
    UnknownEvent(u32),
    #[error("event {event_id} has {available} tickets left, {requested} requested")]
    Insufficient {
        event_id: u32,
        available: u16,
        requested: u16,
    },
    #[error("unknown reservation {0}")]
    UnknownReservation(u32),
    #[error("cookie mismatch for reservation {0}")]
    CookieMismatch(u32),
}

pub struct Store {
    events: Vec<Event>,
    reservations: HashMap<u32, Reservation>,
    /// FIFO of `(reservation_id, expires_at)`. Insertion order equals
    /// expiry order because `timeout` is a server-global constant.
    expiry_queue: VecDeque<(u32, u64)>,
    last_reservation_id: u32,
    /// Next ticket number to hand out. Strictly monotonic, never
    /// reused, not decremented when reservations expire.
    ticket_counter: u64,
    timeout: u64,
}

impl Store {
    pub fn new(seeds: Vec<EventSeed>, timeout: u64) -> Self {
        let events = seeds
            .into_iter()
            .map(|seed| Event {
                description: seed.description,
                ticket_count: seed.ticket_count,
            })
            .collect();
        Self {
            events,
            reservations: HashMap::new(),
            expiry_queue: VecDeque::new(),
            last_reservation_id: RESERVATION_ID_FLOOR,
            ticket_counter: 1,
            timeout,
        }
    }

    /// Catalog prefix whose encoded `EVENTS` reply fits one datagram.
    ///
    /// Truncation is silent; entries past the budget are simply absent.
    pub fn list_events(&self) -> Vec<EventEntry> {
        let mut entries = Vec::new();
        let mut used = 1usize; // EVENTS type byte
        for (event_id, event) in self.events.iter().enumerate() {
            let entry = EventEntry {
                event_id: event_id as u32,
                ticket_count: event.ticket_count,
                description: event.description.clone(),
            };
            if used + entry.wire_len() > MAX_DATAGRAM {
                break;
            }
            used += entry.wire_len();
            entries.push(entry);
        }
        entries
    }

    /// Hold `count` tickets of `event_id` until `now + timeout`.
    ///
    /// Refusals leave the store untouched. A TICKETS reply is never
    /// truncated, so a count whose reply could not fit one datagram is
    /// refused here, at reservation time.
    pub fn reserve(&mut self, event_id: u32, count: u16, now: u64) -> Result<Issued, RequestError> {
        if count == 0 {
            return Err(RequestError::ZeroTickets);
        }
        if TICKETS_HEADER_LEN + TICKET_CODE_LEN * count as usize > MAX_DATAGRAM {
            return Err(RequestError::ReplyTooLarge { count });
        }
        let event = self
            .events
            .get_mut(event_id as usize)
            .ok_or(RequestError::UnknownEvent(event_id))?;
        if event.ticket_count < count {
            return Err(RequestError::Insufficient {
                event_id,
                available: event.ticket_count,
                requested: count,
            });
        }

        event.ticket_count -= count;
        self.last_reservation_id += 1;
        let reservation_id = self.last_reservation_id;
        let cookie = generate_cookie();
        let expires_at = now + self.timeout;

        self.reservations.insert(
            reservation_id,
            Reservation {
                event_id,
                ticket_count: count,
                cookie,
                hold: Hold::Pending,
            },
        );
        self.expiry_queue.push_back((reservation_id, expires_at));
        tracing::debug!(reservation_id, event_id, tickets = count, expires_at, "reservation issued");

        Ok(Issued {
            reservation_id,
            event_id,
            ticket_count: count,
            cookie,
            expires_at,
        })
    }

    /// Exchange a reservation for its ticket codes.
    ///
    /// The first successful redemption binds the reservation to a
    /// fresh range of ticket numbers; every later one returns the
    /// identical sequence. An expired reservation is gone from the map
    /// and indistinguishable from one that never existed.
    pub fn redeem(
        &mut self,
        reservation_id: u32,
        cookie: &[u8; COOKIE_LEN],
    ) -> Result<Vec<[u8; TICKET_CODE_LEN]>, RequestError> {
        let reservation = self
            .reservations
            .get_mut(&reservation_id)
            .ok_or(RequestError::UnknownReservation(reservation_id))?;
        if &reservation.cookie != cookie {
            return Err(RequestError::CookieMismatch(reservation_id));
        }

        let first_ticket = match reservation.hold {
            Hold::Collected { first_ticket } => first_ticket,
            Hold::Pending => {
                let first_ticket = self.ticket_counter;
                self.ticket_counter += u64::from(reservation.ticket_count);
                reservation.hold = Hold::Collected { first_ticket };
                tracing::debug!(reservation_id, first_ticket, tickets = reservation.ticket_count, "reservation collected");
                first_ticket
            }
        };

        Ok((0..u64::from(reservation.ticket_count))
            .map(|i| ticket_code(first_ticket + i))
            .collect())
    }

    /// Expire every queue entry due at `now`.
    ///
    /// Pending holds refund their tickets and disappear; collected
    /// holds lose only the queue entry and persist. The queue front is
    /// the oldest deadline, so the scan stops at the first entry still
    /// in the future.
    pub fn sweep_expired(&mut self, now: u64) {
        while let Some(&(reservation_id, expires_at)) = self.expiry_queue.front() {
            if expires_at > now {
                break;
            }
            self.expiry_queue.pop_front();

            let Some(reservation) = self.reservations.get(&reservation_id) else {
                continue;
            };
            if matches!(reservation.hold, Hold::Collected { .. }) {
                continue;
            }

            let event_id = reservation.event_id;
            let tickets = reservation.ticket_count;
            self.reservations.remove(&reservation_id);
            if let Some(event) = self.events.get_mut(event_id as usize) {
                event.ticket_count += tickets;
            }
            tracing::debug!(reservation_id, event_id, tickets, "expired reservation refunded");
        }
    }
}

fn generate_cookie() -> [u8; COOKIE_LEN] {
    let mut rng = rand::rng();
    let mut cookie = [0u8; COOKIE_LEN];
    for byte in &mut cookie {
        *byte = rng.random_range(COOKIE_MIN..=COOKIE_MAX);
    }
    cookie
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed(description: &str, ticket_count: u16) -> EventSeed {
        EventSeed {
            description: description.as_bytes().to_vec(),
            ticket_count,
        }
    }

    fn available(store: &Store, event_id: u32) -> u16 {
        store.events[event_id as usize].ticket_count
    }

    #[test]
    fn reserve_then_redeem_issues_sequential_codes() {
        let mut store = Store::new(vec![seed("E", 5)], 10);

        let issued = store.reserve(0, 3, 100).unwrap();
        assert_eq!(issued.reservation_id, 1_000_001);
        assert_eq!(issued.event_id, 0);
        assert_eq!(issued.ticket_count, 3);
        assert_eq!(issued.expires_at, 110);
        assert_eq!(available(&store, 0), 2);

        let codes = store.redeem(issued.reservation_id, &issued.cookie).unwrap();
        assert_eq!(codes, vec![*b"0000001", *b"0000002", *b"0000003"]);
    }

    #[test]
    fn redeem_is_idempotent_and_never_expires_once_collected() {
        let mut store = Store::new(vec![seed("E", 5)], 10);
        let issued = store.reserve(0, 2, 100).unwrap();

        let first = store.redeem(issued.reservation_id, &issued.cookie).unwrap();
        // Far past the deadline: the sweep drops the queue entry but
        // keeps the collected reservation, and no tickets come back.
        store.sweep_expired(10_000);
        let again = store.redeem(issued.reservation_id, &issued.cookie).unwrap();

        assert_eq!(first, again);
        assert_eq!(available(&store, 0), 3);
    }

    #[test]
    fn expired_pending_reservation_refunds_inventory() {
        let mut store = Store::new(vec![seed("E", 5)], 5);
        let issued = store.reserve(0, 4, 200).unwrap();
        assert_eq!(available(&store, 0), 1);

        store.sweep_expired(204);
        assert_eq!(available(&store, 0), 1, "not due yet");

        store.sweep_expired(205);
        assert_eq!(available(&store, 0), 5);
        assert_eq!(
            store.redeem(issued.reservation_id, &issued.cookie),
            Err(RequestError::UnknownReservation(issued.reservation_id))
        );
    }

    #[test]
    fn sweep_stops_at_first_future_deadline() {
        let mut store = Store::new(vec![seed("E", 10)], 5);
        store.reserve(0, 1, 100).unwrap();
        store.reserve(0, 2, 101).unwrap();
        store.reserve(0, 3, 109).unwrap();

        store.sweep_expired(106);
        // 100+5 and 101+5 are due, 109+5 is not.
        assert_eq!(available(&store, 0), 7);
        store.sweep_expired(114);
        assert_eq!(available(&store, 0), 10);
    }

    #[test]
    fn cookie_mismatch_is_refused() {
        let mut store = Store::new(vec![seed("E", 5)], 10);
        let issued = store.reserve(0, 3, 100).unwrap();

        let mut wrong = issued.cookie;
        wrong[0] ^= 1;
        assert_eq!(
            store.redeem(issued.reservation_id, &wrong),
            Err(RequestError::CookieMismatch(issued.reservation_id))
        );
        // The right cookie still works afterwards.
        assert!(store.redeem(issued.reservation_id, &issued.cookie).is_ok());
    }

    #[test]
    fn reserve_refusals_leave_state_untouched() {
        let mut store = Store::new(vec![seed("E", 2)], 10);

        assert_eq!(store.reserve(0, 0, 100), Err(RequestError::ZeroTickets));
        assert_eq!(
            store.reserve(0, 3, 100),
            Err(RequestError::Insufficient {
                event_id: 0,
                available: 2,
                requested: 3,
            })
        );
        assert_eq!(store.reserve(1, 1, 100), Err(RequestError::UnknownEvent(1)));
        // 7 * 9360 + 7 = 65_527 > 65_507
        assert_eq!(
            store.reserve(0, 9360, 100),
            Err(RequestError::ReplyTooLarge { count: 9360 })
        );

        assert_eq!(available(&store, 0), 2);
        assert!(store.reservations.is_empty());
        assert!(store.expiry_queue.is_empty());
        // The next successful reservation still gets the first id.
        assert_eq!(store.reserve(0, 1, 100).unwrap().reservation_id, 1_000_001);
    }

    #[test]
    fn largest_reply_that_fits_is_accepted() {
        let mut store = Store::new(vec![seed("E", u16::MAX)], 10);
        // 7 * 9357 + 7 = 65_506 <= 65_507; one more does not fit.
        assert!(store.reserve(0, 9357, 100).is_ok());
        assert_eq!(
            store.reserve(0, 9358, 100),
            Err(RequestError::ReplyTooLarge { count: 9358 })
        );
    }

    #[test]
    fn reservation_ids_are_strictly_increasing_past_the_floor() {
        let mut store = Store::new(vec![seed("E", 100)], 10);
        let mut previous = RESERVATION_ID_FLOOR;
        for _ in 0..5 {
            let issued = store.reserve(0, 1, 100).unwrap();
            assert!(issued.reservation_id > previous);
            previous = issued.reservation_id;
        }
    }

    #[test]
    fn ticket_numbers_are_never_reused_after_expiry() {
        let mut store = Store::new(vec![seed("E", 10)], 5);

        let lost = store.reserve(0, 3, 100).unwrap();
        let _ = store.redeem(lost.reservation_id, &lost.cookie).unwrap();

        // An uncollected hold expires; its tickets return to the event
        // but the counter does not rewind.
        store.reserve(0, 2, 101).unwrap();
        store.sweep_expired(200);

        let next = store.reserve(0, 1, 200).unwrap();
        let codes = store.redeem(next.reservation_id, &next.cookie).unwrap();
        assert_eq!(codes, vec![*b"0000004"]);
    }

    #[test]
    fn cookies_are_printable_ascii() {
        let mut store = Store::new(vec![seed("E", 100)], 10);
        for _ in 0..10 {
            let issued = store.reserve(0, 1, 100).unwrap();
            assert!(issued.cookie.iter().all(|&byte| (33..=126).contains(&byte)));
        }
    }

    #[test]
    fn inventory_is_conserved_across_every_transition() {
        let initial = 10u16;
        let mut store = Store::new(vec![seed("E", initial)], 5);

        let collected = store.reserve(0, 3, 100).unwrap();
        store.redeem(collected.reservation_id, &collected.cookie).unwrap();
        let pending = store.reserve(0, 4, 101).unwrap();
        let doomed = store.reserve(0, 2, 102).unwrap();

        let held: u16 = [&pending, &doomed].iter().map(|issued| issued.ticket_count).sum();
        assert_eq!(available(&store, 0) + held + collected.ticket_count, initial);

        // Everything pending expires; collected tickets stay spent.
        store.sweep_expired(1_000);
        assert_eq!(available(&store, 0) + collected.ticket_count, initial);
    }

    #[test]
    fn list_events_reports_live_counts() {
        let mut store = Store::new(vec![seed("Concert A", 100), seed("Show B", 50)], 10);
        store.reserve(0, 10, 100).unwrap();

        let entries = store.list_events();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].event_id, 0);
        assert_eq!(entries[0].ticket_count, 90);
        assert_eq!(entries[0].description, b"Concert A");
        assert_eq!(entries[1].event_id, 1);
        assert_eq!(entries[1].ticket_count, 50);
    }

    #[test]
    fn list_events_truncates_at_the_datagram_budget() {
        // 255-byte descriptions encode to 262 bytes each:
        // 1 + 250 * 262 = 65_501 fits, a 251st entry would not.
        let seeds = (0..251).map(|_| seed(&"x".repeat(255), 1)).collect();
        let store = Store::new(seeds, 10);

        let entries = store.list_events();
        assert_eq!(entries.len(), 250);
        let encoded: usize = 1 + entries.iter().map(EventEntry::wire_len).sum::<usize>();
        assert!(encoded <= MAX_DATAGRAM);
    }
}
