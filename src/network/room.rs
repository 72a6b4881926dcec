//! Room Coordination
//!
//! Turns independently connecting clients into two-seat matches.
//! The coordinator exclusively owns every room; all roster mutations go
//! through one write lock so joins, starts and leaves cannot interleave.
//!
//! ```text
//!   OPEN (0-1 seats) --join--> FULL (2 seats) --start--> STARTED
//!         ^                        |                        |
//!         +--------- leave --------+------- leave ----------+
//! ```
//!
//! A room is destroyed when its last seat leaves. Marks are assigned once
//! per room lifetime.

use std::collections::BTreeMap;
use std::fmt;

use rand::Rng;
use serde::{Serialize, Deserialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::game::board::{Mark, Move};
use crate::network::protocol::{ErrorCode, ServerMessage};

/// Maximum seats per room.
pub const MAX_SEATS: usize = 2;

/// Length of generated room codes.
pub const ROOM_CODE_LEN: usize = 6;

const ROOM_CODE_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Opaque per-connection identifier, independent of the transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(uuid::Uuid);

impl ConnectionId {
    /// Fresh random identifier.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// Room code. Any non-blank string; surrounding whitespace is ignored.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// Validate a client-supplied room code.
    pub fn parse(s: &str) -> Result<Self, RoomError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(RoomError::InvalidRoomId);
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Random 6-character lowercase base-36 code.
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let code = (0..ROOM_CODE_LEN)
            .map(|_| ROOM_CODE_ALPHABET[rng.gen_range(0..ROOM_CODE_ALPHABET.len())] as char)
            .collect();
        Self(code)
    }

    /// The code as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// SEATS
// =============================================================================

/// Seat role chosen by the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Created the room; receives `X` on start.
    Host,
    /// Joined an existing room.
    Guest,
}

/// Public view of a seat, as sent on the wire.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatInfo {
    /// Connection holding the seat.
    pub connection_id: ConnectionId,
    /// Display name.
    pub name: String,
    /// Host or guest.
    pub role: Role,
    /// Assigned on start.
    pub mark: Option<Mark>,
}

/// A seat plus the channel to its connection.
#[derive(Debug)]
struct Seat {
    info: SeatInfo,
    sender: mpsc::Sender<ServerMessage>,
}

impl Seat {
    /// Queue a message without waiting. Returns `false` if it was dropped.
    fn send(&self, message: ServerMessage) -> bool {
        match self.sender.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("Outbound queue full for {}, dropping message", self.info.connection_id);
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Connection {} already closed", self.info.connection_id);
                false
            }
        }
    }
}

// =============================================================================
// ROOM
// =============================================================================

/// Room lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomState {
    /// Fewer than two seats, not started.
    Open,
    /// Two seats, not started.
    Full,
    /// Marks assigned.
    Started,
}

/// One room. Seats are kept in arrival order.
#[derive(Debug)]
pub struct Room {
    id: RoomId,
    seats: Vec<Seat>,
    started: bool,
}

impl Room {
    fn new(id: RoomId) -> Self {
        Self {
            id,
            seats: Vec::with_capacity(MAX_SEATS),
            started: false,
        }
    }

    /// Current state.
    pub fn state(&self) -> RoomState {
        if self.started {
            RoomState::Started
        } else if self.seats.len() >= MAX_SEATS {
            RoomState::Full
        } else {
            RoomState::Open
        }
    }

    /// Roster in arrival order.
    pub fn roster(&self) -> Vec<SeatInfo> {
        self.seats.iter().map(|seat| seat.info.clone()).collect()
    }

    fn seat(&self, connection_id: &ConnectionId) -> Option<&Seat> {
        self.seats.iter().find(|seat| seat.info.connection_id == *connection_id)
    }

    fn opponent_of(&self, connection_id: &ConnectionId) -> Option<&Seat> {
        self.seats.iter().find(|seat| seat.info.connection_id != *connection_id)
    }

    /// Whether `connection_id` could take (or already holds) a seat.
    fn can_admit(&self, connection_id: &ConnectionId) -> Result<(), RoomError> {
        if self.seat(connection_id).is_none() && self.seats.len() >= MAX_SEATS {
            return Err(RoomError::RoomFull);
        }
        Ok(())
    }

    /// Seat a connection. Returns the seat and whether it is new.
    fn admit(
        &mut self,
        connection_id: ConnectionId,
        name: &str,
        role: Role,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Result<(SeatInfo, bool), RoomError> {
        if let Some(existing) = self.seat(&connection_id) {
            return Ok((existing.info.clone(), false));
        }
        self.can_admit(&connection_id)?;

        // Refilling a vacated seat after start inherits the free mark.
        let mark = if self.started {
            self.seats.first().and_then(|seat| seat.info.mark).map(Mark::opponent)
        } else {
            None
        };

        let info = SeatInfo {
            connection_id,
            name: name.trim().to_string(),
            role,
            mark,
        };
        self.seats.push(Seat { info: info.clone(), sender });
        Ok((info, true))
    }

    /// Assign marks on first call; later calls return the same roster.
    fn assign_marks(&mut self) -> Result<Vec<SeatInfo>, RoomError> {
        if self.seats.len() < MAX_SEATS {
            return Err(RoomError::InsufficientPlayers(self.seats.len()));
        }

        if !self.started {
            let first = self
                .seats
                .iter()
                .position(|seat| seat.info.role == Role::Host)
                .unwrap_or(0);

            for (i, seat) in self.seats.iter_mut().enumerate() {
                seat.info.mark = Some(if i == first { Mark::X } else { Mark::O });
            }
            self.started = true;
        }

        Ok(self.roster())
    }

    fn remove(&mut self, connection_id: &ConnectionId) -> bool {
        let before = self.seats.len();
        self.seats.retain(|seat| seat.info.connection_id != *connection_id);
        self.seats.len() != before
    }

    fn broadcast(&self, message: ServerMessage) {
        for seat in &self.seats {
            seat.send(message.clone());
        }
    }
}

// =============================================================================
// COORDINATOR
// =============================================================================

/// Registry of all rooms, keyed by room code.
pub struct RoomCoordinator {
    rooms: RwLock<BTreeMap<RoomId, Room>>,
}

impl RoomCoordinator {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(BTreeMap::new()),
        }
    }

    /// Seat `connection_id` in `room_id`, creating the room if absent.
    ///
    /// Re-joining with the same connection returns the existing seat.
    /// On success the caller gets `RoomJoined` and every seat gets `RoomUpdate`.
    #[instrument(skip(self, sender), fields(room = %room_id, conn = %connection_id))]
    pub async fn join(
        &self,
        room_id: &RoomId,
        connection_id: ConnectionId,
        name: &str,
        role: Role,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Result<SeatInfo, RoomError> {
        let mut rooms = self.rooms.write().await;
        admit_locked(&mut rooms, room_id, connection_id, name, role, sender)
    }

    /// Move a seated connection from `from` to `to` under one lock.
    ///
    /// The target is checked first; if it rejects the join, the seat in
    /// `from` is untouched.
    #[instrument(skip(self, sender), fields(from = %from, to = %to, conn = %connection_id))]
    pub async fn switch(
        &self,
        from: &RoomId,
        to: &RoomId,
        connection_id: ConnectionId,
        name: &str,
        role: Role,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Result<SeatInfo, RoomError> {
        let mut rooms = self.rooms.write().await;
        if let Some(target) = rooms.get(to) {
            target.can_admit(&connection_id)?;
        }

        if from != to {
            if let Err(e) = leave_locked(&mut rooms, from, &connection_id) {
                debug!("Previous seat already gone: {}", e);
            }
        }
        admit_locked(&mut rooms, to, connection_id, name, role, sender)
    }

    /// Open a room under a fresh generated code and seat the caller as host.
    #[instrument(skip(self, sender), fields(conn = %connection_id))]
    pub async fn create(
        &self,
        connection_id: ConnectionId,
        name: &str,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Result<(RoomId, SeatInfo), RoomError> {
        let mut rooms = self.rooms.write().await;
        let room_id = {
            let mut rng = rand::thread_rng();
            let mut id = RoomId::generate(&mut rng);
            while rooms.contains_key(&id) {
                id = RoomId::generate(&mut rng);
            }
            id
        };

        let seat = admit_locked(&mut rooms, &room_id, connection_id, name, Role::Host, sender)?;
        info!("Created room {}", room_id);
        Ok((room_id, seat))
    }

    /// Assign marks (once) and broadcast `StartGame` to every seat.
    #[instrument(skip(self), fields(room = %room_id))]
    pub async fn start(&self, room_id: &RoomId) -> Result<Vec<SeatInfo>, RoomError> {
        let mut rooms = self.rooms.write().await;
        let room = rooms.get_mut(room_id).ok_or(RoomError::RoomNotFound)?;

        let already_started = room.started;
        let seats = room.assign_marks()?;

        room.broadcast(ServerMessage::StartGame {
            room_id: room.id.to_string(),
            seats: seats.clone(),
        });

        if already_started {
            debug!("Start repeated, re-broadcasting assignment");
        } else {
            info!("Match started");
        }
        Ok(seats)
    }

    /// Forward a move to the other seat only, tagged with the sender.
    ///
    /// Fails with `RelayDropped` if the opponent's queue could not take it.
    #[instrument(skip(self), fields(room = %room_id, conn = %from))]
    pub async fn relay_move(
        &self,
        room_id: &RoomId,
        from: ConnectionId,
        mv: Move,
    ) -> Result<(), RoomError> {
        let rooms = self.rooms.read().await;
        let room = rooms.get(room_id).ok_or(RoomError::RoomNotFound)?;

        if room.seat(&from).is_none() {
            return Err(RoomError::NotSeated);
        }
        if !room.started {
            return Err(RoomError::NotStarted);
        }

        let opponent = room.opponent_of(&from).ok_or(RoomError::NoOpponent)?;
        let delivered = opponent.send(ServerMessage::PlayerMove {
            mv,
            from_connection_id: from,
        });
        if !delivered {
            return Err(RoomError::RelayDropped);
        }

        debug!("Relayed move {} ({}) to {}", mv.index, mv.mark, opponent.info.connection_id);
        Ok(())
    }

    /// Remove a seat. Returns `true` if the room was destroyed.
    ///
    /// Remaining seats get `RoomUpdate`; no verdict is issued for a started match.
    #[instrument(skip(self), fields(room = %room_id, conn = %connection_id))]
    pub async fn leave(
        &self,
        room_id: &RoomId,
        connection_id: &ConnectionId,
    ) -> Result<bool, RoomError> {
        let mut rooms = self.rooms.write().await;
        leave_locked(&mut rooms, room_id, connection_id)
    }

    /// Roster of a room, if it exists.
    pub async fn roster(&self, room_id: &RoomId) -> Option<Vec<SeatInfo>> {
        self.rooms.read().await.get(room_id).map(Room::roster)
    }

    /// State of a room, if it exists.
    pub async fn room_state(&self, room_id: &RoomId) -> Option<RoomState> {
        self.rooms.read().await.get(room_id).map(Room::state)
    }

    /// Number of live rooms.
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}

impl Default for RoomCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

fn admit_locked(
    rooms: &mut BTreeMap<RoomId, Room>,
    room_id: &RoomId,
    connection_id: ConnectionId,
    name: &str,
    role: Role,
    sender: mpsc::Sender<ServerMessage>,
) -> Result<SeatInfo, RoomError> {
    let room = rooms
        .entry(room_id.clone())
        .or_insert_with(|| Room::new(room_id.clone()));

    let (info, is_new) = room.admit(connection_id, name, role, sender)?;

    let seats = room.roster();
    if let Some(seat) = room.seat(&connection_id) {
        seat.send(ServerMessage::RoomJoined {
            room_id: room.id.to_string(),
            seats: seats.clone(),
        });
    }
    room.broadcast(ServerMessage::RoomUpdate {
        room_id: room.id.to_string(),
        seats,
    });

    if is_new {
        info!("{} joined {} as {:?} ({}/{} seats)", info.name, room.id, role, room.seats.len(), MAX_SEATS);
    } else {
        debug!("Repeated join ignored");
    }
    Ok(info)
}

fn leave_locked(
    rooms: &mut BTreeMap<RoomId, Room>,
    room_id: &RoomId,
    connection_id: &ConnectionId,
) -> Result<bool, RoomError> {
    let room = rooms.get_mut(room_id).ok_or(RoomError::RoomNotFound)?;

    if !room.remove(connection_id) {
        return Err(RoomError::NotSeated);
    }

    if room.seats.is_empty() {
        rooms.remove(room_id);
        info!("Room {} closed", room_id);
        return Ok(true);
    }

    room.broadcast(ServerMessage::RoomUpdate {
        room_id: room.id.to_string(),
        seats: room.roster(),
    });
    info!("Seat in {} released, {} remaining", room_id, room.seats.len());
    Ok(false)
}

// =============================================================================
// ERRORS
// =============================================================================

/// Room protocol errors. Reported to the offending connection only.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    /// Two other connections hold the seats.
    #[error("Room is full.")]
    RoomFull,

    /// Start needs two seats.
    #[error("Cannot start game: need 2 players, have {0}.")]
    InsufficientPlayers(usize),

    /// The other seat is vacant.
    #[error("No opponent to relay to.")]
    NoOpponent,

    /// Moves are only relayed after start.
    #[error("Game has not started.")]
    NotStarted,

    /// Caller holds no seat in the room.
    #[error("Not seated in this room.")]
    NotSeated,

    /// No room with that code.
    #[error("Room not found.")]
    RoomNotFound,

    /// Blank room code.
    #[error("Room id must not be empty.")]
    InvalidRoomId,

    /// The opponent's outbound queue rejected a relayed move.
    #[error("Move could not be delivered to the opponent.")]
    RelayDropped,
}

impl RoomError {
    /// Wire code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            RoomError::RoomFull => ErrorCode::RoomFull,
            RoomError::InsufficientPlayers(_) => ErrorCode::InsufficientPlayers,
            RoomError::NotStarted => ErrorCode::NotStarted,
            RoomError::NoOpponent | RoomError::NotSeated | RoomError::RoomNotFound => ErrorCode::NotInRoom,
            RoomError::InvalidRoomId => ErrorCode::InvalidInput,
            RoomError::RelayDropped => ErrorCode::InternalError,
        }
    }
}
