//! In-memory signaling backend with no media plane.
//!
//! Published offers are echoed back as answers and handed to subscribers
//! unchanged, which is enough for exercising clients against the RPC surface
//! without a running engine.

use std::{collections::HashMap, time::Instant};

use {
    async_trait::async_trait,
    kraken_protocol::RpcError,
    serde_json::{Value, json},
    tokio::sync::RwLock,
    tracing::debug,
};

use crate::{params::Params, signal::SignalRouter};

/// ICE candidates kept per published track.
pub const MAX_CANDIDATES: usize = 64;

/// A peer that has published into a room.
#[derive(Debug, Clone)]
pub struct PeerSession {
    pub uid: String,
    pub track: String,
    pub jsep: String,
    pub candidates: Vec<String>,
    pub published_at: Instant,
}

/// Peers of one room, keyed by uid.
#[derive(Debug, Default)]
struct Room {
    peers: HashMap<String, PeerSession>,
}

impl Room {
    fn member_mut(&mut self, rid: &str, uid: &str) -> Result<&mut PeerSession, RpcError> {
        self.peers.get_mut(uid).ok_or_else(|| not_found(rid, uid))
    }

    fn track(&self, track: &str) -> Option<&PeerSession> {
        self.peers.values().find(|p| p.track == track)
    }
}

/// Room registry implementing [`SignalRouter`] in memory.
#[derive(Debug, Default)]
pub struct LoopbackRouter {
    rooms: RwLock<HashMap<String, Room>>,
}

impl LoopbackRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn peer(&self, rid: &str, uid: &str) -> Option<PeerSession> {
        self.rooms
            .read()
            .await
            .get(rid)
            .and_then(|room| room.peers.get(uid))
            .cloned()
    }
}

fn not_found(rid: &str, uid: &str) -> RpcError {
    RpcError::handler(format!("peer {uid} not found in room {rid}"))
}

#[async_trait]
impl SignalRouter for LoopbackRouter {
    async fn list(&self, params: &[Value]) -> Result<Vec<String>, RpcError> {
        let [rid] = Params::new(params).strings(["rid"])?;
        let rooms = self.rooms.read().await;
        let mut peers: Vec<String> = rooms
            .get(rid)
            .map(|room| room.peers.keys().cloned().collect())
            .unwrap_or_default();
        peers.sort();
        Ok(peers)
    }

    async fn publish(&self, params: &[Value]) -> Result<Value, RpcError> {
        let [rid, uid, jsep] = Params::new(params).strings(["rid", "uid", "jsep"])?;
        if jsep.is_empty() {
            return Err(RpcError::handler("invalid jsep, empty offer"));
        }

        let track = uuid::Uuid::new_v4().to_string();
        let session = PeerSession {
            uid: uid.to_owned(),
            track: track.clone(),
            jsep: jsep.to_owned(),
            candidates: Vec::new(),
            published_at: Instant::now(),
        };
        self.rooms
            .write()
            .await
            .entry(rid.to_owned())
            .or_default()
            .peers
            .insert(uid.to_owned(), session);

        debug!(rid, uid, track = %track, "peer published");
        Ok(json!({ "track": track, "sdp": jsep }))
    }

    async fn trickle(&self, params: &[Value]) -> Result<(), RpcError> {
        let [rid, uid, track, candidate] =
            Params::new(params).strings(["rid", "uid", "track", "candidate"])?;

        let mut rooms = self.rooms.write().await;
        let room = rooms.get_mut(rid).ok_or_else(|| not_found(rid, uid))?;
        let peer = room.member_mut(rid, uid)?;
        if peer.track != track {
            return Err(RpcError::handler(format!("track {track} not found")));
        }
        if peer.candidates.iter().any(|c| c == candidate) {
            return Ok(());
        }
        if peer.candidates.len() >= MAX_CANDIDATES {
            return Err(RpcError::handler(format!(
                "too many candidates for track {track}, limit {MAX_CANDIDATES}"
            )));
        }
        peer.candidates.push(candidate.to_owned());
        Ok(())
    }

    async fn subscribe(&self, params: &[Value]) -> Result<Value, RpcError> {
        let [rid, uid, track] = Params::new(params).strings(["rid", "uid", "track"])?;

        let rooms = self.rooms.read().await;
        let room = rooms
            .get(rid)
            .filter(|room| room.peers.contains_key(uid))
            .ok_or_else(|| not_found(rid, uid))?;
        let publisher = room
            .track(track)
            .ok_or_else(|| RpcError::handler(format!("track {track} not found")))?;

        debug!(
            rid,
            uid,
            track,
            publisher = %publisher.uid,
            published_ms = publisher.published_at.elapsed().as_millis(),
            "peer subscribed"
        );
        Ok(json!({ "track": track, "sdp": publisher.jsep }))
    }
}
