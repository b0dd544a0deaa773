use std::fmt;

use {
    chrono::{DateTime, Utc},
    herald_channels::{ItemId, Target},
    serde::{Deserialize, Serialize},
};

use crate::trigger::TriggerMask;

/// Typed payload carried with each event. Each variant maps to one kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    Timer,
    ConfigChanged,
    Aggregated {
        buckets: Vec<AccumulationBucket>,
    },
    ServerStarted {
        world: String,
    },
    ServerStopped,
    PlayerJoined {
        player_id: u64,
        name: String,
    },
    PlayerLeft {
        player_id: u64,
    },
    ChatMessage {
        player_id: Option<u64>,
        author: String,
        text: String,
    },
    EntityChanged {
        entity_id: u64,
        owner_id: Option<u64>,
    },
    TradeItem {
        transaction_id: String,
        player_id: u64,
        item: String,
        quantity: i64,
        /// Unit price in the smallest currency unit.
        price: i64,
    },
    ItemDeleted {
        target: Target,
        item_id: ItemId,
    },
}

impl EventPayload {
    /// Returns the [`TriggerMask`] bit that matches this payload.
    pub fn kind(&self) -> TriggerMask {
        match self {
            Self::Timer => TriggerMask::TIMER,
            Self::ConfigChanged => TriggerMask::CONFIG_CHANGED,
            Self::Aggregated { .. } => TriggerMask::AGGREGATED,
            Self::ServerStarted { .. } => TriggerMask::SERVER_STARTED,
            Self::ServerStopped => TriggerMask::SERVER_STOPPED,
            Self::PlayerJoined { .. } => TriggerMask::PLAYER_JOINED,
            Self::PlayerLeft { .. } => TriggerMask::PLAYER_LEFT,
            Self::ChatMessage { .. } => TriggerMask::CHAT_MESSAGE,
            Self::EntityChanged { .. } => TriggerMask::ENTITY_CHANGED,
            Self::TradeItem { .. } => TriggerMask::TRADE_ITEM,
            Self::ItemDeleted { .. } => TriggerMask::ITEM_DELETED,
        }
    }

    /// Correlation key for micro-batching. Only trade line items have one:
    /// every item of a transaction shares its id.
    pub fn accumulation_key(&self) -> Option<AccumulationKey> {
        match self {
            Self::TradeItem { transaction_id, .. } => {
                Some(AccumulationKey::new(format!("trade:{transaction_id}")))
            },
            _ => None,
        }
    }
}

/// An occurrence routed through the bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub kind: TriggerMask,
    pub payload: EventPayload,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            kind: payload.kind(),
            payload,
            timestamp: Utc::now(),
        }
    }

    pub fn timer() -> Self {
        Self::new(EventPayload::Timer)
    }

    pub fn config_changed() -> Self {
        Self::new(EventPayload::ConfigChanged)
    }

    pub fn aggregated(buckets: Vec<AccumulationBucket>) -> Self {
        Self::new(EventPayload::Aggregated { buckets })
    }
}

impl From<EventPayload> for Event {
    fn from(payload: EventPayload) -> Self {
        Self::new(payload)
    }
}

/// Correlation key shared by sub-events of one logical occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccumulationKey(String);

impl AccumulationKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccumulationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Raw payloads sharing a key, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccumulationBucket {
    pub key: AccumulationKey,
    pub items: Vec<EventPayload>,
}
