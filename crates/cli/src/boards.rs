//! Reference boards shipped with the binary.

use std::{collections::VecDeque, sync::Mutex};

use {
    async_trait::async_trait,
    herald_channels::Target,
    herald_display::{ContentStrategy, DesiredContentBlock},
    herald_events::{AccumulationBucket, Event, EventPayload, TriggerMask},
};

use crate::world::SharedWorld;

/// Server state and head count in a single item.
pub struct StatusBoard {
    world: SharedWorld,
}

impl StatusBoard {
    pub fn new(world: SharedWorld) -> Self {
        Self { world }
    }
}

#[async_trait]
impl ContentStrategy for StatusBoard {
    fn name(&self) -> &str {
        "status"
    }

    fn base_tag(&self) -> &str {
        "Status"
    }

    fn triggers(&self) -> TriggerMask {
        TriggerMask::SERVER_STARTED
            | TriggerMask::SERVER_STOPPED
            | TriggerMask::PLAYER_JOINED
            | TriggerMask::PLAYER_LEFT
    }

    async fn desired_content(&self, _target: &Target) -> anyhow::Result<Vec<DesiredContentBlock>> {
        let world = self.world.read().unwrap_or_else(|e| e.into_inner());
        let text = if world.online {
            let name = world.world.as_deref().unwrap_or("unnamed world");
            match world.players.len() {
                1 => format!("online: {name}, 1 player"),
                n => format!("online: {name}, {n} players"),
            }
        } else {
            "offline".to_string()
        };
        Ok(vec![DesiredContentBlock::new("server", text)])
    }
}

/// One item per online player, keyed by player id.
pub struct PlayersBoard {
    world: SharedWorld,
}

impl PlayersBoard {
    pub fn new(world: SharedWorld) -> Self {
        Self { world }
    }
}

#[async_trait]
impl ContentStrategy for PlayersBoard {
    fn name(&self) -> &str {
        "players"
    }

    fn base_tag(&self) -> &str {
        "Players"
    }

    fn triggers(&self) -> TriggerMask {
        TriggerMask::PLAYER_JOINED
            | TriggerMask::PLAYER_LEFT
            | TriggerMask::SERVER_STOPPED
            | TriggerMask::ENTITY_CHANGED
            | TriggerMask::CHAT_MESSAGE
            | TriggerMask::TIMER
    }

    fn high_frequency(&self) -> TriggerMask {
        TriggerMask::ENTITY_CHANGED | TriggerMask::CHAT_MESSAGE
    }

    async fn desired_content(&self, _target: &Target) -> anyhow::Result<Vec<DesiredContentBlock>> {
        let world = self.world.read().unwrap_or_else(|e| e.into_inner());
        Ok(world
            .players
            .iter()
            .map(|(id, player)| {
                let mut text = format!("{} ({} entities)", player.name, world.entity_count(*id));
                if let Some(chat) = &player.last_chat {
                    text.push_str(&format!(": \"{chat}\""));
                }
                DesiredContentBlock::new(id.to_string(), text)
            })
            .collect())
    }
}

const RECENT_TRADES: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
struct TradeSummary {
    transaction_id: String,
    player_id: u64,
    lines: Vec<String>,
    total: i64,
}

impl TradeSummary {
    fn from_bucket(bucket: &AccumulationBucket) -> Option<Self> {
        let mut summary: Option<Self> = None;
        for item in &bucket.items {
            let EventPayload::TradeItem {
                transaction_id,
                player_id,
                item,
                quantity,
                price,
            } = item
            else {
                continue;
            };
            let entry = summary.get_or_insert_with(|| Self {
                transaction_id: transaction_id.clone(),
                player_id: *player_id,
                lines: Vec::new(),
                total: 0,
            });
            entry.lines.push(format!("{quantity}x {item}"));
            entry.total += quantity * price;
        }
        summary
    }
}

/// Most recent completed trades, newest first, fed by aggregated buckets.
pub struct TradesBoard {
    world: SharedWorld,
    recent: Mutex<VecDeque<TradeSummary>>,
}

impl TradesBoard {
    pub fn new(world: SharedWorld) -> Self {
        Self {
            world,
            recent: Mutex::new(VecDeque::new()),
        }
    }
}

#[async_trait]
impl ContentStrategy for TradesBoard {
    fn name(&self) -> &str {
        "trades"
    }

    fn base_tag(&self) -> &str {
        "Trades"
    }

    fn triggers(&self) -> TriggerMask {
        TriggerMask::AGGREGATED
    }

    async fn observe(&self, event: &Event) {
        let EventPayload::Aggregated { buckets } = &event.payload else {
            return;
        };
        let mut recent = self.recent.lock().unwrap_or_else(|e| e.into_inner());
        for summary in buckets.iter().filter_map(TradeSummary::from_bucket) {
            recent.retain(|s| s.transaction_id != summary.transaction_id);
            recent.push_front(summary);
        }
        recent.truncate(RECENT_TRADES);
    }

    async fn desired_content(&self, _target: &Target) -> anyhow::Result<Vec<DesiredContentBlock>> {
        let world = self.world.read().unwrap_or_else(|e| e.into_inner());
        let recent = self.recent.lock().unwrap_or_else(|e| e.into_inner());
        Ok(recent
            .iter()
            .map(|trade| {
                let who = world
                    .player_name(trade.player_id)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("player {}", trade.player_id));
                DesiredContentBlock::new(
                    trade.transaction_id.clone(),
                    format!("{who}: {} (total {})", trade.lines.join(", "), trade.total),
                )
            })
            .collect())
    }
}
