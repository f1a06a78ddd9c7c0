/// Representative feed payloads
///
/// Field names are snake_case here; the decoder matches wire keys regardless of
/// casing or underscores, so `FixtureId`, `fixtureid` and `FIXTURE_ID` all land
/// in `fixture_id`.

use serde::Deserialize;

use crate::feed_entity;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FixtureMetadataUpdate {
    #[serde(default)]
    pub events: Vec<FixtureEvent>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LivescoreUpdate {
    #[serde(default)]
    pub events: Vec<LivescoreEvent>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MarketUpdate {
    #[serde(default)]
    pub events: Vec<MarketEvent>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SettlementUpdate {
    #[serde(default)]
    pub events: Vec<MarketEvent>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct KeepAliveUpdate {
    pub keep_alive: Option<KeepAlive>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HeartbeatUpdate {}

feed_entity!(FixtureMetadataUpdate => 1);
feed_entity!(LivescoreUpdate => 2);
feed_entity!(MarketUpdate => 3);
feed_entity!(KeepAliveUpdate => 31);
feed_entity!(HeartbeatUpdate => 32);
feed_entity!(SettlementUpdate => 35);

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FixtureEvent {
    pub fixture_id: i64,
    pub fixture: Option<Fixture>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Fixture {
    pub sport: Option<IdName>,
    pub location: Option<IdName>,
    pub league: Option<IdName>,
    pub start_date: Option<String>,
    pub last_update: Option<String>,
    pub status: Option<i32>,
    #[serde(default)]
    pub participants: Vec<Participant>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IdName {
    pub id: i64,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Participant {
    pub id: i64,
    pub name: Option<String>,
    pub position: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LivescoreEvent {
    pub fixture_id: i64,
    pub livescore: Option<Livescore>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Livescore {
    pub scoreboard: Option<Scoreboard>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Scoreboard {
    pub status: Option<i32>,
    pub current_period: Option<i32>,
    pub time: Option<String>,
    #[serde(default)]
    pub results: Vec<ScoreResult>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScoreResult {
    pub position: Option<String>,
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MarketEvent {
    pub fixture_id: i64,
    #[serde(default)]
    pub markets: Vec<Market>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Market {
    pub id: i64,
    pub name: Option<String>,
    #[serde(default)]
    pub bets: Vec<Bet>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Bet {
    pub id: i64,
    pub name: Option<String>,
    pub status: Option<i32>,
    pub price: Option<String>,
    pub start_price: Option<String>,
    pub line: Option<String>,
    pub base_line: Option<String>,
    pub settlement: Option<i32>,
    pub last_update: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct KeepAlive {
    #[serde(default)]
    pub active_events: Vec<i64>,
    pub provider_id: Option<i32>,
}
