//! Domain types: the wire shape of a raw upstream fill, its normalized
//! form, and every derived view (positions, PnL, leaderboard). See spec §3.

use serde::{Deserialize, Deserializer, Serialize};

/// Parses a decimal-string field (`"123.45"`) into `f64`. Upstream always
/// sends these as strings; spec §3 explicitly chooses double-precision
/// floats over fixed-point here.
fn de_decimal_str<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    raw.parse::<f64>()
        .map_err(|_| serde::de::Error::custom(format!("invalid decimal string: {raw}")))
}

fn de_decimal_str_opt<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => s
            .parse::<f64>()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid decimal string: {s}"))),
    }
}

/// The raw `side` discriminator as reported by upstream: `B` (buy) or `A`
/// (ask/sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum RawSide {
    B,
    A,
}

/// Normalized trade direction (spec §3: `B -> buy`, `A -> sell`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl From<RawSide> for Side {
    fn from(raw: RawSide) -> Self {
        match raw {
            RawSide::B => Side::Buy,
            RawSide::A => Side::Sell,
        }
    }
}

impl Side {
    /// Signed-size sign convention used throughout position reconstruction:
    /// buys are positive, sells are negative.
    pub fn sign(self) -> f64 {
        match self {
            Side::Buy => 1.0,
            Side::Sell => -1.0,
        }
    }
}

/// The dynamically-typed `builder` field: a bare address string, a tagged
/// `{b, f}` object, or (via `Option`) absent entirely. See spec §9.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum BuilderField {
    Address(String),
    Tagged { b: String, #[allow(dead_code)] f: f64 },
}

impl BuilderField {
    /// The address portion regardless of representation.
    pub fn address(&self) -> &str {
        match self {
            BuilderField::Address(a) => a,
            BuilderField::Tagged { b, .. } => b,
        }
    }
}

/// A single executed trade exactly as returned by the upstream `/info`
/// endpoint (spec §3, §6).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RawFill {
    pub coin: String,
    #[serde(deserialize_with = "de_decimal_str")]
    pub px: f64,
    #[serde(deserialize_with = "de_decimal_str")]
    pub sz: f64,
    pub side: RawSide,
    pub time: i64,
    #[serde(rename = "closedPnl", deserialize_with = "de_decimal_str")]
    pub closed_pnl: f64,
    #[serde(deserialize_with = "de_decimal_str")]
    pub fee: f64,
    #[serde(default)]
    pub builder: Option<BuilderField>,
    #[serde(
        rename = "builderFee",
        default,
        deserialize_with = "de_decimal_str_opt"
    )]
    pub builder_fee: Option<f64>,
    pub hash: String,
    pub oid: u64,
    pub tid: u64,
}

impl RawFill {
    /// Signed size: positive for buys, negative for sells.
    pub fn signed_size(&self) -> f64 {
        Side::from(self.side).sign() * self.sz
    }

    /// The upstream-reported builder address, regardless of wire shape.
    /// `None` when the `builder` field is absent (spec §4.5).
    pub fn builder_address(&self) -> Option<&str> {
        self.builder.as_ref().map(BuilderField::address)
    }
}

/// A fill after normalization (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedFill {
    #[serde(rename = "timeMs")]
    pub time_ms: i64,
    pub coin: String,
    pub side: Side,
    pub px: f64,
    pub sz: f64,
    pub fee: f64,
    #[serde(rename = "closedPnl")]
    pub closed_pnl: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub builder: Option<String>,
}

impl NormalizedFill {
    /// Builder string per spec §3: the reported address when present, else
    /// the literal `"builder"` when `builderFee > 0`, else absent.
    pub fn from_raw(raw: &RawFill) -> Self {
        let builder = raw.builder_address().map(str::to_string).or_else(|| {
            raw.builder_fee
                .filter(|fee| *fee > 0.0)
                .map(|_| "builder".to_string())
        });

        Self {
            time_ms: raw.time,
            coin: raw.coin.clone(),
            side: raw.side.into(),
            px: raw.px,
            sz: raw.sz,
            fee: raw.fee,
            closed_pnl: raw.closed_pnl,
            builder,
        }
    }
}

/// One reconstructed position snapshot, emitted per modifying fill within
/// the query window (spec §3, §4.7).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionState {
    #[serde(rename = "timeMs")]
    pub time_ms: i64,
    pub coin: String,
    #[serde(rename = "netSize")]
    pub net_size: f64,
    #[serde(rename = "avgEntryPx")]
    pub avg_entry_px: f64,
    pub tainted: bool,
}

/// Realized-PnL summary for a `(user, window)` query (spec §3, §4.8).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PnlResult {
    #[serde(rename = "realizedPnl")]
    pub realized_pnl: f64,
    #[serde(rename = "returnPct")]
    pub return_pct: f64,
    #[serde(rename = "feesPaid")]
    pub fees_paid: f64,
    #[serde(rename = "tradeCount")]
    pub trade_count: u64,
    pub tainted: bool,
    #[serde(rename = "effectiveCapital")]
    pub effective_capital: f64,
}

/// One ranked row in the leaderboard response (spec §3, §4.10).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub user: String,
    #[serde(rename = "metricValue")]
    pub metric_value: f64,
    #[serde(rename = "tradeCount")]
    pub trade_count: u64,
    pub tainted: bool,
}

/// Per-coin position snapshot inside a clearinghouse state response.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssetPosition {
    pub coin: String,
    #[serde(deserialize_with = "de_decimal_str")]
    pub szi: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MarginSummary {
    #[serde(rename = "accountValue", deserialize_with = "de_decimal_str")]
    pub account_value: f64,
}

/// Current clearinghouse snapshot for a user (spec §4.2).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClearinghouseState {
    #[serde(rename = "marginSummary")]
    pub margin_summary: MarginSummary,
    #[serde(default, rename = "assetPositions")]
    pub asset_positions: Vec<AssetPosition>,
}

/// Identity key used by `collapseBy` (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollapseBy {
    Hash,
    Oid,
    Tid,
}

impl CollapseBy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "hash" => Some(Self::Hash),
            "oid" => Some(Self::Oid),
            "tid" => Some(Self::Tid),
            _ => None,
        }
    }

    /// The distinct key value for a fill under this collapse mode.
    pub fn key_of(self, fill: &RawFill) -> String {
        match self {
            CollapseBy::Hash => fill.hash.clone(),
            CollapseBy::Oid => fill.oid.to_string(),
            CollapseBy::Tid => fill.tid.to_string(),
        }
    }
}

/// Leaderboard ranking metric (spec §4.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Pnl,
    ReturnPct,
    Volume,
}

impl Metric {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pnl" => Some(Self::Pnl),
            "returnPct" => Some(Self::ReturnPct),
            "volume" => Some(Self::Volume),
            _ => None,
        }
    }
}
