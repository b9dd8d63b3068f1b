//! Domain model
//!
//! Pure types and pure logic: lots, bidders, bid records, the increment
//! policy and the auction-wide lifecycle state. Nothing in here touches
//! storage or does IO.
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type LotId = String;
pub type LotIdRef<'a> = &'a str;

/// Money amount in whole US cents.
pub type Amount = u64;

pub fn format_usd(amount: Amount) -> String {
    format!("${}.{:02}", amount / 100, amount % 100)
}

fn usd(amount: &Amount) -> String {
    format_usd(*amount)
}

pub fn unix_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_millis() as u64
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bidder {
    pub name: String,
    pub email: String,
}

impl Bidder {
    pub fn same_email(&self, email: &str) -> bool {
        self.email.eq_ignore_ascii_case(email)
    }
}

/// Configuration bucket determining the allowed bid increase for a lot.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncrementTier {
    Small,
    Medium,
    Large,
    #[default]
    Standard,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown enum value: {0}")]
pub struct UnknownValue(pub String);

impl IncrementTier {
    /// `(min_increment, max_increment)` in cents.
    pub fn increments(self) -> (Amount, Amount) {
        use IncrementTier::*;
        match self {
            Small => (25, 100),
            Medium => (50, 500),
            Large => (100, 2500),
            Standard => (100, 1000),
        }
    }

    pub fn as_str(self) -> &'static str {
        use IncrementTier::*;
        match self {
            Small => "small",
            Medium => "medium",
            Large => "large",
            Standard => "standard",
        }
    }
}

impl std::str::FromStr for IncrementTier {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, UnknownValue> {
        use IncrementTier::*;
        Ok(match s {
            "small" => Small,
            "medium" => Medium,
            "large" => Large,
            "standard" => Standard,
            other => return Err(UnknownValue(other.to_owned())),
        })
    }
}

/// A single auctionable item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lot {
    pub id: LotId,
    pub name: String,
    pub description: String,
    pub image_url: String,
    /// Immutable once the lot has a leader.
    pub starting_price: Amount,
    pub current_bid: Amount,
    pub leader: Option<Bidder>,
    pub tier: IncrementTier,
    /// Table/group number for the settlement report.
    pub group_id: Option<u32>,
    pub display_order: u32,
    /// Soft-deleted lots stay referenced by bid history but are hidden
    /// from listings and settlement.
    pub retired: bool,
}

impl Lot {
    /// The increment policy: the closed range a new bid must fall into,
    /// given the lot's state right now.
    pub fn valid_range(&self) -> BidRange {
        let (min_inc, max_inc) = self.tier.increments();
        match self.leader {
            None => BidRange {
                min: self.starting_price,
                max: self.starting_price + max_inc,
            },
            Some(_) => BidRange {
                min: self.current_bid + min_inc,
                max: self.current_bid + max_inc,
            },
        }
    }

    /// Promote a bidder to leader. The caller has already checked the range.
    pub fn with_leader(self, bidder: Bidder, amount: Amount) -> Self {
        Self {
            current_bid: amount,
            leader: Some(bidder),
            ..self
        }
    }

    /// Back to the no-bids state: `current_bid` equals `starting_price`.
    pub fn cleared(self) -> Self {
        Self {
            current_bid: self.starting_price,
            leader: None,
            ..self
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BidRange {
    pub min: Amount,
    pub max: Amount,
}

impl BidRange {
    pub fn check(self, amount: Amount) -> Result<(), RejectReason> {
        if amount < self.min {
            return Err(RejectReason::TooLow {
                amount,
                min: self.min,
                max: self.max,
            });
        }
        if amount > self.max {
            return Err(RejectReason::TooHigh {
                amount,
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }
}

/// Why a submitted bid was turned away. Every variant is user-facing and
/// recoverable by resubmitting.
#[derive(Error, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectReason {
    #[error("the auction is paused, bidding will reopen shortly")]
    Paused,
    #[error("the auction has ended")]
    Ended,
    #[error("unknown lot: {lot_id}")]
    UnknownLot { lot_id: LotId },
    #[error("bidder name must not be empty")]
    MissingName,
    #[error("{email} is not eligible to bid in this auction")]
    Ineligible { email: String },
    #[error("bid {} is too low, the minimum is {}", usd(.amount), usd(.min))]
    TooLow {
        amount: Amount,
        min: Amount,
        max: Amount,
    },
    #[error("bid {} is too high, the maximum is {}", usd(.amount), usd(.max))]
    TooHigh {
        amount: Amount,
        min: Amount,
        max: Amount,
    },
}

/// Immutable fact: this bidder bid this amount on this lot at this time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidRecord {
    pub lot_id: LotId,
    pub amount: Amount,
    pub bidder: Bidder,
    pub at_unix_ms: u64,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Active,
    Paused,
    Ended,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        use Phase::*;
        match self {
            Active => "active",
            Paused => "paused",
            Ended => "ended",
        }
    }
}

impl std::str::FromStr for Phase {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, UnknownValue> {
        use Phase::*;
        Ok(match s {
            "active" => Active,
            "paused" => Paused,
            "ended" => Ended,
            other => return Err(UnknownValue(other.to_owned())),
        })
    }
}

/// Auction-wide singleton state.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionState {
    pub phase: Phase,
    /// Advisory countdown deadline (unix milliseconds). Display state only,
    /// it never transitions the phase by itself.
    pub deadline_unix_ms: Option<u64>,
}

/// Who is allowed to bid. Swappable via configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Eligibility {
    #[default]
    Open,
    /// Only addresses ending with the given suffix, e.g. `@example.org`.
    EnforceDomain(String),
}

impl Eligibility {
    pub fn check(&self, email: &str) -> Result<(), RejectReason> {
        let ineligible = || RejectReason::Ineligible {
            email: email.to_owned(),
        };

        if !email.contains('@') {
            return Err(ineligible());
        }
        match self {
            Eligibility::Open => Ok(()),
            Eligibility::EnforceDomain(suffix) => {
                if email
                    .to_ascii_lowercase()
                    .ends_with(&suffix.to_ascii_lowercase())
                {
                    Ok(())
                } else {
                    Err(ineligible())
                }
            }
        }
    }
}
