//! Shared primitive types used across the engine.

use serde::{Deserialize, Serialize};
use std::fmt;

pub type ContractId = i64;
pub type ProductId  = i64;
pub type CustomerId = i64;
pub type RateId     = i64;
pub type RequestId  = i64;

/// Contract status. Moves forward only:
///   UNDER_REVIEW -> CANCELLED
///   APPROVED     -> LAPSED | MATURED
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContractStatus {
    UnderReview,
    Approved,
    Cancelled,
    Lapsed,
    Matured,
}

impl ContractStatus {
    /// Statuses whose premiums are still maintained by the premium batch.
    pub const OPEN: [ContractStatus; 2] = [ContractStatus::UnderReview, ContractStatus::Approved];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnderReview => "UNDER_REVIEW",
            Self::Approved    => "APPROVED",
            Self::Cancelled   => "CANCELLED",
            Self::Lapsed      => "LAPSED",
            Self::Matured     => "MATURED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "UNDER_REVIEW" => Some(Self::UnderReview),
            "APPROVED"     => Some(Self::Approved),
            "CANCELLED"    => Some(Self::Cancelled),
            "LAPSED"       => Some(Self::Lapsed),
            "MATURED"      => Some(Self::Matured),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Lapsed | Self::Matured)
    }
}

impl fmt::Display for ContractStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rate-table gender. `All` only ever appears on rate rows; quotes are M or F.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Gender {
    #[serde(rename = "M")]
    Male,
    #[serde(rename = "F")]
    Female,
    #[serde(rename = "ALL")]
    All,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Male   => "M",
            Self::Female => "F",
            Self::All    => "ALL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "M"   => Some(Self::Male),
            "F"   => Some(Self::Female),
            "ALL" => Some(Self::All),
            _ => None,
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relationship of an insured person to the contract holder.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Relationship {
    Principal,
    Spouse,
    Child,
}

impl Relationship {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Principal => "PRINCIPAL",
            Self::Spouse    => "SPOUSE",
            Self::Child     => "CHILD",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PRINCIPAL" => Some(Self::Principal),
            "SPOUSE"    => Some(Self::Spouse),
            "CHILD"     => Some(Self::Child),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    New,
    Processing,
    Completed,
    Cancelled,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New        => "NEW",
            Self::Processing => "PROCESSING",
            Self::Completed  => "COMPLETED",
            Self::Cancelled  => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "NEW"        => Some(Self::New),
            "PROCESSING" => Some(Self::Processing),
            "COMPLETED"  => Some(Self::Completed),
            "CANCELLED"  => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

/// The exact lookup tuple for a premium rate row.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct RateKey {
    pub product_id:       ProductId,
    pub gender:           Gender,
    pub entry_age:        i32,
    pub insurance_period: i32,
}

impl fmt::Display for RateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "product={} gender={} age={} period={}",
            self.product_id, self.gender, self.entry_age, self.insurance_period
        )
    }
}
