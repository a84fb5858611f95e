use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;

use super::{CompatibilityTier, Hours, Platform};

/// Matched entry from the game metadata catalog
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogEntry {
    pub id: u64,
    pub name: String,
    pub image_url: Option<String>,
    pub genres: Vec<String>,
    pub release_date: Option<String>,
    /// Coarse playtime estimate; superseded by the time-to-beat service
    pub base_playtime: Option<Hours>,
    pub platforms: Vec<Platform>,
}

/// Time-to-beat estimate for one title
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlaytimeEstimate {
    pub playtime_normally: Option<Hours>,
    pub playtime_completely: Option<Hours>,
}

impl PlaytimeEstimate {
    /// Builds an estimate from raw second counts.
    pub fn from_seconds(normally: Option<u64>, completely: Option<u64>) -> Self {
        Self {
            playtime_normally: normally.and_then(seconds_to_hours),
            playtime_completely: completely.and_then(seconds_to_hours),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.playtime_normally.is_none() && self.playtime_completely.is_none()
    }
}

/// Rounds seconds to the nearest whole hour. Anything that rounds to zero has
/// no estimate.
pub fn seconds_to_hours(seconds: u64) -> Option<Hours> {
    let hours = seconds.saturating_add(1800) / 3600;
    u32::try_from(hours).ok().and_then(NonZeroU32::new)
}

/// Storefront search hit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StorefrontProduct {
    pub product_id: u64,
    pub name: String,
}

/// Storefront data resolved for one title
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StorefrontDetails {
    pub product_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compatibility_tier: Option<CompatibilityTier>,
}

/// An active storefront discount. Only positive discounts exist.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Discount {
    pub discount_percent: u32,
    pub price_label: String,
}

/// A product owned by a storefront account
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OwnedProduct {
    pub product_id: u64,
    pub name: String,
}
