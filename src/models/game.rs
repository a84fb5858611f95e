use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt::Display, num::NonZeroU32};

use super::GameId;

/// Whole-hour playtime estimate. Zero is not representable: "no estimate"
/// is `None`, never `0`.
pub type Hours = NonZeroU32;

/// Platform a game is owned/played on
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Platform {
    #[serde(rename = "PC")]
    Pc,
    PlayStation,
    Xbox,
    #[serde(rename = "Nintendo Switch")]
    NintendoSwitch,
    #[serde(rename = "Others/ROMs")]
    OthersRoms,
}

impl Platform {
    pub const ALL: [Platform; 5] = [
        Platform::Pc,
        Platform::PlayStation,
        Platform::Xbox,
        Platform::NintendoSwitch,
        Platform::OthersRoms,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            Platform::Pc => "PC",
            Platform::PlayStation => "PlayStation",
            Platform::Xbox => "Xbox",
            Platform::NintendoSwitch => "Nintendo Switch",
            Platform::OthersRoms => "Others/ROMs",
        }
    }

    /// Maps a catalog platform name onto a user-selectable platform.
    ///
    /// Only current-generation hardware maps onto a console family; everything
    /// else lands in `OthersRoms`.
    pub fn from_catalog_name(name: &str) -> Platform {
        if name == "PC" {
            Platform::Pc
        } else if name.starts_with("PlayStation 5") {
            Platform::PlayStation
        } else if name.starts_with("Xbox Series S/X") {
            Platform::Xbox
        } else if name == "Nintendo Switch" || name == "Nintendo Switch 2" {
            Platform::NintendoSwitch
        } else {
            Platform::OthersRoms
        }
    }
}

impl Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Status list a game lives in
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum GameList {
    Wishlist,
    Backlog,
    #[serde(rename = "Now Playing")]
    NowPlaying,
    #[serde(rename = "Recently Played")]
    RecentlyPlayed,
}

impl Display for GameList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            GameList::Wishlist => "Wishlist",
            GameList::Backlog => "Backlog",
            GameList::NowPlaying => "Now Playing",
            GameList::RecentlyPlayed => "Recently Played",
        };
        write!(f, "{}", name)
    }
}

/// Community compatibility rating for the handheld PC, best to worst
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CompatibilityTier {
    Native,
    Platinum,
    Gold,
    Silver,
    Bronze,
    Borked,
    Unknown,
}

impl CompatibilityTier {
    /// Parses a tier label; anything outside the known set is `Unknown`.
    pub fn parse(label: &str) -> CompatibilityTier {
        match label {
            "native" => CompatibilityTier::Native,
            "platinum" => CompatibilityTier::Platinum,
            "gold" => CompatibilityTier::Gold,
            "silver" => CompatibilityTier::Silver,
            "bronze" => CompatibilityTier::Bronze,
            "borked" => CompatibilityTier::Borked,
            _ => CompatibilityTier::Unknown,
        }
    }
}

/// Storefront enrichment. Only ever attached to PC games.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StorefrontLink {
    pub product_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compatibility_tier: Option<CompatibilityTier>,
}

/// A fully merged game record that has not been persisted yet
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewGame {
    pub title: String,
    platform: Platform,
    pub genres: Vec<String>,
    pub list: GameList,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playtime_normally: Option<Hours>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playtime_completely: Option<Hours>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    storefront: Option<StorefrontLink>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<Rating>,
    #[serde(default)]
    pub replay_count: u32,
}

impl NewGame {
    pub fn new(title: impl Into<String>, platform: Platform, list: GameList) -> Self {
        Self {
            title: title.into(),
            platform,
            genres: Vec::new(),
            list,
            image_url: None,
            release_date: None,
            playtime_normally: None,
            playtime_completely: None,
            storefront: None,
            rating: None,
            replay_count: 0,
        }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn storefront(&self) -> Option<StorefrontLink> {
        self.storefront
    }

    /// Changes the platform, dropping storefront data when leaving PC.
    pub fn set_platform(&mut self, platform: Platform) {
        self.platform = platform;
        if platform != Platform::Pc {
            self.storefront = None;
        }
    }

    /// Attaches storefront data; ignored for non-PC games.
    pub fn set_storefront(&mut self, storefront: Option<StorefrontLink>) {
        self.storefront = if self.platform == Platform::Pc {
            storefront
        } else {
            None
        };
    }
}

/// Persisted game record, scoped to one user's collection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalGame {
    pub id: GameId,
    #[serde(flatten)]
    pub record: NewGame,
    pub date_added: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_completed: Option<DateTime<Utc>>,
}

impl CanonicalGame {
    pub fn from_new(id: GameId, record: NewGame, date_added: DateTime<Utc>) -> Self {
        Self {
            id,
            record,
            date_added,
            date_completed: None,
        }
    }

    pub fn platform(&self) -> Platform {
        self.record.platform()
    }

    pub fn product_id(&self) -> Option<u64> {
        self.record.storefront().map(|s| s.product_id)
    }

    /// Moves the game to another list, applying the completion and replay rules.
    ///
    /// Returns true when this move is a completion event.
    pub fn move_to(&mut self, list: GameList, now: DateTime<Utc>) -> bool {
        let previous = self.record.list;
        if previous == list {
            return false;
        }
        self.record.list = list;

        if list == GameList::RecentlyPlayed {
            self.date_completed = Some(now);
            return true;
        }
        if previous == GameList::RecentlyPlayed {
            self.record.replay_count += 1;
        }
        false
    }
}

/// User rating from 1 to 5. Unrated games carry no `Rating` at all.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(try_from = "u8", into = "u8")]
pub struct Rating(u8);

impl Rating {
    pub fn new(value: u8) -> Option<Rating> {
        (1..=5).contains(&value).then_some(Rating(value))
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Rating {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Rating::new(value).ok_or_else(|| format!("rating must be between 1 and 5, got {}", value))
    }
}

impl From<Rating> for u8 {
    fn from(rating: Rating) -> u8 {
        rating.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pc_game_with_storefront() -> NewGame {
        let mut game = NewGame::new("Hades", Platform::Pc, GameList::Backlog);
        game.set_storefront(Some(StorefrontLink {
            product_id: 1145360,
            compatibility_tier: Some(CompatibilityTier::Platinum),
        }));
        game
    }

    #[test]
    fn test_platform_catalog_mapping() {
        assert_eq!(Platform::from_catalog_name("PC"), Platform::Pc);
        assert_eq!(Platform::from_catalog_name("PlayStation 5"), Platform::PlayStation);
        assert_eq!(Platform::from_catalog_name("PlayStation 4"), Platform::OthersRoms);
        assert_eq!(Platform::from_catalog_name("Xbox Series S/X"), Platform::Xbox);
        assert_eq!(Platform::from_catalog_name("Nintendo Switch 2"), Platform::NintendoSwitch);
        assert_eq!(Platform::from_catalog_name("Game Boy"), Platform::OthersRoms);
    }

    #[test]
    fn test_platform_serialization_uses_display_names() {
        assert_eq!(serde_json::to_string(&Platform::Pc).unwrap(), "\"PC\"");
        assert_eq!(
            serde_json::to_string(&Platform::NintendoSwitch).unwrap(),
            "\"Nintendo Switch\""
        );
        let parsed: Platform = serde_json::from_str("\"Others/ROMs\"").unwrap();
        assert_eq!(parsed, Platform::OthersRoms);
    }

    #[test]
    fn test_compatibility_tier_parse() {
        assert_eq!(CompatibilityTier::parse("gold"), CompatibilityTier::Gold);
        assert_eq!(CompatibilityTier::parse("pending"), CompatibilityTier::Unknown);
        assert!(CompatibilityTier::Native < CompatibilityTier::Borked);
    }

    #[test]
    fn test_leaving_pc_clears_storefront_fields() {
        let mut game = pc_game_with_storefront();
        assert!(game.storefront().is_some());

        game.set_platform(Platform::PlayStation);

        assert_eq!(game.platform(), Platform::PlayStation);
        assert!(game.storefront().is_none());
    }

    #[test]
    fn test_storefront_ignored_for_non_pc() {
        let mut game = NewGame::new("Halo", Platform::Xbox, GameList::Backlog);
        game.set_storefront(Some(StorefrontLink {
            product_id: 976730,
            compatibility_tier: None,
        }));
        assert!(game.storefront().is_none());
    }

    #[test]
    fn test_absent_playtime_is_not_serialized() {
        let game = NewGame::new("Celeste", Platform::Pc, GameList::Wishlist);
        let json = serde_json::to_value(&game).unwrap();
        assert!(json.get("playtimeNormally").is_none());
        assert!(json.get("rating").is_none());
        assert!(json.get("storefront").is_none());
    }

    #[test]
    fn test_zero_playtime_is_rejected_on_read() {
        let json = r#"{"title":"Celeste","platform":"PC","genres":[],"list":"Backlog","playtimeNormally":0}"#;
        assert!(serde_json::from_str::<NewGame>(json).is_err());
    }

    #[test]
    fn test_rating_bounds() {
        assert!(Rating::new(0).is_none());
        assert_eq!(Rating::new(5).map(|r| r.value()), Some(5));
        assert!(Rating::new(6).is_none());
        assert!(serde_json::from_str::<Rating>("7").is_err());
    }

    #[test]
    fn test_move_into_recently_played_stamps_completion() {
        let now = Utc::now();
        let mut game = CanonicalGame::from_new(
            GameId::from("g1"),
            NewGame::new("Hades", Platform::Pc, GameList::NowPlaying),
            now,
        );

        assert!(game.move_to(GameList::RecentlyPlayed, now));
        assert_eq!(game.date_completed, Some(now));
        assert_eq!(game.record.replay_count, 0);
    }

    #[test]
    fn test_move_out_of_recently_played_counts_replay_and_keeps_history() {
        let completed_at = Utc::now();
        let mut game = CanonicalGame::from_new(
            GameId::from("g1"),
            NewGame::new("Hades", Platform::Pc, GameList::NowPlaying),
            completed_at,
        );
        game.move_to(GameList::RecentlyPlayed, completed_at);

        let later = completed_at + chrono::Duration::days(3);
        assert!(!game.move_to(GameList::Backlog, later));

        assert_eq!(game.record.replay_count, 1);
        assert_eq!(game.date_completed, Some(completed_at));
    }

    #[test]
    fn test_move_to_same_list_is_noop() {
        let now = Utc::now();
        let mut game = CanonicalGame::from_new(
            GameId::from("g1"),
            NewGame::new("Hades", Platform::Pc, GameList::RecentlyPlayed),
            now,
        );
        assert!(!game.move_to(GameList::RecentlyPlayed, now));
        assert!(game.date_completed.is_none());
    }
}
