use chrono::{DateTime, Utc};
use regex::Regex;

use crate::models::{CanonicalGame, Challenge, Platform, UserProfile};

/// Genre and platform words the matcher looks for in challenge text
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Vocabulary {
    pub genres: Vec<String>,
    pub platforms: Vec<Platform>,
}

impl Vocabulary {
    /// Genres of every library game plus custom genres; platforms of every
    /// library game plus owned platforms.
    pub fn from_library(games: &[CanonicalGame], profile: &UserProfile) -> Self {
        let mut vocabulary = Vocabulary::default();

        let genres = games
            .iter()
            .flat_map(|g| g.record.genres.iter())
            .chain(profile.genres.iter());
        for genre in genres {
            let lowered = genre.to_lowercase();
            if !genre.trim().is_empty()
                && !vocabulary.genres.iter().any(|g| g.to_lowercase() == lowered)
            {
                vocabulary.genres.push(genre.clone());
            }
        }

        let platforms = games
            .iter()
            .map(CanonicalGame::platform)
            .chain(profile.preferences.platforms.iter().copied());
        for platform in platforms {
            if !vocabulary.platforms.contains(&platform) {
                vocabulary.platforms.push(platform);
            }
        }

        vocabulary
    }
}

/// Whole-word, case-insensitive containment
fn mentions(text: &str, keyword: &str) -> bool {
    Regex::new(&format!(r"(?i)\b{}\b", regex::escape(keyword)))
        .map(|re| re.is_match(text))
        .unwrap_or(false)
}

/// Keywords found in one challenge's title and description
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChallengeKeywords {
    pub genres: Vec<String>,
    pub platforms: Vec<Platform>,
}

impl ChallengeKeywords {
    pub fn extract(challenge: &Challenge, vocabulary: &Vocabulary) -> Self {
        let text = format!("{} {}", challenge.title, challenge.description);

        Self {
            genres: vocabulary
                .genres
                .iter()
                .filter(|genre| mentions(&text, genre))
                .cloned()
                .collect(),
            platforms: vocabulary
                .platforms
                .iter()
                .copied()
                .filter(|platform| mentions(&text, platform.display_name()))
                .collect(),
        }
    }

    /// Any found genre on the game is enough; a found platform must be the
    /// game's platform. No keywords of a kind means no constraint of that kind.
    pub fn accepts(&self, game: &CanonicalGame) -> bool {
        let genre_ok = self.genres.is_empty()
            || self.genres.iter().any(|wanted| {
                let wanted = wanted.to_lowercase();
                game.record
                    .genres
                    .iter()
                    .any(|genre| genre.to_lowercase() == wanted)
            });
        let platform_ok = self.platforms.is_empty() || self.platforms.contains(&game.platform());

        genre_ok && platform_ok
    }
}

/// Applies one completion event to the active challenges.
///
/// Returns only the challenges that changed, each with exactly one unit of
/// progress added.
pub fn record_completion(
    challenges: &[Challenge],
    completed: &CanonicalGame,
    vocabulary: &Vocabulary,
    now: DateTime<Utc>,
) -> Vec<Challenge> {
    challenges
        .iter()
        .filter(|c| c.is_active())
        .filter(|c| ChallengeKeywords::extract(c, vocabulary).accepts(completed))
        .filter_map(|c| {
            let mut updated = c.clone();
            updated.record_progress(now).then(|| {
                tracing::info!(
                    challenge = %updated.id,
                    game = %completed.id,
                    progress = updated.progress,
                    goal = updated.goal,
                    "Challenge progressed"
                );
                updated
            })
        })
        .collect()
}
