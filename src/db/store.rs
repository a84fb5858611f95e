use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;

use crate::{
    error::{AppError, AppResult},
    models::{
        CanonicalGame, Challenge, ChallengeId, ChallengeIdea, GameId, ImportNotification, NewGame,
        UserId, UserPreferences, UserProfile,
    },
};

const SNAPSHOT_CHANNEL_CAPACITY: usize = 16;

/// Full view of one user's games and challenges
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct LibrarySnapshot {
    pub games: Vec<CanonicalGame>,
    pub challenges: Vec<Challenge>,
}

impl LibrarySnapshot {
    pub fn game(&self, id: &GameId) -> Option<&CanonicalGame> {
        self.games.iter().find(|g| &g.id == id)
    }

    pub fn active_challenges(&self) -> impl Iterator<Item = &Challenge> {
        self.challenges.iter().filter(|c| c.is_active())
    }
}

/// One document write inside a [`WriteBatch`]
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    CreateGame {
        record: NewGame,
        date_added: DateTime<Utc>,
    },
    /// Whole-document replacement of an existing game
    UpdateGame(CanonicalGame),
    DeleteGame(GameId),
    CreateChallenge {
        idea: ChallengeIdea,
        created_at: DateTime<Utc>,
    },
    /// Whole-document replacement of an existing challenge
    UpdateChallenge(Challenge),
    AddGenres(Vec<String>),
    SetPreferences(UserPreferences),
    SetImportStatus(ImportNotification),
    /// Sets `status` unless an import is still in progress. The check and the
    /// write happen under the same per-user commit.
    BeginImport {
        status: ImportNotification,
        stale_before: DateTime<Utc>,
    },
}

/// Writes to one user's documents that commit together or not at all
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: WriteOp) -> &mut Self {
        self.ops.push(op);
        self
    }

    pub fn create_game(&mut self, record: NewGame, date_added: DateTime<Utc>) -> &mut Self {
        self.push(WriteOp::CreateGame { record, date_added })
    }

    pub fn update_game(&mut self, game: CanonicalGame) -> &mut Self {
        self.push(WriteOp::UpdateGame(game))
    }

    pub fn delete_game(&mut self, id: GameId) -> &mut Self {
        self.push(WriteOp::DeleteGame(id))
    }

    pub fn update_challenge(&mut self, challenge: Challenge) -> &mut Self {
        self.push(WriteOp::UpdateChallenge(challenge))
    }

    pub fn add_genres(&mut self, genres: Vec<String>) -> &mut Self {
        if genres.is_empty() {
            return self;
        }
        self.push(WriteOp::AddGenres(genres))
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }
}

/// Ids assigned by the store to documents created in a batch, in op order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommitReceipt {
    pub games: Vec<GameId>,
    pub challenges: Vec<ChallengeId>,
}

/// Per-user document store with atomic multi-document batches and a
/// full-snapshot change stream.
#[async_trait::async_trait]
pub trait GameStore: Send + Sync {
    async fn snapshot(&self, user: &UserId) -> AppResult<LibrarySnapshot>;

    async fn profile(&self, user: &UserId) -> AppResult<UserProfile>;

    async fn import_status(&self, user: &UserId) -> AppResult<Option<ImportNotification>>;

    /// Applies every op in `batch` or none of them.
    ///
    /// Fails with [`AppError::TransactionalWrite`] when any op cannot apply.
    async fn commit(&self, user: &UserId, batch: WriteBatch) -> AppResult<CommitReceipt>;

    /// Each committed change to games or challenges is delivered as a full snapshot.
    fn subscribe(&self, user: &UserId) -> broadcast::Receiver<LibrarySnapshot>;

    async fn game(&self, user: &UserId, id: &GameId) -> AppResult<CanonicalGame> {
        self.snapshot(user)
            .await?
            .game(id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("game {}", id)))
    }
}

/// Document-level effect of a committed batch
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentChange {
    PutGame(CanonicalGame),
    DeleteGame(GameId),
    PutChallenge(Challenge),
    PutProfile(UserProfile),
    PutImportStatus(ImportNotification),
}

impl DocumentChange {
    pub fn touches_library(&self) -> bool {
        matches!(
            self,
            DocumentChange::PutGame(_) | DocumentChange::DeleteGame(_) | DocumentChange::PutChallenge(_)
        )
    }
}

/// Every document owned by one user
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserDocuments {
    pub games: Vec<CanonicalGame>,
    pub challenges: Vec<Challenge>,
    pub profile: UserProfile,
    pub import_status: Option<ImportNotification>,
}

impl UserDocuments {
    pub fn snapshot(&self) -> LibrarySnapshot {
        LibrarySnapshot {
            games: self.games.clone(),
            challenges: self.challenges.clone(),
        }
    }

    /// Applies `batch` to these documents.
    ///
    /// On error the documents may be partially modified; callers apply to a
    /// copy and discard it on failure.
    pub fn apply(
        &mut self,
        batch: WriteBatch,
    ) -> AppResult<(CommitReceipt, Vec<DocumentChange>)> {
        let mut receipt = CommitReceipt::default();
        let mut changes = Vec::with_capacity(batch.len());

        for op in batch.ops {
            match op {
                WriteOp::CreateGame { record, date_added } => {
                    let game = CanonicalGame::from_new(GameId::generate(), record, date_added);
                    receipt.games.push(game.id.clone());
                    changes.push(DocumentChange::PutGame(game.clone()));
                    self.games.push(game);
                }
                WriteOp::UpdateGame(game) => {
                    let slot = self
                        .games
                        .iter_mut()
                        .find(|g| g.id == game.id)
                        .ok_or_else(|| missing("game", &game.id))?;
                    *slot = game.clone();
                    changes.push(DocumentChange::PutGame(game));
                }
                WriteOp::DeleteGame(id) => {
                    let index = self
                        .games
                        .iter()
                        .position(|g| g.id == id)
                        .ok_or_else(|| missing("game", &id))?;
                    self.games.remove(index);
                    changes.push(DocumentChange::DeleteGame(id));
                }
                WriteOp::CreateChallenge { idea, created_at } => {
                    let challenge = Challenge::new(ChallengeId::generate(), idea, created_at);
                    receipt.challenges.push(challenge.id.clone());
                    changes.push(DocumentChange::PutChallenge(challenge.clone()));
                    self.challenges.push(challenge);
                }
                WriteOp::UpdateChallenge(challenge) => {
                    let slot = self
                        .challenges
                        .iter_mut()
                        .find(|c| c.id == challenge.id)
                        .ok_or_else(|| missing("challenge", &challenge.id))?;
                    *slot = challenge.clone();
                    changes.push(DocumentChange::PutChallenge(challenge));
                }
                WriteOp::AddGenres(genres) => {
                    if self.profile.add_genres(genres) > 0 {
                        changes.push(DocumentChange::PutProfile(self.profile.clone()));
                    }
                }
                WriteOp::SetPreferences(preferences) => {
                    self.profile.preferences = preferences;
                    changes.push(DocumentChange::PutProfile(self.profile.clone()));
                }
                WriteOp::SetImportStatus(status) => {
                    self.import_status = Some(status.clone());
                    changes.push(DocumentChange::PutImportStatus(status));
                }
                WriteOp::BeginImport {
                    status,
                    stale_before,
                } => {
                    if self
                        .import_status
                        .as_ref()
                        .is_some_and(|current| current.is_in_progress(stale_before))
                    {
                        return Err(AppError::InvalidInput(
                            "an import is already in progress".to_string(),
                        ));
                    }
                    self.import_status = Some(status.clone());
                    changes.push(DocumentChange::PutImportStatus(status));
                }
            }
        }

        Ok((receipt, changes))
    }
}

fn missing(kind: &str, id: &impl std::fmt::Display) -> AppError {
    AppError::TransactionalWrite(format!("{} {} does not exist", kind, id))
}

/// Fan-out of library snapshots to per-user subscribers
#[derive(Default)]
pub struct SnapshotHub {
    channels: Mutex<HashMap<UserId, broadcast::Sender<LibrarySnapshot>>>,
}

impl SnapshotHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, user: &UserId) -> broadcast::Receiver<LibrarySnapshot> {
        let mut channels = match self.channels.lock() {
            Ok(channels) => channels,
            Err(poisoned) => poisoned.into_inner(),
        };
        channels
            .entry(user.clone())
            .or_insert_with(|| broadcast::channel(SNAPSHOT_CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Delivers `snapshot` to current subscribers; a no-op when there are none.
    pub fn publish(&self, user: &UserId, snapshot: LibrarySnapshot) {
        let mut channels = match self.channels.lock() {
            Ok(channels) => channels,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(sender) = channels.get(user) {
            if sender.send(snapshot).is_err() {
                channels.remove(user);
            }
        }
    }
}
