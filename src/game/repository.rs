use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, instrument};

use super::models::{
    GameMode, GameModel, GuessModel, NewGame, NewGuess, NewRound, PlayerTotal, RoundModel,
    RoundWithGuesses,
};
use crate::shared::{AppError, Pagination};

/// Isolation level a unit of work runs under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub fn as_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

/// Persistent store for games, rounds and guesses
///
/// Every decision that depends on the current round number or on whether
/// the game is over must be made inside a transaction that holds the game
/// row lock (`GameTransaction::lock_game`).
#[async_trait]
pub trait GameStore: Send + Sync {
    /// Opens a unit of work. Dropping it without `commit` rolls it back.
    async fn begin(
        &self,
        isolation: IsolationLevel,
    ) -> Result<Box<dyn GameTransaction>, AppError>;

    async fn get_game(&self, game_id: i64) -> Result<Option<GameModel>, AppError>;

    async fn get_round(&self, game_id: i64, round_num: i32)
        -> Result<Option<RoundModel>, AppError>;

    /// Games the user created or plays in, newest first
    async fn list_games_for_user(
        &self,
        user_id: &str,
        mode: GameMode,
        page: &Pagination,
    ) -> Result<Vec<GameModel>, AppError>;

    async fn is_member(&self, game_id: i64, user_id: &str) -> Result<bool, AppError>;

    /// Finished rounds in order, each with its guesses
    async fn finished_rounds(&self, game_id: i64) -> Result<Vec<RoundWithGuesses>, AppError>;
}

/// Operations available inside a unit of work
#[async_trait]
pub trait GameTransaction: Send {
    async fn insert_game(&mut self, game: &NewGame) -> Result<GameModel, AppError>;

    /// Takes the exclusive row lock on a game for the rest of the transaction
    async fn lock_game(&mut self, game_id: i64) -> Result<Option<GameModel>, AppError>;

    async fn update_game(&mut self, game: &GameModel) -> Result<(), AppError>;

    /// Roster from membership rows plus anyone who has guessed
    async fn game_players(&mut self, game_id: i64) -> Result<Vec<String>, AppError>;

    async fn is_member(&mut self, game_id: i64, user_id: &str) -> Result<bool, AppError>;

    async fn get_round(
        &mut self,
        game_id: i64,
        round_num: i32,
    ) -> Result<Option<RoundModel>, AppError>;

    /// Inserts a round, doing nothing if `(game_id, round_num)` already
    /// exists, and returns whichever row is stored
    async fn insert_round(&mut self, round: &NewRound) -> Result<RoundModel, AppError>;

    async fn finish_round(
        &mut self,
        round_id: i64,
        ended_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), AppError>;

    async fn increment_guess_count(&mut self, round_id: i64) -> Result<i32, AppError>;

    async fn find_guess(
        &mut self,
        round_id: i64,
        user_id: &str,
    ) -> Result<Option<GuessModel>, AppError>;

    /// Inserts a guess, doing nothing if the user already guessed this round,
    /// and returns whichever row is stored
    async fn insert_guess(&mut self, guess: &NewGuess) -> Result<GuessModel, AppError>;

    async fn guesses_for_round(&mut self, round_id: i64) -> Result<Vec<GuessModel>, AppError>;

    async fn guesses_for_game(&mut self, game_id: i64) -> Result<Vec<GuessModel>, AppError>;

    async fn player_totals(&mut self, game_id: i64) -> Result<Vec<PlayerTotal>, AppError>;

    async fn commit(self: Box<Self>) -> Result<(), AppError>;
}

/// Rows of the in-memory store, also used for a transaction's pending writes
#[derive(Debug, Clone, Default)]
struct Tables {
    games: BTreeMap<i64, GameModel>,
    players: HashMap<i64, BTreeSet<String>>,
    rounds: BTreeMap<i64, RoundModel>,
    guesses: BTreeMap<i64, GuessModel>,
}

impl Tables {
    /// Copy of every row that belongs to one game
    fn game_slice(&self, game_id: i64) -> Tables {
        let rounds: BTreeMap<i64, RoundModel> = self
            .rounds
            .iter()
            .filter(|(_, r)| r.game_id == game_id)
            .map(|(id, r)| (*id, r.clone()))
            .collect();
        let guesses = self
            .guesses
            .iter()
            .filter(|(_, g)| rounds.contains_key(&g.round_id))
            .map(|(id, g)| (*id, g.clone()))
            .collect();

        Tables {
            games: self
                .games
                .get(&game_id)
                .map(|g| (game_id, g.clone()))
                .into_iter()
                .collect(),
            players: self
                .players
                .get(&game_id)
                .map(|p| (game_id, p.clone()))
                .into_iter()
                .collect(),
            rounds,
            guesses,
        }
    }

    /// Lays newer rows over these, row by row
    fn overlay(&mut self, writes: Tables) {
        self.games.extend(writes.games);
        for (game_id, players) in writes.players {
            self.players.entry(game_id).or_default().extend(players);
        }
        self.rounds.extend(writes.rounds);
        self.guesses.extend(writes.guesses);
    }

    fn round(&self, game_id: i64, round_num: i32) -> Option<&RoundModel> {
        self.rounds
            .values()
            .find(|r| r.game_id == game_id && r.round_num == round_num)
    }

    fn round_ids_of(&self, game_id: i64) -> BTreeSet<i64> {
        self.rounds
            .values()
            .filter(|r| r.game_id == game_id)
            .map(|r| r.id)
            .collect()
    }

    fn guesses_of_round(&self, round_id: i64) -> Vec<GuessModel> {
        self.guesses
            .values()
            .filter(|g| g.round_id == round_id)
            .cloned()
            .collect()
    }

    fn guesses_of_game(&self, game_id: i64) -> Vec<GuessModel> {
        let round_ids = self.round_ids_of(game_id);
        let mut guesses: Vec<GuessModel> = self
            .guesses
            .values()
            .filter(|g| round_ids.contains(&g.round_id))
            .cloned()
            .collect();
        guesses.sort_by_key(|g| (g.round_num, g.id));
        guesses
    }

    fn players_of(&self, game_id: i64) -> BTreeSet<String> {
        let mut players = self.players.get(&game_id).cloned().unwrap_or_default();
        players.extend(self.guesses_of_game(game_id).into_iter().map(|g| g.user_id));
        players
    }
}

#[derive(Debug, Default)]
struct StoreData {
    last_game_id: i64,
    last_round_id: i64,
    last_guess_id: i64,
    tables: Tables,
}

/// Id sequences of the in-memory store
#[derive(Debug, Clone, Copy)]
enum Sequence {
    Game,
    Round,
    Guess,
}

/// In-memory implementation of GameStore for development and testing
///
/// Each game has its own async lock standing in for the row lock, taken by
/// `lock_game` and held until the transaction ends. A transaction buffers its
/// writes and applies them to the tables on commit, so an uncommitted one
/// leaves no trace. The table mutex itself is only held for single reads and
/// for applying a commit.
#[derive(Clone, Default)]
pub struct InMemoryGameStore {
    data: Arc<Mutex<StoreData>>,
    game_locks: Arc<StdMutex<HashMap<i64, Arc<Mutex<()>>>>>,
}

impl InMemoryGameStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn game_lock(&self, game_id: i64) -> Arc<Mutex<()>> {
        self.game_locks
            .lock()
            .unwrap()
            .entry(game_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Number of round rows stored for a game
    pub async fn round_count(&self, game_id: i64) -> usize {
        self.data.lock().await.tables.round_ids_of(game_id).len()
    }

    /// Round numbers stored for a game, in ascending order
    pub async fn round_numbers(&self, game_id: i64) -> Vec<i32> {
        let data = self.data.lock().await;
        let mut numbers: Vec<i32> = data
            .tables
            .rounds
            .values()
            .filter(|r| r.game_id == game_id)
            .map(|r| r.round_num)
            .collect();
        numbers.sort_unstable();
        numbers
    }
}

pub struct InMemoryGameTransaction {
    store: InMemoryGameStore,
    held_locks: HashMap<i64, OwnedMutexGuard<()>>,
    writes: Tables,
}

impl InMemoryGameTransaction {
    /// Committed rows of one game with this transaction's writes on top
    async fn game_view(&self, game_id: i64) -> Tables {
        let mut view = self.store.data.lock().await.tables.game_slice(game_id);
        view.overlay(self.writes.game_slice(game_id));
        view
    }

    async fn round_by_id(&self, round_id: i64) -> Result<RoundModel, AppError> {
        if let Some(round) = self.writes.rounds.get(&round_id) {
            return Ok(round.clone());
        }
        self.store
            .data
            .lock()
            .await
            .tables
            .rounds
            .get(&round_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Round {} not found", round_id)))
    }

    // Ids are handed out immediately, a rolled back insert leaves a gap like a database sequence
    async fn next_id(&self, sequence: Sequence) -> i64 {
        let mut data = self.store.data.lock().await;
        let counter = match sequence {
            Sequence::Game => &mut data.last_game_id,
            Sequence::Round => &mut data.last_round_id,
            Sequence::Guess => &mut data.last_guess_id,
        };
        *counter += 1;
        *counter
    }
}

#[async_trait]
impl GameStore for InMemoryGameStore {
    async fn begin(
        &self,
        isolation: IsolationLevel,
    ) -> Result<Box<dyn GameTransaction>, AppError> {
        debug!(isolation = isolation.as_sql(), "Began in-memory transaction");
        Ok(Box::new(InMemoryGameTransaction {
            store: self.clone(),
            held_locks: HashMap::new(),
            writes: Tables::default(),
        }))
    }

    #[instrument(skip(self))]
    async fn get_game(&self, game_id: i64) -> Result<Option<GameModel>, AppError> {
        Ok(self.data.lock().await.tables.games.get(&game_id).cloned())
    }

    #[instrument(skip(self))]
    async fn get_round(
        &self,
        game_id: i64,
        round_num: i32,
    ) -> Result<Option<RoundModel>, AppError> {
        Ok(self.data.lock().await.tables.round(game_id, round_num).cloned())
    }

    #[instrument(skip(self))]
    async fn list_games_for_user(
        &self,
        user_id: &str,
        mode: GameMode,
        page: &Pagination,
    ) -> Result<Vec<GameModel>, AppError> {
        let data = self.data.lock().await;
        let tables = &data.tables;
        let mut games: Vec<GameModel> = tables
            .games
            .values()
            .filter(|g| g.mode == mode)
            .filter(|g| {
                g.creator_id == user_id
                    || tables
                        .players
                        .get(&g.id)
                        .is_some_and(|players| players.contains(user_id))
            })
            .cloned()
            .collect();
        games.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        Ok(games
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .collect())
    }

    #[instrument(skip(self))]
    async fn is_member(&self, game_id: i64, user_id: &str) -> Result<bool, AppError> {
        Ok(self
            .data
            .lock()
            .await
            .tables
            .players_of(game_id)
            .contains(user_id))
    }

    #[instrument(skip(self))]
    async fn finished_rounds(&self, game_id: i64) -> Result<Vec<RoundWithGuesses>, AppError> {
        let data = self.data.lock().await;
        let mut rounds: Vec<RoundModel> = data
            .tables
            .rounds
            .values()
            .filter(|r| r.game_id == game_id && r.finished)
            .cloned()
            .collect();
        rounds.sort_by_key(|r| r.round_num);

        Ok(rounds
            .into_iter()
            .map(|round| {
                let guesses = data.tables.guesses_of_round(round.id);
                RoundWithGuesses { round, guesses }
            })
            .collect())
    }
}

#[async_trait]
impl GameTransaction for InMemoryGameTransaction {
    async fn insert_game(&mut self, game: &NewGame) -> Result<GameModel, AppError> {
        let id = self.next_id(Sequence::Game).await;
        let model = game.clone().into_model(id);

        self.writes.games.insert(model.id, model.clone());
        self.writes
            .players
            .insert(model.id, game.players.iter().cloned().collect());

        debug!(game_id = model.id, mode = %model.mode, "Inserted game in memory");
        Ok(model)
    }

    async fn lock_game(&mut self, game_id: i64) -> Result<Option<GameModel>, AppError> {
        if !self.held_locks.contains_key(&game_id) {
            let guard = self.store.game_lock(game_id).lock_owned().await;
            self.held_locks.insert(game_id, guard);
            debug!(game_id, "Game locked");
        }
        Ok(self.game_view(game_id).await.games.remove(&game_id))
    }

    async fn update_game(&mut self, game: &GameModel) -> Result<(), AppError> {
        let mut stored = self
            .game_view(game.id)
            .await
            .games
            .remove(&game.id)
            .ok_or_else(|| AppError::NotFound(format!("Game {} not found", game.id)))?;

        stored.round_current = game.round_current;
        stored.score = game.score;
        stored.finished = game.finished;
        stored.ended_at = game.ended_at;
        self.writes.games.insert(stored.id, stored);
        Ok(())
    }

    async fn game_players(&mut self, game_id: i64) -> Result<Vec<String>, AppError> {
        Ok(self.game_view(game_id).await.players_of(game_id).into_iter().collect())
    }

    async fn is_member(&mut self, game_id: i64, user_id: &str) -> Result<bool, AppError> {
        Ok(self.game_view(game_id).await.players_of(game_id).contains(user_id))
    }

    async fn get_round(
        &mut self,
        game_id: i64,
        round_num: i32,
    ) -> Result<Option<RoundModel>, AppError> {
        Ok(self.game_view(game_id).await.round(game_id, round_num).cloned())
    }

    async fn insert_round(&mut self, round: &NewRound) -> Result<RoundModel, AppError> {
        let view = self.game_view(round.game_id).await;
        if let Some(existing) = view.round(round.game_id, round.round_num) {
            debug!(
                game_id = round.game_id,
                round_num = round.round_num,
                "Round already exists, keeping stored row"
            );
            return Ok(existing.clone());
        }

        let id = self.next_id(Sequence::Round).await;
        let model = round.clone().into_model(id);
        self.writes.rounds.insert(model.id, model.clone());
        Ok(model)
    }

    async fn finish_round(
        &mut self,
        round_id: i64,
        ended_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), AppError> {
        let mut round = self.round_by_id(round_id).await?;
        if !round.finished {
            round.finished = true;
            round.ended_at = Some(ended_at);
            self.writes.rounds.insert(round_id, round);
        }
        Ok(())
    }

    async fn increment_guess_count(&mut self, round_id: i64) -> Result<i32, AppError> {
        let mut round = self.round_by_id(round_id).await?;
        round.guesses_count += 1;
        let count = round.guesses_count;
        self.writes.rounds.insert(round_id, round);
        Ok(count)
    }

    async fn find_guess(
        &mut self,
        round_id: i64,
        user_id: &str,
    ) -> Result<Option<GuessModel>, AppError> {
        let Ok(round) = self.round_by_id(round_id).await else {
            return Ok(None);
        };
        Ok(self
            .game_view(round.game_id)
            .await
            .guesses_of_round(round_id)
            .into_iter()
            .find(|g| g.user_id == user_id))
    }

    async fn insert_guess(&mut self, guess: &NewGuess) -> Result<GuessModel, AppError> {
        if let Some(existing) = self.find_guess(guess.round_id, &guess.user_id).await? {
            return Ok(existing);
        }

        let round = self.round_by_id(guess.round_id).await?;
        let model = GuessModel {
            id: self.next_id(Sequence::Guess).await,
            round_id: guess.round_id,
            round_num: round.round_num,
            user_id: guess.user_id.clone(),
            lat: guess.lat,
            lng: guess.lng,
            score: guess.score,
            distance: guess.distance,
            created_at: guess.created_at,
        };
        self.writes.guesses.insert(model.id, model.clone());
        Ok(model)
    }

    async fn guesses_for_round(&mut self, round_id: i64) -> Result<Vec<GuessModel>, AppError> {
        let round = self.round_by_id(round_id).await?;
        Ok(self.game_view(round.game_id).await.guesses_of_round(round_id))
    }

    async fn guesses_for_game(&mut self, game_id: i64) -> Result<Vec<GuessModel>, AppError> {
        Ok(self.game_view(game_id).await.guesses_of_game(game_id))
    }

    async fn player_totals(&mut self, game_id: i64) -> Result<Vec<PlayerTotal>, AppError> {
        let mut totals: BTreeMap<String, PlayerTotal> = BTreeMap::new();
        for guess in self.game_view(game_id).await.guesses_of_game(game_id) {
            let total = totals
                .entry(guess.user_id.clone())
                .or_insert_with(|| PlayerTotal {
                    user_id: guess.user_id.clone(),
                    score: 0,
                    distance: 0.0,
                    guesses: 0,
                });
            total.score += i64::from(guess.score);
            total.distance += guess.distance;
            total.guesses += 1;
        }

        let mut totals: Vec<PlayerTotal> = totals.into_values().collect();
        totals.sort_by(|a, b| b.score.cmp(&a.score).then(a.user_id.cmp(&b.user_id)));
        Ok(totals)
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        let InMemoryGameTransaction {
            store,
            held_locks,
            writes,
        } = *self;

        store.data.lock().await.tables.overlay(writes);
        // Row locks go only after the writes are visible
        drop(held_locks);
        debug!("Committed in-memory transaction");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::models::GameParameters;
    use crate::panorama::PanoramaPoint;
    use crate::scoring::Provider;
    use chrono::Utc;
    use std::time::Duration;
    use tokio::time::timeout;

    /// Test helper functions for creating test data
    mod helpers {
        use super::*;

        pub fn parameters(rounds: i32) -> GameParameters {
            GameParameters {
                rounds,
                timer_seconds: 0,
                moving_allowed: true,
                provider: Provider::Google,
            }
        }

        pub fn new_round(game_id: i64, round_num: i32, point_id: &str) -> NewRound {
            NewRound {
                game_id,
                round_num,
                point: PanoramaPoint::new(point_id, "ref", 10.0, 20.0),
                created_at: Utc::now(),
                started_at: Utc::now(),
            }
        }

        pub fn new_guess(round_id: i64, user_id: &str, score: i32) -> NewGuess {
            NewGuess {
                round_id,
                user_id: user_id.to_string(),
                lat: 1.0,
                lng: 1.0,
                score,
                distance: 100.0,
                created_at: Utc::now(),
            }
        }

        pub async fn insert_game(store: &InMemoryGameStore, new_game: NewGame) -> GameModel {
            let mut tx = store.begin(IsolationLevel::default()).await.unwrap();
            let game = tx.insert_game(&new_game).await.unwrap();
            tx.commit().await.unwrap();
            game
        }
    }

    use helpers::*;

    #[tokio::test]
    async fn test_committed_game_is_visible() {
        let store = InMemoryGameStore::new();
        let game = insert_game(&store, NewGame::singleplayer("alice", parameters(3), Utc::now())).await;

        let stored = store.get_game(game.id).await.unwrap().unwrap();
        assert_eq!(stored.creator_id, "alice");
        assert_eq!(stored.score, Some(0));
        assert!(store.is_member(game.id, "alice").await.unwrap());
    }

    #[tokio::test]
    async fn test_dropped_transaction_rolls_back() {
        let store = InMemoryGameStore::new();
        let game = insert_game(&store, NewGame::singleplayer("alice", parameters(3), Utc::now())).await;

        {
            let mut tx = store.begin(IsolationLevel::Serializable).await.unwrap();
            let mut locked = tx.lock_game(game.id).await.unwrap().unwrap();
            tx.insert_round(&new_round(game.id, 1, "p1")).await.unwrap();
            locked.round_current = 1;
            tx.update_game(&locked).await.unwrap();
            // dropped without commit
        }

        let stored = store.get_game(game.id).await.unwrap().unwrap();
        assert_eq!(stored.round_current, 0);
        assert_eq!(store.round_count(game.id).await, 0);
    }

    #[tokio::test]
    async fn test_game_lock_only_blocks_the_same_game() {
        let store = InMemoryGameStore::new();
        let a = insert_game(&store, NewGame::singleplayer("alice", parameters(3), Utc::now())).await;
        let b = insert_game(&store, NewGame::singleplayer("bob", parameters(3), Utc::now())).await;
        let wait = Duration::from_millis(200);

        let mut tx_a = store.begin(IsolationLevel::default()).await.unwrap();
        let mut locked_a = tx_a.lock_game(a.id).await.unwrap().unwrap();

        let mut tx_b = store.begin(IsolationLevel::default()).await.unwrap();
        let locked_b = timeout(wait, tx_b.lock_game(b.id)).await;
        assert!(locked_b.is_ok(), "locking game B must not wait for game A");
        assert!(timeout(wait, store.get_game(a.id)).await.is_ok());

        let mut tx_other = store.begin(IsolationLevel::default()).await.unwrap();
        assert!(timeout(Duration::from_millis(50), tx_other.lock_game(a.id))
            .await
            .is_err());

        locked_a.round_current = 1;
        tx_a.update_game(&locked_a).await.unwrap();
        tx_a.commit().await.unwrap();

        // Once A commits the waiting transaction gets the lock and sees the write
        let relocked = timeout(wait, tx_other.lock_game(a.id))
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(relocked.round_current, 1);
    }

    #[tokio::test]
    async fn test_uncommitted_writes_stay_private() {
        let store = InMemoryGameStore::new();
        let game = insert_game(&store, NewGame::singleplayer("alice", parameters(3), Utc::now())).await;

        let mut tx = store.begin(IsolationLevel::default()).await.unwrap();
        tx.lock_game(game.id).await.unwrap();
        let round = tx.insert_round(&new_round(game.id, 1, "p1")).await.unwrap();
        assert_eq!(tx.get_round(game.id, 1).await.unwrap(), Some(round.clone()));
        assert_eq!(store.get_round(game.id, 1).await.unwrap(), None);

        tx.commit().await.unwrap();
        assert_eq!(store.get_round(game.id, 1).await.unwrap(), Some(round));
    }

    #[tokio::test]
    async fn test_insert_round_ignores_duplicate_round_number() {
        let store = InMemoryGameStore::new();
        let game = insert_game(&store, NewGame::singleplayer("alice", parameters(3), Utc::now())).await;

        let mut tx = store.begin(IsolationLevel::default()).await.unwrap();
        let first = tx.insert_round(&new_round(game.id, 1, "p1")).await.unwrap();
        let second = tx.insert_round(&new_round(game.id, 1, "p2")).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(second.point_id, "p1");
        assert_eq!(store.round_numbers(game.id).await, vec![1]);
    }

    #[tokio::test]
    async fn test_insert_guess_keeps_first_guess_per_user() {
        let store = InMemoryGameStore::new();
        let game = insert_game(&store, NewGame::singleplayer("alice", parameters(3), Utc::now())).await;

        let mut tx = store.begin(IsolationLevel::default()).await.unwrap();
        let round = tx.insert_round(&new_round(game.id, 1, "p1")).await.unwrap();
        let first = tx.insert_guess(&new_guess(round.id, "alice", 4000)).await.unwrap();
        let second = tx.insert_guess(&new_guess(round.id, "alice", 10)).await.unwrap();
        let guesses = tx.guesses_for_round(round.id).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(guesses.len(), 1);
        assert_eq!(guesses[0].score, 4000);
        assert_eq!(guesses[0].round_num, 1);
    }

    #[tokio::test]
    async fn test_player_totals_and_roster() {
        let store = InMemoryGameStore::new();
        let game = insert_game(
            &store,
            NewGame::multiplayer(
                "alice",
                parameters(2),
                vec!["alice".to_string(), "bob".to_string()],
                Utc::now(),
            ),
        )
        .await;

        let mut tx = store.begin(IsolationLevel::default()).await.unwrap();
        let r1 = tx.insert_round(&new_round(game.id, 1, "p1")).await.unwrap();
        let r2 = tx.insert_round(&new_round(game.id, 2, "p2")).await.unwrap();
        tx.insert_guess(&new_guess(r1.id, "alice", 100)).await.unwrap();
        tx.insert_guess(&new_guess(r2.id, "alice", 200)).await.unwrap();
        tx.insert_guess(&new_guess(r1.id, "bob", 1000)).await.unwrap();
        // a late joiner who only ever guessed still counts as a player
        tx.insert_guess(&new_guess(r2.id, "carol", 5)).await.unwrap();

        let totals = tx.player_totals(game.id).await.unwrap();
        let players = tx.game_players(game.id).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(totals[0].user_id, "bob");
        assert_eq!(totals[0].score, 1000);
        assert_eq!(totals[1].user_id, "alice");
        assert_eq!(totals[1].score, 300);
        assert_eq!(totals[1].guesses, 2);
        assert_eq!(players, vec!["alice", "bob", "carol"]);
    }

    #[tokio::test]
    async fn test_finished_rounds_only_lists_closed_rounds() {
        let store = InMemoryGameStore::new();
        let game = insert_game(&store, NewGame::singleplayer("alice", parameters(3), Utc::now())).await;

        let mut tx = store.begin(IsolationLevel::default()).await.unwrap();
        let r1 = tx.insert_round(&new_round(game.id, 1, "p1")).await.unwrap();
        tx.insert_round(&new_round(game.id, 2, "p2")).await.unwrap();
        tx.insert_guess(&new_guess(r1.id, "alice", 10)).await.unwrap();
        tx.finish_round(r1.id, Utc::now()).await.unwrap();
        tx.commit().await.unwrap();

        let finished = store.finished_rounds(game.id).await.unwrap();
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].round.round_num, 1);
        assert_eq!(finished[0].guesses.len(), 1);
    }

    #[tokio::test]
    async fn test_list_games_for_user_paginates_newest_first() {
        let store = InMemoryGameStore::new();
        let start = Utc::now();
        for offset in 0..5 {
            insert_game(
                &store,
                NewGame::singleplayer(
                    "alice",
                    parameters(1),
                    start + chrono::Duration::seconds(offset),
                ),
            )
            .await;
        }
        insert_game(&store, NewGame::singleplayer("bob", parameters(1), start)).await;

        let first_page = store
            .list_games_for_user("alice", GameMode::Singleplayer, &Pagination::new(1, 2))
            .await
            .unwrap();
        let last_page = store
            .list_games_for_user("alice", GameMode::Singleplayer, &Pagination::new(3, 2))
            .await
            .unwrap();
        let multiplayer = store
            .list_games_for_user("alice", GameMode::Multiplayer, &Pagination::default())
            .await
            .unwrap();

        assert_eq!(first_page.len(), 2);
        assert!(first_page[0].created_at > first_page[1].created_at);
        assert_eq!(last_page.len(), 1);
        assert!(multiplayer.is_empty());
    }
}
