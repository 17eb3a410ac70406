use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::str::FromStr;
use tracing::{debug, info, instrument, warn};

use super::models::{
    GameMode, GameModel, GuessModel, NewGame, NewGuess, NewRound, PlayerTotal, RoundModel,
    RoundWithGuesses,
};
use super::repository::{GameStore, GameTransaction, IsolationLevel};
use crate::scoring::Provider;
use crate::shared::{AppError, Pagination};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS games (
        id BIGSERIAL PRIMARY KEY,
        mode TEXT NOT NULL,
        creator_id TEXT NOT NULL,
        rounds INTEGER NOT NULL,
        timer_seconds INTEGER NOT NULL DEFAULT 0,
        moving_allowed BOOLEAN NOT NULL DEFAULT TRUE,
        provider TEXT NOT NULL,
        round_current INTEGER NOT NULL DEFAULT 0,
        score INTEGER,
        player_count INTEGER,
        finished BOOLEAN NOT NULL DEFAULT FALSE,
        created_at TIMESTAMPTZ NOT NULL,
        ended_at TIMESTAMPTZ
    )",
    "CREATE TABLE IF NOT EXISTS game_players (
        game_id BIGINT NOT NULL REFERENCES games (id) ON DELETE CASCADE,
        user_id TEXT NOT NULL,
        PRIMARY KEY (game_id, user_id)
    )",
    "CREATE TABLE IF NOT EXISTS rounds (
        id BIGSERIAL PRIMARY KEY,
        game_id BIGINT NOT NULL REFERENCES games (id) ON DELETE CASCADE,
        round_num INTEGER NOT NULL,
        point_id TEXT NOT NULL,
        streetview_ref TEXT NOT NULL,
        lat DOUBLE PRECISION NOT NULL,
        lng DOUBLE PRECISION NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        started_at TIMESTAMPTZ NOT NULL,
        ended_at TIMESTAMPTZ,
        finished BOOLEAN NOT NULL DEFAULT FALSE,
        guesses_count INTEGER NOT NULL DEFAULT 0,
        UNIQUE (game_id, round_num)
    )",
    "CREATE TABLE IF NOT EXISTS guesses (
        id BIGSERIAL PRIMARY KEY,
        round_id BIGINT NOT NULL REFERENCES rounds (id) ON DELETE CASCADE,
        user_id TEXT NOT NULL,
        lat DOUBLE PRECISION NOT NULL,
        lng DOUBLE PRECISION NOT NULL,
        score INTEGER NOT NULL,
        distance DOUBLE PRECISION NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        UNIQUE (round_id, user_id)
    )",
    "CREATE INDEX IF NOT EXISTS games_creator_idx ON games (creator_id, created_at DESC)",
    "CREATE INDEX IF NOT EXISTS game_players_user_idx ON game_players (user_id)",
];

const GAME_COLUMNS: &str = "id, mode, creator_id, rounds, timer_seconds, moving_allowed, provider, \
     round_current, score, player_count, finished, created_at, ended_at";

const ROUND_COLUMNS: &str = "id, game_id, round_num, point_id, streetview_ref, lat, lng, \
     created_at, started_at, ended_at, finished, guesses_count";

const GUESS_SELECT: &str = "SELECT g.id, g.round_id, r.round_num, g.user_id, g.lat, g.lng, \
     g.score, g.distance, g.created_at FROM guesses g JOIN rounds r ON r.id = g.round_id";

/// Wraps a driver error with the operation that failed
fn db_error(operation: &'static str) -> impl Fn(sqlx::Error) -> AppError {
    move |e| {
        warn!(error = %e, operation, "Game store query failed");
        AppError::DatabaseError(format!("{}: {}", operation, e))
    }
}

fn decode_error(operation: &'static str) -> impl Fn(sqlx::Error) -> AppError {
    move |e| AppError::DatabaseError(format!("decode {}: {}", operation, e))
}

fn game_from_row(row: &PgRow) -> Result<GameModel, AppError> {
    let decode = decode_error("game");
    let mode: String = row.try_get("mode").map_err(&decode)?;
    let provider: String = row.try_get("provider").map_err(&decode)?;

    Ok(GameModel {
        id: row.try_get("id").map_err(&decode)?,
        mode: GameMode::from_str(&mode)
            .map_err(|_| AppError::DatabaseError(format!("unknown game mode {}", mode)))?,
        creator_id: row.try_get("creator_id").map_err(&decode)?,
        rounds: row.try_get("rounds").map_err(&decode)?,
        timer_seconds: row.try_get("timer_seconds").map_err(&decode)?,
        moving_allowed: row.try_get("moving_allowed").map_err(&decode)?,
        provider: Provider::from_str(&provider)
            .map_err(|_| AppError::DatabaseError(format!("unknown provider {}", provider)))?,
        round_current: row.try_get("round_current").map_err(&decode)?,
        score: row.try_get("score").map_err(&decode)?,
        player_count: row.try_get("player_count").map_err(&decode)?,
        finished: row.try_get("finished").map_err(&decode)?,
        created_at: row.try_get("created_at").map_err(&decode)?,
        ended_at: row.try_get("ended_at").map_err(&decode)?,
    })
}

fn round_from_row(row: &PgRow) -> Result<RoundModel, AppError> {
    let decode = decode_error("round");
    Ok(RoundModel {
        id: row.try_get("id").map_err(&decode)?,
        game_id: row.try_get("game_id").map_err(&decode)?,
        round_num: row.try_get("round_num").map_err(&decode)?,
        point_id: row.try_get("point_id").map_err(&decode)?,
        streetview_ref: row.try_get("streetview_ref").map_err(&decode)?,
        lat: row.try_get("lat").map_err(&decode)?,
        lng: row.try_get("lng").map_err(&decode)?,
        created_at: row.try_get("created_at").map_err(&decode)?,
        started_at: row.try_get("started_at").map_err(&decode)?,
        ended_at: row.try_get("ended_at").map_err(&decode)?,
        finished: row.try_get("finished").map_err(&decode)?,
        guesses_count: row.try_get("guesses_count").map_err(&decode)?,
    })
}

fn guess_from_row(row: &PgRow) -> Result<GuessModel, AppError> {
    let decode = decode_error("guess");
    Ok(GuessModel {
        id: row.try_get("id").map_err(&decode)?,
        round_id: row.try_get("round_id").map_err(&decode)?,
        round_num: row.try_get("round_num").map_err(&decode)?,
        user_id: row.try_get("user_id").map_err(&decode)?,
        lat: row.try_get("lat").map_err(&decode)?,
        lng: row.try_get("lng").map_err(&decode)?,
        score: row.try_get("score").map_err(&decode)?,
        distance: row.try_get("distance").map_err(&decode)?,
        created_at: row.try_get("created_at").map_err(&decode)?,
    })
}

fn total_from_row(row: &PgRow) -> Result<PlayerTotal, AppError> {
    let decode = decode_error("player total");
    Ok(PlayerTotal {
        user_id: row.try_get("user_id").map_err(&decode)?,
        score: row.try_get("score").map_err(&decode)?,
        distance: row.try_get("distance").map_err(&decode)?,
        guesses: row.try_get("guesses").map_err(&decode)?,
    })
}

/// PostgreSQL implementation of the game store
#[derive(Clone)]
pub struct PostgresGameStore {
    pool: PgPool,
}

impl PostgresGameStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the game tables when they are missing
    #[instrument(skip(self))]
    pub async fn migrate(&self) -> Result<(), AppError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(db_error("migrate"))?;
        }
        info!("Game store schema is up to date");
        Ok(())
    }
}

pub struct PostgresGameTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl GameStore for PostgresGameStore {
    #[instrument(skip(self))]
    async fn begin(
        &self,
        isolation: IsolationLevel,
    ) -> Result<Box<dyn GameTransaction>, AppError> {
        let mut tx = self.pool.begin().await.map_err(db_error("begin"))?;

        let statement = format!("SET TRANSACTION ISOLATION LEVEL {}", isolation.as_sql());
        sqlx::query(&statement)
            .execute(&mut *tx)
            .await
            .map_err(db_error("set isolation level"))?;

        Ok(Box::new(PostgresGameTransaction { tx }))
    }

    #[instrument(skip(self))]
    async fn get_game(&self, game_id: i64) -> Result<Option<GameModel>, AppError> {
        let query = format!("SELECT {} FROM games WHERE id = $1", GAME_COLUMNS);
        let row = sqlx::query(&query)
            .bind(game_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("get game"))?;

        row.as_ref().map(game_from_row).transpose()
    }

    #[instrument(skip(self))]
    async fn get_round(
        &self,
        game_id: i64,
        round_num: i32,
    ) -> Result<Option<RoundModel>, AppError> {
        let query = format!(
            "SELECT {} FROM rounds WHERE game_id = $1 AND round_num = $2",
            ROUND_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(game_id)
            .bind(round_num)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("get round"))?;

        row.as_ref().map(round_from_row).transpose()
    }

    #[instrument(skip(self))]
    async fn list_games_for_user(
        &self,
        user_id: &str,
        mode: GameMode,
        page: &Pagination,
    ) -> Result<Vec<GameModel>, AppError> {
        let query = format!(
            "SELECT {} FROM games g WHERE g.mode = $2 AND (g.creator_id = $1 OR EXISTS \
             (SELECT 1 FROM game_players p WHERE p.game_id = g.id AND p.user_id = $1)) \
             ORDER BY g.created_at DESC, g.id DESC LIMIT $3 OFFSET $4",
            GAME_COLUMNS
        );
        let rows = sqlx::query(&query)
            .bind(user_id)
            .bind(mode.as_ref())
            .bind(page.limit() as i64)
            .bind(page.offset() as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("list games"))?;

        debug!(count = rows.len(), "Listed games from database");
        rows.iter().map(game_from_row).collect()
    }

    #[instrument(skip(self))]
    async fn is_member(&self, game_id: i64, user_id: &str) -> Result<bool, AppError> {
        sqlx::query(MEMBER_QUERY)
            .bind(game_id)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_error("check membership"))?
            .try_get("member")
            .map_err(decode_error("membership"))
    }

    #[instrument(skip(self))]
    async fn finished_rounds(&self, game_id: i64) -> Result<Vec<RoundWithGuesses>, AppError> {
        let query = format!(
            "SELECT {} FROM rounds WHERE game_id = $1 AND finished ORDER BY round_num",
            ROUND_COLUMNS
        );
        let round_rows = sqlx::query(&query)
            .bind(game_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("list finished rounds"))?;

        let guess_query = format!(
            "{} WHERE r.game_id = $1 AND r.finished ORDER BY r.round_num, g.id",
            GUESS_SELECT
        );
        let guess_rows = sqlx::query(&guess_query)
            .bind(game_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("list finished round guesses"))?;
        let guesses: Vec<GuessModel> = guess_rows
            .iter()
            .map(guess_from_row)
            .collect::<Result<_, _>>()?;

        round_rows
            .iter()
            .map(|row| {
                let round = round_from_row(row)?;
                let guesses = guesses
                    .iter()
                    .filter(|g| g.round_id == round.id)
                    .cloned()
                    .collect();
                Ok(RoundWithGuesses { round, guesses })
            })
            .collect()
    }
}

const MEMBER_QUERY: &str = "SELECT EXISTS (SELECT 1 FROM game_players WHERE game_id = $1 AND user_id = $2) \
     OR EXISTS (SELECT 1 FROM guesses g JOIN rounds r ON r.id = g.round_id \
     WHERE r.game_id = $1 AND g.user_id = $2) AS member";

#[async_trait]
impl GameTransaction for PostgresGameTransaction {
    async fn insert_game(&mut self, game: &NewGame) -> Result<GameModel, AppError> {
        let model = game.clone().into_model(0);
        let id: i64 = sqlx::query(
            "INSERT INTO games (mode, creator_id, rounds, timer_seconds, moving_allowed, provider, \
             round_current, score, player_count, finished, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, 0, $7, $8, FALSE, $9) RETURNING id",
        )
        .bind(model.mode.as_ref())
        .bind(&model.creator_id)
        .bind(model.rounds)
        .bind(model.timer_seconds)
        .bind(model.moving_allowed)
        .bind(model.provider.as_ref())
        .bind(model.score)
        .bind(model.player_count)
        .bind(model.created_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_error("insert game"))?
        .try_get("id")
        .map_err(decode_error("game id"))?;

        for player in &game.players {
            sqlx::query(
                "INSERT INTO game_players (game_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            )
            .bind(id)
            .bind(player)
            .execute(&mut *self.tx)
            .await
            .map_err(db_error("insert game player"))?;
        }

        debug!(game_id = id, "Inserted game in database");
        Ok(GameModel { id, ..model })
    }

    async fn lock_game(&mut self, game_id: i64) -> Result<Option<GameModel>, AppError> {
        let query = format!("SELECT {} FROM games WHERE id = $1 FOR UPDATE", GAME_COLUMNS);
        let row = sqlx::query(&query)
            .bind(game_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_error("lock game"))?;

        row.as_ref().map(game_from_row).transpose()
    }

    async fn update_game(&mut self, game: &GameModel) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE games SET round_current = $2, score = $3, finished = $4, ended_at = $5 \
             WHERE id = $1",
        )
        .bind(game.id)
        .bind(game.round_current)
        .bind(game.score)
        .bind(game.finished)
        .bind(game.ended_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_error("update game"))?;
        Ok(())
    }

    async fn game_players(&mut self, game_id: i64) -> Result<Vec<String>, AppError> {
        let rows = sqlx::query(
            "SELECT user_id FROM game_players WHERE game_id = $1 \
             UNION SELECT g.user_id FROM guesses g JOIN rounds r ON r.id = g.round_id \
             WHERE r.game_id = $1 ORDER BY user_id",
        )
        .bind(game_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_error("list game players"))?;

        rows.iter()
            .map(|row| row.try_get("user_id").map_err(decode_error("player")))
            .collect()
    }

    async fn is_member(&mut self, game_id: i64, user_id: &str) -> Result<bool, AppError> {
        sqlx::query(MEMBER_QUERY)
            .bind(game_id)
            .bind(user_id)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(db_error("check membership"))?
            .try_get("member")
            .map_err(decode_error("membership"))
    }

    async fn get_round(
        &mut self,
        game_id: i64,
        round_num: i32,
    ) -> Result<Option<RoundModel>, AppError> {
        let query = format!(
            "SELECT {} FROM rounds WHERE game_id = $1 AND round_num = $2",
            ROUND_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(game_id)
            .bind(round_num)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_error("get round"))?;

        row.as_ref().map(round_from_row).transpose()
    }

    async fn insert_round(&mut self, round: &NewRound) -> Result<RoundModel, AppError> {
        sqlx::query(
            "INSERT INTO rounds (game_id, round_num, point_id, streetview_ref, lat, lng, \
             created_at, started_at, finished, guesses_count) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, FALSE, 0) \
             ON CONFLICT (game_id, round_num) DO NOTHING",
        )
        .bind(round.game_id)
        .bind(round.round_num)
        .bind(&round.point.id)
        .bind(&round.point.streetview_ref)
        .bind(round.point.lat)
        .bind(round.point.lng)
        .bind(round.created_at)
        .bind(round.started_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_error("insert round"))?;

        self.get_round(round.game_id, round.round_num)
            .await?
            .ok_or_else(|| AppError::DatabaseError("insert round: row vanished".to_string()))
    }

    async fn finish_round(
        &mut self,
        round_id: i64,
        ended_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE rounds SET finished = TRUE, ended_at = $2 WHERE id = $1 AND NOT finished",
        )
        .bind(round_id)
        .bind(ended_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_error("finish round"))?;
        Ok(())
    }

    async fn increment_guess_count(&mut self, round_id: i64) -> Result<i32, AppError> {
        sqlx::query(
            "UPDATE rounds SET guesses_count = guesses_count + 1 WHERE id = $1 \
             RETURNING guesses_count",
        )
        .bind(round_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_error("increment guess count"))?
        .try_get("guesses_count")
        .map_err(decode_error("guesses count"))
    }

    async fn find_guess(
        &mut self,
        round_id: i64,
        user_id: &str,
    ) -> Result<Option<GuessModel>, AppError> {
        let query = format!("{} WHERE g.round_id = $1 AND g.user_id = $2", GUESS_SELECT);
        let row = sqlx::query(&query)
            .bind(round_id)
            .bind(user_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_error("find guess"))?;

        row.as_ref().map(guess_from_row).transpose()
    }

    async fn insert_guess(&mut self, guess: &NewGuess) -> Result<GuessModel, AppError> {
        sqlx::query(
            "INSERT INTO guesses (round_id, user_id, lat, lng, score, distance, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) ON CONFLICT (round_id, user_id) DO NOTHING",
        )
        .bind(guess.round_id)
        .bind(&guess.user_id)
        .bind(guess.lat)
        .bind(guess.lng)
        .bind(guess.score)
        .bind(guess.distance)
        .bind(guess.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_error("insert guess"))?;

        self.find_guess(guess.round_id, &guess.user_id)
            .await?
            .ok_or_else(|| AppError::DatabaseError("insert guess: row vanished".to_string()))
    }

    async fn guesses_for_round(&mut self, round_id: i64) -> Result<Vec<GuessModel>, AppError> {
        let query = format!("{} WHERE g.round_id = $1 ORDER BY g.id", GUESS_SELECT);
        let rows = sqlx::query(&query)
            .bind(round_id)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(db_error("list round guesses"))?;

        rows.iter().map(guess_from_row).collect()
    }

    async fn guesses_for_game(&mut self, game_id: i64) -> Result<Vec<GuessModel>, AppError> {
        let query = format!(
            "{} WHERE r.game_id = $1 ORDER BY r.round_num, g.id",
            GUESS_SELECT
        );
        let rows = sqlx::query(&query)
            .bind(game_id)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(db_error("list game guesses"))?;

        rows.iter().map(guess_from_row).collect()
    }

    async fn player_totals(&mut self, game_id: i64) -> Result<Vec<PlayerTotal>, AppError> {
        let rows = sqlx::query(
            "SELECT g.user_id, SUM(g.score)::BIGINT AS score, SUM(g.distance) AS distance, \
             COUNT(*) AS guesses FROM guesses g JOIN rounds r ON r.id = g.round_id \
             WHERE r.game_id = $1 GROUP BY g.user_id ORDER BY score DESC, g.user_id",
        )
        .bind(game_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_error("sum player totals"))?;

        rows.iter().map(total_from_row).collect()
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        self.tx.commit().await.map_err(db_error("commit"))
    }
}
