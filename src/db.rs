use std::{fmt, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};
use sqlx::{
    Decode, Encode, FromRow, Sqlite, SqlitePool, Transaction, Type,
    encode::IsNull,
    error::BoxDynError,
    sqlite::{
        SqliteArgumentValue, SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions,
        SqliteTypeInfo, SqliteValueRef,
    },
};
use uuid::Uuid;

// ids are UUIDv7, stored as hyphenated text
macro_rules! id_type {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl Type<Sqlite> for $name {
            fn type_info() -> SqliteTypeInfo {
                <String as Type<Sqlite>>::type_info()
            }

            fn compatible(ty: &SqliteTypeInfo) -> bool {
                <String as Type<Sqlite>>::compatible(ty)
            }
        }

        impl<'q> Encode<'q, Sqlite> for $name {
            fn encode_by_ref(
                &self,
                buf: &mut Vec<SqliteArgumentValue<'q>>,
            ) -> Result<IsNull, BoxDynError> {
                <String as Encode<'q, Sqlite>>::encode(self.0.to_string(), buf)
            }
        }

        impl<'r> Decode<'r, Sqlite> for $name {
            fn decode(value: SqliteValueRef<'r>) -> Result<Self, BoxDynError> {
                let text = <&str as Decode<'r, Sqlite>>::decode(value)?;
                Ok(Self(Uuid::parse_str(text)?))
            }
        }
    };
}

id_type!(UserId);
id_type!(StreamId);
id_type!(RegistrationId);

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    #[serde(skip)]
    pub external_id: String,
    pub first_name: String,
    pub last_name: String,
    pub birth_date: String,
    pub city: String,
    pub favorite_games: String,
    pub favorite_genres: String,
    pub created_at: String,
}

/// A scheduled event. `current_participants` is a cache of the number of
/// registration rows and is only ever written by the registration commit.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Stream {
    pub id: StreamId,
    pub title: String,
    pub description: String,
    pub game: String,
    pub genre: String,
    pub streamer_id: UserId,
    pub date: String,
    pub time: String,
    pub max_participants: i64,
    pub current_participants: i64,
    pub created_at: String,
}

impl Stream {
    pub fn available_spots(&self) -> i64 {
        self.max_participants - self.current_participants
    }

    pub fn is_full(&self) -> bool {
        self.current_participants >= self.max_participants
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub id: RegistrationId,
    pub user_id: UserId,
    pub stream_id: StreamId,
    pub registered_at: String,
}

#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub external_id: String,
    pub first_name: String,
    pub last_name: String,
    pub birth_date: String,
    pub city: String,
    pub favorite_games: String,
    pub favorite_genres: String,
}

#[derive(Debug, Clone)]
pub struct NewStream {
    pub title: String,
    pub description: String,
    pub game: String,
    pub genre: String,
    pub streamer_id: UserId,
    pub date: String,
    pub time: String,
    pub max_participants: i64,
}

/// Partial profile edit; `None` leaves the field as it is.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub birth_date: Option<String>,
    pub city: Option<String>,
    pub favorite_games: Option<String>,
    pub favorite_genres: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct CounterDrift {
    pub stream_id: StreamId,
    pub cached: i64,
    pub actual: i64,
}

pub(crate) const USER_COLUMNS: &str =
    "id,external_id,first_name,last_name,birth_date,city,favorite_games,favorite_genres,created_at";
pub(crate) const STREAM_COLUMNS: &str =
    "id,title,description,game,genre,streamer_id,date,time,max_participants,current_participants,created_at";
const REGISTRATION_COLUMNS: &str = "id,user_id,stream_id,registered_at";

/// Persistence boundary for users, streams and registrations.
///
/// No business rules live here. The only write path for the participant
/// counter is [`StoreTx::increment_participants`].
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!().run(&self.pool).await
    }

    pub async fn begin(&self) -> Result<StoreTx, sqlx::Error> {
        Ok(StoreTx {
            tx: self.pool.begin().await?,
        })
    }

    pub async fn get_stream(&self, id: StreamId) -> Result<Option<Stream>, sqlx::Error> {
        sqlx::query_as(&format!("SELECT {STREAM_COLUMNS} FROM streams WHERE id=?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn get_user(&self, id: UserId) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id=?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn user_exists(&self, id: UserId) -> Result<bool, sqlx::Error> {
        let found: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM users WHERE id=?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    pub async fn find_registration(
        &self,
        user_id: UserId,
        stream_id: StreamId,
    ) -> Result<Option<Registration>, sqlx::Error> {
        sqlx::query_as(&format!(
            "SELECT {REGISTRATION_COLUMNS} FROM stream_registrations WHERE user_id=? AND stream_id=?"
        ))
        .bind(user_id)
        .bind(stream_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Full recount. The hot path reads the cached counter instead.
    #[cfg(test)]
    pub(crate) async fn count_registrations(&self, stream_id: StreamId) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM stream_registrations WHERE stream_id=?")
            .bind(stream_id)
            .fetch_one(&self.pool)
            .await
    }

    /// Streams whose cached counter disagrees with their registration rows.
    pub async fn counter_drift(&self) -> Result<Vec<CounterDrift>, sqlx::Error> {
        sqlx::query_as(
            "SELECT s.id AS stream_id, s.current_participants AS cached, COUNT(r.id) AS actual
             FROM streams s
             LEFT JOIN stream_registrations r ON r.stream_id = s.id
             GROUP BY s.id
             HAVING s.current_participants != COUNT(r.id)",
        )
        .fetch_all(&self.pool)
        .await
    }

    /// Looks up the user bound to `external_id`, creating it from `new` on
    /// first sight. Safe under concurrent first logins.
    pub async fn find_or_create_user(&self, new: NewUser) -> Result<User, sqlx::Error> {
        sqlx::query(
            "INSERT INTO users (id,external_id,first_name,last_name,birth_date,city,favorite_games,favorite_genres)
             VALUES (?,?,?,?,?,?,?,?)
             ON CONFLICT(external_id) DO NOTHING",
        )
        .bind(UserId::new())
        .bind(&new.external_id)
        .bind(&new.first_name)
        .bind(&new.last_name)
        .bind(&new.birth_date)
        .bind(&new.city)
        .bind(&new.favorite_games)
        .bind(&new.favorite_genres)
        .execute(&self.pool)
        .await?;

        sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE external_id=?"))
            .bind(&new.external_id)
            .fetch_one(&self.pool)
            .await
    }

    pub async fn update_profile(
        &self,
        id: UserId,
        update: &ProfileUpdate,
    ) -> Result<Option<User>, sqlx::Error> {
        sqlx::query(
            "UPDATE users SET
                first_name=COALESCE(?, first_name),
                last_name=COALESCE(?, last_name),
                birth_date=COALESCE(?, birth_date),
                city=COALESCE(?, city),
                favorite_games=COALESCE(?, favorite_games),
                favorite_genres=COALESCE(?, favorite_genres)
             WHERE id=?",
        )
        .bind(&update.first_name)
        .bind(&update.last_name)
        .bind(&update.birth_date)
        .bind(&update.city)
        .bind(&update.favorite_games)
        .bind(&update.favorite_genres)
        .bind(id)
        .execute(&self.pool)
        .await?;

        self.get_user(id).await
    }

    /// Creates a stream with an empty participant counter.
    pub async fn insert_stream(&self, new: NewStream) -> Result<Stream, sqlx::Error> {
        sqlx::query_as(&format!(
            "INSERT INTO streams (id,title,description,game,genre,streamer_id,date,time,max_participants)
             VALUES (?,?,?,?,?,?,?,?,?)
             RETURNING {STREAM_COLUMNS}"
        ))
        .bind(StreamId::new())
        .bind(&new.title)
        .bind(&new.description)
        .bind(&new.game)
        .bind(&new.genre)
        .bind(new.streamer_id)
        .bind(&new.date)
        .bind(&new.time)
        .bind(new.max_participants)
        .fetch_one(&self.pool)
        .await
    }

    #[cfg(test)]
    pub(crate) async fn user_ids(&self) -> Result<Vec<UserId>, sqlx::Error> {
        sqlx::query_scalar("SELECT id FROM users ORDER BY id")
            .fetch_all(&self.pool)
            .await
    }

    pub async fn stream_count(&self) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM streams")
            .fetch_one(&self.pool)
            .await
    }
}

pub enum Inserted {
    Created(Registration),
    Duplicate,
}

/// The all-or-nothing unit for a registration commit. Dropping it without
/// calling [`StoreTx::commit`] rolls every statement back.
pub struct StoreTx {
    tx: Transaction<'static, Sqlite>,
}

impl StoreTx {
    /// Inserts the registration row. A `(user_id, stream_id)` pair that
    /// already exists is reported as [`Inserted::Duplicate`] by the unique
    /// index, whatever any earlier read said.
    pub async fn insert_registration(
        &mut self,
        user_id: UserId,
        stream_id: StreamId,
    ) -> Result<Inserted, sqlx::Error> {
        let result = sqlx::query_as(&format!(
            "INSERT INTO stream_registrations (id,user_id,stream_id) VALUES (?,?,?)
             RETURNING {REGISTRATION_COLUMNS}"
        ))
        .bind(RegistrationId::new())
        .bind(user_id)
        .bind(stream_id)
        .fetch_one(&mut *self.tx)
        .await;

        match result {
            Ok(registration) => Ok(Inserted::Created(registration)),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Ok(Inserted::Duplicate),
            Err(e) => Err(e),
        }
    }

    /// Compare-and-increment of the participant counter. Returns `false` when
    /// the stream was already at capacity and nothing changed.
    pub async fn increment_participants(&mut self, stream_id: StreamId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE streams SET current_participants = current_participants + 1
             WHERE id=? AND current_participants < max_participants",
        )
        .bind(stream_id)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn commit(self) -> Result<(), sqlx::Error> {
        self.tx.commit().await
    }

    pub async fn rollback(self) -> Result<(), sqlx::Error> {
        self.tx.rollback().await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use tempfile::TempDir;

    use super::*;

    /// A migrated store in a scratch directory. Keep the `TempDir` alive for
    /// as long as the store is used.
    pub(crate) async fn temp_store() -> (TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("test.db").display());
        let store = Store::connect(&url, 16).await.unwrap();
        store.migrate().await.unwrap();
        (dir, store)
    }

    pub(crate) async fn user(store: &Store, first_name: &str) -> User {
        store
            .find_or_create_user(NewUser {
                external_id: format!("test:{first_name}"),
                first_name: first_name.to_owned(),
                city: "Kazan".to_owned(),
                ..Default::default()
            })
            .await
            .unwrap()
    }

    pub(crate) async fn stream(
        store: &Store,
        streamer: &User,
        title: &str,
        game: &str,
        date: &str,
        max_participants: i64,
    ) -> Stream {
        store
            .insert_stream(NewStream {
                title: title.to_owned(),
                description: String::new(),
                game: game.to_owned(),
                genre: "Shooter".to_owned(),
                streamer_id: streamer.id,
                date: date.to_owned(),
                time: "19:00".to_owned(),
                max_participants,
            })
            .await
            .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[tokio::test]
    async fn find_or_create_user_is_idempotent() {
        let (_dir, store) = temp_store().await;
        let first = user(&store, "Anna").await;
        let again = user(&store, "Anna").await;

        assert_eq!(first.id, again.id);
        assert_eq!(store.user_ids().await.unwrap(), vec![first.id]);
    }

    #[tokio::test]
    async fn new_stream_starts_empty() {
        let (_dir, store) = temp_store().await;
        let streamer = user(&store, "Admin").await;
        let created = stream(&store, &streamer, "CS Cup", "CS:GO", "2026-12-25", 4).await;

        let fetched = store.get_stream(created.id).await.unwrap().unwrap();
        assert_eq!(fetched.current_participants, 0);
        assert_eq!(fetched.available_spots(), 4);
        assert!(!fetched.is_full());
        assert_eq!(store.stream_count().await.unwrap(), 1);
        assert!(store.get_stream(StreamId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_insert_is_reported_by_the_index() {
        let (_dir, store) = temp_store().await;
        let streamer = user(&store, "Admin").await;
        let s = stream(&store, &streamer, "CS Cup", "CS:GO", "2026-12-25", 4).await;

        let mut tx = store.begin().await.unwrap();
        assert!(matches!(
            tx.insert_registration(streamer.id, s.id).await.unwrap(),
            Inserted::Created(_)
        ));
        assert!(matches!(
            tx.insert_registration(streamer.id, s.id).await.unwrap(),
            Inserted::Duplicate
        ));
        tx.commit().await.unwrap();

        assert_eq!(store.count_registrations(s.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn increment_stops_at_capacity() {
        let (_dir, store) = temp_store().await;
        let streamer = user(&store, "Admin").await;
        let s = stream(&store, &streamer, "Duel", "Valorant", "2026-12-30", 1).await;

        let mut tx = store.begin().await.unwrap();
        assert!(tx.increment_participants(s.id).await.unwrap());
        assert!(!tx.increment_participants(s.id).await.unwrap());
        tx.rollback().await.unwrap();

        let fetched = store.get_stream(s.id).await.unwrap().unwrap();
        assert_eq!(fetched.current_participants, 0);
    }

    #[tokio::test]
    async fn dropped_transaction_rolls_back() {
        let (_dir, store) = temp_store().await;
        let streamer = user(&store, "Admin").await;
        let s = stream(&store, &streamer, "Duel", "Valorant", "2026-12-30", 3).await;

        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_registration(streamer.id, s.id).await.unwrap();
            tx.increment_participants(s.id).await.unwrap();
        }

        assert!(store.find_registration(streamer.id, s.id).await.unwrap().is_none());
        assert_eq!(store.get_stream(s.id).await.unwrap().unwrap().current_participants, 0);
    }

    #[tokio::test]
    async fn counter_cannot_exceed_capacity_even_when_written_directly() {
        let (_dir, store) = temp_store().await;
        let streamer = user(&store, "Admin").await;
        let s = stream(&store, &streamer, "Duel", "Valorant", "2026-12-30", 0).await;

        let result = sqlx::query("UPDATE streams SET current_participants=1 WHERE id=?")
            .bind(s.id)
            .execute(store.pool())
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn counter_drift_reports_mismatches_without_fixing_them() {
        let (_dir, store) = temp_store().await;
        let streamer = user(&store, "Admin").await;
        let s = stream(&store, &streamer, "Duel", "Valorant", "2026-12-30", 3).await;
        assert!(store.counter_drift().await.unwrap().is_empty());

        sqlx::query("UPDATE streams SET current_participants=2 WHERE id=?")
            .bind(s.id)
            .execute(store.pool())
            .await
            .unwrap();

        let drift = store.counter_drift().await.unwrap();
        assert_eq!(drift, vec![CounterDrift { stream_id: s.id, cached: 2, actual: 0 }]);
        assert_eq!(store.get_stream(s.id).await.unwrap().unwrap().current_participants, 2);
    }

    #[tokio::test]
    async fn profile_update_is_partial() {
        let (_dir, store) = temp_store().await;
        let anna = user(&store, "Anna").await;

        let updated = store
            .update_profile(
                anna.id,
                &ProfileUpdate {
                    favorite_games: Some("Minecraft, The Sims".to_owned()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.first_name, "Anna");
        assert_eq!(updated.city, "Kazan");
        assert_eq!(updated.favorite_games, "Minecraft, The Sims");
    }

    #[test]
    fn ids_parse_and_display() {
        let id = StreamId::new();
        assert_eq!(id.to_string().parse::<StreamId>().unwrap(), id);
        assert!("not-a-uuid".parse::<UserId>().is_err());
    }
}
