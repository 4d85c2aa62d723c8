//! Read-side views over the entity store.
//!
//! These only read `current_participants`; they never count registrations
//! themselves.

use serde::Serialize;
use sqlx::{FromRow, SqliteConnection};

use crate::db::{Store, Stream, StreamId, UserId};

pub const SIMILAR_STREAMS_LIMIT: i64 = 3;

const JOINED_STREAM_COLUMNS: &str = "s.id,s.title,s.description,s.game,s.genre,s.streamer_id,s.date,s.time,s.max_participants,s.current_participants,s.created_at";

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct StreamWithStreamer {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub stream: Stream,
    pub streamer_name: String,
    pub streamer_city: String,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Registrant {
    pub user_id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub city: String,
    pub registered_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamDetail {
    pub stream: StreamWithStreamer,
    pub registered_users: Vec<Registrant>,
    pub similar_streams: Vec<Stream>,
    pub available_spots: i64,
}

/// The stream page. All three reads share one transaction so the registrant
/// list and `current_participants` come from the same snapshot.
pub async fn stream_detail(
    store: &Store,
    stream_id: StreamId,
) -> Result<Option<StreamDetail>, sqlx::Error> {
    let mut tx = store.pool().begin().await?;

    let stream: Option<StreamWithStreamer> = sqlx::query_as(&format!(
        "SELECT {JOINED_STREAM_COLUMNS},
                TRIM(u.first_name || ' ' || u.last_name) AS streamer_name,
                u.city AS streamer_city
         FROM streams s
         JOIN users u ON u.id = s.streamer_id
         WHERE s.id=?"
    ))
    .bind(stream_id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(stream) = stream else {
        return Ok(None);
    };

    let registered_users = registrants(&mut tx, stream_id).await?;
    let similar_streams = similar_streams(&mut tx, &stream.stream).await?;
    tx.commit().await?;

    let available_spots = stream.stream.available_spots();
    Ok(Some(StreamDetail {
        stream,
        registered_users,
        similar_streams,
        available_spots,
    }))
}

/// Users holding a registration on the stream, earliest first.
pub async fn registrants(
    conn: &mut SqliteConnection,
    stream_id: StreamId,
) -> Result<Vec<Registrant>, sqlx::Error> {
    sqlx::query_as(
        "SELECT u.id AS user_id, u.first_name, u.last_name, u.city, r.registered_at
         FROM stream_registrations r
         JOIN users u ON u.id = r.user_id
         WHERE r.stream_id=?
         ORDER BY r.registered_at ASC, r.id ASC",
    )
    .bind(stream_id)
    .fetch_all(conn)
    .await
}

/// Other streams of the same game, soonest first.
pub async fn similar_streams(
    conn: &mut SqliteConnection,
    stream: &Stream,
) -> Result<Vec<Stream>, sqlx::Error> {
    sqlx::query_as(&format!(
        "SELECT {JOINED_STREAM_COLUMNS} FROM streams s
         WHERE s.game=? AND s.id!=?
         ORDER BY s.date ASC, s.time ASC
         LIMIT ?"
    ))
    .bind(&stream.game)
    .bind(stream.id)
    .bind(SIMILAR_STREAMS_LIMIT)
    .fetch_all(conn)
    .await
}

/// Streams the user registered for, latest first.
pub async fn streams_for_user(store: &Store, user_id: UserId) -> Result<Vec<Stream>, sqlx::Error> {
    sqlx::query_as(&format!(
        "SELECT {JOINED_STREAM_COLUMNS} FROM streams s
         JOIN stream_registrations r ON r.stream_id = s.id
         WHERE r.user_id=?
         ORDER BY s.date DESC, s.time DESC"
    ))
    .bind(user_id)
    .fetch_all(store.pool())
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::*;
    use crate::registration::Registrar;

    #[tokio::test]
    async fn detail_lists_registrants_in_order() {
        let (_dir, store) = temp_store().await;
        let registrar = Registrar::new(store.clone());
        let streamer = user(&store, "Admin").await;
        let ivan = user(&store, "Ivan").await;
        let anna = user(&store, "Anna").await;
        let maria = user(&store, "Maria").await;
        let s = stream(&store, &streamer, "Cup", "CS:GO", "2026-12-25", 16).await;

        for u in [&anna, &ivan, &maria] {
            registrar.register(Some(u.id), s.id).await.unwrap();
        }

        let detail = stream_detail(&store, s.id).await.unwrap().unwrap();
        let order: Vec<UserId> = detail.registered_users.iter().map(|r| r.user_id).collect();
        assert_eq!(order, vec![anna.id, ivan.id, maria.id]);
        assert_eq!(detail.available_spots, 13);
        assert_eq!(detail.stream.stream.current_participants, 3);
        assert_eq!(detail.stream.streamer_name, "Admin");
        assert_eq!(detail.stream.streamer_city, "Kazan");
    }

    #[tokio::test]
    async fn detail_of_missing_stream_is_none() {
        let (_dir, store) = temp_store().await;
        assert!(stream_detail(&store, StreamId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn available_spots_reads_the_cached_counter() {
        let (_dir, store) = temp_store().await;
        let streamer = user(&store, "Admin").await;
        let s = stream(&store, &streamer, "Cup", "CS:GO", "2026-12-25", 16).await;

        // seeded counters are trusted as-is
        sqlx::query("UPDATE streams SET current_participants=8 WHERE id=?")
            .bind(s.id)
            .execute(store.pool())
            .await
            .unwrap();

        let detail = stream_detail(&store, s.id).await.unwrap().unwrap();
        assert_eq!(detail.available_spots, 8);
        assert!(detail.registered_users.is_empty());
    }

    #[tokio::test]
    async fn similar_streams_share_the_game_and_are_capped() {
        let (_dir, store) = temp_store().await;
        let streamer = user(&store, "Admin").await;
        let target = stream(&store, &streamer, "Cup", "Dota 2", "2026-12-26", 12).await;
        let late = stream(&store, &streamer, "Heroes", "Dota 2", "2026-12-29", 15).await;
        let early = stream(&store, &streamer, "Basics", "Dota 2", "2026-12-20", 15).await;
        let mid = stream(&store, &streamer, "Tourney", "Dota 2", "2026-12-28", 20).await;
        stream(&store, &streamer, "Latest", "Dota 2", "2026-12-31", 20).await;
        stream(&store, &streamer, "Other", "Valorant", "2026-12-21", 8).await;

        let detail = stream_detail(&store, target.id).await.unwrap().unwrap();
        let similar: Vec<StreamId> = detail.similar_streams.iter().map(|s| s.id).collect();
        assert_eq!(similar, vec![early.id, mid.id, late.id]);
    }

    #[tokio::test]
    async fn my_streams_are_latest_first() {
        let (_dir, store) = temp_store().await;
        let registrar = Registrar::new(store.clone());
        let anna = user(&store, "Anna").await;
        let other = user(&store, "Other").await;
        let morning = stream(&store, &anna, "Morning", "GTA V", "2026-12-28", 30).await;
        let later_day = stream(&store, &anna, "Later", "GTA V", "2026-12-31", 30).await;
        let skipped = stream(&store, &anna, "Skipped", "GTA V", "2026-12-30", 30).await;

        for s in [&morning, &later_day] {
            registrar.register(Some(anna.id), s.id).await.unwrap();
        }
        registrar.register(Some(other.id), skipped.id).await.unwrap();

        let mine: Vec<StreamId> = streams_for_user(&store, anna.id)
            .await
            .unwrap()
            .iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(mine, vec![later_day.id, morning.id]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn detail_counts_agree_while_registrations_commit() {
        let (_dir, store) = temp_store().await;
        let registrar = Registrar::new(store.clone());
        let streamer = user(&store, "Admin").await;
        let s = stream(&store, &streamer, "Watch party", "CS:GO", "2026-12-27", 1000).await;

        let mut users = Vec::new();
        for i in 0..120 {
            users.push(user(&store, &format!("Viewer{i}")).await);
        }

        let writers: Vec<_> = users
            .iter()
            .map(|u| {
                let registrar = registrar.clone();
                let (user_id, stream_id) = (u.id, s.id);
                tokio::spawn(async move { registrar.register(Some(user_id), stream_id).await })
            })
            .collect();
        let writes = tokio::spawn(futures_util::future::join_all(writers));

        let mut reads = 0;
        while !writes.is_finished() || reads == 0 {
            let detail = stream_detail(&store, s.id).await.unwrap().unwrap();
            let current = detail.stream.stream.current_participants;
            assert_eq!(detail.registered_users.len() as i64, current);
            assert_eq!(detail.available_spots, 1000 - current);
            reads += 1;
        }

        for result in writes.await.unwrap() {
            result.unwrap().unwrap();
        }
        let detail = stream_detail(&store, s.id).await.unwrap().unwrap();
        assert_eq!(detail.registered_users.len(), 120);
        assert_eq!(detail.available_spots, 880);
    }
}
