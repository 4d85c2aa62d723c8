//! Demo catalogue for an empty database.

use rand::{Rng, seq::SliceRandom};
use time::OffsetDateTime;
use tracing::info;

use crate::{
    db::{NewStream, NewUser, StreamId, UserId},
    registration::{Registrar, RegistrationError},
};

// email, first, last, birth date, city, games, genres
const DEMO_USERS: &[[&str; 7]] = &[
    ["admin@example.com", "Admin", "User", "1990-01-01", "Moscow", "CS:GO, Dota 2", "Shooter, MOBA"],
    ["ivan@example.com", "Ivan", "Petrov", "1995-03-15", "Saint Petersburg", "Valorant, Fortnite", "Shooter, Battle Royale"],
    ["anna@example.com", "Anna", "Sidorova", "1998-07-22", "Novosibirsk", "Minecraft, The Sims", "Sandbox, Simulation"],
    ["alex@example.com", "Alexey", "Kozlov", "1993-11-30", "Yekaterinburg", "League of Legends", "MOBA"],
    ["maria@example.com", "Maria", "Ivanova", "2000-05-18", "Kazan", "Overwatch 2, Apex Legends", "Shooter"],
    ["dmitry@example.com", "Dmitry", "Smirnov", "1991-12-05", "Rostov-on-Don", "World of Warcraft", "MMORPG"],
    ["olga@example.com", "Olga", "Kuznetsova", "1997-09-14", "Vladivostok", "GTA V, Red Dead Redemption", "Action-Adventure"],
    ["sergey@example.com", "Sergey", "Popov", "1994-02-28", "Krasnodar", "Rocket League, FIFA", "Sports"],
    ["ekaterina@example.com", "Ekaterina", "Vasilyeva", "1999-08-11", "Nizhny Novgorod", "The Witcher 3, Cyberpunk 2077", "RPG"],
    ["mikhail@example.com", "Mikhail", "Fedorov", "1996-04-25", "Samara", "Rainbow Six Siege, PUBG", "Tactical Shooter"],
];

// title, description, game, genre, month-day, time, capacity
const DEMO_STREAMS: &[(&str, &str, &str, &str, &str, &str, i64)] = &[
    ("CS:GO Tournament", "Weekly CS:GO tournament with a prize pool.", "CS:GO", "Shooter", "12-25", "19:00", 16),
    ("CS:GO Academy", "Tactics and strategy for newcomers.", "CS:GO", "Shooter", "12-26", "20:00", 10),
    ("CS:GO Pro Watch", "Watching pro matches with expert commentary.", "CS:GO", "Shooter", "12-27", "21:00", 50),
    ("Dota 2 Basics", "Game fundamentals, mechanics and heroes.", "Dota 2", "MOBA", "12-26", "18:00", 12),
    ("Dota 2 Cup", "Amateur 5v5 tournament with prizes.", "Dota 2", "MOBA", "12-28", "19:30", 20),
    ("Dota 2 Heroes", "Deep dive into popular heroes and combos.", "Dota 2", "MOBA", "12-29", "17:00", 15),
    ("Valorant Fun Night", "Games, contests and prizes for viewers.", "Valorant", "Shooter", "12-25", "16:00", 8),
    ("Valorant Aim Lab", "Aim and reaction drills with experienced players.", "Valorant", "Shooter", "12-27", "18:30", 10),
    ("Valorant Duels", "1v1 duels for the best player.", "Valorant", "Shooter", "12-30", "20:00", 12),
    ("Fortnite Battle", "Battle royale with subscribers.", "Fortnite", "Battle Royale", "12-26", "15:00", 20),
    ("LoL ARAM", "Relaxed ARAM games.", "League of Legends", "MOBA", "12-29", "21:00", 30),
    ("Minecraft Survival", "Surviving together on a fresh server.", "Minecraft", "Sandbox", "12-25", "14:00", 40),
    ("Overwatch 2 Ranked", "Climbing ranked as a team.", "Overwatch 2", "Shooter", "12-26", "22:00", 10),
    ("Rocket League Cup", "2v2 competition with a prize pool.", "Rocket League", "Sports", "12-27", "15:00", 8),
    ("GTA V Online", "Missions, races and chaos in Los Santos.", "GTA V", "Action-Adventure", "12-28", "22:00", 30),
    ("WoW Raids", "Hard raids as a team.", "World of Warcraft", "MMORPG", "12-30", "18:00", 40),
    ("PUBG Classic", "Classic battle royale with friends.", "PUBG", "Battle Royale", "12-31", "17:00", 25),
];

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub users: usize,
    pub streams: usize,
    pub registrations: usize,
}

/// Fills an empty database with demo users, streams dated late December of
/// the current year, and registrations covering 20% to 80% of each stream.
/// Does nothing if any stream exists.
pub async fn seed_demo_data(registrar: &Registrar) -> anyhow::Result<SeedReport> {
    let store = registrar.store();
    if store.stream_count().await? > 0 {
        info!("database already has streams, skipping demo data");
        return Ok(SeedReport::default());
    }

    let mut report = SeedReport::default();
    let mut user_ids = Vec::with_capacity(DEMO_USERS.len());
    for [email, first, last, birth_date, city, games, genres] in DEMO_USERS {
        let user = store
            .find_or_create_user(NewUser {
                external_id: format!("demo:{email}"),
                first_name: first.to_string(),
                last_name: last.to_string(),
                birth_date: birth_date.to_string(),
                city: city.to_string(),
                favorite_games: games.to_string(),
                favorite_genres: genres.to_string(),
            })
            .await?;
        user_ids.push(user.id);
        report.users += 1;
    }

    let streamer_id = user_ids[0];
    let year = OffsetDateTime::now_utc().year();
    let mut capacities = Vec::with_capacity(DEMO_STREAMS.len());
    for (title, description, game, genre, month_day, time, capacity) in DEMO_STREAMS {
        let stream = store
            .insert_stream(NewStream {
                title: title.to_string(),
                description: description.to_string(),
                game: game.to_string(),
                genre: genre.to_string(),
                streamer_id,
                date: format!("{year}-{month_day}"),
                time: time.to_string(),
                max_participants: *capacity,
            })
            .await?;
        capacities.push((stream.id, stream.max_participants));
        report.streams += 1;
    }

    let plan = plan_registrations(&capacities, &user_ids, &mut rand::rng());
    for (stream_id, users) in plan {
        for user_id in users {
            match registrar.register(Some(user_id), stream_id).await {
                Ok(_) => report.registrations += 1,
                Err(RegistrationError::Full | RegistrationError::AlreadyRegistered) => {}
                Err(e) => return Err(e.into()),
            }
        }
    }

    info!(
        users = report.users,
        streams = report.streams,
        registrations = report.registrations,
        "seeded demo data"
    );
    Ok(report)
}

/// Picks a random 20%..80% of each stream's capacity from `users`.
fn plan_registrations(
    streams: &[(StreamId, i64)],
    users: &[UserId],
    rng: &mut impl Rng,
) -> Vec<(StreamId, Vec<UserId>)> {
    streams
        .iter()
        .map(|&(stream_id, capacity)| {
            let min = capacity * 2 / 10;
            let max = capacity * 8 / 10;
            let wanted = if max > min { rng.random_range(min..=max) } else { min };

            let mut shuffled = users.to_vec();
            shuffled.shuffle(&mut *rng);
            shuffled.truncate((wanted.max(0) as usize).min(users.len()));
            (stream_id, shuffled)
        })
        .collect()
}
