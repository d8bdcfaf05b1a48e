use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id                      TEXT PRIMARY KEY,
            email                   TEXT NOT NULL UNIQUE,
            password                TEXT NOT NULL,
            username                TEXT UNIQUE,
            name                    TEXT,
            avatar_animal           TEXT,
            avatar_bg               TEXT,
            avatar_color            TEXT,
            points                  INTEGER NOT NULL DEFAULT 0,
            powerup_grief_count     INTEGER NOT NULL DEFAULT 0,
            powerup_protec_count    INTEGER NOT NULL DEFAULT 0,
            created_at              TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        );

        CREATE TABLE IF NOT EXISTS challenges (
            id                  TEXT PRIMARY KEY,
            title               TEXT NOT NULL,
            description         TEXT,
            start_at            TEXT,
            end_at              TEXT NOT NULL,
            type                TEXT NOT NULL CHECK (type IN ('LAST_TO_COMPLETE', 'NOT_COMPLETED')),
            invite_type         TEXT NOT NULL DEFAULT 'PRIVATE' CHECK (invite_type IN ('PRIVATE', 'PUBLIC')),
            owner_id            TEXT NOT NULL REFERENCES users(id),
            result_released_at  TEXT,
            rewards_released_at TEXT,
            is_featured         INTEGER NOT NULL DEFAULT 0,
            feature_rank        INTEGER,
            image_url           TEXT,
            created_at          TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        );

        CREATE INDEX IF NOT EXISTS idx_challenges_end
            ON challenges(end_at);

        CREATE TABLE IF NOT EXISTS participants (
            challenge_id        TEXT NOT NULL REFERENCES challenges(id) ON DELETE CASCADE,
            user_id             TEXT NOT NULL REFERENCES users(id),
            joined_at           TEXT,
            completed_at        TEXT,
            has_been_vetoed     INTEGER NOT NULL DEFAULT 0,
            applied_protec      TEXT,
            griefed_by_user_id  TEXT REFERENCES users(id),
            evidence_link       TEXT,
            effect_tomato       INTEGER NOT NULL DEFAULT 0,
            effect_egg          INTEGER NOT NULL DEFAULT 0,
            effect_poop         INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (challenge_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_participants_user
            ON participants(user_id);

        CREATE TABLE IF NOT EXISTS votes (
            challenge_id    TEXT NOT NULL,
            victim_id       TEXT NOT NULL,
            accuser_id      TEXT NOT NULL,
            created_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
            PRIMARY KEY (challenge_id, victim_id, accuser_id),
            FOREIGN KEY (challenge_id, victim_id)
                REFERENCES participants(challenge_id, user_id) ON DELETE CASCADE
        );

        -- Directed friendship edges. A pending request is one row with
        -- accepted_at NULL; accepting stamps it and inserts the inverse row,
        -- so an accepted friendship is always a mutual pair.
        CREATE TABLE IF NOT EXISTS contacts (
            user_id     TEXT NOT NULL REFERENCES users(id),
            friend_id   TEXT NOT NULL REFERENCES users(id),
            accepted_at TEXT,
            created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
            PRIMARY KEY (user_id, friend_id)
        );

        CREATE INDEX IF NOT EXISTS idx_contacts_friend
            ON contacts(friend_id);

        -- Ledger of points credited for completions and reward payouts.
        -- Backs the rolling per-period reward cap.
        CREATE TABLE IF NOT EXISTS point_awards (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id     TEXT NOT NULL REFERENCES users(id),
            points      INTEGER NOT NULL,
            awarded_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_point_awards_user
            ON point_awards(user_id, awarded_at);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
