use crate::models::{EchoRow, ProfileRow, UserRow, WaveRow};
use crate::{Database, format_timestamp};
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row};

/// Column values for a new `users` row. `password_hash` must already be hashed.
pub struct NewAccount<'a> {
    pub id: &'a str,
    pub username: &'a str,
    pub password_hash: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub email: &'a str,
}

const USER_COLUMNS: &str = "u.id, u.username, u.password, u.first_name, u.last_name, u.email, u.created_at";

const ECHO_SELECT: &str = "SELECT e.id, e.user_id, u.username, e.content, e.created_at, e.updated_at
     FROM echos e
     JOIN users u ON e.user_id = u.id";

const WAVE_SELECT: &str = "SELECT w.id, w.echo_id, w.user_id, u.username, w.content, w.created_at, w.updated_at
     FROM waves w
     JOIN users u ON w.user_id = u.id";

/// SQLite treats a negative LIMIT as "no limit".
fn sql_limit(limit: Option<u32>) -> i64 {
    limit.map(i64::from).unwrap_or(-1)
}

impl Database {
    // -- Users --

    /// Inserts a user and its default profile in one transaction.
    pub fn create_user_with_profile(
        &self,
        account: &NewAccount<'_>,
        joined_at: DateTime<Utc>,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            insert_user(&tx, account, joined_at)?;
            tx.execute("INSERT INTO profiles (user_id) VALUES (?1)", [account.id])?;
            tx.commit()?;
            Ok(())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM users u WHERE u.username = ?1", USER_COLUMNS);
            conn.query_row(&sql, [username], user_from_row).optional()
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM users u WHERE u.id = ?1", USER_COLUMNS);
            conn.query_row(&sql, [id], user_from_row).optional()
        })
    }

    pub fn username_exists(&self, username: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM users WHERE username = ?1",
                [username],
                |r| r.get(0),
            )?;
            Ok(n > 0)
        })
    }

    /// Deletes a user; profile, echos and waves go with it via ON DELETE CASCADE.
    /// Returns false if no such user existed.
    pub fn delete_user(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM users WHERE id = ?1", [id])? > 0))
    }

    // -- Profiles --

    pub fn get_profile_by_username(&self, username: &str) -> Result<Option<ProfileRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {}, p.bio, p.avatar
                 FROM profiles p
                 JOIN users u ON p.user_id = u.id
                 WHERE u.username = ?1",
                USER_COLUMNS
            );
            conn.query_row(&sql, [username], profile_from_row).optional()
        })
    }

    pub fn list_profiles(&self) -> Result<Vec<ProfileRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {}, p.bio, p.avatar
                 FROM profiles p
                 JOIN users u ON p.user_id = u.id
                 ORDER BY u.username",
                USER_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], profile_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Updates bio and, when given, the avatar path. Returns the previous avatar
    /// path, or `None` if the user has no profile.
    pub fn update_profile(
        &self,
        user_id: &str,
        bio: &str,
        avatar: Option<&str>,
    ) -> Result<Option<String>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let previous: Option<String> = tx
                .query_row("SELECT avatar FROM profiles WHERE user_id = ?1", [user_id], |r| {
                    r.get(0)
                })
                .optional()?;

            let Some(previous) = previous else {
                return Ok(None);
            };

            tx.execute(
                "UPDATE profiles SET bio = ?1, avatar = COALESCE(?2, avatar) WHERE user_id = ?3",
                rusqlite::params![bio, avatar, user_id],
            )?;
            tx.commit()?;
            Ok(Some(previous))
        })
    }

    // -- Echos --

    pub fn insert_echo(&self, user_id: &str, content: &str, created_at: DateTime<Utc>) -> Result<i64> {
        let ts = format_timestamp(created_at);
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO echos (user_id, content, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
                rusqlite::params![user_id, content, ts],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_echo(&self, id: i64) -> Result<Option<EchoRow>> {
        self.with_conn(|conn| {
            let sql = format!("{} WHERE e.id = ?1", ECHO_SELECT);
            conn.query_row(&sql, [id], echo_from_row).optional()
        })
    }

    /// Global feed, newest first.
    pub fn list_echos(&self, limit: Option<u32>) -> Result<Vec<EchoRow>> {
        self.with_conn(|conn| {
            let sql = format!("{} ORDER BY e.created_at DESC, e.id DESC LIMIT ?1", ECHO_SELECT);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([sql_limit(limit)], echo_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn list_echos_by_user(&self, user_id: &str, limit: Option<u32>) -> Result<Vec<EchoRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{} WHERE e.user_id = ?1 ORDER BY e.created_at DESC, e.id DESC LIMIT ?2",
                ECHO_SELECT
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params![user_id, sql_limit(limit)], echo_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn count_echos_by_user(&self, user_id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let n: i64 =
                conn.query_row("SELECT COUNT(*) FROM echos WHERE user_id = ?1", [user_id], |r| {
                    r.get(0)
                })?;
            Ok(n as usize)
        })
    }

    /// Replaces the content and refreshes `updated_at`, never moving it before
    /// `created_at`. Returns false if the echo does not exist.
    pub fn update_echo(&self, id: i64, content: &str, updated_at: DateTime<Utc>) -> Result<bool> {
        let ts = format_timestamp(updated_at);
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE echos SET content = ?1, updated_at = MAX(?2, created_at) WHERE id = ?3",
                rusqlite::params![content, ts, id],
            )?;
            Ok(n > 0)
        })
    }

    /// Deletes an echo and, via cascade, all of its waves.
    pub fn delete_echo(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM echos WHERE id = ?1", [id])? > 0))
    }

    // -- Waves --

    pub fn insert_wave(
        &self,
        echo_id: i64,
        user_id: &str,
        content: &str,
        created_at: DateTime<Utc>,
    ) -> Result<i64> {
        let ts = format_timestamp(created_at);
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO waves (echo_id, user_id, content, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                rusqlite::params![echo_id, user_id, content, ts],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_wave(&self, id: i64) -> Result<Option<WaveRow>> {
        self.with_conn(|conn| {
            let sql = format!("{} WHERE w.id = ?1", WAVE_SELECT);
            conn.query_row(&sql, [id], wave_from_row).optional()
        })
    }

    /// Waves of one echo, newest first.
    pub fn list_waves(&self, echo_id: i64, limit: Option<u32>) -> Result<Vec<WaveRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{} WHERE w.echo_id = ?1 ORDER BY w.created_at DESC, w.id DESC LIMIT ?2",
                WAVE_SELECT
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params![echo_id, sql_limit(limit)], wave_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn count_waves(&self, echo_id: i64) -> Result<usize> {
        self.with_conn(|conn| {
            let n: i64 =
                conn.query_row("SELECT COUNT(*) FROM waves WHERE echo_id = ?1", [echo_id], |r| {
                    r.get(0)
                })?;
            Ok(n as usize)
        })
    }

    pub fn update_wave(&self, id: i64, content: &str, updated_at: DateTime<Utc>) -> Result<bool> {
        let ts = format_timestamp(updated_at);
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE waves SET content = ?1, updated_at = MAX(?2, created_at) WHERE id = ?3",
                rusqlite::params![content, ts, id],
            )?;
            Ok(n > 0)
        })
    }

    pub fn delete_wave(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM waves WHERE id = ?1", [id])? > 0))
    }
}

fn insert_user(conn: &Connection, account: &NewAccount<'_>, joined_at: DateTime<Utc>) -> Result<()> {
    conn.execute(
        "INSERT INTO users (id, username, password, first_name, last_name, email, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            account.id,
            account.username,
            account.password_hash,
            account.first_name,
            account.last_name,
            account.email,
            format_timestamp(joined_at),
        ],
    )?;
    Ok(())
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        password: row.get(2)?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
        email: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn profile_from_row(row: &Row<'_>) -> rusqlite::Result<ProfileRow> {
    Ok(ProfileRow {
        user: user_from_row(row)?,
        bio: row.get(7)?,
        avatar: row.get(8)?,
    })
}

fn echo_from_row(row: &Row<'_>) -> rusqlite::Result<EchoRow> {
    Ok(EchoRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        username: row.get(2)?,
        content: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn wave_from_row(row: &Row<'_>) -> rusqlite::Result<WaveRow> {
    Ok(WaveRow {
        id: row.get(0)?,
        echo_id: row.get(1)?,
        user_id: row.get(2)?,
        username: row.get(3)?,
        content: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn account<'a>(id: &'a str, username: &'a str) -> NewAccount<'a> {
        NewAccount {
            id,
            username,
            password_hash: "hash",
            first_name: "Ana",
            last_name: "Tribu",
            email: "ana@example.com",
        }
    }

    fn base_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-01T12:00:00Z").unwrap().with_timezone(&Utc)
    }

    #[test]
    fn signup_creates_user_and_profile() {
        let db = db();
        db.create_user_with_profile(&account("u1", "ana"), base_time()).unwrap();

        let profile = db.get_profile_by_username("ana").unwrap().unwrap();
        assert_eq!(profile.user.id, "u1");
        assert_eq!(profile.bio, "");
        assert_eq!(profile.avatar, tribu_types::models::DEFAULT_AVATAR);
        assert!(db.username_exists("ana").unwrap());
        assert!(!db.username_exists("bob").unwrap());
    }

    #[test]
    fn user_without_profile_is_not_listed() {
        let db = db();
        db.with_conn(|conn| insert_user(conn, &account("u1", "ana"), base_time())).unwrap();
        db.create_user_with_profile(&account("u2", "bob"), base_time()).unwrap();

        assert!(db.get_user_by_username("ana").unwrap().is_some());
        assert!(db.get_profile_by_username("ana").unwrap().is_none());

        let names: Vec<_> = db.list_profiles().unwrap().into_iter().map(|p| p.user.username).collect();
        assert_eq!(names, ["bob"]);

        db.with_conn(|conn| Ok(conn.execute("INSERT INTO profiles (user_id) VALUES ('u1')", [])?))
            .unwrap();
        assert_eq!(db.list_profiles().unwrap().len(), 2);
    }

    #[test]
    fn duplicate_username_is_rejected() {
        let db = db();
        db.create_user_with_profile(&account("u1", "ana"), base_time()).unwrap();
        let err = db.create_user_with_profile(&account("u2", "ana"), base_time()).unwrap_err();
        assert!(crate::is_unique_violation(&err));
        assert!(!crate::is_unique_violation(&anyhow::anyhow!("unrelated")));
        // the failed signup must not leave an orphan profile behind
        assert!(db.get_user_by_id("u2").unwrap().is_none());
    }

    #[test]
    fn echos_are_listed_newest_first() {
        let db = db();
        db.create_user_with_profile(&account("u1", "ana"), base_time()).unwrap();

        // inserted out of chronological order on purpose
        let middle = db.insert_echo("u1", "middle", base_time() + Duration::minutes(5)).unwrap();
        let oldest = db.insert_echo("u1", "oldest", base_time()).unwrap();
        let newest = db.insert_echo("u1", "newest", base_time() + Duration::minutes(10)).unwrap();

        let ids: Vec<_> = db.list_echos(None).unwrap().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, [newest, middle, oldest]);

        let limited: Vec<_> = db.list_echos(Some(2)).unwrap().into_iter().map(|e| e.id).collect();
        assert_eq!(limited, [newest, middle]);
    }

    #[test]
    fn equal_timestamps_fall_back_to_reverse_insertion_order() {
        let db = db();
        db.create_user_with_profile(&account("u1", "ana"), base_time()).unwrap();
        let echo = db.insert_echo("u1", "echo", base_time()).unwrap();

        let first = db.insert_wave(echo, "u1", "first", base_time()).unwrap();
        let second = db.insert_wave(echo, "u1", "second", base_time()).unwrap();
        let third = db.insert_wave(echo, "u1", "third", base_time()).unwrap();

        let ids: Vec<_> = db.list_waves(echo, None).unwrap().into_iter().map(|w| w.id).collect();
        assert_eq!(ids, [third, second, first]);
    }

    #[test]
    fn user_echos_are_scoped_and_counted() {
        let db = db();
        db.create_user_with_profile(&account("u1", "ana"), base_time()).unwrap();
        db.create_user_with_profile(&account("u2", "bob"), base_time()).unwrap();
        for i in 0..7 {
            db.insert_echo("u1", &format!("ana {}", i), base_time() + Duration::seconds(i)).unwrap();
        }
        db.insert_echo("u2", "bob 0", base_time()).unwrap();

        assert_eq!(db.list_echos(None).unwrap().len(), 8);
        assert_eq!(db.count_echos_by_user("u1").unwrap(), 7);
        let latest = db.list_echos_by_user("u1", Some(5)).unwrap();
        assert_eq!(latest.len(), 5);
        assert_eq!(latest[0].content, "ana 6");
        assert!(latest.iter().all(|e| e.username == "ana"));
    }

    #[test]
    fn update_refreshes_updated_at_but_never_before_created_at() {
        let db = db();
        db.create_user_with_profile(&account("u1", "ana"), base_time()).unwrap();
        let id = db.insert_echo("u1", "before", base_time()).unwrap();

        let later = base_time() + Duration::hours(1);
        assert!(db.update_echo(id, "after", later).unwrap());
        let echo = db.get_echo(id).unwrap().unwrap().into_model();
        assert_eq!(echo.content, "after");
        assert_eq!(echo.updated_at, later);
        assert_eq!(echo.created_at, base_time());

        // a clock that went backwards must not break updated_at >= created_at
        assert!(db.update_echo(id, "skewed", base_time() - Duration::hours(1)).unwrap());
        let echo = db.get_echo(id).unwrap().unwrap().into_model();
        assert!(echo.updated_at >= echo.created_at);

        assert!(!db.update_echo(9999, "missing", later).unwrap());
    }

    #[test]
    fn wave_update_keeps_parent() {
        let db = db();
        db.create_user_with_profile(&account("u1", "ana"), base_time()).unwrap();
        let echo = db.insert_echo("u1", "echo", base_time()).unwrap();
        let wave = db.insert_wave(echo, "u1", "hi", base_time()).unwrap();

        assert!(db.update_wave(wave, "hello", base_time() + Duration::minutes(1)).unwrap());
        let row = db.get_wave(wave).unwrap().unwrap();
        assert_eq!(row.content, "hello");
        assert_eq!(row.echo_id, echo);
    }

    #[test]
    fn deleting_echo_removes_its_waves() {
        let db = db();
        db.create_user_with_profile(&account("u1", "ana"), base_time()).unwrap();
        let doomed = db.insert_echo("u1", "doomed", base_time()).unwrap();
        let kept = db.insert_echo("u1", "kept", base_time()).unwrap();
        for _ in 0..3 {
            db.insert_wave(doomed, "u1", "reply", base_time()).unwrap();
        }
        db.insert_wave(kept, "u1", "reply", base_time()).unwrap();

        assert!(db.delete_echo(doomed).unwrap());
        assert_eq!(db.count_waves(doomed).unwrap(), 0);
        assert_eq!(db.count_waves(kept).unwrap(), 1);
        assert!(!db.delete_echo(doomed).unwrap());
    }

    #[test]
    fn deleting_user_cascades_to_everything_they_own() {
        let db = db();
        db.create_user_with_profile(&account("u1", "ana"), base_time()).unwrap();
        db.create_user_with_profile(&account("u2", "bob"), base_time()).unwrap();
        let ana_echo = db.insert_echo("u1", "ana", base_time()).unwrap();
        let bob_echo = db.insert_echo("u2", "bob", base_time()).unwrap();
        db.insert_wave(bob_echo, "u1", "ana replies", base_time()).unwrap();
        db.insert_wave(ana_echo, "u2", "bob replies", base_time()).unwrap();

        assert!(db.delete_user("u1").unwrap());

        assert!(db.get_profile_by_username("ana").unwrap().is_none());
        assert!(db.get_echo(ana_echo).unwrap().is_none());
        assert_eq!(db.list_echos(None).unwrap().len(), 1);
        assert_eq!(db.count_waves(bob_echo).unwrap(), 0);
        let remaining: i64 = db
            .with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM waves", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(remaining, 0);
    }

    #[test]
    fn update_profile_returns_previous_avatar() {
        let db = db();
        db.create_user_with_profile(&account("u1", "ana"), base_time()).unwrap();

        let previous = db.update_profile("u1", "new bio", Some("avatars/a.png")).unwrap();
        assert_eq!(previous.as_deref(), Some(tribu_types::models::DEFAULT_AVATAR));

        // bio-only update keeps the avatar
        let previous = db.update_profile("u1", "other bio", None).unwrap();
        assert_eq!(previous.as_deref(), Some("avatars/a.png"));
        let profile = db.get_profile_by_username("ana").unwrap().unwrap();
        assert_eq!(profile.bio, "other bio");
        assert_eq!(profile.avatar, "avatars/a.png");

        assert!(db.update_profile("missing", "bio", None).unwrap().is_none());
    }

    #[test]
    fn waves_require_an_existing_echo() {
        let db = db();
        db.create_user_with_profile(&account("u1", "ana"), base_time()).unwrap();
        assert!(db.insert_wave(42, "u1", "orphan", base_time()).is_err());
    }
}
