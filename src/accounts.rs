use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rand::Rng;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

const USERS: TableDefinition<&str, &[u8]> = TableDefinition::new("users");
const SETTINGS: TableDefinition<&str, &str> = TableDefinition::new("settings");

const SALT_LEN: usize = 16;

pub const DEFAULT_ADMIN_USERNAME: &str = "admin";
pub const DEFAULT_ADMIN_PASSWORD: &str = "admin123";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Student,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Student => "student",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "student" => Ok(Role::Student),
            _ => Err(Error::NotFound {
                kind: "role",
                name: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub email: String,
    pub role: Role,
    pub password_hash: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_login: Option<DateTime<Utc>>,
}

/// User accounts plus a small settings table, both in one redb file.
///
/// Opening the database seeds the default admin account when no users
/// exist, so a fresh install can ingest immediately.
pub struct AccountsDb {
    db: Database,
}

impl AccountsDb {
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path)?;

        let txn = db.begin_write()?;
        txn.open_table(USERS)?;
        txn.open_table(SETTINGS)?;
        txn.commit()?;

        let accounts = Self { db };
        accounts.ensure_default_admin()?;
        Ok(accounts)
    }

    fn ensure_default_admin(&self) -> Result<()> {
        if !self.list_users()?.is_empty() {
            return Ok(());
        }
        tracing::info!("creating default admin user");
        self.create_user(
            DEFAULT_ADMIN_USERNAME,
            "admin@college.edu",
            Role::Admin,
            DEFAULT_ADMIN_PASSWORD,
        )
    }

    // -- Users --

    pub fn create_user(
        &self,
        username: &str,
        email: &str,
        role: Role,
        password: &str,
    ) -> Result<()> {
        if username.trim().is_empty() {
            return Err(Error::Config("username must not be empty".into()));
        }

        let existing = self.list_users()?;
        if existing
            .iter()
            .any(|u| u.username == username || u.email == email)
        {
            return Err(Error::Config(format!(
                "user or email already exists: {username}"
            )));
        }

        let user = User {
            username: username.to_string(),
            email: email.to_string(),
            role,
            password_hash: hash_password(password),
            is_active: true,
            created_at: Utc::now(),
            last_login: None,
        };
        self.put_user(&user)?;
        tracing::info!(username, %role, "user created");
        Ok(())
    }

    pub fn get_user(&self, username: &str) -> Result<Option<User>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(USERS)?;
        let Some(guard) = table.get(username)? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_slice(guard.value())?))
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(USERS)?;
        let mut result = Vec::new();
        for entry in table.iter()? {
            let (_, v) = entry?;
            result.push(serde_json::from_slice(v.value())?);
        }
        Ok(result)
    }

    /// Verify credentials. Returns the user on success, None on a wrong
    /// password, unknown username, or deactivated account. A successful
    /// login updates `last_login`.
    pub fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<User>> {
        let Some(mut user) = self.get_user(username)? else {
            tracing::warn!(username, "authentication failed: unknown user");
            return Ok(None);
        };
        if !user.is_active || !verify_password(password, &user.password_hash) {
            tracing::warn!(username, "authentication failed");
            return Ok(None);
        }

        user.last_login = Some(Utc::now());
        self.put_user(&user)?;
        tracing::info!(username, "user authenticated");
        Ok(Some(user))
    }

    pub fn set_password(&self, username: &str, password: &str) -> Result<()> {
        let mut user =
            self.get_user(username)?.ok_or_else(|| Error::NotFound {
                kind: "user",
                name: username.to_string(),
            })?;
        user.password_hash = hash_password(password);
        self.put_user(&user)?;
        tracing::info!(username, "password updated");
        Ok(())
    }

    pub fn deactivate_user(&self, username: &str) -> Result<()> {
        let mut user =
            self.get_user(username)?.ok_or_else(|| Error::NotFound {
                kind: "user",
                name: username.to_string(),
            })?;
        user.is_active = false;
        self.put_user(&user)?;
        tracing::info!(username, "user deactivated");
        Ok(())
    }

    fn put_user(&self, user: &User) -> Result<()> {
        let bytes = serde_json::to_vec(user)?;
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(USERS)?;
            table.insert(user.username.as_str(), bytes.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    // -- Settings --

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(SETTINGS)?;
            table.insert(key, value)?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(SETTINGS)?;
        Ok(table.get(key)?.map(|v| v.value().to_string()))
    }

    pub fn remove_setting(&self, key: &str) -> Result<bool> {
        let txn = self.db.begin_write()?;
        let removed = {
            let mut table = txn.open_table(SETTINGS)?;
            table.remove(key)?.is_some()
        };
        txn.commit()?;
        Ok(removed)
    }
}

impl std::fmt::Debug for AccountsDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountsDb").finish_non_exhaustive()
    }
}

/// Salted SHA-256, stored as `salt$hexdigest`.
fn hash_password(password: &str) -> String {
    let salt: String = rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(SALT_LEN)
        .map(char::from)
        .collect();
    format!("{salt}${}", digest(&salt, password))
}

fn verify_password(password: &str, stored: &str) -> bool {
    let Some((salt, expected)) = stored.split_once('$') else {
        return false;
    };
    digest(salt, password) == expected
}

fn digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> (tempfile::TempDir, AccountsDb) {
        let tmp = tempfile::tempdir().unwrap();
        let db = AccountsDb::open(&tmp.path().join("accounts.redb")).unwrap();
        (tmp, db)
    }

    #[test]
    fn fresh_db_seeds_default_admin() {
        let (_tmp, db) = test_db();

        let admin = db.get_user(DEFAULT_ADMIN_USERNAME).unwrap().unwrap();
        assert_eq!(admin.role, Role::Admin);
        assert!(admin.is_active);

        let authed = db
            .authenticate(DEFAULT_ADMIN_USERNAME, DEFAULT_ADMIN_PASSWORD)
            .unwrap();
        assert!(authed.is_some());
    }

    #[test]
    fn create_and_authenticate_user() {
        let (_tmp, db) = test_db();

        db.create_user("alice", "alice@college.edu", Role::Student, "hunter22")
            .unwrap();

        let user = db.authenticate("alice", "hunter22").unwrap().unwrap();
        assert_eq!(user.role, Role::Student);
        assert!(user.last_login.is_some());

        assert!(db.authenticate("alice", "wrong").unwrap().is_none());
        assert!(db.authenticate("nobody", "hunter22").unwrap().is_none());
    }

    #[test]
    fn duplicate_username_or_email_rejected() {
        let (_tmp, db) = test_db();

        db.create_user("bob", "bob@college.edu", Role::Student, "pw")
            .unwrap();
        assert!(
            db.create_user("bob", "other@college.edu", Role::Student, "pw")
                .is_err()
        );
        assert!(
            db.create_user("bobby", "bob@college.edu", Role::Student, "pw")
                .is_err()
        );
    }

    #[test]
    fn set_password_changes_login() {
        let (_tmp, db) = test_db();

        db.create_user("carol", "carol@college.edu", Role::Student, "old")
            .unwrap();
        db.set_password("carol", "new").unwrap();

        assert!(db.authenticate("carol", "old").unwrap().is_none());
        assert!(db.authenticate("carol", "new").unwrap().is_some());
    }

    #[test]
    fn deactivated_user_cannot_authenticate() {
        let (_tmp, db) = test_db();

        db.create_user("dave", "dave@college.edu", Role::Student, "pw")
            .unwrap();
        db.deactivate_user("dave").unwrap();

        assert!(db.authenticate("dave", "pw").unwrap().is_none());
        assert!(!db.get_user("dave").unwrap().unwrap().is_active);
    }

    #[test]
    fn set_password_unknown_user_errors() {
        let (_tmp, db) = test_db();
        assert!(db.set_password("ghost", "pw").is_err());
    }

    #[test]
    fn hashes_are_salted() {
        let a = hash_password("same");
        let b = hash_password("same");
        assert_ne!(a, b);
        assert!(verify_password("same", &a));
        assert!(verify_password("same", &b));
        assert!(!verify_password("different", &a));
    }

    #[test]
    fn settings_crud() {
        let (_tmp, db) = test_db();

        assert_eq!(db.get_setting("model_id").unwrap(), None);
        db.set_setting("model_id", "custom/model").unwrap();
        assert_eq!(
            db.get_setting("model_id").unwrap(),
            Some("custom/model".to_string())
        );
        assert!(db.remove_setting("model_id").unwrap());
        assert!(!db.remove_setting("model_id").unwrap());
    }

    #[test]
    fn reopen_preserves_users() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("accounts.redb");

        {
            let db = AccountsDb::open(&path).unwrap();
            db.create_user("erin", "erin@college.edu", Role::Admin, "pw")
                .unwrap();
        }

        {
            let db = AccountsDb::open(&path).unwrap();
            let erin = db.get_user("erin").unwrap().unwrap();
            assert_eq!(erin.role, Role::Admin);
            // Reopen with existing users must not re-seed anything.
            assert_eq!(db.list_users().unwrap().len(), 2);
        }
    }
}
