use crate::db::Database;
use crate::errors::{AppError, AppResult};
use crate::models::{Session, User};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{Duration, Utc};
use sha2::{Digest, Sha256};
use std::sync::Arc;

const MIN_USERNAME_CHARS: usize = 3;
const MIN_PASSWORD_CHARS: usize = 6;
const SESSION_TTL_DAYS: i64 = 30;

/// Local account and session handling over the same store as the
/// workspace manager. Passwords are stored as `base64(salt)$base64(digest)`
/// with a per-user random salt.
pub struct AuthManager {
    db: Arc<Database>,
}

impl AuthManager {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn register(&self, username: &str, password: &str) -> AppResult<User> {
        let username = username.trim();
        if username.chars().count() < MIN_USERNAME_CHARS {
            return Err(AppError::Policy(format!(
                "Username must be at least {} characters long",
                MIN_USERNAME_CHARS
            )));
        }
        if password.chars().count() < MIN_PASSWORD_CHARS {
            return Err(AppError::Policy(format!(
                "Password must be at least {} characters long",
                MIN_PASSWORD_CHARS
            )));
        }
        if self.db.get_user_auth(username)?.is_some() {
            return Err(AppError::Policy(format!("Username '{}' already exists", username)));
        }

        self.db.insert_user(username, &hash_password(password))
    }

    /// Unknown usernames and wrong passwords fail with the same error shape.
    pub fn login(&self, username: &str, password: &str) -> AppResult<Session> {
        let Some((user, stored_hash)) = self.db.get_user_auth(username.trim())? else {
            return Err(invalid_credentials());
        };
        if !verify_password(password, &stored_hash) {
            return Err(invalid_credentials());
        }

        self.db.delete_expired_sessions(Utc::now())?;
        self.db
            .insert_session(&user.id, Utc::now() + Duration::days(SESSION_TTL_DAYS))
    }

    /// Expired and unknown tokens read as absent; an expired row is removed
    /// on the way out.
    pub fn validate_session(&self, session_id: &str) -> AppResult<Option<User>> {
        let Some(session) = self.db.get_session(session_id)? else {
            return Ok(None);
        };
        if session.expires_at <= Utc::now() {
            self.db.delete_session(&session.id)?;
            return Ok(None);
        }
        self.db.get_user(&session.user_id)
    }

    /// Idempotent: logging out an unknown token is a no-op.
    pub fn logout(&self, session_id: &str) -> AppResult<()> {
        self.db.delete_session(session_id)
    }
}

fn hash_password(password: &str) -> String {
    let salt: [u8; 16] = rand::random();
    format!("{}${}", BASE64.encode(salt), BASE64.encode(digest(&salt, password)))
}

fn digest(salt: &[u8], password: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hasher.finalize().to_vec()
}

fn verify_password(password: &str, stored: &str) -> bool {
    let Some((salt_raw, digest_raw)) = stored.split_once('$') else {
        return false;
    };
    let Ok(salt) = BASE64.decode(salt_raw) else {
        return false;
    };
    let Ok(expected) = BASE64.decode(digest_raw) else {
        return false;
    };
    digest(&salt, password) == expected
}

fn invalid_credentials() -> AppError {
    AppError::Policy("Invalid username or password".to_string())
}

#[cfg(test)]
mod tests {
    use super::AuthManager;
    use crate::db::Database;
    use crate::errors::AppError;
    use std::sync::Arc;

    fn auth(dir: &tempfile::TempDir) -> AuthManager {
        let db = Database::new(&dir.path().join("journal.db")).expect("db");
        AuthManager::new(Arc::new(db))
    }

    #[test]
    fn register_then_login_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let auth = auth(&dir);

        let user = auth.register("margot", "hunter22").expect("register");
        assert_eq!(user.username, "margot");

        let session = auth.login("margot", "hunter22").expect("login");
        assert_eq!(session.user_id, user.id);
        assert!(session.expires_at > session.created_at);

        let validated = auth
            .validate_session(&session.id)
            .expect("validate")
            .expect("active");
        assert_eq!(validated.id, user.id);
    }

    #[test]
    fn register_enforces_minimum_lengths() {
        let dir = tempfile::tempdir().expect("tempdir");
        let auth = auth(&dir);

        assert!(matches!(auth.register("mo", "hunter22"), Err(AppError::Policy(_))));
        assert!(matches!(auth.register("margot", "short"), Err(AppError::Policy(_))));
    }

    #[test]
    fn duplicate_usernames_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let auth = auth(&dir);

        auth.register("margot", "hunter22").expect("register");
        assert!(matches!(
            auth.register("margot", "different-password"),
            Err(AppError::Policy(_))
        ));
    }

    #[test]
    fn login_rejects_bad_credentials_uniformly() {
        let dir = tempfile::tempdir().expect("tempdir");
        let auth = auth(&dir);

        auth.register("margot", "hunter22").expect("register");

        let wrong_password = auth.login("margot", "wrong-password");
        let unknown_user = auth.login("nobody", "hunter22");
        assert!(matches!(wrong_password, Err(AppError::Policy(_))));
        assert!(matches!(unknown_user, Err(AppError::Policy(_))));
    }

    #[test]
    fn stored_hashes_are_salted() {
        let a = super::hash_password("hunter22");
        let b = super::hash_password("hunter22");
        assert_ne!(a, b);
        assert!(super::verify_password("hunter22", &a));
        assert!(super::verify_password("hunter22", &b));
        assert!(!super::verify_password("hunter23", &a));
        assert!(!super::verify_password("hunter22", "not-a-stored-hash"));
    }

    #[test]
    fn logout_invalidates_the_session_and_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let auth = auth(&dir);

        auth.register("margot", "hunter22").expect("register");
        let session = auth.login("margot", "hunter22").expect("login");

        auth.logout(&session.id).expect("logout");
        assert!(auth.validate_session(&session.id).expect("validate").is_none());
        auth.logout(&session.id).expect("logout again");
    }

    #[test]
    fn unknown_sessions_read_as_absent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let auth = auth(&dir);
        assert!(auth.validate_session("no-such-token").expect("validate").is_none());
    }
}
