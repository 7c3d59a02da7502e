use crate::errors::{AppError, AppResult};
use crate::models::{PageContent, PageStyles, Session, TextAlign, TextStyle, User, Workspace, WorkspaceUpdate};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use uuid::Uuid;

const SCHEMA_SQL: &str = include_str!("schema.sql");

#[derive(Debug)]
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn new(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| AppError::Io(err.to_string()))?;
        }
        let conn = Connection::open(path).map_err(AppError::from)?;
        conn.execute_batch(SCHEMA_SQL).map_err(AppError::from)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // ─── Users & sessions ─────────────────────────────────────────────────────

    pub fn insert_user(&self, username: &str, password_hash: &str) -> AppResult<User> {
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();

        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        conn.execute(
            "INSERT INTO users (id, username, password_hash, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![id, username, password_hash, now.to_rfc3339()],
        )?;

        Ok(User {
            id,
            username: username.to_string(),
            created_at: now,
        })
    }

    pub fn get_user(&self, user_id: &str) -> AppResult<Option<User>> {
        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        conn.query_row(
            "SELECT id, username, created_at FROM users WHERE id = ?1",
            [user_id],
            parse_user_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    /// Returns the user record together with its stored password hash.
    pub fn get_user_auth(&self, username: &str) -> AppResult<Option<(User, String)>> {
        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        conn.query_row(
            "SELECT id, username, created_at, password_hash FROM users WHERE username = ?1",
            [username],
            |row| {
                let user = parse_user_row(row)?;
                let hash: String = row.get(3)?;
                Ok((user, hash))
            },
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn insert_session(&self, user_id: &str, expires_at: DateTime<Utc>) -> AppResult<Session> {
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();

        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        conn.execute(
            "INSERT INTO sessions (id, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
            params![id, user_id, now.to_rfc3339(), expires_at.to_rfc3339()],
        )?;

        Ok(Session {
            id,
            user_id: user_id.to_string(),
            created_at: now,
            expires_at,
        })
    }

    pub fn get_session(&self, session_id: &str) -> AppResult<Option<Session>> {
        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        conn.query_row(
            "SELECT id, user_id, created_at, expires_at FROM sessions WHERE id = ?1",
            [session_id],
            parse_session_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn delete_session(&self, session_id: &str) -> AppResult<()> {
        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        conn.execute("DELETE FROM sessions WHERE id = ?1", [session_id])?;
        Ok(())
    }

    pub fn delete_expired_sessions(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        let changed = conn.execute(
            "DELETE FROM sessions WHERE expires_at < ?1",
            [now.to_rfc3339()],
        )?;
        Ok(changed as u64)
    }

    // ─── Workspaces ───────────────────────────────────────────────────────────

    pub fn insert_workspace(&self, workspace: &Workspace) -> AppResult<()> {
        let pages_json = serde_json::to_string(&workspace.pages)?;
        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        conn.execute(
            "INSERT INTO workspaces (id, owner_id, name, pages_json, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                workspace.id,
                workspace.owner_id,
                workspace.name,
                pages_json,
                workspace.created_at.to_rfc3339(),
                workspace.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_workspace(&self, workspace_id: &str) -> AppResult<Option<Workspace>> {
        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        conn.query_row(
            "SELECT id, owner_id, name, pages_json, created_at, updated_at
             FROM workspaces WHERE id = ?1",
            [workspace_id],
            parse_workspace_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn list_workspaces_by_owner(&self, owner_id: &str) -> AppResult<Vec<Workspace>> {
        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        let mut stmt = conn.prepare(
            "SELECT id, owner_id, name, pages_json, created_at, updated_at
             FROM workspaces WHERE owner_id = ?1 ORDER BY updated_at DESC",
        )?;
        let workspaces = stmt
            .query_map([owner_id], parse_workspace_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(workspaces)
    }

    /// Merges the given fields into the stored record, always refreshing
    /// `updated_at`. Returns false when no record matched.
    pub fn update_workspace(&self, workspace_id: &str, update: &WorkspaceUpdate, now: DateTime<Utc>) -> AppResult<bool> {
        let pages_json = update
            .pages
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        let changed = conn.execute(
            "UPDATE workspaces
             SET name = COALESCE(?1, name),
                 pages_json = COALESCE(?2, pages_json),
                 updated_at = ?3
             WHERE id = ?4",
            params![update.name, pages_json, now.to_rfc3339(), workspace_id],
        )?;
        Ok(changed > 0)
    }

    pub fn set_workspace_pages(&self, workspace_id: &str, pages: &[i64], now: DateTime<Utc>) -> AppResult<bool> {
        let pages_json = serde_json::to_string(pages)?;
        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        let changed = conn.execute(
            "UPDATE workspaces SET pages_json = ?1, updated_at = ?2 WHERE id = ?3",
            params![pages_json, now.to_rfc3339(), workspace_id],
        )?;
        Ok(changed > 0)
    }

    /// Deletes the workspace and every content record referencing it as one
    /// transaction. Returns false when the workspace row did not exist.
    pub fn delete_workspace_cascade(&self, workspace_id: &str) -> AppResult<bool> {
        let mut conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM workspace_contents WHERE workspace_id = ?1",
            [workspace_id],
        )?;
        let changed = tx.execute("DELETE FROM workspaces WHERE id = ?1", [workspace_id])?;
        tx.commit()?;
        Ok(changed > 0)
    }

    // ─── Page contents ────────────────────────────────────────────────────────

    pub fn get_page_content(&self, workspace_id: &str, page_number: i64) -> AppResult<Option<PageContent>> {
        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        conn.query_row(
            "SELECT id, workspace_id, page_number, content, font_family, font_size, font_color,
                    text_align, text_style_json, created_at, updated_at
             FROM workspace_contents WHERE workspace_id = ?1 AND page_number = ?2",
            params![workspace_id, page_number],
            parse_page_content_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn list_page_contents(&self, workspace_id: &str) -> AppResult<Vec<PageContent>> {
        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        let mut stmt = conn.prepare(
            "SELECT id, workspace_id, page_number, content, font_family, font_size, font_color,
                    text_align, text_style_json, created_at, updated_at
             FROM workspace_contents WHERE workspace_id = ?1 ORDER BY page_number ASC",
        )?;
        let contents = stmt
            .query_map([workspace_id], parse_page_content_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(contents)
    }

    pub fn insert_page_content(&self, record: &PageContent) -> AppResult<()> {
        let text_style_json = serde_json::to_string(&record.text_style)?;
        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        conn.execute(
            "INSERT INTO workspace_contents (
               id, workspace_id, page_number, content, font_family, font_size, font_color,
               text_align, text_style_json, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                record.id,
                record.workspace_id,
                record.page_number,
                record.content,
                record.font_family,
                record.font_size,
                record.font_color,
                record.text_align.as_str(),
                text_style_json,
                record.created_at.to_rfc3339(),
                record.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Replaces the mutable fields of an existing content record, keeping its
    /// identity and `created_at`.
    pub fn update_page_content(
        &self,
        content_id: &str,
        content: &str,
        styles: &PageStyles,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let text_style_json = serde_json::to_string(&styles.text_style)?;
        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        let changed = conn.execute(
            "UPDATE workspace_contents
             SET content = ?1, font_family = ?2, font_size = ?3, font_color = ?4,
                 text_align = ?5, text_style_json = ?6, updated_at = ?7
             WHERE id = ?8",
            params![
                content,
                styles.font_family,
                styles.font_size,
                styles.font_color,
                styles.text_align.as_str(),
                text_style_json,
                now.to_rfc3339(),
                content_id,
            ],
        )?;
        Ok(changed > 0)
    }

    /// Idempotent: deleting an absent record is not an error.
    pub fn delete_page_content(&self, workspace_id: &str, page_number: i64) -> AppResult<u64> {
        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        let changed = conn.execute(
            "DELETE FROM workspace_contents WHERE workspace_id = ?1 AND page_number = ?2",
            params![workspace_id, page_number],
        )?;
        Ok(changed as u64)
    }

    /// Inserts the workspace and all of its content records as one
    /// transaction, so a failure leaves no partial import behind.
    pub fn import_workspace(&self, workspace: &Workspace, contents: &[PageContent]) -> AppResult<()> {
        let pages_json = serde_json::to_string(&workspace.pages)?;

        let mut conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO workspaces (id, owner_id, name, pages_json, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                workspace.id,
                workspace.owner_id,
                workspace.name,
                pages_json,
                workspace.created_at.to_rfc3339(),
                workspace.updated_at.to_rfc3339(),
            ],
        )?;
        for record in contents {
            let text_style_json = serde_json::to_string(&record.text_style)?;
            tx.execute(
                "INSERT INTO workspace_contents (
                   id, workspace_id, page_number, content, font_family, font_size, font_color,
                   text_align, text_style_json, created_at, updated_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    record.id,
                    record.workspace_id,
                    record.page_number,
                    record.content,
                    record.font_family,
                    record.font_size,
                    record.font_color,
                    record.text_align.as_str(),
                    text_style_json,
                    record.created_at.to_rfc3339(),
                    record.updated_at.to_rfc3339(),
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}

fn parse_user_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        created_at: parse_time(&row.get::<_, String>(2)?)?,
    })
}

fn parse_session_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        id: row.get(0)?,
        user_id: row.get(1)?,
        created_at: parse_time(&row.get::<_, String>(2)?)?,
        expires_at: parse_time(&row.get::<_, String>(3)?)?,
    })
}

fn parse_workspace_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Workspace> {
    let pages_raw: String = row.get(3)?;
    Ok(Workspace {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        name: row.get(2)?,
        pages: serde_json::from_str::<Vec<i64>>(&pages_raw).unwrap_or_default(),
        created_at: parse_time(&row.get::<_, String>(4)?)?,
        updated_at: parse_time(&row.get::<_, String>(5)?)?,
    })
}

fn parse_page_content_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PageContent> {
    let text_style_raw: String = row.get(8)?;
    Ok(PageContent {
        id: row.get(0)?,
        workspace_id: row.get(1)?,
        page_number: row.get(2)?,
        content: row.get(3)?,
        font_family: row.get(4)?,
        font_size: row.get(5)?,
        font_color: row.get(6)?,
        text_align: parse_text_align(&row.get::<_, String>(7)?),
        text_style: serde_json::from_str::<TextStyle>(&text_style_raw).unwrap_or_default(),
        created_at: parse_time(&row.get::<_, String>(9)?)?,
        updated_at: parse_time(&row.get::<_, String>(10)?)?,
    })
}

fn parse_text_align(raw: &str) -> TextAlign {
    match raw {
        "left" => TextAlign::Left,
        "center" => TextAlign::Center,
        "right" => TextAlign::Right,
        "justify" => TextAlign::Justify,
        _ => TextAlign::Left,
    }
}

fn parse_time(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|error| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, error.to_string())),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::Database;
    use crate::models::{PageContent, PageStyles, TextAlign, TextStyle, Workspace, WorkspaceUpdate};
    use chrono::Utc;

    fn sample_workspace(id: &str, owner_id: &str) -> Workspace {
        let now = Utc::now();
        Workspace {
            id: id.to_string(),
            owner_id: owner_id.to_string(),
            name: "My Journal".to_string(),
            pages: vec![1],
            created_at: now,
            updated_at: now,
        }
    }

    fn sample_content(id: &str, workspace_id: &str, page_number: i64) -> PageContent {
        let now = Utc::now();
        PageContent {
            id: id.to_string(),
            workspace_id: workspace_id.to_string(),
            page_number,
            content: "first entry".to_string(),
            font_family: "Crimson Text".to_string(),
            font_size: "16px".to_string(),
            font_color: "#000000".to_string(),
            text_align: TextAlign::Left,
            text_style: TextStyle::default(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn database_can_insert_and_read_workspace() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("test.db")).expect("db");

        db.insert_workspace(&sample_workspace("ws-1", "user-1"))
            .expect("insert workspace");

        let loaded = db.get_workspace("ws-1").expect("get").expect("exists");
        assert_eq!(loaded.owner_id, "user-1");
        assert_eq!(loaded.pages, vec![1]);
        assert!(db.get_workspace("ws-missing").expect("get").is_none());
    }

    #[test]
    fn list_workspaces_by_owner_filters_and_sorts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("test.db")).expect("db");

        db.insert_workspace(&sample_workspace("ws-a", "user-1")).expect("insert");
        db.insert_workspace(&sample_workspace("ws-b", "user-1")).expect("insert");
        db.insert_workspace(&sample_workspace("ws-c", "user-2")).expect("insert");

        db.update_workspace(
            "ws-a",
            &WorkspaceUpdate {
                name: Some("Touched".to_string()),
                pages: None,
            },
            Utc::now(),
        )
        .expect("update");

        let mine = db.list_workspaces_by_owner("user-1").expect("list");
        assert_eq!(mine.len(), 2);
        assert_eq!(mine[0].id, "ws-a");
        assert_eq!(mine[0].name, "Touched");
    }

    #[test]
    fn update_workspace_reports_missing_record() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("test.db")).expect("db");

        let changed = db
            .update_workspace("ws-missing", &WorkspaceUpdate::default(), Utc::now())
            .expect("update");
        assert!(!changed);
    }

    #[test]
    fn delete_workspace_cascade_removes_contents() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("test.db")).expect("db");

        db.insert_workspace(&sample_workspace("ws-1", "user-1")).expect("insert");
        db.insert_page_content(&sample_content("c-1", "ws-1", 1)).expect("insert content");
        db.insert_page_content(&sample_content("c-2", "ws-1", 2)).expect("insert content");

        let deleted = db.delete_workspace_cascade("ws-1").expect("cascade");
        assert!(deleted);
        assert!(db.get_workspace("ws-1").expect("get").is_none());
        assert!(db.list_page_contents("ws-1").expect("list").is_empty());

        let again = db.delete_workspace_cascade("ws-1").expect("cascade");
        assert!(!again);
    }

    #[test]
    fn page_content_is_unique_per_workspace_and_page() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("test.db")).expect("db");

        db.insert_workspace(&sample_workspace("ws-1", "user-1")).expect("insert");
        db.insert_page_content(&sample_content("c-1", "ws-1", 1)).expect("insert content");

        let duplicate = db.insert_page_content(&sample_content("c-2", "ws-1", 1));
        assert!(duplicate.is_err());

        // The same page number in another workspace is fine.
        db.insert_workspace(&sample_workspace("ws-2", "user-1")).expect("insert");
        db.insert_page_content(&sample_content("c-3", "ws-2", 1)).expect("insert content");
    }

    #[test]
    fn update_page_content_replaces_styles_in_place() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("test.db")).expect("db");

        db.insert_workspace(&sample_workspace("ws-1", "user-1")).expect("insert");
        db.insert_page_content(&sample_content("c-1", "ws-1", 1)).expect("insert content");

        let styles = PageStyles {
            font_color: "#ff0000".to_string(),
            text_align: TextAlign::Center,
            text_style: TextStyle {
                italic: true,
                ..TextStyle::default()
            },
            ..PageStyles::default()
        };
        let changed = db
            .update_page_content("c-1", "rewritten", &styles, Utc::now())
            .expect("update");
        assert!(changed);

        let loaded = db.get_page_content("ws-1", 1).expect("get").expect("exists");
        assert_eq!(loaded.id, "c-1");
        assert_eq!(loaded.content, "rewritten");
        assert_eq!(loaded.font_color, "#ff0000");
        assert_eq!(loaded.text_align, TextAlign::Center);
        assert!(loaded.text_style.italic);
    }

    #[test]
    fn delete_page_content_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("test.db")).expect("db");

        db.insert_workspace(&sample_workspace("ws-1", "user-1")).expect("insert");
        db.insert_page_content(&sample_content("c-1", "ws-1", 1)).expect("insert content");

        assert_eq!(db.delete_page_content("ws-1", 1).expect("delete"), 1);
        assert_eq!(db.delete_page_content("ws-1", 1).expect("delete"), 0);
    }

    #[test]
    fn import_workspace_is_atomic() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("test.db")).expect("db");

        let workspace = sample_workspace("ws-import", "user-1");
        let contents = vec![
            sample_content("c-1", "ws-import", 1),
            // Duplicate page number violates the unique index and must roll
            // back the workspace insert as well.
            sample_content("c-2", "ws-import", 1),
        ];

        let result = db.import_workspace(&workspace, &contents);
        assert!(result.is_err());
        assert!(db.get_workspace("ws-import").expect("get").is_none());
        assert!(db.list_page_contents("ws-import").expect("list").is_empty());
    }

    #[test]
    fn unknown_text_align_falls_back_to_left() {
        assert_eq!(super::parse_text_align("weird"), TextAlign::Left);
        assert_eq!(super::parse_text_align("justify"), TextAlign::Justify);
    }

    #[test]
    fn user_usernames_are_unique() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("test.db")).expect("db");

        db.insert_user("margot", "hash-a").expect("insert user");
        assert!(db.insert_user("margot", "hash-b").is_err());

        let (user, hash) = db
            .get_user_auth("margot")
            .expect("get auth")
            .expect("exists");
        assert_eq!(hash, "hash-a");
        assert_eq!(db.get_user(&user.id).expect("get").expect("exists").username, "margot");
    }

    #[test]
    fn expired_sessions_are_pruned() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("test.db")).expect("db");

        let user = db.insert_user("margot", "hash").expect("insert user");
        let stale = db
            .insert_session(&user.id, Utc::now() - chrono::Duration::hours(1))
            .expect("insert session");
        let live = db
            .insert_session(&user.id, Utc::now() + chrono::Duration::hours(1))
            .expect("insert session");

        let pruned = db.delete_expired_sessions(Utc::now()).expect("prune");
        assert_eq!(pruned, 1);
        assert!(db.get_session(&stale.id).expect("get").is_none());
        assert!(db.get_session(&live.id).expect("get").is_some());
    }
}
