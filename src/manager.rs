use crate::db::Database;
use crate::errors::{AppError, AppResult};
use crate::models::{
    ImportedPageRecord, PageContent, PageData, PageDraft, Workspace, WorkspaceAudit, WorkspaceUpdate,
};
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use uuid::Uuid;

/// Workspace content manager: pages within a workspace, their content, and
/// per-page style metadata. Holds the store it was constructed with; there
/// is no global connection handle.
pub struct WorkspaceManager {
    db: Arc<Database>,
}

impl WorkspaceManager {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    // ─── Workspace lifecycle ──────────────────────────────────────────────────

    /// Every workspace starts with page 1 reserved.
    pub fn create_workspace(&self, owner_id: &str, name: &str) -> AppResult<Workspace> {
        let now = Utc::now();
        let workspace = Workspace {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            name: name.to_string(),
            pages: vec![1],
            created_at: now,
            updated_at: now,
        };
        self.db.insert_workspace(&workspace)?;
        Ok(workspace)
    }

    pub fn user_workspaces(&self, owner_id: &str) -> AppResult<Vec<Workspace>> {
        self.db.list_workspaces_by_owner(owner_id)
    }

    pub fn workspace(&self, workspace_id: &str) -> AppResult<Option<Workspace>> {
        self.db.get_workspace(workspace_id)
    }

    pub fn update_workspace(&self, workspace_id: &str, update: WorkspaceUpdate) -> AppResult<Workspace> {
        let now = Utc::now();
        if !self.db.update_workspace(workspace_id, &update, now)? {
            return Err(AppError::NotFound(format!("Workspace '{}' not found", workspace_id)));
        }
        self.db
            .get_workspace(workspace_id)?
            .ok_or_else(|| AppError::Internal(format!("Workspace '{}' vanished after update", workspace_id)))
    }

    /// Cascading delete of the workspace and all of its page content, as one
    /// atomic unit. Deleting an absent workspace is not an error.
    pub fn delete_workspace(&self, workspace_id: &str) -> AppResult<()> {
        self.db.delete_workspace_cascade(workspace_id)?;
        Ok(())
    }

    // ─── Page content access ──────────────────────────────────────────────────

    /// Unique (workspace, page) lookup. A stored record whose key fields do
    /// not match the request exactly is treated as absent.
    pub fn page_content(&self, workspace_id: &str, page_number: i64) -> AppResult<Option<PageContent>> {
        let Some(record) = self.db.get_page_content(workspace_id, page_number)? else {
            return Ok(None);
        };
        if record.page_number != page_number || record.workspace_id != workspace_id {
            tracing::warn!(
                workspace_id,
                requested = page_number,
                stored = record.page_number,
                "page content lookup returned a mismatched record"
            );
            return Ok(None);
        }
        Ok(Some(record))
    }

    /// Creates or updates the content record for a page, listing the page in
    /// the workspace's page set first. Omitted style fields fall back to the
    /// defaults. The window between the page-list update and the content
    /// write is tolerated by the readers, which return defaults for a listed
    /// page with no record.
    pub fn save_page_content(&self, workspace_id: &str, page_number: i64, draft: PageDraft) -> AppResult<PageContent> {
        if page_number < 1 {
            return Err(AppError::Policy(format!(
                "Page numbers are 1-based, got {}",
                page_number
            )));
        }

        let workspace = self.require_workspace(workspace_id)?;
        if !workspace.pages.contains(&page_number) {
            let mut pages = workspace.pages;
            pages.push(page_number);
            pages.sort_unstable();
            self.db.set_workspace_pages(workspace_id, &pages, Utc::now())?;
        }

        let styles = draft.styles.resolve();
        let now = Utc::now();
        match self.db.get_page_content(workspace_id, page_number)? {
            Some(existing) => {
                self.db.update_page_content(&existing.id, &draft.content, &styles, now)?;
                Ok(PageContent {
                    content: draft.content,
                    font_family: styles.font_family,
                    font_size: styles.font_size,
                    font_color: styles.font_color,
                    text_align: styles.text_align,
                    text_style: styles.text_style,
                    updated_at: now,
                    ..existing
                })
            }
            None => {
                let record = PageContent {
                    id: Uuid::new_v4().to_string(),
                    workspace_id: workspace_id.to_string(),
                    page_number,
                    content: draft.content,
                    font_family: styles.font_family,
                    font_size: styles.font_size,
                    font_color: styles.font_color,
                    text_align: styles.text_align,
                    text_style: styles.text_style,
                    created_at: now,
                    updated_at: now,
                };
                self.db.insert_page_content(&record)?;
                Ok(record)
            }
        }
    }

    /// Bundled content-and-styles view; a page with no stored record reads
    /// as empty with default styles.
    pub fn page_data(&self, workspace_id: &str, page_number: i64) -> AppResult<PageData> {
        match self.page_content(workspace_id, page_number)? {
            Some(record) => {
                let styles = record.styles();
                Ok(PageData {
                    page_number: record.page_number,
                    content: record.content,
                    styles,
                })
            }
            None => Ok(PageData::empty(page_number)),
        }
    }

    /// The page number embedded in the payload must equal the target page;
    /// this is checked before anything touches storage.
    pub fn save_page_data(&self, workspace_id: &str, page_number: i64, data: PageData) -> AppResult<PageContent> {
        if data.page_number != page_number {
            return Err(AppError::PageMismatch(format!(
                "Payload page {} does not match target page {}",
                data.page_number, page_number
            )));
        }
        self.save_page_content(
            workspace_id,
            page_number,
            PageDraft {
                content: data.content,
                styles: data.styles.into(),
            },
        )
    }

    /// Idempotent: deleting a page that has no content record is a no-op.
    /// The page number stays in the workspace's page list.
    pub fn delete_page_content(&self, workspace_id: &str, page_number: i64) -> AppResult<()> {
        self.db.delete_page_content(workspace_id, page_number)?;
        Ok(())
    }

    /// True only when a content record exists and both key fields match the
    /// queried values exactly.
    pub fn verify_page_content(&self, workspace_id: &str, page_number: i64) -> AppResult<bool> {
        let Some(record) = self.db.get_page_content(workspace_id, page_number)? else {
            return Ok(false);
        };
        Ok(record.page_number == page_number && record.workspace_id == workspace_id)
    }

    // ─── Page numbering ───────────────────────────────────────────────────────

    /// Maximum listed page number, or 1 when the list is empty; page
    /// numbering is 1-based and never reports zero pages.
    pub fn total_pages(&self, workspace_id: &str) -> AppResult<i64> {
        let workspace = self.require_workspace(workspace_id)?;
        Ok(workspace.pages.iter().copied().max().unwrap_or(1))
    }

    /// Allocates `max + 1`, never reusing a number even after deletions, and
    /// eagerly creates an empty default-styled content record for it.
    pub fn create_new_page(&self, workspace_id: &str) -> AppResult<i64> {
        let workspace = self.require_workspace(workspace_id)?;
        let next = workspace.pages.iter().copied().max().unwrap_or(0) + 1;

        let mut pages = workspace.pages;
        pages.push(next);
        pages.sort_unstable();
        self.db.set_workspace_pages(workspace_id, &pages, Utc::now())?;

        self.save_page_content(workspace_id, next, PageDraft::default())?;
        Ok(next)
    }

    // ─── Import / export ──────────────────────────────────────────────────────

    /// Serializes every content record of the workspace, ordered by page
    /// number. A workspace id with no content exports an empty array.
    pub fn export_workspace(&self, workspace_id: &str) -> AppResult<String> {
        let contents = self.db.list_page_contents(workspace_id)?;
        serde_json::to_string_pretty(&contents).map_err(AppError::from)
    }

    /// Creates a brand-new workspace from a serialized export. Identifiers
    /// embedded in the data are ignored; every record gets a fresh id. The
    /// workspace and all content records are written as one transaction.
    pub fn import_workspace(&self, owner_id: &str, name: &str, serialized: &str) -> AppResult<Workspace> {
        let records: Vec<ImportedPageRecord> = serde_json::from_str(serialized)
            .map_err(|error| AppError::Policy(format!("Malformed workspace export: {}", error)))?;

        // Last occurrence wins for a repeated page number.
        let mut drafts: BTreeMap<i64, PageDraft> = BTreeMap::new();
        for record in records {
            let (page_number, draft) = record.into_draft();
            if page_number < 1 {
                return Err(AppError::Policy(format!(
                    "Page numbers are 1-based, got {}",
                    page_number
                )));
            }
            drafts.insert(page_number, draft);
        }

        let now = Utc::now();
        let mut pages: Vec<i64> = drafts.keys().copied().collect();
        if !pages.contains(&1) {
            pages.insert(0, 1);
        }

        let workspace = Workspace {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            name: name.to_string(),
            pages,
            created_at: now,
            updated_at: now,
        };

        let contents: Vec<PageContent> = drafts
            .into_iter()
            .map(|(page_number, draft)| {
                let styles = draft.styles.resolve();
                PageContent {
                    id: Uuid::new_v4().to_string(),
                    workspace_id: workspace.id.clone(),
                    page_number,
                    content: draft.content,
                    font_family: styles.font_family,
                    font_size: styles.font_size,
                    font_color: styles.font_color,
                    text_align: styles.text_align,
                    text_style: styles.text_style,
                    created_at: now,
                    updated_at: now,
                }
            })
            .collect();

        self.db.import_workspace(&workspace, &contents)?;
        Ok(workspace)
    }

    // ─── Consistency helpers ──────────────────────────────────────────────────

    /// Reports both drift directions between the page list and the content
    /// records. A listed page with no record is tolerated soft state; a
    /// record missing from the list is repairable via `repair_page_index`.
    pub fn audit_workspace(&self, workspace_id: &str) -> AppResult<WorkspaceAudit> {
        let workspace = self.require_workspace(workspace_id)?;
        let contents = self.db.list_page_contents(workspace_id)?;

        let listed: BTreeSet<i64> = workspace.pages.iter().copied().collect();
        let stored: BTreeSet<i64> = contents.iter().map(|record| record.page_number).collect();

        Ok(WorkspaceAudit {
            workspace_id: workspace.id,
            pages_without_content: listed.difference(&stored).copied().collect(),
            unlisted_content_pages: stored.difference(&listed).copied().collect(),
        })
    }

    /// Folds content pages missing from the page list back into it. Returns
    /// how many page numbers were added.
    pub fn repair_page_index(&self, workspace_id: &str) -> AppResult<usize> {
        let audit = self.audit_workspace(workspace_id)?;
        if audit.unlisted_content_pages.is_empty() {
            return Ok(0);
        }

        let workspace = self.require_workspace(workspace_id)?;
        let mut pages = workspace.pages;
        pages.extend(audit.unlisted_content_pages.iter().copied());
        pages.sort_unstable();
        pages.dedup();
        self.db.set_workspace_pages(workspace_id, &pages, Utc::now())?;
        Ok(audit.unlisted_content_pages.len())
    }

    fn require_workspace(&self, workspace_id: &str) -> AppResult<Workspace> {
        self.db
            .get_workspace(workspace_id)?
            .ok_or_else(|| AppError::NotFound(format!("Workspace '{}' not found", workspace_id)))
    }
}
