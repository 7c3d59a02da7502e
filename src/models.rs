use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_FONT_FAMILY: &str = "Crimson Text";
pub const DEFAULT_FONT_SIZE: &str = "16px";
pub const DEFAULT_FONT_COLOR: &str = "#000000";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TextAlign {
    Left,
    Center,
    Right,
    Justify,
}

impl TextAlign {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Center => "center",
            Self::Right => "right",
            Self::Justify => "justify",
        }
    }
}

impl Default for TextAlign {
    fn default() -> Self {
        Self::Left
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextStyle {
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageStyles {
    pub font_family: String,
    pub font_size: String,
    pub font_color: String,
    pub text_align: TextAlign,
    pub text_style: TextStyle,
}

impl Default for PageStyles {
    fn default() -> Self {
        Self {
            font_family: DEFAULT_FONT_FAMILY.to_string(),
            font_size: DEFAULT_FONT_SIZE.to_string(),
            font_color: DEFAULT_FONT_COLOR.to_string(),
            text_align: TextAlign::Left,
            text_style: TextStyle::default(),
        }
    }
}

/// Per-field style overrides for a save. Every omitted field falls back to
/// the fixed default, resolved in exactly one place.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageStylesPatch {
    pub font_family: Option<String>,
    pub font_size: Option<String>,
    pub font_color: Option<String>,
    pub text_align: Option<TextAlign>,
    pub text_style: Option<TextStyle>,
}

impl PageStylesPatch {
    pub fn resolve(self) -> PageStyles {
        PageStyles {
            font_family: self.font_family.unwrap_or_else(|| DEFAULT_FONT_FAMILY.to_string()),
            font_size: self.font_size.unwrap_or_else(|| DEFAULT_FONT_SIZE.to_string()),
            font_color: self.font_color.unwrap_or_else(|| DEFAULT_FONT_COLOR.to_string()),
            text_align: self.text_align.unwrap_or_default(),
            text_style: self.text_style.unwrap_or_default(),
        }
    }
}

impl From<PageStyles> for PageStylesPatch {
    fn from(value: PageStyles) -> Self {
        Self {
            font_family: Some(value.font_family),
            font_size: Some(value.font_size),
            font_color: Some(value.font_color),
            text_align: Some(value.text_align),
            text_style: Some(value.text_style),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub pages: Vec<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageContent {
    pub id: String,
    pub workspace_id: String,
    pub page_number: i64,
    pub content: String,
    pub font_family: String,
    pub font_size: String,
    pub font_color: String,
    pub text_align: TextAlign,
    pub text_style: TextStyle,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PageContent {
    pub fn styles(&self) -> PageStyles {
        PageStyles {
            font_family: self.font_family.clone(),
            font_size: self.font_size.clone(),
            font_color: self.font_color.clone(),
            text_align: self.text_align,
            text_style: self.text_style,
        }
    }
}

/// Content plus optional style overrides for `save_page_content`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageDraft {
    pub content: String,
    #[serde(default)]
    pub styles: PageStylesPatch,
}

/// Bundled content-and-styles view of one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageData {
    pub page_number: i64,
    pub content: String,
    pub styles: PageStyles,
}

impl PageData {
    pub fn empty(page_number: i64) -> Self {
        Self {
            page_number,
            content: String::new(),
            styles: PageStyles::default(),
        }
    }
}

/// Explicit field-level workspace update. `None` leaves a field untouched;
/// `updated_at` is always refreshed by the store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceUpdate {
    pub name: Option<String>,
    pub pages: Option<Vec<i64>>,
}

/// Lenient interchange shape for `import_workspace`. Identifiers and
/// timestamps embedded in the serialized data are ignored; missing style
/// fields resolve to the defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportedPageRecord {
    pub page_number: i64,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub font_family: Option<String>,
    #[serde(default)]
    pub font_size: Option<String>,
    #[serde(default)]
    pub font_color: Option<String>,
    #[serde(default)]
    pub text_align: Option<TextAlign>,
    #[serde(default)]
    pub text_style: Option<TextStyle>,
}

impl ImportedPageRecord {
    pub fn into_draft(self) -> (i64, PageDraft) {
        (
            self.page_number,
            PageDraft {
                content: self.content,
                styles: PageStylesPatch {
                    font_family: self.font_family,
                    font_size: self.font_size,
                    font_color: self.font_color,
                    text_align: self.text_align,
                    text_style: self.text_style,
                },
            },
        )
    }
}

/// Result of `audit_workspace`: the two directions in which a workspace's
/// page list and its content records can drift apart.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceAudit {
    pub workspace_id: String,
    pub pages_without_content: Vec<i64>,
    pub unlisted_content_pages: Vec<i64>,
}

impl WorkspaceAudit {
    pub fn is_consistent(&self) -> bool {
        self.unlisted_content_pages.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn styles_patch_resolves_missing_fields_to_defaults() {
        let resolved = PageStylesPatch {
            font_color: Some("#112233".to_string()),
            ..PageStylesPatch::default()
        }
        .resolve();

        assert_eq!(resolved.font_family, DEFAULT_FONT_FAMILY);
        assert_eq!(resolved.font_size, DEFAULT_FONT_SIZE);
        assert_eq!(resolved.font_color, "#112233");
        assert_eq!(resolved.text_align, TextAlign::Left);
        assert_eq!(resolved.text_style, TextStyle::default());
    }

    #[test]
    fn page_content_serializes_with_interchange_field_names() {
        let record = PageContent {
            id: "c-1".to_string(),
            workspace_id: "w-1".to_string(),
            page_number: 2,
            content: "dear diary".to_string(),
            font_family: DEFAULT_FONT_FAMILY.to_string(),
            font_size: DEFAULT_FONT_SIZE.to_string(),
            font_color: DEFAULT_FONT_COLOR.to_string(),
            text_align: TextAlign::Left,
            text_style: TextStyle {
                bold: true,
                ..TextStyle::default()
            },
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let value = serde_json::to_value(&record).expect("serialize");
        assert_eq!(value["workspaceId"], "w-1");
        assert_eq!(value["pageNumber"], 2);
        assert_eq!(value["fontFamily"], DEFAULT_FONT_FAMILY);
        assert_eq!(value["textAlign"], "left");
        assert_eq!(value["textStyle"]["bold"], true);
        assert_eq!(value["textStyle"]["underline"], false);
    }

    #[test]
    fn imported_record_tolerates_missing_style_fields() {
        let raw = r#"{"pageNumber": 3, "content": "hello"}"#;
        let record: ImportedPageRecord = serde_json::from_str(raw).expect("parse");
        let (page_number, draft) = record.into_draft();
        assert_eq!(page_number, 3);
        assert_eq!(draft.content, "hello");
        assert_eq!(draft.styles.resolve(), PageStyles::default());
    }
}
