//! Database row types. These map directly to SQLite rows and stay distinct
//! from the meridian-types API models to keep the DB layer independent.
use chrono::{DateTime, Utc};
use meridian_types::models::{
    AccessLevel, CompanyStatus, FolderType, GrantStatus, PermissionType, PointKind, Role,
    StorageType, ViewAction, Visibility,
};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub password: String,
    pub role: Role,
    pub referral_code: String,
    pub referred_by: Option<Uuid>,
    pub points: i64,
    pub credits: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser<'a> {
    pub id: Uuid,
    pub email: &'a str,
    pub username: &'a str,
    pub password_hash: &'a str,
    pub role: Role,
}

#[derive(Debug, Clone)]
pub struct CompanyRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub created_by: Option<Uuid>,
    pub name: String,
    pub status: CompanyStatus,
    pub visibility: Visibility,
    pub data_room_enabled: bool,
}

#[derive(Debug, Clone)]
pub struct PermissionRow {
    pub id: Uuid,
    pub company_id: Uuid,
    pub user_id: Uuid,
    pub permission_type: PermissionType,
    pub granted_by: Uuid,
    pub expires_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone)]
pub struct DataRoomAccessRow {
    pub id: Uuid,
    pub company_id: Uuid,
    pub user_id: Uuid,
    pub granted_by: Option<Uuid>,
    pub access_level: AccessLevel,
    pub nda_signed: bool,
    pub nda_signed_at: Option<DateTime<Utc>>,
    pub nda_document_id: Option<Uuid>,
    pub status: GrantStatus,
    pub expires_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FolderRow {
    pub id: Uuid,
    pub company_id: Uuid,
    pub name: String,
    pub folder_type: FolderType,
    pub description: Option<String>,
    pub access_level: AccessLevel,
    pub sort_order: i64,
    pub is_system: bool,
}

#[derive(Debug, Clone)]
pub struct FileRow {
    pub id: Uuid,
    pub company_id: Uuid,
    pub folder_id: Uuid,
    pub uploaded_by: Uuid,
    pub filename: String,
    pub mime_type: Option<String>,
    pub file_size: Option<i64>,
    pub storage_type: StorageType,
    pub external_link: Option<String>,
    /// `None` means the file inherits its folder's tier.
    pub access_level: Option<AccessLevel>,
    pub download_count: i64,
    pub version: i64,
    pub is_latest: bool,
    pub previous_version_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ViewLogRow {
    pub company_id: Uuid,
    pub user_id: Uuid,
    pub action: ViewAction,
    pub folder_id: Option<Uuid>,
    pub file_id: Option<Uuid>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

/// Per-visitor totals over a company's view log.
#[derive(Debug, Clone)]
pub struct VisitorStatsRow {
    pub user_id: Uuid,
    pub username: String,
    pub role: Role,
    pub total_views: i64,
    pub downloads: i64,
    pub folders_viewed: i64,
    pub files_viewed: i64,
    pub last_view_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ViewLogEntryRow {
    pub user_id: Uuid,
    pub action: ViewAction,
    pub folder_id: Option<Uuid>,
    pub file_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ReferralRow {
    pub id: Uuid,
    pub referrer_id: Uuid,
    pub referred_id: Uuid,
    pub points_earned: i64,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct PointHistoryRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub points: i64,
    pub kind: PointKind,
    pub status: Option<String>,
    pub description: String,
    pub related_id: Option<Uuid>,
    pub metadata: Option<String>,
    pub created_at: DateTime<Utc>,
}
