use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{
    AccessLevel, AccessSource, CompanyStatus, FolderType, PermissionType, PointKind,
    ReferralStatus, Role, StorageType, ViewAction, Visibility,
};

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
    pub role: Role,
    #[serde(default)]
    pub referral_code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
    pub referral_code: String,
    pub referral: ReferralOutcome,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
    pub role: Role,
    pub token: String,
}

// -- Points --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralOutcome {
    pub status: ReferralStatus,
    /// Points credited to the newly registered user.
    pub points_awarded: i64,
    /// Points credited to the referrer, zero when capped or not applicable.
    pub referrer_points: i64,
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub user_id: Uuid,
    pub points: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PointEntry {
    pub id: Uuid,
    pub points: i64,
    pub kind: PointKind,
    pub status: Option<String>,
    pub description: String,
    pub related_id: Option<Uuid>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BalanceAudit {
    pub cached: i64,
    pub ledger_sum: i64,
    pub consistent: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdjustPointsRequest {
    pub delta: i64,
    pub description: String,
}

/// Report sent by the bandwidth-sharing plugin.
#[derive(Debug, Deserialize)]
pub struct BandwidthReport {
    pub email: String,
    pub points: i64,
    #[serde(default)]
    pub ipv4: Option<String>,
    #[serde(default)]
    pub ipv6: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct AwardResponse {
    pub user_id: Uuid,
    pub new_balance: i64,
}

// -- Referrals --

#[derive(Debug, Serialize)]
pub struct ReferralStats {
    pub referral_code: String,
    pub referral_count: i64,
    pub referral_points: i64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerifyReferralRequest {
    pub referral_code: String,
}

// -- Companies --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateCompanyRequest {
    pub name: String,
    /// Set when staff create a company on behalf of its owner.
    #[serde(default)]
    pub owner_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReviewCompanyRequest {
    pub status: CompanyStatus,
    #[serde(default)]
    pub visibility: Option<Visibility>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompanyResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub created_by: Option<Uuid>,
    pub name: String,
    pub status: CompanyStatus,
    pub visibility: Visibility,
    pub data_room_enabled: bool,
}

// -- Data room --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolvedAccess {
    pub level: AccessLevel,
    pub source: AccessSource,
}

#[derive(Debug, Serialize)]
pub struct FolderAccessResponse {
    pub folder_id: Uuid,
    pub granted: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GrantAccessRequest {
    pub user_id: Uuid,
    pub access_level: AccessLevel,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GrantPermissionRequest {
    pub user_id: Uuid,
    pub permission_type: PermissionType,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NdaSignatureRequest {
    pub nda_document_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateFolderRequest {
    pub name: String,
    #[serde(default)]
    pub folder_type: Option<FolderType>,
    #[serde(default)]
    pub access_level: Option<AccessLevel>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Omitted fields keep their current value.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateFolderRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub access_level: Option<AccessLevel>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateFileRequest {
    pub filename: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub file_size: Option<i64>,
    #[serde(default)]
    pub external_link: Option<String>,
    /// `None` inherits the folder's tier.
    #[serde(default)]
    pub access_level: Option<AccessLevel>,
    /// Upload as the next version of this file.
    #[serde(default)]
    pub replaces: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileSummary {
    pub id: Uuid,
    pub folder_id: Uuid,
    pub filename: String,
    pub mime_type: Option<String>,
    pub file_size: Option<i64>,
    pub storage_type: StorageType,
    pub access_level: Option<AccessLevel>,
    pub download_count: i64,
    pub version: i64,
    pub is_latest: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FolderListing {
    pub id: Uuid,
    pub name: String,
    pub folder_type: FolderType,
    pub access_level: AccessLevel,
    pub sort_order: i64,
    pub locked: bool,
    pub files: Vec<FileSummary>,
}

#[derive(Debug, Serialize)]
pub struct DataRoomListing {
    pub access: ResolvedAccess,
    pub folders: Vec<FolderListing>,
}

#[derive(Debug, Serialize)]
pub struct DownloadResponse {
    pub file: FileSummary,
    /// Present for externally hosted documents.
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VisitorEngagement {
    pub user_id: Uuid,
    pub username: String,
    pub role: Role,
    pub total_views: i64,
    pub downloads: i64,
    pub folders_viewed: i64,
    pub files_viewed: i64,
    pub last_view_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ViewLogEntry {
    pub user_id: Uuid,
    pub action: ViewAction,
    pub folder_id: Option<Uuid>,
    pub file_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct DataRoomAnalytics {
    pub total_views: i64,
    pub unique_visitors: usize,
    pub visitors: Vec<VisitorEngagement>,
    pub recent: Vec<ViewLogEntry>,
}
