//! Disclosure-tier resolution for company data rooms.
//!
//! A user's tier for a company is the highest of several independent sources:
//! ownership, role, explicit data-room grants, company permissions and the
//! company's public listing. Resolution is read-only. "No access" is a normal
//! result (`AccessLevel::None`), never an error.

use chrono::{DateTime, Utc};
use meridian_db::Database;
use meridian_db::models::{
    CompanyRow, DataRoomAccessRow, FileRow, FolderRow, PermissionRow, UserRow,
};
use meridian_db::queries::{companies, dataroom, grants, users};
use meridian_types::api::ResolvedAccess;
use meridian_types::models::{
    AccessLevel, AccessSource, GrantStatus, PermissionType, Role, Visibility,
};
use tracing::info;
use uuid::Uuid;

use crate::dataroom::ensure_manager;
use crate::{Error, Principal, Result};

/// Roles allowed to manage explicit data-room grants.
const GRANT_ADMINS: &[Role] = &[Role::Admin];
/// Roles allowed to manage company permissions.
const PERMISSION_ADMINS: &[Role] = &[Role::Admin, Role::Staff];

pub struct AccessResolver<'a> {
    db: &'a Database,
}

/// Outcome of a file access check, with the rows the caller needs afterwards.
#[derive(Debug, Clone)]
pub struct FileAccess {
    pub file: FileRow,
    pub required: AccessLevel,
    pub resolved: ResolvedAccess,
}

impl FileAccess {
    pub fn granted(&self) -> bool {
        self.resolved.level.rank() >= self.required.rank()
    }
}

impl<'a> AccessResolver<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn resolve(&self, user_id: Uuid, company_id: Uuid) -> Result<ResolvedAccess> {
        let (user, company, access, permission) = self.db.with_conn(|conn| {
            Ok((
                users::get_user(conn, user_id)?,
                companies::get_company(conn, company_id)?,
                grants::get_data_room_access(conn, company_id, user_id)?,
                grants::get_company_permission(conn, company_id, user_id)?,
            ))
        })?;

        let user = user.ok_or_else(|| Error::not_found("user", user_id))?;
        let company = company.ok_or_else(|| Error::not_found("company", company_id))?;

        Ok(evaluate(
            &user,
            &company,
            access.as_ref(),
            permission.as_ref(),
            Utc::now(),
        ))
    }

    pub fn check_folder_access(
        &self,
        user_id: Uuid,
        company_id: Uuid,
        folder_id: Uuid,
    ) -> Result<bool> {
        let folder = self.folder_in_company(company_id, folder_id)?;
        let resolved = self.resolve(user_id, company_id)?;
        Ok(resolved.level.rank() >= folder.access_level.rank())
    }

    /// Resolve the caller's tier against a file. A file without its own
    /// level inherits its folder's.
    pub fn file_access(&self, user_id: Uuid, file_id: Uuid) -> Result<FileAccess> {
        let (file, folder) = self.db.with_conn(|conn| {
            let Some(file) = dataroom::get_file(conn, file_id)? else {
                return Ok((None, None));
            };
            let folder = dataroom::get_folder(conn, file.folder_id)?;
            Ok((Some(file), folder))
        })?;

        let file = file.ok_or_else(|| Error::not_found("file", file_id))?;
        let folder = folder.ok_or_else(|| Error::not_found("folder", file.folder_id))?;

        let required = file.access_level.unwrap_or(folder.access_level);
        let resolved = self.resolve(user_id, file.company_id)?;

        Ok(FileAccess {
            file,
            required,
            resolved,
        })
    }

    pub fn check_file_access(&self, user_id: Uuid, file_id: Uuid) -> Result<bool> {
        Ok(self.file_access(user_id, file_id)?.granted())
    }

    /// Record an NDA signature for `user_id`, raising their grant to at least
    /// `nda`. Signing the same document again is a no-op.
    pub fn grant_nda_access(
        &self,
        company_id: Uuid,
        user_id: Uuid,
        nda_document_id: Uuid,
    ) -> Result<()> {
        self.db.with_tx(|tx| {
            ensure_company_and_user(tx, company_id, user_id)?;

            let row = match grants::get_data_room_access(tx, company_id, user_id)? {
                Some(existing)
                    if existing.nda_signed
                        && existing.nda_document_id == Some(nda_document_id)
                        && existing.access_level.rank() >= AccessLevel::Nda.rank() =>
                {
                    return Ok(());
                }
                Some(mut existing) => {
                    existing.nda_signed = true;
                    existing.nda_signed_at = Some(Utc::now());
                    existing.nda_document_id = Some(nda_document_id);
                    existing.access_level = existing.access_level.max(AccessLevel::Nda);
                    existing
                }
                None => DataRoomAccessRow {
                    id: Uuid::new_v4(),
                    company_id,
                    user_id,
                    granted_by: None,
                    access_level: AccessLevel::Nda,
                    nda_signed: true,
                    nda_signed_at: Some(Utc::now()),
                    nda_document_id: Some(nda_document_id),
                    status: GrantStatus::Active,
                    expires_at: None,
                    notes: None,
                },
            };

            grants::upsert_data_room_access(tx, &row)?;
            info!(
                "NDA {} signed by {} for company {} (level {})",
                nda_document_id, user_id, company_id, row.access_level
            );
            Ok(())
        })
    }

    /// Record, on a user's behalf, that they signed the company's NDA. Only
    /// the company's data-room managers may do this.
    pub fn record_nda_signature(
        &self,
        actor: &Principal,
        company_id: Uuid,
        user_id: Uuid,
        nda_document_id: Uuid,
    ) -> Result<()> {
        let company = self
            .db
            .with_conn(|conn| companies::get_company(conn, company_id))?
            .ok_or_else(|| Error::not_found("company", company_id))?;
        ensure_manager(actor, &company)?;
        self.grant_nda_access(company_id, user_id, nda_document_id)
    }

    /// Create or replace an explicit grant. Tiers above `overview` need a
    /// prior NDA signature; nothing is written when that check fails.
    pub fn grant_data_room_access(
        &self,
        actor: &Principal,
        company_id: Uuid,
        user_id: Uuid,
        level: AccessLevel,
        expires_at: Option<DateTime<Utc>>,
        notes: Option<String>,
    ) -> Result<DataRoomAccessRow> {
        actor.require_role(GRANT_ADMINS)?;
        if level == AccessLevel::None {
            return Err(Error::InvalidInput(
                "cannot grant level 'none'; revoke the grant instead".into(),
            ));
        }

        self.db.with_tx(|tx| {
            ensure_company_and_user(tx, company_id, user_id)?;
            let existing = grants::get_data_room_access(tx, company_id, user_id)?;
            let nda_signed = existing.as_ref().is_some_and(|row| row.nda_signed);

            if level.requires_nda() && !nda_signed {
                return Err(Error::PreconditionFailed(format!(
                    "user {user_id} must sign the NDA before receiving '{level}' access"
                )));
            }

            let row = DataRoomAccessRow {
                id: existing.as_ref().map_or_else(Uuid::new_v4, |row| row.id),
                company_id,
                user_id,
                granted_by: Some(actor.user_id),
                access_level: level,
                nda_signed,
                nda_signed_at: existing.as_ref().and_then(|row| row.nda_signed_at),
                nda_document_id: existing.as_ref().and_then(|row| row.nda_document_id),
                status: GrantStatus::Active,
                expires_at,
                notes,
            };
            grants::upsert_data_room_access(tx, &row)?;

            info!(
                "Data room access '{}' granted to {} on company {} by {}",
                level, user_id, company_id, actor.user_id
            );
            Ok(row)
        })
    }

    pub fn revoke_data_room_access(
        &self,
        actor: &Principal,
        company_id: Uuid,
        user_id: Uuid,
    ) -> Result<()> {
        actor.require_role(GRANT_ADMINS)?;
        let changed = self.db.with_conn(|conn| {
            grants::set_data_room_access_status(conn, company_id, user_id, GrantStatus::Revoked)
        })?;
        if !changed {
            return Err(Error::NotFound(format!(
                "data room access for user {user_id} on company {company_id}"
            )));
        }
        info!("Data room access revoked for {} on company {}", user_id, company_id);
        Ok(())
    }

    pub fn grant_company_permission(
        &self,
        actor: &Principal,
        company_id: Uuid,
        user_id: Uuid,
        permission_type: PermissionType,
        expires_at: Option<DateTime<Utc>>,
        notes: Option<String>,
    ) -> Result<PermissionRow> {
        actor.require_role(PERMISSION_ADMINS)?;

        self.db.with_tx(|tx| {
            ensure_company_and_user(tx, company_id, user_id)?;
            let existing = grants::get_company_permission(tx, company_id, user_id)?;

            let row = PermissionRow {
                id: existing.map_or_else(Uuid::new_v4, |row| row.id),
                company_id,
                user_id,
                permission_type,
                granted_by: actor.user_id,
                expires_at,
                notes,
                is_active: true,
            };
            grants::upsert_company_permission(tx, &row)?;

            info!(
                "Company permission '{}' granted to {} on company {} by {}",
                permission_type, user_id, company_id, actor.user_id
            );
            Ok(row)
        })
    }

    pub fn revoke_company_permission(
        &self,
        actor: &Principal,
        company_id: Uuid,
        user_id: Uuid,
    ) -> Result<()> {
        actor.require_role(PERMISSION_ADMINS)?;
        let changed = self.db.with_conn(|conn| {
            grants::set_company_permission_active(conn, company_id, user_id, false)
        })?;
        if !changed {
            return Err(Error::NotFound(format!(
                "permission for user {user_id} on company {company_id}"
            )));
        }
        info!("Company permission revoked for {} on company {}", user_id, company_id);
        Ok(())
    }

    fn folder_in_company(&self, company_id: Uuid, folder_id: Uuid) -> Result<FolderRow> {
        self.db
            .with_conn(|conn| dataroom::get_folder(conn, folder_id))?
            .filter(|folder| folder.company_id == company_id)
            .ok_or_else(|| Error::not_found("folder", folder_id))
    }
}

fn ensure_company_and_user(
    conn: &rusqlite::Connection,
    company_id: Uuid,
    user_id: Uuid,
) -> Result<()> {
    if companies::get_company(conn, company_id)?.is_none() {
        return Err(Error::not_found("company", company_id));
    }
    if users::get_user(conn, user_id)?.is_none() {
        return Err(Error::not_found("user", user_id));
    }
    Ok(())
}

fn unexpired(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    expires_at.is_none_or(|at| at > now)
}

/// Every rule contributes a candidate; the highest tier wins and ties keep
/// the earlier rule's source.
pub fn evaluate(
    user: &UserRow,
    company: &CompanyRow,
    access: Option<&DataRoomAccessRow>,
    permission: Option<&PermissionRow>,
    now: DateTime<Utc>,
) -> ResolvedAccess {
    let mut candidates = Vec::with_capacity(4);

    if company.user_id == user.id {
        candidates.push((AccessLevel::FullDd, AccessSource::Owner));
    }
    if user.role == Role::Admin {
        candidates.push((AccessLevel::FullDd, AccessSource::Admin));
    }
    if user.role == Role::Staff && company.created_by == Some(user.id) {
        candidates.push((AccessLevel::FullDd, AccessSource::Creator));
    }

    if let Some(access) = access
        .filter(|a| a.status == GrantStatus::Active && unexpired(a.expires_at, now))
    {
        candidates.push((access.access_level, AccessSource::DataRoomGrant));
    }

    if let Some(permission) = permission.filter(|p| p.is_active && unexpired(p.expires_at, now)) {
        candidates.push((
            permission.permission_type.access_level(),
            AccessSource::CompanyPermission,
        ));
    }

    if company.status.is_listed()
        && matches!(company.visibility, Visibility::Investors | Visibility::Whitelist)
    {
        candidates.push((AccessLevel::Overview, AccessSource::PublicListing));
    }

    candidates.into_iter().fold(
        ResolvedAccess {
            level: AccessLevel::None,
            source: AccessSource::None,
        },
        |best, (level, source)| {
            if level.rank() > best.level.rank() {
                ResolvedAccess { level, source }
            } else {
                best
            }
        },
    )
}
