use chrono::Utc;
use meridian_db::Database;
use meridian_db::models::{CompanyRow, FileRow, FolderRow, ViewLogRow};
use meridian_db::queries::{companies, dataroom};
use meridian_types::api::{
    CreateFileRequest, CreateFolderRequest, DataRoomAnalytics, DataRoomListing, DownloadResponse,
    FileSummary, FolderListing, UpdateFolderRequest, ViewLogEntry, VisitorEngagement,
};
use meridian_types::models::{AccessLevel, FolderType, Role, StorageType, ViewAction};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{AccessResolver, Error, Principal, Result};

/// Entries returned in the analytics `recent` list.
const RECENT_VIEWS: u32 = 50;

/// Request details recorded in the view log.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

pub struct DataRoom<'a> {
    db: &'a Database,
}

impl<'a> DataRoom<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Seed the six system folders, all at `full_dd`.
    pub fn init_data_room(&self, actor: &Principal, company_id: Uuid) -> Result<Vec<FolderRow>> {
        let folders = self.db.with_tx(|tx| {
            let company = companies::get_company(tx, company_id)?
                .ok_or_else(|| Error::not_found("company", company_id))?;
            ensure_manager(actor, &company)?;

            if dataroom::count_folders(tx, company_id)? > 0 {
                return Err(Error::Conflict(format!(
                    "data room for company {company_id} is already initialised"
                )));
            }

            let mut folders = Vec::with_capacity(FolderType::ALL.len());
            for &folder_type in FolderType::ALL {
                let folder = FolderRow {
                    id: Uuid::new_v4(),
                    company_id,
                    name: folder_type.display_name().to_string(),
                    folder_type,
                    description: None,
                    access_level: AccessLevel::FullDd,
                    sort_order: folder_type.sort_order(),
                    is_system: true,
                };
                dataroom::insert_folder(tx, &folder)?;
                folders.push(folder);
            }
            companies::set_data_room_enabled(tx, company_id, true)?;
            Ok(folders)
        })?;

        info!("Data room initialised for company {} by {}", company_id, actor.user_id);
        Ok(folders)
    }

    pub fn add_folder(
        &self,
        actor: &Principal,
        company_id: Uuid,
        req: &CreateFolderRequest,
    ) -> Result<FolderRow> {
        let name = req.name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput("folder name must not be empty".into()));
        }
        let access_level = req.access_level.unwrap_or(AccessLevel::FullDd);
        if access_level == AccessLevel::None {
            return Err(Error::InvalidInput("folders need an access level above 'none'".into()));
        }
        let folder_type = req.folder_type.unwrap_or(FolderType::Other);

        let company = self.company(company_id)?;
        ensure_manager(actor, &company)?;

        let folder = FolderRow {
            id: Uuid::new_v4(),
            company_id,
            name: name.to_string(),
            folder_type,
            description: req.description.clone(),
            access_level,
            sort_order: folder_type.sort_order(),
            is_system: false,
        };
        self.db.with_conn(|conn| dataroom::insert_folder(conn, &folder))?;

        info!("Folder '{}' ({}) added to company {}", folder.name, access_level, company_id);
        Ok(folder)
    }

    /// Change a folder's name, description or tier.
    pub fn update_folder(
        &self,
        actor: &Principal,
        folder_id: Uuid,
        req: &UpdateFolderRequest,
    ) -> Result<FolderRow> {
        let name = req.name.as_deref().map(str::trim);
        if name.is_some_and(str::is_empty) {
            return Err(Error::InvalidInput("folder name must not be empty".into()));
        }
        if req.access_level == Some(AccessLevel::None) {
            return Err(Error::InvalidInput("folders need an access level above 'none'".into()));
        }

        let folder = self.db.with_tx(|tx| {
            let mut folder = dataroom::get_folder(tx, folder_id)?
                .ok_or_else(|| Error::not_found("folder", folder_id))?;
            let company = companies::get_company(tx, folder.company_id)?
                .ok_or_else(|| Error::not_found("company", folder.company_id))?;
            ensure_manager(actor, &company)?;

            if let Some(name) = name {
                folder.name = name.to_string();
            }
            if let Some(level) = req.access_level {
                folder.access_level = level;
            }
            if let Some(description) = &req.description {
                folder.description = Some(description.clone());
            }
            dataroom::update_folder(tx, &folder)?;
            Ok::<_, Error>(folder)
        })?;

        info!(
            "Folder {} updated by {} (level {})",
            folder.id, actor.user_id, folder.access_level
        );
        Ok(folder)
    }

    /// Register a document's metadata. The bytes live in external storage.
    /// With `replaces` set, the file becomes the next version of an existing
    /// latest file in the same folder.
    pub fn add_file(
        &self,
        actor: &Principal,
        folder_id: Uuid,
        req: &CreateFileRequest,
    ) -> Result<FileRow> {
        let filename = req.filename.trim();
        if filename.is_empty() {
            return Err(Error::InvalidInput("filename must not be empty".into()));
        }
        if req.access_level == Some(AccessLevel::None) {
            return Err(Error::InvalidInput("files need an access level above 'none'".into()));
        }

        let file = self.db.with_tx(|tx| {
            let folder = dataroom::get_folder(tx, folder_id)?
                .ok_or_else(|| Error::not_found("folder", folder_id))?;
            let company = companies::get_company(tx, folder.company_id)?
                .ok_or_else(|| Error::not_found("company", folder.company_id))?;
            ensure_manager(actor, &company)?;

            let (version, previous_version_id) = match req.replaces {
                None => (1, None),
                Some(previous_id) => {
                    let previous = dataroom::get_file(tx, previous_id)?
                        .filter(|f| f.folder_id == folder_id)
                        .ok_or_else(|| Error::not_found("file", previous_id))?;
                    if !previous.is_latest {
                        return Err(Error::Conflict(format!(
                            "file {previous_id} already has a newer version"
                        )));
                    }
                    dataroom::set_file_latest(tx, previous_id, false)?;
                    (previous.version + 1, Some(previous_id))
                }
            };

            let file = FileRow {
                id: Uuid::new_v4(),
                company_id: folder.company_id,
                folder_id,
                uploaded_by: actor.user_id,
                filename: filename.to_string(),
                mime_type: req.mime_type.clone(),
                file_size: req.file_size,
                storage_type: if req.external_link.is_some() {
                    StorageType::ExternalLink
                } else {
                    StorageType::Stored
                },
                external_link: req.external_link.clone(),
                access_level: req.access_level,
                download_count: 0,
                version,
                is_latest: true,
                previous_version_id,
                created_at: Utc::now(),
            };
            dataroom::insert_file(tx, &file)?;
            Ok(file)
        })?;

        info!(
            "File '{}' v{} added to folder {} by {}",
            file.filename, file.version, folder_id, actor.user_id
        );
        Ok(file)
    }

    /// Delete one file version. Managers and the uploader may do this.
    pub fn delete_file(&self, actor: &Principal, file_id: Uuid) -> Result<()> {
        self.db.with_tx(|tx| {
            let file = dataroom::get_file(tx, file_id)?
                .ok_or_else(|| Error::not_found("file", file_id))?;
            if file.uploaded_by != actor.user_id {
                let company = companies::get_company(tx, file.company_id)?
                    .ok_or_else(|| Error::not_found("company", file.company_id))?;
                ensure_manager(actor, &company)?;
            }
            dataroom::delete_file(tx, &file)?;
            Ok::<_, Error>(())
        })?;

        info!("File {} deleted by {}", file_id, actor.user_id);
        Ok(())
    }

    /// View-log totals per visitor plus the most recent entries. Managers only.
    pub fn analytics(&self, actor: &Principal, company_id: Uuid) -> Result<DataRoomAnalytics> {
        let company = self.company(company_id)?;
        ensure_manager(actor, &company)?;

        let (stats, recent) = self.db.with_conn(|conn| {
            Ok((
                dataroom::visitor_stats(conn, company_id)?,
                dataroom::recent_view_logs(conn, company_id, RECENT_VIEWS)?,
            ))
        })?;

        let visitors: Vec<VisitorEngagement> = stats
            .into_iter()
            .map(|row| VisitorEngagement {
                user_id: row.user_id,
                username: row.username,
                role: row.role,
                total_views: row.total_views,
                downloads: row.downloads,
                folders_viewed: row.folders_viewed,
                files_viewed: row.files_viewed,
                last_view_at: row.last_view_at,
            })
            .collect();

        Ok(DataRoomAnalytics {
            total_views: visitors.iter().map(|v| v.total_views).sum(),
            unique_visitors: visitors.len(),
            visitors,
            recent: recent
                .into_iter()
                .map(|row| ViewLogEntry {
                    user_id: row.user_id,
                    action: row.action,
                    folder_id: row.folder_id,
                    file_id: row.file_id,
                    created_at: row.created_at,
                })
                .collect(),
        })
    }

    /// Every folder of the company. Folders above the viewer's tier are
    /// locked and show no files; open folders only list files the tier allows.
    pub fn list_folders(
        &self,
        viewer: &Principal,
        company_id: Uuid,
        client: &ClientInfo,
    ) -> Result<DataRoomListing> {
        let access = AccessResolver::new(self.db).resolve(viewer.user_id, company_id)?;
        if access.level == AccessLevel::None {
            return Err(Error::Forbidden);
        }

        let (folders, files) = self.db.with_conn(|conn| {
            Ok((
                dataroom::list_folders(conn, company_id)?,
                dataroom::list_latest_files(conn, company_id)?,
            ))
        })?;

        let rank = access.level.rank();
        let folders = folders
            .into_iter()
            .map(|folder| {
                let locked = rank < folder.access_level.rank();
                let files = if locked {
                    Vec::new()
                } else {
                    files
                        .iter()
                        .filter(|f| f.folder_id == folder.id)
                        .filter(|f| f.access_level.unwrap_or(folder.access_level).rank() <= rank)
                        .map(file_summary)
                        .collect()
                };
                FolderListing {
                    id: folder.id,
                    name: folder.name,
                    folder_type: folder.folder_type,
                    access_level: folder.access_level,
                    sort_order: folder.sort_order,
                    locked,
                    files,
                }
            })
            .collect();

        if viewer.role == Role::Investor {
            self.log_view(ViewLogRow {
                company_id,
                user_id: viewer.user_id,
                action: ViewAction::ViewFolder,
                folder_id: None,
                file_id: None,
                user_agent: client.user_agent.clone(),
                ip_address: client.ip_address.clone(),
            });
        }

        Ok(DataRoomListing { access, folders })
    }

    /// Authorize a download and record it. Denied access is `Forbidden`.
    pub fn download(
        &self,
        viewer: &Principal,
        file_id: Uuid,
        client: &ClientInfo,
    ) -> Result<DownloadResponse> {
        let access = AccessResolver::new(self.db).file_access(viewer.user_id, file_id)?;
        if !access.granted() {
            return Err(Error::Forbidden);
        }

        self.record_download(viewer.user_id, &access.file, client);

        let url = match access.file.storage_type {
            StorageType::ExternalLink => access.file.external_link.clone(),
            StorageType::Stored => None,
        };
        Ok(DownloadResponse {
            file: file_summary(&access.file),
            url,
        })
    }

    /// Bump the download counter and log the download. Never fails the read.
    pub fn record_download(&self, user_id: Uuid, file: &FileRow, client: &ClientInfo) {
        let result = self.db.with_tx(|tx| {
            dataroom::increment_download_count(tx, file.id)?;
            dataroom::insert_view_log(
                tx,
                &ViewLogRow {
                    company_id: file.company_id,
                    user_id,
                    action: ViewAction::DownloadFile,
                    folder_id: Some(file.folder_id),
                    file_id: Some(file.id),
                    user_agent: client.user_agent.clone(),
                    ip_address: client.ip_address.clone(),
                },
            )
        });
        if let Err(e) = result {
            warn!("Failed to record download of {} by {}: {}", file.id, user_id, e);
        }
    }

    fn log_view(&self, entry: ViewLogRow) {
        if let Err(e) = self.db.with_conn(|conn| dataroom::insert_view_log(conn, &entry)) {
            warn!(
                "Failed to log data room view of {} by {}: {}",
                entry.company_id, entry.user_id, e
            );
        }
    }

    fn company(&self, company_id: Uuid) -> Result<CompanyRow> {
        self.db
            .with_conn(|conn| companies::get_company(conn, company_id))?
            .ok_or_else(|| Error::not_found("company", company_id))
    }
}

/// Owners, admins and the staff member who created the company.
pub(crate) fn ensure_manager(actor: &Principal, company: &CompanyRow) -> Result<()> {
    let allowed = company.user_id == actor.user_id
        || actor.role == Role::Admin
        || (actor.role == Role::Staff && company.created_by == Some(actor.user_id));
    if allowed { Ok(()) } else { Err(Error::Forbidden) }
}

pub fn file_summary(file: &FileRow) -> FileSummary {
    FileSummary {
        id: file.id,
        folder_id: file.folder_id,
        filename: file.filename.clone(),
        mime_type: file.mime_type.clone(),
        file_size: file.file_size,
        storage_type: file.storage_type,
        access_level: file.access_level,
        download_count: file.download_count,
        version: file.version,
        is_latest: file.is_latest,
        created_at: file.created_at,
    }
}
