use axum::{
    Extension, Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};
use uuid::Uuid;

use meridian_core::dataroom::file_summary;
use meridian_core::{AccessResolver, ClientInfo, DataRoom, Principal};
use meridian_db::models::FolderRow;
use meridian_types::api::{
    CreateFileRequest, CreateFolderRequest, FolderAccessResponse, FolderListing,
    GrantAccessRequest, GrantPermissionRequest, NdaSignatureRequest, UpdateFolderRequest,
};
use meridian_types::models::Claims;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::run_blocking;

fn client_info(headers: &HeaderMap) -> ClientInfo {
    let header_str = |name| headers.get(name).and_then(|v| v.to_str().ok());
    ClientInfo {
        user_agent: header_str(header::USER_AGENT).map(str::to_string),
        ip_address: header_str(header::HeaderName::from_static("x-forwarded-for"))
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string()),
    }
}

fn folder_listing(folder: FolderRow) -> FolderListing {
    FolderListing {
        id: folder.id,
        name: folder.name,
        folder_type: folder.folder_type,
        access_level: folder.access_level,
        sort_order: folder.sort_order,
        locked: false,
        files: Vec::new(),
    }
}

// -- Structure --

/// POST /companies/{id}/dataroom/init
pub async fn init(
    State(state): State<AppState>,
    Path(company_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = Principal::from(&claims);
    let folders = run_blocking(&state, move |s| {
        DataRoom::new(&s.db).init_data_room(&actor, company_id)
    })
    .await?;

    let folders: Vec<_> = folders.into_iter().map(folder_listing).collect();
    Ok((StatusCode::CREATED, Json(folders)))
}

/// GET /companies/{id}/folders
pub async fn list_folders(
    State(state): State<AppState>,
    Path(company_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let viewer = Principal::from(&claims);
    let client = client_info(&headers);
    let listing = run_blocking(&state, move |s| {
        DataRoom::new(&s.db).list_folders(&viewer, company_id, &client)
    })
    .await?;
    Ok(Json(listing))
}

/// POST /companies/{id}/folders
pub async fn create_folder(
    State(state): State<AppState>,
    Path(company_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateFolderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = Principal::from(&claims);
    let folder = run_blocking(&state, move |s| {
        DataRoom::new(&s.db).add_folder(&actor, company_id, &req)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(folder_listing(folder))))
}

/// PUT /folders/{folder_id}
pub async fn update_folder(
    State(state): State<AppState>,
    Path(folder_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateFolderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = Principal::from(&claims);
    let folder = run_blocking(&state, move |s| {
        DataRoom::new(&s.db).update_folder(&actor, folder_id, &req)
    })
    .await?;
    Ok(Json(folder_listing(folder)))
}

/// GET /companies/{id}/folders/{folder_id}/access
pub async fn folder_access(
    State(state): State<AppState>,
    Path((company_id, folder_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub;
    let granted = run_blocking(&state, move |s| {
        AccessResolver::new(&s.db).check_folder_access(user_id, company_id, folder_id)
    })
    .await?;
    Ok(Json(FolderAccessResponse { folder_id, granted }))
}

/// POST /folders/{folder_id}/files
pub async fn create_file(
    State(state): State<AppState>,
    Path(folder_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateFileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = Principal::from(&claims);
    let file = run_blocking(&state, move |s| {
        DataRoom::new(&s.db).add_file(&actor, folder_id, &req)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(file_summary(&file))))
}

/// GET /files/{file_id}/download
pub async fn download(
    State(state): State<AppState>,
    Path(file_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let viewer = Principal::from(&claims);
    let client = client_info(&headers);
    let response = run_blocking(&state, move |s| {
        DataRoom::new(&s.db).download(&viewer, file_id, &client)
    })
    .await?;
    Ok(Json(response))
}

/// DELETE /files/{file_id}
pub async fn delete_file(
    State(state): State<AppState>,
    Path(file_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = Principal::from(&claims);
    run_blocking(&state, move |s| DataRoom::new(&s.db).delete_file(&actor, file_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /companies/{id}/analytics
pub async fn analytics(
    State(state): State<AppState>,
    Path(company_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = Principal::from(&claims);
    let report = run_blocking(&state, move |s| {
        DataRoom::new(&s.db).analytics(&actor, company_id)
    })
    .await?;
    Ok(Json(report))
}

// -- Grants --

/// PUT /companies/{id}/access/{user_id}/nda: a data-room manager records
/// the user's NDA signature.
pub async fn record_nda(
    State(state): State<AppState>,
    Path((company_id, user_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<NdaSignatureRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = Principal::from(&claims);
    run_blocking(&state, move |s| {
        AccessResolver::new(&s.db).record_nda_signature(
            &actor,
            company_id,
            user_id,
            req.nda_document_id,
        )
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /companies/{id}/access
pub async fn grant_access(
    State(state): State<AppState>,
    Path(company_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<GrantAccessRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = Principal::from(&claims);
    run_blocking(&state, move |s| {
        AccessResolver::new(&s.db).grant_data_room_access(
            &actor,
            company_id,
            req.user_id,
            req.access_level,
            req.expires_at,
            req.notes,
        )
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /companies/{id}/access/{user_id}
pub async fn revoke_access(
    State(state): State<AppState>,
    Path((company_id, user_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = Principal::from(&claims);
    run_blocking(&state, move |s| {
        AccessResolver::new(&s.db).revoke_data_room_access(&actor, company_id, user_id)
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /companies/{id}/permissions
pub async fn grant_permission(
    State(state): State<AppState>,
    Path(company_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<GrantPermissionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = Principal::from(&claims);
    run_blocking(&state, move |s| {
        AccessResolver::new(&s.db).grant_company_permission(
            &actor,
            company_id,
            req.user_id,
            req.permission_type,
            req.expires_at,
            req.notes,
        )
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /companies/{id}/permissions/{user_id}
pub async fn revoke_permission(
    State(state): State<AppState>,
    Path((company_id, user_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = Principal::from(&claims);
    run_blocking(&state, move |s| {
        AccessResolver::new(&s.db).revoke_company_permission(&actor, company_id, user_id)
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}
