use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use serde_json::{json, Value};
use tracing::{instrument, warn};

use crate::{
    auth::AuthUser,
    state::AppState,
    storage::{self, ALLOWED_IMAGE_TYPES, MAX_AVATAR_SIZE},
};

use super::{
    dto::{CreateProfileInput, ProfileResponse, UpdateProfileInput},
    service::{ProfileErrorCode, ProfileFailure},
};

// Avatar uploads are rejected by size in the handler; the body limit only
// needs to be high enough for an oversized file to reach that check.
const UPLOAD_BODY_LIMIT: usize = 10 * 1024 * 1024;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_profile).post(create_profile).patch(update_profile))
        .route("/avatar", post(upload_avatar).delete(delete_avatar))
        .layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT))
}

/// Type and size gate for avatar uploads, applied before any storage call.
fn validate_upload(content_type: &str, len: usize) -> Result<(), (StatusCode, String)> {
    if !ALLOWED_IMAGE_TYPES.contains(&content_type) {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("Invalid file type. Allowed: {}", ALLOWED_IMAGE_TYPES.join(", ")),
        ));
    }
    if len > MAX_AVATAR_SIZE {
        return Err((
            StatusCode::BAD_REQUEST,
            "File too large. Maximum size: 5MB".to_string(),
        ));
    }
    Ok(())
}

fn map_profile_failure(f: ProfileFailure) -> (StatusCode, String) {
    let status = match f.code {
        ProfileErrorCode::ValidationError | ProfileErrorCode::ProfileExists => {
            StatusCode::BAD_REQUEST
        }
        ProfileErrorCode::ProfileNotFound => StatusCode::NOT_FOUND,
        ProfileErrorCode::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, f.message)
}

#[instrument(skip(state, current))]
async fn get_profile(
    State(state): State<AppState>,
    AuthUser(current): AuthUser,
) -> Result<Json<Value>, (StatusCode, String)> {
    let profile = state
        .profiles
        .get_by_user_id(current.user.id)
        .await
        .map_err(map_profile_failure)?;
    Ok(Json(
        json!({ "data": profile.as_ref().map(ProfileResponse::from) }),
    ))
}

#[instrument(skip(state, current, input))]
async fn create_profile(
    State(state): State<AppState>,
    AuthUser(current): AuthUser,
    Json(input): Json<CreateProfileInput>,
) -> Result<(StatusCode, Json<Value>), (StatusCode, String)> {
    let profile = state
        .profiles
        .create(current.user.id, input)
        .await
        .map_err(map_profile_failure)?;

    // Keep the account's display name in step with the profile.
    state
        .auth
        .update_user_name(current.user.id, &profile.display_name)
        .await;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "data": ProfileResponse::from(&profile) })),
    ))
}

#[instrument(skip(state, current, input))]
async fn update_profile(
    State(state): State<AppState>,
    AuthUser(current): AuthUser,
    Json(input): Json<UpdateProfileInput>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let renames = input.first_name.is_some() || input.last_name.is_some();
    let profile = state
        .profiles
        .update(current.user.id, input)
        .await
        .map_err(map_profile_failure)?;

    if renames {
        state
            .auth
            .update_user_name(current.user.id, &profile.display_name)
            .await;
    }

    Ok(Json(json!({ "data": ProfileResponse::from(&profile) })))
}

#[instrument(skip(state, current, multipart))]
async fn upload_avatar(
    State(state): State<AppState>,
    AuthUser(current): AuthUser,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Value>), (StatusCode, String)> {
    let mut file: Option<(Bytes, String)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?
    {
        if field.name() == Some("file") {
            let content_type = field
                .content_type()
                .map(str::to_string)
                .unwrap_or_else(|| "application/octet-stream".to_string());
            let data = field
                .bytes()
                .await
                .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
            file = Some((data, content_type));
            break;
        }
    }

    let Some((data, content_type)) = file else {
        return Err((StatusCode::BAD_REQUEST, "No file provided".to_string()));
    };
    validate_upload(&content_type, data.len())?;

    let public_base = &state.config.storage.public_url_base;

    // Best-effort removal of the avatar being replaced.
    if let Ok(Some(profile)) = state.profiles.get_by_user_id(current.user.id).await {
        if let Some(old_url) = &profile.avatar_url {
            if let Some(old_key) = storage::extract_key_from_url(old_url, public_base) {
                if let Err(e) = state.storage.delete_object(&old_key).await {
                    warn!(error = %e, key = %old_key, "failed to delete previous avatar");
                }
            }
        }
    }

    let key = storage::generate_key("avatars", current.user.id, &content_type);
    state
        .storage
        .put_object(&key, data, &content_type)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    let url = storage::public_url(public_base, &key);
    Ok((StatusCode::CREATED, Json(json!({ "data": { "url": url } }))))
}

#[instrument(skip(state, current))]
async fn delete_avatar(
    State(state): State<AppState>,
    AuthUser(current): AuthUser,
) -> Result<Json<Value>, (StatusCode, String)> {
    let profile = state
        .profiles
        .get_by_user_id(current.user.id)
        .await
        .map_err(map_profile_failure)?;

    let avatar_url = profile.and_then(|p| p.avatar_url);
    let Some(avatar_url) = avatar_url else {
        return Err((StatusCode::NOT_FOUND, "No avatar to delete".to_string()));
    };

    if let Some(key) =
        storage::extract_key_from_url(&avatar_url, &state.config.storage.public_url_base)
    {
        state
            .storage
            .delete_object(&key)
            .await
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    }

    let input = UpdateProfileInput {
        avatar_url: Some(None),
        ..Default::default()
    };
    state
        .profiles
        .update(current.user.id, input)
        .await
        .map_err(map_profile_failure)?;

    Ok(Json(json!({ "success": true })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversized_uploads_are_rejected() {
        let six_mib = 6 * 1024 * 1024;
        let (status, message) = validate_upload("image/jpeg", six_mib).unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(message.contains("too large"));

        // Exactly at the cap is still accepted.
        assert!(validate_upload("image/jpeg", MAX_AVATAR_SIZE).is_ok());
    }

    #[test]
    fn non_image_uploads_are_rejected() {
        let (status, message) = validate_upload("application/pdf", 1024).unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(message.contains("Invalid file type"));

        let (_, message) = validate_upload("application/octet-stream", 1024).unwrap_err();
        assert!(message.contains("image/jpeg"));

        assert!(validate_upload("image/png", 10).is_ok());
        assert!(validate_upload("image/webp", 10).is_ok());
    }
}
