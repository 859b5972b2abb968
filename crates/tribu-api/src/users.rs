use axum::{
    Extension,
    extract::{
        Multipart, Path, State,
        multipart::{MultipartError, MultipartRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use tracing::{debug, info, warn};

use tribu_db::models::{EchoRow, ProfileRow};
use tribu_types::forms::{AvatarUpload, FormErrors, ProfileForm, avatar_too_large};
use tribu_types::models::{Actor, DEFAULT_AVATAR, Profile};

use crate::access::authorize;
use crate::error::{ApiError, OrNotFound};
use crate::flash;
use crate::listing::{Listing, PREVIEW_LIMIT};
use crate::pages::{self, PageContext};
use crate::redirect::Found;
use crate::state::AppState;

const OWN_PROFILE_URL: &str = "/users/@me/";

async fn load_profile(state: &AppState, username: String) -> Result<Profile, ApiError> {
    state
        .query(move |db| db.get_profile_by_username(&username))
        .await?
        .map(ProfileRow::into_model)
        .or_not_found()
}

/// GET /users/
pub async fn list(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    jar: CookieJar,
) -> Result<Response, ApiError> {
    let rows = state.query(|db| db.list_profiles()).await?;
    let profiles: Vec<Profile> = rows.into_iter().map(ProfileRow::into_model).collect();

    let (jar, message) = flash::take(jar);
    let ctx = PageContext::new(Some(&actor), message.as_deref());
    Ok((jar, pages::user_list(&ctx, &profiles)).into_response())
}

/// GET /users/@me/
pub async fn me(Extension(actor): Extension<Actor>) -> Found {
    Found(actor.profile_url())
}

/// GET /users/{username}/: profile and the most recent echos.
pub async fn detail(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(username): Path<String>,
    jar: CookieJar,
) -> Result<Response, ApiError> {
    let profile = load_profile(&state, username).await?;
    let user_id = profile.user.id.to_string();
    let (rows, total) = state
        .query(move |db| {
            Ok((
                db.list_echos_by_user(&user_id, Some(PREVIEW_LIMIT))?,
                db.count_echos_by_user(&user_id)?,
            ))
        })
        .await?;
    let echos = Listing::preview(rows.into_iter().map(EchoRow::into_model).collect(), total);

    let (jar, message) = flash::take(jar);
    let ctx = PageContext::new(Some(&actor), message.as_deref());
    Ok((jar, pages::user_detail(&ctx, &profile, &echos, true)).into_response())
}

/// GET /users/{username}/echos/
pub async fn echos(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(username): Path<String>,
    jar: CookieJar,
) -> Result<Response, ApiError> {
    let profile = load_profile(&state, username).await?;
    let user_id = profile.user.id.to_string();
    let rows = state
        .query(move |db| db.list_echos_by_user(&user_id, None))
        .await?;
    let echos = Listing::full(rows.into_iter().map(EchoRow::into_model).collect());

    let (jar, message) = flash::take(jar);
    let ctx = PageContext::new(Some(&actor), message.as_deref());
    Ok((jar, pages::user_detail(&ctx, &profile, &echos, false)).into_response())
}

/// GET /users/{username}/edit/
pub async fn edit_page(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(username): Path<String>,
) -> Result<Response, ApiError> {
    let profile = load_profile(&state, username).await?;
    authorize(&actor, &profile)?;

    let ctx = PageContext::new(Some(&actor), None);
    Ok(pages::profile_form(&ctx, &profile, &profile.bio, &FormErrors::default()).into_response())
}

async fn read_profile_form(mut multipart: Multipart) -> Result<ProfileForm, MultipartError> {
    let mut form = ProfileForm::default();
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "bio" => form.bio = field.text().await?,
            "avatar" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let data = field.bytes().await?;
                debug!("Received avatar '{}' ({} bytes)", file_name, data.len());
                form.avatar = Some(AvatarUpload { file_name, data: data.to_vec() });
            }
            _ => {}
        }
    }
    Ok(form)
}

/// POST /users/{username}/edit/: multipart bio and avatar.
///
/// The new avatar file is written before the row is committed and removed
/// again if the commit fails. The replaced avatar is removed after commit.
pub async fn edit(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(username): Path<String>,
    jar: CookieJar,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let profile = load_profile(&state, username).await?;
    authorize(&actor, &profile)?;
    let multipart = multipart?;

    let max_bytes = state.settings.max_avatar_bytes;
    let render = |bio: &str, errors: &FormErrors| {
        let ctx = PageContext::new(Some(&actor), None);
        pages::profile_form(&ctx, &profile, bio, errors).into_response()
    };

    let form = match read_profile_form(multipart).await {
        Ok(form) => form,
        Err(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            warn!("Oversized profile upload from {}", actor.username);
            let errors = FormErrors::single("avatar", avatar_too_large(max_bytes));
            return Ok(render(&profile.bio, &errors));
        }
        Err(e) => return Err(ApiError::BadRequest(e.body_text())),
    };

    let (bio, avatar) = match form.validate(max_bytes) {
        Ok(cleaned) => cleaned,
        Err(errors) => return Ok(render(&form.bio, &errors)),
    };

    let new_avatar = match &avatar {
        Some(avatar) => Some(state.media.save_avatar(avatar).await?),
        None => None,
    };

    let user_id = profile.user.id.to_string();
    let stored = new_avatar.clone();
    let result = state
        .query(move |db| db.update_profile(&user_id, &bio, stored.as_deref()))
        .await;

    let previous = match result {
        Ok(Some(previous)) => previous,
        Ok(None) => {
            discard(&state, new_avatar.as_deref()).await;
            return Err(ApiError::NotFound);
        }
        Err(e) => {
            discard(&state, new_avatar.as_deref()).await;
            return Err(e);
        }
    };

    if new_avatar.is_some() && previous != DEFAULT_AVATAR {
        if let Err(e) = state.media.delete(&previous).await {
            warn!("Could not remove replaced avatar {}: {:#}", previous, e);
        }
    }
    info!("{} updated their profile", actor.username);

    let jar = flash::set(jar, "Profile updated successfully");
    Ok((jar, Found(OWN_PROFILE_URL.into())).into_response())
}

/// Removes an avatar written for an update that never committed.
async fn discard(state: &AppState, avatar: Option<&str>) {
    let Some(avatar) = avatar else { return };
    if let Err(e) = state.media.delete(avatar).await {
        warn!("Could not remove orphaned avatar {}: {:#}", avatar, e);
    }
}
