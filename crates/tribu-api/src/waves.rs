use axum::{
    Extension, Form,
    extract::{Path, State, rejection::FormRejection},
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;
use tracing::info;

use tribu_db::models::WaveRow;
use tribu_types::forms::{FormErrors, WaveForm};
use tribu_types::models::{Actor, Wave, echo_url};

use crate::access::authorize;
use crate::echos::load_echo;
use crate::error::{ApiError, OrNotFound, parse_id};
use crate::flash;
use crate::pages::{self, PageContext, WaveFormKind};
use crate::redirect::Found;
use crate::state::AppState;

async fn load_wave(state: &AppState, id: i64) -> Result<Wave, ApiError> {
    state
        .query(move |db| db.get_wave(id))
        .await?
        .map(WaveRow::into_model)
        .or_not_found()
}

/// GET /echos/{echo_id}/waves/add/
pub async fn add_page(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(echo_id): Path<String>,
) -> Result<Response, ApiError> {
    let echo = load_echo(&state, parse_id(&echo_id)?).await?;
    let ctx = PageContext::new(Some(&actor), None);
    Ok(pages::wave_form(&ctx, WaveFormKind::Add, &echo, "", &FormErrors::default()).into_response())
}

/// POST /echos/{echo_id}/waves/add/: the parent comes from the path only.
pub async fn add(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(echo_id): Path<String>,
    jar: CookieJar,
    form: Result<Form<WaveForm>, FormRejection>,
) -> Result<Response, ApiError> {
    let echo = load_echo(&state, parse_id(&echo_id)?).await?;
    let Form(form) = form?;

    let content = match form.validate() {
        Ok(content) => content,
        Err(errors) => {
            let ctx = PageContext::new(Some(&actor), None);
            return Ok(
                pages::wave_form(&ctx, WaveFormKind::Add, &echo, &form.content, &errors).into_response(),
            );
        }
    };

    let echo_id = echo.id;
    let author = actor.id.to_string();
    let id = state
        .query(move |db| db.insert_wave(echo_id, &author, &content, Utc::now()))
        .await?;
    info!("{} waved on echo {} (wave {})", actor.username, echo_id, id);

    let jar = flash::set(jar, "Wave added successfully");
    Ok((jar, Found(echo_url(echo_id))).into_response())
}

/// GET /waves/{wave_id}/edit/
pub async fn edit_page(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(wave_id): Path<String>,
) -> Result<Response, ApiError> {
    let wave = load_wave(&state, parse_id(&wave_id)?).await?;
    authorize(&actor, &wave)?;
    let echo = load_echo(&state, wave.echo_id).await?;

    let ctx = PageContext::new(Some(&actor), None);
    Ok(
        pages::wave_form(&ctx, WaveFormKind::Edit, &echo, &wave.content, &FormErrors::default())
            .into_response(),
    )
}

/// POST /waves/{wave_id}/edit/
pub async fn edit(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(wave_id): Path<String>,
    jar: CookieJar,
    form: Result<Form<WaveForm>, FormRejection>,
) -> Result<Response, ApiError> {
    let wave = load_wave(&state, parse_id(&wave_id)?).await?;
    authorize(&actor, &wave)?;
    let Form(form) = form?;

    let content = match form.validate() {
        Ok(content) => content,
        Err(errors) => {
            let echo = load_echo(&state, wave.echo_id).await?;
            let ctx = PageContext::new(Some(&actor), None);
            return Ok(
                pages::wave_form(&ctx, WaveFormKind::Edit, &echo, &form.content, &errors)
                    .into_response(),
            );
        }
    };

    let id = wave.id;
    if !state.query(move |db| db.update_wave(id, &content, Utc::now())).await? {
        return Err(ApiError::NotFound);
    }
    info!("{} edited wave {}", actor.username, id);

    let jar = flash::set(jar, "Wave updated successfully");
    Ok((jar, Found(echo_url(wave.echo_id))).into_response())
}

/// GET /waves/{wave_id}/delete/
pub async fn delete(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(wave_id): Path<String>,
    jar: CookieJar,
) -> Result<Response, ApiError> {
    let wave = load_wave(&state, parse_id(&wave_id)?).await?;
    authorize(&actor, &wave)?;

    let id = wave.id;
    if !state.query(move |db| db.delete_wave(id)).await? {
        return Err(ApiError::NotFound);
    }
    info!("{} deleted wave {}", actor.username, id);

    let jar = flash::set(jar, "Wave deleted successfully");
    Ok((jar, Found(echo_url(wave.echo_id))).into_response())
}
