use axum::{
    Extension, Form,
    extract::{Path, State, rejection::FormRejection},
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;
use tracing::info;

use tribu_db::models::{EchoRow, WaveRow};
use tribu_types::forms::{EchoForm, FormErrors};
use tribu_types::models::{Actor, Echo, echo_url};

use crate::access::authorize;
use crate::error::{ApiError, OrNotFound, parse_id};
use crate::flash;
use crate::listing::{Listing, PREVIEW_LIMIT};
use crate::pages::{self, EchoFormKind, PageContext};
use crate::redirect::Found;
use crate::state::AppState;

pub(crate) async fn load_echo(state: &AppState, id: i64) -> Result<Echo, ApiError> {
    state
        .query(move |db| db.get_echo(id))
        .await?
        .map(EchoRow::into_model)
        .or_not_found()
}

/// GET /echos/: every echo, newest first.
pub async fn list(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    jar: CookieJar,
) -> Result<Response, ApiError> {
    let rows = state.query(|db| db.list_echos(None)).await?;
    let echos = Listing::full(rows.into_iter().map(EchoRow::into_model).collect());

    let (jar, message) = flash::take(jar);
    let ctx = PageContext::new(Some(&actor), message.as_deref());
    Ok((jar, pages::echo_list(&ctx, &echos)).into_response())
}

/// GET /echos/{echo_id}/: the echo and its most recent waves.
pub async fn detail(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(echo_id): Path<String>,
    jar: CookieJar,
) -> Result<Response, ApiError> {
    let id = parse_id(&echo_id)?;
    let echo = load_echo(&state, id).await?;
    let (rows, total) = state
        .query(move |db| Ok((db.list_waves(id, Some(PREVIEW_LIMIT))?, db.count_waves(id)?)))
        .await?;
    let waves = Listing::preview(rows.into_iter().map(WaveRow::into_model).collect(), total);

    let (jar, message) = flash::take(jar);
    let ctx = PageContext::new(Some(&actor), message.as_deref());
    Ok((jar, pages::echo_detail(&ctx, &echo, &waves)).into_response())
}

/// GET /echos/{echo_id}/waves/: every wave of the echo.
pub async fn waves(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(echo_id): Path<String>,
    jar: CookieJar,
) -> Result<Response, ApiError> {
    let id = parse_id(&echo_id)?;
    let echo = load_echo(&state, id).await?;
    let rows = state.query(move |db| db.list_waves(id, None)).await?;
    let waves = Listing::full(rows.into_iter().map(WaveRow::into_model).collect());

    let (jar, message) = flash::take(jar);
    let ctx = PageContext::new(Some(&actor), message.as_deref());
    Ok((jar, pages::echo_detail(&ctx, &echo, &waves)).into_response())
}

/// GET /echos/add/
pub async fn add_page(Extension(actor): Extension<Actor>) -> impl IntoResponse {
    let ctx = PageContext::new(Some(&actor), None);
    pages::echo_form(&ctx, EchoFormKind::Add, "", &FormErrors::default())
}

/// POST /echos/add/
pub async fn add(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    jar: CookieJar,
    form: Result<Form<EchoForm>, FormRejection>,
) -> Result<Response, ApiError> {
    let Form(form) = form?;
    let content = match form.validate() {
        Ok(content) => content,
        Err(errors) => {
            let ctx = PageContext::new(Some(&actor), None);
            return Ok(pages::echo_form(&ctx, EchoFormKind::Add, &form.content, &errors).into_response());
        }
    };

    let author = actor.id.to_string();
    let id = state
        .query(move |db| db.insert_echo(&author, &content, Utc::now()))
        .await?;
    info!("{} posted echo {}", actor.username, id);

    let jar = flash::set(jar, "Echo added successfully");
    Ok((jar, Found(echo_url(id))).into_response())
}

/// GET /echos/{echo_id}/edit/
pub async fn edit_page(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(echo_id): Path<String>,
) -> Result<Response, ApiError> {
    let echo = load_echo(&state, parse_id(&echo_id)?).await?;
    authorize(&actor, &echo)?;

    let ctx = PageContext::new(Some(&actor), None);
    Ok(pages::echo_form(&ctx, EchoFormKind::Edit(&echo), &echo.content, &FormErrors::default())
        .into_response())
}

/// POST /echos/{echo_id}/edit/
pub async fn edit(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(echo_id): Path<String>,
    jar: CookieJar,
    form: Result<Form<EchoForm>, FormRejection>,
) -> Result<Response, ApiError> {
    let echo = load_echo(&state, parse_id(&echo_id)?).await?;
    authorize(&actor, &echo)?;
    let Form(form) = form?;

    let content = match form.validate() {
        Ok(content) => content,
        Err(errors) => {
            let ctx = PageContext::new(Some(&actor), None);
            return Ok(
                pages::echo_form(&ctx, EchoFormKind::Edit(&echo), &form.content, &errors)
                    .into_response(),
            );
        }
    };

    let id = echo.id;
    let updated = state
        .query(move |db| db.update_echo(id, &content, Utc::now()))
        .await?;
    if !updated {
        return Err(ApiError::NotFound);
    }
    info!("{} edited echo {}", actor.username, id);

    let jar = flash::set(jar, "Echo updated successfully");
    Ok((jar, Found(echo_url(id))).into_response())
}

/// GET /echos/{echo_id}/delete/: removes the echo and, by cascade, its waves.
pub async fn delete(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(echo_id): Path<String>,
    jar: CookieJar,
) -> Result<Response, ApiError> {
    let echo = load_echo(&state, parse_id(&echo_id)?).await?;
    authorize(&actor, &echo)?;

    let id = echo.id;
    if !state.query(move |db| db.delete_echo(id)).await? {
        return Err(ApiError::NotFound);
    }
    info!("{} deleted echo {}", actor.username, id);

    let jar = flash::set(jar, "Echo deleted successfully");
    Ok((jar, Found("/echos/".into())).into_response())
}
