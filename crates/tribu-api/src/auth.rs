use anyhow::anyhow;
use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{
    Form,
    extract::{Query, State},
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::Deserialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use tribu_db::queries::NewAccount;
use tribu_types::forms::{FormErrors, LoginForm, SignupForm, USERNAME_TAKEN};
use tribu_types::models::{Actor, Claims};

use crate::error::ApiError;
use crate::flash;
use crate::pages::{self, PageContext};
use crate::redirect::{Found, LOGIN_URL, login_url, safe_next};
use crate::state::AppState;

pub const SESSION_COOKIE: &str = "tribu_session";

const BAD_CREDENTIALS: &str = "Incorrect username or password";

#[derive(Debug, Default, Deserialize)]
pub struct NextQuery {
    pub next: Option<String>,
}

/// Hash with Argon2id and a fresh random salt.
pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| anyhow!("password hashing failed: {}", e))
}

pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    let parsed = match PasswordHash::new(stored_hash) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!("Unparseable password hash in database: {}", e);
            return false;
        }
    };
    Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok()
}

pub fn create_token(secret: &str, user_id: Uuid, username: &str, days: i64) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (Utc::now() + chrono::Duration::days(days)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

/// Validates signature and expiry.
pub fn decode_token(secret: &str, token: &str) -> Option<Claims> {
    match decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    ) {
        Ok(data) => Some(data.claims),
        Err(e) => {
            debug!("Rejected session token: {}", e);
            None
        }
    }
}

/// Resolves the session cookie to a user that still exists.
pub async fn current_actor(state: &AppState, jar: &CookieJar) -> Result<Option<Actor>, ApiError> {
    let Some(token) = jar.get(SESSION_COOKIE).map(|c| c.value().to_string()) else {
        return Ok(None);
    };
    let Some(claims) = decode_token(&state.settings.secret_key, &token) else {
        return Ok(None);
    };

    let id = claims.sub;
    let user = state.query(move |db| db.get_user_by_id(&id.to_string())).await?;
    if user.is_none() {
        debug!("Session for deleted user {}", id);
    }
    Ok(user.map(|row| Actor { id, username: row.username }))
}

fn session_cookie(token: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

fn start_session(state: &AppState, jar: CookieJar, user_id: Uuid, username: &str) -> Result<CookieJar, ApiError> {
    let token = create_token(
        &state.settings.secret_key,
        user_id,
        username,
        state.settings.session_days,
    )?;
    Ok(jar.add(session_cookie(token)))
}

/// Runs password hashing off the async workers.
async fn blocking<F, T>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(anyhow!("blocking task failed: {}", e)))
}

fn login_action(next: Option<&str>) -> String {
    match safe_next(next) {
        Some(next) => login_url(next),
        None => LOGIN_URL.to_string(),
    }
}

// -- Login / logout --

/// GET /login/
pub async fn login_page(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<NextQuery>,
) -> Result<Response, ApiError> {
    if current_actor(&state, &jar).await?.is_some() {
        return Ok(Found("/".into()).into_response());
    }
    let (jar, message) = flash::take(jar);
    let ctx = PageContext::new(None, message.as_deref());
    let action = login_action(query.next.as_deref());
    Ok((jar, pages::login_form(&ctx, &action, "", &FormErrors::default())).into_response())
}

/// POST /login/
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<NextQuery>,
    Form(form): Form<LoginForm>,
) -> Result<Response, ApiError> {
    let action = login_action(query.next.as_deref());
    let render = |errors: &FormErrors| {
        let ctx = PageContext::new(None, None);
        pages::login_form(&ctx, &action, &form.username, errors).into_response()
    };

    let (username, password) = match form.validate() {
        Ok(credentials) => credentials,
        Err(errors) => return Ok(render(&errors)),
    };

    let lookup = username.clone();
    let user = state.query(move |db| db.get_user_by_username(&lookup)).await?;

    let verified = match user {
        Some(row) => {
            let hash = row.password.clone();
            blocking(move || verify_password(&password, &hash))
                .await?
                .then_some(row)
        }
        None => None,
    };

    let Some(row) = verified else {
        warn!("Failed login for '{}'", username);
        let mut errors = FormErrors::default();
        errors.add_general(BAD_CREDENTIALS);
        return Ok(render(&errors));
    };

    let user_id: Uuid = row
        .id
        .parse()
        .map_err(|e| anyhow!("corrupt user id '{}': {}", row.id, e))?;
    let jar = start_session(&state, jar, user_id, &row.username)?;
    info!("{} logged in", row.username);

    let target = safe_next(query.next.as_deref()).unwrap_or("/").to_string();
    Ok((jar, Found(target)).into_response())
}

/// GET /logout/
pub async fn logout(jar: CookieJar) -> impl IntoResponse {
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    (jar, Found("/".into()))
}

// -- Signup --

/// GET /signup/
pub async fn signup_page(State(state): State<AppState>, jar: CookieJar) -> Result<Response, ApiError> {
    if current_actor(&state, &jar).await?.is_some() {
        return Ok(Found("/".into()).into_response());
    }
    let ctx = PageContext::new(None, None);
    Ok(pages::signup_form(&ctx, &SignupForm::default(), &FormErrors::default()).into_response())
}

/// POST /signup/: creates the user and its profile, then logs in.
pub async fn signup(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<SignupForm>,
) -> Result<Response, ApiError> {
    if current_actor(&state, &jar).await?.is_some() {
        return Ok(Found("/".into()).into_response());
    }

    let render = |errors: &FormErrors| {
        let ctx = PageContext::new(None, None);
        pages::signup_form(&ctx, &form, errors).into_response()
    };

    let new_user = match form.validate() {
        Ok(new_user) => new_user,
        Err(errors) => return Ok(render(&errors)),
    };

    let lookup = new_user.username.clone();
    if state.query(move |db| db.username_exists(&lookup)).await? {
        return Ok(render(&FormErrors::single("username", USERNAME_TAKEN)));
    }

    let password = new_user.password.clone();
    let password_hash = blocking(move || hash_password(&password)).await??;

    let user_id = Uuid::new_v4();
    let account = new_user.clone();
    let created = state
        .query(move |db| {
            db.create_user_with_profile(
                &NewAccount {
                    id: &user_id.to_string(),
                    username: &account.username,
                    password_hash: &password_hash,
                    first_name: &account.first_name,
                    last_name: &account.last_name,
                    email: &account.email,
                },
                Utc::now(),
            )
        })
        .await;
    match created {
        Ok(()) => {}
        Err(ApiError::Internal(e)) if tribu_db::is_unique_violation(&e) => {
            warn!("Username {} was taken while signing up", new_user.username);
            return Ok(render(&FormErrors::single("username", USERNAME_TAKEN)));
        }
        Err(e) => return Err(e),
    }
    info!("New user {} ({})", new_user.username, user_id);

    let jar = start_session(&state, jar, user_id, &new_user.username)?;
    Ok((jar, Found("/".into())).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_round_trip() {
        let hash = hash_password("s3cret-pass").unwrap();
        assert!(verify_password("s3cret-pass", &hash));
        assert!(!verify_password("wrong", &hash));
        assert!(!verify_password("s3cret-pass", "not-a-phc-string"));
    }

    #[test]
    fn token_carries_identity() {
        let id = Uuid::new_v4();
        let token = create_token("test-secret", id, "ana", 1).unwrap();
        let claims = decode_token("test-secret", &token).unwrap();
        assert_eq!(claims.sub, id);
        assert_eq!(claims.username, "ana");
    }

    #[test]
    fn token_rejected_with_other_key_or_expired() {
        let id = Uuid::new_v4();
        let token = create_token("test-secret", id, "ana", 1).unwrap();
        assert!(decode_token("other-secret", &token).is_none());

        let expired = create_token("test-secret", id, "ana", -2).unwrap();
        assert!(decode_token("test-secret", &expired).is_none());
    }

    #[test]
    fn login_action_keeps_only_local_next() {
        assert_eq!(login_action(None), "/login/");
        assert_eq!(login_action(Some("https://evil.example/")), "/login/");
        assert_eq!(login_action(Some("/echos/7/")), login_url("/echos/7/"));
    }
}
