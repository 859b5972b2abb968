//! Server-rendered HTML.

use axum::{extract::State, response::Html, response::IntoResponse};
use axum_extra::extract::cookie::CookieJar;
use chrono::{DateTime, Utc};

use tribu_types::forms::{FormErrors, SignupForm};
use tribu_types::models::{Actor, Echo, Profile, Wave, echo_url, user_url};

use crate::access::can_mutate;
use crate::auth::current_actor;
use crate::error::ApiError;
use crate::flash;
use crate::listing::{Listing, SUMMARY_WORDS, feed_banner, timesince, truncate_words};
use crate::state::AppState;

/// Per-request data every page shares.
pub struct PageContext<'a> {
    pub actor: Option<&'a Actor>,
    pub flash: Option<&'a str>,
    pub now: DateTime<Utc>,
}

impl<'a> PageContext<'a> {
    pub fn new(actor: Option<&'a Actor>, flash: Option<&'a str>) -> Self {
        Self { actor, flash, now: Utc::now() }
    }
}

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

fn layout(title: &str, ctx: &PageContext<'_>, body: &str) -> Html<String> {
    let mut nav = String::new();
    match ctx.actor {
        Some(actor) => {
            nav.push_str(&format!(
                r#"<a href="/echos/">Echos</a> <a href="/users/">Users</a> <a href="/users/@me/">@{}</a> <a href="/logout/">Logout</a>"#,
                escape(&actor.username)
            ));
        }
        None => nav.push_str(r#"<a href="/login/">Login</a> <a href="/signup/">Signup</a>"#),
    }

    let flash = ctx
        .flash
        .map(|m| format!(r#"<div class="flash">{}</div>"#, escape(m)))
        .unwrap_or_default();

    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="utf-8"><title>{title} | Tribu</title></head>
<body>
<header><a href="/">Tribu</a> <nav>{nav}</nav></header>
{flash}
<main>
{body}
</main>
</body>
</html>
"#,
        title = escape(title),
    ))
}

fn field_errors(errors: &FormErrors, field: &str) -> String {
    let messages = errors.field(field);
    if messages.is_empty() {
        return String::new();
    }
    let items: String = messages.iter().map(|m| format!("<li>{}</li>", escape(m))).collect();
    format!(r#"<ul class="errorlist">{}</ul>"#, items)
}

fn general_errors(errors: &FormErrors) -> String {
    errors
        .general()
        .iter()
        .map(|m| format!(r#"<p class="error">{}</p>"#, escape(m)))
        .collect()
}

fn author_link(username: &str) -> String {
    format!(r#"<a href="{}">{}</a>"#, escape(&user_url(username)), escape(username))
}

fn echo_summary(echo: &Echo, now: DateTime<Utc>, truncate: bool) -> String {
    let content = if truncate {
        truncate_words(&echo.content, SUMMARY_WORDS)
    } else {
        echo.content.clone()
    };
    format!(
        r#"<article class="echo">
<p><a href="{url}">{content}</a></p>
<footer>{author} · {since} ago</footer>
</article>
"#,
        url = echo.url(),
        content = escape(&content),
        author = author_link(&echo.author_username),
        since = timesince(echo.created_at, now),
    )
}

fn wave_item(wave: &Wave, ctx: &PageContext<'_>) -> String {
    let mut controls = String::new();
    if ctx.actor.is_some_and(|actor| can_mutate(actor, wave)) {
        controls.push_str(&format!(
            r#" <a href="/waves/{id}/edit/">Edit wave</a> <a href="/waves/{id}/delete/">Delete wave</a>"#,
            id = wave.id
        ));
    }
    format!(
        r#"<li class="wave">
<p>{content}</p>
<footer>{author} · {since} ago{controls}</footer>
</li>
"#,
        content = escape(&wave.content),
        author = author_link(&wave.author_username),
        since = timesince(wave.created_at, ctx.now),
    )
}

// -- Landing & errors --

/// GET /: public landing page.
pub async fn index(State(state): State<AppState>, jar: CookieJar) -> Result<impl IntoResponse, ApiError> {
    let actor = current_actor(&state, &jar).await?;
    let (jar, message) = flash::take(jar);
    let ctx = PageContext::new(actor.as_ref(), message.as_deref());
    let body = r#"<h1>Tribu</h1>
<p>Share what is on your mind and catch the waves it makes.</p>
<p><a href="/echos/">See the latest echos</a></p>"#;
    Ok((jar, layout("Home", &ctx, body)))
}

pub fn error_page(title: &str, message: &str) -> Html<String> {
    let ctx = PageContext::new(None, None);
    layout(title, &ctx, &format!("<h1>{}</h1>\n<p>{}</p>", escape(title), escape(message)))
}

// -- Echos --

pub fn echo_list(ctx: &PageContext<'_>, echos: &Listing<Echo>) -> Html<String> {
    let mut body = String::from("<h1>Echos</h1>\n<p><a href=\"/echos/add/\">Add echo</a></p>\n");
    match feed_banner(echos.total) {
        Some(banner) => {
            body.push_str(&format!("<p class=\"banner\">{}</p>\n", escape(&banner)));
            for echo in &echos.items {
                body.push_str(&echo_summary(echo, ctx.now, true));
            }
        }
        None => body.push_str("<p>No echos yet</p>\n"),
    }
    layout("Echos", ctx, &body)
}

/// Echo detail and the echo's full wave list share one template; the
/// "View all waves" link only appears when the listing is a truncated preview.
pub fn echo_detail(ctx: &PageContext<'_>, echo: &Echo, waves: &Listing<Wave>) -> Html<String> {
    let mut body = format!(
        r#"<article class="echo">
<p>{content}</p>
<footer>{author} · {since} ago</footer>
</article>
"#,
        content = escape(&echo.content),
        author = author_link(&echo.author_username),
        since = timesince(echo.created_at, ctx.now),
    );

    if ctx.actor.is_some_and(|actor| can_mutate(actor, echo)) {
        body.push_str(&format!(
            r#"<p><a href="/echos/{id}/edit/">Edit echo</a> <a href="/echos/{id}/delete/">Delete echo</a></p>"#,
            id = echo.id
        ));
    }

    body.push_str(&format!(
        r#"<h2>Waves</h2>
<p><a href="/echos/{}/waves/add/">Add wave</a></p>
"#,
        echo.id
    ));

    if waves.is_empty() {
        body.push_str("<p>No waves yet</p>\n");
    } else {
        body.push_str("<ul class=\"waves\">\n");
        for wave in &waves.items {
            body.push_str(&wave_item(wave, ctx));
        }
        body.push_str("</ul>\n");
        if waves.has_more() {
            body.push_str(&format!(
                r#"<p><a href="/echos/{}/waves/">View all waves</a></p>"#,
                echo.id
            ));
        }
    }

    layout("Echo", ctx, &body)
}

pub enum EchoFormKind<'a> {
    Add,
    Edit(&'a Echo),
}

pub fn echo_form(
    ctx: &PageContext<'_>,
    kind: EchoFormKind<'_>,
    content: &str,
    errors: &FormErrors,
) -> Html<String> {
    let (title, cancel) = match kind {
        EchoFormKind::Add => ("Add echo", "/echos/".to_string()),
        EchoFormKind::Edit(echo) => ("Edit echo", echo_url(echo.id)),
    };
    let body = format!(
        r#"<h1>{title}</h1>
<form method="post" novalidate>
<label for="id_content">Content</label>
{errors}<textarea name="content" id="id_content" rows="6">{content}</textarea>
<button type="submit">Save</button>
<a href="{cancel}">Cancel</a>
</form>
"#,
        errors = field_errors(errors, "content"),
        content = escape(content),
    );
    layout(title, ctx, &body)
}

// -- Waves --

pub enum WaveFormKind {
    Add,
    Edit,
}

pub fn wave_form(
    ctx: &PageContext<'_>,
    kind: WaveFormKind,
    echo: &Echo,
    content: &str,
    errors: &FormErrors,
) -> Html<String> {
    let title = match kind {
        WaveFormKind::Add => "Add wave",
        WaveFormKind::Edit => "Edit wave",
    };
    let body = format!(
        r#"<h1>{title}</h1>
<blockquote>{echo_content}</blockquote>
<form method="post" novalidate>
<label for="id_content">Content</label>
{errors}<textarea name="content" id="id_content" rows="4">{content}</textarea>
<button type="submit">Save</button>
<a href="{cancel}">Cancel</a>
</form>
"#,
        echo_content = escape(&truncate_words(&echo.content, SUMMARY_WORDS)),
        errors = field_errors(errors, "content"),
        content = escape(content),
        cancel = echo_url(echo.id),
    );
    layout(title, ctx, &body)
}

// -- Users --

pub fn user_list(ctx: &PageContext<'_>, profiles: &[Profile]) -> Html<String> {
    let mut body = String::from("<h1>Users</h1>\n");
    if profiles.is_empty() {
        body.push_str("<p>No users yet</p>\n");
    } else {
        body.push_str("<ul class=\"users\">\n");
        for profile in profiles {
            body.push_str(&format!(
                r#"<li><img src="{avatar}" alt="" width="32" height="32"> <a href="{url}">{username}</a></li>"#,
                avatar = escape(&profile.avatar_url()),
                url = escape(&profile.user.url()),
                username = escape(&profile.user.username),
            ));
        }
        body.push_str("</ul>\n");
    }
    layout("Users", ctx, &body)
}

/// Profile header plus the user's echos; the same template serves the
/// five-echo preview (summarised) and the full list (untruncated).
pub fn user_detail(
    ctx: &PageContext<'_>,
    profile: &Profile,
    echos: &Listing<Echo>,
    summarise: bool,
) -> Html<String> {
    let user = &profile.user;
    let mut body = format!(
        r#"<section class="profile">
<img src="{avatar}" alt="Avatar of {username}" width="128" height="128">
<h1>{username}</h1>
<p>{first_name} {last_name}</p>
<p><a href="mailto:{email}">{email}</a></p>
<p class="bio">{bio}</p>
"#,
        avatar = escape(&profile.avatar_url()),
        username = escape(&user.username),
        first_name = escape(&user.first_name),
        last_name = escape(&user.last_name),
        email = escape(&user.email),
        bio = escape(&profile.bio),
    );
    if ctx.actor.is_some_and(|actor| can_mutate(actor, profile)) {
        body.push_str(&format!(
            r#"<p><a href="/users/{}/edit/">Edit profile</a></p>"#,
            escape(&user.username)
        ));
    }
    body.push_str("</section>\n<h2>Echos</h2>\n");

    if echos.is_empty() {
        body.push_str("<p>No echos yet</p>\n");
    } else {
        for echo in &echos.items {
            body.push_str(&echo_summary(echo, ctx.now, summarise));
        }
        if echos.has_more() {
            body.push_str(&format!(
                r#"<p><a href="/users/{}/echos/">View all echos</a></p>"#,
                escape(&user.username)
            ));
        }
    }

    layout(&user.username, ctx, &body)
}

pub fn profile_form(
    ctx: &PageContext<'_>,
    profile: &Profile,
    bio: &str,
    errors: &FormErrors,
) -> Html<String> {
    let body = format!(
        r#"<h1>Edit profile</h1>
<form method="post" enctype="multipart/form-data" novalidate>
{current}
<label for="id_avatar">Avatar</label>
{avatar_errors}<input type="file" name="avatar" id="id_avatar" accept="image/*">
<label for="id_bio">Bio</label>
{bio_errors}<textarea name="bio" id="id_bio" rows="4">{bio}</textarea>
<button type="submit">Save</button>
<a href="/users/@me/">Cancel</a>
</form>
"#,
        current = current_avatar(profile),
        avatar_errors = field_errors(errors, "avatar"),
        bio_errors = field_errors(errors, "bio"),
        bio = escape(bio),
    );
    layout("Edit profile", ctx, &body)
}

fn current_avatar(profile: &Profile) -> String {
    if profile.has_default_avatar() {
        "<p>No avatar uploaded yet.</p>".to_string()
    } else {
        format!(
            r#"<p>Current avatar: <img src="{}" alt="" width="64" height="64"></p>"#,
            escape(&profile.avatar_url())
        )
    }
}

// -- Accounts --

pub fn login_form(
    ctx: &PageContext<'_>,
    action: &str,
    username: &str,
    errors: &FormErrors,
) -> Html<String> {
    let body = format!(
        r#"<h1>Login</h1>
{general}<form method="post" action="{action}" novalidate>
<label for="id_username">Username</label>
{username_errors}<input type="text" name="username" id="id_username" value="{username}">
<label for="id_password">Password</label>
{password_errors}<input type="password" name="password" id="id_password">
<button type="submit">Login</button>
</form>
<p>No account yet? <a href="/signup/">Sign up</a></p>
"#,
        general = general_errors(errors),
        action = escape(action),
        username_errors = field_errors(errors, "username"),
        username = escape(username),
        password_errors = field_errors(errors, "password"),
    );
    layout("Login", ctx, &body)
}

pub fn signup_form(ctx: &PageContext<'_>, form: &SignupForm, errors: &FormErrors) -> Html<String> {
    let mut fields = String::new();
    for (name, label, kind, value) in [
        ("username", "Username", "text", form.username.as_str()),
        ("password", "Password", "password", ""),
        ("first_name", "First name", "text", form.first_name.as_str()),
        ("last_name", "Last name", "text", form.last_name.as_str()),
        ("email", "Email address", "email", form.email.as_str()),
    ] {
        fields.push_str(&format!(
            r#"<label for="id_{name}">{label}</label>
{errors}<input type="{kind}" name="{name}" id="id_{name}" value="{value}">
"#,
            errors = field_errors(errors, name),
            value = escape(value),
        ));
    }
    let body = format!(
        r#"<h1>Sign up</h1>
{general}<form method="post" novalidate>
{fields}<button type="submit">Sign up</button>
</form>
<p>Already have an account? <a href="/login/">Login</a></p>
"#,
        general = general_errors(errors),
    );
    layout("Sign up", ctx, &body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tribu_types::models::{DEFAULT_AVATAR, User};
    use uuid::Uuid;

    #[test]
    fn escape_handles_markup() {
        assert_eq!(escape(r#"<b>"x" & 'y'</b>"#), "&lt;b&gt;&quot;x&quot; &amp; &#x27;y&#x27;&lt;/b&gt;");
    }

    #[test]
    fn form_errors_render_inline() {
        let errors = FormErrors::single("content", "This field is required.");
        let ctx = PageContext::new(None, None);
        let Html(html) = echo_form(&ctx, EchoFormKind::Add, "", &errors);
        assert!(html.contains("This field is required."));
        assert!(html.contains("novalidate"));
        assert!(html.contains(r#"href="/echos/""#));
    }

    #[test]
    fn owner_controls_only_for_owner() {
        let owner = Actor { id: Uuid::new_v4(), username: "ana".into() };
        let other = Actor { id: Uuid::new_v4(), username: "bob".into() };
        let echo = Echo {
            id: 9,
            content: "hi".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            author_id: owner.id,
            author_username: owner.username.clone(),
        };
        let waves = Listing::full(vec![]);

        let Html(mine) = echo_detail(&PageContext::new(Some(&owner), None), &echo, &waves);
        assert!(mine.contains("/echos/9/edit/"));
        assert!(mine.contains("No waves yet"));

        let Html(theirs) = echo_detail(&PageContext::new(Some(&other), None), &echo, &waves);
        assert!(!theirs.contains("Edit echo"));
        assert!(!theirs.contains("/echos/9/delete/"));
    }

    #[test]
    fn navigation_lists_and_signup_fields_render() {
        let ana = Actor { id: Uuid::new_v4(), username: "ana".into() };
        let profile = Profile {
            user: User {
                id: ana.id,
                username: "ana".into(),
                first_name: "Ana".into(),
                last_name: "Tribu".into(),
                email: "ana@example.com".into(),
                date_joined: Utc::now(),
            },
            bio: String::new(),
            avatar: DEFAULT_AVATAR.into(),
        };
        let ctx = PageContext::new(Some(&ana), None);

        let Html(users) = user_list(&ctx, std::slice::from_ref(&profile));
        assert!(users.contains(r#"<a href="/logout/">Logout</a>"#));
        assert!(users.contains(r#"<a href="/users/@me/">@ana</a>"#));
        assert!(users.contains(r#"<a href="/users/ana/">ana</a></li>"#));

        let echos = Listing::preview(vec![], 6);
        let Html(detail) = user_detail(&ctx, &profile, &echos, true);
        assert!(detail.contains(r#"<a href="/users/ana/edit/">Edit profile</a>"#));

        let anonymous = PageContext::new(None, None);
        let form = SignupForm { username: "a<b".into(), ..SignupForm::default() };
        let errors = FormErrors::single("email", "Enter a valid email address.");
        let Html(signup) = signup_form(&anonymous, &form, &errors);
        assert!(signup.contains(r#"<input type="text" name="username" id="id_username" value="a&lt;b">"#));
        assert!(signup.contains(r#"<input type="password" name="password" id="id_password" value="">"#));
        assert!(signup.contains("Enter a valid email address."));
        assert!(signup.contains(r#"<a href="/signup/">Signup</a>"#));
    }
}
