//! One-shot confirmation messages carried across a redirect in a cookie.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use percent_encoding::{NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};

const FLASH_COOKIE: &str = "tribu_flash";

/// Queues `message` for the next rendered page.
pub fn set(jar: CookieJar, message: &str) -> CookieJar {
    let value = utf8_percent_encode(message, NON_ALPHANUMERIC).to_string();
    jar.add(
        Cookie::build((FLASH_COOKIE, value))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax),
    )
}

/// Removes the pending message, if any, and returns it.
pub fn take(jar: CookieJar) -> (CookieJar, Option<String>) {
    let Some(message) = jar
        .get(FLASH_COOKIE)
        .map(|c| percent_decode_str(c.value()).decode_utf8_lossy().into_owned())
    else {
        return (jar, None);
    };
    let jar = jar.remove(Cookie::build(FLASH_COOKIE).path("/"));
    (jar, Some(message).filter(|m| !m.is_empty()))
}
