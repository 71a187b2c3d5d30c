//! Test helpers for inbound HTTP components.

use actix_session::{SessionMiddleware, storage::CookieSessionStore};
use actix_web::cookie::{Cookie, Key};
use actix_web::dev::ServiceResponse;
use actix_web::{HttpResponse, web};

use crate::domain::{Error, UserId};
use crate::inbound::http::session::SessionContext;

/// Route used by handler tests to sign a parent in.
pub const SIGN_IN_PATH: &str = "/test/sign-in/{user_id}";

/// Session middleware with a fresh key and an insecure cookie for local HTTP.
pub fn test_session_middleware() -> SessionMiddleware<CookieSessionStore> {
    SessionMiddleware::builder(CookieSessionStore::default(), Key::generate())
        .cookie_name("session".to_owned())
        .cookie_secure(false)
        .build()
}

/// Handler for [`SIGN_IN_PATH`].
pub async fn sign_in(
    session: SessionContext,
    path: web::Path<String>,
) -> Result<HttpResponse, Error> {
    let owner = UserId::new(path.into_inner())
        .map_err(|err| Error::invalid_request(err.to_string()))?;
    session.persist_owner(&owner)?;
    Ok(HttpResponse::NoContent().finish())
}

/// Extract the session cookie set by `response`.
pub fn session_cookie<B>(response: &ServiceResponse<B>) -> Cookie<'static> {
    response
        .response()
        .cookies()
        .find(|cookie| cookie.name() == "session")
        .map(Cookie::into_owned)
        .expect("session cookie set")
}
