//! OAuth2 Authorization Endpoint
//!
//! `GET /oauth2/authorize` renders the login form; the form posts to
//! `/oauth2/authorize/submit`, which redirects back to the client with a code.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    Form,
};

use crate::flows::authorization_code::{self, AuthorizeParams, SubmitOutcome, SubmitParams};
use crate::oauth::html::login_page;
use crate::AppState;

/// Handler for `GET /oauth2/authorize`
pub async fn get_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AuthorizeParams>,
) -> Response {
    match authorization_code::initiate(&state, params) {
        Ok(form) => Html(login_page(&form)).into_response(),
        Err(e) => (e.status(), e.public_message()).into_response(),
    }
}

/// Handler for `POST /oauth2/authorize/submit`
pub async fn submit_handler(
    State(state): State<Arc<AppState>>,
    Form(params): Form<SubmitParams>,
) -> Response {
    match authorization_code::submit(&state, params) {
        Ok(SubmitOutcome::Redirect(location)) => {
            (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
        }
        Ok(SubmitOutcome::Retry(form)) => Html(login_page(&form)).into_response(),
        Err(e) => (e.status(), e.public_message()).into_response(),
    }
}
