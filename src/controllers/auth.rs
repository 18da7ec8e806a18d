use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::{session::resolve_role, AppState};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/auth/callback", get(auth_callback))
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    code: Option<String>,
}

/// GET /api/auth/callback?code=...
///
/// Email-verification landing: exchanges the authorization code for a
/// session, makes sure the profile row exists (resolving the role on the
/// way), then sends the browser onward.
async fn auth_callback(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let Some(code) = query.code.filter(|c| !c.is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Missing code parameter" })),
        )
            .into_response();
    };

    let session = match state.auth.exchange_code(&code).await {
        Ok(session) => session,
        Err(e) => {
            tracing::error!("Auth callback error: {}", e);
            return Redirect::to("/login?error=VerificationFailed").into_response();
        }
    };

    match resolve_role(&session.user, &state.db).await {
        Ok(role) => {
            tracing::info!(
                "Verified {} with role {}",
                session.user.email,
                role.as_str()
            );
            Redirect::to("/dashboard").into_response()
        }
        Err(e) => {
            tracing::error!("Profile initialization failed for {}: {}", session.user.id, e);
            Redirect::to("/login?error=VerificationFailed").into_response()
        }
    }
}
