//! Session inspection and control. Streams themselves are created by the
//! WebSocket transport; these routes observe them and drive focus changes.

use crate::{error::AppError, state::AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;

pub async fn list_sessions(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let sessions = state.sessions.snapshots();

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "count": sessions.len(),
        "sessions": sessions
    })))
}

pub async fn get_session(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let session_id = path.into_inner();
    let stream = state
        .sessions
        .get(&session_id)
        .ok_or_else(|| AppError::NotFound(format!("Session '{}' not found", session_id)))?;

    Ok(HttpResponse::Ok().json(stream.snapshot()))
}

/// Cut the current response short, as when the player starts talking.
pub async fn interrupt_session(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let session_id = path.into_inner();
    let stream = state
        .sessions
        .get(&session_id)
        .ok_or_else(|| AppError::NotFound(format!("Session '{}' not found", session_id)))?;

    let dropped_chunks = stream.interrupt();

    Ok(HttpResponse::Ok().json(json!({
        "status": "interrupted",
        "session_id": session_id,
        "dropped_chunks": dropped_chunks
    })))
}

/// Give this session focus; every other stream is interrupted and paused.
pub async fn activate_session(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let session_id = path.into_inner();
    state.sessions.activate(&session_id)?;

    Ok(HttpResponse::Ok().json(json!({
        "status": "active",
        "session_id": session_id
    })))
}

pub async fn delete_session(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let session_id = path.into_inner();
    if !state.sessions.remove(&session_id) {
        return Err(AppError::NotFound(format!("Session '{}' not found", session_id)));
    }

    Ok(HttpResponse::NoContent().finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::chunk::RawChunk;
    use crate::audio::playback::UnitQueue;
    use crate::config::AppConfig;
    use actix_web::{http::StatusCode, test, App};
    use std::sync::Arc;

    fn app_state() -> web::Data<AppState> {
        let state = AppState::new(AppConfig::default());
        for id in ["guard", "merchant"] {
            state
                .sessions
                .create_session(Some(id.to_string()), Arc::new(UnitQueue::new()))
                .unwrap();
        }
        web::Data::new(state)
    }

    #[actix_web::test]
    async fn test_session_routes() {
        let state = app_state();
        let app = test::init_service(
            App::new()
                .app_data(state.clone())
                .route("/sessions", web::get().to(list_sessions))
                .route("/sessions/{id}", web::get().to(get_session))
                .route("/sessions/{id}", web::delete().to(delete_session))
                .route("/sessions/{id}/interrupt", web::post().to(interrupt_session))
                .route("/sessions/{id}/activate", web::post().to(activate_session)),
        )
        .await;

        let req = test::TestRequest::get().uri("/sessions").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["count"], 2);

        let guard = state.sessions.get("guard").unwrap();
        guard.enqueue(RawChunk::end_marker());
        let req = test::TestRequest::post().uri("/sessions/guard/interrupt").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["dropped_chunks"], 1);

        let req = test::TestRequest::post().uri("/sessions/merchant/activate").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
        let req = test::TestRequest::get().uri("/sessions/guard").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "inactive");

        let req = test::TestRequest::post().uri("/sessions/nobody/activate").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::delete().uri("/sessions/guard").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NO_CONTENT);
        let req = test::TestRequest::get().uri("/sessions/guard").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }
}
