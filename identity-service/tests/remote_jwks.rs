mod support;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{routing::get, Json, Router};
use common_auth::{AuthError, ACCESS_TOKEN_COOKIE};
use identity_service::keys::SigningKeys;
use support::{pick_cookie, private_pem, TestApp, REFRESH_SECRET};
use tokio::net::TcpListener;

#[tokio::test(flavor = "multi_thread")]
async fn remote_key_set_survives_failed_refreshes() -> Result<()> {
    let published = SigningKeys::from_private_pem(private_pem(), None, REFRESH_SECRET)?.jwk_set();
    let attempts = Arc::new(AtomicUsize::new(0));

    let router = Router::new().route(
        "/jwks",
        get({
            let attempts = attempts.clone();
            move || {
                let attempts = attempts.clone();
                let published = published.clone();
                async move {
                    match attempts.fetch_add(1, Ordering::SeqCst) {
                        0 => (StatusCode::OK, Json(published)).into_response(),
                        1 => StatusCode::BAD_GATEWAY.into_response(),
                        _ => (StatusCode::OK, "not json").into_response(),
                    }
                }
            }
        }),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let server = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, router.into_make_service()).await {
            eprintln!("JWKS server error: {err}");
        }
    });

    let app = TestApp::spawn_with_jwks(Some(format!("http://{addr}/jwks"))).await?;
    assert_eq!(attempts.load(Ordering::SeqCst), 1);

    app.register("grace@example.com").await?;
    let cookies = app.session_for("grace@example.com").await?;
    let access = pick_cookie(&cookies, ACCESS_TOKEN_COOKIE);

    assert_eq!(
        app.get("/auth/self", &[access.clone()]).await?.status(),
        StatusCode::OK
    );

    match app.state.jwt_verifier.refresh_jwks().await {
        Err(AuthError::JwksFetch(_)) => (),
        other => panic!("expected fetch failure, got {other:?}"),
    }
    match app.state.jwt_verifier.refresh_jwks().await {
        Err(AuthError::JwksDecode(_)) => (),
        other => panic!("expected decode failure, got {other:?}"),
    }

    // Previously loaded keys stay in place.
    assert_eq!(
        app.get("/auth/self", &[access]).await?.status(),
        StatusCode::OK
    );

    server.abort();
    Ok(())
}

#[tokio::test]
async fn unreachable_key_set_fails_startup() {
    let result = TestApp::spawn_with_jwks(Some("http://127.0.0.1:9/jwks".to_string())).await;
    assert!(result.is_err());
}
