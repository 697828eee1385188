use std::sync::Arc;

use axum::Router;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::Serialize;

use notify_api::auth::jwt::{JwtVerifier, TokenVerifier};
use notify_api::config::Config;
use notify_api::store::memory::MemoryStore;
use notify_api::AppState;

/// Shared secret between the test token issuer and the service under test.
pub const TEST_SECRET: &str = "test-secret-do-not-use-in-production";

#[derive(Debug, Serialize)]
struct TestClaims {
    sub: String,
    email: Option<String>,
    iat: i64,
    exp: i64,
}

fn mint(user_id: &str, expires_in_secs: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let claims = TestClaims {
        sub: user_id.to_string(),
        email: Some(format!("{user_id}@example.com")),
        iat: now,
        exp: now + expires_in_secs,
    };
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
    )
    .expect("mint test token")
}

/// Mint a valid bearer JWT for a user.
pub fn mint_test_token(user_id: &str) -> String {
    mint(user_id, 300)
}

/// Mint an already-expired JWT for rejection tests.
pub fn mint_expired_token(user_id: &str) -> String {
    mint(user_id, -300)
}

/// Build a test AppState backed by the in-memory store.
pub fn test_state() -> AppState {
    let config = Config {
        database_url: None,
        jwt_secret: TEST_SECRET.to_string(),
        port: 0,
    };
    let memory = Arc::new(MemoryStore::new());
    let verifier: Arc<dyn TokenVerifier> = Arc::new(JwtVerifier::new(TEST_SECRET));
    AppState::new(memory.clone(), memory, verifier, Arc::new(config))
}

/// Build the full application router wired to the test state.
pub fn test_app() -> (Router, AppState) {
    let state = test_state();
    let app = notify_api::routes::router().with_state(state.clone());
    (app, state)
}
