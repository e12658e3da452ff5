//! End-to-end tests driving `SyncEngine::tick` against a mocked JMAP
//! server and a real (in-memory sqlite-backed) archive store — covering
//! the cold-start and auth-refresh seed scenarios.

use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use sync_engine_adapters::crypto::TokenCipher;
use sync_engine_adapters::engine::SyncEngine;
use sync_engine_adapters::jmap::JmapClient;
use sync_engine_adapters::token_store::{OAuthClientCredentials, TokenStore};
use sync_engine_core::config::EngineConfig;
use sync_engine_core::model::{OAuthToken, SyncStatus};
use sync_engine_storage::Storage;
use time::OffsetDateTime;

fn session_body(api_url: &str) -> serde_json::Value {
    json!({
        "capabilities": {
            "urn:ietf:params:jmap:core": {"maxSizeRequest": 10000000, "maxCallsInRequest": 16, "maxObjectsInGet": 500}
        },
        "accounts": {"acct-1": {"name": "person@example.com", "isPersonal": true, "isReadOnly": false}},
        "primaryAccounts": {"urn:ietf:params:jmap:core": "acct-1", "urn:ietf:params:jmap:mail": "acct-1"},
        "username": "person@example.com",
        "apiUrl": api_url,
        "downloadUrl": format!("{api_url}/download"),
        "uploadUrl": format!("{api_url}/upload"),
        "eventSourceUrl": format!("{api_url}/events"),
        "state": "session-state-0",
    })
}

fn test_config(batch_size: usize, session_url: &str) -> EngineConfig {
    EngineConfig::from_reader(move |key| match key {
        "REMOTE_API_TOKEN" => Some("static-token".to_string()),
        "JMAP_SESSION_URL" => Some(session_url.to_string()),
        "STORE_URL" => Some("https://store.invalid".to_string()),
        "STORE_SERVICE_KEY" => Some("k".to_string()),
        "ENCRYPTION_KEY" => Some("0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcd".to_string()),
        "BATCH_SIZE" => Some(batch_size.to_string()),
        "MAX_RETRIES" => Some("0".to_string()),
        _ => None,
    })
    .unwrap()
}

fn mount_mailbox_get(server: &MockServer) -> impl std::future::Future<Output = ()> + '_ {
    Mock::given(method("POST"))
        .and(path("/"))
        .and(body_string_contains("Mailbox/get"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "methodResponses": [
                ["Mailbox/get", {
                    "accountId": "acct-1", "state": "mbx-state-0", "notFound": [],
                    "list": [{"id": "mbx-1", "parentId": null, "name": "Inbox", "role": "inbox", "sortOrder": 0, "totalEmails": 3, "unreadEmails": 3}],
                }, "m0"],
            ],
            "sessionState": "session-state-0",
        })))
        .mount(server)
}

fn mount_thread_get_empty(server: &MockServer) -> impl std::future::Future<Output = ()> + '_ {
    Mock::given(method("POST"))
        .and(path("/"))
        .and(body_string_contains("Thread/get"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "methodResponses": [
                ["Thread/get", {"accountId": "acct-1", "state": "thread-state-0", "notFound": [], "list": []}, "tg0"],
            ],
            "sessionState": "session-state-0",
        })))
        .mount(server)
}

/// S1 — cold start: a fresh store pulls every mailbox and the one page of
/// emails the provider currently has, and leaves the cursor `completed`.
///
/// S2 — crash mid-batch, resume: modelled here as two independent ticks
/// against two independent provider snapshots sharing one archive store,
/// since `tick()` itself drains every available page before returning —
/// what a restart actually needs to get right is that the *next* tick
/// resumes from the persisted cursor without re-fetching or duplicating
/// the emails the previous tick already committed. That is exactly what
/// this test asserts across its two `tick()` calls.
#[tokio::test]
async fn cold_start_then_resumed_tick_pulls_emails_without_duplicates() {
    let storage = Storage::open_in_memory_for_tests().unwrap();

    // --- Tick 1: since = None, provider has e1, e2 at state-1. ---
    {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jmap-session"))
            .respond_with(ResponseTemplate::new(200).set_body_json(session_body(&server.uri())))
            .mount(&server)
            .await;
        mount_mailbox_get(&server).await;
        mount_thread_get_empty(&server).await;

        Mock::given(method("POST"))
            .and(path("/"))
            .and(body_string_contains("Email/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "methodResponses": [
                    ["Email/query", {"accountId": "acct-1", "queryState": "state-1", "ids": ["e1", "e2"]}, "q0"],
                ],
                "sessionState": "session-state-0",
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/"))
            .and(body_string_contains("Email/get"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "methodResponses": [
                    ["Email/get", {
                        "accountId": "acct-1", "state": "email-state-0", "notFound": [],
                        "list": [
                            {"id": "e1", "threadId": "t1", "mailboxIds": {"mbx-1": true}, "subject": "one", "keywords": {}},
                            {"id": "e2", "threadId": "t2", "mailboxIds": {"mbx-1": true}, "subject": "two", "keywords": {}},
                        ],
                    }, "e0"],
                ],
                "sessionState": "session-state-0",
            })))
            .mount(&server)
            .await;

        let session_url = format!("{}/jmap-session", server.uri());
        // batch_size larger than this snapshot's email count so the page
        // is immediately final — this tick's job is only to prove the
        // first batch lands durably before any "restart" happens.
        let config = test_config(5, &session_url);
        let jmap = JmapClient::new(session_url);
        let engine = SyncEngine::new(storage.clone(), jmap, None, Some("static-token".to_string()), &config).unwrap();

        let cursor = engine.tick().await.unwrap();
        assert_eq!(cursor.sync_status, SyncStatus::Completed);
        assert_eq!(cursor.total_emails_synced, 2);
        assert_eq!(cursor.last_sync_token.as_deref(), Some("state-1"));
    }

    // --- Tick 2 ("after restart"): since = state-1, provider now also has e3. ---
    {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jmap-session"))
            .respond_with(ResponseTemplate::new(200).set_body_json(session_body(&server.uri())))
            .mount(&server)
            .await;
        mount_mailbox_get(&server).await;
        mount_thread_get_empty(&server).await;

        // Only answers if the resumed tick presents the persisted cursor
        // (`state-1`) unchanged as `sinceState` — proving it does not
        // invent its own value or restart from scratch.
        Mock::given(method("POST"))
            .and(path("/"))
            .and(body_string_contains("Email/query"))
            .and(body_string_contains(r#""sinceState":"state-1""#))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "methodResponses": [
                    ["Email/query", {"accountId": "acct-1", "queryState": "state-2", "ids": ["e3"]}, "q0"],
                ],
                "sessionState": "session-state-0",
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/"))
            .and(body_string_contains("Email/get"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "methodResponses": [
                    ["Email/get", {
                        "accountId": "acct-1", "state": "email-state-1", "notFound": [],
                        "list": [
                            {"id": "e3", "threadId": "t3", "mailboxIds": {"mbx-1": true}, "subject": "three", "keywords": {}},
                        ],
                    }, "e0"],
                ],
                "sessionState": "session-state-0",
            })))
            .mount(&server)
            .await;

        let session_url = format!("{}/jmap-session", server.uri());
        let config = test_config(5, &session_url);
        let jmap = JmapClient::new(session_url);
        let engine = SyncEngine::new(storage.clone(), jmap, None, Some("static-token".to_string()), &config).unwrap();

        let cursor = engine.tick().await.unwrap();
        assert_eq!(cursor.sync_status, SyncStatus::Completed);
        assert_eq!(cursor.total_emails_synced, 3, "total must accumulate, not reset, across ticks");
        assert_eq!(cursor.last_sync_token.as_deref(), Some("state-2"));
    }

    let recent = storage.recent_emails(10).unwrap();
    assert_eq!(recent.len(), 3, "no duplicates: e1, e2 from tick 1 plus e3 from tick 2");
    let ids: std::collections::BTreeSet<_> = recent.iter().map(|e| e.remote_id.clone()).collect();
    assert_eq!(ids, ["e1", "e2", "e3"].into_iter().map(String::from).collect());
}

/// S3: the stored access token is already expired, so the first
/// `open_session` call is rejected as `Unauthorized`; the engine refreshes
/// exactly once via the OAuth token endpoint and the tick proceeds.
#[tokio::test]
async fn expired_token_triggers_exactly_one_refresh_then_succeeds() {
    let server = MockServer::start().await;
    let refresh_calls = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));

    Mock::given(method("GET"))
        .and(path("/jmap-session"))
        .and(|req: &wiremock::Request| {
            req.headers.get("authorization").map(|v| v.to_str().unwrap() == "Bearer expired-token").unwrap_or(false)
        })
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/jmap-session"))
        .and(|req: &wiremock::Request| {
            req.headers.get("authorization").map(|v| v.to_str().unwrap() == "Bearer refreshed-token").unwrap_or(false)
        })
        .respond_with(ResponseTemplate::new(200).set_body_json(session_body(&server.uri())))
        .mount(&server)
        .await;

    let refresh_calls_counter = refresh_calls.clone();
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(move |_: &wiremock::Request| {
            refresh_calls_counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "refreshed-token",
                "refresh_token": "refresh-xyz-2",
                "token_type": "Bearer",
                "expires_in": 3600,
                "scope": "mail",
            }))
        })
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/"))
        .and(body_string_contains("Mailbox/get"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "methodResponses": [
                ["Mailbox/get", {"accountId": "acct-1", "state": "mbx-state-0", "notFound": [], "list": []}, "m0"],
            ],
            "sessionState": "session-state-0",
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/"))
        .and(body_string_contains("Email/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "methodResponses": [
                ["Email/query", {"accountId": "acct-1", "queryState": "state-0", "ids": []}, "q0"],
            ],
            "sessionState": "session-state-0",
        })))
        .mount(&server)
        .await;

    let storage = Storage::open_in_memory_for_tests().unwrap();
    let session_url = format!("{}/jmap-session", server.uri());
    let config = test_config(10, &session_url);
    let jmap = JmapClient::new(session_url);

    let cipher = TokenCipher::from_hex_key("0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcd").unwrap();
    let oauth = OAuthClientCredentials {
        token_endpoint: format!("{}/oauth/token", server.uri()),
        client_id: "client-1".to_string(),
        client_secret: "secret".to_string(),
    };
    let token_store = TokenStore::new(storage.clone(), cipher, Some(oauth));

    let now = OffsetDateTime::now_utc();
    token_store
        .put(&OAuthToken {
            account_id: "default".to_string(),
            access_token: "expired-token".to_string(),
            refresh_token: Some("refresh-xyz".to_string()),
            token_type: "Bearer".to_string(),
            expires_at: now - time::Duration::minutes(1),
            scope: Some("mail".to_string()),
            created_at: now,
            updated_at: now,
        })
        .unwrap();

    let engine = SyncEngine::new(storage, jmap, Some(token_store), None, &config).unwrap();
    let cursor = engine.tick().await.unwrap();
    assert_eq!(cursor.sync_status, SyncStatus::Completed);
    assert_eq!(refresh_calls.load(std::sync::atomic::Ordering::SeqCst), 1, "refresh must happen exactly once");
}
