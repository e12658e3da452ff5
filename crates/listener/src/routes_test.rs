#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use hmac::{Hmac, Mac};
    use http_body_util::BodyExt;
    use sha2::Sha256;
    use tower::ServiceExt;

    use sync_engine_adapters::engine::SyncEngine;
    use sync_engine_adapters::jmap::JmapClient;
    use sync_engine_core::config::{EngineConfig, RemoteCredential};
    use sync_engine_storage::Storage;

    use crate::{build_router, ListenerState};

    fn test_config() -> EngineConfig {
        EngineConfig::from_reader(|key| match key {
            "REMOTE_API_TOKEN" => Some("static-token".to_string()),
            "JMAP_SESSION_URL" => Some("https://example.invalid/jmap".to_string()),
            "STORE_URL" => Some("https://store.invalid".to_string()),
            "STORE_SERVICE_KEY" => Some("k".to_string()),
            "ENCRYPTION_KEY" => Some("0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcd".to_string()),
            _ => None,
        })
        .unwrap()
    }

    fn test_state(webhook_secret: Option<&str>) -> ListenerState {
        let config = test_config();
        let storage = Storage::open_in_memory_for_tests().unwrap();
        let jmap = JmapClient::new(config.jmap_session_url.clone());
        let static_token = match &config.remote_credential {
            RemoteCredential::StaticToken { token } => Some(token.clone()),
            RemoteCredential::OAuthClient { .. } => None,
        };
        let engine = Arc::new(SyncEngine::new(storage, jmap, None, static_token, &config).unwrap());
        ListenerState::new(engine, webhook_secret.map(|s| s.to_string()))
    }

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[tokio::test]
    async fn webhook_without_secret_configured_fails_closed() {
        let state = test_state(None);
        let app = build_router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/webhook/jmap")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn webhook_with_mismatched_signature_is_rejected() {
        let state = test_state(Some("shared-secret"));
        let app = build_router(state);

        let body = br#"{"type":"email.received","accountId":"acct-1","emailId":"e1"}"#;
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/webhook/jmap")
                    .header("Signature", "sha256=deadbeef")
                    .body(Body::from(body.to_vec()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unknown_event_type_is_acknowledged_without_engine_call() {
        let state = test_state(Some("shared-secret"));
        let app = build_router(state);

        let body = br#"{"type":"mailbox.renamed","accountId":"acct-1"}"#;
        let signature = sign("shared-secret", body);
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/webhook/jmap")
                    .header("Signature", signature)
                    .body(Body::from(body.to_vec()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn health_endpoint_reports_status_for_empty_store() {
        let state = test_state(Some("shared-secret"));
        let app = build_router(state);

        let response = app
            .oneshot(Request::builder().method("GET").uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "HEALTHY");
        assert_eq!(json["account_count"], 0);
    }

    #[tokio::test]
    async fn sync_status_returns_404_before_a_first_tick() {
        let state = test_state(Some("shared-secret"));
        let app = build_router(state);

        let response = app
            .oneshot(Request::builder().method("GET").uri("/sync/status").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn signed_email_deleted_webhook_tombstones_without_other_state_change() {
        let state = test_state(Some("shared-secret"));
        let engine = state.engine.clone();

        // Seed a mailbox and an email directly through the storage layer —
        // this test exercises dispatch and persistence, not the JMAP wire
        // protocol, which is covered in `sync_engine_adapters`'s own tests.
        let storage = engine.storage();
        storage
            .upsert_mailbox(&sync_engine_core::model::MailboxUpsert {
                remote_id: "mbx-1".to_string(),
                name: "Inbox".to_string(),
                parent_remote_id: None,
                role: Some("inbox".to_string()),
                sort_order: 0,
                total_emails: 1,
                unread_emails: 1,
            })
            .unwrap();
        storage
            .upsert_email(&sync_engine_core::model::EmailUpsert {
                remote_id: "e2".to_string(),
                thread_id: None,
                mailbox_id: "mbx-1".to_string(),
                subject: Some("weekend plans".to_string()),
                from_address: Some("a@example.com".to_string()),
                to_addresses: vec![],
                cc_addresses: vec![],
                bcc_addresses: vec![],
                reply_to_addresses: vec![],
                date_received: None,
                date_sent: None,
                message_id: None,
                in_reply_to: None,
                references: vec![],
                body_text: Some("see you saturday".to_string()),
                body_html: None,
                attachments: vec![],
                flags: Default::default(),
                size_bytes: 100,
            })
            .unwrap();

        let app = build_router(state);
        let body = br#"{"type":"email.deleted","accountId":"acct-1","emailId":"e2"}"#;
        let signature = sign("shared-secret", body);
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/webhook/jmap")
                    .header("Signature", signature)
                    .body(Body::from(body.to_vec()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let email = engine.storage().get_email_by_remote_id("e2").unwrap().unwrap();
        assert!(email.is_deleted);

        let hits = engine
            .storage()
            .search(
                "weekend",
                &sync_engine_core::model::SearchFilters::default(),
                sync_engine_core::model::SearchSort::Rank,
                10,
                0,
            )
            .unwrap();
        assert!(hits.is_empty(), "deleted email's search row must not surface in results");
    }
}
