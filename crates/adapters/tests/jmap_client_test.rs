//! Integration tests for the JMAP client (C1) against a mock session +
//! compound-request endpoint, exercising the actual HTTP round trip rather
//! than just the wire-shape unit tests in `jmap::request`/`jmap::response`.

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use sync_engine_adapters::jmap::JmapClient;

fn session_body(api_url: &str) -> serde_json::Value {
    json!({
        "capabilities": {
            "urn:ietf:params:jmap:core": {
                "maxSizeRequest": 10000000,
                "maxCallsInRequest": 16,
                "maxObjectsInGet": 500,
            }
        },
        "accounts": {
            "acct-1": { "name": "person@example.com", "isPersonal": true, "isReadOnly": false }
        },
        "primaryAccounts": {
            "urn:ietf:params:jmap:core": "acct-1",
            "urn:ietf:params:jmap:mail": "acct-1",
        },
        "username": "person@example.com",
        "apiUrl": api_url,
        "downloadUrl": format!("{api_url}/download"),
        "uploadUrl": format!("{api_url}/upload"),
        "eventSourceUrl": format!("{api_url}/events"),
        "state": "session-state-0",
    })
}

#[tokio::test]
async fn open_session_parses_a_well_formed_session_document() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jmap-session"))
        .respond_with(ResponseTemplate::new(200).set_body_json(session_body(&server.uri())))
        .mount(&server)
        .await;

    let client = JmapClient::new(format!("{}/jmap-session", server.uri()));
    let session = client.open_session("token").await.unwrap();
    assert_eq!(session.account_id().0, "acct-1");
    assert_eq!(session.api_url, server.uri());
}

#[tokio::test]
async fn open_session_maps_401_to_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jmap-session"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let client = JmapClient::new(format!("{}/jmap-session", server.uri()));
    let err = client.open_session("token").await.unwrap_err();
    assert_eq!(err.taxon(), sync_engine_core::error::ErrorTaxon::AuthFailure);
}

#[tokio::test]
async fn list_mailboxes_issues_one_compound_request_and_sorts_by_provider_order() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jmap-session"))
        .respond_with(ResponseTemplate::new(200).set_body_json(session_body(&server.uri())))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "methodResponses": [
                ["Mailbox/get", {
                    "accountId": "acct-1",
                    "state": "mbx-state-0",
                    "notFound": [],
                    "list": [
                        {"id": "mbx-2", "parentId": null, "name": "Archive", "role": null, "sortOrder": 2, "totalEmails": 1, "unreadEmails": 0},
                        {"id": "mbx-1", "parentId": null, "name": "Inbox", "role": "inbox", "sortOrder": 1, "totalEmails": 3, "unreadEmails": 2},
                    ],
                }, "m0"],
            ],
            "sessionState": "session-state-0",
        })))
        .mount(&server)
        .await;

    let client = JmapClient::new(format!("{}/jmap-session", server.uri()));
    let session = client.open_session("token").await.unwrap();
    let mailboxes = client.list_mailboxes("token", &session).await.unwrap();

    assert_eq!(mailboxes.len(), 2);
    assert_eq!(mailboxes[0].id.0, "mbx-1", "results must be sorted by provider sort_order");
    assert_eq!(mailboxes[1].id.0, "mbx-2");
}

#[tokio::test]
async fn query_emails_surfaces_provider_method_error_as_protocol() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jmap-session"))
        .respond_with(ResponseTemplate::new(200).set_body_json(session_body(&server.uri())))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "methodResponses": [
                ["error", {"type": "invalidArguments", "description": "bad since state"}, "q0"],
            ],
            "sessionState": "session-state-0",
        })))
        .mount(&server)
        .await;

    let client = JmapClient::new(format!("{}/jmap-session", server.uri()));
    let session = client.open_session("token").await.unwrap();
    let err = client.query_emails("token", &session, None, None, 100).await.unwrap_err();
    assert_eq!(err.taxon(), sync_engine_core::error::ErrorTaxon::Protocol);
}

#[tokio::test]
async fn query_emails_empty_result_does_not_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jmap-session"))
        .respond_with(ResponseTemplate::new(200).set_body_json(session_body(&server.uri())))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "methodResponses": [
                ["Email/query", {"accountId": "acct-1", "queryState": "state-0", "ids": []}, "q0"],
            ],
            "sessionState": "session-state-0",
        })))
        .mount(&server)
        .await;

    let client = JmapClient::new(format!("{}/jmap-session", server.uri()));
    let session = client.open_session("token").await.unwrap();
    let page = client.query_emails("token", &session, None, None, 100).await.unwrap();
    assert!(page.ids.is_empty());
    assert_eq!(page.next_state.0, "state-0");
}

#[tokio::test]
async fn rate_limited_response_maps_to_rate_limited_taxon() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jmap-session"))
        .respond_with(ResponseTemplate::new(200).set_body_json(session_body(&server.uri())))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let client = JmapClient::new(format!("{}/jmap-session", server.uri()));
    let session = client.open_session("token").await.unwrap();
    let err = client.list_mailboxes("token", &session).await.unwrap_err();
    assert_eq!(err.taxon(), sync_engine_core::error::ErrorTaxon::RateLimited);
}
