use reqwest::Client as HttpClient;

use super::{
    Id, JmapError, JmapState, JmapEmail, JmapMailbox, JmapThread, MethodCall, MethodCallEmailGet,
    MethodCallGet, MethodCallQuery, MethodCallSetKeywords, MethodResponse, MethodResponseError,
    MethodResponseErrorKind, QueryFilter, Request, RequestInvocation, Response, Session,
    EMAIL_PROJECTION, USING,
};

/// Result of `query_emails`/`query_threads`: the id list in provider order
/// plus the state to present as `since_state` on the next call. An empty id
/// list with an unchanged state means "no new work" — the cursor must not
/// be advanced in that case.
pub struct QueryPage {
    pub ids: Vec<Id>,
    pub next_state: JmapState,
}

/// C1: a thin, retry-free wrapper over one JMAP HTTP round trip. The sync
/// engine (C4) owns retry/backoff; this client only translates protocol
/// failures into the taxonomy in `JmapError`.
pub struct JmapClient {
    http: HttpClient,
    session_url: String,
}

impl JmapClient {
    pub fn new(session_url: impl Into<String>) -> Self {
        Self { http: HttpClient::new(), session_url: session_url.into() }
    }

    pub async fn open_session(&self, access_token: &str) -> Result<Session, JmapError> {
        let response = self
            .http
            .get(&self.session_url)
            .bearer_auth(access_token)
            .send()
            .await?;

        if response.status().as_u16() == 401 {
            return Err(JmapError::Unauthorized("session request rejected".to_string()));
        }
        if !response.status().is_success() {
            return Err(JmapError::Network(format!("session request failed: {}", response.status())));
        }

        response.json::<Session>().await.map_err(|err| {
            JmapError::Protocol(format!("malformed session document: {err}"))
        })
    }

    pub async fn list_mailboxes(&self, access_token: &str, session: &Session) -> Result<Vec<JmapMailbox>, JmapError> {
        let account_id = session.account_id();
        let call = RequestInvocation {
            call: MethodCall::MailboxGet(MethodCallGet { account_id, ids: None, properties: None }),
            id: "m0",
        };
        let response = self.call(access_token, session, &[call]).await?;
        let mut mailboxes = extract_single(response, "m0", |resp| match resp {
            MethodResponse::MailboxGet(get) => Some(get.list),
            _ => None,
        })?;
        mailboxes.sort_by_key(|m| m.sort_order);
        Ok(mailboxes)
    }

    /// Fetches identifiers in provider-chosen order. `since_state = None`
    /// is a cold-start query; omitted sort, per the C1 contract, so the
    /// engine must not depend on global date ordering.
    pub async fn query_emails(
        &self,
        access_token: &str,
        session: &Session,
        mailbox_filter: Option<&Id>,
        since_state: Option<&JmapState>,
        limit: u64,
    ) -> Result<QueryPage, JmapError> {
        let account_id = session.account_id();
        let filter = mailbox_filter.map(|id| QueryFilter { in_mailbox: Some(id) });
        let call = RequestInvocation {
            call: MethodCall::EmailQuery(MethodCallQuery {
                account_id,
                since_state,
                limit: Some(limit),
                filter,
            }),
            id: "q0",
        };
        let response = self.call(access_token, session, &[call]).await?;
        extract_single(response, "q0", |resp| match resp {
            MethodResponse::EmailQuery(query) => Some(QueryPage { ids: query.ids, next_state: query.query_state }),
            _ => None,
        })
    }

    /// Resolves ids to full records under the fixed projection named in
    /// the C1 contract.
    pub async fn get_emails(
        &self,
        access_token: &str,
        session: &Session,
        ids: &[Id],
    ) -> Result<Vec<JmapEmail>, JmapError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let account_id = session.account_id();
        let call = RequestInvocation {
            call: MethodCall::EmailGet(MethodCallEmailGet {
                account_id,
                ids: Some(ids),
                properties: EMAIL_PROJECTION,
                fetch_text_body_values: true,
                fetch_html_body_values: true,
            }),
            id: "e0",
        };
        let response = self.call(access_token, session, &[call]).await?;
        extract_single(response, "e0", |resp| match resp {
            MethodResponse::EmailGet(get) => Some(get.list),
            _ => None,
        })
    }

    /// Convenience single-item fetch for the webhook path.
    pub async fn get_email(&self, access_token: &str, session: &Session, id: &Id) -> Result<Option<JmapEmail>, JmapError> {
        let mut emails = self.get_emails(access_token, session, std::slice::from_ref(id)).await?;
        Ok(emails.pop())
    }

    pub async fn list_threads(
        &self,
        access_token: &str,
        session: &Session,
        since_state: Option<&JmapState>,
        limit: u64,
    ) -> Result<QueryPage, JmapError> {
        let account_id = session.account_id();
        let call = RequestInvocation {
            call: MethodCall::ThreadQuery(MethodCallQuery {
                account_id,
                since_state,
                limit: Some(limit),
                filter: None,
            }),
            id: "tq0",
        };
        let response = self.call(access_token, session, &[call]).await?;
        extract_single(response, "tq0", |resp| match resp {
            MethodResponse::ThreadQuery(query) => Some(QueryPage { ids: query.ids, next_state: query.query_state }),
            _ => None,
        })
    }

    pub async fn get_threads(&self, access_token: &str, session: &Session, ids: &[Id]) -> Result<Vec<JmapThread>, JmapError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let account_id = session.account_id();
        let call = RequestInvocation {
            call: MethodCall::ThreadGet(MethodCallGet { account_id, ids: Some(ids), properties: None }),
            id: "tg0",
        };
        let response = self.call(access_token, session, &[call]).await?;
        extract_single(response, "tg0", |resp| match resp {
            MethodResponse::ThreadGet(get) => Some(get.list),
            _ => None,
        })
    }

    pub async fn set_flags(
        &self,
        access_token: &str,
        session: &Session,
        id: &Id,
        keyword: &'static str,
        value: bool,
    ) -> Result<(), JmapError> {
        let account_id = session.account_id();
        let mut update = std::collections::HashMap::new();
        let mut patch = std::collections::HashMap::new();
        patch.insert(keyword, value);
        update.insert(id, patch);

        let call = RequestInvocation {
            call: MethodCall::EmailSet(MethodCallSetKeywords { account_id, update }),
            id: "s0",
        };
        let response = self.call(access_token, session, &[call]).await?;
        extract_single(response, "s0", |resp| match resp {
            MethodResponse::EmailSet(_) => Some(()),
            _ => None,
        })
    }

    async fn call<'a>(
        &self,
        access_token: &str,
        session: &Session,
        method_calls: &'a [RequestInvocation<'a>],
    ) -> Result<Response, JmapError> {
        let request = Request { using: USING, method_calls };
        let response = self
            .http
            .post(&session.api_url)
            .bearer_auth(access_token)
            .json(&request)
            .send()
            .await?;

        if response.status().as_u16() == 401 {
            return Err(JmapError::Unauthorized("request rejected".to_string()));
        }
        if response.status().as_u16() == 429 {
            return Err(JmapError::RateLimited("provider requested backoff".to_string()));
        }
        if !response.status().is_success() {
            return Err(JmapError::Network(format!("request failed: {}", response.status())));
        }

        response.json::<Response>().await.map_err(|err| JmapError::Protocol(format!("malformed response: {err}")))
    }
}

/// Finds the response tagged with `call_id`, maps a provider-level method
/// error into the taxonomy, and extracts the expected variant.
fn extract_single<T>(
    response: Response,
    call_id: &str,
    extract: impl Fn(MethodResponse) -> Option<T>,
) -> Result<T, JmapError> {
    let invocation = response
        .method_responses
        .into_iter()
        .find(|inv| inv.id == call_id)
        .ok_or_else(|| JmapError::Protocol(format!("no response for call id {call_id}")))?;

    if let MethodResponse::Error(err) = &invocation.call {
        return Err(method_error_to_taxon(err));
    }

    extract(invocation.call).ok_or_else(|| JmapError::Protocol(format!("unexpected response shape for call id {call_id}")))
}

fn method_error_to_taxon(err: &MethodResponseError) -> JmapError {
    let message = err.description.clone().unwrap_or_else(|| format!("{:?}", err.kind));
    match err.kind {
        MethodResponseErrorKind::RateLimit => JmapError::RateLimited(message),
        MethodResponseErrorKind::ServerUnavailable => JmapError::Network(message),
        MethodResponseErrorKind::Forbidden => JmapError::Unauthorized(message),
        _ => JmapError::Protocol(message),
    }
}
