//! Request authentication.
//!
//! [`RequestSender`] is the capability to execute a prepared HTTP request.
//! [`AuthenticatingTransport`] decorates any sender so that every request
//! carries the collector's Basic credentials, and [`AuthenticatedClient`]
//! pairs such a transport with the API base URL.

use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::header::{HeaderValue, InvalidHeaderValue, AUTHORIZATION};
use reqwest::{Method, Request, RequestBuilder, Response};

use tracing::debug;

use crate::credentials::basic_auth_value;

/// Executes prepared requests.
pub trait RequestSender: Send + Sync {
    fn send(&self, request: Request) -> BoxFuture<'_, reqwest::Result<Response>>;
}

impl RequestSender for reqwest::Client {
    fn send(&self, request: Request) -> BoxFuture<'_, reqwest::Result<Response>> {
        Box::pin(self.execute(request))
    }
}

impl<S: RequestSender + ?Sized> RequestSender for Arc<S> {
    fn send(&self, request: Request) -> BoxFuture<'_, reqwest::Result<Response>> {
        (**self).send(request)
    }
}

/// Sets `Authorization: Basic base64(credential_id:credential_key)` on
/// every request before handing it to the inner sender.
///
/// Any `Authorization` header already present is replaced. The header value
/// is computed once at construction; nothing is mutated afterwards, so a
/// single transport can be shared by any number of concurrent callers.
#[derive(Debug, Clone)]
pub struct AuthenticatingTransport<S> {
    credential_id: String,
    authorization: HeaderValue,
    inner: S,
}

impl<S: RequestSender> AuthenticatingTransport<S> {
    pub fn new(
        credential_id: &str,
        credential_key: &str,
        inner: S,
    ) -> Result<Self, InvalidHeaderValue> {
        let mut authorization = HeaderValue::from_str(&basic_auth_value(credential_id, credential_key))?;
        authorization.set_sensitive(true);
        Ok(Self {
            credential_id: credential_id.to_string(),
            authorization,
            inner,
        })
    }

    pub fn credential_id(&self) -> &str {
        &self.credential_id
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: RequestSender> RequestSender for AuthenticatingTransport<S> {
    fn send(&self, mut request: Request) -> BoxFuture<'_, reqwest::Result<Response>> {
        request
            .headers_mut()
            .insert(AUTHORIZATION, self.authorization.clone());
        self.inner.send(request)
    }
}

/// Body of an error response, for diagnostics. A body that cannot be read
/// is logged and described in place of the content.
pub(crate) async fn error_body(res: Response) -> String {
    match res.text().await {
        Ok(body) => body,
        Err(e) => {
            debug!(error = %e, "failed to read response body");
            format!("<unreadable response body: {e}>")
        }
    }
}

/// HTTP client for the control-plane API with collector authentication
/// installed as its transport.
#[derive(Debug, Clone)]
pub struct AuthenticatedClient {
    base_url: String,
    http: reqwest::Client,
    transport: Arc<AuthenticatingTransport<reqwest::Client>>,
}

impl AuthenticatedClient {
    /// `base_url` must not end with `/`; paths passed to [`request`](Self::request)
    /// start with one.
    pub fn new(base_url: impl Into<String>, transport: AuthenticatingTransport<reqwest::Client>) -> Self {
        Self {
            base_url: base_url.into(),
            http: transport.inner().clone(),
            transport: Arc::new(transport),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The shared transport, for callers that want to send through it
    /// directly.
    pub fn transport(&self) -> Arc<AuthenticatingTransport<reqwest::Client>> {
        Arc::clone(&self.transport)
    }

    /// Start building a request to `{base_url}{path}`.
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http.request(method, format!("{}{path}", self.base_url))
    }

    pub fn post(&self, path: &str) -> RequestBuilder {
        self.request(Method::POST, path)
    }

    /// Send a request through the authenticating transport.
    pub async fn execute(&self, request: Request) -> reqwest::Result<Response> {
        self.transport.send(request).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use reqwest::StatusCode;

    use super::*;
    use crate::config::HEARTBEAT_URL;
    use crate::testing::{spawn_truncated_response, MockApi, MockBehavior};

    #[tokio::test]
    async fn every_request_carries_collector_credentials() {
        let api = MockApi::spawn(MockBehavior::default()).await;
        let transport = AuthenticatingTransport::new("id1", "key1", reqwest::Client::new()).unwrap();
        let client = AuthenticatedClient::new(api.base_url.clone(), transport);

        let request = client.post(HEARTBEAT_URL).build().unwrap();
        let response = client.execute(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            api.state.last_heartbeat_auth().as_deref(),
            Some("Basic aWQxOmtleTE=")
        );
    }

    #[tokio::test]
    async fn existing_authorization_is_replaced() {
        let api = MockApi::spawn(MockBehavior::default()).await;
        let transport = AuthenticatingTransport::new("id1", "key1", reqwest::Client::new()).unwrap();
        let client = AuthenticatedClient::new(api.base_url.clone(), transport);

        let request = client
            .post(HEARTBEAT_URL)
            .header(AUTHORIZATION, "Bearer someone-else")
            .build()
            .unwrap();
        client.execute(request).await.unwrap();

        assert_eq!(
            api.state.last_heartbeat_auth().as_deref(),
            Some("Basic aWQxOmtleTE=")
        );
    }

    #[tokio::test]
    async fn nested_transports_send_innermost_credentials() {
        let api = MockApi::spawn(MockBehavior::default()).await;
        let http = reqwest::Client::new();
        // Each layer replaces the header before delegating, so the layer
        // closest to the wire has the last word.
        let inner = AuthenticatingTransport::new("inner", "secret", Arc::new(http.clone())).unwrap();
        let outer = AuthenticatingTransport::new("id1", "key1", inner).unwrap();

        let request = http
            .post(format!("{}{HEARTBEAT_URL}", api.base_url))
            .build()
            .unwrap();
        outer.send(request).await.unwrap();

        assert_eq!(
            api.state.last_heartbeat_auth().as_deref(),
            Some("Basic aW5uZXI6c2VjcmV0")
        );
    }

    #[tokio::test]
    async fn error_body_describes_truncated_response() {
        let base_url = spawn_truncated_response("500 Internal Server Error").await;

        let res = reqwest::Client::new()
            .post(format!("{base_url}{HEARTBEAT_URL}"))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = error_body(res).await;
        assert!(body.starts_with("<unreadable response body: "), "{body}");
    }

    #[tokio::test]
    async fn error_body_returns_readable_content() {
        let api = MockApi::spawn(MockBehavior {
            heartbeat_status: StatusCode::OK,
            ..MockBehavior::default()
        })
        .await;
        let res = reqwest::Client::new()
            .post(format!("{}{HEARTBEAT_URL}", api.base_url))
            .send()
            .await
            .unwrap();
        assert!(!error_body(res).await.starts_with("<unreadable"));
    }

    #[tokio::test]
    async fn shared_across_concurrent_requests() {
        let api = MockApi::spawn(MockBehavior::default()).await;
        let transport = AuthenticatingTransport::new("id1", "key1", reqwest::Client::new()).unwrap();
        let client = AuthenticatedClient::new(api.base_url.clone(), transport);

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let client = client.clone();
                tokio::spawn(async move {
                    let request = client.post(HEARTBEAT_URL).build().unwrap();
                    client.execute(request).await.unwrap().status()
                })
            })
            .collect();

        for task in tasks {
            let status = tokio::time::timeout(Duration::from_secs(5), task)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(status, StatusCode::NO_CONTENT);
        }
        assert_eq!(api.state.heartbeat_calls(), 16);
    }

    #[test]
    fn debug_output_hides_key() {
        let transport = AuthenticatingTransport::new("id1", "key1", reqwest::Client::new()).unwrap();
        let debug = format!("{transport:?}");
        assert!(debug.contains("id1"));
        assert!(!debug.contains("aWQxOmtleTE="));
    }
}
