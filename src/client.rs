use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, COOKIE};
use reqwest::{Client, Method, Url};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::fmt;
use std::marker::PhantomData;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::QueueError;
use crate::model::{Decision, QueueItem, QueuePage, Report, Verification, WirePage};

/// Remote moderation queue: paginated reads plus status and delete writes.
#[async_trait]
pub trait QueueService: Send + Sync + 'static {
    type Item: QueueItem;

    async fn fetch_page(
        &self,
        page: u32,
        size: u32,
        sort: &str,
    ) -> Result<QueuePage<Self::Item>, QueueError>;

    /// The backend decides whether the transition is legal.
    async fn mutate_status(&self, id: i64, decision: Decision) -> Result<(), QueueError>;

    async fn delete_subject_post(&self, post_id: i64) -> Result<(), QueueError>;
}

/// Endpoint set of one moderation queue.
pub trait QueueKind: Send + Sync + 'static {
    type Item: QueueItem + DeserializeOwned;

    /// Cache key name used by the views of this queue.
    const QUERY_NAME: &'static str;
    const LIST_PATH: &'static str;

    fn status_path(id: i64) -> String;
    fn status_body(decision: Decision) -> Value;
    fn delete_path(post_id: i64) -> String;
}

/// Pending verification requests.
pub struct Verifications;

impl QueueKind for Verifications {
    type Item = Verification;

    const QUERY_NAME: &'static str = "adminVerifications";
    const LIST_PATH: &'static str = "api/admin/verifications";

    fn status_path(id: i64) -> String {
        format!("api/admin/verifications/{}", id)
    }

    fn status_body(decision: Decision) -> Value {
        json!({ "status": decision.as_str() })
    }

    fn delete_path(post_id: i64) -> String {
        format!("api/v1/posts/{}", post_id)
    }
}

/// Reported posts.
pub struct Reports;

impl QueueKind for Reports {
    type Item = Report;

    const QUERY_NAME: &'static str = "adminReports";
    const LIST_PATH: &'static str = "api/admin/reports";

    fn status_path(id: i64) -> String {
        format!("api/admin/reports/{}/status", id)
    }

    fn status_body(decision: Decision) -> Value {
        json!({ "reportStatus": decision.as_str() })
    }

    fn delete_path(post_id: i64) -> String {
        format!("api/admin/posts/{}", post_id)
    }
}

pub struct HttpQueueClient<K> {
    http: Client,
    base_url: Url,
    _kind: PhantomData<fn() -> K>,
}

impl<K> Clone for HttpQueueClient<K> {
    fn clone(&self) -> Self {
        Self {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            _kind: PhantomData,
        }
    }
}

impl<K: QueueKind> fmt::Debug for HttpQueueClient<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpQueueClient")
            .field("queue", &K::QUERY_NAME)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// Build the shared HTTP client. Session credentials travel as cookies; no
/// bearer token is ever attached here.
pub fn build_http(
    session_cookie: Option<&str>,
    user_agent: Option<&str>,
) -> Result<Client, QueueError> {
    let mut headers = HeaderMap::new();
    if let Some(cookie) = session_cookie {
        let value = HeaderValue::from_str(cookie)
            .map_err(|e| QueueError::Malformed(format!("invalid session cookie: {e}")))?;
        headers.insert(COOKIE, value);
    }
    let client = Client::builder()
        .user_agent(user_agent.unwrap_or("modfeed/0.1"))
        .cookie_store(true)
        .default_headers(headers)
        .no_proxy()
        .build()?;
    Ok(client)
}

/// Parse an API base URL, making sure relative joins keep any path prefix.
pub fn parse_base_url(raw: &str) -> Result<Url, QueueError> {
    let mut raw = raw.trim().to_string();
    if !raw.ends_with('/') {
        raw.push('/');
    }
    Url::parse(&raw).map_err(|e| QueueError::Malformed(format!("invalid base URL {raw}: {e}")))
}

impl<K: QueueKind> HttpQueueClient<K> {
    pub fn with_client(http: Client, base_url: Url) -> Self {
        Self {
            http,
            base_url,
            _kind: PhantomData,
        }
    }

    pub fn from_config(cfg: &Config) -> Result<Self, QueueError> {
        let http = build_http(
            cfg.api.session_cookie.as_deref(),
            cfg.api.user_agent.as_deref(),
        )?;
        Ok(Self::with_client(http, parse_base_url(&cfg.api.base_url)?))
    }

    fn endpoint(&self, path: &str) -> Result<Url, QueueError> {
        self.base_url
            .join(path)
            .map_err(|e| QueueError::Malformed(format!("invalid endpoint {path}: {e}")))
    }

    pub fn build_fetch_request(
        &self,
        page: u32,
        size: u32,
        sort: &str,
    ) -> Result<reqwest::Request, QueueError> {
        let mut url = self.endpoint(K::LIST_PATH)?;
        url.query_pairs_mut()
            .append_pair("page", &page.to_string())
            .append_pair("size", &size.to_string())
            .append_pair("sort", sort);
        Ok(self.http.get(url).build()?)
    }

    pub fn build_status_request(
        &self,
        id: i64,
        decision: Decision,
    ) -> Result<reqwest::Request, QueueError> {
        let url = self.endpoint(&K::status_path(id))?;
        Ok(self
            .http
            .patch(url)
            .json(&K::status_body(decision))
            .build()?)
    }

    pub fn build_delete_request(&self, post_id: i64) -> Result<reqwest::Request, QueueError> {
        let url = self.endpoint(&K::delete_path(post_id))?;
        Ok(self.http.request(Method::DELETE, url).build()?)
    }

    /// Send a request and map non-2xx answers to [`QueueError::Http`].
    async fn execute(&self, request: reqwest::Request) -> Result<reqwest::Response, QueueError> {
        let method = request.method().clone();
        let url = request.url().clone();
        debug!(queue = K::QUERY_NAME, %method, %url, "sending queue request");

        let res = self.http.execute(request).await.map_err(|err| {
            warn!(queue = K::QUERY_NAME, %method, %url, ?err, "queue request failed");
            QueueError::Network(err)
        })?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            warn!(queue = K::QUERY_NAME, %method, %url, %status, body = %body, "queue request rejected");
            return Err(QueueError::http(status, body));
        }
        Ok(res)
    }
}

/// Decode a page envelope, rejecting bodies without `content`/`last`/`number`.
pub fn parse_page<T: DeserializeOwned>(body: &str) -> Result<QueuePage<T>, QueueError> {
    let wire: WirePage<T> = serde_json::from_str(body)?;
    Ok(wire.into())
}

#[async_trait]
impl<K: QueueKind> QueueService for HttpQueueClient<K> {
    type Item = K::Item;

    async fn fetch_page(
        &self,
        page: u32,
        size: u32,
        sort: &str,
    ) -> Result<QueuePage<K::Item>, QueueError> {
        let request = self.build_fetch_request(page, size, sort)?;
        let res = self.execute(request).await?;
        let body = res.text().await?;
        let parsed = parse_page(&body).map_err(|err| {
            warn!(queue = K::QUERY_NAME, page, ?err, "unexpected page shape");
            err
        })?;
        debug!(
            queue = K::QUERY_NAME,
            page,
            items = parsed.items.len(),
            last = parsed.is_last,
            "page received"
        );
        Ok(parsed)
    }

    async fn mutate_status(&self, id: i64, decision: Decision) -> Result<(), QueueError> {
        let request = self.build_status_request(id, decision)?;
        self.execute(request).await?;
        Ok(())
    }

    async fn delete_subject_post(&self, post_id: i64) -> Result<(), QueueError> {
        let request = self.build_delete_request(post_id)?;
        self.execute(request).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client<K: QueueKind>() -> HttpQueueClient<K> {
        let http = build_http(Some("accessToken=abc"), None).unwrap();
        HttpQueueClient::with_client(http, parse_base_url("http://localhost:8090").unwrap())
    }

    fn body_json(request: &reqwest::Request) -> Value {
        let bytes = request.body().and_then(|b| b.as_bytes()).unwrap();
        serde_json::from_slice(bytes).unwrap()
    }

    #[test]
    fn fetch_request_carries_paging_query() {
        let request = client::<Verifications>()
            .build_fetch_request(2, 10, "createdAt,asc")
            .unwrap();
        assert_eq!(request.method(), Method::GET);
        assert_eq!(request.url().path(), "/api/admin/verifications");
        let pairs: Vec<(String, String)> = request
            .url()
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("page".into(), "2".into()),
                ("size".into(), "10".into()),
                ("sort".into(), "createdAt,asc".into()),
            ]
        );
        assert!(request.headers().get("Authorization").is_none());
    }

    #[test]
    fn verification_status_request() {
        let request = client::<Verifications>()
            .build_status_request(7, Decision::Approved)
            .unwrap();
        assert_eq!(request.method(), Method::PATCH);
        assert_eq!(request.url().path(), "/api/admin/verifications/7");
        assert_eq!(body_json(&request), json!({ "status": "APPROVED" }));
    }

    #[test]
    fn report_status_request() {
        let request = client::<Reports>()
            .build_status_request(3, Decision::Rejected)
            .unwrap();
        assert_eq!(request.method(), Method::PATCH);
        assert_eq!(request.url().path(), "/api/admin/reports/3/status");
        assert_eq!(body_json(&request), json!({ "reportStatus": "REJECTED" }));
    }

    #[test]
    fn delete_paths_differ_per_queue() {
        let v = client::<Verifications>().build_delete_request(40).unwrap();
        assert_eq!(v.method(), Method::DELETE);
        assert_eq!(v.url().path(), "/api/v1/posts/40");

        let r = client::<Reports>().build_delete_request(41).unwrap();
        assert_eq!(r.url().path(), "/api/admin/posts/41");
    }

    #[test]
    fn base_url_prefix_is_kept() {
        let http = build_http(None, None).unwrap();
        let c: HttpQueueClient<Reports> =
            HttpQueueClient::with_client(http, parse_base_url("https://mod.example/backend").unwrap());
        let request = c.build_fetch_request(0, 10, "createdAt,asc").unwrap();
        assert_eq!(request.url().path(), "/backend/api/admin/reports");
    }

    #[test]
    fn parse_page_requires_envelope_fields() {
        let ok: QueuePage<Value> =
            parse_page(r#"{"content":[{"a":1}],"last":true,"number":0,"totalElements":1}"#).unwrap();
        assert!(ok.is_last);
        assert_eq!(ok.total_count, 1);

        let missing = parse_page::<Value>(r#"{"content":[],"number":0}"#).unwrap_err();
        assert!(matches!(missing, QueueError::Malformed(_)));

        let wrong = parse_page::<Value>(r#"{"content":{},"last":false,"number":0}"#).unwrap_err();
        assert!(matches!(wrong, QueueError::Malformed(_)));
    }
}
