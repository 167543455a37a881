use modfeed::client::{build_http, parse_base_url, HttpQueueClient, QueueService, Reports, Verifications};
use modfeed::error::QueueError;
use modfeed::model::{Decision, QueueItem};
use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

async fn read_request(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
            let len = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .map(|v| v.trim().parse::<usize>().unwrap())
                .unwrap_or(0);
            if buf.len() >= end + 4 + len {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Answer exactly one request with `status` and `body`; the handle yields
/// the raw request text.
async fn serve_once(status: &'static str, body: String) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let request = read_request(&mut stream).await;
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        stream.write_all(response.as_bytes()).await.unwrap();
        stream.shutdown().await.ok();
        request
    });
    (base, handle)
}

fn client<K: modfeed::client::QueueKind>(base: &str) -> HttpQueueClient<K> {
    let http = build_http(Some("accessToken=abc"), None).unwrap();
    HttpQueueClient::with_client(http, parse_base_url(base).unwrap())
}

fn request_body(raw: &str) -> Value {
    let (_, body) = raw.split_once("\r\n\r\n").unwrap();
    serde_json::from_str(body).unwrap()
}

#[tokio::test]
async fn fetch_page_decodes_envelope_and_sends_session_cookie() {
    let page = json!({
        "content": [{
            "verificationId": 7,
            "postId": 70,
            "userId": 3,
            "userNickname": "mina",
            "detoxTime": 4,
            "status": "PENDING",
            "createdAt": "2025-04-30T12:00:00"
        }],
        "last": false,
        "number": 0,
        "totalElements": 12
    });
    let (base, server) = serve_once("200 OK", page.to_string()).await;

    let fetched = client::<Verifications>(&base)
        .fetch_page(0, 10, "createdAt,asc")
        .await
        .unwrap();
    assert_eq!(fetched.items.len(), 1);
    assert_eq!(fetched.items[0].id(), 7);
    assert_eq!(fetched.items[0].subject_post_id(), Some(70));
    assert!(!fetched.is_last);
    assert_eq!(fetched.total_count, 12);

    let raw = server.await.unwrap();
    assert!(
        raw.starts_with("GET /api/admin/verifications?page=0&size=10&sort=createdAt"),
        "request was {raw}"
    );
    let lower = raw.to_lowercase();
    assert!(lower.contains("cookie: accesstoken=abc"));
    assert!(!lower.contains("authorization:"));
}

#[tokio::test]
async fn approve_patches_verification_status() {
    let (base, server) = serve_once("200 OK", String::new()).await;

    client::<Verifications>(&base)
        .mutate_status(7, Decision::Approved)
        .await
        .unwrap();

    let raw = server.await.unwrap();
    assert!(raw.starts_with("PATCH /api/admin/verifications/7 HTTP/1.1"), "request was {raw}");
    assert_eq!(request_body(&raw), json!({ "status": "APPROVED" }));
}

#[tokio::test]
async fn report_reject_and_delete_use_admin_paths() {
    let (base, server) = serve_once("200 OK", String::new()).await;
    client::<Reports>(&base)
        .mutate_status(3, Decision::Rejected)
        .await
        .unwrap();
    let raw = server.await.unwrap();
    assert!(raw.starts_with("PATCH /api/admin/reports/3/status HTTP/1.1"));
    assert_eq!(request_body(&raw), json!({ "reportStatus": "REJECTED" }));

    let (base, server) = serve_once("200 OK", String::new()).await;
    client::<Reports>(&base).delete_subject_post(41).await.unwrap();
    assert!(server.await.unwrap().starts_with("DELETE /api/admin/posts/41 HTTP/1.1"));
}

#[tokio::test]
async fn server_error_maps_to_http_error() {
    let (base, server) = serve_once(
        "500 Internal Server Error",
        json!({ "message": "boom" }).to_string(),
    )
    .await;

    let err = client::<Verifications>(&base)
        .mutate_status(7, Decision::Approved)
        .await
        .unwrap_err();
    server.await.unwrap();

    match &err {
        QueueError::Http { status, body } => {
            assert_eq!(*status, StatusCode::INTERNAL_SERVER_ERROR);
            assert!(body.contains("boom"));
        }
        other => panic!("expected HTTP error, got {other:?}"),
    }
    assert!(err.to_string().contains("500"));
}

#[tokio::test]
async fn missing_envelope_fields_map_to_malformed() {
    let (base, server) = serve_once("200 OK", json!({ "items": [] }).to_string()).await;

    let err = client::<Reports>(&base)
        .fetch_page(0, 10, "createdAt,asc")
        .await
        .unwrap_err();
    server.await.unwrap();
    assert!(matches!(err, QueueError::Malformed(_)), "got {err:?}");
}

#[tokio::test]
async fn refused_connection_maps_to_network_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let err = client::<Verifications>(&base)
        .fetch_page(0, 10, "createdAt,asc")
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::Network(_)), "got {err:?}");
    assert_eq!(err.status(), None);
}
