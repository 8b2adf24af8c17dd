use std::time::Duration;

use mandrill_client::{
    config::API_KEY_SETTING, domain::SendRequest, MandrillClient, MandrillError,
};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wiremock::{
    matchers::{any, header, method, path},
    Mock, ResponseTemplate,
};

use crate::helper::{plain_request, spawn_app, spawn_configured_app};

#[tokio::test]
async fn send_posts_a_plain_message_and_returns_the_response() {
    let app = spawn_app(&[]).await;

    Mock::given(path("/messages/send.json"))
        .and(method("POST"))
        .and(header("Content-Type", "application/json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{"email": "a@b.com", "status": "sent", "_id": "abc"}])),
        )
        .expect(1)
        .mount(&app.server)
        .await;

    let response = app
        .client
        .send(plain_request().field("from_email", "s@x.com").key("K"))
        .await
        .expect("The send should succeed.");

    assert_eq!(response.status, 200);
    assert!(response.rejected().unwrap().is_empty());

    let bodies = app.bodies_posted_to("/messages/send.json").await;
    assert_eq!(
        bodies[0],
        json!({
            "async": false,
            "ip_pool": "",
            "key": "K",
            "message": {
                "to": [{"email": "a@b.com"}],
                "text": "hi",
                "from_email": "s@x.com",
            },
        })
    );
}

#[tokio::test]
async fn send_forwards_arbitrary_message_fields_untouched() {
    let app = spawn_configured_app().await;

    Mock::given(path("/messages/send.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&app.server)
        .await;

    let merge_vars = json!([{"rcpt": "a@b.com", "vars": [{"name": "FNAME", "content": "Ada"}]}]);
    app.client
        .send(
            plain_request()
                .field("subject", "hello")
                .field("merge_vars", merge_vars.clone())
                .async_send(true)
                .ip_pool("Main Pool"),
        )
        .await
        .expect("The send should succeed.");

    let body = &app.bodies_posted_to("/messages/send.json").await[0];
    assert_eq!(body["async"], true);
    assert_eq!(body["ip_pool"], "Main Pool");
    assert_eq!(body["key"], "bound-key");
    assert_eq!(body["message"]["subject"], "hello");
    assert_eq!(body["message"]["merge_vars"], merge_vars);
    assert!(body["message"].get("async").is_none());
    assert!(body["message"].get("ip_pool").is_none());
    assert!(body["message"].get("key").is_none());
}

#[tokio::test]
async fn a_missing_key_fails_before_any_request() {
    let app = spawn_app(&[]).await;

    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&app.server)
        .await;

    let result = app
        .client
        .send(
            plain_request()
                .field("from_email", "s@x.com")
                .attachment_url(app.url("/files/report.pdf")),
        )
        .await;

    assert!(matches!(result, Err(MandrillError::MissingCredential)));
}

#[tokio::test]
async fn a_missing_sender_fails_without_posting() {
    let app = spawn_app(&[(API_KEY_SETTING, "bound-key")]).await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&app.server)
        .await;

    let result = app.client.send(plain_request()).await;

    assert!(matches!(result, Err(MandrillError::MissingSender)));
}

#[tokio::test]
async fn a_server_error_is_reported_with_status_and_body() {
    let app = spawn_configured_app().await;

    Mock::given(path("/messages/send.json"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Invalid_Key"))
        .expect(1)
        .mount(&app.server)
        .await;

    let err = app.client.send(plain_request()).await.unwrap_err();

    match &err {
        MandrillError::Remote { status, body } => {
            assert_eq!(*status, 500);
            assert_eq!(body, "Invalid_Key");
        }
        other => panic!("expected a remote error, got {:?}", other),
    }
    assert!(err.is_transient());
}

/// Reads one full request, then answers with an error whose body is cut short.
async fn serve_truncated_error(listener: TcpListener) {
    let (mut socket, _) = listener.accept().await.unwrap();

    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        let n = socket.read(&mut buf).await.unwrap();
        if n == 0 {
            break;
        }
        request.extend_from_slice(&buf[..n]);

        let text = String::from_utf8_lossy(&request);
        if let Some(end) = text.find("\r\n\r\n") {
            let content_length = text[..end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())?
                })
                .unwrap_or(0);
            if request.len() >= end + 4 + content_length {
                break;
            }
        }
    }

    socket
        .write_all(b"HTTP/1.1 502 Bad Gateway\r\nContent-Length: 100\r\n\r\npartial")
        .await
        .unwrap();
    socket.shutdown().await.unwrap();
}

#[tokio::test]
async fn a_truncated_error_body_still_reports_the_status() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let api_root = format!("http://{}", listener.local_addr().unwrap());
    let server = tokio::spawn(serve_truncated_error(listener));

    let client = MandrillClient::new().with_api_root(api_root);
    let request = SendRequest::new()
        .field("from_email", "s@x.com")
        .field("text", "hi")
        .key("K");

    let result = client.send(request).await;
    server.await.unwrap();

    assert!(matches!(result, Err(MandrillError::Remote { status: 502, .. })));
}

#[tokio::test]
async fn an_unreachable_api_is_a_transport_error() {
    let client = MandrillClient::new().with_api_root("http://127.0.0.1:1");
    let request = SendRequest::new()
        .field("from_email", "s@x.com")
        .field("text", "hi")
        .key("K");

    let result = client.send(request).await;

    assert!(matches!(result, Err(MandrillError::Transport(_))));
}

#[tokio::test]
async fn a_slow_api_times_out_when_a_timeout_is_set() {
    let app = spawn_configured_app().await;

    Mock::given(path("/messages/send.json"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&app.server)
        .await;

    let client = app
        .client
        .clone()
        .with_timeout(Duration::from_millis(200))
        .unwrap();
    let result = client.send(plain_request()).await;

    assert!(matches!(result, Err(MandrillError::Transport(ref e)) if e.is_timeout()));
}

#[tokio::test]
async fn the_default_endpoints_point_at_mandrill() {
    let client = MandrillClient::new();

    assert_eq!(
        client.messages_endpoint(),
        "https://mandrillapp.com/api/1.0/messages/send.json"
    );
    assert_eq!(
        client.templates_endpoint(),
        "https://mandrillapp.com/api/1.0/messages/send-template.json"
    );
}
