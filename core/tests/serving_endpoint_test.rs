use mockito::{Matcher, Server};
use pretty_assertions::assert_eq;
use quarry_core::{
    ChatModel, Message, ModelConfig, QuarryError, Role, ServingEndpointClient,
    WorkspaceCredentials,
};
use serde_json::json;

const PATH: &str = "/serving-endpoints/chat-endpoint/invocations";

fn model_config() -> ModelConfig {
    serde_yml::from_str(
        "endpoint_name: chat-endpoint\nparameters:\n  temperature: 0.1\n  max_tokens: 500\n",
    )
    .unwrap()
}

fn client(server: &Server, token: Option<&str>) -> ServingEndpointClient {
    let creds = WorkspaceCredentials::new(server.url(), token.map(str::to_string));
    ServingEndpointClient::new(creds, &model_config()).unwrap()
}

#[tokio::test]
async fn test_generate_posts_chat_completion() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", PATH)
        .match_header("authorization", "Bearer dapi-test")
        .match_body(Matcher::Json(json!({
            "messages": [
                {"role": "system", "content": "context here"},
                {"role": "user", "content": "What is Quarry?"}
            ],
            "temperature": 0.1,
            "max_tokens": 500
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "id": "chatcmpl-1",
                "object": "chat.completion",
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": "A retrieval pipeline."},
                    "finish_reason": "stop"
                }]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let reply = client(&server, Some("dapi-test"))
        .generate(&[
            Message::system("context here"),
            Message::user("What is Quarry?"),
        ])
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(reply.role, Role::Assistant);
    assert_eq!(reply.content, "A retrieval pipeline.");
}

#[tokio::test]
async fn test_generate_without_token_sends_no_auth() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", PATH)
        .match_header("authorization", Matcher::Missing)
        .with_status(200)
        .with_body(json!({"choices": [{"message": {"content": "ok"}}]}).to_string())
        .create_async()
        .await;

    let reply = client(&server, None)
        .generate(&[Message::user("hi")])
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(reply.content, "ok");
}

#[tokio::test]
async fn test_generate_surfaces_status_errors() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", PATH)
        .with_status(429)
        .with_body("REQUEST_LIMIT_EXCEEDED")
        .create_async()
        .await;

    let err = client(&server, Some("t"))
        .generate(&[Message::user("hi")])
        .await
        .unwrap_err();

    match err {
        QuarryError::Service { status, body, .. } => {
            assert_eq!(status, 429);
            assert_eq!(body, "REQUEST_LIMIT_EXCEEDED");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_generate_rejects_reply_without_content() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", PATH)
        .with_status(200)
        .with_body(json!({"choices": []}).to_string())
        .create_async()
        .await;

    let err = client(&server, Some("t"))
        .generate(&[Message::user("hi")])
        .await
        .unwrap_err();

    assert!(matches!(err, QuarryError::MalformedResponse { .. }));
}

#[tokio::test]
async fn test_generate_rejects_non_json_reply() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", PATH)
        .with_status(200)
        .with_body("<html>gateway</html>")
        .create_async()
        .await;

    let err = client(&server, Some("t"))
        .generate(&[Message::user("hi")])
        .await
        .unwrap_err();

    assert!(err.is_upstream());
    assert!(err.to_string().contains("invalid JSON"));
}
