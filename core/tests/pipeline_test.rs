use async_trait::async_trait;
use mockall::mock;
use pretty_assertions::assert_eq;
use quarry_core::{
    ChatModel, DocumentIndex, IndexQuery, Message, Pipeline, QuarryConfig, QuarryError,
    Result, RetrievedPassage, Role, Topology,
};
use serde_json::{json, Map};
use std::sync::Arc;

mock! {
    pub Index {}

    #[async_trait]
    impl DocumentIndex for Index {
        async fn query(&self, query: &IndexQuery) -> Result<Vec<RetrievedPassage>>;
    }
}

mock! {
    pub Model {}

    #[async_trait]
    impl ChatModel for Model {
        async fn generate(&self, messages: &[Message]) -> Result<Message>;
    }
}

fn config(streaming: bool) -> Arc<QuarryConfig> {
    let yaml = format!(
        r#"
agent:
  streaming: {streaming}
model:
  endpoint_name: chat-endpoint
  parameters:
    temperature: 0.0
    max_tokens: 256
retriever:
  endpoint_name: vs_endpoint
  index_name: main.docs.chunks_index
  embedding_model: gte-large
  parameters:
    k: 3
  mapping:
    chunk_text: text
    document_uri: url
    primary_key: id
    other_columns: [page]
"#
    );
    Arc::new(QuarryConfig::from_yaml_str(&yaml).unwrap())
}

fn passage(text: &str, id: i64) -> RetrievedPassage {
    let mut metadata = Map::new();
    metadata.insert("url".into(), json!(format!("https://docs.example.org/{id}")));
    metadata.insert("id".into(), json!(id));
    metadata.insert("page".into(), json!(1));
    RetrievedPassage::new(text, metadata)
}

fn passages() -> Vec<RetrievedPassage> {
    vec![passage("alpha", 1), passage("beta", 2), passage("gamma", 3)]
}

fn index_returning(expected_text: &'static str) -> MockIndex {
    let mut index = MockIndex::new();
    index
        .expect_query()
        .withf(move |q: &IndexQuery| {
            q.query_text == expected_text
                && q.k == 3
                && q.columns == ["text", "url", "id", "page"]
                && q.query_type == "ann"
        })
        .times(1)
        .returning(|_| Ok(passages()));
    index
}

#[tokio::test]
async fn test_search_only_never_calls_the_model() {
    let index = index_returning("What is Quarry?");
    let mut model = MockModel::new();
    model.expect_generate().never();

    let pipeline = Pipeline::new(
        Topology::SearchOnly,
        config(false),
        Arc::new(index),
        Arc::new(model),
    );
    let state = pipeline
        .run(vec![Message::user("What is Quarry?")])
        .await
        .unwrap();

    assert_eq!(state.messages(), &[Message::user("What is Quarry?")]);
    assert_eq!(state.documents().map(|d| d.len()), Some(3));
    let context = state.context().unwrap();
    assert!(context.starts_with("Passage: alpha\n Document URI: https://docs.example.org/1\n"));
    assert!(context.ends_with("Passage: gamma\n Document URI: https://docs.example.org/3\n"));
}

#[tokio::test]
async fn test_chat_appends_single_reply() {
    let index = index_returning("What is Quarry?");
    let mut model = MockModel::new();
    model
        .expect_generate()
        .withf(|messages: &[Message]| {
            messages.len() == 2
                && messages[0].role == Role::System
                && messages[0].content.contains("Passage: beta")
                && messages[1] == Message::user("What is Quarry?")
        })
        .times(1)
        .returning(|_| Ok(Message::assistant("A retrieval pipeline.")));

    let pipeline = Pipeline::chat(config(false), Arc::new(index), Arc::new(model));
    let response = pipeline
        .invoke(vec![Message::user("What is Quarry?")])
        .await
        .unwrap();

    assert_eq!(response.answer(), "A retrieval pipeline.");
    assert_eq!(response.choices[0].message.role, Role::Assistant);
    assert_eq!(response.custom_outputs.documents.len(), 3);
    assert_eq!(response.custom_outputs.documents[0]["page_content"], "alpha");

    let history = &response.custom_outputs.message_history;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0], Message::user("What is Quarry?"));
    assert_eq!(history[1].role, Role::Tool);
    assert!(history[1].content.contains("Passage: alpha"));
}

#[tokio::test]
async fn test_chat_state_has_question_then_answer() {
    let index = index_returning("Q");
    let mut model = MockModel::new();
    model
        .expect_generate()
        .times(1)
        .returning(|_| Ok(Message::assistant("A")));

    let pipeline = Pipeline::chat(config(false), Arc::new(index), Arc::new(model));
    let state = pipeline.run(vec![Message::user("Q")]).await.unwrap();

    assert_eq!(state.messages(), &[Message::user("Q"), Message::assistant("A")]);
    assert_eq!(state.documents().map(|d| d.len()), Some(3));
}

#[tokio::test]
async fn test_streaming_replaces_history_without_duplicates() {
    let index = index_returning("and the second?");
    let mut model = MockModel::new();
    model
        .expect_generate()
        .withf(|messages: &[Message]| {
            // Only the latest question reaches the model
            messages.len() == 2 && messages[1] == Message::user("and the second?")
        })
        .times(1)
        .returning(|_| Ok(Message::assistant("second answer")));

    let conversation = vec![
        Message::system("be brief"),
        Message::user("first question"),
        Message::assistant("first answer"),
        Message::user("and the second?"),
    ];

    let pipeline = Pipeline::chat(config(true), Arc::new(index), Arc::new(model));
    let state = pipeline.run(conversation.clone()).await.unwrap();

    let mut expected = conversation;
    expected.push(Message::assistant("second answer"));
    assert_eq!(state.messages(), expected.as_slice());
}

#[tokio::test]
async fn test_question_is_last_user_turn() {
    let index = index_returning("second");
    let mut model = MockModel::new();
    model
        .expect_generate()
        .times(1)
        .returning(|_| Ok(Message::assistant("ok")));

    let pipeline = Pipeline::chat(config(false), Arc::new(index), Arc::new(model));
    let state = pipeline
        .run(vec![
            Message::user("first"),
            Message::assistant("reply"),
            Message::user("second"),
            Message::assistant("trailing"),
        ])
        .await
        .unwrap();

    assert_eq!(state.messages().len(), 5);
    assert_eq!(state.messages()[4], Message::assistant("ok"));
}

#[tokio::test]
async fn test_conversation_without_user_turn_is_rejected() {
    let mut index = MockIndex::new();
    index.expect_query().never();
    let mut model = MockModel::new();
    model.expect_generate().never();

    let pipeline = Pipeline::chat(config(false), Arc::new(index), Arc::new(model));
    let result = pipeline
        .run(vec![Message::system("s"), Message::assistant("hello")])
        .await;

    assert!(matches!(result, Err(QuarryError::NoUserMessage)));
}

#[tokio::test]
async fn test_empty_conversation_is_rejected() {
    let mut index = MockIndex::new();
    index.expect_query().never();

    let pipeline = Pipeline::search_only(config(false), Arc::new(index));
    let result = pipeline.invoke(vec![]).await;

    assert!(matches!(result, Err(QuarryError::NoUserMessage)));
}

#[tokio::test]
async fn test_index_failure_propagates_unchanged() {
    let mut index = MockIndex::new();
    index.expect_query().times(1).returning(|_| {
        Err(QuarryError::Service {
            service: "vector search",
            status: 503,
            body: "endpoint scaling".into(),
        })
    });
    let mut model = MockModel::new();
    model.expect_generate().never();

    let pipeline = Pipeline::chat(config(false), Arc::new(index), Arc::new(model));
    let err = pipeline.invoke(vec![Message::user("Q")]).await.unwrap_err();

    match err {
        QuarryError::Service { status, body, .. } => {
            assert_eq!(status, 503);
            assert_eq!(body, "endpoint scaling");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_model_failure_propagates_unchanged() {
    let index = index_returning("Q");
    let mut model = MockModel::new();
    model.expect_generate().times(1).returning(|_| {
        Err(QuarryError::MalformedResponse {
            service: "serving endpoint",
            reason: "missing choices[0].message.content".into(),
        })
    });

    let pipeline = Pipeline::chat(config(false), Arc::new(index), Arc::new(model));
    let err = pipeline.invoke(vec![Message::user("Q")]).await.unwrap_err();

    assert!(err.is_upstream());
    assert!(matches!(err, QuarryError::MalformedResponse { .. }));
}

#[tokio::test]
async fn test_search_only_response_uses_context_as_answer() {
    let index = index_returning("Q");
    let pipeline = Pipeline::search_only(config(false), Arc::new(index));

    let response = pipeline.invoke(vec![Message::user("Q")]).await.unwrap();

    assert!(response.answer().starts_with("Passage: alpha"));
    assert_eq!(response.custom_outputs.message_history, vec![Message::user("Q")]);
    assert_eq!(response.custom_outputs.documents.len(), 3);
}

#[tokio::test]
async fn test_empty_retrieval_still_generates() {
    let mut index = MockIndex::new();
    index.expect_query().times(1).returning(|_| Ok(vec![]));
    let mut model = MockModel::new();
    model
        .expect_generate()
        .withf(|messages: &[Message]| messages[0].content.contains("help you answer: ."))
        .times(1)
        .returning(|_| Ok(Message::assistant("I do not know.")));

    let pipeline = Pipeline::chat(config(false), Arc::new(index), Arc::new(model));
    let response = pipeline.invoke(vec![Message::user("Q")]).await.unwrap();

    assert_eq!(response.answer(), "I do not know.");
    assert!(response.custom_outputs.documents.is_empty());
    assert_eq!(
        response.custom_outputs.message_history,
        vec![Message::user("Q"), Message::tool("")]
    );
}
