//! Pipeline Orchestrator
//!
//! Runs the fixed retrieve → generate flow as an explicit state machine.
//! The topology is picked at construction; there is no branching at run time.

use crate::config::{QuarryConfig, WorkspaceCredentials};
use crate::generation::{context_messages, ChatModel, ServingEndpointClient};
use crate::message::{last_user_message, Message};
use crate::response::ChatCompletionResponse;
use crate::retrieval::{format_passages, DocumentIndex, IndexQuery, VectorSearchClient};
use crate::{QuarryError, Result};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use super::state::{MergeStrategy, PipelineState, StateUpdate};

/// Which graph the pipeline runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    /// START → RETRIEVE → END
    SearchOnly,
    /// START → RETRIEVE → GENERATE → END
    Chat,
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topology::SearchOnly => f.write_str("search"),
            Topology::Chat => f.write_str("chat"),
        }
    }
}

impl FromStr for Topology {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "search" | "search-only" | "search_only" => Ok(Topology::SearchOnly),
            "chat" => Ok(Topology::Chat),
            other => Err(format!("unknown topology `{other}` (expected `search` or `chat`)")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node {
    Retrieve,
    Generate,
}

impl Node {
    pub fn name(self) -> &'static str {
        match self {
            Node::Retrieve => "retrieve",
            Node::Generate => "generate_w_context",
        }
    }
}

/// A node bound to the collaborator it runs with
#[derive(Clone, Copy)]
enum Stage<'a> {
    Retrieve,
    Generate(&'a dyn ChatModel),
}

impl Stage<'_> {
    fn node(self) -> Node {
        match self {
            Stage::Retrieve => Node::Retrieve,
            Stage::Generate(_) => Node::Generate,
        }
    }
}

/// Collaborators fixed at construction; only the chat graph owns a model
enum Graph {
    SearchOnly,
    Chat(Arc<dyn ChatModel>),
}

impl Graph {
    fn topology(&self) -> Topology {
        match self {
            Graph::SearchOnly => Topology::SearchOnly,
            Graph::Chat(_) => Topology::Chat,
        }
    }
}

/// Position of a run inside the graph
#[derive(Clone, Copy)]
enum Step<'a> {
    Start,
    Run(Stage<'a>),
    End,
}

impl<'a> Step<'a> {
    /// Static edge table.
    fn next(self, graph: &'a Graph) -> Step<'a> {
        match (self, graph) {
            (Step::Start, _) => Step::Run(Stage::Retrieve),
            (Step::Run(Stage::Retrieve), Graph::SearchOnly) => Step::End,
            (Step::Run(Stage::Retrieve), Graph::Chat(model)) => {
                Step::Run(Stage::Generate(model.as_ref()))
            }
            (Step::Run(Stage::Generate(_)), _) => Step::End,
            (Step::End, _) => Step::End,
        }
    }
}

/// Retrieval-augmented answer pipeline.
///
/// Immutable once built; share it behind an `Arc` and call [`Pipeline::invoke`]
/// once per request.
pub struct Pipeline {
    graph: Graph,
    config: Arc<QuarryConfig>,
    index: Arc<dyn DocumentIndex>,
}

impl Pipeline {
    /// `model` is dropped for [`Topology::SearchOnly`].
    pub fn new(
        topology: Topology,
        config: Arc<QuarryConfig>,
        index: Arc<dyn DocumentIndex>,
        model: Arc<dyn ChatModel>,
    ) -> Self {
        let graph = match topology {
            Topology::SearchOnly => Graph::SearchOnly,
            Topology::Chat => Graph::Chat(model),
        };
        Self {
            graph,
            config,
            index,
        }
    }

    /// Retrieval only, without a model client.
    pub fn search_only(config: Arc<QuarryConfig>, index: Arc<dyn DocumentIndex>) -> Self {
        Self {
            graph: Graph::SearchOnly,
            config,
            index,
        }
    }

    pub fn chat(
        config: Arc<QuarryConfig>,
        index: Arc<dyn DocumentIndex>,
        model: Arc<dyn ChatModel>,
    ) -> Self {
        Self::new(Topology::Chat, config, index, model)
    }

    /// Wire the HTTP clients described by `config` for the given topology.
    pub fn from_config(
        config: Arc<QuarryConfig>,
        creds: WorkspaceCredentials,
        topology: Topology,
    ) -> Result<Self> {
        let index = Arc::new(VectorSearchClient::new(creds.clone(), &config.retriever)?);
        Ok(match topology {
            Topology::SearchOnly => Self::search_only(config, index),
            Topology::Chat => {
                let model = Arc::new(ServingEndpointClient::new(creds, &config.model)?);
                Self::chat(config, index, model)
            }
        })
    }

    pub fn topology(&self) -> Topology {
        self.graph.topology()
    }

    pub fn config(&self) -> &QuarryConfig {
        &self.config
    }

    /// Run the graph to completion and return the final merged state.
    #[instrument(skip(self, messages), fields(topology = %self.topology(), messages = messages.len()))]
    pub async fn run(&self, messages: Vec<Message>) -> Result<PipelineState> {
        let merge = MergeStrategy::for_streaming(self.config.agent.streaming);
        let mut state = PipelineState::new(messages, merge)?;

        let mut step = Step::Start.next(&self.graph);
        while let Step::Run(stage) = step {
            debug!(target: "pipeline", node = stage.node().name(), merge = ?merge, "Running node");
            let update = match stage {
                Stage::Retrieve => self.retrieve(&state).await?,
                Stage::Generate(model) => self.generate(model, &state).await?,
            };
            state.apply(update);
            step = step.next(&self.graph);
        }

        info!(
            target: "pipeline",
            documents = state.documents().map_or(0, |d| d.len()),
            messages = state.messages().len(),
            "Pipeline complete"
        );
        Ok(state)
    }

    /// Run the graph and shape the final state into the wire response.
    pub async fn invoke(&self, messages: Vec<Message>) -> Result<ChatCompletionResponse> {
        let state = self.run(messages).await?;
        ChatCompletionResponse::from_state(&state, self.topology())
    }

    async fn retrieve(&self, state: &PipelineState) -> Result<StateUpdate> {
        let retriever = &self.config.retriever;
        let question = last_user_message(state.messages())?;
        let text = question
            .first()
            .map(|m| m.content.clone())
            .ok_or(QuarryError::NoUserMessage)?;

        let query = IndexQuery::from_config(text, retriever);
        let documents = self.index.query(&query).await?;
        let context = format_passages(
            &documents,
            &retriever.chunk_template,
            &retriever.mapping.document_uri,
        );

        debug!(
            target: "pipeline",
            index = self.index.name(),
            documents = documents.len(),
            context_chars = context.len(),
            "Retrieved context"
        );
        Ok(StateUpdate::retrieval(context, documents))
    }

    async fn generate(&self, model: &dyn ChatModel, state: &PipelineState) -> Result<StateUpdate> {
        let question = last_user_message(state.messages())?;
        let context = state.context().unwrap_or_default();

        let reply = model.generate(&context_messages(context, &question)).await?;
        debug!(target: "pipeline", model = model.name(), chars = reply.content.len(), "Generated reply");

        let messages = if self.config.agent.streaming {
            let mut history = state.messages().to_vec();
            history.push(reply);
            history
        } else {
            vec![reply]
        };
        Ok(StateUpdate::messages(messages))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl ChatModel for Echo {
        async fn generate(&self, messages: &[Message]) -> Result<Message> {
            Ok(Message::assistant(messages.len().to_string()))
        }
    }

    fn walk(graph: &Graph) -> Vec<Node> {
        let mut visited = Vec::new();
        let mut step = Step::Start.next(graph);
        while let Step::Run(stage) = step {
            visited.push(stage.node());
            step = step.next(graph);
        }
        assert!(matches!(step.next(graph), Step::End));
        visited
    }

    #[test]
    fn test_search_only_edges() {
        assert_eq!(walk(&Graph::SearchOnly), vec![Node::Retrieve]);
    }

    #[test]
    fn test_chat_edges() {
        let graph = Graph::Chat(Arc::new(Echo));
        assert_eq!(walk(&graph), vec![Node::Retrieve, Node::Generate]);
        assert_eq!(graph.topology(), Topology::Chat);
    }

    #[test]
    fn test_node_names() {
        assert_eq!(Node::Retrieve.name(), "retrieve");
        assert_eq!(Node::Generate.name(), "generate_w_context");
    }

    #[test]
    fn test_topology_parsing() {
        assert_eq!("chat".parse::<Topology>(), Ok(Topology::Chat));
        assert_eq!("Search".parse::<Topology>(), Ok(Topology::SearchOnly));
        assert_eq!("search_only".parse::<Topology>(), Ok(Topology::SearchOnly));
        assert!("graph".parse::<Topology>().is_err());
        assert_eq!(Topology::SearchOnly.to_string(), "search");
    }
}
