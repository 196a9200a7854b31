//! Supervisor/worker team graphs.
//!
//! A team is a set of named nodes joined by edges. After a node runs, the runner
//! follows its plain edge, or for conditional edges looks up `state.next` in the
//! node's path map. Routing to [`END`] stops the run.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::agent::Agent;
use crate::errors::{RoomError, RoomResult};
use crate::models::message::Message;
use crate::models::role::Role;
use crate::providers::utils::sanitize_function_name;
use crate::supervisor::{Supervisor, FINISH};
use crate::toolkits::WorkingDirectory;

/// Routing target that stops the run
pub const END: &str = "__end__";

/// Error when compiling a team graph
#[derive(Debug, Error, PartialEq)]
pub enum CompilationError {
    #[error("entry point not set")]
    MissingEntryPoint,

    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("node already added: {0}")]
    DuplicateNode(String),

    #[error("node has both edge and conditional edges: {0}")]
    NodeHasBothEdgeAndConditional(String),

    #[error("conditional path_map invalid target: {0}")]
    InvalidConditionalPathMap(String),

    #[error("node has no outgoing edge: {0}")]
    NoOutgoingEdge(String),
}

/// The conversation state shared by every node of a team run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamState {
    pub messages: Vec<Message>,
    pub team_members: Vec<String>,
    pub next: Option<String>,
    pub current_files: Option<String>,
}

impl TeamState {
    /// Start a run from a single user message
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::user().with_text(input)],
            ..Self::default()
        }
    }

    pub fn with_members(mut self, members: Vec<String>) -> Self {
        self.team_members = members;
        self
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Values role prompts may reference
    pub fn prompt_context(&self) -> Value {
        json!({
            "team_members": self.team_members.join(", "),
            "current_files": self.current_files.clone().unwrap_or_default(),
        })
    }

    fn apply(&mut self, update: &StateUpdate) {
        self.messages.extend(update.messages.iter().cloned());
        if update.next.is_some() {
            self.next = update.next.clone();
        }
    }
}

/// What a node adds to the state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateUpdate {
    pub messages: Vec<Message>,
    pub next: Option<String>,
}

impl StateUpdate {
    pub fn message(message: Message) -> Self {
        Self {
            messages: vec![message],
            next: None,
        }
    }

    pub fn route(next: impl Into<String>) -> Self {
        Self {
            messages: Vec::new(),
            next: Some(next.into()),
        }
    }
}

/// One executed node and the update it produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub node: String,
    pub update: StateUpdate,
}

#[async_trait]
pub trait Node: Send + Sync {
    async fn run(&self, state: &TeamState) -> RoomResult<StateUpdate>;
}

#[derive(Clone)]
enum Route {
    Edge(String),
    Conditional(HashMap<String, String>),
}

/// Builder for a team
#[derive(Default)]
pub struct TeamGraph {
    nodes: HashMap<String, Arc<dyn Node>>,
    order: Vec<String>,
    edges: HashMap<String, String>,
    conditional: HashMap<String, HashMap<String, String>>,
    entry_point: Option<String>,
    duplicates: Vec<String>,
}

impl TeamGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(mut self, name: impl Into<String>, node: Arc<dyn Node>) -> Self {
        let name = name.into();
        if self.nodes.insert(name.clone(), node).is_some() {
            self.duplicates.push(name);
        } else {
            self.order.push(name);
        }
        self
    }

    pub fn add_edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.edges.insert(from.into(), to.into());
        self
    }

    /// Route from `source` by looking up `state.next` in `path_map`
    pub fn add_conditional_edges(
        mut self,
        source: impl Into<String>,
        path_map: HashMap<String, String>,
    ) -> Self {
        self.conditional.insert(source.into(), path_map);
        self
    }

    pub fn set_entry_point(mut self, name: impl Into<String>) -> Self {
        self.entry_point = Some(name.into());
        self
    }

    pub fn compile(self) -> Result<CompiledTeam, CompilationError> {
        if let Some(name) = self.duplicates.first() {
            return Err(CompilationError::DuplicateNode(name.clone()));
        }
        let entry_point = self
            .entry_point
            .clone()
            .ok_or(CompilationError::MissingEntryPoint)?;
        if !self.nodes.contains_key(&entry_point) {
            return Err(CompilationError::NodeNotFound(entry_point));
        }

        let known = |name: &str| name == END || self.nodes.contains_key(name);
        for (from, to) in &self.edges {
            if !self.nodes.contains_key(from) {
                return Err(CompilationError::NodeNotFound(from.clone()));
            }
            if !known(to) {
                return Err(CompilationError::NodeNotFound(to.clone()));
            }
            if self.conditional.contains_key(from) {
                return Err(CompilationError::NodeHasBothEdgeAndConditional(from.clone()));
            }
        }
        for (source, path_map) in &self.conditional {
            if !self.nodes.contains_key(source) {
                return Err(CompilationError::NodeNotFound(source.clone()));
            }
            if let Some(target) = path_map.values().find(|target| !known(target)) {
                return Err(CompilationError::InvalidConditionalPathMap(target.clone()));
            }
        }

        let mut routes = HashMap::new();
        for name in &self.order {
            let route = match (self.edges.get(name), self.conditional.get(name)) {
                (Some(to), None) => Route::Edge(to.clone()),
                (None, Some(path_map)) => Route::Conditional(path_map.clone()),
                _ => return Err(CompilationError::NoOutgoingEdge(name.clone())),
            };
            routes.insert(name.clone(), route);
        }

        Ok(CompiledTeam {
            nodes: self.nodes,
            members: self.order,
            routes,
            entry_point,
        })
    }
}

/// A validated team ready to run
#[derive(Clone)]
pub struct CompiledTeam {
    nodes: HashMap<String, Arc<dyn Node>>,
    members: Vec<String>,
    routes: HashMap<String, Route>,
    entry_point: String,
}

impl CompiledTeam {
    /// Node names in the order they were added
    pub fn members(&self) -> &[String] {
        &self.members
    }

    fn next_node(&self, current: &str, state: &TeamState) -> RoomResult<String> {
        match self.routes.get(current) {
            Some(Route::Edge(to)) => Ok(to.clone()),
            Some(Route::Conditional(path_map)) => {
                let key = state.next.clone().unwrap_or_default();
                path_map
                    .get(&key)
                    .cloned()
                    .ok_or(RoomError::InvalidRoute(key))
            }
            None => Err(RoomError::UnknownNode(current.to_string())),
        }
    }

    /// Run the team, yielding each executed node with its update
    pub fn stream(
        &self,
        state: TeamState,
        recursion_limit: usize,
    ) -> BoxStream<'_, RoomResult<Step>> {
        Box::pin(async_stream::try_stream! {
            let mut state = state;
            let mut current = self.entry_point.clone();
            let mut steps = 0;

            while current != END {
                if steps >= recursion_limit {
                    Err::<(), _>(RoomError::RecursionLimit(recursion_limit))?;
                }
                steps += 1;

                let node = self
                    .nodes
                    .get(&current)
                    .ok_or_else(|| RoomError::UnknownNode(current.clone()))?;
                tracing::debug!(node = %current, step = steps, "running node");
                let update = node.run(&state).await?;
                state.apply(&update);

                let next = self.next_node(&current, &state)?;
                yield Step { node: current.clone(), update };
                current = next;
            }
        })
    }

    /// Run the team to completion and return the final state
    pub async fn invoke(&self, state: TeamState, recursion_limit: usize) -> RoomResult<TeamState> {
        let mut final_state = state.clone();
        let mut steps = self.stream(state, recursion_limit);
        while let Some(step) = steps.try_next().await? {
            final_state.apply(&step.update);
        }
        Ok(final_state)
    }
}

/// Runs an agent on the conversation and reports its answer under the agent's name
pub struct AgentNode {
    agent: Agent,
    files: Option<WorkingDirectory>,
}

impl AgentNode {
    pub fn new(agent: Agent) -> Self {
        Self { agent, files: None }
    }

    /// Describe the files in `dir` to the agent before each run
    pub fn with_current_files(mut self, dir: WorkingDirectory) -> Self {
        self.files = Some(dir);
        self
    }
}

#[async_trait]
impl Node for AgentNode {
    async fn run(&self, state: &TeamState) -> RoomResult<StateUpdate> {
        let mut context = state.clone();
        if let Some(dir) = &self.files {
            context.current_files = Some(dir.describe());
        }

        let output = self.agent.invoke(&state.messages, &context).await?;
        Ok(StateUpdate::message(
            Message::user()
                .with_name(sanitize_function_name(self.agent.name()))
                .with_text(output),
        ))
    }
}

/// Runs a nested team on the latest message and reports what it concluded
pub struct TeamNode {
    name: String,
    team: CompiledTeam,
    recursion_limit: usize,
}

impl TeamNode {
    pub fn new(name: impl Into<String>, team: CompiledTeam, recursion_limit: usize) -> Self {
        Self {
            name: name.into(),
            team,
            recursion_limit,
        }
    }
}

#[async_trait]
impl Node for TeamNode {
    async fn run(&self, state: &TeamState) -> RoomResult<StateUpdate> {
        let input = state
            .last_message()
            .map(|m| m.text())
            .unwrap_or_default();
        let nested = TeamState::new(input).with_members(self.team.members().to_vec());
        let result = self.team.invoke(nested, self.recursion_limit).await?;

        let report = result
            .messages
            .iter()
            .rev()
            .find(|m| m.role != Role::System)
            .map(|m| m.text())
            .unwrap_or_default();
        Ok(StateUpdate::message(
            Message::user()
                .with_name(sanitize_function_name(&self.name))
                .with_text(report),
        ))
    }
}

/// Every worker reports back to the supervisor, which routes to a worker or finishes
pub fn supervised_team(
    supervisor: Supervisor,
    workers: Vec<(String, Arc<dyn Node>)>,
) -> Result<CompiledTeam, CompilationError> {
    let supervisor_name = supervisor.name().to_string();
    let mut path_map: HashMap<String, String> = workers
        .iter()
        .map(|(name, _)| (name.clone(), name.clone()))
        .collect();
    path_map.insert(FINISH.to_string(), END.to_string());

    let mut graph = TeamGraph::new();
    for (name, node) in workers {
        graph = graph
            .add_edge(name.clone(), supervisor_name.clone())
            .add_node(name, node);
    }
    graph
        .add_node(supervisor_name.clone(), Arc::new(supervisor))
        .add_conditional_edges(supervisor_name.clone(), path_map)
        .set_entry_point(supervisor_name)
        .compile()
}
