//! Ready-made rooms: which agents sit at the table and who leads them.

use anyhow::Result;
use futures::stream::BoxStream;
use indoc::indoc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strum_macros::{Display, EnumIter, EnumString};

use crate::agent::Agent;
use crate::errors::RoomResult;
use crate::graph::{
    supervised_team, AgentNode, CompiledTeam, Node, Step, TeamGraph, TeamNode, TeamState, END,
};
use crate::providers::base::Provider;
use crate::providers::factory::get_provider;
use crate::settings::{ModelRole, Settings};
use crate::supervisor::Supervisor;
use crate::toolkits::{
    ClockToolkit, CodeRunner, CodeToolkit, DocumentTool, DocumentsToolkit, ScraperToolkit,
    SearchToolkit, WorkingDirectory,
};

const RESEARCH_TEAM: &str = "Research Team";
const CODING_TEAM: &str = "Coding Team";

const RESEARCHER_PROMPT: &str =
    "You are a research assistant who can search for up-to-date info using a search engine.";
const SEARCH_PROMPT: &str =
    "You are a research assistant who can search for up-to-date info using the DuckDuckGo search engine.";
const WEB_SCRAPER_PROMPT: &str = "You are a research assistant who can scrape specified urls for more detailed information using the scrape_webpages function.";
const CODER_PROMPT: &str = "You are a coder who can create and run python code.";
const DATA_ANALYST_PROMPT: &str = "You are a data analyst that process and analyze data.";
const DOC_WRITER_PROMPT: &str = "You are an expert writing a research document.\nBelow are files currently in your directory:\n{{ current_files }}";
const NOTE_TAKER_PROMPT: &str = "You are an expert senior researcher tasked with writing a paper outline and taking notes to craft a perfect paper.{{ current_files }}";
const CHART_GENERATOR_PROMPT: &str = "You are a data viz expert tasked with generating charts for a research project.{{ current_files }}";
const MEETING_PROMPT: &str = "Answer the following questions as best you can. You can check the current date, run python code and search the web.";

const DISCUSSION_SUPERVISOR_PROMPT: &str = indoc! {"
    You are a supervisor tasked with managing a discussion between the following teams: {{ team_members }}.
    The goal of the discussion is to find a useful and correct answer to what is asked from the user.

    To do that you need to define a set of steps needed to find the answer.
    If you are not able to correctly do a step, you can delegate it to a team based on their skills.

    Here is a description of the team skills:
    Research Team: this team can find specific information using internet;
    Coding Team: this team can create and run python code;

    Once you find a correct answer to the question respond with FINISH.
"};

/// The preset rooms a conversation can be held in
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumIter,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum RoomKind {
    #[default]
    Basic,
    Research,
    Authoring,
    Coding,
    Discussion,
    Meeting,
}

impl RoomKind {
    pub fn description(&self) -> &'static str {
        match self {
            RoomKind::Basic => "A supervisor with a researcher and a coder",
            RoomKind::Research => "Searches the web and scrapes pages for details",
            RoomKind::Authoring => "Writes, outlines and charts documents in a shared directory",
            RoomKind::Coding => "A coder and a data analyst running python",
            RoomKind::Discussion => "A supervisor leading the research and coding teams",
            RoomKind::Meeting => "A single assistant with date, code and search tools",
        }
    }
}

/// The models agents of a room talk to
#[derive(Clone)]
pub struct RoomProviders {
    pub general: Arc<dyn Provider>,
    pub code: Arc<dyn Provider>,
}

impl RoomProviders {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self {
            general: get_provider(settings.provider_config(ModelRole::General)?)?,
            code: get_provider(settings.provider_config(ModelRole::Code)?)?,
        })
    }

    /// One provider for every agent
    pub fn single(provider: Arc<dyn Provider>) -> Self {
        Self {
            general: provider.clone(),
            code: provider,
        }
    }
}

/// A compiled team plus the limits it runs under
pub struct Room {
    kind: RoomKind,
    team: CompiledTeam,
    recursion_limit: usize,
    working_directory: WorkingDirectory,
}

impl Room {
    pub fn kind(&self) -> RoomKind {
        self.kind
    }

    pub fn working_directory(&self) -> &WorkingDirectory {
        &self.working_directory
    }

    fn initial_state(&self, input: &str) -> TeamState {
        TeamState::new(input).with_members(self.team.members().to_vec())
    }

    /// Run one turn, yielding every node as it finishes
    pub fn stream(&self, input: &str) -> BoxStream<'_, RoomResult<Step>> {
        tracing::debug!(room = %self.kind, "starting turn");
        self.team
            .stream(self.initial_state(input), self.recursion_limit)
    }

    /// Run one turn to completion
    pub async fn run(&self, input: &str) -> RoomResult<TeamState> {
        self.team
            .invoke(self.initial_state(input), self.recursion_limit)
            .await
    }
}

/// Build a room with the providers described by the settings
pub fn build_room(kind: RoomKind, settings: &Settings) -> Result<Room> {
    build_room_with(kind, settings, RoomProviders::from_settings(settings)?)
}

/// Build a room talking to the given providers
pub fn build_room_with(kind: RoomKind, settings: &Settings, providers: RoomProviders) -> Result<Room> {
    let working_directory = WorkingDirectory::from_setting(settings.tools.working_dir.as_deref())?;
    let builder = RoomBuilder {
        settings,
        providers,
        working_directory: working_directory.clone(),
    };

    let team = match kind {
        RoomKind::Basic => builder.basic()?,
        RoomKind::Research => builder.research()?,
        RoomKind::Authoring => builder.authoring()?,
        RoomKind::Coding => builder.coding()?,
        RoomKind::Discussion => builder.discussion()?,
        RoomKind::Meeting => builder.meeting()?,
    };
    tracing::debug!(room = %kind, members = ?team.members(), "room built");

    Ok(Room {
        kind,
        team,
        recursion_limit: settings.room.recursion_limit,
        working_directory,
    })
}

struct RoomBuilder<'a> {
    settings: &'a Settings,
    providers: RoomProviders,
    working_directory: WorkingDirectory,
}

impl RoomBuilder<'_> {
    fn agent(&self, name: &str, prompt: &str, role: ModelRole) -> Agent {
        let provider = match role {
            ModelRole::General => self.providers.general.clone(),
            ModelRole::Code => self.providers.code.clone(),
        };
        Agent::new(name, prompt, provider)
            .with_max_iterations(self.settings.room.max_agent_iterations)
            .with_chat_length(self.settings.llm_chat_length())
    }

    fn search(&self) -> SearchToolkit {
        SearchToolkit::from_settings(&self.settings.tools)
    }

    fn code(&self) -> CodeToolkit {
        CodeToolkit::new(CodeRunner::from_settings(&self.settings.tools))
            .with_working_dir(self.working_directory.path())
    }

    fn documents(&self, tools: &[DocumentTool]) -> DocumentsToolkit {
        DocumentsToolkit::with_tools(self.working_directory.clone(), tools)
    }

    fn supervisor(&self, name: &str, workers: &[(String, Arc<dyn Node>)]) -> Result<Supervisor> {
        let members = workers.iter().map(|(member, _)| member.clone()).collect();
        Ok(Supervisor::with_default_prompt(
            name,
            members,
            self.providers.general.clone(),
        )?)
    }

    fn team(&self, supervisor: &str, workers: Vec<(String, Arc<dyn Node>)>) -> Result<CompiledTeam> {
        let supervisor = self.supervisor(supervisor, &workers)?;
        Ok(supervised_team(supervisor, workers)?)
    }

    fn basic(&self) -> Result<CompiledTeam> {
        let researcher = self
            .agent("Researcher", RESEARCHER_PROMPT, ModelRole::General)
            .with_toolkit(self.search());
        let coder = self
            .agent("Coder", CODER_PROMPT, ModelRole::Code)
            .with_toolkit(self.code());
        self.team(
            "Supervisor",
            vec![worker("Researcher", researcher), worker("Coder", coder)],
        )
    }

    fn research(&self) -> Result<CompiledTeam> {
        let search = self
            .agent("Search", SEARCH_PROMPT, ModelRole::General)
            .with_toolkit(self.search());
        let scraper = self
            .agent("Web Scraper", WEB_SCRAPER_PROMPT, ModelRole::General)
            .with_toolkit(ScraperToolkit::new());
        self.team(
            "Supervisor",
            vec![worker("Search", search), worker("Web Scraper", scraper)],
        )
    }

    fn authoring(&self) -> Result<CompiledTeam> {
        let doc_writer = self
            .agent("Doc Writer", DOC_WRITER_PROMPT, ModelRole::General)
            .with_toolkit(self.documents(&[
                DocumentTool::WriteDocument,
                DocumentTool::EditDocument,
                DocumentTool::ReadDocument,
            ]));
        let note_taker = self
            .agent("Note Taker", NOTE_TAKER_PROMPT, ModelRole::General)
            .with_toolkit(self.documents(&[DocumentTool::CreateOutline, DocumentTool::ReadDocument]));
        let chart_generator = self
            .agent("Chart Generator", CHART_GENERATOR_PROMPT, ModelRole::Code)
            .with_toolkit(self.documents(&[DocumentTool::ReadDocument]))
            .with_toolkit(self.code());

        let workers = [
            ("Doc Writer", doc_writer),
            ("Note Taker", note_taker),
            ("Chart Generator", chart_generator),
        ]
        .into_iter()
        .map(|(name, agent)| {
            let node = AgentNode::new(agent).with_current_files(self.working_directory.clone());
            (name.to_string(), Arc::new(node) as Arc<dyn Node>)
        })
        .collect();
        self.team("Supervisor", workers)
    }

    fn coding(&self) -> Result<CompiledTeam> {
        let coder = self
            .agent("Coder", CODER_PROMPT, ModelRole::Code)
            .with_toolkit(self.code());
        let analyst = self
            .agent("Data Analyst", DATA_ANALYST_PROMPT, ModelRole::Code)
            .with_toolkit(self.code())
            .with_toolkit(ClockToolkit::new());
        self.team(
            "Supervisor",
            vec![worker("Coder", coder), worker("Data Analyst", analyst)],
        )
    }

    fn discussion(&self) -> Result<CompiledTeam> {
        let limit = self.settings.room.recursion_limit;
        let research = TeamNode::new(RESEARCH_TEAM, self.research()?, limit);
        let coding = TeamNode::new(CODING_TEAM, self.coding()?, limit);
        let teams: Vec<(String, Arc<dyn Node>)> = vec![
            (RESEARCH_TEAM.to_string(), Arc::new(research)),
            (CODING_TEAM.to_string(), Arc::new(coding)),
        ];

        let supervisor = Supervisor::new(
            "Discussion Supervisor",
            DISCUSSION_SUPERVISOR_PROMPT,
            teams.iter().map(|(name, _)| name.clone()).collect(),
            self.providers.general.clone(),
        );
        Ok(supervised_team(supervisor, teams)?)
    }

    fn meeting(&self) -> Result<CompiledTeam> {
        let assistant = self
            .agent("Assistant", MEETING_PROMPT, ModelRole::General)
            .with_toolkit(ClockToolkit::new())
            .with_toolkit(self.code())
            .with_toolkit(self.search());
        Ok(TeamGraph::new()
            .add_node("Assistant", Arc::new(AgentNode::new(assistant)))
            .add_edge("Assistant", END)
            .set_entry_point("Assistant")
            .compile()?)
    }
}

fn worker(name: &str, agent: Agent) -> (String, Arc<dyn Node>) {
    (name.to_string(), Arc::new(AgentNode::new(agent)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::message::Message;
    use crate::models::tool::ToolCall;
    use crate::providers::mock::MockProvider;
    use crate::supervisor::{FINISH, ROUTE_TOOL};
    use futures::TryStreamExt;
    use serde_json::json;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    fn route(next: &str) -> Message {
        Message::assistant().with_tool_request(
            "route_1",
            Ok(ToolCall::new(ROUTE_TOOL, json!({"next": next}))),
        )
    }

    fn settings(dir: &std::path::Path) -> Settings {
        let mut settings = Settings::default();
        settings.tools.working_dir = Some(dir.to_path_buf());
        settings
    }

    #[test]
    fn test_room_kind_names() {
        let names: Vec<String> = RoomKind::iter().map(|k| k.to_string()).collect();
        assert_eq!(
            names,
            vec!["basic", "research", "authoring", "coding", "discussion", "meeting"]
        );
        assert_eq!(RoomKind::from_str("Research").unwrap(), RoomKind::Research);
        assert!(RoomKind::from_str("lounge").is_err());
    }

    #[test]
    fn test_every_room_builds() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(MockProvider::new(vec![]));
        for kind in RoomKind::iter() {
            let room =
                build_room_with(kind, &settings(dir.path()), RoomProviders::single(provider.clone()))
                    .unwrap();
            assert_eq!(room.kind(), kind);
        }
    }

    #[test]
    fn test_build_room_from_default_settings() {
        // The default model is served by Ollama, so no api key is needed
        let dir = tempfile::tempdir().unwrap();
        assert!(build_room(RoomKind::Research, &settings(dir.path())).is_ok());

        let mut openai = settings(dir.path());
        openai.llm.model = "gpt-4o".into();
        assert!(build_room(RoomKind::Research, &openai).is_err());
    }

    #[tokio::test]
    async fn test_research_room_turn() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(MockProvider::new(vec![
            route("Search"),
            Message::assistant().with_text("The market is worth 10B."),
            route(FINISH),
        ]));
        let room = build_room_with(
            RoomKind::Research,
            &settings(dir.path()),
            RoomProviders::single(provider.clone()),
        )
        .unwrap();

        let steps: Vec<Step> = room.stream("How big is the market?").try_collect().await.unwrap();
        let nodes: Vec<&str> = steps.iter().map(|s| s.node.as_str()).collect();
        assert_eq!(nodes, vec!["Supervisor", "Search", "Supervisor"]);
        assert_eq!(steps[1].update.messages[0].text(), "The market is worth 10B.");
        assert_eq!(steps[1].update.messages[0].name.as_deref(), Some("Search"));

        let calls = provider.calls();
        assert_eq!(calls[1].tools, vec!["search__web_search".to_string()]);
    }

    #[tokio::test]
    async fn test_meeting_room_is_one_step() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(MockProvider::new(vec![
            Message::assistant().with_text("It is Monday.")
        ]));
        let room = build_room_with(
            RoomKind::Meeting,
            &settings(dir.path()),
            RoomProviders::single(provider),
        )
        .unwrap();

        let state = room.run("What day is it?").await.unwrap();
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.messages[1].text(), "It is Monday.");
    }

    #[tokio::test]
    async fn test_discussion_room_nests_teams() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(MockProvider::new(vec![
            route(CODING_TEAM),
            route("Coder"),
            Message::assistant().with_text("42"),
            route(FINISH),
            route(FINISH),
        ]));
        let room = build_room_with(
            RoomKind::Discussion,
            &settings(dir.path()),
            RoomProviders::single(provider),
        )
        .unwrap();

        let steps: Vec<Step> = room.stream("What is 6 * 7?").try_collect().await.unwrap();
        let nodes: Vec<&str> = steps.iter().map(|s| s.node.as_str()).collect();
        assert_eq!(
            nodes,
            vec!["Discussion Supervisor", CODING_TEAM, "Discussion Supervisor"]
        );
        let report = &steps[1].update.messages[0];
        assert_eq!(report.name.as_deref(), Some("Coding_Team"));
        assert_eq!(report.text(), "42");
    }
}
