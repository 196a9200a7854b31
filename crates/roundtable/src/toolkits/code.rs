use async_trait::async_trait;
use serde_json::json;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

use super::{required_str, Toolkit};
use crate::errors::{AgentError, AgentResult};
use crate::models::content::Content;
use crate::models::tool::{Tool, ToolCall};
use crate::settings::ToolSettings;

/// Where generated code runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeRunner {
    /// A local interpreter invoked as `{program} -c {code}`
    Local { program: String },
    /// A throwaway container invoked as `docker run --rm -i {image} python -c {code}`
    Docker { image: String },
}

impl CodeRunner {
    pub fn from_settings(settings: &ToolSettings) -> Self {
        if settings.code_execution_in_docker {
            CodeRunner::Docker {
                image: settings.docker_image.clone(),
            }
        } else {
            CodeRunner::Local {
                program: settings.python.clone(),
            }
        }
    }
}

pub struct CodeToolkit {
    tools: Vec<Tool>,
    runner: CodeRunner,
    working_dir: Option<PathBuf>,
}

impl CodeToolkit {
    pub fn new(runner: CodeRunner) -> Self {
        let execute_code = Tool::new(
            "execute_code",
            "Use this to execute python code. If you want to see the output of a value, \
            you should print it out with `print(...)`. This is visible to the user.",
            json!({
                "type": "object",
                "required": ["code"],
                "properties": {
                    "code": {
                        "type": "string",
                        "description": "The python code to execute."
                    }
                }
            }),
        );
        Self {
            tools: vec![execute_code],
            runner,
            working_dir: None,
        }
    }

    /// Run code from inside the given directory (mounted at `/workspace` for docker)
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    fn command(&self, code: &str) -> Command {
        match &self.runner {
            CodeRunner::Local { program } => {
                let mut command = Command::new(program);
                command.arg("-c").arg(code);
                if let Some(dir) = &self.working_dir {
                    command.current_dir(dir);
                }
                command
            }
            CodeRunner::Docker { image } => {
                let mut command = Command::new("docker");
                command.args(["run", "--rm", "-i"]);
                if let Some(dir) = &self.working_dir {
                    command
                        .arg("-v")
                        .arg(format!("{}:/workspace", dir.display()))
                        .args(["-w", "/workspace"]);
                }
                command.arg(image).args(["python", "-c", code]);
                command
            }
        }
    }

    /// Failures are reported as text so the model can correct its code
    async fn execute_code(&self, code: &str) -> String {
        tracing::debug!(runner = ?self.runner, "executing code");
        let output = self
            .command(code)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await;

        match output {
            Ok(output) if output.status.success() => format!(
                "Successfully executed:\n```python\n{}\n```\nStdout: {}",
                code,
                String::from_utf8_lossy(&output.stdout)
            ),
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let error = if stderr.trim().is_empty() {
                    format!("process exited with {}", output.status)
                } else {
                    stderr.trim().to_string()
                };
                format!("Failed to execute. Error: {}", error)
            }
            Err(e) => format!("Failed to execute. Error: {}", e),
        }
    }
}

#[async_trait]
impl Toolkit for CodeToolkit {
    fn name(&self) -> &str {
        "code"
    }

    fn description(&self) -> &str {
        "Runs python code"
    }

    fn instructions(&self) -> &str {
        "Use execute_code to run python. Only printed output is returned, so print every value you need."
    }

    fn tools(&self) -> &[Tool] {
        &self.tools
    }

    async fn call(&self, tool_call: ToolCall) -> AgentResult<Vec<Content>> {
        match tool_call.name.as_str() {
            "execute_code" => {
                let code = required_str(&tool_call.arguments, "code")?;
                Ok(vec![Content::text(self.execute_code(code).await)])
            }
            _ => Err(AgentError::ToolNotFound(tool_call.name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell() -> CodeToolkit {
        CodeToolkit::new(CodeRunner::Local {
            program: "sh".to_string(),
        })
    }

    async fn run(toolkit: &CodeToolkit, code: &str) -> String {
        let result = toolkit
            .call(ToolCall::new("execute_code", json!({"code": code})))
            .await
            .unwrap();
        result[0].as_text().unwrap().to_string()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_successful_execution() {
        let output = run(&shell(), "echo 42").await;
        assert_eq!(
            output,
            "Successfully executed:\n```python\necho 42\n```\nStdout: 42\n"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_execution_is_text() {
        let output = run(&shell(), "echo broken >&2; exit 3").await;
        assert_eq!(output, "Failed to execute. Error: broken");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_runs_in_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("data.csv"), "a,b").unwrap();
        let toolkit = shell().with_working_dir(dir.path());
        let output = run(&toolkit, "cat data.csv").await;
        assert!(output.ends_with("Stdout: a,b"));
    }

    #[tokio::test]
    async fn test_missing_interpreter() {
        let toolkit = CodeToolkit::new(CodeRunner::Local {
            program: "definitely-not-a-python".to_string(),
        });
        let output = run(&toolkit, "print(1)").await;
        assert!(output.starts_with("Failed to execute. Error:"));
    }

    #[tokio::test]
    async fn test_missing_code() {
        let err = shell()
            .call(ToolCall::new("execute_code", json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::InvalidParameters(_)));
    }

    #[test]
    fn test_runner_from_settings() {
        let mut settings = ToolSettings::default();
        assert_eq!(
            CodeRunner::from_settings(&settings),
            CodeRunner::Local {
                program: "python3".into()
            }
        );
        settings.code_execution_in_docker = true;
        assert_eq!(
            CodeRunner::from_settings(&settings),
            CodeRunner::Docker {
                image: "python:3.11-slim".into()
            }
        );
    }

    #[test]
    fn test_docker_command_mounts_working_dir() {
        let toolkit = CodeToolkit::new(CodeRunner::Docker {
            image: "python:3.11-slim".into(),
        })
        .with_working_dir("/tmp/work");
        let command = toolkit.command("print(1)");
        let args: Vec<String> = command
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().to_string())
            .collect();
        assert_eq!(command.as_std().get_program(), "docker");
        assert_eq!(
            args,
            vec![
                "run", "--rm", "-i", "-v", "/tmp/work:/workspace", "-w", "/workspace",
                "python:3.11-slim", "python", "-c", "print(1)"
            ]
        );
    }
}
