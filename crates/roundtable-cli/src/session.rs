use anyhow::Result;
use futures::StreamExt;
use std::path::PathBuf;

use crate::prompt::{InputType, Prompt};
use roundtable::graph::Step;
use roundtable::models::message::Message;
use roundtable::rooms::Room;

pub mod report;

pub const APOLOGY: &str = "Sorry, something goes wrong. Try with a different input";

pub struct Session<'a> {
    room: Room,
    prompt: Box<dyn Prompt + 'a>,
    report_file: Option<PathBuf>,
    transcript: Vec<Message>,
}

impl<'a> Session<'a> {
    pub fn new(room: Room, prompt: Box<dyn Prompt + 'a>, report_file: Option<PathBuf>) -> Self {
        Session {
            room,
            prompt,
            report_file,
            transcript: Vec::new(),
        }
    }

    pub async fn start(&mut self) -> Result<()> {
        self.setup_session();

        loop {
            let input = match self.prompt.get_input() {
                Ok(input) => input,
                Err(e) => {
                    tracing::error!(error = %e, "failed to read input");
                    break;
                }
            };
            match input.input_type {
                InputType::Message => {
                    if let Some(content) = &input.content {
                        self.prompt.show_busy();
                        self.process_turn(content).await;
                        self.prompt.hide_busy();
                    }
                }
                InputType::Exit => break,
                InputType::AskAgain => continue,
            }
        }

        self.close_session()
    }

    pub async fn headless_start(&mut self, initial_message: &str) -> Result<()> {
        tracing::info!("Meeting started");
        self.process_turn(initial_message).await;
        self.close_session()
    }

    /// Run one turn of the room. Failures are logged and answered with an apology.
    async fn process_turn(&mut self, input: &str) {
        let turn_start = self.transcript.len();
        self.transcript.push(Message::user().with_text(input));

        let mut stream = self.room.stream(input);
        loop {
            tokio::select! {
                step = stream.next() => {
                    match step {
                        Some(Ok(step)) => {
                            for message in step_messages(&step) {
                                self.transcript.push(message.clone());
                                self.prompt.render(Box::new(message));
                            }
                        }
                        Some(Err(e)) => {
                            tracing::error!(error = %e, "turn failed");
                            self.prompt.render(raw_message(APOLOGY));
                            break;
                        }
                        None => break,
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    drop(stream);
                    // Forget the interrupted turn entirely
                    self.transcript.truncate(turn_start);
                    self.prompt.render(raw_message("Interrupt: the unfinished turn was dropped."));
                    break;
                }
            }
        }
    }

    fn setup_session(&mut self) {
        tracing::info!("Meeting started");
        self.prompt.render(raw_message(&format!(
            "Entering the {} room: {}.",
            self.room.kind(),
            self.room.kind().description()
        )));
        self.prompt.roundtable_ready();
    }

    fn close_session(&mut self) -> Result<()> {
        tracing::info!("Meeting ended");
        if let Some(report_file) = &self.report_file {
            report::persist_messages(report_file, &self.transcript)?;
            tracing::info!(path = %report_file.display(), "Report saved");
            self.prompt.render(raw_message(&format!(
                "Report saved to {}",
                report_file.display()
            )));
        }
        self.prompt.close();
        Ok(())
    }
}

/// Messages shown for one executed node; a routing decision reads as `-> next`
fn step_messages(step: &Step) -> Vec<Message> {
    let mut messages = step.update.messages.clone();
    if let Some(next) = &step.update.next {
        messages.push(
            Message::assistant()
                .with_name(step.node.clone())
                .with_text(format!("-> {}", next)),
        );
    }
    messages
}

fn raw_message(content: &str) -> Box<Message> {
    Box::new(Message::assistant().with_text(content))
}
