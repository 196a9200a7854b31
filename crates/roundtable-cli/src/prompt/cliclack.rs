use std::io::{self, Write};

use anyhow::Result;
use bat::WrappingMode;
use cliclack::{input, spinner};
use console::style;
use roundtable::models::message::Message;

use super::{Input, InputType, Prompt, Theme};

pub struct CliclackPrompt {
    spinner: cliclack::ProgressBar,
    input_mode: InputMode,
    theme: Theme,
}

enum InputMode {
    Singleline,
    Multiline,
}

impl CliclackPrompt {
    pub fn new() -> Self {
        CliclackPrompt {
            spinner: spinner(),
            input_mode: InputMode::Singleline,
            theme: Theme::Dark,
        }
    }

    fn theme_name(&self) -> &'static str {
        match self.theme {
            Theme::Light => "GitHub",
            Theme::Dark => "zenburn",
        }
    }
}

fn print(content: &str, theme: &str) {
    let printed = bat::PrettyPrinter::new()
        .input(bat::Input::from_bytes(content.as_bytes()))
        .theme(theme)
        .language("Markdown")
        .wrapping_mode(WrappingMode::Character)
        .print();
    if printed.is_err() {
        println!("{}", content);
    }
}

fn print_help() {
    println!("Commands:");
    println!("q, /exit - Leave the room");
    println!("/m - Switch to multiline input mode");
    println!("/s - Switch to singleline input mode");
    println!("/t - Toggle Light/Dark theme");
    println!("/? - Display this help message");
    println!("Ctrl+C - Interrupt the room (drops the unfinished turn)");
}

impl Prompt for CliclackPrompt {
    fn render(&mut self, message: Box<Message>) {
        println!("---");
        if let Some(name) = &message.name {
            println!("{}", style(name.replace('_', " ")).bold().cyan());
        }
        print(&message.text(), self.theme_name());
        io::stdout().flush().unwrap_or_default();
    }

    fn show_busy(&mut self) {
        self.spinner = spinner();
        self.spinner.start("the room is discussing");
    }

    fn hide_busy(&mut self) {
        self.spinner.stop("");
    }

    fn get_input(&mut self) -> Result<Input> {
        let mut input = input("Enter text (press 'q' or ctrl-c to quit)").placeholder("");
        if let InputMode::Multiline = self.input_mode {
            input = input.multiline();
        }
        let message_text: String = match input.interact() {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(Input::exit()),
            Err(e) => return Err(e.into()),
        };

        match message_text.trim() {
            "/m" => self.input_mode = InputMode::Multiline,
            "/s" => self.input_mode = InputMode::Singleline,
            "/t" => {
                self.theme = match self.theme {
                    Theme::Light => {
                        println!("Switching to Dark theme");
                        Theme::Dark
                    }
                    Theme::Dark => {
                        println!("Switching to Light theme");
                        Theme::Light
                    }
                };
            }
            "/?" => print_help(),
            _ => return Ok(Input::parse(&message_text)),
        }
        Ok(Input {
            input_type: InputType::AskAgain,
            content: None,
        })
    }

    fn close(&self) {
        // No cleanup required
    }

    #[cfg(test)]
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
