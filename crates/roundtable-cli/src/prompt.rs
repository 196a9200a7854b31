use anyhow::Result;
use roundtable::models::message::Message;

pub mod cliclack;

pub trait Prompt {
    fn render(&mut self, message: Box<Message>);
    fn get_input(&mut self) -> Result<Input>;
    fn show_busy(&mut self);
    fn hide_busy(&mut self);
    fn close(&self);
    fn roundtable_ready(&self) {
        println!("\n");
        println!("The roundtable is seated! Ask a question and the room will discuss it.");
        println!("\n");
    }
    // Used for testing. Allows us to downcast to any type.
    #[cfg(test)]
    fn as_any(&self) -> &dyn std::any::Any;
}

pub struct Input {
    pub input_type: InputType,
    pub content: Option<String>, // Optional content as sometimes the user may be issuing a command eg. (Exit)
}

impl Input {
    pub fn message(content: impl Into<String>) -> Self {
        Input {
            input_type: InputType::Message,
            content: Some(content.into()),
        }
    }

    pub fn exit() -> Self {
        Input {
            input_type: InputType::Exit,
            content: None,
        }
    }

    pub fn ask_again() -> Self {
        Input {
            input_type: InputType::AskAgain,
            content: None,
        }
    }

    /// Interpret a raw line typed by the user
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        if text.eq_ignore_ascii_case("q")
            || text.eq_ignore_ascii_case("/exit")
            || text.eq_ignore_ascii_case("/quit")
        {
            Input::exit()
        } else if text.is_empty() {
            Input::ask_again()
        } else {
            Input::message(text)
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum InputType {
    AskAgain, // Ask the user for input again. Control flow command.
    Message,  // User sent a message
    Exit,     // User wants to exit the session
}

pub enum Theme {
    Light,
    Dark,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_input() {
        assert_eq!(Input::parse("q").input_type, InputType::Exit);
        assert_eq!(Input::parse(" /EXIT ").input_type, InputType::Exit);
        assert_eq!(Input::parse("   ").input_type, InputType::AskAgain);

        let input = Input::parse("  How big is the market?\n");
        assert_eq!(input.input_type, InputType::Message);
        assert_eq!(input.content.as_deref(), Some("How big is the market?"));
    }
}
