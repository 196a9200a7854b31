use include_dir::{include_dir, Dir};
use serde::Serialize;
use std::fs;
use std::path::Path;
use tera::{Context, Error as TeraError, Tera};

static PROMPTS: Dir = include_dir!("$CARGO_MANIFEST_DIR/src/prompts");

pub const AGENT_PROMPT: &str = "agent.md";
pub const SUPERVISOR_PROMPT: &str = "supervisor.md";
pub const ROUTE_PROMPT: &str = "route.md";

/// Source of a bundled prompt
pub fn embedded_template(name: &str) -> Result<&'static str, TeraError> {
    PROMPTS
        .get_file(name)
        .and_then(|file| file.contents_utf8())
        .ok_or_else(|| TeraError::msg(format!("Template not found: {}", name)))
}

/// Render an inline tera template
pub fn load_prompt<T: Serialize>(template: &str, context_data: &T) -> Result<String, TeraError> {
    let mut tera = Tera::default();
    tera.add_raw_template("inline_template", template)?;
    let context = Context::from_serialize(context_data)?;
    let rendered = tera.render("inline_template", &context)?;
    Ok(rendered)
}

/// Render a template from disk, or one of the bundled prompts when no such file exists
pub fn load_prompt_file<T: Serialize>(
    template_file: impl AsRef<Path>,
    context_data: &T,
) -> Result<String, TeraError> {
    let template_path = template_file.as_ref();

    let template_content = if template_path.exists() {
        fs::read_to_string(template_path)
            .map_err(|e| TeraError::chain("Failed to read template file", e))?
    } else {
        embedded_template(&template_path.to_string_lossy())?.to_string()
    };

    load_prompt(&template_content, context_data).map(|s| s.trim().to_string())
}
