//! Prompt templates for the text-completion model.
//!
//! A [`PromptRegistry`] is an explicit value built at startup and handed to
//! whoever needs it; there is no process-wide registry.

use std::collections::{BTreeMap, HashMap};

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

/// Matches `{{`, `}}` and `{identifier}`.
static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{|\}\}|\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder regex is valid")
});

/// A system prompt plus a user prompt with `{name}` placeholders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptTemplate {
    /// System prompt text
    pub system: String,
    /// User prompt with `{name}` placeholders (`{{` and `}}` are literal braces)
    pub user_template: String,
    /// Example requests, by name
    #[serde(default)]
    pub examples: BTreeMap<String, String>,
}

/// A rendered prompt pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedPrompt {
    pub system: String,
    pub user: String,
}

impl PromptTemplate {
    /// Create a template without examples.
    pub fn new(system: impl Into<String>, user_template: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user_template: user_template.into(),
            examples: BTreeMap::new(),
        }
    }

    /// Add an example.
    pub fn with_example(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.examples.insert(name.into(), text.into());
        self
    }

    /// Placeholder names in order of first appearance.
    pub fn placeholders(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for caps in PLACEHOLDER.captures_iter(&self.user_template) {
            if let Some(name) = caps.get(1) {
                if !names.iter().any(|n| n == name.as_str()) {
                    names.push(name.as_str().to_string());
                }
            }
        }
        names
    }

    /// Render the template.
    ///
    /// `name` is only used in the error. Every placeholder must have a value;
    /// extra values are ignored.
    pub fn render(&self, name: &str, vars: &HashMap<String, Value>) -> Result<RenderedPrompt, Error> {
        if let Some(missing) = self.placeholders().into_iter().find(|p| !vars.contains_key(p)) {
            return Err(Error::MissingPlaceholder {
                template: name.to_string(),
                field: missing,
            });
        }

        let user = PLACEHOLDER.replace_all(&self.user_template, |caps: &Captures| {
            match caps.get(1) {
                Some(field) => vars.get(field.as_str()).map(render_value).unwrap_or_default(),
                None if &caps[0] == "{{" => "{".to_string(),
                None => "}".to_string(),
            }
        });

        Ok(RenderedPrompt {
            system: self.system.clone(),
            user: user.into_owned(),
        })
    }
}

/// Render a value for substitution: strings verbatim, lists comma-separated,
/// everything else as JSON.
fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "none".to_string(),
        Value::Array(items) => items
            .iter()
            .map(render_value)
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}

/// Name-keyed collection of prompt templates.
#[derive(Debug, Clone, Default)]
pub struct PromptRegistry {
    templates: HashMap<String, PromptTemplate>,
}

impl PromptRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the built-in petstore templates.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        registry.add(
            "pet_search",
            PromptTemplate::new(
                "You are a pet store assistant. Help users find pets based on their criteria.\n\
                 Available statuses: available, pending, sold\n\
                 You can search by status, tags, or specific pet ID.",
                "Find pets with status: {status}, tags: {tags}",
            )
            .with_example("basic", "Find available dogs")
            .with_example("advanced", "Find available pets with tags: friendly, small"),
        );

        registry.add(
            "pet_management",
            PromptTemplate::new(
                "You are a pet store manager. Help with pet inventory management.\n\
                 You can add, update, or remove pets from the store inventory.",
                "Action: {action}, Pet: {pet_details}",
            )
            .with_example("add", "Add a new dog named Buddy")
            .with_example("update", "Update pet status to sold"),
        );

        registry.add(
            "order_processing",
            PromptTemplate::new(
                "You are an order processing assistant. Help with customer orders.\n\
                 You can create orders, check order status, and manage order fulfillment.",
                "Process order for pet {pet_id}, quantity: {quantity}",
            )
            .with_example("simple", "Order 1 pet with ID 123")
            .with_example("complex", "Order 2 pets with special delivery"),
        );

        registry.add(
            "user_management",
            PromptTemplate::new(
                "You are a user account manager. Help with user registration and account management.\n\
                 You can create users, update profiles, and manage authentication.",
                "Handle the following user management task:\n\
                 - Action: {action}\n\
                 - User details: {user_details}\n\n\
                 Ensure data privacy and security requirements are met.",
            )
            .with_example("create", "Register a new user named jdoe")
            .with_example("login", "Log in as jdoe"),
        );

        registry
    }

    /// Register a template. An existing entry with the same name is replaced.
    pub fn add(&mut self, name: impl Into<String>, template: PromptTemplate) {
        self.templates.insert(name.into(), template);
    }

    /// Whether a template is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    /// Look up a template without rendering it.
    pub fn template(&self, name: &str) -> Result<&PromptTemplate, Error> {
        self.templates
            .get(name)
            .ok_or_else(|| Error::UnknownTemplate(name.to_string()))
    }

    /// Render the named template with `vars`.
    pub fn get(&self, name: &str, vars: &HashMap<String, Value>) -> Result<RenderedPrompt, Error> {
        self.template(name)?.render(name, vars)
    }

    /// Registered template names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.templates.keys().cloned().collect();
        names.sort();
        names
    }
}
