//! Task dispatch for agents.
//!
//! The router maps each task to exactly one domain client call and wraps the
//! outcome in a [`TaskResponse`]. It also hands out rendered prompts and
//! sampling presets so an agent can prepare a completion request for the
//! model it drives.

use std::collections::HashMap;

use petstore_core::{
    ErrorDescriptor, InvocationResult, PromptRegistry, RenderedPrompt, SamplingConfig,
    SamplingRegistry,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::client::PetstoreClient;
use crate::error::{AgentError, AgentResult};
use crate::tasks::{OrderAction, PetAction, TaskRequest, UserAction};

/// Outcome of [`TaskRouter::execute`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResponse {
    pub task: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    pub success: bool,
    pub result: Value,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDescriptor>,
}

/// Everything a model call needs: prompts plus sampling parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub sampling: SamplingConfig,
}

/// Stateless dispatch from task names to domain client calls.
pub struct TaskRouter {
    client: PetstoreClient,
    prompts: PromptRegistry,
    sampling: SamplingRegistry,
}

impl TaskRouter {
    pub fn new(client: PetstoreClient, prompts: PromptRegistry, sampling: SamplingRegistry) -> Self {
        Self {
            client,
            prompts,
            sampling,
        }
    }

    /// Router with the built-in prompt templates and sampling presets.
    pub fn with_defaults(client: PetstoreClient) -> Self {
        Self::new(
            client,
            PromptRegistry::with_defaults(),
            SamplingRegistry::with_defaults(),
        )
    }

    pub fn client(&self) -> &PetstoreClient {
        &self.client
    }

    pub fn prompts(&self) -> &PromptRegistry {
        &self.prompts
    }

    pub fn sampling(&self) -> &SamplingRegistry {
        &self.sampling
    }

    /// Run a typed task.
    pub async fn dispatch(&self, request: TaskRequest) -> AgentResult<InvocationResult> {
        let client = &self.client;

        match request {
            TaskRequest::FindPets { status, tags } => {
                let (tool, result) = if tags.is_empty() {
                    ("find_pets_by_status", client.find_pets_by_status(status).await?)
                } else {
                    ("find_pets_by_tags", client.find_pets_by_tags(&tags).await?)
                };
                if !result.is_success() {
                    return Ok(result);
                }
                let pets: Vec<Value> = result.records().map_err(|source| AgentError::Decode {
                    tool: tool.to_string(),
                    source,
                })?;
                let summary = format!("Found {} pet(s)", pets.len());
                Ok(InvocationResult::success(Value::Array(pets), summary))
            }
            TaskRequest::ManagePet(action) => match action {
                PetAction::Add(pet) => client.add_pet(&pet).await,
                PetAction::Update(pet) => client.update_pet(&pet).await,
                PetAction::Delete { pet_id, api_key } => {
                    client.delete_pet(pet_id, api_key.as_deref()).await
                }
                PetAction::Get { pet_id } => client.get_pet_by_id(pet_id).await,
            },
            TaskRequest::ProcessOrder(action) => match action {
                OrderAction::Place(order) => client.place_order(&order).await,
                OrderAction::Get { order_id } => client.get_order_by_id(order_id).await,
                OrderAction::Cancel { order_id } => client.delete_order(order_id).await,
            },
            TaskRequest::ManageUser(action) => match action {
                UserAction::Create(user) => client.create_user(&user).await,
                UserAction::Login { username, password } => {
                    client.login_user(&username, &password).await
                }
                UserAction::Logout => client.logout_user().await,
                UserAction::Get { username } => client.get_user_by_name(&username).await,
                UserAction::Update { username, user } => client.update_user(&username, &user).await,
                UserAction::Delete { username } => client.delete_user(&username).await,
            },
            TaskRequest::StoreSummary => {
                let summary = client.store_summary().await?;
                let message = format!(
                    "{} available, {} pending, {} sold",
                    summary.available_count, summary.pending_count, summary.sold_count
                );
                Ok(InvocationResult::success(
                    serde_json::to_value(&summary).map_err(petstore_core::Error::from)?,
                    message,
                ))
            }
        }
    }

    /// Parse and run a task, keeping typed errors.
    pub async fn run(&self, task: &str, kwargs: &Map<String, Value>) -> AgentResult<InvocationResult> {
        let request = TaskRequest::from_kwargs(task, kwargs)?;
        self.dispatch(request).await
    }

    /// Parse and run a task, folding every failure into the response.
    pub async fn execute(&self, task: &str, kwargs: Map<String, Value>) -> TaskResponse {
        let action = kwargs
            .get("action")
            .and_then(Value::as_str)
            .map(str::to_string);

        info!(task = task, action = ?action, "Executing task");

        match self.run(task, &kwargs).await {
            Ok(result) if result.is_success() => TaskResponse {
                task: task.to_string(),
                action,
                success: true,
                message: result.summary().to_string(),
                result: result.into_payload(),
                error: None,
            },
            Ok(result) => {
                let error = result.error().cloned();
                warn!(task = task, error = ?error, "Task failed");
                TaskResponse {
                    task: task.to_string(),
                    action,
                    success: false,
                    message: error
                        .as_ref()
                        .map(|e| e.message.clone())
                        .unwrap_or_else(|| result.summary().to_string()),
                    result: result.into_payload(),
                    error,
                }
            }
            Err(e) => {
                warn!(task = task, error = %e, "Task failed");
                TaskResponse {
                    task: task.to_string(),
                    action,
                    success: false,
                    result: Value::Null,
                    message: e.to_string(),
                    error: Some(e.descriptor()),
                }
            }
        }
    }

    /// Render a prompt template.
    pub fn get_prompt(&self, name: &str, vars: &HashMap<String, Value>) -> AgentResult<RenderedPrompt> {
        Ok(self.prompts.get(name, vars)?)
    }

    /// Look up a sampling preset.
    pub fn get_sampling_config(&self, name: &str) -> AgentResult<SamplingConfig> {
        Ok(self.sampling.get(name)?.clone())
    }

    /// Render a template and pair it with a sampling preset.
    pub fn prepare_completion(
        &self,
        template: &str,
        preset: &str,
        vars: &HashMap<String, Value>,
    ) -> AgentResult<CompletionRequest> {
        let prompt = self.get_prompt(template, vars)?;
        let sampling = self.get_sampling_config(preset)?;
        Ok(CompletionRequest {
            system: prompt.system,
            user: prompt.user,
            sampling,
        })
    }
}
