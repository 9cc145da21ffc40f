//! Typed Petstore operations over an [`Invoker`].
//!
//! Every method validates its input before anything is sent, builds the
//! tool's argument object, and hands it to the invoker stack.

use std::sync::Arc;

use petstore_core::{InvocationResult, ValidationError};
use petstore_mcp::Invoker;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{AgentError, AgentResult};
use crate::models::{Category, Inventory, Order, Pet, PetStatus, StoreSummary, Tag, User};

/// Domain client for the Petstore tool server.
#[derive(Clone)]
pub struct PetstoreClient {
    invoker: Arc<dyn Invoker>,
}

impl PetstoreClient {
    pub fn new(invoker: impl Invoker + 'static) -> Self {
        Self {
            invoker: Arc::new(invoker),
        }
    }

    pub fn from_shared(invoker: Arc<dyn Invoker>) -> Self {
        Self { invoker }
    }

    async fn call(&self, tool: &str, arguments: Value) -> AgentResult<InvocationResult> {
        debug!(tool = tool, "Invoking petstore tool");
        Ok(self.invoker.invoke(tool, arguments).await?)
    }

    // ------------------------------------------------------------------
    // Pets
    // ------------------------------------------------------------------

    /// Add a new pet. Status defaults to `available`.
    pub async fn add_pet(&self, pet: &Pet) -> AgentResult<InvocationResult> {
        validate_pet(pet)?;
        let pet = with_default_status(pet);
        self.call("add_pet", json!({ "pet": pet })).await
    }

    /// Replace an existing pet. The pet must carry its id.
    pub async fn update_pet(&self, pet: &Pet) -> AgentResult<InvocationResult> {
        match pet.id {
            Some(id) => positive("id", id)?,
            None => return Err(ValidationError::required("id").into()),
        }
        validate_pet(pet)?;
        let pet = with_default_status(pet);
        self.call("update_pet", json!({ "pet": pet })).await
    }

    pub async fn get_pet_by_id(&self, pet_id: i64) -> AgentResult<InvocationResult> {
        positive("pet_id", pet_id)?;
        self.call("get_pet_by_id", json!({ "pet_id": pet_id })).await
    }

    pub async fn find_pets_by_status(&self, status: PetStatus) -> AgentResult<InvocationResult> {
        self.call("find_pets_by_status", json!({ "status": status })).await
    }

    pub async fn find_pets_by_tags(&self, tags: &[String]) -> AgentResult<InvocationResult> {
        non_empty_list("tags", tags)?;
        self.call("find_pets_by_tags", json!({ "tags": tags })).await
    }

    /// Update a pet's name and/or status in place.
    pub async fn update_pet_with_form(
        &self,
        pet_id: i64,
        name: Option<&str>,
        status: Option<PetStatus>,
    ) -> AgentResult<InvocationResult> {
        positive("pet_id", pet_id)?;
        let mut args = json!({ "pet_id": pet_id });
        if let Some(name) = name.filter(|n| !n.trim().is_empty()) {
            args["name"] = json!(name);
        }
        if let Some(status) = status {
            args["status"] = json!(status);
        }
        self.call("update_pet_with_form", args).await
    }

    pub async fn delete_pet(&self, pet_id: i64, api_key: Option<&str>) -> AgentResult<InvocationResult> {
        positive("pet_id", pet_id)?;
        let mut args = json!({ "pet_id": pet_id });
        if let Some(key) = api_key.filter(|k| !k.is_empty()) {
            args["api_key"] = json!(key);
        }
        self.call("delete_pet", args).await
    }

    pub async fn upload_pet_image(
        &self,
        pet_id: i64,
        additional_metadata: Option<&str>,
    ) -> AgentResult<InvocationResult> {
        positive("pet_id", pet_id)?;
        let mut args = json!({ "pet_id": pet_id });
        if let Some(metadata) = additional_metadata.filter(|m| !m.is_empty()) {
            args["additional_metadata"] = json!(metadata);
        }
        self.call("upload_pet_image", args).await
    }

    // ------------------------------------------------------------------
    // Store
    // ------------------------------------------------------------------

    pub async fn get_inventory(&self) -> AgentResult<InvocationResult> {
        self.call("get_inventory", json!({})).await
    }

    /// Place an order. See [`Order::new`] for defaults.
    pub async fn place_order(&self, order: &Order) -> AgentResult<InvocationResult> {
        positive("petId", order.pet_id)?;
        positive("quantity", order.quantity)?;
        self.call("place_order", json!({ "order": order })).await
    }

    pub async fn get_order_by_id(&self, order_id: i64) -> AgentResult<InvocationResult> {
        positive("order_id", order_id)?;
        self.call("get_order_by_id", json!({ "order_id": order_id })).await
    }

    pub async fn delete_order(&self, order_id: i64) -> AgentResult<InvocationResult> {
        positive("order_id", order_id)?;
        self.call("delete_order", json!({ "order_id": order_id })).await
    }

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    pub async fn create_user(&self, user: &User) -> AgentResult<InvocationResult> {
        validate_user(user, "")?;
        self.call("create_user", json!({ "user": user })).await
    }

    pub async fn create_users_with_list(&self, users: &[User]) -> AgentResult<InvocationResult> {
        if users.is_empty() {
            return Err(ValidationError::empty("users").into());
        }
        for (i, user) in users.iter().enumerate() {
            validate_user(user, &format!("users[{}].", i))?;
        }
        self.call("create_users_with_list", json!({ "users": users })).await
    }

    pub async fn login_user(&self, username: &str, password: &str) -> AgentResult<InvocationResult> {
        non_empty("username", username)?;
        non_empty("password", password)?;
        self.call(
            "login_user",
            json!({ "username": username, "password": password }),
        )
        .await
    }

    pub async fn logout_user(&self) -> AgentResult<InvocationResult> {
        self.call("logout_user", json!({})).await
    }

    pub async fn get_user_by_name(&self, username: &str) -> AgentResult<InvocationResult> {
        non_empty("username", username)?;
        self.call("get_user_by_name", json!({ "username": username })).await
    }

    pub async fn update_user(&self, username: &str, user: &User) -> AgentResult<InvocationResult> {
        non_empty("username", username)?;
        validate_user(user, "user.")?;
        self.call("update_user", json!({ "username": username, "user": user }))
            .await
    }

    pub async fn delete_user(&self, username: &str) -> AgentResult<InvocationResult> {
        non_empty("username", username)?;
        self.call("delete_user", json!({ "username": username })).await
    }

    // ------------------------------------------------------------------
    // Workflows
    // ------------------------------------------------------------------

    /// Add a pet under a named category, with tags numbered from 1.
    pub async fn create_pet_with_category(
        &self,
        name: &str,
        photo_urls: Vec<String>,
        category_name: &str,
        tag_names: &[String],
    ) -> AgentResult<InvocationResult> {
        non_empty("category", category_name)?;
        let tags = tag_names
            .iter()
            .enumerate()
            .map(|(i, tag)| Tag::new(i as i64 + 1, tag.clone()))
            .collect();

        let pet = Pet::new(name, photo_urls)
            .with_category(Category {
                id: Some(1),
                name: category_name.to_string(),
            })
            .with_tags(tags);

        self.add_pet(&pet).await
    }

    /// Available pets, or pets carrying any of `tags` when given.
    pub async fn search_available_pets(&self, tags: Option<&[String]>) -> AgentResult<Vec<Pet>> {
        let (tool, result) = match tags {
            Some(tags) if !tags.is_empty() => {
                ("find_pets_by_tags", self.find_pets_by_tags(tags).await?)
            }
            _ => (
                "find_pets_by_status",
                self.find_pets_by_status(PetStatus::Available).await?,
            ),
        };
        records(tool, &result)
    }

    /// Inventory counts plus the number of pets in each status.
    pub async fn store_summary(&self) -> AgentResult<StoreSummary> {
        let inventory = self.get_inventory().await?;
        let inventory: Inventory = if inventory.is_success() && !inventory.payload().is_null() {
            decode("get_inventory", inventory.record())?
        } else {
            Inventory::new()
        };

        let mut counts = [0usize; 3];
        for (count, status) in counts.iter_mut().zip(PetStatus::ALL) {
            let result = self.find_pets_by_status(status).await?;
            *count = records::<Value>("find_pets_by_status", &result)?.len();
        }

        Ok(StoreSummary {
            inventory,
            available_count: counts[0],
            pending_count: counts[1],
            sold_count: counts[2],
        })
    }
}

/// Typed records from a result; a failed result yields no records.
fn records<T: DeserializeOwned>(tool: &str, result: &InvocationResult) -> AgentResult<Vec<T>> {
    if !result.is_success() {
        return Ok(Vec::new());
    }
    decode(tool, result.records())
}

fn decode<T>(tool: &str, value: Result<T, serde_json::Error>) -> AgentResult<T> {
    value.map_err(|source| AgentError::Decode {
        tool: tool.to_string(),
        source,
    })
}

fn with_default_status(pet: &Pet) -> Pet {
    let mut pet = pet.clone();
    pet.status.get_or_insert(PetStatus::Available);
    pet
}

fn non_empty(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::empty(field));
    }
    Ok(())
}

fn non_empty_list(field: &str, values: &[String]) -> Result<(), ValidationError> {
    if values.is_empty() {
        return Err(ValidationError::empty(field));
    }
    if values.iter().any(|v| v.trim().is_empty()) {
        return Err(ValidationError::new(field, "must not contain empty entries"));
    }
    Ok(())
}

fn positive(field: &str, value: i64) -> Result<(), ValidationError> {
    if value <= 0 {
        return Err(ValidationError::new(field, "must be a positive integer"));
    }
    Ok(())
}

fn validate_pet(pet: &Pet) -> Result<(), ValidationError> {
    non_empty("name", &pet.name)?;
    non_empty_list("photoUrls", &pet.photo_urls)
}

fn validate_user(user: &User, prefix: &str) -> Result<(), ValidationError> {
    let fields = [
        ("username", &user.username),
        ("firstName", &user.first_name),
        ("lastName", &user.last_name),
        ("email", &user.email),
        ("password", &user.password),
    ];
    for (name, value) in fields {
        non_empty(&format!("{}{}", prefix, name), value)?;
    }
    if !user.email.contains('@') {
        return Err(ValidationError::new(
            format!("{}email", prefix),
            "must be an email address",
        ));
    }
    Ok(())
}
