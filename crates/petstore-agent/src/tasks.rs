//! Agent-facing task requests.
//!
//! Agents describe work as a task name plus a bag of keyword arguments.
//! [`TaskRequest::from_kwargs`] turns that bag into a typed request, reporting
//! missing or mistyped fields as [`ValidationError`]s.

use petstore_core::ValidationError;
use serde_json::{Map, Value};

use crate::error::{AgentError, AgentResult};
use crate::models::{Category, Order, OrderStatus, Pet, PetStatus, Tag, User};

/// Task names understood by the router.
pub const TASK_NAMES: &[&str] = &[
    "find_pets",
    "manage_pet",
    "process_order",
    "manage_user",
    "store_summary",
];

/// A typed task.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskRequest {
    /// Search by tags when any are given, else by status.
    FindPets { status: PetStatus, tags: Vec<String> },
    ManagePet(PetAction),
    ProcessOrder(OrderAction),
    ManageUser(UserAction),
    StoreSummary,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PetAction {
    Add(Pet),
    Update(Pet),
    Delete { pet_id: i64, api_key: Option<String> },
    Get { pet_id: i64 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrderAction {
    Place(Order),
    Get { order_id: i64 },
    Cancel { order_id: i64 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum UserAction {
    Create(User),
    Login { username: String, password: String },
    Logout,
    Get { username: String },
    Update { username: String, user: User },
    Delete { username: String },
}

impl TaskRequest {
    /// Parse a task name and keyword arguments.
    pub fn from_kwargs(task: &str, kwargs: &Map<String, Value>) -> AgentResult<Self> {
        let kw = Kwargs::new(kwargs);

        match task {
            "find_pets" => {
                let status = match kw.opt_str(&["status"])? {
                    Some(status) => status.parse()?,
                    None => PetStatus::Available,
                };
                let tags = kw.str_list(&["tags"])?;
                Ok(Self::FindPets { status, tags })
            }
            "manage_pet" => {
                let action = match kw.action(task)? {
                    "add" => PetAction::Add(kw.pet()?),
                    "update" => PetAction::Update(kw.pet()?),
                    "delete" => PetAction::Delete {
                        pet_id: kw.i64(&["pet_id", "petId", "id"])?,
                        api_key: kw.opt_str(&["api_key"])?,
                    },
                    "get" => PetAction::Get {
                        pet_id: kw.i64(&["pet_id", "petId", "id"])?,
                    },
                    other => return Err(unknown_action(task, other)),
                };
                Ok(Self::ManagePet(action))
            }
            "process_order" => {
                let action = match kw.action(task)? {
                    "place" => OrderAction::Place(kw.order()?),
                    "get" => OrderAction::Get {
                        order_id: kw.i64(&["order_id", "orderId", "id"])?,
                    },
                    "cancel" => OrderAction::Cancel {
                        order_id: kw.i64(&["order_id", "orderId", "id"])?,
                    },
                    other => return Err(unknown_action(task, other)),
                };
                Ok(Self::ProcessOrder(action))
            }
            "manage_user" => {
                let action = match kw.action(task)? {
                    "create" => UserAction::Create(kw.user()?),
                    "login" => UserAction::Login {
                        username: kw.str(&["username"])?,
                        password: kw.str(&["password"])?,
                    },
                    "logout" => UserAction::Logout,
                    "get" => UserAction::Get {
                        username: kw.str(&["username"])?,
                    },
                    "update" => UserAction::Update {
                        username: kw.str(&["username"])?,
                        user: match kw.get(&["user"]) {
                            Some(user) => decode_field("user", user)?,
                            None => kw.user()?,
                        },
                    },
                    "delete" => UserAction::Delete {
                        username: kw.str(&["username"])?,
                    },
                    other => return Err(unknown_action(task, other)),
                };
                Ok(Self::ManageUser(action))
            }
            "store_summary" => Ok(Self::StoreSummary),
            other => Err(AgentError::UnknownTask(other.to_string())),
        }
    }

    /// The task name this request belongs to.
    pub fn task_name(&self) -> &'static str {
        match self {
            Self::FindPets { .. } => "find_pets",
            Self::ManagePet(_) => "manage_pet",
            Self::ProcessOrder(_) => "process_order",
            Self::ManageUser(_) => "manage_user",
            Self::StoreSummary => "store_summary",
        }
    }

    /// The action discriminator, for tasks that have one.
    pub fn action(&self) -> Option<&'static str> {
        let action = match self {
            Self::ManagePet(PetAction::Add(_)) => "add",
            Self::ManagePet(PetAction::Update(_)) => "update",
            Self::ManagePet(PetAction::Delete { .. }) => "delete",
            Self::ManagePet(PetAction::Get { .. }) => "get",
            Self::ProcessOrder(OrderAction::Place(_)) => "place",
            Self::ProcessOrder(OrderAction::Get { .. }) => "get",
            Self::ProcessOrder(OrderAction::Cancel { .. }) => "cancel",
            Self::ManageUser(UserAction::Create(_)) => "create",
            Self::ManageUser(UserAction::Login { .. }) => "login",
            Self::ManageUser(UserAction::Logout) => "logout",
            Self::ManageUser(UserAction::Get { .. }) => "get",
            Self::ManageUser(UserAction::Update { .. }) => "update",
            Self::ManageUser(UserAction::Delete { .. }) => "delete",
            Self::FindPets { .. } | Self::StoreSummary => return None,
        };
        Some(action)
    }
}

fn unknown_action(task: &str, action: &str) -> AgentError {
    AgentError::UnknownAction {
        task: task.to_string(),
        action: action.to_string(),
    }
}

fn decode_field<T: serde::de::DeserializeOwned>(field: &str, value: &Value) -> Result<T, ValidationError> {
    serde_json::from_value(value.clone()).map_err(|e| ValidationError::new(field, e.to_string()))
}

/// Typed access to a keyword-argument bag.
///
/// Each getter takes the accepted spellings of one field; the first is the
/// name reported in validation errors. `null` counts as absent.
struct Kwargs<'a> {
    map: &'a Map<String, Value>,
}

impl<'a> Kwargs<'a> {
    fn new(map: &'a Map<String, Value>) -> Self {
        Self { map }
    }

    fn get(&self, names: &[&str]) -> Option<&'a Value> {
        names
            .iter()
            .find_map(|name| self.map.get(*name).filter(|v| !v.is_null()))
    }

    fn action(&self, task: &str) -> Result<&'a str, AgentError> {
        match self.get(&["action"]) {
            Some(Value::String(action)) => Ok(action.as_str()),
            Some(other) => Err(unknown_action(task, &other.to_string())),
            None => Err(ValidationError::required("action").into()),
        }
    }

    fn opt_str(&self, names: &[&str]) -> Result<Option<String>, ValidationError> {
        match self.get(names) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            Some(_) => Err(ValidationError::new(names[0], "must be a string")),
        }
    }

    fn str(&self, names: &[&str]) -> Result<String, ValidationError> {
        self.opt_str(names)?
            .ok_or_else(|| ValidationError::required(names[0]))
    }

    fn opt_i64(&self, names: &[&str]) -> Result<Option<i64>, ValidationError> {
        match self.get(names) {
            None => Ok(None),
            Some(Value::Number(n)) => n
                .as_i64()
                .map(Some)
                .ok_or_else(|| ValidationError::new(names[0], "must be an integer")),
            Some(Value::String(s)) => s
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| ValidationError::new(names[0], "must be an integer")),
            Some(_) => Err(ValidationError::new(names[0], "must be an integer")),
        }
    }

    fn i64(&self, names: &[&str]) -> Result<i64, ValidationError> {
        self.opt_i64(names)?
            .ok_or_else(|| ValidationError::required(names[0]))
    }

    fn opt_bool(&self, names: &[&str]) -> Result<Option<bool>, ValidationError> {
        match self.get(names) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(Value::String(s)) => match s.trim().to_lowercase().as_str() {
                "true" | "yes" | "1" => Ok(Some(true)),
                "false" | "no" | "0" => Ok(Some(false)),
                _ => Err(ValidationError::new(names[0], "must be a boolean")),
            },
            Some(_) => Err(ValidationError::new(names[0], "must be a boolean")),
        }
    }

    /// A list of strings, given as an array or a comma-separated string.
    fn str_list(&self, names: &[&str]) -> Result<Vec<String>, ValidationError> {
        match self.get(names) {
            None => Ok(Vec::new()),
            Some(Value::String(s)) => Ok(s
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.clone()),
                    _ => Err(ValidationError::new(names[0], "must be a list of strings")),
                })
                .collect(),
            Some(_) => Err(ValidationError::new(names[0], "must be a list of strings")),
        }
    }

    fn pet(&self) -> Result<Pet, ValidationError> {
        let category = match self.get(&["category"]) {
            None => None,
            Some(Value::String(name)) => Some(Category {
                id: Some(1),
                name: name.clone(),
            }),
            Some(value) => Some(decode_field("category", value)?),
        };

        let tags = match self.get(&["tags"]) {
            Some(Value::Array(items)) if items.iter().all(Value::is_object) => {
                decode_field("tags", &Value::Array(items.clone()))?
            }
            _ => self
                .str_list(&["tags"])?
                .into_iter()
                .enumerate()
                .map(|(i, name)| Tag::new(i as i64 + 1, name))
                .collect(),
        };

        let status = match self.opt_str(&["status"])? {
            Some(status) => status.parse()?,
            None => PetStatus::Available,
        };

        Ok(Pet {
            id: self.opt_i64(&["id", "pet_id", "petId"])?,
            name: self.opt_str(&["name"])?.unwrap_or_default(),
            category,
            photo_urls: self.str_list(&["photoUrls", "photo_urls"])?,
            tags,
            status: Some(status),
        })
    }

    fn order(&self) -> Result<Order, ValidationError> {
        let mut order = Order::new(self.i64(&["petId", "pet_id"])?);
        if let Some(quantity) = self.opt_i64(&["quantity"])? {
            order.quantity = quantity;
        }
        order.ship_date = self.opt_str(&["shipDate", "ship_date"])?;
        if let Some(status) = self.opt_str(&["status"])? {
            order.status = status.parse::<OrderStatus>()?;
        }
        if let Some(complete) = self.opt_bool(&["complete"])? {
            order.complete = complete;
        }
        Ok(order)
    }

    fn user(&self) -> Result<User, ValidationError> {
        let mut user = User::new(
            self.opt_str(&["username"])?.unwrap_or_default(),
            self.opt_str(&["firstName", "first_name"])?.unwrap_or_default(),
            self.opt_str(&["lastName", "last_name"])?.unwrap_or_default(),
            self.opt_str(&["email"])?.unwrap_or_default(),
            self.opt_str(&["password"])?.unwrap_or_default(),
        );
        user.id = self.opt_i64(&["id"])?;
        user.phone = self.opt_str(&["phone"])?;
        if let Some(status) = self.opt_i64(&["userStatus", "user_status"])? {
            user.user_status = status;
        }
        Ok(user)
    }
}
