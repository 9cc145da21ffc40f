//! Petstore records as they appear in tool arguments and payloads.
//!
//! Field names follow the backend's camelCase wire format. Deserialization
//! is lenient about missing fields since backend records are often sparse.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use petstore_core::ValidationError;
use serde::{Deserialize, Serialize};

/// Pet availability in the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PetStatus {
    #[default]
    Available,
    Pending,
    Sold,
}

impl PetStatus {
    pub const ALL: [PetStatus; 3] = [Self::Available, Self::Pending, Self::Sold];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Pending => "pending",
            Self::Sold => "sold",
        }
    }
}

impl fmt::Display for PetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PetStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "available" => Ok(Self::Available),
            "pending" => Ok(Self::Pending),
            "sold" => Ok(Self::Sold),
            other => Err(ValidationError::new(
                "status",
                format!("must be one of available, pending, sold (got '{}')", other),
            )),
        }
    }
}

/// Order progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Placed,
    Approved,
    Delivered,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Placed => "placed",
            Self::Approved => "approved",
            Self::Delivered => "delivered",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "placed" => Ok(Self::Placed),
            "approved" => Ok(Self::Approved),
            "delivered" => Ok(Self::Delivered),
            other => Err(ValidationError::new(
                "status",
                format!("must be one of placed, approved, delivered (got '{}')", other),
            )),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default)]
    pub name: String,
}

impl Tag {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            name: name.into(),
        }
    }
}

/// A pet record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    #[serde(default, alias = "photo_urls")]
    pub photo_urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PetStatus>,
}

impl Pet {
    /// A new, available pet.
    pub fn new(name: impl Into<String>, photo_urls: Vec<String>) -> Self {
        Self {
            name: name.into(),
            photo_urls,
            status: Some(PetStatus::Available),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_tags(mut self, tags: Vec<Tag>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_status(mut self, status: PetStatus) -> Self {
        self.status = Some(status);
        self
    }
}

/// A store order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, alias = "pet_id")]
    pub pet_id: i64,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
    #[serde(default, alias = "ship_date", skip_serializing_if = "Option::is_none")]
    pub ship_date: Option<String>,
    #[serde(default)]
    pub status: OrderStatus,
    #[serde(default)]
    pub complete: bool,
}

fn default_quantity() -> i64 {
    1
}

impl Order {
    /// One unit of a pet, placed and not complete.
    pub fn new(pet_id: i64) -> Self {
        Self {
            id: None,
            pet_id,
            quantity: default_quantity(),
            ship_date: None,
            status: OrderStatus::Placed,
            complete: false,
        }
    }

    pub fn with_quantity(mut self, quantity: i64) -> Self {
        self.quantity = quantity;
        self
    }

    pub fn with_ship_date(mut self, ship_date: impl Into<String>) -> Self {
        self.ship_date = Some(ship_date.into());
        self
    }

    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_complete(mut self, complete: bool) -> Self {
        self.complete = complete;
        self
    }
}

/// A store user account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default)]
    pub username: String,
    #[serde(default, alias = "first_name")]
    pub first_name: String,
    #[serde(default, alias = "last_name")]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default = "default_user_status", alias = "user_status")]
    pub user_status: i64,
}

fn default_user_status() -> i64 {
    1
}

impl User {
    pub fn new(
        username: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            username: username.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            email: email.into(),
            password: password.into(),
            phone: None,
            user_status: default_user_status(),
        }
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }
}

/// Pet counts keyed by status.
pub type Inventory = BTreeMap<String, i64>;

/// Inventory plus per-status pet counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSummary {
    pub inventory: Inventory,
    pub available_count: usize,
    pub pending_count: usize,
    pub sold_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pet_wire_format() {
        let pet = Pet::new("Rex", vec!["http://img/rex.png".into()])
            .with_category(Category {
                id: Some(1),
                name: "Dogs".into(),
            })
            .with_tags(vec![Tag::new(1, "friendly")]);

        let value = serde_json::to_value(&pet).unwrap();
        assert_eq!(
            value,
            json!({
                "name": "Rex",
                "category": {"id": 1, "name": "Dogs"},
                "photoUrls": ["http://img/rex.png"],
                "tags": [{"id": 1, "name": "friendly"}],
                "status": "available"
            })
        );
    }

    #[test]
    fn test_sparse_backend_record() {
        let pet: Pet = serde_json::from_value(json!({"id": 9, "status": "sold"})).unwrap();
        assert_eq!(pet.id, Some(9));
        assert_eq!(pet.status, Some(PetStatus::Sold));
        assert!(pet.name.is_empty());
    }

    #[test]
    fn test_order_defaults() {
        let order: Order = serde_json::from_value(json!({"petId": 3})).unwrap();
        assert_eq!(order, Order::new(3));
        assert_eq!(
            serde_json::to_value(Order::new(3)).unwrap(),
            json!({"petId": 3, "quantity": 1, "status": "placed", "complete": false})
        );
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("Pending".parse::<PetStatus>().unwrap(), PetStatus::Pending);
        let err = "lost".parse::<PetStatus>().unwrap_err();
        assert_eq!(err.field, "status");
        assert_eq!("delivered".parse::<OrderStatus>().unwrap(), OrderStatus::Delivered);
    }

    #[test]
    fn test_user_defaults() {
        let user = User::new("jdoe", "John", "Doe", "j@example.com", "secret");
        let value = serde_json::to_value(&user).unwrap();
        assert_eq!(value["firstName"], "John");
        assert_eq!(value["userStatus"], 1);
        assert!(value.get("phone").is_none());
    }
}
