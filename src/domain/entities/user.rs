use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Paddle identifiers stored against a ledger user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserExtension {
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub address_id: Option<String>,
    #[serde(default)]
    pub business_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub country: String,
    pub postal_code: String,
    pub tax_id: String,
    pub is_locked: bool,
    pub extension: UserExtension,
}

impl User {
    /// First and last name joined, `None` when both are blank.
    pub fn full_name(&self) -> Option<String> {
        let name = format!("{} {}", self.first_name.trim(), self.last_name.trim());
        let name = name.trim();
        (!name.is_empty()).then(|| name.to_string())
    }
}

/// Profile values fetched from Paddle. Only applied to fields the user has left empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserProfileBackfill {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub country: Option<String>,
    pub postal_code: Option<String>,
    pub tax_id: Option<String>,
}

impl UserProfileBackfill {
    /// Split a full name on the first space.
    pub fn with_full_name(mut self, name: &str) -> Self {
        let name = name.trim();
        if name.is_empty() {
            return self;
        }
        match name.split_once(' ') {
            Some((first, last)) => {
                self.first_name = Some(first.to_string());
                let last = last.trim();
                if !last.is_empty() {
                    self.last_name = Some(last.to_string());
                }
            }
            None => self.first_name = Some(name.to_string()),
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.country.is_none()
            && self.postal_code.is_none()
            && self.tax_id.is_none()
    }

    /// Apply onto a user, leaving populated fields untouched.
    pub fn apply_to(&self, user: &mut User) {
        fill(&mut user.first_name, &self.first_name);
        fill(&mut user.last_name, &self.last_name);
        fill(&mut user.country, &self.country);
        fill(&mut user.postal_code, &self.postal_code);
        fill(&mut user.tax_id, &self.tax_id);
    }
}

fn fill(target: &mut String, value: &Option<String>) {
    if target.trim().is_empty()
        && let Some(v) = value
        && !v.trim().is_empty()
    {
        *target = v.clone();
    }
}
