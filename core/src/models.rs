use std::fmt;
use std::str::FromStr;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

/// Current wall-clock time as epoch milliseconds, the unit every timestamp column uses.
#[must_use]
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub age: Option<i64>,
    pub created_at: i64,
}

impl User {
    #[must_use]
    pub fn display_name(&self) -> String {
        match (self.first_name.as_deref(), self.last_name.as_deref()) {
            (Some(first), Some(last)) => format!("{first} {last}"),
            (Some(first), None) => first.to_string(),
            (None, Some(last)) => last.to_string(),
            (None, None) => self.email.clone(),
        }
    }
}

/// Nutrition snapshot of one remote lookup, scaled to the quantity the user asked for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Food {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub original_query: String,
    pub requested_quantity_g: f64,
    pub calories: f64,
    pub serving_size_g: f64,
    pub fat_total_g: f64,
    pub fat_saturated_g: f64,
    pub protein_g: f64,
    pub sodium_mg: f64,
    pub potassium_mg: f64,
    pub cholesterol_mg: f64,
    pub carbohydrates_total_g: f64,
    pub fiber_g: f64,
    pub sugar_g: f64,
    pub added_at: i64,
    pub is_favorite: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consumed_at: Option<i64>,
}

impl Food {
    #[must_use]
    pub fn with_id(&self, id: i64) -> Self {
        Self { id, ..self.clone() }
    }

    #[must_use]
    pub fn with_favorite(&self, is_favorite: bool) -> Self {
        Self {
            is_favorite,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_consumed_at(&self, consumed_at: Option<i64>) -> Self {
        Self {
            consumed_at,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub ingredients: String,
    pub servings: String,
    pub instructions: String,
    pub search_query: String,
    pub added_at: i64,
    pub is_favorite: bool,
}

impl Recipe {
    /// A record that has never been written to the store.
    #[must_use]
    pub fn is_unsaved(&self) -> bool {
        self.id == 0
    }

    #[must_use]
    pub fn with_id(&self, id: i64) -> Self {
        Self { id, ..self.clone() }
    }

    #[must_use]
    pub fn with_favorite(&self, is_favorite: bool) -> Self {
        Self {
            is_favorite,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MealType {
    Breakfast,
    Lunch,
    Dinner,
    Snack,
}

pub const MEAL_TYPES: &[&str] = &["breakfast", "lunch", "dinner", "snack"];

impl MealType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MealType::Breakfast => "breakfast",
            MealType::Lunch => "lunch",
            MealType::Dinner => "dinner",
            MealType::Snack => "snack",
        }
    }
}

impl fmt::Display for MealType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MealType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        validate_meal_type(s)
    }
}

pub fn validate_meal_type(meal: &str) -> Result<MealType> {
    match meal.to_lowercase().as_str() {
        "breakfast" => Ok(MealType::Breakfast),
        "lunch" => Ok(MealType::Lunch),
        "dinner" => Ok(MealType::Dinner),
        "snack" => Ok(MealType::Snack),
        _ => bail!(
            "Invalid meal type '{meal}'. Must be one of: {}",
            MEAL_TYPES.join(", ")
        ),
    }
}

pub const DAY_NAMES: &[&str] = &[
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

pub fn validate_day_of_week(day_of_week: i64) -> Result<i64> {
    if !(0..=6).contains(&day_of_week) {
        bail!("day_of_week must be between 0 (Monday) and 6 (Sunday), got {day_of_week}");
    }
    Ok(day_of_week)
}

#[must_use]
#[allow(clippy::cast_sign_loss)]
pub fn day_name(day_of_week: i64) -> &'static str {
    DAY_NAMES
        .get(day_of_week as usize)
        .copied()
        .unwrap_or("Unknown")
}

/// A recipe scheduled into one weekly calendar slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MealPlan {
    pub id: i64,
    pub user_id: i64,
    pub recipe_id: i64,
    pub day_of_week: i64,
    pub meal_type: MealType,
    pub created_at: i64,
}

/// Meal plan row joined with the title of its recipe for display.
#[derive(Debug, Clone, Serialize)]
pub struct MealPlanEntry {
    #[serde(flatten)]
    pub plan: MealPlan,
    pub day_name: String,
    pub recipe_title: String,
}

pub fn validate_email(email: &str) -> Result<String> {
    let email = email.trim().to_lowercase();
    let Some((local, domain)) = email.split_once('@') else {
        bail!("Invalid email '{email}'");
    };
    if local.is_empty() || domain.is_empty() || !domain.contains('.') || domain.contains('@') {
        bail!("Invalid email '{email}'");
    }
    Ok(email)
}

pub fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < 8 {
        bail!("Password must be at least 8 characters");
    }
    Ok(())
}
