use std::path::Path;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use tracing::{debug, info};

use crate::auth;
use crate::db::{Database, Subscription, Table};
use crate::models::{
    Food, MealPlan, MealPlanEntry, MealType, Recipe, User, now_millis, validate_day_of_week,
    validate_email, validate_password,
};
use crate::ninjas::{self, NutritionItem, RecipeItem};

pub const ACTIVE_USER_KEY: &str = "active_user_id";
pub const DEFAULT_QUANTITY_KEY: &str = "default_quantity_g";
pub const DEFAULT_MEAL_TYPE_KEY: &str = "default_meal_type";
pub const FIRST_RUN_KEY: &str = "first_run_completed_at";

pub const DEFAULT_QUANTITY_G: f64 = 100.0;

/// Remote nutrition lookup. The CLI implements this with reqwest; tests use
/// in-memory mocks.
#[async_trait]
pub trait NutritionLookupProvider: Send + Sync {
    async fn lookup_nutrition(&self, query: &str) -> Result<Vec<NutritionItem>>;
}

/// Remote recipe lookup.
#[async_trait]
pub trait RecipeLookupProvider: Send + Sync {
    async fn lookup_recipes(&self, query: &str) -> Result<Vec<RecipeItem>>;
}

/// Application context: owns the database and exposes every operation the
/// screens use. Built once at startup and passed by reference.
pub struct NutriService {
    db: Database,
}

impl NutriService {
    pub fn new(db_path: &Path) -> Result<Self> {
        let db = Database::open(db_path)?;
        Ok(Self { db })
    }

    pub fn new_in_memory() -> Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self { db })
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    // --- Users ---

    pub fn register_user(
        &self,
        email: &str,
        password: &str,
        first_name: Option<&str>,
        last_name: Option<&str>,
        age: Option<i64>,
    ) -> Result<User> {
        let email = validate_email(email)?;
        validate_password(password)?;
        if let Some(age) = age {
            if !(0..=150).contains(&age) {
                bail!("Age must be between 0 and 150, got {age}");
            }
        }
        if self.db.get_user_by_email(&email)?.is_some() {
            bail!("An account with email '{email}' already exists");
        }

        let user = User {
            id: 0,
            email,
            password_hash: auth::hash_password(password)?,
            first_name: first_name.map(str::to_string),
            last_name: last_name.map(str::to_string),
            age,
            created_at: now_millis(),
        };
        let id = self.db.insert_user(&user)?;
        info!(user_id = id, "registered user");
        self.db.get_user(id)
    }

    /// The matching user when the credentials are valid, `None` otherwise.
    pub fn authenticate(&self, email: &str, password: &str) -> Result<Option<User>> {
        let email = email.trim().to_lowercase();
        let Some(user) = self.db.get_user_by_email(&email)? else {
            debug!("no account for login attempt");
            return Ok(None);
        };
        if auth::verify_password(password, &user.password_hash)? {
            Ok(Some(user))
        } else {
            Ok(None)
        }
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        self.db.list_users()
    }

    pub fn set_active_user(&self, user_id: i64) -> Result<User> {
        let user = self.db.get_user(user_id)?;
        self.db
            .set_preference(ACTIVE_USER_KEY, &user_id.to_string())?;
        Ok(user)
    }

    /// The signed-in user, if any. A stale id (user deleted or store rebuilt)
    /// reads as signed out.
    pub fn active_user(&self) -> Result<Option<User>> {
        let Some(raw) = self.db.get_preference(ACTIVE_USER_KEY)? else {
            return Ok(None);
        };
        let Ok(user_id) = raw.parse::<i64>() else {
            return Ok(None);
        };
        self.db.find_user(user_id)
    }

    /// Like `active_user`, but an error when nobody is signed in.
    pub fn require_active_user(&self) -> Result<User> {
        self.active_user()?
            .context("No active user. Run `nutrilog user login <email>` first")
    }

    // --- Foods ---

    /// Fetch and map nutrition items without persisting anything.
    pub async fn lookup_foods(
        &self,
        provider: &dyn NutritionLookupProvider,
        user_id: i64,
        query: &str,
        quantity_g: f64,
    ) -> Result<Vec<Food>> {
        let query = query.trim();
        if query.is_empty() {
            bail!("Search query must not be empty");
        }
        if !quantity_g.is_finite() || quantity_g <= 0.0 {
            bail!("Quantity must be a positive number of grams, got {quantity_g}");
        }

        let items = provider.lookup_nutrition(query).await?;
        debug!(query, count = items.len(), "nutrition lookup returned");
        let added_at = now_millis();
        Ok(items
            .iter()
            .map(|item| ninjas::nutrition_to_food(item, user_id, query, quantity_g, added_at))
            .collect())
    }

    /// Fetch, map and persist nutrition items in one transaction. Returns the
    /// stored records.
    pub async fn search_and_save_foods(
        &self,
        provider: &dyn NutritionLookupProvider,
        user_id: i64,
        query: &str,
        quantity_g: f64,
    ) -> Result<Vec<Food>> {
        let foods = self
            .lookup_foods(provider, user_id, query, quantity_g)
            .await?;
        let ids = self.db.insert_foods(&foods)?;
        Ok(foods
            .iter()
            .zip(ids)
            .map(|(food, id)| food.with_id(id))
            .collect())
    }

    pub fn list_foods(&self, user_id: i64) -> Result<Vec<Food>> {
        self.db.list_foods(user_id)
    }

    pub fn favorite_foods(&self, user_id: i64) -> Result<Vec<Food>> {
        self.db.favorite_foods(user_id)
    }

    pub fn get_food(&self, id: i64) -> Result<Food> {
        self.db.get_food(id)
    }

    pub fn toggle_food_favorite(&self, id: i64) -> Result<Food> {
        let food = self.db.get_food(id)?;
        let toggled = food.with_favorite(!food.is_favorite);
        self.db.update_food(&toggled)?;
        Ok(toggled)
    }

    pub fn mark_food_consumed(&self, id: i64) -> Result<Food> {
        let food = self.db.get_food(id)?.with_consumed_at(Some(now_millis()));
        self.db.update_food(&food)?;
        Ok(food)
    }

    pub fn delete_food(&self, id: i64) -> Result<bool> {
        self.db.delete_food(id)
    }

    // --- Recipes ---

    /// Fetch and map recipes as unsaved previews (`id == 0`).
    pub async fn search_recipes(
        &self,
        provider: &dyn RecipeLookupProvider,
        user_id: i64,
        query: &str,
    ) -> Result<Vec<Recipe>> {
        let query = query.trim();
        if query.is_empty() {
            bail!("Search query must not be empty");
        }

        let items = provider.lookup_recipes(query).await?;
        debug!(query, count = items.len(), "recipe lookup returned");
        let added_at = now_millis();
        Ok(items
            .iter()
            .map(|item| ninjas::recipe_item_to_recipe(item, user_id, query, added_at))
            .collect())
    }

    /// Persist a preview. Saving a title the user already has returns the
    /// stored copy instead of a duplicate.
    pub fn save_recipe(&self, recipe: &Recipe) -> Result<Recipe> {
        if !recipe.is_unsaved() {
            return self.db.get_recipe(recipe.id);
        }
        if let Some(existing) = self.db.get_recipe_by_title(recipe.user_id, &recipe.title)? {
            debug!(recipe_id = existing.id, "recipe already saved");
            return Ok(existing);
        }
        let id = self.db.insert_recipe(recipe)?;
        Ok(recipe.with_id(id))
    }

    pub fn get_recipe(&self, id: i64) -> Result<Recipe> {
        self.db.get_recipe(id)
    }

    pub fn list_recipes(&self, user_id: i64) -> Result<Vec<Recipe>> {
        self.db.list_recipes(user_id)
    }

    pub fn favorite_recipes(&self, user_id: i64) -> Result<Vec<Recipe>> {
        self.db.favorite_recipes(user_id)
    }

    /// Write back a modified copy, e.g. the one a favorite toggle emits.
    pub fn update_recipe(&self, recipe: &Recipe) -> Result<bool> {
        self.db.update_recipe(recipe)
    }

    pub fn toggle_recipe_favorite(&self, id: i64) -> Result<Recipe> {
        let recipe = self.db.get_recipe(id)?;
        let toggled = recipe.with_favorite(!recipe.is_favorite);
        self.db.update_recipe(&toggled)?;
        Ok(toggled)
    }

    pub fn delete_recipe(&self, id: i64) -> Result<bool> {
        self.db.delete_recipe(id)
    }

    /// Current recipe list plus a subscription that fires on the next write.
    pub fn watch_recipes(&self, user_id: i64) -> Result<(Vec<Recipe>, Subscription)> {
        let subscription = self.db.subscribe(Table::Recipes);
        let recipes = self.db.list_recipes(user_id)?;
        Ok((recipes, subscription))
    }

    // --- Meal plans ---

    pub fn add_meal_plan(
        &self,
        user_id: i64,
        recipe_id: i64,
        day_of_week: i64,
        meal_type: MealType,
    ) -> Result<MealPlan> {
        let day_of_week = validate_day_of_week(day_of_week)?;
        let plan = MealPlan {
            id: 0,
            user_id,
            recipe_id,
            day_of_week,
            meal_type,
            created_at: now_millis(),
        };
        let id = self.db.insert_meal_plan(&plan)?;
        Ok(MealPlan { id, ..plan })
    }

    pub fn meal_plans(&self, user_id: i64) -> Result<Vec<MealPlanEntry>> {
        self.db.meal_plans_for_user(user_id)
    }

    pub fn meal_plans_for_day(&self, user_id: i64, day_of_week: i64) -> Result<Vec<MealPlanEntry>> {
        let day_of_week = validate_day_of_week(day_of_week)?;
        self.db.meal_plans_for_day(user_id, day_of_week)
    }

    pub fn remove_meal_plan(&self, id: i64) -> Result<bool> {
        self.db.delete_meal_plan(id)
    }

    pub fn clear_meal_plans(&self, user_id: i64) -> Result<usize> {
        self.db.clear_meal_plans(user_id)
    }

    // --- Preferences ---

    pub fn preference(&self, key: &str) -> Result<Option<String>> {
        self.db.get_preference(key)
    }

    pub fn set_preference(&self, key: &str, value: &str) -> Result<()> {
        self.db.set_preference(key, value)
    }

    /// Quantity used when a food search gives none. Unparseable values fall back
    /// to 100 g.
    pub fn default_quantity_g(&self) -> Result<f64> {
        Ok(self
            .db
            .get_preference(DEFAULT_QUANTITY_KEY)?
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|q| *q > 0.0)
            .unwrap_or(DEFAULT_QUANTITY_G))
    }

    pub fn default_meal_type(&self) -> Result<MealType> {
        Ok(self
            .db
            .get_preference(DEFAULT_MEAL_TYPE_KEY)?
            .and_then(|v| v.parse::<MealType>().ok())
            .unwrap_or(MealType::Breakfast))
    }
}
