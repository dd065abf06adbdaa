use std::cell::Cell;
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{Connection, OptionalExtension, params};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::models::{
    Food, MealPlan, MealPlanEntry, MealType, Recipe, User, day_name, now_millis,
    validate_meal_type,
};

/// Schema version this build declares. Any other stored version is dropped and rebuilt.
pub const SCHEMA_VERSION: i64 = 3;

const USER_COLUMNS: &str = "id, email, password_hash, first_name, last_name, age, created_at";

const FOOD_COLUMNS: &str = "id, user_id, name, original_query, requested_quantity_g, calories,
    serving_size_g, fat_total_g, fat_saturated_g, protein_g, sodium_mg, potassium_mg,
    cholesterol_mg, carbohydrates_total_g, fiber_g, sugar_g, added_at, is_favorite, consumed_at";

const RECIPE_COLUMNS: &str =
    "id, user_id, title, ingredients, servings, instructions, search_query, added_at, is_favorite";

const MEAL_PLAN_ORDER: &str = "mp.day_of_week,
    CASE mp.meal_type WHEN 'breakfast' THEN 0 WHEN 'lunch' THEN 1 WHEN 'dinner' THEN 2 ELSE 3 END,
    mp.id";

/// Tables that can be observed for changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Users,
    Foods,
    Recipes,
    MealPlans,
    Preferences,
}

impl Table {
    const COUNT: usize = 5;

    fn index(self) -> usize {
        match self {
            Table::Users => 0,
            Table::Foods => 1,
            Table::Recipes => 2,
            Table::MealPlans => 3,
            Table::Preferences => 4,
        }
    }
}

/// Per-table version counters; every write bumps the tables it touched.
struct ChangeTracker {
    versions: Vec<watch::Sender<u64>>,
}

impl ChangeTracker {
    fn new() -> Self {
        let versions = (0..Table::COUNT).map(|_| watch::channel(0).0).collect();
        Self { versions }
    }

    fn bump_all(&self) {
        for version in &self.versions {
            version.send_modify(|v| *v += 1);
        }
    }

    fn bump(&self, table: Table) {
        self.versions[table.index()].send_modify(|v| *v += 1);
    }

    fn subscribe(&self, table: Table) -> Subscription {
        Subscription {
            table,
            rx: self.versions[table.index()].subscribe(),
        }
    }
}

/// Handle for re-running a query whenever its table is written.
///
/// A fresh subscription starts out "seen": only writes after `subscribe`
/// report a change.
pub struct Subscription {
    table: Table,
    rx: watch::Receiver<u64>,
}

impl Subscription {
    #[must_use]
    pub fn table(&self) -> Table {
        self.table
    }

    #[must_use]
    pub fn has_changed(&self) -> bool {
        self.rx.has_changed().unwrap_or(false)
    }

    pub fn mark_seen(&mut self) {
        self.rx.borrow_and_update();
    }

    /// Wait for the next write to the observed table.
    pub async fn changed(&mut self) -> Result<()> {
        self.rx
            .changed()
            .await
            .context("Database was closed while waiting for changes")
    }
}

impl ToSql for MealType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for MealType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let tag = value.as_str()?;
        validate_meal_type(tag).map_err(|e| FromSqlError::Other(e.into()))
    }
}

pub struct Database {
    conn: Connection,
    changes: ChangeTracker,
    // last seen `PRAGMA data_version`; moves only on other connections' commits
    data_version: Cell<i64>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_version(path, SCHEMA_VERSION)
    }

    /// Open a database file declaring an explicit schema version.
    pub fn open_with_version(path: &Path, version: i64) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        debug!(path = %path.display(), "opened database");
        Self::init(conn, version)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn, SCHEMA_VERSION)
    }

    fn init(conn: Connection, version: i64) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let db = Database {
            conn,
            changes: ChangeTracker::new(),
            data_version: Cell::new(0),
        };
        db.migrate(version)?;
        db.data_version.set(db.read_data_version()?);
        Ok(db)
    }

    /// Destructive fallback: a stored version other than `declared` drops every table.
    fn migrate(&self, declared: i64) -> Result<()> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version == declared {
            return Ok(());
        }

        if version == 0 {
            info!(version = declared, "creating database schema");
        } else {
            warn!(
                found = version,
                declared, "schema version mismatch, dropping all tables"
            );
        }

        self.drop_all_tables()?;
        self.create_schema()?;
        self.conn.pragma_update(None, "user_version", declared)?;
        Ok(())
    }

    fn drop_all_tables(&self) -> Result<()> {
        let tables: Vec<String> = {
            let mut stmt = self.conn.prepare(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
            )?;
            stmt.query_map([], |row| row.get(0))?
                .collect::<Result<Vec<_>, _>>()?
        };

        // foreign_keys must be toggled outside a transaction
        self.conn.execute_batch("PRAGMA foreign_keys = OFF;")?;
        for table in &tables {
            debug!(table = %table, "dropping table");
            self.conn.execute_batch(&format!(
                "DROP TABLE IF EXISTS \"{}\";",
                table.replace('"', "\"\"")
            ))?;
        }
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(())
    }

    fn create_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                first_name TEXT,
                last_name TEXT,
                age INTEGER,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE foods (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                original_query TEXT NOT NULL,
                requested_quantity_g REAL NOT NULL,
                calories REAL NOT NULL,
                serving_size_g REAL NOT NULL,
                fat_total_g REAL NOT NULL,
                fat_saturated_g REAL NOT NULL,
                protein_g REAL NOT NULL,
                sodium_mg REAL NOT NULL,
                potassium_mg REAL NOT NULL,
                cholesterol_mg REAL NOT NULL,
                carbohydrates_total_g REAL NOT NULL,
                fiber_g REAL NOT NULL,
                sugar_g REAL NOT NULL,
                added_at INTEGER NOT NULL,
                is_favorite INTEGER NOT NULL DEFAULT 0,
                consumed_at INTEGER
            );

            CREATE TABLE recipes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                title TEXT NOT NULL,
                ingredients TEXT NOT NULL,
                servings TEXT NOT NULL,
                instructions TEXT NOT NULL,
                search_query TEXT NOT NULL,
                added_at INTEGER NOT NULL,
                is_favorite INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE meal_plans (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                recipe_id INTEGER NOT NULL REFERENCES recipes(id) ON DELETE CASCADE,
                day_of_week INTEGER NOT NULL CHECK (day_of_week BETWEEN 0 AND 6),
                meal_type TEXT NOT NULL CHECK (meal_type IN ('breakfast', 'lunch', 'dinner', 'snack')),
                created_at INTEGER NOT NULL
            );

            CREATE TABLE preferences (
                key TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE INDEX idx_foods_user ON foods(user_id);
            CREATE INDEX idx_recipes_user ON recipes(user_id);
            CREATE INDEX idx_meal_plans_user_day ON meal_plans(user_id, day_of_week);
            CREATE INDEX idx_meal_plans_recipe ON meal_plans(recipe_id);",
        )?;
        Ok(())
    }

    /// Stored schema version, as recorded in `PRAGMA user_version`.
    pub fn schema_version(&self) -> Result<i64> {
        Ok(self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?)
    }

    #[must_use]
    fn read_data_version(&self) -> Result<i64> {
        Ok(self
            .conn
            .pragma_query_value(None, "data_version", |row| row.get(0))?)
    }

    /// Check whether another connection (another process, usually) committed
    /// since the last poll. If so every subscription is notified, since the
    /// counter does not say which tables were touched.
    pub fn poll_external_changes(&self) -> Result<bool> {
        let current = self.read_data_version()?;
        if current == self.data_version.replace(current) {
            return Ok(false);
        }
        debug!(data_version = current, "database changed by another connection");
        self.changes.bump_all();
        Ok(true)
    }

    pub fn subscribe(&self, table: Table) -> Subscription {
        self.changes.subscribe(table)
    }

    // --- Row mapping helpers ---

    fn user_from_row(row: &rusqlite::Row) -> rusqlite::Result<User> {
        Ok(User {
            id: row.get(0)?,
            email: row.get(1)?,
            password_hash: row.get(2)?,
            first_name: row.get(3)?,
            last_name: row.get(4)?,
            age: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    fn food_from_row(row: &rusqlite::Row) -> rusqlite::Result<Food> {
        Ok(Food {
            id: row.get(0)?,
            user_id: row.get(1)?,
            name: row.get(2)?,
            original_query: row.get(3)?,
            requested_quantity_g: row.get(4)?,
            calories: row.get(5)?,
            serving_size_g: row.get(6)?,
            fat_total_g: row.get(7)?,
            fat_saturated_g: row.get(8)?,
            protein_g: row.get(9)?,
            sodium_mg: row.get(10)?,
            potassium_mg: row.get(11)?,
            cholesterol_mg: row.get(12)?,
            carbohydrates_total_g: row.get(13)?,
            fiber_g: row.get(14)?,
            sugar_g: row.get(15)?,
            added_at: row.get(16)?,
            is_favorite: row.get(17)?,
            consumed_at: row.get(18)?,
        })
    }

    fn recipe_from_row(row: &rusqlite::Row) -> rusqlite::Result<Recipe> {
        Ok(Recipe {
            id: row.get(0)?,
            user_id: row.get(1)?,
            title: row.get(2)?,
            ingredients: row.get(3)?,
            servings: row.get(4)?,
            instructions: row.get(5)?,
            search_query: row.get(6)?,
            added_at: row.get(7)?,
            is_favorite: row.get(8)?,
        })
    }

    // Expects columns:
    // 0: mp.id, 1: mp.user_id, 2: mp.recipe_id, 3: mp.day_of_week,
    // 4: mp.meal_type, 5: mp.created_at, 6: r.title
    fn meal_plan_entry_from_row(row: &rusqlite::Row) -> rusqlite::Result<MealPlanEntry> {
        let day_of_week: i64 = row.get(3)?;
        Ok(MealPlanEntry {
            plan: MealPlan {
                id: row.get(0)?,
                user_id: row.get(1)?,
                recipe_id: row.get(2)?,
                day_of_week,
                meal_type: row.get(4)?,
                created_at: row.get(5)?,
            },
            day_name: day_name(day_of_week).to_string(),
            recipe_title: row.get(6)?,
        })
    }

    // --- Users ---

    pub fn insert_user(&self, user: &User) -> Result<i64> {
        self.conn
            .execute(
                "INSERT INTO users (email, password_hash, first_name, last_name, age, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    user.email,
                    user.password_hash,
                    user.first_name,
                    user.last_name,
                    user.age,
                    user.created_at,
                ],
            )
            .with_context(|| format!("Failed to insert user '{}'", user.email))?;
        self.changes.bump(Table::Users);
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_user(&self, id: i64) -> Result<User> {
        self.conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id],
                Self::user_from_row,
            )
            .with_context(|| format!("User {id} not found"))
    }

    /// Like `get_user`, but a missing id is `None` rather than an error.
    pub fn find_user(&self, id: i64) -> Result<Option<User>> {
        self.conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id],
                Self::user_from_row,
            )
            .optional()
            .with_context(|| format!("Failed to load user {id}"))
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"))?;
        let mut rows = stmt.query(params![email])?;
        if let Some(row) = rows.next()? {
            Ok(Some(Self::user_from_row(row)?))
        } else {
            Ok(None)
        }
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY id"))?;
        let users = stmt
            .query_map([], Self::user_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }

    pub fn delete_user(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM users WHERE id = ?1", params![id])?;
        if rows > 0 {
            self.changes.bump(Table::Users);
        }
        Ok(rows > 0)
    }

    // --- Foods ---

    fn insert_food_row(conn: &Connection, food: &Food) -> Result<i64> {
        conn.execute(
            "INSERT INTO foods (user_id, name, original_query, requested_quantity_g, calories,
                serving_size_g, fat_total_g, fat_saturated_g, protein_g, sodium_mg, potassium_mg,
                cholesterol_mg, carbohydrates_total_g, fiber_g, sugar_g, added_at, is_favorite,
                consumed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
            params![
                food.user_id,
                food.name,
                food.original_query,
                food.requested_quantity_g,
                food.calories,
                food.serving_size_g,
                food.fat_total_g,
                food.fat_saturated_g,
                food.protein_g,
                food.sodium_mg,
                food.potassium_mg,
                food.cholesterol_mg,
                food.carbohydrates_total_g,
                food.fiber_g,
                food.sugar_g,
                food.added_at,
                food.is_favorite,
                food.consumed_at,
            ],
        )
        .with_context(|| format!("Failed to insert food '{}'", food.name))?;
        Ok(conn.last_insert_rowid())
    }

    pub fn insert_food(&self, food: &Food) -> Result<i64> {
        let id = Self::insert_food_row(&self.conn, food)?;
        self.changes.bump(Table::Foods);
        Ok(id)
    }

    /// Insert every food or none of them. Ids come back in input order.
    pub fn insert_foods(&self, foods: &[Food]) -> Result<Vec<i64>> {
        let tx = self.conn.unchecked_transaction()?;
        let ids = foods
            .iter()
            .map(|food| Self::insert_food_row(&tx, food))
            .collect::<Result<Vec<_>>>()?;
        tx.commit()?;
        if !ids.is_empty() {
            self.changes.bump(Table::Foods);
        }
        Ok(ids)
    }

    pub fn get_food(&self, id: i64) -> Result<Food> {
        self.conn
            .query_row(
                &format!("SELECT {FOOD_COLUMNS} FROM foods WHERE id = ?1"),
                params![id],
                Self::food_from_row,
            )
            .with_context(|| format!("Food {id} not found"))
    }

    /// Replace every column of the row with `food.id`.
    pub fn update_food(&self, food: &Food) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE foods SET user_id = ?1, name = ?2, original_query = ?3,
                requested_quantity_g = ?4, calories = ?5, serving_size_g = ?6, fat_total_g = ?7,
                fat_saturated_g = ?8, protein_g = ?9, sodium_mg = ?10, potassium_mg = ?11,
                cholesterol_mg = ?12, carbohydrates_total_g = ?13, fiber_g = ?14, sugar_g = ?15,
                added_at = ?16, is_favorite = ?17, consumed_at = ?18
             WHERE id = ?19",
            params![
                food.user_id,
                food.name,
                food.original_query,
                food.requested_quantity_g,
                food.calories,
                food.serving_size_g,
                food.fat_total_g,
                food.fat_saturated_g,
                food.protein_g,
                food.sodium_mg,
                food.potassium_mg,
                food.cholesterol_mg,
                food.carbohydrates_total_g,
                food.fiber_g,
                food.sugar_g,
                food.added_at,
                food.is_favorite,
                food.consumed_at,
                food.id,
            ],
        )?;
        if rows > 0 {
            self.changes.bump(Table::Foods);
        }
        Ok(rows > 0)
    }

    pub fn delete_food(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM foods WHERE id = ?1", params![id])?;
        if rows > 0 {
            self.changes.bump(Table::Foods);
        }
        Ok(rows > 0)
    }

    pub fn list_foods(&self, user_id: i64) -> Result<Vec<Food>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {FOOD_COLUMNS} FROM foods WHERE user_id = ?1 ORDER BY added_at DESC, id DESC"
        ))?;
        let foods = stmt
            .query_map(params![user_id], Self::food_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(foods)
    }

    pub fn favorite_foods(&self, user_id: i64) -> Result<Vec<Food>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {FOOD_COLUMNS} FROM foods WHERE user_id = ?1 AND is_favorite = 1
             ORDER BY name COLLATE NOCASE, id"
        ))?;
        let foods = stmt
            .query_map(params![user_id], Self::food_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(foods)
    }

    // --- Recipes ---

    pub fn insert_recipe(&self, recipe: &Recipe) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO recipes (user_id, title, ingredients, servings, instructions,
                search_query, added_at, is_favorite)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                recipe.user_id,
                recipe.title,
                recipe.ingredients,
                recipe.servings,
                recipe.instructions,
                recipe.search_query,
                recipe.added_at,
                recipe.is_favorite,
            ],
        )?;
        self.changes.bump(Table::Recipes);
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_recipe(&self, id: i64) -> Result<Recipe> {
        self.conn
            .query_row(
                &format!("SELECT {RECIPE_COLUMNS} FROM recipes WHERE id = ?1"),
                params![id],
                Self::recipe_from_row,
            )
            .with_context(|| format!("Recipe {id} not found"))
    }

    pub fn get_recipe_by_title(&self, user_id: i64, title: &str) -> Result<Option<Recipe>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RECIPE_COLUMNS} FROM recipes WHERE user_id = ?1 AND title = ?2 COLLATE NOCASE
             ORDER BY id LIMIT 1"
        ))?;
        let mut rows = stmt.query(params![user_id, title])?;
        if let Some(row) = rows.next()? {
            Ok(Some(Self::recipe_from_row(row)?))
        } else {
            Ok(None)
        }
    }

    /// Replace every column of the row with `recipe.id`.
    pub fn update_recipe(&self, recipe: &Recipe) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE recipes SET user_id = ?1, title = ?2, ingredients = ?3, servings = ?4,
                instructions = ?5, search_query = ?6, added_at = ?7, is_favorite = ?8
             WHERE id = ?9",
            params![
                recipe.user_id,
                recipe.title,
                recipe.ingredients,
                recipe.servings,
                recipe.instructions,
                recipe.search_query,
                recipe.added_at,
                recipe.is_favorite,
                recipe.id,
            ],
        )?;
        if rows > 0 {
            self.changes.bump(Table::Recipes);
        }
        Ok(rows > 0)
    }

    /// Delete a recipe; its meal plan rows go with it through the cascade.
    pub fn delete_recipe(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM recipes WHERE id = ?1", params![id])?;
        if rows > 0 {
            self.changes.bump(Table::Recipes);
            self.changes.bump(Table::MealPlans);
        }
        Ok(rows > 0)
    }

    pub fn list_recipes(&self, user_id: i64) -> Result<Vec<Recipe>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RECIPE_COLUMNS} FROM recipes WHERE user_id = ?1 ORDER BY added_at DESC, id DESC"
        ))?;
        let recipes = stmt
            .query_map(params![user_id], Self::recipe_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(recipes)
    }

    pub fn favorite_recipes(&self, user_id: i64) -> Result<Vec<Recipe>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RECIPE_COLUMNS} FROM recipes WHERE user_id = ?1 AND is_favorite = 1
             ORDER BY title COLLATE NOCASE, id"
        ))?;
        let recipes = stmt
            .query_map(params![user_id], Self::recipe_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(recipes)
    }

    // --- Meal plans ---

    pub fn insert_meal_plan(&self, plan: &MealPlan) -> Result<i64> {
        self.conn
            .execute(
                "INSERT INTO meal_plans (user_id, recipe_id, day_of_week, meal_type, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    plan.user_id,
                    plan.recipe_id,
                    plan.day_of_week,
                    plan.meal_type,
                    plan.created_at,
                ],
            )
            .with_context(|| format!("Failed to plan recipe {}", plan.recipe_id))?;
        self.changes.bump(Table::MealPlans);
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_meal_plan(&self, id: i64) -> Result<MealPlan> {
        self.conn
            .query_row(
                "SELECT id, user_id, recipe_id, day_of_week, meal_type, created_at
                 FROM meal_plans WHERE id = ?1",
                params![id],
                |row| {
                    Ok(MealPlan {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        recipe_id: row.get(2)?,
                        day_of_week: row.get(3)?,
                        meal_type: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                },
            )
            .with_context(|| format!("Meal plan {id} not found"))
    }

    pub fn delete_meal_plan(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM meal_plans WHERE id = ?1", params![id])?;
        if rows > 0 {
            self.changes.bump(Table::MealPlans);
        }
        Ok(rows > 0)
    }

    pub fn clear_meal_plans(&self, user_id: i64) -> Result<usize> {
        let rows = self
            .conn
            .execute("DELETE FROM meal_plans WHERE user_id = ?1", params![user_id])?;
        if rows > 0 {
            self.changes.bump(Table::MealPlans);
        }
        Ok(rows)
    }

    pub fn meal_plans_for_user(&self, user_id: i64) -> Result<Vec<MealPlanEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT mp.id, mp.user_id, mp.recipe_id, mp.day_of_week, mp.meal_type,
                    mp.created_at, r.title
             FROM meal_plans mp
             JOIN recipes r ON r.id = mp.recipe_id
             WHERE mp.user_id = ?1
             ORDER BY {MEAL_PLAN_ORDER}"
        ))?;
        let entries = stmt
            .query_map(params![user_id], Self::meal_plan_entry_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn meal_plans_for_day(&self, user_id: i64, day_of_week: i64) -> Result<Vec<MealPlanEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT mp.id, mp.user_id, mp.recipe_id, mp.day_of_week, mp.meal_type,
                    mp.created_at, r.title
             FROM meal_plans mp
             JOIN recipes r ON r.id = mp.recipe_id
             WHERE mp.user_id = ?1 AND mp.day_of_week = ?2
             ORDER BY {MEAL_PLAN_ORDER}"
        ))?;
        let entries = stmt
            .query_map(params![user_id, day_of_week], Self::meal_plan_entry_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    // --- Preferences ---

    pub fn set_preference(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO preferences (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, now_millis()],
        )?;
        self.changes.bump(Table::Preferences);
        Ok(())
    }

    pub fn get_preference(&self, key: &str) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM preferences WHERE key = ?1")?;
        let mut rows = stmt.query(params![key])?;
        if let Some(row) = rows.next()? {
            Ok(Some(row.get(0)?))
        } else {
            Ok(None)
        }
    }

    pub fn delete_preference(&self, key: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM preferences WHERE key = ?1", params![key])?;
        if rows > 0 {
            self.changes.bump(Table::Preferences);
        }
        Ok(rows > 0)
    }

    #[cfg(test)]
    pub(crate) fn drop_preferences_for_test(&self) {
        self.conn.execute_batch("DROP TABLE preferences;").unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user(email: &str) -> User {
        User {
            id: 0,
            email: email.to_string(),
            password_hash: "$argon2id$v=19$stub".to_string(),
            first_name: Some("Ann".to_string()),
            last_name: None,
            age: Some(34),
            created_at: 1_700_000_000_000,
        }
    }

    fn sample_food(user_id: i64) -> Food {
        Food {
            id: 0,
            user_id,
            name: "chicken breast".to_string(),
            original_query: "200g chicken breast".to_string(),
            requested_quantity_g: 200.0,
            calories: 330.0,
            serving_size_g: 100.0,
            fat_total_g: 7.2,
            fat_saturated_g: 2.0,
            protein_g: 62.0,
            sodium_mg: 148.0,
            potassium_mg: 512.0,
            cholesterol_mg: 170.0,
            carbohydrates_total_g: 0.0,
            fiber_g: 0.0,
            sugar_g: 0.0,
            added_at: 1_700_000_000_000,
            is_favorite: false,
            consumed_at: None,
        }
    }

    fn sample_recipe(user_id: i64, title: &str, added_at: i64) -> Recipe {
        Recipe {
            id: 0,
            user_id,
            title: title.to_string(),
            ingredients: "2 eggs|1 cup flour|1 cup milk".to_string(),
            servings: "2 Servings".to_string(),
            instructions: "Whisk and cook.".to_string(),
            search_query: "pancakes".to_string(),
            added_at,
            is_favorite: false,
        }
    }

    fn plan(user_id: i64, recipe_id: i64, day_of_week: i64, meal_type: MealType) -> MealPlan {
        MealPlan {
            id: 0,
            user_id,
            recipe_id,
            day_of_week,
            meal_type,
            created_at: 1_700_000_000_000,
        }
    }

    #[test]
    fn test_fresh_database_has_declared_version() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.schema_version().unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_insert_and_get_user() {
        let db = Database::open_in_memory().unwrap();
        let id = db.insert_user(&sample_user("ann@example.com")).unwrap();
        assert!(id > 0);

        let user = db.get_user(id).unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.email, "ann@example.com");
        assert_eq!(user.first_name.as_deref(), Some("Ann"));
        assert_eq!(user.age, Some(34));

        let by_email = db.get_user_by_email("ann@example.com").unwrap().unwrap();
        assert_eq!(by_email, user);
        assert!(db.get_user_by_email("bob@example.com").unwrap().is_none());
    }

    #[test]
    fn test_find_user_missing_is_none() {
        let db = Database::open_in_memory().unwrap();
        let id = db.insert_user(&sample_user("ann@example.com")).unwrap();
        assert_eq!(db.find_user(id).unwrap().unwrap().email, "ann@example.com");
        assert!(db.find_user(id + 1).unwrap().is_none());
    }

    #[test]
    fn test_duplicate_email_rejected() {
        let db = Database::open_in_memory().unwrap();
        db.insert_user(&sample_user("ann@example.com")).unwrap();
        assert!(db.insert_user(&sample_user("ann@example.com")).is_err());
        assert_eq!(db.list_users().unwrap().len(), 1);
    }

    #[test]
    fn test_insert_assigns_fresh_ids() {
        let db = Database::open_in_memory().unwrap();
        let food = sample_food(1);
        let first = db.insert_food(&food).unwrap();
        let second = db.insert_food(&food).unwrap();
        assert!(first > 0);
        assert_ne!(first, second);
        assert_eq!(db.get_food(first).unwrap(), food.with_id(first));
    }

    #[test]
    fn test_update_food_replaces_full_row() {
        let db = Database::open_in_memory().unwrap();
        let id = db.insert_food(&sample_food(1)).unwrap();
        let stored = db.get_food(id).unwrap();

        let changed = stored.with_favorite(true).with_consumed_at(Some(1_700_000_100_000));
        assert!(db.update_food(&changed).unwrap());
        assert_eq!(db.get_food(id).unwrap(), changed);

        // Unknown id matches nothing
        assert!(!db.update_food(&changed.with_id(999)).unwrap());
    }

    #[test]
    fn test_food_lists_are_scoped_to_owner() {
        let db = Database::open_in_memory().unwrap();
        let a = db.insert_food(&sample_food(1)).unwrap();
        db.insert_food(&sample_food(1)).unwrap();
        db.insert_food(&sample_food(2)).unwrap();

        assert_eq!(db.list_foods(1).unwrap().len(), 2);
        assert_eq!(db.list_foods(2).unwrap().len(), 1);
        assert!(db.favorite_foods(1).unwrap().is_empty());

        let fav = db.get_food(a).unwrap().with_favorite(true);
        db.update_food(&fav).unwrap();
        let favorites = db.favorite_foods(1).unwrap();
        assert_eq!(favorites.len(), 1);
        assert_eq!(favorites[0].id, a);
    }

    #[test]
    fn test_delete_food() {
        let db = Database::open_in_memory().unwrap();
        let id = db.insert_food(&sample_food(1)).unwrap();
        assert!(db.delete_food(id).unwrap());
        assert!(!db.delete_food(id).unwrap());
        assert!(db.get_food(id).is_err());
    }

    #[test]
    fn test_insert_foods_is_all_or_nothing() {
        let db = Database::open_in_memory().unwrap();
        let mut sub = db.subscribe(Table::Foods);

        let ids = db
            .insert_foods(&[sample_food(1), sample_food(1)])
            .unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids[0] < ids[1]);
        assert!(sub.has_changed());
        sub.mark_seen();

        // NaN binds as NULL and trips the NOT NULL constraint on the second row
        let mut bad = sample_food(1);
        bad.calories = f64::NAN;
        assert!(db.insert_foods(&[sample_food(1), bad]).is_err());
        assert_eq!(db.list_foods(1).unwrap().len(), 2);
        assert!(!sub.has_changed());
    }

    #[test]
    fn test_recipe_crud_and_ordering() {
        let db = Database::open_in_memory().unwrap();
        let older = db.insert_recipe(&sample_recipe(1, "Pancakes", 1_000)).unwrap();
        let newer = db.insert_recipe(&sample_recipe(1, "Waffles", 2_000)).unwrap();

        let all = db.list_recipes(1).unwrap();
        assert_eq!(all.iter().map(|r| r.id).collect::<Vec<_>>(), vec![newer, older]);

        let fav = db.get_recipe(older).unwrap().with_favorite(true);
        assert!(db.update_recipe(&fav).unwrap());
        let favorites = db.favorite_recipes(1).unwrap();
        assert_eq!(favorites, vec![fav]);

        assert!(db.delete_recipe(newer).unwrap());
        assert_eq!(db.list_recipes(1).unwrap().len(), 1);
    }

    #[test]
    fn test_get_recipe_by_title_is_case_insensitive() {
        let db = Database::open_in_memory().unwrap();
        let id = db.insert_recipe(&sample_recipe(1, "Pancakes", 1_000)).unwrap();
        let found = db.get_recipe_by_title(1, "pancakes").unwrap().unwrap();
        assert_eq!(found.id, id);
        assert!(db.get_recipe_by_title(2, "Pancakes").unwrap().is_none());
    }

    #[test]
    fn test_meal_plan_requires_existing_recipe() {
        let db = Database::open_in_memory().unwrap();
        let err = db.insert_meal_plan(&plan(1, 4242, 0, MealType::Lunch));
        assert!(err.is_err());
        assert!(db.meal_plans_for_user(1).unwrap().is_empty());
    }

    #[test]
    fn test_meal_plan_check_constraints() {
        let db = Database::open_in_memory().unwrap();
        let recipe_id = db.insert_recipe(&sample_recipe(1, "Pancakes", 1_000)).unwrap();
        assert!(db.insert_meal_plan(&plan(1, recipe_id, 7, MealType::Lunch)).is_err());
        assert!(db.insert_meal_plan(&plan(1, recipe_id, -1, MealType::Lunch)).is_err());
        assert!(db.insert_meal_plan(&plan(1, recipe_id, 6, MealType::Snack)).is_ok());
    }

    #[test]
    fn test_deleting_recipe_cascades_meal_plans() {
        let db = Database::open_in_memory().unwrap();
        let pancakes = db.insert_recipe(&sample_recipe(1, "Pancakes", 1_000)).unwrap();
        let soup = db.insert_recipe(&sample_recipe(1, "Soup", 2_000)).unwrap();
        let p1 = db
            .insert_meal_plan(&plan(1, pancakes, 0, MealType::Breakfast))
            .unwrap();
        db.insert_meal_plan(&plan(1, pancakes, 2, MealType::Breakfast))
            .unwrap();
        db.insert_meal_plan(&plan(1, soup, 0, MealType::Dinner))
            .unwrap();

        assert!(db.delete_recipe(pancakes).unwrap());

        let remaining = db.meal_plans_for_user(1).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].plan.recipe_id, soup);
        assert!(db.get_meal_plan(p1).is_err());
    }

    #[test]
    fn test_meal_plans_ordered_by_day_then_slot() {
        let db = Database::open_in_memory().unwrap();
        let r = db.insert_recipe(&sample_recipe(1, "Pancakes", 1_000)).unwrap();
        db.insert_meal_plan(&plan(1, r, 3, MealType::Dinner)).unwrap();
        db.insert_meal_plan(&plan(1, r, 0, MealType::Snack)).unwrap();
        db.insert_meal_plan(&plan(1, r, 0, MealType::Breakfast)).unwrap();
        db.insert_meal_plan(&plan(2, r, 0, MealType::Lunch)).unwrap();

        let entries = db.meal_plans_for_user(1).unwrap();
        let slots: Vec<(i64, MealType)> = entries
            .iter()
            .map(|e| (e.plan.day_of_week, e.plan.meal_type))
            .collect();
        assert_eq!(
            slots,
            vec![
                (0, MealType::Breakfast),
                (0, MealType::Snack),
                (3, MealType::Dinner)
            ]
        );
        assert_eq!(entries[0].recipe_title, "Pancakes");
        assert_eq!(entries[0].day_name, "Monday");

        let monday = db.meal_plans_for_day(1, 0).unwrap();
        assert_eq!(monday.len(), 2);
        assert_eq!(db.clear_meal_plans(1).unwrap(), 3);
        assert_eq!(db.meal_plans_for_user(2).unwrap().len(), 1);
    }

    #[test]
    fn test_preferences_roundtrip() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.get_preference("theme").unwrap().is_none());

        db.set_preference("theme", "dark").unwrap();
        assert_eq!(db.get_preference("theme").unwrap().as_deref(), Some("dark"));

        db.set_preference("theme", "light").unwrap();
        assert_eq!(db.get_preference("theme").unwrap().as_deref(), Some("light"));

        assert!(db.delete_preference("theme").unwrap());
        assert!(!db.delete_preference("theme").unwrap());
    }

    #[test]
    fn test_subscription_sees_writes_to_its_table_only() {
        let db = Database::open_in_memory().unwrap();
        let mut recipes = db.subscribe(Table::Recipes);
        let plans = db.subscribe(Table::MealPlans);
        assert!(!recipes.has_changed());

        db.insert_food(&sample_food(1)).unwrap();
        assert!(!recipes.has_changed());

        let id = db.insert_recipe(&sample_recipe(1, "Pancakes", 1_000)).unwrap();
        assert!(recipes.has_changed());
        recipes.mark_seen();
        assert!(!recipes.has_changed());
        assert!(!plans.has_changed());

        db.delete_recipe(id).unwrap();
        assert!(recipes.has_changed());
        assert!(plans.has_changed());
    }

    #[tokio::test]
    async fn test_subscription_changed_resolves_after_write() {
        let db = Database::open_in_memory().unwrap();
        let mut sub = db.subscribe(Table::Foods);
        db.insert_food(&sample_food(1)).unwrap();
        sub.changed().await.unwrap();
        assert!(!sub.has_changed());
    }

    #[test]
    fn test_poll_sees_commits_from_other_connections_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shared.db");
        let watcher = Database::open(&path).unwrap();
        let writer = Database::open(&path).unwrap();
        let mut sub = watcher.subscribe(Table::Recipes);

        assert!(!watcher.poll_external_changes().unwrap());

        // Own writes notify directly and leave data_version alone
        watcher.insert_recipe(&sample_recipe(1, "Soup", 1_000)).unwrap();
        assert!(sub.has_changed());
        sub.mark_seen();
        assert!(!watcher.poll_external_changes().unwrap());

        writer.insert_recipe(&sample_recipe(1, "Stew", 2_000)).unwrap();
        assert!(!sub.has_changed());
        assert!(watcher.poll_external_changes().unwrap());
        assert!(sub.has_changed());
        assert_eq!(watcher.list_recipes(1).unwrap().len(), 2);

        assert!(!watcher.poll_external_changes().unwrap());
    }

    #[test]
    fn test_reopen_same_version_keeps_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nutrilog.db");
        {
            let db = Database::open(&path).unwrap();
            db.insert_recipe(&sample_recipe(1, "Pancakes", 1_000)).unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert_eq!(db.list_recipes(1).unwrap().len(), 1);
    }

    #[test]
    fn test_version_mismatch_drops_all_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nutrilog.db");
        {
            let db = Database::open_with_version(&path, SCHEMA_VERSION).unwrap();
            let user = db.insert_user(&sample_user("ann@example.com")).unwrap();
            db.insert_food(&sample_food(user)).unwrap();
            let recipe = db.insert_recipe(&sample_recipe(user, "Pancakes", 1_000)).unwrap();
            db.insert_meal_plan(&plan(user, recipe, 1, MealType::Lunch))
                .unwrap();
            db.set_preference("active_user_id", &user.to_string())
                .unwrap();
        }

        let db = Database::open_with_version(&path, SCHEMA_VERSION + 1).unwrap();
        assert_eq!(db.schema_version().unwrap(), SCHEMA_VERSION + 1);
        assert!(db.list_users().unwrap().is_empty());
        assert!(db.list_foods(1).unwrap().is_empty());
        assert!(db.list_recipes(1).unwrap().is_empty());
        assert!(db.meal_plans_for_user(1).unwrap().is_empty());
        assert!(db.get_preference("active_user_id").unwrap().is_none());

        // Schema is usable after the rebuild
        let id = db.insert_recipe(&sample_recipe(1, "Soup", 2_000)).unwrap();
        assert_eq!(db.get_recipe(id).unwrap().title, "Soup");
    }

    #[test]
    fn test_downgrade_also_drops_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nutrilog.db");
        {
            let db = Database::open_with_version(&path, SCHEMA_VERSION).unwrap();
            db.insert_recipe(&sample_recipe(1, "Pancakes", 1_000)).unwrap();
        }
        let db = Database::open_with_version(&path, SCHEMA_VERSION - 1).unwrap();
        assert!(db.list_recipes(1).unwrap().is_empty());
    }
}
