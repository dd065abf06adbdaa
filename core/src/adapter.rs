//! Binds recipe snapshots to a list of rows, touching only the rows that changed.

use std::fmt;

use chrono::{Local, TimeZone};

use crate::diff::{Diffable, ListUpdate, calculate_diff};
use crate::models::Recipe;

/// Ingredient text longer than this is cut and suffixed with `...`.
pub const INGREDIENTS_PREVIEW_LEN: usize = 100;

/// Row timestamp pattern, e.g. `05/03/2024 14:07`.
pub const DATE_FORMAT: &str = "%d/%m/%Y %H:%M";

impl Diffable for Recipe {
    fn same_item(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

#[must_use]
pub fn capitalize_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[must_use]
pub fn ingredients_preview(ingredients: &str) -> String {
    if ingredients.chars().count() <= INGREDIENTS_PREVIEW_LEN {
        return ingredients.to_string();
    }
    let mut preview: String = ingredients.chars().take(INGREDIENTS_PREVIEW_LEN).collect();
    preview.push_str("...");
    preview
}

/// Format epoch millis in the machine's local time zone.
#[must_use]
pub fn format_added_at(millis: i64) -> String {
    format_added_at_in(millis, &Local)
}

#[must_use]
pub fn format_added_at_in<Tz>(millis: i64, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    tz.timestamp_millis_opt(millis)
        .earliest()
        .map(|dt| dt.format(DATE_FORMAT).to_string())
        .unwrap_or_default()
}

/// Display values of one bound row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeRow {
    pub id: i64,
    pub title: String,
    pub ingredients_preview: String,
    pub servings: String,
    pub added_at: String,
    pub is_favorite: bool,
    /// Favorite and delete controls; hidden on unsaved preview rows.
    pub actions_visible: bool,
}

impl RecipeRow {
    #[must_use]
    pub fn from_recipe(recipe: &Recipe) -> Self {
        Self {
            id: recipe.id,
            title: capitalize_first(&recipe.title),
            ingredients_preview: ingredients_preview(&recipe.ingredients),
            servings: recipe.servings.clone(),
            added_at: format_added_at(recipe.added_at),
            is_favorite: recipe.is_favorite,
            actions_visible: !recipe.is_unsaved(),
        }
    }
}

/// Receiver of structural row updates, e.g. a terminal table or a widget list.
pub trait RowHost {
    fn insert_row(&mut self, position: usize);
    fn remove_row(&mut self, position: usize);
    fn move_row(&mut self, from: usize, to: usize);
    fn bind_row(&mut self, position: usize, row: RecipeRow);
}

/// In-memory `RowHost` that keeps the rendered rows and counts binds.
#[derive(Debug, Default)]
pub struct RowBuffer {
    rows: Vec<Option<RecipeRow>>,
    bind_count: usize,
}

impl RowBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound rows in display order. Inserted rows that were never bound are skipped.
    pub fn rows(&self) -> impl Iterator<Item = &RecipeRow> {
        self.rows.iter().flatten()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn bind_count(&self) -> usize {
        self.bind_count
    }

    pub fn reset_bind_count(&mut self) {
        self.bind_count = 0;
    }
}

impl RowHost for RowBuffer {
    fn insert_row(&mut self, position: usize) {
        self.rows.insert(position, None);
    }

    fn remove_row(&mut self, position: usize) {
        self.rows.remove(position);
    }

    fn move_row(&mut self, from: usize, to: usize) {
        let row = self.rows.remove(from);
        self.rows.insert(to, row);
    }

    fn bind_row(&mut self, position: usize, row: RecipeRow) {
        self.rows[position] = Some(row);
        self.bind_count += 1;
    }
}

/// Callbacks fired by row controls.
pub trait RecipeItemListener {
    fn on_recipe_clicked(&mut self, recipe: &Recipe);
    /// Receives a copy with `is_favorite` already inverted.
    fn on_favorite_toggled(&mut self, recipe: Recipe);
    fn on_delete_requested(&mut self, recipe: &Recipe);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecipeAction {
    Open(Recipe),
    Favorite(Recipe),
    Delete(Recipe),
}

/// Listener that queues every callback for the caller to act on afterwards.
#[derive(Debug, Default)]
pub struct RecordedActions {
    pub actions: Vec<RecipeAction>,
}

impl RecordedActions {
    pub fn drain(&mut self) -> Vec<RecipeAction> {
        std::mem::take(&mut self.actions)
    }
}

impl RecipeItemListener for RecordedActions {
    fn on_recipe_clicked(&mut self, recipe: &Recipe) {
        self.actions.push(RecipeAction::Open(recipe.clone()));
    }

    fn on_favorite_toggled(&mut self, recipe: Recipe) {
        self.actions.push(RecipeAction::Favorite(recipe));
    }

    fn on_delete_requested(&mut self, recipe: &Recipe) {
        self.actions.push(RecipeAction::Delete(recipe.clone()));
    }
}

pub struct RecipeListAdapter<L> {
    items: Vec<Recipe>,
    listener: L,
}

impl<L: RecipeItemListener> RecipeListAdapter<L> {
    pub fn new(listener: L) -> Self {
        Self {
            items: Vec::new(),
            listener,
        }
    }

    /// Replace the bound list with `new`, forwarding the minimal set of row
    /// updates to `host`. Only inserted and content-changed rows are bound.
    pub fn submit_list(&mut self, new: Vec<Recipe>, host: &mut impl RowHost) -> Vec<ListUpdate> {
        let updates = calculate_diff(&self.items, &new);
        for update in &updates {
            match *update {
                ListUpdate::Inserted { position } => {
                    host.insert_row(position);
                    host.bind_row(position, RecipeRow::from_recipe(&new[position]));
                }
                ListUpdate::Removed { position } => host.remove_row(position),
                ListUpdate::Moved { from, to } => host.move_row(from, to),
                ListUpdate::Changed { position } => {
                    host.bind_row(position, RecipeRow::from_recipe(&new[position]));
                }
            }
        }
        self.items = new;
        updates
    }

    #[must_use]
    pub fn items(&self) -> &[Recipe] {
        &self.items
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn get(&self, position: usize) -> Option<&Recipe> {
        self.items.get(position)
    }

    #[must_use]
    pub fn row(&self, position: usize) -> Option<RecipeRow> {
        self.items.get(position).map(RecipeRow::from_recipe)
    }

    pub fn row_clicked(&mut self, position: usize) -> bool {
        let Some(recipe) = self.items.get(position) else {
            return false;
        };
        self.listener.on_recipe_clicked(recipe);
        true
    }

    pub fn favorite_clicked(&mut self, position: usize) -> bool {
        match self.items.get(position) {
            Some(recipe) if !recipe.is_unsaved() => {
                let toggled = recipe.with_favorite(!recipe.is_favorite);
                self.listener.on_favorite_toggled(toggled);
                true
            }
            _ => false,
        }
    }

    pub fn delete_clicked(&mut self, position: usize) -> bool {
        match self.items.get(position) {
            Some(recipe) if !recipe.is_unsaved() => {
                self.listener.on_delete_requested(recipe);
                true
            }
            _ => false,
        }
    }

    pub fn listener(&self) -> &L {
        &self.listener
    }

    pub fn listener_mut(&mut self) -> &mut L {
        &mut self.listener
    }
}
