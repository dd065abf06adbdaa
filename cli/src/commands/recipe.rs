use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing::debug;

use nutrilog_core::adapter::{RecipeAction, RecipeListAdapter, RecordedActions, RowBuffer};
use nutrilog_core::diff::ListUpdate;
use nutrilog_core::models::Recipe;

use super::helpers::{exit_not_found, print_recipe_rows, prompt_choice};
use crate::context::AppContext;

/// How often `recipe list --watch` checks for commits from other processes.
const WATCH_POLL: Duration = Duration::from_millis(500);

/// Bind `recipes` through a fresh adapter and return it with the rendered rows.
fn bind(recipes: Vec<Recipe>) -> (RecipeListAdapter<RecordedActions>, RowBuffer) {
    let mut adapter = RecipeListAdapter::new(RecordedActions::default());
    let mut rows = RowBuffer::new();
    adapter.submit_list(recipes, &mut rows);
    (adapter, rows)
}

pub(crate) async fn cmd_recipe_search(
    ctx: &AppContext,
    query: &str,
    save: Option<usize>,
    pick: bool,
    json: bool,
) -> Result<()> {
    let user = ctx.active_user()?;
    let client = ctx.recipe_client()?;
    let previews = ctx.service.search_recipes(&client, user.id, query).await?;

    if previews.is_empty() {
        if json {
            println!("[]");
        } else {
            println!("No recipes found for '{query}'");
        }
        return Ok(());
    }

    let (mut adapter, rows) = bind(previews);
    let selection = match (save, pick) {
        (Some(n), _) if n == 0 || n > adapter.len() => {
            bail!("--save must be between 1 and {}", adapter.len())
        }
        (Some(n), _) => Some(n - 1),
        (None, true) => {
            print_recipe_rows(rows.rows());
            Some(prompt_choice(adapter.len(), "recipe to save")?)
        }
        (None, false) => None,
    };

    let Some(position) = selection else {
        if json {
            println!("{}", serde_json::to_string_pretty(adapter.items())?);
        } else {
            print_recipe_rows(rows.rows());
            println!("Save one with: nutrilog recipe search \"{query}\" --save <#>");
        }
        return Ok(());
    };

    adapter.row_clicked(position);
    for action in adapter.listener_mut().drain() {
        if let RecipeAction::Open(preview) = action {
            let saved = ctx.service.save_recipe(&preview)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&saved)?);
            } else {
                println!("Saved recipe: {} (id: {})", saved.title, saved.id);
            }
        }
    }
    Ok(())
}

fn load_recipes(ctx: &AppContext, user_id: i64, favorites: bool) -> Result<Vec<Recipe>> {
    if favorites {
        ctx.service.favorite_recipes(user_id)
    } else {
        ctx.service.list_recipes(user_id)
    }
}

pub(crate) fn cmd_recipe_list(ctx: &AppContext, favorites: bool, json: bool) -> Result<()> {
    let user = ctx.active_user()?;
    let recipes = load_recipes(ctx, user.id, favorites)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&recipes)?);
    } else if recipes.is_empty() {
        if favorites {
            println!("No favorite recipes yet");
        } else {
            println!("No recipes saved. Find some with: nutrilog recipe search \"<query>\"");
        }
    } else {
        let (_, rows) = bind(recipes);
        print_recipe_rows(rows.rows());
    }
    Ok(())
}

/// Re-read the list and push it through the adapter that is already bound,
/// so only rows that actually changed get re-rendered.
fn refresh_watched(
    ctx: &AppContext,
    user_id: i64,
    favorites: bool,
    adapter: &mut RecipeListAdapter<RecordedActions>,
    rows: &mut RowBuffer,
) -> Result<Vec<ListUpdate>> {
    rows.reset_bind_count();
    let recipes = load_recipes(ctx, user_id, favorites)?;
    Ok(adapter.submit_list(recipes, rows))
}

fn render_watched(rows: &RowBuffer) {
    if rows.is_empty() {
        println!("No recipes yet");
    } else {
        print_recipe_rows(rows.rows());
    }
    println!("Watching for changes (Ctrl-C to stop)");
}

/// Keep the recipe list on screen and redraw it whenever the recipes table
/// is written, by this process or by another `nutrilog` invocation.
pub(crate) async fn cmd_recipe_watch(ctx: &AppContext, favorites: bool) -> Result<()> {
    let user = ctx.active_user()?;
    let (recipes, mut changes) = ctx.service.watch_recipes(user.id)?;
    let recipes = recipes
        .into_iter()
        .filter(|r| !favorites || r.is_favorite)
        .collect();

    let mut adapter = RecipeListAdapter::new(RecordedActions::default());
    let mut rows = RowBuffer::new();
    adapter.submit_list(recipes, &mut rows);
    render_watched(&rows);

    let mut poll = tokio::time::interval(WATCH_POLL);
    let stop = tokio::signal::ctrl_c();
    tokio::pin!(stop);

    loop {
        tokio::select! {
            result = &mut stop => {
                result.context("Failed to listen for Ctrl-C")?;
                break;
            }
            _ = poll.tick() => {
                ctx.service.db().poll_external_changes()?;
            }
            changed = changes.changed() => {
                changed?;
                let updates = refresh_watched(ctx, user.id, favorites, &mut adapter, &mut rows)?;
                if !updates.is_empty() {
                    debug!(
                        updates = updates.len(),
                        rebound = rows.bind_count(),
                        "recipe list refreshed"
                    );
                    render_watched(&rows);
                }
            }
        }
    }
    Ok(())
}

pub(crate) fn cmd_recipe_show(ctx: &AppContext, id: i64, json: bool) -> Result<()> {
    let user = ctx.active_user()?;
    let recipe = match ctx.service.get_recipe(id) {
        Ok(recipe) if recipe.user_id == user.id => recipe,
        _ => exit_not_found(&format!("Recipe {id} not found"), json),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&recipe)?);
        return Ok(());
    }

    let (adapter, _) = bind(vec![recipe.clone()]);
    let Some(row) = adapter.row(0) else {
        return Ok(());
    };
    let star = if row.is_favorite { " *" } else { "" };
    println!("{}{star}", row.title);
    println!("Servings: {}   Added: {}", row.servings, row.added_at);
    println!("\nIngredients:");
    for ingredient in recipe.ingredients.split('|').map(str::trim) {
        if !ingredient.is_empty() {
            println!("  - {ingredient}");
        }
    }
    println!("\nInstructions:\n{}", recipe.instructions);
    Ok(())
}

/// Position of recipe `id` in the signed-in user's list, bound through the adapter.
fn bind_owned(
    ctx: &AppContext,
    id: i64,
    json: bool,
) -> Result<(RecipeListAdapter<RecordedActions>, usize)> {
    let user = ctx.active_user()?;
    let (adapter, _) = bind(ctx.service.list_recipes(user.id)?);
    let Some(position) = adapter.items().iter().position(|r| r.id == id) else {
        exit_not_found(&format!("Recipe {id} not found"), json);
    };
    Ok((adapter, position))
}

pub(crate) fn cmd_recipe_favorite(ctx: &AppContext, id: i64, json: bool) -> Result<()> {
    let (mut adapter, position) = bind_owned(ctx, id, json)?;
    adapter.favorite_clicked(position);

    for action in adapter.listener_mut().drain() {
        if let RecipeAction::Favorite(toggled) = action {
            ctx.service.update_recipe(&toggled)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&toggled)?);
            } else if toggled.is_favorite {
                println!("Added {} to favorites", toggled.title);
            } else {
                println!("Removed {} from favorites", toggled.title);
            }
        }
    }
    Ok(())
}

pub(crate) fn cmd_recipe_delete(ctx: &AppContext, id: i64, json: bool) -> Result<()> {
    let (mut adapter, position) = bind_owned(ctx, id, json)?;
    adapter.delete_clicked(position);

    for action in adapter.listener_mut().drain() {
        if let RecipeAction::Delete(recipe) = action {
            let plans = ctx
                .service
                .meal_plans(recipe.user_id)?
                .iter()
                .filter(|e| e.plan.recipe_id == recipe.id)
                .count();
            ctx.service.delete_recipe(recipe.id)?;
            if json {
                println!(
                    "{}",
                    serde_json::json!({ "deleted": recipe.id, "meal_plans_removed": plans })
                );
            } else {
                println!("Deleted recipe: {} (id: {})", recipe.title, recipe.id);
                if plans > 0 {
                    println!("Also removed {plans} meal plan slot(s)");
                }
            }
        }
    }
    Ok(())
}
