use anyhow::Result;

use nutrilog_core::models::{Food, User};

use super::helpers::{exit_not_found, print_food_table};
use crate::context::AppContext;

pub(crate) async fn cmd_food_search(
    ctx: &AppContext,
    query: &str,
    quantity: Option<f64>,
    no_save: bool,
    json: bool,
) -> Result<()> {
    let user = ctx.active_user()?;
    let client = ctx.nutrition_client()?;
    let quantity_g = match quantity {
        Some(q) => q,
        None => ctx.service.default_quantity_g()?,
    };

    let foods = if no_save {
        ctx.service
            .lookup_foods(&client, user.id, query, quantity_g)
            .await?
    } else {
        ctx.service
            .search_and_save_foods(&client, user.id, query, quantity_g)
            .await?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&foods)?);
    } else if foods.is_empty() {
        println!("No nutrition data found for '{query}'");
    } else {
        print_food_table(&foods);
        if !no_save {
            let n = foods.len();
            println!("Saved {n} food(s)");
        }
    }
    Ok(())
}

pub(crate) fn cmd_food_list(ctx: &AppContext, favorites: bool, json: bool) -> Result<()> {
    let user = ctx.active_user()?;
    let foods = if favorites {
        ctx.service.favorite_foods(user.id)?
    } else {
        ctx.service.list_foods(user.id)?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&foods)?);
    } else if foods.is_empty() {
        if favorites {
            println!("No favorite foods yet");
        } else {
            println!("No foods yet. Search with: nutrilog food search \"<query>\"");
        }
    } else {
        print_food_table(&foods);
    }
    Ok(())
}

/// Load a food owned by `user`, exiting with status 2 otherwise.
fn owned_food(ctx: &AppContext, user: &User, id: i64, json: bool) -> Food {
    match ctx.service.get_food(id) {
        Ok(food) if food.user_id == user.id => food,
        _ => exit_not_found(&format!("Food {id} not found"), json),
    }
}

pub(crate) fn cmd_food_favorite(ctx: &AppContext, id: i64, json: bool) -> Result<()> {
    let user = ctx.active_user()?;
    owned_food(ctx, &user, id, json);
    let food = ctx.service.toggle_food_favorite(id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&food)?);
    } else if food.is_favorite {
        println!("Added {} to favorites", food.name);
    } else {
        println!("Removed {} from favorites", food.name);
    }
    Ok(())
}

pub(crate) fn cmd_food_eat(ctx: &AppContext, id: i64, json: bool) -> Result<()> {
    let user = ctx.active_user()?;
    owned_food(ctx, &user, id, json);
    let food = ctx.service.mark_food_consumed(id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&food)?);
    } else {
        let calories = food.calories;
        println!(
            "Ate {:.0}g of {} ({calories:.0} kcal)",
            food.requested_quantity_g, food.name
        );
    }
    Ok(())
}

pub(crate) fn cmd_food_delete(ctx: &AppContext, id: i64, json: bool) -> Result<()> {
    let user = ctx.active_user()?;
    let food = owned_food(ctx, &user, id, json);
    ctx.service.delete_food(id)?;

    if json {
        println!("{}", serde_json::json!({ "deleted": id }));
    } else {
        println!("Deleted food {id} ({})", food.name);
    }
    Ok(())
}
