use anyhow::Result;

use nutrilog_core::models::{day_name, validate_meal_type};

use super::helpers::{exit_not_found, parse_day, print_plan_table};
use crate::context::AppContext;

pub(crate) fn cmd_plan_add(
    ctx: &AppContext,
    recipe_id: i64,
    day: &str,
    meal: Option<&str>,
    json: bool,
) -> Result<()> {
    let user = ctx.active_user()?;
    let recipe = match ctx.service.get_recipe(recipe_id) {
        Ok(recipe) if recipe.user_id == user.id => recipe,
        _ => exit_not_found(&format!("Recipe {recipe_id} not found"), json),
    };
    let day_of_week = parse_day(day)?;
    let meal_type = match meal {
        Some(m) => validate_meal_type(m)?,
        None => ctx.service.default_meal_type()?,
    };

    let plan = ctx
        .service
        .add_meal_plan(user.id, recipe.id, day_of_week, meal_type)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        let day = day_name(plan.day_of_week);
        println!(
            "Planned {} for {day} {meal_type} (id: {})",
            recipe.title, plan.id
        );
    }
    Ok(())
}

pub(crate) fn cmd_plan_show(ctx: &AppContext, day: Option<&str>, json: bool) -> Result<()> {
    let user = ctx.active_user()?;
    let entries = match day {
        Some(d) => ctx.service.meal_plans_for_day(user.id, parse_day(d)?)?,
        None => ctx.service.meal_plans(user.id)?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else if entries.is_empty() {
        println!("Nothing planned. Add a recipe with: nutrilog plan add <recipe_id> --day <day>");
    } else {
        print_plan_table(&entries);
    }
    Ok(())
}

pub(crate) fn cmd_plan_remove(ctx: &AppContext, id: i64, json: bool) -> Result<()> {
    let user = ctx.active_user()?;
    match ctx.service.db().get_meal_plan(id) {
        Ok(plan) if plan.user_id == user.id => {}
        _ => exit_not_found(&format!("Meal plan {id} not found"), json),
    }
    ctx.service.remove_meal_plan(id)?;

    if json {
        println!("{}", serde_json::json!({ "deleted": id }));
    } else {
        println!("Removed meal plan {id}");
    }
    Ok(())
}

pub(crate) fn cmd_plan_clear(ctx: &AppContext, json: bool) -> Result<()> {
    let user = ctx.active_user()?;
    let removed = ctx.service.clear_meal_plans(user.id)?;

    if json {
        println!("{}", serde_json::json!({ "removed": removed }));
    } else {
        println!("Cleared {removed} meal plan slot(s)");
    }
    Ok(())
}
