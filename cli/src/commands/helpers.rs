use anyhow::{Context, Result, bail};
use serde::Serialize;
use std::io::{self, BufRead, Write};
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use nutrilog_core::adapter::{RecipeRow, format_added_at};
use nutrilog_core::models::{Food, MealPlanEntry};

/// Parse a single day: monday-sunday, mon-sun, or 0-6 (0 = Monday).
pub(crate) fn parse_day(day: &str) -> Result<i64> {
    match day.trim().to_lowercase().as_str() {
        "monday" | "mon" | "0" => Ok(0),
        "tuesday" | "tue" | "1" => Ok(1),
        "wednesday" | "wed" | "2" => Ok(2),
        "thursday" | "thu" | "3" => Ok(3),
        "friday" | "fri" | "4" => Ok(4),
        "saturday" | "sat" | "5" => Ok(5),
        "sunday" | "sun" | "6" => Ok(6),
        _ => bail!("Invalid day: {day}. Use monday-sunday, mon-sun, or 0-6"),
    }
}

pub(crate) fn prompt_choice(count: usize, what: &str) -> Result<usize> {
    eprint!("\nSelect a {what} (1-{count}): ");
    io::stderr().flush()?;
    let stdin = io::stdin();
    let line = stdin.lock().lines().next().context("No input")??;
    let n: usize = line.trim().parse().context("Invalid number")?;
    if n < 1 || n > count {
        bail!("Selection out of range");
    }
    Ok(n - 1)
}

/// Read one line from stdin as a password. Works with piped input.
pub(crate) fn read_password(prompt: &str) -> Result<String> {
    eprint!("{prompt}");
    io::stderr().flush()?;
    let stdin = io::stdin();
    let line = stdin.lock().lines().next().context("No password given")??;
    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        bail!("Password must not be empty");
    }
    Ok(password)
}

pub(crate) fn print_food_table(foods: &[Food]) {
    #[derive(Tabled)]
    struct FoodRow {
        #[tabled(rename = "#")]
        idx: usize,
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Qty (g)")]
        quantity: String,
        #[tabled(rename = "Cal")]
        calories: String,
        #[tabled(rename = "Protein")]
        protein: String,
        #[tabled(rename = "Carbs")]
        carbs: String,
        #[tabled(rename = "Fat")]
        fat: String,
        #[tabled(rename = "Fav")]
        favorite: &'static str,
        #[tabled(rename = "Eaten")]
        consumed: String,
    }

    let rows: Vec<FoodRow> = foods
        .iter()
        .enumerate()
        .map(|(i, f)| FoodRow {
            idx: i + 1,
            id: if f.id == 0 { "-".into() } else { f.id.to_string() },
            name: truncate(&f.name, 30),
            quantity: format!("{:.0}", f.requested_quantity_g),
            calories: format!("{:.0}", no_neg_zero(f.calories)),
            protein: format!("{:.1}", no_neg_zero(f.protein_g)),
            carbs: format!("{:.1}", no_neg_zero(f.carbohydrates_total_g)),
            fat: format!("{:.1}", no_neg_zero(f.fat_total_g)),
            favorite: if f.is_favorite { "*" } else { "" },
            consumed: f.consumed_at.map(format_added_at).unwrap_or_default(),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(3..8)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

/// Render rows exactly as the list adapter bound them.
pub(crate) fn print_recipe_rows<'a>(rows: impl Iterator<Item = &'a RecipeRow>) {
    #[derive(Tabled)]
    struct Row {
        #[tabled(rename = "#")]
        idx: usize,
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "Title")]
        title: String,
        #[tabled(rename = "Servings")]
        servings: String,
        #[tabled(rename = "Ingredients")]
        ingredients: String,
        #[tabled(rename = "Added")]
        added_at: String,
        #[tabled(rename = "Fav")]
        favorite: &'static str,
    }

    let rows: Vec<Row> = rows
        .enumerate()
        .map(|(i, r)| Row {
            idx: i + 1,
            id: if r.actions_visible {
                r.id.to_string()
            } else {
                "-".into()
            },
            title: truncate(&r.title, 35),
            servings: r.servings.clone(),
            ingredients: r.ingredients_preview.clone(),
            added_at: r.added_at.clone(),
            favorite: match (r.actions_visible, r.is_favorite) {
                (false, _) => "",
                (true, true) => "*",
                (true, false) => "-",
            },
        })
        .collect();

    let table = Table::new(&rows).with(Style::rounded()).to_string();
    println!("{table}");
}

pub(crate) fn print_plan_table(entries: &[MealPlanEntry]) {
    #[derive(Tabled)]
    struct PlanRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Day")]
        day: String,
        #[tabled(rename = "Meal")]
        meal: String,
        #[tabled(rename = "Recipe")]
        recipe: String,
        #[tabled(rename = "Recipe ID")]
        recipe_id: i64,
    }

    let rows: Vec<PlanRow> = entries
        .iter()
        .map(|e| PlanRow {
            id: e.plan.id,
            day: e.day_name.clone(),
            meal: e.plan.meal_type.to_string(),
            recipe: truncate(&e.recipe_title, 40),
            recipe_id: e.plan.recipe_id,
        })
        .collect();

    let table = Table::new(&rows).with(Style::rounded()).to_string();
    println!("{table}");
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

/// Report a missing record and exit with status 2.
pub(crate) fn exit_not_found(message: &str, json: bool) -> ! {
    if json {
        println!("{}", json_error(message));
    } else {
        eprintln!("{message}");
    }
    process::exit(2);
}

pub(crate) fn no_neg_zero(v: f64) -> f64 {
    if v == 0.0 { 0.0 } else { v }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_day_names_and_numbers() {
        assert_eq!(parse_day("monday").unwrap(), 0);
        assert_eq!(parse_day("Tue").unwrap(), 1);
        assert_eq!(parse_day(" SUNDAY ").unwrap(), 6);
        assert_eq!(parse_day("4").unwrap(), 4);
    }

    #[test]
    fn test_parse_day_invalid() {
        assert!(parse_day("someday").is_err());
        assert!(parse_day("7").is_err());
        assert!(parse_day("").is_err());
    }

    #[test]
    fn test_json_error_escapes() {
        assert_eq!(json_error("Recipe \"x\" not found"), r#"{"error":"Recipe \"x\" not found"}"#);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello world this is long", 10), "hello w...");
    }

    #[test]
    fn test_truncate_utf8() {
        assert_eq!(truncate("Crème fraîche", 10), "Crème f...");
        assert_eq!(truncate("Müsli", 10), "Müsli");
    }

    #[test]
    fn test_no_neg_zero() {
        assert_eq!(no_neg_zero(-0.0).to_bits(), 0.0_f64.to_bits());
        assert!((no_neg_zero(5.0) - 5.0).abs() < f64::EPSILON);
    }
}
