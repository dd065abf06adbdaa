use serde::{Deserialize, Serialize};

use crate::models::{Food, Recipe};

/// Envelope returned by the nutrition endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NutritionResponse {
    pub items: Vec<NutritionItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutritionItem {
    pub name: String,
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
}

/// One element of the recipe endpoint's top-level array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeItem {
    pub title: String,
    pub ingredients: String,
    pub servings: String,
    pub instructions: String,
}

/// Build an unsaved `Food` from a nutrition item, scaling every nutrient from the
/// item's serving size to `requested_quantity_g`.
#[must_use]
pub fn nutrition_to_food(
    item: &NutritionItem,
    user_id: i64,
    original_query: &str,
    requested_quantity_g: f64,
    added_at: i64,
) -> Food {
    let factor = if item.serving_size_g > 0.0 {
        requested_quantity_g / item.serving_size_g
    } else {
        1.0
    };

    Food {
        id: 0,
        user_id,
        name: item.name.clone(),
        original_query: original_query.to_string(),
        requested_quantity_g,
        calories: item.calories * factor,
        serving_size_g: item.serving_size_g,
        fat_total_g: item.fat_total_g * factor,
        fat_saturated_g: item.fat_saturated_g * factor,
        protein_g: item.protein_g * factor,
        sodium_mg: item.sodium_mg * factor,
        potassium_mg: item.potassium_mg * factor,
        cholesterol_mg: item.cholesterol_mg * factor,
        carbohydrates_total_g: item.carbohydrates_total_g * factor,
        fiber_g: item.fiber_g * factor,
        sugar_g: item.sugar_g * factor,
        added_at,
        is_favorite: false,
        consumed_at: None,
    }
}

#[must_use]
pub fn recipe_item_to_recipe(
    item: &RecipeItem,
    user_id: i64,
    search_query: &str,
    added_at: i64,
) -> Recipe {
    Recipe {
        id: 0,
        user_id,
        title: item.title.clone(),
        ingredients: item.ingredients.clone(),
        servings: item.servings.clone(),
        instructions: item.instructions.clone(),
        search_query: search_query.to_string(),
        added_at,
        is_favorite: false,
    }
}
