mod food;
mod helpers;
mod plan;
mod recipe;
mod user;

pub(crate) use food::{
    cmd_food_delete, cmd_food_eat, cmd_food_favorite, cmd_food_list, cmd_food_search,
};
pub(crate) use plan::{cmd_plan_add, cmd_plan_clear, cmd_plan_remove, cmd_plan_show};
pub(crate) use recipe::{
    cmd_recipe_delete, cmd_recipe_favorite, cmd_recipe_list, cmd_recipe_search, cmd_recipe_show,
    cmd_recipe_watch,
};
pub(crate) use user::{cmd_user_list, cmd_user_login, cmd_user_register, cmd_user_whoami};
