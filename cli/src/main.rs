mod commands;
mod config;
mod context;
mod ninjas;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process;
use tracing_subscriber::EnvFilter;

use crate::commands::{
    cmd_food_delete, cmd_food_eat, cmd_food_favorite, cmd_food_list, cmd_food_search,
    cmd_plan_add, cmd_plan_clear, cmd_plan_remove, cmd_plan_show, cmd_recipe_delete,
    cmd_recipe_favorite, cmd_recipe_list, cmd_recipe_search, cmd_recipe_show, cmd_recipe_watch,
    cmd_user_list,
    cmd_user_login, cmd_user_register, cmd_user_whoami,
};
use crate::config::Config;
use crate::context::AppContext;
use nutrilog_core::lifecycle;

#[derive(Parser)]
#[command(
    name = "nutrilog",
    version,
    about = "Look up nutrition facts and recipes, and plan your week of meals"
)]
struct Cli {
    /// Log at debug level, including full HTTP request/response bodies
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register, sign in and list accounts
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
    /// Look up nutrition facts and manage saved foods
    Food {
        #[command(subcommand)]
        command: FoodCommands,
    },
    /// Search, save and manage recipes
    Recipe {
        #[command(subcommand)]
        command: RecipeCommands,
    },
    /// Weekly meal plan
    Plan {
        #[command(subcommand)]
        command: PlanCommands,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Create an account (password is read from stdin) and sign in
    Register {
        /// Email address
        email: String,
        #[arg(long)]
        first_name: Option<String>,
        #[arg(long)]
        last_name: Option<String>,
        #[arg(long)]
        age: Option<i64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Sign in (password is read from stdin)
    Login {
        /// Email address
        email: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List registered accounts
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the signed-in account
    Whoami {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum FoodCommands {
    /// Look up nutrition facts (e.g. "2 eggs and toast")
    Search {
        /// Free-text query
        query: String,
        /// Quantity in grams to scale nutrients to (default: preference, 100g)
        #[arg(short, long)]
        quantity: Option<f64>,
        /// Show results without saving them
        #[arg(long)]
        no_save: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List saved foods, newest first
    List {
        /// Only favorites
        #[arg(long)]
        favorites: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Toggle a food's favorite flag
    Favorite {
        /// Food ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Mark a food as eaten now
    Eat {
        /// Food ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a saved food
    Delete {
        /// Food ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum RecipeCommands {
    /// Search recipes online; results are previews until saved
    Search {
        /// Free-text query
        query: String,
        /// Save result number N (as shown in the # column)
        #[arg(long, value_name = "N")]
        save: Option<usize>,
        /// Choose a result to save interactively
        #[arg(long, conflicts_with = "save")]
        pick: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List saved recipes, newest first
    List {
        /// Only favorites
        #[arg(long)]
        favorites: bool,
        /// Keep the list open and redraw it when recipes change
        #[arg(long, conflicts_with = "json")]
        watch: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a saved recipe in full
    Show {
        /// Recipe ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Toggle a recipe's favorite flag
    Favorite {
        /// Recipe ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a saved recipe and its meal plan slots
    Delete {
        /// Recipe ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum PlanCommands {
    /// Put a saved recipe into a weekly slot
    Add {
        /// Recipe ID
        recipe_id: i64,
        /// Day: monday-sunday, mon-sun, or 0-6 (0 = Monday)
        #[arg(short, long)]
        day: String,
        /// Meal type: breakfast, lunch, dinner, snack (default: preference)
        #[arg(short, long)]
        meal: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the week, or one day
    Show {
        /// Day: monday-sunday, mon-sun, or 0-6
        #[arg(short, long)]
        day: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove one slot by ID
    Remove {
        /// Meal plan ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove every slot
    Clear {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("nutrilog={level},nutrilog_core={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let ctx = AppContext::new(config)?;
    lifecycle::on_create(&ctx.service);

    match cli.command {
        Commands::User { command } => match command {
            UserCommands::Register {
                email,
                first_name,
                last_name,
                age,
                json,
            } => cmd_user_register(
                &ctx,
                &email,
                first_name.as_deref(),
                last_name.as_deref(),
                age,
                json,
            ),
            UserCommands::Login { email, json } => cmd_user_login(&ctx, &email, json),
            UserCommands::List { json } => cmd_user_list(&ctx, json),
            UserCommands::Whoami { json } => cmd_user_whoami(&ctx, json),
        },
        Commands::Food { command } => match command {
            FoodCommands::Search {
                query,
                quantity,
                no_save,
                json,
            } => cmd_food_search(&ctx, &query, quantity, no_save, json).await,
            FoodCommands::List { favorites, json } => cmd_food_list(&ctx, favorites, json),
            FoodCommands::Favorite { id, json } => cmd_food_favorite(&ctx, id, json),
            FoodCommands::Eat { id, json } => cmd_food_eat(&ctx, id, json),
            FoodCommands::Delete { id, json } => cmd_food_delete(&ctx, id, json),
        },
        Commands::Recipe { command } => match command {
            RecipeCommands::Search {
                query,
                save,
                pick,
                json,
            } => cmd_recipe_search(&ctx, &query, save, pick, json).await,
            RecipeCommands::List {
                favorites,
                watch: true,
                ..
            } => cmd_recipe_watch(&ctx, favorites).await,
            RecipeCommands::List {
                favorites, json, ..
            } => cmd_recipe_list(&ctx, favorites, json),
            RecipeCommands::Show { id, json } => cmd_recipe_show(&ctx, id, json),
            RecipeCommands::Favorite { id, json } => cmd_recipe_favorite(&ctx, id, json),
            RecipeCommands::Delete { id, json } => cmd_recipe_delete(&ctx, id, json),
        },
        Commands::Plan { command } => match command {
            PlanCommands::Add {
                recipe_id,
                day,
                meal,
                json,
            } => cmd_plan_add(&ctx, recipe_id, &day, meal.as_deref(), json),
            PlanCommands::Show { day, json } => cmd_plan_show(&ctx, day.as_deref(), json),
            PlanCommands::Remove { id, json } => cmd_plan_remove(&ctx, id, json),
            PlanCommands::Clear { json } => cmd_plan_clear(&ctx, json),
        },
    }
}
