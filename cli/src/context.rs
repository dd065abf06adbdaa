use anyhow::Result;

use nutrilog_core::models::User;
use nutrilog_core::service::NutriService;

use crate::config::Config;
use crate::ninjas::{self, NutritionClient, RecipeClient};

/// Everything a command needs, built once in `main`.
pub struct AppContext {
    pub config: Config,
    pub service: NutriService,
    http: reqwest::Client,
}

impl AppContext {
    pub fn new(config: Config) -> Result<Self> {
        let service = NutriService::new(&config.db_path)?;
        let http = ninjas::build_transport()?;
        Ok(Self {
            config,
            service,
            http,
        })
    }

    /// Errors when no API key is configured, so only remote commands fail on it.
    pub fn nutrition_client(&self) -> Result<NutritionClient> {
        Ok(NutritionClient::new(
            self.http.clone(),
            &self.config.nutrition_base_url,
            self.config.nutrition_api_key()?,
        ))
    }

    pub fn recipe_client(&self) -> Result<RecipeClient> {
        Ok(RecipeClient::new(
            self.http.clone(),
            &self.config.recipe_base_url,
            self.config.recipe_api_key()?,
        ))
    }

    pub fn active_user(&self) -> Result<User> {
        self.service.require_active_user()
    }
}
