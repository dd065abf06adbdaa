//! Process-level hooks: first-run setup and memory pressure notifications.

use std::fmt;

use anyhow::Result;
use tracing::{error, info, warn};

use crate::models::{MealType, now_millis};
use crate::service::{
    DEFAULT_MEAL_TYPE_KEY, DEFAULT_QUANTITY_G, DEFAULT_QUANTITY_KEY, FIRST_RUN_KEY, NutriService,
};

/// How hard the host is asking the process to give memory back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrimLevel {
    Background,
    Moderate,
    Complete,
    RunningLow,
    RunningCritical,
}

impl fmt::Display for TrimLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TrimLevel::Background => "background",
            TrimLevel::Moderate => "moderate",
            TrimLevel::Complete => "complete",
            TrimLevel::RunningLow => "running_low",
            TrimLevel::RunningCritical => "running_critical",
        };
        f.write_str(name)
    }
}

/// Run once at startup. Writes default preferences the first time the store is
/// seen and returns whether it did. Failures are logged, never propagated.
pub fn on_create(service: &NutriService) -> bool {
    match first_run_setup(service) {
        Ok(ran) => ran,
        Err(e) => {
            error!(error = %format!("{e:#}"), "first-run setup failed");
            false
        }
    }
}

fn first_run_setup(service: &NutriService) -> Result<bool> {
    if service.preference(FIRST_RUN_KEY)?.is_some() {
        return Ok(false);
    }

    service.set_preference(DEFAULT_QUANTITY_KEY, &DEFAULT_QUANTITY_G.to_string())?;
    service.set_preference(DEFAULT_MEAL_TYPE_KEY, MealType::Breakfast.as_str())?;
    service.set_preference(FIRST_RUN_KEY, &now_millis().to_string())?;
    info!("first-run setup complete");
    Ok(true)
}

pub fn on_low_memory() {
    warn!("system reported low memory");
}

pub fn on_trim_memory(level: TrimLevel) {
    warn!(%level, "system asked to trim memory");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_run_setup_runs_once() {
        let svc = NutriService::new_in_memory().unwrap();
        assert!(on_create(&svc));
        assert_eq!(
            svc.preference(DEFAULT_MEAL_TYPE_KEY).unwrap().as_deref(),
            Some("breakfast")
        );
        assert!((svc.default_quantity_g().unwrap() - 100.0).abs() < f64::EPSILON);
        let stamp = svc.preference(FIRST_RUN_KEY).unwrap().unwrap();

        assert!(!on_create(&svc));
        assert_eq!(svc.preference(FIRST_RUN_KEY).unwrap().unwrap(), stamp);
    }

    #[test]
    fn test_first_run_keeps_user_changes() {
        let svc = NutriService::new_in_memory().unwrap();
        on_create(&svc);
        svc.set_preference(DEFAULT_MEAL_TYPE_KEY, "dinner").unwrap();
        on_create(&svc);
        assert_eq!(svc.default_meal_type().unwrap(), MealType::Dinner);
    }

    #[test]
    fn test_setup_errors_are_swallowed() {
        let svc = NutriService::new_in_memory().unwrap();
        svc.db().drop_preferences_for_test();
        assert!(!on_create(&svc));
    }

    #[test]
    fn test_memory_hooks_do_not_panic() {
        on_low_memory();
        for level in [
            TrimLevel::Background,
            TrimLevel::Moderate,
            TrimLevel::Complete,
            TrimLevel::RunningLow,
            TrimLevel::RunningCritical,
        ] {
            on_trim_memory(level);
        }
        assert_eq!(TrimLevel::RunningCritical.to_string(), "running_critical");
    }
}
