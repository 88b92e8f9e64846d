//! Policy wiring.

use std::sync::Arc;

use verdant_core::BotConfig;
use verdant_networking::{ConnectionManager, SessionTask};

use crate::harvest::HarvestTask;
use crate::pets::PetCareTask;
use crate::shop::ShopTask;

/// The enabled policies, ready to run as session tasks.
#[derive(Debug, Default, Clone)]
pub struct AutomationEngine {
    harvest: Option<Arc<HarvestTask>>,
    pets: Option<Arc<PetCareTask>>,
    shop: Option<Arc<ShopTask>>,
}

impl AutomationEngine {
    /// Builds every policy the config switches on.
    #[must_use]
    pub fn from_config(config: &BotConfig) -> Self {
        let pet_care = &config.pet_food;
        Self {
            harvest: config
                .harvest
                .enabled
                .then(|| Arc::new(HarvestTask::new(config.harvest.clone()))),
            pets: (pet_care.enabled || pet_care.movement_enabled)
                .then(|| Arc::new(PetCareTask::new(pet_care.clone()))),
            shop: config.shop.enabled.then(|| Arc::new(ShopTask::new(config.shop.clone()))),
        }
    }

    /// Replaces the harvest policy.
    #[must_use]
    pub fn with_harvest(mut self, task: HarvestTask) -> Self {
        self.harvest = Some(Arc::new(task));
        self
    }

    /// Replaces the pet care policy.
    #[must_use]
    pub fn with_pets(mut self, task: PetCareTask) -> Self {
        self.pets = Some(Arc::new(task));
        self
    }

    /// Replaces the shop policy.
    #[must_use]
    pub fn with_shop(mut self, task: ShopTask) -> Self {
        self.shop = Some(Arc::new(task));
        self
    }

    /// Enabled policies as session tasks.
    #[must_use]
    pub fn tasks(&self) -> Vec<Arc<dyn SessionTask>> {
        let mut tasks: Vec<Arc<dyn SessionTask>> = Vec::new();
        if let Some(task) = &self.harvest {
            tasks.push(Arc::clone(task) as Arc<dyn SessionTask>);
        }
        if let Some(task) = &self.pets {
            tasks.push(Arc::clone(task) as Arc<dyn SessionTask>);
        }
        if let Some(task) = &self.shop {
            tasks.push(Arc::clone(task) as Arc<dyn SessionTask>);
        }
        tasks
    }

    /// True when every policy is switched off.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.harvest.is_none() && self.pets.is_none() && self.shop.is_none()
    }

    /// Registers every policy with `manager`; they start with the next session.
    pub fn install(&self, manager: &ConnectionManager) {
        for task in self.tasks() {
            tracing::info!("automation policy {} every {:?}", task.name(), task.interval());
            manager.register(task);
        }
    }
}
