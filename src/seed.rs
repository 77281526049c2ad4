//! Resource seeding from a JSON file: an array of resource definitions that
//! are created if absent and updated in place otherwise. Replaces ad-hoc
//! database init scripts; the binary runs it when `SLOTBOOK_SEED` is set.

use std::io;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::engine::{Engine, EngineError};
use crate::model::{BookingConfig, Resource, SlotTime};

/// One resource definition in a seed file. Only id and name are required;
/// everything else falls back to the stock hourly 09:00–17:00 setup.
#[derive(Debug, Deserialize)]
pub struct SeedResource {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default = "default_config")]
    pub config: BookingConfig,
}

fn default_active() -> bool {
    true
}

fn default_config() -> BookingConfig {
    BookingConfig {
        duration_min: 60,
        start: SlotTime::from_minutes(9 * 60).expect("09:00 is a valid time"),
        end: SlotTime::from_minutes(17 * 60).expect("17:00 is a valid time"),
    }
}

impl From<SeedResource> for Resource {
    fn from(seed: SeedResource) -> Self {
        Resource {
            id: seed.id,
            name: seed.name,
            description: seed.description,
            is_active: seed.is_active,
            config: seed.config,
        }
    }
}

#[derive(Debug)]
pub enum SeedError {
    Io(io::Error),
    Parse(serde_json::Error),
    Engine(EngineError),
}

impl std::fmt::Display for SeedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SeedError::Io(e) => write!(f, "seed file error: {e}"),
            SeedError::Parse(e) => write!(f, "seed parse error: {e}"),
            SeedError::Engine(e) => write!(f, "seed apply error: {e}"),
        }
    }
}

impl std::error::Error for SeedError {}

impl From<io::Error> for SeedError {
    fn from(e: io::Error) -> Self {
        SeedError::Io(e)
    }
}

impl From<serde_json::Error> for SeedError {
    fn from(e: serde_json::Error) -> Self {
        SeedError::Parse(e)
    }
}

impl From<EngineError> for SeedError {
    fn from(e: EngineError) -> Self {
        SeedError::Engine(e)
    }
}

/// Create-or-update every resource listed in the seed file. Returns the
/// number of resources applied.
pub async fn apply_seed(engine: &Engine, path: &Path) -> Result<usize, SeedError> {
    let raw = std::fs::read_to_string(path)?;
    let seeds: Vec<SeedResource> = serde_json::from_str(&raw)?;

    let mut applied = 0;
    for seed in seeds {
        let resource = Resource::from(seed);
        if engine.get_resource(&resource.id).is_none() {
            info!("seeding resource {}", resource.id);
            engine.create_resource(resource).await?;
        } else {
            info!("updating seeded resource {}", resource.id);
            engine
                .update_resource(
                    &resource.id,
                    resource.name,
                    resource.description,
                    resource.is_active,
                    resource.config,
                )
                .await?;
        }
        applied += 1;
    }
    Ok(applied)
}
