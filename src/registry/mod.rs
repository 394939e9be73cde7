//! Source registry: the static list of sources the router selects from.
//!
//! Descriptors come from two places: a built-in default set and optional
//! JSON files in a registry directory (one descriptor per file). Directory
//! entries override built-ins with the same id. The registry is loaded once
//! at startup and immutable afterwards.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use tracing::{info, warn};

use crate::common::constants;
use crate::common::error::{EngineError, Result};
use crate::domain::{EventCategory, SourceDescriptor, SpeedTier};

#[derive(Clone, Default)]
pub struct SourceRegistry {
    sources: HashMap<String, SourceDescriptor>,
}

impl SourceRegistry {
    /// Registry containing only the built-in descriptors.
    pub fn with_builtins() -> Self {
        Self::from_descriptors(builtin_descriptors())
    }

    /// Registry over an explicit descriptor set.
    pub fn from_descriptors(descriptors: Vec<SourceDescriptor>) -> Self {
        let mut sources = HashMap::new();
        for descriptor in descriptors {
            sources.insert(descriptor.id.clone(), descriptor);
        }
        Self { sources }
    }

    /// Load descriptor files from the registry directory on top of the
    /// built-in set. A missing directory is not an error; unreadable files
    /// are skipped with a warning.
    pub fn load<P: AsRef<Path>>(registry_dir: P) -> Self {
        let mut registry = Self::with_builtins();
        let dir_path = registry_dir.as_ref();
        if !dir_path.exists() {
            info!(dir = %dir_path.display(), builtin = registry.len(), "no registry directory; using built-in sources");
            return registry;
        }
        match registry.merge_directory(dir_path) {
            Ok(loaded) => {
                info!(dir = %dir_path.display(), loaded, total = registry.len(), "source registry loaded");
            }
            Err(e) => {
                warn!(dir = %dir_path.display(), error = %e, "failed to read registry directory; using built-in sources");
            }
        }
        registry
    }

    /// Load only from the directory, erroring when it does not exist.
    pub fn load_from_directory<P: AsRef<Path>>(registry_dir: P) -> Result<Self> {
        let dir_path = registry_dir.as_ref();
        if !dir_path.exists() {
            return Err(EngineError::Config(format!(
                "Registry directory does not exist: {}",
                dir_path.display()
            )));
        }
        let mut registry = Self::default();
        registry.merge_directory(dir_path)?;
        Ok(registry)
    }

    fn merge_directory(&mut self, dir_path: &Path) -> Result<usize> {
        let mut loaded = 0;
        for entry in fs::read_dir(dir_path)? {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            let content = fs::read_to_string(&path)?;
            match serde_json::from_str::<SourceDescriptor>(&content) {
                Ok(descriptor) => {
                    self.sources.insert(descriptor.id.clone(), descriptor);
                    loaded += 1;
                }
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "skipping unparseable source descriptor");
                }
            }
        }
        Ok(loaded)
    }

    pub fn get(&self, source_id: &str) -> Option<&SourceDescriptor> {
        self.sources.get(source_id)
    }

    /// All descriptors, ordered by priority then id for stable output.
    pub fn descriptors(&self) -> Vec<SourceDescriptor> {
        let mut all: Vec<SourceDescriptor> = self.sources.values().cloned().collect();
        all.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));
        all
    }

    /// Declared priority per source id, consumed by the dedup merge.
    pub fn priorities(&self) -> HashMap<String, u32> {
        self.sources
            .iter()
            .map(|(id, d)| (id.clone(), d.priority))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

fn descriptor(
    id: &str,
    display_name: &str,
    regions: &[&str],
    categories: &[EventCategory],
    speed_tier: SpeedTier,
    enabled_by_default: bool,
    priority: u32,
    endpoint_template: Option<&str>,
) -> SourceDescriptor {
    SourceDescriptor {
        id: id.to_string(),
        display_name: display_name.to_string(),
        supported_regions: regions.iter().map(|s| s.to_string()).collect(),
        supported_categories: categories.to_vec(),
        speed_tier,
        enabled_by_default,
        priority,
        endpoint_template: endpoint_template.map(|s| s.to_string()),
    }
}

/// The built-in source set. Registry files with the same id override these.
pub fn builtin_descriptors() -> Vec<SourceDescriptor> {
    use EventCategory::*;
    vec![
        descriptor(
            constants::EVENTBRITE_SOURCE,
            "Eventbrite",
            &[constants::GLOBAL_REGION],
            &[General],
            SpeedTier::Fast,
            true,
            1,
            Some("https://www.eventbrite.com/d/{country}--{city}/all-events/"),
        ),
        descriptor(
            constants::MEETUP_SOURCE,
            "Meetup",
            &[constants::GLOBAL_REGION],
            &[General, Tech],
            SpeedTier::Medium,
            true,
            2,
            Some("https://www.meetup.com/find/?location={country}--{city}"),
        ),
        descriptor(
            constants::TICKETMASTER_SOURCE,
            "Ticketmaster",
            &[constants::GLOBAL_REGION],
            &[Music, Sports, Theatre, General],
            SpeedTier::Medium,
            true,
            3,
            Some("https://www.ticketmaster.com/discover/{city}"),
        ),
        descriptor(
            constants::SONGKICK_SOURCE,
            "Songkick",
            &[constants::GLOBAL_REGION],
            &[Music],
            SpeedTier::Fast,
            false,
            4,
            Some("https://www.songkick.com/metro-areas/{city}"),
        ),
        descriptor(
            constants::DICE_SOURCE,
            "DICE",
            &[constants::GLOBAL_REGION],
            &[Music],
            SpeedTier::Fast,
            false,
            5,
            Some("https://dice.fm/browse/{city}"),
        ),
        descriptor(
            constants::RESIDENT_ADVISOR_SOURCE,
            "Resident Advisor",
            &[constants::GLOBAL_REGION],
            &[Nightlife],
            SpeedTier::Slow,
            false,
            6,
            Some("https://ra.co/events/{country}/{city}"),
        ),
        descriptor(
            constants::ENTRADIUM_SOURCE,
            "Entradium",
            &["España", "ES"],
            &[Music, Theatre, General],
            SpeedTier::Medium,
            true,
            2,
            Some("https://entradium.com/es/events/{city}"),
        ),
        descriptor(
            constants::TICKETEK_SOURCE,
            "Ticketek",
            &["Argentina", "AR"],
            &[Music, Sports, Theatre, General],
            SpeedTier::Medium,
            true,
            2,
            Some("https://www.ticketek.com.ar/{city}"),
        ),
        descriptor(
            constants::FIXTURELIST_SOURCE,
            "Fixturelist",
            &[constants::GLOBAL_REGION],
            &[Sports],
            SpeedTier::Slow,
            false,
            7,
            None,
        ),
        descriptor(
            constants::TIMEOUT_CITY_SOURCE,
            "Time Out",
            &[constants::GLOBAL_REGION],
            &[General],
            SpeedTier::Slow,
            true,
            8,
            Some("https://www.timeout.com/{city}/things-to-do"),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_cover_every_known_source_id() {
        let registry = SourceRegistry::with_builtins();
        for id in constants::builtin_source_ids() {
            assert!(registry.get(id).is_some(), "missing builtin {id}");
        }
    }

    #[test]
    fn directory_entries_override_builtins() {
        let dir = tempfile::tempdir().unwrap();
        let overridden = serde_json::json!({
            "id": "eventbrite",
            "display_name": "Eventbrite (patched)",
            "supported_regions": ["global"],
            "supported_categories": ["general"],
            "priority": 99
        });
        std::fs::write(
            dir.path().join("eventbrite.json"),
            serde_json::to_string_pretty(&overridden).unwrap(),
        )
        .unwrap();

        let registry = SourceRegistry::load(dir.path());
        let descriptor = registry.get("eventbrite").unwrap();
        assert_eq!(descriptor.display_name, "Eventbrite (patched)");
        assert_eq!(descriptor.priority, 99);
        // other builtins survive the merge
        assert!(registry.get("meetup").is_some());
    }

    #[test]
    fn missing_directory_falls_back_to_builtins() {
        let registry = SourceRegistry::load("/definitely/not/here");
        assert!(!registry.is_empty());
        assert!(SourceRegistry::load_from_directory("/definitely/not/here").is_err());
    }

    #[test]
    fn unparseable_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.json"), "{not json").unwrap();
        let registry = SourceRegistry::load(dir.path());
        assert_eq!(registry.len(), SourceRegistry::with_builtins().len());
    }
}
