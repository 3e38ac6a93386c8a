#![allow(dead_code)]

use std::collections::BTreeMap;

use wavesched::config::{ConfigFile, OwnershipSection, RawConcurrencySection, RawConfigFile};
use wavesched::types::TaskDescriptor;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                concurrency: RawConcurrencySection {
                    default_limit: 0,
                    tiers: BTreeMap::new(),
                },
                ownership: OwnershipSection::default(),
                logging: Default::default(),
            },
        }
    }

    pub fn default_limit(mut self, limit: i64) -> Self {
        self.config.concurrency.default_limit = limit;
        self
    }

    pub fn tier_limit(mut self, tier: &str, limit: i64) -> Self {
        self.config.concurrency.tiers.insert(tier.to_string(), limit);
        self
    }

    pub fn reserved(mut self, pattern: &str) -> Self {
        self.config.ownership.reserved.push(pattern.to_string());
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskDescriptor`.
pub struct TaskBuilder {
    task: TaskDescriptor,
}

impl TaskBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            task: TaskDescriptor::new(id, 1, "default"),
        }
    }

    pub fn wave(mut self, wave: u32) -> Self {
        self.task.wave = wave;
        self
    }

    pub fn tier(mut self, tier: &str) -> Self {
        self.task.tier = tier.to_string();
        self
    }

    pub fn file(mut self, path: &str) -> Self {
        self.task.files.push(path.to_string());
        self
    }

    pub fn build(self) -> TaskDescriptor {
        self.task
    }
}

/// Shorthand for a list of `(id, wave)` tasks on the default tier.
pub fn tasks(entries: &[(&str, u32)]) -> Vec<TaskDescriptor> {
    entries.iter()
        .map(|(id, wave)| TaskBuilder::new(id).wave(*wave).build())
        .collect()
}

/// Ids of a task slice, in slice order.
pub fn ids<'a, I>(tasks: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a TaskDescriptor>,
{
    tasks.into_iter().map(|t| t.id.clone()).collect()
}
