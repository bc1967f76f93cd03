//! Module selection: which metric groups a probe collects and which
//! upstream calls that requires.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use tracing::warn;

/// A named group of metrics a probe can opt into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Module {
    ProcessStats,
    NetworkStats,
    DirectoryInfo,
    JobQueue,
    SystemInfo,
    Temperature,
}

impl Module {
    pub const ALL: [Module; 6] = [
        Module::ProcessStats,
        Module::NetworkStats,
        Module::DirectoryInfo,
        Module::JobQueue,
        Module::SystemInfo,
        Module::Temperature,
    ];

    /// Name used in the `modules` query parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            Module::ProcessStats => "process_stats",
            Module::NetworkStats => "network_stats",
            Module::DirectoryInfo => "directory_info",
            Module::JobQueue => "job_queue",
            Module::SystemInfo => "system_info",
            Module::Temperature => "temperature",
        }
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown module '{0}'")]
pub struct UnknownModule(pub String);

impl FromStr for Module {
    type Err = UnknownModule;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Module::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| UnknownModule(s.to_string()))
    }
}

/// One upstream call plus the mapping that consumes it.
///
/// `process_stats` and `network_stats` share [`Branch::Stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Branch {
    Stats,
    Directory,
    JobQueue,
    SystemInfo,
    Temperature,
}

impl Branch {
    pub fn as_str(&self) -> &'static str {
        match self {
            Branch::Stats => "proc_stats",
            Branch::Directory => "directory_info",
            Branch::JobQueue => "job_queue",
            Branch::SystemInfo => "system_info",
            Branch::Temperature => "temperature",
        }
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The set of modules requested for one probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSet {
    modules: BTreeSet<Module>,
}

impl ModuleSet {
    pub fn new(modules: impl IntoIterator<Item = Module>) -> Self {
        Self {
            modules: modules.into_iter().collect(),
        }
    }

    /// Parse module names, skipping unknown ones with a warning.
    pub fn parse<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut modules = BTreeSet::new();
        for name in names {
            match name.as_ref().parse::<Module>() {
                Ok(module) => {
                    modules.insert(module);
                }
                Err(e) => warn!(module = name.as_ref(), "{}, ignoring", e),
            }
        }
        Self { modules }
    }

    pub fn contains(&self, module: Module) -> bool {
        self.modules.contains(&module)
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = Module> + '_ {
        self.modules.iter().copied()
    }

    /// Upstream branches needed for this set, in collection order.
    ///
    /// The stats branch appears once even when both stats modules are
    /// selected; every other module maps to its own branch.
    pub fn branches(&self) -> Vec<Branch> {
        let mut branches = Vec::with_capacity(5);
        if self.contains(Module::ProcessStats) || self.contains(Module::NetworkStats) {
            branches.push(Branch::Stats);
        }
        if self.contains(Module::DirectoryInfo) {
            branches.push(Branch::Directory);
        }
        if self.contains(Module::JobQueue) {
            branches.push(Branch::JobQueue);
        }
        if self.contains(Module::SystemInfo) {
            branches.push(Branch::SystemInfo);
        }
        if self.contains(Module::Temperature) {
            branches.push(Branch::Temperature);
        }
        branches
    }
}

impl Default for ModuleSet {
    /// `process_stats`, `job_queue` and `system_info`.
    fn default() -> Self {
        Self::new([Module::ProcessStats, Module::JobQueue, Module::SystemInfo])
    }
}

impl fmt::Display for ModuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(|m| m.as_str()).collect();
        write!(f, "[{}]", names.join(", "))
    }
}
