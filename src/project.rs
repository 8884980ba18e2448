//! Caller-supplied project metadata, bound as `Project` in every expression
//! and reachable through the accessors on `this`.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectInfo {
    /// Module name
    pub name: String,
    /// Module description
    pub desc: String,
    pub product: ProductInfo,
    pub version: VersionInfo,
    pub depends: DependsContainer,
    pub modules: IndexMap<String, ModuleInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProductInfo {
    pub name: String,
    pub code_name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub desc: String,
    pub background: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VersionInfo {
    pub name: String,
    pub desc: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleInfo {
    pub name: String,
    pub desc: String,
}

/// Dependency groups, keyed by group name in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DependsContainer {
    pub current: IndexMap<String, DependGroup>,
    pub group: IndexMap<String, DependGroup>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DependGroup {
    pub name: String,
    pub desc: String,
    pub depends: Depends,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Depends {
    pub plugin: Vec<Dependency>,
    pub default: Vec<Dependency>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Dependency {
    pub name: String,
    pub version: String,
    pub desc: String,
    pub metadata: IndexMap<String, serde_json::Value>,
}

impl ProjectInfo {
    /// Parses project metadata from its JSON form.
    pub fn from_json(content: &str) -> crate::error::Result<Self> {
        serde_json::from_str(content).map_err(crate::error::Error::from_json)
    }

    /// Regular dependencies of the named current groups.
    /// With no names, the first declared current group is used.
    pub fn current_depends(&self, groups: &[String]) -> Vec<Dependency> {
        self.collect_current(groups, |group| &group.depends.default)
    }

    /// Plugin dependencies of the named current groups.
    /// With no names, the first declared current group is used.
    pub fn current_plugin_depends(&self, groups: &[String]) -> Vec<Dependency> {
        self.collect_current(groups, |group| &group.depends.plugin)
    }

    pub fn depend_group(&self, name: &str) -> Option<&DependGroup> {
        self.depends.group.get(name)
    }

    fn collect_current<F>(&self, groups: &[String], pick: F) -> Vec<Dependency>
    where
        F: Fn(&DependGroup) -> &Vec<Dependency>,
    {
        let selected: Vec<&DependGroup> = if groups.is_empty() {
            self.depends.current.values().take(1).collect()
        } else {
            groups.iter().filter_map(|name| self.depends.current.get(name)).collect()
        };
        selected.into_iter().flat_map(|group| pick(group).iter().cloned()).collect()
    }
}
