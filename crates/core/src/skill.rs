//! Skill definitions consumed by the builtin skill library.

use serde::{Deserialize, Serialize};

/// A named attachment of a skill, fetched on demand by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillResource {
    pub name: String,

    #[serde(default)]
    pub description: String,

    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skill {
    pub id: String,
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Full instruction text, disclosed only when asked for
    #[serde(default)]
    pub instructions: String,

    #[serde(default)]
    pub resources: Vec<SkillResource>,
}

impl Skill {
    pub fn resource(&self, name: &str) -> Option<&SkillResource> {
        self.resources
            .iter()
            .find(|r| r.name == name)
            .or_else(|| self.resources.iter().find(|r| r.name.eq_ignore_ascii_case(name)))
    }
}
