//! Builtin skill library: one tool per selected skill.
//!
//! Skills are disclosed progressively. The model asks for a `section`
//! (`overview`, `instructions`, `resources_index`, or a single `resource`)
//! instead of receiving the whole skill text up front.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use toolrelay_core::error::ToolError;
use toolrelay_core::skill::Skill;
use toolrelay_core::tool::{ToolCatalogEntry, ToolKind};

use crate::catalog::ToolInvoker;

pub const SECTIONS: [&str; 4] = ["overview", "instructions", "resources_index", "resource"];

/// Catalog entries for the selected skills, each paired with its invoker.
pub fn skill_tools(skills: &[Skill]) -> Vec<(ToolCatalogEntry, Arc<dyn ToolInvoker>)> {
    skills
        .iter()
        .map(|skill| {
            let entry = ToolCatalogEntry {
                remote_name: format!("skill_{}", skill.id),
                input_schema: parameters_schema(),
                description: describe(skill),
                kind: ToolKind::BuiltinSkill,
            };
            let invoker: Arc<dyn ToolInvoker> = Arc::new(SkillInvoker {
                skill: Arc::new(skill.clone()),
            });
            (entry, invoker)
        })
        .collect()
}

fn describe(skill: &Skill) -> String {
    let summary = if skill.description.trim().is_empty() {
        String::new()
    } else {
        format!(": {}", skill.description.trim())
    };
    format!(
        "Skill '{}'{summary}. Read it progressively: start with section=overview, then \
         instructions, resources_index, or section=resource with a resource name.",
        skill.name
    )
}

fn parameters_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "section": {
                "type": "string",
                "enum": SECTIONS,
                "description": "Which part of the skill to read (default overview)"
            },
            "resource": {
                "type": "string",
                "description": "Resource name, required when section is 'resource'"
            }
        },
        "required": ["section"]
    })
}

/// Render one section of a skill.
pub fn read_section(skill: &Skill, arguments: &Value) -> Result<String, ToolError> {
    let section = arguments["section"].as_str().unwrap_or("overview");
    match section {
        "overview" => Ok(overview(skill)),
        "instructions" => Ok(if skill.instructions.trim().is_empty() {
            format!("Skill '{}' has no instructions.", skill.name)
        } else {
            skill.instructions.clone()
        }),
        "resources_index" => Ok(resources_index(skill)),
        "resource" => {
            let name = arguments["resource"]
                .as_str()
                .filter(|n| !n.trim().is_empty())
                .ok_or_else(|| ToolError::InvalidArguments("Missing 'resource' argument".into()))?;
            skill
                .resource(name.trim())
                .map(|r| r.content.clone())
                .ok_or_else(|| {
                    let available: Vec<&str> = skill.resources.iter().map(|r| r.name.as_str()).collect();
                    ToolError::InvalidArguments(format!(
                        "Unknown resource '{name}'. Available: {}",
                        if available.is_empty() { "(none)".to_string() } else { available.join(", ") }
                    ))
                })
        }
        other => Err(ToolError::InvalidArguments(format!(
            "Unknown section '{other}'. Expected one of: {}",
            SECTIONS.join(", ")
        ))),
    }
}

fn overview(skill: &Skill) -> String {
    let mut out = format!("# {}\n", skill.name);
    if !skill.description.trim().is_empty() {
        out.push_str(&format!("{}\n", skill.description.trim()));
    }
    out.push_str(&format!(
        "\nInstructions: {} characters (section=instructions)\n",
        skill.instructions.chars().count()
    ));
    out.push_str(&format!(
        "Resources: {} (section=resources_index)\n",
        skill.resources.len()
    ));
    out
}

fn resources_index(skill: &Skill) -> String {
    if skill.resources.is_empty() {
        return format!("Skill '{}' has no resources.", skill.name);
    }
    skill
        .resources
        .iter()
        .map(|r| {
            let chars = r.content.chars().count();
            if r.description.trim().is_empty() {
                format!("- {} ({chars} chars)", r.name)
            } else {
                format!("- {}: {} ({chars} chars)", r.name, r.description.trim())
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct SkillInvoker {
    skill: Arc<Skill>,
}

#[async_trait]
impl ToolInvoker for SkillInvoker {
    async fn invoke(&self, arguments: Value, _cancel: &CancellationToken) -> Result<Value, ToolError> {
        read_section(&self.skill, &arguments).map(Value::String)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolrelay_core::skill::SkillResource;

    fn skill() -> Skill {
        Skill {
            id: "triage".into(),
            name: "Bug triage".into(),
            description: "Sorts incoming bugs".into(),
            instructions: "Label by severity.".into(),
            resources: vec![SkillResource {
                name: "labels.md".into(),
                description: "Label glossary".into(),
                content: "P0: outage".into(),
            }],
        }
    }

    #[test]
    fn one_tool_per_skill() {
        let tools = skill_tools(&[skill()]);
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].0.remote_name, "skill_triage");
        assert_eq!(tools[0].0.kind, ToolKind::BuiltinSkill);
        assert!(tools[0].0.description.contains("Bug triage"));
    }

    #[test]
    fn sections_disclose_progressively() {
        let skill = skill();
        let overview = read_section(&skill, &json!({"section": "overview"})).unwrap();
        assert!(overview.contains("Bug triage"));
        assert!(!overview.contains("Label by severity."));

        assert_eq!(read_section(&skill, &json!({"section": "instructions"})).unwrap(), "Label by severity.");
        assert!(read_section(&skill, &json!({"section": "resources_index"})).unwrap().contains("labels.md: Label glossary"));
        assert_eq!(
            read_section(&skill, &json!({"section": "resource", "resource": "labels.md"})).unwrap(),
            "P0: outage"
        );
    }

    #[test]
    fn missing_section_defaults_to_overview() {
        let text = read_section(&skill(), &json!({})).unwrap();
        assert!(text.starts_with("# Bug triage"));
    }

    #[test]
    fn bad_resource_lists_available() {
        let err = read_section(&skill(), &json!({"section": "resource", "resource": "nope"})).unwrap_err();
        assert!(err.to_string().contains("labels.md"));
        assert!(read_section(&skill(), &json!({"section": "resource"})).is_err());
        assert!(read_section(&skill(), &json!({"section": "everything"})).is_err());
    }
}
