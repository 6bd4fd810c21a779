//! Comparing a synthesis with the template saved by the previous one.
use std::collections::HashMap;

use crate::{Result, Synthesis, TemplateResource};

/// Property asking the secret store to generate a value. Any change to it
/// makes the store generate a new one.
const GENERATED_SECRET: &str = "GenerateSecretString";

/// What the provisioning engine is expected to do with a construct.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Action {
    /// Not in the previous template.
    Create,
    /// Properties changed, or a dependency is being created or replaced.
    Update,
    /// The resource type changed, so the old resource goes and a new one comes.
    Replace,
    /// Nothing changed.
    Keep,
    /// Only in the previous template.
    Destroy,
}

impl core::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Action::Create => "create",
            Action::Update => "update",
            Action::Replace => "replace",
            Action::Keep => "keep",
            Action::Destroy => "destroy",
        })
    }
}

/// A single planned action for a construct.
#[derive(Clone, Debug, PartialEq)]
pub struct PlannedAction {
    /// The construct id.
    pub id: String,
    /// The action to be taken.
    pub action: Action,
    /// The resource type.
    pub kind: String,
    /// Whether the construct is no longer declared.
    pub is_orphan: bool,
}

/// A plan of actions produced by [`Synthesis::plan`].
#[derive(Clone, Debug, Default)]
pub struct Plan {
    /// The planned actions, in schedule order, followed by orphans.
    pub actions: Vec<PlannedAction>,
    /// Things worth a look before applying.
    pub warnings: Vec<String>,
}

impl Plan {
    /// Whether applying this plan changes anything.
    pub fn has_changes(&self) -> bool {
        self.actions.iter().any(|a| a.action != Action::Keep)
    }

    pub fn get(&self, id: &str) -> Option<&PlannedAction> {
        self.actions.iter().find(|a| a.id == id)
    }
}

impl core::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.has_changes() {
            f.write_str("No changes.\n")?;
        }
        for action in self.actions.iter().filter(|a| a.action != Action::Keep) {
            let orphan_marker = if action.is_orphan { " (orphan)" } else { "" };
            writeln!(
                f,
                "  {} '{}' [{}]{}",
                action.action, action.id, action.kind, orphan_marker
            )?;
        }
        for warning in &self.warnings {
            writeln!(f, "  WARNING: {warning}")?;
        }
        Ok(())
    }
}

fn log_change(id: &str, previous: &TemplateResource, current: &TemplateResource) {
    let previous = serde_json::to_string_pretty(previous).unwrap_or_default();
    let current = serde_json::to_string_pretty(current).unwrap_or_default();
    let cmp = pretty_assertions::StrComparison::new(&previous, &current);
    let change_string = format!("{cmp}")
        .lines()
        .map(|line| format!("  {line}"))
        .collect::<Vec<_>>()
        .join("\n");
    log::info!("updating '{id}':\n{change_string}");
}

impl Synthesis {
    /// Compare this synthesis against the template previously saved in
    /// `out_dir` and build a plan.
    ///
    /// Without a previous template every construct is created.
    pub fn plan(&self, out_dir: impl AsRef<std::path::Path>) -> Result<Plan> {
        let previous = self.read_previous(out_dir)?;
        let previous = previous.map(|t| t.resources).unwrap_or_default();

        let mut actions = Vec::new();
        let mut warnings = Vec::new();
        let mut decided: HashMap<&str, Action> = HashMap::new();

        for id in self.order() {
            // UNWRAP: safe because the schedule is built from the template's resources
            let current = &self.template.resources[id];
            let action = match previous.get(id) {
                None => Action::Create,
                Some(prev) if prev.kind != current.kind => {
                    warnings.push(format!(
                        "'{id}' changes type from {} to {}, it will be replaced",
                        prev.kind, current.kind
                    ));
                    Action::Replace
                }
                Some(prev) if prev != current => {
                    log_change(id, prev, current);
                    let generated = current.property(GENERATED_SECRET);
                    if generated.is_some() && prev.property(GENERATED_SECRET) != generated {
                        warnings.push(format!(
                            "'{id}' changes its {GENERATED_SECRET}, the generated value will be regenerated"
                        ));
                    }
                    Action::Update
                }
                Some(_) => {
                    // Values read from a created or replaced construct change,
                    // and so do the constructs reading them.
                    let upstream_changed = self
                        .upstream(id)
                        .any(|dep| matches!(decided.get(dep), Some(Action::Create | Action::Replace)));
                    if upstream_changed {
                        Action::Update
                    } else {
                        Action::Keep
                    }
                }
            };
            decided.insert(id, action);
            actions.push(PlannedAction {
                id: id.to_owned(),
                action,
                kind: current.kind.clone(),
                is_orphan: false,
            });
        }

        for (id, prev) in previous.iter() {
            if self.template.resources.contains_key(id) {
                continue;
            }
            log::info!("orphan detected: '{id}' ({}), scheduling destroy", prev.kind);
            if let Some(policy) = prev.deletion_policy.filter(|p| p.keeps_data()) {
                warnings.push(format!(
                    "'{id}' is no longer declared, its data is kept by its {policy:?} deletion policy"
                ));
            }
            actions.push(PlannedAction {
                id: id.clone(),
                action: Action::Destroy,
                kind: prev.kind.clone(),
                is_orphan: true,
            });
        }

        Ok(Plan { actions, warnings })
    }

    /// Ids of the constructs that `id` reads or explicitly depends on.
    fn upstream<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        let resource = self.template.resources.get(id);
        let mut ids: Vec<&str> = vec![];
        if let Some(resource) = resource {
            collect_references(&resource.properties, &mut ids);
            ids.extend(resource.depends_on.iter().map(|s| s.as_str()));
        }
        ids.into_iter()
    }
}

/// Walks the JSON tree looking for `Ref` and `Fn::GetAtt` tokens.
fn collect_references<'a>(value: &'a serde_json::Value, ids: &mut Vec<&'a str>) {
    match value {
        serde_json::Value::Object(map) => {
            if let Some(serde_json::Value::String(id)) = map.get("Ref") {
                ids.push(id);
            }
            if let Some(serde_json::Value::Array(att)) = map.get("Fn::GetAtt") {
                if let Some(serde_json::Value::String(id)) = att.first() {
                    ids.push(id);
                }
            }
            for v in map.values() {
                collect_references(v, ids);
            }
        }
        serde_json::Value::Array(arr) => {
            for v in arr {
                collect_references(v, ids);
            }
        }
        _ => {}
    }
}
