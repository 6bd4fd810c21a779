//! # Synth
//!
//! Synth is a library for declaring cloud infrastructure as a graph of
//! constructs in plain Rust, and synthesizing that graph into a template that a
//! provisioning engine (AWS CloudFormation) realizes.
//!
//! ## Concepts
//!
//! - **Construct**: the declaration of one cloud resource. A construct is an
//!   ordinary serializable struct whose serde form is the resource's property
//!   object, see [`Construct`].
//! - **Remote values**: values that only exist once the provisioning engine has
//!   realized a construct (identifiers, endpoints, ARNs). They are declared as
//!   [`Remote`] tokens and rendered as `Ref` / `Fn::GetAtt`.
//! - **Dependencies**: every construct reports the constructs it reads through
//!   [`HasDependencies`], which can be derived. Dependencies order the graph.
//!
//! A [`Stack`] collects constructs in the order they are declared. A construct
//! may only read values of constructs declared before it. Explicit edges added
//! with [`Stack::add_dependency`] may point either way, so the declaration
//! order is not necessarily a valid schedule, and a backward edge can close a
//! cycle. [`Stack::synth`] builds the dependency schedule, failing on cycles,
//! and renders the [`Template`].
//!
//! ## Error Handling
//!
//! Synth exposes an error enum [`Error`], which encompasses all errors that may
//! occur while declaring, synthesizing, planning or deploying a stack.

use std::{collections::BTreeMap, ops::Deref};

use dagga::Node;
use snafu::prelude::*;
use tokio::io::AsyncWriteExt;

pub use cfn_synth_derive::HasDependencies;

pub mod aws;
mod has_dependencies_impl;
pub mod plan;
pub mod remote;
pub mod template;
#[cfg(test)]
mod test;
pub mod utils;

pub use plan::{Action, Plan, PlannedAction};
pub use remote::{Remote, Value};
pub use template::{DeletionPolicy, Template, TemplateOutput, TemplateResource};

/// Top-level error enum that encompasses all errors.
#[derive(snafu::Snafu, Debug)]
pub enum Error {
    #[snafu(display("{source}:\n{}",
                source.chain()
                    .map(|e| format!("{e}"))
                    .collect::<Vec<_>>()
                    .join("\n -> ")))]
    Deploy { source: anyhow::Error },

    #[snafu(display("Could not read template file '{path:?}': {source}"))]
    TemplateFileRead {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Could not serialize '{name}': {source}"))]
    Serialize {
        name: String,
        source: serde_json::Error,
    },

    #[snafu(display("Could not deserialize '{name}': {source}"))]
    Deserialize {
        name: String,
        source: serde_json::Error,
    },

    #[snafu(display("Could not build schedule: {msg}"))]
    Schedule { msg: String },

    #[snafu(display("Could not create file {path:?}: {source}"))]
    CreateFile {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Could not write file {path:?}: {source}"))]
    WriteFile {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Construct id '{id}' must be non-empty and ASCII alphanumeric"))]
    InvalidId { id: String },

    #[snafu(display("A construct named '{id}' is already declared in this stack"))]
    DuplicateId { id: String },

    #[snafu(display("Could not find a construct by the name '{name}'"))]
    MissingResource { name: String },

    #[snafu(display("An output named '{name}' is already declared in this stack"))]
    DuplicateOutput { name: String },

    #[snafu(display("The export name '{name}' is used by more than one output"))]
    DuplicateExport { name: String },
}

impl From<anyhow::Error> for Error {
    fn from(source: anyhow::Error) -> Self {
        Error::Deploy { source }
    }
}

type Result<T, E = Error> = core::result::Result<T, E>;

/// IaC constructs.
///
/// Represents the declaration of one resource on the platform. The serde
/// form of a construct is its property object in the synthesized template, so
/// implementors usually carry `#[serde(rename_all = "PascalCase")]`.
pub trait Construct:
    core::fmt::Debug + Clone + PartialEq + HasDependencies + serde::Serialize + 'static
{
    /// The resource type understood by the provisioning engine.
    ///
    /// For example `AWS::EC2::VPC`.
    const KIND: &'static str;

    /// What the provisioning engine does with the realized resource when the
    /// construct is removed or replaced.
    ///
    /// `None` leaves it to the engine's default, which is deletion.
    fn deletion_policy(&self) -> Option<DeletionPolicy> {
        None
    }
}

#[derive(Clone, Default, Debug, PartialEq)]
pub struct Dependencies {
    /// Ids of the constructs depended on.
    inner: Vec<String>,
}

impl IntoIterator for Dependencies {
    type Item = String;

    type IntoIter = <Vec<String> as IntoIterator>::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.into_iter()
    }
}

impl core::fmt::Display for Dependencies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.inner.join(", "))
    }
}

impl Dependencies {
    pub fn single(id: impl Into<String>) -> Self {
        Dependencies {
            inner: vec![id.into()],
        }
    }

    pub fn merge(self, other: Self) -> Self {
        Dependencies {
            inner: [self.inner, other.inner].concat(),
        }
    }

    /// Returns the ids depended on, without repeats, in first-seen order.
    pub fn unique(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.inner
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .cloned()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Tracks dependencies between constructs.
///
/// This trait can be derived, and has a default implementation that
/// reports zero dependencies.
pub trait HasDependencies {
    fn dependencies(&self) -> Dependencies {
        Dependencies::default()
    }
}

/// A construct that has been declared in a [`Stack`].
#[derive(Clone, Debug)]
pub struct StackConstruct<T> {
    /// Logical id of the construct within its stack
    id: String,
    /// Declaration in _code_
    definition: T,
}

impl<T> Deref for StackConstruct<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.definition
    }
}

impl<T> AsRef<T> for StackConstruct<T> {
    fn as_ref(&self) -> &T {
        &self.definition
    }
}

impl<T: Construct> StackConstruct<T> {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The primary reference of this construct, known once it is provisioned.
    ///
    /// What this resolves to depends on the resource type, for example a VPC id
    /// or a secret ARN.
    pub fn reference(&self) -> Remote {
        Remote::reference(&self.id)
    }

    /// A named attribute of this construct, known once it is provisioned.
    pub fn attribute(&self, name: impl Into<String>) -> Remote {
        Remote::attribute(&self.id, name)
    }
}

/// A stack output, optionally exported under a stable name so that other
/// stacks and tools can discover it.
#[derive(Clone, Debug, PartialEq)]
pub struct Output {
    pub value: Value,
    pub description: Option<String>,
    pub export_name: Option<String>,
}

impl Output {
    pub fn new(value: impl Into<Value>) -> Self {
        Output {
            value: value.into(),
            description: None,
            export_name: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_export_name(mut self, name: impl Into<String>) -> Self {
        self.export_name = Some(name.into());
        self
    }
}

struct StackNode {
    id: String,
    kind: &'static str,
    properties: serde_json::Value,
    /// Dependencies read from the construct's remote values.
    reads: Vec<String>,
    /// Ordering added with [`Stack::add_dependency`].
    explicit: Vec<String>,
    deletion_policy: Option<DeletionPolicy>,
}

/// A named collection of constructs, the unit handed to the provisioning engine.
pub struct Stack {
    name: String,
    description: Option<String>,
    nodes: Vec<StackNode>,
    outputs: BTreeMap<String, TemplateOutput>,
}

impl Stack {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            nodes: vec![],
            outputs: BTreeMap::default(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.nodes.iter().position(|node| node.id == id)
    }

    fn ensure_declared(&self, deps: &Dependencies) -> Result<()> {
        for dep in deps.unique() {
            snafu::ensure!(
                self.position(&dep).is_some(),
                MissingResourceSnafu { name: dep }
            );
        }
        Ok(())
    }

    /// Declares a construct.
    ///
    /// ## Errors
    /// Errs if the id is not a valid logical id, is already taken, or if the
    /// definition reads a construct that has not been declared yet.
    pub fn construct<T: Construct>(
        &mut self,
        id: impl AsRef<str>,
        definition: T,
    ) -> Result<StackConstruct<T>> {
        let id = id.as_ref();
        snafu::ensure!(
            !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric()),
            InvalidIdSnafu { id }
        );
        snafu::ensure!(self.position(id).is_none(), DuplicateIdSnafu { id });

        let dependencies = definition.dependencies();
        self.ensure_declared(&dependencies)?;

        let properties = serde_json::to_value(&definition).context(SerializeSnafu {
            name: id.to_owned(),
        })?;
        log::debug!(
            "declaring {} '{id}' reading [{dependencies}]",
            <T as Construct>::KIND
        );
        self.nodes.push(StackNode {
            id: id.to_owned(),
            kind: T::KIND,
            properties,
            reads: dependencies.unique(),
            explicit: vec![],
            deletion_policy: definition.deletion_policy(),
        });
        Ok(StackConstruct {
            id: id.to_owned(),
            definition,
        })
    }

    /// Requires `dependent` to be realized only after `dependency` exists,
    /// even when `dependent` reads none of its values.
    pub fn add_dependency<A: Construct, B: Construct>(
        &mut self,
        dependent: &StackConstruct<A>,
        dependency: &StackConstruct<B>,
    ) -> Result<()> {
        self.add_dependency_by_id(dependent.id(), dependency.id())
    }

    fn add_dependency_by_id(&mut self, dependent: &str, dependency: &str) -> Result<()> {
        snafu::ensure!(
            self.position(dependency).is_some(),
            MissingResourceSnafu { name: dependency }
        );
        let index = self.position(dependent).context(MissingResourceSnafu {
            name: dependent.to_owned(),
        })?;
        let node = &mut self.nodes[index];
        if !node.explicit.iter().any(|id| id == dependency) {
            node.explicit.push(dependency.to_owned());
        }
        Ok(())
    }

    /// Declares a stack output.
    pub fn output(&mut self, id: impl AsRef<str>, output: Output) -> Result<()> {
        let id = id.as_ref();
        snafu::ensure!(
            !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric()),
            InvalidIdSnafu { id }
        );
        snafu::ensure!(
            !self.outputs.contains_key(id),
            DuplicateOutputSnafu { name: id }
        );
        if let Some(export_name) = output.export_name.as_deref() {
            let taken = self
                .outputs
                .values()
                .any(|o| o.export.as_ref().map(|e| e.name.as_str()) == Some(export_name));
            snafu::ensure!(!taken, DuplicateExportSnafu { name: export_name });
        }
        self.ensure_declared(&output.value.dependencies())?;

        let value = serde_json::to_value(&output.value).context(SerializeSnafu {
            name: format!("output {id}"),
        })?;
        self.outputs.insert(
            id.to_owned(),
            TemplateOutput {
                value,
                description: output.description,
                export: output.export_name.map(|name| template::Export { name }),
            },
        );
        Ok(())
    }

    /// Builds the dependency schedule and renders the template.
    ///
    /// ## Errors
    /// Errs if explicit dependencies introduce a cycle.
    pub fn synth(&self) -> Result<Synthesis> {
        let mut dag: dagga::Dag<usize, usize> = dagga::Dag::default();
        for (key, node) in self.nodes.iter().enumerate() {
            let mut reads = vec![];
            for dep in node.reads.iter().chain(node.explicit.iter()) {
                let dep_key = self.position(dep).context(MissingResourceSnafu {
                    name: dep.clone(),
                })?;
                if !reads.contains(&dep_key) {
                    reads.push(dep_key);
                }
            }
            dag.add_node(
                Node::new(key)
                    .with_name(node.id.clone())
                    .with_reads(reads)
                    .with_result(key),
            );
        }
        let schedule = dag
            .build_schedule()
            .map_err(|e| Error::Schedule { msg: e.to_string() })?;
        let batches: Vec<Vec<String>> = schedule
            .batches
            .iter()
            .map(|batch| batch.iter().map(|node| node.name().to_owned()).collect())
            .collect();

        let resources = self
            .nodes
            .iter()
            .map(|node| {
                (
                    node.id.clone(),
                    TemplateResource {
                        kind: node.kind.to_owned(),
                        properties: node.properties.clone(),
                        depends_on: node.explicit.clone(),
                        deletion_policy: node.deletion_policy,
                        update_replace_policy: node.deletion_policy,
                    },
                )
            })
            .collect();

        Ok(Synthesis {
            stack_name: self.name.clone(),
            template: Template {
                format_version: template::FORMAT_VERSION.to_owned(),
                description: self.description.clone(),
                resources,
                outputs: self.outputs.clone(),
            },
            batches,
        })
    }
}

/// The result of synthesizing a [`Stack`].
#[derive(Clone, Debug, PartialEq)]
pub struct Synthesis {
    pub stack_name: String,
    pub template: Template,
    /// Construct ids in the order the provisioning engine may realize them.
    /// Constructs within one batch do not depend on each other.
    pub batches: Vec<Vec<String>>,
}

/// The path to a synthesized template file.
fn template_file_path(stack_name: &str, out_dir: impl AsRef<std::path::Path>) -> std::path::PathBuf {
    out_dir.as_ref().join(format!("{stack_name}.template.json"))
}

impl Synthesis {
    /// Returns the construct ids in schedule order.
    pub fn order(&self) -> impl Iterator<Item = &str> {
        self.batches.iter().flatten().map(|id| id.as_str())
    }

    pub fn template_path(&self, out_dir: impl AsRef<std::path::Path>) -> std::path::PathBuf {
        template_file_path(&self.stack_name, out_dir)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.template).context(SerializeSnafu {
            name: format!("template {}", self.stack_name),
        })
    }

    /// SHA-256 of the rendered template.
    pub fn digest(&self) -> Result<String> {
        let contents = self.to_json_pretty()?;
        Ok(utils::sha256_hex(contents.as_bytes()))
    }

    /// Returns a human readable rendition of the schedule.
    pub fn get_schedule_string(&self) -> String {
        let mut s = String::new();
        if self.batches.is_empty() {
            s.push_str("--- Nothing declared.\n");
        }
        for (i, batch) in self.batches.iter().enumerate() {
            s.push_str(&format!("--- step {}\n", i + 1));
            for id in batch.iter() {
                let kind = self
                    .template
                    .resources
                    .get(id)
                    .map(|r| r.kind.as_str())
                    .unwrap_or("unknown");
                s.push_str(&format!("  {id} [{kind}]\n"));
            }
            s.push_str("---\n");
        }
        s
    }

    /// Writes the template to `<out_dir>/<stack-name>.template.json`.
    pub async fn save(&self, out_dir: impl AsRef<std::path::Path>) -> Result<std::path::PathBuf> {
        let path = self.template_path(&out_dir);
        log::info!("writing template of '{}' to {path:?}", self.stack_name);
        let contents = self.to_json_pretty()?;

        // Ensure the parent directory exists
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(&parent)
                .await
                .context(CreateFileSnafu { path: parent })?;
        }

        let mut file = tokio::fs::File::create(&path)
            .await
            .context(CreateFileSnafu { path: path.clone() })?;
        file.write_all(contents.as_bytes())
            .await
            .context(WriteFileSnafu { path: path.clone() })?;
        // Tokio hands writes to a blocking pool, the bytes are only on disk
        // once flushed.
        file.flush()
            .await
            .context(WriteFileSnafu { path: path.clone() })?;
        Ok(path)
    }

    /// Reads the template previously saved for this stack, if any.
    pub fn read_previous(&self, out_dir: impl AsRef<std::path::Path>) -> Result<Option<Template>> {
        let path = self.template_path(out_dir);
        if !path.exists() {
            log::debug!("no previous template at {path:?}");
            return Ok(None);
        }
        let contents =
            std::fs::read_to_string(&path).context(TemplateFileReadSnafu { path: &path })?;
        let template = serde_json::from_str(&contents).context(DeserializeSnafu {
            name: format!("{path:?}"),
        })?;
        Ok(Some(template))
    }
}
