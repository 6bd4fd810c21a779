//! IAM constructs and policy documents.
use crate::{self as synth, aws::Tag, Construct, HasDependencies, Remote, StackConstruct, Value};

pub const POLICY_VERSION: &str = "2012-10-17";

/// The ARN of a policy managed by AWS.
pub fn managed_policy_arn(name: &str) -> String {
    format!("arn:aws:iam::aws:policy/{name}")
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub enum Effect {
    Allow,
    Deny,
}

impl HasDependencies for Effect {}

#[derive(Clone, Debug, PartialEq, serde::Serialize, HasDependencies)]
#[serde(rename_all = "PascalCase")]
pub struct Principal {
    pub service: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, HasDependencies)]
#[serde(rename_all = "PascalCase")]
pub struct Statement {
    pub effect: Effect,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal: Option<Principal>,
    pub action: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub resource: Vec<Value>,
}

impl Statement {
    pub fn allow<'a>(
        actions: impl IntoIterator<Item = &'a str>,
        resources: impl IntoIterator<Item = Value>,
    ) -> Self {
        Statement {
            effect: Effect::Allow,
            principal: None,
            action: actions.into_iter().map(str::to_owned).collect(),
            resource: resources.into_iter().collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, HasDependencies)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    pub version: String,
    pub statement: Vec<Statement>,
}

impl PolicyDocument {
    pub fn new(statement: impl IntoIterator<Item = Statement>) -> Self {
        PolicyDocument {
            version: POLICY_VERSION.into(),
            statement: statement.into_iter().collect(),
        }
    }

    /// A trust policy letting the given service assume a role.
    pub fn assume_role_by(service: impl Into<String>) -> Self {
        PolicyDocument::new([Statement {
            effect: Effect::Allow,
            principal: Some(Principal {
                service: vec![service.into()],
            }),
            action: vec!["sts:AssumeRole".into()],
            resource: vec![],
        }])
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, HasDependencies)]
#[serde(rename_all = "PascalCase")]
pub struct InlinePolicy {
    pub policy_name: String,
    pub policy_document: PolicyDocument,
}

/// AWS role resources.
#[derive(Clone, Debug, PartialEq, serde::Serialize, HasDependencies)]
#[serde(rename_all = "PascalCase")]
pub struct Role {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub assume_role_policy_document: PolicyDocument,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub managed_policy_arns: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub policies: Vec<InlinePolicy>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
}

impl Role {
    /// A role trusted by `service`, without any permissions yet.
    pub fn assumed_by(service: impl Into<String>) -> Self {
        Role {
            role_name: None,
            description: None,
            assume_role_policy_document: PolicyDocument::assume_role_by(service),
            managed_policy_arns: vec![],
            policies: vec![],
            tags: vec![],
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.role_name = Some(name.into());
        self
    }

    pub fn with_managed_policy(mut self, name: &str) -> Self {
        self.managed_policy_arns.push(managed_policy_arn(name));
        self
    }

    pub fn with_policy(mut self, name: impl Into<String>, document: PolicyDocument) -> Self {
        self.policies.push(InlinePolicy {
            policy_name: name.into(),
            policy_document: document,
        });
        self
    }
}

impl Construct for Role {
    const KIND: &'static str = "AWS::IAM::Role";
}

impl StackConstruct<Role> {
    pub fn arn(&self) -> Remote {
        self.attribute("Arn")
    }

    pub fn role_name(&self) -> Remote {
        self.reference()
    }
}

/// Hands a role to EC2 instances.
#[derive(Clone, Debug, PartialEq, serde::Serialize, HasDependencies)]
#[serde(rename_all = "PascalCase")]
pub struct InstanceProfile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_profile_name: Option<String>,
    pub roles: Vec<Value>,
}

impl Construct for InstanceProfile {
    const KIND: &'static str = "AWS::IAM::InstanceProfile";
}

impl StackConstruct<InstanceProfile> {
    pub fn profile_name(&self) -> Remote {
        self.reference()
    }
}
