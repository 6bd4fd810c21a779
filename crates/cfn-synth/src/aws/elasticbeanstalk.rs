//! Elastic Beanstalk application platform constructs.
use crate::{self as synth, Construct, HasDependencies, Remote, StackConstruct, Value};

#[derive(Clone, Debug, PartialEq, serde::Serialize, HasDependencies)]
#[serde(rename_all = "PascalCase")]
pub struct Application {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Construct for Application {
    const KIND: &'static str = "AWS::ElasticBeanstalk::Application";
}

/// One configuration option of an environment.
#[derive(Clone, Debug, PartialEq, serde::Serialize, HasDependencies)]
#[serde(rename_all = "PascalCase")]
pub struct OptionSetting {
    pub namespace: String,
    pub option_name: String,
    pub value: Value,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, HasDependencies)]
#[serde(rename_all = "PascalCase")]
pub struct Environment {
    pub application_name: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment_name: Option<String>,
    pub solution_stack_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub option_settings: Vec<OptionSetting>,
}

impl Construct for Environment {
    const KIND: &'static str = "AWS::ElasticBeanstalk::Environment";
}

impl StackConstruct<Environment> {
    /// The public endpoint of the environment, without a scheme.
    pub fn endpoint_url(&self) -> Remote {
        self.attribute("EndpointURL")
    }
}
