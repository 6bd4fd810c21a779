//! Constructs for Amazon Web Services, and the hand-off to CloudFormation.

use crate::{self as synth, HasDependencies, Value};

pub use aws_config::SdkConfig;
pub mod cloudformation;
pub mod ec2;
pub mod elasticbeanstalk;
pub mod iam;
pub mod rds;
pub mod secretsmanager;

/// A resource tag.
#[derive(Clone, Debug, PartialEq, serde::Serialize, HasDependencies)]
#[serde(rename_all = "PascalCase")]
pub struct Tag {
    pub key: String,
    pub value: Value,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Tag {
            key: key.into(),
            value: value.into(),
        }
    }

    /// The `Name` tag shown by the AWS console.
    pub fn name(value: impl Into<Value>) -> Self {
        Tag::new("Name", value)
    }
}
