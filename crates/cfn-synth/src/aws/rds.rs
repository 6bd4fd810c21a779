//! RDS database constructs.
use crate::{
    self as synth, aws::Tag, Construct, DeletionPolicy, HasDependencies, Remote, StackConstruct,
    Value,
};

#[derive(Clone, Debug, PartialEq, serde::Serialize, HasDependencies)]
pub struct DbSubnetGroup {
    #[serde(rename = "DBSubnetGroupDescription")]
    pub description: String,
    #[serde(rename = "SubnetIds")]
    pub subnet_ids: Vec<Value>,
}

impl Construct for DbSubnetGroup {
    const KIND: &'static str = "AWS::RDS::DBSubnetGroup";
}

impl StackConstruct<DbSubnetGroup> {
    pub fn group_name(&self) -> Remote {
        self.reference()
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, HasDependencies)]
#[serde(rename_all = "PascalCase")]
pub struct DbInstance {
    pub engine: String,
    pub engine_version: String,
    #[serde(rename = "DBInstanceClass")]
    pub instance_class: String,
    #[serde(rename = "DBInstanceIdentifier", skip_serializing_if = "Option::is_none")]
    pub instance_identifier: Option<String>,
    #[serde(rename = "DBName", skip_serializing_if = "Option::is_none")]
    pub db_name: Option<String>,
    pub allocated_storage: String,
    pub storage_type: String,
    pub storage_encrypted: bool,
    #[serde(rename = "MultiAZ")]
    pub multi_az: bool,
    pub publicly_accessible: bool,
    #[serde(rename = "DBSubnetGroupName")]
    pub subnet_group_name: Value,
    #[serde(rename = "VPCSecurityGroups")]
    pub vpc_security_groups: Vec<Value>,
    pub master_username: Value,
    pub master_user_password: Value,
    pub backup_retention_period: u32,
    pub delete_automated_backups: bool,
    pub deletion_protection: bool,
    pub enable_performance_insights: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub enable_cloudwatch_logs_exports: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monitoring_interval: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monitoring_role_arn: Option<Value>,
    pub copy_tags_to_snapshot: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
    /// Rendered as the resource's deletion and update-replace policy.
    #[serde(skip)]
    #[synth(skip)]
    pub removal_policy: Option<DeletionPolicy>,
}

impl Construct for DbInstance {
    const KIND: &'static str = "AWS::RDS::DBInstance";

    fn deletion_policy(&self) -> Option<DeletionPolicy> {
        self.removal_policy
    }
}

impl StackConstruct<DbInstance> {
    pub fn endpoint_address(&self) -> Remote {
        self.attribute("Endpoint.Address")
    }

    pub fn endpoint_port(&self) -> Remote {
        self.attribute("Endpoint.Port")
    }
}
