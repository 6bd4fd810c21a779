//! The managed PostgreSQL instance and its generated credentials.
use synth::{
    aws::{
        iam::Role,
        rds::{DbInstance, DbSubnetGroup},
        secretsmanager::{
            dynamic_reference, json_object, GenerateSecretString, Secret, SecretTargetAttachment,
            DATABASE_PASSWORD_EXCLUDES,
        },
    },
    DeletionPolicy, Remote, Stack, StackConstruct, Value,
};

use crate::{config::Profile, error::Result, network::NetworkTopology};

const PASSWORD_LENGTH: u32 = 30;

/// Handles to the database constructs needed downstream.
pub struct DataStoreHandle {
    pub instance: StackConstruct<DbInstance>,
    /// Holds `username` and `password`, plus the connection details once the
    /// instance is attached.
    pub credentials: StackConstruct<Secret>,
    pub db_name: String,
    pub username: String,
}

impl DataStoreHandle {
    pub fn endpoint_address(&self) -> Remote {
        self.instance.endpoint_address()
    }

    pub fn endpoint_port(&self) -> Remote {
        self.instance.endpoint_port()
    }

    pub fn secret_arn(&self) -> Remote {
        self.credentials.arn()
    }

    /// Resolves the generated master password at provisioning time.
    pub fn password(&self) -> Value {
        dynamic_reference(self.secret_arn(), "password")
    }
}

/// Declares the database inside the isolated subnets.
///
/// The instance is single-AZ, encrypted, never publicly accessible, and is
/// snapshotted when removed.
pub fn build(stack: &mut Stack, profile: &Profile, network: &NetworkTopology) -> Result<DataStoreHandle> {
    let db = &profile.database;

    let monitoring_role = if db.monitoring_interval > 0 {
        Some(stack.construct(
            "DatabaseMonitoringRole",
            Role::assumed_by("monitoring.rds.amazonaws.com")
                .with_managed_policy("service-role/AmazonRDSEnhancedMonitoringRole"),
        )?)
    } else {
        None
    };

    let subnet_group = stack.construct(
        "DatabaseSubnetGroup",
        DbSubnetGroup {
            description: format!("Isolated subnets of {}", profile.qualified_name()),
            subnet_ids: network.isolated_subnet_ids(),
        },
    )?;

    let credentials = stack.construct(
        "DatabaseSecret",
        Secret {
            description: Some(format!("Master credentials of {}", profile.stage_scoped("db"))),
            generate_secret_string: Some(GenerateSecretString {
                secret_string_template: Some(json_object([(
                    "username",
                    Value::from(&db.username),
                )])),
                generate_string_key: Some("password".into()),
                password_length: Some(PASSWORD_LENGTH),
                exclude_characters: Some(DATABASE_PASSWORD_EXCLUDES.into()),
                exclude_punctuation: None,
            }),
            ..Default::default()
        },
    )?;

    let instance = stack.construct(
        "DatabaseInstance",
        DbInstance {
            engine: "postgres".into(),
            engine_version: db.engine_version.clone(),
            instance_class: db.instance_class.clone(),
            instance_identifier: Some(profile.stage_scoped("db")),
            db_name: Some(db.db_name.clone()),
            allocated_storage: db.allocated_storage.to_string(),
            storage_type: db.storage_type.clone(),
            storage_encrypted: true,
            multi_az: false,
            publicly_accessible: false,
            subnet_group_name: subnet_group.group_name().into(),
            vpc_security_groups: vec![network.data_security_group.group_id().into()],
            master_username: dynamic_reference(credentials.arn(), "username"),
            master_user_password: dynamic_reference(credentials.arn(), "password"),
            backup_retention_period: db.backup_retention,
            delete_automated_backups: true,
            deletion_protection: false,
            enable_performance_insights: false,
            enable_cloudwatch_logs_exports: vec!["postgresql".into(), "upgrade".into()],
            monitoring_interval: monitoring_role.as_ref().map(|_| db.monitoring_interval),
            monitoring_role_arn: monitoring_role.as_ref().map(|r| r.arn().into()),
            copy_tags_to_snapshot: true,
            tags: vec![],
            removal_policy: Some(DeletionPolicy::Snapshot),
        },
    )?;

    stack.construct(
        "DatabaseSecretAttachment",
        SecretTargetAttachment {
            secret_id: credentials.arn().into(),
            target_id: instance.reference().into(),
            target_type: "AWS::RDS::DBInstance".into(),
        },
    )?;

    Ok(DataStoreHandle {
        instance,
        credentials,
        db_name: db.db_name.clone(),
        username: db.username.clone(),
    })
}
