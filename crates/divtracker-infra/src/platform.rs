//! The Elastic Beanstalk application, its IAM identities and option list.
use snafu::prelude::*;
use synth::{
    aws::{
        elasticbeanstalk::{Application, Environment, OptionSetting},
        iam::{InstanceProfile, PolicyDocument, Role, Statement},
    },
    Output, Stack, StackConstruct, Value,
};

use crate::{
    config::Profile,
    database::DataStoreHandle,
    error::{DuplicateOptionSnafu, Result},
    network::NetworkTopology,
    secrets::{AppSecrets, DB_SECRET_ARN},
};

pub const ENVIRONMENT: &str = "aws:elasticbeanstalk:environment";
pub const LAUNCH_CONFIGURATION: &str = "aws:autoscaling:launchconfiguration";
pub const VPC: &str = "aws:ec2:vpc";
pub const APPLICATION: &str = "aws:elasticbeanstalk:application";
pub const HEALTH_REPORTING: &str = "aws:elasticbeanstalk:healthreporting:system";
pub const CLOUDWATCH_LOGS: &str = "aws:elasticbeanstalk:cloudwatch:logs";
pub const APPLICATION_ENVIRONMENT: &str = "aws:elasticbeanstalk:application:environment";

/// Ordered platform options, each `(namespace, name)` at most once.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PlatformOptionSet {
    settings: Vec<OptionSetting>,
}

impl PlatformOptionSet {
    pub fn push(
        &mut self,
        namespace: &str,
        option_name: &str,
        value: impl Into<Value>,
    ) -> Result<()> {
        ensure!(
            self.get(namespace, option_name).is_none(),
            DuplicateOptionSnafu {
                namespace,
                option_name
            }
        );
        self.settings.push(OptionSetting {
            namespace: namespace.to_owned(),
            option_name: option_name.to_owned(),
            value: value.into(),
        });
        Ok(())
    }

    /// Sets an environment variable of the application.
    pub fn env(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        self.push(APPLICATION_ENVIRONMENT, name, value)
    }

    pub fn get(&self, namespace: &str, option_name: &str) -> Option<&Value> {
        self.settings
            .iter()
            .find(|s| s.namespace == namespace && s.option_name == option_name)
            .map(|s| &s.value)
    }

    pub fn len(&self) -> usize {
        self.settings.len()
    }

    pub fn into_settings(self) -> Vec<OptionSetting> {
        self.settings
    }
}

/// Handles to the platform constructs.
pub struct ApplicationPlatform {
    pub environment: StackConstruct<Environment>,
}

struct Identities {
    instance_profile: StackConstruct<InstanceProfile>,
    service_role: StackConstruct<Role>,
}

fn identities(
    stack: &mut Stack,
    profile: &Profile,
    database: &DataStoreHandle,
    secrets: &AppSecrets,
) -> Result<Identities> {
    // Read access to exactly the two records the application needs.
    let secret_access = Statement::allow(
        [
            "secretsmanager:GetSecretValue",
            "secretsmanager:DescribeSecret",
        ],
        [secrets.arn(), database.secret_arn().into()],
    );
    let instance_role = stack.construct(
        "InstanceRole",
        Role::assumed_by("ec2.amazonaws.com")
            .with_name(profile.app_scoped("eb-ec2-role"))
            .with_managed_policy("AWSElasticBeanstalkWebTier")
            .with_managed_policy("AWSElasticBeanstalkWorkerTier")
            .with_managed_policy("AWSElasticBeanstalkMulticontainerDocker")
            .with_policy("SecretsAccess", PolicyDocument::new([secret_access])),
    )?;
    let instance_profile = stack.construct(
        "InstanceProfile",
        InstanceProfile {
            instance_profile_name: Some(profile.app_scoped("eb-instance-profile")),
            roles: vec![instance_role.role_name().into()],
        },
    )?;
    let service_role = stack.construct(
        "ServiceRole",
        Role::assumed_by("elasticbeanstalk.amazonaws.com")
            .with_name(profile.app_scoped("eb-service-role"))
            .with_managed_policy("service-role/AWSElasticBeanstalkEnhancedHealth")
            .with_managed_policy("service-role/AWSElasticBeanstalkService"),
    )?;
    Ok(Identities {
        instance_profile,
        service_role,
    })
}

fn option_set(
    profile: &Profile,
    network: &NetworkTopology,
    database: &DataStoreHandle,
    secrets: &AppSecrets,
    identities: &Identities,
) -> Result<PlatformOptionSet> {
    let platform = &profile.platform;
    let mut options = PlatformOptionSet::default();

    options.push(ENVIRONMENT, "EnvironmentType", "SingleInstance")?;
    options.push(ENVIRONMENT, "ServiceRole", identities.service_role.arn())?;
    options.push(LAUNCH_CONFIGURATION, "InstanceType", &platform.instance_type)?;
    options.push(
        LAUNCH_CONFIGURATION,
        "IamInstanceProfile",
        identities.instance_profile.profile_name(),
    )?;
    options.push(
        LAUNCH_CONFIGURATION,
        "SecurityGroups",
        network.app_security_group.group_id(),
    )?;
    options.push(VPC, "VPCId", network.vpc.vpc_id())?;
    options.push(VPC, "Subnets", network.public_subnet_ids())?;
    options.push(VPC, "AssociatePublicIpAddress", "true")?;
    options.push(
        APPLICATION,
        "Application Healthcheck URL",
        &platform.health_check_path,
    )?;
    options.push(HEALTH_REPORTING, "SystemType", "enhanced")?;
    options.push(CLOUDWATCH_LOGS, "StreamLogs", "true")?;
    options.push(CLOUDWATCH_LOGS, "DeleteOnTerminate", "false")?;
    options.push(
        CLOUDWATCH_LOGS,
        "RetentionInDays",
        platform.log_retention_days.to_string(),
    )?;

    options.env("SPRING_PROFILES_ACTIVE", &platform.spring_profile)?;
    if let Some(jvm_options) = platform.jvm_options.as_deref() {
        options.env("JAVA_TOOL_OPTIONS", jvm_options)?;
    }
    options.env("RDS_HOSTNAME", database.endpoint_address())?;
    options.env("RDS_PORT", database.endpoint_port())?;
    options.env("RDS_DB_NAME", &database.db_name)?;
    options.env("RDS_USERNAME", &database.username)?;
    options.env("DB_PASSWORD", database.password())?;
    options.env("APP_SECRETS_ARN", secrets.arn())?;
    for key in secrets.bundle.keys() {
        if let Some(value) = secrets.option_value(key) {
            options.env(key, value)?;
        }
    }
    debug_assert!(options.get(APPLICATION_ENVIRONMENT, DB_SECRET_ARN).is_some());
    Ok(options)
}

/// Declares the application, its single-instance environment and the
/// `ApplicationURL` output.
pub fn build(
    stack: &mut Stack,
    profile: &Profile,
    network: &NetworkTopology,
    database: &DataStoreHandle,
    secrets: &AppSecrets,
) -> Result<ApplicationPlatform> {
    let identities = identities(stack, profile, database, secrets)?;
    let options = option_set(profile, network, database, secrets, &identities)?;
    log::debug!("environment carries {} options", options.len());

    let application_name = profile.qualified_name();
    let application = stack.construct(
        "Application",
        Application {
            application_name: Some(application_name.clone()),
            description: Some(format!("{} Backend Application", profile.display_name)),
        },
    )?;
    let environment = stack.construct(
        "Environment",
        Environment {
            application_name: Value::from(application_name),
            environment_name: Some(profile.qualified_name()),
            solution_stack_name: profile.platform.solution_stack.clone(),
            description: None,
            option_settings: options.into_settings(),
        },
    )?;
    // The application is only named, not read, so order it explicitly.
    stack.add_dependency(&environment, &application)?;

    stack.output(
        "ApplicationURL",
        Output::new(Value::join(
            "",
            [Value::from("http://"), environment.endpoint_url().into()],
        ))
        .with_description("Application URL")
        .with_export_name(profile.url_export_name()),
    )?;

    Ok(ApplicationPlatform { environment })
}
