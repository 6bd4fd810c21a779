//! Command line, environment and deployment profile.
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use snafu::prelude::*;

use crate::error::{ParseProfileSnafu, ReadProfileSnafu, Result};

pub const DEFAULT_REGION: &str = "us-east-1";

#[derive(Parser)]
#[command(name = "infra", about = "Synthesize and deploy the DivTracker backend infrastructure")]
pub struct Cli {
    /// Directory where synthesized templates are written.
    #[arg(long, default_value = "synth.out")]
    pub out_dir: PathBuf,

    /// Account the stack must be deployed to.
    #[arg(long, env = "CDK_DEFAULT_ACCOUNT")]
    pub account: Option<String>,

    /// Region to deploy to, us-east-1 when unset or empty.
    #[arg(long, env = "CDK_DEFAULT_REGION")]
    pub region: Option<String>,

    /// Deployment profile overriding the built-in defaults.
    #[arg(long)]
    pub profile: Option<PathBuf>,

    #[command(flatten)]
    pub secrets: SecretInputs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Write the template and show the deployment schedule.
    Synth,
    /// Show what would change since the last synthesis.
    Plan,
    /// Synthesize and deploy the stack.
    Deploy,
    /// Show the outputs of the deployed stack.
    Outputs,
    /// Tear down the deployed stack.
    Destroy {
        #[clap(long, short, default_value = "false")]
        force: bool,
    },
}

/// Optional application secrets read from the environment.
///
/// Unset and empty values are both treated as absent.
#[derive(Args, Clone, Debug, Default, PartialEq)]
pub struct SecretInputs {
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: Option<String>,
    #[arg(long, env = "FINNHUB_API_KEY", hide_env_values = true)]
    pub finnhub_api_key: Option<String>,
    #[arg(long, env = "FINNHUB_WEBHOOK_SECRET", hide_env_values = true)]
    pub finnhub_webhook_secret: Option<String>,
    #[arg(long, env = "GOOGLE_CLIENT_ID", hide_env_values = true)]
    pub google_client_id: Option<String>,
    #[arg(long, env = "GOOGLE_CLIENT_SECRET", hide_env_values = true)]
    pub google_client_secret: Option<String>,
    #[arg(long, env = "FIREBASE_CREDENTIALS_JSON", hide_env_values = true)]
    pub firebase_credentials_json: Option<String>,
    #[arg(long, env = "FIREBASE_PROJECT_ID", hide_env_values = true)]
    pub firebase_project_id: Option<String>,
}

impl SecretInputs {
    /// Looks up the override for a secret key by its environment name.
    pub fn get(&self, key: &str) -> Option<&str> {
        let value = match key {
            "JWT_SECRET" => &self.jwt_secret,
            "FINNHUB_API_KEY" => &self.finnhub_api_key,
            "FINNHUB_WEBHOOK_SECRET" => &self.finnhub_webhook_secret,
            "GOOGLE_CLIENT_ID" => &self.google_client_id,
            "GOOGLE_CLIENT_SECRET" => &self.google_client_secret,
            "FIREBASE_CREDENTIALS_JSON" => &self.firebase_credentials_json,
            "FIREBASE_PROJECT_ID" => &self.firebase_project_id,
            _ => return None,
        };
        value.as_deref().filter(|v| !v.is_empty())
    }
}

/// Where the stack goes.
#[derive(Clone, Debug, PartialEq)]
pub struct Environment {
    pub account: Option<String>,
    pub region: String,
}

impl Environment {
    pub fn new(account: Option<String>, region: Option<String>) -> Self {
        Environment {
            account: account.filter(|a| !a.is_empty()),
            region: region
                .filter(|r| !r.is_empty())
                .unwrap_or_else(|| DEFAULT_REGION.to_owned()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkProfile {
    pub vpc_cidr: String,
    pub max_azs: u32,
    pub subnet_prefix: u8,
}

impl Default for NetworkProfile {
    fn default() -> Self {
        NetworkProfile {
            vpc_cidr: "10.0.0.0/16".into(),
            max_azs: 2,
            subnet_prefix: 24,
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseProfile {
    pub engine_version: String,
    pub instance_class: String,
    /// GiB
    pub allocated_storage: u32,
    pub storage_type: String,
    /// Days
    pub backup_retention: u32,
    pub port: u16,
    pub db_name: String,
    pub username: String,
    /// Seconds between enhanced monitoring samples, 0 turns it off.
    pub monitoring_interval: u32,
}

impl Default for DatabaseProfile {
    fn default() -> Self {
        DatabaseProfile {
            engine_version: "15".into(),
            instance_class: "db.t3.micro".into(),
            allocated_storage: 20,
            storage_type: "gp3".into(),
            backup_retention: 7,
            port: 5432,
            db_name: "divtracker".into(),
            username: "divtracker".into(),
            monitoring_interval: 60,
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlatformProfile {
    pub solution_stack: String,
    pub instance_type: String,
    pub health_check_path: String,
    pub log_retention_days: u32,
    pub spring_profile: String,
    /// Passed to the JVM as `JAVA_TOOL_OPTIONS`, for example `-Xmx512m`.
    pub jvm_options: Option<String>,
    /// Whether the Firebase credentials for push notifications are wired in.
    pub push_notifications: bool,
}

impl Default for PlatformProfile {
    fn default() -> Self {
        PlatformProfile {
            solution_stack: "64bit Amazon Linux 2023 v4.8.0 running Corretto 17".into(),
            instance_type: "t2.micro".into(),
            health_check_path: "/actuator/health".into(),
            log_retention_days: 7,
            spring_profile: "aws".into(),
            jvm_options: None,
            push_notifications: true,
        }
    }
}

/// Everything that may differ between deployments of the backend.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Profile {
    /// Lowercase prefix of physical names.
    pub app_name: String,
    pub stage: String,
    /// Prefix of the exported output names.
    pub display_name: String,
    pub network: NetworkProfile,
    pub database: DatabaseProfile,
    pub platform: PlatformProfile,
}

impl Default for Profile {
    fn default() -> Self {
        Profile {
            app_name: "divtracker".into(),
            stage: "prod".into(),
            display_name: "DivTracker".into(),
            network: NetworkProfile::default(),
            database: DatabaseProfile::default(),
            platform: PlatformProfile::default(),
        }
    }
}

impl Profile {
    /// Reads a profile from a TOML file, or returns the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            log::debug!("no profile given, using defaults");
            return Ok(Profile::default());
        };
        log::info!("reading profile {path:?}");
        let contents = std::fs::read_to_string(path).context(ReadProfileSnafu { path })?;
        toml::from_str(&contents).context(ParseProfileSnafu { path })
    }

    /// `<app>-<stage>`, the name of the stack and of most physical resources.
    pub fn qualified_name(&self) -> String {
        format!("{}-{}", self.app_name, self.stage)
    }

    /// `<app>-<suffix>`, for names shared by every stage.
    pub fn app_scoped(&self, suffix: &str) -> String {
        format!("{}-{suffix}", self.app_name)
    }

    /// `<app>-<stage>-<suffix>`
    pub fn stage_scoped(&self, suffix: &str) -> String {
        format!("{}-{suffix}", self.qualified_name())
    }

    pub fn url_export_name(&self) -> String {
        format!("{}ApplicationURL", self.display_name)
    }
}
