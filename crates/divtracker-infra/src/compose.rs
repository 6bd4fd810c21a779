//! Wires the components of the backend stack together.
use synth::{Stack, Synthesis};

use crate::{
    config::{Profile, SecretInputs},
    database, network, platform,
    secrets::{self, Notice},
};

pub const MANAGED_BY: &str = "cfn-synth";

/// A synthesized stack and what the operator should hear about it.
pub struct Composition {
    pub synthesis: Synthesis,
    pub notices: Vec<Notice>,
}

/// Stack level tags, propagated by CloudFormation to the resources.
pub fn stack_tags(profile: &Profile) -> Vec<(String, String)> {
    vec![
        ("Project".to_owned(), profile.display_name.clone()),
        ("ManagedBy".to_owned(), MANAGED_BY.to_owned()),
    ]
}

/// Declares network, database, secrets and platform, in that order, and
/// synthesizes the stack.
pub fn synthesize(profile: &Profile, inputs: &SecretInputs) -> crate::error::Result<Composition> {
    let mut stack = Stack::new(profile.qualified_name()).with_description(format!(
        "{} backend: VPC, PostgreSQL, secrets and Elastic Beanstalk",
        profile.display_name
    ));

    let network = network::build(&mut stack, profile)?;
    let database = database::build(&mut stack, profile, &network)?;

    let bundle = secrets::assemble(
        inputs,
        database.secret_arn().into(),
        profile.platform.push_notifications,
    );
    for notice in bundle.notices() {
        notice.log();
    }
    let notices = bundle.notices().to_vec();
    let app_secrets = secrets::provision(&mut stack, profile, bundle)?;

    let platform = platform::build(&mut stack, profile, &network, &database, &app_secrets)?;
    log::debug!("declared environment '{}'", platform.environment.id());

    let synthesis = stack.synth()?;
    Ok(Composition { synthesis, notices })
}

/// Awaits `apply` and only then records the template in `out_dir`, so that
/// later plans compare against what was actually applied.
pub async fn apply_then_save<T>(
    synthesis: &Synthesis,
    out_dir: &std::path::Path,
    apply: impl std::future::Future<Output = anyhow::Result<T>>,
) -> crate::error::Result<T> {
    let outcome = apply.await?;
    synthesis.save(out_dir).await?;
    Ok(outcome)
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn end_to_end_with_defaults() {
        let _ = env_logger::builder().is_test(true).try_init();

        let composition = synthesize(&Profile::default(), &SecretInputs::default()).unwrap();
        let template = &composition.synthesis.template;
        assert_eq!("divtracker-prod", composition.synthesis.stack_name);

        assert_eq!(4, template.resources_of_kind("AWS::EC2::Subnet").count());
        assert_eq!(2, template.resources_of_kind("AWS::EC2::SecurityGroup").count());

        let databases: Vec<&str> = template.resources_of_kind("AWS::RDS::DBInstance").collect();
        assert_eq!(vec!["DatabaseInstance"], databases);
        let db = &template.resources["DatabaseInstance"];
        assert_eq!(Some(&serde_json::json!("db.t3.micro")), db.property("DBInstanceClass"));
        assert_eq!(Some(&serde_json::json!(false)), db.property("MultiAZ"));
        assert_eq!(Some(&serde_json::json!(true)), db.property("StorageEncrypted"));

        let records: Vec<&str> = template
            .resources_of_kind("AWS::SecretsManager::Secret")
            .collect();
        assert_eq!(vec!["AppSecrets", "DatabaseSecret"], records);
        let record = template.resources["AppSecrets"].properties.to_string();
        assert!(record.contains(crate::secrets::FINNHUB_API_KEY_PLACEHOLDER));
        assert!(composition
            .notices
            .iter()
            .any(|n| n.level == log::Level::Warn && n.message.contains("FINNHUB_API_KEY")));

        let environments: Vec<&str> = template
            .resources_of_kind("AWS::ElasticBeanstalk::Environment")
            .collect();
        assert_eq!(vec!["Environment"], environments);
        let settings = template.resources["Environment"]
            .property("OptionSettings")
            .unwrap()
            .as_array()
            .unwrap();
        let env_value = |name: &str| {
            settings
                .iter()
                .find(|s| s["OptionName"] == name)
                .map(|s| s["Value"].clone())
                .unwrap()
        };
        assert_eq!("SingleInstance", env_value("EnvironmentType"));
        assert_eq!(
            serde_json::json!({ "Fn::GetAtt": ["DatabaseInstance", "Endpoint.Address"] }),
            env_value("RDS_HOSTNAME")
        );
        assert_eq!(
            serde_json::json!({ "Fn::GetAtt": ["DatabaseInstance", "Endpoint.Port"] }),
            env_value("RDS_PORT")
        );
    }

    #[test]
    fn synthesis_is_idempotent() {
        let profile = Profile::default();
        let inputs = SecretInputs::default();
        let first = synthesize(&profile, &inputs).unwrap().synthesis;
        let second = synthesize(&profile, &inputs).unwrap().synthesis;
        assert_eq!(first.digest().unwrap(), second.digest().unwrap());
        assert_eq!(first.batches, second.batches);
    }

    #[test]
    fn components_are_ordered() {
        let synthesis = synthesize(&Profile::default(), &SecretInputs::default())
            .unwrap()
            .synthesis;
        let order: Vec<&str> = synthesis.order().collect();
        let position = |id: &str| order.iter().position(|o| *o == id).unwrap();
        assert!(position("Vpc") < position("DatabaseSecurityGroup"));
        assert!(position("DatabaseSecurityGroup") < position("DatabaseInstance"));
        assert!(position("DatabaseSecret") < position("AppSecrets"));
        assert!(position("AppSecrets") < position("InstanceRole"));
        assert!(position("DatabaseInstance") < position("Environment"));
        assert!(position("InstanceProfile") < position("Environment"));
    }

    #[tokio::test]
    async fn saved_template_plans_no_changes() {
        let dir = tempfile::tempdir().unwrap();
        let profile = Profile::default();
        let inputs = SecretInputs::default();
        let first = synthesize(&profile, &inputs).unwrap().synthesis;
        first.save(dir.path()).await.unwrap();

        let plan = synthesize(&profile, &inputs)
            .unwrap()
            .synthesis
            .plan(dir.path())
            .unwrap();
        assert!(!plan.has_changes(), "{plan}");

        let changed = SecretInputs {
            finnhub_api_key: Some("real-key".into()),
            ..Default::default()
        };
        let plan = synthesize(&profile, &changed)
            .unwrap()
            .synthesis
            .plan(dir.path())
            .unwrap();
        assert_eq!(
            synth::Action::Update,
            plan.get("AppSecrets").unwrap().action
        );
        // The generated JWT_SECRET shares the record template with the
        // changed key, so it is regenerated too.
        assert!(
            plan.warnings
                .iter()
                .any(|w| w.contains("'AppSecrets'") && w.contains("regenerated")),
            "{:?}",
            plan.warnings
        );
        assert_eq!(
            synth::Action::Update,
            plan.get("Environment").unwrap().action
        );
        assert_eq!(synth::Action::Keep, plan.get("Vpc").unwrap().action);
    }

    #[tokio::test]
    async fn failed_apply_leaves_previous_template() {
        let dir = tempfile::tempdir().unwrap();
        let profile = Profile::default();
        let synthesis = synthesize(&profile, &SecretInputs::default())
            .unwrap()
            .synthesis;

        let result = apply_then_save(&synthesis, dir.path(), async {
            Err::<(), _>(anyhow::anyhow!("UPDATE_ROLLBACK_COMPLETE"))
        })
        .await;
        assert!(matches!(result, Err(crate::error::Error::Deploy { .. })));
        assert!(!synthesis.template_path(dir.path()).exists());
        let plan = synthesis.plan(dir.path()).unwrap();
        assert!(plan.has_changes(), "a failed apply must still show changes");

        let applied = apply_then_save(&synthesis, dir.path(), async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(7, applied);
        assert!(!synthesis.plan(dir.path()).unwrap().has_changes());
    }

    #[test]
    fn tags() {
        assert_eq!(
            vec![
                ("Project".to_owned(), "DivTracker".to_owned()),
                ("ManagedBy".to_owned(), MANAGED_BY.to_owned()),
            ],
            stack_tags(&Profile::default())
        );
    }
}
