use crate::{self as synth, *};

#[derive(Clone, Debug, PartialEq, serde::Serialize, HasDependencies)]
#[serde(rename_all = "PascalCase")]
struct Bucket {
    bucket_name: String,
}

impl Construct for Bucket {
    const KIND: &'static str = "Test::Storage::Bucket";
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, HasDependencies)]
#[serde(rename_all = "PascalCase")]
struct Service {
    bucket_arn: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    upstream: Option<Value>,
}

impl Construct for Service {
    const KIND: &'static str = "Test::Compute::Service";
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, HasDependencies)]
#[serde(rename_all = "PascalCase")]
struct Database {
    size: u32,
}

impl Construct for Database {
    const KIND: &'static str = "Test::Data::Database";

    fn deletion_policy(&self) -> Option<DeletionPolicy> {
        Some(DeletionPolicy::Snapshot)
    }
}

fn bucket(name: &str) -> Bucket {
    Bucket {
        bucket_name: name.into(),
    }
}

fn service_of(bucket: &StackConstruct<Bucket>) -> Service {
    Service {
        bucket_arn: bucket.attribute("Arn").into(),
        upstream: None,
    }
}

#[test]
fn schedule_follows_dependencies() {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut stack = Stack::new("sanity");
    let a = stack.construct("BucketA", bucket("a")).unwrap();
    let b = stack.construct("BucketB", bucket("b")).unwrap();
    let svc = stack.construct("Service", service_of(&a)).unwrap();
    let _downstream = stack
        .construct(
            "Downstream",
            Service {
                bucket_arn: b.reference().into(),
                upstream: Some(svc.reference().into()),
            },
        )
        .unwrap();

    let synthesis = stack.synth().unwrap();
    log::info!("schedule:\n{}", synthesis.get_schedule_string());
    let order: Vec<&str> = synthesis.order().collect();
    let position = |id: &str| order.iter().position(|o| *o == id).unwrap();
    assert!(position("BucketA") < position("Service"));
    assert!(position("BucketB") < position("Downstream"));
    assert!(position("Service") < position("Downstream"));
    assert_eq!(4, order.len());

    // Both buckets are independent, so they can be realized together.
    assert!(synthesis.batches[0].contains(&"BucketA".to_owned()));
    assert!(synthesis.batches[0].contains(&"BucketB".to_owned()));

    let service = &synthesis.template.resources["Service"];
    assert_eq!("Test::Compute::Service", service.kind);
    assert_eq!(
        serde_json::json!({ "BucketArn": { "Fn::GetAtt": ["BucketA", "Arn"] } }),
        service.properties
    );
    assert!(service.depends_on.is_empty(), "reads are not rendered as DependsOn");
}

#[test]
fn undeclared_dependency_is_rejected() {
    let mut elsewhere = Stack::new("elsewhere");
    let a = elsewhere.construct("BucketA", bucket("a")).unwrap();

    let mut stack = Stack::new("sanity");
    let err = stack.construct("Service", service_of(&a)).unwrap_err();
    assert!(
        matches!(&err, Error::MissingResource { name } if name == "BucketA"),
        "unexpected error: {err}"
    );
}

#[test]
fn ids_are_validated() {
    let mut stack = Stack::new("sanity");
    stack.construct("Bucket", bucket("a")).unwrap();
    assert!(matches!(
        stack.construct("Bucket", bucket("b")),
        Err(Error::DuplicateId { .. })
    ));
    assert!(matches!(
        stack.construct("my-bucket", bucket("c")),
        Err(Error::InvalidId { .. })
    ));
    assert!(matches!(
        stack.construct("", bucket("d")),
        Err(Error::InvalidId { .. })
    ));
}

#[test]
fn explicit_dependencies_render_and_order() {
    let mut stack = Stack::new("sanity");
    let late = stack.construct("Late", bucket("late")).unwrap();
    let early = stack.construct("Early", bucket("early")).unwrap();
    stack.add_dependency(&late, &early).unwrap();
    // Declaring the same edge twice keeps one.
    stack.add_dependency(&late, &early).unwrap();

    let synthesis = stack.synth().unwrap();
    let order: Vec<&str> = synthesis.order().collect();
    assert_eq!(vec!["Early", "Late"], order);
    assert_eq!(
        vec!["Early".to_owned()],
        synthesis.template.resources["Late"].depends_on
    );
}

#[test]
fn cycles_fail_to_schedule() {
    let mut stack = Stack::new("sanity");
    let a = stack.construct("BucketA", bucket("a")).unwrap();
    let svc = stack.construct("Service", service_of(&a)).unwrap();
    stack.add_dependency(&a, &svc).unwrap();
    let err = stack.synth().unwrap_err();
    assert!(matches!(err, Error::Schedule { .. }), "unexpected error: {err}");
}

#[test]
fn deletion_policy_is_rendered() {
    let mut stack = Stack::new("sanity");
    stack.construct("Data", Database { size: 20 }).unwrap();
    stack.construct("Bucket", bucket("a")).unwrap();
    let template = stack.synth().unwrap().template;

    let json = serde_json::to_value(&template).unwrap();
    assert_eq!("2010-09-09", json["AWSTemplateFormatVersion"]);
    assert_eq!("Snapshot", json["Resources"]["Data"]["DeletionPolicy"]);
    assert_eq!("Snapshot", json["Resources"]["Data"]["UpdateReplacePolicy"]);
    assert!(json["Resources"]["Bucket"].get("DeletionPolicy").is_none());
}

#[test]
fn outputs_are_checked() {
    let mut stack = Stack::new("sanity");
    let a = stack.construct("BucketA", bucket("a")).unwrap();
    stack
        .output(
            "BucketArn",
            Output::new(a.attribute("Arn"))
                .with_description("arn of a")
                .with_export_name("SanityBucketArn"),
        )
        .unwrap();
    assert!(matches!(
        stack.output("BucketArn", Output::new("x")),
        Err(Error::DuplicateOutput { .. })
    ));
    assert!(matches!(
        stack.output(
            "Other",
            Output::new("x").with_export_name("SanityBucketArn")
        ),
        Err(Error::DuplicateExport { .. })
    ));

    let mut elsewhere = Stack::new("elsewhere");
    let b = elsewhere.construct("BucketB", bucket("b")).unwrap();
    assert!(matches!(
        stack.output("Missing", Output::new(b.reference())),
        Err(Error::MissingResource { .. })
    ));

    let json = serde_json::to_value(stack.synth().unwrap().template).unwrap();
    assert_eq!(
        serde_json::json!({
            "Value": { "Fn::GetAtt": ["BucketA", "Arn"] },
            "Description": "arn of a",
            "Export": { "Name": "SanityBucketArn" }
        }),
        json["Outputs"]["BucketArn"]
    );
}

#[test]
fn digest_is_stable() {
    let declare = || {
        let mut stack = Stack::new("sanity");
        let a = stack.construct("BucketA", bucket("a")).unwrap();
        stack.construct("Service", service_of(&a)).unwrap();
        stack.synth().unwrap()
    };
    assert_eq!(declare().digest().unwrap(), declare().digest().unwrap());
    assert_eq!(
        declare().to_json_pretty().unwrap(),
        declare().to_json_pretty().unwrap()
    );
}

#[tokio::test]
async fn plan_against_previous_template() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempfile::tempdir().unwrap();

    let mut stack = Stack::new("sanity");
    let a = stack.construct("BucketA", bucket("a")).unwrap();
    stack.construct("Service", service_of(&a)).unwrap();
    stack.construct("Data", Database { size: 20 }).unwrap();
    let first = stack.synth().unwrap();

    let plan = first.plan(dir.path()).unwrap();
    assert!(plan.actions.iter().all(|a| a.action == Action::Create));
    assert!(plan.warnings.is_empty(), "no warnings on first plan");
    let path = first.save(dir.path()).await.unwrap();
    assert_eq!(dir.path().join("sanity.template.json"), path);
    assert_eq!(
        Some(first.digest().unwrap()),
        utils::sha256_digest(&path).unwrap()
    );

    let plan = first.plan(dir.path()).unwrap();
    assert!(!plan.has_changes(), "{plan}");

    // Bucket A is renamed, bucket B appears, the database is dropped.
    let mut stack = Stack::new("sanity");
    let a = stack.construct("BucketA", bucket("a-renamed")).unwrap();
    let b = stack.construct("BucketB", bucket("b")).unwrap();
    stack
        .construct(
            "Service",
            Service {
                bucket_arn: a.attribute("Arn").into(),
                upstream: None,
            },
        )
        .unwrap();
    let _ = b;
    let second = stack.synth().unwrap();
    let plan = second.plan(dir.path()).unwrap();
    log::info!("plan:\n{plan}");

    assert_eq!(Action::Update, plan.get("BucketA").unwrap().action);
    assert_eq!(Action::Create, plan.get("BucketB").unwrap().action);
    assert_eq!(Action::Keep, plan.get("Service").unwrap().action);
    let orphan = plan.get("Data").unwrap();
    assert_eq!(Action::Destroy, orphan.action);
    assert!(orphan.is_orphan);
    assert_eq!(1, plan.warnings.len());
    assert!(plan.warnings[0].contains("Snapshot"), "{:?}", plan.warnings);
}

#[tokio::test]
async fn replaced_upstream_updates_readers() {
    let dir = tempfile::tempdir().unwrap();

    let mut stack = Stack::new("sanity");
    let a = stack.construct("Source", bucket("a")).unwrap();
    stack.construct("Service", service_of(&a)).unwrap();
    stack.synth().unwrap().save(dir.path()).await.unwrap();

    let mut stack = Stack::new("sanity");
    let a = stack.construct("Source", Database { size: 1 }).unwrap();
    stack
        .construct(
            "Service",
            Service {
                bucket_arn: a.attribute("Arn").into(),
                upstream: None,
            },
        )
        .unwrap();
    let plan = stack.synth().unwrap().plan(dir.path()).unwrap();
    assert_eq!(Action::Replace, plan.get("Source").unwrap().action);
    assert_eq!(Action::Update, plan.get("Service").unwrap().action);
    assert!(plan.warnings[0].contains("changes type"));
}

#[tokio::test]
async fn saved_template_is_readable_immediately() {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..200 {
        let mut stack = Stack::new("sanity");
        stack
            .construct("Bucket", bucket(&format!("bucket-{i}")))
            .unwrap();
        let synthesis = stack.synth().unwrap();
        let path = synthesis.save(dir.path()).await.unwrap();

        let on_disk = std::fs::read_to_string(&path).unwrap();
        assert_eq!(synthesis.to_json_pretty().unwrap(), on_disk, "save #{i}");
        assert_eq!(
            Some(synthesis.digest().unwrap()),
            utils::sha256_digest(&path).unwrap()
        );
        assert_eq!(
            Some(synthesis.template.clone()),
            synthesis.read_previous(dir.path()).unwrap()
        );
    }
}

#[tokio::test]
async fn regenerated_secret_is_flagged() {
    use crate::aws::secretsmanager::{GenerateSecretString, Secret};

    let secret = |template: &str, description: &str| Secret {
        description: Some(description.into()),
        generate_secret_string: Some(GenerateSecretString {
            secret_string_template: Some(Value::from(template)),
            generate_string_key: Some("token".into()),
            ..Default::default()
        }),
        ..Default::default()
    };
    let dir = tempfile::tempdir().unwrap();
    let mut stack = Stack::new("sanity");
    stack.construct("Token", secret("{\"a\":\"1\"}", "first")).unwrap();
    stack.synth().unwrap().save(dir.path()).await.unwrap();

    // Only the description changes, the generated value survives.
    let mut stack = Stack::new("sanity");
    stack.construct("Token", secret("{\"a\":\"1\"}", "second")).unwrap();
    let plan = stack.synth().unwrap().plan(dir.path()).unwrap();
    assert_eq!(Action::Update, plan.get("Token").unwrap().action);
    assert!(plan.warnings.is_empty(), "{:?}", plan.warnings);

    let mut stack = Stack::new("sanity");
    stack.construct("Token", secret("{\"a\":\"2\"}", "first")).unwrap();
    let plan = stack.synth().unwrap().plan(dir.path()).unwrap();
    assert_eq!(Action::Update, plan.get("Token").unwrap().action);
    assert_eq!(1, plan.warnings.len());
    assert!(plan.warnings[0].contains("regenerated"), "{:?}", plan.warnings);
}
