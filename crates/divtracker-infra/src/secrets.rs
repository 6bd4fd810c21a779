//! Assembling the application secrets into one secret store record.
//!
//! Every key gets its value from two ordered layers. The first layer is a
//! generated value, a placeholder or an empty string. The second is the
//! operator's override, which wins when present and non-empty.
use snafu::prelude::*;
use synth::{
    aws::secretsmanager::{dynamic_reference, json_object, GenerateSecretString, Secret},
    Stack, StackConstruct, Value,
};

use crate::{
    config::{Profile, SecretInputs},
    error::{MultipleGeneratedSnafu, Result},
};

pub const FINNHUB_API_KEY_PLACEHOLDER: &str = "your-finnhub-api-key-here";
pub const FINNHUB_WEBHOOK_SECRET_PLACEHOLDER: &str = "your-webhook-secret-here";
pub const DB_SECRET_ARN: &str = "DB_SECRET_ARN";

const GENERATED_LENGTH: u32 = 64;

enum Fallback {
    /// Generated by the secret store when the record is created.
    Generated,
    /// A placeholder the operator must replace before the first deployment.
    Placeholder(&'static str),
    /// Left empty, the integration stays switched off.
    Empty,
    /// Left empty, with a note on what is switched off.
    Disabled(&'static str),
}

struct KeyRule {
    key: &'static str,
    fallback: Fallback,
    push_only: bool,
}

const KEYS: &[KeyRule] = &[
    KeyRule {
        key: "JWT_SECRET",
        fallback: Fallback::Generated,
        push_only: false,
    },
    KeyRule {
        key: "FINNHUB_API_KEY",
        fallback: Fallback::Placeholder(FINNHUB_API_KEY_PLACEHOLDER),
        push_only: false,
    },
    KeyRule {
        key: "FINNHUB_WEBHOOK_SECRET",
        fallback: Fallback::Placeholder(FINNHUB_WEBHOOK_SECRET_PLACEHOLDER),
        push_only: false,
    },
    KeyRule {
        key: "GOOGLE_CLIENT_ID",
        fallback: Fallback::Empty,
        push_only: false,
    },
    KeyRule {
        key: "GOOGLE_CLIENT_SECRET",
        fallback: Fallback::Empty,
        push_only: false,
    },
    KeyRule {
        key: "FIREBASE_CREDENTIALS_JSON",
        fallback: Fallback::Disabled("push notifications (FCM) will be disabled"),
        push_only: true,
    },
    KeyRule {
        key: "FIREBASE_PROJECT_ID",
        fallback: Fallback::Disabled("push notifications (FCM) will be disabled"),
        push_only: true,
    },
];

/// The value of one key of the bundle.
#[derive(Clone, Debug, PartialEq)]
pub enum SecretValue {
    Literal(String),
    /// Generated by the secret store, never known at synthesis time.
    Generated,
    /// Resolved by the provisioning engine.
    Reference(Value),
}

/// Something the operator should know about the assembled secrets.
#[derive(Clone, Debug, PartialEq)]
pub struct Notice {
    pub level: log::Level,
    pub message: String,
}

impl Notice {
    pub fn log(&self) {
        log::log!(self.level, "{}", self.message);
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SecretBundle {
    entries: Vec<(String, SecretValue)>,
    notices: Vec<Notice>,
}

impl SecretBundle {
    pub fn get(&self, key: &str) -> Option<&SecretValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Keys in record order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SecretValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    fn generated_keys(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, v)| matches!(v, SecretValue::Generated))
            .map(|(k, _)| k.clone())
            .collect()
    }
}

/// Merges the fallbacks with the operator's overrides.
///
/// Never fails: a missing input falls back and may leave a notice.
pub fn assemble(inputs: &SecretInputs, db_secret_arn: Value, push_notifications: bool) -> SecretBundle {
    let mut bundle = SecretBundle::default();
    for rule in KEYS.iter().filter(|s| push_notifications || !s.push_only) {
        let value = match inputs.get(rule.key) {
            Some(value) => SecretValue::Literal(value.to_owned()),
            None => match rule.fallback {
                Fallback::Generated => SecretValue::Generated,
                Fallback::Placeholder(placeholder) => {
                    bundle.notices.push(Notice {
                        level: log::Level::Warn,
                        message: format!(
                            "{} is not set, using the placeholder '{placeholder}'. \
                             Update the secret before the first deployment.",
                            rule.key
                        ),
                    });
                    SecretValue::Literal(placeholder.to_owned())
                }
                Fallback::Empty => SecretValue::Literal(String::new()),
                Fallback::Disabled(what) => {
                    bundle.notices.push(Notice {
                        level: log::Level::Info,
                        message: format!("{} is not set, {what}.", rule.key),
                    });
                    SecretValue::Literal(String::new())
                }
            },
        };
        bundle.entries.push((rule.key.to_owned(), value));
    }
    bundle
        .entries
        .push((DB_SECRET_ARN.to_owned(), SecretValue::Reference(db_secret_arn)));
    bundle
}

/// The provisioned application secret record.
pub struct AppSecrets {
    pub secret: StackConstruct<Secret>,
    pub bundle: SecretBundle,
}

impl AppSecrets {
    pub fn arn(&self) -> Value {
        self.secret.arn().into()
    }

    /// The value the application receives for `key`.
    ///
    /// Generated values are only known to the secret store, so they are read
    /// from the record at provisioning time.
    pub fn option_value(&self, key: &str) -> Option<Value> {
        Some(match self.bundle.get(key)? {
            SecretValue::Literal(value) => Value::from(value),
            SecretValue::Generated => dynamic_reference(self.secret.arn(), key),
            SecretValue::Reference(value) => value.clone(),
        })
    }
}

fn record_value(value: &SecretValue) -> Value {
    match value {
        SecretValue::Literal(value) => Value::from(value),
        SecretValue::Reference(value) => value.clone(),
        // Filtered out before rendering.
        SecretValue::Generated => Value::from(""),
    }
}

/// Writes the bundle as one JSON record named `<app>-<stage>-secrets`.
///
/// A generated key is produced from a template holding every other key, so
/// changing any literal value later also regenerates the generated one. For a
/// stable `JWT_SECRET` across such changes, set it explicitly.
pub fn provision(stack: &mut Stack, profile: &Profile, bundle: SecretBundle) -> Result<AppSecrets> {
    let generated = bundle.generated_keys();
    ensure!(
        generated.len() <= 1,
        MultipleGeneratedSnafu {
            keys: generated.clone()
        }
    );
    let body = json_object(
        bundle
            .iter()
            .filter(|(_, v)| !matches!(v, SecretValue::Generated))
            .map(|(k, v)| (k, record_value(v))),
    );
    let (secret_string, generate_secret_string) = match generated.first() {
        None => (Some(body), None),
        Some(key) => (
            None,
            Some(GenerateSecretString {
                secret_string_template: Some(body),
                generate_string_key: Some(key.clone()),
                password_length: Some(GENERATED_LENGTH),
                exclude_characters: None,
                exclude_punctuation: Some(true),
            }),
        ),
    };
    let secret = stack.construct(
        "AppSecrets",
        Secret {
            name: Some(profile.stage_scoped("secrets")),
            description: Some(format!(
                "Application secrets of {}",
                profile.qualified_name()
            )),
            secret_string,
            generate_secret_string,
            tags: vec![],
        },
    )?;
    Ok(AppSecrets { secret, bundle })
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    fn db_arn() -> Value {
        Value::from("arn:aws:secretsmanager:us-east-1:123456789012:secret:db")
    }

    fn literal<'a>(bundle: &'a SecretBundle, key: &str) -> &'a str {
        match bundle.get(key) {
            Some(SecretValue::Literal(value)) => value,
            other => panic!("{key} is not a literal: {other:?}"),
        }
    }

    #[test]
    fn unset_inputs_fall_back() {
        let bundle = assemble(&SecretInputs::default(), db_arn(), true);
        assert_eq!(
            vec![
                "JWT_SECRET",
                "FINNHUB_API_KEY",
                "FINNHUB_WEBHOOK_SECRET",
                "GOOGLE_CLIENT_ID",
                "GOOGLE_CLIENT_SECRET",
                "FIREBASE_CREDENTIALS_JSON",
                "FIREBASE_PROJECT_ID",
                "DB_SECRET_ARN",
            ],
            bundle.keys().collect::<Vec<_>>()
        );
        assert_eq!(Some(&SecretValue::Generated), bundle.get("JWT_SECRET"));
        assert_eq!(FINNHUB_API_KEY_PLACEHOLDER, literal(&bundle, "FINNHUB_API_KEY"));
        assert_eq!(
            FINNHUB_WEBHOOK_SECRET_PLACEHOLDER,
            literal(&bundle, "FINNHUB_WEBHOOK_SECRET")
        );
        assert_eq!("", literal(&bundle, "GOOGLE_CLIENT_ID"));
        assert_eq!("", literal(&bundle, "FIREBASE_PROJECT_ID"));
        assert_eq!(
            Some(&SecretValue::Reference(db_arn())),
            bundle.get(DB_SECRET_ARN)
        );

        let levels: Vec<log::Level> = bundle.notices().iter().map(|n| n.level).collect();
        assert_eq!(
            vec![
                log::Level::Warn,
                log::Level::Warn,
                log::Level::Info,
                log::Level::Info
            ],
            levels
        );
        assert!(bundle.notices()[0].message.contains("FINNHUB_API_KEY"));
    }

    #[test]
    fn overrides_win_and_empty_is_absent() {
        let inputs = SecretInputs {
            jwt_secret: Some("signing-key".into()),
            finnhub_api_key: Some("real-key".into()),
            finnhub_webhook_secret: Some(String::new()),
            google_client_id: Some("client-id".into()),
            ..Default::default()
        };
        let bundle = assemble(&inputs, db_arn(), true);
        assert_eq!("signing-key", literal(&bundle, "JWT_SECRET"));
        assert_eq!("real-key", literal(&bundle, "FINNHUB_API_KEY"));
        assert_eq!(
            FINNHUB_WEBHOOK_SECRET_PLACEHOLDER,
            literal(&bundle, "FINNHUB_WEBHOOK_SECRET")
        );
        assert_eq!("client-id", literal(&bundle, "GOOGLE_CLIENT_ID"));
        let warnings = bundle
            .notices()
            .iter()
            .filter(|n| n.level == log::Level::Warn)
            .count();
        assert_eq!(1, warnings);
    }

    #[test]
    fn push_notifications_off_drops_firebase() {
        let bundle = assemble(&SecretInputs::default(), db_arn(), false);
        assert!(bundle.get("FIREBASE_CREDENTIALS_JSON").is_none());
        assert!(bundle.get("FIREBASE_PROJECT_ID").is_none());
        assert!(bundle.notices().iter().all(|n| n.level == log::Level::Warn));
    }

    #[test]
    fn every_key_once() {
        let bundle = assemble(&SecretInputs::default(), db_arn(), true);
        let mut keys: Vec<&str> = bundle.keys().collect();
        let total = keys.len();
        keys.sort();
        keys.dedup();
        assert_eq!(total, keys.len());
    }

    #[test]
    fn record_carries_everything_but_the_generated_key() {
        let mut stack = Stack::new("secrets-test");
        let db = stack.construct("DatabaseSecret", Secret::default()).unwrap();
        let bundle = assemble(&SecretInputs::default(), db.arn().into(), true);
        let secrets = provision(&mut stack, &Profile::default(), bundle).unwrap();

        let synthesis = stack.synth().unwrap();
        let record = &synthesis.template.resources["AppSecrets"];
        assert_eq!(
            Some(&serde_json::json!("divtracker-prod-secrets")),
            record.property("Name")
        );
        assert!(record.property("SecretString").is_none());
        let generate = record.property("GenerateSecretString").unwrap();
        assert_eq!("JWT_SECRET", generate["GenerateStringKey"]);
        let template = generate["SecretStringTemplate"].to_string();
        assert!(!template.contains("JWT_SECRET"), "{template}");
        assert!(template.contains("FINNHUB_API_KEY"), "{template}");
        assert!(template.contains("{\"Ref\":\"DatabaseSecret\"}"), "{template}");

        assert_eq!(
            Some(dynamic_reference(secrets.secret.arn(), "JWT_SECRET")),
            secrets.option_value("JWT_SECRET")
        );
        assert_eq!(Some(Value::from("")), secrets.option_value("GOOGLE_CLIENT_ID"));
        assert_eq!(Some(Value::from(db.arn())), secrets.option_value(DB_SECRET_ARN));
        assert_eq!(None, secrets.option_value("NOT_A_KEY"));
    }

    #[test]
    fn overridden_bundle_is_a_plain_record() {
        let mut stack = Stack::new("secrets-test");
        let inputs = SecretInputs {
            jwt_secret: Some("signing-key".into()),
            ..Default::default()
        };
        let bundle = assemble(&inputs, Value::from("arn:db"), false);
        provision(&mut stack, &Profile::default(), bundle).unwrap();
        let synthesis = stack.synth().unwrap();
        let record = &synthesis.template.resources["AppSecrets"];
        let body: serde_json::Value =
            serde_json::from_str(record.property("SecretString").unwrap().as_str().unwrap())
                .unwrap();
        assert_eq!("signing-key", body["JWT_SECRET"]);
        assert_eq!("arn:db", body[DB_SECRET_ARN]);
    }

    #[test]
    fn at_most_one_generated_key() {
        let mut stack = Stack::new("secrets-test");
        let bundle = SecretBundle {
            entries: vec![
                ("A".into(), SecretValue::Generated),
                ("B".into(), SecretValue::Generated),
            ],
            notices: vec![],
        };
        assert!(matches!(
            provision(&mut stack, &Profile::default(), bundle),
            Err(crate::error::Error::MultipleGenerated { .. })
        ));
    }
}
