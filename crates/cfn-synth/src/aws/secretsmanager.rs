//! Secrets Manager constructs and secret references.
use crate::{self as synth, aws::Tag, Construct, HasDependencies, Remote, StackConstruct, Value};

/// Characters left out of generated database passwords, as RDS rejects some
/// of them and others break connection strings.
pub const DATABASE_PASSWORD_EXCLUDES: &str = " %+~`#$&*()|[]{}:;<>?!'/@\"\\";

/// Asks the secret store to generate one key of the secret when it is created.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, HasDependencies)]
#[serde(rename_all = "PascalCase")]
pub struct GenerateSecretString {
    /// JSON object the generated key is added to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_string_template: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generate_string_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_length: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclude_characters: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclude_punctuation: Option<bool>,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, HasDependencies)]
#[serde(rename_all = "PascalCase")]
pub struct Secret {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_string: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generate_secret_string: Option<GenerateSecretString>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
}

impl Construct for Secret {
    const KIND: &'static str = "AWS::SecretsManager::Secret";
}

impl StackConstruct<Secret> {
    pub fn arn(&self) -> Remote {
        self.reference()
    }
}

/// Links a secret to the database it holds credentials for, which adds the
/// connection details to the secret.
#[derive(Clone, Debug, PartialEq, serde::Serialize, HasDependencies)]
#[serde(rename_all = "PascalCase")]
pub struct SecretTargetAttachment {
    pub secret_id: Value,
    pub target_id: Value,
    pub target_type: String,
}

impl Construct for SecretTargetAttachment {
    const KIND: &'static str = "AWS::SecretsManager::SecretTargetAttachment";
}

/// A reference to one key of a JSON secret, resolved by the provisioning
/// engine. The secret value itself never appears in the template.
pub fn dynamic_reference(secret: impl Into<Value>, json_key: &str) -> Value {
    Value::join(
        "",
        [
            Value::from("{{resolve:secretsmanager:"),
            secret.into(),
            Value::from(format!(":SecretString:{json_key}::}}}}")),
        ],
    )
}

/// Renders a flat JSON object whose values may be remote.
///
/// Literal keys and values are escaped, remote values are spliced in between
/// quotes as they resolve to plain text.
pub fn json_object<'a>(entries: impl IntoIterator<Item = (&'a str, Value)>) -> Value {
    let quote = |s: &str| serde_json::Value::String(s.to_owned()).to_string();
    let mut parts = vec![Value::from("{")];
    for (i, (key, value)) in entries.into_iter().enumerate() {
        if i > 0 {
            parts.push(Value::from(","));
        }
        parts.push(Value::from(format!("{}:", quote(key))));
        match value {
            Value::Literal(s) => parts.push(Value::from(quote(&s))),
            other => {
                parts.push(Value::from("\""));
                parts.push(other);
                parts.push(Value::from("\""));
            }
        }
    }
    parts.push(Value::from("}"));
    Value::join("", parts)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn json_object_of_literals_is_valid_json() {
        let value = json_object([
            ("A", Value::from("plain")),
            ("B", Value::from("with \"quotes\"")),
            ("C", Value::from("")),
        ]);
        let text = value.as_literal().expect("all literal");
        let parsed: serde_json::Value = serde_json::from_str(text).unwrap();
        assert_eq!(
            serde_json::json!({"A": "plain", "B": "with \"quotes\"", "C": ""}),
            parsed
        );
    }

    #[test]
    fn json_object_splices_remotes() {
        let value = json_object([
            ("KEY", Value::from("v")),
            ("ARN", Remote::reference("DatabaseSecret").into()),
        ]);
        assert_eq!(
            serde_json::json!({
                "Fn::Join": ["", ["{\"KEY\":\"v\",\"ARN\":\"", {"Ref": "DatabaseSecret"}, "\"}"]]
            }),
            serde_json::to_value(&value).unwrap()
        );
    }

    #[test]
    fn dynamic_reference_shape() {
        let value = dynamic_reference(Remote::reference("DatabaseSecret"), "password");
        assert_eq!(
            serde_json::json!({
                "Fn::Join": ["", [
                    "{{resolve:secretsmanager:",
                    {"Ref": "DatabaseSecret"},
                    ":SecretString:password::}}"
                ]]
            }),
            serde_json::to_value(&value).unwrap()
        );
    }
}
