//! Hands a synthesized template to CloudFormation and waits for it to settle.
use std::time::Duration;

use anyhow::Context;
use aws_sdk_cloudformation::{
    error::ProvideErrorMetadata,
    types::{Capability, Stack as DeployedStack, Tag},
    Client,
};

use crate::Synthesis;

const POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Loads AWS configuration from the environment, pinned to `region`.
pub async fn load_config(region: impl Into<String>) -> aws_config::SdkConfig {
    aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(aws_sdk_cloudformation::config::Region::new(region.into()))
        .load()
        .await
}

/// One output of a deployed stack.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct StackOutput {
    pub key: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DeployOutcome {
    /// Whether CloudFormation was asked to change anything.
    pub changed: bool,
    pub outputs: Vec<StackOutput>,
}

/// The account id embedded in a stack ARN.
pub fn account_of_stack_id(stack_id: &str) -> Option<&str> {
    stack_id.split(':').nth(4).filter(|s| !s.is_empty())
}

fn check_account(stack: &DeployedStack, expected: Option<&str>) -> anyhow::Result<()> {
    let (Some(expected), Some(stack_id)) = (expected, stack.stack_id()) else {
        return Ok(());
    };
    match account_of_stack_id(stack_id) {
        Some(account) if account != expected => anyhow::bail!(
            "stack '{stack_id}' lives in account {account}, but account {expected} was requested"
        ),
        _ => Ok(()),
    }
}

fn status_of(stack: &DeployedStack) -> &str {
    stack.stack_status().map(|s| s.as_str()).unwrap_or("UNKNOWN")
}

async fn describe(client: &Client, name: &str) -> anyhow::Result<Option<DeployedStack>> {
    match client.describe_stacks().stack_name(name).send().await {
        Ok(out) => Ok(out.stacks().first().cloned()),
        Err(e) if e.message().map(|m| m.contains("does not exist")).unwrap_or(false) => {
            Ok(None)
        }
        Err(e) => Err(anyhow::Error::new(e).context(format!("could not describe stack '{name}'"))),
    }
}

/// Polls until the stack leaves every `*_IN_PROGRESS` state.
///
/// Returns `None` once a deleted stack is gone.
async fn wait_until_settled(client: &Client, name: &str) -> anyhow::Result<Option<DeployedStack>> {
    loop {
        let Some(stack) = describe(client, name).await? else {
            return Ok(None);
        };
        let status = status_of(&stack);
        if !status.ends_with("_IN_PROGRESS") {
            log::info!("stack '{name}' settled in {status}");
            return Ok(Some(stack));
        }
        log::info!("stack '{name}' is {status}, waiting...");
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

fn outputs_of(stack: &DeployedStack) -> Vec<StackOutput> {
    stack
        .outputs()
        .iter()
        .filter_map(|o| {
            Some(StackOutput {
                key: o.output_key()?.to_owned(),
                value: o.output_value()?.to_owned(),
                export_name: o.export_name().map(str::to_owned),
            })
        })
        .collect()
}

/// Converts `(key, value)` pairs into CloudFormation stack tags.
pub fn stack_tags(tags: &[(String, String)]) -> Vec<Tag> {
    tags.iter()
        .map(|(k, v)| Tag::builder().key(k).value(v).build())
        .collect()
}

async fn deployed_template(client: &Client, name: &str) -> anyhow::Result<serde_json::Value> {
    let out = client
        .get_template()
        .stack_name(name)
        .send()
        .await
        .with_context(|| format!("could not fetch the template of '{name}'"))?;
    let body = out.template_body().context("missing template body")?;
    Ok(serde_json::from_str(body)?)
}

/// Creates or updates the stack so that it matches `synthesis`.
///
/// Nothing is sent when the deployed template already equals the synthesized
/// one. A stack left in `ROLLBACK_COMPLETE` by a failed creation is deleted
/// and created again.
pub async fn deploy(
    cfg: &aws_config::SdkConfig,
    synthesis: &Synthesis,
    tags: &[(String, String)],
    expected_account: Option<&str>,
) -> anyhow::Result<DeployOutcome> {
    let client = Client::new(cfg);
    let name = synthesis.stack_name.as_str();
    let body = synthesis.to_json_pretty()?;

    let mut existing = wait_until_settled(&client, name).await?;
    if let Some(stack) = existing.as_ref() {
        check_account(stack, expected_account)?;
        if status_of(stack) == "ROLLBACK_COMPLETE" {
            log::warn!("stack '{name}' failed to create earlier, deleting it first");
            client.delete_stack().stack_name(name).send().await?;
            existing = wait_until_settled(&client, name).await?;
        }
    }

    let tags = stack_tags(tags);

    match existing {
        Some(stack) if status_of(&stack) != "DELETE_COMPLETE" => {
            let current = serde_json::to_value(&synthesis.template)?;
            if deployed_template(&client, name).await? == current {
                log::info!("stack '{name}' is up to date");
                return Ok(DeployOutcome {
                    changed: false,
                    outputs: outputs_of(&stack),
                });
            }
            log::info!("updating stack '{name}'");
            let result = client
                .update_stack()
                .stack_name(name)
                .template_body(body)
                .capabilities(Capability::CapabilityNamedIam)
                .set_tags(Some(tags))
                .send()
                .await;
            if let Err(e) = result {
                if e.message()
                    .map(|m| m.contains("No updates are to be performed"))
                    .unwrap_or(false)
                {
                    log::info!("stack '{name}' reported no updates");
                    return Ok(DeployOutcome {
                        changed: false,
                        outputs: outputs_of(&stack),
                    });
                }
                return Err(anyhow::Error::new(e).context(format!("could not update '{name}'")));
            }
        }
        _ => {
            log::info!("creating stack '{name}'");
            let out = client
                .create_stack()
                .stack_name(name)
                .template_body(body)
                .capabilities(Capability::CapabilityNamedIam)
                .set_tags(Some(tags))
                .send()
                .await
                .with_context(|| format!("could not create '{name}'"))?;
            if let (Some(expected), Some(account)) =
                (expected_account, out.stack_id().and_then(account_of_stack_id))
            {
                anyhow::ensure!(
                    expected == account,
                    "stack '{name}' is being created in account {account}, but account {expected} was requested"
                );
            }
        }
    }

    let stack = wait_until_settled(&client, name)
        .await?
        .with_context(|| format!("stack '{name}' disappeared while deploying"))?;
    let status = status_of(&stack);
    anyhow::ensure!(
        status.ends_with("_COMPLETE") && !status.contains("ROLLBACK"),
        "deploying '{name}' ended in {status}: {}",
        stack.stack_status_reason().unwrap_or("no reason given")
    );
    Ok(DeployOutcome {
        changed: true,
        outputs: outputs_of(&stack),
    })
}

/// Reads the outputs of a deployed stack.
pub async fn outputs(cfg: &aws_config::SdkConfig, name: &str) -> anyhow::Result<Vec<StackOutput>> {
    let client = Client::new(cfg);
    let stack = describe(&client, name)
        .await?
        .with_context(|| format!("stack '{name}' does not exist"))?;
    Ok(outputs_of(&stack))
}

/// Deletes the stack and waits for it to be gone.
///
/// Resources carrying a deletion policy that keeps data leave a snapshot or
/// the resource itself behind.
pub async fn destroy(cfg: &aws_config::SdkConfig, name: &str) -> anyhow::Result<()> {
    let client = Client::new(cfg);
    if describe(&client, name).await?.is_none() {
        log::info!("stack '{name}' does not exist, nothing to destroy");
        return Ok(());
    }
    client
        .delete_stack()
        .stack_name(name)
        .send()
        .await
        .with_context(|| format!("could not delete '{name}'"))?;
    if let Some(stack) = wait_until_settled(&client, name).await? {
        let status = status_of(&stack);
        anyhow::ensure!(
            status == "DELETE_COMPLETE",
            "deleting '{name}' ended in {status}: {}",
            stack.stack_status_reason().unwrap_or("no reason given")
        );
    }
    Ok(())
}
