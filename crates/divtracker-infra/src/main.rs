//! Synthesizes and deploys the DivTracker backend infrastructure: a VPC, a
//! PostgreSQL database, the application secrets and a single-instance Elastic
//! Beanstalk environment.
//!
//! Run with `RUST_LOG=info` to see what happens under the hood.
//!
//! ```sh
//! cargo run -p divtracker-infra -- synth
//! cargo run -p divtracker-infra -- plan
//! cargo run -p divtracker-infra -- --profile staging.toml deploy
//! cargo run -p divtracker-infra -- outputs
//! cargo run -p divtracker-infra -- destroy --force
//! ```

use clap::Parser;
use colored::Colorize;
use synth::{aws::cloudformation, Action, Plan};

mod compose;
mod config;
mod database;
mod error;
mod network;
mod platform;
mod secrets;

use config::{Cli, Command, Environment, Profile};

fn print_plan(plan: &Plan) {
    if !plan.has_changes() {
        println!("{}", "No changes.".green());
    }
    for action in plan.actions.iter().filter(|a| a.action != Action::Keep) {
        let label = match action.action {
            Action::Create => "create".green(),
            Action::Update => "update".yellow(),
            Action::Replace => "replace".magenta(),
            Action::Destroy => "destroy".red(),
            Action::Keep => "keep".normal(),
        };
        let orphan_marker = if action.is_orphan { " (orphan)" } else { "" };
        println!("  {label} '{}' [{}]{orphan_marker}", action.id, action.kind);
    }
    for warning in &plan.warnings {
        println!("  {} {warning}", "WARNING:".yellow().bold());
    }
}

fn print_outputs(outputs: &[cloudformation::StackOutput]) {
    if outputs.is_empty() {
        println!("No outputs.");
    }
    for output in outputs {
        match output.export_name.as_deref() {
            Some(export) => println!("  {} = {} (exported as {export})", output.key.bold(), output.value),
            None => println!("  {} = {}", output.key.bold(), output.value),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();
    let env = Environment::new(cli.account.clone(), cli.region.clone());
    let profile = Profile::load(cli.profile.as_deref())?;
    let stack_name = profile.qualified_name();
    log::info!(
        "stack '{stack_name}' in {} (account {})",
        env.region,
        env.account.as_deref().unwrap_or("from credentials")
    );

    match cli.command {
        Command::Synth => {
            let composition = compose::synthesize(&profile, &cli.secrets)?;
            let synthesis = composition.synthesis;
            let previous = synth::utils::sha256_digest(synthesis.template_path(&cli.out_dir))?;
            let digest = synthesis.digest()?;
            let path = synthesis.save(&cli.out_dir).await?;
            print!("{}", synthesis.get_schedule_string());
            println!("Wrote {}", path.display());
            if previous.as_deref() == Some(digest.as_str()) {
                println!("sha256 {digest} {}", "(unchanged)".green());
            } else {
                println!("sha256 {digest} {}", "(changed)".yellow());
            }
        }
        Command::Plan => {
            let composition = compose::synthesize(&profile, &cli.secrets)?;
            let plan = composition.synthesis.plan(&cli.out_dir)?;
            println!("Plan for '{stack_name}':");
            print_plan(&plan);
        }
        Command::Deploy => {
            let composition = compose::synthesize(&profile, &cli.secrets)?;
            let synthesis = composition.synthesis;
            let plan = synthesis.plan(&cli.out_dir)?;
            println!("Plan for '{stack_name}':");
            print_plan(&plan);

            println!();
            println!("Deploying...");
            let cfg = cloudformation::load_config(&env.region).await;
            let tags = compose::stack_tags(&profile);
            let outcome = compose::apply_then_save(
                &synthesis,
                &cli.out_dir,
                cloudformation::deploy(&cfg, &synthesis, &tags, env.account.as_deref()),
            )
            .await?;
            if outcome.changed {
                println!("Done.");
            } else {
                println!("Already up to date.");
            }
            print_outputs(&outcome.outputs);
        }
        Command::Outputs => {
            let cfg = cloudformation::load_config(&env.region).await;
            let outputs = cloudformation::outputs(&cfg, &stack_name)
                .await
                .map_err(error::Error::from)?;
            print_outputs(&outputs);
        }
        Command::Destroy { force } => {
            if force {
                println!("Destroying '{stack_name}'...");
                let cfg = cloudformation::load_config(&env.region).await;
                cloudformation::destroy(&cfg, &stack_name)
                    .await
                    .map_err(error::Error::from)?;
                println!("Done.");
            } else {
                println!("This deletes every resource of '{stack_name}' in {}.", env.region);
                println!("The database is snapshotted before it goes.");
                println!();
                println!("Please call `destroy --force` to delete these resources.");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn destroy_needs_force() {
        let cli = Cli::try_parse_from(["infra", "--region", "", "destroy"]).unwrap();
        assert!(matches!(cli.command, Command::Destroy { force: false }));
        assert_eq!(
            "us-east-1",
            Environment::new(cli.account, cli.region).region
        );
    }
}
