use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use draftflow_lib::activity::{ActivityPage, ActivityQuery, EntityCategory};
use draftflow_lib::config::{load_merged_config, PartialConfig};
use draftflow_lib::workflow::{ResumptionController, WorkflowModule};
use draftflow_lib::{DraftStore, EngineConfig};

/// Draftflow - inspect guided workflow drafts and the activity feed
#[derive(Parser, Debug)]
#[command(name = "draftflow")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Data directory (overrides config files)
    #[arg(long, global = true, env = "DRAFTFLOW_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Project directory to read `.draftflow/config.toml` from
    #[arg(long, global = true)]
    project: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List built-in workflow modules and their step tracks
    Modules,
    /// Inspect saved drafts
    Drafts {
        #[command(subcommand)]
        action: DraftsAction,
    },
    /// Inspect the activity feed
    Activity {
        #[command(subcommand)]
        action: ActivityAction,
    },
}

#[derive(Subcommand, Debug)]
enum DraftsAction {
    /// List saved drafts with their resume position
    List,
    /// Print a draft as JSON
    Show { key: String },
    /// Delete a draft
    Discard { key: String },
}

#[derive(Subcommand, Debug)]
enum ActivityAction {
    /// List a page of a workspace's feed, newest first
    List {
        #[arg(long)]
        workspace: String,
        /// client, plan, diagnosis, proposal, contract, launch_kit or task
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        client: Option<String>,
        #[arg(long)]
        instance: Option<String>,
        #[arg(long, default_value = "1")]
        page: usize,
    },
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let overrides = cli
        .data_dir
        .map(|dir| PartialConfig::default().with_data_dir(dir));
    let config = load_merged_config(cli.project.as_deref(), overrides)
        .context("Failed to load configuration")?;
    log::debug!("Using data directory {}", config.data_dir().display());

    match cli.command {
        Command::Modules => list_modules(),
        Command::Drafts { action } => run_drafts(&config, action),
        Command::Activity { action } => run_activity(&config, action),
    }
}

fn list_modules() -> Result<()> {
    for module in WorkflowModule::all() {
        let definition = module.definition();
        println!("{} ({})", definition.module_key, definition.title);
        for mode in definition.modes() {
            println!("  {}:", mode.display_name());
            for step in definition.track(mode).unwrap_or(&[]) {
                let fields = step.required_field_names();
                let mut line = format!("    {}. {}", step.id, step.title);
                if step.skippable {
                    line.push_str(" [skippable]");
                }
                if !fields.is_empty() {
                    line.push_str(&format!(" - requires {}", fields.join(", ")));
                }
                println!("{}", line);
            }
        }
        if let Some((target, mode)) = module.handoff_target() {
            println!("  hands off to {} ({})", target.key(), mode);
        }
    }
    Ok(())
}

fn run_drafts(config: &EngineConfig, action: DraftsAction) -> Result<()> {
    let store = Arc::new(config.build_draft_store());

    match action {
        DraftsAction::List => {
            let keys = store.keys();
            if keys.is_empty() {
                println!("No saved drafts");
            }
            for key in keys {
                println!("{}", describe_draft(&store, &key));
            }
        }
        DraftsAction::Show { key } => {
            let session = store
                .get(&key)
                .ok_or_else(|| anyhow!("No draft saved for '{}'", key))?;
            let json = serde_json::to_string_pretty(&session)
                .context("Failed to serialize draft")?;
            println!("{}", json);
        }
        DraftsAction::Discard { key } => {
            if store.get(&key).is_none() {
                return Err(anyhow!("No draft saved for '{}'", key));
            }
            let write = store.clear(&key);
            if write.is_degraded() {
                return Err(anyhow!("Failed to discard draft '{}'", key));
            }
            println!("Discarded draft '{}'", key);
        }
    }
    Ok(())
}

fn describe_draft(store: &Arc<DraftStore>, key: &str) -> String {
    let offer = WorkflowModule::from_key(key).ok().and_then(|module| {
        ResumptionController::new(store.clone(), module.definition()).check(false)
    });

    match offer {
        Some(offer) => format!(
            "{}: {} [{}] updated {}",
            key,
            offer.summary,
            offer.mode,
            offer.updated_at.format("%Y-%m-%d %H:%M")
        ),
        None => format!("{}: nothing to resume", key),
    }
}

fn run_activity(config: &EngineConfig, action: ActivityAction) -> Result<()> {
    match action {
        ActivityAction::List {
            workspace,
            category,
            client,
            instance,
            page,
        } => {
            let mut query = ActivityQuery::workspace(&workspace).page(page);
            if let Some(category) = category {
                let category = EntityCategory::parse(&category)
                    .ok_or_else(|| anyhow!("Unknown category '{}'", category))?;
                query = query.category(category);
            }
            if let Some(client) = client {
                query = query.client(&client);
            }
            if let Some(instance) = instance {
                query = query.workflow_instance(&instance);
            }

            let page = config
                .build_activity_recorder(&workspace)?
                .feed(query)
                .ok_or_else(|| anyhow!("Failed to read activity for '{}'", workspace))?;
            print_page(&page);
        }
    }
    Ok(())
}

fn print_page(page: &ActivityPage) {
    if page.events.is_empty() {
        println!("No activity");
        return;
    }
    for event in &page.events {
        println!(
            "{}  {:<22} {}",
            event.created_at.format("%Y-%m-%d %H:%M:%S"),
            event.event_type.as_str(),
            event.title
        );
        if !event.description.is_empty() {
            println!("    {}", event.description);
        }
    }
    println!(
        "Page {} ({} of {} events){}",
        page.page,
        page.events.len(),
        page.total,
        if page.has_more { ", more available" } else { "" }
    );
}
