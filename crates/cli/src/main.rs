use anyhow::{bail, Result};
use biff_core::admin::RuleAdmin;
use biff_core::config;
use biff_core::models::RecordId;
use biff_core::rules::RuleDraft;
use biff_core::store::RecordStore;
use clap::{Parser, Subcommand};
use cli::app::App;
use cli::event;
use cli::views::{ReportView, RuleView};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so --json output stays parseable.
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let cfg = config::load(cli.config.as_deref())?;
    let app = App::open(cfg).await?;

    match cli.command {
        Commands::Rules { command } => run_rules(&app.admin, command).await,
        Commands::Labels { json } => run_labels(&app.admin, json).await,
        Commands::Match { paths, json } => run_match(&app, &paths, json).await,
        Commands::Event {
            event,
            records,
            json,
        } => run_event(&app, &event, &records, json).await,
        Commands::Records { command } => run_records(&app, command).await,
    }
}

#[derive(Parser)]
#[command(name = "filebiff")]
#[command(about = "Label tickets by the files their commits touch", long_about = None)]
struct Cli {
    /// Path to config TOML
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage watch rules
    Rules {
        #[command(subcommand)]
        command: RulesCommand,
    },
    /// List every registered label
    Labels {
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
    /// Show which rules the given paths trigger
    Match {
        /// Changed file paths
        #[arg(required = true)]
        paths: Vec<String>,
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
    /// Apply a change event (JSON) to records
    Event {
        /// Event file, or `-` for stdin
        #[arg(long)]
        event: PathBuf,
        /// Record ids the commit may touch (comma-separated)
        #[arg(long, value_delimiter = ',', num_args = 1.., required = true)]
        records: Vec<RecordId>,
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
    /// Inspect or create records
    Records {
        #[command(subcommand)]
        command: RecordsCommand,
    },
}

#[derive(Subcommand)]
enum RulesCommand {
    /// List configured rules
    List {
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
    /// Add a rule
    Add {
        #[arg(long)]
        name: String,
        /// Recipients (comma-separated)
        #[arg(long, default_value = "")]
        cc: String,
        /// Filename patterns (comma-separated)
        #[arg(long)]
        filename: String,
    },
    /// Replace a rule's fields; a new name is propagated to labelled records
    Update {
        id: String,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        cc: String,
        #[arg(long)]
        filename: String,
        /// Author recorded on relabelled records
        #[arg(long, default_value = "admin")]
        actor: String,
        #[arg(long)]
        json: bool,
    },
    /// Remove rules and their labels from records
    Remove {
        #[arg(required = true)]
        ids: Vec<String>,
        #[arg(long, default_value = "admin")]
        actor: String,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum RecordsCommand {
    /// Create a record from name=value fields
    Create {
        #[arg(long = "field")]
        fields: Vec<String>,
    },
    /// Print a record's fields
    Show {
        id: RecordId,
        /// Include the change log
        #[arg(long)]
        history: bool,
        #[arg(long)]
        json: bool,
    },
}

async fn run_rules(admin: &RuleAdmin, command: RulesCommand) -> Result<()> {
    match command {
        RulesCommand::List { json } => {
            let rules = admin.rules().await?;
            let views: Vec<RuleView> = rules.iter().map(RuleView::from).collect();
            if json {
                println!("{}", serde_json::to_string_pretty(&views)?);
            } else {
                for v in views {
                    println!("{}  {}  cc=[{}]  filename=[{}]", v.id, v.name, v.cc, v.filename);
                }
            }
        }
        RulesCommand::Add { name, cc, filename } => {
            let id = admin.add(&RuleDraft::from_form(&name, &cc, &filename)).await?;
            println!("{}", id);
        }
        RulesCommand::Update {
            id,
            name,
            cc,
            filename,
            actor,
            json,
        } => {
            let draft = RuleDraft::from_form(&name, &cc, &filename);
            let report = admin.update(&actor, &id, &draft).await?;
            ReportView::from(&report).print(json)?;
        }
        RulesCommand::Remove { ids, actor, json } => {
            let report = admin.remove(&actor, ids.as_slice()).await?;
            ReportView::from(&report).print(json)?;
        }
    }
    Ok(())
}

async fn run_labels(admin: &RuleAdmin, json: bool) -> Result<()> {
    let labels = admin.labels().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&labels)?);
    } else {
        for label in labels {
            println!("{}", label);
        }
    }
    Ok(())
}

async fn run_match(app: &App, paths: &[String], json: bool) -> Result<()> {
    let rules = app.rule_set().await?;
    let triggered = rules.triggered(paths);
    if json {
        println!("{}", serde_json::to_string_pretty(&triggered)?);
    } else {
        for name in triggered.names() {
            let cc = triggered
                .cc(name)
                .map(|cc| cc.iter().cloned().collect::<Vec<_>>().join(", "))
                .unwrap_or_default();
            println!("{}  cc=[{}]", name, cc);
        }
    }
    Ok(())
}

async fn run_event(app: &App, path: &Path, records: &[RecordId], json: bool) -> Result<()> {
    let ev = event::load_event(path)?;
    let summary = event::run_event(app, &ev, records).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "triggered: {} (cc: {})",
            summary.triggered.join(" "),
            summary.recipients.join(", ")
        );
        summary.report.print(false)?;
    }
    Ok(())
}

async fn run_records(app: &App, command: RecordsCommand) -> Result<()> {
    match command {
        RecordsCommand::Create { fields } => {
            let mut parsed = BTreeMap::new();
            for f in fields {
                let Some((name, value)) = f.split_once('=') else {
                    bail!("expected name=value, got '{}'", f);
                };
                parsed.insert(name.trim().to_string(), value.to_string());
            }
            let id = app.records.create(parsed).await?;
            println!("{}", id);
        }
        RecordsCommand::Show { id, history, json } => {
            let record = app.records.open(id).await?;
            let changes = if history {
                app.records.history(id).await?
            } else {
                Vec::new()
            };
            if json {
                let out = serde_json::json!({
                    "id": record.id(),
                    "fields": record.fields(),
                    "history": changes,
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!("record #{}", record.id());
                for (name, value) in record.fields() {
                    println!("  {}: {}", name, value);
                }
                for c in changes {
                    println!(
                        "  [{}] {} changed {}: '{}' -> '{}'",
                        c.time,
                        c.author,
                        c.field,
                        c.old.unwrap_or_default(),
                        c.new.unwrap_or_default()
                    );
                }
            }
        }
    }
    Ok(())
}
