use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use rwc_registry::commands::{error_response, execute, ok_response};
use rwc_registry::{
    FileDefaultsStore, RegistryCommand, RegistryConfig, RegistryService, SetDefaultsRequest,
    StaticTopologyGate, TopologyRole, VotingShape,
};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "rwc-registry")]
#[command(about = "Inspect and change the default read/write concern of a node")]
struct Cli {
    /// Directory holding the durable defaults record
    #[arg(long)]
    data_dir: PathBuf,

    /// Role this node plays (e.g. primary, secondary, config-primary, standalone)
    #[arg(long, default_value = "primary")]
    role: String,

    #[arg(long, default_value = "node-0")]
    node_id: String,

    /// Do not surface the implicit `local` read concern default
    #[arg(long)]
    no_read_concern_local: bool,

    /// Disable the require-majority write concern capability
    #[arg(long)]
    no_write_concern_majority: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the effective defaults
    Get {
        #[arg(long)]
        in_memory: bool,
    },
    /// Change the defaults; pass `{}` to unset a concern
    Set {
        #[arg(long)]
        read_concern: Option<String>,
        #[arg(long)]
        write_concern: Option<String>,
    },
    /// Print the raw persisted record
    Persisted,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let role = TopologyRole::parse(&cli.role).ok_or_else(|| anyhow!("unknown role '{}'", cli.role))?;
    if role == TopologyRole::Router {
        return Err(anyhow!("a router holds no defaults; run against a config server"));
    }
    let config = RegistryConfig::new(&cli.node_id)
        .default_read_concern_local(!cli.no_read_concern_local)
        .default_write_concern_majority(!cli.no_write_concern_majority);
    let topology = Arc::new(StaticTopologyGate::new(role, Some(VotingShape::default())));
    let store = Arc::new(
        FileDefaultsStore::new(&cli.data_dir)
            .with_context(|| format!("Failed to open data directory '{}'", cli.data_dir.display()))?,
    );
    let service = RegistryService::new(config, topology, store)?;

    let command = match cli.command {
        Command::Get { in_memory } => RegistryCommand::GetDefaults { in_memory },
        Command::Set {
            read_concern,
            write_concern,
        } => RegistryCommand::SetDefaults(SetDefaultsRequest {
            default_read_concern: parse_json_arg("--read-concern", read_concern)?,
            default_write_concern: parse_json_arg("--write-concern", write_concern)?,
        }),
        Command::Persisted => {
            let persisted = service.persisted_document().await?;
            println!("{}", serde_json::to_string_pretty(&persisted.unwrap_or(Value::Null))?);
            return Ok(());
        }
    };

    let reply = match execute(&service, command).await {
        Ok(reply) => ok_response(reply),
        Err(err) => error_response(&err),
    };
    println!("{}", serde_json::to_string_pretty(&reply)?);
    if reply["ok"] != Value::from(1) {
        std::process::exit(1);
    }
    Ok(())
}

fn parse_json_arg(flag: &str, raw: Option<String>) -> Result<Option<Value>> {
    raw.map(|raw| {
        serde_json::from_str(&raw).with_context(|| format!("{} is not valid JSON: {}", flag, raw))
    })
    .transpose()
}
