//! CLI interface for the spy-cat agency.
//!
//! `spycat serve` runs the HTTP API. The other commands read local state
//! or the upstream breed list and print it, for operators poking at a
//! deployment without going through HTTP.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::Instrument;

use crate::breeds::BreedClient;
use crate::config::Config;
use crate::model::{Agent, Mission};
use crate::storage::Storage;
use crate::{logging, server};

/// Spy-cat agency: agents, missions, and their targets.
#[derive(Debug, Parser)]
#[command(name = "spycat")]
pub struct Cli {
    /// Config file. Defaults to `$CONFIG_PATH`, then `~/.spycat/config.toml`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP API until Ctrl-C.
    Serve,

    /// List stored spy cats.
    Agents,

    /// List stored missions with their targets.
    Missions,

    /// Fetch and print the upstream breed list.
    Breeds,
}

/// Run the CLI, returning an error message on failure.
pub fn run() -> Result<(), String> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    logging::init(config.env)?;

    match cli.command {
        Command::Serve => cmd_serve(&config),
        Command::Agents => cmd_agents(&open_storage(&config)?),
        Command::Missions => cmd_missions(&open_storage(&config)?),
        Command::Breeds => cmd_breeds(&config),
    }
}

fn runtime() -> Result<tokio::runtime::Runtime, String> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("failed to start async runtime: {e}"))
}

fn open_storage(config: &Config) -> Result<Storage, String> {
    Storage::open(&config.storage_path).map_err(|e| {
        format!(
            "failed to open storage at {}: {e}",
            config.storage_path.display()
        )
    })
}

fn cmd_serve(config: &Config) -> Result<(), String> {
    let span = tracing::info_span!("spycat", env = config.env.as_str());
    runtime()?.block_on(server::run(config).instrument(span))
}

fn cmd_agents(storage: &Storage) -> Result<(), String> {
    let agents = storage
        .list_agents()
        .map_err(|e| format!("failed to list spy cats: {e}"))?;

    if agents.is_empty() {
        println!("No spy cats");
        return Ok(());
    }

    for a in &agents {
        println!("{}", format_agent(a));
    }
    Ok(())
}

fn cmd_missions(storage: &Storage) -> Result<(), String> {
    let missions = storage
        .list_missions()
        .map_err(|e| format!("failed to list missions: {e}"))?;

    if missions.is_empty() {
        println!("No missions");
        return Ok(());
    }

    for m in &missions {
        print!("{}", format_mission(m));
    }
    Ok(())
}

fn cmd_breeds(config: &Config) -> Result<(), String> {
    let client = BreedClient::new(&config.breeds.url, server::BREED_FETCH_TIMEOUT)
        .map_err(|e| format!("failed to build breed client: {e}"))?;
    let mut names = runtime()?
        .block_on(client.fetch())
        .map_err(|e| format!("failed to fetch breeds: {e}"))?;
    names.sort();

    for name in &names {
        println!("{name}");
    }
    eprintln!("{} breeds from {}", names.len(), config.breeds.url);
    Ok(())
}

fn format_agent(a: &Agent) -> String {
    format!(
        "#{}  {}  [{}, {}y]  salary {:.2}",
        a.id, a.name, a.breed, a.years_of_experience, a.salary
    )
}

fn format_mission(m: &Mission) -> String {
    let status = if m.is_active() { "active" } else { "complete" };
    let cat = m
        .agent_id
        .map_or_else(|| "unassigned".to_string(), |id| format!("cat #{id}"));

    let mut out = format!("#{}  [{status}]  {cat}\n", m.id);
    for t in &m.targets {
        let mark = if t.complete { "x" } else { " " };
        out.push_str(&format!("  [{mark}] #{}  {} ({})", t.id, t.name, t.country));
        if !t.notes.is_empty() {
            out.push_str(&format!("  {}", t.notes));
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::model::Target;

    #[test]
    fn agent_line() {
        let agent = Agent {
            id: 7,
            name: "Felix".into(),
            years_of_experience: 3,
            breed: "Persian".into(),
            salary: 1200.0,
        };
        assert_eq!(
            format_agent(&agent),
            "#7  Felix  [Persian, 3y]  salary 1200.00"
        );
    }

    #[test]
    fn mission_block() {
        let target = |id, name: &str, notes: &str, complete| Target {
            id,
            mission_id: 1,
            name: name.into(),
            country: "France".into(),
            notes: notes.into(),
            complete,
        };
        let mission = Mission {
            id: 1,
            agent_id: Some(7),
            complete: false,
            targets: vec![
                target(1, "Paris", "", true),
                target(2, "Lyon", "near the station", false),
            ],
        };

        assert_eq!(
            format_mission(&mission),
            "#1  [active]  cat #7\n\
             \x20 [x] #1  Paris (France)\n\
             \x20 [ ] #2  Lyon (France)  near the station\n"
        );
    }

    #[test]
    fn unassigned_complete_mission() {
        let mission = Mission {
            id: 3,
            agent_id: None,
            complete: true,
            targets: Vec::new(),
        };
        assert_eq!(format_mission(&mission), "#3  [complete]  unassigned\n");
    }

    #[test]
    fn parses_commands() {
        let cli = Cli::try_parse_from(["spycat", "--config", "/tmp/c.toml", "missions"]).unwrap();
        assert!(matches!(cli.command, Command::Missions));
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.toml")));

        let cli = Cli::try_parse_from(["spycat", "serve", "--config", "x.toml"]).unwrap();
        assert!(matches!(cli.command, Command::Serve));

        assert!(Cli::try_parse_from(["spycat"]).is_err());
    }
}
