//! Agropest - crop pest identification service

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use agropest_core::PestProfile;
use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::error;

use agropest::{
    Identification, PestEngine, Verdict,
    api::Server,
    cli::{Cli, Command},
    config::Config,
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    let result = match cli.command {
        Some(Command::Analyze {
            description,
            format,
        }) => run_analyze(cli.config.as_deref(), description, &format).await,
        Some(Command::Show { name }) => run_show(cli.config.as_deref(), &name).await,
        Some(Command::List) => run_list(cli.config.as_deref()).await,
        Some(Command::Update { name, file }) => run_update(cli.config.as_deref(), &name, &file).await,
        Some(Command::Serve { host, port }) => run_server(cli.config.as_deref(), host, port).await,
        None => run_server(cli.config.as_deref(), None, None).await,
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            eprintln!("❌ {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    Config::load(path).context("Failed to load configuration")
}

async fn load_engine(path: Option<&Path>) -> anyhow::Result<PestEngine> {
    let config = load_config(path)?;
    PestEngine::build(config)
        .await
        .context("Failed to initialize pest engine")
}

/// Run the HTTP server
async fn run_server(
    config_path: Option<&Path>,
    host: Option<String>,
    port: Option<u16>,
) -> anyhow::Result<ExitCode> {
    let mut config = load_config(config_path)?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    let server_config = config.server.clone();
    let engine = PestEngine::build(config)
        .await
        .context("Failed to initialize pest engine")?;

    Server::new(server_config, Arc::new(engine))
        .run()
        .await
        .context("Server error")?;
    Ok(ExitCode::SUCCESS)
}

/// Analyze one description, or an interactive session of them
async fn run_analyze(
    config_path: Option<&Path>,
    description: Option<String>,
    format: &str,
) -> anyhow::Result<ExitCode> {
    let engine = load_engine(config_path).await?;

    if let Some(description) = description {
        let identification = engine.identify(&description).await?;
        print_identification(&description, &identification, format)?;
        return Ok(ExitCode::SUCCESS);
    }

    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        stdout
            .write_all(b"Describe the pest problem (empty line to quit): ")
            .await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        match engine.identify(line).await {
            Ok(identification) => print_identification(line, &identification, format)?,
            Err(e) => eprintln!("❌ {e}"),
        }
        println!();
    }
    Ok(ExitCode::SUCCESS)
}

fn print_identification(
    description: &str,
    identification: &Identification,
    format: &str,
) -> anyhow::Result<()> {
    if format == "json" {
        println!("{}", serde_json::to_string_pretty(identification)?);
        return Ok(());
    }

    let analysis = &identification.analysis;
    match analysis.verdict {
        Verdict::Identified => {
            println!(
                "🐛 {} ({:.0}% confidence)",
                analysis.pest,
                analysis.confidence * 100.0
            );
            if analysis.candidates.len() > 1 {
                println!("\nOther possibilities:");
                for c in &analysis.candidates[1..] {
                    println!("  - {} ({:.0}%)", c.pest, c.confidence * 100.0);
                }
            }
        }
        Verdict::NoMatch => println!("No matching pest found."),
        Verdict::OffTopic => println!("That doesn't look like a pest problem."),
    }

    if analysis.corrected != plain_words(description) {
        println!("   (interpreted as: {})", analysis.corrected);
    }

    if !analysis.guidance.is_empty() {
        println!();
        for hint in &analysis.guidance {
            println!("💡 {hint}");
        }
    }

    if let Some(explanation) = &identification.explanation {
        println!("\n{explanation}");
    }

    if let Some(report) = &identification.report {
        match &report.path {
            Some(path) => println!("\nReport saved to {}", path.display()),
            None => println!("\n{}", report.text),
        }
    }
    Ok(())
}

/// Lowercase words with punctuation removed, for spotting spelling fixes
fn plain_words(description: &str) -> String {
    description
        .split_whitespace()
        .map(|w| {
            w.chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Print one profile as YAML
async fn run_show(config_path: Option<&Path>, name: &str) -> anyhow::Result<ExitCode> {
    let engine = load_engine(config_path).await?;
    match engine.search(name) {
        Some(profile) => {
            println!("# {}", agropest_core::canonical_name(name));
            print!("{}", serde_yaml::to_string(&profile)?);
            Ok(ExitCode::SUCCESS)
        }
        None => {
            eprintln!("❌ No pest named '{name}'");
            Ok(ExitCode::FAILURE)
        }
    }
}

/// List known pests
async fn run_list(config_path: Option<&Path>) -> anyhow::Result<ExitCode> {
    let engine = load_engine(config_path).await?;
    let kb = engine.knowledge_base();
    let names = kb.names();
    if names.is_empty() {
        println!("Knowledge base is empty.");
        return Ok(ExitCode::SUCCESS);
    }
    println!("{} pest(s):\n", names.len());
    for name in names {
        if let Some(profile) = kb.search(&name) {
            let crops: Vec<&str> = profile.crops.iter().map(String::as_str).collect();
            println!("  {name} - {}", crops.join(", "));
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Insert or replace a profile from a file
async fn run_update(config_path: Option<&Path>, name: &str, file: &Path) -> anyhow::Result<ExitCode> {
    let raw = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let profile: PestProfile = match file.extension().and_then(|e| e.to_str()) {
        Some("yaml" | "yml") => serde_yaml::from_str(&raw)?,
        _ => serde_json::from_str(&raw)?,
    };

    let engine = load_engine(config_path).await?;
    let stored = engine.update_profile(name, profile).await?;
    println!(
        "✅ {} saved (version {})",
        agropest_core::canonical_name(name),
        stored.version
    );
    Ok(ExitCode::SUCCESS)
}
