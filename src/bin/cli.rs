//! Restage CLI - Main entry point
//!
//! This binary runs the update staging service and its one-shot commands.

use clap::Parser;
use restage_lib::engine::{
    api::{create_router, ApiState},
    cli::{Cli, Commands, OutputFormat},
    config::Config,
    stager::Stager,
};
use std::path::Path;
use std::sync::Arc;

fn main() {
    init_tracing();

    let cli = Cli::parse();

    if let Err(e) = run_cli(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

fn run_cli(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let project_dir = cli.get_project_dir();
    let json_output = cli.format == OutputFormat::Json;

    match cli.command {
        Commands::Init { owner, repo, branch } => {
            cmd_init(&project_dir, &owner, &repo, &branch, json_output)?;
        }
        Commands::Serve { port, host } => {
            cmd_serve(&project_dir, host, port)?;
        }
        Commands::Download => {
            cmd_download(&project_dir, json_output)?;
        }
        Commands::Status => {
            cmd_status(&project_dir, json_output)?;
        }
        Commands::Clear => {
            cmd_clear(&project_dir, json_output)?;
        }
    }

    Ok(())
}

fn load_stager(project_dir: &Path) -> Result<Stager, Box<dyn std::error::Error>> {
    let config = Arc::new(Config::load(project_dir)?);
    Ok(Stager::new(config, project_dir))
}

fn cmd_init(
    project_dir: &Path,
    owner: &str,
    repo: &str,
    branch: &str,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = project_dir.join(restage_lib::engine::config::CONFIG_FILE);
    if config_path.exists() {
        return Err(format!("Config already exists: {}", config_path.display()).into());
    }

    let mut config = Config::default_for_repo(owner, repo);
    config.repository.branch = branch.to_string();
    config.save(project_dir)?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "success": true,
                "config": config_path.display().to_string(),
                "repository": format!("{}/{}", owner, repo)
            })
        );
    } else {
        println!("✅ Created {}", config_path.display());
        println!("   Repository: {}/{} (branch {})", owner, repo, branch);
        println!("\n   Next steps:");
        println!("   restage serve");
    }

    Ok(())
}

#[tokio::main]
async fn cmd_serve(
    project_dir: &Path,
    host: Option<String>,
    port: Option<u16>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = Config::load(project_dir)?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    let config = Arc::new(config);

    let stager = Arc::new(Stager::new(config.clone(), project_dir));
    if stager.is_ready() {
        tracing::info!(
            dir = %stager.staging_dir().display(),
            "an update is already staged"
        );
    }

    let app = create_router(ApiState::new(stager.clone()));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    println!("🚀 Restage update service");
    println!(
        "   Repository: {}/{}",
        config.repository.owner, config.repository.name
    );
    println!("   Staging: {}", stager.staging_dir().display());
    println!("   Listening: http://{}", addr);
    println!("   Press Ctrl+C to stop");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
            eprintln!(
                "Port {} is already in use. Another instance may be running.",
                config.server.port
            );
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };
    axum::serve(listener, app).await?;

    Ok(())
}

#[tokio::main]
async fn cmd_download(project_dir: &Path, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let stager = load_stager(project_dir)?;

    match stager.stage().await {
        Ok(message) => {
            if json {
                println!(
                    "{}",
                    serde_json::json!({ "ok": true, "message": message })
                );
            } else {
                println!("✅ {}", message);
            }
            Ok(())
        }
        Err(e) => {
            if json {
                println!(
                    "{}",
                    serde_json::json!({ "ok": false, "error": e.to_string() })
                );
            }
            Err(e.into())
        }
    }
}

fn cmd_status(project_dir: &Path, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let stager = load_stager(project_dir)?;
    let ready = stager.is_ready();
    let marker = stager.read_marker().unwrap_or(None);

    if json {
        let mut status = serde_json::json!({ "ready": ready });
        if let Some(marker) = &marker {
            status["downloaded_at"] = serde_json::json!(marker.downloaded_at);
            status["source"] = serde_json::to_value(marker.source)?;
            status["url"] = serde_json::json!(marker.url);
        }
        println!("{}", status);
    } else {
        println!("📊 Staging status");
        println!("   Directory: {}", stager.staging_dir().display());
        println!("   Ready: {}", if ready { "yes" } else { "no" });
        if let Some(marker) = &marker {
            println!("   Downloaded: {}", marker.downloaded_at);
            println!("   URL: {}", marker.url);
        }
    }

    Ok(())
}

fn cmd_clear(project_dir: &Path, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let stager = load_stager(project_dir)?;

    match stager.clear() {
        Ok(message) => {
            if json {
                println!(
                    "{}",
                    serde_json::json!({ "ok": true, "message": message })
                );
            } else {
                println!("✅ {}", message);
            }
            Ok(())
        }
        Err(e) => {
            if json {
                println!(
                    "{}",
                    serde_json::json!({ "ok": false, "error": e.to_string() })
                );
            }
            Err(e.into())
        }
    }
}
