use super::error;
use super::output;
use super::{Commands, ConfigAction};
use crate::api::ApiClient;
use crate::app::{Config, Orchestrator};
use crate::conversion::{ConversionMode, ConversionSession, OutputFormat};
use crate::notify::ErrorKind;
use crate::persistence::LocalStore;
use crate::registry::{Resolution, Validity};
use anyhow::Result;
use std::io::Write;
use std::path::PathBuf;
use uuid::Uuid;

/// Handle a CLI command and return exit code
pub async fn handle_command(command: Commands, config: Config) -> i32 {
    let result = match command {
        Commands::Add { url } => handle_add(url, &config).await,
        Commands::List { json } => handle_list(&config, json).await,
        Commands::Remove { id } => handle_remove(id, &config).await,
        Commands::Clear => handle_clear(&config).await,
        Commands::Info { url, json } => handle_info(url, &config, json).await,
        Commands::Convert {
            urls,
            format,
            output,
        } => handle_convert(urls, format, output, config).await,
        Commands::Playlist {
            url,
            format,
            output,
        } => handle_playlist(url, format, output, config).await,
        Commands::Config { action } => handle_config(action, &config).await,
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            error::ERROR
        }
    }
}

fn open_store() -> Result<LocalStore> {
    Ok(LocalStore::in_dir(&crate::util::paths::get_storage_dir()?))
}

/// Orchestrator over the saved link list
fn saved_orchestrator(config: &Config) -> Result<Orchestrator> {
    Orchestrator::new(config, Some(open_store()?))
}

fn parse_format(format: Option<String>, config: &Config) -> Result<OutputFormat> {
    match format {
        Some(text) => Ok(text.parse()?),
        None => Ok(config.output.default_format),
    }
}

async fn handle_add(url: String, config: &Config) -> Result<i32> {
    add_link(&saved_orchestrator(config)?, &url).await
}

async fn add_link(orchestrator: &Orchestrator, url: &str) -> Result<i32> {
    // Reuse the blank bootstrap entry instead of leaving it dangling
    let entries = orchestrator.entries().await;
    let id = match entries.as_slice() {
        [only] if only.url().trim().is_empty() => only.id(),
        _ => orchestrator.add_entry().await,
    };

    if orchestrator.update_url(id, url).await != Some(Validity::Valid) {
        // The only entry cannot be removed, so blank it again instead
        if !orchestrator.remove_entry(id).await {
            orchestrator.update_url(id, "").await;
        }
        let err = orchestrator
            .errors()
            .raise(ErrorKind::FormatInvalid, format!("Not a supported YouTube link: {}", url));
        eprintln!("{}", err.message);
        return Ok(error::INVALID_INPUT);
    }

    let resolution = orchestrator.resolver().resolve_now(id).await;
    let entries = orchestrator.entries().await;
    if let Some(entry) = entries.iter().find(|e| e.id() == id) {
        println!("{}", output::format_entry(entry));
    }

    if resolution == Some(Resolution::Resolved) {
        Ok(error::SUCCESS)
    } else {
        if let Some(err) = orchestrator.errors().current() {
            eprintln!("{}", err.message);
        }
        Ok(error::ERROR)
    }
}

async fn handle_list(config: &Config, json: bool) -> Result<i32> {
    let orchestrator = saved_orchestrator(config)?;
    let entries = orchestrator.entries().await;
    println!("{}", output::format_entries(&entries, json));
    Ok(error::SUCCESS)
}

async fn handle_remove(id_str: String, config: &Config) -> Result<i32> {
    let Ok(id) = Uuid::parse_str(&id_str) else {
        eprintln!("Invalid UUID format: {}", id_str);
        return Ok(error::INVALID_INPUT);
    };

    let orchestrator = saved_orchestrator(config)?;
    let entries = orchestrator.entries().await;
    if !entries.iter().any(|e| e.id() == id) {
        eprintln!("Link not found: {}", id);
        return Ok(error::NOT_FOUND);
    }

    if orchestrator.remove_entry(id).await {
        println!("Removed {}", id);
        Ok(error::SUCCESS)
    } else {
        eprintln!("The last link cannot be removed");
        Ok(error::INVALID_INPUT)
    }
}

async fn handle_clear(config: &Config) -> Result<i32> {
    let orchestrator = saved_orchestrator(config)?;
    let before = orchestrator.entries().await.len();
    orchestrator.clear_all_but_first().await;
    println!("Removed {} link(s)", before.saturating_sub(1));
    Ok(error::SUCCESS)
}

async fn handle_info(url: String, config: &Config, json: bool) -> Result<i32> {
    if crate::registry::validation::classify(&url) != Validity::Valid {
        eprintln!("Not a supported YouTube link: {}", url);
        return Ok(error::INVALID_INPUT);
    }

    let client = ApiClient::new(&config.api)?;
    match client.fetch_video_metadata(url.trim()).await {
        Ok(metadata) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&metadata)?);
            } else {
                println!("{}", output::format_video(&metadata));
            }
            Ok(error::SUCCESS)
        }
        Err(e) => {
            eprintln!("Could not get information for {}: {}", url, e);
            Ok(match e.status() {
                Some(404) => error::NOT_FOUND,
                _ => error::ERROR,
            })
        }
    }
}

async fn handle_convert(
    urls: Vec<String>,
    format: Option<String>,
    output_dir: Option<PathBuf>,
    mut config: Config,
) -> Result<i32> {
    let format = parse_format(format, &config)?;
    if let Some(dir) = output_dir {
        config.output.directory = dir;
    }

    // Links given on the command line are converted without touching the saved list
    let orchestrator = if urls.is_empty() {
        saved_orchestrator(&config)?
    } else {
        let orchestrator = Orchestrator::new(&config, None)?;
        let mut ids = orchestrator
            .entries()
            .await
            .iter()
            .map(|e| e.id())
            .collect::<Vec<_>>();
        while ids.len() < urls.len() {
            ids.push(orchestrator.add_entry().await);
        }
        for (id, url) in ids.iter().zip(&urls) {
            if orchestrator.update_url(*id, url).await != Some(Validity::Valid) {
                eprintln!("Skipping unsupported link: {}", url);
            }
        }
        orchestrator
    };
    orchestrator.set_format(format).await;

    for entry in orchestrator.entries().await {
        if entry.is_resolvable() && !entry.is_resolved() {
            orchestrator.resolver().resolve_now(entry.id()).await;
        }
    }

    let entries = orchestrator.entries().await;
    for entry in entries.iter().filter(|e| !e.url().trim().is_empty()) {
        println!("{}", output::format_entry(entry));
    }

    run_conversion(&orchestrator).await
}

async fn handle_playlist(
    url: String,
    format: Option<String>,
    output_dir: Option<PathBuf>,
    mut config: Config,
) -> Result<i32> {
    let format = parse_format(format, &config)?;
    if let Some(dir) = output_dir {
        config.output.directory = dir;
    }

    let orchestrator = Orchestrator::new(&config, None)?;
    orchestrator.set_format(format).await;
    orchestrator.set_mode(ConversionMode::Playlist).await;
    orchestrator.set_playlist_source(&url).await;

    match orchestrator.playlist_resolver().resolve_now().await {
        Some(metadata) => println!("{}", output::format_playlist(&metadata)),
        None => {
            if let Some(err) = orchestrator.errors().current() {
                eprintln!("{}", err.message);
            }
            return Ok(error::NOT_FOUND);
        }
    }

    run_conversion(&orchestrator).await
}

/// Submit the current selection, printing progress until it finishes
async fn run_conversion(orchestrator: &Orchestrator) -> Result<i32> {
    let mut sessions = orchestrator.subscribe_session();
    let progress = tokio::spawn(async move {
        while sessions.changed().await.is_ok() {
            let snapshot = sessions.borrow_and_update().clone();
            if let Some(session) = snapshot.filter(ConversionSession::is_running) {
                eprint!("\r{}   ", output::format_progress(&session));
                std::io::stderr().flush().ok();
            }
        }
    });

    let result = orchestrator.submit().await;
    progress.abort();
    eprintln!();

    match result {
        Ok(session) => {
            println!("{}", output::format_session(&session));
            Ok(error::SUCCESS)
        }
        Err(e) => {
            eprintln!("{}", e);
            Ok(error::conversion_exit_code(&e))
        }
    }
}

async fn handle_config(action: ConfigAction, config: &Config) -> Result<i32> {
    match action {
        ConfigAction::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("{}", toml::to_string_pretty(config)?);
            }
        }
        ConfigAction::Init { force } => {
            let path = crate::util::paths::get_app_config_path()?;
            if path.exists() && !force {
                eprintln!("{} already exists (use --force to overwrite)", path.display());
                return Ok(error::INVALID_INPUT);
            }
            Config::default().save()?;
            println!("Wrote {}", path.display());
        }
        ConfigAction::Path => {
            println!("{}", crate::util::paths::get_app_config_path()?.display());
        }
    }
    Ok(error::SUCCESS)
}
