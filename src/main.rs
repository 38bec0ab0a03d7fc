use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use std::io::{IsTerminal, Read};
use std::path::PathBuf;
use std::time::Duration;
use time::OffsetDateTime;
use tracing_subscriber::EnvFilter;

use sessionshare::config::{self, Config};
use sessionshare::import::{import_locator, open_link, view_from_pasted};
use sessionshare::render::format_time_ago;
use sessionshare::share::{ShareMode, ShareOptions, manual_gist_steps, share};
use sessionshare::transcript::{claude_projects_dir, list_sessions, truncate};
use sessionshare::{ResolveError, Resolver, ShareError, UreqHost, View};

#[derive(Parser)]
#[command(
    name = "sessionshare",
    version,
    about = "Share assistant sessions as links or gists, and import them back"
)]
struct Cli {
    /// Debug logging on stderr (otherwise SESSIONSHARE_LOG, default warn)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Share a local session transcript
    #[command(name = "share")]
    Share {
        /// Session JSONL file
        transcript: PathBuf,
        #[arg(long, value_enum, default_value_t = ShareMode::Auto)]
        mode: ShareMode,
        /// Where gist mode writes the JSONL (default ./claude-session.jsonl)
        #[arg(long)]
        out: Option<PathBuf>,
        /// Create the gist through the API (needs github_token)
        #[arg(long)]
        upload: bool,
        /// Gist description
        #[arg(long)]
        description: Option<String>,
        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Import a shared session from a gist URL or ID
    #[command(name = "import")]
    Import {
        /// Gist URL or ID
        locator: Option<String>,
        /// Read the raw session content from stdin instead
        #[arg(long)]
        paste: bool,
    },

    /// Open a viewer link (#session=, #import=, #shared=, ?session=)
    #[command(name = "open")]
    Open { url: String },

    /// List local sessions, newest first
    #[command(name = "sessions")]
    Sessions {
        /// Projects directory (default ~/.claude/projects)
        #[arg(long)]
        dir: Option<PathBuf>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// View or modify config (~/.sessionshare/config.toml)
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current config
    Show,
    /// Set a config value
    Set {
        /// Key to set (github_token, language, viewer_url, budget_bytes, timeout_secs,
        /// hosts.web, hosts.raw, hosts.api)
        key: String,
        /// Value to set
        value: String,
    },
    /// Restore one value to its default
    Unset { key: String },
    /// Reset config to defaults
    Reset,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    if let Err(err) = run(cli) {
        if share_error(&err).is_some_and(ShareError::is_silent) {
            return;
        }
        eprintln!("error: {err}");
        if let Some(hint) = share_error(&err).and_then(hint) {
            eprintln!("{hint}");
        }
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("SESSIONSHARE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Share {
            transcript,
            mode,
            out,
            upload,
            description,
            json,
        } => {
            let config = Config::load()?;
            let token = config.token();
            let host = UreqHost::new(Duration::from_secs(config.timeout_secs));
            let outcome = share(
                &ShareOptions {
                    transcript,
                    mode,
                    out,
                    upload,
                    description,
                },
                &config,
                token.as_deref(),
                &host,
            )?;

            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
                return Ok(());
            }
            eprintln!(
                "{}: {} of {} messages, {} bytes",
                outcome.title, outcome.included_messages, outcome.total_messages, outcome.bytes
            );
            if outcome.truncated || outcome.share_url.is_none() {
                eprintln!("{}", outcome.note);
            }
            match (&outcome.share_url, &outcome.file_path) {
                (Some(url), _) => println!("{url}"),
                (None, Some(path)) => {
                    eprintln!("To share it:");
                    let steps = manual_gist_steps(path, &config.viewer_url);
                    for (i, step) in steps.iter().enumerate() {
                        eprintln!("  {}. {step}", i + 1);
                    }
                    println!("{path}");
                }
                (None, None) => {}
            }
        }
        Commands::Import { locator, paste } => {
            let view = match locator {
                Some(locator) if !paste => {
                    let config = Config::load()?;
                    let resolver = build_resolver(&config);
                    with_manual_fallback(import_locator(&locator, &resolver).map(|(fetched, view)| {
                        eprintln!("fetched via {} from {}", fetched.source, fetched.page_url);
                        view
                    }))?
                }
                _ => view_from_pasted(&read_paste()?)?,
            };
            println!("{}", view.render());
        }
        Commands::Open { url } => {
            let config = Config::load()?;
            let resolver = build_resolver(&config);
            let view = with_manual_fallback(open_link(&url, &resolver))?;
            println!("{}", view.render());
        }
        Commands::Sessions { dir, limit } => {
            let config = Config::load().unwrap_or_default();
            let root = match dir {
                Some(dir) => dir,
                None => claude_projects_dir()?,
            };
            let sessions = list_sessions(&root)?;
            if sessions.is_empty() {
                eprintln!("no sessions found under {}", root.display());
                return Ok(());
            }
            let now = OffsetDateTime::now_utc();
            for session in sessions.iter().take(limit) {
                println!(
                    "{:<16} {:>5}  {:<30}  {}",
                    format_time_ago(session.last_activity.as_deref(), now, config.language),
                    session.message_count,
                    session.project_label,
                    truncate(&session.title, 60)
                );
                println!("    {}", session.path.display());
            }
        }
        Commands::Config { action } => {
            handle_config(action)?;
        }
    }
    Ok(())
}

fn build_resolver(config: &Config) -> Resolver<UreqHost> {
    Resolver::new(
        UreqHost::new(Duration::from_secs(config.timeout_secs)),
        config.hosts.clone(),
        config.token(),
    )
}

/// On an interactive terminal, offer to paste the content by hand once
/// every strategy failed.
fn with_manual_fallback(result: Result<View>) -> Result<View> {
    let err = match result {
        Ok(view) => return Ok(view),
        Err(err) => err,
    };
    let Some(resolve) = err.downcast_ref::<ResolveError>() else {
        return Err(err);
    };
    if resolve.page_url.is_none() || !std::io::stdin().is_terminal() {
        return Err(err);
    }
    eprintln!("error: {resolve}");
    if let Some(hint) = hint(&resolve.kind) {
        eprintln!("{hint}");
    }

    use dialoguer::{Confirm, theme::ColorfulTheme};
    let answer = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt("Paste the session content now?")
        .default(true)
        .interact_opt();
    if !confirmed(answer)? {
        return Err(ShareError::UserAborted.into());
    }
    view_from_pasted(&read_paste()?)
}

/// Escape, a "no" and Ctrl-C all cancel the prompt.
fn confirmed(answer: dialoguer::Result<Option<bool>>) -> Result<bool> {
    match answer {
        Ok(choice) => Ok(choice == Some(true)),
        Err(dialoguer::Error::IO(err)) if err.kind() == std::io::ErrorKind::Interrupted => {
            Ok(false)
        }
        Err(err) => Err(err.into()),
    }
}

fn read_paste() -> Result<String> {
    if std::io::stdin().is_terminal() {
        eprintln!("Paste the raw session content, then press Ctrl-D:");
    }
    let mut buf = String::new();
    std::io::stdin().read_to_string(&mut buf)?;
    Ok(buf)
}

/// The typed error behind an anyhow chain, looking inside resolve failures.
fn share_error(err: &anyhow::Error) -> Option<&ShareError> {
    err.downcast_ref::<ShareError>()
        .or_else(|| err.downcast_ref::<ResolveError>().map(|r| &r.kind))
}

fn hint(err: &ShareError) -> Option<String> {
    let hint = match err {
        ShareError::RateLimited { .. } => {
            "A token raises the API rate limit: create one at https://github.com/settings/tokens, \
             run `sessionshare config set github_token <token>`, then retry."
        }
        ShareError::NoSessionFile(_) => {
            "The gist has no .jsonl, session or conversation file. Check it is a shared session."
        }
        ShareError::InvalidLocator(_) => {
            "Expected https://gist.github.com/<owner>/<id>, https://gist.github.com/<id> \
             or a bare gist ID."
        }
        ShareError::Decode(_) => "Check the link or pasted content is complete, then try again.",
        ShareError::Network(_) => "Check your connection, then retry.",
        ShareError::MissingCredential => "Run `sessionshare config set github_token <token>`.",
        _ => return None,
    };
    Some(hint.to_string())
}

fn handle_config(action: Option<ConfigAction>) -> Result<()> {
    match action {
        None | Some(ConfigAction::Show) => {
            let config = Config::load()?;
            for (key, value) in config.describe() {
                println!("{key} = \"{value}\"");
            }
            println!("# {}", config::config_path()?.display());
        }
        Some(ConfigAction::Set { key, value }) => {
            if value.trim().is_empty() {
                bail!("empty value for {key}; use `sessionshare config unset {key}`");
            }
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            let path = config.save()?;
            println!("saved to {}", path.display());
        }
        Some(ConfigAction::Unset { key }) => {
            let mut config = Config::load()?;
            config.unset(&key)?;
            let path = config.save()?;
            println!("saved to {}", path.display());
        }
        Some(ConfigAction::Reset) => {
            let config = Config::default();
            let path = config.save()?;
            println!("reset to defaults at {}", path.display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn prompt_answers() {
        assert!(confirmed(Ok(Some(true))).unwrap());
        assert!(!confirmed(Ok(Some(false))).unwrap());
        assert!(!confirmed(Ok(None)).unwrap());
    }

    #[test]
    fn interrupted_prompt_is_a_cancel() {
        let interrupted = io::Error::new(io::ErrorKind::Interrupted, "interrupted");
        assert!(!confirmed(Err(dialoguer::Error::IO(interrupted))).unwrap());
    }

    #[test]
    fn other_prompt_errors_surface() {
        let broken = io::Error::new(io::ErrorKind::BrokenPipe, "closed");
        assert!(confirmed(Err(dialoguer::Error::IO(broken))).is_err());
    }

    #[test]
    fn user_abort_is_silent_through_anyhow() {
        let err: anyhow::Error = ShareError::UserAborted.into();
        assert!(share_error(&err).is_some_and(ShareError::is_silent));
    }
}
