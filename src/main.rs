use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tokio::sync::watch;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use hold_spam::clock::{Clock, SystemClock};
use hold_spam::config::{self, SettingsStore, DEFAULT_CONFIG_DIR, DEFAULT_PROFILE};
use hold_spam::engine::TriggerListener;
use hold_spam::{platform, ActivationHotkey, KeyCodeResolver, Runner, TriggerSpamEngine};

#[derive(Parser)]
#[command(name = "hspam", version, about = "Toggle-to-spam keys while a process has focus")]
struct Cli {
    /// Directory holding profile files
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_DIR)]
    config_dir: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Watch for the trigger and spam keys until Ctrl+C
    Run {
        /// Profile to load
        #[arg(short, long, default_value = DEFAULT_PROFILE)]
        profile: String,

        /// Global hotkey that flips the Active switch
        #[arg(long, default_value = "ctrl+alt+s")]
        hotkey: String,

        /// Do not register the activation hotkey
        #[arg(long)]
        no_hotkey: bool,

        /// Begin paused; press the hotkey to activate
        #[arg(long)]
        start_paused: bool,
    },

    /// Manage saved profiles
    Profiles {
        #[command(subcommand)]
        action: ProfileAction,
    },

    /// Change one setting in a profile
    Set {
        /// ProcessName, TriggerKey, SpamKey or DelayMS
        key: String,
        value: String,

        #[arg(short, long, default_value = DEFAULT_PROFILE)]
        profile: String,
    },

    /// Show the key code each token resolves to
    Resolve {
        #[arg(required = true)]
        tokens: Vec<String>,
    },
}

#[derive(Subcommand)]
enum ProfileAction {
    /// List profile names
    List,

    /// Print a profile's settings
    Show { name: String },

    /// Create or overwrite a profile
    Save {
        name: String,

        #[arg(long)]
        process: String,

        #[arg(long)]
        trigger: String,

        /// Comma-separated key sequence
        #[arg(long)]
        spam: String,

        #[arg(long, default_value = "100")]
        delay: String,
    },

    /// Remove a profile
    Delete { name: String },
}

/// Prints state transitions rather than every tick.
struct ConsoleListener {
    last: Option<bool>,
}

impl ConsoleListener {
    fn report(&mut self, met: bool) {
        if self.last == Some(met) {
            return;
        }
        self.last = Some(met);
        if met {
            println!("{}", "▶️  Executing".green().bold());
        } else {
            println!("{}", "⏸️  Waiting".red());
        }
    }
}

impl TriggerListener for ConsoleListener {
    fn on_trigger_met(&mut self) {
        self.report(true);
    }

    fn on_trigger_not_met(&mut self) {
        self.report(false);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "hold_spam=debug" } else { "hold_spam=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut store = SettingsStore::open(&cli.config_dir)
        .with_context(|| format!("cannot open config dir {}", cli.config_dir.display()))?;

    match cli.command {
        Command::Run {
            profile,
            hotkey,
            no_hotkey,
            start_paused,
        } => run(&mut store, &profile, (!no_hotkey).then_some(hotkey), start_paused).await,
        Command::Profiles { action } => profiles(&mut store, action),
        Command::Set {
            key,
            value,
            profile,
        } => {
            store.load(&profile)?;
            store.set(config::SETTINGS_SECTION, &key, value)?;
            println!("{} {} updated in '{}'", "✓".green(), key.bold(), profile);
            Ok(())
        }
        Command::Resolve { tokens } => {
            let resolver = platform::native().resolver;
            resolve(&resolver, &tokens);
            Ok(())
        }
    }
}

async fn run(
    store: &mut SettingsStore,
    profile: &str,
    hotkey: Option<String>,
    start_paused: bool,
) -> Result<()> {
    store.list()?;
    store.load(profile)?;
    let snapshot = store.snapshot();
    snapshot.validate()?;

    println!("{} {}", "Profile:".bold(), profile.cyan());
    println!("  process  {}", snapshot.process_name);
    println!("  trigger  {}", snapshot.trigger_key);
    println!("  keys     {}", snapshot.spam_keys.join(", "));
    println!("  delay    {} ms", snapshot.delay_ms);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let engine = TriggerSpamEngine::new(
        platform::native(),
        Box::new(ConsoleListener { last: None }),
        Arc::clone(&clock),
    );
    if !engine.is_operable() {
        bail!("key input or focus detection is not available on this platform");
    }

    let (active_tx, active_rx) = watch::channel(!start_paused);
    let active_tx = Arc::new(active_tx);
    let runner = Runner::new(engine, snapshot, active_rx, clock);
    let shutdown = runner.shutdown_signal();

    let hotkey = match hotkey {
        Some(combo) => {
            match ActivationHotkey::spawn(&combo, Arc::clone(&active_tx), shutdown.clone()).await {
                Ok(registered) => {
                    println!("🔥 Press {} to toggle Active", combo.bold());
                    Some(registered)
                }
                Err(e) => {
                    warn!("{e}; staying active for this session");
                    active_tx.send_replace(true);
                    None
                }
            }
        }
        None => {
            if start_paused {
                warn!("--start-paused has no effect without a hotkey; starting active");
                active_tx.send_replace(true);
            }
            None
        }
    };

    let ctrl_c_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c_shutdown.request();
        }
    });

    println!("Press Ctrl+C to quit");
    let worker = tokio::task::spawn_blocking(move || runner.run());
    let outcome = worker.await.context("engine worker panicked");
    shutdown.request();
    if let Some(hotkey) = hotkey {
        hotkey.join().await;
    }
    outcome??;
    println!("{}", "Stopped".yellow());
    Ok(())
}

fn profiles(store: &mut SettingsStore, action: ProfileAction) -> Result<()> {
    match action {
        ProfileAction::List => {
            for name in store.list()? {
                println!("{name}");
            }
        }
        ProfileAction::Show { name } => {
            if !store.profile_path(&name)?.exists() {
                bail!(hold_spam::SpamError::profile_not_found(name));
            }
            store.load(&name)?;
            println!("{}", serde_json::to_string_pretty(&store.snapshot())?);
        }
        ProfileAction::Save {
            name,
            process,
            trigger,
            spam,
            delay,
        } => {
            let settings: BTreeMap<String, String> = [
                (config::PROCESS_NAME, process),
                (config::TRIGGER_KEY, trigger),
                (config::SPAM_KEY, spam),
                (config::DELAY_MS, delay),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
            store.save(&name, &settings)?;
            println!("{} saved '{}'", "✓".green(), name);
        }
        ProfileAction::Delete { name } => {
            if store.delete(&name)? {
                println!("{} deleted '{}'", "✓".green(), name);
            } else {
                bail!(hold_spam::SpamError::profile_not_found(name));
            }
        }
    }
    Ok(())
}

fn resolve(resolver: &KeyCodeResolver, tokens: &[String]) {
    for token in tokens {
        match resolver.try_resolve(token) {
            Ok(code) => println!("{:>12}  {}", token, code.to_string().green()),
            Err(e) => println!("{:>12}  {}", token, e.to_string().red()),
        }
    }
}
