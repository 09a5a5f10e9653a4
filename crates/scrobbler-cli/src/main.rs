use clap::{ArgAction, Parser, Subcommand};
use commands::{action, auth, clear, config, run, sync};

mod commands;
mod logging;
mod output;

#[derive(Parser)]
#[command(name = "scrobbler")]
#[command(about = "SIMKL scrobbler - report what you watch and keep watched state in sync")]
#[command(version)]
struct Cli {
    /// Enable verbose output (use multiple times for more verbosity: -v, -vv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Output format
    #[arg(long, global = true, default_value = "human", value_enum)]
    output: output::OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Link this device to a SIMKL account (PIN flow)
    #[command(long_about = "Request a PIN from SIMKL, show it together with the verification URL, and wait until the PIN is entered. The access token is saved to the credentials file.")]
    Auth,

    /// Forget the stored SIMKL access token
    Signout,

    /// Run the scrobbler, reading playback events from stdin
    #[command(long_about = "Run the scrobble service. Playback events are read from stdin, one JSON object per line. Scheduled and startup syncs run in the background. Stop with Ctrl-C or by closing stdin.")]
    Run {
        /// Skip the sync on startup
        #[arg(long, action = ArgAction::SetTrue)]
        no_startup_sync: bool,
    },

    /// Reconcile watched state between the library and SIMKL once
    #[command(long_about = "Run one reconciliation. Without --movies or --episodes every type enabled in the configuration is synced. Delta mode is used unless --full is given or the configuration turns it off.")]
    Sync {
        /// Sync movies
        #[arg(long, action = ArgAction::SetTrue)]
        movies: bool,

        /// Sync episodes
        #[arg(long, action = ArgAction::SetTrue)]
        episodes: bool,

        /// Fetch the full remote history instead of changes since the last sync
        #[arg(long, action = ArgAction::SetTrue)]
        full: bool,

        /// Compute and show the changes without applying them
        #[arg(long, action = ArgAction::SetTrue)]
        dry_run: bool,
    },

    /// Run a context-menu action against one library item
    Action {
        /// togglewatched, rate or sync
        action: String,

        /// movie, episode or show
        #[arg(long)]
        media_type: String,

        /// Library id of the item
        #[arg(long)]
        dbid: u64,

        /// Rating 1-10 (0 removes the rating); prompts when omitted
        #[arg(long)]
        rating: Option<u8>,
    },

    /// Show or create the configuration
    Config {
        #[command(subcommand)]
        cmd: ConfigCommands,
    },

    /// Clear sync state or stored credentials
    #[command(long_about = "Clear the sync state (forces a full sync on the next run) or the stored credentials. Use --all to clear both.")]
    Clear {
        /// Clear everything
        #[arg(long, action = ArgAction::SetTrue)]
        all: bool,

        /// Clear sync state (watermarks, pushed ledger, remote snapshot)
        #[arg(long, action = ArgAction::SetTrue)]
        state: bool,

        /// Clear stored credentials
        #[arg(long, action = ArgAction::SetTrue)]
        credentials: bool,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the current configuration
    Show,

    /// Write a configuration template
    Init {
        /// SIMKL client id to put in the template
        #[arg(long)]
        client_id: Option<String>,

        /// Overwrite an existing configuration
        #[arg(long, action = ArgAction::SetTrue)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    // The long-running service may also log to a file, so it sets up logging itself
    if !matches!(cli.command, Commands::Run { .. }) {
        logging::init_logging(cli.verbose, cli.quiet).map_err(|e| color_eyre::eyre::eyre!("{}", e))?;
    }

    let output = output::Output::new(cli.output, cli.quiet);

    match cli.command {
        Commands::Auth => auth::run_auth(&output).await,
        Commands::Signout => auth::run_signout(&output),
        Commands::Run { no_startup_sync } => run::run_service(no_startup_sync, cli.verbose, cli.quiet, &output).await,
        Commands::Sync {
            movies,
            episodes,
            full,
            dry_run,
        } => sync::run_sync(movies, episodes, full, dry_run, &output).await,
        Commands::Action {
            action,
            media_type,
            dbid,
            rating,
        } => action::run_action(&action, &media_type, dbid, rating, &output).await,
        Commands::Config { cmd } => match cmd {
            ConfigCommands::Show => config::show_config(&output),
            ConfigCommands::Init { client_id, force } => config::init_config(client_id, force, &output),
        },
        Commands::Clear {
            all,
            state,
            credentials,
        } => clear::run_clear(all, state, credentials, &output),
    }
}
