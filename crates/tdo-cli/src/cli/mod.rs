//! CLI entry and dispatch.

use anyhow::{Context, Result};
use clap::Parser;
use tdo_core::config::Config;

mod commands;

#[derive(Parser)]
#[command(name = "tdo")]
#[command(version = "0.2")]
#[command(about = "Multi-user to-do list client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Create an account and sign in
    Signup {
        /// Account email
        #[arg(long)]
        email: String,

        /// Password (prompted on stdin when omitted)
        #[arg(long)]
        password: Option<String>,
    },

    /// Sign in to an existing account
    Login {
        /// Account email
        #[arg(long)]
        email: String,

        /// Password (prompted on stdin when omitted)
        #[arg(long)]
        password: Option<String>,
    },

    /// Sign out and clear the stored credential
    Logout,

    /// Show the signed-in user
    Whoami,

    /// List tasks
    List {
        /// Sort order: newest_first, oldest_first, highest_priority,
        /// lowest_priority
        #[arg(long, default_value = "newest_first")]
        sort: String,
    },

    /// Show one task
    Show {
        /// Task id
        id: String,
    },

    /// Add a task
    Add {
        /// Task title
        title: String,

        /// Optional description
        #[arg(short, long)]
        description: Option<String>,
    },

    /// Edit a task's fields
    Edit {
        /// Task id
        id: String,

        /// New title
        #[arg(long)]
        title: Option<String>,

        /// New description
        #[arg(long)]
        description: Option<String>,

        /// New status: complete or incomplete
        #[arg(long)]
        status: Option<String>,
    },

    /// Flip a task between complete and incomplete
    Toggle {
        /// Task id
        id: String,
    },

    /// Delete a task
    Rm {
        /// Task id
        id: String,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Print the config file path
    Path,
    /// Write a commented default config
    Init,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();

    // one tokio runtime for everything
    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;

    rt.block_on(async move { dispatch(cli).await })
}

async fn dispatch(cli: Cli) -> Result<()> {
    let config = Config::load().context("load config")?;

    match cli.command {
        Commands::Signup {
            email,
            password,
        } => commands::auth::signup(&config, &email, password).await,
        Commands::Login {
            email,
            password,
        } => commands::auth::login(&config, &email, password).await,
        Commands::Logout => commands::auth::logout(&config).await,
        Commands::Whoami => commands::auth::whoami(&config).await,
        Commands::List {
            sort,
        } => commands::tasks::list(&config, &sort).await,
        Commands::Show {
            id,
        } => commands::tasks::show(&config, &id).await,
        Commands::Add {
            title,
            description,
        } => commands::tasks::add(&config, &title, description.as_deref()).await,
        Commands::Edit {
            id,
            title,
            description,
            status,
        } => commands::tasks::edit(&config, &id, title, description, status.as_deref()).await,
        Commands::Toggle {
            id,
        } => commands::tasks::toggle(&config, &id).await,
        Commands::Rm {
            id,
        } => commands::tasks::rm(&config, &id).await,
        Commands::Config {
            command,
        } => match command {
            ConfigCommands::Path => {
                commands::config::path();
                Ok(())
            }
            ConfigCommands::Init => commands::config::init(),
        },
    }
}
