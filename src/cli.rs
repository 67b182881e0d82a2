//! CLI interface for datai

use clap::{Parser, Subcommand};
use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};

use crate::analysis::{load_dataset_from_path, AnalysisReport, NumberFormat};
use crate::chatbot::ChatBot;
use crate::config::{self, Config};
use crate::storage::{user_id_for, SqliteStore};

#[derive(Parser)]
#[command(name = "datai")]
#[command(about = "Patient movement analysis: goniometry statistics, chart data and a question-answering assistant", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the web server
    Serve {
        /// Port to listen on (overrides config)
        #[arg(short, long, env = "DATAI_PORT")]
        port: Option<u16>,
        /// Host to bind to (overrides config)
        #[arg(long, env = "DATAI_HOST")]
        host: Option<String>,
        /// Enable HTTPS
        #[arg(long)]
        https: bool,
        /// Path to SSL certificate
        #[arg(long)]
        cert: Option<PathBuf>,
        /// Path to SSL private key
        #[arg(long)]
        key: Option<PathBuf>,
    },
    /// Print statistics for a CSV/Excel goniometry file
    Analyze {
        file: PathBuf,
        /// Only accept comma decimals (the stored-patient rules)
        #[arg(long)]
        decimal_comma: bool,
        /// Print the full report as JSON, chart data included
        #[arg(long)]
        json: bool,
    },
    /// Ask the assistant a question about a file
    Ask {
        file: PathBuf,
        question: String,
    },
    /// Manage user accounts
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
    /// Inspect patient records
    Patients {
        #[command(subcommand)]
        command: PatientCommands,
    },
    /// Configure the server
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
        /// Reset configuration to defaults
        #[arg(long)]
        reset: bool,
        /// Generate a new JWT secret, invalidating all tokens
        #[arg(long)]
        rotate_jwt: bool,
        /// Print the configuration file path
        #[arg(long)]
        path: bool,
        /// Print the default configuration
        #[arg(long)]
        default: bool,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Register a user (prompts for the password when not given)
    Create {
        username: String,
        #[arg(long)]
        password: Option<String>,
    },
    /// List registered users
    List,
}

#[derive(Subcommand)]
enum PatientCommands {
    /// List a user's patients
    List { username: String },
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port, host, https, cert, key } => {
            let mut config = Config::load()?;
            config.ensure_jwt_secret()?;

            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(host) = host {
                config.server.host = host;
            }
            if https {
                config.server.https = true;
            }
            if cert.is_some() {
                config.server.cert = cert;
            }
            if key.is_some() {
                config.server.key = key;
            }

            crate::server::start(config).await?;
        }
        Commands::Analyze { file, decimal_comma, json } => {
            let format = if decimal_comma { NumberFormat::DecimalComma } else { NumberFormat::Robust };
            analyze_file(&file, format, json).await?;
        }
        Commands::Ask { file, question } => {
            ask_about_file(&file, &question).await?;
        }
        Commands::User { command } => {
            let store = open_store().await?;
            match command {
                UserCommands::Create { username, password } => {
                    let password = match password {
                        Some(p) => p,
                        None => prompt_new_password()?,
                    };
                    let user = store.create_user(username.trim(), &password).await?;
                    println!("Created user {} (id {})", user.username, user.id);
                }
                UserCommands::List => {
                    let users = store.list_users().await?;
                    if users.is_empty() {
                        println!("No users registered.");
                    }
                    for user in users {
                        println!("  {:<20} {}  {}", user.username, user.id, user.created_at.format("%Y-%m-%d"));
                    }
                }
            }
        }
        Commands::Patients { command } => match command {
            PatientCommands::List { username } => {
                let store = open_store().await?;
                let patients = store.list_patients(&user_id_for(username.trim())).await?;
                if patients.is_empty() {
                    println!("No patients for {}.", username);
                }
                for p in patients {
                    println!(
                        "  #{:<5} {} {}  ({}, {} years, {} document(s))",
                        p.id, p.first_name, p.last_name, p.sex, p.age, p.document_count
                    );
                }
            }
        },
        Commands::Config { show, reset, rotate_jwt, path, default } => {
            if reset {
                config::reset_config()?;
            } else if rotate_jwt {
                config::rotate_jwt_secret()?;
            } else if path {
                println!("{}", config::config_path()?.display());
            } else if default {
                print!("{}", config::default_config_toml());
            } else if show {
                config::show_config()?;
            } else {
                println!("Configuration options:");
                println!("  --show         Display current configuration");
                println!("  --path         Print the configuration file path");
                println!("  --default      Print the default configuration");
                println!("  --reset        Reset configuration to defaults");
                println!("  --rotate-jwt   Generate a new JWT secret");
                println!();
                println!("Set {} to use a different configuration file.", config::CONFIG_ENV);
            }
        }
    }

    Ok(())
}

async fn open_store() -> Result<SqliteStore> {
    let config = Config::load()?;
    SqliteStore::new(&config.storage.database_path).await
}

async fn analyze_file(file: &Path, format: NumberFormat, json: bool) -> Result<()> {
    let config = Config::load()?;
    let path = file.to_path_buf();
    let dataset = tokio::task::spawn_blocking(move || load_dataset_from_path(&path, format, &config.analysis))
        .await?
        .with_context(|| format!("Failed to analyse {}", file.display()))?;
    let report = AnalysisReport::from_dataset(&dataset);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("\n📊 {}", report.source);
    println!("═══════════════════════════════════════");
    println!("  Time column:  {}", report.time_column);
    println!("  Samples:      {}", report.rows);
    if let Some(duration) = report.duration {
        println!("  Duration:     {:.2}", duration);
    }
    println!();
    println!("  {:<28} {:>10} {:>10} {:>10} {:>10}", "Column", "Min", "Max", "Mean", "Range");
    for stats in &report.formatted {
        println!(
            "  {:<28} {:>10} {:>10} {:>10} {:>10}",
            stats.name, stats.min, stats.max, stats.mean, stats.range
        );
    }
    println!();
    Ok(())
}

async fn ask_about_file(file: &Path, question: &str) -> Result<()> {
    let config = Config::load()?;
    let path = file.to_path_buf();
    let analysis = config.analysis.clone();
    let dataset = tokio::task::spawn_blocking(move || load_dataset_from_path(&path, NumberFormat::Robust, &analysis))
        .await?
        .with_context(|| format!("Failed to analyse {}", file.display()))?;

    let bot = ChatBot::new(config.chatbot.min_confidence);
    let reply = bot.respond(question, Some(&dataset));

    println!("{}", reply.answer);
    tracing::info!("intent {} (confidence {:.2})", reply.intent, reply.confidence);
    Ok(())
}

fn prompt_new_password() -> Result<String> {
    use std::io::Write;
    eprint!("Password: ");
    std::io::stderr().flush()?;
    let password = rpassword_read()?;
    eprint!("Confirm password: ");
    std::io::stderr().flush()?;
    let confirm = rpassword_read()?;

    if password != confirm {
        bail!("Passwords do not match");
    }
    if password.is_empty() {
        bail!("Password cannot be empty");
    }
    Ok(password)
}

/// Read a password from stdin with echo disabled (Unix) or simple fallback
fn rpassword_read() -> Result<String> {
    #[cfg(unix)]
    {
        use std::io::BufRead;
        let fd = 0; // stdin
        unsafe {
            let mut termios: libc::termios = std::mem::zeroed();
            libc::tcgetattr(fd, &mut termios);
            let original = termios;
            termios.c_lflag &= !libc::ECHO;
            libc::tcsetattr(fd, libc::TCSANOW, &termios);

            let mut line = String::new();
            let result = std::io::stdin().lock().read_line(&mut line);

            libc::tcsetattr(fd, libc::TCSANOW, &original);
            eprintln!();

            result?;
            Ok(line.trim().to_string())
        }
    }
    #[cfg(not(unix))]
    {
        let mut line = String::new();
        std::io::stdin().read_line(&mut line)?;
        Ok(line.trim().to_string())
    }
}
