//! envsafe CLI - passphrase-encrypted sidecar files
//!
//! Encrypts a plaintext file such as `.env` into `.env.hash` and back,
//! remembering passphrases in the OS keyring when asked to.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

use envsafe::config::Config;
use envsafe::content::FsContentStore;
use envsafe::passphrase::{Prompt, StdinPrompt, TerminalPrompt};
use envsafe::resolver::SecretResolver;
use envsafe::secret_store::{KeyringSecretStore, MemorySecretStore, SecretStore};
use envsafe::secretcrypt::Algorithm;
use envsafe::workflow::{Completion, TransformOptions, Workflow};

#[derive(Parser)]
#[command(name = "envsafe")]
#[command(version)]
#[command(about = "Passphrase-encrypted sidecar files.", long_about = None)]
struct Cli {
    /// Path to the config file [default: <config dir>/envsafe.json5]
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Cipher to use; must match the one the sidecar was encrypted with
    #[arg(short, long, global = true, value_enum, ignore_case = true)]
    algorithm: Option<Algorithm>,

    /// Fold sidecar content at this column (0 disables folding)
    #[arg(long, global = true, value_name = "COLUMN")]
    wrap_column: Option<usize>,

    /// Read passphrase from stdin instead of from terminal
    #[arg(long, global = true)]
    passphrase_stdin: bool,

    /// With --passphrase-stdin, store a newly entered passphrase
    #[arg(long, global = true, requires = "passphrase_stdin")]
    remember: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt a file into its sidecar (FILE + suffix)
    #[command(alias = "e")]
    Encrypt {
        /// Path to the plaintext file
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Decrypt a sidecar back into its plaintext file
    #[command(alias = "d")]
    Decrypt {
        /// Path to the encrypted sidecar file
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Handle a save of FILE the way an editor hook would: plaintext files
    /// are encrypted, sidecars and other files are left alone.
    Save {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Delete the stored passphrase for a file (plaintext or sidecar)
    Forget {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e.chain());
            process::exit(1);
        }
    };
    init_logging(&config);

    let naming = match config.naming() {
        Ok(naming) => naming,
        Err(e) => {
            eprintln!("Error: {}", e.chain());
            process::exit(1);
        }
    };
    let options = TransformOptions {
        algorithm: cli.algorithm.unwrap_or(config.algorithm),
        wrap_column: cli.wrap_column.or(config.wrap_column).filter(|&c| c > 0),
    };
    let resolver = SecretResolver::new(secret_store(&config), naming);
    let prompt = get_prompt(cli.passphrase_stdin, cli.remember);
    let mut workflow = Workflow::new(resolver, prompt, FsContentStore::new(), options);

    let completion = match &cli.command {
        Commands::Encrypt { file } => workflow.encrypt_file(file),
        Commands::Decrypt { file } => workflow.decrypt_file(file),
        Commands::Save { file } => workflow.on_save(file),
        Commands::Forget { file } => workflow.delete_secret(file),
    };

    // The workflow already reported the outcome; only the exit status is left.
    match completion {
        Completion::Done(_) | Completion::Unchanged => {}
        Completion::Failed(_) => process::exit(1),
        Completion::Aborted(_) => process::exit(2),
    }
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn secret_store(config: &Config) -> Box<dyn SecretStore> {
    if config.use_keyring {
        Box::new(KeyringSecretStore::new(config.keyring_service.clone()))
    } else {
        Box::new(MemorySecretStore::ephemeral())
    }
}

fn get_prompt(use_stdin: bool, remember: bool) -> Box<dyn Prompt> {
    if use_stdin {
        Box::new(StdinPrompt::new(Box::new(std::io::stdin()), remember))
    } else {
        Box::new(TerminalPrompt::new())
    }
}
