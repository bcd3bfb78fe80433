use colored::Colorize;
use structopt::StructOpt;
use tracing_subscriber::EnvFilter;

use zenodo::cli::auth::{prompt_for_credentials, AuthProfile, AuthSubCommand};
use zenodo::cli::base::{exit_with_error, Matcher};
use zenodo::cli::deposition::DepositionSubCommand;
use zenodo::cli::files::FilesSubCommand;
use zenodo::cli::search::{LicensesSubCommand, RecordsSubCommand};
use zenodo::cli::upload::UploadCommand;
use zenodo::client::{BaseClient, DEFAULT_URL};
use zenodo::error::Result;

static HEADER: &str = r#"
--- Zenodo Command Line Interface (ZENCLI) ---
"#;

#[derive(StructOpt, Debug)]
struct GlobalOpts {
    /// Profile name to use for configuration
    #[structopt(short, long, global = true)]
    profile: Option<String>,
}

#[derive(StructOpt, Debug)]
#[structopt(about = "CLI to interact with Zenodo")]
struct Cli {
    #[structopt(flatten)]
    global: GlobalOpts,

    #[structopt(subcommand)]
    cmd: Zencli,
}

#[derive(StructOpt, Debug)]
enum Zencli {
    Files(FilesSubCommand),
    Upload(UploadCommand),
    Deposition(DepositionSubCommand),
    Licenses(LicensesSubCommand),
    Records(RecordsSubCommand),
    Auth(AuthSubCommand),
}

fn main() {
    let cli = Cli::from_args();

    // Logs go to stderr so that the JSON output can still be piped
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Neither of these talks to the server
    match cli.cmd {
        Zencli::Auth(command) => return command.process(&offline_client()),
        Zencli::Files(command) => return command.process(&offline_client()),
        _ => {}
    }

    let client = match cli.global.profile {
        Some(profile) => AuthProfile::get_from_keyring(&profile).and_then(|p| p.client()),
        None => setup_client_from_env().or_else(|_| setup_client_from_input()),
    };
    let client = client.unwrap_or_else(|error| exit_with_error(&error));

    if atty::is(atty::Stream::Stdout) {
        println!("{}", HEADER.bold());
    }

    match cli.cmd {
        Zencli::Upload(command) => command.process(&client),
        Zencli::Deposition(command) => command.process(&client),
        Zencli::Licenses(command) => command.process(&client),
        Zencli::Records(command) => command.process(&client),
        Zencli::Auth(command) => command.process(&client),
        Zencli::Files(command) => command.process(&client),
    }
}

fn offline_client() -> BaseClient {
    BaseClient::new(DEFAULT_URL, None).unwrap_or_else(|error| exit_with_error(&error))
}

// Reads the URL and the token from ZENODO_URL and ZENODO_TOKEN. The URL
// defaults to the public instance, the token is required.
fn setup_client_from_env() -> Result<BaseClient> {
    let base_url = std::env::var("ZENODO_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());
    let token = std::env::var("ZENODO_TOKEN").map_err(|_| {
        zenodo::error::ZenodoError::InvalidArgument("ZENODO_TOKEN is not set".to_string())
    })?;

    BaseClient::new(&base_url, Some(&token))
}

fn setup_client_from_input() -> Result<BaseClient> {
    let (base_url, token) = prompt_for_credentials()?;
    let token = Some(token).filter(|token| !token.trim().is_empty());

    BaseClient::new(&base_url, token.as_ref())
}
