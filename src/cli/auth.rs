//! Authentication profiles of `zencli`, kept in the system keyring.

use std::io::{self, Write};

use colored::Colorize;
use dialoguer::Input;
use keyring::Entry;
use reqwest::Url;
use rpassword::prompt_password;
use structopt::StructOpt;

use crate::client::{BaseClient, DEFAULT_URL};
use crate::error::{Result, ZenodoError};

use super::base::{exit_with_error, Matcher};

/// Keyring service under which profiles are stored.
const KEYRING_SERVICE: &str = "zencli";

/// Separator between the URL and the token in a keyring entry.
const SEPARATOR: &str = "--";

/// Interactively prompts the user for the Zenodo URL and access token
pub fn prompt_for_credentials() -> Result<(String, String)> {
    println!("\n{}", "Setting up Zenodo connection...".bold().cyan());
    println!("{}", "─".repeat(50).dimmed());

    let base_url: String = Input::new()
        .with_prompt("Enter Zenodo URL".bold().green().to_string())
        .default(DEFAULT_URL.to_string())
        .show_default(true)
        .interact_text()
        .map_err(prompt_error)?;

    println!("\n{}", "Enter access token".bold().green());
    println!("{}", "   Token will be hidden".dimmed());
    print!("{} ", "Token:".bold().yellow());
    io::stdout().flush()?;
    let token = prompt_password("")?;

    println!("{}", "─".repeat(50).dimmed());
    Ok((base_url, token))
}

#[derive(StructOpt, Debug)]
#[structopt(about = "Handle authentication of the Zenodo CLI")]
pub enum AuthSubCommand {
    #[structopt(about = "Set the authentication profile")]
    Set {
        #[structopt(short, long, help = "Name of the profile")]
        name: Option<String>,

        #[structopt(short, long, help = "URL of the Zenodo instance")]
        url: Option<String>,

        #[structopt(short, long, help = "Personal access token")]
        token: Option<String>,
    },
}

impl Matcher for AuthSubCommand {
    fn process(self, _client: &BaseClient) {
        match self {
            AuthSubCommand::Set { name, url, token } => {
                if let Err(error) = set_profile(name, url, token) {
                    exit_with_error(&error);
                }
            }
        }
    }
}

fn set_profile(name: Option<String>, url: Option<String>, token: Option<String>) -> Result<()> {
    let name = match name {
        Some(name) => name,
        None => Input::new()
            .with_prompt("Enter profile name".bold().green().to_string())
            .interact_text()
            .map_err(prompt_error)?,
    };

    let (url, token) = match (url, token) {
        (Some(url), Some(token)) => (url, token),
        (url, token) => {
            let (prompted_url, prompted_token) = prompt_for_credentials()?;
            (url.unwrap_or(prompted_url), token.unwrap_or(prompted_token))
        }
    };

    AuthProfile::new(name.clone(), url, token)?.set_to_keyring()?;

    println!(
        "{} Profile '{}' saved. Use it with {}",
        "✓".bold().green(),
        name.bold().green(),
        format!("--profile {name}").dimmed().italic()
    );
    Ok(())
}

fn prompt_error(error: dialoguer::Error) -> ZenodoError {
    ZenodoError::InvalidArgument(format!("Prompt failed: {error}"))
}

fn keyring_error(error: keyring::Error) -> ZenodoError {
    ZenodoError::InvalidArgument(format!("Keyring access failed: {error}"))
}

/// A named Zenodo URL and access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthProfile {
    name: String,
    url: String,
    token: String,
}

impl AuthProfile {
    /// Validates the URL and the token of a new profile.
    pub fn new(name: String, url: String, token: String) -> Result<Self> {
        Url::parse(&url)
            .map_err(|_| ZenodoError::InvalidArgument(format!("Invalid URL '{url}'")))?;

        let token = token.trim().to_string();
        if token.is_empty() || !token.chars().all(char::is_alphanumeric) {
            return Err(ZenodoError::InvalidArgument(
                "Invalid token: expected a non-empty alphanumeric string".to_string(),
            ));
        }

        Ok(AuthProfile { name, url, token })
    }

    pub fn set_to_keyring(&self) -> Result<()> {
        let entry = Entry::new(KEYRING_SERVICE, &self.name).map_err(keyring_error)?;
        entry
            .set_password(&self.to_secret())
            .map_err(keyring_error)?;
        Ok(())
    }

    pub fn get_from_keyring(name: &str) -> Result<Self> {
        let entry = Entry::new(KEYRING_SERVICE, name).map_err(keyring_error)?;
        let secret = entry.get_password().map_err(keyring_error)?;
        Self::from_secret(name, &secret)
    }

    /// Client authenticated with this profile.
    pub fn client(&self) -> Result<BaseClient> {
        BaseClient::new(&self.url, Some(&self.token))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    fn to_secret(&self) -> String {
        format!("{}{SEPARATOR}{}", self.url, self.token)
    }

    // The token never contains the separator, the URL may.
    fn from_secret(name: &str, secret: &str) -> Result<Self> {
        let (url, token) = secret.rsplit_once(SEPARATOR).ok_or_else(|| {
            ZenodoError::InvalidArgument(format!("Corrupted keyring entry for profile '{name}'"))
        })?;

        Ok(AuthProfile {
            name: name.to_string(),
            url: url.to_string(),
            token: token.to_string(),
        })
    }
}
