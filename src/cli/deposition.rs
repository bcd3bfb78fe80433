//! Deposition-related CLI commands
//!
//! Every command prints the deposition as returned by the server after the
//! action, except `delete` which prints `null`.

use std::path::PathBuf;

use structopt::StructOpt;

use crate::client::BaseClient;
use crate::deposition::{Deposition, Depositions};
use crate::error::Result;
use crate::metadata::Metadata;
use crate::native_api::deposition::{DepositionQuery, DepositionRecord};

use super::base::{evaluate_and_print, parse_replacements, runtime, Matcher};

#[derive(StructOpt, Debug)]
#[structopt(about = "Handle depositions of the Zenodo instance")]
pub enum DepositionSubCommand {
    #[structopt(about = "Retrieve a deposition")]
    Retrieve {
        #[structopt(help = "Identifier of the deposition")]
        id: i64,
    },

    #[structopt(about = "Create a deposition")]
    Create {
        #[structopt(short, long, help = "Path to the JSON/YAML metadata")]
        metadata: Option<PathBuf>,

        #[structopt(short, long = "replace", help = "Placeholder replacements, as key=value")]
        replacements: Vec<String>,
    },

    #[structopt(about = "Replace the metadata of a deposition")]
    Update {
        #[structopt(help = "Identifier of the deposition")]
        id: i64,

        #[structopt(short, long, help = "Path to the JSON/YAML metadata")]
        metadata: PathBuf,

        #[structopt(short, long = "replace", help = "Placeholder replacements, as key=value")]
        replacements: Vec<String>,
    },

    #[structopt(about = "Publish a deposition")]
    Publish {
        #[structopt(help = "Identifier of the deposition")]
        id: i64,
    },

    #[structopt(about = "Unlock a published deposition for editing")]
    Edit {
        #[structopt(help = "Identifier of the deposition")]
        id: i64,
    },

    #[structopt(about = "Discard the changes of the current editing session")]
    Discard {
        #[structopt(help = "Identifier of the deposition")]
        id: i64,
    },

    #[structopt(about = "Create a new version of a published deposition")]
    NewVersion {
        #[structopt(help = "Identifier of the deposition")]
        id: i64,
    },

    #[structopt(about = "Delete an unpublished deposition")]
    Delete {
        #[structopt(help = "Identifier of the deposition")]
        id: i64,
    },

    #[structopt(about = "List the depositions of the user")]
    List(DepositionQuery),
}

impl Matcher for DepositionSubCommand {
    fn process(self, client: &BaseClient) {
        let runtime = runtime();
        let depositions = Depositions::new(client.clone());

        match self {
            DepositionSubCommand::Retrieve { id } => {
                let result = runtime.block_on(depositions.retrieve(id));
                evaluate_and_print(result.map(into_record));
            }
            DepositionSubCommand::Create {
                metadata,
                replacements,
            } => {
                let result: Result<Deposition> = runtime.block_on(async {
                    match metadata {
                        Some(path) => {
                            let metadata = Metadata::from_file(path)?;
                            let replacements = parse_replacements(&replacements)?;
                            depositions
                                .create_with_metadata(&metadata, &replacements)
                                .await
                        }
                        None => depositions.create(None).await,
                    }
                });
                evaluate_and_print(result.map(into_record));
            }
            DepositionSubCommand::Update {
                id,
                metadata,
                replacements,
            } => {
                let result: Result<Deposition> = runtime.block_on(async {
                    let metadata = Metadata::from_file(metadata)?;
                    let replacements = parse_replacements(&replacements)?;
                    let deposition = depositions.retrieve(id).await?;
                    deposition
                        .update_with_metadata(&metadata, &replacements)
                        .await
                });
                evaluate_and_print(result.map(into_record));
            }
            DepositionSubCommand::Publish { id } => {
                let result: Result<Deposition> = runtime.block_on(async {
                    depositions.retrieve(id).await?.publish().await
                });
                evaluate_and_print(result.map(into_record));
            }
            DepositionSubCommand::Edit { id } => {
                let result: Result<Deposition> =
                    runtime.block_on(async { depositions.retrieve(id).await?.edit().await });
                evaluate_and_print(result.map(into_record));
            }
            DepositionSubCommand::Discard { id } => {
                let result: Result<Deposition> =
                    runtime.block_on(async { depositions.retrieve(id).await?.discard().await });
                evaluate_and_print(result.map(into_record));
            }
            DepositionSubCommand::NewVersion { id } => {
                let result: Result<Deposition> = runtime.block_on(async {
                    depositions.retrieve(id).await?.new_version().await
                });
                evaluate_and_print(result.map(into_record));
            }
            DepositionSubCommand::Delete { id } => {
                let result: Result<()> =
                    runtime.block_on(async { depositions.retrieve(id).await?.delete().await });
                evaluate_and_print(result);
            }
            DepositionSubCommand::List(query) => {
                let result = runtime.block_on(depositions.list(&query));
                evaluate_and_print(result.map(|depositions| {
                    depositions
                        .into_iter()
                        .map(into_record)
                        .collect::<Vec<_>>()
                }));
            }
        }
    }
}

fn into_record(deposition: Deposition) -> DepositionRecord {
    deposition.record().clone()
}
