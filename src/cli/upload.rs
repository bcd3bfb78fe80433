use std::path::PathBuf;

use serde_json::{json, Value};
use structopt::StructOpt;

use crate::client::BaseClient;
use crate::error::Result;
use crate::localfiles::{LinkOptions, LocalFiles};
use crate::metadata::Metadata;
use crate::upload::UploadOptions;

use super::base::{evaluate_and_print, parse_replacements, runtime, Matcher};

/// Uploads the new and changed files of a manifest to its deposition.
#[derive(StructOpt, Debug)]
#[structopt(about = "Upload the files of a manifest to its deposition")]
pub struct UploadCommand {
    #[structopt(help = "Path of the manifest")]
    manifest: PathBuf,

    #[structopt(short, long, help = "Deposition to link when the manifest has none")]
    deposition: Option<i64>,

    #[structopt(long, help = "Create a deposition when none is linked")]
    create: bool,

    #[structopt(
        short,
        long,
        help = "JSON/YAML metadata of the deposition to create",
        requires = "create"
    )]
    metadata: Option<PathBuf>,

    #[structopt(
        short,
        long = "replace",
        help = "Placeholder replacements of the metadata, as key=value"
    )]
    replacements: Vec<String>,

    #[structopt(short, long, help = "Upload files even when they are already present")]
    force: bool,

    #[structopt(long, help = "Hide the progress bars")]
    no_progress: bool,

    #[structopt(long, help = "Retries of each file", default_value = "15")]
    retries: usize,
}

impl Matcher for UploadCommand {
    fn process(self, client: &BaseClient) {
        let runtime = runtime();
        let result = runtime.block_on(self.run(client));
        evaluate_and_print(result);
    }
}

impl UploadCommand {
    async fn run(self, client: &BaseClient) -> Result<Value> {
        let metadata = match &self.metadata {
            Some(path) => {
                let replacements = parse_replacements(&self.replacements)?;
                Some(Metadata::from_file(path)?.render(&replacements)?)
            }
            None => None,
        };

        let mut files = LocalFiles::from_file(&self.manifest).await?;
        let link = LinkOptions {
            deposition: self.deposition,
            metadata,
            create_if_not_exists: self.create,
        };
        let deposition_id = files.set_deposition(client, link).await?.id();

        let mut options = UploadOptions {
            force: self.force,
            progress: !self.no_progress,
            ..Default::default()
        };
        options.retry.max_retries = self.retries;

        let report = files.upload(&mut options).await?;

        Ok(json!({
            "deposition": deposition_id,
            "report": report,
        }))
    }
}
