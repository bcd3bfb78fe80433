//! Commands managing the local files recorded in a manifest.

use std::path::PathBuf;

use serde_json::{json, Value};
use structopt::StructOpt;

use crate::client::BaseClient;
use crate::error::Result;
use crate::localfiles::LocalFiles;

use super::base::{evaluate_and_print, runtime, Matcher};

#[derive(StructOpt, Debug)]
#[structopt(about = "Handle the local files of a manifest")]
pub enum FilesSubCommand {
    #[structopt(about = "Create or update a manifest from a list of files")]
    Init {
        #[structopt(help = "Path of the manifest to write")]
        manifest: PathBuf,

        #[structopt(help = "Paths or URLs of the files", required = true)]
        paths: Vec<String>,

        #[structopt(
            short,
            long,
            help = "Filename template to parse properties from, e.g. 'data_{year}.csv'"
        )]
        template: Option<String>,
    },

    #[structopt(about = "Add files to an existing manifest")]
    Add {
        #[structopt(help = "Path of the manifest")]
        manifest: PathBuf,

        #[structopt(help = "Paths or URLs of the files", required = true)]
        paths: Vec<String>,

        #[structopt(short, long, help = "Filename template to parse properties from")]
        template: Option<String>,
    },

    #[structopt(about = "Show the files of a manifest and a summary of their properties")]
    Show {
        #[structopt(help = "Path of the manifest")]
        manifest: PathBuf,

        #[structopt(short, long, help = "Properties to summarize. All of them by default")]
        properties: Vec<String>,
    },
}

impl Matcher for FilesSubCommand {
    fn process(self, _client: &BaseClient) {
        let runtime = runtime();
        match self {
            FilesSubCommand::Init {
                manifest,
                paths,
                template,
            } => {
                let result: Result<Value> = runtime.block_on(async {
                    let mut files = LocalFiles::new(locators(paths), template.as_deref())?;
                    files.save(Some(&manifest)).await?;
                    Ok(describe(&files, None))
                });
                evaluate_and_print(result);
            }
            FilesSubCommand::Add {
                manifest,
                paths,
                template,
            } => {
                let result: Result<Value> = runtime.block_on(async {
                    let mut files = LocalFiles::from_file(&manifest).await?;
                    files.add(locators(paths), template.as_deref())?;
                    files.save(None).await?;
                    Ok(describe(&files, None))
                });
                evaluate_and_print(result);
            }
            FilesSubCommand::Show {
                manifest,
                properties,
            } => {
                let result: Result<Value> = runtime.block_on(async {
                    let files = LocalFiles::from_file(&manifest).await?;
                    let properties: Vec<&str> = properties.iter().map(String::as_str).collect();
                    let selected = (!properties.is_empty()).then_some(properties.as_slice());
                    Ok(describe(&files, selected))
                });
                evaluate_and_print(result);
            }
        }
    }
}

fn locators(paths: Vec<String>) -> Vec<Value> {
    paths.into_iter().map(Value::String).collect()
}

fn describe(files: &LocalFiles, properties: Option<&[&str]>) -> Value {
    json!({
        "manifest": files.manifest_path().map(|path| path.display().to_string()),
        "count": files.len(),
        "storage_size": files.storage_size(),
        "summary": files.summary(properties),
        "files": files.files(),
    })
}
