//! Read-only commands over published records and licenses.

use structopt::StructOpt;

use crate::client::BaseClient;
use crate::native_api::licenses::{self, SearchQuery};
use crate::native_api::records;

use super::base::{evaluate_and_print, runtime, Matcher};

#[derive(StructOpt, Debug)]
#[structopt(about = "Browse the licenses known to the Zenodo instance")]
pub enum LicensesSubCommand {
    #[structopt(about = "Search licenses")]
    List(SearchQuery),

    #[structopt(about = "Retrieve a license")]
    Retrieve {
        #[structopt(help = "Identifier of the license, e.g. 'cc-by-4.0'")]
        id: String,
    },
}

impl Matcher for LicensesSubCommand {
    fn process(self, client: &BaseClient) {
        let runtime = runtime();
        match self {
            LicensesSubCommand::List(query) => {
                let result = runtime.block_on(licenses::list_licenses(client, &query));
                evaluate_and_print(result);
            }
            LicensesSubCommand::Retrieve { id } => {
                evaluate_and_print(runtime.block_on(licenses::retrieve_license(client, &id)));
            }
        }
    }
}

#[derive(StructOpt, Debug)]
#[structopt(about = "Browse the published records")]
pub enum RecordsSubCommand {
    #[structopt(about = "Search published records")]
    List(SearchQuery),

    #[structopt(about = "Retrieve a published record")]
    Retrieve {
        #[structopt(help = "Identifier of the record")]
        id: i64,
    },
}

impl Matcher for RecordsSubCommand {
    fn process(self, client: &BaseClient) {
        let runtime = runtime();
        match self {
            RecordsSubCommand::List(query) => {
                let result = runtime.block_on(records::list_records(client, &query));
                evaluate_and_print(result);
            }
            RecordsSubCommand::Retrieve { id } => {
                evaluate_and_print(runtime.block_on(records::retrieve_record(client, id)));
            }
        }
    }
}
