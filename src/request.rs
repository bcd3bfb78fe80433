use std::path::PathBuf;

use futures::TryStreamExt;
use indicatif::ProgressBar;
use lazy_static::lazy_static;
use reqwest::{Body, RequestBuilder};
use tokio::fs::File;
use tokio_util::codec::{BytesCodec, FramedRead};

use crate::error::Result;
use crate::progress::setup_progress_log;

lazy_static! {
    static ref BUFFER_SIZE: usize = std::env::var("ZENODO_BUFFER_SIZE")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(2 * 1024 * 1024); // Default to 2MB if env var not set or invalid
}

pub enum RequestType {
    /// A plain request with no body.
    Plain,

    /// A JSON request with a JSON body and the content type set to application/json.
    JSON { body: String },

    /// A request streaming the content of a local file as raw body.
    File {
        path: PathBuf,
        name: String,
        progress: bool,
    },
}

impl RequestType {
    /// Builds a JSON request context from any serializable value.
    ///
    /// # Arguments
    /// * `value` - The value to serialize into the request body.
    ///
    /// # Returns
    /// A `Result` containing the request context or a serialization error.
    pub fn json<T: serde::Serialize>(value: &T) -> Result<Self> {
        Ok(RequestType::JSON {
            body: serde_json::to_string(value)?,
        })
    }

    /// Convert the request type to a request builder.
    ///
    /// # Arguments
    /// * `self` - The request type.
    /// * `request` - The request builder.
    ///
    /// # Returns
    /// A `Result` containing the modified request builder or an error.
    pub async fn to_request(self, request: RequestBuilder) -> Result<RequestBuilder> {
        match self {
            RequestType::Plain => Ok(request),
            RequestType::JSON { body } => Ok(Self::build_json_request(body, request)),
            RequestType::File {
                path,
                name,
                progress,
            } => Self::build_file_request(path, &name, progress, request).await,
        }
    }

    /// Build a JSON request.
    fn build_json_request(body: String, request: RequestBuilder) -> RequestBuilder {
        request
            .header("Content-Type", "application/json")
            .body(body)
    }

    /// Build a request whose body streams a local file.
    ///
    /// The content length is set from the file metadata so that storage
    /// backends accepting only sized uploads are satisfied.
    async fn build_file_request(
        path: PathBuf,
        name: &str,
        progress: bool,
        request: RequestBuilder,
    ) -> Result<RequestBuilder> {
        let file = File::open(&path).await?;
        let size = file.metadata().await?.len();

        let pb = if progress {
            setup_progress_log(size, None, name)
        } else {
            ProgressBar::hidden()
        };

        Ok(request
            .header("Content-Type", "application/octet-stream")
            .header("Content-Length", size.to_string())
            .body(create_file_stream(file, pb)))
    }
}

/// Creates a `Body` from a `File`, advancing the progress bar per chunk.
///
/// # Arguments
/// * `file` - The file to be uploaded.
/// * `pb` - A progress bar to track the upload progress.
///
/// # Returns
/// A streaming `Body`.
fn create_file_stream(file: File, pb: ProgressBar) -> Body {
    let stream = FramedRead::with_capacity(file, BytesCodec::new(), *BUFFER_SIZE)
        .map_ok(bytes::Bytes::from)
        .inspect_ok(move |chunk| {
            pb.inc(chunk.len() as u64);
        });

    Body::wrap_stream(stream)
}
