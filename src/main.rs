use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use rapidput::http::{HttpTransport, DEFAULT_API_BASE};
use rapidput::{AccessToken, DriveUploader, UploadConfig, UploadOutcome, UploadTarget};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rapidput=info")),
        )
        .init();

    let mut args = std::env::args_os().skip(1);
    let (Some(path), Some(parent_id)) = (args.next(), args.next()) else {
        bail!("usage: rapidput <file> <parent_file_id> [name]");
    };
    let path = PathBuf::from(path);
    let parent_id = parent_id.to_string_lossy().into_owned();
    let name = match args.next() {
        Some(name) => name.to_string_lossy().into_owned(),
        None => path
            .file_name()
            .context("the file has no name, pass one explicitly")?
            .to_string_lossy()
            .into_owned(),
    };

    let token = std::env::var("DRIVE_ACCESS_TOKEN").context("DRIVE_ACCESS_TOKEN is not set")?;
    let drive_id = std::env::var("DRIVE_ID").ok();
    let api_base = std::env::var("DRIVE_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.into());

    let mut config = UploadConfig::default();
    if let Ok(rapid_upload) = std::env::var("DRIVE_RAPID_UPLOAD") {
        config = config.rapid_upload(!matches!(rapid_upload.as_str(), "0" | "false" | "no"));
    }
    if let Ok(temp_dir) = std::env::var("DRIVE_TEMP_DIR") {
        config = config.temp_dir(temp_dir);
    }

    let file = tokio::fs::File::open(&path)
        .await
        .with_context(|| format!("opening {}", path.display()))?;
    let size = file.metadata().await?.len();

    let transport = HttpTransport::new(api_base, AccessToken::new(token));
    let uploader = match drive_id {
        Some(drive_id) => DriveUploader::new(transport, drive_id, config),
        None => DriveUploader::for_default_drive(transport, config)
            .await
            .context("looking up the default drive")?,
    };

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });

    let target = UploadTarget::new(parent_id, name, size);
    let outcome = uploader
        .put(&target, file, |percent| eprintln!("{percent}%"), &cancel)
        .await
        .with_context(|| format!("uploading {}", path.display()))?;

    match outcome {
        UploadOutcome::RapidUpload { file_id } => {
            println!("{file_id} (rapid upload, nothing transferred)");
        }
        UploadOutcome::Transferred {
            file_id,
            parts,
            bytes,
        } => {
            println!("{file_id} ({bytes} bytes in {parts} parts)");
        }
    }

    Ok(())
}
