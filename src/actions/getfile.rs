//! `getfile` - stream a file's bytes back to the client.

use std::path::PathBuf;

use super::{ActionContext, Reply};
use crate::config::ShotConfig;
use crate::error::{Error, Result};

pub(crate) async fn run(_ctx: &ActionContext<'_>, cfg: &ShotConfig) -> Result<Reply> {
    let path = PathBuf::from(cfg.url.as_deref().ok_or(Error::NoUrl)?);

    match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_file() => Ok(Reply::FileStream(path)),
        _ => Err(Error::FileNotFound(path)),
    }
}
