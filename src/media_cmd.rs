//! `kw media` subcommands.

use anyhow::{bail, Result};
use std::path::Path;

use crate::config::Config;
use crate::db;
use crate::media;

pub async fn run_add(config: &Config, path: &Path) -> Result<()> {
    let pool = db::connect(config).await?;
    let attachment = media::add_attachment(&pool, &config.media.root, path).await?;
    pool.close().await;

    println!("media add");
    println!("  id: {}", attachment.id);
    println!("  file: {}", attachment.file_name);
    println!("  type: {}", attachment.mime_type);
    Ok(())
}

pub async fn run_list(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let list = media::list_attachments(&pool).await?;
    pool.close().await;

    if list.is_empty() {
        println!("No attachments.");
        return Ok(());
    }

    println!("{:>6}  {:<40} {:<10} TYPE", "ID", "FILE", "ON DISK");
    for a in &list {
        let on_disk = config.media.root.join(&a.file_name).is_file();
        println!("{:>6}  {:<40} {:<10} {}", a.id, a.file_name, on_disk, a.mime_type);
    }
    Ok(())
}

pub async fn run_delete(config: &Config, id: i64) -> Result<()> {
    let pool = db::connect(config).await?;
    let deleted = media::delete_attachment(&pool, &config.media.root, id).await?;
    pool.close().await;

    if !deleted {
        bail!("Attachment #{} does not exist.", id);
    }
    println!("Deleted attachment #{}.", id);
    Ok(())
}
