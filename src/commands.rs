//! One-shot CLI commands. Output goes to the given writer so the commands
//! can be exercised without a terminal.

use anyhow::{Context, Result, bail};
use std::io::Write;

use crate::{
    services::thumbnail_service::BulkGenerateOptions,
    state::AppState,
};

pub async fn list_categories(state: &AppState, out: &mut impl Write) -> Result<()> {
    let catalog = state.catalog.catalog().await;
    for category in &catalog.categories {
        writeln!(out, "{} ({} galleries)", category.name, category.galleries.len())?;
    }
    Ok(())
}

pub async fn list_galleries(state: &AppState, out: &mut impl Write) -> Result<()> {
    let catalog = state.catalog.catalog().await;
    for gallery in catalog.galleries() {
        writeln!(
            out,
            "{}\t{}/{}\t{} videos",
            gallery.stub,
            gallery.category,
            gallery.name,
            gallery.videos.len()
        )?;
    }
    Ok(())
}

pub async fn show_gallery(state: &AppState, stub: &str, out: &mut impl Write) -> Result<()> {
    let gallery = state
        .catalog
        .find_gallery(stub)
        .await
        .with_context(|| format!("no gallery with stub `{stub}`"))?;
    writeln!(out, "{}/{}", gallery.category, gallery.name)?;
    for video in &gallery.videos {
        writeln!(out, "  {}", video.name)?;
        if video.has_video() {
            writeln!(out, "    video: {}", video.url)?;
        }
        if let Some(thumbnail) = &video.thumbnail_url {
            writeln!(out, "    thumbnail: {thumbnail}")?;
        }
    }
    Ok(())
}

pub async fn export(state: &AppState, format: &str, out: &mut impl Write) -> Result<()> {
    if !format.eq_ignore_ascii_case("json") {
        bail!("unsupported export format `{format}` (only `json` is available)");
    }
    let catalog = state.catalog.catalog().await;
    serde_json::to_writer_pretty(&mut *out, &catalog.to_feed())?;
    writeln!(out)?;
    Ok(())
}

pub async fn generate_thumbnails(
    state: &AppState,
    options: BulkGenerateOptions,
    out: &mut impl Write,
) -> Result<()> {
    let report = state.thumbnails.bulk_generate_thumbnails(options).await?;
    writeln!(
        out,
        "processed: {}, errors: {}, skipped: {}",
        report.processed, report.errors, report.skipped
    )?;
    Ok(())
}

pub async fn clear_thumbnails(state: &AppState, out: &mut impl Write) -> Result<()> {
    let deleted = state.thumbnails.bulk_clear_thumbnails().await?;
    writeln!(out, "deleted: {deleted}")?;
    Ok(())
}
