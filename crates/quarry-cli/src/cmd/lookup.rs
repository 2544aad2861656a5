//! Lookup command

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use comfy_table::presets::NOTHING;
use comfy_table::{ContentArrangement, Table};
use quarry_core::{Config, lookup as find_archive};
use quarry_schema::{DependencyKind, Specification, Version};
use serde::Serialize;

use crate::Status;

/// JSON view of a descriptor.
#[derive(Serialize)]
struct SpecView<'a> {
    name: &'a str,
    version: String,
    platform: Option<&'a str>,
    basename: &'a str,
    summary: Option<&'a str>,
    homepage: Option<&'a str>,
    authors: &'a [String],
    licenses: &'a [String],
    date: String,
    dependencies: Vec<DependencyView<'a>>,
    files: usize,
}

#[derive(Serialize)]
struct DependencyView<'a> {
    name: &'a str,
    requirement: &'a str,
    runtime: bool,
}

impl<'a> SpecView<'a> {
    fn new(spec: &'a Specification) -> Self {
        Self {
            name: spec.name(),
            version: spec.version().to_string(),
            platform: spec.platform(),
            basename: spec.basename(),
            summary: spec.summary.as_deref(),
            homepage: spec.homepage.as_deref(),
            authors: &spec.authors,
            licenses: &spec.licenses,
            date: spec.date.format("%Y-%m-%d").to_string(),
            dependencies: spec
                .dependencies
                .iter()
                .map(|d| DependencyView {
                    name: &d.name,
                    requirement: &d.requirement,
                    runtime: d.kind == DependencyKind::Runtime,
                })
                .collect(),
            files: spec.files.len(),
        }
    }
}

/// Print the descriptor of one archived package.
pub fn lookup(
    config: Option<&Path>,
    name: &str,
    version: Option<&str>,
    platform: Option<&str>,
    archive_dir: Option<PathBuf>,
    json: bool,
) -> Result<Status> {
    let version = version
        .map(Version::parse)
        .transpose()
        .context("Invalid version")?;
    let archive_dir = match archive_dir {
        Some(dir) => dir,
        None => Config::load(config)
            .context("Failed to load configuration")?
            .archive_dir()?,
    };

    let spec = find_archive(&archive_dir, name, version.as_ref(), platform)?;

    if json {
        super::print_json(&SpecView::new(&spec))?;
    } else {
        println!("{}", render(&spec));
    }
    Ok(Status::Clean)
}

fn render(spec: &Specification) -> Table {
    let mut table = Table::new();
    table
        .load_preset(NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.add_row(vec!["name".to_string(), spec.name().to_string()]);
    table.add_row(vec!["version".to_string(), spec.version().to_string()]);
    if let Some(platform) = spec.platform() {
        table.add_row(vec!["platform".to_string(), platform.to_string()]);
    }
    if let Some(summary) = &spec.summary {
        table.add_row(vec!["summary".to_string(), summary.clone()]);
    }
    if let Some(homepage) = &spec.homepage {
        table.add_row(vec!["homepage".to_string(), homepage.clone()]);
    }
    if !spec.authors.is_empty() {
        table.add_row(vec!["authors".to_string(), spec.authors.join(", ")]);
    }
    if !spec.licenses.is_empty() {
        table.add_row(vec!["licenses".to_string(), spec.licenses.join(", ")]);
    }
    table.add_row(vec!["date".to_string(), spec.date.format("%Y-%m-%d").to_string()]);

    let requires: Vec<String> = spec
        .runtime_dependencies()
        .map(|d| format!("{} {}", d.name, d.requirement))
        .collect();
    if !requires.is_empty() {
        table.add_row(vec!["requires".to_string(), requires.join(", ")]);
    }
    table.add_row(vec!["files".to_string(), spec.files.len().to_string()]);
    table
}
