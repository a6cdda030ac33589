//! CLI output formatting.
//!
//! # Output Format
//!
//! Every command prints the entity first and the details as indented
//! context lines underneath.
//!
//! ## Info
//!
//! ```text
//! cat 1024x768
//!     Id: http://localhost:8080/iiif/cat
//!     Formats: jpg, png
//! ```
//!
//! ## Plan
//!
//! ```text
//! /iiif/cat/10,20,30,40/full/90/gray.png
//!     Source: images/cat.jpg
//!     Args: -crop 30x40+10+20 -rotate 90 -colorspace Gray images/cat.jpg png:-
//! ```
//!
//! ## Render
//!
//! ```text
//! cat.png
//!     Type: image/png
//!     Size: 48213 bytes
//!     From: rendered
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure and do no I/O.

use crate::imaging::ArgumentVector;
use crate::info::{InfoDocument, ProfileEntry};
use crate::service::{Plan, Provenance, Rendered};
use std::path::Path;

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Quote an argument for display if it would be ambiguous unquoted.
fn display_arg(arg: &str) -> String {
    if arg.is_empty() || arg.chars().any(char::is_whitespace) {
        format!("{arg:?}")
    } else {
        arg.to_string()
    }
}

fn display_args(args: &ArgumentVector) -> String {
    args.as_slice()
        .iter()
        .map(|a| display_arg(a))
        .collect::<Vec<_>>()
        .join(" ")
}

fn provenance_label(provenance: Provenance) -> &'static str {
    match provenance {
        Provenance::Cache => "cache",
        Provenance::Rendered => "rendered",
        Provenance::Shared => "shared",
    }
}

pub fn format_info(identifier: &str, doc: &InfoDocument) -> Vec<String> {
    let formats: Vec<&str> = doc
        .profile
        .iter()
        .filter_map(|entry| match entry {
            ProfileEntry::Formats { formats } => Some(formats.iter().map(String::as_str)),
            ProfileEntry::Level(_) => None,
        })
        .flatten()
        .collect();

    vec![
        format!("{} {}x{}", identifier, doc.width, doc.height),
        format!("{}Id: {}", indent(1), doc.id),
        format!("{}Formats: {}", indent(1), formats.join(", ")),
    ]
}

pub fn print_info(identifier: &str, doc: &InfoDocument) {
    for line in format_info(identifier, doc) {
        println!("{line}");
    }
}

pub fn format_plan(request: &str, plan: &Plan) -> Vec<String> {
    vec![
        request.to_string(),
        format!("{}Source: {}", indent(1), plan.source.display()),
        format!("{}Args: {}", indent(1), display_args(&plan.args)),
    ]
}

pub fn print_plan(request: &str, plan: &Plan) {
    for line in format_plan(request, plan) {
        println!("{line}");
    }
}

pub fn format_render(destination: &Path, rendered: &Rendered) -> Vec<String> {
    vec![
        destination.display().to_string(),
        format!("{}Type: {}", indent(1), rendered.entry.content_type),
        format!("{}Size: {} bytes", indent(1), rendered.entry.bytes.len()),
        format!("{}From: {}", indent(1), provenance_label(rendered.provenance)),
    ]
}

pub fn print_render(destination: &Path, rendered: &Rendered) {
    for line in format_render(destination, rendered) {
        println!("{line}");
    }
}
