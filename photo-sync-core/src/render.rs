//! Markdown post rendering.
//!
//! [`render_post`] is a pure function of a typed [`RenderContext`]. Caption
//! text only reaches the document through [`front_matter_title`] (quotes,
//! periods, backslashes and control characters removed) and the body (hashtags removed), so a caption cannot close
//! or extend the YAML front matter.

use std::fmt::Write;

use chrono::{DateTime, FixedOffset};

use crate::normalize::{is_plain_tag, strip_hashtags};

/// Everything the post template needs, resolved up front.
#[derive(Debug, Clone)]
pub struct RenderContext<'a> {
    pub title: &'a str,
    pub published: DateTime<FixedOffset>,
    pub short_code: &'a str,
    /// `owner/name` of the destination; the name doubles as the site host.
    pub destination: &'a str,
    pub tags: &'a [String],
    /// Tags that are never written to a post.
    pub reserved_tags: &'a [String],
    pub caption: &'a str,
    pub permalink: &'a str,
    pub source_label: &'a str,
    pub source_tag: &'a str,
    pub image_dir: &'a str,
}

/// A rendered post and where it goes in the destination repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPost {
    pub path: String,
    pub content: String,
}

/// `<posts_dir>/<YYYY-MM-DD>-<short_code>.<ext>`
pub fn post_path(posts_dir: &str, published: &DateTime<FixedOffset>, short_code: &str, ext: &str) -> String {
    format!(
        "{}/{}-{}.{}",
        posts_dir.trim_end_matches('/'),
        published.format("%Y-%m-%d"),
        short_code,
        ext
    )
}

/// `<image_dir>/<short_code>.jpg`
pub fn image_path(image_dir: &str, short_code: &str) -> String {
    format!("{}/{}.jpg", image_dir.trim_end_matches('/'), short_code)
}

/// Title as written into a double-quoted YAML scalar: no double quotes, no
/// periods, no backslashes. Line breaks and tabs become spaces; other control
/// characters are dropped.
pub fn front_matter_title(title: &str) -> String {
    title
        .chars()
        .filter(|c| !matches!(c, '"' | '.' | '\\'))
        .filter_map(|c| match c {
            '\n' | '\r' | '\t' => Some(' '),
            c if c.is_control() => None,
            c => Some(c),
        })
        .collect()
}

fn site_host(destination: &str) -> &str {
    destination.rsplit('/').next().unwrap_or(destination)
}

pub fn render_post(ctx: &RenderContext<'_>) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = writeln!(out, "---");
    let _ = writeln!(out, "layout: photo");
    let _ = writeln!(out, "date: {}", ctx.published.format("%Y-%m-%d %H:%M:%S %z"));
    let _ = writeln!(out, "title: \"{}\"", front_matter_title(ctx.title));
    let _ = writeln!(out, "type: post");
    let _ = writeln!(out, "tags:");
    let _ = writeln!(out, "- {}", ctx.source_tag);
    let mut written: Vec<&str> = vec![ctx.source_tag];
    for tag in ctx.tags {
        if ctx.reserved_tags.contains(tag) || !is_plain_tag(tag) || written.contains(&tag.as_str()) {
            continue;
        }
        let _ = writeln!(out, "- {tag}");
        written.push(tag);
    }
    let _ = writeln!(out, "{}_url: {}", ctx.source_tag, ctx.permalink.trim());
    let _ = writeln!(out, "---");
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "![{} - {}](https://{}/{}/{}.jpg){{:loading=\"lazy\"}}{{: .u-photo}}",
        ctx.source_label,
        ctx.short_code,
        site_host(ctx.destination),
        ctx.image_dir.trim_matches('/'),
        ctx.short_code
    );
    let _ = writeln!(out);
    let body = strip_hashtags(ctx.caption);
    if !body.is_empty() {
        let _ = writeln!(out, "{body}");
    }
    out
}
