//! Minimal directory index rendering (§6.4). Lists immediate children of a
//! resolved docroot directory, filtered to plausible media by extension,
//! in one of a handful of flat representations. Does not recurse, does
//! not cache, does not sort beyond lexicographic — grounded on harvid's
//! own `hdl_index_dir`, which is explicitly a convenience surface rather
//! than a product feature.

use std::path::Path;

use serde::Serialize;

const MEDIA_EXTENSIONS: &[&str] = &[
    "mov", "mp4", "avi", "mkv", "webm", "mpg", "mpeg", "m4v", "flv", "ogv",
];

#[derive(Debug, Clone, Serialize)]
pub struct Entry {
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
}

/// Lists the immediate children of `dir`. Directories are always included;
/// files are included only when their extension looks like playable media.
pub fn list_entries(dir: &Path) -> std::io::Result<Vec<Entry>> {
    let mut entries = Vec::new();
    for dirent in std::fs::read_dir(dir)? {
        let dirent = dirent?;
        let metadata = dirent.metadata()?;
        let name = dirent.file_name().to_string_lossy().into_owned();
        let is_dir = metadata.is_dir();

        if !is_dir {
            let looks_like_media = Path::new(&name)
                .extension()
                .and_then(|e| e.to_str())
                .map(|ext| MEDIA_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if !looks_like_media {
                continue;
            }
        }

        entries.push(Entry {
            name,
            is_dir,
            size: metadata.len(),
        });
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFormat {
    Html,
    Xhtml,
    Json,
    Csv,
    Plain,
}

impl IndexFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "html" => Some(Self::Html),
            "xhtml" => Some(Self::Xhtml),
            "json" => Some(Self::Json),
            "csv" => Some(Self::Csv),
            "plain" => Some(Self::Plain),
            _ => None,
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            IndexFormat::Html => "text/html; charset=utf-8",
            IndexFormat::Xhtml => "application/xhtml+xml; charset=utf-8",
            IndexFormat::Json => "application/json",
            IndexFormat::Csv => "text/csv",
            IndexFormat::Plain => "text/plain; charset=utf-8",
        }
    }
}

/// Renders `entries` (the children of `base_url`) in `format`. `base_url`
/// is the request path the listing was generated for, used to build
/// frame-0 links in the HTML/XHTML representations.
pub fn render(entries: &[Entry], base_url: &str, format: IndexFormat) -> String {
    match format {
        IndexFormat::Html | IndexFormat::Xhtml => render_html(entries, base_url),
        IndexFormat::Json => {
            serde_json::to_string(&serde_json::json!({ "entries": entries }))
                .unwrap_or_else(|_| "{\"entries\":[]}".to_string())
        }
        IndexFormat::Csv => {
            let mut out = String::new();
            for e in entries {
                out.push_str(&format!("{},{},{}\n", e.name, e.is_dir, e.size));
            }
            out
        }
        IndexFormat::Plain => {
            let mut out = String::new();
            for e in entries {
                out.push_str(&e.name);
                out.push('\n');
            }
            out
        }
    }
}

fn render_html(entries: &[Entry], base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let mut out = String::from("<html><body><ul>\n");
    for e in entries {
        if e.is_dir {
            out.push_str(&format!(
                "<li><a href=\"{base}/{name}/\">{name}/</a></li>\n",
                base = base,
                name = e.name
            ));
        } else {
            out.push_str(&format!(
                "<li><a href=\"{base}/{name}?frame=0&format=png\">{name}</a></li>\n",
                base = base,
                name = e.name
            ));
        }
    }
    out.push_str("</ul></body></html>\n");
    out
}
