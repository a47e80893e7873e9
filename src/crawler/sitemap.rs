use log::{debug, error, info};
use quick_xml::Reader;
use quick_xml::events::Event;
use std::fs;
use std::path::Path;

use super::errors::{CrawlerError, CrawlerResult, SitemapError};

/// Read a local sitemap and return every `<loc>` value, or nothing on any error.
///
/// Read and parse failures are logged here and never propagate, so an empty
/// result means "nothing to crawl", not necessarily "the file was empty".
pub fn extract_urls_from_file(path: &Path) -> Vec<String> {
    match read_sitemap(path) {
        Ok(urls) => {
            info!("[sitemap] {} URL(s) in {}", urls.len(), path.display());
            urls
        }
        Err(e) => {
            error!("Error reading XML file {}: {}", path.display(), e);
            Vec::new()
        }
    }
}

pub fn read_sitemap(path: &Path) -> CrawlerResult<Vec<String>> {
    let content = fs::read_to_string(path).map_err(SitemapError::FileReadFailed)?;
    parse_sitemap(&content)
}

/// Collect the text of every element whose local name is `loc`, at any depth,
/// in document order. Values are trimmed; empty ones are skipped. Duplicates
/// are kept. Namespace prefixes are ignored.
pub fn parse_sitemap(xml: &str) -> CrawlerResult<Vec<String>> {
    let mut reader = Reader::from_str(xml.trim_start_matches('\u{feff}'));
    reader.trim_text(true);

    let mut urls = Vec::new();
    let mut depth = 0usize;
    let mut seen_root = false;
    // depth of the open <loc>, and its text so far
    let mut current: Option<(usize, String)> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                if depth == 0 && seen_root {
                    return Err(junk_after_root());
                }
                seen_root = true;
                depth += 1;
                if current.is_none() && e.local_name().as_ref() == b"loc" {
                    current = Some((depth, String::new()));
                }
            }
            Event::Empty(_) => {
                if depth == 0 {
                    if seen_root {
                        return Err(junk_after_root());
                    }
                    seen_root = true;
                }
            }
            Event::End(e) => {
                if let Some((loc_depth, text)) = current.take() {
                    if loc_depth == depth && e.local_name().as_ref() == b"loc" {
                        let url = text.trim();
                        if !url.is_empty() {
                            debug!("[sitemap] -> found URL: {}", url);
                            urls.push(url.to_string());
                        }
                    } else {
                        current = Some((loc_depth, text));
                    }
                }
                depth = depth.checked_sub(1).ok_or_else(|| {
                    SitemapError::MalformedDocument("unexpected closing tag".to_string())
                })?;
            }
            Event::Text(t) => {
                let text = t.unescape()?;
                match current.as_mut() {
                    Some((loc_depth, buffer)) if *loc_depth == depth => buffer.push_str(&text),
                    Some(_) => {}
                    None if depth == 0 => {
                        return Err(SitemapError::MalformedDocument(
                            "text outside the root element".to_string(),
                        )
                        .into());
                    }
                    None => {}
                }
            }
            Event::CData(c) => {
                if let Some((loc_depth, buffer)) = current.as_mut() {
                    if *loc_depth == depth {
                        buffer.push_str(&String::from_utf8_lossy(&c));
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !seen_root {
        return Err(SitemapError::MalformedDocument("no root element".to_string()).into());
    }
    if depth != 0 {
        return Err(SitemapError::MalformedDocument("unclosed element".to_string()).into());
    }

    Ok(urls)
}

fn junk_after_root() -> CrawlerError {
    SitemapError::MalformedDocument("junk after document element".to_string()).into()
}
