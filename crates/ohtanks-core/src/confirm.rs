//! Parsing of the storage provider's "cannot scan for viruses" interstitial.
//!
//! The page carries a form whose hidden inputs identify the file and the
//! confirmation session. Its structure is undocumented and may change, so
//! everything provider-specific is kept in this module.

use std::sync::LazyLock;

use regex::Regex;
use reqwest::Url;
use thiserror::Error;

/// Hidden form fields forwarded to the real download endpoint, in order.
pub const CONFIRMATION_FIELDS: [&str; 4] = ["id", "export", "confirm", "uuid"];

static FORM_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<form\b[^>]*?\baction\s*=\s*"([^"]*)"[^>]*>(.*?)</form>"#)
        .expect("Invalid form pattern")
});
static INPUT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<input\b[^>]*>").expect("Invalid input pattern"));
static ATTRIBUTE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(name|value)\s*=\s*"([^"]*)""#).expect("Invalid attribute pattern")
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfirmationError {
    #[error("could not find download form in confirmation page")]
    MissingForm,
    #[error("confirmation form has no '{0}' field")]
    MissingField(&'static str),
    #[error("invalid form action '{action}': {details}")]
    InvalidAction { action: String, details: String },
}

/// Build the real download URL from an interstitial page.
///
/// `page_url` is the URL the page was served from; relative form actions are
/// resolved against it.
///
/// # Errors
/// Returns an error when the page has no form, the form lacks a file id, or
/// the form action is not a valid URL.
pub fn resolve_confirmed_download_url(
    html: &str,
    page_url: &Url,
) -> Result<Url, ConfirmationError> {
    let captures = FORM_PATTERN
        .captures(html)
        .ok_or(ConfirmationError::MissingForm)?;
    let action = decode_entities(&captures[1]);
    let body = &captures[2];

    let fields = hidden_fields(body);
    if !fields.iter().any(|(name, _)| *name == "id") {
        return Err(ConfirmationError::MissingField("id"));
    }

    let mut url = page_url
        .join(&action)
        .map_err(|error| ConfirmationError::InvalidAction {
            action: action.clone(),
            details: error.to_string(),
        })?;
    url.set_query(None);
    {
        let mut query = url.query_pairs_mut();
        for (name, value) in &fields {
            query.append_pair(name, value);
        }
    }

    Ok(url)
}

/// Values of the forwarded fields present in the form body, first
/// occurrence wins.
fn hidden_fields(form_body: &str) -> Vec<(&'static str, String)> {
    let mut found: Vec<(&'static str, String)> = Vec::new();

    for input in INPUT_PATTERN.find_iter(form_body) {
        let mut name = None;
        let mut value = None;
        for attr in ATTRIBUTE_PATTERN.captures_iter(input.as_str()) {
            let content = attr.get(2).map_or("", |m| m.as_str());
            if attr[1].eq_ignore_ascii_case("name") {
                name.get_or_insert(content);
            } else {
                value.get_or_insert(content);
            }
        }

        let (Some(name), Some(value)) = (name, value) else {
            continue;
        };
        let Some(field) = CONFIRMATION_FIELDS.iter().find(|field| **field == name) else {
            continue;
        };
        if !found.iter().any(|(existing, _)| existing == field) {
            found.push((*field, decode_entities(value)));
        }
    }

    found.sort_by_key(|(name, _)| CONFIRMATION_FIELDS.iter().position(|f| f == name));
    found
}

fn decode_entities(raw: &str) -> String {
    raw.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERSTITIAL: &str = r#"<!DOCTYPE html><html>
<head><title>Google Drive - Virus scan warning</title></head>
<body><div class="uc-main">
<p class="uc-warning-subcaption">Google Drive can't scan this file for viruses.</p>
<form id="download-form" action="https://drive.usercontent.google.com/download"
 method="get">
<input type="submit" id="uc-download-link" class="goog-inline-block jfk-button"
 value="Download anyway"/>
<input type="hidden" name="id" value="ABC123">
<input type="hidden" name="export" value="download">
<input type="hidden" name="confirm" value="t">
<input type="hidden" name="uuid" value="0c5a9f3e-1b2d-4e6f-8a7b-9c0d1e2f3a4b">
</form></div></body></html>"#;

    fn page_url() -> Url {
        Url::parse("https://drive.google.com/uc?export=download&id=ABC123")
            .expect("page url should parse")
    }

    #[test]
    fn builds_download_url_from_form_fields() {
        let url = resolve_confirmed_download_url(INTERSTITIAL, &page_url())
            .expect("interstitial should resolve");

        assert_eq!(url.host_str(), Some("drive.usercontent.google.com"));
        assert_eq!(url.path(), "/download");
        assert_eq!(
            url.query(),
            Some("id=ABC123&export=download&confirm=t&uuid=0c5a9f3e-1b2d-4e6f-8a7b-9c0d1e2f3a4b")
        );
    }

    #[test]
    fn attribute_order_and_field_order_do_not_matter() {
        let html = r#"<form method="post" action="/download?stale=1">
            <input value="tok" type="hidden" name="confirm">
            <input type="hidden" value="XYZ" name="id">
        </form>"#;
        let url =
            resolve_confirmed_download_url(html, &page_url()).expect("form should resolve");

        assert_eq!(url.as_str(), "https://drive.google.com/download?id=XYZ&confirm=tok");
    }

    #[test]
    fn decodes_entities_in_action_and_values() {
        let html = r#"<form action="https://host.example/dl?a=1&amp;b=2">
            <input name="id" value="A&amp;B">
        </form>"#;
        let url =
            resolve_confirmed_download_url(html, &page_url()).expect("form should resolve");
        assert_eq!(url.query(), Some("id=A%26B"));
    }

    #[test]
    fn missing_form_is_reported() {
        assert_eq!(
            resolve_confirmed_download_url("<html><body>quota exceeded</body></html>", &page_url()),
            Err(ConfirmationError::MissingForm)
        );
    }

    #[test]
    fn form_without_file_id_is_rejected() {
        let html = r#"<form action="/download"><input name="confirm" value="t"></form>"#;
        assert_eq!(
            resolve_confirmed_download_url(html, &page_url()),
            Err(ConfirmationError::MissingField("id"))
        );
    }
}
