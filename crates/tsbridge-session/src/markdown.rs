//! Rendering tsserver documentation to CommonMark
//!
//! Display-part arrays and JSDoc tags become the Markdown shown in hovers,
//! completion details and signature help. `{@link url text}` becomes a
//! Markdown link (`{@linkcode}` gets a monospace label), `@param name -
//! desc` is reshaped, and `@example` bodies are fenced unless they already
//! carry a fence or a `<caption>`.

use tsbridge_protocol::filepath::uri_from_path;
use tsbridge_protocol::types::{JsDocTagInfo, SymbolDisplayPart, TextOrDisplayParts};

use crate::convert::position_from_ts;

/// Flatten display parts, resolving `{@link}` sequences as we go.
pub fn plain(parts: &[SymbolDisplayPart]) -> String {
    let mut out = String::new();
    let mut index = 0;
    while index < parts.len() {
        let part = &parts[index];
        if part.kind == "link" {
            let (rendered, consumed) = render_link_sequence(&parts[index..]);
            out.push_str(&rendered);
            index += consumed;
        } else {
            out.push_str(&part.text);
            index += 1;
        }
    }
    replace_inline_links(&out)
}

pub fn documentation(doc: &TextOrDisplayParts) -> String {
    match doc {
        TextOrDisplayParts::Text(text) => replace_inline_links(text),
        TextOrDisplayParts::Parts(parts) => plain(parts),
    }
}

/// `link` parts come in threes: an opener (`{@link `), a `linkName` or
/// `linkText` payload, and a closer (`}`).
fn render_link_sequence(parts: &[SymbolDisplayPart]) -> (String, usize) {
    let is_linkcode = parts[0].text.contains("@linkcode");
    let mut consumed = 1;
    let mut name: Option<&SymbolDisplayPart> = None;
    let mut text = String::new();
    for part in &parts[1..] {
        consumed += 1;
        if part.kind == "link" {
            break;
        }
        if part.kind == "linkName" {
            name = Some(part);
        }
        text.push_str(&part.text);
    }

    let rendered = if let Some(name) = name {
        let label = if text.trim().is_empty() {
            name.text.trim()
        } else {
            text.trim()
        };
        match &name.target {
            Some(target) => {
                let position = position_from_ts(target.start);
                let uri = uri_from_path(&target.file)
                    .map(|uri| {
                        format!(
                            "{}#L{},{}",
                            uri,
                            position.line + 1,
                            position.character + 1
                        )
                    })
                    .unwrap_or_else(|_| target.file.clone());
                if is_linkcode {
                    format!("[`{label}`]({uri})")
                } else {
                    format!("[{label}]({uri})")
                }
            }
            None => render_text_link(&name.text, is_linkcode),
        }
    } else {
        render_text_link(text.trim(), is_linkcode)
    };
    (rendered, consumed)
}

fn render_text_link(body: &str, linkcode: bool) -> String {
    let body = body.trim();
    let (target, label) = match body.split_once([' ', '|']) {
        Some((url, label)) if !label.trim().is_empty() => (url, label.trim()),
        _ => (body, body),
    };
    if target.starts_with("http://") || target.starts_with("https://") {
        if linkcode {
            format!("[`{label}`]({target})")
        } else {
            format!("[{label}]({target})")
        }
    } else if linkcode {
        format!("`{body}`")
    } else {
        body.to_string()
    }
}

/// Convert textual `{@link url [text]}` occurrences inside plain strings.
pub fn replace_inline_links(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("{@link") {
        let Some(end) = rest[start..].find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        let tag = &rest[start..start + end + 1];
        let linkcode = tag.starts_with("{@linkcode");
        let body_start = tag.find(char::is_whitespace).map(|i| i + 1).unwrap_or(0);
        let body = tag[body_start..tag.len() - 1].trim();
        out.push_str(&render_text_link(body, linkcode));
        rest = &rest[start + end + 1..];
    }
    out.push_str(rest);
    out
}

/// One tag rendered for the tag list under a hover.
pub fn tag_markdown(tag: &JsDocTagInfo) -> String {
    let label = format!("*@{}*", tag.name);
    let Some(text) = &tag.text else {
        return label;
    };
    let body = documentation(text);
    if body.is_empty() {
        return label;
    }
    match tag.name.as_str() {
        "param" => {
            let (name, rest) = split_param(&body);
            let rest = rest.trim_start_matches(['-', ' ']).trim();
            if rest.is_empty() {
                format!("{label} `{name}`")
            } else {
                format!("{label} `{name}` — {rest}")
            }
        }
        "example" => format!("{label}\n{example_body}", example_body = fence_example(&body)),
        _ => format!("{label} — {body}"),
    }
}

fn split_param(body: &str) -> (&str, &str) {
    match body.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest),
        None => (body, ""),
    }
}

/// Example bodies become fenced code unless they already carry a fence or
/// a `<caption>` with one.
fn fence_example(body: &str) -> String {
    if body.contains("```") {
        return body.to_string();
    }
    if let Some(rest) = body.strip_prefix("<caption>") {
        if let Some((caption, code)) = rest.split_once("</caption>") {
            return format!("{}\n```\n{}\n```", caption.trim(), code.trim());
        }
        return body.to_string();
    }
    format!("```\n{}\n```", body.trim())
}

/// The full documentation block: prose, then tags.
pub fn documentation_with_tags(
    doc: Option<&TextOrDisplayParts>,
    tags: Option<&[JsDocTagInfo]>,
) -> String {
    let mut sections = Vec::new();
    if let Some(doc) = doc {
        let rendered = documentation(doc);
        if !rendered.trim().is_empty() {
            sections.push(rendered);
        }
    }
    if let Some(tags) = tags {
        for tag in tags {
            sections.push(tag_markdown(tag));
        }
    }
    sections.join("\n\n")
}
