//! Context formatter: passages → one text block for the prompt.

use super::RetrievedPassage;

/// Render every passage through `chunk_template` and concatenate the results.
///
/// `{chunk_text}` is the passage text and `{document_uri}` the metadata value
/// stored under `document_uri_field`. Nothing is inserted between passages;
/// the template carries its own trailing newline. No passages, empty string.
pub fn format_passages(
    passages: &[RetrievedPassage],
    chunk_template: &str,
    document_uri_field: &str,
) -> String {
    passages
        .iter()
        .map(|p| {
            let uri = p.metadata_text(document_uri_field).unwrap_or_default();
            render(
                chunk_template,
                &[("chunk_text", p.text.as_str()), ("document_uri", uri.as_str())],
            )
        })
        .collect()
}

/// Single-pass placeholder substitution.
///
/// Substituted values are never rescanned, so a passage containing
/// `{document_uri}` stays literal. `{{` and `}}` render as braces; unknown
/// placeholders are left untouched.
pub(crate) fn render(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find(|c: char| c == '{' || c == '}') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with("{{") || tail.starts_with("}}") {
            out.push_str(&tail[..1]);
            rest = &tail[2..];
            continue;
        }

        if tail.starts_with('{') {
            if let Some(end) = tail.find('}') {
                let name = &tail[1..end];
                if let Some((_, value)) = values.iter().find(|(key, _)| *key == name) {
                    out.push_str(value);
                    rest = &tail[end + 1..];
                    continue;
                }
            }
        }

        out.push_str(&tail[..1]);
        rest = &tail[1..];
    }

    out.push_str(rest);
    out
}
