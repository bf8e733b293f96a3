//! XML rendering of delegations for language-model context.
//!
//! Output shape (tag and attribute names are stable):
//!
//! ```text
//! <delegation from="alice" recipients="reviewer,tester" phase="review">
//!   <delegation-request>Please review the patch</delegation-request>
//!   <response from="reviewer">Looks good</response>
//!   <response from="tester" status="pending"/>
//! </delegation>
//! ```
//!
//! Recipients appear in request order, each either as its response or as a
//! pending placeholder. In debug mode the delegation and each response carry
//! an `id` attribute with the first eight characters of the originating event.

use crate::domain::DelegationRecord;
use crate::id::short_id;

const INDENT: &str = "  ";

/// Rendering switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderOptions {
    /// Tag elements with abbreviated event ids
    pub debug: bool,
}

impl RenderOptions {
    pub fn debug() -> Self {
        Self { debug: true }
    }
}

/// Escape the five XML metacharacters
pub fn escape_xml(input: &str) -> String {
    let mut output = String::with_capacity(input.len());

    for ch in input.chars() {
        match ch {
            '&' => output.push_str("&amp;"),
            '<' => output.push_str("&lt;"),
            '>' => output.push_str("&gt;"),
            '"' => output.push_str("&quot;"),
            '\'' => output.push_str("&apos;"),
            _ => output.push(ch),
        }
    }

    output
}

fn push_attr(out: &mut String, name: &str, value: &str) {
    out.push(' ');
    out.push_str(name);
    out.push_str("=\"");
    out.push_str(&escape_xml(value));
    out.push('"');
}

/// Render one delegation as a self-contained XML block
///
/// Pure: the same record and options always produce the same bytes.
pub fn render_delegation(record: &DelegationRecord, options: RenderOptions) -> String {
    let mut out = String::from("<delegation");
    if options.debug {
        let origin = record.request_event_id.as_deref().unwrap_or(&record.id);
        push_attr(&mut out, "id", short_id(origin));
    }
    push_attr(&mut out, "from", &record.from_agent);
    push_attr(&mut out, "recipients", &record.recipients.join(","));
    if let Some(phase) = &record.phase {
        push_attr(&mut out, "phase", phase);
    }
    out.push_str(">\n");

    out.push_str(INDENT);
    out.push_str("<delegation-request>");
    out.push_str(&escape_xml(&record.request_message));
    out.push_str("</delegation-request>\n");

    for recipient in &record.recipients {
        out.push_str(INDENT);
        out.push_str("<response");
        match record.response_for(recipient) {
            Some(response) => {
                if options.debug {
                    push_attr(&mut out, "id", short_id(&response.event_id));
                }
                push_attr(&mut out, "from", recipient);
                if response.is_error() {
                    push_attr(&mut out, "error", "true");
                }
                out.push('>');
                out.push_str(&escape_xml(&response.content));
                out.push_str("</response>\n");
            }
            None => {
                push_attr(&mut out, "from", recipient);
                push_attr(&mut out, "status", "pending");
                out.push_str("/>\n");
            }
        }
    }

    out.push_str("</delegation>");
    out
}

/// Render several delegations, separated by blank lines
pub fn render_all<'a>(records: impl IntoIterator<Item = &'a DelegationRecord>, options: RenderOptions) -> String {
    records
        .into_iter()
        .map(|r| render_delegation(r, options))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DelegationResponse;

    fn record() -> DelegationRecord {
        let mut record = DelegationRecord::new(
            "alice",
            vec!["reviewer".to_string(), "tester".to_string()],
            "Review the patch",
        )
        .unwrap();
        record.id = "d".repeat(64);
        record
    }

    #[test]
    fn test_escape_xml_all_metacharacters() {
        assert_eq!(escape_xml(r#"a&b<c>d"e'f"#), "a&amp;b&lt;c&gt;d&quot;e&apos;f");
        assert_eq!(escape_xml("plain"), "plain");
    }

    #[test]
    fn test_render_pending() {
        let rendered = render_delegation(&record(), RenderOptions::default());
        assert_eq!(
            rendered,
            "<delegation from=\"alice\" recipients=\"reviewer,tester\">\n\
             \x20 <delegation-request>Review the patch</delegation-request>\n\
             \x20 <response from=\"reviewer\" status=\"pending\"/>\n\
             \x20 <response from=\"tester\" status=\"pending\"/>\n\
             </delegation>"
        );
    }

    #[test]
    fn test_render_is_deterministic() {
        let record = record();
        assert_eq!(
            render_delegation(&record, RenderOptions::default()),
            render_delegation(&record, RenderOptions::default())
        );
    }

    #[test]
    fn test_response_replaces_only_its_placeholder() {
        let mut record = record();
        let before = render_delegation(&record, RenderOptions::default());

        record
            .record_response(DelegationResponse::completed("tester", "all green", "e1"))
            .unwrap();
        let after = render_delegation(&record, RenderOptions::default());

        assert!(before.contains("<response from=\"tester\" status=\"pending\"/>"));
        assert!(!after.contains("<response from=\"tester\" status=\"pending\"/>"));
        assert!(after.contains("<response from=\"tester\">all green</response>"));
        assert!(after.contains("<response from=\"reviewer\" status=\"pending\"/>"));
        assert!(after.find("reviewer").unwrap() < after.find("all green").unwrap());
        assert_eq!(after.matches("<response").count(), 2);
    }

    #[test]
    fn test_render_error_and_phase() {
        let mut record = record().with_phase("qa");
        record
            .record_response(DelegationResponse::error("reviewer", "timed out", "e2"))
            .unwrap();
        let rendered = render_delegation(&record, RenderOptions::default());
        assert!(rendered.starts_with("<delegation from=\"alice\" recipients=\"reviewer,tester\" phase=\"qa\">"));
        assert!(rendered.contains("<response from=\"reviewer\" error=\"true\">timed out</response>"));
    }

    #[test]
    fn test_render_escapes_once() {
        let mut record = record();
        record.request_message = r#"<&>"'"#.to_string();
        let first = render_delegation(&record, RenderOptions::default());
        let second = render_delegation(&record, RenderOptions::default());

        assert!(first.contains("<delegation-request>&lt;&amp;&gt;&quot;&apos;</delegation-request>"));
        assert!(!first.contains("&amp;amp;"));
        assert_eq!(first, second);
    }

    #[test]
    fn test_render_escapes_attributes() {
        let mut record = record();
        record.from_agent = "a\"b".to_string();
        let rendered = render_delegation(&record, RenderOptions::default());
        assert!(rendered.contains("from=\"a&quot;b\""));
    }

    #[test]
    fn test_render_debug_ids() {
        let mut record = record().with_request_event_id("0123456789abcdef");
        record
            .record_response(DelegationResponse::completed("reviewer", "ok", "fedcba9876543210"))
            .unwrap();

        let rendered = render_delegation(&record, RenderOptions::debug());
        assert!(rendered.starts_with("<delegation id=\"01234567\" from=\"alice\""));
        assert!(rendered.contains("<response id=\"fedcba98\" from=\"reviewer\">ok</response>"));
        assert!(rendered.contains("<response from=\"tester\" status=\"pending\"/>"));
    }

    #[test]
    fn test_render_debug_falls_back_to_record_id() {
        let rendered = render_delegation(&record(), RenderOptions::debug());
        assert!(rendered.starts_with("<delegation id=\"dddddddd\""));
    }

    #[test]
    fn test_render_all_joins_blocks() {
        let a = record();
        let b = record();
        let rendered = render_all([&a, &b], RenderOptions::default());
        assert_eq!(rendered.matches("</delegation>").count(), 2);
        assert!(rendered.contains("</delegation>\n\n<delegation"));
    }
}
