//! Splitting a streamed answer into its reasoning and visible parts.
//!
//! Models may wrap their rationale in `<think>` / `</think>` before the
//! answer. The buffer is re-scanned as a whole on every update, so a
//! marker split across chunks is recognized as soon as it is complete.

const OPEN: &str = "<think>";
const CLOSE: &str = "</think>";

/// The display-time view of an assistant message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SegmentPair {
    /// Text inside the reasoning span, if one was opened.
    pub reasoning: Option<String>,
    /// The answer text shown to the user.
    pub visible: String,
    span_open: bool,
}

impl SegmentPair {
    /// Whether the reasoning span is still open and nothing visible has
    /// been produced yet.
    #[inline]
    pub fn is_reasoning_in_progress(&self) -> bool {
        self.span_open && self.visible.is_empty()
    }

    /// Whether there is nothing to show at all.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.visible.is_empty()
            && self.reasoning.as_deref().is_none_or(str::is_empty)
    }
}

/// Classifies `buffer` into reasoning and visible text.
///
/// Only the first opening and the first closing marker count. Text after
/// a well-formed pair stays visible verbatim, a second `<think>` included.
pub fn split(buffer: &str) -> SegmentPair {
    let Some(open) = buffer.find(OPEN) else {
        // No span at all, drop stray closing markers.
        return SegmentPair {
            reasoning: None,
            visible: buffer.replace(CLOSE, "").trim().to_owned(),
            span_open: false,
        };
    };
    let inner_start = open + OPEN.len();
    let before = buffer[..open].trim();

    match buffer.find(CLOSE) {
        Some(close) if close >= open => {
            let after = buffer[close + CLOSE.len()..].trim();
            let visible = match (before.is_empty(), after.is_empty()) {
                (true, _) => after.to_owned(),
                (false, true) => before.to_owned(),
                (false, false) => format!("{before} {after}"),
            };
            SegmentPair {
                reasoning: Some(buffer[inner_start..close].trim().to_owned()),
                visible,
                span_open: false,
            }
        }
        _ => SegmentPair {
            reasoning: Some(buffer[inner_start..].trim().to_owned()),
            visible: before.to_owned(),
            span_open: true,
        },
    }
}
