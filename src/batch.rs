//! Multipart framing of message batches.

/// Part boundary token used in the multipart body.
pub const BATCH_BOUNDARY: &str = "PIX-STREAM";

/// A framed batch body together with its content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramedBatch {
    /// Value for the `Content-Type` response header.
    pub content_type: String,
    /// Framed body; empty when the input batch was empty.
    pub body: String,
}

/// Serializes an ordered list of message payloads into one framed body.
/// Deterministic and order-preserving. Pure, no I/O.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchFramer;

impl BatchFramer {
    /// Frame `messages` into a multipart body.
    ///
    /// An empty input yields an empty body with a neutral content type;
    /// callers must map that to a no-content result. Otherwise each message
    /// becomes one part carrying a 1-based `X-Pix-Sequence` header, and the
    /// body is terminated by the boundary suffixed with `--`.
    #[must_use]
    pub fn build(&self, messages: &[String]) -> FramedBatch {
        if messages.is_empty() {
            return FramedBatch {
                content_type: "application/xml".into(),
                body: String::new(),
            };
        }

        let parts: Vec<String> = messages
            .iter()
            .enumerate()
            .map(|(idx, msg)| {
                format!(
                    "--{BATCH_BOUNDARY}\nContent-Type: application/xml; charset=utf-8\nX-Pix-Sequence: {}\n\n{msg}",
                    idx + 1
                )
            })
            .collect();

        FramedBatch {
            content_type: format!("multipart/mixed; boundary={BATCH_BOUNDARY}"),
            body: format!("{}\n--{BATCH_BOUNDARY}--", parts.join("\n")),
        }
    }
}
