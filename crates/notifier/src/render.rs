//! Plain-text rendering shared by every sender.

use herald_engine::transport::OutboundMessage;

/// First line of a notification: subject, else title.
pub fn headline(message: &OutboundMessage<'_>) -> String {
    let subject = message.subject.trim();
    if subject.is_empty() {
        message.title.trim().to_string()
    } else {
        subject.to_string()
    }
}

/// Body lines, falling back to `body` when the entry carries no lines.
pub fn body_text(message: &OutboundMessage<'_>) -> String {
    if message.lines.is_empty() {
        message.body.trim().to_string()
    } else {
        message.lines.join("\n")
    }
}

/// Headline followed by the body, skipping empty parts.
pub fn message_text(message: &OutboundMessage<'_>) -> String {
    [headline(message), body_text(message)]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_common::types::Severity;

    fn message<'a>(subject: &'a str, lines: &'a [String], body: &'a str) -> OutboundMessage<'a> {
        OutboundMessage {
            title: "Backup failed",
            subject,
            lines,
            body,
            severity: Severity::Critical,
        }
    }

    #[test]
    fn test_lines_follow_subject() {
        let lines = vec!["host db-1".to_string(), "disk full".to_string()];
        let text = message_text(&message("[critical] Backup failed", &lines, "ignored"));
        assert_eq!(text, "[critical] Backup failed\nhost db-1\ndisk full");
    }

    #[test]
    fn test_body_and_title_fallbacks() {
        let text = message_text(&message("", &[], "Backup failed on db-1"));
        assert_eq!(text, "Backup failed\nBackup failed on db-1");
    }

    #[test]
    fn test_empty_body_is_skipped() {
        assert_eq!(message_text(&message("Subject", &[], "  ")), "Subject");
    }
}
