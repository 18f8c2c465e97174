//! Email rendering for notification templates.

use enrollment_core::types::{NotificationMessage, NotificationTemplate};

/// A rendered email
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedEmail {
    /// Subject line
    pub subject: String,
    /// Plain-text body
    pub text: String,
    /// HTML body
    pub html: String,
}

fn field<'a>(message: &'a NotificationMessage, key: &str) -> &'a str {
    message
        .model
        .get(key)
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default()
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Render a message from its template and model.
///
/// Missing model keys render as empty strings.
#[must_use]
pub fn render(message: &NotificationMessage) -> RenderedEmail {
    let first_name = field(message, "firstName");
    let title = field(message, "eventTitle");
    let number = field(message, "reservationNumber");
    let amount = field(message, "amount");

    let (subject, lead, detail) = match message.template {
        NotificationTemplate::EnrollmentConfirmed => (
            format!("You're enrolled: {title}"),
            format!("Your enrollment for {title} is confirmed."),
            format!("Reservation number: {number}"),
        ),
        NotificationTemplate::EnrollmentRefunded => (
            format!("Refund issued: {title}"),
            format!(
                "{title} filled up before your payment settled, so we could not hold a place for you."
            ),
            format!("Your payment of {amount} for reservation {number} has been refunded."),
        ),
    };

    let text = format!("Hi {first_name},\n\n{lead}\n{detail}\n");
    let html = format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="UTF-8"><title>{subject_html}</title></head>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
    <div style="max-width: 600px; margin: 0 auto; padding: 20px;">
        <p>Hi {first_name_html},</p>
        <p>{lead_html}</p>
        <p style="color: #666;">{detail_html}</p>
    </div>
</body>
</html>
"#,
        subject_html = escape(&subject),
        first_name_html = escape(first_name),
        lead_html = escape(&lead),
        detail_html = escape(&detail),
    );

    RenderedEmail {
        subject,
        text,
        html,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(template: NotificationTemplate, title: &str) -> NotificationMessage {
        NotificationMessage {
            recipient: "ada@example.com".to_string(),
            template,
            model: serde_json::json!({
                "reservationNumber": "20250101120000-ABCDEFGH",
                "firstName": "Ada",
                "eventTitle": title,
                "amount": "25.99",
            }),
        }
    }

    #[test]
    fn confirmation_mentions_event_and_number() {
        let email = render(&message(NotificationTemplate::EnrollmentConfirmed, "Rust Workshop"));
        assert_eq!(email.subject, "You're enrolled: Rust Workshop");
        assert!(email.text.starts_with("Hi Ada,"));
        assert!(email.text.contains("20250101120000-ABCDEFGH"));
    }

    #[test]
    fn refund_mentions_amount() {
        let email = render(&message(NotificationTemplate::EnrollmentRefunded, "Rust Workshop"));
        assert!(email.subject.starts_with("Refund issued"));
        assert!(email.text.contains("25.99"));
    }

    #[test]
    fn html_body_is_escaped() {
        let email = render(&message(NotificationTemplate::EnrollmentConfirmed, "<b>Tom & Jerry</b>"));
        assert!(email.html.contains("&lt;b&gt;Tom &amp; Jerry&lt;/b&gt;"));
        assert!(!email.html.contains("<b>Tom"));
    }

    #[test]
    fn missing_fields_render_empty() {
        let message = NotificationMessage {
            recipient: "a@example.com".to_string(),
            template: NotificationTemplate::EnrollmentConfirmed,
            model: serde_json::json!({}),
        };
        assert_eq!(render(&message).subject, "You're enrolled: ");
    }
}
