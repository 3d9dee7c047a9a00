use calremind_channels::DeliveryGateway;
use calremind_schema::CalendarEvent;
use chrono::{DateTime, Duration, Local};

const DESCRIPTION_EXCERPT_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub subject: String,
    pub body: String,
}

/// Render the subject and plain-text body for one reminder.
pub fn format_reminder(event: &CalendarEvent, message: &str, summary: &str) -> Notification {
    let subject = format!("🔔 Reminder: {}", event.title);

    let mut lines = vec![
        message.to_string(),
        String::new(),
        format!("📅 Event: {}", event.title),
        format!("📝 Summary: {summary}"),
        format!("🕒 Time: {}", event.start.format("%A, %B %d at %I:%M %p")),
    ];

    if event.has_location() {
        lines.push(format!("📍 Location: {}", event.location));
    }
    let minutes = event.duration_minutes();
    if minutes > 0 {
        lines.push(format!("⏱️ Duration: {}", format_duration(minutes)));
    }
    if event.attendee_count > 0 {
        lines.push(format!("👥 Attendees: {}", event.attendee_count));
    }
    if !event.description.trim().is_empty() {
        let excerpt: String = event
            .description
            .chars()
            .take(DESCRIPTION_EXCERPT_CHARS)
            .collect();
        lines.push(String::new());
        lines.push("📋 Description:".to_string());
        lines.push(excerpt);
    }
    if let Some(link) = event.html_link.as_deref().filter(|l| !l.is_empty()) {
        lines.push(String::new());
        lines.push(format!("🔗 View in Calendar: {link}"));
    }

    Notification {
        subject,
        body: lines.join("\n"),
    }
}

fn format_duration(minutes: i64) -> String {
    let (hours, rest) = (minutes / 60, minutes % 60);
    if hours > 0 {
        format!("{hours}h {rest}m")
    } else {
        format!("{rest}m")
    }
}

/// Synthetic reminder used to check the delivery channels end to end.
pub fn test_notification(now: DateTime<Local>) -> Notification {
    let start = now.fixed_offset();
    let event = CalendarEvent::new("calremind-test", "Test Event", start, start + Duration::minutes(60))
        .with_location("Test Location")
        .with_attendees(2)
        .with_description("This is a test notification from calremind.");
    format_reminder(
        &event,
        "🧪 This is a test reminder!",
        "This is a test to verify your notification channels are working correctly.",
    )
}

/// Push the synthetic reminder through `gateway`. True iff a channel took it.
pub async fn send_test_notification(gateway: &DeliveryGateway, now: DateTime<Local>) -> bool {
    let notification = test_notification(now);
    gateway
        .deliver(&notification.subject, &notification.body)
        .await
}
