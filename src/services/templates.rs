//! Notification rendering.
//!
//! Every notification kind is a pure function from the shared [`CalendarEvent`]
//! and the recipient to a rendered message. Nothing here performs I/O.

use chrono::NaiveDateTime;
use chrono_tz::Tz;

use crate::i18n::tr;
use crate::services::event::{CalendarEvent, Person};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Scheduled,
    Reminder,
    Declined,
    Cancelled,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Scheduled => "scheduled",
            NotificationKind::Reminder => "reminder",
            NotificationKind::Declined => "declined",
            NotificationKind::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub text: String,
    pub html: String,
}

pub fn render_email(kind: NotificationKind, event: &CalendarEvent, recipient: &Person) -> RenderedEmail {
    match kind {
        NotificationKind::Scheduled => scheduled_email(event, recipient),
        NotificationKind::Reminder => reminder_email(event, recipient),
        NotificationKind::Declined => declined_email(event, recipient),
        NotificationKind::Cancelled => cancelled_email(event, recipient),
    }
}

fn scheduled_email(event: &CalendarEvent, recipient: &Person) -> RenderedEmail {
    let lang = Some(event.language.as_str());
    let subject = tr(
        lang,
        "email.scheduled.subject",
        Some(&[
            ("title", event.title.as_str()),
            ("organizer", event.organizer.name.as_str()),
            ("time", short_time(event.start_time, &recipient.time_zone).as_str()),
        ]),
    );
    let sections = detail_sections(event, recipient, true);
    compose(
        subject,
        &tr(lang, "email.scheduled.heading", None),
        Some(tr(lang, "email.emailed_you_and_attendees", None)),
        sections,
    )
}

fn reminder_email(event: &CalendarEvent, recipient: &Person) -> RenderedEmail {
    let lang = Some(event.language.as_str());
    let subject = tr(
        lang,
        "email.reminder.subject",
        Some(&[
            ("title", event.title.as_str()),
            ("start", short_time(event.start_time, &recipient.time_zone).as_str()),
            ("end", short_time(event.end_time, &recipient.time_zone).as_str()),
        ]),
    );
    let sections = detail_sections(event, recipient, true);
    compose(
        subject,
        &tr(lang, "email.reminder.heading", None),
        Some(tr(lang, "email.emailed_you_and_attendees", None)),
        sections,
    )
}

fn declined_email(event: &CalendarEvent, recipient: &Person) -> RenderedEmail {
    let lang = Some(event.language.as_str());
    let subject = tr(
        lang,
        "email.declined.subject",
        Some(&[
            ("title", event.title.as_str()),
            ("time", short_time(event.start_time, &recipient.time_zone).as_str()),
        ]),
    );
    let mut sections = detail_sections(event, recipient, false);
    if let Some(reason) = event.rejection_reason.as_deref().filter(|r| !r.trim().is_empty()) {
        sections.push((tr(lang, "email.reason", None), reason.to_string()));
    }
    compose(subject, &tr(lang, "email.declined.heading", None), None, sections)
}

fn cancelled_email(event: &CalendarEvent, recipient: &Person) -> RenderedEmail {
    let lang = Some(event.language.as_str());
    let subject = tr(
        lang,
        "email.cancelled.subject",
        Some(&[
            ("title", event.title.as_str()),
            ("time", short_time(event.start_time, &recipient.time_zone).as_str()),
        ]),
    );
    let sections = detail_sections(event, recipient, false);
    compose(subject, &tr(lang, "email.cancelled.heading", None), None, sections)
}

/// Labelled (heading, body) pairs describing the event for one recipient.
fn detail_sections(event: &CalendarEvent, recipient: &Person, with_link: bool) -> Vec<(String, String)> {
    let lang = Some(event.language.as_str());
    let mut out = vec![
        (tr(lang, "email.what", None), event.title.clone()),
        (
            tr(lang, "email.when", None),
            format!(
                "{} - {}",
                long_time(event.start_time, &recipient.time_zone),
                short_time(event.end_time, &recipient.time_zone)
            ),
        ),
    ];

    let mut who = vec![format!(
        "{} - {} ({})",
        event.organizer.name,
        tr(lang, "email.organizer", None),
        event.organizer.email
    )];
    who.extend(event.attendees.iter().map(|a| format!("{} ({})", a.name, a.email)));
    out.push((tr(lang, "email.who", None), who.join("\n")));

    let location = event
        .location
        .clone()
        .filter(|l| !l.trim().is_empty())
        .unwrap_or_else(|| tr(lang, "email.no_location", None));
    out.push((tr(lang, "email.where", None), location));

    if with_link {
        if let Some(url) = &event.meeting_url {
            out.push((tr(lang, "email.meeting_link", None), url.clone()));
        }
        // Meeting credentials go to the organizer only.
        if recipient.email.eq_ignore_ascii_case(&event.organizer.email) {
            if let Some(password) = &event.meeting_password {
                out.push((tr(lang, "email.meeting_password", None), password.clone()));
            }
        }
    }

    if let Some(notes) = event.description.as_deref().filter(|d| !d.trim().is_empty()) {
        out.push((tr(lang, "email.additional_notes", None), notes.to_string()));
    }
    for answer in &event.custom_inputs {
        out.push((answer.label.clone(), answer.value.clone()));
    }

    out
}

fn compose(
    subject: String,
    heading: &str,
    lead: Option<String>,
    sections: Vec<(String, String)>,
) -> RenderedEmail {
    let mut text = format!("{}\n", heading);
    if let Some(lead) = &lead {
        text.push_str(lead);
        text.push('\n');
    }
    for (label, body) in &sections {
        text.push_str(&format!("\n{}\n{}\n", label, body));
    }

    let mut html = format!("<h1>{}</h1>", escape_html(heading));
    if let Some(lead) = &lead {
        html.push_str(&format!("<p>{}</p>", escape_html(lead)));
    }
    for (label, body) in &sections {
        html.push_str(&format!(
            "<p><strong>{}</strong><br/>{}</p>",
            escape_html(label),
            escape_html(body).replace('\n', "<br/>")
        ));
    }

    RenderedEmail { subject, text, html }
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Parse an IANA zone name, falling back to UTC for unknown or empty names.
pub fn parse_zone(name: &str) -> Tz {
    name.trim().parse::<Tz>().unwrap_or(Tz::UTC)
}

/// Format a UTC timestamp in `zone` with a strftime pattern.
pub fn format_in_zone(utc: NaiveDateTime, zone: &str, pattern: &str) -> String {
    utc.and_utc()
        .with_timezone(&parse_zone(zone))
        .format(pattern)
        .to_string()
}

fn short_time(utc: NaiveDateTime, zone: &str) -> String {
    format_in_zone(utc, zone, "%-I:%M%P")
}

fn long_time(utc: NaiveDateTime, zone: &str) -> String {
    format_in_zone(utc, zone, "%A, %B %-d, %Y %-I:%M%P (%Z)")
}

/// "24 hours" / "90 minutes" style label for a lead-time offset.
pub fn lead_time_label(lang: &str, minutes: i64) -> String {
    if minutes % 60 == 0 {
        tr(Some(lang), "lead.hours", Some(&[("count", (minutes / 60).to_string().as_str())]))
    } else {
        tr(Some(lang), "lead.minutes", Some(&[("count", minutes.to_string().as_str())]))
    }
}

/// SMS reminder body. `None` when the event has no meeting link to share.
pub fn render_reminder_sms(event: &CalendarEvent, attendee: &Person, lead_minutes: i64) -> Option<String> {
    let link = event.meeting_url.as_deref()?;
    let start = format_in_zone(event.start_time, &attendee.time_zone, "%A %b %-d, %-I:%M %p %Z");
    Some(tr(
        Some(event.language.as_str()),
        "sms.reminder",
        Some(&[
            ("event", event.title.as_str()),
            ("organizer", event.organizer.name.as_str()),
            ("start", start.as_str()),
            ("lead", lead_time_label(&event.language, lead_minutes).as_str()),
            ("link", link),
        ]),
    ))
}
