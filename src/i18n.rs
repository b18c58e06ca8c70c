/*
Small i18n helper for notification texts.

This module provides:
- An embedded translations store for EN/RU (compile-time embedded JSON).
- A `tr` function to look up translations by language + key + optional params.
- A `t` convenience wrapper using the default language (DEFAULT_LANG).

Usage:
    use crate::i18n;
    let subject = i18n::tr(Some("ru"), "email.cancelled.subject", Some(&[("title", "Intro call"), ("time", "10:00")]));

Notes:
- Placeholders in translation strings use single-brace format: `{name}`.
- Default language is `en`. If a key is missing for the requested language,
  the default language is used, then the key itself.
*/

use std::collections::HashMap;
use std::sync::OnceLock;

pub const DEFAULT_LANG: &str = "en";

static TRANSLATIONS: OnceLock<HashMap<String, HashMap<String, String>>> = OnceLock::new();

const EN_JSON: &str = r#"
{
  "email.scheduled.subject": "Confirmed: {title} with {organizer} at {time}",
  "email.scheduled.heading": "Your event has been scheduled",
  "email.reminder.subject": "Event Reminder: {title} {start} - {end}",
  "email.reminder.heading": "Event Reminder",
  "email.declined.subject": "Declined: {title} at {time}",
  "email.declined.heading": "Your event request has been declined",
  "email.cancelled.subject": "Cancelled: {title} at {time}",
  "email.cancelled.heading": "This event has been cancelled",
  "email.emailed_you_and_attendees": "We emailed you and the other attendees a calendar invitation with all the details.",
  "email.what": "What",
  "email.when": "When",
  "email.where": "Where",
  "email.who": "Who",
  "email.organizer": "Organizer",
  "email.meeting_link": "Meeting link",
  "email.meeting_password": "Meeting password",
  "email.additional_notes": "Additional notes",
  "email.reason": "Reason",
  "email.no_location": "To be announced",
  "sms.reminder": "Reminder: {event} with {organizer} starts {start} (in {lead}). Join here: {link}",
  "lead.hours": "{count} hours",
  "lead.minutes": "{count} minutes",
  "webhook.payment_confirmed": "Payment confirmed, booking scheduled",
  "webhook.already_processed": "Payment already processed",
  "reminders.resent": "Reminder emails re-sent"
}
"#;

const RU_JSON: &str = r#"
{
  "email.scheduled.subject": "Подтверждено: {title} с {organizer} в {time}",
  "email.scheduled.heading": "Ваша встреча запланирована",
  "email.reminder.subject": "Напоминание: {title} {start} - {end}",
  "email.reminder.heading": "Напоминание о встрече",
  "email.declined.subject": "Отклонено: {title} в {time}",
  "email.declined.heading": "Ваш запрос на встречу отклонён",
  "email.cancelled.subject": "Отменено: {title} в {time}",
  "email.cancelled.heading": "Встреча отменена",
  "email.emailed_you_and_attendees": "Мы отправили вам и другим участникам приглашение со всеми подробностями.",
  "email.what": "Что",
  "email.when": "Когда",
  "email.where": "Где",
  "email.who": "Кто",
  "email.organizer": "Организатор",
  "email.meeting_link": "Ссылка на встречу",
  "email.meeting_password": "Пароль встречи",
  "email.additional_notes": "Дополнительно",
  "email.reason": "Причина",
  "email.no_location": "Будет сообщено позже",
  "sms.reminder": "Напоминание: {event} с {organizer} начнётся {start} (через {lead}). Ссылка: {link}",
  "lead.hours": "{count} ч.",
  "lead.minutes": "{count} мин.",
  "webhook.payment_confirmed": "Оплата подтверждена, встреча запланирована",
  "webhook.already_processed": "Оплата уже обработана",
  "reminders.resent": "Напоминания отправлены повторно"
}
"#;

fn build_translations() -> HashMap<String, HashMap<String, String>> {
    let mut out: HashMap<String, HashMap<String, String>> = HashMap::new();

    for (lang, raw) in [("en", EN_JSON), ("ru", RU_JSON)] {
        // Both tables are compile-time constants; a parse failure is a build defect.
        let map: HashMap<String, String> = serde_json::from_str(raw).unwrap_or_else(|e| {
            panic!("failed to parse {} translations in i18n module: {}", lang, e);
        });
        out.insert(lang.to_string(), map);
    }

    out
}

fn translations() -> &'static HashMap<String, HashMap<String, String>> {
    TRANSLATIONS.get_or_init(build_translations)
}

/// Normalize a language tag into a short, lowercase code (e.g. "en-US" -> "en").
pub fn normalize_language(lang: &str) -> String {
    lang.split(['-', '_'])
        .next()
        .unwrap_or(lang)
        .trim()
        .to_lowercase()
}

pub fn is_supported_language(lang: &str) -> bool {
    translations().contains_key(lang)
}

/// Resolve a stored locale (possibly missing or unsupported) to a supported language code.
pub fn resolve_language(locale: Option<&str>) -> String {
    locale
        .map(normalize_language)
        .filter(|l| is_supported_language(l))
        .unwrap_or_else(|| DEFAULT_LANG.to_string())
}

/// Translate a key using an explicit language (or default if None).
///
/// Missing keys fall back to the default language and then to the key itself.
pub fn tr(lang: Option<&str>, key: &str, params: Option<&[(&str, &str)]>) -> String {
    let map = translations();

    let desired = lang.unwrap_or(DEFAULT_LANG);

    let val = map
        .get(desired)
        .and_then(|m| m.get(key))
        .or_else(|| map.get(DEFAULT_LANG).and_then(|m| m.get(key)))
        .cloned()
        .unwrap_or_else(|| key.to_string());

    match params {
        Some(params) => params.iter().fold(val, |s, (k, v)| {
            s.replace(&format!("{{{}}}", k), v)
        }),
        None => val,
    }
}

/// Convenience wrapper: translate using default language (DEFAULT_LANG).
pub fn t(key: &str) -> String {
    tr(None, key, None)
}
