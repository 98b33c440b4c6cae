//! Plain rendering of the two messages this service sends. Subjects and bodies
//! are fixed strings with interpolated, HTML-escaped values.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::domain::types::{AdminAccount, EmailMessage};

/// Coarse device description for the login notification. Never used for any
/// security decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceClass {
    pub device: &'static str,
    pub browser: &'static str,
    pub os: &'static str,
}

impl DeviceClass {
    pub fn describe(&self) -> String {
        format!("{} on {} ({})", self.browser, self.os, self.device)
    }
}

pub fn classify_user_agent(user_agent: Option<&str>) -> DeviceClass {
    let ua = user_agent.unwrap_or_default().to_ascii_lowercase();

    let device = if ua.contains("ipad") || ua.contains("tablet") {
        "tablet"
    } else if ua.contains("mobi") || ua.contains("iphone") || ua.contains("android") {
        "mobile"
    } else if ua.is_empty() {
        "unknown device"
    } else {
        "desktop"
    };

    // Order matters: Edge and Opera UAs also contain "chrome", Chrome's
    // contains "safari".
    let browser = if ua.contains("edg/") {
        "Edge"
    } else if ua.contains("opr/") || ua.contains("opera") {
        "Opera"
    } else if ua.contains("firefox/") {
        "Firefox"
    } else if ua.contains("chrome/") || ua.contains("crios/") {
        "Chrome"
    } else if ua.contains("safari/") {
        "Safari"
    } else {
        "unknown browser"
    };

    let os = if ua.contains("windows") {
        "Windows"
    } else if ua.contains("iphone") || ua.contains("ipad") {
        "iOS"
    } else if ua.contains("android") {
        "Android"
    } else if ua.contains("mac os x") || ua.contains("macintosh") {
        "macOS"
    } else if ua.contains("linux") {
        "Linux"
    } else {
        "unknown OS"
    };

    DeviceClass {
        device,
        browser,
        os,
    }
}

pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn magic_link_message(account: &AdminAccount, login_url: &str, ttl_minutes: i64) -> EmailMessage {
    let name = escape_html(&account.display_name);
    let url = escape_html(login_url);
    EmailMessage {
        to: account.email.as_str().to_owned(),
        subject: "Your admin login link".to_owned(),
        html_body: format!(
            "<p>Hello {name},</p>\
             <p><a href=\"{url}\">Sign in to the admin area</a></p>\
             <p>This link works once and expires in {ttl_minutes} minutes. \
             If you did not ask for it, ignore this message.</p>"
        ),
        text_body: format!(
            "Hello {},\n\nSign in to the admin area:\n{login_url}\n\n\
             This link works once and expires in {ttl_minutes} minutes. \
             If you did not ask for it, ignore this message.\n",
            account.display_name
        ),
    }
}

pub fn login_notification_message(
    account: &AdminAccount,
    at: DateTime<Utc>,
    ip: &str,
    user_agent: Option<&str>,
) -> EmailMessage {
    let when = at.to_rfc3339_opts(SecondsFormat::Secs, true);
    let device = classify_user_agent(user_agent).describe();
    EmailMessage {
        to: account.email.as_str().to_owned(),
        subject: "New admin sign-in".to_owned(),
        html_body: format!(
            "<p>Hello {},</p>\
             <p>Your admin account was signed in.</p>\
             <ul><li>Time: {when}</li><li>IP address: {}</li><li>Device: {}</li></ul>\
             <p>If this was not you, contact your administrator immediately.</p>",
            escape_html(&account.display_name),
            escape_html(ip),
            escape_html(&device),
        ),
        text_body: format!(
            "Hello {},\n\nYour admin account was signed in.\n\n\
             Time: {when}\nIP address: {ip}\nDevice: {device}\n\n\
             If this was not you, contact your administrator immediately.\n",
            account.display_name
        ),
    }
}
