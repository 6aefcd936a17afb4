//! SendGrid transport (spec §4.8, ported from `mail_sender.py`'s
//! `__send_mail_via_sendgrid`). The pack carries no `sendgrid` crate, so
//! this calls the `v3/mail/send` HTTPS API directly with `reqwest` — the
//! same JSON body the Python SDK builds, tracking settings all disabled.

use serde::Serialize;

use super::{AttachmentInfo, MailError, EMAIL_DISPLAY_NAME};
use crate::payload::EmailConfig;

const SENDGRID_API_URL: &str = "https://api.sendgrid.com/v3/mail/send";
const SENDGRID_TIMEOUT_SECS: u64 = 10;

#[derive(Serialize)]
struct EmailAddress<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Serialize)]
struct Personalization<'a> {
    to: Vec<EmailAddress<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(rename = "type")]
    content_type: &'static str,
    value: &'a str,
}

#[derive(Serialize)]
struct AttachmentPayload {
    content: String,
    #[serde(rename = "type")]
    content_type: String,
    filename: String,
    disposition: &'static str,
}

#[derive(Serialize)]
struct ClickTracking {
    enable: bool,
    enable_text: bool,
}

#[derive(Serialize)]
struct SimpleTracking {
    enable: bool,
}

#[derive(Serialize)]
struct TrackingSettings {
    click_tracking: ClickTracking,
    open_tracking: SimpleTracking,
    subscription_tracking: SimpleTracking,
    ganalytics: SimpleTracking,
}

impl Default for TrackingSettings {
    fn default() -> Self {
        TrackingSettings {
            click_tracking: ClickTracking { enable: false, enable_text: false },
            open_tracking: SimpleTracking { enable: false },
            subscription_tracking: SimpleTracking { enable: false },
            ganalytics: SimpleTracking { enable: false },
        }
    }
}

#[derive(Serialize)]
struct SendGridMail<'a> {
    personalizations: Vec<Personalization<'a>>,
    from: EmailAddress<'a>,
    subject: &'a str,
    content: Vec<Content<'a>>,
    tracking_settings: TrackingSettings,
    #[serde(skip_serializing_if = "Option::is_none")]
    attachments: Option<Vec<AttachmentPayload>>,
}

pub fn send(
    email_config: &EmailConfig,
    to_email: &str,
    subject: &str,
    mail_body: &str,
    attachment: Option<&AttachmentInfo>,
) -> Result<(), MailError> {
    let (sg_secret, domain) = match email_config {
        EmailConfig::Sg { sg_secret, sg_domain } => (sg_secret, sg_domain),
        EmailConfig::Ses { .. } => return Err(MailError::WrongProvider),
    };

    let from_addr = format!("do-not-reply@{domain}");
    let attachments = attachment.map(|att| {
        vec![AttachmentPayload {
            content: base64::encode(&att.file_bytes),
            content_type: att.content_type.clone(),
            filename: format!(
                "=?UTF-8?B?{}?=",
                base64::encode(&att.file_name)
            ),
            disposition: "attachment",
        }]
    });

    let body = SendGridMail {
        personalizations: vec![Personalization { to: vec![EmailAddress { email: to_email, name: None }] }],
        from: EmailAddress { email: &from_addr, name: Some(EMAIL_DISPLAY_NAME) },
        subject,
        content: vec![Content { content_type: "text/html", value: mail_body }],
        tracking_settings: TrackingSettings::default(),
        attachments,
    };

    let client = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(SENDGRID_TIMEOUT_SECS))
        .build()
        .map_err(|e| MailError::Transport(e.to_string()))?;

    let response = client
        .post(SENDGRID_API_URL)
        .bearer_auth(sg_secret)
        .json(&body)
        .send()
        .map_err(|e| MailError::Transport(e.to_string()))?;

    let status = response.status();
    if status.as_u16() == 401 || status.as_u16() == 403 {
        return Err(MailError::InvalidCredential);
    }
    if status.as_u16() != 202 && status.as_u16() != 200 {
        return Err(MailError::Transport(format!(
            "sendgrid responded with status {status}"
        )));
    }

    Ok(())
}
