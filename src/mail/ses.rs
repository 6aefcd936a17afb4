//! SES transport (spec §4.8, ported from `mail_sender.py`'s
//! `__send_mail_via_ses`): plain SMTP STARTTLS on port 587, matching the
//! original's `smtplib.SMTP(...).starttls(...)` dance via `lettre`.

use lettre::message::header::ContentType;
use lettre::message::{Attachment, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};

use super::{AttachmentInfo, MailError, EMAIL_DISPLAY_NAME};
use crate::payload::EmailConfig;

const SES_SMTP_HOST: &str = "email-smtp.us-east-1.amazonaws.com";
const SES_SMTP_PORT: u16 = 587;
const SES_TIMEOUT_SECS: u64 = 10;

pub fn send(
    email_config: &EmailConfig,
    to_email: &str,
    subject: &str,
    mail_body: &str,
    attachment: Option<&AttachmentInfo>,
) -> Result<(), MailError> {
    let (smtp_username, smtp_password, domain) = match email_config {
        EmailConfig::Ses {
            ses_smtp_username,
            ses_smtp_password,
            ses_domain,
        } => (ses_smtp_username, ses_smtp_password, ses_domain),
        EmailConfig::Sg { .. } => return Err(MailError::WrongProvider),
    };

    let from_display = format!(
        "=?UTF-8?B?{}?= <do-not-reply@{domain}>",
        base64::encode(EMAIL_DISPLAY_NAME)
    );

    let body_part = SinglePart::builder()
        .header(ContentType::TEXT_HTML)
        .body(mail_body.to_string());

    let email_builder = Message::builder()
        .from(from_display.parse().map_err(|_| MailError::BadAddress)?)
        .to(to_email.parse().map_err(|_| MailError::BadAddress)?)
        .subject(subject);

    let email = if let Some(att) = attachment {
        let content_type = att
            .content_type
            .parse::<ContentType>()
            .map_err(|_| MailError::BadAddress)?;
        let attachment_part = Attachment::new(att.file_name.clone())
            .body(att.file_bytes.clone(), content_type);
        email_builder
            .multipart(MultiPart::mixed().singlepart(body_part).singlepart(attachment_part))
            .map_err(|e| MailError::Build(e.to_string()))?
    } else {
        email_builder
            .singlepart(body_part)
            .map_err(|e| MailError::Build(e.to_string()))?
    };

    let creds = Credentials::new(smtp_username.clone(), smtp_password.clone());
    let transport = SmtpTransport::starttls_relay(SES_SMTP_HOST)
        .map_err(|e| MailError::Transport(e.to_string()))?
        .port(SES_SMTP_PORT)
        .timeout(Some(std::time::Duration::from_secs(SES_TIMEOUT_SECS)))
        .credentials(creds)
        .build();

    transport.send(&email).map_err(|e| {
        if e.is_permanent() || e.is_authentication() {
            MailError::InvalidCredential
        } else {
            MailError::Transport(e.to_string())
        }
    })?;

    Ok(())
}
