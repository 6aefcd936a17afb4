//! `MailTemplates` (spec §4.8, ported from `mail_template.py`). Subjects and
//! bodies are loaded as HTML files from a template folder on disk rather
//! than embedded — the HTML itself is a static resource out of scope for
//! this crate (spec §1), same as the PDF fonts and seal image.

use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("failed to read mail template {0}")]
    Io(PathBuf),
    #[error("mail subject template {0} has no <title> tag")]
    MissingTitle(PathBuf),
    #[error("mail body template {0} is missing block marker {1:?}")]
    MissingBlock(PathBuf, &'static str),
}

const BEGIN_SMS_NOTICE: &str = "<!-- BEGIN SMS NOTICE -->";
const END_SMS_NOTICE: &str = "<!-- END SMS NOTICE -->";
const BEGIN_SINGLE_SIGNER: &str = "<!-- BEGIN SINGLE SIGNER -->";
const END_SINGLE_SIGNER: &str = "<!-- END SINGLE SIGNER -->";

/// One signer entry for the "list of who signed, and when" blocks shared by
/// the signed-event and notificant-final mails.
pub struct SignedEntry {
    pub name: String,
    pub signing_time_unix: i64,
}

pub struct MailTemplates {
    folder: PathBuf,
}

impl MailTemplates {
    pub fn new<P: Into<PathBuf>>(folder: P) -> Self {
        MailTemplates { folder: folder.into() }
    }

    fn locale_path(&self, email_type: &str, locale: &str) -> PathBuf {
        let candidate = self
            .folder
            .join(email_type)
            .join(format!("{}_body.html", locale.to_lowercase()));
        if candidate.exists() {
            candidate
        } else {
            self.folder.join(email_type).join("en-us_body.html")
        }
    }

    fn load_body(&self, email_type: &str, locale: &str) -> Result<String, TemplateError> {
        let path = self.locale_path(email_type, locale);
        std::fs::read_to_string(&path).map_err(|_| TemplateError::Io(path))
    }

    fn load_subject(&self, email_type: &str, locale: &str) -> Result<String, TemplateError> {
        let path = self.locale_path(email_type, locale);
        let html = std::fs::read_to_string(&path).map_err(|_| TemplateError::Io(path.clone()))?;
        let start = html
            .find("<title>")
            .map(|i| i + "<title>".len())
            .ok_or_else(|| TemplateError::MissingTitle(path.clone()))?;
        let end = html[start..]
            .find("</title>")
            .map(|i| start + i)
            .ok_or(TemplateError::MissingTitle(path))?;
        Ok(html[start..end].to_string())
    }

    fn remove_block(
        path: &Path,
        body: &str,
        begin: &'static str,
        end: &'static str,
    ) -> Result<String, TemplateError> {
        let begin_idx = body
            .find(begin)
            .ok_or_else(|| TemplateError::MissingBlock(path.to_path_buf(), begin))?;
        let end_idx = body
            .find(end)
            .ok_or_else(|| TemplateError::MissingBlock(path.to_path_buf(), end))?;
        Ok(format!("{}{}", &body[..begin_idx], &body[end_idx + end.len()..]))
    }

    fn short_task_id(task_id: &str) -> &str {
        let len = task_id.len();
        &task_id[len.saturating_sub(12)..]
    }

    fn signer_list_html(signers: &[SignedEntry]) -> String {
        let mut out = String::new();
        for signer in signers {
            let dt = chrono::DateTime::<chrono::Utc>::from_naive_utc_and_offset(
                chrono::NaiveDateTime::from_timestamp_opt(signer.signing_time_unix, 0)
                    .unwrap_or_default(),
                chrono::Utc,
            );
            out.push_str(&format!(
                "{} ({})<br>",
                signer.name,
                dt.format("%Y/%m/%d %H:%M:%S UTC")
            ));
        }
        out
    }

    pub fn error_subject(&self, locale: &str, task_id: &str) -> Result<String, TemplateError> {
        let subject = self.load_subject("email_to_notificant_0", locale)?;
        Ok(subject.replace("DUMMY_TASK_ID", Self::short_task_id(task_id)))
    }

    pub fn error_body(
        &self,
        locale: &str,
        file_name: &str,
        single_signer_email: Option<&str>,
    ) -> Result<String, TemplateError> {
        let path = self.locale_path("email_to_notificant_0", locale);
        let body = self.load_body("email_to_notificant_0", locale)?;
        let body = body.replace("DUMMY_FILE_NAME", file_name);
        let body = match single_signer_email {
            Some(addr) => body.replace("DUMMY_SIGNER_EMAIL", addr),
            None => Self::remove_block(&path, &body, BEGIN_SINGLE_SIGNER, END_SINGLE_SIGNER)?,
        };
        Ok(body)
    }

    pub fn notify_subject(&self, locale: &str, task_id: &str) -> Result<String, TemplateError> {
        let subject = self.load_subject("email_to_notificant_1", locale)?;
        Ok(subject.replace("DUMMY_TASK_ID", Self::short_task_id(task_id)))
    }

    pub fn notify_body(
        &self,
        locale: &str,
        file_name: &str,
        single_signer_email: Option<&str>,
    ) -> Result<String, TemplateError> {
        let path = self.locale_path("email_to_notificant_1", locale);
        let body = self.load_body("email_to_notificant_1", locale)?;
        let body = body.replace("DUMMY_FILE_NAME", file_name);
        let body = match single_signer_email {
            Some(addr) => body.replace("DUMMY_SIGNER_EMAIL", addr),
            None => Self::remove_block(&path, &body, BEGIN_SINGLE_SIGNER, END_SINGLE_SIGNER)?,
        };
        Ok(body)
    }

    pub fn confirm_subject(&self, locale: &str, task_id: &str) -> Result<String, TemplateError> {
        let subject = self.load_subject("email_to_signer_1", locale)?;
        Ok(subject.replace("DUMMY_TASK_ID", Self::short_task_id(task_id)))
    }

    #[allow(clippy::too_many_arguments)]
    pub fn confirm_body(
        &self,
        locale: &str,
        sender: &str,
        signer_name: &str,
        custom_message: &str,
        confirm_link: &str,
        signer_phone: Option<&str>,
    ) -> Result<String, TemplateError> {
        let path = self.locale_path("email_to_signer_1", locale);
        let body = self.load_body("email_to_signer_1", locale)?;
        let body = body.replace("DUMMY_SIGNER_NAME", signer_name);
        let body = body.replace("DUMMY_SENDER", sender);
        let escaped = html_escape(custom_message).replace('\n', "<br>");
        let body = body.replace("DUMMY_CUSTOM_MESSAGE", &escaped);
        let body = body.replace("DUMMY_SIGNER_CONFIRM_LINK", confirm_link);
        let body = match signer_phone {
            Some(phone) => body.replace("DUMMY_SIGNER_PHONE", phone),
            None => Self::remove_block(&path, &body, BEGIN_SMS_NOTICE, END_SMS_NOTICE)?,
        };
        Ok(body)
    }

    pub fn signed_event_subject(&self, locale: &str, task_id: &str) -> Result<String, TemplateError> {
        let subject = self.load_subject("email_to_notificant_2", locale)?;
        Ok(subject.replace("DUMMY_TASK_ID", Self::short_task_id(task_id)))
    }

    pub fn signed_event_body(
        &self,
        locale: &str,
        file_name: &str,
        signers: &[SignedEntry],
    ) -> Result<String, TemplateError> {
        let body = self.load_body("email_to_notificant_2", locale)?;
        let body = body.replace("DUMMY_FILE_NAME", file_name);
        Ok(body.replace("DUMMY_SIGNER_LIST", &Self::signer_list_html(signers)))
    }

    pub fn notificant_final_subject(&self, locale: &str, task_id: &str) -> Result<String, TemplateError> {
        let subject = self.load_subject("email_to_notificant_3", locale)?;
        Ok(subject.replace("DUMMY_TASK_ID", Self::short_task_id(task_id)))
    }

    pub fn notificant_final_body(
        &self,
        locale: &str,
        file_name: &str,
        signers: &[SignedEntry],
    ) -> Result<String, TemplateError> {
        let body = self.load_body("email_to_notificant_3", locale)?;
        let body = body.replace("DUMMY_FILE_NAME", file_name);
        Ok(body.replace("DUMMY_SIGNER_LIST", &Self::signer_list_html(signers)))
    }

    pub fn signer_final_subject(&self, locale: &str, task_id: &str) -> Result<String, TemplateError> {
        let subject = self.load_subject("email_to_signer_2", locale)?;
        Ok(subject.replace("DUMMY_TASK_ID", Self::short_task_id(task_id)))
    }

    pub fn signer_final_body(&self, locale: &str) -> Result<String, TemplateError> {
        self.load_body("email_to_signer_2", locale)
    }
}

/// Minimal HTML entity escaping matching Python's `html.escape` defaults
/// (`&`, `<`, `>`, `"`, `'`).
fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_reserved_html_characters() {
        assert_eq!(html_escape("a & b < c"), "a &amp; b &lt; c");
    }

    #[test]
    fn short_task_id_keeps_last_12_chars() {
        assert_eq!(MailTemplates::short_task_id("abcdefghijklmnopqrstuvwxyz"), "opqrstuvwxyz");
        assert_eq!(MailTemplates::short_task_id("short"), "short");
    }
}
