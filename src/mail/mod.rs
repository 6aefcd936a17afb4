//! `MailSender` (spec §4.8, ported from `mail_sender.py`): dispatches a
//! templated mail to SES or SendGrid depending on `EmailConfig`, and
//! collapses every transport failure down to the same two `ErrCode`s the
//! original distinguishes (bad credentials vs. anything else).

pub mod sendgrid;
pub mod ses;
pub mod templates;

pub use templates::{MailTemplates, SignedEntry, TemplateError};

use crate::errcode::ErrCode;
use crate::payload::EmailConfig;

pub const EMAIL_DISPLAY_NAME: &str = "Let's eSign";

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("mail template error: {0}")]
    Template(#[from] TemplateError),
    #[error("mail address did not parse")]
    BadAddress,
    #[error("failed to build mail message: {0}")]
    Build(String),
    #[error("mail transport error: {0}")]
    Transport(String),
    #[error("mail credentials were rejected")]
    InvalidCredential,
    #[error("email config did not match the requested provider")]
    WrongProvider,
}

impl MailError {
    /// Collapses any transport failure to the pair of codes
    /// `mail_sender.py`'s `__send_mail` distinguishes; callers that need a
    /// mail-kind-specific code (e.g. `SEND_CONFIRM_EMAIL_FAIL`) remap this.
    pub fn to_err_code(&self) -> ErrCode {
        match self {
            MailError::InvalidCredential => ErrCode::INVALID_EMAIL_CREDENTIAL,
            _ => ErrCode::SEND_EMAIL_FAIL,
        }
    }
}

pub struct AttachmentInfo {
    pub file_bytes: Vec<u8>,
    pub file_name: String,
    pub content_type: String,
}

pub struct MailSender {
    email_config: EmailConfig,
    templates: MailTemplates,
}

impl MailSender {
    pub fn new(email_config: EmailConfig, templates: MailTemplates) -> Self {
        MailSender { email_config, templates }
    }

    fn dispatch(
        &self,
        to_email: &str,
        subject: &str,
        mail_body: &str,
        attachment: Option<&AttachmentInfo>,
    ) -> Result<(), MailError> {
        match &self.email_config {
            EmailConfig::Ses { .. } => {
                ses::send(&self.email_config, to_email, subject, mail_body, attachment)
            }
            EmailConfig::Sg { .. } => {
                sendgrid::send(&self.email_config, to_email, subject, mail_body, attachment)
            }
        }
    }

    pub fn send_notificant_error_mail(
        &self,
        locale: &str,
        notificant_email: &str,
        task_id: &str,
        file_name: &str,
        single_signer_email: Option<&str>,
    ) -> Result<(), MailError> {
        let subject = self.templates.error_subject(locale, task_id)?;
        let body = self.templates.error_body(locale, file_name, single_signer_email)?;
        self.dispatch(notificant_email, &subject, &body, None)
    }

    pub fn send_notificant_notify_mail(
        &self,
        locale: &str,
        notificant_email: &str,
        task_id: &str,
        file_name: &str,
        single_signer_email: Option<&str>,
    ) -> Result<(), MailError> {
        let subject = self.templates.notify_subject(locale, task_id)?;
        let body = self.templates.notify_body(locale, file_name, single_signer_email)?;
        self.dispatch(notificant_email, &subject, &body, None)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn send_signer_confirmation_mail(
        &self,
        locale: &str,
        sig_sender: &str,
        sig_signer_addr: &str,
        task_id: &str,
        signer_name: &str,
        custom_message: &str,
        file_name: &str,
        pdf_bytes: Vec<u8>,
        confirm_link: &str,
        signer_phone: Option<&str>,
    ) -> Result<(), MailError> {
        let subject = self.templates.confirm_subject(locale, task_id)?;
        let body = self.templates.confirm_body(
            locale,
            sig_sender,
            signer_name,
            custom_message,
            confirm_link,
            signer_phone,
        )?;
        let attachment = AttachmentInfo {
            file_bytes: pdf_bytes,
            file_name: file_name.to_string(),
            content_type: "application/pdf".to_string(),
        };
        self.dispatch(sig_signer_addr, &subject, &body, Some(&attachment))
    }

    pub fn send_notificant_signed_event_mail(
        &self,
        locale: &str,
        notificant_email: &str,
        task_id: &str,
        file_name: &str,
        signers: &[SignedEntry],
    ) -> Result<(), MailError> {
        let subject = self.templates.signed_event_subject(locale, task_id)?;
        let body = self.templates.signed_event_body(locale, file_name, signers)?;
        self.dispatch(notificant_email, &subject, &body, None)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn send_notificant_final_mail(
        &self,
        locale: &str,
        notificant_email: &str,
        task_id: &str,
        file_name: &str,
        signers: &[SignedEntry],
        zip_file_name: &str,
        zip_file_bytes: Vec<u8>,
    ) -> Result<(), MailError> {
        let subject = self.templates.notificant_final_subject(locale, task_id)?;
        let body = self.templates.notificant_final_body(locale, file_name, signers)?;
        let attachment = AttachmentInfo {
            file_bytes: zip_file_bytes,
            file_name: zip_file_name.to_string(),
            content_type: "application/zip".to_string(),
        };
        self.dispatch(notificant_email, &subject, &body, Some(&attachment))
    }

    pub fn send_signer_final_mail(
        &self,
        locale: &str,
        signer_email: &str,
        task_id: &str,
        zip_file_name: &str,
        zip_file_bytes: Vec<u8>,
    ) -> Result<(), MailError> {
        let subject = self.templates.signer_final_subject(locale, task_id)?;
        let body = self.templates.signer_final_body(locale)?;
        let attachment = AttachmentInfo {
            file_bytes: zip_file_bytes,
            file_name: zip_file_name.to_string(),
            content_type: "application/zip".to_string(),
        };
        self.dispatch(signer_email, &subject, &body, Some(&attachment))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_credential_maps_to_its_own_err_code() {
        assert_eq!(MailError::InvalidCredential.to_err_code(), ErrCode::INVALID_EMAIL_CREDENTIAL);
    }

    #[test]
    fn every_other_mail_error_collapses_to_send_email_fail() {
        assert_eq!(MailError::BadAddress.to_err_code(), ErrCode::SEND_EMAIL_FAIL);
        assert_eq!(MailError::Build("x".into()).to_err_code(), ErrCode::SEND_EMAIL_FAIL);
        assert_eq!(MailError::Transport("x".into()).to_err_code(), ErrCode::SEND_EMAIL_FAIL);
        assert_eq!(MailError::WrongProvider.to_err_code(), ErrCode::SEND_EMAIL_FAIL);
    }
}
