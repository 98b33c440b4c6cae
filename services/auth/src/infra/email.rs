use std::future::Future;
use std::time::Duration;

use anyhow::Context as _;
use serde::Serialize;

use crate::domain::repository::EmailSender;
use crate::domain::types::EmailMessage;
use crate::error::AuthServiceError;

/// Request body for the transactional mail API.
#[derive(Debug, Serialize)]
struct SendMailRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
    text: &'a str,
}

/// Delivers mail through an HTTP transactional mail API (`POST` JSON, bearer
/// API key). Every request carries its own timeout.
#[derive(Clone)]
pub struct HttpEmailSender {
    pub client: reqwest::Client,
    pub api_url: String,
    pub api_key: String,
    pub from: String,
    pub timeout: Duration,
}

impl EmailSender for HttpEmailSender {
    fn send(
        &self,
        message: &EmailMessage,
    ) -> impl Future<Output = Result<(), AuthServiceError>> + Send {
        let request = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&SendMailRequest {
                from: &self.from,
                to: &message.to,
                subject: &message.subject,
                html: &message.html_body,
                text: &message.text_body,
            });
        async move {
            request
                .send()
                .await
                .context("send mail request")
                .and_then(|resp| resp.error_for_status().context("mail api rejected message"))
                .map_err(AuthServiceError::dependency)?;
            Ok(())
        }
    }
}
