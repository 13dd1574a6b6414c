//! Credential renewal through the source's captcha challenge
//!
//! This module handles:
//! - The `CredentialRenewer` seam the scheduler calls when a session expires
//! - The captcha flow: request a challenge, save the image, ask for the answer, submit
//! - Prompts that supply captcha answers (terminal, or scripted for tests)

use crate::config::{RenewalConfig, RequestConfig};
use crate::crawler::parser::{extract_captcha_image, extract_captcha_token, has_captcha_challenge};
use crate::state::Credentials;
use crate::RenewalError;
use reqwest::header::{ACCEPT, COOKIE, SET_COOKIE};
use reqwest::{Client, Response};
use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use url::Url;

/// Replaces an expired session with a fresh one
///
/// Calls may block for a long time (a human may be involved). The scheduler is
/// the only caller, never runs two renewals at once, and bounds each call with
/// a timeout.
pub trait CredentialRenewer: Send + Sync + 'static {
    fn renew(
        &self,
        current: &Credentials,
    ) -> impl Future<Output = Result<Credentials, RenewalError>> + Send;
}

/// Supplies the text shown in a captcha image
pub trait CaptchaPrompt: Send + Sync + 'static {
    fn ask(&self, image_path: &Path) -> impl Future<Output = Result<String, RenewalError>> + Send;
}

/// Asks the operator on the terminal
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompt;

impl CaptchaPrompt for TerminalPrompt {
    async fn ask(&self, image_path: &Path) -> Result<String, RenewalError> {
        let image_path = image_path.to_path_buf();

        let answer = tokio::task::spawn_blocking(move || -> std::io::Result<String> {
            let mut stdout = std::io::stdout();
            writeln!(
                stdout,
                "\nPlease check the captcha image at {} and enter the captcha text:",
                image_path.display()
            )?;
            write!(stdout, "Enter captcha: ")?;
            stdout.flush()?;

            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line)?;
            Ok(line)
        })
        .await
        .map_err(|e| RenewalError::Aborted(e.to_string()))??;

        Ok(answer.trim().to_string())
    }
}

/// Replays a fixed list of answers, then answers with an empty string
#[derive(Debug, Default)]
pub struct ScriptedPrompt {
    answers: Mutex<VecDeque<String>>,
}

impl ScriptedPrompt {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: Mutex::new(answers.into_iter().map(Into::into).collect()),
        }
    }
}

impl CaptchaPrompt for ScriptedPrompt {
    async fn ask(&self, _image_path: &Path) -> Result<String, RenewalError> {
        let next = match self.answers.lock() {
            Ok(mut answers) => answers.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        };
        Ok(next.unwrap_or_default())
    }
}

/// Renews the session by solving the source's image captcha
#[derive(Debug)]
pub struct CaptchaRenewer<P> {
    client: Client,
    challenge_url: Url,
    submit_url: Url,
    base_url: Url,
    image_path: PathBuf,
    max_attempts: u32,
    prompt: P,
}

impl<P: CaptchaPrompt> CaptchaRenewer<P> {
    /// Creates a renewer for the site in `request.base_url`
    pub fn new(
        client: Client,
        request: &RequestConfig,
        renewal: &RenewalConfig,
        prompt: P,
    ) -> Result<Self, url::ParseError> {
        let base_url = Url::parse(&request.base_url)?;
        Ok(Self {
            client,
            challenge_url: base_url.join("/ajax_table/sites/1")?,
            submit_url: base_url.join("/browse/sites/1")?,
            base_url,
            image_path: PathBuf::from(&renewal.image_path),
            max_attempts: renewal.max_attempts.max(1),
            prompt,
        })
    }

    /// Requests a challenge page, returning its body
    async fn request_challenge(
        &self,
        jar: &mut BTreeMap<String, String>,
    ) -> Result<String, RenewalError> {
        let form = [
            ("x", "150"),
            ("y", "58"),
            ("g_recaptcha_loaded", "no"),
            ("captcha_token", ""),
            ("g_recaptcha_response", ""),
        ];

        let response = self
            .client
            .post(self.challenge_url.clone())
            .header(ACCEPT, "*/*")
            .header(COOKIE, cookie_header(jar))
            .form(&form[..])
            .send()
            .await?;

        absorb_cookies(&response, jar);
        Ok(response.text().await?)
    }

    /// Downloads the captcha image to the configured path
    async fn download_image(
        &self,
        url: Url,
        jar: &BTreeMap<String, String>,
    ) -> Result<u64, RenewalError> {
        let response = self
            .client
            .get(url)
            .header(COOKIE, cookie_header(jar))
            .send()
            .await?
            .error_for_status()?;

        let bytes = response.bytes().await?;
        tokio::fs::write(&self.image_path, &bytes).await?;
        Ok(bytes.len() as u64)
    }

    /// Submits an answer, returning the response body
    async fn submit_answer(
        &self,
        token: &str,
        answer: &str,
        jar: &mut BTreeMap<String, String>,
    ) -> Result<String, RenewalError> {
        let form = [
            ("x", "0"),
            ("y", "0"),
            ("g_recaptcha_loaded", "no"),
            ("captcha_token", token),
            ("p_captcha_response", answer),
        ];

        let response = self
            .client
            .post(self.submit_url.clone())
            .header(ACCEPT, "*/*")
            .header(COOKIE, cookie_header(jar))
            .form(&form[..])
            .send()
            .await?;

        absorb_cookies(&response, jar);
        Ok(response.text().await?)
    }
}

impl<P: CaptchaPrompt> CredentialRenewer for CaptchaRenewer<P> {
    async fn renew(&self, current: &Credentials) -> Result<Credentials, RenewalError> {
        tracing::info!("Starting captcha solving process...");

        let mut jar = current.cookies.clone();
        let mut html = self.request_challenge(&mut jar).await?;

        for attempt in 1..=self.max_attempts {
            let token = extract_captcha_token(&html).ok_or(RenewalError::MissingChallenge)?;
            let image_url =
                extract_captcha_image(&html, &self.base_url).ok_or(RenewalError::MissingChallenge)?;

            let size = self.download_image(image_url, &jar).await?;
            tracing::info!(
                "Captcha image downloaded as: {} ({} bytes)",
                self.image_path.display(),
                size
            );

            let answer = self.prompt.ask(&self.image_path).await?;
            let answer = answer.trim();
            if answer.is_empty() {
                return Err(RenewalError::NoAnswer);
            }

            let body = self.submit_answer(&token, answer, &mut jar).await?;
            if !has_captcha_challenge(&body) {
                tracing::info!("Captcha solving process completed successfully");
                return Ok(current.renewed(jar));
            }

            tracing::warn!(
                "Captcha verification failed (attempt {}/{})",
                attempt,
                self.max_attempts
            );
            html = body;
        }

        Err(RenewalError::Rejected {
            attempts: self.max_attempts,
        })
    }
}

/// Renders a cookie jar as a `Cookie` header value
fn cookie_header(jar: &BTreeMap<String, String>) -> String {
    jar.iter()
        .map(|(name, value)| format!("{}={}", name, value))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Merges `Set-Cookie` name/value pairs from a response into the jar
fn absorb_cookies(response: &Response, jar: &mut BTreeMap<String, String>) {
    for value in response.headers().get_all(SET_COOKIE) {
        let Ok(raw) = value.to_str() else { continue };
        let pair = raw.split(';').next().unwrap_or_default();
        if let Some((name, value)) = pair.split_once('=') {
            let name = name.trim();
            if !name.is_empty() {
                jar.insert(name.to_string(), value.trim().to_string());
            }
        }
    }
}
