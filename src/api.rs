//! HTTP client for the card persistence API.
//!
//! Every non-2xx status or transport problem comes back as an [`ApiError`];
//! nothing here retries.

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::card::Card;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },
    #[error("{url} answered {status}")]
    Status { url: String, status: u16 },
    #[error("could not decode response from {url}: {message}")]
    Decode { url: String, message: String },
}

impl ApiError {
    fn transport(url: &str, err: reqwest::Error) -> Self {
        ApiError::Transport {
            url: url.to_string(),
            message: err.to_string(),
        }
    }

    fn decode(url: &str, err: impl std::fmt::Display) -> Self {
        ApiError::Decode {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}

/// Map a response status to an error for anything outside 2xx.
pub fn check_status(url: &str, status: StatusCode) -> Result<(), ApiError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(ApiError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct CardApi {
    client: Client,
    cards_url: String,
}

impl CardApi {
    pub fn new(cards_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            cards_url: cards_url.into(),
        }
    }

    pub fn card_url(&self, id: &str) -> String {
        format!("{}/{}", self.cards_url, id)
    }

    pub fn new_card_url(&self) -> String {
        format!("{}/new", self.cards_url)
    }

    pub async fn list_cards(self) -> Result<Vec<Card>, ApiError> {
        let url = self.cards_url.clone();
        self.send_json(self.client.get(&url), &url).await
    }

    pub async fn get_card(self, id: String) -> Result<Card, ApiError> {
        let url = self.card_url(&id);
        self.send_json(self.client.get(&url), &url).await
    }

    pub async fn create_card(self, card: Card) -> Result<Card, ApiError> {
        let url = self.new_card_url();
        self.send_json(self.client.post(&url).json(&card), &url).await
    }

    pub async fn update_card(self, card: Card) -> Result<Card, ApiError> {
        let url = self.card_url(&card.id);
        self.send_json(self.client.put(&url).json(&card), &url).await
    }

    pub async fn delete_card(self, id: String) -> Result<(), ApiError> {
        let url = self.card_url(&id);
        let response = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(|err| ApiError::transport(&url, err))?;
        check_status(&url, response.status())
    }

    async fn send_json<T: for<'de> Deserialize<'de>>(
        &self,
        request: reqwest::RequestBuilder,
        url: &str,
    ) -> Result<T, ApiError> {
        let response = request
            .send()
            .await
            .map_err(|err| ApiError::transport(url, err))?;
        check_status(url, response.status())?;
        let body = response
            .bytes()
            .await
            .map_err(|err| ApiError::transport(url, err))?;
        serde_json::from_slice(&body).map_err(|err| ApiError::decode(url, err))
    }
}

#[derive(Debug, Serialize)]
struct AtomizeRequest<'a> {
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct AtomizeResponse {
    content: String,
}

/// Send `prompt` to the atomization endpoint and return the raw reply text.
pub async fn atomize(url: String, prompt: String) -> Result<String, ApiError> {
    let response = Client::new()
        .post(&url)
        .json(&AtomizeRequest { content: &prompt })
        .send()
        .await
        .map_err(|err| ApiError::transport(&url, err))?;
    check_status(&url, response.status())?;
    let body = response
        .bytes()
        .await
        .map_err(|err| ApiError::transport(&url, err))?;
    let reply: AtomizeResponse =
        serde_json::from_slice(&body).map_err(|err| ApiError::decode(&url, err))?;
    Ok(reply.content)
}
