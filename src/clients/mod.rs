pub mod billingo_client;
pub mod ecb_client;
pub mod mnb_client;
pub mod stripe_client;
pub mod szamlazz_client;
pub mod twilio_client;
pub mod vies_client;

pub use billingo_client::BillingoClient;
pub use ecb_client::EcbClient;
pub use mnb_client::MnbClient;
pub use stripe_client::StripeClient;
pub use szamlazz_client::SzamlazzClient;
pub use twilio_client::TwilioClient;
pub use vies_client::{VatValidation, ViesClient};

/// Failure talking to a third-party API.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("{0}")]
    NotConfigured(String),
    #[error("{service} request failed: {source}")]
    Transport {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{service} API error ({status}): {body}")]
    Api {
        service: &'static str,
        status: u16,
        body: String,
    },
    #[error("{service} returned an unreadable response: {message}")]
    InvalidResponse {
        service: &'static str,
        message: String,
    },
}

impl ClientError {
    pub fn transport(service: &'static str, source: reqwest::Error) -> Self {
        ClientError::Transport { service, source }
    }

    pub fn invalid(service: &'static str, message: impl Into<String>) -> Self {
        ClientError::InvalidResponse {
            service,
            message: message.into(),
        }
    }
}

/// Reads a non-success response into a `ClientError::Api`.
pub(crate) async fn api_error(service: &'static str, response: reqwest::Response) -> ClientError {
    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    ClientError::Api { service, status, body }
}
