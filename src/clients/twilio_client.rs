use log::info;
use reqwest::Client;
use serde::Deserialize;

use crate::clients::{ClientError, api_error};
use crate::config::settings::TwilioConfig;

const SERVICE: &str = "Twilio";

#[derive(Debug, Deserialize)]
pub struct TwilioMessage {
    pub sid: String,
    pub status: String,
}

#[derive(Debug, Clone)]
pub struct TwilioClient {
    client: Client,
    account_sid: String,
    auth_token: String,
    from_number: String,
    api_url: String,
}

impl TwilioClient {
    pub fn new(client: Client, config: &TwilioConfig) -> Result<Self, ClientError> {
        let account_sid = config
            .account_sid
            .clone()
            .ok_or_else(|| ClientError::NotConfigured("TWILIO_ACCOUNT_SID must be set".to_string()))?;
        let auth_token = config
            .auth_token
            .clone()
            .ok_or_else(|| ClientError::NotConfigured("TWILIO_AUTH_TOKEN must be set".to_string()))?;
        let from_number = config
            .from_number
            .clone()
            .ok_or_else(|| ClientError::NotConfigured("TWILIO_FROM_NUMBER must be set".to_string()))?;

        Ok(Self {
            client,
            account_sid,
            auth_token,
            from_number,
            api_url: config.api_url.trim_end_matches('/').to_string(),
        })
    }

    pub async fn send_sms(&self, to: &str, body: &str) -> Result<TwilioMessage, ClientError> {
        let url = format!("{}/Accounts/{}/Messages.json", self.api_url, self.account_sid);
        let params = [("To", to), ("From", self.from_number.as_str()), ("Body", body)];

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&params)
            .send()
            .await
            .map_err(|e| ClientError::transport(SERVICE, e))?;

        if !response.status().is_success() {
            return Err(api_error(SERVICE, response).await);
        }

        let message: TwilioMessage = response
            .json()
            .await
            .map_err(|e| ClientError::invalid(SERVICE, e.to_string()))?;

        info!("SMS queued via Twilio: sid={} status={}", message.sid, message.status);
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn config(api_url: String) -> TwilioConfig {
        TwilioConfig {
            account_sid: Some("AC123".to_string()),
            auth_token: Some("secret".to_string()),
            from_number: Some("+3612345678".to_string()),
            api_url,
        }
    }

    #[test]
    fn test_missing_credentials_is_not_configured() {
        let mut cfg = config("http://localhost".to_string());
        cfg.auth_token = None;
        let err = TwilioClient::new(Client::new(), &cfg).unwrap_err();
        assert!(matches!(err, ClientError::NotConfigured(_)));
    }

    #[tokio::test]
    async fn test_send_sms_posts_form_with_basic_auth() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/Accounts/AC123/Messages.json")
            .match_header("authorization", "Basic QUMxMjM6c2VjcmV0")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("To".into(), "+36301234567".into()),
                Matcher::UrlEncoded("From".into(), "+3612345678".into()),
                Matcher::UrlEncoded("Body".into(), "Code: 123456".into()),
            ]))
            .with_status(201)
            .with_body(r#"{"sid":"SM1","status":"queued"}"#)
            .create_async()
            .await;

        let client = TwilioClient::new(Client::new(), &config(server.url())).unwrap();
        let message = client.send_sms("+36301234567", "Code: 123456").await.unwrap();

        mock.assert_async().await;
        assert_eq!(message.sid, "SM1");
    }
}
