pub mod financial_validation;
pub mod http_client;
pub mod input_validation;
pub mod stripe_currency_utils;
