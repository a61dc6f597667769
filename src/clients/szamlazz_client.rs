use chrono::NaiveDate;
use log::{debug, info};
use reqwest::Client;
use reqwest::header::HeaderMap;
use reqwest::multipart::{Form, Part};
use serde::Serialize;

use crate::clients::{ClientError, api_error};
use crate::config::settings::SzamlazzConfig;
use crate::models::{InvoiceDraft, IssuedInvoice};

const SERVICE: &str = "Szamlazz.hu";
const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

const INVOICE_NAMESPACE: &str = "http://www.szamlazz.hu/xmlszamla";
const STORNO_NAMESPACE: &str = "http://www.szamlazz.hu/xmlszamlast";
const PDF_NAMESPACE: &str = "http://www.szamlazz.hu/xmlszamlapdf";

const HEADER_INVOICE_NUMBER: &str = "szlahu_szamlaszam";
const HEADER_ERROR: &str = "szlahu_error";
const HEADER_ERROR_CODE: &str = "szlahu_error_code";

#[derive(Debug, Serialize)]
struct XmlInvoice<'a> {
    #[serde(rename = "@xmlns")]
    xmlns: &'static str,
    beallitasok: InvoiceSettings<'a>,
    fejlec: InvoiceHeader,
    elado: Seller,
    vevo: Buyer<'a>,
    tetelek: Items,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InvoiceSettings<'a> {
    szamlaagentkulcs: &'a str,
    eszamla: bool,
    szamla_letoltes: bool,
    valasz_verzio: u8,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InvoiceHeader {
    kelt_datum: NaiveDate,
    teljesites_datum: NaiveDate,
    fizetesi_hatarido_datum: NaiveDate,
    fizmod: &'static str,
    penznem: String,
    szamla_nyelve: &'static str,
    megjegyzes: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    arfolyam_bank: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    arfolyam: Option<String>,
    rendeles_szam: String,
}

#[derive(Debug, Serialize)]
struct Seller {}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Buyer<'a> {
    nev: &'a str,
    orszag: &'a str,
    irsz: &'a str,
    telepules: &'a str,
    cim: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<&'a str>,
    send_email: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    adoszam: Option<&'a str>,
    #[serde(rename = "adoszamEU", skip_serializing_if = "Option::is_none")]
    adoszam_eu: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct Items {
    tetel: Vec<Item>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Item {
    megnevezes: String,
    mennyiseg: i64,
    mennyisegi_egyseg: &'static str,
    netto_egysegar: String,
    afakulcs: String,
    netto_ertek: String,
    afa_ertek: String,
    brutto_ertek: String,
}

#[derive(Debug, Serialize)]
struct XmlStorno<'a> {
    #[serde(rename = "@xmlns")]
    xmlns: &'static str,
    beallitasok: StornoSettings<'a>,
    fejlec: StornoHeader<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StornoSettings<'a> {
    szamlaagentkulcs: &'a str,
    eszamla: bool,
    szamla_letoltes: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StornoHeader<'a> {
    szamlaszam: &'a str,
    kelt_datum: NaiveDate,
    tipus: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct XmlPdfRequest<'a> {
    #[serde(rename = "@xmlns")]
    xmlns: &'static str,
    szamlaagentkulcs: &'a str,
    szamlaszam: &'a str,
    valasz_verzio: u8,
}

/// Számlázz.hu invoice agent. Every call is a multipart upload of one XML
/// document; results come back in `szlahu_*` response headers.
#[derive(Debug, Clone)]
pub struct SzamlazzClient {
    client: Client,
    agent_key: String,
    api_url: String,
}

impl SzamlazzClient {
    pub fn new(client: Client, config: &SzamlazzConfig) -> Result<Self, ClientError> {
        let agent_key = config
            .agent_key
            .clone()
            .ok_or_else(|| ClientError::NotConfigured("SZAMLAZZ_AGENT_KEY must be set".to_string()))?;

        Ok(Self {
            client,
            agent_key,
            api_url: config.api_url.clone(),
        })
    }

    pub async fn create_invoice(&self, draft: &InvoiceDraft) -> Result<IssuedInvoice, ClientError> {
        let xml = self.invoice_xml(draft)?;
        debug!("Submitting invoice {} to Szamlazz.hu", draft.invoice_id);

        let response = self.submit("action-xmlagentxmlfile", xml).await?;
        let invoice_number = header_value(response.headers(), HEADER_INVOICE_NUMBER)
            .ok_or_else(|| ClientError::invalid(SERVICE, "response has no invoice number"))?;

        info!("Szamlazz.hu issued invoice {} for {}", invoice_number, draft.invoice_id);
        Ok(IssuedInvoice {
            external_id: invoice_number.clone(),
            invoice_number,
        })
    }

    /// Issues a reversal (storno) invoice for `invoice_number`.
    pub async fn cancel_invoice(&self, invoice_number: &str, date: NaiveDate) -> Result<String, ClientError> {
        let document = XmlStorno {
            xmlns: STORNO_NAMESPACE,
            beallitasok: StornoSettings {
                szamlaagentkulcs: &self.agent_key,
                eszamla: true,
                szamla_letoltes: false,
            },
            fejlec: StornoHeader {
                szamlaszam: invoice_number,
                kelt_datum: date,
                tipus: "SS",
            },
        };
        let xml = to_xml("xmlszamlast", &document)?;

        let response = self.submit("action-szamla_agent_st", xml).await?;
        let storno_number = header_value(response.headers(), HEADER_INVOICE_NUMBER)
            .ok_or_else(|| ClientError::invalid(SERVICE, "storno response has no invoice number"))?;

        info!("Szamlazz.hu reversed invoice {} with {}", invoice_number, storno_number);
        Ok(storno_number)
    }

    pub async fn download_pdf(&self, invoice_number: &str) -> Result<Vec<u8>, ClientError> {
        let document = XmlPdfRequest {
            xmlns: PDF_NAMESPACE,
            szamlaagentkulcs: &self.agent_key,
            szamlaszam: invoice_number,
            valasz_verzio: 1,
        };
        let xml = to_xml("xmlszamlapdf", &document)?;

        let response = self.submit("action-szamla_agent_pdf", xml).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ClientError::transport(SERVICE, e))?;

        Ok(bytes.to_vec())
    }

    fn invoice_xml(&self, draft: &InvoiceDraft) -> Result<String, ClientError> {
        let foreign_currency = draft.currency != "HUF";
        let document = XmlInvoice {
            xmlns: INVOICE_NAMESPACE,
            beallitasok: InvoiceSettings {
                szamlaagentkulcs: &self.agent_key,
                eszamla: true,
                szamla_letoltes: false,
                valasz_verzio: 1,
            },
            fejlec: InvoiceHeader {
                kelt_datum: draft.issue_date,
                teljesites_datum: draft.fulfillment_date,
                fizetesi_hatarido_datum: draft.due_date,
                fizmod: "Átutalás",
                penznem: draft.currency.clone(),
                szamla_nyelve: if foreign_currency { "en" } else { "hu" },
                megjegyzes: draft.comment.clone(),
                // Rate 0 lets the agent look up the MNB rate for the issue date
                arfolyam_bank: foreign_currency.then_some("MNB"),
                arfolyam: foreign_currency.then(|| "0".to_string()),
                rendeles_szam: draft.invoice_id.to_string(),
            },
            elado: Seller {},
            vevo: Buyer {
                nev: &draft.customer.name,
                orszag: &draft.customer.country_code,
                irsz: &draft.customer.postal_code,
                telepules: &draft.customer.city,
                cim: &draft.customer.address_line,
                email: draft.customer.email.as_deref(),
                send_email: draft.customer.email.is_some(),
                adoszam: draft.customer.tax_number.as_deref(),
                adoszam_eu: draft.customer.eu_vat_number.as_deref(),
            },
            tetelek: Items {
                tetel: draft
                    .line_items
                    .iter()
                    .map(|line| Item {
                        megnevezes: line.description.clone(),
                        mennyiseg: line.quantity,
                        mennyisegi_egyseg: "db",
                        netto_egysegar: line.unit_price.to_string(),
                        afakulcs: line.vat_rate_percent.to_string(),
                        netto_ertek: line.net_amount.to_string(),
                        afa_ertek: line.vat_amount.to_string(),
                        brutto_ertek: line.gross_amount.to_string(),
                    })
                    .collect(),
            },
        };

        to_xml("xmlszamla", &document)
    }

    async fn submit(&self, field: &'static str, xml: String) -> Result<reqwest::Response, ClientError> {
        let part = Part::bytes(xml.into_bytes())
            .file_name("request.xml")
            .mime_str("text/xml")
            .map_err(|e| ClientError::transport(SERVICE, e))?;
        let form = Form::new().part(field, part);

        let response = self
            .client
            .post(&self.api_url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ClientError::transport(SERVICE, e))?;

        if let Some(code) = header_value(response.headers(), HEADER_ERROR_CODE) {
            let message = header_value(response.headers(), HEADER_ERROR).unwrap_or_default();
            return Err(ClientError::Api {
                service: SERVICE,
                status: response.status().as_u16(),
                body: format!("agent error {}: {}", code, message),
            });
        }

        if !response.status().is_success() {
            return Err(api_error(SERVICE, response).await);
        }

        Ok(response)
    }
}

fn to_xml<T: Serialize>(root: &str, document: &T) -> Result<String, ClientError> {
    let body = quick_xml::se::to_string_with_root(root, document)
        .map_err(|e| ClientError::invalid(SERVICE, format!("failed to build request XML: {}", e)))?;
    Ok(format!("{}\n{}", XML_DECLARATION, body))
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{InvoiceCustomer, InvoiceLineItem};
    use bigdecimal::BigDecimal;
    use mockito::Matcher;
    use uuid::Uuid;

    fn client(api_url: String) -> SzamlazzClient {
        SzamlazzClient::new(
            Client::new(),
            &SzamlazzConfig {
                agent_key: Some("agent-key".to_string()),
                api_url,
            },
        )
        .unwrap()
    }

    fn draft(currency: &str) -> InvoiceDraft {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        InvoiceDraft {
            invoice_id: Uuid::nil(),
            customer: InvoiceCustomer {
                name: "Kamion Kft".to_string(),
                email: Some("billing@kamion.hu".to_string()),
                tax_number: Some("12345678-2-13".to_string()),
                eu_vat_number: None,
                country_code: "HU".to_string(),
                postal_code: "1111".to_string(),
                city: "Budapest".to_string(),
                address_line: "Fő utca 1.".to_string(),
                stripe_customer_id: None,
            },
            currency: currency.to_string(),
            issue_date: date,
            fulfillment_date: date,
            due_date: NaiveDate::from_ymd_opt(2024, 3, 9).unwrap(),
            line_items: vec![InvoiceLineItem {
                service_package_id: Uuid::nil(),
                description: "Külső mosás".to_string(),
                quantity: 2,
                unit_price: BigDecimal::from(10000),
                net_amount: BigDecimal::from(20000),
                vat_rate_percent: 27,
                vat_amount: BigDecimal::from(5400),
                gross_amount: BigDecimal::from(25400),
                source_unit_price: BigDecimal::from(10000),
                source_currency: "HUF".to_string(),
            }],
            net_total: BigDecimal::from(20000),
            vat_total: BigDecimal::from(5400),
            gross_total: BigDecimal::from(25400),
            comment: "2024-02".to_string(),
        }
    }

    #[test]
    fn test_invoice_xml_shape() {
        let xml = client("http://localhost".to_string()).invoice_xml(&draft("HUF")).unwrap();
        assert!(xml.starts_with(XML_DECLARATION));
        assert!(xml.contains(r#"<xmlszamla xmlns="http://www.szamlazz.hu/xmlszamla">"#));
        assert!(xml.contains("<szamlaagentkulcs>agent-key</szamlaagentkulcs>"));
        assert!(xml.contains("<keltDatum>2024-03-01</keltDatum>"));
        assert!(xml.contains("<fizetesiHataridoDatum>2024-03-09</fizetesiHataridoDatum>"));
        assert!(xml.contains("<penznem>HUF</penznem>"));
        assert!(xml.contains("<adoszam>12345678-2-13</adoszam>"));
        assert!(!xml.contains("adoszamEU"));
        assert!(!xml.contains("arfolyamBank"));
        assert!(xml.contains("<tetel><megnevezes>Külső mosás</megnevezes><mennyiseg>2</mennyiseg>"));
        assert!(xml.contains("<bruttoErtek>25400</bruttoErtek>"));
    }

    #[test]
    fn test_foreign_currency_requests_mnb_rate() {
        let xml = client("http://localhost".to_string()).invoice_xml(&draft("EUR")).unwrap();
        assert!(xml.contains("<arfolyamBank>MNB</arfolyamBank><arfolyam>0</arfolyam>"));
        assert!(xml.contains("<szamlaNyelve>en</szamlaNyelve>"));
    }

    #[tokio::test]
    async fn test_create_invoice_reads_number_header() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_header("content-type", Matcher::Regex("multipart/form-data".to_string()))
            .match_body(Matcher::Regex("action-xmlagentxmlfile".to_string()))
            .with_status(200)
            .with_header(HEADER_INVOICE_NUMBER, "E-WASH-2024-17")
            .with_body("xmlagentresponse=DONE")
            .create_async()
            .await;

        let issued = client(server.url()).create_invoice(&draft("HUF")).await.unwrap();

        mock.assert_async().await;
        assert_eq!(issued.invoice_number, "E-WASH-2024-17");
        assert_eq!(issued.external_id, "E-WASH-2024-17");
    }

    #[tokio::test]
    async fn test_agent_error_header_is_an_api_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(200)
            .with_header(HEADER_ERROR_CODE, "3")
            .with_header(HEADER_ERROR, "Sikertelen bejelentkezes")
            .create_async()
            .await;

        let err = client(server.url()).create_invoice(&draft("HUF")).await.unwrap_err();
        assert!(err.to_string().contains("agent error 3"));
    }

    #[tokio::test]
    async fn test_cancel_uses_storno_action() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex("action-szamla_agent_st".to_string()),
                Matcher::Regex("<szamlaszam>E-WASH-2024-17</szamlaszam>".to_string()),
            ]))
            .with_status(200)
            .with_header(HEADER_INVOICE_NUMBER, "E-WASH-2024-18")
            .create_async()
            .await;

        let storno = client(server.url())
            .cancel_invoice("E-WASH-2024-17", NaiveDate::from_ymd_opt(2024, 3, 5).unwrap())
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(storno, "E-WASH-2024-18");
    }
}
