//! Authenticated portal REST calls: sub-accounts, protocol, invoice
//! metadata and invoice PDFs.

pub mod error;
mod responses;

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, RequestBuilder, StatusCode};

pub use self::error::CollectError;
use self::responses::{
    scalar, text, InvoiceList, PdfEnvelope, PortalInvoice, ProtocolResponse, SubAccountList,
};
use crate::download::{DownloadError, InvoicePdfSource};
use crate::invoice::{format_amount, InvoiceRecord};
use crate::portal::BearerToken;

const USER_AGENT: &str = "Mozilla/5.0";
const API_TIMEOUT: Duration = Duration::from_secs(30);
const PDF_TIMEOUT: Duration = Duration::from_secs(60);

const CHANNEL: &str = "AGC";
const DISTRIBUTOR: &str = "COELBA";
const PROTOCOL_DISTRIBUTOR: &str = "COEL";
const SERVICE_USER: &str = "WSO2_CONEXAO";
const REGION: &str = "NE";
const PROFILE_TYPE: &str = "1";
const PDF_TYPIFICATION: &str = "1031607";
const PDF_REASON: &str = "10";

/// Everything gathered for one account.
#[derive(Debug, Clone)]
pub struct Collection {
    pub sub_accounts: Vec<String>,
    pub protocol: Option<String>,
    pub records: Vec<InvoiceRecord>,
}

/// Portal API scoped to one logged-in account. `document` is the login
/// document, which the API also takes as the customer identifier.
pub struct PortalClient {
    client: Client,
    api_root: String,
    token: BearerToken,
    document: String,
}

impl std::fmt::Debug for PortalClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortalClient")
            .field("api_root", &self.api_root)
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

impl PortalClient {
    pub fn new(client: Client, api_root: &str, token: BearerToken, document: &str) -> Self {
        Self {
            client,
            api_root: api_root.trim_end_matches('/').to_string(),
            token,
            document: document.to_string(),
        }
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.client
            .get(format!("{}{}", self.api_root, path))
            .bearer_auth(self.token.as_str())
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .timeout(API_TIMEOUT)
    }

    pub async fn list_sub_accounts(&self) -> Result<Vec<String>, CollectError> {
        let response = self
            .get(&format!("/imoveis/1.1.0/clientes/{}/ucs", self.document))
            .query(&[
                ("documento", self.document.as_str()),
                ("canalSolicitante", CHANNEL),
                ("distribuidora", DISTRIBUTOR),
                ("usuario", SERVICE_USER),
                ("indMaisUcs", "X"),
                ("tipoPerfil", PROFILE_TYPE),
            ])
            .send()
            .await?;
        if response.status() != StatusCode::OK {
            return Err(CollectError::Status {
                endpoint: "ucs",
                status: response.status().as_u16(),
            });
        }
        let list: SubAccountList = response.json().await?;
        Ok(list
            .ucs
            .iter()
            .filter_map(|entry| scalar(entry.uc.as_ref()))
            .collect())
    }

    /// Legacy protocol id used by the invoice endpoints. Best-effort: any
    /// failure yields `None` and the calls go out without it.
    pub async fn resolve_protocol(&self, first_sub_account: &str) -> Option<String> {
        let result = async {
            let response = self
                .get("/protocolo/1.1.0/obterProtocolo")
                .query(&[
                    ("distribuidora", PROTOCOL_DISTRIBUTOR),
                    ("canalSolicitante", CHANNEL),
                    ("documento", self.document.as_str()),
                    ("codCliente", first_sub_account),
                    ("recaptchaAnl", "true"),
                    ("regiao", REGION),
                ])
                .send()
                .await?;
            let body: ProtocolResponse = response.json().await?;
            Ok::<_, CollectError>(scalar(body.protocolo_legado.as_ref()))
        }
        .await;

        match result {
            Ok(protocol) => protocol,
            Err(e) => {
                tracing::debug!("Protocol lookup failed, continuing without: {}", e);
                None
            }
        }
    }

    /// Invoices for one sub-account. Never fails: an error or an empty
    /// list yields a single placeholder row so the sub-account stays
    /// visible.
    pub async fn fetch_invoices(
        &self,
        sub_account: &str,
        protocol: Option<&str>,
    ) -> Vec<InvoiceRecord> {
        match self.try_fetch_invoices(sub_account, protocol).await {
            Ok(invoices) if !invoices.is_empty() => invoices
                .iter()
                .map(|invoice| to_record(sub_account, invoice))
                .collect(),
            Ok(_) => {
                tracing::debug!(sub_account, "No invoices listed");
                vec![InvoiceRecord::placeholder(sub_account)]
            }
            Err(e) => {
                tracing::warn!(sub_account, "Invoice query failed: {}", e);
                vec![InvoiceRecord::placeholder(sub_account)]
            }
        }
    }

    async fn try_fetch_invoices(
        &self,
        sub_account: &str,
        protocol: Option<&str>,
    ) -> Result<Vec<PortalInvoice>, CollectError> {
        let doc = self.document.as_str();
        let mut query: Vec<(&str, &str)> = vec![
            ("codigo", sub_account),
            ("documento", doc),
            ("canalSolicitante", CHANNEL),
            ("usuario", SERVICE_USER),
        ];
        if let Some(protocol) = protocol {
            query.push(("protocolo", protocol));
        }
        query.extend([
            ("byPassActiv", "X"),
            ("documentoSolicitante", doc),
            ("documentoCliente", doc),
            ("distribuidora", DISTRIBUTOR),
            ("tipoPerfil", PROFILE_TYPE),
        ]);

        let response = self
            .get("/multilogin/2.0.0/servicos/faturas/ucs/faturas")
            .query(&query)
            .send()
            .await?;
        if response.status() != StatusCode::OK {
            return Err(CollectError::Status {
                endpoint: "faturas",
                status: response.status().as_u16(),
            });
        }
        let list: InvoiceList = response.json().await?;
        Ok(list.faturas)
    }

    /// Download one invoice PDF. The portal wraps it in a JSON envelope
    /// with base64 `fileData`.
    pub async fn fetch_invoice_pdf(
        &self,
        invoice: &InvoiceRecord,
        protocol: Option<&str>,
    ) -> Result<Vec<u8>, CollectError> {
        let doc = self.document.as_str();
        let mut query: Vec<(&str, &str)> = vec![("codigo", invoice.sub_account.as_str())];
        if let Some(protocol) = protocol {
            query.push(("protocolo", protocol));
        }
        query.extend([
            ("tipificacao", PDF_TYPIFICATION),
            ("usuario", SERVICE_USER),
            ("canalSolicitante", CHANNEL),
            ("motivo", PDF_REASON),
            ("distribuidora", DISTRIBUTOR),
            ("regiao", REGION),
            ("tipoPerfil", PROFILE_TYPE),
            ("documento", doc),
            ("documentoSolicitante", doc),
            ("byPassActiv", ""),
        ]);

        let response = self
            .get(&format!(
                "/multilogin/2.0.0/servicos/faturas/{}/pdf",
                invoice.invoice_number
            ))
            .header(reqwest::header::ACCEPT, "application/json")
            .timeout(PDF_TIMEOUT)
            .query(&query)
            .send()
            .await?;
        if response.status() != StatusCode::OK {
            return Err(CollectError::Status {
                endpoint: "pdf",
                status: response.status().as_u16(),
            });
        }
        let envelope: PdfEnvelope = response.json().await?;
        let data = envelope
            .file_data
            .ok_or_else(|| CollectError::MissingFileData(invoice.invoice_number.clone()))?;
        Ok(base64::engine::general_purpose::STANDARD.decode(data.trim())?)
    }

    /// Sub-accounts, protocol and every invoice row for the account.
    pub async fn collect(&self) -> Result<Collection, CollectError> {
        let sub_accounts = self.list_sub_accounts().await?;
        let first = sub_accounts.first().ok_or(CollectError::NoSubAccounts)?;
        let protocol = self.resolve_protocol(first).await;
        tracing::debug!(
            sub_accounts = sub_accounts.len(),
            has_protocol = protocol.is_some(),
            "Resolved account structure"
        );

        let mut records = Vec::new();
        for sub_account in &sub_accounts {
            records.extend(self.fetch_invoices(sub_account, protocol.as_deref()).await);
        }
        if records.is_empty() {
            return Err(CollectError::NoRecords);
        }
        Ok(Collection {
            sub_accounts,
            protocol,
            records,
        })
    }

    /// Bind the protocol so the orchestrator can fetch PDFs.
    pub fn pdf_source(&self, protocol: Option<String>) -> PortalPdfs<'_> {
        PortalPdfs {
            portal: self,
            protocol,
        }
    }
}

fn to_record(sub_account: &str, invoice: &PortalInvoice) -> InvoiceRecord {
    InvoiceRecord {
        sub_account: sub_account.to_string(),
        reference_month: text(invoice.mes_referencia.as_ref()),
        invoice_number: text(invoice.numero_fatura.as_ref()),
        issue_date: text(invoice.data_emissao.as_ref()),
        due_date: text(invoice.data_vencimento.as_ref()),
        amount: format_amount(invoice.valor_emissao.as_ref()),
        status: text(invoice.status_fatura.as_ref()),
        file_id: None,
        drive_link: None,
    }
}

/// [`InvoicePdfSource`] backed by the portal's PDF endpoint.
#[derive(Debug)]
pub struct PortalPdfs<'a> {
    portal: &'a PortalClient,
    protocol: Option<String>,
}

#[async_trait]
impl InvoicePdfSource for PortalPdfs<'_> {
    async fn fetch_pdf(&self, invoice: &InvoiceRecord) -> Result<Vec<u8>, DownloadError> {
        let bytes = self
            .portal
            .fetch_invoice_pdf(invoice, self.protocol.as_deref())
            .await
            .map_err(|source| DownloadError::Fetch {
                invoice: invoice.invoice_number.clone(),
                source,
            })?;
        Ok(bytes)
    }
}
