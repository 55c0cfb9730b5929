use super::*;
use crate::types::Entrant;
use reqwest::StatusCode;
use std::sync::Mutex;
use tokio::task::JoinHandle;

/// Winners table behind a PostgREST-compatible HTTP API.
///
/// There is no push channel: change notifications come from a poller that
/// refetches the table and compares it with the previous fetch.
pub struct RestLedgerStore {
    inner: Arc<RestClient>,
    changes: broadcast::Sender<LedgerChange>,
    poll_interval: Duration,
    poller: Mutex<Option<JoinHandle<()>>>,
}

struct RestClient {
    client: reqwest::Client,
    table_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

/// Row layout of the winners table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct WinnerRow {
    id: String,
    name: String,
    ticket: String,
    phone: String,
    prize: String,
    sponsor: String,
    #[serde(default)]
    sponsor_phone: Option<String>,
    round: u32,
    won_at: String,
}

impl WinnerRow {
    fn from_record(record: &WinnerRecord) -> Self {
        Self {
            id: record.entrant.id.clone(),
            name: record.entrant.name.clone(),
            ticket: record.entrant.entry_code.clone(),
            phone: record.entrant.phone.clone(),
            prize: record.prize.clone(),
            sponsor: record.sponsor.clone(),
            sponsor_phone: record.sponsor_phone.clone(),
            round: record.round,
            won_at: record.won_at.clone(),
        }
    }

    fn into_record(self) -> WinnerRecord {
        WinnerRecord {
            entrant: Entrant {
                id: self.id,
                name: self.name,
                phone: self.phone,
                entry_code: self.ticket,
                assigned_prize: None,
                imported_on: None,
            },
            won_at: self.won_at,
            round: self.round,
            prize: self.prize,
            sponsor: self.sponsor,
            sponsor_phone: self.sponsor_phone.filter(|p| !p.is_empty()),
        }
    }
}

impl RestLedgerStore {
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        table: String,
        poll_interval: Duration,
        timeout: Duration,
    ) -> StoreResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Unavailable(format!("Failed to build HTTP client: {}", e)))?;

        let (changes, _rx) = broadcast::channel(64);
        tracing::info!("Using REST ledger store at {} (table {})", base_url, table);

        Ok(Self {
            inner: Arc::new(RestClient {
                client,
                table_url: table_url(&base_url, &table),
                api_key,
                timeout,
            }),
            changes,
            poll_interval,
            poller: Mutex::new(None),
        })
    }
}

fn table_url(base_url: &str, table: &str) -> String {
    format!("{}/rest/v1/{}", base_url.trim_end_matches('/'), table)
}

impl RestClient {
    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let mut builder = self.client.request(method, url);
        if let Some(key) = &self.api_key {
            builder = builder.header("apikey", key).bearer_auth(key);
        }
        builder
    }

    fn map_send_error(&self, e: reqwest::Error) -> StoreError {
        if e.is_timeout() {
            StoreError::Timeout(self.timeout)
        } else {
            StoreError::Unavailable(e.to_string())
        }
    }

    async fn insert(&self, record: &WinnerRecord) -> StoreResult<()> {
        let response = self
            .request(reqwest::Method::POST, &self.table_url)
            .header("Prefer", "return=minimal")
            .json(&[WinnerRow::from_record(record)])
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else if status == StatusCode::CONFLICT {
            tracing::debug!("Winner {} already stored, ignoring", record.entrant_id());
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(StoreError::ApiError(format!("{}: {}", status, body)))
        }
    }

    async fn fetch_all(&self) -> StoreResult<Vec<WinnerRecord>> {
        let url = format!("{}?select=*&order=round.desc", self.table_url);
        let response = self
            .request(reqwest::Method::GET, &url)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        if !response.status().is_success() {
            return Err(StoreError::ApiError(format!(
                "Ledger fetch returned status: {}",
                response.status()
            )));
        }

        let rows: Vec<WinnerRow> = response
            .json()
            .await
            .map_err(|e| StoreError::ParseError(e.to_string()))?;

        Ok(rows.into_iter().map(WinnerRow::into_record).collect())
    }
}

/// Identity of a table state: which entrant won which round
fn fingerprint(records: &[WinnerRecord]) -> Vec<(String, u32)> {
    records
        .iter()
        .map(|r| (r.entrant.id.clone(), r.round))
        .collect()
}

async fn poll_changes(
    client: Arc<RestClient>,
    changes: broadcast::Sender<LedgerChange>,
    interval: Duration,
) {
    let mut last: Option<Vec<(String, u32)>> = None;
    let mut failing = false;
    let mut ticker = tokio::time::interval(interval);

    loop {
        ticker.tick().await;

        match client.fetch_all().await {
            Ok(records) => {
                let current = fingerprint(&records);
                let changed = last.as_ref().is_some_and(|prev| *prev != current);
                // Coming back from an outage also warrants a refetch
                if changed || failing {
                    let _ = changes.send(LedgerChange::Update);
                }
                last = Some(current);
                failing = false;
            }
            Err(e) => {
                if !failing {
                    tracing::warn!("Ledger poll failed: {}", e);
                }
                failing = true;
            }
        }
    }
}

#[async_trait]
impl LedgerStore for RestLedgerStore {
    async fn insert(&self, record: &WinnerRecord) -> StoreResult<()> {
        self.inner.insert(record).await
    }

    async fn select_all(&self) -> StoreResult<Vec<WinnerRecord>> {
        self.inner.fetch_all().await
    }

    fn subscribe(&self) -> broadcast::Receiver<LedgerChange> {
        let rx = self.changes.subscribe();

        let mut poller = match self.poller.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if poller.is_none() {
            *poller = Some(tokio::spawn(poll_changes(
                self.inner.clone(),
                self.changes.clone(),
                self.poll_interval,
            )));
        }

        rx
    }

    fn name(&self) -> &str {
        "rest"
    }

    async fn shutdown(&self) {
        let handle = match self.poller.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            handle.abort();
            tracing::info!("Ledger poller stopped");
        }
    }
}
