use std::time::Duration;

use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::config::SourceConfig;
use crate::error::FetchError;
use crate::model::{PricePair, parse_price};
use crate::source::PriceSource;

const USER_AGENT: &str = concat!("gold-notifier/", env!("CARGO_PKG_VERSION"));

/// Scrapes E.SUN Bank's gold passbook page.
///
/// The quote table is the `table_index`-th match of `table_selector`; the
/// bank's buy and sell figures are the `buy_index`-th and `sell_index`-th
/// matches of `cell_selector` inside it.
pub struct EsunGoldSource {
    client: reqwest::Client,
    url: String,
    table_selector: Selector,
    table_index: usize,
    cell_selector: Selector,
    buy_index: usize,
    sell_index: usize,
}

impl EsunGoldSource {
    pub fn new(config: &SourceConfig) -> Result<Self, Report<FetchError>> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .change_context(FetchError::Client)?;

        Ok(Self {
            client,
            url: config.url.clone(),
            table_selector: parse_selector(&config.table_selector)?,
            table_index: config.table_index,
            cell_selector: parse_selector(&config.cell_selector)?,
            buy_index: config.buy_index,
            sell_index: config.sell_index,
        })
    }

    async fn fetch_page(&self) -> Result<String, Report<FetchError>> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .change_context(FetchError::Request {
                url: self.url.clone(),
            })?;

        if !response.status().is_success() {
            return Err(Report::new(FetchError::Request {
                url: self.url.clone(),
            })
            .attach(format!("HTTP status: {}", response.status())));
        }

        response.text().await.change_context(FetchError::Request {
            url: self.url.clone(),
        })
    }

    /// Extract both quotes from the page body.
    pub fn parse_page(&self, body: &str) -> Result<PricePair, Report<FetchError>> {
        let document = Html::parse_document(body);

        let table = document
            .select(&self.table_selector)
            .nth(self.table_index)
            .ok_or_else(|| {
                Report::new(FetchError::Parse {
                    reason: format!("quote table #{} not found", self.table_index),
                })
            })?;

        let buy = self.cell_price(table, self.buy_index, "buy")?;
        let sell = self.cell_price(table, self.sell_index, "sell")?;

        Ok(PricePair { buy, sell })
    }

    fn cell_price(
        &self,
        table: ElementRef<'_>,
        index: usize,
        label: &str,
    ) -> Result<i64, Report<FetchError>> {
        let cell = table.select(&self.cell_selector).nth(index).ok_or_else(|| {
            Report::new(FetchError::Parse {
                reason: format!("{label} cell #{index} not found"),
            })
        })?;

        let text: String = cell.text().collect();
        parse_price(&text).ok_or_else(|| {
            Report::new(FetchError::Parse {
                reason: format!("{label} price is not a number"),
            })
            .attach(format!("cell text: {:?}", text.trim()))
        })
    }
}

fn parse_selector(selector: &str) -> Result<Selector, Report<FetchError>> {
    Selector::parse(selector).map_err(|e| {
        Report::new(FetchError::Parse {
            reason: format!("invalid selector {selector:?}"),
        })
        .attach(e.to_string())
    })
}

impl PriceSource for EsunGoldSource {
    fn fetch(&self) -> BoxFuture<'_, Result<PricePair, Report<FetchError>>> {
        Box::pin(async move {
            let body = self.fetch_page().await?;
            let pair = self.parse_page(&body)?;
            debug!(buy = pair.buy, sell = pair.sell, "fetched gold quote");
            Ok(pair)
        })
    }
}
