//! The spreadsheet webhook that records confirmed orders.

use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Datelike, FixedOffset, TimeZone, Timelike, Utc};
use err_derive::Error;
use log::*;
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::SheetConfig;
use crate::services::{Commandable, Request};

use super::models::ConfirmedOrder;

const CONTENT_TYPE_TEXT: &str = "text/plain;charset=utf-8";
const TAIPEI_OFFSET_SECS: i32 = 8 * 3600;
const TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum SaveError {
    #[error(display = "could not reach the order sheet: {}", _0)]
    Transport(String),
    #[error(display = "order sheet responded with status {}", _0)]
    Status(u16),
    #[error(display = "unreadable order sheet response: {}", _0)]
    Body(String),
    #[error(display = "order sheet refused the order: {}", _0)]
    Refused(String),
}

/// One spreadsheet row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetRecord {
    pub order_number: String,
    pub customer_name: String,
    pub customer_phone: String,
    pub delivery_address: String,
    pub payment_method: String,
    pub order_notes: String,
    pub items: String,
    pub subtotal: f64,
    pub shipping_fee: f64,
    pub total: f64,
    pub order_time: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SaveOrderBody<'a> {
    order_data: &'a SheetRecord,
}

#[derive(Debug, Deserialize)]
struct SheetResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Store an order as a spreadsheet row.
#[derive(Debug, Clone)]
pub struct SaveOrder {
    pub record: SheetRecord,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SaveReceipt {
    pub message: Option<String>,
}

impl Request for SaveOrder {
    type Resp = SaveReceipt;
}

#[derive(Debug, Clone)]
pub struct SheetClient {
    http: Client,
    endpoint: Url,
}

impl SheetRecord {
    pub fn of(order: &ConfirmedOrder, placed_at: DateTime<Utc>) -> Self {
        let details = &order.details;
        SheetRecord {
            order_number: order.order_number.clone(),
            customer_name: details.customer_name.clone(),
            customer_phone: details.customer_phone.clone(),
            delivery_address: details.delivery_address.clone(),
            payment_method: details.payment_method.clone(),
            order_notes: details.notes().unwrap_or("").to_string(),
            items: order.item_summary(),
            subtotal: order.subtotal,
            shipping_fee: order.shipping_fee,
            total: order.total,
            order_time: order_time(placed_at),
        }
    }
}

/// Taipei wall-clock time the way the zh-TW locale prints it, e.g.
/// `2024/3/9 下午2:05:07`.
pub fn order_time(at: DateTime<Utc>) -> String {
    let taipei = FixedOffset::east(TAIPEI_OFFSET_SECS);
    let local = taipei.from_utc_datetime(&at.naive_utc());
    let (pm, hour12) = local.hour12();
    format!(
        "{}/{}/{} {}{}:{:02}:{:02}",
        local.year(),
        local.month(),
        local.day(),
        if pm { "下午" } else { "上午" },
        hour12,
        local.minute(),
        local.second()
    )
}

fn interpret(status: u16, body: &str) -> Result<SaveReceipt, SaveError> {
    if !(200..300).contains(&status) {
        return Err(SaveError::Status(status));
    }
    let resp: SheetResponse =
        serde_json::from_str(body).map_err(|e| SaveError::Body(e.to_string()))?;
    if !resp.success {
        let reason = resp
            .error
            .unwrap_or_else(|| "無法將訂單儲存至 Google Sheets".to_string());
        return Err(SaveError::Refused(reason));
    }
    Ok(SaveReceipt {
        message: resp.message,
    })
}

impl SheetClient {
    pub fn new(config: &SheetConfig) -> Result<Self> {
        let endpoint = config.endpoint()?;
        let http = Client::builder()
            .timeout(TIMEOUT)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        debug!("Order sheet endpoint: {}", endpoint);
        Ok(SheetClient { http, endpoint })
    }

    fn post(&self, record: &SheetRecord) -> Result<SaveReceipt, SaveError> {
        let body = serde_json::to_string(&SaveOrderBody { order_data: record })
            .map_err(|e| SaveError::Body(e.to_string()))?;
        let resp = self
            .http
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, CONTENT_TYPE_TEXT)
            .body(body)
            .send()
            .map_err(|e| SaveError::Transport(e.to_string()))?;
        let status = resp.status().as_u16();
        let text = resp.text().map_err(|e| SaveError::Body(e.to_string()))?;
        trace!("Order sheet replied {}: {}", status, text);
        interpret(status, &text)
    }
}

impl Commandable<SaveOrder> for SheetClient {
    fn execute(&self, req: SaveOrder) -> Result<SaveReceipt> {
        info!("Saving order {} to sheet", req.record.order_number);
        let receipt = self.post(&req.record).map_err(|e| {
            error!("Saving order {} failed: {}", req.record.order_number, e);
            e
        })?;
        Ok(receipt)
    }
}
