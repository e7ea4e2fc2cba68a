//! Client for the generative data service.
//!
//! Every call sends a prompt together with a JSON response schema and
//! parses the returned text as JSON of that shape.

use std::fmt;
use std::time::Duration;

use anyhow::Result;
use err_derive::Error;
use log::*;
use reqwest::blocking::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use url::Url;

use crate::config::GeminiConfig;
use crate::menu::{FindRestaurants, GenerateMenu, MenuItem, Restaurant};
use crate::orders::{AssignOrderNumber, OrderAssignment};
use crate::services::Queryable;

const API_KEY_HEADER: &str = "x-goog-api-key";
const TIMEOUT: Duration = Duration::from_secs(60);

/// Storage key of the remembered credential.
pub const API_KEY_KEY: &str = "api-key";

/// The generative service credential. Never printed.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApiKey(String);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GenerationError {
    #[error(display = "credential rejected (status {})", _0)]
    CredentialRejected(u16),
    #[error(display = "generation failed with status {}: {}", _0, _1)]
    Status(u16, String),
    #[error(display = "could not reach generation service: {}", _0)]
    Transport(String),
    #[error(display = "generation returned no content")]
    EmptyResponse,
    #[error(display = "generated content is not valid: {}", _0)]
    Malformed(String),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContent<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    response_schema: Value,
}

#[derive(Debug, Deserialize, Default)]
struct Generated {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<GeneratedContent>,
}

#[derive(Debug, Deserialize)]
struct GeneratedContent {
    #[serde(default)]
    parts: Vec<GeneratedPart>,
}

#[derive(Debug, Deserialize)]
struct GeneratedPart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RestaurantsPayload {
    restaurants: Vec<Restaurant>,
}

#[derive(Debug, Deserialize)]
struct MenuPayload {
    menu: Vec<MenuItem>,
}

#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: Client,
    endpoint: Url,
}

impl ApiKey {
    pub fn new<S: Into<String>>(key: S) -> Self {
        ApiKey(key.into().trim().to_string())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "ApiKey(****)")
    }
}

impl GenerationError {
    pub fn is_credential_rejected(err: &anyhow::Error) -> bool {
        match err.downcast_ref::<GenerationError>() {
            Some(GenerationError::CredentialRejected(_)) => true,
            _ => false,
        }
    }
}

fn restaurants_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "restaurants": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "id": { "type": "STRING", "description": "餐廳的唯一識別碼。" },
                        "name": { "type": "STRING" },
                        "category": { "type": "STRING" },
                        "rating": { "type": "NUMBER" },
                        "reviews": { "type": "INTEGER" },
                        "deliveryTime": { "type": "STRING" },
                        "minOrder": { "type": "INTEGER" },
                        "image": {
                            "type": "STRING",
                            "description": "一個來自 picsum.photos 的 URL，例如：https://picsum.photos/500/300"
                        }
                    },
                    "required": ["id", "name", "category", "rating", "reviews", "deliveryTime", "minOrder", "image"]
                }
            }
        }
    })
}

fn menu_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "menu": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "id": { "type": "STRING" },
                        "name": { "type": "STRING" },
                        "price": { "type": "NUMBER" },
                        "restaurantName": { "type": "STRING", "description": "此品項所屬的餐廳名稱。" }
                    },
                    "required": ["id", "name", "price", "restaurantName"]
                }
            }
        }
    })
}

fn order_number_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "orderNumber": { "type": "STRING" },
            "estimatedDeliveryTime": { "type": "STRING" }
        },
        "required": ["orderNumber", "estimatedDeliveryTime"]
    })
}

const RESTAURANTS_PROMPT: &str = "請為一個美食外送 App 生成一個包含8家多樣化且吸引人的虛構餐廳列表。請以繁體中文提供詳細資訊，例如：唯一的 id、名稱、類別、評分(介於3.5到5.0之間)、評論數、外送時間預估、最低訂單金額，以及一個來自 picsum.photos 的佔位圖片 URL。";

fn menu_prompt(restaurant_name: &str) -> String {
    format!(
        "請為名為 \"{}\" 的餐廳生成一份包含6個品項的真實菜單。對於每個品項，請提供唯一的 ID、名稱和價格。每個品項都應包含餐廳名稱以供參考。請使用繁體中文回答。",
        restaurant_name
    )
}

fn order_prompt(req: &AssignOrderNumber) -> Result<String> {
    let details = serde_json::to_string(&req.details)?;
    Ok(format!(
        "一位顧客下了一張美食外送訂單。\n顧客資料: {}。\n訂單品項: {}。\n請根據這些資訊，生成一個唯一的訂單編號（格式：ORD-XXXXXX）和一個真實的預計送達時間（例如：25-35 分鐘）。",
        details,
        req.items.join(", ")
    ))
}

fn request_body(prompt: &str, schema: Value) -> GenerateContent {
    GenerateContent {
        contents: vec![Content {
            parts: vec![Part { text: prompt }],
        }],
        generation_config: GenerationConfig {
            response_mime_type: "application/json",
            response_schema: schema,
        },
    }
}

/// Maps a failed HTTP exchange onto the error taxonomy.
fn classify_failure(status: u16, body: &str) -> GenerationError {
    let rejected = match status {
        401 | 403 => true,
        400 => body.contains("API_KEY_INVALID") || body.contains("API key not valid"),
        _ => false,
    };
    if rejected {
        GenerationError::CredentialRejected(status)
    } else {
        let mut detail = body.trim().to_string();
        if detail.len() > 200 {
            let cut = (0..=200).rev().find(|i| detail.is_char_boundary(*i)).unwrap_or(0);
            detail.truncate(cut);
        }
        GenerationError::Status(status, detail)
    }
}

/// Pulls the generated JSON document out of a `generateContent` reply and
/// decodes it.
fn decode_reply<T: DeserializeOwned>(body: &str) -> Result<T, GenerationError> {
    let reply: Generated =
        serde_json::from_str(body).map_err(|e| GenerationError::Malformed(e.to_string()))?;
    let text: String = reply
        .candidates
        .into_iter()
        .filter_map(|c| c.content)
        .flat_map(|c| c.parts)
        .filter_map(|p| p.text)
        .next()
        .filter(|t| !t.trim().is_empty())
        .ok_or(GenerationError::EmptyResponse)?;
    serde_json::from_str(&text).map_err(|e| GenerationError::Malformed(e.to_string()))
}

impl GeminiClient {
    pub fn new(config: &GeminiConfig) -> Result<Self> {
        let endpoint = config.endpoint()?;
        let http = Client::builder().timeout(TIMEOUT).build()?;
        debug!("Generation endpoint: {}", endpoint);
        Ok(GeminiClient { http, endpoint })
    }

    fn generate<T: DeserializeOwned>(
        &self,
        credential: &ApiKey,
        prompt: &str,
        schema: Value,
    ) -> Result<T, GenerationError> {
        if credential.is_blank() {
            return Err(GenerationError::CredentialRejected(0));
        }
        let body = request_body(prompt, schema);
        let resp = self
            .http
            .post(self.endpoint.clone())
            .header(API_KEY_HEADER, credential.expose())
            .json(&body)
            .send()
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .map_err(|e| GenerationError::Transport(e.to_string()))?;
        if !status.is_success() {
            let err = classify_failure(status.as_u16(), &text);
            warn!("Generation request failed: {}", err);
            return Err(err);
        }
        decode_reply(&text)
    }
}

impl Queryable<FindRestaurants> for GeminiClient {
    fn query(&self, req: FindRestaurants) -> Result<Vec<Restaurant>> {
        let payload: RestaurantsPayload =
            self.generate(&req.credential, RESTAURANTS_PROMPT, restaurants_schema())?;
        Ok(payload.restaurants)
    }
}

impl Queryable<GenerateMenu> for GeminiClient {
    fn query(&self, req: GenerateMenu) -> Result<Vec<MenuItem>> {
        let prompt = menu_prompt(&req.restaurant_name);
        let payload: MenuPayload = self.generate(&req.credential, &prompt, menu_schema())?;
        Ok(payload.menu)
    }
}

impl Queryable<AssignOrderNumber> for GeminiClient {
    fn query(&self, req: AssignOrderNumber) -> Result<OrderAssignment> {
        let prompt = order_prompt(&req)?;
        let assignment: OrderAssignment =
            self.generate(&req.credential, &prompt, order_number_schema())?;
        Ok(assignment)
    }
}
