// 領収書画像の読み取り（OCR/LLM）

use super::models::ExtractedFields;
use crate::shared::config::ExtractionConfig;
use crate::shared::utils::validate_amount;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::NaiveDate;
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use std::str::FromStr;
use thiserror::Error;

/// 読み取りサービスのエラー
///
/// 「すべての項目が読み取れなかった」とは区別される
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("読み取りサービスへのリクエストに失敗しました: {0}")]
    Request(String),

    #[error("読み取りサービスがエラーを返しました: status={status}, body={body}")]
    Status { status: u16, body: String },

    #[error("読み取りサービスの応答を解析できません: {0}")]
    InvalidResponse(String),

    #[error("読み取りサービスが設定されていません: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for ExtractionError {
    fn from(error: reqwest::Error) -> Self {
        ExtractionError::Request(error.to_string())
    }
}

/// 画像から日付・金額・カテゴリー名を読み取る外部サービス
///
/// 結果は未検証のヒントとして扱う
#[async_trait]
pub trait ReceiptExtractor: Send + Sync {
    async fn extract(
        &self,
        image: &[u8],
        media_type: &str,
    ) -> Result<ExtractedFields, ExtractionError>;
}

/// 読み取りサービス未設定時に使用する（常に手動確認へ回す）
#[derive(Debug, Default)]
pub struct DisabledExtractor;

#[async_trait]
impl ReceiptExtractor for DisabledExtractor {
    async fn extract(
        &self,
        _image: &[u8],
        _media_type: &str,
    ) -> Result<ExtractedFields, ExtractionError> {
        Err(ExtractionError::Configuration(
            "EXTRACTION_API_URL / EXTRACTION_API_KEY が未設定です".to_string(),
        ))
    }
}

/// チャット補完互換APIを使った読み取り
pub struct HttpReceiptExtractor {
    http_client: reqwest::Client,
    config: ExtractionConfig,
    category_names: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

impl HttpReceiptExtractor {
    /// # 引数
    /// * `config` - 読み取りサービスの設定
    /// * `category_names` - 候補として提示するカテゴリー名
    pub fn new(
        config: ExtractionConfig,
        category_names: Vec<String>,
    ) -> Result<Self, ExtractionError> {
        config.validate().map_err(ExtractionError::Configuration)?;

        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        info!(
            "読み取りサービスを初期化しました: model={}, timeout={:?}",
            config.model, config.timeout
        );

        Ok(Self {
            http_client,
            config,
            category_names,
        })
    }

    fn build_request_body(&self, image: &[u8], media_type: &str) -> Value {
        let data_url = format!("data:{media_type};base64,{}", STANDARD.encode(image));
        let prompt = extraction_prompt(&self.category_names);

        json!({
            "model": self.config.model,
            "temperature": 0,
            "response_format": { "type": "json_object" },
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": prompt },
                    { "type": "image_url", "image_url": { "url": data_url } }
                ]
            }]
        })
    }
}

fn extraction_prompt(category_names: &[String]) -> String {
    let categories = if category_names.is_empty() {
        "any short category name".to_string()
    } else {
        category_names.join(", ")
    };

    format!(
        "Read this receipt and reply with a JSON object with exactly these keys: \
         \"date\" (YYYY-MM-DD), \"amount\" (total paid, as a number), \
         \"category\" (one of: {categories}). \
         Use null for any value you cannot read with confidence."
    )
}

#[async_trait]
impl ReceiptExtractor for HttpReceiptExtractor {
    async fn extract(
        &self,
        image: &[u8],
        media_type: &str,
    ) -> Result<ExtractedFields, ExtractionError> {
        debug!(
            "読み取りリクエスト送信: size={} bytes, media_type={media_type}",
            image.len()
        );

        let response = self
            .http_client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&self.build_request_body(image, media_type))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ExtractionError::InvalidResponse(e.to_string()))?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ExtractionError::InvalidResponse("応答が空です".to_string()))?;

        let fields = parse_extraction_content(&content)?;
        info!(
            "読み取り完了: date={:?}, amount={:?}, category={:?}",
            fields.date, fields.amount, fields.category_name
        );
        Ok(fields)
    }
}

static CODE_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```")
        .unwrap_or_else(|e| panic!("コードブロックの正規表現が不正です: {e}"))
});

/// モデルの応答本文を読み取り結果に変換する
///
/// 各項目は独立して解釈し、解釈できない項目だけをNoneにする
pub fn parse_extraction_content(content: &str) -> Result<ExtractedFields, ExtractionError> {
    let json_text = CODE_FENCE
        .captures(content)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str())
        .unwrap_or(content)
        .trim();

    let value: Value = serde_json::from_str(json_text)
        .map_err(|e| ExtractionError::InvalidResponse(format!("JSONではありません: {e}")))?;

    let object = value
        .as_object()
        .ok_or_else(|| ExtractionError::InvalidResponse("JSONオブジェクトではありません".to_string()))?;

    Ok(ExtractedFields {
        date: object.get("date").and_then(parse_date),
        amount: object.get("amount").and_then(parse_amount),
        category_name: object
            .get("category")
            .or_else(|| object.get("category_name"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string),
    })
}

fn parse_date(value: &Value) -> Option<NaiveDate> {
    let text = value.as_str()?.trim();
    ["%Y-%m-%d", "%Y/%m/%d"]
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
}

fn parse_amount(value: &Value) -> Option<Decimal> {
    let amount = match value {
        Value::Number(number) => {
            let text = number.to_string();
            Decimal::from_str(&text)
                .or_else(|_| Decimal::from_scientific(&text))
                .ok()?
        }
        Value::String(text) => {
            let cleaned: String = text
                .trim()
                .chars()
                .filter(|c| !matches!(c, ',' | '¥' | '$' | '￥' | ' '))
                .collect();
            Decimal::from_str(&cleaned).ok()?
        }
        _ => return None,
    };

    match validate_amount(amount) {
        Ok(()) => Some(amount),
        Err(e) => {
            warn!("読み取った金額を破棄しました: {amount} ({e})");
            None
        }
    }
}
