//! Payloads exchanged with the quoting service and the [`Backend`] contract.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::catalog::{MaterialId, Technology};
use crate::error::ApiError;
use crate::runtime::BoxedFuture;

pub type ApiFuture<T> = BoxedFuture<Result<T, ApiError>>;

/// A user-supplied model file.
#[derive(Debug, Clone, PartialEq)]
pub struct FileUpload {
    pub name: String,
    pub bytes: Arc<[u8]>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub volume_cm3: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceRequest {
    pub volume_cm3: f64,
    pub material: MaterialId,
    pub infill: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceResponse {
    pub price: f64,
    pub weight_g: f64,
}

/// Configuration part of a cart line, sent as the `config` form field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CartConfig {
    pub tech: Technology,
    pub material: MaterialId,
    pub infill: u8,
    pub price: f64,
    pub weight: f64,
    pub volume: f64,
}

/// One atomic "add to cart" submission.
#[derive(Debug, Clone, PartialEq)]
pub struct CartSubmission {
    pub file: FileUpload,
    pub config: CartConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: String,
    #[serde(default)]
    pub filename: String,
    pub config: CartConfig,
    #[serde(default = "one")]
    pub quantity: u32,
}

fn one() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantityUpdate {
    pub item_id: String,
    pub quantity: u32,
}

/// Batch progress; the service reports either a part count or free text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Progress {
    Count(u64),
    Text(String),
}

impl Default for Progress {
    fn default() -> Self {
        Progress::Count(0)
    }
}

impl std::fmt::Display for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Progress::Count(n) => write!(f, "{n}"),
            Progress::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub progress: Progress,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItem {
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub config: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BatchDetail {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub items: Vec<BatchItem>,
}

/// The remote quoting/cart service.
///
/// Every method returns a self-contained future, so the caller may spawn it and
/// forget about `self`.
pub trait Backend {
    fn analyze(&self, file: FileUpload) -> ApiFuture<AnalyzeResponse>;
    fn calculate_price(&self, request: PriceRequest) -> ApiFuture<PriceResponse>;
    fn add_to_cart(&self, submission: CartSubmission) -> ApiFuture<()>;

    fn list_cart(&self) -> ApiFuture<Vec<CartItem>>;
    fn update_quantity(&self, update: QuantityUpdate) -> ApiFuture<()>;
    fn remove_item(&self, item_id: String) -> ApiFuture<()>;
    fn launch_production(&self) -> ApiFuture<()>;

    fn list_batches(&self) -> ApiFuture<Vec<BatchSummary>>;
    fn batch_detail(&self, batch_id: String) -> ApiFuture<BatchDetail>;
}
